// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistence records for the document store.
//!
//! Domain types serialize datetimes as RFC 3339 strings, which is right
//! for the API but wrong for the store: range queries and the TTL index
//! need native BSON dates. These records mirror the domain documents with
//! BSON-date fields and `_id` keys; conversions are lossless both ways.

use agw_domain::{
    AuditRecord, ChatMessage, Delivery, DeliveryItem, DeliveryStatus, GeoPoint, Product, Profile,
    ProfileKind, Sale, SaleAgentType, SaleItem, SaleStatus, StatusHistoryEntry, TrackingEvent,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// `chrono::DateTime<Utc>` as a native BSON date.
pub(crate) mod bson_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        bson::DateTime::from_chrono(*dt).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        Ok(bson::DateTime::deserialize(de)?.to_chrono())
    }
}

/// `Option<chrono::DateTime<Utc>>` as an optional native BSON date.
pub(crate) mod bson_datetime_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        dt.map(bson::DateTime::from_chrono).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<bson::DateTime>::deserialize(de)?.map(|d| d.to_chrono()))
    }
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StatusHistoryRecord {
    pub status: SaleStatus,
    #[serde(with = "bson_datetime")]
    pub at: chrono::DateTime<chrono::Utc>,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl From<StatusHistoryEntry> for StatusHistoryRecord {
    fn from(e: StatusHistoryEntry) -> Self {
        Self { status: e.status, at: e.at, actor: e.actor, comment: e.comment }
    }
}

impl From<StatusHistoryRecord> for StatusHistoryEntry {
    fn from(r: StatusHistoryRecord) -> Self {
        Self { status: r.status, at: r.at, actor: r.actor, comment: r.comment }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SaleRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub client_id: String,
    pub agent_id: String,
    pub agent_type: SaleAgentType,
    pub items: Vec<SaleItem>,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: SaleStatus,
    pub status_history: Vec<StatusHistoryRecord>,
    pub payment_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(with = "bson_datetime")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "bson_datetime")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Sale> for SaleRecord {
    fn from(s: Sale) -> Self {
        Self {
            id: s.id,
            client_id: s.client_id,
            agent_id: s.agent_id,
            agent_type: s.agent_type,
            items: s.items,
            total_amount: s.total_amount,
            currency: s.currency,
            status: s.status,
            status_history: s.status_history.into_iter().map(Into::into).collect(),
            payment_status: s.payment_status,
            delivery_id: s.delivery_id,
            origin_channel: s.origin_channel,
            note: s.note,
            idempotency_key: s.idempotency_key,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

impl From<SaleRecord> for Sale {
    fn from(r: SaleRecord) -> Self {
        Self {
            id: r.id,
            client_id: r.client_id,
            agent_id: r.agent_id,
            agent_type: r.agent_type,
            items: r.items,
            total_amount: r.total_amount,
            currency: r.currency,
            status: r.status,
            status_history: r.status_history.into_iter().map(Into::into).collect(),
            payment_status: r.payment_status,
            delivery_id: r.delivery_id,
            origin_channel: r.origin_channel,
            note: r.note,
            idempotency_key: r.idempotency_key,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ProductRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub sku: String,
    pub name: String,
    pub active: bool,
    pub available_stock: i64,
    pub standard_selling_price: Decimal,
    pub version: i64,
    #[serde(with = "bson_datetime")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "bson_datetime")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Product> for ProductRecord {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            sku: p.sku,
            name: p.name,
            active: p.active,
            available_stock: p.available_stock,
            standard_selling_price: p.standard_selling_price,
            version: p.version,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl From<ProductRecord> for Product {
    fn from(r: ProductRecord) -> Self {
        Self {
            id: r.id,
            sku: r.sku,
            name: r.name,
            active: r.active,
            available_stock: r.available_stock,
            standard_selling_price: r.standard_selling_price,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ProfileRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub kind: ProfileKind,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    pub active: bool,
    #[serde(with = "bson_datetime")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "bson_datetime")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Profile> for ProfileRecord {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            external_id: p.external_id,
            whatsapp_id: p.whatsapp_id,
            email: p.email,
            phone: p.phone,
            first_name: p.first_name,
            last_name: p.last_name,
            full_name: p.full_name,
            kind: p.kind,
            roles: p.roles,
            active: p.active,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl From<ProfileRecord> for Profile {
    fn from(r: ProfileRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            external_id: r.external_id,
            whatsapp_id: r.whatsapp_id,
            email: r.email,
            phone: r.phone,
            first_name: r.first_name,
            last_name: r.last_name,
            full_name: r.full_name,
            kind: r.kind,
            roles: r.roles,
            active: r.active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TrackingEventRecord {
    #[serde(with = "bson_datetime")]
    pub at: chrono::DateTime<chrono::Utc>,
    pub status: DeliveryStatus,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

impl From<TrackingEvent> for TrackingEventRecord {
    fn from(e: TrackingEvent) -> Self {
        Self {
            at: e.at,
            status: e.status,
            description: e.description,
            location: e.location,
            actor_id: e.actor_id,
        }
    }
}

impl From<TrackingEventRecord> for TrackingEvent {
    fn from(r: TrackingEventRecord) -> Self {
        Self {
            at: r.at,
            status: r.status,
            description: r.description,
            location: r.location,
            actor_id: r.actor_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DeliveryRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub sale_id: String,
    pub client_profile_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier_profile_id: Option<String>,
    pub items: Vec<DeliveryItem>,
    pub pickup_address: String,
    pub delivery_address: String,
    pub current_status: DeliveryStatus,
    pub tracking_history: Vec<TrackingEventRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<GeoPoint>,
    #[serde(
        default,
        with = "bson_datetime_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(with = "bson_datetime")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "bson_datetime")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Delivery> for DeliveryRecord {
    fn from(d: Delivery) -> Self {
        Self {
            id: d.id,
            sale_id: d.sale_id,
            client_profile_id: d.client_profile_id,
            courier_profile_id: d.courier_profile_id,
            items: d.items,
            pickup_address: d.pickup_address,
            delivery_address: d.delivery_address,
            current_status: d.current_status,
            tracking_history: d.tracking_history.into_iter().map(Into::into).collect(),
            current_location: d.current_location,
            expire_at: d.expire_at,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

impl From<DeliveryRecord> for Delivery {
    fn from(r: DeliveryRecord) -> Self {
        Self {
            id: r.id,
            sale_id: r.sale_id,
            client_profile_id: r.client_profile_id,
            courier_profile_id: r.courier_profile_id,
            items: r.items,
            pickup_address: r.pickup_address,
            delivery_address: r.delivery_address,
            current_status: r.current_status,
            tracking_history: r.tracking_history.into_iter().map(Into::into).collect(),
            current_location: r.current_location,
            expire_at: r.expire_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChatMessageRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub role: String,
    pub content: String,
    #[serde(with = "bson_datetime")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<ChatMessage> for ChatMessageRecord {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            chat_id: m.chat_id,
            user_id: m.user_id,
            role: m.role,
            content: m.content,
            timestamp: m.timestamp,
        }
    }
}

impl From<ChatMessageRecord> for ChatMessage {
    fn from(r: ChatMessageRecord) -> Self {
        Self {
            id: r.id,
            chat_id: r.chat_id,
            user_id: r.user_id,
            role: r.role,
            content: r.content,
            timestamp: r.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AuditLogRecord {
    pub trace_id: String,
    #[serde(with = "bson_datetime")]
    pub at: chrono::DateTime<chrono::Utc>,
    pub actor_id: String,
    pub roles: Vec<String>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub success: bool,
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl From<AuditRecord> for AuditLogRecord {
    fn from(a: AuditRecord) -> Self {
        Self {
            trace_id: a.trace_id,
            at: a.at,
            actor_id: a.actor_id,
            roles: a.roles,
            action: a.action,
            entity_type: a.entity_type,
            entity_id: a.entity_id,
            success: a.success,
            params: a.params,
            result: a.result,
            error: a.error,
            duration_ms: a.duration_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
