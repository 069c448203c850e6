// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory repository implementations.
//!
//! These doubles mirror the production store's semantics — conditional
//! stock updates, sparse duplicate keys, atomic transition application —
//! closely enough that the service and gateway test suites run against
//! them unchanged. Locks are held only for the duration of each map
//! operation, never across an await point.

use crate::traits::{
    AllocateOutcome, AuditStore, ChatMessageStore, DeliveryStore, IdentifierField, ProductStore,
    ProfileStore, SaleStore,
};
use crate::StoreError;
use agw_domain::{
    AuditRecord, ChatMessage, Delivery, GeoPoint, Product, Profile, Sale, SaleStatus,
    StatusHistoryEntry, TrackingEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

/// In-memory [`SaleStore`].
#[derive(Debug, Default)]
pub struct MemorySaleStore {
    sales: Mutex<HashMap<String, Sale>>,
}

impl MemorySaleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored sale (test helper).
    pub fn all(&self) -> Vec<Sale> {
        self.sales.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl SaleStore for MemorySaleStore {
    async fn insert(&self, sale: &Sale) -> Result<(), StoreError> {
        let mut sales = self.sales.lock().unwrap();
        if let Some(key) = &sale.idempotency_key {
            let duplicate = sales
                .values()
                .any(|s| s.client_id == sale.client_id && s.idempotency_key.as_ref() == Some(key));
            if duplicate {
                return Err(StoreError::DuplicateKey {
                    field: "idempotency_key".into(),
                });
            }
        }
        sales.insert(sale.id.clone(), sale.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Sale>, StoreError> {
        Ok(self.sales.lock().unwrap().get(id).cloned())
    }

    async fn find_recent_by_agent_and_client(
        &self,
        agent_id: &str,
        client_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Sale>, StoreError> {
        let mut out: Vec<Sale> = self
            .sales
            .lock()
            .unwrap()
            .values()
            .filter(|s| {
                s.agent_id == agent_id
                    && s.client_id == client_id
                    && s.created_at >= since
                    && s.status != SaleStatus::Cancelled
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn find_by_idempotency_key(
        &self,
        client_id: &str,
        key: &str,
    ) -> Result<Option<Sale>, StoreError> {
        Ok(self
            .sales
            .lock()
            .unwrap()
            .values()
            .find(|s| s.client_id == client_id && s.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        status: SaleStatus,
        entry: StatusHistoryEntry,
    ) -> Result<Option<Sale>, StoreError> {
        let mut sales = self.sales.lock().unwrap();
        Ok(sales.get_mut(id).map(|sale| {
            sale.updated_at = entry.at;
            sale.status = status;
            sale.status_history.push(entry);
            sale.clone()
        }))
    }

    async fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Sale>, StoreError> {
        let mut out: Vec<Sale> = self
            .sales
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.client_id == user_id || s.agent_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// In-memory [`ProductStore`].
#[derive(Debug, Default)]
pub struct MemoryProductStore {
    products: Mutex<HashMap<String, Product>>,
}

impl MemoryProductStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a product by SKU (test helper).
    pub fn snapshot(&self, sku: &str) -> Option<Product> {
        self.products.lock().unwrap().get(sku).cloned()
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn insert(&self, product: &Product) -> Result<(), StoreError> {
        let mut products = self.products.lock().unwrap();
        if products.contains_key(&product.sku) {
            return Err(StoreError::DuplicateKey { field: "sku".into() });
        }
        products.insert(product.sku.clone(), product.clone());
        Ok(())
    }

    async fn get_by_sku(&self, sku: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.products.lock().unwrap().get(sku).cloned())
    }

    async fn try_allocate(
        &self,
        sku: &str,
        quantity: u32,
        expected_version: i64,
    ) -> Result<AllocateOutcome, StoreError> {
        let mut products = self.products.lock().unwrap();
        match products.get_mut(sku) {
            Some(p)
                if p.version == expected_version
                    && p.available_stock >= i64::from(quantity) =>
            {
                p.available_stock -= i64::from(quantity);
                p.version += 1;
                p.updated_at = Utc::now();
                Ok(AllocateOutcome::Applied)
            }
            Some(_) => Ok(AllocateOutcome::Conflict),
            None => Ok(AllocateOutcome::Conflict),
        }
    }

    async fn release(&self, sku: &str, quantity: u32) -> Result<(), StoreError> {
        let mut products = self.products.lock().unwrap();
        if let Some(p) = products.get_mut(sku) {
            p.available_stock += i64::from(quantity);
            p.version += 1;
            p.updated_at = Utc::now();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// In-memory [`ProfileStore`] enforcing sparse uniqueness.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, Profile>>,
}

impl MemoryProfileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn duplicate_field(existing: &Profile, candidate: &Profile) -> Option<&'static str> {
        fn clash(a: &Option<String>, b: &Option<String>) -> bool {
            matches!((a, b), (Some(x), Some(y)) if x == y)
        }
        if clash(&existing.email, &candidate.email) {
            Some("email")
        } else if clash(&existing.whatsapp_id, &candidate.whatsapp_id) {
            Some("whatsapp_id")
        } else if clash(&existing.user_id, &candidate.user_id) {
            Some("user_id")
        } else {
            None
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn insert(&self, profile: &Profile) -> Result<(), StoreError> {
        let mut profiles = self.profiles.lock().unwrap();
        for existing in profiles.values() {
            if let Some(field) = Self::duplicate_field(existing, profile) {
                return Err(StoreError::DuplicateKey { field: field.into() });
            }
        }
        profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.lock().unwrap().get(id).cloned())
    }

    async fn find_by_identifier(
        &self,
        field: IdentifierField,
        value: &str,
    ) -> Result<Option<Profile>, StoreError> {
        let profiles = self.profiles.lock().unwrap();
        let found = profiles.values().find(|p| {
            let candidate = match field {
                IdentifierField::UserId => &p.user_id,
                IdentifierField::ExternalId => &p.external_id,
                IdentifierField::WhatsappId => &p.whatsapp_id,
                IdentifierField::Email => &p.email,
            };
            candidate.as_deref() == Some(value)
        });
        Ok(found.cloned())
    }

    async fn update(&self, profile: &Profile) -> Result<bool, StoreError> {
        let mut profiles = self.profiles.lock().unwrap();
        if !profiles.contains_key(&profile.id) {
            return Ok(false);
        }
        for existing in profiles.values() {
            if existing.id != profile.id {
                if let Some(field) = Self::duplicate_field(existing, profile) {
                    return Err(StoreError::DuplicateKey { field: field.into() });
                }
            }
        }
        profiles.insert(profile.id.clone(), profile.clone());
        Ok(true)
    }

    async fn add_role(&self, id: &str, role: &str) -> Result<bool, StoreError> {
        let mut profiles = self.profiles.lock().unwrap();
        Ok(profiles.get_mut(id).map(|p| {
            p.roles.insert(role.to_string());
            p.updated_at = Utc::now();
        }).is_some())
    }

    async fn remove_role(&self, id: &str, role: &str) -> Result<bool, StoreError> {
        let mut profiles = self.profiles.lock().unwrap();
        Ok(profiles.get_mut(id).map(|p| {
            p.roles.remove(role);
            p.updated_at = Utc::now();
        }).is_some())
    }
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

/// In-memory [`DeliveryStore`].
#[derive(Debug, Default)]
pub struct MemoryDeliveryStore {
    deliveries: Mutex<HashMap<String, Delivery>>,
}

impl MemoryDeliveryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryStore for MemoryDeliveryStore {
    async fn insert(&self, delivery: &Delivery) -> Result<(), StoreError> {
        self.deliveries
            .lock()
            .unwrap()
            .insert(delivery.id.clone(), delivery.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Delivery>, StoreError> {
        Ok(self.deliveries.lock().unwrap().get(id).cloned())
    }

    async fn find_by_sale(&self, sale_id: &str) -> Result<Option<Delivery>, StoreError> {
        Ok(self
            .deliveries
            .lock()
            .unwrap()
            .values()
            .find(|d| d.sale_id == sale_id)
            .cloned())
    }

    async fn apply_transition(
        &self,
        id: &str,
        event: TrackingEvent,
        expire_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Delivery>, StoreError> {
        let mut deliveries = self.deliveries.lock().unwrap();
        Ok(deliveries.get_mut(id).map(|d| {
            d.current_status = event.status;
            d.updated_at = event.at;
            if let Some(location) = event.location {
                d.current_location = Some(location);
            }
            if expire_at.is_some() {
                d.expire_at = expire_at;
            }
            d.tracking_history.push(event);
            d.clone()
        }))
    }

    async fn assign_courier(
        &self,
        id: &str,
        courier_profile_id: &str,
        event: TrackingEvent,
    ) -> Result<Option<Delivery>, StoreError> {
        let mut deliveries = self.deliveries.lock().unwrap();
        Ok(deliveries.get_mut(id).map(|d| {
            d.courier_profile_id = Some(courier_profile_id.to_string());
            d.current_status = event.status;
            d.updated_at = event.at;
            d.tracking_history.push(event);
            d.clone()
        }))
    }

    async fn set_location(
        &self,
        id: &str,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Delivery>, StoreError> {
        let mut deliveries = self.deliveries.lock().unwrap();
        Ok(deliveries.get_mut(id).map(|d| {
            d.current_location = Some(location);
            d.updated_at = at;
            d.clone()
        }))
    }
}

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

/// In-memory [`ChatMessageStore`].
#[derive(Debug, Default)]
pub struct MemoryChatMessageStore {
    messages: Mutex<Vec<ChatMessage>>,
}

impl MemoryChatMessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatMessageStore for MemoryChatMessageStore {
    async fn append(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn recent(&self, chat_id: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let mut out: Vec<ChatMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(limit);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// In-memory [`AuditStore`] retaining every appended record.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every appended record (test helper).
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
