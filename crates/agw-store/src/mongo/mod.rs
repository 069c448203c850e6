// SPDX-License-Identifier: MIT OR Apache-2.0
//! MongoDB-backed repositories.
//!
//! One [`MongoStore`] implements every repository trait over typed
//! collections. Stock allocation is a single-document conditional update
//! (filter on `version` and remaining stock, `$inc` both), which the
//! server applies atomically; an aborted sale restores stock through the
//! compensating [`ProductStore::release`]. Uniqueness is enforced by the
//! indexes created in [`MongoStore::ensure_indexes`].

mod records;

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
use bson::{doc, Bson};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};
use records::{
    AuditLogRecord, ChatMessageRecord, DeliveryRecord, ProductRecord, ProfileRecord, SaleRecord,
    StatusHistoryRecord, TrackingEventRecord,
};
use std::time::Duration;
use tracing::info;

const DEFAULT_DB_NAME: &str = "agent_gateway";

/// Fields that unique indexes are declared on, in the order duplicate-key
/// messages are probed.
const UNIQUE_FIELDS: &[&str] = &["email", "whatsapp_id", "user_id", "idempotency_key", "sku"];

// ---------------------------------------------------------------------------
// MongoStore
// ---------------------------------------------------------------------------

/// Handle over the gateway database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect to the store with a 5 s server-selection timeout.
    ///
    /// The database name comes from the URI path, falling back to
    /// `agent_gateway`.
    pub async fn connect(uri: &str) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        options.server_selection_timeout = Some(Duration::from_secs(5));
        let client =
            Client::with_options(options).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let db = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DB_NAME));
        info!(db = db.name(), "connected to document store");
        Ok(Self { db })
    }

    /// `true` when the server answers a ping.
    pub async fn ping(&self) -> bool {
        self.db.run_command(doc! {"ping": 1}).await.is_ok()
    }

    /// Create every index the gateway relies on. Idempotent.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique = || IndexOptions::builder().unique(true).build();
        let unique_sparse = || IndexOptions::builder().unique(true).sparse(true).build();

        let sales = self.sales();
        create(&sales, doc! {"client_id": 1}, None).await?;
        create(&sales, doc! {"agent_id": 1, "created_at": -1}, None).await?;
        // Replays of an idempotency key must collide; sales without one
        // must not. A partial filter keeps keyless sales out of the index.
        create(
            &sales,
            doc! {"client_id": 1, "idempotency_key": 1},
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(doc! {"idempotency_key": {"$exists": true}})
                    .build(),
            ),
        )
        .await?;

        let products = self.products();
        create(&products, doc! {"sku": 1}, Some(unique())).await?;

        let profiles = self.profiles();
        create(&profiles, doc! {"email": 1}, Some(unique_sparse())).await?;
        create(&profiles, doc! {"whatsapp_id": 1}, Some(unique_sparse())).await?;
        create(&profiles, doc! {"user_id": 1}, Some(unique_sparse())).await?;

        let deliveries = self.deliveries();
        create(&deliveries, doc! {"sale_id": 1}, None).await?;
        create(&deliveries, doc! {"current_status": 1}, None).await?;
        create(
            &deliveries,
            doc! {"expire_at": 1},
            Some(
                IndexOptions::builder()
                    .expire_after(Duration::from_secs(0))
                    .build(),
            ),
        )
        .await?;

        let chat = self.chat_messages();
        create(&chat, doc! {"chat_id": 1}, None).await?;
        create(&chat, doc! {"timestamp": 1}, None).await?;

        let audit = self.audit_log();
        create(&audit, doc! {"at": 1}, None).await?;
        create(&audit, doc! {"actor_id": 1}, None).await?;

        info!("store indexes ensured");
        Ok(())
    }

    fn sales(&self) -> Collection<SaleRecord> {
        self.db.collection("sales")
    }

    fn products(&self) -> Collection<ProductRecord> {
        self.db.collection("products")
    }

    fn profiles(&self) -> Collection<ProfileRecord> {
        self.db.collection("profiles")
    }

    fn deliveries(&self) -> Collection<DeliveryRecord> {
        self.db.collection("deliveries")
    }

    fn chat_messages(&self) -> Collection<ChatMessageRecord> {
        self.db.collection("chat_messages")
    }

    fn audit_log(&self) -> Collection<AuditLogRecord> {
        self.db.collection("audit_log")
    }
}

async fn create<T: Send + Sync>(
    coll: &Collection<T>,
    keys: bson::Document,
    options: Option<IndexOptions>,
) -> Result<(), StoreError> {
    let model = match options {
        Some(options) => IndexModel::builder().keys(keys).options(options).build(),
        None => IndexModel::builder().keys(keys).build(),
    };
    coll.create_index(model)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    Ok(())
}

fn unavailable(err: mongodb::error::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Map a write error to `DuplicateKey` when it names a unique field.
fn map_insert_error(err: mongodb::error::Error) -> StoreError {
    let msg = err.to_string();
    if msg.contains("E11000") || msg.contains("duplicate key") {
        let field = UNIQUE_FIELDS
            .iter()
            .find(|f| msg.contains(*f))
            .copied()
            .unwrap_or("identifier");
        return StoreError::DuplicateKey { field: field.into() };
    }
    StoreError::Unavailable(msg)
}

// ---------------------------------------------------------------------------
// SaleStore
// ---------------------------------------------------------------------------

#[async_trait]
impl SaleStore for MongoStore {
    async fn insert(&self, sale: &Sale) -> Result<(), StoreError> {
        self.sales()
            .insert_one(SaleRecord::from(sale.clone()))
            .await
            .map_err(map_insert_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Sale>, StoreError> {
        let record = self
            .sales()
            .find_one(doc! {"_id": id})
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }

    async fn find_recent_by_agent_and_client(
        &self,
        agent_id: &str,
        client_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Sale>, StoreError> {
        let filter = doc! {
            "agent_id": agent_id,
            "client_id": client_id,
            "created_at": {"$gte": bson::DateTime::from_chrono(since)},
            "status": {"$ne": status_bson(SaleStatus::Cancelled)?},
        };
        let cursor = self
            .sales()
            .find(filter)
            .sort(doc! {"created_at": -1})
            .await
            .map_err(unavailable)?;
        let records: Vec<SaleRecord> = cursor.try_collect().await.map_err(unavailable)?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn find_by_idempotency_key(
        &self,
        client_id: &str,
        key: &str,
    ) -> Result<Option<Sale>, StoreError> {
        let record = self
            .sales()
            .find_one(doc! {"client_id": client_id, "idempotency_key": key})
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }

    async fn update_status(
        &self,
        id: &str,
        status: SaleStatus,
        entry: StatusHistoryEntry,
    ) -> Result<Option<Sale>, StoreError> {
        let entry_bson = bson::to_bson(&StatusHistoryRecord::from(entry.clone()))
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let record = self
            .sales()
            .find_one_and_update(
                doc! {"_id": id},
                doc! {
                    "$set": {
                        "status": status_bson(status)?,
                        "updated_at": bson::DateTime::from_chrono(entry.at),
                    },
                    "$push": {"status_history": entry_bson},
                },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }

    async fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Sale>, StoreError> {
        let filter = doc! {"$or": [{"client_id": user_id}, {"agent_id": user_id}]};
        let cursor = self
            .sales()
            .find(filter)
            .sort(doc! {"created_at": -1})
            .limit(limit as i64)
            .await
            .map_err(unavailable)?;
        let records: Vec<SaleRecord> = cursor.try_collect().await.map_err(unavailable)?;
        Ok(records.into_iter().map(Into::into).collect())
    }
}

fn status_bson(status: SaleStatus) -> Result<Bson, StoreError> {
    bson::to_bson(&status).map_err(|e| StoreError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// ProductStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ProductStore for MongoStore {
    async fn insert(&self, product: &Product) -> Result<(), StoreError> {
        self.products()
            .insert_one(ProductRecord::from(product.clone()))
            .await
            .map_err(map_insert_error)?;
        Ok(())
    }

    async fn get_by_sku(&self, sku: &str) -> Result<Option<Product>, StoreError> {
        let record = self
            .products()
            .find_one(doc! {"sku": sku})
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }

    async fn try_allocate(
        &self,
        sku: &str,
        quantity: u32,
        expected_version: i64,
    ) -> Result<AllocateOutcome, StoreError> {
        let qty = i64::from(quantity);
        let result = self
            .products()
            .update_one(
                doc! {
                    "sku": sku,
                    "version": expected_version,
                    "available_stock": {"$gte": qty},
                },
                doc! {
                    "$inc": {"available_stock": -qty, "version": 1},
                    "$currentDate": {"updated_at": true},
                },
            )
            .await
            .map_err(unavailable)?;
        if result.modified_count == 1 {
            Ok(AllocateOutcome::Applied)
        } else {
            Ok(AllocateOutcome::Conflict)
        }
    }

    async fn release(&self, sku: &str, quantity: u32) -> Result<(), StoreError> {
        self.products()
            .update_one(
                doc! {"sku": sku},
                doc! {
                    "$inc": {"available_stock": i64::from(quantity), "version": 1},
                    "$currentDate": {"updated_at": true},
                },
            )
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ProfileStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ProfileStore for MongoStore {
    async fn insert(&self, profile: &Profile) -> Result<(), StoreError> {
        self.profiles()
            .insert_one(ProfileRecord::from(profile.clone()))
            .await
            .map_err(map_insert_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let record = self
            .profiles()
            .find_one(doc! {"_id": id})
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }

    async fn find_by_identifier(
        &self,
        field: IdentifierField,
        value: &str,
    ) -> Result<Option<Profile>, StoreError> {
        let record = self
            .profiles()
            .find_one(doc! {field.as_str(): value})
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }

    async fn update(&self, profile: &Profile) -> Result<bool, StoreError> {
        let result = self
            .profiles()
            .replace_one(
                doc! {"_id": &profile.id},
                ProfileRecord::from(profile.clone()),
            )
            .await
            .map_err(map_insert_error)?;
        Ok(result.matched_count == 1)
    }

    async fn add_role(&self, id: &str, role: &str) -> Result<bool, StoreError> {
        let result = self
            .profiles()
            .update_one(
                doc! {"_id": id},
                doc! {"$addToSet": {"roles": role}, "$currentDate": {"updated_at": true}},
            )
            .await
            .map_err(unavailable)?;
        Ok(result.matched_count == 1)
    }

    async fn remove_role(&self, id: &str, role: &str) -> Result<bool, StoreError> {
        let result = self
            .profiles()
            .update_one(
                doc! {"_id": id},
                doc! {"$pull": {"roles": role}, "$currentDate": {"updated_at": true}},
            )
            .await
            .map_err(unavailable)?;
        Ok(result.matched_count == 1)
    }
}

// ---------------------------------------------------------------------------
// DeliveryStore
// ---------------------------------------------------------------------------

#[async_trait]
impl DeliveryStore for MongoStore {
    async fn insert(&self, delivery: &Delivery) -> Result<(), StoreError> {
        self.deliveries()
            .insert_one(DeliveryRecord::from(delivery.clone()))
            .await
            .map_err(map_insert_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Delivery>, StoreError> {
        let record = self
            .deliveries()
            .find_one(doc! {"_id": id})
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }

    async fn find_by_sale(&self, sale_id: &str) -> Result<Option<Delivery>, StoreError> {
        let record = self
            .deliveries()
            .find_one(doc! {"sale_id": sale_id})
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }

    async fn apply_transition(
        &self,
        id: &str,
        event: TrackingEvent,
        expire_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Delivery>, StoreError> {
        let mut set = doc! {
            "current_status": bson::to_bson(&event.status)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            "updated_at": bson::DateTime::from_chrono(event.at),
        };
        if let Some(location) = &event.location {
            set.insert(
                "current_location",
                bson::to_bson(location).map_err(|e| StoreError::Decode(e.to_string()))?,
            );
        }
        if let Some(expire_at) = expire_at {
            set.insert("expire_at", bson::DateTime::from_chrono(expire_at));
        }
        let event_bson = bson::to_bson(&TrackingEventRecord::from(event))
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let record = self
            .deliveries()
            .find_one_and_update(
                doc! {"_id": id},
                doc! {"$set": set, "$push": {"tracking_history": event_bson}},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }

    async fn assign_courier(
        &self,
        id: &str,
        courier_profile_id: &str,
        event: TrackingEvent,
    ) -> Result<Option<Delivery>, StoreError> {
        let event_bson = bson::to_bson(&TrackingEventRecord::from(event.clone()))
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let record = self
            .deliveries()
            .find_one_and_update(
                doc! {"_id": id},
                doc! {
                    "$set": {
                        "courier_profile_id": courier_profile_id,
                        "current_status": bson::to_bson(&event.status)
                            .map_err(|e| StoreError::Decode(e.to_string()))?,
                        "updated_at": bson::DateTime::from_chrono(event.at),
                    },
                    "$push": {"tracking_history": event_bson},
                },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }

    async fn set_location(
        &self,
        id: &str,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Delivery>, StoreError> {
        let record = self
            .deliveries()
            .find_one_and_update(
                doc! {"_id": id},
                doc! {
                    "$set": {
                        "current_location": bson::to_bson(&location)
                            .map_err(|e| StoreError::Decode(e.to_string()))?,
                        "updated_at": bson::DateTime::from_chrono(at),
                    },
                },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(unavailable)?;
        Ok(record.map(Into::into))
    }
}

// ---------------------------------------------------------------------------
// ChatMessageStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ChatMessageStore for MongoStore {
    async fn append(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.chat_messages()
            .insert_one(ChatMessageRecord::from(message.clone()))
            .await
            .map_err(map_insert_error)?;
        Ok(())
    }

    async fn recent(&self, chat_id: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let cursor = self
            .chat_messages()
            .find(doc! {"chat_id": chat_id})
            .sort(doc! {"timestamp": -1})
            .limit(limit as i64)
            .await
            .map_err(unavailable)?;
        let records: Vec<ChatMessageRecord> = cursor.try_collect().await.map_err(unavailable)?;
        Ok(records.into_iter().map(Into::into).collect())
    }
}

// ---------------------------------------------------------------------------
// AuditStore
// ---------------------------------------------------------------------------

#[async_trait]
impl AuditStore for MongoStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.audit_log()
            .insert_one(AuditLogRecord::from(record.clone()))
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
