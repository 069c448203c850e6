// SPDX-License-Identifier: MIT OR Apache-2.0
//! Repository traits over the domain documents.
//!
//! Traits are object-safe so services can hold `Arc<dyn …>` handles from
//! the shared-services bundle. Implementations must keep the semantics
//! documented here — the in-memory doubles are exercised by the same
//! service tests that define the contract.

use crate::StoreError;
use agw_domain::{
    AuditRecord, ChatMessage, Delivery, GeoPoint, Product, Profile, Sale, SaleStatus,
    StatusHistoryEntry, TrackingEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

/// CRUD and domain-shaped queries over sales.
#[async_trait]
pub trait SaleStore: Send + Sync {
    /// Persist a new sale.
    async fn insert(&self, sale: &Sale) -> Result<(), StoreError>;

    /// Fetch a sale by id.
    async fn get(&self, id: &str) -> Result<Option<Sale>, StoreError>;

    /// Sales by `(agent_id, client_id)` created at or after `since`,
    /// excluding cancelled ones, newest first.
    async fn find_recent_by_agent_and_client(
        &self,
        agent_id: &str,
        client_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Sale>, StoreError>;

    /// The sale previously created with this `(client_id, idempotency_key)`
    /// pair, if any.
    async fn find_by_idempotency_key(
        &self,
        client_id: &str,
        key: &str,
    ) -> Result<Option<Sale>, StoreError>;

    /// Append a status-history entry and set the new status atomically.
    /// Returns the updated sale, or `None` when the id is unknown.
    async fn update_status(
        &self,
        id: &str,
        status: SaleStatus,
        entry: StatusHistoryEntry,
    ) -> Result<Option<Sale>, StoreError>;

    /// Recent sales where the user is the client or the agent, newest first.
    async fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Sale>, StoreError>;
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// Outcome of a conditional stock allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocateOutcome {
    /// The decrement was applied and the version bumped.
    Applied,
    /// The document changed since it was read (version or stock no longer
    /// match); the caller should re-read and retry.
    Conflict,
}

/// Products and optimistic stock allocation.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Persist a new product. The SKU is unique.
    async fn insert(&self, product: &Product) -> Result<(), StoreError>;

    /// Fetch a product by SKU.
    async fn get_by_sku(&self, sku: &str) -> Result<Option<Product>, StoreError>;

    /// Conditionally decrement `available_stock` by `quantity` and bump
    /// `version`, iff the stored version equals `expected_version` and the
    /// stock suffices. Single-document atomic.
    async fn try_allocate(
        &self,
        sku: &str,
        quantity: u32,
        expected_version: i64,
    ) -> Result<AllocateOutcome, StoreError>;

    /// Return previously allocated stock (compensation for an aborted
    /// sale). Also bumps the version.
    async fn release(&self, sku: &str, quantity: u32) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Sparse-unique identifier fields on a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierField {
    /// Platform account id.
    UserId,
    /// External-system id.
    ExternalId,
    /// WhatsApp identity.
    WhatsappId,
    /// E-mail address.
    Email,
}

impl IdentifierField {
    /// Field name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserId => "user_id",
            Self::ExternalId => "external_id",
            Self::WhatsappId => "whatsapp_id",
            Self::Email => "email",
        }
    }
}

/// Profiles with sparse uniqueness on their external identifiers.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Persist a new profile. A uniqueness violation yields
    /// [`StoreError::DuplicateKey`] naming the offending field.
    async fn insert(&self, profile: &Profile) -> Result<(), StoreError>;

    /// Fetch a profile by id.
    async fn get(&self, id: &str) -> Result<Option<Profile>, StoreError>;

    /// Fetch a profile by one of its unique identifiers.
    async fn find_by_identifier(
        &self,
        field: IdentifierField,
        value: &str,
    ) -> Result<Option<Profile>, StoreError>;

    /// Replace a profile document. Returns `false` when the id is unknown.
    /// Uniqueness violations yield [`StoreError::DuplicateKey`].
    async fn update(&self, profile: &Profile) -> Result<bool, StoreError>;

    /// Idempotently add a role. Returns `false` when the id is unknown.
    async fn add_role(&self, id: &str, role: &str) -> Result<bool, StoreError>;

    /// Idempotently remove a role. Returns `false` when the id is unknown.
    async fn remove_role(&self, id: &str, role: &str) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

/// Deliveries with atomic tracking-event application.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Persist a new delivery.
    async fn insert(&self, delivery: &Delivery) -> Result<(), StoreError>;

    /// Fetch a delivery by id.
    async fn get(&self, id: &str) -> Result<Option<Delivery>, StoreError>;

    /// The delivery created for a sale, if any.
    async fn find_by_sale(&self, sale_id: &str) -> Result<Option<Delivery>, StoreError>;

    /// Atomically append `event` to the tracking history, set
    /// `current_status = event.status`, `updated_at = event.at`, write
    /// `current_location` when the event carries one, and stamp
    /// `expire_at` when given. Returns the updated document.
    async fn apply_transition(
        &self,
        id: &str,
        event: TrackingEvent,
        expire_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Delivery>, StoreError>;

    /// Record the courier assignment together with its tracking event.
    async fn assign_courier(
        &self,
        id: &str,
        courier_profile_id: &str,
        event: TrackingEvent,
    ) -> Result<Option<Delivery>, StoreError>;

    /// Write the courier's current location without a status change.
    async fn set_location(
        &self,
        id: &str,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Delivery>, StoreError>;
}

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

/// Durable chat history.
#[async_trait]
pub trait ChatMessageStore: Send + Sync {
    /// Append a message.
    async fn append(&self, message: &ChatMessage) -> Result<(), StoreError>;

    /// The most recent `limit` messages for a chat, newest first.
    async fn recent(&self, chat_id: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError>;
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// Append-only audit log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a sanitized record.
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError>;
}
