// SPDX-License-Identifier: MIT OR Apache-2.0
//! Storage layer for the agent gateway.
//!
//! Repositories are object-safe traits over domain documents. Two
//! implementations ship: [`mongo`] (the production document store) and
//! [`memory`] (an in-process double that mirrors the store's semantics —
//! conditional stock updates, sparse duplicate keys, TTL stamping — and
//! backs the service and gateway test suites).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod memory;
pub mod mongo;
pub mod traits;

pub use cache::{MemoryRecentCache, RecentCache, RedisRecentCache};
pub use memory::{
    MemoryAuditStore, MemoryChatMessageStore, MemoryDeliveryStore, MemoryProductStore,
    MemoryProfileStore, MemorySaleStore,
};
pub use mongo::MongoStore;
pub use traits::{
    AllocateOutcome, AuditStore, ChatMessageStore, DeliveryStore, IdentifierField, ProductStore,
    ProfileStore, SaleStore,
};

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or the operation timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A unique (possibly sparse) index rejected the write.
    #[error("duplicate value for '{field}'")]
    DuplicateKey {
        /// Field whose uniqueness constraint fired.
        field: String,
    },

    /// A stored document could not be decoded into its domain type.
    #[error("document decode failed: {0}")]
    Decode(String),
}
