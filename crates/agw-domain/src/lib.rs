// SPDX-License-Identifier: MIT OR Apache-2.0
//! Domain documents for the agent gateway.
//!
//! Everything persisted in the document store lives here: sales, products,
//! profiles, deliveries, chat messages, and audit records, together with
//! the monetary helpers and the delivery state machine that guard their
//! invariants. Documents are keyed by uuid-v4 strings and serde-mapped for
//! both JSON and BSON.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod chat;
pub mod delivery;
pub mod money;
pub mod product;
pub mod profile;
pub mod sale;
pub mod signature;

pub use audit::AuditRecord;
pub use chat::ChatMessage;
pub use delivery::{Delivery, DeliveryItem, DeliveryStatus, GeoPoint, TrackingEvent};
pub use money::{line_total, round_money};
pub use product::Product;
pub use profile::{derive_full_name, Profile, ProfileKind};
pub use sale::{Sale, SaleAgentType, SaleItem, SaleStatus, StatusHistoryEntry};
pub use signature::items_signature;

/// Mint a uuid-v4 document id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
