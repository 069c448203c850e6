// SPDX-License-Identifier: MIT OR Apache-2.0
//! Domain services for the agent gateway.
//!
//! Services own the business rules and the transactional boundaries.
//! They never share mutable in-memory state between requests — all
//! coordination goes through the store or the broker — and they raise
//! typed domain errors that agents translate into transport responses.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod delivery;
pub mod memory;
pub mod people;
pub mod sales;

pub use audit::AuditService;
pub use delivery::{CreateDeliveryInput, DeliveryError, DeliveryService};
pub use memory::ChatMemoryService;
pub use people::{CreateProfileInput, PeopleError, PeopleService, UpdateProfileInput};
pub use sales::{CreateSaleInput, CreateSaleItem, SalesConfig, SalesError, SalesService};
