// SPDX-License-Identifier: MIT OR Apache-2.0
//! Product documents.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A sellable product. `version` backs optimistic concurrency on stock
/// allocation: every successful decrement bumps it, and writers must match
/// the version they read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Document id (uuid v4).
    pub id: String,
    /// Unique stock-keeping unit.
    pub sku: String,
    /// Display name.
    pub name: String,
    /// Whether the product can currently be sold.
    pub active: bool,
    /// Units available for allocation; never negative.
    pub available_stock: i64,
    /// List price per unit.
    pub standard_selling_price: Decimal,
    /// Optimistic-concurrency version counter.
    pub version: i64,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` units can be allocated right now.
    pub fn can_allocate(&self, quantity: u32) -> bool {
        self.active && self.available_stock >= i64::from(quantity)
    }
}
