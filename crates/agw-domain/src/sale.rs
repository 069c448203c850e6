// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sale documents and their invariants.

use crate::money::{line_total, round_money};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Awaiting payment confirmation.
    PendingPayment,
    /// Accepted and being fulfilled (initial status on creation).
    Processing,
    /// Fulfilment complete, ready for shipping.
    Completed,
    /// Handed to delivery.
    Shipping,
    /// Delivered to the client.
    Delivered,
    /// Cancelled before completion.
    Cancelled,
    /// Refunded after payment.
    Refunded,
    /// Failed in an unrecoverable way.
    Error,
}

/// What kind of actor created the sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleAgentType {
    /// A human operator.
    Human,
    /// An automated agent.
    Bot,
    /// An internal system process.
    System,
}

// ---------------------------------------------------------------------------
// Subdocuments
// ---------------------------------------------------------------------------

/// A single line item within a sale. Name and price are denormalized at
/// the time of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleItem {
    /// Id of the product sold.
    pub product_id: String,
    /// SKU at the time of sale.
    pub sku: String,
    /// Product name at the time of sale.
    pub name: String,
    /// Units sold; always positive.
    pub quantity: u32,
    /// Price charged per unit.
    pub unit_price: Decimal,
    /// `unit_price * quantity`, rounded to 2 digits.
    pub total_price: Decimal,
}

/// One entry in the append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    /// Status entered.
    pub status: SaleStatus,
    /// When the status was entered.
    pub at: DateTime<Utc>,
    /// Who changed the status.
    pub actor: String,
    /// Optional free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

// ---------------------------------------------------------------------------
// Sale
// ---------------------------------------------------------------------------

/// A persisted sales transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    /// Document id (uuid v4).
    pub id: String,
    /// Profile id of the purchasing client.
    pub client_id: String,
    /// Id of the agent that created the sale.
    pub agent_id: String,
    /// Type of actor that created the sale.
    pub agent_type: SaleAgentType,
    /// Line items; never empty.
    pub items: Vec<SaleItem>,
    /// Sum of all item totals.
    pub total_amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Current lifecycle status.
    pub status: SaleStatus,
    /// Append-only history, monotonic in `at`.
    pub status_history: Vec<StatusHistoryEntry>,
    /// Payment integration state (`"pending"`, `"paid"`, `"failed"`).
    pub payment_status: String,
    /// Linked delivery, once one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    /// Channel the sale originated from (e.g. `"whatsapp"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_channel: Option<String>,
    /// Free-form note captured at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Caller-supplied idempotency key, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    /// Validate the document invariants, accumulating every violation.
    ///
    /// Checked: non-empty items, positive quantities, non-negative prices,
    /// per-item totals, the grand total, the 3-letter currency code, the
    /// presence of an initial history entry matching the creation status,
    /// and history monotonicity.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.items.is_empty() {
            errors.push("items must not be empty".into());
        }
        for (idx, item) in self.items.iter().enumerate() {
            if item.quantity == 0 {
                errors.push(format!("items[{idx}].quantity must be positive"));
            }
            if item.unit_price < Decimal::ZERO {
                errors.push(format!("items[{idx}].unit_price must not be negative"));
            }
            let expected = line_total(item.unit_price, item.quantity);
            if item.total_price != expected {
                errors.push(format!(
                    "items[{idx}].total_price {} does not equal unit_price * quantity ({expected})",
                    item.total_price
                ));
            }
        }

        let sum: Decimal = self.items.iter().map(|i| i.total_price).sum();
        if self.total_amount != round_money(sum) {
            errors.push(format!(
                "total_amount {} does not equal the sum of item totals ({})",
                self.total_amount,
                round_money(sum)
            ));
        }

        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push(format!("currency '{}' must be a 3-letter code", self.currency));
        }

        match self.status_history.first() {
            None => errors.push("status_history must contain the initial entry".into()),
            Some(first) => {
                // The first entry records the status the sale was created with.
                if self.status_history.len() == 1 && first.status != self.status {
                    errors.push("status_history[0].status must match the sale status".into());
                }
            }
        }
        for pair in self.status_history.windows(2) {
            if pair[1].at < pair[0].at {
                errors.push("status_history must be monotonic in time".into());
                break;
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Append a status-history entry and move the sale to `status`.
    pub fn push_status(&mut self, status: SaleStatus, actor: &str, comment: Option<String>) {
        let at = Utc::now();
        self.status_history.push(StatusHistoryEntry {
            status,
            at,
            actor: actor.to_string(),
            comment,
        });
        self.status = status;
        self.updated_at = at;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
