// SPDX-License-Identifier: MIT OR Apache-2.0
//! Profile documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What kind of party a profile represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    /// A purchasing client.
    Client,
    /// A vendor supplying products.
    Vendor,
    /// A reseller.
    Reseller,
    /// A delivery courier.
    Courier,
    /// A platform administrator.
    Admin,
    /// An internal system identity.
    System,
    /// An automated agent.
    Bot,
}

/// A person or agent known to the platform.
///
/// At least one external identifier (`user_id`, `external_id`,
/// `whatsapp_id`, or `email`) must be present; each is sparse-unique in
/// the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Document id (uuid v4).
    pub id: String,
    /// Linked platform account id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Identifier in an external system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// WhatsApp identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_id: Option<String>,
    /// E-mail address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Derived from first/last name on every write that touches either.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Kind of party.
    pub kind: ProfileKind,
    /// Granted roles (set semantics).
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Whether the profile may act on the platform.
    pub active: bool,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Validate the document, accumulating every violation.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.user_id.is_none()
            && self.external_id.is_none()
            && self.whatsapp_id.is_none()
            && self.email.is_none()
        {
            errors.push(
                "at least one of user_id, external_id, whatsapp_id, email is required".into(),
            );
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                errors.push(format!("'{email}' is not a valid email address"));
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Derive `full_name` from the name parts, trimming absent halves.
pub fn derive_full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    match (first, last) {
        (None, None) => None,
        (Some(f), None) => Some(f.trim().to_string()),
        (None, Some(l)) => Some(l.trim().to_string()),
        (Some(f), Some(l)) => Some(format!("{} {}", f.trim(), l.trim()).trim().to_string()),
    }
    .filter(|s| !s.is_empty())
}
