// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chat message documents for the hybrid conversation memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message in a chat session. Durable in the store, with a bounded
/// recent window cached in the list store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Document id (uuid v4).
    pub id: String,
    /// Session the message belongs to.
    pub chat_id: String,
    /// User the session belongs to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Speaker role (`"user"`, `"assistant"`, `"system"`).
    pub role: String,
    /// Message body.
    pub content: String,
    /// When the message was produced.
    pub timestamp: DateTime<Utc>,
}
