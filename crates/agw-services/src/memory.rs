// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hybrid chat memory: durable history plus a capped recent-window cache.

use agw_domain::{new_id, ChatMessage};
use agw_store::{ChatMessageStore, RecentCache, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

const RECENT_WINDOW: usize = 20;
const CACHE_TTL_SECS: u64 = 24 * 3600;
const CACHE_KEY_PREFIX: &str = "chat_memory:";

/// Conversation memory for chat sessions.
///
/// Writes go to the durable store first; the cache keeps the most recent
/// window for cheap reads and is strictly a read-through accelerator — a
/// cache failure is logged, never surfaced.
#[derive(Clone)]
pub struct ChatMemoryService {
    store: Arc<dyn ChatMessageStore>,
    cache: Arc<dyn RecentCache>,
}

impl ChatMemoryService {
    /// Create a memory service over the given store and cache.
    pub fn new(store: Arc<dyn ChatMessageStore>, cache: Arc<dyn RecentCache>) -> Self {
        Self { store, cache }
    }

    fn cache_key(chat_id: &str) -> String {
        format!("{CACHE_KEY_PREFIX}{chat_id}")
    }

    /// Append a message to a chat session.
    pub async fn append(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
        role: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let message = ChatMessage {
            id: new_id(),
            chat_id: chat_id.to_string(),
            user_id: user_id.map(Into::into),
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        self.store.append(&message).await?;

        match serde_json::to_string(&message) {
            Ok(serialized) => {
                if let Err(err) = self
                    .cache
                    .push_recent(
                        &Self::cache_key(chat_id),
                        serialized,
                        RECENT_WINDOW,
                        CACHE_TTL_SECS,
                    )
                    .await
                {
                    warn!(chat_id, error = %err, "chat cache write failed");
                }
            }
            Err(err) => warn!(chat_id, error = %err, "chat message not cacheable"),
        }
        Ok(message)
    }

    /// The most recent `limit` messages, newest first. Served from the
    /// cache when possible, falling back to the durable store.
    pub async fn recent(&self, chat_id: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let limit = limit.min(RECENT_WINDOW);
        match self.cache.read_recent(&Self::cache_key(chat_id), limit).await {
            Ok(entries) if !entries.is_empty() => {
                let parsed: Vec<ChatMessage> = entries
                    .iter()
                    .filter_map(|raw| serde_json::from_str(raw).ok())
                    .collect();
                if parsed.len() == entries.len() {
                    return Ok(parsed);
                }
                // Partial decode means a stale cache shape; fall through.
            }
            Ok(_) => {}
            Err(err) => warn!(chat_id, error = %err, "chat cache read failed"),
        }
        self.store.recent(chat_id, limit).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
