// SPDX-License-Identifier: MIT OR Apache-2.0
//! Best-effort event publishing onto the broker.
//!
//! `publish` never raises to the caller: broker outages are logged and the
//! event is dropped. Consumers treat delivery as at-least-once, so the
//! domain write that produced the event is always the source of truth.

use agw_core::EventEnvelope;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error};

/// How long a single publish may sit in the send buffer.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

/// Publishes envelopes to logical channels, best-effort and non-blocking.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an envelope on its channel. Returns `true` when the broker
    /// accepted the message; `false` is logged by the implementation and
    /// must not fail the caller.
    async fn publish(&self, event: &EventEnvelope) -> bool;
}

/// Render an envelope for the wire. Serialization of a well-formed
/// envelope cannot fail; if a pathological payload sneaks in, the data is
/// masked with its type name rather than dropping the event entirely.
fn render(event: &EventEnvelope) -> String {
    match serde_json::to_string(event) {
        Ok(text) => text,
        Err(_) => {
            let mut masked = event.clone();
            masked.data = serde_json::Value::String("<unserializable>".into());
            serde_json::to_string(&masked).unwrap_or_else(|_| "{}".into())
        }
    }
}

// ---------------------------------------------------------------------------
// Redis implementation
// ---------------------------------------------------------------------------

/// [`EventPublisher`] over the broker's pub/sub.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: ConnectionManager,
}

impl RedisPublisher {
    /// Wrap an established connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, event: &EventEnvelope) -> bool {
        let payload = render(event);
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("PUBLISH");
        cmd.arg(&event.channel).arg(payload);
        let send = cmd.query_async::<i64>(&mut conn);
        match tokio::time::timeout(PUBLISH_TIMEOUT, send).await {
            Ok(Ok(receivers)) => {
                debug!(
                    channel = %event.channel,
                    event_type = %event.event_type,
                    receivers,
                    "event published"
                );
                true
            }
            Ok(Err(err)) => {
                error!(channel = %event.channel, error = %err, "event publish failed");
                false
            }
            Err(_) => {
                error!(channel = %event.channel, "event publish timed out");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory [`EventPublisher`] retaining every published envelope.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<EventEnvelope>>,
}

impl MemoryPublisher {
    /// Create an empty publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every published envelope (test helper).
    pub fn published(&self) -> Vec<EventEnvelope> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: &EventEnvelope) -> bool {
        self.events.lock().unwrap().push(event.clone());
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
