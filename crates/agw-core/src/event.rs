// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event envelope for the fan-out plane.
//!
//! Events are published to dotted channels (`sales.created`) and routed to
//! live subscribers by `{target, target_id}`. Consumers must treat delivery
//! as at-least-once; payloads carry the trace id for correlation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Well-known channel names and subscribe patterns.
pub mod channels {
    /// A sale was created.
    pub const SALES_CREATED: &str = "sales.created";
    /// A sale changed status.
    pub const SALES_STATUS_CHANGED: &str = "sales.status_changed";
    /// A delivery changed status.
    pub const DELIVERY_STATUS_CHANGED: &str = "delivery.status_changed";
    /// A courier reported a new location.
    pub const DELIVERY_LOCATION_UPDATE: &str = "delivery.location_update";
    /// Internal backend event bus.
    pub const BACKEND_EVENTS: &str = "backend.events";
    /// Audit trail channel.
    pub const SYSTEM_AUDIT: &str = "system.audit";

    /// Patterns the stream broadcaster subscribes to by default.
    pub const DEFAULT_SUBSCRIBE_PATTERNS: &[&str] = &["sales.*", "delivery.*", "user.*"];
}

// ---------------------------------------------------------------------------
// EventTarget
// ---------------------------------------------------------------------------

/// Who an event is addressed to.
///
/// Unrecognised target strings deserialize to [`EventTarget::Unknown`]; the
/// broadcaster logs a warning and falls back to broadcasting to all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTarget {
    /// Every live subscriber.
    All,
    /// Subscribers whose principal id equals `target_id`.
    User,
    /// Subscribers explicitly joined to the group `target_id`.
    Group,
    /// Subscribers attached to the chat `target_id`.
    Chat,
    /// Anything else on the wire.
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// EventEnvelope
// ---------------------------------------------------------------------------

/// A single event flowing through the pub/sub bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Dotted channel the event is published on.
    pub channel: String,
    /// Routing target.
    pub target: EventTarget,
    /// Identity the target refers to (user id, group name, chat id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Event discriminator shown to subscribers (e.g. `"sale_created"`).
    pub event_type: String,
    /// Event payload.
    pub data: Value,
    /// Trace id of the request that produced the event.
    pub trace_id: String,
    /// Publication instant.
    pub at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Build an envelope stamped with `Utc::now()`.
    pub fn new(
        channel: impl Into<String>,
        target: EventTarget,
        target_id: Option<String>,
        event_type: impl Into<String>,
        data: Value,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            target,
            target_id,
            event_type: event_type.into(),
            data,
            trace_id: trace_id.into(),
            at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_serde_roundtrip() {
        let ev = EventEnvelope::new(
            channels::SALES_CREATED,
            EventTarget::Group,
            Some("sales_dashboard".into()),
            "sale_created",
            json!({"sale_id": "s1", "status": "processing"}),
            "trace-1",
        );
        let text = serde_json::to_string(&ev).unwrap();
        let back: EventEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn targets_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&EventTarget::All).unwrap(), "\"all\"");
        assert_eq!(serde_json::to_string(&EventTarget::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&EventTarget::Group).unwrap(), "\"group\"");
        assert_eq!(serde_json::to_string(&EventTarget::Chat).unwrap(), "\"chat\"");
    }

    #[test]
    fn unknown_target_falls_through() {
        let t: EventTarget = serde_json::from_str("\"broadcast-v2\"").unwrap();
        assert_eq!(t, EventTarget::Unknown);
    }

    #[test]
    fn target_id_omitted_when_absent() {
        let ev = EventEnvelope::new(
            channels::BACKEND_EVENTS,
            EventTarget::All,
            None,
            "heartbeat",
            json!({}),
            "t",
        );
        let v = serde_json::to_value(&ev).unwrap();
        assert!(v.get("target_id").is_none());
    }

    #[test]
    fn default_patterns_cover_domain_channels() {
        for pattern in channels::DEFAULT_SUBSCRIBE_PATTERNS {
            assert!(pattern.ends_with(".*"));
        }
        assert!(channels::DEFAULT_SUBSCRIBE_PATTERNS.contains(&"sales.*"));
        assert!(channels::DEFAULT_SUBSCRIBE_PATTERNS.contains(&"delivery.*"));
    }
}
