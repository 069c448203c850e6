// SPDX-License-Identifier: MIT OR Apache-2.0
//! Live subscriber registry for the WebSocket stream.
//!
//! Each connected socket registers once and receives [`Frame`]s through an
//! unbounded channel. Routing follows the envelope target: `all` fans out
//! to everyone, `user` matches the subscriber's principal id, `group`
//! matches explicit joins, and anything else falls back to `all` with a
//! warning.

use agw_core::{EventEnvelope, EventTarget};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// A frame pushed to WebSocket clients: `{type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame discriminator (the envelope's `event_type`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload.
    pub payload: Value,
}

impl Frame {
    fn from_event(event: &EventEnvelope) -> Self {
        Self {
            kind: event.event_type.clone(),
            payload: event.data.clone(),
        }
    }
}

/// Handle identifying one live subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(u64);

struct Entry {
    principal_id: String,
    chats: HashSet<String>,
    sender: mpsc::UnboundedSender<Frame>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    entries: HashMap<u64, Entry>,
    groups: HashMap<String, HashSet<u64>>,
}

/// Registry of live stream subscribers, grouped by target identity.
#[derive(Default)]
pub struct SubscriberRegistry {
    inner: Mutex<Inner>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for `principal_id`. Returns the handle used
    /// for group management and the frame receiver to drain into the
    /// socket.
    pub fn subscribe(
        &self,
        principal_id: impl Into<String>,
    ) -> (SubscriberHandle, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.insert(
            id,
            Entry {
                principal_id: principal_id.into(),
                chats: HashSet::new(),
                sender: tx,
            },
        );
        (SubscriberHandle(id), rx)
    }

    /// Drop a subscriber and its group memberships.
    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.remove(&handle.0);
        for members in inner.groups.values_mut() {
            members.remove(&handle.0);
        }
    }

    /// Join a group (e.g. `"sales_dashboard"`).
    pub fn join_group(&self, handle: SubscriberHandle, group: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.contains_key(&handle.0) {
            inner.groups.entry(group.into()).or_default().insert(handle.0);
        }
    }

    /// Leave a group.
    pub fn leave_group(&self, handle: SubscriberHandle, group: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(members) = inner.groups.get_mut(group) {
            members.remove(&handle.0);
        }
    }

    /// Attach a subscriber to a chat session.
    pub fn join_chat(&self, handle: SubscriberHandle, chat_id: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&handle.0) {
            entry.chats.insert(chat_id.into());
        }
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Whether no subscriber is connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route an envelope to the matching subscribers. Returns how many
    /// frames were delivered; senders whose receiver is gone are skipped.
    pub fn route(&self, event: &EventEnvelope) -> usize {
        let frame = Frame::from_event(event);
        let inner = self.inner.lock().unwrap();

        let recipients: Vec<&Entry> = match event.target {
            EventTarget::All => inner.entries.values().collect(),
            EventTarget::User => match &event.target_id {
                Some(user_id) => inner
                    .entries
                    .values()
                    .filter(|e| &e.principal_id == user_id)
                    .collect(),
                None => {
                    warn!(channel = %event.channel, "user-targeted event without target_id");
                    Vec::new()
                }
            },
            EventTarget::Group => match &event.target_id {
                Some(group) => inner
                    .groups
                    .get(group)
                    .map(|members| {
                        members
                            .iter()
                            .filter_map(|id| inner.entries.get(id))
                            .collect()
                    })
                    .unwrap_or_default(),
                None => {
                    warn!(channel = %event.channel, "group-targeted event without target_id");
                    Vec::new()
                }
            },
            EventTarget::Chat => match &event.target_id {
                Some(chat_id) => inner
                    .entries
                    .values()
                    .filter(|e| e.chats.contains(chat_id))
                    .collect(),
                None => Vec::new(),
            },
            EventTarget::Unknown => {
                warn!(
                    channel = %event.channel,
                    "unknown event target, broadcasting to all"
                );
                inner.entries.values().collect()
            }
        };

        recipients
            .into_iter()
            .filter(|e| e.sender.send(frame.clone()).is_ok())
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(target: EventTarget, target_id: Option<&str>) -> EventEnvelope {
        EventEnvelope::new(
            "sales.created",
            target,
            target_id.map(Into::into),
            "sale_created",
            json!({"sale_id": "s1"}),
            "trace-1",
        )
    }

    #[test]
    fn all_reaches_every_subscriber() {
        let registry = SubscriberRegistry::new();
        let (_h1, mut rx1) = registry.subscribe("u1");
        let (_h2, mut rx2) = registry.subscribe("u2");

        let delivered = registry.route(&event(EventTarget::All, None));
        assert_eq!(delivered, 2);
        assert_eq!(rx1.try_recv().unwrap().kind, "sale_created");
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn user_target_matches_principal_id() {
        let registry = SubscriberRegistry::new();
        let (_h1, mut rx1) = registry.subscribe("u1");
        let (_h2, mut rx2) = registry.subscribe("u2");

        let delivered = registry.route(&event(EventTarget::User, Some("u2")));
        assert_eq!(delivered, 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn group_target_requires_membership() {
        let registry = SubscriberRegistry::new();
        let (h1, mut rx1) = registry.subscribe("u1");
        let (_h2, mut rx2) = registry.subscribe("u2");
        registry.join_group(h1, "sales_dashboard");

        let delivered = registry.route(&event(EventTarget::Group, Some("sales_dashboard")));
        assert_eq!(delivered, 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn leave_group_stops_delivery() {
        let registry = SubscriberRegistry::new();
        let (h1, mut rx1) = registry.subscribe("u1");
        registry.join_group(h1, "g");
        registry.leave_group(h1, "g");
        assert_eq!(registry.route(&event(EventTarget::Group, Some("g"))), 0);
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn chat_target_matches_joined_chats() {
        let registry = SubscriberRegistry::new();
        let (h1, mut rx1) = registry.subscribe("u1");
        registry.join_chat(h1, "chat-9");
        assert_eq!(registry.route(&event(EventTarget::Chat, Some("chat-9"))), 1);
        assert!(rx1.try_recv().is_ok());
        assert_eq!(registry.route(&event(EventTarget::Chat, Some("other"))), 0);
    }

    #[test]
    fn unknown_target_falls_back_to_all() {
        let registry = SubscriberRegistry::new();
        let (_h1, mut rx1) = registry.subscribe("u1");
        assert_eq!(registry.route(&event(EventTarget::Unknown, None)), 1);
        assert!(rx1.try_recv().is_ok());
    }

    #[test]
    fn user_target_without_id_delivers_nothing() {
        let registry = SubscriberRegistry::new();
        let (_h1, mut rx1) = registry.subscribe("u1");
        assert_eq!(registry.route(&event(EventTarget::User, None)), 0);
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_removes_from_groups() {
        let registry = SubscriberRegistry::new();
        let (h1, _rx1) = registry.subscribe("u1");
        registry.join_group(h1, "g");
        registry.unsubscribe(h1);
        assert!(registry.is_empty());
        assert_eq!(registry.route(&event(EventTarget::Group, Some("g"))), 0);
    }

    #[test]
    fn dropped_receiver_not_counted() {
        let registry = SubscriberRegistry::new();
        let (_h1, rx1) = registry.subscribe("u1");
        drop(rx1);
        assert_eq!(registry.route(&event(EventTarget::All, None)), 0);
    }

    #[test]
    fn frame_serializes_with_type_field() {
        let frame = Frame {
            kind: "sale_created".into(),
            payload: json!({"x": 1}),
        };
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["type"], "sale_created");
        assert_eq!(v["payload"]["x"], 1);
    }
}
