// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stream broadcaster: broker pattern subscriptions → live subscribers.
//!
//! The broadcaster holds one subscribe connection. On connection loss it
//! drops any in-flight frame, waits (2 s doubling to a 30 s cap), and
//! re-subscribes. The stop signal is checked at every suspension point, so
//! shutdown interrupts the receive loop promptly.

use crate::subscribers::SubscriberRegistry;
use agw_core::EventEnvelope;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Bridges broker pub/sub to the [`SubscriberRegistry`].
pub struct Broadcaster {
    client: redis::Client,
    patterns: Vec<String>,
    registry: Arc<SubscriberRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster subscribing to `patterns` (e.g. `sales.*`).
    pub fn new(
        client: redis::Client,
        patterns: Vec<String>,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        Self {
            client,
            patterns,
            registry,
        }
    }

    /// Run until `stop` flips to `true` or its sender is dropped.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if *stop.borrow() {
                break;
            }

            match self.subscribe_and_pump(&mut stop).await {
                Pump::Stopped => break,
                Pump::ConnectionLost => {
                    warn!(
                        backoff_secs = backoff.as_secs(),
                        "broker connection lost, re-subscribing after backoff"
                    );
                }
            }

            tokio::select! {
                res = stop.changed() => {
                    if res.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        info!("broadcaster stopped");
    }

    async fn subscribe_and_pump(&self, stop: &mut watch::Receiver<bool>) -> Pump {
        let mut pubsub = match self.client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(err) => {
                warn!(error = %err, "failed to open subscribe connection");
                return Pump::ConnectionLost;
            }
        };
        for pattern in &self.patterns {
            if let Err(err) = pubsub.psubscribe(pattern).await {
                warn!(pattern = %pattern, error = %err, "pattern subscribe failed");
                return Pump::ConnectionLost;
            }
        }
        info!(patterns = ?self.patterns, "subscribed to broker patterns");

        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                res = stop.changed() => {
                    if res.is_err() || *stop.borrow() {
                        return Pump::Stopped;
                    }
                }
                msg = stream.next() => match msg {
                    Some(msg) => {
                        let channel = msg.get_channel_name().to_string();
                        match msg.get_payload::<String>() {
                            Ok(payload) => {
                                dispatch(&self.registry, &channel, &payload);
                            }
                            Err(err) => {
                                warn!(channel = %channel, error = %err, "undecodable frame dropped");
                            }
                        }
                    }
                    // Stream end means the connection died; the in-flight
                    // frame, if any, is gone with it.
                    None => return Pump::ConnectionLost,
                }
            }
        }
    }
}

enum Pump {
    Stopped,
    ConnectionLost,
}

/// Parse one wire payload and route it to live subscribers.
fn dispatch(registry: &SubscriberRegistry, channel: &str, payload: &str) {
    match serde_json::from_str::<EventEnvelope>(payload) {
        Ok(event) => {
            let delivered = registry.route(&event);
            debug!(
                channel = %channel,
                event_type = %event.event_type,
                delivered,
                "event routed"
            );
        }
        Err(err) => {
            warn!(channel = %channel, error = %err, "malformed event payload dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
