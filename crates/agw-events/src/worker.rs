// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background task worker.
//!
//! Dequeues [`TaskEnvelope`]s, dispatches them to registered handlers, and
//! applies the envelope's retry policy on failure: exponential backoff with
//! jitter until `max_attempts`, then the dead-letter queue.

use crate::dispatcher::TaskEnvelope;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Executes one kind of background task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task. An `Err` triggers the retry policy.
    async fn run(&self, args: &serde_json::Value) -> Result<(), String>;
}

/// What the worker decided to do with a finished attempt.
#[derive(Debug, PartialEq)]
pub enum Disposition {
    /// The attempt succeeded; the task is done.
    Done,
    /// Re-enqueue after the given backoff.
    Retry(Duration),
    /// Attempts exhausted; move to the dead-letter queue.
    DeadLetter,
}

/// Compute the backoff before retrying `attempt` (zero-indexed), doubling
/// the initial backoff per attempt and subtracting up to `jitter` of it.
pub(crate) fn compute_backoff(envelope: &TaskEnvelope) -> Duration {
    let exp = 2u64.saturating_pow(envelope.attempt);
    let nominal_secs = envelope.retry.initial_backoff_secs.saturating_mul(exp);
    let jitter_factor = envelope.retry.jitter.clamp(0.0, 1.0);
    if jitter_factor <= 0.0 || nominal_secs == 0 {
        return Duration::from_secs(nominal_secs);
    }
    let jitter_range_ms = (nominal_secs as f64 * 1000.0 * jitter_factor) as u64;
    // Cheap pseudo-random: clock nanos mixed with the attempt index.
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let jitter_ms = if jitter_range_ms > 0 {
        nanos.wrapping_mul(envelope.attempt as u64 + 1) % jitter_range_ms
    } else {
        0
    };
    Duration::from_millis(nominal_secs * 1000 - jitter_ms)
}

/// Decide the fate of an attempt that just finished.
pub(crate) fn decide(envelope: &TaskEnvelope, failed: bool) -> Disposition {
    if !failed {
        return Disposition::Done;
    }
    if envelope.attempt + 1 >= envelope.retry.max_attempts {
        Disposition::DeadLetter
    } else {
        Disposition::Retry(compute_backoff(envelope))
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Drains one queue, executing tasks through registered handlers.
pub struct Worker {
    conn: ConnectionManager,
    queue: String,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl Worker {
    /// Create a worker for `queue`.
    pub fn new(conn: ConnectionManager, queue: impl Into<String>) -> Self {
        Self {
            conn,
            queue: queue.into(),
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for `task_name`.
    pub fn register(mut self, task_name: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(task_name.into(), handler);
        self
    }

    /// Run until `stop` flips to `true` or its sender is dropped.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!(queue = %self.queue, handlers = self.handlers.len(), "task worker started");
        loop {
            if *stop.borrow() {
                break;
            }
            let popped = {
                let mut conn = self.conn.clone();
                // 1 s pop timeout keeps the stop signal responsive.
                redis::cmd("BRPOP")
                    .arg(&self.queue)
                    .arg(1)
                    .query_async::<Option<(String, String)>>(&mut conn)
                    .await
            };
            match popped {
                Ok(Some((_queue, payload))) => self.process(payload).await,
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "queue pop failed, backing off");
                    tokio::select! {
                        res = stop.changed() => {
                            if res.is_err() || *stop.borrow() { break; }
                        }
                        _ = tokio::time::sleep(Duration::from_secs(2)) => {}
                    }
                }
            }
        }
        info!(queue = %self.queue, "task worker stopped");
    }

    async fn process(&self, payload: String) {
        let mut envelope: TaskEnvelope = match serde_json::from_str(&payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(error = %err, "undecodable task dropped");
                return;
            }
        };

        let failed = match self.handlers.get(&envelope.task_name) {
            Some(handler) => match handler.run(&envelope.args).await {
                Ok(()) => false,
                Err(err) => {
                    warn!(
                        task = %envelope.task_name,
                        task_id = %envelope.id,
                        attempt = envelope.attempt,
                        error = %err,
                        "task attempt failed"
                    );
                    true
                }
            },
            None => {
                error!(task = %envelope.task_name, "no handler registered");
                true
            }
        };

        match decide(&envelope, failed) {
            Disposition::Done => {}
            Disposition::Retry(delay) => {
                envelope.attempt += 1;
                tokio::time::sleep(delay).await;
                self.requeue(&envelope, &envelope.queue.clone()).await;
            }
            Disposition::DeadLetter => {
                warn!(
                    task = %envelope.task_name,
                    task_id = %envelope.id,
                    "attempts exhausted, dead-lettering"
                );
                self.requeue(&envelope, &envelope.dead_letter_queue()).await;
            }
        }
    }

    async fn requeue(&self, envelope: &TaskEnvelope, queue: &str) {
        let payload = match serde_json::to_string(envelope) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to re-serialize task");
                return;
            }
        };
        let mut conn = self.conn.clone();
        if let Err(err) = conn.lpush::<_, _, ()>(queue, payload).await {
            error!(queue, error = %err, "requeue failed, task lost");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::RetryPolicy;
    use serde_json::json;

    fn envelope(attempt: u32, max_attempts: u32, jitter: f64) -> TaskEnvelope {
        let mut e = TaskEnvelope::new(
            "q",
            "sales.sync_banking",
            json!({}),
            RetryPolicy {
                max_attempts,
                initial_backoff_secs: 30,
                jitter,
            },
        );
        e.attempt = attempt;
        e
    }

    #[test]
    fn success_is_done_regardless_of_attempt() {
        assert_eq!(decide(&envelope(2, 3, 0.0), false), Disposition::Done);
    }

    #[test]
    fn failure_retries_until_max_attempts() {
        assert!(matches!(decide(&envelope(0, 3, 0.0), true), Disposition::Retry(_)));
        assert!(matches!(decide(&envelope(1, 3, 0.0), true), Disposition::Retry(_)));
        assert_eq!(decide(&envelope(2, 3, 0.0), true), Disposition::DeadLetter);
    }

    #[test]
    fn single_attempt_policy_dead_letters_immediately() {
        assert_eq!(decide(&envelope(0, 1, 0.0), true), Disposition::DeadLetter);
    }

    #[test]
    fn backoff_doubles_per_attempt_without_jitter() {
        assert_eq!(compute_backoff(&envelope(0, 5, 0.0)), Duration::from_secs(30));
        assert_eq!(compute_backoff(&envelope(1, 5, 0.0)), Duration::from_secs(60));
        assert_eq!(compute_backoff(&envelope(2, 5, 0.0)), Duration::from_secs(120));
    }

    #[test]
    fn jitter_only_shrinks_the_delay() {
        for attempt in 0..4 {
            let nominal = 30u64 * 2u64.pow(attempt);
            let delay = compute_backoff(&envelope(attempt, 5, 0.2));
            assert!(delay <= Duration::from_secs(nominal));
            // At most 20% is subtracted.
            assert!(delay >= Duration::from_millis(nominal * 800));
        }
    }
}
