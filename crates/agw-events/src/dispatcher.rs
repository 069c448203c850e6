// SPDX-License-Identifier: MIT OR Apache-2.0
//! Durable background-task dispatch.
//!
//! The dispatcher is a thin typed wrapper over the broker's list API:
//! `enqueue` pushes a [`TaskEnvelope`] onto the named queue and the
//! [`Worker`](crate::worker::Worker) drains it. Dispatch failures surface
//! to the caller as [`DispatchError`] — callers decide whether that fails
//! their own operation (post-commit fan-out does not).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Retry policy carried with every task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts before the task is dead-lettered.
    pub max_attempts: u32,
    /// Backoff before the first retry, in seconds. Doubles per attempt.
    pub initial_backoff_secs: u64,
    /// Jitter factor in `[0.0, 1.0]` subtracted from the nominal delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_secs: 30,
            jitter: 0.2,
        }
    }
}

// ---------------------------------------------------------------------------
// Task envelope
// ---------------------------------------------------------------------------

/// One durable task on a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Task id (uuid v4).
    pub id: String,
    /// Queue the task was enqueued on.
    pub queue: String,
    /// Registered handler name (e.g. `"sales.sync_banking"`).
    pub task_name: String,
    /// Handler arguments.
    pub args: Value,
    /// Zero-indexed attempt counter, bumped by the worker on retry.
    pub attempt: u32,
    /// Retry policy.
    pub retry: RetryPolicy,
    /// When the task was first enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    /// Build a fresh envelope for its first attempt.
    pub fn new(
        queue: impl Into<String>,
        task_name: impl Into<String>,
        args: Value,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            queue: queue.into(),
            task_name: task_name.into(),
            args,
            attempt: 0,
            retry,
            enqueued_at: Utc::now(),
        }
    }

    /// Name of the dead-letter queue for this task's queue.
    pub fn dead_letter_queue(&self) -> String {
        format!("{}.dead", self.queue)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Dispatch failed; the task was not enqueued.
#[derive(Debug, thiserror::Error)]
#[error("task dispatch failed: {0}")]
pub struct DispatchError(
    /// Human-readable failure detail.
    pub String,
);

/// Enqueues durable tasks onto broker-backed queues.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Enqueue `task_name` with `args` onto `queue`.
    async fn enqueue(
        &self,
        queue: &str,
        task_name: &str,
        args: Value,
        retry: RetryPolicy,
    ) -> Result<(), DispatchError>;
}

// ---------------------------------------------------------------------------
// Redis implementation
// ---------------------------------------------------------------------------

/// [`TaskDispatcher`] over broker lists.
#[derive(Clone)]
pub struct RedisDispatcher {
    conn: ConnectionManager,
}

impl RedisDispatcher {
    /// Wrap an established connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub(crate) async fn push(&self, queue: &str, envelope: &TaskEnvelope) -> Result<(), DispatchError> {
        let payload =
            serde_json::to_string(envelope).map_err(|e| DispatchError(e.to_string()))?;
        let mut conn = self.conn.clone();
        let () = conn
            .lpush(queue, payload)
            .await
            .map_err(|e| DispatchError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl TaskDispatcher for RedisDispatcher {
    async fn enqueue(
        &self,
        queue: &str,
        task_name: &str,
        args: Value,
        retry: RetryPolicy,
    ) -> Result<(), DispatchError> {
        let envelope = TaskEnvelope::new(queue, task_name, args, retry);
        self.push(queue, &envelope).await?;
        debug!(queue, task_name, task_id = %envelope.id, "task enqueued");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory [`TaskDispatcher`] retaining every enqueued envelope.
#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    tasks: Mutex<Vec<TaskEnvelope>>,
    fail: Mutex<bool>,
}

impl MemoryDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every enqueued envelope (test helper).
    pub fn enqueued(&self) -> Vec<TaskEnvelope> {
        self.tasks.lock().unwrap().clone()
    }

    /// Make subsequent `enqueue` calls fail (broker-outage double).
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }
}

#[async_trait]
impl TaskDispatcher for MemoryDispatcher {
    async fn enqueue(
        &self,
        queue: &str,
        task_name: &str,
        args: Value,
        retry: RetryPolicy,
    ) -> Result<(), DispatchError> {
        if *self.fail.lock().unwrap() {
            return Err(DispatchError("dispatcher unavailable".into()));
        }
        self.tasks
            .lock()
            .unwrap()
            .push(TaskEnvelope::new(queue, task_name, args, retry));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
