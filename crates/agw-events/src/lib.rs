// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event fan-out plane for the agent gateway.
//!
//! Three pieces: a best-effort [`EventPublisher`] onto the broker, a
//! [`Broadcaster`] that pattern-subscribes and demultiplexes events to live
//! subscribers by `{target, target_id}`, and a durable [`TaskDispatcher`]
//! plus [`Worker`] pair for background follow-up work with retry and a
//! dead-letter queue.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod broadcaster;
pub mod dispatcher;
pub mod publisher;
pub mod subscribers;
pub mod worker;

pub use broadcaster::Broadcaster;
pub use dispatcher::{
    DispatchError, MemoryDispatcher, RedisDispatcher, RetryPolicy, TaskDispatcher, TaskEnvelope,
};
pub use publisher::{EventPublisher, MemoryPublisher, RedisPublisher};
pub use subscribers::{Frame, SubscriberHandle, SubscriberRegistry};
pub use worker::{Disposition, TaskHandler, Worker};
