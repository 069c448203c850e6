// SPDX-License-Identifier: MIT OR Apache-2.0
//! Core protocol types for the agent gateway.
//!
//! This crate defines the Machine Command Protocol (MCP) envelopes, the
//! authenticated [`Principal`], the per-request [`TraceContext`], the
//! authoritative [`RequestContext`] handed to agents, the [`EventEnvelope`]
//! flowing through the fan-out plane, and the audit [`sanitize`]r.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod event;
pub mod protocol;
pub mod sanitize;

pub use context::{CallerContext, Principal, RequestContext, TraceContext};
pub use event::{channels, EventEnvelope, EventTarget};
pub use protocol::{McpPayload, McpRequest, McpResponse, ResponseStatus};
pub use sanitize::sanitize;
