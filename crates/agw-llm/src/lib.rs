// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded LLM-driven action interpretation.
//!
//! The oracle is an opaque text-in / JSON-out seam ([`LlmOracle`]); the
//! [`SemanticExecutor`] turns free-form objectives into `{service, action,
//! params}` payloads and dispatches them against a **static** handler
//! table. Handlers validate their parameters against allow-lists — the
//! oracle is never trusted to widen the permitted surface.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod executor;
pub mod guard;
pub mod oracle;

pub use executor::{Interpretation, ProvisionHandler, SemanticExecutor};
pub use guard::{ComputeCreateGuard, StorageBucketGuard};
pub use oracle::{HttpOracle, LlmOracle, ScriptedOracle};
