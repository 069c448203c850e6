// SPDX-License-Identifier: MIT OR Apache-2.0
//! Agents and the agent registry.
//!
//! An [`Agent`] is a named façade grouping related domain actions behind a
//! static action table. The generic pre-dispatch — unknown-action
//! rejection, payload validation, role enforcement — lives in the trait's
//! provided `execute`; agents only implement their handlers. The
//! [`AgentRegistry`] owns the name → agent map, populated once at startup
//! by [`register_all`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod delivery_agent;
pub mod llm_agent;
pub mod people_agent;
pub mod registry;
pub mod sales_agent;
pub mod services;

pub use agent::{parse_payload, ActionSpec, Agent, ValidatePayload};
pub use delivery_agent::DeliveryAgent;
pub use llm_agent::LlmAgent;
pub use people_agent::PeopleAgent;
pub use registry::{register_all, AgentRegistry};
pub use sales_agent::SalesAgent;
pub use services::SharedServices;
