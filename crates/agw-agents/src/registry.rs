// SPDX-License-Identifier: MIT OR Apache-2.0
//! The agent registry.
//!
//! The name → agent map is populated once at startup by [`register_all`]
//! and read-only afterwards — share it behind an `Arc` and lookups are
//! lock-free. Dispatch distinguishes three failure classes: unknown agent
//! (404), an [`AgentError`] raised by the agent (propagated with its
//! status), and a panic in agent code (wrapped as 500 and logged).

use crate::agent::Agent;
use crate::delivery_agent::DeliveryAgent;
use crate::llm_agent::LlmAgent;
use crate::people_agent::PeopleAgent;
use crate::sales_agent::SalesAgent;
use crate::services::SharedServices;
use agw_core::{McpPayload, RequestContext};
use agw_error::AgentError;
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Reserved name no agent may register under.
const RESERVED_NAME: &str = "base";

/// Holds the authoritative name → agent mapping.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own name.
    ///
    /// Empty and reserved names are rejected; re-registering a name logs a
    /// warning and replaces the previous agent.
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<(), AgentError> {
        let name = agent.name();
        if name.is_empty() || name == RESERVED_NAME {
            return Err(AgentError::internal(format!(
                "agent name '{name}' is empty or reserved"
            )));
        }
        if self.agents.contains_key(name) {
            warn!(agent = name, "overwriting agent registration");
        }
        self.agents.insert(name.to_string(), agent);
        info!(agent = name, "agent registered");
        Ok(())
    }

    /// Look up an agent by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.get(name)
    }

    /// Names of every registered agent, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Dispatch an MCP payload to the named agent.
    pub async fn execute(
        &self,
        agent_name: &str,
        payload: McpPayload,
        ctx: &RequestContext,
    ) -> Result<Value, AgentError> {
        let agent = self
            .get(agent_name)
            .ok_or_else(|| AgentError::agent_not_found(agent_name))?;

        if ctx.trace.is_expired() {
            return Err(AgentError::internal("request deadline exceeded"));
        }

        let action = payload.action.clone();
        match AssertUnwindSafe(agent.execute(payload, ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".into());
                error!(
                    agent = agent_name,
                    action = %action,
                    panic = %detail,
                    "agent panicked during execution"
                );
                Err(AgentError::internal("internal error during agent execution"))
            }
        }
    }

    /// Tool listing for `GET /mcp/tools`: every agent with its actions,
    /// role requirements, and payload schemas.
    pub fn tools(&self) -> Value {
        let mut agents: Vec<Value> = Vec::new();
        for name in self.names() {
            let agent = &self.agents[name];
            let actions: Vec<Value> = agent
                .actions()
                .iter()
                .map(|spec| {
                    json!({
                        "name": spec.name,
                        "required_roles": spec.required_roles,
                        "schema": (spec.schema)(),
                    })
                })
                .collect();
            agents.push(json!({"agent": name, "actions": actions}));
        }
        json!({"agents": agents})
    }
}

/// Wire every agent into the registry. Called once at startup — there is
/// no runtime discovery.
pub fn register_all(
    registry: &mut AgentRegistry,
    services: &SharedServices,
) -> Result<(), AgentError> {
    registry.register(Arc::new(SalesAgent::new(services)))?;
    registry.register(Arc::new(DeliveryAgent::new(services)))?;
    registry.register(Arc::new(PeopleAgent::new(services)))?;
    registry.register(Arc::new(LlmAgent::new(services)))?;
    info!(agents = registry.len(), "agent registry populated");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
