// SPDX-License-Identifier: MIT OR Apache-2.0
//! The agent contract.

use agw_core::{McpPayload, RequestContext};
use agw_error::AgentError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// ActionSpec
// ---------------------------------------------------------------------------

/// One entry in an agent's static action table.
pub struct ActionSpec {
    /// Action name as it appears in the MCP payload.
    pub name: &'static str,
    /// Roles allowed to invoke the action. Empty means any authenticated
    /// principal.
    pub required_roles: &'static [&'static str],
    /// JSON schema of the action's payload, served by `GET /mcp/tools`.
    pub schema: fn() -> schemars::Schema,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// A named, in-process façade grouping related domain actions.
///
/// `execute` runs the generic pre-dispatch and is not meant to be
/// overridden: it rejects unknown actions (400), enforces the action's
/// role list (403) **before** any handler code runs, and then delegates to
/// [`Agent::handle`]. Payload validation happens inside the handler via
/// [`parse_payload`], which accumulates per-field errors (400).
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique registry name (e.g. `"agentos_sales"`).
    fn name(&self) -> &'static str;

    /// The static action table.
    fn actions(&self) -> &'static [ActionSpec];

    /// Execute a validated, authorized action.
    async fn handle(
        &self,
        action: &str,
        data: Map<String, Value>,
        ctx: &RequestContext,
    ) -> Result<Value, AgentError>;

    /// Generic pre-dispatch; see the trait docs.
    async fn execute(&self, payload: McpPayload, ctx: &RequestContext) -> Result<Value, AgentError> {
        let spec = self
            .actions()
            .iter()
            .find(|spec| spec.name == payload.action)
            .ok_or_else(|| AgentError::unsupported_action(&payload.action))?;

        if !spec.required_roles.is_empty() && !ctx.has_any_role(spec.required_roles) {
            return Err(AgentError::forbidden(format!(
                "action '{}' requires one of roles {:?}",
                spec.name, spec.required_roles
            )));
        }

        self.handle(&payload.action, payload.data, ctx).await
    }
}

// ---------------------------------------------------------------------------
// Payload validation
// ---------------------------------------------------------------------------

/// Per-action payload structs implement this to run their field checks
/// after deserialization. The default accepts everything.
pub trait ValidatePayload {
    /// Validate, accumulating every violation.
    fn validate(&self) -> Result<(), Vec<String>> {
        Ok(())
    }
}

/// Deserialize and validate an action payload, mapping both failure modes
/// to `ValidationFailed` with per-field details.
pub fn parse_payload<T>(data: Map<String, Value>) -> Result<T, AgentError>
where
    T: DeserializeOwned + ValidatePayload,
{
    let parsed: T = serde_json::from_value(Value::Object(data))
        .map_err(|e| AgentError::validation_failed(vec![e.to_string()]))?;
    parsed.validate().map_err(AgentError::validation_failed)?;
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
