// SPDX-License-Identifier: MIT OR Apache-2.0
//! Machine Command Protocol (MCP) request and response envelopes.

use crate::context::CallerContext;
use agw_error::AgentError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Request envelope
// ---------------------------------------------------------------------------

/// The `{action, data}` payload routed to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpPayload {
    /// Name of the action the agent should perform (e.g. `"create_sale"`).
    pub action: String,
    /// Action parameters, validated against the action's payload schema by
    /// the agent.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl McpPayload {
    /// Build a payload from an action name and a JSON object.
    ///
    /// Non-object `data` values are treated as empty — agents validate the
    /// individual fields anyway.
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            action: action.into(),
            data,
        }
    }
}

/// The full MCP request envelope accepted by `POST /mcp/exec`.
///
/// Unknown top-level fields are rejected at deserialization time so typos
/// (`"agnet_name"`) surface as 422 rather than silently routing nowhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct McpRequest {
    /// Registered name of the target agent (e.g. `"agentos_sales"`).
    pub agent_name: String,
    /// Action payload.
    pub payload: McpPayload,
    /// Advisory caller context; authoritative fields are overwritten by the
    /// gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<CallerContext>,
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Outcome discriminator of an [`McpResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The action executed and `result` is populated.
    Success,
    /// The action failed and `error` / `error_details` are populated.
    Error,
}

/// Uniform response envelope for every MCP execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpResponse {
    /// Outcome of the execution.
    pub status: ResponseStatus,
    /// Name of the agent that handled (or would have handled) the request.
    pub agent: String,
    /// Action that was requested.
    pub action: String,
    /// Payload returned by the agent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Concise error message when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured error detail (validation errors, conflict context).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,
}

impl McpResponse {
    /// Build a success response wrapping the agent's result payload.
    pub fn success(agent: impl Into<String>, action: impl Into<String>, result: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            agent: agent.into(),
            action: action.into(),
            result: Some(result),
            error: None,
            error_details: None,
        }
    }

    /// Build an error response from an [`AgentError`].
    pub fn failure(agent: impl Into<String>, action: impl Into<String>, err: &AgentError) -> Self {
        Self {
            status: ResponseStatus::Error,
            agent: agent.into(),
            action: action.into(),
            result: None,
            error: Some(err.message.clone()),
            error_details: err.details.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
