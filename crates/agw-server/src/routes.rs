// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route handlers for the MCP gateway.

use crate::auth::{authenticate, check_csrf};
use crate::middleware::TraceId;
use crate::AppState;
use agw_core::{McpPayload, McpRequest, McpResponse, Principal, RequestContext, TraceContext};
use agw_error::AgentError;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

// ---------------------------------------------------------------------------
// Error rendering
// ---------------------------------------------------------------------------

/// A pre-dispatch failure (auth, envelope, CSRF): rendered as a bare error
/// object, since no agent/action pair exists yet.
pub struct GatewayRejection(pub AgentError);

impl IntoResponse for GatewayRejection {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": {
                "code": self.0.code,
                "message": self.0.message,
                "details": self.0.details,
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<AgentError> for GatewayRejection {
    fn from(err: AgentError) -> Self {
        Self(err)
    }
}

/// Render an agent execution failure as the MCP error envelope.
fn failure_response(agent: &str, action: &str, err: &AgentError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(McpResponse::failure(agent, action, err))).into_response()
}

// ---------------------------------------------------------------------------
// MCP execution
// ---------------------------------------------------------------------------

fn build_context(
    principal: &Principal,
    caller: Option<agw_core::CallerContext>,
    trace_id: &str,
) -> RequestContext {
    RequestContext::authoritative(caller, principal, TraceContext::with_trace_id(trace_id))
}

/// `POST /api/v1/mcp/exec` — execute a full MCP envelope.
pub async fn mcp_exec(
    State(state): State<AppState>,
    Extension(TraceId(trace_id)): Extension<TraceId>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, GatewayRejection> {
    let principal = authenticate(&headers, &state.secret_key)?;

    // Schema-validate the envelope; unknown top-level fields are rejected.
    let request: McpRequest = serde_json::from_value(body)
        .map_err(|e| AgentError::envelope_invalid(format!("invalid MCP envelope: {e}")))?;

    let ctx = build_context(&principal, request.context.clone(), &trace_id);
    info!(
        agent = %request.agent_name,
        action = %request.payload.action,
        caller = %principal.id,
        "mcp execution request"
    );

    let agent = request.agent_name;
    let action = request.payload.action.clone();
    match state.registry.execute(&agent, request.payload, &ctx).await {
        Ok(result) => Ok(Json(McpResponse::success(agent, action, result)).into_response()),
        Err(err) => Ok(failure_response(&agent, &action, &err)),
    }
}

/// Body of `POST /api/v1/mcp/execute`: flat tool invocation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedInvocation {
    /// Tool name as `<agent>.<action>` (e.g. `"agentos_sales.create_sale"`).
    pub tool_name: String,
    /// Parameters forwarded as the action payload.
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
}

/// `POST /api/v1/mcp/execute` — browser-facing flat invocation with the
/// CSRF double-submit check.
pub async fn mcp_execute(
    State(state): State<AppState>,
    Extension(TraceId(trace_id)): Extension<TraceId>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, GatewayRejection> {
    let principal = authenticate(&headers, &state.secret_key)?;
    check_csrf(&headers)?;

    let invocation: NamedInvocation = serde_json::from_value(body)
        .map_err(|e| AgentError::envelope_invalid(format!("invalid invocation: {e}")))?;
    let (agent, action) = invocation
        .tool_name
        .split_once('.')
        .ok_or_else(|| AgentError::envelope_invalid("tool_name must be '<agent>.<action>'"))?;

    let ctx = build_context(&principal, None, &trace_id);
    let payload = McpPayload {
        action: action.to_string(),
        data: invocation.parameters,
    };
    match state.registry.execute(agent, payload, &ctx).await {
        Ok(result) => Ok(Json(McpResponse::success(agent, action, result)).into_response()),
        Err(err) => Ok(failure_response(agent, action, &err)),
    }
}

/// `GET /api/v1/mcp/tools` — agents, actions, role requirements, schemas.
pub async fn mcp_tools(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayRejection> {
    authenticate(&headers, &state.secret_key)?;
    let mut tools = state.registry.tools();
    // Flat names for clients that invoke via /mcp/execute.
    let names: Vec<String> = tools["agents"]
        .as_array()
        .map(|agents| {
            agents
                .iter()
                .flat_map(|agent| {
                    let agent_name = agent["agent"].as_str().unwrap_or_default().to_string();
                    agent["actions"]
                        .as_array()
                        .cloned()
                        .unwrap_or_default()
                        .into_iter()
                        .map(move |action| {
                            format!("{agent_name}.{}", action["name"].as_str().unwrap_or_default())
                        })
                })
                .collect()
        })
        .unwrap_or_default();
    tools["names"] = json!(names);
    Ok(Json(tools))
}

// ---------------------------------------------------------------------------
// Health / status
// ---------------------------------------------------------------------------

/// `GET /health`.
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// `GET /status` — project info plus dependency liveness.
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let db_status = if state.health.store_ok().await {
        "connected"
    } else {
        "error"
    };
    let redis_status = if state.health.cache_ok().await {
        "connected"
    } else {
        "error"
    };
    Json(json!({
        "project": "agent-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "db_status": db_status,
        "redis_status": redis_status,
        "registered_tools_count": state.registry.len(),
    }))
}
