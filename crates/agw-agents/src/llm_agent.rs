// SPDX-License-Identifier: MIT OR Apache-2.0
//! LLM agent: bounded natural-language action interpretation.

use crate::agent::{parse_payload, ActionSpec, Agent, ValidatePayload};
use crate::services::SharedServices;
use agw_core::RequestContext;
use agw_error::AgentError;
use agw_llm::{ComputeCreateGuard, ProvisionHandler, SemanticExecutor, StorageBucketGuard};
use agw_services::ChatMemoryService;
use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::warn;

/// Registry name of the LLM agent.
pub const LLM_AGENT_NAME: &str = "agentos_llm";

/// Roles allowed to interpret objectives.
const INTERPRET_ROLES: &[&str] = &["admin", "system", "bot"];

/// Instance types the compute handler accepts.
const ALLOWED_INSTANCE_TYPES: &[&str] = &["t3.micro", "t3.small"];

/// Regions the provisioning handlers accept.
const ALLOWED_REGIONS: &[&str] = &["us-east-1", "eu-west-1", "sa-east-1"];

/// Upper bound on instances per request.
const MAX_INSTANCE_COUNT: u64 = 5;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct InterpretPayload {
    /// Natural-language objective to interpret.
    objective: String,
    /// Context handed to the oracle verbatim.
    #[serde(default)]
    context: Option<Value>,
    /// Constraints handed to the oracle verbatim.
    #[serde(default)]
    constraints: Option<Value>,
}

impl ValidatePayload for InterpretPayload {
    fn validate(&self) -> Result<(), Vec<String>> {
        if self.objective.trim().is_empty() {
            Err(vec!["objective must not be empty".into()])
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Default provider seam
// ---------------------------------------------------------------------------

/// Stand-in for the opaque provider SDK: acknowledges a validated request
/// without performing it. Deployments wire a real handler here.
struct AcknowledgingProvider;

#[async_trait]
impl ProvisionHandler for AcknowledgingProvider {
    async fn run(&self, params: &Value) -> Result<Value, AgentError> {
        Ok(json!({"status": "accepted", "request": params}))
    }
}

// ---------------------------------------------------------------------------
// LlmAgent
// ---------------------------------------------------------------------------

const ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "interpret",
        required_roles: INTERPRET_ROLES,
        schema: || schema_for!(InterpretPayload),
    },
    ActionSpec {
        name: "interpret_and_execute",
        required_roles: &["admin"],
        schema: || schema_for!(InterpretPayload),
    },
];

/// Agent interpreting natural-language objectives into guarded actions.
pub struct LlmAgent {
    executor: SemanticExecutor,
    memory: ChatMemoryService,
}

impl LlmAgent {
    /// Build the agent from the shared-services bundle, wiring the static
    /// dispatch table with its allow-list guards.
    pub fn new(services: &SharedServices) -> Self {
        let provider: Arc<dyn ProvisionHandler> = Arc::new(AcknowledgingProvider);
        let executor = SemanticExecutor::new(services.oracle.clone())
            .with_handler(
                "compute",
                "create_instances",
                Arc::new(ComputeCreateGuard::new(
                    ALLOWED_INSTANCE_TYPES.iter().copied(),
                    ALLOWED_REGIONS.iter().copied(),
                    MAX_INSTANCE_COUNT,
                    Arc::clone(&provider),
                )),
            )
            .with_handler(
                "storage",
                "create_bucket",
                Arc::new(StorageBucketGuard::new(
                    ALLOWED_REGIONS.iter().copied(),
                    provider,
                )),
            );
        let memory =
            ChatMemoryService::new(services.chat_messages.clone(), services.cache.clone());
        Self { executor, memory }
    }

    /// Keep the session transcript when the request carries a session id;
    /// memory trouble never fails the interpretation.
    async fn remember(&self, ctx: &RequestContext, role: &str, content: &str) {
        if let Some(chat_id) = &ctx.session_id {
            if let Err(err) = self
                .memory
                .append(chat_id, Some(&ctx.user_id), role, content)
                .await
            {
                warn!(chat_id, error = %err, "failed to persist chat message");
            }
        }
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &'static str {
        LLM_AGENT_NAME
    }

    fn actions(&self) -> &'static [ActionSpec] {
        ACTIONS
    }

    async fn handle(
        &self,
        action: &str,
        data: Map<String, Value>,
        ctx: &RequestContext,
    ) -> Result<Value, AgentError> {
        match action {
            "interpret" => {
                let payload: InterpretPayload = parse_payload(data)?;
                self.remember(ctx, "user", &payload.objective).await;
                let interpretation = self
                    .executor
                    .interpret(
                        &payload.objective,
                        payload.context.as_ref(),
                        payload.constraints.as_ref(),
                    )
                    .await?;
                let result = json!({
                    "service": interpretation.service,
                    "action": interpretation.action,
                    "params": interpretation.params,
                });
                self.remember(ctx, "assistant", &result.to_string()).await;
                Ok(result)
            }
            "interpret_and_execute" => {
                let payload: InterpretPayload = parse_payload(data)?;
                self.remember(ctx, "user", &payload.objective).await;
                let interpretation = self
                    .executor
                    .interpret(
                        &payload.objective,
                        payload.context.as_ref(),
                        payload.constraints.as_ref(),
                    )
                    .await?;
                let outcome = self.executor.execute(&interpretation).await?;
                self.remember(ctx, "assistant", &outcome.to_string()).await;
                Ok(outcome)
            }
            other => Err(AgentError::unsupported_action(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use agw_core::{CallerContext, McpPayload, Principal, TraceContext};
    use agw_error::ErrorCode;
    use agw_llm::ScriptedOracle;

    fn services_with_reply(reply: &str) -> SharedServices {
        SharedServices::in_memory().with_oracle(Arc::new(ScriptedOracle::new([reply])))
    }

    fn ctx(roles: &[&str]) -> RequestContext {
        RequestContext::authoritative(
            None,
            &Principal::new("U1", roles.iter().copied()),
            TraceContext::with_trace_id("t"),
        )
    }

    fn interpret_payload() -> McpPayload {
        McpPayload::new("interpret", json!({"objective": "two small servers in ireland"}))
    }

    #[tokio::test]
    async fn interpret_returns_structured_payload() {
        let services = services_with_reply(
            r#"{"service": "compute", "action": "create_instances", "params": {"count": 2, "instance_type": "t3.small", "region": "eu-west-1"}}"#,
        );
        let agent = LlmAgent::new(&services);
        let result = agent.execute(interpret_payload(), &ctx(&["admin"])).await.unwrap();
        assert_eq!(result["service"], "compute");
        assert_eq!(result["params"]["count"], 2);
    }

    #[tokio::test]
    async fn interpret_requires_role() {
        let services = services_with_reply("{}");
        let agent = LlmAgent::new(&services);
        let err = agent
            .execute(interpret_payload(), &ctx(&["sales_agent"]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn execute_path_enforces_allow_lists() {
        let services = services_with_reply(
            r#"{"service": "compute", "action": "create_instances", "params": {"count": 2, "instance_type": "p5.48xlarge", "region": "eu-west-1"}}"#,
        );
        let agent = LlmAgent::new(&services);
        let err = agent
            .execute(
                McpPayload::new(
                    "interpret_and_execute",
                    json!({"objective": "a monster gpu box"}),
                ),
                &ctx(&["admin"]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn execute_path_runs_allowed_requests() {
        let services = services_with_reply(
            r#"{"service": "storage", "action": "create_bucket", "params": {"bucket_name": "exports-2026", "region": "us-east-1"}}"#,
        );
        let agent = LlmAgent::new(&services);
        let result = agent
            .execute(
                McpPayload::new("interpret_and_execute", json!({"objective": "a bucket"})),
                &ctx(&["admin"]),
            )
            .await
            .unwrap();
        assert_eq!(result["result"]["status"], "accepted");
    }

    #[tokio::test]
    async fn unsupported_interpreted_pair_rejected() {
        let services = services_with_reply(
            r#"{"service": "dns", "action": "create_zone", "params": {}}"#,
        );
        let agent = LlmAgent::new(&services);
        let err = agent
            .execute(
                McpPayload::new("interpret_and_execute", json!({"objective": "a dns zone"})),
                &ctx(&["admin"]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedAction);
    }

    #[tokio::test]
    async fn session_transcript_recorded_in_memory() {
        let services = services_with_reply(
            r#"{"service": "compute", "action": "create_instances", "params": {}}"#,
        );
        let memory = ChatMemoryService::new(services.chat_messages.clone(), services.cache.clone());
        let agent = LlmAgent::new(&services);

        let caller = CallerContext {
            session_id: Some("chat-7".into()),
            ..Default::default()
        };
        let ctx = RequestContext::authoritative(
            Some(caller),
            &Principal::new("U1", ["admin"]),
            TraceContext::with_trace_id("t"),
        );
        agent.execute(interpret_payload(), &ctx).await.unwrap();

        let transcript = memory.recent("chat-7", 10).await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].role, "user");
        assert_eq!(transcript[0].role, "assistant");
    }

    #[tokio::test]
    async fn empty_objective_rejected() {
        let services = services_with_reply("{}");
        let agent = LlmAgent::new(&services);
        let err = agent
            .execute(
                McpPayload::new("interpret", json!({"objective": "  "})),
                &ctx(&["admin"]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }
}
