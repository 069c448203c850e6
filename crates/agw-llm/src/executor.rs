// SPDX-License-Identifier: MIT OR Apache-2.0
//! Semantic executor: objective → structured payload → guarded dispatch.

use crate::oracle::LlmOracle;
use agw_error::AgentError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

/// The structured payload an objective interprets to.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    /// Target service (e.g. `"compute"`).
    pub service: String,
    /// Action on that service (e.g. `"create_instances"`).
    pub action: String,
    /// Inferred parameters.
    pub params: Value,
}

// ---------------------------------------------------------------------------
// ProvisionHandler
// ---------------------------------------------------------------------------

/// One `(service, action)` execution target. Implementations own their
/// parameter validation; the provider SDK behind them is opaque.
#[async_trait]
pub trait ProvisionHandler: Send + Sync {
    /// Execute the action with the given params.
    async fn run(&self, params: &Value) -> Result<Value, AgentError>;
}

// ---------------------------------------------------------------------------
// SemanticExecutor
// ---------------------------------------------------------------------------

/// Interprets objectives through the oracle and dispatches the result
/// against a static `(service, action)` table.
pub struct SemanticExecutor {
    oracle: Arc<dyn LlmOracle>,
    handlers: HashMap<(String, String), Arc<dyn ProvisionHandler>>,
}

impl SemanticExecutor {
    /// Create an executor with an empty dispatch table.
    pub fn new(oracle: Arc<dyn LlmOracle>) -> Self {
        Self {
            oracle,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for `(service, action)`. The table is fixed
    /// before the executor is shared; adding a capability is an explicit,
    /// reviewable change.
    pub fn with_handler(
        mut self,
        service: &str,
        action: &str,
        handler: Arc<dyn ProvisionHandler>,
    ) -> Self {
        self.handlers
            .insert((service.to_lowercase(), action.to_lowercase()), handler);
        self
    }

    /// Registered `(service, action)` pairs, sorted.
    pub fn supported_actions(&self) -> Vec<(String, String)> {
        let mut out: Vec<_> = self.handlers.keys().cloned().collect();
        out.sort();
        out
    }

    /// Interpret an objective into a structured payload. Does not execute.
    pub async fn interpret(
        &self,
        objective: &str,
        context: Option<&Value>,
        constraints: Option<&Value>,
    ) -> Result<Interpretation, AgentError> {
        let prompt = build_prompt(objective, context, constraints);
        let raw = self.oracle.complete(&prompt).await?;
        let parsed = parse_reply(&raw)?;

        let service = require_string(&parsed, "service")?;
        let action = require_string(&parsed, "action")?;
        let params = parsed.get("params").cloned().unwrap_or_else(|| json!({}));

        info!(service = %service, action = %action, "objective interpreted");
        Ok(Interpretation {
            service,
            action,
            params,
        })
    }

    /// Execute an interpreted payload through the dispatch table.
    pub async fn execute(&self, interpretation: &Interpretation) -> Result<Value, AgentError> {
        let key = (
            interpretation.service.to_lowercase(),
            interpretation.action.to_lowercase(),
        );
        let handler = self.handlers.get(&key).ok_or_else(|| {
            warn!(service = %key.0, action = %key.1, "no handler for interpreted action");
            AgentError::unsupported_action(&format!("{}.{}", key.0, key.1))
        })?;
        let result = handler.run(&interpretation.params).await?;
        Ok(json!({
            "service": key.0,
            "action": key.1,
            "result": result,
        }))
    }
}

// ---------------------------------------------------------------------------
// Prompt and parsing
// ---------------------------------------------------------------------------

fn build_prompt(objective: &str, context: Option<&Value>, constraints: Option<&Value>) -> String {
    let context = context.cloned().unwrap_or_else(|| json!({}));
    let constraints = constraints.cloned().unwrap_or_else(|| json!({}));
    format!(
        "Your task is to interpret a user's objective, given some context and \
constraints, and translate it into a precise, executable payload.\n\n\
User Objective:\n{objective}\n\n\
Current Context:\n{context}\n\n\
Operational Constraints:\n{constraints}\n\n\
Required Output Format:\n\
- Respond ONLY with a single, valid JSON object.\n\
- Do NOT include explanations or any text outside the JSON structure.\n\
- The JSON object MUST contain 'service' and 'action' string keys.\n\
- Include a 'params' key with every parameter derived from the objective, \
context, and constraints.\n"
    )
}

/// Parse the oracle's reply: strip markdown fences, require a JSON object.
fn parse_reply(raw: &str) -> Result<Value, AgentError> {
    let cleaned = strip_code_fences(raw);
    let parsed: Value = serde_json::from_str(cleaned).map_err(|e| {
        AgentError::validation_failed(vec![format!("oracle reply is not valid JSON: {e}")])
            .with_details(json!({"raw": truncate(raw, 200)}))
    })?;
    if !parsed.is_object() {
        return Err(
            AgentError::validation_failed(vec!["oracle reply is not a JSON object".into()])
                .with_details(json!({"raw": truncate(raw, 200)})),
        );
    }
    Ok(parsed)
}

fn require_string(parsed: &Value, key: &str) -> Result<String, AgentError> {
    parsed
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AgentError::validation_failed(vec![format!("oracle reply missing '{key}' key")])
        })
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence line (which may carry a language tag) and the
    // closing fence.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
