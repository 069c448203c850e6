// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audit sink: sanitized action records, never failing the caller.

use agw_core::{sanitize, RequestContext};
use agw_domain::AuditRecord;
use agw_store::AuditStore;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Appends sanitized action records to the audit log.
///
/// A failed append is logged and swallowed — audit trouble must never
/// fail the action that produced the record.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditStore>,
}

impl AuditService {
    /// Create a sink over the given store.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Record the outcome of an action. `params` and `result` are passed
    /// through the sanitizer; duration is measured from the request start.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        ctx: &RequestContext,
        action: &str,
        entity: Option<(&str, &str)>,
        success: bool,
        params: Value,
        result: Option<Value>,
        error: Option<String>,
    ) {
        let now = Utc::now();
        let duration_ms = (now - ctx.trace.started_at).num_milliseconds().max(0) as u64;
        let record = AuditRecord {
            trace_id: ctx.trace.trace_id.clone(),
            at: now,
            actor_id: ctx.agent_id.clone(),
            roles: ctx.roles.iter().cloned().collect(),
            action: action.to_string(),
            entity_type: entity.map(|(t, _)| t.to_string()),
            entity_id: entity.map(|(_, id)| id.to_string()),
            success,
            params: sanitize(&params),
            result: result.map(|r| sanitize(&r)),
            error,
            duration_ms,
        };
        match self.store.append(&record).await {
            Ok(()) => debug!(action, success, "audit record appended"),
            Err(err) => error!(action, error = %err, "failed to append audit record"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use agw_core::{Principal, TraceContext};
    use agw_store::MemoryAuditStore;
    use serde_json::json;

    fn ctx() -> RequestContext {
        RequestContext::authoritative(
            None,
            &Principal::new("agent-1", ["sales_agent"]),
            TraceContext::with_trace_id("trace-1"),
        )
    }

    #[tokio::test]
    async fn record_carries_context_and_sanitizes() {
        let store = Arc::new(MemoryAuditStore::new());
        let audit = AuditService::new(Arc::clone(&store) as Arc<dyn AuditStore>);

        audit
            .record(
                &ctx(),
                "create_sale",
                Some(("sale", "s-1")),
                true,
                json!({"client_id": "c-1", "api_key": "sk-123"}),
                Some(json!({"sale_id": "s-1"})),
                None,
            )
            .await;

        let records = store.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.trace_id, "trace-1");
        assert_eq!(record.actor_id, "agent-1");
        assert_eq!(record.roles, vec!["sales_agent"]);
        assert_eq!(record.entity_type.as_deref(), Some("sale"));
        assert_eq!(record.entity_id.as_deref(), Some("s-1"));
        assert!(record.success);
        assert_eq!(record.params["api_key"], "*** MASKED ***");
        assert_eq!(record.params["client_id"], "c-1");
    }

    #[tokio::test]
    async fn failure_record_keeps_error_message() {
        let store = Arc::new(MemoryAuditStore::new());
        let audit = AuditService::new(Arc::clone(&store) as Arc<dyn AuditStore>);

        audit
            .record(
                &ctx(),
                "create_sale",
                None,
                false,
                json!({}),
                None,
                Some("insufficient stock".into()),
            )
            .await;

        let records = store.records();
        assert!(!records[0].success);
        assert_eq!(records[0].error.as_deref(), Some("insufficient stock"));
        assert!(records[0].result.is_none());
    }
}
