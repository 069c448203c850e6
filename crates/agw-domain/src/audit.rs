// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audit log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One sanitized action record appended to the audit log.
///
/// `params` and `result` must already be passed through the audit
/// sanitizer before a record is constructed; the store layer appends them
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Trace id of the originating request.
    pub trace_id: String,
    /// When the action completed.
    pub at: DateTime<Utc>,
    /// Who performed the action.
    pub actor_id: String,
    /// Roles the actor held at the time.
    pub roles: Vec<String>,
    /// Action verb (e.g. `"create_sale"`).
    pub action: String,
    /// Type of the affected entity, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Id of the affected entity, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Whether the action succeeded.
    pub success: bool,
    /// Sanitized input parameters.
    pub params: Value,
    /// Sanitized result payload, for successful actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message, for failed actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the action in milliseconds.
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serde_roundtrip() {
        let record = AuditRecord {
            trace_id: "t-1".into(),
            at: Utc::now(),
            actor_id: "agent-1".into(),
            roles: vec!["sales_agent".into()],
            action: "create_sale".into(),
            entity_type: Some("sale".into()),
            entity_id: Some("s-1".into()),
            success: true,
            params: json!({"client_id": "c-1"}),
            result: Some(json!({"sale_id": "s-1"})),
            error: None,
            duration_ms: 42,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn failure_record_omits_result() {
        let record = AuditRecord {
            trace_id: "t-2".into(),
            at: Utc::now(),
            actor_id: "agent-1".into(),
            roles: vec![],
            action: "create_sale".into(),
            entity_type: None,
            entity_id: None,
            success: false,
            params: json!({}),
            result: None,
            error: Some("insufficient stock".into()),
            duration_ms: 7,
        };
        let v = serde_json::to_value(&record).unwrap();
        assert!(v.get("result").is_none());
        assert_eq!(v["error"], "insufficient stock");
    }
}
