// SPDX-License-Identifier: MIT OR Apache-2.0
//! Caller identity and per-request correlation context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// The authenticated caller: id plus role set. Immutable per request and
/// authoritative for every authorization decision downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier of the caller (token `sub`).
    pub id: String,
    /// Roles granted to the caller (deterministic ordering).
    pub roles: BTreeSet<String>,
}

impl Principal {
    /// Create a principal from an id and an iterator of roles.
    pub fn new(id: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if the principal holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

// ---------------------------------------------------------------------------
// TraceContext
// ---------------------------------------------------------------------------

/// Per-request correlation object, propagated through every call and
/// attached to every emitted log, event, and audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Correlation id: caller-supplied or a minted uuid v4.
    pub trace_id: String,
    /// Instant the gateway accepted the request.
    pub started_at: DateTime<Utc>,
    /// Optional deadline after which in-flight work should abort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl TraceContext {
    /// Mint a fresh context with a new uuid v4 trace id.
    pub fn new() -> Self {
        Self::with_trace_id(Uuid::new_v4().to_string())
    }

    /// Build a context around a caller-supplied trace id.
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            started_at: Utc::now(),
            deadline: None,
        }
    }

    /// Attach a deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether the deadline (if any) has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// Whether the deadline (if any) has passed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// CallerContext
// ---------------------------------------------------------------------------

/// Advisory context supplied by the caller inside the MCP envelope.
///
/// Every field here is a suggestion. The gateway overwrites `agent_id`,
/// `user_id`, `roles`, and `trace_id` from the authenticated [`Principal`]
/// before anything downstream sees them; only `session_id` survives the
/// merge untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallerContext {
    /// Suggested trace id (honored only when the header carries none).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Claimed user id — always replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Claimed agent id — always replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Claimed roles — always replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// Session identifier (chat id or similar), passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

// ---------------------------------------------------------------------------
// RequestContext
// ---------------------------------------------------------------------------

/// The authoritative execution context handed to agents.
///
/// Built by the gateway from the caller-supplied [`CallerContext`] merged
/// under the authenticated [`Principal`]: the identity fields always come
/// from the principal, never from the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Id of the authenticated caller performing the action.
    pub agent_id: String,
    /// Id of the user the action is performed for (the caller itself,
    /// unless impersonation is layered on upstream).
    pub user_id: String,
    /// Authoritative role set from the principal.
    pub roles: BTreeSet<String>,
    /// Session identifier carried over from the caller context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Correlation context.
    pub trace: TraceContext,
}

impl RequestContext {
    /// Merge the caller-supplied context under the principal.
    ///
    /// `agent_id`, `user_id`, and `roles` are taken from the principal
    /// unconditionally; callers cannot spoof them.
    pub fn authoritative(
        caller: Option<CallerContext>,
        principal: &Principal,
        trace: TraceContext,
    ) -> Self {
        let session_id = caller.and_then(|c| c.session_id);
        Self {
            agent_id: principal.id.clone(),
            user_id: principal.id.clone(),
            roles: principal.roles.clone(),
            session_id,
            trace,
        }
    }

    /// Returns `true` if the context carries `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns `true` if the context carries at least one of `allowed`.
    pub fn has_any_role(&self, allowed: &[&str]) -> bool {
        allowed.iter().any(|r| self.roles.contains(*r))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
