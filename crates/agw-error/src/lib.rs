//! Unified error taxonomy with stable error codes for the agent gateway.
//!
//! Every gateway error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag) that maps onto exactly one HTTP status. Services raise typed
//! domain errors, agents translate them into [`AgentError`]s, and the
//! gateway renders the `AgentError` into the transport response. Internal
//! details never leak past the [`AgentError::message`] the agent chose.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Envelope / request-shape errors caught by the gateway.
    Envelope,
    /// Authentication and authorization failures.
    Auth,
    /// Agent lookup and dispatch errors.
    Dispatch,
    /// Domain-rule violations raised by services.
    Domain,
    /// Failures of upstream oracles or providers.
    Upstream,
    /// Failures of the store, broker, or cache.
    Dependency,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Envelope => "envelope",
            Self::Auth => "auth",
            Self::Dispatch => "dispatch",
            Self::Domain => "domain",
            Self::Upstream => "upstream",
            Self::Dependency => "dependency",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases, and maps onto exactly
/// one HTTP status via [`ErrorCode::http_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The request envelope failed schema validation.
    EnvelopeInvalid,
    /// Credentials are missing or invalid.
    Unauthenticated,
    /// The caller's roles do not permit the action.
    Forbidden,
    /// The named agent is not registered.
    AgentNotFound,
    /// The agent does not implement the requested action.
    UnsupportedAction,
    /// The action payload failed per-field validation.
    ValidationFailed,
    /// A referenced entity (profile, sale, product, delivery) does not exist.
    EntityNotFound,
    /// The request conflicts with current state (duplicate, insufficient
    /// stock, invalid transition).
    Conflict,
    /// An upstream oracle or provider is unreachable or misbehaving.
    UpstreamUnavailable,
    /// The store, broker, or cache is unavailable.
    DependencyUnavailable,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EnvelopeInvalid => ErrorCategory::Envelope,

            Self::Unauthenticated | Self::Forbidden => ErrorCategory::Auth,

            Self::AgentNotFound | Self::UnsupportedAction | Self::ValidationFailed => {
                ErrorCategory::Dispatch
            }

            Self::EntityNotFound | Self::Conflict => ErrorCategory::Domain,

            Self::UpstreamUnavailable => ErrorCategory::Upstream,

            Self::DependencyUnavailable => ErrorCategory::Dependency,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// The HTTP status this code surfaces as.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::EnvelopeInvalid => 422,
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::AgentNotFound | Self::EntityNotFound => 404,
            Self::UnsupportedAction | Self::ValidationFailed => 400,
            Self::Conflict => 409,
            Self::UpstreamUnavailable => 502,
            Self::DependencyUnavailable => 503,
            Self::Internal => 500,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"ENVELOPE_INVALID"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnvelopeInvalid => "ENVELOPE_INVALID",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::AgentNotFound => "AGENT_NOT_FOUND",
            Self::UnsupportedAction => "UNSUPPORTED_ACTION",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::EntityNotFound => "ENTITY_NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::DependencyUnavailable => "DEPENDENCY_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AgentError
// ---------------------------------------------------------------------------

/// The error type agents raise and the gateway renders.
///
/// Carries a stable [`ErrorCode`], a human-readable message safe to surface
/// to callers, and optional structured details (validation errors, conflict
/// context, and the like).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description, safe to return to the caller.
    pub message: String,
    /// Optional structured detail (e.g. per-field validation errors).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AgentError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details to this error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Shorthand for `self.code.http_status()`.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    // -- Convenience constructors for the common codes -----------------------

    /// 422 — the request envelope is malformed.
    pub fn envelope_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EnvelopeInvalid, message)
    }

    /// 401 — credentials missing or invalid.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    /// 403 — the caller's roles do not permit the action.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// 404 — the named agent is not registered.
    pub fn agent_not_found(name: &str) -> Self {
        Self::new(ErrorCode::AgentNotFound, format!("agent '{name}' not found"))
    }

    /// 400 — the agent does not implement the requested action.
    pub fn unsupported_action(action: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedAction,
            format!("unsupported action: {action}"),
        )
    }

    /// 400 — payload validation failed; `errors` lists per-field messages.
    pub fn validation_failed(errors: Vec<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, "payload validation failed")
            .with_details(serde_json::json!(errors))
    }

    /// 404 — a referenced entity does not exist.
    pub fn entity_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, message)
    }

    /// 409 — the request conflicts with current state.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// 502 — an upstream oracle or provider failed.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }

    /// 503 — the store, broker, or cache is unavailable.
    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DependencyUnavailable, message)
    }

    /// 500 — unexpected internal error. The message should be generic; the
    /// underlying cause belongs in the log, not the response.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AgentError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// All error codes for exhaustive iteration in tests.
    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::EnvelopeInvalid,
        ErrorCode::Unauthenticated,
        ErrorCode::Forbidden,
        ErrorCode::AgentNotFound,
        ErrorCode::UnsupportedAction,
        ErrorCode::ValidationFailed,
        ErrorCode::EntityNotFound,
        ErrorCode::Conflict,
        ErrorCode::UpstreamUnavailable,
        ErrorCode::DependencyUnavailable,
        ErrorCode::Internal,
    ];

    // -- Status mapping --------------------------------------------------

    #[test]
    fn status_table_matches_contract() {
        assert_eq!(ErrorCode::EnvelopeInvalid.http_status(), 422);
        assert_eq!(ErrorCode::Unauthenticated.http_status(), 401);
        assert_eq!(ErrorCode::Forbidden.http_status(), 403);
        assert_eq!(ErrorCode::AgentNotFound.http_status(), 404);
        assert_eq!(ErrorCode::UnsupportedAction.http_status(), 400);
        assert_eq!(ErrorCode::ValidationFailed.http_status(), 400);
        assert_eq!(ErrorCode::EntityNotFound.http_status(), 404);
        assert_eq!(ErrorCode::Conflict.http_status(), 409);
        assert_eq!(ErrorCode::UpstreamUnavailable.http_status(), 502);
        assert_eq!(ErrorCode::DependencyUnavailable.http_status(), 503);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn every_status_is_an_error_status() {
        for code in ALL_CODES {
            let status = code.http_status();
            assert!((400..=599).contains(&status), "{code} -> {status}");
        }
    }

    // -- Categorisation --------------------------------------------------

    #[test]
    fn codes_categorised() {
        assert_eq!(ErrorCode::EnvelopeInvalid.category(), ErrorCategory::Envelope);
        assert_eq!(ErrorCode::Unauthenticated.category(), ErrorCategory::Auth);
        assert_eq!(ErrorCode::Forbidden.category(), ErrorCategory::Auth);
        assert_eq!(ErrorCode::AgentNotFound.category(), ErrorCategory::Dispatch);
        assert_eq!(ErrorCode::Conflict.category(), ErrorCategory::Domain);
        assert_eq!(ErrorCode::EntityNotFound.category(), ErrorCategory::Domain);
        assert_eq!(
            ErrorCode::DependencyUnavailable.category(),
            ErrorCategory::Dependency
        );
        assert_eq!(ErrorCode::Internal.category(), ErrorCategory::Internal);
    }

    // -- String representations ------------------------------------------

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()), "duplicate: {}", code.as_str());
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_serialize_to_as_str() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            assert_eq!(json, format!(r#""{}""#, code.as_str()));
        }
    }

    #[test]
    fn code_serde_roundtrip() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, *code);
        }
    }

    // -- AgentError ------------------------------------------------------

    #[test]
    fn display_includes_code_and_message() {
        let err = AgentError::conflict("duplicate sale");
        assert_eq!(err.to_string(), "[CONFLICT] duplicate sale");
    }

    #[test]
    fn validation_failed_carries_field_errors() {
        let err = AgentError::validation_failed(vec![
            "items must not be empty".into(),
            "currency must be a 3-letter code".into(),
        ]);
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        let details = err.details.unwrap();
        assert_eq!(details.as_array().unwrap().len(), 2);
    }

    #[test]
    fn with_details_round_trips_through_json() {
        let err = AgentError::conflict("insufficient stock")
            .with_details(serde_json::json!({"sku": "SKU-1", "requested": 20, "available": 10}));
        let json = serde_json::to_string(&err).unwrap();
        let back: AgentError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
        assert_eq!(back.details.unwrap()["sku"], "SKU-1");
    }

    #[test]
    fn details_omitted_when_absent() {
        let err = AgentError::agent_not_found("ghost");
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("details").is_none());
    }

    #[test]
    fn convenience_constructors_pick_expected_codes() {
        assert_eq!(AgentError::envelope_invalid("x").code, ErrorCode::EnvelopeInvalid);
        assert_eq!(AgentError::unauthenticated("x").code, ErrorCode::Unauthenticated);
        assert_eq!(AgentError::forbidden("x").code, ErrorCode::Forbidden);
        assert_eq!(AgentError::agent_not_found("x").code, ErrorCode::AgentNotFound);
        assert_eq!(AgentError::unsupported_action("x").code, ErrorCode::UnsupportedAction);
        assert_eq!(AgentError::entity_not_found("x").code, ErrorCode::EntityNotFound);
        assert_eq!(AgentError::conflict("x").code, ErrorCode::Conflict);
        assert_eq!(AgentError::upstream("x").code, ErrorCode::UpstreamUnavailable);
        assert_eq!(AgentError::dependency("x").code, ErrorCode::DependencyUnavailable);
        assert_eq!(AgentError::internal("x").code, ErrorCode::Internal);
    }

    #[test]
    fn http_status_shorthand() {
        assert_eq!(AgentError::forbidden("no").http_status(), 403);
    }
}
