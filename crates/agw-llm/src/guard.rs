// SPDX-License-Identifier: MIT OR Apache-2.0
//! Allow-list guards wrapping opaque provider handlers.
//!
//! Every guard validates the interpreted parameters against its own
//! allow-list before delegating to the inner handler. Whatever the oracle
//! inferred, nothing outside these lists reaches the provider.

use crate::executor::ProvisionHandler;
use agw_error::AgentError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Compute
// ---------------------------------------------------------------------------

/// Guard for compute-instance creation.
pub struct ComputeCreateGuard {
    allowed_instance_types: Vec<String>,
    allowed_regions: Vec<String>,
    max_count: u64,
    inner: Arc<dyn ProvisionHandler>,
}

impl ComputeCreateGuard {
    /// Create a guard around `inner` with explicit allow-lists.
    pub fn new(
        allowed_instance_types: impl IntoIterator<Item = impl Into<String>>,
        allowed_regions: impl IntoIterator<Item = impl Into<String>>,
        max_count: u64,
        inner: Arc<dyn ProvisionHandler>,
    ) -> Self {
        Self {
            allowed_instance_types: allowed_instance_types.into_iter().map(Into::into).collect(),
            allowed_regions: allowed_regions.into_iter().map(Into::into).collect(),
            max_count,
            inner,
        }
    }

    fn validate(&self, params: &Value) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match params.get("instance_type").and_then(Value::as_str) {
            None => errors.push("instance_type is required".into()),
            Some(t) if !self.allowed_instance_types.iter().any(|a| a == t) => {
                errors.push(format!("instance_type '{t}' is not allowed"));
            }
            Some(_) => {}
        }

        match params.get("region").and_then(Value::as_str) {
            None => errors.push("region is required".into()),
            Some(r) if !self.allowed_regions.iter().any(|a| a == r) => {
                errors.push(format!("region '{r}' is not allowed"));
            }
            Some(_) => {}
        }

        match params.get("count").and_then(Value::as_u64) {
            None => errors.push("count must be a positive integer".into()),
            Some(0) => errors.push("count must be positive".into()),
            Some(n) if n > self.max_count => {
                errors.push(format!("count {n} exceeds the limit of {}", self.max_count));
            }
            Some(_) => {}
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[async_trait]
impl ProvisionHandler for ComputeCreateGuard {
    async fn run(&self, params: &Value) -> Result<Value, AgentError> {
        self.validate(params).map_err(AgentError::validation_failed)?;
        self.inner.run(params).await
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Guard for storage-bucket creation.
pub struct StorageBucketGuard {
    allowed_regions: Vec<String>,
    inner: Arc<dyn ProvisionHandler>,
}

impl StorageBucketGuard {
    /// Create a guard around `inner`.
    pub fn new(
        allowed_regions: impl IntoIterator<Item = impl Into<String>>,
        inner: Arc<dyn ProvisionHandler>,
    ) -> Self {
        Self {
            allowed_regions: allowed_regions.into_iter().map(Into::into).collect(),
            inner,
        }
    }

    fn validate(&self, params: &Value) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match params.get("bucket_name").and_then(Value::as_str) {
            None => errors.push("bucket_name is required".into()),
            Some(name) if !valid_bucket_name(name) => {
                errors.push(format!("bucket_name '{name}' has an invalid shape"));
            }
            Some(_) => {}
        }

        match params.get("region").and_then(Value::as_str) {
            None => errors.push("region is required".into()),
            Some(r) if !self.allowed_regions.iter().any(|a| a == r) => {
                errors.push(format!("region '{r}' is not allowed"));
            }
            Some(_) => {}
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[async_trait]
impl ProvisionHandler for StorageBucketGuard {
    async fn run(&self, params: &Value) -> Result<Value, AgentError> {
        self.validate(params).map_err(AgentError::validation_failed)?;
        self.inner.run(params).await
    }
}

/// Bucket names: 3–63 chars of lowercase alphanumerics and hyphens,
/// starting and ending alphanumeric.
fn valid_bucket_name(name: &str) -> bool {
    let len = name.len();
    if !(3..=63).contains(&len) {
        return false;
    }
    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    alnum(bytes[0])
        && alnum(bytes[len - 1])
        && bytes.iter().all(|&b| alnum(b) || b == b'-')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use agw_error::ErrorCode;
    use serde_json::json;

    struct AcceptAll;

    #[async_trait]
    impl ProvisionHandler for AcceptAll {
        async fn run(&self, params: &Value) -> Result<Value, AgentError> {
            Ok(json!({"accepted": params}))
        }
    }

    fn compute_guard() -> ComputeCreateGuard {
        ComputeCreateGuard::new(
            ["t3.micro", "t3.small"],
            ["us-east-1", "eu-west-1"],
            5,
            Arc::new(AcceptAll),
        )
    }

    // -- Compute ---------------------------------------------------------

    #[tokio::test]
    async fn compute_passes_allowed_params() {
        let result = compute_guard()
            .run(&json!({"instance_type": "t3.small", "region": "eu-west-1", "count": 2}))
            .await
            .unwrap();
        assert_eq!(result["accepted"]["count"], 2);
    }

    #[tokio::test]
    async fn compute_rejects_disallowed_instance_type() {
        let err = compute_guard()
            .run(&json!({"instance_type": "p5.48xlarge", "region": "us-east-1", "count": 1}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn compute_rejects_excess_count_and_unknown_region_together() {
        let err = compute_guard()
            .run(&json!({"instance_type": "t3.micro", "region": "mars-1", "count": 50}))
            .await
            .unwrap_err();
        let details = err.details.unwrap();
        assert_eq!(details.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn compute_rejects_missing_fields() {
        let err = compute_guard().run(&json!({})).await.unwrap_err();
        assert_eq!(err.details.unwrap().as_array().unwrap().len(), 3);
    }

    // -- Storage ---------------------------------------------------------

    #[tokio::test]
    async fn storage_accepts_valid_bucket() {
        let guard = StorageBucketGuard::new(["us-east-1"], Arc::new(AcceptAll));
        let result = guard
            .run(&json!({"bucket_name": "sales-exports-2026", "region": "us-east-1"}))
            .await
            .unwrap();
        assert_eq!(result["accepted"]["bucket_name"], "sales-exports-2026");
    }

    #[tokio::test]
    async fn storage_rejects_bad_bucket_shapes() {
        let guard = StorageBucketGuard::new(["us-east-1"], Arc::new(AcceptAll));
        let long = "a".repeat(64);
        for name in ["AB", "-leading", "trailing-", "Has.Caps", "x", long.as_str()] {
            let err = guard
                .run(&json!({"bucket_name": name, "region": "us-east-1"}))
                .await
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::ValidationFailed, "{name}");
        }
    }

    #[test]
    fn bucket_name_rules() {
        assert!(valid_bucket_name("abc"));
        assert!(valid_bucket_name("my-bucket-01"));
        assert!(!valid_bucket_name("ab"));
        assert!(!valid_bucket_name("-abc"));
        assert!(!valid_bucket_name("abc-"));
        assert!(!valid_bucket_name("a_b_c"));
        assert!(!valid_bucket_name("ABC"));
    }
}
