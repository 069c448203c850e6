// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack: trace ids and keyed rate limiting.

use crate::AppState;
use agw_config::RateLimitSpec;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use uuid::Uuid;

/// Header carrying the request correlation id.
pub const TRACE_HEADER: &str = "x-trace-id";

// ---------------------------------------------------------------------------
// Trace id
// ---------------------------------------------------------------------------

/// The request's trace id, available as an Axum extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

/// Extract the caller-supplied `X-Trace-ID` or mint a uuid v4; the id is
/// attached as an extension and echoed on every response.
pub async fn trace_id_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(TraceId(trace_id.clone()));
    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        resp.headers_mut().insert(TRACE_HEADER, value);
    }
    resp
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

/// Build the CORS layer from the configured origin allow-list.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list(vec![Method::GET, Method::POST]))
        .allow_headers(AllowHeaders::list(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-trace-id"),
            HeaderName::from_static("x-csrf-token"),
        ]))
}

// ---------------------------------------------------------------------------
// Keyed rate limiter
// ---------------------------------------------------------------------------

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket per caller address.
pub struct KeyedRateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    capacity: f64,
    refill_per_sec: f64,
}

impl KeyedRateLimiter {
    /// Create a limiter from the configured spec (e.g. 500/minute).
    pub fn new(spec: RateLimitSpec) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity: f64::from(spec.max_requests),
            refill_per_sec: f64::from(spec.max_requests) / spec.window_secs as f64,
        }
    }

    /// Take one token for `key`. Returns `false` when the bucket is empty.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            refilled_at: now,
        });

        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Identify the caller: proxy header first, then the socket address.
fn caller_key(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reject callers whose bucket is exhausted with 429.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let key = caller_key(&req);
    if !state.rate_limiter.check(&key) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(json!({"error": {"code": "RATE_LIMITED", "message": "too many requests"}})),
        )
            .into_response();
    }
    next.run(req).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(max: u32, secs: u64) -> RateLimitSpec {
        RateLimitSpec {
            max_requests: max,
            window_secs: secs,
        }
    }

    #[test]
    fn limiter_admits_up_to_capacity() {
        let limiter = KeyedRateLimiter::new(spec(3, 60));
        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(!limiter.check("1.2.3.4"));
    }

    #[test]
    fn limiter_keys_are_independent() {
        let limiter = KeyedRateLimiter::new(spec(1, 60));
        assert!(limiter.check("1.2.3.4"));
        assert!(!limiter.check("1.2.3.4"));
        assert!(limiter.check("5.6.7.8"));
    }

    #[test]
    fn limiter_refills_over_time() {
        // 1000 requests per second refills fast enough to observe.
        let limiter = KeyedRateLimiter::new(spec(1000, 1));
        for _ in 0..1000 {
            assert!(limiter.check("k"));
        }
        assert!(!limiter.check("k"));
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(limiter.check("k"));
    }
}
