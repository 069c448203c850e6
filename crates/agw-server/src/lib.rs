// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP/WS surface of the agent gateway.
//!
//! One externally-reachable operation — MCP execution — plus the tool
//! listing, health endpoints, and the WebSocket event stream. Cross-cutting
//! concerns (trace ids, rate limiting, CSRF, CORS) are middleware; the
//! per-request ordering is fixed: trace id, authentication, envelope
//! validation, context enrichment, dispatch.

#![deny(unsafe_code)]

pub mod auth;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod tasks;
pub mod ws;

use agw_agents::{AgentRegistry, SharedServices};
use agw_config::RateLimitSpec;
use agw_events::SubscriberRegistry;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use health::DependencyHealth;
use middleware::KeyedRateLimiter;
use std::sync::Arc;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    /// The agent registry, populated once at startup.
    pub registry: Arc<AgentRegistry>,
    /// The shared-services bundle (used for status checks and tests).
    pub services: SharedServices,
    /// Live WebSocket subscribers.
    pub subscribers: Arc<SubscriberRegistry>,
    /// Token-signing secret.
    pub secret_key: String,
    /// Per-caller rate limiter.
    pub rate_limiter: Arc<KeyedRateLimiter>,
    /// CORS origin allow-list.
    pub allowed_origins: Vec<String>,
    /// Liveness probes for the status endpoint.
    pub health: Arc<dyn DependencyHealth>,
}

impl AppState {
    /// Assemble state from its parts.
    pub fn new(
        registry: Arc<AgentRegistry>,
        services: SharedServices,
        secret_key: impl Into<String>,
        rate_limit: RateLimitSpec,
        health: Arc<dyn DependencyHealth>,
    ) -> Self {
        Self {
            registry,
            services,
            subscribers: Arc::new(SubscriberRegistry::new()),
            secret_key: secret_key.into(),
            rate_limiter: Arc::new(KeyedRateLimiter::new(rate_limit)),
            allowed_origins: Vec::new(),
            health,
        }
    }

    /// Set the CORS origin allow-list (builder-style).
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }
}

/// Build the Axum router with all gateway routes and middleware.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/mcp/exec", post(routes::mcp_exec))
        .route("/api/v1/mcp/execute", post(routes::mcp_execute))
        .route("/api/v1/mcp/tools", get(routes::mcp_tools))
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .route("/ws", get(ws::ws_upgrade))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(middleware::cors_layer(&state.allowed_origins))
        .layer(axum::middleware::from_fn(middleware::trace_id_middleware))
        .with_state(state)
}
