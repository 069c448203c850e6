// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end gateway scenarios over the in-memory bundle.

use agw_agents::{register_all, AgentRegistry, SharedServices};
use agw_config::RateLimitSpec;
use agw_core::{EventEnvelope, Principal};
use agw_domain::{Product, Profile, ProfileKind};
use agw_events::{EventPublisher, MemoryDispatcher, MemoryPublisher};
use agw_server::health::StaticHealth;
use agw_server::{build_app, AppState};
use agw_store::{ProductStore, ProfileStore};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "gateway-e2e-secret";

/// Publisher double for the broker-outage scenario: every publish fails.
#[derive(Default)]
struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _event: &EventEnvelope) -> bool {
        false
    }
}

struct Harness {
    app: Router,
    services: SharedServices,
}

async fn harness_with(services: SharedServices) -> Harness {
    seed(&services).await;
    let mut registry = AgentRegistry::new();
    register_all(&mut registry, &services).unwrap();
    let state = AppState::new(
        Arc::new(registry),
        services.clone(),
        SECRET,
        RateLimitSpec {
            max_requests: 500,
            window_secs: 60,
        },
        Arc::new(StaticHealth {
            store: true,
            cache: true,
        }),
    );
    Harness {
        app: build_app(state),
        services,
    }
}

async fn harness() -> Harness {
    harness_with(SharedServices::in_memory()).await
}

async fn seed(services: &SharedServices) {
    let now = Utc::now();
    for (id, kind, roles) in [
        ("P1", ProfileKind::Client, vec![]),
        ("courier-1", ProfileKind::Courier, vec!["courier"]),
    ] {
        services
            .profiles
            .insert(&Profile {
                id: id.into(),
                user_id: None,
                external_id: None,
                whatsapp_id: Some(format!("wa-{id}")),
                email: None,
                phone: None,
                first_name: None,
                last_name: None,
                full_name: None,
                kind,
                roles: roles.into_iter().map(String::from).collect::<BTreeSet<_>>(),
                active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }
    services
        .products
        .insert(&Product {
            id: "prod-1".into(),
            sku: "SKU-1".into(),
            name: "Widget".into(),
            active: true,
            available_stock: 10,
            standard_selling_price: Decimal::from_str("2.50").unwrap(),
            version: 0,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

fn token(id: &str, roles: &[&str]) -> String {
    agw_auth::mint_token(&Principal::new(id, roles.iter().copied()), 60, SECRET).unwrap()
}

async fn post(
    app: &Router,
    uri: &str,
    bearer: Option<&str>,
    body: Value,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, value)
}

async fn get(
    app: &Router,
    uri: &str,
    bearer: Option<&str>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder.body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, value)
}

fn create_sale_body(quantity: u32) -> Value {
    json!({
        "agent_name": "agentos_sales",
        "payload": {
            "action": "create_sale",
            "data": {"client_id": "P1", "items": [{"sku": "SKU-1", "quantity": quantity}]}
        }
    })
}

// ---------------------------------------------------------------------------
// Scenario 1: happy sale
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_sale_end_to_end() {
    let mut services = SharedServices::in_memory();
    let publisher = Arc::new(MemoryPublisher::new());
    let dispatcher = Arc::new(MemoryDispatcher::new());
    services.publisher = publisher.clone();
    services.dispatcher = dispatcher.clone();
    let h = harness_with(services).await;

    let bearer = token("U1", &["sales_agent"]);
    let (status, headers, body) =
        post(&h.app, "/api/v1/mcp/exec", Some(&bearer), create_sale_body(2)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["agent"], "agentos_sales");
    assert_eq!(body["action"], "create_sale");
    assert_eq!(body["result"]["total_amount"], "5.00");
    assert_eq!(body["result"]["status"], "processing");

    // Stock decremented to 8.
    let product = h.services.products.get_by_sku("SKU-1").await.unwrap().unwrap();
    assert_eq!(product.available_stock, 8);

    // The emitted event and the response share one trace id.
    let trace = headers.get("x-trace-id").unwrap().to_str().unwrap();
    let events = publisher.published();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].channel, "sales.created");
    assert_eq!(events[0].trace_id, trace);

    // Both follow-up tasks were enqueued.
    let tasks = dispatcher.enqueued();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].task_name, "sales.sync_banking");
    assert_eq!(tasks[1].task_name, "sales.initiate_delivery");
}

// ---------------------------------------------------------------------------
// Scenario 2: insufficient stock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insufficient_stock_is_409_with_details() {
    let h = harness().await;
    let bearer = token("U1", &["sales_agent"]);
    let (status, _, body) =
        post(&h.app, "/api/v1/mcp/exec", Some(&bearer), create_sale_body(20)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_details"]["sku"], "SKU-1");
    assert_eq!(body["error_details"]["requested"], 20);
    assert_eq!(body["error_details"]["available"], 10);

    // Stock untouched; nothing fanned out.
    let product = h.services.products.get_by_sku("SKU-1").await.unwrap().unwrap();
    assert_eq!(product.available_stock, 10);
}

// ---------------------------------------------------------------------------
// Scenario 3: duplicate sale
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_sale_within_window_is_409() {
    let h = harness().await;
    let bearer = token("U1", &["sales_agent"]);
    let (status, _, _) =
        post(&h.app, "/api/v1/mcp/exec", Some(&bearer), create_sale_body(2)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) =
        post(&h.app, "/api/v1/mcp/exec", Some(&bearer), create_sale_body(2)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("duplicate"));

    // Exactly one decrement survived.
    let product = h.services.products.get_by_sku("SKU-1").await.unwrap().unwrap();
    assert_eq!(product.available_stock, 8);
}

// ---------------------------------------------------------------------------
// Scenario 4: spoofed context
// ---------------------------------------------------------------------------

#[tokio::test]
async fn spoofed_context_roles_are_ignored() {
    let h = harness().await;
    // The token has no sales role; the envelope claims admin.
    let bearer = token("U1", &["viewer"]);
    let body = json!({
        "agent_name": "agentos_sales",
        "payload": {
            "action": "create_sale",
            "data": {"client_id": "P1", "items": [{"sku": "SKU-1", "quantity": 1}]}
        },
        "context": {"roles": ["admin", "sales_agent"], "agent_id": "someone-else"}
    });
    let (status, _, _) = post(&h.app, "/api/v1/mcp/exec", Some(&bearer), body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // No repository effect, no success audit entry.
    let product = h.services.products.get_by_sku("SKU-1").await.unwrap().unwrap();
    assert_eq!(product.available_stock, 10);
}

// ---------------------------------------------------------------------------
// Scenario 5: delivery transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delivery_transition_authorization_and_ordering() {
    let h = harness().await;
    let admin = token("ops-1", &["admin"]);

    let (status, _, created) = post(
        &h.app,
        "/api/v1/mcp/exec",
        Some(&admin),
        json!({
            "agent_name": "agentos_delivery",
            "payload": {
                "action": "create_delivery",
                "data": {
                    "sale_id": "sale-x",
                    "client_profile_id": "P1",
                    "items": [{"product_id": "prod-1", "sku": "SKU-1", "name": "Widget", "quantity": 1}],
                    "pickup_address": "warehouse 9",
                    "delivery_address": "client st 1"
                }
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let delivery_id = created["result"]["id"].as_str().unwrap().to_string();

    // A courier who is not assigned: 403.
    let wrong_courier = token("courier-9", &["courier"]);
    let (status, _, _) = post(
        &h.app,
        "/api/v1/mcp/exec",
        Some(&wrong_courier),
        json!({
            "agent_name": "agentos_delivery",
            "payload": {
                "action": "update_status",
                "data": {"delivery_id": delivery_id, "status": "in_transit"}
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Assign courier-1, then skip straight to in_transit: 409.
    let (status, _, _) = post(
        &h.app,
        "/api/v1/mcp/exec",
        Some(&admin),
        json!({
            "agent_name": "agentos_delivery",
            "payload": {
                "action": "assign_courier",
                "data": {"delivery_id": delivery_id, "courier_profile_id": "courier-1"}
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let assigned_courier = token("courier-1", &["courier"]);
    let (status, _, _) = post(
        &h.app,
        "/api/v1/mcp/exec",
        Some(&assigned_courier),
        json!({
            "agent_name": "agentos_delivery",
            "payload": {
                "action": "update_status",
                "data": {"delivery_id": delivery_id, "status": "in_transit"}
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Scenario 6: broker outage during publish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broker_outage_does_not_fail_the_sale() {
    let mut services = SharedServices::in_memory();
    services.publisher = Arc::new(FailingPublisher);
    let h = harness_with(services).await;

    let bearer = token("U1", &["sales_agent"]);
    let (status, _, body) =
        post(&h.app, "/api/v1/mcp/exec", Some(&bearer), create_sale_body(2)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let product = h.services.products.get_by_sku("SKU-1").await.unwrap().unwrap();
    assert_eq!(product.available_stock, 8);
}

// ---------------------------------------------------------------------------
// Envelope, auth, and routing edges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_credentials_is_401() {
    let h = harness().await;
    let (status, headers, _) = post(&h.app, "/api/v1/mcp/exec", None, create_sale_body(1)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.get("x-trace-id").is_some());
}

#[tokio::test]
async fn unknown_top_level_field_is_422() {
    let h = harness().await;
    let bearer = token("U1", &["sales_agent"]);
    let mut body = create_sale_body(1);
    body["surprise"] = json!(true);
    let (status, _, response) = post(&h.app, "/api/v1/mcp/exec", Some(&bearer), body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response["error"]["code"], "ENVELOPE_INVALID");
}

#[tokio::test]
async fn unknown_agent_is_404() {
    let h = harness().await;
    let bearer = token("U1", &["sales_agent"]);
    let body = json!({
        "agent_name": "agentos_ghost",
        "payload": {"action": "do", "data": {}}
    });
    let (status, _, _) = post(&h.app, "/api/v1/mcp/exec", Some(&bearer), body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn caller_trace_id_is_echoed() {
    let h = harness().await;
    let bearer = token("U1", &["sales_agent"]);
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/mcp/exec")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {bearer}"))
        .header("x-trace-id", "trace-from-caller")
        .body(Body::from(create_sale_body(1).to_string()))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("x-trace-id").unwrap(),
        "trace-from-caller"
    );
}

#[tokio::test]
async fn named_invocation_requires_csrf_for_browser_origins() {
    let h = harness().await;
    let bearer = token("U1", &["sales_agent"]);
    let body = json!({
        "tool_name": "agentos_sales.get_sale_status",
        "parameters": {"sale_id": "nope"}
    });

    // Browser origin without the CSRF pair: 403.
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/mcp/execute")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {bearer}"))
        .header("origin", "https://app.example.com")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // With the double-submit pair the request reaches the agent (and the
    // unknown sale surfaces as 404).
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/mcp/execute")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {bearer}"))
        .header("origin", "https://app.example.com")
        .header("x-csrf-token", "tok-1")
        .header("cookie", "csrf_token=tok-1")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn named_invocation_happy_path() {
    let h = harness().await;
    let bearer = token("U1", &["sales_agent"]);
    let (status, _, body) = post(
        &h.app,
        "/api/v1/mcp/execute",
        Some(&bearer),
        json!({
            "tool_name": "agentos_sales.create_sale",
            "parameters": {"client_id": "P1", "items": [{"sku": "SKU-1", "quantity": 1}]}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["total_amount"], "2.50");
}

#[tokio::test]
async fn tools_listing_requires_auth_and_lists_flat_names() {
    let h = harness().await;
    let (status, _, _) = get(&h.app, "/api/v1/mcp/tools", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bearer = token("U1", &[]);
    let (status, _, body) = get(&h.app, "/api/v1/mcp/tools", Some(&bearer)).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["names"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(names.contains(&"agentos_sales.create_sale"));
    assert!(names.contains(&"agentos_delivery.update_status"));
}

#[tokio::test]
async fn health_and_status_are_public() {
    let h = harness().await;
    let (status, _, body) = get(&h.app, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, body) = get(&h.app, "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["db_status"], "connected");
    assert_eq!(body["redis_status"], "connected");
    assert_eq!(body["registered_tools_count"], 4);
}

#[tokio::test]
async fn rate_limit_exhaustion_is_429() {
    let services = SharedServices::in_memory();
    seed(&services).await;
    let mut registry = AgentRegistry::new();
    register_all(&mut registry, &services).unwrap();
    let state = AppState::new(
        Arc::new(registry),
        services,
        SECRET,
        RateLimitSpec {
            max_requests: 2,
            window_secs: 3600,
        },
        Arc::new(StaticHealth {
            store: true,
            cache: true,
        }),
    );
    let app = build_app(state);

    let (first, _, _) = get(&app, "/health", None).await;
    let (second, _, _) = get(&app, "/health", None).await;
    let (third, _, _) = get(&app, "/health", None).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(third, StatusCode::TOO_MANY_REQUESTS);
}
