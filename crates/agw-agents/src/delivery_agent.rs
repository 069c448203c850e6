// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delivery agent: MCP façade over the delivery service.

use crate::agent::{parse_payload, ActionSpec, Agent, ValidatePayload};
use crate::services::SharedServices;
use agw_core::RequestContext;
use agw_domain::{DeliveryItem, DeliveryStatus, GeoPoint};
use agw_error::AgentError;
use agw_services::{CreateDeliveryInput, DeliveryService};
use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Registry name of the delivery agent.
pub const DELIVERY_AGENT_NAME: &str = "agentos_delivery";

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct DeliveryItemPayload {
    /// Product id.
    product_id: String,
    /// SKU.
    sku: String,
    /// Display name.
    name: String,
    /// Units to deliver.
    quantity: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateDeliveryPayload {
    /// Sale the delivery fulfils.
    sale_id: String,
    /// Receiving client's profile id.
    client_profile_id: String,
    /// Items to deliver.
    items: Vec<DeliveryItemPayload>,
    /// Pickup address.
    pickup_address: String,
    /// Destination address.
    delivery_address: String,
}

impl ValidatePayload for CreateDeliveryPayload {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.sale_id.trim().is_empty() {
            errors.push("sale_id must not be empty".into());
        }
        if self.pickup_address.trim().is_empty() {
            errors.push("pickup_address must not be empty".into());
        }
        if self.delivery_address.trim().is_empty() {
            errors.push("delivery_address must not be empty".into());
        }
        for (idx, item) in self.items.iter().enumerate() {
            if item.quantity == 0 {
                errors.push(format!("items[{idx}].quantity must be positive"));
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GetDeliveryPayload {
    /// Delivery id.
    delivery_id: String,
}

impl ValidatePayload for GetDeliveryPayload {}

#[derive(Debug, Deserialize, JsonSchema)]
struct AssignCourierPayload {
    /// Delivery id.
    delivery_id: String,
    /// Profile id of the courier to assign.
    courier_profile_id: String,
}

impl ValidatePayload for AssignCourierPayload {}

#[derive(Debug, Deserialize, JsonSchema)]
struct LocationPayload {
    /// Degrees east.
    longitude: f64,
    /// Degrees north.
    latitude: f64,
}

impl LocationPayload {
    fn check(&self) -> Result<(), String> {
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(format!("longitude {} out of range", self.longitude));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(format!("latitude {} out of range", self.latitude));
        }
        Ok(())
    }

    fn into_point(self) -> GeoPoint {
        GeoPoint {
            longitude: self.longitude,
            latitude: self.latitude,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdateStatusPayload {
    /// Delivery id.
    delivery_id: String,
    /// Target status (snake_case, e.g. `"in_transit"`).
    status: String,
    /// Optional human-readable description.
    #[serde(default)]
    description: Option<String>,
    /// Optional location carried with the transition.
    #[serde(default)]
    location: Option<LocationPayload>,
}

impl ValidatePayload for UpdateStatusPayload {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if parse_status(&self.status).is_none() {
            errors.push(format!("'{}' is not a delivery status", self.status));
        }
        if let Some(location) = &self.location {
            if let Err(e) = location.check() {
                errors.push(e);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdateLocationPayload {
    /// Delivery id.
    delivery_id: String,
    /// Degrees east.
    longitude: f64,
    /// Degrees north.
    latitude: f64,
}

impl ValidatePayload for UpdateLocationPayload {
    fn validate(&self) -> Result<(), Vec<String>> {
        LocationPayload {
            longitude: self.longitude,
            latitude: self.latitude,
        }
        .check()
        .map_err(|e| vec![e])
    }
}

fn parse_status(raw: &str) -> Option<DeliveryStatus> {
    serde_json::from_value(Value::String(raw.to_string())).ok()
}

// ---------------------------------------------------------------------------
// DeliveryAgent
// ---------------------------------------------------------------------------

const ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "create_delivery",
        required_roles: &["admin", "sales_agent", "system"],
        schema: || schema_for!(CreateDeliveryPayload),
    },
    ActionSpec {
        name: "get_delivery",
        required_roles: &[],
        schema: || schema_for!(GetDeliveryPayload),
    },
    ActionSpec {
        name: "assign_courier",
        required_roles: &["admin", "dispatcher"],
        schema: || schema_for!(AssignCourierPayload),
    },
    ActionSpec {
        name: "update_status",
        required_roles: &[],
        schema: || schema_for!(UpdateStatusPayload),
    },
    ActionSpec {
        name: "update_location",
        required_roles: &["courier"],
        schema: || schema_for!(UpdateLocationPayload),
    },
];

/// Agent handling delivery actions.
pub struct DeliveryAgent {
    service: DeliveryService,
}

impl DeliveryAgent {
    /// Build the agent from the shared-services bundle.
    pub fn new(services: &SharedServices) -> Self {
        let service = DeliveryService::new(
            services.deliveries.clone(),
            services.profiles.clone(),
            services.publisher.clone(),
            services.audit(),
            services.delivery_retention_days,
        );
        Self { service }
    }
}

#[async_trait]
impl Agent for DeliveryAgent {
    fn name(&self) -> &'static str {
        DELIVERY_AGENT_NAME
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
            "create_delivery" => {
                let payload: CreateDeliveryPayload = parse_payload(data)?;
                let input = CreateDeliveryInput {
                    sale_id: payload.sale_id,
                    client_profile_id: payload.client_profile_id,
                    items: payload
                        .items
                        .into_iter()
                        .map(|item| DeliveryItem {
                            product_id: item.product_id,
                            sku: item.sku,
                            name: item.name,
                            quantity: item.quantity,
                        })
                        .collect(),
                    pickup_address: payload.pickup_address,
                    delivery_address: payload.delivery_address,
                };
                let delivery = self.service.create_delivery(input, ctx).await?;
                to_value(&delivery)
            }
            "get_delivery" => {
                let payload: GetDeliveryPayload = parse_payload(data)?;
                let delivery = self.service.get_delivery(&payload.delivery_id).await?;
                to_value(&delivery)
            }
            "assign_courier" => {
                let payload: AssignCourierPayload = parse_payload(data)?;
                let delivery = self
                    .service
                    .assign_courier(&payload.delivery_id, &payload.courier_profile_id, ctx)
                    .await?;
                to_value(&delivery)
            }
            "update_status" => {
                let payload: UpdateStatusPayload = parse_payload(data)?;
                // Guaranteed by validate(); parse again to get the enum.
                let status = parse_status(&payload.status)
                    .ok_or_else(|| AgentError::validation_failed(vec![
                        format!("'{}' is not a delivery status", payload.status),
                    ]))?;
                let delivery = self
                    .service
                    .update_status(
                        &payload.delivery_id,
                        status,
                        ctx,
                        payload.description,
                        payload.location.map(LocationPayload::into_point),
                    )
                    .await?;
                to_value(&delivery)
            }
            "update_location" => {
                let payload: UpdateLocationPayload = parse_payload(data)?;
                let delivery = self
                    .service
                    .update_location(
                        &payload.delivery_id,
                        GeoPoint {
                            longitude: payload.longitude,
                            latitude: payload.latitude,
                        },
                        ctx,
                    )
                    .await?;
                to_value(&delivery)
            }
            other => Err(AgentError::unsupported_action(other)),
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, AgentError> {
    serde_json::to_value(value)
        .map_err(|e| AgentError::internal(format!("serialization failed: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use agw_core::{McpPayload, Principal, TraceContext};
    use agw_domain::{Profile, ProfileKind};
    use agw_error::ErrorCode;
    use agw_store::ProfileStore;
    use chrono::Utc;
    use std::collections::BTreeSet;

    async fn seeded_services() -> SharedServices {
        let services = SharedServices::in_memory();
        let now = Utc::now();
        for (id, kind, roles) in [
            ("client-1", ProfileKind::Client, vec![]),
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
    }

    fn ctx(id: &str, roles: &[&str]) -> RequestContext {
        RequestContext::authoritative(
            None,
            &Principal::new(id, roles.iter().copied()),
            TraceContext::with_trace_id("t"),
        )
    }

    async fn created_delivery(agent: &DeliveryAgent) -> String {
        let result = agent
            .execute(
                McpPayload::new(
                    "create_delivery",
                    json!({
                        "sale_id": "sale-1",
                        "client_profile_id": "client-1",
                        "items": [{
                            "product_id": "p-1",
                            "sku": "SKU-1",
                            "name": "Widget",
                            "quantity": 1
                        }],
                        "pickup_address": "warehouse 9",
                        "delivery_address": "client st 1"
                    }),
                ),
                &ctx("ops-1", &["admin"]),
            )
            .await
            .unwrap();
        result["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_and_get_delivery() {
        let services = seeded_services().await;
        let agent = DeliveryAgent::new(&services);
        let id = created_delivery(&agent).await;

        let fetched = agent
            .execute(
                McpPayload::new("get_delivery", json!({"delivery_id": id})),
                &ctx("anyone", &[]),
            )
            .await
            .unwrap();
        assert_eq!(fetched["current_status"], "pending_assignment");
    }

    #[tokio::test]
    async fn unknown_status_string_rejected() {
        let services = seeded_services().await;
        let agent = DeliveryAgent::new(&services);
        let id = created_delivery(&agent).await;

        let err = agent
            .execute(
                McpPayload::new(
                    "update_status",
                    json!({"delivery_id": id, "status": "teleported"}),
                ),
                &ctx("ops-1", &["admin"]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn assign_then_skip_transition_conflicts() {
        let services = seeded_services().await;
        let agent = DeliveryAgent::new(&services);
        let id = created_delivery(&agent).await;

        agent
            .execute(
                McpPayload::new(
                    "assign_courier",
                    json!({"delivery_id": id, "courier_profile_id": "courier-1"}),
                ),
                &ctx("ops-1", &["admin"]),
            )
            .await
            .unwrap();

        let err = agent
            .execute(
                McpPayload::new(
                    "update_status",
                    json!({"delivery_id": id, "status": "in_transit"}),
                ),
                &ctx("courier-1", &["courier"]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn wrong_courier_is_forbidden() {
        let services = seeded_services().await;
        let agent = DeliveryAgent::new(&services);
        let id = created_delivery(&agent).await;

        let err = agent
            .execute(
                McpPayload::new(
                    "update_status",
                    json!({"delivery_id": id, "status": "in_transit"}),
                ),
                &ctx("courier-9", &["courier"]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn update_location_requires_courier_role() {
        let services = seeded_services().await;
        let agent = DeliveryAgent::new(&services);
        let id = created_delivery(&agent).await;

        let err = agent
            .execute(
                McpPayload::new(
                    "update_location",
                    json!({"delivery_id": id, "longitude": 0.0, "latitude": 0.0}),
                ),
                &ctx("client-1", &[]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn out_of_range_coordinates_rejected() {
        let services = seeded_services().await;
        let agent = DeliveryAgent::new(&services);
        let id = created_delivery(&agent).await;

        let err = agent
            .execute(
                McpPayload::new(
                    "update_location",
                    json!({"delivery_id": id, "longitude": 540.0, "latitude": 12.0}),
                ),
                &ctx("courier-1", &["courier"]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }
}
