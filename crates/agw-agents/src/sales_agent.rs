// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sales agent: MCP façade over the sales service.

use crate::agent::{parse_payload, ActionSpec, Agent, ValidatePayload};
use crate::services::SharedServices;
use agw_core::RequestContext;
use agw_domain::SaleAgentType;
use agw_error::AgentError;
use agw_services::{CreateSaleInput, CreateSaleItem, SalesService};
use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Registry name of the sales agent.
pub const SALES_AGENT_NAME: &str = "agentos_sales";

/// Role granting the creating/cancelling actions.
const SALES_ROLES: &[&str] = &["sales_agent", "admin"];

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct SaleItemPayload {
    /// SKU to sell.
    sku: String,
    /// Units requested.
    quantity: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateSalePayload {
    /// Profile id of the purchasing client.
    client_id: String,
    /// Items, allocated in the submitted order.
    items: Vec<SaleItemPayload>,
    /// Channel the sale originated from.
    #[serde(default)]
    origin_channel: Option<String>,
    /// Free-form note, at most 500 characters.
    #[serde(default)]
    note: Option<String>,
    /// ISO 4217 currency code; system default when absent.
    #[serde(default)]
    currency: Option<String>,
    /// Idempotency key making the creation replayable.
    #[serde(default)]
    idempotency_key: Option<String>,
}

impl ValidatePayload for CreateSalePayload {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.client_id.trim().is_empty() {
            errors.push("client_id must not be empty".into());
        }
        if self.items.is_empty() {
            errors.push("items must not be empty".into());
        }
        for (idx, item) in self.items.iter().enumerate() {
            if item.sku.trim().is_empty() {
                errors.push(format!("items[{idx}].sku must not be empty"));
            }
            if item.quantity == 0 {
                errors.push(format!("items[{idx}].quantity must be positive"));
            }
        }
        if let Some(currency) = &self.currency {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                errors.push(format!("currency '{currency}' must be a 3-letter code"));
            }
        }
        if let Some(note) = &self.note {
            if note.chars().count() > 500 {
                errors.push("note must be at most 500 characters".into());
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GetSaleStatusPayload {
    /// Id of the sale to check.
    sale_id: String,
}

impl ValidatePayload for GetSaleStatusPayload {}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListRecentSalesPayload {
    /// Maximum number of sales to return (1–50).
    #[serde(default = "default_list_limit")]
    limit: u32,
}

fn default_list_limit() -> u32 {
    10
}

impl ValidatePayload for ListRecentSalesPayload {
    fn validate(&self) -> Result<(), Vec<String>> {
        if (1..=50).contains(&self.limit) {
            Ok(())
        } else {
            Err(vec!["limit must be between 1 and 50".into()])
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CancelSalePayload {
    /// Id of the sale to cancel.
    sale_id: String,
    /// Optional reason recorded in the status history.
    #[serde(default)]
    comment: Option<String>,
}

impl ValidatePayload for CancelSalePayload {}

// ---------------------------------------------------------------------------
// SalesAgent
// ---------------------------------------------------------------------------

const ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "create_sale",
        required_roles: SALES_ROLES,
        schema: || schema_for!(CreateSalePayload),
    },
    ActionSpec {
        name: "get_sale_status",
        required_roles: &[],
        schema: || schema_for!(GetSaleStatusPayload),
    },
    ActionSpec {
        name: "list_recent_sales",
        required_roles: &[],
        schema: || schema_for!(ListRecentSalesPayload),
    },
    ActionSpec {
        name: "cancel_sale",
        required_roles: SALES_ROLES,
        schema: || schema_for!(CancelSalePayload),
    },
];

/// Agent handling sales actions.
pub struct SalesAgent {
    service: SalesService,
}

impl SalesAgent {
    /// Build the agent from the shared-services bundle.
    pub fn new(services: &SharedServices) -> Self {
        let service = SalesService::new(
            services.sales.clone(),
            services.products.clone(),
            services.profiles.clone(),
            services.publisher.clone(),
            services.dispatcher.clone(),
            services.audit(),
            services.sales_config.clone(),
        );
        Self { service }
    }

    /// Actors with the human-override role buy as humans; everything else
    /// coming through the gateway is a bot.
    fn agent_type(ctx: &RequestContext) -> SaleAgentType {
        if ctx.has_role("human_override") {
            SaleAgentType::Human
        } else {
            SaleAgentType::Bot
        }
    }
}

#[async_trait]
impl Agent for SalesAgent {
    fn name(&self) -> &'static str {
        SALES_AGENT_NAME
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
            "create_sale" => {
                let payload: CreateSalePayload = parse_payload(data)?;
                let input = CreateSaleInput {
                    client_id: payload.client_id,
                    agent_id: ctx.agent_id.clone(),
                    agent_type: Self::agent_type(ctx),
                    items: payload
                        .items
                        .into_iter()
                        .map(|item| CreateSaleItem {
                            sku: item.sku,
                            quantity: item.quantity,
                        })
                        .collect(),
                    origin_channel: payload.origin_channel,
                    note: payload.note,
                    currency: payload.currency,
                    idempotency_key: payload.idempotency_key,
                };
                let sale = self.service.create_sale(input, ctx).await?;
                serde_json::to_value(&sale)
                    .map_err(|e| AgentError::internal(format!("sale serialization failed: {e}")))
            }
            "get_sale_status" => {
                let payload: GetSaleStatusPayload = parse_payload(data)?;
                let sale = self.service.get_sale(&payload.sale_id).await?;
                Ok(json!({"sale_id": sale.id, "status": sale.status}))
            }
            "list_recent_sales" => {
                let payload: ListRecentSalesPayload = parse_payload(data)?;
                let sales = self
                    .service
                    .list_recent_for_user(&ctx.agent_id, payload.limit as usize)
                    .await?;
                Ok(json!({"sales": sales}))
            }
            "cancel_sale" => {
                let payload: CancelSalePayload = parse_payload(data)?;
                let sale = self
                    .service
                    .cancel_sale(&payload.sale_id, ctx, payload.comment)
                    .await?;
                Ok(json!({"sale_id": sale.id, "status": sale.status}))
            }
            other => Err(AgentError::unsupported_action(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
