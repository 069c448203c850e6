// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handlers for the durable post-sale tasks.

use agw_agents::SharedServices;
use agw_core::{Principal, RequestContext, TraceContext};
use agw_domain::DeliveryItem;
use agw_events::TaskHandler;
use agw_services::{CreateDeliveryInput, DeliveryService, SalesService};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

fn system_context() -> RequestContext {
    RequestContext::authoritative(
        None,
        &Principal::new("system", ["system"]),
        TraceContext::new(),
    )
}

fn sale_id(args: &Value) -> Result<&str, String> {
    args.get("sale_id")
        .and_then(Value::as_str)
        .ok_or_else(|| "task args missing 'sale_id'".to_string())
}

// ---------------------------------------------------------------------------
// sales.initiate_delivery
// ---------------------------------------------------------------------------

/// Opens the delivery session for a committed sale.
pub struct InitiateDeliveryHandler {
    sales: SalesService,
    deliveries: DeliveryService,
}

impl InitiateDeliveryHandler {
    /// Build the handler from the shared-services bundle.
    pub fn new(services: &SharedServices) -> Self {
        let sales = SalesService::new(
            services.sales.clone(),
            services.products.clone(),
            services.profiles.clone(),
            services.publisher.clone(),
            services.dispatcher.clone(),
            services.audit(),
            services.sales_config.clone(),
        );
        let deliveries = DeliveryService::new(
            services.deliveries.clone(),
            services.profiles.clone(),
            services.publisher.clone(),
            services.audit(),
            services.delivery_retention_days,
        );
        Self { sales, deliveries }
    }
}

#[async_trait]
impl TaskHandler for InitiateDeliveryHandler {
    async fn run(&self, args: &Value) -> Result<(), String> {
        let sale_id = sale_id(args)?;
        let sale = self.sales.get_sale(sale_id).await.map_err(|e| e.to_string())?;

        let input = CreateDeliveryInput {
            sale_id: sale.id.clone(),
            client_profile_id: sale.client_id.clone(),
            items: sale
                .items
                .iter()
                .map(|item| DeliveryItem {
                    product_id: item.product_id.clone(),
                    sku: item.sku.clone(),
                    name: item.name.clone(),
                    quantity: item.quantity,
                })
                .collect(),
            // Addresses come from fulfilment configuration once the
            // warehouse integration lands; placeholders keep the delivery
            // actionable for dispatch.
            pickup_address: "default-warehouse".into(),
            delivery_address: format!("client:{}", sale.client_id),
        };
        let delivery = self
            .deliveries
            .create_delivery(input, &system_context())
            .await
            .map_err(|e| e.to_string())?;
        info!(sale_id, delivery_id = %delivery.id, "delivery initiated for sale");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// sales.sync_banking
// ---------------------------------------------------------------------------

/// Acknowledges the banking reconciliation request. The banking
/// integration itself lives outside the gateway; this handler verifies the
/// sale exists so a bad reference dead-letters instead of vanishing.
pub struct SyncBankingHandler {
    sales: SalesService,
}

impl SyncBankingHandler {
    /// Build the handler from the shared-services bundle.
    pub fn new(services: &SharedServices) -> Self {
        let sales = SalesService::new(
            services.sales.clone(),
            services.products.clone(),
            services.profiles.clone(),
            services.publisher.clone(),
            services.dispatcher.clone(),
            services.audit(),
            services.sales_config.clone(),
        );
        Self { sales }
    }
}

#[async_trait]
impl TaskHandler for SyncBankingHandler {
    async fn run(&self, args: &Value) -> Result<(), String> {
        let sale_id = sale_id(args)?;
        let sale = self.sales.get_sale(sale_id).await.map_err(|e| e.to_string())?;
        info!(
            sale_id,
            total = %sale.total_amount,
            currency = %sale.currency,
            "banking sync requested"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
