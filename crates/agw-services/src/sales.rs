// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sale creation and lifecycle orchestration.
//!
//! `create_sale` is the transactional nucleus: pre-flight checks outside
//! the write path, optimistic per-item stock allocation with bounded
//! retries, a compensating release of everything already allocated when a
//! later step fails, and best-effort post-commit fan-out (audit, event,
//! durable follow-up tasks) that never un-commits the sale.

use crate::audit::AuditService;
use agw_core::{channels, EventEnvelope, EventTarget, RequestContext};
use agw_domain::{
    items_signature, line_total, new_id, round_money, Sale, SaleAgentType, SaleItem, SaleStatus,
    StatusHistoryEntry,
};
use agw_error::AgentError;
use agw_events::{EventPublisher, RetryPolicy, TaskDispatcher};
use agw_store::{AllocateOutcome, ProductStore, ProfileStore, SaleStore, StoreError};
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Queue the post-sale follow-up tasks go to.
pub const TASK_QUEUE: &str = "gateway_tasks";

/// Durable task: reconcile the sale with the banking integration.
pub const TASK_SYNC_BANKING: &str = "sales.sync_banking";

/// Durable task: open the delivery for a created sale.
pub const TASK_INITIATE_DELIVERY: &str = "sales.initiate_delivery";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed failures of the sales service.
#[derive(Debug, thiserror::Error)]
pub enum SalesError {
    /// The client profile does not exist or is inactive.
    #[error("client '{0}' not found or inactive")]
    ClientNotFound(String),

    /// No product carries the SKU.
    #[error("product with SKU '{sku}' not found")]
    ProductNotFound {
        /// The missing SKU.
        sku: String,
    },

    /// Stock cannot cover the requested quantity.
    #[error("insufficient stock for SKU '{sku}': requested {requested}, available {available}")]
    InsufficientStock {
        /// SKU that ran short.
        sku: String,
        /// Quantity requested.
        requested: u32,
        /// Quantity available when the attempt gave up.
        available: i64,
    },

    /// An identical cart for the same `(agent, client)` pair exists inside
    /// the duplicate window.
    #[error("duplicate sale for client '{client_id}' by agent '{agent_id}'")]
    DuplicateSale {
        /// Client on both sales.
        client_id: String,
        /// Agent on both sales.
        agent_id: String,
    },

    /// The sale does not exist.
    #[error("sale '{0}' not found")]
    SaleNotFound(String),

    /// The sale's current status does not admit the operation.
    #[error("sale '{id}' cannot be cancelled from status {status:?}")]
    NotCancellable {
        /// Sale id.
        id: String,
        /// Its current status.
        status: SaleStatus,
    },

    /// The request's deadline passed before the sale could commit.
    #[error("request deadline exceeded before the sale committed")]
    DeadlineExceeded,

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SalesError> for AgentError {
    fn from(err: SalesError) -> Self {
        match &err {
            SalesError::ClientNotFound(_) | SalesError::ProductNotFound { .. } => {
                AgentError::entity_not_found(err.to_string())
            }
            SalesError::SaleNotFound(_) => AgentError::entity_not_found(err.to_string()),
            SalesError::InsufficientStock {
                sku,
                requested,
                available,
            } => AgentError::conflict(err.to_string()).with_details(json!({
                "sku": sku,
                "requested": requested,
                "available": available,
            })),
            SalesError::DuplicateSale { .. } | SalesError::NotCancellable { .. } => {
                AgentError::conflict(err.to_string())
            }
            SalesError::DeadlineExceeded => AgentError::internal(err.to_string()),
            SalesError::Store(inner) => AgentError::dependency(inner.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs and config
// ---------------------------------------------------------------------------

/// One requested line item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateSaleItem {
    /// SKU to sell.
    pub sku: String,
    /// Units requested; must be positive.
    pub quantity: u32,
}

/// Input to [`SalesService::create_sale`].
#[derive(Debug, Clone)]
pub struct CreateSaleInput {
    /// Purchasing client's profile id.
    pub client_id: String,
    /// Acting agent id (from the authenticated context).
    pub agent_id: String,
    /// Type of the acting agent.
    pub agent_type: SaleAgentType,
    /// Requested items, allocated in submission order.
    pub items: Vec<CreateSaleItem>,
    /// Originating channel.
    pub origin_channel: Option<String>,
    /// Free-form note.
    pub note: Option<String>,
    /// Currency override; the configured default applies when absent.
    pub currency: Option<String>,
    /// Idempotency key making the creation replayable.
    pub idempotency_key: Option<String>,
}

/// Tunables for the sales service.
#[derive(Debug, Clone)]
pub struct SalesConfig {
    /// Window scanned for duplicate carts.
    pub duplicate_window: ChronoDuration,
    /// Currency applied when the input omits one.
    pub default_currency: String,
    /// Bounded retries per item for the optimistic allocation.
    pub allocation_retries: u32,
}

impl Default for SalesConfig {
    fn default() -> Self {
        Self {
            duplicate_window: ChronoDuration::minutes(5),
            default_currency: "USD".into(),
            allocation_retries: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// SalesService
// ---------------------------------------------------------------------------

/// Business rules and orchestration for sales.
#[derive(Clone)]
pub struct SalesService {
    sales: Arc<dyn SaleStore>,
    products: Arc<dyn ProductStore>,
    profiles: Arc<dyn ProfileStore>,
    publisher: Arc<dyn EventPublisher>,
    dispatcher: Arc<dyn TaskDispatcher>,
    audit: AuditService,
    config: SalesConfig,
}

impl SalesService {
    /// Wire a service over its collaborators.
    pub fn new(
        sales: Arc<dyn SaleStore>,
        products: Arc<dyn ProductStore>,
        profiles: Arc<dyn ProfileStore>,
        publisher: Arc<dyn EventPublisher>,
        dispatcher: Arc<dyn TaskDispatcher>,
        audit: AuditService,
        config: SalesConfig,
    ) -> Self {
        Self {
            sales,
            products,
            profiles,
            publisher,
            dispatcher,
            audit,
            config,
        }
    }

    /// Create a sale per the orchestration contract.
    pub async fn create_sale(
        &self,
        input: CreateSaleInput,
        ctx: &RequestContext,
    ) -> Result<Sale, SalesError> {
        // Replays of an idempotency key return the original sale without
        // touching stock again.
        if let Some(key) = &input.idempotency_key {
            if let Some(existing) = self
                .sales
                .find_by_idempotency_key(&input.client_id, key)
                .await?
            {
                info!(sale_id = %existing.id, "idempotent replay, returning existing sale");
                return Ok(existing);
            }
        }

        // Pre-flight, outside any write path.
        let client = self.profiles.get(&input.client_id).await?;
        match client {
            Some(profile) if profile.active => {}
            _ => return Err(SalesError::ClientNotFound(input.client_id.clone())),
        }
        self.check_duplicate(&input).await?;

        // Allocate stock item by item, in submission order. Anything
        // already allocated is released when a later step fails.
        let mut allocated: Vec<(String, u32)> = Vec::new();
        let mut items: Vec<SaleItem> = Vec::new();
        let mut total_amount = Decimal::ZERO;

        for item in &input.items {
            match self.allocate_item(item).await {
                Ok(product) => {
                    let unit_price = product.standard_selling_price;
                    let total_price = line_total(unit_price, item.quantity);
                    total_amount += total_price;
                    allocated.push((item.sku.clone(), item.quantity));
                    items.push(SaleItem {
                        product_id: product.id,
                        sku: product.sku,
                        name: product.name,
                        quantity: item.quantity,
                        unit_price,
                        total_price,
                    });
                }
                Err(err) => {
                    self.release_all(&allocated).await;
                    return Err(err);
                }
            }
        }

        let now = Utc::now();
        let sale = Sale {
            id: new_id(),
            client_id: input.client_id.clone(),
            agent_id: input.agent_id.clone(),
            agent_type: input.agent_type,
            items,
            total_amount: round_money(total_amount),
            currency: input
                .currency
                .unwrap_or_else(|| self.config.default_currency.clone()),
            status: SaleStatus::Processing,
            status_history: vec![StatusHistoryEntry {
                status: SaleStatus::Processing,
                at: now,
                actor: input.agent_id.clone(),
                comment: None,
            }],
            payment_status: "pending".into(),
            delivery_id: None,
            origin_channel: input.origin_channel,
            note: input.note,
            idempotency_key: input.idempotency_key.clone(),
            created_at: now,
            updated_at: now,
        };

        // A request cancelled mid-flight must abort, not commit.
        if ctx.trace.is_expired() {
            self.release_all(&allocated).await;
            return Err(SalesError::DeadlineExceeded);
        }

        match self.sales.insert(&sale).await {
            Ok(()) => {}
            // A concurrent replay slipped in between the lookup and the
            // insert; hand back its sale and undo our allocations.
            Err(StoreError::DuplicateKey { field }) if field == "idempotency_key" => {
                self.release_all(&allocated).await;
                if let Some(key) = &input.idempotency_key {
                    if let Some(existing) = self
                        .sales
                        .find_by_idempotency_key(&input.client_id, key)
                        .await?
                    {
                        return Ok(existing);
                    }
                }
                return Err(SalesError::Store(StoreError::DuplicateKey { field }));
            }
            Err(err) => {
                self.release_all(&allocated).await;
                return Err(err.into());
            }
        }

        info!(sale_id = %sale.id, total = %sale.total_amount, "sale created");
        self.post_sale_fanout(&sale, ctx).await;
        Ok(sale)
    }

    /// Fetch a sale.
    pub async fn get_sale(&self, id: &str) -> Result<Sale, SalesError> {
        self.sales
            .get(id)
            .await?
            .ok_or_else(|| SalesError::SaleNotFound(id.to_string()))
    }

    /// Recent sales where the user is client or agent.
    pub async fn list_recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Sale>, SalesError> {
        Ok(self.sales.list_for_user(user_id, limit).await?)
    }

    /// Cancel a sale that has not progressed past processing.
    pub async fn cancel_sale(
        &self,
        id: &str,
        ctx: &RequestContext,
        comment: Option<String>,
    ) -> Result<Sale, SalesError> {
        let sale = self.get_sale(id).await?;
        if !matches!(
            sale.status,
            SaleStatus::PendingPayment | SaleStatus::Processing
        ) {
            return Err(SalesError::NotCancellable {
                id: id.to_string(),
                status: sale.status,
            });
        }
        let entry = StatusHistoryEntry {
            status: SaleStatus::Cancelled,
            at: Utc::now(),
            actor: ctx.agent_id.clone(),
            comment,
        };
        let updated = self
            .sales
            .update_status(id, SaleStatus::Cancelled, entry)
            .await?
            .ok_or_else(|| SalesError::SaleNotFound(id.to_string()))?;

        self.audit
            .record(
                ctx,
                "cancel_sale",
                Some(("sale", id)),
                true,
                json!({"sale_id": id}),
                None,
                None,
            )
            .await;
        self.publisher
            .publish(&EventEnvelope::new(
                channels::SALES_STATUS_CHANGED,
                EventTarget::Group,
                Some("sales_dashboard".into()),
                "sale_status_changed",
                json!({"sale_id": id, "status": "cancelled"}),
                ctx.trace.trace_id.clone(),
            ))
            .await;
        Ok(updated)
    }

    // -- Internal steps --------------------------------------------------

    async fn check_duplicate(&self, input: &CreateSaleInput) -> Result<(), SalesError> {
        let since = Utc::now() - self.config.duplicate_window;
        let recent = self
            .sales
            .find_recent_by_agent_and_client(&input.agent_id, &input.client_id, since)
            .await?;
        if recent.is_empty() {
            return Ok(());
        }

        let candidate =
            items_signature(input.items.iter().map(|i| (i.sku.as_str(), i.quantity)));
        for sale in &recent {
            let existing =
                items_signature(sale.items.iter().map(|i| (i.sku.as_str(), i.quantity)));
            if existing == candidate {
                warn!(
                    previous_sale = %sale.id,
                    client_id = %input.client_id,
                    "duplicate sale detected"
                );
                return Err(SalesError::DuplicateSale {
                    client_id: input.client_id.clone(),
                    agent_id: input.agent_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Read-check-decrement for one item, retrying version conflicts with
    /// bounded jittered backoff.
    async fn allocate_item(
        &self,
        item: &CreateSaleItem,
    ) -> Result<agw_domain::Product, SalesError> {
        let mut last_available = 0i64;
        for attempt in 0..=self.config.allocation_retries {
            let product = self
                .products
                .get_by_sku(&item.sku)
                .await?
                .filter(|p| p.active)
                .ok_or_else(|| SalesError::ProductNotFound {
                    sku: item.sku.clone(),
                })?;

            last_available = product.available_stock;
            if product.available_stock < i64::from(item.quantity) {
                return Err(SalesError::InsufficientStock {
                    sku: item.sku.clone(),
                    requested: item.quantity,
                    available: product.available_stock,
                });
            }

            match self
                .products
                .try_allocate(&item.sku, item.quantity, product.version)
                .await?
            {
                AllocateOutcome::Applied => return Ok(product),
                AllocateOutcome::Conflict => {
                    tokio::time::sleep(allocation_backoff(attempt)).await;
                }
            }
        }
        // The document kept moving under us; surface what we last saw.
        Err(SalesError::InsufficientStock {
            sku: item.sku.clone(),
            requested: item.quantity,
            available: last_available,
        })
    }

    async fn release_all(&self, allocated: &[(String, u32)]) {
        for (sku, quantity) in allocated {
            if let Err(err) = self.products.release(sku, *quantity).await {
                // The release is compensation for an aborted sale; a
                // failure here leaves stock under-counted and needs an
                // operator.
                warn!(sku = %sku, quantity, error = %err, "stock release failed");
            }
        }
    }

    async fn post_sale_fanout(&self, sale: &Sale, ctx: &RequestContext) {
        self.audit
            .record(
                ctx,
                "create_sale",
                Some(("sale", &sale.id)),
                true,
                json!({
                    "client_id": sale.client_id,
                    "item_count": sale.items.len(),
                    "total_amount": sale.total_amount,
                }),
                Some(json!({"sale_id": sale.id})),
                None,
            )
            .await;

        self.publisher
            .publish(&EventEnvelope::new(
                channels::SALES_CREATED,
                EventTarget::Group,
                Some("sales_dashboard".into()),
                "sale_created",
                json!({"sale_id": sale.id, "status": "processing"}),
                ctx.trace.trace_id.clone(),
            ))
            .await;

        for task in [TASK_SYNC_BANKING, TASK_INITIATE_DELIVERY] {
            if let Err(err) = self
                .dispatcher
                .enqueue(
                    TASK_QUEUE,
                    task,
                    json!({"sale_id": sale.id}),
                    RetryPolicy::default(),
                )
                .await
            {
                // The sale is committed; follow-up work is recovered by a
                // reconciliation sweep, not by failing the request.
                warn!(task, sale_id = %sale.id, error = %err, "task dispatch failed");
            }
        }
    }
}

/// Backoff before retrying a conflicted allocation: a few milliseconds,
/// doubling per attempt, with up to half jittered away.
fn allocation_backoff(attempt: u32) -> Duration {
    let nominal_ms = 10u64.saturating_mul(2u64.saturating_pow(attempt));
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let jitter = nanos % (nominal_ms / 2 + 1);
    Duration::from_millis(nominal_ms - jitter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
