// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delivery lifecycle: state machine enforcement, courier authorization,
//! TTL stamping, and per-transition event emission.

use crate::audit::AuditService;
use agw_core::{channels, EventEnvelope, EventTarget, RequestContext};
use agw_domain::{
    new_id, Delivery, DeliveryItem, DeliveryStatus, GeoPoint, TrackingEvent,
};
use agw_error::AgentError;
use agw_events::EventPublisher;
use agw_store::{DeliveryStore, ProfileStore, StoreError};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Role a principal must hold for courier-only operations.
const COURIER_ROLE: &str = "courier";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed failures of the delivery service.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The delivery does not exist.
    #[error("delivery '{0}' not found")]
    NotFound(String),

    /// The client profile backing the delivery is missing or inactive.
    #[error("client '{0}' not found or inactive")]
    ClientNotFound(String),

    /// The courier profile is missing, inactive, or not a courier.
    #[error("courier '{0}' not found or not an active courier")]
    CourierNotFound(String),

    /// The requested transition is not admitted by the state machine.
    #[error("invalid delivery status transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status.
        from: DeliveryStatus,
        /// Requested status.
        to: DeliveryStatus,
    },

    /// The caller is not the courier assigned to this delivery.
    #[error("caller is not the courier assigned to delivery '{0}'")]
    NotAssignedCourier(String),

    /// Location updates are not accepted in the delivery's current status.
    #[error("delivery '{id}' does not accept location updates in status {status:?}")]
    LocationNotAccepted {
        /// Delivery id.
        id: String,
        /// Its current status.
        status: DeliveryStatus,
    },

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DeliveryError> for AgentError {
    fn from(err: DeliveryError) -> Self {
        match &err {
            DeliveryError::NotFound(_)
            | DeliveryError::ClientNotFound(_)
            | DeliveryError::CourierNotFound(_) => AgentError::entity_not_found(err.to_string()),
            DeliveryError::InvalidTransition { .. }
            | DeliveryError::LocationNotAccepted { .. } => AgentError::conflict(err.to_string()),
            DeliveryError::NotAssignedCourier(_) => AgentError::forbidden(err.to_string()),
            DeliveryError::Store(inner) => AgentError::dependency(inner.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Input to [`DeliveryService::create_delivery`].
#[derive(Debug, Clone)]
pub struct CreateDeliveryInput {
    /// Sale the delivery fulfils.
    pub sale_id: String,
    /// Receiving client's profile id.
    pub client_profile_id: String,
    /// Items to deliver.
    pub items: Vec<DeliveryItem>,
    /// Pickup address.
    pub pickup_address: String,
    /// Destination address.
    pub delivery_address: String,
}

// ---------------------------------------------------------------------------
// DeliveryService
// ---------------------------------------------------------------------------

/// Business rules for the delivery lifecycle.
#[derive(Clone)]
pub struct DeliveryService {
    deliveries: Arc<dyn DeliveryStore>,
    profiles: Arc<dyn ProfileStore>,
    publisher: Arc<dyn EventPublisher>,
    audit: AuditService,
    retention: ChronoDuration,
}

impl DeliveryService {
    /// Wire a service over its collaborators. `retention_days` controls
    /// how long terminal deliveries stay before the TTL purge.
    pub fn new(
        deliveries: Arc<dyn DeliveryStore>,
        profiles: Arc<dyn ProfileStore>,
        publisher: Arc<dyn EventPublisher>,
        audit: AuditService,
        retention_days: i64,
    ) -> Self {
        Self {
            deliveries,
            profiles,
            publisher,
            audit,
            retention: ChronoDuration::days(retention_days),
        }
    }

    /// Create a delivery session for a sale.
    pub async fn create_delivery(
        &self,
        input: CreateDeliveryInput,
        ctx: &RequestContext,
    ) -> Result<Delivery, DeliveryError> {
        match self.profiles.get(&input.client_profile_id).await? {
            Some(profile) if profile.active => {}
            _ => {
                return Err(DeliveryError::ClientNotFound(
                    input.client_profile_id.clone(),
                ))
            }
        }

        let now = Utc::now();
        let delivery = Delivery {
            id: new_id(),
            sale_id: input.sale_id.clone(),
            client_profile_id: input.client_profile_id,
            courier_profile_id: None,
            items: input.items,
            pickup_address: input.pickup_address,
            delivery_address: input.delivery_address,
            current_status: DeliveryStatus::PendingAssignment,
            tracking_history: Vec::new(),
            current_location: None,
            expire_at: None,
            created_at: now,
            updated_at: now,
        };
        self.deliveries.insert(&delivery).await?;
        info!(delivery_id = %delivery.id, sale_id = %input.sale_id, "delivery created");

        self.audit
            .record(
                ctx,
                "create_delivery",
                Some(("delivery", &delivery.id)),
                true,
                json!({"sale_id": input.sale_id}),
                None,
                None,
            )
            .await;
        Ok(delivery)
    }

    /// Fetch a delivery.
    pub async fn get_delivery(&self, id: &str) -> Result<Delivery, DeliveryError> {
        self.deliveries
            .get(id)
            .await?
            .ok_or_else(|| DeliveryError::NotFound(id.to_string()))
    }

    /// Assign a courier: `pending_assignment → assigned`.
    pub async fn assign_courier(
        &self,
        delivery_id: &str,
        courier_profile_id: &str,
        ctx: &RequestContext,
    ) -> Result<Delivery, DeliveryError> {
        let delivery = self.get_delivery(delivery_id).await?;
        if !delivery
            .current_status
            .can_transition_to(DeliveryStatus::Assigned)
        {
            return Err(DeliveryError::InvalidTransition {
                from: delivery.current_status,
                to: DeliveryStatus::Assigned,
            });
        }
        match self.profiles.get(courier_profile_id).await? {
            Some(profile) if profile.active && profile.roles.contains(COURIER_ROLE) => {}
            _ => {
                return Err(DeliveryError::CourierNotFound(
                    courier_profile_id.to_string(),
                ))
            }
        }

        let event = TrackingEvent {
            at: Utc::now(),
            status: DeliveryStatus::Assigned,
            description: format!("courier {courier_profile_id} assigned"),
            location: None,
            actor_id: Some(ctx.agent_id.clone()),
        };
        let updated = self
            .deliveries
            .assign_courier(delivery_id, courier_profile_id, event.clone())
            .await?
            .ok_or_else(|| DeliveryError::NotFound(delivery_id.to_string()))?;

        self.emit_status_event(&updated, &event, ctx).await;
        self.audit
            .record(
                ctx,
                "assign_courier",
                Some(("delivery", delivery_id)),
                true,
                json!({"courier_profile_id": courier_profile_id}),
                None,
                None,
            )
            .await;
        Ok(updated)
    }

    /// Apply a status transition with full state-machine and authorization
    /// checks.
    pub async fn update_status(
        &self,
        delivery_id: &str,
        new_status: DeliveryStatus,
        ctx: &RequestContext,
        description: Option<String>,
        location: Option<GeoPoint>,
    ) -> Result<Delivery, DeliveryError> {
        let delivery = self.get_delivery(delivery_id).await?;

        // Courier-only transitions are checked before the state machine so
        // an unauthorized caller learns nothing about the current status.
        if new_status.is_courier_transition() {
            self.require_assigned_courier(&delivery, ctx)?;
        }
        if !delivery.current_status.can_transition_to(new_status) {
            return Err(DeliveryError::InvalidTransition {
                from: delivery.current_status,
                to: new_status,
            });
        }

        let at = Utc::now();
        let event = TrackingEvent {
            at,
            status: new_status,
            description: description
                .unwrap_or_else(|| format!("status updated to {}", status_name(new_status))),
            location,
            actor_id: Some(ctx.agent_id.clone()),
        };
        let expire_at = new_status.is_terminal().then(|| at + self.retention);

        let updated = self
            .deliveries
            .apply_transition(delivery_id, event.clone(), expire_at)
            .await?
            .ok_or_else(|| DeliveryError::NotFound(delivery_id.to_string()))?;

        info!(
            delivery_id,
            status = status_name(new_status),
            terminal = new_status.is_terminal(),
            "delivery transitioned"
        );
        self.emit_status_event(&updated, &event, ctx).await;
        self.audit
            .record(
                ctx,
                &format!("update_delivery_status_{}", status_name(new_status)),
                Some(("delivery", delivery_id)),
                true,
                json!({"description": event.description}),
                None,
                None,
            )
            .await;
        Ok(updated)
    }

    /// Record the assigned courier's location and notify the client.
    pub async fn update_location(
        &self,
        delivery_id: &str,
        location: GeoPoint,
        ctx: &RequestContext,
    ) -> Result<Delivery, DeliveryError> {
        let delivery = self.get_delivery(delivery_id).await?;
        self.require_assigned_courier(&delivery, ctx)?;
        if !delivery.current_status.accepts_location_updates() {
            return Err(DeliveryError::LocationNotAccepted {
                id: delivery_id.to_string(),
                status: delivery.current_status,
            });
        }

        let at = Utc::now();
        let updated = self
            .deliveries
            .set_location(delivery_id, location, at)
            .await?
            .ok_or_else(|| DeliveryError::NotFound(delivery_id.to_string()))?;

        self.publisher
            .publish(&EventEnvelope::new(
                channels::DELIVERY_LOCATION_UPDATE,
                EventTarget::User,
                Some(updated.client_profile_id.clone()),
                "delivery_location_update",
                json!({
                    "delivery_id": delivery_id,
                    "location": location,
                    "at": at,
                }),
                ctx.trace.trace_id.clone(),
            ))
            .await;
        Ok(updated)
    }

    // -- Internal --------------------------------------------------------

    fn require_assigned_courier(
        &self,
        delivery: &Delivery,
        ctx: &RequestContext,
    ) -> Result<(), DeliveryError> {
        let assigned = delivery
            .courier_profile_id
            .as_deref()
            .is_some_and(|courier| courier == ctx.agent_id);
        if ctx.has_role(COURIER_ROLE) && assigned {
            Ok(())
        } else {
            Err(DeliveryError::NotAssignedCourier(delivery.id.clone()))
        }
    }

    async fn emit_status_event(
        &self,
        delivery: &Delivery,
        event: &TrackingEvent,
        ctx: &RequestContext,
    ) {
        self.publisher
            .publish(&EventEnvelope::new(
                channels::DELIVERY_STATUS_CHANGED,
                EventTarget::User,
                Some(delivery.client_profile_id.clone()),
                "delivery_status_changed",
                json!({
                    "delivery_id": delivery.id,
                    "new_status": status_name(event.status),
                    "description": event.description,
                    "at": event.at,
                    "location": event.location,
                }),
                ctx.trace.trace_id.clone(),
            ))
            .await;
    }
}

fn status_name(status: DeliveryStatus) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
