// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delivery documents and the delivery state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DeliveryStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for a courier to be assigned.
    PendingAssignment,
    /// A courier has accepted the delivery.
    Assigned,
    /// The courier is collecting the package.
    PickingUp,
    /// En route to the destination.
    InTransit,
    /// Close to the destination.
    NearDestination,
    /// Handed to the client.
    Delivered,
    /// One delivery attempt failed; the courier may retry.
    FailedAttempt,
    /// Delivery failed for good.
    FailedDelivery,
    /// Cancelled before completion.
    Cancelled,
    /// Returned to the vendor after a failed delivery.
    Returned,
}

impl DeliveryStatus {
    /// Returns `true` for statuses after which the record is retained only
    /// until its TTL purge.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::FailedDelivery | Self::Cancelled | Self::Returned
        )
    }

    /// Returns the set of statuses that are valid successors of `self`.
    ///
    /// Every non-terminal status may be cancelled. `failed_delivery` admits
    /// the single `returned` follow-up that closes the record out back at
    /// the vendor.
    pub fn valid_transitions(&self) -> &'static [DeliveryStatus] {
        match self {
            Self::PendingAssignment => &[Self::Assigned, Self::Cancelled],
            Self::Assigned => &[Self::PickingUp, Self::FailedAttempt, Self::Cancelled],
            Self::PickingUp => &[Self::InTransit, Self::FailedAttempt, Self::Cancelled],
            Self::InTransit => &[Self::NearDestination, Self::FailedAttempt, Self::Cancelled],
            Self::NearDestination => &[Self::Delivered, Self::FailedDelivery, Self::Cancelled],
            Self::FailedAttempt => &[Self::InTransit, Self::FailedDelivery, Self::Cancelled],
            Self::FailedDelivery => &[Self::Returned],
            Self::Delivered | Self::Cancelled | Self::Returned => &[],
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is valid.
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Statuses in which a courier may report location updates.
    pub fn accepts_location_updates(&self) -> bool {
        matches!(
            self,
            Self::PickingUp | Self::InTransit | Self::NearDestination | Self::FailedAttempt
        )
    }

    /// Transitions only the assigned courier may perform: the physical
    /// movement of the package, through to its delivery or a failed
    /// attempt.
    pub fn is_courier_transition(&self) -> bool {
        matches!(
            self,
            Self::PickingUp
                | Self::InTransit
                | Self::NearDestination
                | Self::Delivered
                | Self::FailedAttempt
        )
    }
}

// ---------------------------------------------------------------------------
// Subdocuments
// ---------------------------------------------------------------------------

/// A geographic point reported by a courier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Degrees east.
    pub longitude: f64,
    /// Degrees north.
    pub latitude: f64,
}

/// One entry in the delivery tracking timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// When the event occurred.
    pub at: DateTime<Utc>,
    /// Status entered by this event.
    pub status: DeliveryStatus,
    /// Human-readable description.
    pub description: String,
    /// Courier location at the time, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// Who produced the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

/// Item info carried on the delivery (denormalized from the sale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryItem {
    /// Id of the product.
    pub product_id: String,
    /// SKU of the product.
    pub sku: String,
    /// Display name.
    pub name: String,
    /// Units to deliver.
    pub quantity: u32,
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// A delivery session created from a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Document id (uuid v4).
    pub id: String,
    /// Originating sale.
    pub sale_id: String,
    /// Profile id of the receiving client.
    pub client_profile_id: String,
    /// Profile id of the assigned courier, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier_profile_id: Option<String>,
    /// Items being delivered.
    pub items: Vec<DeliveryItem>,
    /// Pickup address.
    pub pickup_address: String,
    /// Destination address.
    pub delivery_address: String,
    /// Current status.
    pub current_status: DeliveryStatus,
    /// Append-only tracking timeline.
    pub tracking_history: Vec<TrackingEvent>,
    /// Last known courier location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<GeoPoint>,
    /// TTL anchor, set on terminal transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: &[DeliveryStatus] = &[
        DeliveryStatus::PendingAssignment,
        DeliveryStatus::Assigned,
        DeliveryStatus::PickingUp,
        DeliveryStatus::InTransit,
        DeliveryStatus::NearDestination,
        DeliveryStatus::Delivered,
        DeliveryStatus::FailedAttempt,
        DeliveryStatus::FailedDelivery,
        DeliveryStatus::Cancelled,
        DeliveryStatus::Returned,
    ];

    // -- Happy path through the machine ----------------------------------

    #[test]
    fn nominal_path_is_valid() {
        let path = [
            DeliveryStatus::PendingAssignment,
            DeliveryStatus::Assigned,
            DeliveryStatus::PickingUp,
            DeliveryStatus::InTransit,
            DeliveryStatus::NearDestination,
            DeliveryStatus::Delivered,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn failed_attempt_rejoins_transit() {
        assert!(DeliveryStatus::InTransit.can_transition_to(DeliveryStatus::FailedAttempt));
        assert!(DeliveryStatus::FailedAttempt.can_transition_to(DeliveryStatus::InTransit));
    }

    #[test]
    fn failed_delivery_can_only_be_returned() {
        assert_eq!(
            DeliveryStatus::FailedDelivery.valid_transitions(),
            &[DeliveryStatus::Returned]
        );
    }

    // -- Invalid transitions ---------------------------------------------

    #[test]
    fn skipping_states_rejected() {
        assert!(!DeliveryStatus::PendingAssignment.can_transition_to(DeliveryStatus::InTransit));
        assert!(!DeliveryStatus::Assigned.can_transition_to(DeliveryStatus::Delivered));
        assert!(!DeliveryStatus::PickingUp.can_transition_to(DeliveryStatus::NearDestination));
    }

    #[test]
    fn terminal_states_reject_everything() {
        for terminal in [
            DeliveryStatus::Delivered,
            DeliveryStatus::Cancelled,
            DeliveryStatus::Returned,
        ] {
            assert!(terminal.valid_transitions().is_empty(), "{terminal:?}");
        }
    }

    #[test]
    fn every_non_terminal_can_cancel() {
        for status in ALL_STATUSES {
            if status.is_terminal() {
                continue;
            }
            assert!(
                status.can_transition_to(DeliveryStatus::Cancelled),
                "{status:?} should be cancellable"
            );
        }
    }

    // -- Terminality and TTL ---------------------------------------------

    #[test]
    fn terminal_set_matches_retention_contract() {
        for status in ALL_STATUSES {
            let expected = matches!(
                status,
                DeliveryStatus::Delivered
                    | DeliveryStatus::FailedDelivery
                    | DeliveryStatus::Cancelled
                    | DeliveryStatus::Returned
            );
            assert_eq!(status.is_terminal(), expected, "{status:?}");
        }
    }

    // -- Location / courier rules ----------------------------------------

    #[test]
    fn location_updates_only_en_route() {
        assert!(DeliveryStatus::PickingUp.accepts_location_updates());
        assert!(DeliveryStatus::InTransit.accepts_location_updates());
        assert!(DeliveryStatus::NearDestination.accepts_location_updates());
        assert!(DeliveryStatus::FailedAttempt.accepts_location_updates());
        assert!(!DeliveryStatus::PendingAssignment.accepts_location_updates());
        assert!(!DeliveryStatus::Delivered.accepts_location_updates());
    }

    #[test]
    fn courier_only_transitions() {
        assert!(DeliveryStatus::Delivered.is_courier_transition());
        assert!(DeliveryStatus::FailedAttempt.is_courier_transition());
        assert!(DeliveryStatus::InTransit.is_courier_transition());
        assert!(!DeliveryStatus::Cancelled.is_courier_transition());
        assert!(!DeliveryStatus::Assigned.is_courier_transition());
        assert!(!DeliveryStatus::Returned.is_courier_transition());
    }

    // -- Serde -----------------------------------------------------------

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DeliveryStatus::PendingAssignment).unwrap(),
            "\"pending_assignment\""
        );
        assert_eq!(
            serde_json::to_string(&DeliveryStatus::NearDestination).unwrap(),
            "\"near_destination\""
        );
    }

    #[test]
    fn tracking_event_roundtrip() {
        let ev = TrackingEvent {
            at: Utc::now(),
            status: DeliveryStatus::InTransit,
            description: "moving".into(),
            location: Some(GeoPoint { longitude: -46.6, latitude: -23.5 }),
            actor_id: Some("courier-1".into()),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: TrackingEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }
}
