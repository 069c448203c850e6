// SPDX-License-Identifier: MIT OR Apache-2.0
//! Profile management.

use crate::audit::AuditService;
use agw_core::RequestContext;
use agw_domain::{derive_full_name, new_id, Profile, ProfileKind};
use agw_error::AgentError;
use agw_store::{IdentifierField, ProfileStore, StoreError};
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed failures of the people service.
#[derive(Debug, thiserror::Error)]
pub enum PeopleError {
    /// No profile matches the identifier.
    #[error("profile '{0}' not found")]
    NotFound(String),

    /// Another profile already owns this unique identifier.
    #[error("a profile with this {field} already exists")]
    Duplicate {
        /// The colliding field.
        field: String,
    },

    /// The profile document violates its invariants.
    #[error("invalid profile")]
    Invalid(Vec<String>),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PeopleError> for AgentError {
    fn from(err: PeopleError) -> Self {
        match err {
            PeopleError::NotFound(_) => AgentError::entity_not_found(err.to_string()),
            PeopleError::Duplicate { ref field } => {
                let field = field.clone();
                AgentError::conflict(err.to_string()).with_details(json!({"field": field}))
            }
            PeopleError::Invalid(errors) => AgentError::validation_failed(errors),
            PeopleError::Store(inner) => AgentError::dependency(inner.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Input to [`PeopleService::create_profile`].
#[derive(Debug, Clone, Default)]
pub struct CreateProfileInput {
    /// Platform account id.
    pub user_id: Option<String>,
    /// External-system id.
    pub external_id: Option<String>,
    /// WhatsApp identity.
    pub whatsapp_id: Option<String>,
    /// E-mail address.
    pub email: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Kind of party; defaults to client.
    pub kind: Option<ProfileKind>,
    /// Initial roles.
    pub roles: BTreeSet<String>,
}

/// Partial update for [`PeopleService::update_profile`]. Absent fields are
/// left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileInput {
    /// New e-mail address.
    pub email: Option<String>,
    /// New phone number.
    pub phone: Option<String>,
    /// New given name.
    pub first_name: Option<String>,
    /// New family name.
    pub last_name: Option<String>,
    /// New active flag.
    pub active: Option<bool>,
}

// ---------------------------------------------------------------------------
// PeopleService
// ---------------------------------------------------------------------------

/// Business rules for profiles.
#[derive(Clone)]
pub struct PeopleService {
    profiles: Arc<dyn ProfileStore>,
    audit: AuditService,
}

impl PeopleService {
    /// Wire a service over its collaborators.
    pub fn new(profiles: Arc<dyn ProfileStore>, audit: AuditService) -> Self {
        Self { profiles, audit }
    }

    /// Create a profile. `full_name` is derived server-side.
    pub async fn create_profile(
        &self,
        input: CreateProfileInput,
        ctx: &RequestContext,
    ) -> Result<Profile, PeopleError> {
        let now = Utc::now();
        let profile = Profile {
            id: new_id(),
            user_id: input.user_id,
            external_id: input.external_id,
            whatsapp_id: input.whatsapp_id,
            email: input.email,
            phone: input.phone,
            full_name: derive_full_name(input.first_name.as_deref(), input.last_name.as_deref()),
            first_name: input.first_name,
            last_name: input.last_name,
            kind: input.kind.unwrap_or(ProfileKind::Client),
            roles: input.roles,
            active: true,
            created_at: now,
            updated_at: now,
        };
        profile.validate().map_err(PeopleError::Invalid)?;

        match self.profiles.insert(&profile).await {
            Ok(()) => {}
            Err(StoreError::DuplicateKey { field }) => {
                return Err(PeopleError::Duplicate { field })
            }
            Err(err) => return Err(err.into()),
        }
        info!(profile_id = %profile.id, "profile created");

        self.audit
            .record(
                ctx,
                "create_profile",
                Some(("profile", &profile.id)),
                true,
                json!({"kind": profile.kind}),
                None,
                None,
            )
            .await;
        Ok(profile)
    }

    /// Fetch a profile by id.
    pub async fn get_profile(&self, id: &str) -> Result<Profile, PeopleError> {
        self.profiles
            .get(id)
            .await?
            .ok_or_else(|| PeopleError::NotFound(id.to_string()))
    }

    /// Find a profile by the first identifier provided, probing in the
    /// order `user_id`, `email`, `whatsapp_id`, `external_id`.
    pub async fn find_profile(
        &self,
        user_id: Option<&str>,
        email: Option<&str>,
        whatsapp_id: Option<&str>,
        external_id: Option<&str>,
    ) -> Result<Option<Profile>, PeopleError> {
        let probe = [
            (IdentifierField::UserId, user_id),
            (IdentifierField::Email, email),
            (IdentifierField::WhatsappId, whatsapp_id),
            (IdentifierField::ExternalId, external_id),
        ];
        for (field, value) in probe {
            if let Some(value) = value {
                return Ok(self.profiles.find_by_identifier(field, value).await?);
            }
        }
        Ok(None)
    }

    /// Apply a partial update. Touching either name part re-derives
    /// `full_name`.
    pub async fn update_profile(
        &self,
        id: &str,
        input: UpdateProfileInput,
    ) -> Result<Profile, PeopleError> {
        let mut profile = self.get_profile(id).await?;

        if let Some(email) = input.email {
            profile.email = Some(email);
        }
        if let Some(phone) = input.phone {
            profile.phone = Some(phone);
        }
        let names_touched = input.first_name.is_some() || input.last_name.is_some();
        if let Some(first_name) = input.first_name {
            profile.first_name = Some(first_name);
        }
        if let Some(last_name) = input.last_name {
            profile.last_name = Some(last_name);
        }
        if names_touched {
            profile.full_name =
                derive_full_name(profile.first_name.as_deref(), profile.last_name.as_deref());
        }
        if let Some(active) = input.active {
            profile.active = active;
        }
        profile.updated_at = Utc::now();
        profile.validate().map_err(PeopleError::Invalid)?;

        match self.profiles.update(&profile).await {
            Ok(true) => Ok(profile),
            Ok(false) => Err(PeopleError::NotFound(id.to_string())),
            Err(StoreError::DuplicateKey { field }) => Err(PeopleError::Duplicate { field }),
            Err(err) => Err(err.into()),
        }
    }

    /// Idempotently grant a role.
    pub async fn add_role(&self, id: &str, role: &str) -> Result<(), PeopleError> {
        if self.profiles.add_role(id, role).await? {
            Ok(())
        } else {
            Err(PeopleError::NotFound(id.to_string()))
        }
    }

    /// Idempotently revoke a role.
    pub async fn remove_role(&self, id: &str, role: &str) -> Result<(), PeopleError> {
        if self.profiles.remove_role(id, role).await? {
            Ok(())
        } else {
            Err(PeopleError::NotFound(id.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
