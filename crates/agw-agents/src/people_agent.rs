// SPDX-License-Identifier: MIT OR Apache-2.0
//! People agent: MCP façade over the profile service.

use crate::agent::{parse_payload, ActionSpec, Agent, ValidatePayload};
use crate::services::SharedServices;
use agw_core::RequestContext;
use agw_domain::ProfileKind;
use agw_error::AgentError;
use agw_services::{CreateProfileInput, PeopleService, UpdateProfileInput};
use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Registry name of the people agent.
pub const PEOPLE_AGENT_NAME: &str = "agentos_people";

/// Roles allowed to mutate profiles.
const PROFILE_WRITER_ROLES: &[&str] = &["admin", "system"];

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateProfilePayload {
    /// Platform account id.
    #[serde(default)]
    user_id: Option<String>,
    /// External-system id.
    #[serde(default)]
    external_id: Option<String>,
    /// WhatsApp identity.
    #[serde(default)]
    whatsapp_id: Option<String>,
    /// E-mail address.
    #[serde(default)]
    email: Option<String>,
    /// Phone number.
    #[serde(default)]
    phone: Option<String>,
    /// Given name.
    #[serde(default)]
    first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    last_name: Option<String>,
    /// Kind of party (snake_case, defaults to `"client"`).
    #[serde(default)]
    kind: Option<String>,
    /// Initial roles.
    #[serde(default)]
    roles: Vec<String>,
}

impl ValidatePayload for CreateProfilePayload {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.user_id.is_none()
            && self.external_id.is_none()
            && self.whatsapp_id.is_none()
            && self.email.is_none()
        {
            errors.push(
                "at least one of user_id, external_id, whatsapp_id, email is required".into(),
            );
        }
        if let Some(kind) = &self.kind {
            if parse_kind(kind).is_none() {
                errors.push(format!("'{kind}' is not a profile kind"));
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GetProfilePayload {
    /// Profile id.
    profile_id: String,
}

impl ValidatePayload for GetProfilePayload {}

#[derive(Debug, Deserialize, JsonSchema)]
struct FindProfilePayload {
    /// Platform account id.
    #[serde(default)]
    user_id: Option<String>,
    /// E-mail address.
    #[serde(default)]
    email: Option<String>,
    /// WhatsApp identity.
    #[serde(default)]
    whatsapp_id: Option<String>,
    /// External-system id.
    #[serde(default)]
    external_id: Option<String>,
}

impl ValidatePayload for FindProfilePayload {
    fn validate(&self) -> Result<(), Vec<String>> {
        if self.user_id.is_none()
            && self.email.is_none()
            && self.whatsapp_id.is_none()
            && self.external_id.is_none()
        {
            Err(vec!["at least one identifier is required".into()])
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdateProfilePayload {
    /// Profile id.
    profile_id: String,
    /// New e-mail address.
    #[serde(default)]
    email: Option<String>,
    /// New phone number.
    #[serde(default)]
    phone: Option<String>,
    /// New given name.
    #[serde(default)]
    first_name: Option<String>,
    /// New family name.
    #[serde(default)]
    last_name: Option<String>,
    /// New active flag.
    #[serde(default)]
    active: Option<bool>,
}

impl ValidatePayload for UpdateProfilePayload {}

#[derive(Debug, Deserialize, JsonSchema)]
struct RolePayload {
    /// Profile id.
    profile_id: String,
    /// Role to grant or revoke.
    role: String,
}

impl ValidatePayload for RolePayload {
    fn validate(&self) -> Result<(), Vec<String>> {
        if self.role.trim().is_empty() {
            Err(vec!["role must not be empty".into()])
        } else {
            Ok(())
        }
    }
}

fn parse_kind(raw: &str) -> Option<ProfileKind> {
    serde_json::from_value(Value::String(raw.to_string())).ok()
}

// ---------------------------------------------------------------------------
// PeopleAgent
// ---------------------------------------------------------------------------

const ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "create_profile",
        required_roles: PROFILE_WRITER_ROLES,
        schema: || schema_for!(CreateProfilePayload),
    },
    ActionSpec {
        name: "get_profile",
        required_roles: &[],
        schema: || schema_for!(GetProfilePayload),
    },
    ActionSpec {
        name: "find_profile",
        required_roles: &[],
        schema: || schema_for!(FindProfilePayload),
    },
    ActionSpec {
        name: "update_profile",
        required_roles: PROFILE_WRITER_ROLES,
        schema: || schema_for!(UpdateProfilePayload),
    },
    ActionSpec {
        name: "add_role",
        required_roles: &["admin"],
        schema: || schema_for!(RolePayload),
    },
    ActionSpec {
        name: "remove_role",
        required_roles: &["admin"],
        schema: || schema_for!(RolePayload),
    },
];

/// Agent handling profile actions.
pub struct PeopleAgent {
    service: PeopleService,
}

impl PeopleAgent {
    /// Build the agent from the shared-services bundle.
    pub fn new(services: &SharedServices) -> Self {
        let service = PeopleService::new(services.profiles.clone(), services.audit());
        Self { service }
    }
}

#[async_trait]
impl Agent for PeopleAgent {
    fn name(&self) -> &'static str {
        PEOPLE_AGENT_NAME
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
            "create_profile" => {
                let payload: CreateProfilePayload = parse_payload(data)?;
                let kind = payload.kind.as_deref().and_then(parse_kind);
                let input = CreateProfileInput {
                    user_id: payload.user_id,
                    external_id: payload.external_id,
                    whatsapp_id: payload.whatsapp_id,
                    email: payload.email,
                    phone: payload.phone,
                    first_name: payload.first_name,
                    last_name: payload.last_name,
                    kind,
                    roles: payload.roles.into_iter().collect::<BTreeSet<_>>(),
                };
                let profile = self.service.create_profile(input, ctx).await?;
                to_value(&profile)
            }
            "get_profile" => {
                let payload: GetProfilePayload = parse_payload(data)?;
                let profile = self.service.get_profile(&payload.profile_id).await?;
                to_value(&profile)
            }
            "find_profile" => {
                let payload: FindProfilePayload = parse_payload(data)?;
                let found = self
                    .service
                    .find_profile(
                        payload.user_id.as_deref(),
                        payload.email.as_deref(),
                        payload.whatsapp_id.as_deref(),
                        payload.external_id.as_deref(),
                    )
                    .await?;
                Ok(json!({"profile": found}))
            }
            "update_profile" => {
                let payload: UpdateProfilePayload = parse_payload(data)?;
                let input = UpdateProfileInput {
                    email: payload.email,
                    phone: payload.phone,
                    first_name: payload.first_name,
                    last_name: payload.last_name,
                    active: payload.active,
                };
                let profile = self
                    .service
                    .update_profile(&payload.profile_id, input)
                    .await?;
                to_value(&profile)
            }
            "add_role" => {
                let payload: RolePayload = parse_payload(data)?;
                self.service.add_role(&payload.profile_id, &payload.role).await?;
                Ok(json!({"profile_id": payload.profile_id, "role": payload.role, "granted": true}))
            }
            "remove_role" => {
                let payload: RolePayload = parse_payload(data)?;
                self.service
                    .remove_role(&payload.profile_id, &payload.role)
                    .await?;
                Ok(json!({"profile_id": payload.profile_id, "role": payload.role, "granted": false}))
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
    use agw_error::ErrorCode;

    fn agent() -> PeopleAgent {
        PeopleAgent::new(&SharedServices::in_memory())
    }

    fn admin() -> RequestContext {
        RequestContext::authoritative(
            None,
            &Principal::new("admin-1", ["admin"]),
            TraceContext::with_trace_id("t"),
        )
    }

    fn viewer() -> RequestContext {
        RequestContext::authoritative(
            None,
            &Principal::new("viewer-1", ["viewer"]),
            TraceContext::with_trace_id("t"),
        )
    }

    #[tokio::test]
    async fn create_then_get_by_each_identifier() {
        let agent = agent();
        let created = agent
            .execute(
                McpPayload::new(
                    "create_profile",
                    json!({
                        "whatsapp_id": "wa-1",
                        "email": "ada@example.com",
                        "first_name": "Ada",
                        "last_name": "Lovelace",
                        "kind": "client"
                    }),
                ),
                &admin(),
            )
            .await
            .unwrap();
        assert_eq!(created["full_name"], "Ada Lovelace");
        let id = created["id"].as_str().unwrap();

        let fetched = agent
            .execute(
                McpPayload::new("get_profile", json!({"profile_id": id})),
                &viewer(),
            )
            .await
            .unwrap();
        assert_eq!(fetched, created);

        for query in [
            json!({"email": "ada@example.com"}),
            json!({"whatsapp_id": "wa-1"}),
        ] {
            let found = agent
                .execute(McpPayload::new("find_profile", query), &viewer())
                .await
                .unwrap();
            assert_eq!(found["profile"]["id"], id);
        }
    }

    #[tokio::test]
    async fn create_requires_writer_role() {
        let agent = agent();
        let err = agent
            .execute(
                McpPayload::new("create_profile", json!({"whatsapp_id": "wa-1"})),
                &viewer(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_with_field_details() {
        let agent = agent();
        agent
            .execute(
                McpPayload::new(
                    "create_profile",
                    json!({"email": "dup@example.com", "whatsapp_id": "wa-1"}),
                ),
                &admin(),
            )
            .await
            .unwrap();
        let err = agent
            .execute(
                McpPayload::new(
                    "create_profile",
                    json!({"email": "dup@example.com", "whatsapp_id": "wa-2"}),
                ),
                &admin(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
        assert_eq!(err.details.unwrap()["field"], "email");
    }

    #[tokio::test]
    async fn invalid_kind_rejected() {
        let agent = agent();
        let err = agent
            .execute(
                McpPayload::new(
                    "create_profile",
                    json!({"whatsapp_id": "wa-1", "kind": "overlord"}),
                ),
                &admin(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn find_requires_an_identifier() {
        let agent = agent();
        let err = agent
            .execute(McpPayload::new("find_profile", json!({})), &viewer())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn role_management_roundtrip() {
        let agent = agent();
        let created = agent
            .execute(
                McpPayload::new("create_profile", json!({"whatsapp_id": "wa-c"})),
                &admin(),
            )
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();

        agent
            .execute(
                McpPayload::new("add_role", json!({"profile_id": id, "role": "courier"})),
                &admin(),
            )
            .await
            .unwrap();
        let fetched = agent
            .execute(
                McpPayload::new("get_profile", json!({"profile_id": id})),
                &viewer(),
            )
            .await
            .unwrap();
        assert_eq!(fetched["roles"][0], "courier");

        agent
            .execute(
                McpPayload::new("remove_role", json!({"profile_id": id, "role": "courier"})),
                &admin(),
            )
            .await
            .unwrap();
        let fetched = agent
            .execute(
                McpPayload::new("get_profile", json!({"profile_id": id})),
                &viewer(),
            )
            .await
            .unwrap();
        assert!(fetched["roles"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_rederives_full_name() {
        let agent = agent();
        let created = agent
            .execute(
                McpPayload::new(
                    "create_profile",
                    json!({"whatsapp_id": "wa-u", "first_name": "Ada", "last_name": "Lovelace"}),
                ),
                &admin(),
            )
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();

        let updated = agent
            .execute(
                McpPayload::new(
                    "update_profile",
                    json!({"profile_id": id, "last_name": "King"}),
                ),
                &admin(),
            )
            .await
            .unwrap();
        assert_eq!(updated["full_name"], "Ada King");
    }
}
