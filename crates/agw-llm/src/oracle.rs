// SPDX-License-Identifier: MIT OR Apache-2.0
//! The LLM oracle seam.

use agw_error::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Outbound timeout for oracle calls.
const ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

/// An opaque text-in / text-out completion oracle.
#[async_trait]
pub trait LlmOracle: Send + Sync {
    /// Produce a completion for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, AgentError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CompleteRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct CompleteResponse {
    text: String,
}

/// Oracle over a provider-agnostic HTTP endpoint: `POST {base}/complete`
/// with `{"prompt": …}`, answering `{"text": …}`.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOracle {
    /// Create an oracle for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(ORACLE_TIMEOUT)
            .build()
            .map_err(|e| AgentError::internal(format!("oracle client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl LlmOracle for HttpOracle {
    async fn complete(&self, prompt: &str) -> Result<String, AgentError> {
        let url = format!("{}/complete", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&CompleteRequest { prompt })
            .send()
            .await
            .map_err(|e| AgentError::upstream(format!("oracle unreachable: {e}")))?;
        if !response.status().is_success() {
            return Err(AgentError::upstream(format!(
                "oracle answered {}",
                response.status()
            )));
        }
        let body: CompleteResponse = response
            .json()
            .await
            .map_err(|e| AgentError::upstream(format!("oracle reply undecodable: {e}")))?;
        Ok(body.text)
    }
}

// ---------------------------------------------------------------------------
// Scripted implementation
// ---------------------------------------------------------------------------

/// Test oracle answering from a queue of scripted replies.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedOracle {
    /// Create an oracle with the given replies, consumed in order.
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl LlmOracle for ScriptedOracle {
    async fn complete(&self, _prompt: &str) -> Result<String, AgentError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::upstream("scripted oracle exhausted"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use agw_error::ErrorCode;
    use wiremock::matchers::{body_json_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_oracle_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/complete"))
            .and(body_json_string(r#"{"prompt":"hello"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "{\"service\": \"ec2\"}"
            })))
            .mount(&server)
            .await;

        let oracle = HttpOracle::new(server.uri()).unwrap();
        let text = oracle.complete("hello").await.unwrap();
        assert_eq!(text, "{\"service\": \"ec2\"}");
    }

    #[tokio::test]
    async fn http_oracle_maps_server_errors_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/complete"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let oracle = HttpOracle::new(server.uri()).unwrap();
        let err = oracle.complete("x").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn scripted_oracle_consumes_in_order() {
        let oracle = ScriptedOracle::new(["one", "two"]);
        assert_eq!(oracle.complete("p").await.unwrap(), "one");
        assert_eq!(oracle.complete("p").await.unwrap(), "two");
        assert!(oracle.complete("p").await.is_err());
    }
}
