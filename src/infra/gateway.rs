//! AI gateway client speaking the OpenAI chat-completions dialect.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::application::summary::{CompletionClient, CompletionError, CompletionRequest};
use crate::config::SummarySettings;

use super::error::InfraError;
use super::posthog::ensure_trailing_slash;

const COMPLETIONS_PATH: &str = "chat/completions";

#[derive(Clone, Debug)]
pub struct GatewayClient {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl GatewayClient {
    /// Returns `None` when no gateway key is configured.
    pub fn from_settings(settings: &SummarySettings) -> Result<Option<Self>, InfraError> {
        let Some(api_key) = settings.api_key.clone() else {
            return Ok(None);
        };

        let client = Client::builder()
            .user_agent(concat!("weblog/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        let base = ensure_trailing_slash(settings.gateway_url.clone());
        let endpoint = base.join(COMPLETIONS_PATH).map_err(|err| {
            InfraError::configuration(format!("invalid gateway url `{base}`: {err}"))
        })?;

        Ok(Some(Self {
            client,
            endpoint,
            api_key,
        }))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for GatewayClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}
