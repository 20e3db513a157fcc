use crate::config::{ApiKey, LlmConfig};
use crate::llm::{ChatClient, ChatRequest, SERVICE};
use crate::service::ExternalServiceError;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use url::Url;

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiChatClient {
    client: Client,
    api_key: ApiKey,
    endpoint: Url,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig, api_key: ApiKey) -> Result<Self, ExternalServiceError> {
        let client = Client::builder()
            .timeout(config.timeout.duration())
            .build()
            .map_err(|e| ExternalServiceError::Setup {
                service: SERVICE,
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint("chat/completions"),
            model: config.chat_model.clone(),
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatClient for OpenAiChatClient {
    fn complete(&self, request: ChatRequest) -> BoxFuture<'_, Result<String, ExternalServiceError>> {
        async move {
            let body = CompletionRequest {
                model: &self.model,
                messages: [
                    Message {
                        role: "system",
                        content: &request.system,
                    },
                    Message {
                        role: "user",
                        content: &request.instruction,
                    },
                ],
                max_tokens: request.max_tokens,
            };

            let started = Instant::now();
            let response = self
                .client
                .post(self.endpoint.clone())
                .bearer_auth(self.api_key.expose())
                .json(&body)
                .send()
                .await
                .map_err(|e| ExternalServiceError::from_reqwest(SERVICE, e))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ExternalServiceError::from_status(SERVICE, status.as_u16(), &text));
            }

            let parsed: CompletionResponse =
                response
                    .json()
                    .await
                    .map_err(|e| ExternalServiceError::InvalidResponse {
                        service: SERVICE,
                        message: e.to_string(),
                    })?;

            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| ExternalServiceError::InvalidResponse {
                    service: SERVICE,
                    message: "no message content in choices".to_owned(),
                })?;

            tracing::debug!(
                model = %self.model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                chars = content.len(),
                "chat completion received"
            );
            Ok(content)
        }
        .boxed()
    }
}
