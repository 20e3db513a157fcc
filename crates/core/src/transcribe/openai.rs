use crate::config::{ApiKey, LlmConfig};
use crate::service::ExternalServiceError;
use crate::transcribe::{Transcriber, Transcript, SERVICE};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

/// Client for an OpenAI-compatible `/audio/transcriptions` endpoint.
#[derive(Clone)]
pub struct OpenAiTranscriber {
    client: Client,
    api_key: ApiKey,
    endpoint: Url,
    model: String,
    language: String,
}

impl OpenAiTranscriber {
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
            endpoint: config.endpoint("audio/transcriptions"),
            model: config.transcription_model.clone(),
            language: config.language.clone(),
        })
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl Transcriber for OpenAiTranscriber {
    fn transcribe(&self, wav: Bytes) -> BoxFuture<'_, Result<Transcript, ExternalServiceError>> {
        async move {
            let file = Part::bytes(wav.to_vec())
                .file_name("audio.wav")
                .mime_str("audio/wav")
                .map_err(|e| ExternalServiceError::Setup {
                    service: SERVICE,
                    message: e.to_string(),
                })?;
            let form = Form::new()
                .part("file", file)
                .text("model", self.model.clone())
                .text("language", self.language.clone());

            let response = self
                .client
                .post(self.endpoint.clone())
                .bearer_auth(self.api_key.expose())
                .multipart(form)
                .send()
                .await
                .map_err(|e| ExternalServiceError::from_reqwest(SERVICE, e))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ExternalServiceError::from_status(SERVICE, status.as_u16(), &text));
            }

            let parsed: TranscriptionResponse =
                response
                    .json()
                    .await
                    .map_err(|e| ExternalServiceError::InvalidResponse {
                        service: SERVICE,
                        message: e.to_string(),
                    })?;

            tracing::debug!(chars = parsed.text.len(), "transcript received");
            Ok(Transcript { text: parsed.text })
        }
        .boxed()
    }
}
