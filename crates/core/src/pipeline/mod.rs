use crate::{
    classify::{reconcile, AudioVerdict, ModelError},
    config::AppConfig,
    context::ModelContext,
    decode::{decode_wav, DecodeError},
    llm::ChatClient,
    mood::MoodLabel,
    prompt::PromptComposer,
    service::ExternalServiceError,
    transcribe::{Transcriber, SERVICE as TRANSCRIPTION_SERVICE},
    util::{retry_with_backoff, RetryConfig},
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("pipeline misconfigured: {0}")]
    Config(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    External(#[from] ExternalServiceError),
    #[error("worker task failed: {0}")]
    Worker(String),
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub default_user_text: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl PipelineConfig {
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            default_user_text: app.default_user_text.clone(),
            timeout: app.llm.timeout.duration(),
            retry: app.retry.clone(),
        }
    }
}

/// One uploaded clip. The bytes live only as long as the request does.
#[derive(Clone, Debug)]
pub struct AudioUpload {
    pub wav: Bytes,
    pub text: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct MoodReply {
    pub response: String,
    pub label: MoodLabel,
    pub audio_label: MoodLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_label: Option<MoodLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// Decode, extract and classify. CPU-bound; callers on an async runtime should
/// run it on a blocking thread.
pub fn classify_audio(context: &ModelContext, wav: &[u8]) -> Result<AudioVerdict, PipelineError> {
    let waveform = decode_wav(wav).inspect_err(|e| tracing::error!(error = %e, "decode failed"))?;
    let features = context.extractor().extract(&waveform)?;
    tracing::debug!(
        vectors = features.len(),
        duration_ms = waveform.duration().as_millis() as u64,
        "features extracted"
    );
    Ok(context.audio().classify(&features)?)
}

pub struct MoodPipeline {
    context: Arc<ModelContext>,
    composer: PromptComposer<Arc<dyn ChatClient>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    config: PipelineConfig,
}

impl MoodPipeline {
    pub fn new(
        context: Arc<ModelContext>,
        chat: Arc<dyn ChatClient>,
        transcriber: Option<Arc<dyn Transcriber>>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if context.mode().text_fusion && (transcriber.is_none() || context.text().is_none()) {
            return Err(PipelineError::Config(format!(
                "{} mode needs a transcriber and a text classifier",
                context.mode()
            )));
        }
        let composer = PromptComposer::new(
            chat,
            context.preambles(),
            config.timeout,
            config.retry.clone(),
        );
        Ok(Self {
            context,
            composer,
            transcriber,
            config,
        })
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    pub async fn process(&self, upload: AudioUpload) -> Result<MoodReply, PipelineError> {
        let request_id = format!("{:016x}", rand::random::<u64>());
        let span = tracing::info_span!("mood_request", %request_id, mode = %self.context.mode());
        self.run(upload).instrument(span).await
    }

    async fn run(&self, upload: AudioUpload) -> Result<MoodReply, PipelineError> {
        let started = Instant::now();
        if upload.wav.is_empty() {
            return Err(PipelineError::Validation("uploaded audio is empty".to_owned()));
        }

        let context = Arc::clone(&self.context);
        let wav = upload.wav.clone();
        let verdict = tokio::task::spawn_blocking(move || classify_audio(&context, &wav))
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))??;

        let (label, text_label, transcript, user_text) =
            match (&self.transcriber, self.context.text()) {
                (Some(transcriber), Some(text_classifier)) if self.context.mode().text_fusion => {
                    let transcript = self.transcribe(transcriber.as_ref(), upload.wav).await?;
                    let text_label = text_classifier.classify(&transcript)?;
                    let label = reconcile(verdict.label, text_label);
                    (label, Some(text_label), Some(transcript.clone()), transcript)
                }
                _ => {
                    let text = upload
                        .text
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| self.config.default_user_text.clone());
                    (verdict.label, None, None, text)
                }
            };

        let response = self.composer.respond(label, &user_text).await?;

        tracing::info!(
            %label,
            audio_label = %verdict.label,
            text_label = ?text_label,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "mood request complete"
        );

        Ok(MoodReply {
            response,
            label,
            audio_label: verdict.label,
            text_label,
            transcript,
        })
    }

    async fn transcribe(
        &self,
        transcriber: &dyn Transcriber,
        wav: Bytes,
    ) -> Result<String, ExternalServiceError> {
        let timeout = self.config.timeout;
        let transcript = retry_with_backoff(
            &self.config.retry,
            TRANSCRIPTION_SERVICE,
            || {
                let wav = wav.clone();
                async move {
                    match tokio::time::timeout(timeout, transcriber.transcribe(wav)).await {
                        Ok(result) => result,
                        Err(_) => Err(ExternalServiceError::Timeout {
                            service: TRANSCRIPTION_SERVICE,
                        }),
                    }
                }
            },
            ExternalServiceError::is_retryable,
        )
        .await
        .inspect_err(|e| tracing::error!(error = %e, "transcription failed"))?;
        Ok(transcript.text)
    }
}
