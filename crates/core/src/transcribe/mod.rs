mod openai;

use crate::service::ExternalServiceError;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiTranscriber;

pub const SERVICE: &str = "transcription";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
}

/// Speech-to-text over a complete WAV file held in memory.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, wav: Bytes) -> BoxFuture<'_, Result<Transcript, ExternalServiceError>>;
}

impl<T: Transcriber + ?Sized> Transcriber for std::sync::Arc<T> {
    fn transcribe(&self, wav: Bytes) -> BoxFuture<'_, Result<Transcript, ExternalServiceError>> {
        (**self).transcribe(wav)
    }
}
