mod openai;

use crate::service::ExternalServiceError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiChatClient;

pub const SERVICE: &str = "chat-completion";

/// Output length cap sent with every chat request.
pub const MAX_RESPONSE_TOKENS: u32 = 150;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// One chat-completion call: a fixed system message plus the composed
/// instruction as the user message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: String,
    pub instruction: String,
    pub max_tokens: u32,
}

pub trait ChatClient: Send + Sync {
    fn complete(&self, request: ChatRequest) -> BoxFuture<'_, Result<String, ExternalServiceError>>;
}

impl<C: ChatClient + ?Sized> ChatClient for std::sync::Arc<C> {
    fn complete(&self, request: ChatRequest) -> BoxFuture<'_, Result<String, ExternalServiceError>> {
        (**self).complete(request)
    }
}
