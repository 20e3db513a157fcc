//! Mood label + user text to a chat request, and the call that answers it.

use crate::llm::{ChatClient, ChatRequest, MAX_RESPONSE_TOKENS, SERVICE, SYSTEM_PROMPT};
use crate::mood::{MoodLabel, PreambleTable};
use crate::service::ExternalServiceError;
use crate::util::{retry_with_backoff, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

pub struct PromptComposer<C> {
    client: C,
    preambles: Arc<PreambleTable>,
    timeout: Duration,
    retry: RetryConfig,
}

impl<C: ChatClient> PromptComposer<C> {
    pub fn new(client: C, preambles: Arc<PreambleTable>, timeout: Duration, retry: RetryConfig) -> Self {
        Self {
            client,
            preambles,
            timeout,
            retry,
        }
    }

    /// Preamble for `label` (or the fallback) followed by the user's text.
    pub fn compose(&self, label: MoodLabel, text: &str) -> ChatRequest {
        compose_request(&self.preambles, label, text)
    }

    /// Sends the composed request and returns the trimmed reply. Each attempt is
    /// bounded by the configured timeout; only retryable failures are retried.
    pub async fn respond(&self, label: MoodLabel, text: &str) -> Result<String, ExternalServiceError> {
        let request = self.compose(label, text);
        let reply = retry_with_backoff(
            &self.retry,
            SERVICE,
            || {
                let request = request.clone();
                async move {
                    match tokio::time::timeout(self.timeout, self.client.complete(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(ExternalServiceError::Timeout { service: SERVICE }),
                    }
                }
            },
            ExternalServiceError::is_retryable,
        )
        .await
        .inspect_err(|e| tracing::error!(error = %e, %label, "chat completion failed"))?;

        Ok(reply.trim().to_owned())
    }
}

pub fn compose_request(preambles: &PreambleTable, label: MoodLabel, text: &str) -> ChatRequest {
    let preamble = preambles.resolve(label);
    let mut instruction = String::with_capacity(preamble.len() + text.len());
    instruction.push_str(preamble);
    instruction.push_str(text);
    ChatRequest {
        system: SYSTEM_PROMPT.to_owned(),
        instruction,
        max_tokens: MAX_RESPONSE_TOKENS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mood::{FALLBACK_PREAMBLE, FEAR_PREAMBLE};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ChatClient for RecordingClient {
        fn complete(&self, request: ChatRequest) -> BoxFuture<'_, Result<String, ExternalServiceError>> {
            self.seen.lock().unwrap().push(request);
            async { Ok("  take a deep breath \n".to_owned()) }.boxed()
        }
    }

    struct HangingClient;

    impl ChatClient for HangingClient {
        fn complete(&self, _request: ChatRequest) -> BoxFuture<'_, Result<String, ExternalServiceError>> {
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("too late".to_owned())
            }
            .boxed()
        }
    }

    struct FailingClient {
        calls: AtomicU32,
        error: ExternalServiceError,
    }

    impl ChatClient for FailingClient {
        fn complete(&self, _request: ChatRequest) -> BoxFuture<'_, Result<String, ExternalServiceError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let error = self.error.clone();
            async move { Err(error) }.boxed()
        }
    }

    fn composer<C: ChatClient>(client: C, retry: RetryConfig) -> PromptComposer<C> {
        PromptComposer::new(
            client,
            Arc::new(PreambleTable::default()),
            Duration::from_millis(50),
            retry,
        )
    }

    #[test]
    fn fear_label_uses_fear_preamble_and_token_cap() {
        let req = compose_request(&PreambleTable::default(), MoodLabel(0), "I'm scared");
        assert!(req.instruction.starts_with(FEAR_PREAMBLE));
        assert!(req.instruction.ends_with("I'm scared"));
        assert_eq!(req.max_tokens, 150);
        assert_eq!(req.system, SYSTEM_PROMPT);
    }

    #[test]
    fn unmapped_label_falls_back_to_generic_preamble() {
        let req = compose_request(&PreambleTable::default(), MoodLabel(99), "hello");
        assert_eq!(req.instruction, format!("{FALLBACK_PREAMBLE}hello"));
    }

    #[tokio::test]
    async fn reply_is_trimmed_and_request_forwarded() {
        let c = composer(RecordingClient::default(), RetryConfig::once());
        let reply = c.respond(MoodLabel(0), "I'm scared").await.unwrap();
        assert_eq!(reply, "take a deep breath");
        let seen = c.client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].instruction.starts_with(FEAR_PREAMBLE));
    }

    #[tokio::test]
    async fn hung_client_times_out() {
        let c = composer(HangingClient, RetryConfig::once());
        let err = c.respond(MoodLabel(1), "hi").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn retryable_errors_are_retried_up_to_the_limit() {
        let client = FailingClient {
            calls: AtomicU32::new(0),
            error: ExternalServiceError::from_status(SERVICE, 503, "busy"),
        };
        let c = composer(client, RetryConfig::new(3, Duration::from_millis(1)));
        assert!(c.respond(MoodLabel(1), "hi").await.is_err());
        assert_eq!(c.client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let client = FailingClient {
            calls: AtomicU32::new(0),
            error: ExternalServiceError::Unauthorized { service: SERVICE },
        };
        let c = composer(client, RetryConfig::new(3, Duration::from_millis(1)));
        let err = c.respond(MoodLabel(1), "hi").await.unwrap_err();
        assert_eq!(err, ExternalServiceError::Unauthorized { service: SERVICE });
        assert_eq!(c.client.calls.load(Ordering::SeqCst), 1);
    }
}
