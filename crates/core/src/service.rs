use crate::util::is_http_retryable;

const MAX_ERROR_BODY: usize = 512;

/// Failure talking to an external collaborator (chat completion or
/// transcription). `service` names which one.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalServiceError {
    #[error("{service}: client setup failed: {message}")]
    Setup {
        service: &'static str,
        message: String,
    },

    #[error("{service}: network error: {message}")]
    Network {
        service: &'static str,
        message: String,
    },

    #[error("{service}: request timed out")]
    Timeout { service: &'static str },

    #[error("{service}: credentials rejected")]
    Unauthorized { service: &'static str },

    #[error("{service}: rate limited or quota exhausted")]
    RateLimited { service: &'static str },

    #[error("{service}: HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service}: invalid response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
}

impl ExternalServiceError {
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { service }
        } else {
            Self::Network {
                service,
                message: err.to_string(),
            }
        }
    }

    pub fn from_status(service: &'static str, status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { service },
            429 => Self::RateLimited { service },
            _ => Self::Status {
                service,
                status,
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => is_http_retryable(*status),
            Self::Setup { .. } | Self::Unauthorized { .. } | Self::InvalidResponse { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ExternalServiceError::from_status("llm", 401, ""),
            ExternalServiceError::Unauthorized { service: "llm" }
        );
        assert_eq!(
            ExternalServiceError::from_status("llm", 429, "slow down"),
            ExternalServiceError::RateLimited { service: "llm" }
        );
        assert!(matches!(
            ExternalServiceError::from_status("llm", 503, "busy"),
            ExternalServiceError::Status { status: 503, .. }
        ));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(10_000);
        match ExternalServiceError::from_status("llm", 500, &body) {
            ExternalServiceError::Status { body, .. } => assert_eq!(body.len(), MAX_ERROR_BODY),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn retryable_classification() {
        assert!(ExternalServiceError::Timeout { service: "llm" }.is_retryable());
        assert!(ExternalServiceError::from_status("llm", 502, "").is_retryable());
        assert!(!ExternalServiceError::from_status("llm", 400, "").is_retryable());
        assert!(!ExternalServiceError::Unauthorized { service: "llm" }.is_retryable());
        assert!(!ExternalServiceError::InvalidResponse {
            service: "llm",
            message: "no choices".to_owned()
        }
        .is_retryable());
    }
}
