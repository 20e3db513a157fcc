use crate::classify::ModelError;
use crate::pipeline::PipelineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

pub mod codes {
    pub const MISSING_AUDIO: &str = "missing_audio";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const DECODE_ERROR: &str = "decode_error";
    pub const NO_VOICED_SEGMENTS: &str = "no_voiced_segments";
    pub const MODEL_ERROR: &str = "model_error";
    pub const UPSTREAM_TIMEOUT: &str = "upstream_timeout";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// Every failure a handler can return; the only place errors become HTTP
/// responses.
#[derive(Debug)]
pub enum ApiError {
    MissingAudio,
    /// Multipart body could not be read; carries the extractor's status.
    Upload { status: StatusCode, message: String },
    Pipeline(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::MissingAudio => (StatusCode::BAD_REQUEST, codes::MISSING_AUDIO),
            Self::Upload { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                (StatusCode::PAYLOAD_TOO_LARGE, codes::PAYLOAD_TOO_LARGE)
            }
            Self::Upload { status, .. } if status.is_client_error() => {
                (*status, codes::INVALID_REQUEST)
            }
            Self::Upload { .. } => (StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL_ERROR),
            Self::Pipeline(err) => match err {
                PipelineError::Validation(_) => (StatusCode::BAD_REQUEST, codes::INVALID_REQUEST),
                PipelineError::Decode(_) => (StatusCode::BAD_REQUEST, codes::DECODE_ERROR),
                PipelineError::Model(ModelError::NoVoicedSegments) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, codes::NO_VOICED_SEGMENTS)
                }
                PipelineError::Model(_) => (StatusCode::INTERNAL_SERVER_ERROR, codes::MODEL_ERROR),
                PipelineError::External(e) if e.is_timeout() => {
                    (StatusCode::GATEWAY_TIMEOUT, codes::UPSTREAM_TIMEOUT)
                }
                PipelineError::External(_) => (StatusCode::BAD_GATEWAY, codes::UPSTREAM_ERROR),
                PipelineError::Config(_) | PipelineError::Worker(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL_ERROR)
                }
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::MissingAudio => "no audio attached (expected multipart field `file` or `audio`)".to_owned(),
            Self::Upload { message, .. } => message.clone(),
            Self::Pipeline(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let error = self.message();
        if status.is_server_error() {
            tracing::error!(%status, code, %error, "request failed");
        } else {
            tracing::warn!(%status, code, %error, "request rejected");
        }
        (status, Json(ErrorBody { error, code })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ExternalServiceError;

    fn status(err: PipelineError) -> (StatusCode, &'static str) {
        ApiError::from(err).status_and_code()
    }

    #[test]
    fn pipeline_errors_map_to_distinct_statuses() {
        assert_eq!(
            status(PipelineError::Model(ModelError::NoVoicedSegments)),
            (StatusCode::UNPROCESSABLE_ENTITY, codes::NO_VOICED_SEGMENTS)
        );
        assert_eq!(
            status(PipelineError::Model(ModelError::DimensionMismatch {
                expected: 13,
                actual: 3900
            }))
            .0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(PipelineError::External(ExternalServiceError::Timeout {
                service: "chat-completion"
            })),
            (StatusCode::GATEWAY_TIMEOUT, codes::UPSTREAM_TIMEOUT)
        );
        assert_eq!(
            status(PipelineError::External(ExternalServiceError::RateLimited {
                service: "chat-completion"
            }))
            .0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn upload_errors_keep_their_status() {
        let too_large = ApiError::Upload {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "length limit exceeded".to_owned(),
        };
        assert_eq!(
            too_large.status_and_code(),
            (StatusCode::PAYLOAD_TOO_LARGE, codes::PAYLOAD_TOO_LARGE)
        );
        let malformed = ApiError::Upload {
            status: StatusCode::BAD_REQUEST,
            message: "bad boundary".to_owned(),
        };
        assert_eq!(
            malformed.status_and_code(),
            (StatusCode::BAD_REQUEST, codes::INVALID_REQUEST)
        );
    }

    #[test]
    fn missing_audio_is_bad_request() {
        assert_eq!(
            ApiError::MissingAudio.status_and_code(),
            (StatusCode::BAD_REQUEST, codes::MISSING_AUDIO)
        );
    }
}
