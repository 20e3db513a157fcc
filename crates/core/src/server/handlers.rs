use crate::pipeline::{AudioUpload, MoodReply};
use crate::server::error::ApiError;
use crate::server::AppState;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Json;
use bytes::Bytes;
use serde::Serialize;

const AUDIO_FIELDS: [&str; 2] = ["file", "audio"];
const TEXT_FIELD: &str = "text";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mode: String,
    pub version: &'static str,
}

/// POST /process_audio
pub async fn process_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MoodReply>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::Upload {
        status: e.status(),
        message: e.body_text(),
    })?;

    let mut audio: Option<Bytes> = None;
    let mut text: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(upload_error)?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(n) if AUDIO_FIELDS.contains(&n) && audio.is_none() => {
                audio = Some(
                    field
                        .bytes()
                        .await
                        .map_err(upload_error)?,
                );
            }
            Some(TEXT_FIELD) => {
                text = Some(
                    field
                        .text()
                        .await
                        .map_err(upload_error)?,
                );
            }
            _ => {}
        }
    }

    let wav = audio.filter(|b| !b.is_empty()).ok_or(ApiError::MissingAudio)?;
    let reply = state.pipeline.process(AudioUpload { wav, text }).await?;
    Ok(Json(reply))
}

fn upload_error(err: MultipartError) -> ApiError {
    ApiError::Upload {
        status: err.status(),
        message: err.body_text(),
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        mode: state.pipeline.context().mode().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /favicon.ico
pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}
