//! services/api/src/web/speech.rs
//!
//! Read-aloud and dictation helpers for the dashboards.

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tailordesk_core::User;
use tracing::debug;
use utoipa::ToSchema;

use crate::web::{port_error, state::AppState, HandlerError};

fn unavailable() -> HandlerError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Speech services are not configured".to_string(),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct SynthesizeRequest {
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct TranscriptionResponse {
    pub text: String,
}

/// Turn text into MP3 audio.
#[utoipa::path(
    post,
    path = "/speech/synthesize",
    request_body = SynthesizeRequest,
    responses(
        (status = 200, description = "MP3 audio", content_type = "audio/mpeg"),
        (status = 400, description = "Empty or overlong text"),
        (status = 503, description = "Speech services are not configured")
    )
)]
pub async fn synthesize_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<SynthesizeRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let tts = state.tts_adapter.as_ref().ok_or_else(unavailable)?;
    let audio = tts
        .generate_audio(&req.text)
        .await
        .map_err(|e| port_error("Failed to generate audio", e))?;
    debug!(user_id = %user.id, bytes = audio.len(), "Synthesized speech");
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio))
}

/// Transcribe raw 48 kHz mono PCM16 audio sent as the `audio` form field.
#[utoipa::path(
    post,
    path = "/speech/transcribe",
    request_body(content_type = "multipart/form-data", description = "An `audio` part with PCM16 samples."),
    responses(
        (status = 200, description = "Transcript", body = TranscriptionResponse),
        (status = 400, description = "Missing or empty audio"),
        (status = 503, description = "Speech services are not configured")
    )
)]
pub async fn transcribe_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let sst = state.sst_adapter.as_ref().ok_or_else(unavailable)?;

    let mut audio: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        if field.name() == Some("audio") {
            let data = field.bytes().await.map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read audio bytes: {}", e),
                )
            })?;
            audio = Some(data);
            break;
        }
    }
    let audio = audio.ok_or((
        StatusCode::BAD_REQUEST,
        "Multipart form must include an 'audio' part".to_string(),
    ))?;

    let text = sst
        .transcribe_audio(&audio)
        .await
        .map_err(|e| port_error("Failed to transcribe audio", e))?;
    debug!(user_id = %user.id, chars = text.len(), "Transcribed dictation");
    Ok(Json(TranscriptionResponse { text }))
}
