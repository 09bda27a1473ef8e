//! services/api/src/web/contact.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::web::{state::AppState, HandlerError};

#[derive(Deserialize, IntoParams)]
pub struct ContactQuery {
    /// Text to prefill in the chat.
    pub message: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ContactLinkResponse {
    pub url: String,
}

/// WhatsApp deep link for the business number.
#[utoipa::path(
    get,
    path = "/contact/whatsapp",
    params(ContactQuery),
    responses(
        (status = 200, description = "Chat link", body = ContactLinkResponse),
        (status = 404, description = "No business number configured")
    )
)]
pub async fn whatsapp_link_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContactQuery>,
) -> Result<Json<ContactLinkResponse>, HandlerError> {
    let link = state.whatsapp.as_ref().ok_or((
        StatusCode::NOT_FOUND,
        "WhatsApp contact is not configured".to_string(),
    ))?;
    Ok(Json(ContactLinkResponse {
        url: link.chat_url(query.message.as_deref()),
    }))
}
