//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification and the health check.

use crate::web::{auth, contact, documents, orders, partners, speech, state::AppState};
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        auth::create_user_handler,
        partners::apply_handler,
        partners::list_partnerships_handler,
        partners::approve_partnership_handler,
        partners::reject_partnership_handler,
        partners::generate_credentials_handler,
        documents::partner_documents_handler,
        documents::upload_version_handler,
        documents::partnership_documents_handler,
        documents::review_document_handler,
        documents::unlock_document_handler,
        documents::list_versions_handler,
        documents::list_reviews_handler,
        documents::issue_token_handler,
        documents::redeem_token_handler,
        orders::request_order_handler,
        orders::create_order_handler,
        orders::list_orders_handler,
        orders::get_order_handler,
        orders::update_status_handler,
        orders::assign_tailor_handler,
        orders::list_customers_handler,
        orders::list_measurements_handler,
        orders::add_measurement_handler,
        orders::tailor_orders_handler,
        orders::tailor_status_handler,
        speech::synthesize_handler,
        speech::transcribe_handler,
        contact::whatsapp_link_handler,
    ),
    components(
        schemas(
            HealthResponse,
            auth::LoginRequest, auth::CreateUserRequest, auth::UserResponse,
            partners::ApplyRequest, partners::PartnershipResponse,
            partners::ApprovalResponse, partners::CredentialsResponse,
            documents::DocumentResponse, documents::VersionResponse,
            documents::ReviewResponse, documents::UploadResponse,
            documents::ReviewOutcomeResponse, documents::AccessTokenResponse,
            documents::DocumentFileResponse, documents::UploadVersionRequest,
            documents::ReviewRequest, documents::IssueTokenRequest,
            orders::CustomerInput, orders::MeasurementInput, orders::OrderRequest,
            orders::StatusRequest, orders::AssignRequest, orders::CustomerResponse,
            orders::MeasurementResponse, orders::OrderResponse,
            orders::StatusEntryResponse, orders::PlacedOrderResponse,
            orders::OrderDetailResponse,
            speech::SynthesizeRequest, speech::TranscriptionResponse,
            contact::ContactLinkResponse,
        )
    ),
    tags(
        (name = "TailorDesk API", description = "Back office for partner onboarding, document review and tailoring orders.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Health Check
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

/// Liveness plus a single database round trip.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are up", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.db.ping_with_backoff(1, Duration::ZERO).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                database: "ok".to_string(),
            }),
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    database: "unreachable".to_string(),
                }),
            )
        }
    }
}
