//! services/api/src/web/partners.rs
//!
//! Partnership applications and their administration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tailordesk_core::partners::PartnershipApplication;
use tailordesk_core::{PartnerLogin, Partnership, PartnershipStatus, Role, User};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::{
    auth::hash_password, documents::DocumentResponse, middleware::require_role, parse_field,
    port_error, state::AppState, HandlerError,
};

#[derive(Deserialize, ToSchema)]
pub struct ApplyRequest {
    pub business_name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub city: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PartnershipResponse {
    pub id: Uuid,
    pub business_name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub city: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Partnership> for PartnershipResponse {
    fn from(p: Partnership) -> Self {
        Self {
            id: p.id,
            business_name: p.business_name,
            contact_name: p.contact_name,
            phone: p.phone,
            email: p.email,
            city: p.city,
            status: p.status.to_string(),
            created_at: p.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ApprovalResponse {
    pub partnership: PartnershipResponse,
    pub documents: Vec<DocumentResponse>,
}

/// Shown once; only the hash is stored.
#[derive(Serialize, ToSchema)]
pub struct CredentialsResponse {
    pub user_id: Uuid,
    pub partnership_id: Uuid,
    pub username: String,
    pub password: String,
}

impl From<PartnerLogin> for CredentialsResponse {
    fn from(login: PartnerLogin) -> Self {
        Self {
            user_id: login.user_id,
            partnership_id: login.partnership_id,
            username: login.username,
            password: login.password,
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct PartnershipQuery {
    /// `applied`, `approved` or `rejected`.
    pub status: Option<String>,
}

impl PartnershipQuery {
    fn status(&self) -> Result<Option<PartnershipStatus>, HandlerError> {
        self.status
            .as_deref()
            .map(|s| parse_field::<PartnershipStatus>("status", s))
            .transpose()
    }
}

/// Submit a partnership application.
#[utoipa::path(
    post,
    path = "/partnerships/apply",
    request_body = ApplyRequest,
    responses(
        (status = 201, description = "Application received", body = PartnershipResponse),
        (status = 400, description = "Invalid application")
    )
)]
pub async fn apply_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ApplyRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let application = PartnershipApplication::new(
        &req.business_name,
        &req.contact_name,
        &req.phone,
        req.email.as_deref(),
        req.city.as_deref(),
    )
    .map_err(|e| port_error("Invalid application", e))?;
    let partnership = state
        .partners
        .apply(application)
        .await
        .map_err(|e| port_error("Failed to submit application", e))?;
    Ok((StatusCode::CREATED, Json(PartnershipResponse::from(partnership))))
}

#[utoipa::path(
    get,
    path = "/admin/partnerships",
    params(PartnershipQuery),
    responses((status = 200, description = "Partnerships, newest first", body = [PartnershipResponse]))
)]
pub async fn list_partnerships_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<PartnershipQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, &[Role::Admin])?;
    let status = query.status()?;
    let partnerships = state
        .partners
        .list(status)
        .await
        .map_err(|e| port_error("Failed to load partnerships", e))?;
    Ok(Json(
        partnerships
            .into_iter()
            .map(PartnershipResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Approve a partnership and open its document checklist.
#[utoipa::path(
    post,
    path = "/admin/partnerships/{id}/approve",
    params(("id" = Uuid, Path, description = "Partnership id")),
    responses(
        (status = 200, description = "Approved", body = ApprovalResponse),
        (status = 409, description = "Partnership was rejected")
    )
)]
pub async fn approve_partnership_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(partnership_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, &[Role::Admin])?;
    let (partnership, documents) = state
        .partners
        .approve(partnership_id)
        .await
        .map_err(|e| port_error("Failed to approve partnership", e))?;
    Ok(Json(ApprovalResponse {
        partnership: partnership.into(),
        documents: documents.into_iter().map(DocumentResponse::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/admin/partnerships/{id}/reject",
    params(("id" = Uuid, Path, description = "Partnership id")),
    responses(
        (status = 200, description = "Rejected", body = PartnershipResponse),
        (status = 409, description = "Partnership already decided")
    )
)]
pub async fn reject_partnership_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(partnership_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, &[Role::Admin])?;
    let partnership = state
        .partners
        .reject(partnership_id)
        .await
        .map_err(|e| port_error("Failed to reject partnership", e))?;
    Ok(Json(PartnershipResponse::from(partnership)))
}

/// Generate a partner login for an approved partnership.
#[utoipa::path(
    post,
    path = "/admin/partnerships/{id}/credentials",
    params(("id" = Uuid, Path, description = "Partnership id")),
    responses(
        (status = 201, description = "Login created", body = CredentialsResponse),
        (status = 409, description = "Partnership not approved")
    )
)]
pub async fn generate_credentials_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(partnership_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, &[Role::Admin])?;
    let login = state
        .partners
        .generate_credentials(partnership_id, hash_password)
        .await
        .map_err(|e| port_error("Failed to generate credentials", e))?;
    Ok((StatusCode::CREATED, Json(CredentialsResponse::from(login))))
}
