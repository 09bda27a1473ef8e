//! services/api/src/web/documents.rs
//!
//! Partner document endpoints: uploads from the partner dashboard, reviews
//! from the admin dashboard, version and review history, and access tokens.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tailordesk_core::access::GrantedAccess;
use tailordesk_core::workflow::{ReviewSubmission, UploadRequest};
use tailordesk_core::{
    AccessToken, Document, DocumentReview, DocumentVersion, ReviewDecision, Role, User,
};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::{
    middleware::require_role, parse_field, port_error, state::AppState, HandlerError,
};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub partnership_id: Uuid,
    pub document_type: String,
    pub is_required: bool,
    pub is_submitted: bool,
    pub status: String,
    pub is_locked: bool,
    pub admin_comment: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub view_count: i32,
    pub version_count: i32,
    pub current_version_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            partnership_id: d.partnership_id,
            document_type: d.document_type,
            is_required: d.is_required,
            is_submitted: d.is_submitted,
            status: d.status.to_string(),
            is_locked: d.is_locked,
            admin_comment: d.admin_comment,
            reviewed_by: d.reviewed_by,
            reviewed_at: d.reviewed_at,
            view_count: d.view_count,
            version_count: d.version_count,
            current_version_id: d.current_version_id,
            updated_at: d.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct VersionResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_number: i32,
    pub file_name: String,
    pub uploaded_by: Uuid,
    pub upload_reason: String,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentVersion> for VersionResponse {
    fn from(v: DocumentVersion) -> Self {
        Self {
            id: v.id,
            document_id: v.document_id,
            version_number: v.version_number,
            file_name: v.file_name,
            uploaded_by: v.uploaded_by,
            upload_reason: v.upload_reason.to_string(),
            is_current: v.is_current,
            created_at: v.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_id: Option<Uuid>,
    pub reviewer_id: Uuid,
    pub decision: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentReview> for ReviewResponse {
    fn from(r: DocumentReview) -> Self {
        Self {
            id: r.id,
            document_id: r.document_id,
            version_id: r.version_id,
            reviewer_id: r.reviewer_id,
            decision: r.decision.to_string(),
            comment: r.comment,
            created_at: r.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub document: DocumentResponse,
    pub version: VersionResponse,
}

#[derive(Serialize, ToSchema)]
pub struct ReviewOutcomeResponse {
    pub document: DocumentResponse,
    pub review: ReviewResponse,
}

#[derive(Serialize, ToSchema)]
pub struct AccessTokenResponse {
    pub token: String,
    pub document_id: Uuid,
    pub version_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub max_uses: i32,
}

impl From<AccessToken> for AccessTokenResponse {
    fn from(t: AccessToken) -> Self {
        Self {
            token: t.token,
            document_id: t.document_id,
            version_id: t.version_id,
            expires_at: t.expires_at,
            max_uses: t.max_uses,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DocumentFileResponse {
    pub document_id: Uuid,
    pub version_id: Uuid,
    pub version_number: i32,
    pub file_url: String,
    pub file_name: String,
    pub remaining_uses: i32,
    pub expires_at: DateTime<Utc>,
}

impl From<GrantedAccess> for DocumentFileResponse {
    fn from(granted: GrantedAccess) -> Self {
        let remaining_uses = granted.remaining_uses();
        Self {
            document_id: granted.version.document_id,
            version_id: granted.version.id,
            version_number: granted.version.version_number,
            file_url: granted.version.file_url,
            file_name: granted.version.file_name,
            remaining_uses,
            expires_at: granted.token.expires_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UploadVersionRequest {
    /// Reference to the stored file (e.g. a storage bucket URL).
    pub file_url: String,
    pub file_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviewRequest {
    /// One of `approved`, `rejected`, `needs_revision`.
    pub decision: String,
    /// Required unless the decision is `approved`.
    pub comment: Option<String>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct IssueTokenRequest {
    /// Pin the token to one version instead of the current one.
    pub version_id: Option<Uuid>,
}

#[derive(Deserialize, IntoParams)]
pub struct PartnerDocumentsQuery {
    /// Only documents that still need an upload or a revision.
    #[serde(default)]
    pub open: bool,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn documents_json(documents: Vec<Document>) -> Json<Vec<DocumentResponse>> {
    Json(documents.into_iter().map(DocumentResponse::from).collect())
}

fn partnership_of(user: &User) -> Result<Uuid, HandlerError> {
    require_role(user, &[Role::Partner])?;
    user.partnership_id.ok_or((
        StatusCode::FORBIDDEN,
        "This login is not linked to a partnership".to_string(),
    ))
}

/// Admins see every document; partners only their own partnership's.
fn document_visible_to(user: &User, document: &Document) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Partner => user.partnership_id == Some(document.partnership_id),
        Role::OrderManager | Role::Tailor => false,
    }
}

fn visible_or_not_found(user: &User, document: Document) -> Result<Document, HandlerError> {
    if document_visible_to(user, &document) {
        Ok(document)
    } else {
        // Hidden documents answer exactly like missing ones.
        Err((StatusCode::NOT_FOUND, format!("Document {} not found", document.id)))
    }
}

async fn load_visible_document(
    state: &AppState,
    user: &User,
    document_id: Uuid,
) -> Result<Document, HandlerError> {
    let document = state
        .documents
        .get_document(document_id)
        .await
        .map_err(|e| port_error("Failed to load document", e))?;
    visible_or_not_found(user, document)
}

//=========================================================================================
// Partner Dashboard
//=========================================================================================

/// List the signed-in partner's documents.
#[utoipa::path(
    get,
    path = "/partner/documents",
    params(PartnerDocumentsQuery),
    responses(
        (status = 200, description = "Documents of the caller's partnership", body = [DocumentResponse]),
        (status = 403, description = "Caller is not a partner")
    )
)]
pub async fn partner_documents_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<PartnerDocumentsQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let partnership_id = partnership_of(&user)?;
    let documents = if query.open {
        state.documents.open_documents_for_partnership(partnership_id).await
    } else {
        state.documents.documents_for_partnership(partnership_id).await
    }
    .map_err(|e| port_error("Failed to load documents", e))?;
    Ok(documents_json(documents))
}

/// Upload a new version of a document.
#[utoipa::path(
    post,
    path = "/partner/documents/{id}/versions",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = UploadVersionRequest,
    responses(
        (status = 201, description = "Version stored", body = UploadResponse),
        (status = 404, description = "Document not found"),
        (status = 409, description = "Document is locked")
    )
)]
pub async fn upload_version_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(document_id): Path<Uuid>,
    Json(req): Json<UploadVersionRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    partnership_of(&user)?;
    load_visible_document(&state, &user, document_id).await?;

    let request = UploadRequest::new(user.id, &req.file_url, req.file_name.as_deref())
        .map_err(|e| port_error("Invalid upload", e))?;
    let (document, version) = state
        .documents
        .upload_version(document_id, request)
        .await
        .map_err(|e| port_error("Failed to store document version", e))?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document: document.into(),
            version: version.into(),
        }),
    ))
}

//=========================================================================================
// Admin Dashboard
//=========================================================================================

/// List every document of a partnership.
#[utoipa::path(
    get,
    path = "/admin/partnerships/{id}/documents",
    params(("id" = Uuid, Path, description = "Partnership id")),
    responses((status = 200, description = "Documents", body = [DocumentResponse]))
)]
pub async fn partnership_documents_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(partnership_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, &[Role::Admin])?;
    let documents = state
        .documents
        .documents_for_partnership(partnership_id)
        .await
        .map_err(|e| port_error("Failed to load documents", e))?;
    Ok(documents_json(documents))
}

/// Record a review decision for a submitted document.
#[utoipa::path(
    post,
    path = "/admin/documents/{id}/review",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Review recorded", body = ReviewOutcomeResponse),
        (status = 400, description = "Missing comment or document not submitted"),
        (status = 409, description = "Document is locked")
    )
)]
pub async fn review_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(document_id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, &[Role::Admin])?;
    let decision: ReviewDecision = parse_field("decision", &req.decision)?;
    let submission = ReviewSubmission::new(user.id, decision, req.comment)
        .map_err(|e| port_error("Invalid review", e))?;

    let (document, review) = state
        .documents
        .submit_review(document_id, submission)
        .await
        .map_err(|e| port_error("Failed to record review", e))?;

    Ok(Json(ReviewOutcomeResponse {
        document: document.into(),
        review: review.into(),
    }))
}

/// Unlock an approved document so the partner can upload again.
#[utoipa::path(
    post,
    path = "/admin/documents/{id}/unlock",
    params(("id" = Uuid, Path, description = "Document id")),
    responses((status = 200, description = "Document unlocked", body = DocumentResponse))
)]
pub async fn unlock_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, &[Role::Admin])?;
    let document = state
        .documents
        .unlock(document_id)
        .await
        .map_err(|e| port_error("Failed to unlock document", e))?;
    Ok(Json(DocumentResponse::from(document)))
}

//=========================================================================================
// Shared History and Access
//=========================================================================================

/// Version history, newest first.
#[utoipa::path(
    get,
    path = "/documents/{id}/versions",
    params(("id" = Uuid, Path, description = "Document id")),
    responses((status = 200, description = "Versions", body = [VersionResponse]))
)]
pub async fn list_versions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    load_visible_document(&state, &user, document_id).await?;
    let versions = state
        .documents
        .list_versions(document_id)
        .await
        .map_err(|e| port_error("Failed to load versions", e))?;
    Ok(Json(
        versions.into_iter().map(VersionResponse::from).collect::<Vec<_>>(),
    ))
}

/// Review history, oldest first.
#[utoipa::path(
    get,
    path = "/documents/{id}/reviews",
    params(("id" = Uuid, Path, description = "Document id")),
    responses((status = 200, description = "Reviews", body = [ReviewResponse]))
)]
pub async fn list_reviews_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    load_visible_document(&state, &user, document_id).await?;
    let reviews = state
        .documents
        .review_history(document_id)
        .await
        .map_err(|e| port_error("Failed to load reviews", e))?;
    Ok(Json(
        reviews.into_iter().map(ReviewResponse::from).collect::<Vec<_>>(),
    ))
}

/// Issue a short-lived access token for a document's file.
#[utoipa::path(
    post,
    path = "/documents/{id}/access-tokens",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = IssueTokenRequest,
    responses(
        (status = 201, description = "Token issued", body = AccessTokenResponse),
        (status = 400, description = "Nothing uploaded or version mismatch")
    )
)]
pub async fn issue_token_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(document_id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, HandlerError> {
    load_visible_document(&state, &user, document_id).await?;
    // An empty body shares the current version.
    let req: IssueTokenRequest = if body.is_empty() {
        IssueTokenRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e)))?
    };
    let token = state
        .access
        .issue(document_id, req.version_id, user.id)
        .await
        .map_err(|e| port_error("Failed to issue access token", e))?;
    Ok((StatusCode::CREATED, Json(AccessTokenResponse::from(token))))
}

/// Redeem an access token for the document's file URL.
#[utoipa::path(
    get,
    path = "/documents/access/{token}",
    params(("token" = String, Path, description = "Access token")),
    responses(
        (status = 200, description = "File reference", body = DocumentFileResponse),
        (status = 403, description = "Token expired or used up"),
        (status = 404, description = "Unknown token")
    )
)]
pub async fn redeem_token_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let granted = state
        .access
        .redeem(&token, None)
        .await
        .map_err(|e| port_error("Failed to redeem access token", e))?;
    Ok(Json(DocumentFileResponse::from(granted)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tailordesk_core::{ReviewStatus, UploadReason};

    fn user(role: Role, partnership_id: Option<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            username: "someone".to_string(),
            role,
            partnership_id,
            last_login_at: None,
        }
    }

    #[test]
    fn partner_routes_need_a_linked_partnership() {
        let partnership = Uuid::new_v4();
        assert_eq!(
            partnership_of(&user(Role::Partner, Some(partnership))).unwrap(),
            partnership
        );
        assert_eq!(
            partnership_of(&user(Role::Partner, None)).unwrap_err().0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            partnership_of(&user(Role::Admin, None)).unwrap_err().0,
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn redeemed_file_reports_remaining_uses() {
        let now = Utc::now();
        let document_id = Uuid::new_v4();
        let version = DocumentVersion {
            id: Uuid::new_v4(),
            document_id,
            version_number: 2,
            file_url: "https://files.example/gst.pdf".to_string(),
            file_name: "gst.pdf".to_string(),
            uploaded_by: Uuid::new_v4(),
            upload_reason: UploadReason::Revision,
            is_current: true,
            created_at: now,
        };
        let token = AccessToken {
            id: Uuid::new_v4(),
            token: "abc".to_string(),
            document_id,
            version_id: None,
            issued_to: Uuid::new_v4(),
            expires_at: now + Duration::minutes(15),
            max_uses: 5,
            use_count: 2,
            created_at: now,
        };

        let body = serde_json::to_value(DocumentFileResponse::from(GrantedAccess { token, version }))
            .unwrap();
        assert_eq!(body["remaining_uses"], 3);
        assert_eq!(body["version_number"], 2);
        assert_eq!(body["file_url"], "https://files.example/gst.pdf");
    }

    fn document(partnership_id: Uuid) -> Document {
        let now = Utc::now();
        Document {
            id: Uuid::new_v4(),
            partnership_id,
            document_type: "bank_details".to_string(),
            is_required: true,
            is_submitted: true,
            status: ReviewStatus::NeedsRevision,
            is_locked: false,
            admin_comment: Some("Blurry scan".to_string()),
            reviewed_by: None,
            reviewed_at: None,
            view_count: 0,
            version_count: 1,
            current_version_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn document_status_serializes_as_stored_string() {
        let body = serde_json::to_value(DocumentResponse::from(document(Uuid::new_v4()))).unwrap();
        assert_eq!(body["status"], "needs_revision");
        assert_eq!(body["admin_comment"], "Blurry scan");
    }

    #[test]
    fn admins_see_every_document() {
        let doc = document(Uuid::new_v4());
        assert!(document_visible_to(&user(Role::Admin, None), &doc));
        assert_eq!(visible_or_not_found(&user(Role::Admin, None), doc.clone()).unwrap().id, doc.id);
    }

    #[test]
    fn partners_see_only_their_own_partnership() {
        let mine = Uuid::new_v4();
        let partner = user(Role::Partner, Some(mine));
        assert!(document_visible_to(&partner, &document(mine)));

        let other = document(Uuid::new_v4());
        let (status, message) = visible_or_not_found(&partner, other.clone()).unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, format!("Document {} not found", other.id));

        assert!(!document_visible_to(&user(Role::Partner, None), &document(mine)));
    }

    #[test]
    fn order_staff_cannot_see_partner_documents() {
        let partnership = Uuid::new_v4();
        for role in [Role::OrderManager, Role::Tailor] {
            let err = visible_or_not_found(&user(role, Some(partnership)), document(partnership))
                .unwrap_err();
            assert_eq!(err.0, StatusCode::NOT_FOUND);
        }
    }
}
