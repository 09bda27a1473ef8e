//! crates/tailordesk_core/src/workflow.rs
//!
//! The partner document workflow: which uploads and review decisions are
//! allowed, and what they do to a document.
//!
//! The `plan_*` functions are pure. Store implementations call them while
//! holding the document row, so the check and the write happen as one
//! atomic operation.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::{
    Document, DocumentReview, DocumentVersion, ReviewDecision, ReviewStatus, UploadReason,
};
use crate::ports::{DocumentStore, PortError, PortResult};

//=========================================================================================
// Document Requirements
//=========================================================================================

/// A document type a partnership is asked to provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequirement {
    pub document_type: String,
    pub is_required: bool,
}

impl DocumentRequirement {
    pub fn required(document_type: &str) -> Self {
        Self {
            document_type: document_type.to_string(),
            is_required: true,
        }
    }

    pub fn optional(document_type: &str) -> Self {
        Self {
            document_type: document_type.to_string(),
            is_required: false,
        }
    }
}

/// The document set created when a partnership is approved for collection.
pub fn default_requirements() -> Vec<DocumentRequirement> {
    vec![
        DocumentRequirement::required("business_registration"),
        DocumentRequirement::required("tax_registration"),
        DocumentRequirement::required("bank_details"),
        DocumentRequirement::required("owner_identity_proof"),
        DocumentRequirement::required("partnership_agreement"),
        DocumentRequirement::optional("quality_certification"),
        DocumentRequirement::optional("workshop_photos"),
    ]
}

//=========================================================================================
// Reviews
//=========================================================================================

/// An administrator's decision on a document, validated on construction.
#[derive(Debug, Clone)]
pub struct ReviewSubmission {
    pub reviewer_id: Uuid,
    pub decision: ReviewDecision,
    pub comment: Option<String>,
}

impl ReviewSubmission {
    pub fn new(
        reviewer_id: Uuid,
        decision: ReviewDecision,
        comment: Option<String>,
    ) -> PortResult<Self> {
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let submission = Self {
            reviewer_id,
            decision,
            comment,
        };
        submission.validate()?;
        Ok(submission)
    }

    /// A comment is mandatory for every decision except approval.
    pub fn validate(&self) -> PortResult<()> {
        let has_comment = self
            .comment
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        if self.decision != ReviewDecision::Approved && !has_comment {
            return Err(PortError::InvalidInput(format!(
                "a comment is required when the decision is '{}'",
                self.decision
            )));
        }
        Ok(())
    }
}

/// What a review does to the document it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPlan {
    pub status: ReviewStatus,
    pub lock: bool,
    pub comment: Option<String>,
    pub version_id: Option<Uuid>,
}

pub fn plan_review(document: &Document, submission: &ReviewSubmission) -> PortResult<ReviewPlan> {
    submission.validate()?;
    if !document.is_submitted {
        return Err(PortError::InvalidInput(format!(
            "document {} has not been submitted yet",
            document.id
        )));
    }
    if document.is_locked {
        return Err(PortError::Conflict(format!(
            "document {} is locked; unlock it before reviewing again",
            document.id
        )));
    }
    Ok(ReviewPlan {
        status: submission.decision.resulting_status(),
        lock: submission.decision == ReviewDecision::Approved,
        comment: submission.comment.clone(),
        version_id: document.current_version_id,
    })
}

//=========================================================================================
// Uploads
//=========================================================================================

/// A new file reference for a document.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub uploaded_by: Uuid,
    pub file_url: String,
    pub file_name: String,
}

impl UploadRequest {
    /// Falls back to the last path segment of the URL when no name is given.
    pub fn new(uploaded_by: Uuid, file_url: &str, file_name: Option<&str>) -> PortResult<Self> {
        let file_url = file_url.trim();
        if file_url.is_empty() {
            return Err(PortError::InvalidInput("file_url must not be empty".to_string()));
        }
        let file_name = file_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or_else(|| file_url.rsplit('/').find(|s| !s.is_empty()))
            .unwrap_or(file_url)
            .to_string();
        Ok(Self {
            uploaded_by,
            file_url: file_url.to_string(),
            file_name,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPlan {
    pub version_number: i32,
    pub reason: UploadReason,
}

pub fn plan_upload(document: &Document, request: &UploadRequest) -> PortResult<UploadPlan> {
    if document.is_locked {
        return Err(PortError::Conflict(format!(
            "document {} is locked and accepts no further uploads",
            document.id
        )));
    }
    if request.file_url.trim().is_empty() {
        return Err(PortError::InvalidInput("file_url must not be empty".to_string()));
    }
    let reason = if document.version_count == 0 {
        UploadReason::Initial
    } else {
        match document.status {
            ReviewStatus::Rejected | ReviewStatus::NeedsRevision => UploadReason::Revision,
            ReviewStatus::Pending | ReviewStatus::Approved => UploadReason::Voluntary,
        }
    };
    Ok(UploadPlan {
        version_number: document.version_count + 1,
        reason,
    })
}

/// Whether the partnership still has to act on this document.
pub fn needs_partner_action(document: &Document) -> bool {
    if document.is_locked {
        return false;
    }
    match document.status {
        ReviewStatus::Rejected | ReviewStatus::NeedsRevision => true,
        ReviewStatus::Pending => document.is_required && !document.is_submitted,
        ReviewStatus::Approved => false,
    }
}

//=========================================================================================
// Workflow Service
//=========================================================================================

/// Entry point for the document review and versioning operations.
#[derive(Clone)]
pub struct DocumentWorkflow {
    store: Arc<dyn DocumentStore>,
}

impl DocumentWorkflow {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn submit_review(
        &self,
        document_id: Uuid,
        submission: ReviewSubmission,
    ) -> PortResult<(Document, DocumentReview)> {
        submission.validate()?;
        let (document, review) = self.store.record_review(document_id, &submission).await?;
        info!(
            document_id = %document_id,
            reviewer_id = %submission.reviewer_id,
            decision = %submission.decision,
            "Recorded document review"
        );
        Ok((document, review))
    }

    pub async fn upload_version(
        &self,
        document_id: Uuid,
        request: UploadRequest,
    ) -> PortResult<(Document, DocumentVersion)> {
        let (document, version) = self.store.append_version(document_id, &request).await?;
        info!(
            document_id = %document_id,
            version = version.version_number,
            reason = %version.upload_reason,
            "Stored new document version"
        );
        Ok((document, version))
    }

    pub async fn unlock(&self, document_id: Uuid) -> PortResult<Document> {
        let document = self.store.unlock_document(document_id).await?;
        info!(document_id = %document_id, "Unlocked document");
        Ok(document)
    }

    pub async fn documents_for_partnership(&self, partnership_id: Uuid) -> PortResult<Vec<Document>> {
        self.store.list_documents(partnership_id).await
    }

    /// Documents the partnership still has to upload or revise.
    pub async fn open_documents_for_partnership(
        &self,
        partnership_id: Uuid,
    ) -> PortResult<Vec<Document>> {
        let documents = self.store.list_documents(partnership_id).await?;
        Ok(documents.into_iter().filter(needs_partner_action).collect())
    }

    pub async fn list_versions(&self, document_id: Uuid) -> PortResult<Vec<DocumentVersion>> {
        self.store.get_document(document_id).await?;
        self.store.list_versions(document_id).await
    }

    pub async fn review_history(&self, document_id: Uuid) -> PortResult<Vec<DocumentReview>> {
        self.store.get_document(document_id).await?;
        self.store.list_reviews(document_id).await
    }

    pub async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
        self.store.get_document(document_id).await
    }
}
