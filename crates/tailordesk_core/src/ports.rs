//! crates/tailordesk_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the back office's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AccessToken, AuthSession, Customer, Document, DocumentReview, DocumentVersion,
    DocumentView, Measurement, Order, OrderStatus, OrderStatusEntry, Partnership,
    PartnershipStatus, Role, User, UserCredentials,
};
use crate::orders::{MeasurementDraft, OrderDraft, PlacedOrder, StatusChange};
use crate::partners::PartnershipApplication;
use crate::workflow::{DocumentRequirement, ReviewSubmission, UploadRequest};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Fails with `Conflict` when the username is taken.
    async fn create_user(
        &self,
        username: &str,
        hashed_password: &str,
        role: Role,
        partnership_id: Option<Uuid>,
    ) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials>;

    async fn count_users(&self) -> PortResult<i64>;

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()>;

    async fn create_auth_session(&self, session: &AuthSession) -> PortResult<()>;

    /// Returns the session's user, or `Unauthorized` when missing or expired.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates the given requirements for a partnership, skipping document
    /// types it already has, and returns the partnership's full document set.
    async fn create_documents(
        &self,
        partnership_id: Uuid,
        requirements: &[DocumentRequirement],
    ) -> PortResult<Vec<Document>>;

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document>;

    async fn list_documents(&self, partnership_id: Uuid) -> PortResult<Vec<Document>>;

    /// Atomically checks the lock, inserts the next version, demotes older
    /// versions and marks the document as submitted and pending.
    async fn append_version(
        &self,
        document_id: Uuid,
        request: &UploadRequest,
    ) -> PortResult<(Document, DocumentVersion)>;

    /// Atomically applies a review decision and appends its history entry.
    async fn record_review(
        &self,
        document_id: Uuid,
        submission: &ReviewSubmission,
    ) -> PortResult<(Document, DocumentReview)>;

    async fn unlock_document(&self, document_id: Uuid) -> PortResult<Document>;

    /// Newest version first.
    async fn list_versions(&self, document_id: Uuid) -> PortResult<Vec<DocumentVersion>>;

    async fn get_version(&self, version_id: Uuid) -> PortResult<DocumentVersion>;

    /// Oldest review first.
    async fn list_reviews(&self, document_id: Uuid) -> PortResult<Vec<DocumentReview>>;

    /// Appends a view log entry and bumps the document's view counter.
    async fn log_view(
        &self,
        document_id: Uuid,
        version_id: Uuid,
        viewer_id: Option<Uuid>,
        token_id: Option<Uuid>,
    ) -> PortResult<DocumentView>;
}

#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    async fn create_access_token(&self, token: &AccessToken) -> PortResult<()>;

    /// Spends one use of the token if it is unexpired and not exhausted at
    /// `now`, returning the updated token. Returns `None` otherwise.
    async fn consume_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Option<AccessToken>>;

    async fn find_access_token(&self, token: &str) -> PortResult<Option<AccessToken>>;
}

#[async_trait]
pub trait PartnershipStore: Send + Sync {
    async fn create_partnership(
        &self,
        application: &PartnershipApplication,
    ) -> PortResult<Partnership>;

    async fn get_partnership(&self, partnership_id: Uuid) -> PortResult<Partnership>;

    async fn list_partnerships(
        &self,
        status: Option<PartnershipStatus>,
    ) -> PortResult<Vec<Partnership>>;

    async fn set_partnership_status(
        &self,
        partnership_id: Uuid,
        status: PartnershipStatus,
    ) -> PortResult<Partnership>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn get_customer(&self, customer_id: Uuid) -> PortResult<Customer>;

    async fn list_customers(&self) -> PortResult<Vec<Customer>>;

    async fn add_measurement(
        &self,
        customer_id: Uuid,
        draft: &MeasurementDraft,
        taken_by: Option<Uuid>,
    ) -> PortResult<Measurement>;

    /// Newest first.
    async fn list_measurements(&self, customer_id: Uuid) -> PortResult<Vec<Measurement>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Places a wizard order as one unit: the customer is upserted by phone,
    /// the measurements (if any) are stored, and the order is inserted with
    /// its initial `received` history entry. Nothing is kept if any step fails.
    async fn place_order(
        &self,
        order_number: &str,
        draft: &OrderDraft,
        created_by: Option<Uuid>,
    ) -> PortResult<PlacedOrder>;

    async fn get_order(&self, order_id: Uuid) -> PortResult<Order>;

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        assigned_tailor_id: Option<Uuid>,
    ) -> PortResult<Vec<Order>>;

    /// Atomically validates the transition against the stored status,
    /// updates the order and appends a history entry.
    async fn update_order_status(
        &self,
        order_id: Uuid,
        change: &StatusChange,
    ) -> PortResult<Order>;

    async fn assign_tailor(&self, order_id: Uuid, tailor_id: Uuid) -> PortResult<Order>;

    /// Oldest entry first.
    async fn order_history(&self, order_id: Uuid) -> PortResult<Vec<OrderStatusEntry>>;
}

//=========================================================================================
// Speech Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes a slice of audio data into text.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text.
    async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>>;
}
