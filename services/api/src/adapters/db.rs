//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the storage ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Operations that must check and write together (uploads, reviews, token
//! consumption, order status changes) run inside one transaction and lock
//! the row they check with `SELECT ... FOR UPDATE`.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tailordesk_core::domain::{
    AccessToken, AuthSession, Customer, Document, DocumentReview, DocumentVersion, DocumentView,
    Measurement, Order, OrderStatus, OrderStatusEntry, Partnership, PartnershipStatus, Role,
    UnknownVariant, User, UserCredentials,
};
use tailordesk_core::orders::{
    check_transition, MeasurementDraft, OrderDraft, PlacedOrder, StatusChange,
};
use tailordesk_core::partners::PartnershipApplication;
use tailordesk_core::ports::{
    AccessTokenStore, AuthStore, CustomerStore, DocumentStore, OrderStore, PartnershipStore,
    PortError, PortResult,
};
use tailordesk_core::workflow::{
    plan_review, plan_upload, DocumentRequirement, ReviewSubmission, UploadRequest,
};
use tracing::{debug, warn};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Runs `SELECT 1`, retrying with doubling delays. Returns the last
    /// error once `attempts` pings have failed.
    pub async fn ping_with_backoff(
        &self,
        attempts: u32,
        initial_delay: Duration,
    ) -> Result<(), sqlx::Error> {
        let mut delay = initial_delay;
        let mut attempt = 1;
        loop {
            match sqlx::query("SELECT 1").execute(&self.pool).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Database ping {}/{} failed: {}. Retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn begin(&self) -> PortResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(unexpected)
    }
}

//=========================================================================================
// Error Mapping Helpers
//=========================================================================================

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: &str, id: impl std::fmt::Display) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        _ => unexpected(e),
    }
}

fn conflict_or_unexpected(e: sqlx::Error, message: String) -> PortError {
    let is_unique = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if is_unique {
        PortError::Conflict(message)
    } else {
        unexpected(e)
    }
}

fn parse<T>(value: &str) -> PortResult<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    value
        .parse::<T>()
        .map_err(|e| PortError::Unexpected(format!("corrupt row: {}", e)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, username, hashed_password, role, partnership_id, last_login_at";

const PURGE_EXPIRED_SESSIONS: &str = "DELETE FROM auth_sessions WHERE expires_at <= NOW()";

/// Rows inserted in one transaction share `NOW()`, so `seq` breaks the tie.
const HISTORY_ORDER: &str = "ORDER BY created_at ASC, seq ASC";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    hashed_password: String,
    role: String,
    partnership_id: Option<Uuid>,
    last_login_at: Option<DateTime<Utc>>,
}
impl UserRecord {
    fn to_credentials(self) -> PortResult<UserCredentials> {
        Ok(UserCredentials {
            user: User {
                id: self.id,
                username: self.username,
                role: parse::<Role>(&self.role)?,
                partnership_id: self.partnership_id,
                last_login_at: self.last_login_at,
            },
            hashed_password: self.hashed_password,
        })
    }

    fn to_domain(self) -> PortResult<User> {
        Ok(self.to_credentials()?.user)
    }
}

const DOCUMENT_COLUMNS: &str = "id, partnership_id, document_type, is_required, is_submitted, \
    status, is_locked, admin_comment, reviewed_by, reviewed_at, view_count, version_count, \
    current_version_id, created_at, updated_at";

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    partnership_id: Uuid,
    document_type: String,
    is_required: bool,
    is_submitted: bool,
    status: String,
    is_locked: bool,
    admin_comment: Option<String>,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    view_count: i32,
    version_count: i32,
    current_version_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl DocumentRecord {
    fn to_domain(self) -> PortResult<Document> {
        Ok(Document {
            id: self.id,
            partnership_id: self.partnership_id,
            document_type: self.document_type,
            is_required: self.is_required,
            is_submitted: self.is_submitted,
            status: parse(&self.status)?,
            is_locked: self.is_locked,
            admin_comment: self.admin_comment,
            reviewed_by: self.reviewed_by,
            reviewed_at: self.reviewed_at,
            view_count: self.view_count,
            version_count: self.version_count,
            current_version_id: self.current_version_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const VERSION_COLUMNS: &str = "id, document_id, version_number, file_url, file_name, \
    uploaded_by, upload_reason, is_current, created_at";

#[derive(FromRow)]
struct VersionRecord {
    id: Uuid,
    document_id: Uuid,
    version_number: i32,
    file_url: String,
    file_name: String,
    uploaded_by: Uuid,
    upload_reason: String,
    is_current: bool,
    created_at: DateTime<Utc>,
}
impl VersionRecord {
    fn to_domain(self) -> PortResult<DocumentVersion> {
        Ok(DocumentVersion {
            id: self.id,
            document_id: self.document_id,
            version_number: self.version_number,
            file_url: self.file_url,
            file_name: self.file_name,
            uploaded_by: self.uploaded_by,
            upload_reason: parse(&self.upload_reason)?,
            is_current: self.is_current,
            created_at: self.created_at,
        })
    }
}

const REVIEW_COLUMNS: &str = "id, document_id, version_id, reviewer_id, decision, comment, created_at";

#[derive(FromRow)]
struct ReviewRecord {
    id: Uuid,
    document_id: Uuid,
    version_id: Option<Uuid>,
    reviewer_id: Uuid,
    decision: String,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}
impl ReviewRecord {
    fn to_domain(self) -> PortResult<DocumentReview> {
        Ok(DocumentReview {
            id: self.id,
            document_id: self.document_id,
            version_id: self.version_id,
            reviewer_id: self.reviewer_id,
            decision: parse(&self.decision)?,
            comment: self.comment,
            created_at: self.created_at,
        })
    }
}

const TOKEN_COLUMNS: &str = "id, token, document_id, version_id, issued_to, expires_at, \
    max_uses, use_count, created_at";

#[derive(FromRow)]
struct TokenRecord {
    id: Uuid,
    token: String,
    document_id: Uuid,
    version_id: Option<Uuid>,
    issued_to: Uuid,
    expires_at: DateTime<Utc>,
    max_uses: i32,
    use_count: i32,
    created_at: DateTime<Utc>,
}
impl TokenRecord {
    fn to_domain(self) -> AccessToken {
        AccessToken {
            id: self.id,
            token: self.token,
            document_id: self.document_id,
            version_id: self.version_id,
            issued_to: self.issued_to,
            expires_at: self.expires_at,
            max_uses: self.max_uses,
            use_count: self.use_count,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ViewRecord {
    id: Uuid,
    document_id: Uuid,
    version_id: Uuid,
    viewer_id: Option<Uuid>,
    token_id: Option<Uuid>,
    viewed_at: DateTime<Utc>,
}
impl ViewRecord {
    fn to_domain(self) -> DocumentView {
        DocumentView {
            id: self.id,
            document_id: self.document_id,
            version_id: self.version_id,
            viewer_id: self.viewer_id,
            token_id: self.token_id,
            viewed_at: self.viewed_at,
        }
    }
}

const PARTNERSHIP_COLUMNS: &str =
    "id, business_name, contact_name, phone, email, city, status, created_at";

#[derive(FromRow)]
struct PartnershipRecord {
    id: Uuid,
    business_name: String,
    contact_name: String,
    phone: String,
    email: Option<String>,
    city: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}
impl PartnershipRecord {
    fn to_domain(self) -> PortResult<Partnership> {
        Ok(Partnership {
            id: self.id,
            business_name: self.business_name,
            contact_name: self.contact_name,
            phone: self.phone,
            email: self.email,
            city: self.city,
            status: parse(&self.status)?,
            created_at: self.created_at,
        })
    }
}

const CUSTOMER_COLUMNS: &str = "id, full_name, phone, email, address, created_at";

#[derive(FromRow)]
struct CustomerRecord {
    id: Uuid,
    full_name: String,
    phone: String,
    email: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
}
impl CustomerRecord {
    fn to_domain(self) -> Customer {
        Customer {
            id: self.id,
            full_name: self.full_name,
            phone: self.phone,
            email: self.email,
            address: self.address,
            created_at: self.created_at,
        }
    }
}

const MEASUREMENT_COLUMNS: &str =
    "id, customer_id, garment_type, unit, measurement_values, notes, taken_by, created_at";

#[derive(FromRow)]
struct MeasurementRecord {
    id: Uuid,
    customer_id: Uuid,
    garment_type: String,
    unit: String,
    measurement_values: Json<BTreeMap<String, f64>>,
    notes: Option<String>,
    taken_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}
impl MeasurementRecord {
    fn to_domain(self) -> Measurement {
        Measurement {
            id: self.id,
            customer_id: self.customer_id,
            garment_type: self.garment_type,
            unit: self.unit,
            values: self.measurement_values.0,
            notes: self.notes,
            taken_by: self.taken_by,
            created_at: self.created_at,
        }
    }
}

const ORDER_COLUMNS: &str = "id, order_number, customer_id, garment_type, status, \
    assigned_tailor_id, due_date, notes, created_at, updated_at";

#[derive(FromRow)]
struct OrderRecord {
    id: Uuid,
    order_number: String,
    customer_id: Uuid,
    garment_type: String,
    status: String,
    assigned_tailor_id: Option<Uuid>,
    due_date: Option<NaiveDate>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl OrderRecord {
    fn to_domain(self) -> PortResult<Order> {
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            customer_id: self.customer_id,
            garment_type: self.garment_type,
            status: parse(&self.status)?,
            assigned_tailor_id: self.assigned_tailor_id,
            due_date: self.due_date,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OrderStatusRecord {
    id: Uuid,
    order_id: Uuid,
    status: String,
    note: Option<String>,
    changed_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}
impl OrderStatusRecord {
    fn to_domain(self) -> PortResult<OrderStatusEntry> {
        Ok(OrderStatusEntry {
            id: self.id,
            order_id: self.order_id,
            status: parse(&self.status)?,
            note: self.note,
            changed_by: self.changed_by,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `AuthStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthStore for DbAdapter {
    async fn create_user(
        &self,
        username: &str,
        hashed_password: &str,
        role: Role,
        partnership_id: Option<Uuid>,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, username, hashed_password, role, partnership_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(hashed_password)
        .bind(role.as_str())
        .bind(partnership_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_unexpected(e, format!("username {} is taken", username)))?;
        record.to_domain()
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, "User", user_id))?
            .to_domain()
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, "User", username))?
        .to_credentials()
    }

    async fn count_users(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_auth_session(&self, session: &AuthSession) -> PortResult<()> {
        let purged = sqlx::query(PURGE_EXPIRED_SESSIONS)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?
            .rows_affected();
        if purged > 0 {
            debug!(purged, "Removed expired sessions");
        }
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.username, u.hashed_password, u.role, u.partnership_id, u.last_login_at \
             FROM auth_sessions s JOIN users u ON u.id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;
        record.to_domain()
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

async fn lock_document(
    tx: &mut Transaction<'static, Postgres>,
    document_id: Uuid,
) -> PortResult<Document> {
    sqlx::query_as::<_, DocumentRecord>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 FOR UPDATE"
    ))
    .bind(document_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| not_found_or_unexpected(e, "Document", document_id))?
    .to_domain()
}

#[async_trait]
impl DocumentStore for DbAdapter {
    async fn create_documents(
        &self,
        partnership_id: Uuid,
        requirements: &[DocumentRequirement],
    ) -> PortResult<Vec<Document>> {
        let mut tx = self.begin().await?;
        for req in requirements {
            sqlx::query(
                "INSERT INTO documents (id, partnership_id, document_type, is_required) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT (partnership_id, document_type) DO NOTHING",
            )
            .bind(Uuid::new_v4())
            .bind(partnership_id)
            .bind(&req.document_type)
            .bind(req.is_required)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }
        tx.commit().await.map_err(unexpected)?;
        self.list_documents(partnership_id).await
    }

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
        sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(document_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, "Document", document_id))?
        .to_domain()
    }

    async fn list_documents(&self, partnership_id: Uuid) -> PortResult<Vec<Document>> {
        let records = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE partnership_id = $1 \
             ORDER BY is_required DESC, document_type ASC"
        ))
        .bind(partnership_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn append_version(
        &self,
        document_id: Uuid,
        request: &UploadRequest,
    ) -> PortResult<(Document, DocumentVersion)> {
        let mut tx = self.begin().await?;
        let document = lock_document(&mut tx, document_id).await?;
        let plan = plan_upload(&document, request)?;

        sqlx::query("UPDATE document_versions SET is_current = FALSE WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let version = sqlx::query_as::<_, VersionRecord>(&format!(
            "INSERT INTO document_versions \
             (id, document_id, version_number, file_url, file_name, uploaded_by, upload_reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {VERSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(plan.version_number)
        .bind(&request.file_url)
        .bind(&request.file_name)
        .bind(request.uploaded_by)
        .bind(plan.reason.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?
        .to_domain()?;

        let document = sqlx::query_as::<_, DocumentRecord>(&format!(
            "UPDATE documents SET version_count = $1, current_version_id = $2, \
             is_submitted = TRUE, status = 'pending', updated_at = NOW() \
             WHERE id = $3 RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(plan.version_number)
        .bind(version.id)
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?
        .to_domain()?;

        tx.commit().await.map_err(unexpected)?;
        Ok((document, version))
    }

    async fn record_review(
        &self,
        document_id: Uuid,
        submission: &ReviewSubmission,
    ) -> PortResult<(Document, DocumentReview)> {
        let mut tx = self.begin().await?;
        let document = lock_document(&mut tx, document_id).await?;
        let plan = plan_review(&document, submission)?;

        let document = sqlx::query_as::<_, DocumentRecord>(&format!(
            "UPDATE documents SET status = $1, is_locked = $2, admin_comment = $3, \
             reviewed_by = $4, reviewed_at = NOW(), updated_at = NOW() \
             WHERE id = $5 RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(plan.status.as_str())
        .bind(plan.lock)
        .bind(&plan.comment)
        .bind(submission.reviewer_id)
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?
        .to_domain()?;

        let review = sqlx::query_as::<_, ReviewRecord>(&format!(
            "INSERT INTO document_reviews (id, document_id, version_id, reviewer_id, decision, comment) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(plan.version_id)
        .bind(submission.reviewer_id)
        .bind(submission.decision.as_str())
        .bind(&plan.comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?
        .to_domain()?;

        tx.commit().await.map_err(unexpected)?;
        Ok((document, review))
    }

    async fn unlock_document(&self, document_id: Uuid) -> PortResult<Document> {
        sqlx::query_as::<_, DocumentRecord>(&format!(
            "UPDATE documents SET is_locked = FALSE, updated_at = NOW() \
             WHERE id = $1 RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(document_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, "Document", document_id))?
        .to_domain()
    }

    async fn list_versions(&self, document_id: Uuid) -> PortResult<Vec<DocumentVersion>> {
        let records = sqlx::query_as::<_, VersionRecord>(&format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions WHERE document_id = $1 \
             ORDER BY version_number DESC"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_version(&self, version_id: Uuid) -> PortResult<DocumentVersion> {
        sqlx::query_as::<_, VersionRecord>(&format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions WHERE id = $1"
        ))
        .bind(version_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, "Version", version_id))?
        .to_domain()
    }

    async fn list_reviews(&self, document_id: Uuid) -> PortResult<Vec<DocumentReview>> {
        let records = sqlx::query_as::<_, ReviewRecord>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM document_reviews WHERE document_id = $1 {HISTORY_ORDER}"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn log_view(
        &self,
        document_id: Uuid,
        version_id: Uuid,
        viewer_id: Option<Uuid>,
        token_id: Option<Uuid>,
    ) -> PortResult<DocumentView> {
        let mut tx = self.begin().await?;
        let view = sqlx::query_as::<_, ViewRecord>(
            "INSERT INTO document_views (id, document_id, version_id, viewer_id, token_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, document_id, version_id, viewer_id, token_id, viewed_at",
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(version_id)
        .bind(viewer_id)
        .bind(token_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query("UPDATE documents SET view_count = view_count + 1 WHERE id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(view.to_domain())
    }
}

//=========================================================================================
// `AccessTokenStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccessTokenStore for DbAdapter {
    async fn create_access_token(&self, token: &AccessToken) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO document_access_tokens \
             (id, token, document_id, version_id, issued_to, expires_at, max_uses, use_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(token.id)
        .bind(&token.token)
        .bind(token.document_id)
        .bind(token.version_id)
        .bind(token.issued_to)
        .bind(token.expires_at)
        .bind(token.max_uses)
        .bind(token.use_count)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn consume_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Option<AccessToken>> {
        // A single conditional UPDATE; concurrent redemptions cannot overspend.
        let record = sqlx::query_as::<_, TokenRecord>(&format!(
            "UPDATE document_access_tokens SET use_count = use_count + 1 \
             WHERE token = $1 AND expires_at > $2 AND use_count < max_uses \
             RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(TokenRecord::to_domain))
    }

    async fn find_access_token(&self, token: &str) -> PortResult<Option<AccessToken>> {
        let record = sqlx::query_as::<_, TokenRecord>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM document_access_tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(TokenRecord::to_domain))
    }
}

//=========================================================================================
// `PartnershipStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl PartnershipStore for DbAdapter {
    async fn create_partnership(
        &self,
        application: &PartnershipApplication,
    ) -> PortResult<Partnership> {
        sqlx::query_as::<_, PartnershipRecord>(&format!(
            "INSERT INTO partnerships (id, business_name, contact_name, phone, email, city) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PARTNERSHIP_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&application.business_name)
        .bind(&application.contact_name)
        .bind(&application.phone)
        .bind(&application.email)
        .bind(&application.city)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?
        .to_domain()
    }

    async fn get_partnership(&self, partnership_id: Uuid) -> PortResult<Partnership> {
        sqlx::query_as::<_, PartnershipRecord>(&format!(
            "SELECT {PARTNERSHIP_COLUMNS} FROM partnerships WHERE id = $1"
        ))
        .bind(partnership_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, "Partnership", partnership_id))?
        .to_domain()
    }

    async fn list_partnerships(
        &self,
        status: Option<PartnershipStatus>,
    ) -> PortResult<Vec<Partnership>> {
        let records = sqlx::query_as::<_, PartnershipRecord>(&format!(
            "SELECT {PARTNERSHIP_COLUMNS} FROM partnerships \
             WHERE ($1::TEXT IS NULL OR status = $1) ORDER BY created_at DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn set_partnership_status(
        &self,
        partnership_id: Uuid,
        status: PartnershipStatus,
    ) -> PortResult<Partnership> {
        sqlx::query_as::<_, PartnershipRecord>(&format!(
            "UPDATE partnerships SET status = $1 WHERE id = $2 RETURNING {PARTNERSHIP_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(partnership_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, "Partnership", partnership_id))?
        .to_domain()
    }
}

//=========================================================================================
// `CustomerStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CustomerStore for DbAdapter {
    async fn get_customer(&self, customer_id: Uuid) -> PortResult<Customer> {
        let record = sqlx::query_as::<_, CustomerRecord>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, "Customer", customer_id))?;
        Ok(record.to_domain())
    }

    async fn list_customers(&self) -> PortResult<Vec<Customer>> {
        let records = sqlx::query_as::<_, CustomerRecord>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn add_measurement(
        &self,
        customer_id: Uuid,
        draft: &MeasurementDraft,
        taken_by: Option<Uuid>,
    ) -> PortResult<Measurement> {
        let mut tx = self.begin().await?;
        let measurement = insert_measurement(&mut tx, customer_id, draft, taken_by).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(measurement)
    }

    async fn list_measurements(&self, customer_id: Uuid) -> PortResult<Vec<Measurement>> {
        let records = sqlx::query_as::<_, MeasurementRecord>(&format!(
            "SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE customer_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

//=========================================================================================
// `OrderStore` Trait Implementation
//=========================================================================================

/// Inserts the customer or returns the existing row with the same phone.
/// The no-op update makes `RETURNING` yield the existing row on conflict.
fn upsert_customer_sql() -> String {
    format!(
        "INSERT INTO customers (id, full_name, phone, email, address) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (phone) DO UPDATE SET phone = EXCLUDED.phone \
         RETURNING {CUSTOMER_COLUMNS}"
    )
}

async fn insert_measurement(
    tx: &mut Transaction<'static, Postgres>,
    customer_id: Uuid,
    draft: &MeasurementDraft,
    taken_by: Option<Uuid>,
) -> PortResult<Measurement> {
    let record = sqlx::query_as::<_, MeasurementRecord>(&format!(
        "INSERT INTO measurements \
         (id, customer_id, garment_type, unit, measurement_values, notes, taken_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {MEASUREMENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(customer_id)
    .bind(&draft.garment_type)
    .bind(&draft.unit)
    .bind(Json(&draft.values))
    .bind(&draft.notes)
    .bind(taken_by)
    .fetch_one(&mut **tx)
    .await
    .map_err(unexpected)?;
    Ok(record.to_domain())
}

async fn insert_status_entry(
    tx: &mut Transaction<'static, Postgres>,
    order_id: Uuid,
    status: OrderStatus,
    note: Option<&str>,
    changed_by: Option<Uuid>,
) -> PortResult<()> {
    sqlx::query(
        "INSERT INTO order_status_history (id, order_id, status, note, changed_by) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(status.as_str())
    .bind(note)
    .bind(changed_by)
    .execute(&mut **tx)
    .await
    .map_err(unexpected)?;
    Ok(())
}

#[async_trait]
impl OrderStore for DbAdapter {
    async fn place_order(
        &self,
        order_number: &str,
        draft: &OrderDraft,
        created_by: Option<Uuid>,
    ) -> PortResult<PlacedOrder> {
        let mut tx = self.begin().await?;
        let customer = sqlx::query_as::<_, CustomerRecord>(&upsert_customer_sql())
            .bind(Uuid::new_v4())
            .bind(&draft.customer.full_name)
            .bind(&draft.customer.phone)
            .bind(&draft.customer.email)
            .bind(&draft.customer.address)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?
            .to_domain();

        let measurement = match &draft.measurements {
            Some(m) => Some(insert_measurement(&mut tx, customer.id, m, created_by).await?),
            None => None,
        };

        let order = sqlx::query_as::<_, OrderRecord>(&format!(
            "INSERT INTO orders (id, order_number, customer_id, garment_type, status, due_date, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(order_number)
        .bind(customer.id)
        .bind(&draft.garment_type)
        .bind(OrderStatus::Received.as_str())
        .bind(draft.due_date)
        .bind(&draft.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or_unexpected(e, format!("order number {} exists", order_number)))?
        .to_domain()?;

        insert_status_entry(&mut tx, order.id, OrderStatus::Received, None, created_by).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(PlacedOrder {
            customer,
            measurement,
            order,
        })
    }

    async fn get_order(&self, order_id: Uuid) -> PortResult<Order> {
        sqlx::query_as::<_, OrderRecord>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, "Order", order_id))?
            .to_domain()
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        assigned_tailor_id: Option<Uuid>,
    ) -> PortResult<Vec<Order>> {
        let records = sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::TEXT IS NULL OR status = $1) \
               AND ($2::UUID IS NULL OR assigned_tailor_id = $2) \
             ORDER BY created_at DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(assigned_tailor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        change: &StatusChange,
    ) -> PortResult<Order> {
        let mut tx = self.begin().await?;
        let current = sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| not_found_or_unexpected(e, "Order", order_id))?
        .to_domain()?;
        check_transition(&current, change.status)?;

        let order = sqlx::query_as::<_, OrderRecord>(&format!(
            "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(change.status.as_str())
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?
        .to_domain()?;

        insert_status_entry(
            &mut tx,
            order_id,
            change.status,
            change.note.as_deref(),
            change.changed_by,
        )
        .await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(order)
    }

    async fn assign_tailor(&self, order_id: Uuid, tailor_id: Uuid) -> PortResult<Order> {
        sqlx::query_as::<_, OrderRecord>(&format!(
            "UPDATE orders SET assigned_tailor_id = $1, updated_at = NOW() \
             WHERE id = $2 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(tailor_id)
        .bind(order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, "Order", order_id))?
        .to_domain()
    }

    async fn order_history(&self, order_id: Uuid) -> PortResult<Vec<OrderStatusEntry>> {
        let records = sqlx::query_as::<_, OrderStatusRecord>(&format!(
            "SELECT id, order_id, status, note, changed_by, created_at \
             FROM order_status_history WHERE order_id = $1 {HISTORY_ORDER}"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }
}
