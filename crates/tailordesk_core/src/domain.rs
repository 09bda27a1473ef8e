//! crates/tailordesk_core/src/domain.rs
//!
//! Defines the pure, core data structures for the back office.
//! These structs are independent of any database or serialization format.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// variants map one-to-one onto snake_case strings.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

//=========================================================================================
// Partner Documents
//=========================================================================================

/// Review state of a partner document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    NeedsRevision,
}

string_enum!(ReviewStatus, "review status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    NeedsRevision => "needs_revision",
});

/// A decision an administrator can record against a submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewDecision {
    Approved,
    Rejected,
    NeedsRevision,
}

string_enum!(ReviewDecision, "review decision", {
    Approved => "approved",
    Rejected => "rejected",
    NeedsRevision => "needs_revision",
});

impl ReviewDecision {
    /// The document status this decision leaves behind.
    pub fn resulting_status(&self) -> ReviewStatus {
        match self {
            ReviewDecision::Approved => ReviewStatus::Approved,
            ReviewDecision::Rejected => ReviewStatus::Rejected,
            ReviewDecision::NeedsRevision => ReviewStatus::NeedsRevision,
        }
    }
}

/// Why a new version of a document was uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadReason {
    Initial,
    Revision,
    Voluntary,
}

string_enum!(UploadReason, "upload reason", {
    Initial => "initial",
    Revision => "revision",
    Voluntary => "voluntary",
});

/// A required or optional compliance document a partnership must provide.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub partnership_id: Uuid,
    pub document_type: String,
    pub is_required: bool,
    pub is_submitted: bool,
    pub status: ReviewStatus,
    pub is_locked: bool,
    pub admin_comment: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub view_count: i32,
    pub version_count: i32,
    pub current_version_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable snapshot of an uploaded file reference.
#[derive(Debug, Clone)]
pub struct DocumentVersion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_number: i32,
    pub file_url: String,
    pub file_name: String,
    pub uploaded_by: Uuid,
    pub upload_reason: UploadReason,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

/// An immutable audit entry for one review decision.
#[derive(Debug, Clone)]
pub struct DocumentReview {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_id: Option<Uuid>,
    pub reviewer_id: Uuid,
    pub decision: ReviewDecision,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A short-lived, use-limited credential for reading one document's file URL.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub id: Uuid,
    pub token: String,
    pub document_id: Uuid,
    pub version_id: Option<Uuid>,
    pub issued_to: Uuid,
    pub expires_at: DateTime<Utc>,
    pub max_uses: i32,
    pub use_count: i32,
    pub created_at: DateTime<Utc>,
}

/// One logged retrieval of a document's file URL.
#[derive(Debug, Clone)]
pub struct DocumentView {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_id: Uuid,
    pub viewer_id: Option<Uuid>,
    pub token_id: Option<Uuid>,
    pub viewed_at: DateTime<Utc>,
}

//=========================================================================================
// Partnerships and Users
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartnershipStatus {
    Applied,
    Approved,
    Rejected,
}

string_enum!(PartnershipStatus, "partnership status", {
    Applied => "applied",
    Approved => "approved",
    Rejected => "rejected",
});

/// A stitching unit in (or applying for) a contractual relationship.
#[derive(Debug, Clone)]
pub struct Partnership {
    pub id: Uuid,
    pub business_name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub city: Option<String>,
    pub status: PartnershipStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    OrderManager,
    Partner,
    Tailor,
}

string_enum!(Role, "role", {
    Admin => "admin",
    OrderManager => "order_manager",
    Partner => "partner",
    Tailor => "tailor",
});

// Represents a back-office user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub partnership_id: Option<Uuid>,
    pub last_login_at: Option<DateTime<Utc>>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub hashed_password: String,
}

/// Freshly generated partner credentials. The password is only ever
/// available in this value; the store keeps its hash.
#[derive(Debug, Clone)]
pub struct PartnerLogin {
    pub user_id: Uuid,
    pub partnership_id: Uuid,
    pub username: String,
    pub password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Customers, Measurements and Orders
//=========================================================================================

#[derive(Debug, Clone)]
pub struct Customer {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A set of body measurements taken for one garment type.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub garment_type: String,
    pub unit: String,
    pub values: BTreeMap<String, f64>,
    pub notes: Option<String>,
    pub taken_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Received,
    Measuring,
    Cutting,
    Stitching,
    Trial,
    Ready,
    Delivered,
    Cancelled,
}

string_enum!(OrderStatus, "order status", {
    Received => "received",
    Measuring => "measuring",
    Cutting => "cutting",
    Stitching => "stitching",
    Trial => "trial",
    Ready => "ready",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub garment_type: String,
    pub status: OrderStatus,
    pub assigned_tailor_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry in an order's status history.
#[derive(Debug, Clone)]
pub struct OrderStatusEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_status_parses_stored_strings() {
        assert_eq!(
            "needs_revision".parse::<ReviewStatus>(),
            Ok(ReviewStatus::NeedsRevision)
        );
        assert_eq!(ReviewStatus::Approved.to_string(), "approved");
    }

    #[test]
    fn unknown_variant_names_the_kind() {
        let err = "archived".parse::<ReviewStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown review status 'archived'");
    }

    #[test]
    fn decisions_map_onto_statuses() {
        assert_eq!(
            ReviewDecision::Approved.resulting_status(),
            ReviewStatus::Approved
        );
        assert_eq!(
            ReviewDecision::NeedsRevision.resulting_status(),
            ReviewStatus::NeedsRevision
        );
        // "pending" is a status but never a decision.
        assert!("pending".parse::<ReviewDecision>().is_err());
    }
}
