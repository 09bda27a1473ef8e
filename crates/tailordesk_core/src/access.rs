//! crates/tailordesk_core/src/access.rs
//!
//! Short-lived, use-limited access tokens that gate retrieval of a
//! document's file URL.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{AccessToken, DocumentVersion};
use crate::ports::{AccessTokenStore, DocumentStore, PortError, PortResult};

/// Lifetime and use ceiling applied to newly issued tokens.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    pub ttl: Duration,
    pub max_uses: i32,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(15),
            max_uses: 5,
        }
    }
}

/// Why a token can no longer be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("access token not found")]
    NotFound,
    #[error("access token has expired")]
    Expired,
    #[error("access token has no uses left")]
    Exhausted,
}

impl From<TokenRejection> for PortError {
    fn from(rejection: TokenRejection) -> Self {
        match rejection {
            TokenRejection::NotFound => PortError::NotFound(rejection.to_string()),
            TokenRejection::Expired | TokenRejection::Exhausted => PortError::Unauthorized,
        }
    }
}

/// 32 random bytes, lowercase hex.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn check_token(token: &AccessToken, now: DateTime<Utc>) -> Result<(), TokenRejection> {
    if now >= token.expires_at {
        return Err(TokenRejection::Expired);
    }
    if token.use_count >= token.max_uses {
        return Err(TokenRejection::Exhausted);
    }
    Ok(())
}

/// The outcome of a successful redemption.
#[derive(Debug, Clone)]
pub struct GrantedAccess {
    pub token: AccessToken,
    pub version: DocumentVersion,
}

impl GrantedAccess {
    pub fn remaining_uses(&self) -> i32 {
        (self.token.max_uses - self.token.use_count).max(0)
    }
}

/// Issues and redeems document access tokens.
#[derive(Clone)]
pub struct DocumentAccess {
    documents: Arc<dyn DocumentStore>,
    tokens: Arc<dyn AccessTokenStore>,
    policy: AccessPolicy,
}

impl DocumentAccess {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        tokens: Arc<dyn AccessTokenStore>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            documents,
            tokens,
            policy,
        }
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    /// Issues a token for a document, optionally pinned to one version.
    pub async fn issue(
        &self,
        document_id: Uuid,
        version_id: Option<Uuid>,
        issued_to: Uuid,
    ) -> PortResult<AccessToken> {
        let document = self.documents.get_document(document_id).await?;
        if let Some(version_id) = version_id {
            let version = self.documents.get_version(version_id).await?;
            if version.document_id != document.id {
                return Err(PortError::InvalidInput(format!(
                    "version {} does not belong to document {}",
                    version_id, document_id
                )));
            }
        } else if document.current_version_id.is_none() {
            return Err(PortError::InvalidInput(format!(
                "document {} has no uploaded file",
                document_id
            )));
        }

        let now = Utc::now();
        let expires_at = now.checked_add_signed(self.policy.ttl).ok_or_else(|| {
            PortError::InvalidInput(format!("token lifetime {} is out of range", self.policy.ttl))
        })?;
        let token = AccessToken {
            id: Uuid::new_v4(),
            token: generate_token(),
            document_id,
            version_id,
            issued_to,
            expires_at,
            max_uses: self.policy.max_uses,
            use_count: 0,
            created_at: now,
        };
        self.tokens.create_access_token(&token).await?;
        info!(document_id = %document_id, issued_to = %issued_to, "Issued document access token");
        Ok(token)
    }

    /// Spends one use of the token and resolves the file it grants.
    pub async fn redeem(&self, token: &str, viewer_id: Option<Uuid>) -> PortResult<GrantedAccess> {
        let now = Utc::now();
        let consumed = match self.tokens.consume_access_token(token, now).await? {
            Some(consumed) => consumed,
            None => {
                let rejection = match self.tokens.find_access_token(token).await? {
                    Some(existing) => check_token(&existing, now)
                        .err()
                        // Consumed by a concurrent request between the two reads.
                        .unwrap_or(TokenRejection::Exhausted),
                    None => TokenRejection::NotFound,
                };
                return Err(rejection.into());
            }
        };

        let version_id = match consumed.version_id {
            Some(version_id) => version_id,
            None => self
                .documents
                .get_document(consumed.document_id)
                .await?
                .current_version_id
                .ok_or_else(|| {
                    PortError::NotFound(format!(
                        "document {} has no current version",
                        consumed.document_id
                    ))
                })?,
        };
        let version = self.documents.get_version(version_id).await?;

        // View logging must not block access to the file.
        if let Err(e) = self
            .documents
            .log_view(consumed.document_id, version.id, viewer_id, Some(consumed.id))
            .await
        {
            warn!(document_id = %consumed.document_id, "Failed to log document view: {}", e);
        }

        Ok(GrantedAccess {
            token: consumed,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::workflow::{DocumentRequirement, UploadRequest};

    fn sample_token(expires_in: Duration, max_uses: i32, use_count: i32) -> AccessToken {
        let now = Utc::now();
        AccessToken {
            id: Uuid::new_v4(),
            token: generate_token(),
            document_id: Uuid::new_v4(),
            version_id: None,
            issued_to: Uuid::new_v4(),
            expires_at: now + expires_in,
            max_uses,
            use_count,
            created_at: now,
        }
    }

    async fn uploaded_document(store: &Arc<MemoryStore>) -> (Uuid, Uuid) {
        let doc = store
            .create_documents(Uuid::new_v4(), &[DocumentRequirement::required("bank_details")])
            .await
            .unwrap()
            .remove(0);
        let request = UploadRequest::new(Uuid::new_v4(), "https://files/bank.pdf", None).unwrap();
        let (_, version) = store.append_version(doc.id, &request).await.unwrap();
        (doc.id, version.id)
    }

    fn access(store: &Arc<MemoryStore>, policy: AccessPolicy) -> DocumentAccess {
        DocumentAccess::new(store.clone(), store.clone(), policy)
    }

    #[test]
    fn generated_tokens_are_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn check_token_rejects_expired_and_exhausted() {
        let now = Utc::now();
        assert_eq!(check_token(&sample_token(Duration::minutes(5), 3, 2), now), Ok(()));
        assert_eq!(
            check_token(&sample_token(Duration::minutes(-1), 3, 0), now),
            Err(TokenRejection::Expired)
        );
        assert_eq!(
            check_token(&sample_token(Duration::minutes(5), 3, 3), now),
            Err(TokenRejection::Exhausted)
        );
    }

    #[tokio::test]
    async fn issuing_with_an_overflowing_lifetime_is_rejected() {
        let store = Arc::new(MemoryStore::default());
        let (document_id, _) = uploaded_document(&store).await;
        let policy = AccessPolicy {
            ttl: Duration::days(100_000_000),
            max_uses: 1,
        };
        let err = access(&store, policy)
            .issue(document_id, None, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn redeeming_resolves_current_version_and_logs_a_view() {
        let store = Arc::new(MemoryStore::default());
        let (document_id, version_id) = uploaded_document(&store).await;
        let access = access(&store, AccessPolicy::default());

        let token = access.issue(document_id, None, Uuid::new_v4()).await.unwrap();
        let granted = access.redeem(&token.token, None).await.unwrap();

        assert_eq!(granted.version.id, version_id);
        assert_eq!(granted.version.file_url, "https://files/bank.pdf");
        assert_eq!(granted.remaining_uses(), 4);
        assert_eq!(store.get_document(document_id).await.unwrap().view_count, 1);
    }

    #[tokio::test]
    async fn tokens_stop_working_after_max_uses() {
        let store = Arc::new(MemoryStore::default());
        let (document_id, _) = uploaded_document(&store).await;
        let policy = AccessPolicy {
            ttl: Duration::minutes(5),
            max_uses: 2,
        };
        let access = access(&store, policy);
        let token = access.issue(document_id, None, Uuid::new_v4()).await.unwrap();

        access.redeem(&token.token, None).await.unwrap();
        access.redeem(&token.token, None).await.unwrap();
        let err = access.redeem(&token.token, None).await.unwrap_err();
        assert!(matches!(err, PortError::Unauthorized));
    }

    #[tokio::test]
    async fn expired_tokens_are_refused() {
        let store = Arc::new(MemoryStore::default());
        let (document_id, _) = uploaded_document(&store).await;
        let policy = AccessPolicy {
            ttl: Duration::seconds(-1),
            max_uses: 5,
        };
        let token = access(&store, policy)
            .issue(document_id, None, Uuid::new_v4())
            .await
            .unwrap();
        let err = access(&store, policy)
            .redeem(&token.token, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unauthorized));
    }

    #[tokio::test]
    async fn unknown_tokens_are_not_found() {
        let store = Arc::new(MemoryStore::default());
        let err = access(&store, AccessPolicy::default())
            .redeem("deadbeef", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn pinned_version_must_belong_to_document() {
        let store = Arc::new(MemoryStore::default());
        let (document_id, _) = uploaded_document(&store).await;
        let (_, foreign_version) = uploaded_document(&store).await;
        let err = access(&store, AccessPolicy::default())
            .issue(document_id, Some(foreign_version), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn pinned_version_survives_newer_uploads() {
        let store = Arc::new(MemoryStore::default());
        let (document_id, first_version) = uploaded_document(&store).await;
        let access = access(&store, AccessPolicy::default());
        let token = access
            .issue(document_id, Some(first_version), Uuid::new_v4())
            .await
            .unwrap();

        let request = UploadRequest::new(Uuid::new_v4(), "https://files/bank-v2.pdf", None).unwrap();
        store.append_version(document_id, &request).await.unwrap();

        let granted = access.redeem(&token.token, None).await.unwrap();
        assert_eq!(granted.version.id, first_version);
        assert!(!granted.version.is_current);
    }

    #[tokio::test]
    async fn documents_without_files_cannot_be_shared() {
        let store = Arc::new(MemoryStore::default());
        let doc = store
            .create_documents(Uuid::new_v4(), &[DocumentRequirement::optional("workshop_photos")])
            .await
            .unwrap()
            .remove(0);
        let err = access(&store, AccessPolicy::default())
            .issue(doc.id, None, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::InvalidInput(_)));
    }
}
