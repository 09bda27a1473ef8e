//! crates/tailordesk_core/src/partners.rs
//!
//! Partnership applications, approval for document collection and partner
//! login generation.

use std::sync::Arc;

use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Document, PartnerLogin, Partnership, PartnershipStatus, Role};
use crate::orders::normalize_phone;
use crate::ports::{AuthStore, DocumentStore, PartnershipStore, PortError, PortResult};
use crate::workflow::default_requirements;

/// A validated application from the partner sign-up form.
#[derive(Debug, Clone)]
pub struct PartnershipApplication {
    pub business_name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub city: Option<String>,
}

impl PartnershipApplication {
    pub fn new(
        business_name: &str,
        contact_name: &str,
        phone: &str,
        email: Option<&str>,
        city: Option<&str>,
    ) -> PortResult<Self> {
        let business_name = business_name.trim();
        let contact_name = contact_name.trim();
        if business_name.is_empty() || contact_name.is_empty() {
            return Err(PortError::InvalidInput(
                "business_name and contact_name are required".to_string(),
            ));
        }
        let email = email.map(str::trim).filter(|e| !e.is_empty());
        if email.is_some_and(|e| !e.contains('@')) {
            return Err(PortError::InvalidInput("email address is not valid".to_string()));
        }
        Ok(Self {
            business_name: business_name.to_string(),
            contact_name: contact_name.to_string(),
            phone: normalize_phone(phone)?,
            email: email.map(str::to_string),
            city: city.map(str::trim).filter(|c| !c.is_empty()).map(str::to_string),
        })
    }
}

/// Lowercase alphanumeric slug of the business name plus a four digit suffix.
pub fn generate_username(business_name: &str) -> String {
    let mut slug = String::new();
    for c in business_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
        if slug.len() >= 20 {
            break;
        }
    }
    let slug = slug.trim_end_matches('_');
    let slug = if slug.is_empty() { "partner" } else { slug };
    let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
    format!("{}_{}", slug, suffix)
}

pub fn generate_password() -> String {
    const ALPHABET: &[u8] = b"abcdefghijkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..12)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[derive(Clone)]
pub struct PartnerOnboarding {
    partnerships: Arc<dyn PartnershipStore>,
    documents: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthStore>,
}

impl PartnerOnboarding {
    pub fn new(
        partnerships: Arc<dyn PartnershipStore>,
        documents: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthStore>,
    ) -> Self {
        Self {
            partnerships,
            documents,
            auth,
        }
    }

    pub async fn apply(&self, application: PartnershipApplication) -> PortResult<Partnership> {
        let partnership = self.partnerships.create_partnership(&application).await?;
        info!(partnership_id = %partnership.id, "Received partnership application");
        Ok(partnership)
    }

    pub async fn list(&self, status: Option<PartnershipStatus>) -> PortResult<Vec<Partnership>> {
        self.partnerships.list_partnerships(status).await
    }

    /// Approves the partnership and creates its document set. Approving
    /// twice leaves existing documents untouched.
    pub async fn approve(&self, partnership_id: Uuid) -> PortResult<(Partnership, Vec<Document>)> {
        let current = self.partnerships.get_partnership(partnership_id).await?;
        if current.status == PartnershipStatus::Rejected {
            return Err(PortError::Conflict(format!(
                "partnership {} was rejected",
                partnership_id
            )));
        }
        let partnership = self
            .partnerships
            .set_partnership_status(partnership_id, PartnershipStatus::Approved)
            .await?;
        let documents = self
            .documents
            .create_documents(partnership_id, &default_requirements())
            .await?;
        info!(
            partnership_id = %partnership_id,
            documents = documents.len(),
            "Approved partnership for document collection"
        );
        Ok((partnership, documents))
    }

    pub async fn reject(&self, partnership_id: Uuid) -> PortResult<Partnership> {
        let current = self.partnerships.get_partnership(partnership_id).await?;
        if current.status != PartnershipStatus::Applied {
            return Err(PortError::Conflict(format!(
                "partnership {} is already {}",
                partnership_id, current.status
            )));
        }
        self.partnerships
            .set_partnership_status(partnership_id, PartnershipStatus::Rejected)
            .await
    }

    /// Creates a partner login. `hash_password` turns the generated
    /// plaintext into the stored hash.
    pub async fn generate_credentials<F>(
        &self,
        partnership_id: Uuid,
        hash_password: F,
    ) -> PortResult<PartnerLogin>
    where
        F: Fn(&str) -> PortResult<String> + Send,
    {
        let partnership = self.partnerships.get_partnership(partnership_id).await?;
        if partnership.status != PartnershipStatus::Approved {
            return Err(PortError::Conflict(format!(
                "partnership {} must be approved before credentials are issued",
                partnership_id
            )));
        }

        let password = generate_password();
        let hashed = hash_password(&password)?;

        // Suffix collisions are rare; retry a few times before giving up.
        let mut last_error = None;
        for _ in 0..3 {
            let username = generate_username(&partnership.business_name);
            match self
                .auth
                .create_user(&username, &hashed, Role::Partner, Some(partnership_id))
                .await
            {
                Ok(user) => {
                    info!(partnership_id = %partnership_id, username = %user.username, "Generated partner login");
                    return Ok(PartnerLogin {
                        user_id: user.id,
                        partnership_id,
                        username: user.username,
                        password,
                    });
                }
                Err(PortError::Conflict(msg)) => last_error = Some(PortError::Conflict(msg)),
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| PortError::Unexpected("could not create login".into())))
    }
}
