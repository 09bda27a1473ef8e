//! In-memory implementation of the storage ports used by the unit tests.
//!
//! Each operation runs under one mutex, which gives the same atomicity the
//! Postgres adapter gets from its transactions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::access::check_token;
use crate::domain::{
    AccessToken, AuthSession, Customer, Document, DocumentReview, DocumentVersion, DocumentView,
    Measurement, Order, OrderStatus, OrderStatusEntry, Partnership, PartnershipStatus,
    ReviewStatus, Role, User, UserCredentials,
};
use crate::orders::{check_transition, MeasurementDraft, OrderDraft, PlacedOrder, StatusChange};
use crate::partners::PartnershipApplication;
use crate::ports::{
    AccessTokenStore, AuthStore, CustomerStore, DocumentStore, OrderStore, PartnershipStore,
    PortError, PortResult,
};
use crate::workflow::{
    plan_review, plan_upload, DocumentRequirement, ReviewSubmission, UploadRequest,
};

#[derive(Default)]
struct Inner {
    users: Vec<UserCredentials>,
    sessions: HashMap<String, AuthSession>,
    documents: HashMap<Uuid, Document>,
    versions: Vec<DocumentVersion>,
    reviews: Vec<DocumentReview>,
    views: Vec<DocumentView>,
    tokens: Vec<AccessToken>,
    partnerships: HashMap<Uuid, Partnership>,
    customers: Vec<Customer>,
    measurements: Vec<Measurement>,
    orders: HashMap<Uuid, Order>,
    history: Vec<OrderStatusEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> PortError {
    PortError::NotFound(format!("{} {} not found", what, id))
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn create_user(
        &self,
        username: &str,
        hashed_password: &str,
        role: Role,
        partnership_id: Option<Uuid>,
    ) -> PortResult<User> {
        let mut inner = self.lock();
        if inner.users.iter().any(|u| u.user.username == username) {
            return Err(PortError::Conflict(format!("username {} is taken", username)));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            role,
            partnership_id,
            last_login_at: None,
        };
        inner.users.push(UserCredentials {
            user: user.clone(),
            hashed_password: hashed_password.to_string(),
        });
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        self.lock()
            .users
            .iter()
            .find(|u| u.user.id == user_id)
            .map(|u| u.user.clone())
            .ok_or_else(|| not_found("User", user_id))
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        self.lock()
            .users
            .iter()
            .find(|u| u.user.username == username)
            .cloned()
            .ok_or_else(|| not_found("User", username))
    }

    async fn count_users(&self) -> PortResult<i64> {
        Ok(self.lock().users.len() as i64)
    }

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        let mut inner = self.lock();
        let creds = inner
            .users
            .iter_mut()
            .find(|u| u.user.id == user_id)
            .ok_or_else(|| not_found("User", user_id))?;
        creds.user.last_login_at = Some(at);
        Ok(())
    }

    async fn create_auth_session(&self, session: &AuthSession) -> PortResult<()> {
        let mut inner = self.lock();
        let now = Utc::now();
        inner.sessions.retain(|_, s| s.expires_at > now);
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User> {
        let user_id = {
            let inner = self.lock();
            match inner.sessions.get(session_id) {
                Some(s) if s.expires_at > Utc::now() => s.user_id,
                _ => return Err(PortError::Unauthorized),
            }
        };
        self.get_user_by_id(user_id).await
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.lock().sessions.remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_documents(
        &self,
        partnership_id: Uuid,
        requirements: &[DocumentRequirement],
    ) -> PortResult<Vec<Document>> {
        let mut inner = self.lock();
        let now = Utc::now();
        for req in requirements {
            let exists = inner.documents.values().any(|d| {
                d.partnership_id == partnership_id && d.document_type == req.document_type
            });
            if exists {
                continue;
            }
            let document = Document {
                id: Uuid::new_v4(),
                partnership_id,
                document_type: req.document_type.clone(),
                is_required: req.is_required,
                is_submitted: false,
                status: ReviewStatus::Pending,
                is_locked: false,
                admin_comment: None,
                reviewed_by: None,
                reviewed_at: None,
                view_count: 0,
                version_count: 0,
                current_version_id: None,
                created_at: now,
                updated_at: now,
            };
            inner.documents.insert(document.id, document);
        }
        let mut documents: Vec<Document> = inner
            .documents
            .values()
            .filter(|d| d.partnership_id == partnership_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.document_type.cmp(&b.document_type));
        Ok(documents)
    }

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
        self.lock()
            .documents
            .get(&document_id)
            .cloned()
            .ok_or_else(|| not_found("Document", document_id))
    }

    async fn list_documents(&self, partnership_id: Uuid) -> PortResult<Vec<Document>> {
        let mut documents: Vec<Document> = self
            .lock()
            .documents
            .values()
            .filter(|d| d.partnership_id == partnership_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.document_type.cmp(&b.document_type));
        Ok(documents)
    }

    async fn append_version(
        &self,
        document_id: Uuid,
        request: &UploadRequest,
    ) -> PortResult<(Document, DocumentVersion)> {
        let mut inner = self.lock();
        let document = inner
            .documents
            .get(&document_id)
            .cloned()
            .ok_or_else(|| not_found("Document", document_id))?;
        let plan = plan_upload(&document, request)?;

        let now = Utc::now();
        let version = DocumentVersion {
            id: Uuid::new_v4(),
            document_id,
            version_number: plan.version_number,
            file_url: request.file_url.clone(),
            file_name: request.file_name.clone(),
            uploaded_by: request.uploaded_by,
            upload_reason: plan.reason,
            is_current: true,
            created_at: now,
        };
        for v in inner.versions.iter_mut().filter(|v| v.document_id == document_id) {
            v.is_current = false;
        }
        inner.versions.push(version.clone());

        let document = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| not_found("Document", document_id))?;
        document.version_count = plan.version_number;
        document.current_version_id = Some(version.id);
        document.is_submitted = true;
        document.status = ReviewStatus::Pending;
        document.updated_at = now;
        Ok((document.clone(), version))
    }

    async fn record_review(
        &self,
        document_id: Uuid,
        submission: &ReviewSubmission,
    ) -> PortResult<(Document, DocumentReview)> {
        let mut inner = self.lock();
        let document = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| not_found("Document", document_id))?;
        let plan = plan_review(document, submission)?;

        let now = Utc::now();
        document.status = plan.status;
        document.is_locked = plan.lock;
        document.admin_comment = plan.comment.clone();
        document.reviewed_by = Some(submission.reviewer_id);
        document.reviewed_at = Some(now);
        document.updated_at = now;
        let document = document.clone();

        let review = DocumentReview {
            id: Uuid::new_v4(),
            document_id,
            version_id: plan.version_id,
            reviewer_id: submission.reviewer_id,
            decision: submission.decision,
            comment: plan.comment,
            created_at: now,
        };
        inner.reviews.push(review.clone());
        Ok((document, review))
    }

    async fn unlock_document(&self, document_id: Uuid) -> PortResult<Document> {
        let mut inner = self.lock();
        let document = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| not_found("Document", document_id))?;
        document.is_locked = false;
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    async fn list_versions(&self, document_id: Uuid) -> PortResult<Vec<DocumentVersion>> {
        let mut versions: Vec<DocumentVersion> = self
            .lock()
            .versions
            .iter()
            .filter(|v| v.document_id == document_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    async fn get_version(&self, version_id: Uuid) -> PortResult<DocumentVersion> {
        self.lock()
            .versions
            .iter()
            .find(|v| v.id == version_id)
            .cloned()
            .ok_or_else(|| not_found("Version", version_id))
    }

    async fn list_reviews(&self, document_id: Uuid) -> PortResult<Vec<DocumentReview>> {
        Ok(self
            .lock()
            .reviews
            .iter()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn log_view(
        &self,
        document_id: Uuid,
        version_id: Uuid,
        viewer_id: Option<Uuid>,
        token_id: Option<Uuid>,
    ) -> PortResult<DocumentView> {
        let mut inner = self.lock();
        let document = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| not_found("Document", document_id))?;
        document.view_count += 1;
        let view = DocumentView {
            id: Uuid::new_v4(),
            document_id,
            version_id,
            viewer_id,
            token_id,
            viewed_at: Utc::now(),
        };
        inner.views.push(view.clone());
        Ok(view)
    }
}

#[async_trait]
impl AccessTokenStore for MemoryStore {
    async fn create_access_token(&self, token: &AccessToken) -> PortResult<()> {
        self.lock().tokens.push(token.clone());
        Ok(())
    }

    async fn consume_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Option<AccessToken>> {
        let mut inner = self.lock();
        let Some(t) = inner.tokens.iter_mut().find(|t| t.token == token) else {
            return Ok(None);
        };
        if check_token(t, now).is_err() {
            return Ok(None);
        }
        t.use_count += 1;
        Ok(Some(t.clone()))
    }

    async fn find_access_token(&self, token: &str) -> PortResult<Option<AccessToken>> {
        Ok(self.lock().tokens.iter().find(|t| t.token == token).cloned())
    }
}

#[async_trait]
impl PartnershipStore for MemoryStore {
    async fn create_partnership(
        &self,
        application: &PartnershipApplication,
    ) -> PortResult<Partnership> {
        let partnership = Partnership {
            id: Uuid::new_v4(),
            business_name: application.business_name.clone(),
            contact_name: application.contact_name.clone(),
            phone: application.phone.clone(),
            email: application.email.clone(),
            city: application.city.clone(),
            status: PartnershipStatus::Applied,
            created_at: Utc::now(),
        };
        self.lock()
            .partnerships
            .insert(partnership.id, partnership.clone());
        Ok(partnership)
    }

    async fn get_partnership(&self, partnership_id: Uuid) -> PortResult<Partnership> {
        self.lock()
            .partnerships
            .get(&partnership_id)
            .cloned()
            .ok_or_else(|| not_found("Partnership", partnership_id))
    }

    async fn list_partnerships(
        &self,
        status: Option<PartnershipStatus>,
    ) -> PortResult<Vec<Partnership>> {
        Ok(self
            .lock()
            .partnerships
            .values()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect())
    }

    async fn set_partnership_status(
        &self,
        partnership_id: Uuid,
        status: PartnershipStatus,
    ) -> PortResult<Partnership> {
        let mut inner = self.lock();
        let partnership = inner
            .partnerships
            .get_mut(&partnership_id)
            .ok_or_else(|| not_found("Partnership", partnership_id))?;
        partnership.status = status;
        Ok(partnership.clone())
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn get_customer(&self, customer_id: Uuid) -> PortResult<Customer> {
        self.lock()
            .customers
            .iter()
            .find(|c| c.id == customer_id)
            .cloned()
            .ok_or_else(|| not_found("Customer", customer_id))
    }

    async fn list_customers(&self) -> PortResult<Vec<Customer>> {
        Ok(self.lock().customers.clone())
    }

    async fn add_measurement(
        &self,
        customer_id: Uuid,
        draft: &MeasurementDraft,
        taken_by: Option<Uuid>,
    ) -> PortResult<Measurement> {
        let measurement = Measurement {
            id: Uuid::new_v4(),
            customer_id,
            garment_type: draft.garment_type.clone(),
            unit: draft.unit.clone(),
            values: draft.values.clone(),
            notes: draft.notes.clone(),
            taken_by,
            created_at: Utc::now(),
        };
        self.lock().measurements.push(measurement.clone());
        Ok(measurement)
    }

    async fn list_measurements(&self, customer_id: Uuid) -> PortResult<Vec<Measurement>> {
        Ok(self
            .lock()
            .measurements
            .iter()
            .rev()
            .filter(|m| m.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(
        &self,
        order_number: &str,
        draft: &OrderDraft,
        created_by: Option<Uuid>,
    ) -> PortResult<PlacedOrder> {
        let now = Utc::now();
        let mut inner = self.lock();
        let customer = match inner
            .customers
            .iter()
            .find(|c| c.phone == draft.customer.phone)
        {
            Some(existing) => existing.clone(),
            None => {
                let customer = Customer {
                    id: Uuid::new_v4(),
                    full_name: draft.customer.full_name.clone(),
                    phone: draft.customer.phone.clone(),
                    email: draft.customer.email.clone(),
                    address: draft.customer.address.clone(),
                    created_at: now,
                };
                inner.customers.push(customer.clone());
                customer
            }
        };

        let measurement = draft.measurements.as_ref().map(|m| Measurement {
            id: Uuid::new_v4(),
            customer_id: customer.id,
            garment_type: m.garment_type.clone(),
            unit: m.unit.clone(),
            values: m.values.clone(),
            notes: m.notes.clone(),
            taken_by: created_by,
            created_at: now,
        });
        if let Some(m) = &measurement {
            inner.measurements.push(m.clone());
        }

        let order = Order {
            id: Uuid::new_v4(),
            order_number: order_number.to_string(),
            customer_id: customer.id,
            garment_type: draft.garment_type.clone(),
            status: OrderStatus::Received,
            assigned_tailor_id: None,
            due_date: draft.due_date,
            notes: draft.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.orders.insert(order.id, order.clone());
        inner.history.push(OrderStatusEntry {
            id: Uuid::new_v4(),
            order_id: order.id,
            status: OrderStatus::Received,
            note: None,
            changed_by: created_by,
            created_at: now,
        });
        Ok(PlacedOrder {
            customer,
            measurement,
            order,
        })
    }

    async fn get_order(&self, order_id: Uuid) -> PortResult<Order> {
        self.lock()
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| not_found("Order", order_id))
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        assigned_tailor_id: Option<Uuid>,
    ) -> PortResult<Vec<Order>> {
        Ok(self
            .lock()
            .orders
            .values()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .filter(|o| assigned_tailor_id.map_or(true, |t| o.assigned_tailor_id == Some(t)))
            .cloned()
            .collect())
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        change: &StatusChange,
    ) -> PortResult<Order> {
        let mut inner = self.lock();
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| not_found("Order", order_id))?;
        check_transition(order, change.status)?;
        let now = Utc::now();
        order.status = change.status;
        order.updated_at = now;
        let order = order.clone();
        inner.history.push(OrderStatusEntry {
            id: Uuid::new_v4(),
            order_id,
            status: change.status,
            note: change.note.clone(),
            changed_by: change.changed_by,
            created_at: now,
        });
        Ok(order)
    }

    async fn assign_tailor(&self, order_id: Uuid, tailor_id: Uuid) -> PortResult<Order> {
        let mut inner = self.lock();
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| not_found("Order", order_id))?;
        order.assigned_tailor_id = Some(tailor_id);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn order_history(&self, order_id: Uuid) -> PortResult<Vec<OrderStatusEntry>> {
        Ok(self
            .lock()
            .history
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(user_id: Uuid, expires_in: Duration) -> AuthSession {
        AuthSession {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: Utc::now() + expires_in,
        }
    }

    #[tokio::test]
    async fn new_sessions_sweep_expired_ones() {
        let store = MemoryStore::default();
        let user = store.create_user("asha", "hash", Role::Admin, None).await.unwrap();
        let stale = session(user.id, Duration::days(-1));
        let live = session(user.id, Duration::days(1));

        store.create_auth_session(&stale).await.unwrap();
        store.create_auth_session(&live).await.unwrap();

        let inner = store.lock();
        assert!(!inner.sessions.contains_key(&stale.id));
        assert!(inner.sessions.contains_key(&live.id));
    }
}
