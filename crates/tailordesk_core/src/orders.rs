//! crates/tailordesk_core/src/orders.rs
//!
//! Customers, measurements and tailoring orders: the server side of the
//! multi-step order wizard and the order status progression.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Customer, Measurement, Order, OrderStatus, OrderStatusEntry};
use crate::ports::{CustomerStore, OrderStore, PortError, PortResult};

//=========================================================================================
// Status Progression
//=========================================================================================

impl OrderStatus {
    fn stage(&self) -> Option<u8> {
        match self {
            OrderStatus::Received => Some(0),
            OrderStatus::Measuring => Some(1),
            OrderStatus::Cutting => Some(2),
            OrderStatus::Stitching => Some(3),
            OrderStatus::Trial => Some(4),
            OrderStatus::Ready => Some(5),
            OrderStatus::Delivered => Some(6),
            OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Production only moves forward, though stages may be skipped.
    /// A trial can send the garment back to stitching for alterations.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == OrderStatus::Cancelled {
            return true;
        }
        if *self == OrderStatus::Trial && next == OrderStatus::Stitching {
            return true;
        }
        match (self.stage(), next.stage()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

/// A requested status change, recorded in the order's history.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub changed_by: Option<Uuid>,
}

pub fn check_transition(order: &Order, next: OrderStatus) -> PortResult<()> {
    if order.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(PortError::Conflict(format!(
            "order {} cannot move from '{}' to '{}'",
            order.order_number, order.status, next
        )))
    }
}

//=========================================================================================
// Wizard Drafts
//=========================================================================================

fn required_text(field: &str, value: &str) -> PortResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PortError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Strips spaces, dashes and brackets and checks for 7 to 15 digits with an
/// optional leading `+`.
pub fn normalize_phone(phone: &str) -> PortResult<String> {
    let compact: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PortError::InvalidInput(format!(
            "'{}' is not a valid phone number",
            phone
        )));
    }
    Ok(compact)
}

#[derive(Debug, Clone)]
pub struct CustomerDraft {
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl CustomerDraft {
    pub fn new(
        full_name: &str,
        phone: &str,
        email: Option<&str>,
        address: Option<&str>,
    ) -> PortResult<Self> {
        let email = optional_text(email);
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(PortError::InvalidInput(format!(
                    "'{}' is not a valid email address",
                    email
                )));
            }
        }
        Ok(Self {
            full_name: required_text("full_name", full_name)?,
            phone: normalize_phone(phone)?,
            email,
            address: optional_text(address),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MeasurementDraft {
    pub garment_type: String,
    pub unit: String,
    pub values: BTreeMap<String, f64>,
    pub notes: Option<String>,
}

impl MeasurementDraft {
    /// `unit` defaults to inches.
    pub fn new(
        garment_type: &str,
        unit: Option<&str>,
        values: BTreeMap<String, f64>,
        notes: Option<&str>,
    ) -> PortResult<Self> {
        let unit = optional_text(unit).unwrap_or_else(|| "in".to_string());
        if !matches!(unit.as_str(), "in" | "cm") {
            return Err(PortError::InvalidInput(format!(
                "unit must be 'in' or 'cm', got '{}'",
                unit
            )));
        }
        if values.is_empty() {
            return Err(PortError::InvalidInput(
                "at least one measurement is required".to_string(),
            ));
        }
        let mut cleaned = BTreeMap::new();
        for (name, value) in values {
            let name = required_text("measurement name", &name)?;
            if !value.is_finite() || value <= 0.0 {
                return Err(PortError::InvalidInput(format!(
                    "measurement '{}' must be a positive number",
                    name
                )));
            }
            cleaned.insert(name, value);
        }
        Ok(Self {
            garment_type: required_text("garment_type", garment_type)?,
            unit,
            values: cleaned,
            notes: optional_text(notes),
        })
    }
}

/// Everything the order wizard collects before submission.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub customer: CustomerDraft,
    pub garment_type: String,
    pub measurements: Option<MeasurementDraft>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl OrderDraft {
    pub fn new(
        customer: CustomerDraft,
        garment_type: &str,
        measurements: Option<MeasurementDraft>,
        due_date: Option<NaiveDate>,
        notes: Option<&str>,
    ) -> PortResult<Self> {
        if let Some(due) = due_date {
            if due < Utc::now().date_naive() {
                return Err(PortError::InvalidInput(format!(
                    "due date {} is in the past",
                    due
                )));
            }
        }
        Ok(Self {
            customer,
            garment_type: required_text("garment_type", garment_type)?,
            measurements,
            due_date,
            notes: optional_text(notes),
        })
    }
}

/// `ORD-YYYYMMDD-XXXXXX` with a random uppercase alphanumeric suffix.
pub fn generate_order_number() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

//=========================================================================================
// Order Desk Service
//=========================================================================================

/// The order placed by the wizard together with what it created.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub customer: Customer,
    pub measurement: Option<Measurement>,
    pub order: Order,
}

#[derive(Clone)]
pub struct OrderDesk {
    customers: Arc<dyn CustomerStore>,
    orders: Arc<dyn OrderStore>,
}

impl OrderDesk {
    pub fn new(customers: Arc<dyn CustomerStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self { customers, orders }
    }

    /// Reuses the customer with the same phone number when one exists.
    pub async fn place_order(
        &self,
        draft: OrderDraft,
        created_by: Option<Uuid>,
    ) -> PortResult<PlacedOrder> {
        let placed = self
            .orders
            .place_order(&generate_order_number(), &draft, created_by)
            .await?;
        info!(
            order_number = %placed.order.order_number,
            customer_id = %placed.customer.id,
            "Placed order"
        );
        Ok(placed)
    }

    pub async fn change_status(&self, order_id: Uuid, change: StatusChange) -> PortResult<Order> {
        let order = self.orders.update_order_status(order_id, &change).await?;
        info!(order_number = %order.order_number, status = %order.status, "Order status changed");
        Ok(order)
    }

    pub async fn assign_tailor(&self, order_id: Uuid, tailor_id: Uuid) -> PortResult<Order> {
        let order = self.orders.get_order(order_id).await?;
        if order.status.is_terminal() {
            return Err(PortError::Conflict(format!(
                "order {} is already {}",
                order.order_number, order.status
            )));
        }
        self.orders.assign_tailor(order_id, tailor_id).await
    }

    /// Tailors may only move orders that are assigned to them.
    pub async fn change_status_as_tailor(
        &self,
        order_id: Uuid,
        tailor_id: Uuid,
        change: StatusChange,
    ) -> PortResult<Order> {
        let order = self.orders.get_order(order_id).await?;
        if order.assigned_tailor_id != Some(tailor_id) {
            return Err(PortError::Unauthorized);
        }
        self.change_status(order_id, change).await
    }

    pub async fn order_with_history(
        &self,
        order_id: Uuid,
    ) -> PortResult<(Order, Vec<OrderStatusEntry>)> {
        let order = self.orders.get_order(order_id).await?;
        let history = self.orders.order_history(order_id).await?;
        Ok((order, history))
    }

    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        assigned_tailor_id: Option<Uuid>,
    ) -> PortResult<Vec<Order>> {
        self.orders.list_orders(status, assigned_tailor_id).await
    }

    pub async fn list_customers(&self) -> PortResult<Vec<Customer>> {
        self.customers.list_customers().await
    }

    pub async fn record_measurement(
        &self,
        customer_id: Uuid,
        draft: MeasurementDraft,
        taken_by: Option<Uuid>,
    ) -> PortResult<Measurement> {
        self.customers.get_customer(customer_id).await?;
        self.customers.add_measurement(customer_id, &draft, taken_by).await
    }

    pub async fn measurements(&self, customer_id: Uuid) -> PortResult<Vec<Measurement>> {
        self.customers.get_customer(customer_id).await?;
        self.customers.list_measurements(customer_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn desk() -> (Arc<MemoryStore>, OrderDesk) {
        let store = Arc::new(MemoryStore::default());
        (store.clone(), OrderDesk::new(store.clone(), store))
    }

    fn draft(phone: &str) -> OrderDraft {
        let customer = CustomerDraft::new("Asha Rao", phone, None, Some("12 MG Road")).unwrap();
        let measurements = MeasurementDraft::new(
            "kurta",
            None,
            BTreeMap::from([("chest".to_string(), 38.5), ("length".to_string(), 42.0)]),
            None,
        )
        .unwrap();
        OrderDraft::new(customer, "kurta", Some(measurements), None, Some("festive")).unwrap()
    }

    fn change(status: OrderStatus) -> StatusChange {
        StatusChange {
            status,
            note: None,
            changed_by: None,
        }
    }

    #[test]
    fn status_moves_forward_and_allows_alterations() {
        use OrderStatus::*;
        assert!(Received.can_transition_to(Cutting));
        assert!(Trial.can_transition_to(Stitching));
        assert!(Stitching.can_transition_to(Cancelled));
        assert!(!Ready.can_transition_to(Cutting));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Received));
        assert!(!Received.can_transition_to(Received));
    }

    #[test]
    fn phone_numbers_are_normalized() {
        assert_eq!(normalize_phone("+91 98765-43210").unwrap(), "+919876543210");
        assert_eq!(normalize_phone("(080) 2345 678").unwrap(), "0802345678");
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("98765abc10").is_err());
    }

    #[test]
    fn measurement_values_must_be_positive() {
        let bad = MeasurementDraft::new(
            "shirt",
            Some("cm"),
            BTreeMap::from([("waist".to_string(), 0.0)]),
            None,
        );
        assert!(bad.is_err());
        let unit = MeasurementDraft::new(
            "shirt",
            Some("mm"),
            BTreeMap::from([("waist".to_string(), 80.0)]),
            None,
        );
        assert!(unit.is_err());
        assert!(MeasurementDraft::new("shirt", None, BTreeMap::new(), None).is_err());
    }

    #[test]
    fn customer_draft_checks_email_and_name() {
        assert!(CustomerDraft::new("  ", "9876543210", None, None).is_err());
        assert!(CustomerDraft::new("Ravi", "9876543210", Some("ravi.example.com"), None).is_err());
        let ok = CustomerDraft::new("Ravi", "9876543210", Some(" "), None).unwrap();
        assert_eq!(ok.email, None);
    }

    #[test]
    fn past_due_dates_are_rejected() {
        let customer = CustomerDraft::new("Ravi", "9876543210", None, None).unwrap();
        let yesterday = Utc::now().date_naive() - chrono::Duration::days(1);
        assert!(OrderDraft::new(customer, "suit", None, Some(yesterday), None).is_err());
    }

    #[test]
    fn order_numbers_have_date_and_suffix() {
        let number = generate_order_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
    }

    #[tokio::test]
    async fn placing_orders_reuses_customers_by_phone() {
        let (_, desk) = desk();
        let first = desk.place_order(draft("9876543210"), None).await.unwrap();
        let second = desk.place_order(draft("98765 43210"), None).await.unwrap();

        assert_eq!(first.customer.id, second.customer.id);
        assert_ne!(first.order.id, second.order.id);
        assert_eq!(first.order.status, OrderStatus::Received);
        assert_eq!(desk.measurements(first.customer.id).await.unwrap().len(), 2);
        assert_eq!(desk.list_customers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_orders_for_a_new_phone_share_one_customer() {
        let (_, desk) = desk();
        let (a, b) = tokio::join!(
            desk.place_order(draft("9123456780"), None),
            desk.place_order(draft("91234 56780"), None),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.customer.id, b.customer.id);
        assert_eq!(desk.list_customers().await.unwrap().len(), 1);
        assert_eq!(desk.list_orders(None, None).await.unwrap().len(), 2);
        assert_eq!(desk.measurements(a.customer.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn status_changes_are_recorded_in_history() {
        let (_, desk) = desk();
        let placed = desk.place_order(draft("9876543210"), None).await.unwrap();
        let id = placed.order.id;

        desk.change_status(id, change(OrderStatus::Cutting)).await.unwrap();
        let err = desk
            .change_status(id, change(OrderStatus::Measuring))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));

        let (order, history) = desk.order_with_history(id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cutting);
        let statuses: Vec<OrderStatus> = history.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![OrderStatus::Received, OrderStatus::Cutting]);
    }

    #[tokio::test]
    async fn tailors_only_move_their_own_orders() {
        let (_, desk) = desk();
        let placed = desk.place_order(draft("9876543210"), None).await.unwrap();
        let tailor = Uuid::new_v4();
        let id = placed.order.id;

        let err = desk
            .change_status_as_tailor(id, tailor, change(OrderStatus::Stitching))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unauthorized));

        desk.assign_tailor(id, tailor).await.unwrap();
        let order = desk
            .change_status_as_tailor(id, tailor, change(OrderStatus::Stitching))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Stitching);
        assert_eq!(desk.list_orders(None, Some(tailor)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn finished_orders_cannot_be_reassigned() {
        let (_, desk) = desk();
        let placed = desk.place_order(draft("9876543210"), None).await.unwrap();
        desk.change_status(placed.order.id, change(OrderStatus::Cancelled))
            .await
            .unwrap();
        let err = desk
            .assign_tailor(placed.order.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }
}
