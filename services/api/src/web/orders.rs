//! services/api/src/web/orders.rs
//!
//! Order wizard, order tracking, customers and measurements.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tailordesk_core::orders::{CustomerDraft, MeasurementDraft, OrderDraft, StatusChange};
use tailordesk_core::{
    Customer, Measurement, Order, OrderStatus, OrderStatusEntry, PlacedOrder, Role, User,
};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::{
    middleware::require_role, parse_field, port_error, state::AppState, HandlerError,
};

const STAFF: &[Role] = &[Role::Admin, Role::OrderManager];

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CustomerInput {
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct MeasurementInput {
    pub garment_type: Option<String>,
    /// `in` (default) or `cm`.
    pub unit: Option<String>,
    /// Named measurements, e.g. `{"chest": 40.5, "waist": 34}`.
    pub values: BTreeMap<String, f64>,
    pub notes: Option<String>,
}

/// Everything the order wizard collects across its steps.
#[derive(Deserialize, ToSchema)]
pub struct OrderRequest {
    pub customer: CustomerInput,
    pub garment_type: String,
    pub measurements: Option<MeasurementInput>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct StatusRequest {
    pub status: String,
    pub note: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AssignRequest {
    pub tailor_id: Uuid,
}

#[derive(Deserialize, IntoParams)]
pub struct OrderQuery {
    pub status: Option<String>,
}

//=========================================================================================
// Responses
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Customer> for CustomerResponse {
    fn from(c: Customer) -> Self {
        Self {
            id: c.id,
            full_name: c.full_name,
            phone: c.phone,
            email: c.email,
            address: c.address,
            created_at: c.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MeasurementResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub garment_type: String,
    pub unit: String,
    pub values: BTreeMap<String, f64>,
    pub notes: Option<String>,
    pub taken_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<Measurement> for MeasurementResponse {
    fn from(m: Measurement) -> Self {
        Self {
            id: m.id,
            customer_id: m.customer_id,
            garment_type: m.garment_type,
            unit: m.unit,
            values: m.values,
            notes: m.notes,
            taken_by: m.taken_by,
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub garment_type: String,
    pub status: String,
    pub assigned_tailor_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            order_number: o.order_number,
            customer_id: o.customer_id,
            garment_type: o.garment_type,
            status: o.status.to_string(),
            assigned_tailor_id: o.assigned_tailor_id,
            due_date: o.due_date,
            notes: o.notes,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StatusEntryResponse {
    pub status: String,
    pub note: Option<String>,
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<OrderStatusEntry> for StatusEntryResponse {
    fn from(e: OrderStatusEntry) -> Self {
        Self {
            status: e.status.to_string(),
            note: e.note,
            changed_by: e.changed_by,
            created_at: e.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PlacedOrderResponse {
    pub order: OrderResponse,
    pub customer: CustomerResponse,
    pub measurement: Option<MeasurementResponse>,
}

impl From<PlacedOrder> for PlacedOrderResponse {
    fn from(placed: PlacedOrder) -> Self {
        Self {
            order: placed.order.into(),
            customer: placed.customer.into(),
            measurement: placed.measurement.map(MeasurementResponse::from),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct OrderDetailResponse {
    pub order: OrderResponse,
    pub history: Vec<StatusEntryResponse>,
}

//=========================================================================================
// Conversions
//=========================================================================================

fn measurement_draft(
    input: &MeasurementInput,
    default_garment: &str,
) -> Result<MeasurementDraft, HandlerError> {
    MeasurementDraft::new(
        input.garment_type.as_deref().unwrap_or(default_garment),
        input.unit.as_deref(),
        input.values.clone(),
        input.notes.as_deref(),
    )
    .map_err(|e| port_error("Invalid measurements", e))
}

fn order_draft(req: &OrderRequest) -> Result<OrderDraft, HandlerError> {
    let customer = CustomerDraft::new(
        &req.customer.full_name,
        &req.customer.phone,
        req.customer.email.as_deref(),
        req.customer.address.as_deref(),
    )
    .map_err(|e| port_error("Invalid customer", e))?;
    let measurements = req
        .measurements
        .as_ref()
        .map(|m| measurement_draft(m, &req.garment_type))
        .transpose()?;
    OrderDraft::new(
        customer,
        &req.garment_type,
        measurements,
        req.due_date,
        req.notes.as_deref(),
    )
    .map_err(|e| port_error("Invalid order", e))
}

fn status_change(req: StatusRequest, changed_by: Uuid) -> Result<StatusChange, HandlerError> {
    Ok(StatusChange {
        status: parse_field::<OrderStatus>("status", &req.status)?,
        note: req.note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        changed_by: Some(changed_by),
    })
}

fn orders_json(orders: Vec<Order>) -> Json<Vec<OrderResponse>> {
    Json(orders.into_iter().map(OrderResponse::from).collect())
}

//=========================================================================================
// Public Order Wizard
//=========================================================================================

/// Submit the customer-facing order wizard.
#[utoipa::path(
    post,
    path = "/orders/request",
    request_body = OrderRequest,
    responses(
        (status = 201, description = "Order placed", body = PlacedOrderResponse),
        (status = 400, description = "Invalid order")
    )
)]
pub async fn request_order_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OrderRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let draft = order_draft(&req)?;
    let placed = state
        .orders
        .place_order(draft, None)
        .await
        .map_err(|e| port_error("Failed to place order", e))?;
    Ok((StatusCode::CREATED, Json(PlacedOrderResponse::from(placed))))
}

//=========================================================================================
// Staff Order Tracking
//=========================================================================================

/// Place an order on behalf of a walk-in customer.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = OrderRequest,
    responses((status = 201, description = "Order placed", body = PlacedOrderResponse))
)]
pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<OrderRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, STAFF)?;
    let draft = order_draft(&req)?;
    let placed = state
        .orders
        .place_order(draft, Some(user.id))
        .await
        .map_err(|e| port_error("Failed to place order", e))?;
    Ok((StatusCode::CREATED, Json(PlacedOrderResponse::from(placed))))
}

#[utoipa::path(
    get,
    path = "/orders",
    params(OrderQuery),
    responses((status = 200, description = "Orders, newest first", body = [OrderResponse]))
)]
pub async fn list_orders_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<OrderQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, STAFF)?;
    let status = query
        .status
        .as_deref()
        .map(|s| parse_field::<OrderStatus>("status", s))
        .transpose()?;
    let orders = state
        .orders
        .list_orders(status, None)
        .await
        .map_err(|e| port_error("Failed to load orders", e))?;
    Ok(orders_json(orders))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with status history", body = OrderDetailResponse),
        (status = 404, description = "Order not found")
    )
)]
pub async fn get_order_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, STAFF)?;
    let (order, history) = state
        .orders
        .order_with_history(order_id)
        .await
        .map_err(|e| port_error("Failed to load order", e))?;
    Ok(Json(OrderDetailResponse {
        order: order.into(),
        history: history.into_iter().map(StatusEntryResponse::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Status changed", body = OrderResponse),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, STAFF)?;
    let change = status_change(req, user.id)?;
    let order = state
        .orders
        .change_status(order_id, change)
        .await
        .map_err(|e| port_error("Failed to update order status", e))?;
    Ok(Json(OrderResponse::from(order)))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/assign",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = AssignRequest,
    responses(
        (status = 200, description = "Tailor assigned", body = OrderResponse),
        (status = 400, description = "User is not a tailor")
    )
)]
pub async fn assign_tailor_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, STAFF)?;
    let tailor = state
        .auth
        .get_user_by_id(req.tailor_id)
        .await
        .map_err(|e| port_error("Failed to load tailor", e))?;
    if tailor.role != Role::Tailor {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("User '{}' is not a tailor", tailor.username),
        ));
    }
    let order = state
        .orders
        .assign_tailor(order_id, tailor.id)
        .await
        .map_err(|e| port_error("Failed to assign tailor", e))?;
    Ok(Json(OrderResponse::from(order)))
}

//=========================================================================================
// Customers and Measurements
//=========================================================================================

#[utoipa::path(
    get,
    path = "/customers",
    responses((status = 200, description = "Customers", body = [CustomerResponse]))
)]
pub async fn list_customers_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, STAFF)?;
    let customers = state
        .orders
        .list_customers()
        .await
        .map_err(|e| port_error("Failed to load customers", e))?;
    Ok(Json(
        customers
            .into_iter()
            .map(CustomerResponse::from)
            .collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    get,
    path = "/customers/{id}/measurements",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses((status = 200, description = "Measurements, newest first", body = [MeasurementResponse]))
)]
pub async fn list_measurements_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, &[Role::Admin, Role::OrderManager, Role::Tailor])?;
    let measurements = state
        .orders
        .measurements(customer_id)
        .await
        .map_err(|e| port_error("Failed to load measurements", e))?;
    Ok(Json(
        measurements
            .into_iter()
            .map(MeasurementResponse::from)
            .collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    post,
    path = "/customers/{id}/measurements",
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = MeasurementInput,
    responses((status = 201, description = "Measurement recorded", body = MeasurementResponse))
)]
pub async fn add_measurement_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(customer_id): Path<Uuid>,
    Json(req): Json<MeasurementInput>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, STAFF)?;
    let draft = measurement_draft(&req, "")?;
    let measurement = state
        .orders
        .record_measurement(customer_id, draft, Some(user.id))
        .await
        .map_err(|e| port_error("Failed to record measurement", e))?;
    Ok((StatusCode::CREATED, Json(MeasurementResponse::from(measurement))))
}

//=========================================================================================
// Tailor Work Queue
//=========================================================================================

/// Orders assigned to the signed-in tailor.
#[utoipa::path(
    get,
    path = "/tailor/orders",
    params(OrderQuery),
    responses((status = 200, description = "Assigned orders", body = [OrderResponse]))
)]
pub async fn tailor_orders_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<OrderQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, &[Role::Tailor])?;
    let status = query
        .status
        .as_deref()
        .map(|s| parse_field::<OrderStatus>("status", s))
        .transpose()?;
    let orders = state
        .orders
        .list_orders(status, Some(user.id))
        .await
        .map_err(|e| port_error("Failed to load orders", e))?;
    Ok(orders_json(orders))
}

#[utoipa::path(
    post,
    path = "/tailor/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Status changed", body = OrderResponse),
        (status = 403, description = "Order is not assigned to the caller")
    )
)]
pub async fn tailor_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&user, &[Role::Tailor])?;
    let change = status_change(req, user.id)?;
    let order = state
        .orders
        .change_status_as_tailor(order_id, user.id, change)
        .await
        .map_err(|e| port_error("Failed to update order status", e))?;
    Ok(Json(OrderResponse::from(order)))
}
