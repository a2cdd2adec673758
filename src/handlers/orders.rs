use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CurrentSession;
use crate::auth::Session;
use crate::entities::order::{OrderStatus, PaymentStatus};
use crate::errors::ApiError;
use crate::handlers::common::{success_response, Paginated, PaginationParams};
use crate::AppState;

/// Customers may only read their own orders; admins may read any.
fn ensure_can_view(session: &Session, owner: Option<Uuid>) -> Result<(), ApiError> {
    if session.is_admin() {
        return Ok(());
    }
    match (session.user_id, owner) {
        (Some(viewer), Some(owner)) if viewer == owner => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

#[utoipa::path(
    get,
    path = "/api/view/order/{id}",
    tag = "orders",
    responses(
        (status = 200, description = "Order with item snapshots and status history"),
        (status = 403, description = "Order belongs to another user"),
        (status = 404, description = "Unknown order")
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state.orders.get_order(id).await?;
    ensure_can_view(&session, details.order.user_id)?;
    Ok(success_response(details))
}

#[utoipa::path(
    get,
    path = "/api/view/order/byUserId/{user_id}",
    tag = "orders",
    responses(
        (status = 200, description = "Orders for the user, newest first"),
        (status = 403, description = "Not your order history")
    )
)]
pub async fn list_orders_by_user(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_can_view(&session, Some(user_id))?;
    let orders = state.orders.list_orders_for_user(user_id).await?;
    Ok(success_response(orders))
}

pub async fn admin_list_orders(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (orders, total) = state
        .orders
        .list_orders(params.page(), params.per_page())
        .await?;
    Ok(success_response(Paginated::new(orders, total, &params)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub note: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/api/admin/order/{id}/status",
    tag = "admin",
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated and history appended"),
        (status = 404, description = "Unknown order")
    )
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .orders
        .update_order_status(id, request.status, request.note, session.user_id)
        .await?;
    Ok(success_response(order))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub status: PaymentStatus,
}

#[utoipa::path(
    patch,
    path = "/api/admin/order/{id}/payment",
    tag = "admin",
    request_body = UpdatePaymentStatusRequest,
    responses(
        (status = 200, description = "Payment status updated"),
        (status = 404, description = "Unknown order")
    )
)]
pub async fn update_payment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePaymentStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state.orders.update_payment_status(id, request.status).await?;
    Ok(success_response(order))
}

pub fn storefront_routes() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_order))
        .route("/byUserId/{user_id}", get(list_orders_by_user))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list_orders))
        .route("/{id}/status", patch(update_order_status))
        .route("/{id}/payment", patch(update_payment_status))
}
