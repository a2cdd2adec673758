use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::cart::{CartItem, CartStore};
use crate::entities::product::ProductStatus;
use crate::errors::{ApiError, ServiceError};
use crate::handlers::common::success_response;
use crate::AppState;

/// Cart as rendered to clients: lines plus the derived totals.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub open: bool,
    pub cart_total: Decimal,
    pub cart_count: i32,
}

impl CartView {
    fn from_store(cart: &CartStore) -> Self {
        Self {
            items: cart.items.clone(),
            open: cart.open,
            cart_total: cart.cart_total(Utc::now()),
            cart_count: cart.cart_count(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuantityRequest {
    /// Signed change; the resulting quantity is floored at 1
    pub delta: i32,
}

/// Loads the cart, applies a mutation, saves the snapshot, and answers
/// with the refreshed view. Every cart route funnels through here.
fn respond_with_cart(state: &AppState, jar: CookieJar, cart: &CartStore) -> Response {
    let jar = state.cart_jar.save(jar, cart);
    (jar, success_response(CartView::from_store(cart))).into_response()
}

#[utoipa::path(
    get,
    path = "/api/view/cart",
    tag = "cart",
    responses((status = 200, description = "Current cart", body = CartView))
)]
pub async fn get_cart(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let cart = state.cart_jar.load(&jar);
    success_response(CartView::from_store(&cart))
}

#[utoipa::path(
    post,
    path = "/api/view/cart/items",
    tag = "cart",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 422, description = "Product unavailable")
    )
)]
pub async fn add_item(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<AddCartItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state.products.get_product(request.product_id).await?;
    if product.status != ProductStatus::Active {
        return Err(ServiceError::ValidationError(format!(
            "Product {} is not available",
            product.code
        ))
        .into());
    }

    let mut cart = state.cart_jar.load(&jar);
    cart.add_to_cart(CartItem::from_product(&product));
    Ok(respond_with_cart(&state, jar, &cart))
}

#[utoipa::path(
    patch,
    path = "/api/view/cart/items/{product_id}",
    tag = "cart",
    request_body = UpdateQuantityRequest,
    responses((status = 200, description = "Updated cart", body = CartView))
)]
pub async fn update_quantity(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    jar: CookieJar,
    Json(request): Json<UpdateQuantityRequest>,
) -> impl IntoResponse {
    let mut cart = state.cart_jar.load(&jar);
    cart.update_quantity(product_id, request.delta);
    respond_with_cart(&state, jar, &cart)
}

#[utoipa::path(
    delete,
    path = "/api/view/cart/items/{product_id}",
    tag = "cart",
    responses((status = 200, description = "Updated cart", body = CartView))
)]
pub async fn remove_item(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    jar: CookieJar,
) -> impl IntoResponse {
    let mut cart = state.cart_jar.load(&jar);
    cart.remove_from_cart(product_id);
    respond_with_cart(&state, jar, &cart)
}

#[utoipa::path(
    post,
    path = "/api/view/cart/toggle",
    tag = "cart",
    responses((status = 200, description = "Updated cart", body = CartView))
)]
pub async fn toggle_cart(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let mut cart = state.cart_jar.load(&jar);
    cart.toggle_cart();
    respond_with_cart(&state, jar, &cart)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route(
            "/items/{product_id}",
            patch(update_quantity).delete(remove_item),
        )
        .route("/toggle", post(toggle_cart))
}
