use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::CurrentSession;
use crate::cart::CartStore;
use crate::errors::ApiError;
use crate::handlers::common::{created_response, field_error, validate_input};
use crate::services::orders::{CreateOrder, ShippingAddress};
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 50, message = "payment_method is required"))]
    pub payment_method: String,
    #[serde(default)]
    pub is_pick_up: bool,
    /// Required exactly when `is_pick_up` is false
    pub shipping_address: Option<ShippingAddress>,
    pub customer_note: Option<String>,
    #[serde(default)]
    pub discount: Decimal,
}

#[utoipa::path(
    post,
    path = "/api/view/product/checkout",
    tag = "checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created from the current cart"),
        (status = 422, description = "Empty cart or invalid checkout data")
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    jar: CookieJar,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;
    // Cross-field rule the derive cannot express.
    if !request.is_pick_up && request.shipping_address.is_none() {
        return Err(field_error(
            "shipping_address",
            "shipping address is required for delivery orders",
        ));
    }
    if request.discount < Decimal::ZERO {
        return Err(field_error("discount", "discount cannot be negative"));
    }

    let cart = state.cart_jar.load(&jar);
    let order = state
        .orders
        .create_order(CreateOrder {
            items: cart.items.clone(),
            user_id: session.user_id,
            payment_method: request.payment_method,
            is_pick_up: request.is_pick_up,
            shipping_address: request.shipping_address,
            customer_note: request.customer_note,
            discount: request.discount,
        })
        .await?;

    // The cart is consumed by a successful checkout.
    let jar = state.cart_jar.save(jar, &CartStore::default());
    Ok((jar, created_response(order)).into_response())
}
