use utoipa::OpenApi;

use crate::cart::{CartItem, CartStore};
use crate::errors::ErrorResponse;
use crate::handlers;
use crate::services::orders::ShippingAddress;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::products::list_products,
        handlers::products::get_product,
        handlers::products::add_product,
        handlers::products::update_product,
        handlers::products::delete_product,
        handlers::cart::get_cart,
        handlers::cart::add_item,
        handlers::cart::update_quantity,
        handlers::cart::remove_item,
        handlers::cart::toggle_cart,
        handlers::checkout::checkout,
        handlers::orders::get_order,
        handlers::orders::list_orders_by_user,
        handlers::orders::update_order_status,
        handlers::orders::update_payment_status,
        handlers::users::get_user,
        handlers::users::edit_profile,
        handlers::issues::submit_issue,
        handlers::auth::signup,
        handlers::auth::login,
        handlers::auth::logout,
    ),
    components(schemas(
        ErrorResponse,
        CartItem,
        CartStore,
        ShippingAddress,
        handlers::cart::CartView,
        handlers::cart::AddCartItemRequest,
        handlers::cart::UpdateQuantityRequest,
        handlers::checkout::CheckoutRequest,
        handlers::orders::UpdateOrderStatusRequest,
        handlers::orders::UpdatePaymentStatusRequest,
        handlers::users::UserView,
        handlers::users::EditProfileRequest,
        handlers::users::CreateUserRequest,
        handlers::issues::SubmitIssueRequest,
        handlers::auth::SignupRequest,
        handlers::auth::LoginRequest,
        handlers::products::ProductPayload,
    )),
    tags(
        (name = "products", description = "Storefront catalog"),
        (name = "cart", description = "Cart state and snapshot persistence"),
        (name = "checkout", description = "Cart to order assembly"),
        (name = "orders", description = "Order tracking"),
        (name = "users", description = "Account profiles"),
        (name = "auth", description = "Session lifecycle"),
        (name = "issues", description = "Contact form submissions"),
        (name = "admin", description = "Back-office operations"),
    ),
    info(
        title = "Storefront API",
        description = "E-commerce storefront and admin back-office API",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
