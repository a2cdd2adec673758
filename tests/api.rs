use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ConnectOptions, Database};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::auth::Session;
use storefront_api::config::AppConfig;
use storefront_api::db::run_migrations;
use storefront_api::entities::product::ProductStatus;
use storefront_api::entities::user::UserRole;
use storefront_api::services::products::ProductFields;
use storefront_api::{app_router, events, AppState};

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        session_secret: "test-secret-test-secret-test-secret-test-secret-test-secret-1234".into(),
        session_cookie_name: "session".into(),
        cart_cookie_name: "cart".into(),
        session_max_age_days: 7,
        host: "127.0.0.1".into(),
        port: 8080,
        environment: "test".into(),
        log_level: "warn".into(),
        log_json: false,
        auto_migrate: false,
        default_tax_rate: 0.08,
        flat_shipping_rate: 10.0,
        free_shipping_threshold: 50.0,
        upload_dir: "uploads".into(),
        cors_allowed_origins: None,
    }
}

async fn test_state() -> AppState {
    // A single connection keeps the whole test on one in-memory database.
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options.max_connections(1).min_connections(1);
    let db = Database::connect(options).await.expect("connect sqlite");
    run_migrations(&db).await.expect("migrate");

    let (sender, receiver) = events::channel(64);
    tokio::spawn(events::process_events(receiver));
    AppState::new(db, test_config(), sender)
}

async fn seed_product(state: &AppState, code: &str, price: Decimal) -> Uuid {
    state
        .products
        .create_product(ProductFields {
            code: code.into(),
            name: format!("Product {code}"),
            product_type: "gadget".into(),
            description: "test".into(),
            unit_price: price,
            sale_price: None,
            sale_end_date: None,
            main_image_path: None,
            stock: 10,
            status: ProductStatus::Active,
        })
        .await
        .expect("seed product")
        .id
}

fn session_cookie(state: &AppState, role: UserRole) -> String {
    let token = state
        .sessions
        .encode(&Session::authenticated(Uuid::new_v4(), role));
    format!("session={token}")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

fn decimal_field(value: &Value, field: &str) -> Decimal {
    let raw = &value[field];
    let text = raw
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string());
    text.parse().unwrap_or_else(|_| panic!("{field} not a decimal: {raw}"))
}

#[tokio::test]
async fn migrations_apply_on_sqlite() {
    // test_state runs the full migration set against SQLite; seeding then
    // exercises the decimal columns at their maximum precision.
    let state = test_state().await;
    seed_product(&state, "SKU-MAX", dec!(999999999999.9999)).await;
}

#[tokio::test]
async fn logout_destroys_the_session() {
    let state = test_state().await;
    let cookie = session_cookie(&state, UserRole::Customer);
    let app = app_router(state.clone());

    let response = app
        .oneshot(
            Request::post("/auth/logout")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The last session Set-Cookie wins in the browser; it must not decode
    // to a logged-in session (i.e. the guard's activity refresh must not
    // override the handler's removal cookie).
    let final_session_cookie = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| value.starts_with("session="))
        .last()
        .expect("logout must set the session cookie")
        .to_string();
    let token = final_session_cookie
        .trim_start_matches("session=")
        .split(';')
        .next()
        .unwrap();
    assert!(
        !state.sessions.decode(token).is_logged_in,
        "logout left a live session cookie: {final_session_cookie}"
    );
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let app = app_router(test_state().await);
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_api_requires_authentication() {
    let app = app_router(test_state().await);
    let response = app
        .oneshot(Request::get("/api/admin/order").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_api_rejects_customers_with_forbidden() {
    let state = test_state().await;
    let cookie = session_cookie(&state, UserRole::Customer);
    let app = app_router(state);
    let response = app
        .oneshot(
            Request::get("/api/admin/order")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_api_admits_admins() {
    let state = test_state().await;
    let cookie = session_cookie(&state, UserRole::Admin);
    let app = app_router(state);
    let response = app
        .oneshot(
            Request::get("/api/admin/order")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_view_routes_return_401_when_anonymous() {
    let app = app_router(test_state().await);
    let response = app
        .oneshot(
            Request::get(format!("/api/view/order/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authenticated_sessions_are_redirected_off_login_page() {
    let state = test_state().await;
    let cookie = session_cookie(&state, UserRole::Customer);
    let app = app_router(state);
    let response = app
        .oneshot(
            Request::post("/auth/login")
                .header(header::COOKIE, cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"email": "a@b.example", "password": "pw"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn signup_starts_a_session() {
    let app = app_router(test_state().await);
    let response = app
        .oneshot(
            Request::post("/auth/signup")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "email": "ada@example.com",
                        "name": "Ada",
                        "password": "correct-horse"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let set_cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("session="));
    assert!(set_cookie.contains("HttpOnly"));

    let body = body_json(response).await;
    assert_eq!(body["data"]["role"], "CUSTOMER");
}

#[tokio::test]
async fn invalid_signup_reports_field_errors() {
    let app = app_router(test_state().await);
    let response = app
        .oneshot(
            Request::post("/auth/signup")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"email": "not-an-email", "name": "Ada", "password": "short"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert!(body["field_errors"]["email"].is_array());
    assert!(body["field_errors"]["password"].is_array());
}

#[tokio::test]
async fn cart_and_checkout_flow_creates_a_consistent_order() {
    let state = test_state().await;
    let product_id = seed_product(&state, "SKU-1", dec!(20)).await;
    let app = app_router(state);

    // Add the product to the cart twice; the second add merges into the line.
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/view/cart/items")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"product_id": product_id}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cart_cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/view/cart/items")
                .header(header::COOKIE, cart_cookie.clone())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"product_id": product_id}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let cart_cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let cart = body_json(response).await;
    assert_eq!(cart["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart["data"]["cart_count"], 2);

    // Pickup checkout: no shipping address required, shipping is free.
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/view/product/checkout")
                .header(header::COOKIE, cart_cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"payment_method": "cash", "is_pick_up": true}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let order = &body["data"];

    let number = order["order_number"].as_str().unwrap();
    assert!(number.starts_with("ORD-"));
    assert_eq!(number.len(), 12);
    assert!(number[4..]
        .chars()
        .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));

    let subtotal = decimal_field(order, "subtotal");
    let tax = decimal_field(order, "tax");
    let shipping = decimal_field(order, "shipping_cost");
    let discount = decimal_field(order, "discount");
    let total = decimal_field(order, "total_amount");
    assert_eq!(subtotal, dec!(40));
    assert_eq!(shipping, Decimal::ZERO);
    assert_eq!(total, subtotal + shipping + tax - discount);
    assert_eq!(order["order_status"], "PENDING");
    assert_eq!(order["payment_status"], "PENDING");
}

#[tokio::test]
async fn checkout_with_empty_cart_is_rejected() {
    let app = app_router(test_state().await);
    let response = app
        .oneshot(
            Request::post("/api/view/product/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"payment_method": "cash", "is_pick_up": true}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn delivery_checkout_without_address_is_rejected() {
    let state = test_state().await;
    let product_id = seed_product(&state, "SKU-2", dec!(15)).await;
    let app = app_router(state);

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/view/cart/items")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"product_id": product_id}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let cart_cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(
            Request::post("/api/view/product/checkout")
                .header(header::COOKIE, cart_cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"payment_method": "card", "is_pick_up": false}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert!(body["field_errors"]["shipping_address"].is_array());
}

#[tokio::test]
async fn corrupt_cart_cookie_degrades_to_empty_cart() {
    let app = app_router(test_state().await);
    let response = app
        .oneshot(
            Request::get("/api/view/cart")
                .header(header::COOKIE, "cart=%%%garbage%%%")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 0);
    assert_eq!(body["data"]["cart_count"], 0);
}

#[tokio::test]
async fn order_snapshots_survive_catalog_price_edits() {
    let state = test_state().await;
    let product_id = seed_product(&state, "SKU-3", dec!(30)).await;
    let app = app_router(state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/view/cart/items")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"product_id": product_id}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let cart_cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/view/product/checkout")
                .header(header::COOKIE, cart_cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"payment_method": "cash", "is_pick_up": true}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let order_id: Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();

    // Triple the catalog price after the fact.
    state
        .products
        .update_product(
            product_id,
            ProductFields {
                code: "SKU-3".into(),
                name: "Product SKU-3".into(),
                product_type: "gadget".into(),
                description: "test".into(),
                unit_price: dec!(90),
                sale_price: None,
                sale_end_date: None,
                main_image_path: None,
                stock: 10,
                status: ProductStatus::Active,
            },
        )
        .await
        .unwrap();

    let details = state.orders.get_order(order_id).await.unwrap();
    assert_eq!(details.items.len(), 1);
    assert_eq!(details.items[0].unit_price, dec!(30));
    assert_eq!(details.order.subtotal, dec!(30));
    assert_eq!(details.status_history.len(), 1);
    assert_eq!(
        details.status_history[0].note.as_deref(),
        Some("Order placed")
    );
}

#[tokio::test]
async fn customers_cannot_read_other_users_orders() {
    let state = test_state().await;
    let product_id = seed_product(&state, "SKU-4", dec!(10)).await;
    let app = app_router(state.clone());

    // Guest checkout: the order belongs to no user.
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/view/cart/items")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"product_id": product_id}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let cart_cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/view/product/checkout")
                .header(header::COOKIE, cart_cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"payment_method": "cash", "is_pick_up": true}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let cookie = session_cookie(&state, UserRole::Customer);
    let response = app
        .oneshot(
            Request::get(format!("/api/view/order/{order_id}"))
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
