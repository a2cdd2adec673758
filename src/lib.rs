pub mod auth;
pub mod cart;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{http::HeaderValue, middleware, routing::get, routing::post, Json, Router};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{session_guard, Sessions};
use crate::cart::CartJar;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::openapi::ApiDoc;
use crate::services::orders::PricingConfig;
use crate::services::{IssueService, OrderService, ProductService, UserService};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub events: EventSender,
    pub sessions: Sessions,
    pub cart_jar: CartJar,
    pub products: ProductService,
    pub orders: OrderService,
    pub users: UserService,
    pub issues: IssueService,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: AppConfig, events: EventSender) -> Self {
        let db = Arc::new(db);
        let sessions = Sessions::new(
            &config.session_secret,
            &config.session_cookie_name,
            config.session_max_age_secs(),
        );
        let cart_jar = CartJar::new(&config.cart_cookie_name);
        let pricing = PricingConfig::from_app_config(&config);
        Self {
            products: ProductService::new(db.clone(), events.clone()),
            orders: OrderService::new(db.clone(), events.clone(), pricing),
            users: UserService::new(db.clone(), events.clone()),
            issues: IssueService::new(db.clone(), events.clone()),
            sessions,
            cart_jar,
            config: Arc::new(config),
            events,
            db,
        }
    }
}

/// Standard success envelope for JSON responses.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn api_status(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
    }))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}

/// Assembles the full application router: storefront views, admin back
/// office, auth, health, and Swagger UI, all behind the route guard.
pub fn app_router(state: AppState) -> Router {
    let storefront_product = handlers::products::storefront_routes()
        .route("/checkout", post(handlers::checkout::checkout));

    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(api_status))
        .nest("/auth", handlers::auth::routes())
        .nest("/api/view/product", storefront_product)
        .nest("/api/view/cart", handlers::cart::routes())
        .nest("/api/view/order", handlers::orders::storefront_routes())
        .nest("/api/view/user", handlers::users::storefront_routes())
        .nest("/api/view/issue", handlers::issues::storefront_routes())
        .nest("/api/admin/product", handlers::products::admin_routes())
        .nest("/api/admin/order", handlers::orders::admin_routes())
        .nest("/api/admin/user", handlers::users::admin_routes())
        .nest("/api/admin/issue", handlers::issues::admin_routes())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(state.clone(), session_guard))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
