use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::Session;
use crate::entities::user::UserRole;
use crate::errors::ApiError;
use crate::handlers::common::{created_response, no_content_response, success_response, validate_input};
use crate::handlers::users::UserView;
use crate::services::users::RegisterUser;
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created and session started", body = UserView),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid signup data")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;
    // Public signup always creates customers; admins are minted through
    // the back office.
    let account = state
        .users
        .register(RegisterUser {
            email: request.email,
            name: request.name,
            password: request.password,
            role: UserRole::Customer,
            phone: request.phone,
            address: request.address,
        })
        .await?;

    let session = Session::authenticated(account.id, account.role);
    let jar = state.sessions.issue(jar, &session);
    Ok((jar, created_response(UserView::from(account))).into_response())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session started", body = UserView),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;
    let account = state
        .users
        .verify_credentials(&request.email, &request.password)
        .await?;

    let session = Session::authenticated(account.id, account.role);
    let jar = state.sessions.issue(jar, &session);
    tracing::info!(user_id = %account.id, "User logged in");
    Ok((jar, success_response(UserView::from(account))).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses((status = 204, description = "Session destroyed"))
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let jar = state.sessions.clear(jar);
    (jar, no_content_response()).into_response()
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
}
