use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{CurrentSession, Session};
use crate::entities::user::{self, UserRole};
use crate::errors::ApiError;
use crate::handlers::common::{
    created_response, success_response, validate_input, Paginated, PaginationParams,
};
use crate::services::users::{ProfileUpdate, RegisterUser};
use crate::AppState;
use validator::Validate;

/// Account as rendered to clients; the password hash never leaves the
/// service boundary.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<user::Model> for UserView {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            role: model.role,
            phone: model.phone,
            address: model.address,
        }
    }
}

fn ensure_self_or_admin(session: &Session, subject: Uuid) -> Result<(), ApiError> {
    if session.is_admin() || session.user_id == Some(subject) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[utoipa::path(
    get,
    path = "/api/view/user/{id}",
    tag = "users",
    responses(
        (status = 200, description = "Account profile", body = UserView),
        (status = 403, description = "Not your profile"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_self_or_admin(&session, id)?;
    let account = state.users.get_user(id).await?;
    Ok(success_response(UserView::from(account)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EditProfileRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 30, message = "phone is too long"))]
    pub phone: Option<String>,
    #[validate(length(max = 500, message = "address is too long"))]
    pub address: Option<String>,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/api/view/user/{id}/editProfile",
    tag = "users",
    request_body = EditProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserView),
        (status = 403, description = "Not your profile")
    )
)]
pub async fn edit_profile(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
    Json(request): Json<EditProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_self_or_admin(&session, id)?;
    validate_input(&request)?;
    let account = state
        .users
        .update_profile(
            id,
            ProfileUpdate {
                name: request.name,
                phone: request.phone,
                address: request.address,
                password: request.password,
            },
        )
        .await?;
    Ok(success_response(UserView::from(account)))
}

pub async fn admin_list_users(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (users, total) = state
        .users
        .list_users(params.page(), params.per_page())
        .await?;
    let views: Vec<UserView> = users.into_iter().map(UserView::from).collect();
    Ok(success_response(Paginated::new(views, total, &params)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Back-office account creation; the only way to mint admin accounts.
pub async fn admin_create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&request)?;
    let account = state
        .users
        .register(RegisterUser {
            email: request.email,
            name: request.name,
            password: request.password,
            role: request.role,
            phone: request.phone,
            address: request.address,
        })
        .await?;
    Ok(created_response(UserView::from(account)))
}

pub fn storefront_routes() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_user))
        .route("/{id}/editProfile", patch(edit_profile))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/", get(admin_list_users).post(admin_create_user))
}
