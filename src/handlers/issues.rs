use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::issue::IssueStatus;
use crate::errors::ApiError;
use crate::handlers::common::{
    created_response, success_response, validate_input, Paginated, PaginationParams,
};
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitIssueRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 1, max = 300, message = "subject must be 1-300 characters"))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000, message = "message must be 1-5000 characters"))]
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/api/view/issue",
    tag = "issues",
    request_body = SubmitIssueRequest,
    responses(
        (status = 201, description = "Issue recorded"),
        (status = 422, description = "Invalid submission")
    )
)]
pub async fn submit_issue(
    State(state): State<AppState>,
    Json(request): Json<SubmitIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&request)?;
    let issue = state
        .issues
        .submit_issue(request.name, request.email, request.subject, request.message)
        .await?;
    Ok(created_response(issue))
}

pub async fn admin_list_issues(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (issues, total) = state
        .issues
        .list_issues(params.page(), params.per_page())
        .await?;
    Ok(success_response(Paginated::new(issues, total, &params)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateIssueRequest {
    pub status: IssueStatus,
}

pub async fn admin_update_issue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issue = state.issues.set_status(id, request.status).await?;
    Ok(success_response(issue))
}

pub fn storefront_routes() -> Router<AppState> {
    Router::new().route("/", post(submit_issue))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list_issues))
        .route("/{id}", patch(admin_update_issue))
}
