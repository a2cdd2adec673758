use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::IntoParams;
use validator::Validate;

use crate::errors::ApiError;
use crate::ApiResponse;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// 200 with the standard success envelope.
pub fn success_response<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// 201 with the standard success envelope.
pub fn created_response<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

/// 204, no body.
pub fn no_content_response() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

/// Runs schema validation and folds failures into the field-error map the
/// error body carries, so clients can render messages inline per field.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input.validate().map_err(|errors| {
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (field, errs) in errors.field_errors() {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("invalid value for {field}"))
                })
                .collect();
            fields.insert(field.to_string(), messages);
        }
        ApiError::Validation(fields)
    })
}

/// Builds a single-field validation error for checks the derive macro
/// cannot express (cross-field rules).
pub fn field_error(field: &str, message: &str) -> ApiError {
    let mut fields = BTreeMap::new();
    fields.insert(field.to_string(), vec![message.to_string()]);
    ApiError::Validation(fields)
}

/// Common pagination query parameters.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PaginationParams {
    /// 1-based page index
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PaginationParams {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

/// Standard paginated list envelope.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, params: &PaginationParams) -> Self {
        Self {
            items,
            total,
            page: params.page(),
            per_page: params.per_page(),
        }
    }
}
