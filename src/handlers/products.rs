use axum::{
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::entities::product::ProductStatus;
use crate::errors::ApiError;
use crate::handlers::common::{
    created_response, field_error, no_content_response, success_response, validate_input,
    Paginated, PaginationParams,
};
use crate::services::products::{ProductFields, ProductQuery, ProductSort};
use crate::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListProductsParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// One of `name`, `price`, `created_at` (default)
    pub sort_by: Option<String>,
    /// `asc` or `desc` (default)
    pub sort_order: Option<String>,
    pub search: Option<String>,
    pub product_type: Option<String>,
}

impl ListProductsParams {
    fn into_query(self, active_only: bool) -> ProductQuery {
        let pagination = PaginationParams {
            page: self.page,
            per_page: self.per_page,
        };
        ProductQuery {
            page: pagination.page(),
            per_page: pagination.per_page(),
            sort_by: match self.sort_by.as_deref() {
                Some("name") => ProductSort::Name,
                Some("price") => ProductSort::Price,
                _ => ProductSort::CreatedAt,
            },
            ascending: matches!(self.sort_order.as_deref(), Some("asc")),
            search: self.search.filter(|s| !s.trim().is_empty()),
            product_type: self.product_type.filter(|s| !s.trim().is_empty()),
            active_only,
        }
    }
}

/// Product fields as they arrive in the multipart `payload` part.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ProductPayload {
    #[validate(length(min = 1, max = 50, message = "code must be 1-50 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "product_type must be 1-100 characters"))]
    pub product_type: String,
    #[serde(default)]
    pub description: String,
    pub unit_price: Decimal,
    pub sale_price: Option<Decimal>,
    pub sale_end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "default_status")]
    pub status: ProductStatus,
}

fn default_status() -> ProductStatus {
    ProductStatus::Active
}

#[utoipa::path(
    get,
    path = "/api/view/product",
    tag = "products",
    params(ListProductsParams),
    responses((status = 200, description = "Active products, paginated"))
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListProductsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let pagination = PaginationParams {
        page: params.page,
        per_page: params.per_page,
    };
    let (products, total) = state.products.list_products(params.into_query(true)).await?;
    Ok(success_response(Paginated::new(products, total, &pagination)))
}

#[utoipa::path(
    get,
    path = "/api/view/product/{id}",
    tag = "products",
    responses(
        (status = 200, description = "Product detail"),
        (status = 404, description = "Unknown product")
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(success_response(state.products.get_product(id).await?))
}

/// Back-office listing: every status, same query surface.
pub async fn admin_list_products(
    State(state): State<AppState>,
    Query(params): Query<ListProductsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let pagination = PaginationParams {
        page: params.page,
        per_page: params.per_page,
    };
    let (products, total) = state.products.list_products(params.into_query(false)).await?;
    Ok(success_response(Paginated::new(products, total, &pagination)))
}

#[utoipa::path(
    post,
    path = "/api/admin/product/addProduct",
    tag = "admin",
    request_body(content = ProductPayload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Product created"),
        (status = 409, description = "Duplicate product code"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn add_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (payload, image) = read_product_multipart(multipart).await?;
    let payload = payload.ok_or_else(|| field_error("payload", "payload part is required"))?;
    validate_input(&payload)?;

    let image_path = match image {
        Some(upload) => Some(store_image(&state, upload).await?),
        None => None,
    };

    let result = state
        .products
        .create_product(ProductFields {
            code: payload.code,
            name: payload.name,
            product_type: payload.product_type,
            description: payload.description,
            unit_price: payload.unit_price,
            sale_price: payload.sale_price,
            sale_end_date: payload.sale_end_date,
            main_image_path: image_path.clone(),
            stock: payload.stock,
            status: payload.status,
        })
        .await;

    match result {
        Ok(product) => Ok(created_response(product)),
        Err(err) => {
            // The image was written before the insert; remove the orphan.
            if let Some(path) = image_path {
                if let Err(io_err) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(%path, error = %io_err, "failed to remove orphaned product image");
                }
            }
            Err(err.into())
        }
    }
}

#[utoipa::path(
    patch,
    path = "/api/admin/product/{id}",
    tag = "admin",
    request_body(content = ProductPayload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Product updated"),
        (status = 404, description = "Unknown product")
    )
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (payload, image) = read_product_multipart(multipart).await?;
    let payload = payload.ok_or_else(|| field_error("payload", "payload part is required"))?;
    validate_input(&payload)?;

    let image_path = match image {
        Some(upload) => Some(store_image(&state, upload).await?),
        None => None,
    };

    let result = state
        .products
        .update_product(
            id,
            ProductFields {
                code: payload.code,
                name: payload.name,
                product_type: payload.product_type,
                description: payload.description,
                unit_price: payload.unit_price,
                sale_price: payload.sale_price,
                sale_end_date: payload.sale_end_date,
                main_image_path: image_path.clone(),
                stock: payload.stock,
                status: payload.status,
            },
        )
        .await;

    match result {
        Ok(product) => Ok(success_response(product)),
        Err(err) => {
            if let Some(path) = image_path {
                if let Err(io_err) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(%path, error = %io_err, "failed to remove orphaned product image");
                }
            }
            Err(err.into())
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/admin/product/{id}",
    tag = "admin",
    responses(
        (status = 204, description = "Product deleted"),
        (status = 404, description = "Unknown product")
    )
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.products.delete_product(id).await?;
    Ok(no_content_response())
}

struct ImageUpload {
    bytes: Vec<u8>,
    extension: &'static str,
}

/// Pulls the `payload` (JSON) and optional `image` parts out of the form.
async fn read_product_multipart(
    mut multipart: Multipart,
) -> Result<(Option<ProductPayload>, Option<ImageUpload>), ApiError> {
    let mut payload = None;
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("payload") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("unreadable payload part: {e}")))?;
                payload = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| field_error("payload", &format!("invalid JSON: {e}")))?,
                );
            }
            Some("image") => {
                let extension = match field.content_type() {
                    Some("image/png") => "png",
                    Some("image/jpeg") => "jpg",
                    Some("image/webp") => "webp",
                    other => {
                        return Err(field_error(
                            "image",
                            &format!("unsupported image type {other:?}"),
                        ))
                    }
                };
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("unreadable image part: {e}")))?;
                image = Some(ImageUpload {
                    bytes: bytes.to_vec(),
                    extension,
                });
            }
            _ => {}
        }
    }

    Ok((payload, image))
}

/// Writes the uploaded image under the configured upload directory and
/// returns its relative path.
async fn store_image(state: &AppState, upload: ImageUpload) -> Result<String, ApiError> {
    let dir = state.config.upload_dir.clone();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::BadRequest(format!("cannot prepare upload directory: {e}")))?;
    let path = format!("{dir}/{}.{}", Uuid::new_v4(), upload.extension);
    tokio::fs::write(&path, &upload.bytes)
        .await
        .map_err(|e| ApiError::BadRequest(format!("cannot store image: {e}")))?;
    Ok(path)
}

pub fn storefront_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/{id}", get(get_product))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list_products))
        .route("/addProduct", post(add_product))
        .route("/{id}", patch(update_product).delete(delete_product))
}
