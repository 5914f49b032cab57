//! services/api/src/web/products.rs
//!
//! Product CRUD plus the access-gated listings. Reads are open to any
//! authenticated user; writes are reserved to the product owner.

use crate::error::ApiResult;
use crate::web::extract::{ApiJson, ApiPath};
use crate::web::middleware::AuthUser;
use crate::web::protocol::{
    LessonResponse, ProductLessonsResponse, ProductPatchRequest, ProductRequest,
    ProductResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/products/",
    responses(
        (status = 200, description = "All products", body = [ProductResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_products_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ProductResponse>>> {
    let products = state.db.list_products().await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// Create a product owned by the caller.
#[utoipa::path(
    post,
    path = "/api/products/",
    request_body = ProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid title or unknown user/lesson id"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_product_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    ApiJson(req): ApiJson<ProductRequest>,
) -> ApiResult<impl IntoResponse> {
    let product = state.access.create_product(user_id, &req.into_new()).await?;
    info!(product_id = %product.id, owner = %user_id, "Created product");
    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}/",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "The product", body = ProductResponse),
        (status = 404, description = "Unknown product")
    )
)]
pub async fn get_product_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(product_id): ApiPath<Uuid>,
) -> ApiResult<Json<ProductResponse>> {
    let product = state.db.get_product(product_id).await?;
    Ok(Json(product.into()))
}

/// Replace title, access set and lesson set. Owner only.
#[utoipa::path(
    put,
    path = "/api/products/{id}/",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = ProductRequest,
    responses(
        (status = 200, description = "Product replaced", body = ProductResponse),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Caller does not own the product"),
        (status = 404, description = "Unknown product")
    )
)]
pub async fn replace_product_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    ApiPath(product_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ProductRequest>,
) -> ApiResult<Json<ProductResponse>> {
    let product = state
        .access
        .update_product(user_id, product_id, &req.into_replacement())
        .await?;
    Ok(Json(product.into()))
}

/// Change only the fields present in the body. Owner only.
#[utoipa::path(
    patch,
    path = "/api/products/{id}/",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = ProductPatchRequest,
    responses(
        (status = 200, description = "Product updated", body = ProductResponse),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Caller does not own the product"),
        (status = 404, description = "Unknown product")
    )
)]
pub async fn patch_product_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    ApiPath(product_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ProductPatchRequest>,
) -> ApiResult<Json<ProductResponse>> {
    let product = state
        .access
        .update_product(user_id, product_id, &req.into())
        .await?;
    Ok(Json(product.into()))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}/",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 403, description = "Caller does not own the product"),
        (status = 404, description = "Unknown product")
    )
)]
pub async fn delete_product_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    ApiPath(product_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.access.delete_product(user_id, product_id).await?;
    info!(%product_id, "Deleted product");
    Ok(StatusCode::NO_CONTENT)
}

/// Products the caller has been granted access to.
#[utoipa::path(
    get,
    path = "/api/accessible_products/",
    responses(
        (status = 200, description = "Accessible products", body = [ProductResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn accessible_products_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<ProductResponse>>> {
    let products = state.access.accessible_products(user_id).await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// Every lesson reachable through the caller's products, each listed once.
#[utoipa::path(
    get,
    path = "/api/accessible_lessons/",
    responses(
        (status = 200, description = "Accessible lessons", body = [LessonResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn accessible_lessons_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<LessonResponse>>> {
    let lessons = state.access.accessible_lessons(user_id).await?;
    Ok(Json(lessons.into_iter().map(Into::into).collect()))
}

/// The caller's progress on every lesson of a product.
///
/// Responds 404 both for unknown products and for products the caller has
/// no access to.
#[utoipa::path(
    get,
    path = "/api/products/{id}/lessons/",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Lessons with progress", body = ProductLessonsResponse),
        (status = 404, description = "Unknown product or no access")
    )
)]
pub async fn product_lessons_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    ApiPath(product_id): ApiPath<Uuid>,
) -> ApiResult<Json<ProductLessonsResponse>> {
    let listing = state.access.product_lessons(user_id, product_id).await?;
    Ok(Json(listing.into()))
}
