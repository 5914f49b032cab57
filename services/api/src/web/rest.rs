//! services/api/src/web/rest.rs
//!
//! The statistics and health endpoints, and the master definition for the
//! OpenAPI specification.

use crate::error::{ApiResult, ErrorResponse};
use crate::web::auth::{self, AuthResponse, LoginRequest, SignupRequest};
use crate::web::protocol::{
    CreateLessonViewRequest, LessonPatchRequest, LessonProgressResponse, LessonRequest,
    LessonResponse, LessonViewUpdateRequest, ProductLessonsResponse, ProductPatchRequest,
    ProductRequest, ProductResponse, ProductStatisticsResponse, ProductSummaryResponse,
    UserLessonViewResponse, UserResponse,
};
use crate::web::state::AppState;
use crate::web::{lessons, products, views};
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        products::list_products_handler,
        products::create_product_handler,
        products::get_product_handler,
        products::replace_product_handler,
        products::patch_product_handler,
        products::delete_product_handler,
        products::accessible_products_handler,
        products::accessible_lessons_handler,
        products::product_lessons_handler,
        lessons::list_lessons_handler,
        lessons::create_lesson_handler,
        lessons::get_lesson_handler,
        lessons::replace_lesson_handler,
        lessons::patch_lesson_handler,
        lessons::delete_lesson_handler,
        views::list_views_handler,
        views::create_view_handler,
        views::get_view_handler,
        views::replace_view_handler,
        views::patch_view_handler,
        views::delete_view_handler,
        product_statistics_handler,
    ),
    components(
        schemas(
            HealthResponse, ErrorResponse, SignupRequest, LoginRequest, AuthResponse,
            UserResponse, ProductSummaryResponse, LessonResponse, ProductResponse,
            UserLessonViewResponse, LessonProgressResponse, ProductLessonsResponse,
            ProductStatisticsResponse, ProductRequest, ProductPatchRequest, LessonRequest,
            LessonPatchRequest, CreateLessonViewRequest, LessonViewUpdateRequest
        )
    ),
    tags(
        (name = "Course Access API", description = "Products, lessons, viewing progress and statistics.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Handlers
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Server is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Completion and acquisition metrics for every product.
///
/// The order of the records is not meaningful.
#[utoipa::path(
    get,
    path = "/api/product-statistics/",
    responses(
        (status = 200, description = "One record per product", body = [ProductStatisticsResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn product_statistics_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ProductStatisticsResponse>>> {
    let stats = state.statistics.compute().await?;
    Ok(Json(stats.into_iter().map(Into::into).collect()))
}
