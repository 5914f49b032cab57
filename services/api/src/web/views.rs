//! services/api/src/web/views.rs
//!
//! CRUD over per-user lesson progress records. Any authenticated user may use
//! these endpoints; every write goes through the `ProgressRecorder`.

use crate::error::ApiResult;
use crate::web::extract::{ApiJson, ApiPath};
use crate::web::middleware::AuthUser;
use crate::web::protocol::{
    CreateLessonViewRequest, LessonViewUpdateRequest, UserLessonViewResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use course_access_core::domain::NewLessonView;
use course_access_core::ports::PortError;
use std::sync::Arc;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/user_lesson_views/",
    responses(
        (status = 200, description = "All progress records", body = [UserLessonViewResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_views_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<UserLessonViewResponse>>> {
    let views = state.db.list_views().await?;
    Ok(Json(views.into_iter().map(Into::into).collect()))
}

/// Create a progress record. `user_id` defaults to the caller.
#[utoipa::path(
    post,
    path = "/api/user_lesson_views/",
    request_body = CreateLessonViewRequest,
    responses(
        (status = 201, description = "Record created", body = UserLessonViewResponse),
        (status = 400, description = "Invalid payload or record already exists")
    )
)]
pub async fn create_view_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateLessonViewRequest>,
) -> ApiResult<impl IntoResponse> {
    let view = state
        .progress
        .record(&NewLessonView {
            user_id: req.user_id.unwrap_or(caller),
            lesson_id: req.lesson_id,
            viewed_duration: req.viewed_duration,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserLessonViewResponse::from(view))))
}

#[utoipa::path(
    get,
    path = "/api/user_lesson_views/{id}/",
    params(("id" = Uuid, Path, description = "Progress record id")),
    responses(
        (status = 200, description = "The record", body = UserLessonViewResponse),
        (status = 404, description = "Unknown record")
    )
)]
pub async fn get_view_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(view_id): ApiPath<Uuid>,
) -> ApiResult<Json<UserLessonViewResponse>> {
    let view = state.db.get_view(view_id).await?;
    Ok(Json(view.into()))
}

/// Full update; `viewed_duration` is required.
#[utoipa::path(
    put,
    path = "/api/user_lesson_views/{id}/",
    params(("id" = Uuid, Path, description = "Progress record id")),
    request_body = LessonViewUpdateRequest,
    responses(
        (status = 200, description = "Record updated", body = UserLessonViewResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Unknown record")
    )
)]
pub async fn replace_view_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(view_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<LessonViewUpdateRequest>,
) -> ApiResult<Json<UserLessonViewResponse>> {
    if req.viewed_duration.is_none() {
        return Err(PortError::Validation("viewed_duration is required".to_string()).into());
    }
    let view = state.progress.update(view_id, &req.into()).await?;
    Ok(Json(view.into()))
}

#[utoipa::path(
    patch,
    path = "/api/user_lesson_views/{id}/",
    params(("id" = Uuid, Path, description = "Progress record id")),
    request_body = LessonViewUpdateRequest,
    responses(
        (status = 200, description = "Record updated", body = UserLessonViewResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Unknown record")
    )
)]
pub async fn patch_view_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(view_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<LessonViewUpdateRequest>,
) -> ApiResult<Json<UserLessonViewResponse>> {
    let view = state.progress.update(view_id, &req.into()).await?;
    Ok(Json(view.into()))
}

#[utoipa::path(
    delete,
    path = "/api/user_lesson_views/{id}/",
    params(("id" = Uuid, Path, description = "Progress record id")),
    responses(
        (status = 204, description = "Record deleted"),
        (status = 404, description = "Unknown record")
    )
)]
pub async fn delete_view_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(view_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.db.delete_view(view_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
