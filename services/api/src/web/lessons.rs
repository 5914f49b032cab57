//! services/api/src/web/lessons.rs
//!
//! Lesson CRUD. Any authenticated user may read or write any lesson.

use crate::error::ApiResult;
use crate::web::extract::{ApiJson, ApiPath};
use crate::web::protocol::{LessonPatchRequest, LessonRequest, LessonResponse};
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use course_access_core::validation;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/lessons/",
    responses(
        (status = 200, description = "All lessons", body = [LessonResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_lessons_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<LessonResponse>>> {
    let lessons = state.db.list_lessons().await?;
    Ok(Json(lessons.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/api/lessons/",
    request_body = LessonRequest,
    responses(
        (status = 201, description = "Lesson created", body = LessonResponse),
        (status = 400, description = "Invalid title, link or duration")
    )
)]
pub async fn create_lesson_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LessonRequest>,
) -> ApiResult<impl IntoResponse> {
    let lesson = validation::validate_new_lesson(&req.into_new())?;
    let lesson = state.db.create_lesson(&lesson).await?;
    info!(lesson_id = %lesson.id, "Created lesson");
    Ok((StatusCode::CREATED, Json(LessonResponse::from(lesson))))
}

#[utoipa::path(
    get,
    path = "/api/lessons/{id}/",
    params(("id" = Uuid, Path, description = "Lesson id")),
    responses(
        (status = 200, description = "The lesson", body = LessonResponse),
        (status = 404, description = "Unknown lesson")
    )
)]
pub async fn get_lesson_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(lesson_id): ApiPath<Uuid>,
) -> ApiResult<Json<LessonResponse>> {
    let lesson = state.db.get_lesson(lesson_id).await?;
    Ok(Json(lesson.into()))
}

#[utoipa::path(
    put,
    path = "/api/lessons/{id}/",
    params(("id" = Uuid, Path, description = "Lesson id")),
    request_body = LessonRequest,
    responses(
        (status = 200, description = "Lesson replaced", body = LessonResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Unknown lesson")
    )
)]
pub async fn replace_lesson_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(lesson_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<LessonRequest>,
) -> ApiResult<Json<LessonResponse>> {
    let lesson = state
        .progress
        .update_lesson(lesson_id, &req.into_replacement())
        .await?;
    Ok(Json(lesson.into()))
}

/// Partial update. A new duration re-evaluates every progress record on the lesson.
#[utoipa::path(
    patch,
    path = "/api/lessons/{id}/",
    params(("id" = Uuid, Path, description = "Lesson id")),
    request_body = LessonPatchRequest,
    responses(
        (status = 200, description = "Lesson updated", body = LessonResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Unknown lesson")
    )
)]
pub async fn patch_lesson_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(lesson_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<LessonPatchRequest>,
) -> ApiResult<Json<LessonResponse>> {
    let lesson = state.progress.update_lesson(lesson_id, &req.into()).await?;
    Ok(Json(lesson.into()))
}

/// Deletes the lesson together with every progress record on it. Products
/// that included it keep existing without it.
#[utoipa::path(
    delete,
    path = "/api/lessons/{id}/",
    params(("id" = Uuid, Path, description = "Lesson id")),
    responses(
        (status = 204, description = "Lesson deleted"),
        (status = 404, description = "Unknown lesson")
    )
)]
pub async fn delete_lesson_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(lesson_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.db.delete_lesson(lesson_id).await?;
    info!(%lesson_id, "Deleted lesson");
    Ok(StatusCode::NO_CONTENT)
}
