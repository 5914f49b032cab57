//! services/api/src/web/extract.rs
//!
//! Request extractors whose rejections render through `ApiError`, so malformed
//! bodies and ids get the same JSON error body as every other failure.

use crate::error::ApiError;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request,
    },
    http::request::Parts,
    Json,
};
use course_access_core::ports::PortError;
use serde::de::DeserializeOwned;

/// A JSON body. Any rejection is a validation failure (400).
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| {
                ApiError::Port(PortError::Validation(rejection.body_text()))
            })?;
        Ok(Self(value))
    }
}

/// Path parameters. An id that does not parse names no resource, so it is a
/// 404 like any other unknown id.
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: PathRejection| {
                ApiError::Port(PortError::NotFound(rejection.body_text()))
            })?;
        Ok(Self(value))
    }
}
