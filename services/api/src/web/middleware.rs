//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use course_access_core::ports::PortError;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

/// The authenticated caller, inserted into request extensions by `require_auth`.
#[derive(Clone, Copy, Debug)]
pub struct AuthUser(pub Uuid);

/// Pulls the `session=<id>` value out of the Cookie header.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

/// Middleware that validates the auth session cookie and extracts the user id.
///
/// If valid, inserts an `AuthUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Parse session ID from the cookie header
    let auth_session_id = session_cookie(req.headers())
        .ok_or(PortError::Unauthorized)?
        .to_string();

    // 2. Validate auth session in the store, get user id
    let user_id = state
        .db
        .validate_auth_session(&auth_session_id)
        .await
        .map_err(|e| {
            debug!("Rejected auth session: {:?}", e);
            match e {
                PortError::Unexpected(_) => ApiError::Port(e),
                _ => ApiError::Port(PortError::Unauthorized),
            }
        })?;

    // 3. Insert the caller into request extensions and continue
    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
