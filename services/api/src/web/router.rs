//! services/api/src/web/router.rs
//!
//! Assembles the full HTTP application: public routes, session-protected
//! routes, CORS, request tracing and the Swagger UI.

use crate::error::ApiError;
use crate::web::auth::{login_handler, logout_handler, me_handler, signup_handler};
use crate::web::middleware::require_auth;
use crate::web::rest::{health_handler, product_statistics_handler, ApiDoc};
use crate::web::state::AppState;
use crate::web::{lessons, products, views};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub fn build_router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = HeaderValue::from_str(&app_state.config.cors_origin)
        .map_err(|e| ApiError::Internal(format!("Invalid CORS origin: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route(
            "/products/",
            get(products::list_products_handler).post(products::create_product_handler),
        )
        .route(
            "/products/{id}/",
            get(products::get_product_handler)
                .put(products::replace_product_handler)
                .patch(products::patch_product_handler)
                .delete(products::delete_product_handler),
        )
        .route("/products/{id}/lessons/", get(products::product_lessons_handler))
        .route(
            "/accessible_products/",
            get(products::accessible_products_handler),
        )
        .route("/accessible_lessons/", get(products::accessible_lessons_handler))
        .route(
            "/lessons/",
            get(lessons::list_lessons_handler).post(lessons::create_lesson_handler),
        )
        .route(
            "/lessons/{id}/",
            get(lessons::get_lesson_handler)
                .put(lessons::replace_lesson_handler)
                .patch(lessons::patch_lesson_handler)
                .delete(lessons::delete_lesson_handler),
        )
        .route(
            "/user_lesson_views/",
            get(views::list_views_handler).post(views::create_view_handler),
        )
        .route(
            "/user_lesson_views/{id}/",
            get(views::get_view_handler)
                .put(views::replace_view_handler)
                .patch(views::patch_view_handler)
                .delete(views::delete_view_handler),
        )
        .route("/product-statistics/", get(product_statistics_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Ok(Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}
