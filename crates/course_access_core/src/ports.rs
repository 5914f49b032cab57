//! crates/course_access_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete store behind it.

use crate::domain::{
    Lesson, LessonChanges, NewLesson, NewProduct, Product, ProductChanges, ProductTotals,
    ProgressWrite, User, UserCredentials, UserLessonView, ViewedRule,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., the database).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The entity store.
///
/// Implementations must keep referential integrity: relation writes naming an
/// unknown user or lesson fail with `PortError::Validation`, and deletes cascade
/// as described on each method. Lookups by id fail with `PortError::NotFound`.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users & Auth ---
    async fn create_user_with_credentials(
        &self,
        username: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials>;

    async fn count_users(&self) -> PortResult<i64>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the session's user, or `PortError::Unauthorized` when the
    /// session is unknown or expired.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Products ---
    async fn list_products(&self) -> PortResult<Vec<Product>>;

    async fn get_product(&self, product_id: Uuid) -> PortResult<Product>;

    async fn create_product(&self, owner_id: Uuid, product: &NewProduct) -> PortResult<Product>;

    async fn update_product(
        &self,
        product_id: Uuid,
        changes: &ProductChanges,
    ) -> PortResult<Product>;

    /// Removes the product and its relation rows. Lessons are left in place.
    async fn delete_product(&self, product_id: Uuid) -> PortResult<()>;

    /// Products whose access set contains `user_id`.
    async fn products_accessible_to(&self, user_id: Uuid) -> PortResult<Vec<Product>>;

    // --- Lessons ---
    async fn list_lessons(&self) -> PortResult<Vec<Lesson>>;

    async fn get_lesson(&self, lesson_id: Uuid) -> PortResult<Lesson>;

    async fn create_lesson(&self, lesson: &NewLesson) -> PortResult<Lesson>;

    /// Applies `changes`. When they carry a duration, every view record on the
    /// lesson is re-judged with `rule` in the same unit of work; records whose
    /// flag flips keep their `last_viewed_date`.
    async fn update_lesson(
        &self,
        lesson_id: Uuid,
        changes: &LessonChanges,
        rule: ViewedRule,
    ) -> PortResult<Lesson>;

    /// Removes the lesson, its product memberships and every view row on it.
    async fn delete_lesson(&self, lesson_id: Uuid) -> PortResult<()>;

    // --- Lesson Views ---
    async fn list_views(&self) -> PortResult<Vec<UserLessonView>>;

    async fn get_view(&self, view_id: Uuid) -> PortResult<UserLessonView>;

    /// Inserts a new row, judged against the lesson's current duration. A
    /// second row for the same `(user, lesson)` pair is a `PortError::Validation`.
    async fn insert_view(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        progress: &ProgressWrite,
    ) -> PortResult<UserLessonView>;

    /// Returns the existing row for the pair, or atomically inserts one with
    /// `initial` when none exists.
    async fn get_or_create_view(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        initial: &ProgressWrite,
    ) -> PortResult<UserLessonView>;

    /// Rewrites a row, judged against the lesson's current duration.
    async fn update_view(
        &self,
        view_id: Uuid,
        progress: &ProgressWrite,
    ) -> PortResult<UserLessonView>;

    async fn delete_view(&self, view_id: Uuid) -> PortResult<()>;

    // --- Statistics ---
    /// One entry per product, computed in a single grouped pass over the store.
    async fn product_totals(&self) -> PortResult<Vec<ProductTotals>>;
}
