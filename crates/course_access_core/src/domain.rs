//! crates/course_access_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

// Represents a registered identity - referenced by every other entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub username: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// The `{ id, title }` pair a lesson reports for each product it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSummary {
    pub id: Uuid,
    pub title: String,
}

/// A unit of content with a fixed nominal duration, in seconds.
///
/// Lessons are owned by no product; the same lesson can be attached to any
/// number of products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub id: Uuid,
    pub title: String,
    pub video_link: String,
    pub duration: i64,
    pub included_in_products: Vec<ProductSummary>,
}

/// A course: an owned collection of lessons with an access-control list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub owner: User,
    pub users_with_access: Vec<User>,
    pub lessons: Vec<Lesson>,
}

impl Product {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner.id == user_id
    }

    /// The owner is not implicitly a member of the access set.
    pub fn grants_access_to(&self, user_id: Uuid) -> bool {
        self.users_with_access.iter().any(|u| u.id == user_id)
    }
}

/// A per-user, per-lesson progress record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLessonView {
    pub id: Uuid,
    pub user: User,
    pub lesson: Lesson,
    pub viewed_duration: i64,
    pub is_viewed: bool,
    pub last_viewed_date: DateTime<Utc>,
}

/// Decides `is_viewed` from `(viewed_duration, lesson_duration)`.
pub type ViewedRule = fn(i64, i64) -> bool;

/// A write to a view record.
///
/// The store applies `rule` against the lesson duration it holds at write
/// time, inside the same unit of work, so a concurrent duration change can
/// never leave the stored flag stale. Only `ProgressRecorder` builds these.
#[derive(Debug, Clone, Copy)]
pub struct ProgressWrite {
    /// `None` keeps the stored value; a new record starts at zero.
    pub viewed_duration: Option<i64>,
    pub last_viewed_date: DateTime<Utc>,
    pub rule: ViewedRule,
}

impl ProgressWrite {
    /// The `(viewed_duration, is_viewed)` pair to store, given the currently
    /// stored viewed duration and the lesson duration.
    pub fn resolve(&self, stored_viewed: i64, lesson_duration: i64) -> (i64, bool) {
        let viewed = self.viewed_duration.unwrap_or(stored_viewed);
        (viewed, (self.rule)(viewed, lesson_duration))
    }
}

/// One row of the per-product lesson listing for the calling user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonProgress {
    pub lesson_id: Uuid,
    pub lesson_title: String,
    pub video_link: String,
    pub duration: i64,
    pub is_viewed: bool,
    pub viewed_duration: i64,
    pub last_viewed_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductLessons {
    pub product_title: String,
    pub lessons: Vec<LessonProgress>,
}

/// Raw per-product sums produced by the store in a single grouped pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductTotals {
    pub product_id: Uuid,
    pub title: String,
    pub watched_lessons_count: i64,
    pub total_viewed_time: i64,
    pub students_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductStatistics {
    pub product_id: Uuid,
    pub product: String,
    pub watched_lessons_count: i64,
    pub total_viewed_time: i64,
    pub students_count: i64,
    pub acquisition_percentage: f64,
}

//=========================================================================================
// Write Payloads
//=========================================================================================

#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub title: String,
    pub users_with_access: Vec<Uuid>,
    pub lessons: Vec<Uuid>,
}

/// Partial product update. `None` leaves the field untouched; a `Some` list
/// replaces the whole relation.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub title: Option<String>,
    pub users_with_access: Option<Vec<Uuid>>,
    pub lessons: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone)]
pub struct NewLesson {
    pub title: String,
    pub video_link: String,
    pub duration: i64,
}

#[derive(Debug, Clone, Default)]
pub struct LessonChanges {
    pub title: Option<String>,
    pub video_link: Option<String>,
    pub duration: Option<i64>,
}

impl LessonChanges {
    pub fn touches_duration(&self) -> bool {
        self.duration.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewLessonView {
    pub user_id: Uuid,
    pub lesson_id: Uuid,
    pub viewed_duration: i64,
}

#[derive(Debug, Clone, Default)]
pub struct LessonViewChanges {
    pub viewed_duration: Option<i64>,
}
