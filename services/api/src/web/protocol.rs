//! services/api/src/web/protocol.rs
//!
//! Defines the JSON wire format of the REST API. Nested entities (owner,
//! users_with_access, lessons, user, lesson) are expanded inline.

use chrono::{DateTime, Utc};
use course_access_core::domain::{
    Lesson, LessonChanges, LessonProgress, LessonViewChanges, NewLesson, NewProduct, Product,
    ProductChanges, ProductLessons, ProductStatistics, ProductSummary, User, UserLessonView,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Responses
//=========================================================================================

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ProductSummaryResponse {
    pub id: Uuid,
    pub title: String,
}

impl From<ProductSummary> for ProductSummaryResponse {
    fn from(summary: ProductSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct LessonResponse {
    pub id: Uuid,
    pub title: String,
    pub video_link: String,
    /// Nominal length in seconds.
    pub duration: i64,
    pub included_in_products: Vec<ProductSummaryResponse>,
}

impl From<Lesson> for LessonResponse {
    fn from(lesson: Lesson) -> Self {
        Self {
            id: lesson.id,
            title: lesson.title,
            video_link: lesson.video_link,
            duration: lesson.duration,
            included_in_products: lesson
                .included_in_products
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub title: String,
    pub owner: UserResponse,
    pub users_with_access: Vec<UserResponse>,
    pub lessons: Vec<LessonResponse>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            title: product.title,
            owner: product.owner.into(),
            users_with_access: product.users_with_access.into_iter().map(Into::into).collect(),
            lessons: product.lessons.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct UserLessonViewResponse {
    pub id: Uuid,
    pub user: UserResponse,
    pub lesson: LessonResponse,
    pub viewed_duration: i64,
    pub is_viewed: bool,
    pub last_viewed_date: DateTime<Utc>,
}

impl From<UserLessonView> for UserLessonViewResponse {
    fn from(view: UserLessonView) -> Self {
        Self {
            id: view.id,
            user: view.user.into(),
            lesson: view.lesson.into(),
            viewed_duration: view.viewed_duration,
            is_viewed: view.is_viewed,
            last_viewed_date: view.last_viewed_date,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct LessonProgressResponse {
    pub lesson_id: Uuid,
    pub lesson_title: String,
    pub video_link: String,
    pub duration: i64,
    pub is_viewed: bool,
    pub viewed_duration: i64,
    pub last_viewed_date: DateTime<Utc>,
}

impl From<LessonProgress> for LessonProgressResponse {
    fn from(p: LessonProgress) -> Self {
        Self {
            lesson_id: p.lesson_id,
            lesson_title: p.lesson_title,
            video_link: p.video_link,
            duration: p.duration,
            is_viewed: p.is_viewed,
            viewed_duration: p.viewed_duration,
            last_viewed_date: p.last_viewed_date,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ProductLessonsResponse {
    pub product_title: String,
    pub lessons: Vec<LessonProgressResponse>,
}

impl From<ProductLessons> for ProductLessonsResponse {
    fn from(listing: ProductLessons) -> Self {
        Self {
            product_title: listing.product_title,
            lessons: listing.lessons.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ProductStatisticsResponse {
    pub product_id: Uuid,
    /// The product title.
    pub product: String,
    pub watched_lessons_count: i64,
    pub total_viewed_time: i64,
    pub students_count: i64,
    pub acquisition_percentage: f64,
}

impl From<ProductStatistics> for ProductStatisticsResponse {
    fn from(s: ProductStatistics) -> Self {
        Self {
            product_id: s.product_id,
            product: s.product,
            watched_lessons_count: s.watched_lessons_count,
            total_viewed_time: s.total_viewed_time,
            students_count: s.students_count,
            acquisition_percentage: s.acquisition_percentage,
        }
    }
}

//=========================================================================================
// Requests
//=========================================================================================

/// Body of `POST /products/` and `PUT /products/{id}/`. Omitted lists are empty.
#[derive(Deserialize, Serialize, Debug, ToSchema)]
pub struct ProductRequest {
    pub title: String,
    #[serde(default)]
    pub users_with_access: Vec<Uuid>,
    #[serde(default)]
    pub lessons: Vec<Uuid>,
}

impl ProductRequest {
    pub fn into_new(self) -> NewProduct {
        NewProduct {
            title: self.title,
            users_with_access: self.users_with_access,
            lessons: self.lessons,
        }
    }

    pub fn into_replacement(self) -> ProductChanges {
        ProductChanges {
            title: Some(self.title),
            users_with_access: Some(self.users_with_access),
            lessons: Some(self.lessons),
        }
    }
}

/// Body of `PATCH /products/{id}/`. Only present fields change.
#[derive(Deserialize, Serialize, Debug, Default, ToSchema)]
pub struct ProductPatchRequest {
    pub title: Option<String>,
    pub users_with_access: Option<Vec<Uuid>>,
    pub lessons: Option<Vec<Uuid>>,
}

impl From<ProductPatchRequest> for ProductChanges {
    fn from(req: ProductPatchRequest) -> Self {
        Self {
            title: req.title,
            users_with_access: req.users_with_access,
            lessons: req.lessons,
        }
    }
}

/// Body of `POST /lessons/` and `PUT /lessons/{id}/`.
#[derive(Deserialize, Serialize, Debug, ToSchema)]
pub struct LessonRequest {
    pub title: String,
    pub video_link: String,
    pub duration: i64,
}

impl LessonRequest {
    pub fn into_new(self) -> NewLesson {
        NewLesson {
            title: self.title,
            video_link: self.video_link,
            duration: self.duration,
        }
    }

    pub fn into_replacement(self) -> LessonChanges {
        LessonChanges {
            title: Some(self.title),
            video_link: Some(self.video_link),
            duration: Some(self.duration),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Default, ToSchema)]
pub struct LessonPatchRequest {
    pub title: Option<String>,
    pub video_link: Option<String>,
    pub duration: Option<i64>,
}

impl From<LessonPatchRequest> for LessonChanges {
    fn from(req: LessonPatchRequest) -> Self {
        Self {
            title: req.title,
            video_link: req.video_link,
            duration: req.duration,
        }
    }
}

/// Body of `POST /user_lesson_views/`.
///
/// `user_id` defaults to the caller. `is_viewed` is accepted but ignored: the
/// server always derives it from `viewed_duration`.
#[derive(Deserialize, Serialize, Debug, ToSchema)]
pub struct CreateLessonViewRequest {
    pub user_id: Option<Uuid>,
    pub lesson_id: Uuid,
    #[serde(default)]
    pub viewed_duration: i64,
    #[serde(default)]
    pub is_viewed: Option<bool>,
}

/// Body of `PUT` and `PATCH /user_lesson_views/{id}/`. `is_viewed` is ignored.
#[derive(Deserialize, Serialize, Debug, Default, ToSchema)]
pub struct LessonViewUpdateRequest {
    pub viewed_duration: Option<i64>,
    #[serde(default)]
    pub is_viewed: Option<bool>,
}

impl From<LessonViewUpdateRequest> for LessonViewChanges {
    fn from(req: LessonViewUpdateRequest) -> Self {
        Self {
            viewed_duration: req.viewed_duration,
        }
    }
}
