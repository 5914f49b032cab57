//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port. It keeps the same
//! integrity rules as the PostgreSQL schema (foreign keys, cascades, the
//! `(user, lesson)` uniqueness of view records) behind a single `RwLock`, so
//! every port call is one atomic unit of work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_access_core::domain::{
    AuthSession, Lesson, LessonChanges, NewLesson, NewProduct, Product, ProductChanges,
    ProductSummary, ProductTotals, ProgressWrite, User, UserCredentials, UserLessonView,
    ViewedRule,
};
use course_access_core::ports::{DatabaseService, PortError, PortResult};
use course_access_core::statistics::{fold_totals, ProductFacts, ViewFact};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

struct UserRow {
    user: User,
    hashed_password: String,
}

struct ProductRow {
    id: Uuid,
    title: String,
    owner_id: Uuid,
    users_with_access: Vec<Uuid>,
    lessons: Vec<Uuid>,
}

struct LessonRow {
    id: Uuid,
    title: String,
    video_link: String,
    duration: i64,
}

struct ViewRow {
    id: Uuid,
    user_id: Uuid,
    lesson_id: Uuid,
    viewed_duration: i64,
    is_viewed: bool,
    last_viewed_date: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRow>,
    sessions: HashMap<String, AuthSession>,
    products: HashMap<Uuid, ProductRow>,
    lessons: HashMap<Uuid, LessonRow>,
    views: HashMap<Uuid, ViewRow>,
}

fn missing(kind: &str, id: impl std::fmt::Display) -> PortError {
    PortError::NotFound(format!("{} {} not found", kind, id))
}

impl Tables {
    fn user(&self, user_id: Uuid) -> PortResult<User> {
        self.users
            .get(&user_id)
            .map(|row| row.user.clone())
            .ok_or_else(|| missing("User", user_id))
    }

    fn lesson(&self, lesson_id: Uuid) -> PortResult<Lesson> {
        let row = self
            .lessons
            .get(&lesson_id)
            .ok_or_else(|| missing("Lesson", lesson_id))?;

        let mut included_in_products: Vec<ProductSummary> = self
            .products
            .values()
            .filter(|p| p.lessons.contains(&lesson_id))
            .map(|p| ProductSummary {
                id: p.id,
                title: p.title.clone(),
            })
            .collect();
        included_in_products.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        Ok(Lesson {
            id: row.id,
            title: row.title.clone(),
            video_link: row.video_link.clone(),
            duration: row.duration,
            included_in_products,
        })
    }

    fn product(&self, row: &ProductRow) -> PortResult<Product> {
        let mut users_with_access = row
            .users_with_access
            .iter()
            .map(|id| self.user(*id))
            .collect::<PortResult<Vec<_>>>()?;
        users_with_access.sort_by(|a, b| a.username.cmp(&b.username));

        let mut lessons = row
            .lessons
            .iter()
            .map(|id| self.lesson(*id))
            .collect::<PortResult<Vec<_>>>()?;
        lessons.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        Ok(Product {
            id: row.id,
            title: row.title.clone(),
            owner: self.user(row.owner_id)?,
            users_with_access,
            lessons,
        })
    }

    fn product_by_id(&self, product_id: Uuid) -> PortResult<Product> {
        let row = self
            .products
            .get(&product_id)
            .ok_or_else(|| missing("Product", product_id))?;
        self.product(row)
    }

    fn view(&self, row: &ViewRow) -> PortResult<UserLessonView> {
        Ok(UserLessonView {
            id: row.id,
            user: self.user(row.user_id)?,
            lesson: self.lesson(row.lesson_id)?,
            viewed_duration: row.viewed_duration,
            is_viewed: row.is_viewed,
            last_viewed_date: row.last_viewed_date,
        })
    }

    fn view_by_id(&self, view_id: Uuid) -> PortResult<UserLessonView> {
        let row = self
            .views
            .get(&view_id)
            .ok_or_else(|| missing("Lesson view", view_id))?;
        self.view(row)
    }

    fn view_for_pair(&self, user_id: Uuid, lesson_id: Uuid) -> Option<&ViewRow> {
        self.views
            .values()
            .find(|v| v.user_id == user_id && v.lesson_id == lesson_id)
    }

    fn lesson_duration(&self, lesson_id: Uuid) -> PortResult<i64> {
        self.lessons
            .get(&lesson_id)
            .map(|row| row.duration)
            .ok_or_else(|| PortError::Validation(format!("unknown lesson {}", lesson_id)))
    }

    /// Inserts a judged row for a pair known to have none.
    fn insert_view_row(
        &mut self,
        user_id: Uuid,
        lesson_id: Uuid,
        progress: &ProgressWrite,
    ) -> PortResult<UserLessonView> {
        self.check_users(&[user_id])?;
        let (viewed_duration, is_viewed) = progress.resolve(0, self.lesson_duration(lesson_id)?);
        let row = ViewRow {
            id: Uuid::new_v4(),
            user_id,
            lesson_id,
            viewed_duration,
            is_viewed,
            last_viewed_date: progress.last_viewed_date,
        };
        let view_id = row.id;
        self.views.insert(view_id, row);
        self.view_by_id(view_id)
    }

    fn check_users(&self, user_ids: &[Uuid]) -> PortResult<()> {
        match user_ids.iter().find(|id| !self.users.contains_key(id)) {
            Some(id) => Err(PortError::Validation(format!("unknown user {}", id))),
            None => Ok(()),
        }
    }

    fn check_lessons(&self, lesson_ids: &[Uuid]) -> PortResult<()> {
        match lesson_ids.iter().find(|id| !self.lessons.contains_key(id)) {
            Some(id) => Err(PortError::Validation(format!("unknown lesson {}", id))),
            None => Ok(()),
        }
    }

    fn sorted_products<'a>(&self, rows: impl Iterator<Item = &'a ProductRow>) -> PortResult<Vec<Product>> {
        let mut products = rows.map(|r| self.product(r)).collect::<PortResult<Vec<_>>>()?;
        products.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(products)
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A store that lives entirely in memory and is lost on shutdown.
#[derive(Default)]
pub struct MemoryAdapter {
    tables: RwLock<Tables>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for MemoryAdapter {
    async fn create_user_with_credentials(
        &self,
        username: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|row| row.user.username == username) {
            return Err(PortError::Validation(format!(
                "username '{}' is already taken",
                username
            )));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            created_at: Utc::now(),
        };
        tables.users.insert(
            user.id,
            UserRow {
                user: user.clone(),
                hashed_password: hashed_password.to_string(),
            },
        );
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.tables.read().await.user(user_id)
    }

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials> {
        let tables = self.tables.read().await;
        tables
            .users
            .values()
            .find(|row| row.user.username == username)
            .map(|row| UserCredentials {
                user_id: row.user.id,
                username: row.user.username.clone(),
                hashed_password: row.hashed_password.clone(),
            })
            .ok_or_else(|| missing("User", username))
    }

    async fn count_users(&self) -> PortResult<i64> {
        Ok(self.tables.read().await.users.len() as i64)
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        tables.check_users(&[user_id])?;
        let now = Utc::now();
        tables.sessions.retain(|_, s| s.expires_at > now);
        tables.sessions.insert(
            session_id.to_string(),
            AuthSession {
                id: session_id.to_string(),
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let tables = self.tables.read().await;
        tables
            .sessions
            .get(session_id)
            .filter(|s| s.expires_at > Utc::now())
            .map(|s| s.user_id)
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.write().await.sessions.remove(session_id);
        Ok(())
    }

    async fn list_products(&self) -> PortResult<Vec<Product>> {
        let tables = self.tables.read().await;
        tables.sorted_products(tables.products.values())
    }

    async fn get_product(&self, product_id: Uuid) -> PortResult<Product> {
        self.tables.read().await.product_by_id(product_id)
    }

    async fn create_product(&self, owner_id: Uuid, product: &NewProduct) -> PortResult<Product> {
        let mut tables = self.tables.write().await;
        tables.check_users(&[owner_id])?;
        tables.check_users(&product.users_with_access)?;
        tables.check_lessons(&product.lessons)?;

        let row = ProductRow {
            id: Uuid::new_v4(),
            title: product.title.clone(),
            owner_id,
            users_with_access: product.users_with_access.clone(),
            lessons: product.lessons.clone(),
        };
        let product_id = row.id;
        tables.products.insert(product_id, row);
        tables.product_by_id(product_id)
    }

    async fn update_product(
        &self,
        product_id: Uuid,
        changes: &ProductChanges,
    ) -> PortResult<Product> {
        let mut tables = self.tables.write().await;
        if !tables.products.contains_key(&product_id) {
            return Err(missing("Product", product_id));
        }
        if let Some(user_ids) = &changes.users_with_access {
            tables.check_users(user_ids)?;
        }
        if let Some(lesson_ids) = &changes.lessons {
            tables.check_lessons(lesson_ids)?;
        }

        if let Some(row) = tables.products.get_mut(&product_id) {
            if let Some(title) = &changes.title {
                row.title = title.clone();
            }
            if let Some(user_ids) = &changes.users_with_access {
                row.users_with_access = user_ids.clone();
            }
            if let Some(lesson_ids) = &changes.lessons {
                row.lessons = lesson_ids.clone();
            }
        }
        tables.product_by_id(product_id)
    }

    async fn delete_product(&self, product_id: Uuid) -> PortResult<()> {
        self.tables
            .write()
            .await
            .products
            .remove(&product_id)
            .map(|_| ())
            .ok_or_else(|| missing("Product", product_id))
    }

    async fn products_accessible_to(&self, user_id: Uuid) -> PortResult<Vec<Product>> {
        let tables = self.tables.read().await;
        tables.sorted_products(
            tables
                .products
                .values()
                .filter(|p| p.users_with_access.contains(&user_id)),
        )
    }

    async fn list_lessons(&self) -> PortResult<Vec<Lesson>> {
        let tables = self.tables.read().await;
        let mut lessons = tables
            .lessons
            .keys()
            .map(|id| tables.lesson(*id))
            .collect::<PortResult<Vec<_>>>()?;
        lessons.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(lessons)
    }

    async fn get_lesson(&self, lesson_id: Uuid) -> PortResult<Lesson> {
        self.tables.read().await.lesson(lesson_id)
    }

    async fn create_lesson(&self, lesson: &NewLesson) -> PortResult<Lesson> {
        let mut tables = self.tables.write().await;
        let row = LessonRow {
            id: Uuid::new_v4(),
            title: lesson.title.clone(),
            video_link: lesson.video_link.clone(),
            duration: lesson.duration,
        };
        let lesson_id = row.id;
        tables.lessons.insert(lesson_id, row);
        tables.lesson(lesson_id)
    }

    async fn update_lesson(
        &self,
        lesson_id: Uuid,
        changes: &LessonChanges,
        rule: ViewedRule,
    ) -> PortResult<Lesson> {
        let mut tables = self.tables.write().await;
        let row = tables
            .lessons
            .get_mut(&lesson_id)
            .ok_or_else(|| missing("Lesson", lesson_id))?;
        if let Some(title) = &changes.title {
            row.title = title.clone();
        }
        if let Some(video_link) = &changes.video_link {
            row.video_link = video_link.clone();
        }
        if let Some(duration) = changes.duration {
            row.duration = duration;
            for view in tables.views.values_mut().filter(|v| v.lesson_id == lesson_id) {
                view.is_viewed = rule(view.viewed_duration, duration);
            }
        }
        tables.lesson(lesson_id)
    }

    async fn delete_lesson(&self, lesson_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .lessons
            .remove(&lesson_id)
            .ok_or_else(|| missing("Lesson", lesson_id))?;
        for product in tables.products.values_mut() {
            product.lessons.retain(|id| *id != lesson_id);
        }
        tables.views.retain(|_, v| v.lesson_id != lesson_id);
        Ok(())
    }

    async fn list_views(&self) -> PortResult<Vec<UserLessonView>> {
        let tables = self.tables.read().await;
        let mut views = tables
            .views
            .values()
            .map(|row| tables.view(row))
            .collect::<PortResult<Vec<_>>>()?;
        views.sort_by(|a, b| {
            b.last_viewed_date
                .cmp(&a.last_viewed_date)
                .then(a.id.cmp(&b.id))
        });
        Ok(views)
    }

    async fn get_view(&self, view_id: Uuid) -> PortResult<UserLessonView> {
        self.tables.read().await.view_by_id(view_id)
    }

    async fn insert_view(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        progress: &ProgressWrite,
    ) -> PortResult<UserLessonView> {
        let mut tables = self.tables.write().await;
        if tables.view_for_pair(user_id, lesson_id).is_some() {
            return Err(PortError::Validation(format!(
                "user {} already has a view record for lesson {}",
                user_id, lesson_id
            )));
        }
        tables.insert_view_row(user_id, lesson_id, progress)
    }

    async fn get_or_create_view(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        initial: &ProgressWrite,
    ) -> PortResult<UserLessonView> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.view_for_pair(user_id, lesson_id) {
            return tables.view(existing);
        }
        tables.insert_view_row(user_id, lesson_id, initial)
    }

    async fn update_view(
        &self,
        view_id: Uuid,
        progress: &ProgressWrite,
    ) -> PortResult<UserLessonView> {
        let mut tables = self.tables.write().await;
        let lesson_id = tables
            .views
            .get(&view_id)
            .map(|row| row.lesson_id)
            .ok_or_else(|| missing("Lesson view", view_id))?;
        let lesson_duration = tables.lesson_duration(lesson_id)?;
        if let Some(row) = tables.views.get_mut(&view_id) {
            let (viewed_duration, is_viewed) = progress.resolve(row.viewed_duration, lesson_duration);
            row.viewed_duration = viewed_duration;
            row.is_viewed = is_viewed;
            row.last_viewed_date = progress.last_viewed_date;
        }
        tables.view_by_id(view_id)
    }

    async fn delete_view(&self, view_id: Uuid) -> PortResult<()> {
        self.tables
            .write()
            .await
            .views
            .remove(&view_id)
            .map(|_| ())
            .ok_or_else(|| missing("Lesson view", view_id))
    }

    async fn product_totals(&self) -> PortResult<Vec<ProductTotals>> {
        let tables = self.tables.read().await;
        let products: Vec<ProductFacts> = tables
            .products
            .values()
            .map(|p| ProductFacts {
                product_id: p.id,
                title: p.title.clone(),
                lesson_ids: p.lessons.clone(),
                students_count: p.users_with_access.len() as i64,
            })
            .collect();
        let views: Vec<ViewFact> = tables
            .views
            .values()
            .map(|v| ViewFact {
                lesson_id: v.lesson_id,
                viewed_duration: v.viewed_duration,
                is_viewed: v.is_viewed,
            })
            .collect();
        Ok(fold_totals(&products, &views))
    }
}
