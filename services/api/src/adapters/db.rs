//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_access_core::domain::{
    Lesson, LessonChanges, NewLesson, NewProduct, Product, ProductChanges, ProductSummary,
    ProductTotals, ProgressWrite, User, UserCredentials, UserLessonView, ViewedRule,
};
use course_access_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Translates constraint violations into validation failures; everything else
/// is unexpected.
fn map_db_error(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return PortError::Validation(format!("duplicate value: {}", db_err.message()));
        }
        if db_err.is_foreign_key_violation() {
            return PortError::Validation("referenced user or lesson does not exist".to_string());
        }
        if db_err.is_check_violation() {
            return PortError::Validation(format!("constraint violated: {}", db_err.message()));
        }
    }
    PortError::Unexpected(e.to_string())
}

fn not_found(kind: &str, id: impl std::fmt::Display) -> impl FnOnce(sqlx::Error) -> PortError {
    let message = format!("{} {} not found", kind, id);
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(message),
        other => map_db_error(other),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    username: String,
    hashed_password: String,
}

#[derive(FromRow)]
struct ProductRecord {
    id: Uuid,
    title: String,
    owner_id: Uuid,
}

#[derive(FromRow)]
struct LessonRecord {
    id: Uuid,
    title: String,
    video_link: String,
    duration: i64,
}
impl LessonRecord {
    fn to_domain(self) -> Lesson {
        Lesson {
            id: self.id,
            title: self.title,
            video_link: self.video_link,
            duration: self.duration,
            included_in_products: Vec::new(),
        }
    }
}

#[derive(FromRow)]
struct MemberRecord {
    product_id: Uuid,
    id: Uuid,
    username: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ProductLessonRecord {
    product_id: Uuid,
    id: Uuid,
    title: String,
    video_link: String,
    duration: i64,
}

#[derive(FromRow)]
struct SummaryRecord {
    lesson_id: Uuid,
    id: Uuid,
    title: String,
}

#[derive(FromRow)]
struct ViewRecord {
    id: Uuid,
    viewed_duration: i64,
    is_viewed: bool,
    last_viewed_date: DateTime<Utc>,
    user_id: Uuid,
    username: String,
    user_created_at: DateTime<Utc>,
    lesson_id: Uuid,
    lesson_title: String,
    video_link: String,
    duration: i64,
}
impl ViewRecord {
    fn to_domain(self) -> UserLessonView {
        UserLessonView {
            id: self.id,
            user: User {
                id: self.user_id,
                username: self.username,
                created_at: self.user_created_at,
            },
            lesson: Lesson {
                id: self.lesson_id,
                title: self.lesson_title,
                video_link: self.video_link,
                duration: self.duration,
                included_in_products: Vec::new(),
            },
            viewed_duration: self.viewed_duration,
            is_viewed: self.is_viewed,
            last_viewed_date: self.last_viewed_date,
        }
    }
}

#[derive(FromRow)]
struct TotalsRecord {
    product_id: Uuid,
    title: String,
    watched_lessons_count: i64,
    total_viewed_time: i64,
    students_count: i64,
}

const VIEW_SELECT: &str = "SELECT v.id, v.viewed_duration, v.is_viewed, v.last_viewed_date, \
     u.id AS user_id, u.username, u.created_at AS user_created_at, \
     l.id AS lesson_id, l.title AS lesson_title, l.video_link, l.duration \
     FROM user_lesson_views v \
     JOIN users u ON u.id = v.user_id \
     JOIN lessons l ON l.id = v.lesson_id";

//=========================================================================================
// Hydration Helpers
//=========================================================================================

impl DbAdapter {
    /// Fills `included_in_products` for every lesson in one query.
    async fn attach_product_summaries(&self, lessons: &mut [Lesson]) -> PortResult<()> {
        if lessons.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = lessons.iter().map(|l| l.id).collect();
        let rows = sqlx::query_as::<_, SummaryRecord>(
            "SELECT pl.lesson_id, p.id, p.title FROM product_lessons pl \
             JOIN products p ON p.id = pl.product_id \
             WHERE pl.lesson_id = ANY($1) ORDER BY p.title, p.id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        let mut by_lesson: HashMap<Uuid, Vec<ProductSummary>> = HashMap::new();
        for row in rows {
            by_lesson.entry(row.lesson_id).or_default().push(ProductSummary {
                id: row.id,
                title: row.title,
            });
        }
        for lesson in lessons.iter_mut() {
            lesson.included_in_products = by_lesson.remove(&lesson.id).unwrap_or_default();
        }
        Ok(())
    }

    /// Expands bare product rows into full `Product`s with a fixed number of
    /// queries, regardless of how many products are loaded.
    async fn hydrate_products(&self, records: Vec<ProductRecord>) -> PortResult<Vec<Product>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let product_ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let owner_ids: Vec<Uuid> = records.iter().map(|r| r.owner_id).collect();

        let owners: HashMap<Uuid, User> = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, created_at FROM users WHERE id = ANY($1)",
        )
        .bind(&owner_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?
        .into_iter()
        .map(|r| (r.id, r.to_domain()))
        .collect();

        let members = sqlx::query_as::<_, MemberRecord>(
            "SELECT pa.product_id, u.id, u.username, u.created_at FROM product_access pa \
             JOIN users u ON u.id = pa.user_id \
             WHERE pa.product_id = ANY($1) ORDER BY u.username",
        )
        .bind(&product_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        let lesson_rows = sqlx::query_as::<_, ProductLessonRecord>(
            "SELECT pl.product_id, l.id, l.title, l.video_link, l.duration FROM product_lessons pl \
             JOIN lessons l ON l.id = pl.lesson_id \
             WHERE pl.product_id = ANY($1) ORDER BY l.title, l.id",
        )
        .bind(&product_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        let mut seen = HashSet::new();
        let mut distinct: Vec<Lesson> = lesson_rows
            .iter()
            .filter(|row| seen.insert(row.id))
            .map(|row| Lesson {
                id: row.id,
                title: row.title.clone(),
                video_link: row.video_link.clone(),
                duration: row.duration,
                included_in_products: Vec::new(),
            })
            .collect();
        self.attach_product_summaries(&mut distinct).await?;
        let lessons_by_id: HashMap<Uuid, Lesson> =
            distinct.into_iter().map(|l| (l.id, l)).collect();

        let mut access: HashMap<Uuid, Vec<User>> = HashMap::new();
        for m in members {
            access.entry(m.product_id).or_default().push(User {
                id: m.id,
                username: m.username,
                created_at: m.created_at,
            });
        }
        let mut lessons: HashMap<Uuid, Vec<Lesson>> = HashMap::new();
        for row in lesson_rows {
            if let Some(lesson) = lessons_by_id.get(&row.id) {
                lessons.entry(row.product_id).or_default().push(lesson.clone());
            }
        }

        records
            .into_iter()
            .map(|r| {
                let owner = owners.get(&r.owner_id).cloned().ok_or_else(|| {
                    PortError::Unexpected(format!("owner {} of product {} missing", r.owner_id, r.id))
                })?;
                Ok(Product {
                    id: r.id,
                    title: r.title,
                    owner,
                    users_with_access: access.remove(&r.id).unwrap_or_default(),
                    lessons: lessons.remove(&r.id).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn hydrate_views(&self, records: Vec<ViewRecord>) -> PortResult<Vec<UserLessonView>> {
        let mut views: Vec<UserLessonView> = records.into_iter().map(|r| r.to_domain()).collect();
        let mut seen = HashSet::new();
        let mut lessons: Vec<Lesson> = views
            .iter()
            .filter(|v| seen.insert(v.lesson.id))
            .map(|v| v.lesson.clone())
            .collect();
        self.attach_product_summaries(&mut lessons).await?;
        let by_id: HashMap<Uuid, Lesson> = lessons.into_iter().map(|l| (l.id, l)).collect();
        for view in views.iter_mut() {
            if let Some(lesson) = by_id.get(&view.lesson.id) {
                view.lesson = lesson.clone();
            }
        }
        Ok(views)
    }

    async fn replace_access(
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
        user_ids: &[Uuid],
    ) -> PortResult<()> {
        sqlx::query("DELETE FROM product_access WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut **tx)
            .await
            .map_err(map_db_error)?;
        sqlx::query(
            "INSERT INTO product_access (product_id, user_id) SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(product_id)
        .bind(user_ids)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn replace_lessons(
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
        lesson_ids: &[Uuid],
    ) -> PortResult<()> {
        sqlx::query("DELETE FROM product_lessons WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut **tx)
            .await
            .map_err(map_db_error)?;
        sqlx::query(
            "INSERT INTO product_lessons (product_id, lesson_id) SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(product_id)
        .bind(lesson_ids)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }
}

impl DbAdapter {
    /// Reads a lesson's duration under a share lock, so a concurrent duration
    /// change waits for this transaction (and vice versa). Lessons are always
    /// locked before their view rows.
    async fn lock_lesson_duration(
        tx: &mut Transaction<'_, Postgres>,
        lesson_id: Uuid,
    ) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT duration FROM lessons WHERE id = $1 FOR SHARE")
            .bind(lesson_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| PortError::Validation(format!("unknown lesson {}", lesson_id)))
    }

    async fn insert_judged_view(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        lesson_id: Uuid,
        progress: &ProgressWrite,
        on_conflict: &str,
    ) -> PortResult<()> {
        let lesson_duration = Self::lock_lesson_duration(tx, lesson_id).await?;
        let (viewed_duration, is_viewed) = progress.resolve(0, lesson_duration);
        sqlx::query(&format!(
            "INSERT INTO user_lesson_views \
             (id, user_id, lesson_id, viewed_duration, is_viewed, last_viewed_date) \
             VALUES ($1, $2, $3, $4, $5, $6) {}",
            on_conflict
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(lesson_id)
        .bind(viewed_duration)
        .bind(is_viewed)
        .bind(progress.last_viewed_date)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn view_for_pair(&self, user_id: Uuid, lesson_id: Uuid) -> PortResult<UserLessonView> {
        let record = sqlx::query_as::<_, ViewRecord>(&format!(
            "{} WHERE v.user_id = $1 AND v.lesson_id = $2",
            VIEW_SELECT
        ))
        .bind(user_id)
        .bind(lesson_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Lesson view for lesson", lesson_id))?;
        self.hydrate_views(vec![record])
            .await?
            .pop()
            .ok_or_else(|| PortError::Unexpected("view record vanished after write".to_string()))
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_credentials(
        &self,
        username: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, username, hashed_password) VALUES ($1, $2, $3) \
             RETURNING id, username, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_db_error(e) {
            PortError::Validation(_) => {
                PortError::Validation(format!("username '{}' is already taken", username))
            }
            other => other,
        })?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("User", user_id))?;
        Ok(record.to_domain())
    }

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, username, hashed_password FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("User", username))?;
        Ok(UserCredentials {
            user_id: record.id,
            username: record.username,
            hashed_password: record.hashed_password,
        })
    }

    async fn count_users(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn list_products(&self) -> PortResult<Vec<Product>> {
        let records = sqlx::query_as::<_, ProductRecord>(
            "SELECT id, title, owner_id FROM products ORDER BY title, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        self.hydrate_products(records).await
    }

    async fn get_product(&self, product_id: Uuid) -> PortResult<Product> {
        let record = sqlx::query_as::<_, ProductRecord>(
            "SELECT id, title, owner_id FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Product", product_id))?;
        self.hydrate_products(vec![record])
            .await?
            .pop()
            .ok_or_else(|| PortError::NotFound(format!("Product {} not found", product_id)))
    }

    async fn create_product(&self, owner_id: Uuid, product: &NewProduct) -> PortResult<Product> {
        let product_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        sqlx::query("INSERT INTO products (id, title, owner_id) VALUES ($1, $2, $3)")
            .bind(product_id)
            .bind(&product.title)
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        Self::replace_access(&mut tx, product_id, &product.users_with_access).await?;
        Self::replace_lessons(&mut tx, product_id, &product.lessons).await?;
        tx.commit().await.map_err(map_db_error)?;

        self.get_product(product_id).await
    }

    async fn update_product(
        &self,
        product_id: Uuid,
        changes: &ProductChanges,
    ) -> PortResult<Product> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let updated = sqlx::query("UPDATE products SET title = COALESCE($2, title) WHERE id = $1")
            .bind(product_id)
            .bind(changes.title.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        if updated.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Product {} not found", product_id)));
        }
        if let Some(user_ids) = &changes.users_with_access {
            Self::replace_access(&mut tx, product_id, user_ids).await?;
        }
        if let Some(lesson_ids) = &changes.lessons {
            Self::replace_lessons(&mut tx, product_id, lesson_ids).await?;
        }
        tx.commit().await.map_err(map_db_error)?;

        self.get_product(product_id).await
    }

    async fn delete_product(&self, product_id: Uuid) -> PortResult<()> {
        let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Product {} not found", product_id)));
        }
        Ok(())
    }

    async fn products_accessible_to(&self, user_id: Uuid) -> PortResult<Vec<Product>> {
        let records = sqlx::query_as::<_, ProductRecord>(
            "SELECT p.id, p.title, p.owner_id FROM products p \
             JOIN product_access pa ON pa.product_id = p.id \
             WHERE pa.user_id = $1 ORDER BY p.title, p.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        self.hydrate_products(records).await
    }

    async fn list_lessons(&self) -> PortResult<Vec<Lesson>> {
        let mut lessons: Vec<Lesson> = sqlx::query_as::<_, LessonRecord>(
            "SELECT id, title, video_link, duration FROM lessons ORDER BY title, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?
        .into_iter()
        .map(LessonRecord::to_domain)
        .collect();
        self.attach_product_summaries(&mut lessons).await?;
        Ok(lessons)
    }

    async fn get_lesson(&self, lesson_id: Uuid) -> PortResult<Lesson> {
        let record = sqlx::query_as::<_, LessonRecord>(
            "SELECT id, title, video_link, duration FROM lessons WHERE id = $1",
        )
        .bind(lesson_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Lesson", lesson_id))?;
        let mut lessons = vec![record.to_domain()];
        self.attach_product_summaries(&mut lessons).await?;
        lessons
            .pop()
            .ok_or_else(|| PortError::NotFound(format!("Lesson {} not found", lesson_id)))
    }

    async fn create_lesson(&self, lesson: &NewLesson) -> PortResult<Lesson> {
        let record = sqlx::query_as::<_, LessonRecord>(
            "INSERT INTO lessons (id, title, video_link, duration) VALUES ($1, $2, $3, $4) \
             RETURNING id, title, video_link, duration",
        )
        .bind(Uuid::new_v4())
        .bind(&lesson.title)
        .bind(&lesson.video_link)
        .bind(lesson.duration)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn update_lesson(
        &self,
        lesson_id: Uuid,
        changes: &LessonChanges,
        rule: ViewedRule,
    ) -> PortResult<Lesson> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let lesson = sqlx::query_as::<_, LessonRecord>(
            "UPDATE lessons SET title = COALESCE($2, title), \
             video_link = COALESCE($3, video_link), duration = COALESCE($4, duration) \
             WHERE id = $1 RETURNING id, title, video_link, duration",
        )
        .bind(lesson_id)
        .bind(changes.title.as_deref())
        .bind(changes.video_link.as_deref())
        .bind(changes.duration)
        .fetch_one(&mut *tx)
        .await
        .map_err(not_found("Lesson", lesson_id))?;

        if changes.duration.is_some() {
            let rows = sqlx::query_as::<_, (Uuid, i64, bool)>(
                "SELECT id, viewed_duration, is_viewed FROM user_lesson_views \
                 WHERE lesson_id = $1 FOR UPDATE",
            )
            .bind(lesson_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_db_error)?;
            let flipped: Vec<Uuid> = rows
                .into_iter()
                .filter(|(_, viewed, is_viewed)| rule(*viewed, lesson.duration) != *is_viewed)
                .map(|(id, _, _)| id)
                .collect();
            sqlx::query("UPDATE user_lesson_views SET is_viewed = NOT is_viewed WHERE id = ANY($1)")
                .bind(&flipped)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }
        tx.commit().await.map_err(map_db_error)?;

        self.get_lesson(lesson_id).await
    }

    async fn delete_lesson(&self, lesson_id: Uuid) -> PortResult<()> {
        let deleted = sqlx::query("DELETE FROM lessons WHERE id = $1")
            .bind(lesson_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Lesson {} not found", lesson_id)));
        }
        Ok(())
    }

    async fn list_views(&self) -> PortResult<Vec<UserLessonView>> {
        let records = sqlx::query_as::<_, ViewRecord>(&format!(
            "{} ORDER BY v.last_viewed_date DESC, v.id",
            VIEW_SELECT
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        self.hydrate_views(records).await
    }

    async fn get_view(&self, view_id: Uuid) -> PortResult<UserLessonView> {
        let record = sqlx::query_as::<_, ViewRecord>(&format!("{} WHERE v.id = $1", VIEW_SELECT))
            .bind(view_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found("Lesson view", view_id))?;
        self.hydrate_views(vec![record])
            .await?
            .pop()
            .ok_or_else(|| PortError::NotFound(format!("Lesson view {} not found", view_id)))
    }

    async fn insert_view(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        progress: &ProgressWrite,
    ) -> PortResult<UserLessonView> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        Self::insert_judged_view(&mut tx, user_id, lesson_id, progress, "")
            .await
            .map_err(|e| match e {
                PortError::Validation(msg) if msg.starts_with("duplicate") => {
                    PortError::Validation(format!(
                        "user {} already has a view record for lesson {}",
                        user_id, lesson_id
                    ))
                }
                other => other,
            })?;
        tx.commit().await.map_err(map_db_error)?;
        self.view_for_pair(user_id, lesson_id).await
    }

    async fn get_or_create_view(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        initial: &ProgressWrite,
    ) -> PortResult<UserLessonView> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        Self::insert_judged_view(
            &mut tx,
            user_id,
            lesson_id,
            initial,
            "ON CONFLICT (user_id, lesson_id) DO NOTHING",
        )
        .await?;
        tx.commit().await.map_err(map_db_error)?;
        self.view_for_pair(user_id, lesson_id).await
    }

    async fn update_view(
        &self,
        view_id: Uuid,
        progress: &ProgressWrite,
    ) -> PortResult<UserLessonView> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        // Lock order: lesson, then view row. A view's lesson never changes.
        let lesson_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT lesson_id FROM user_lesson_views WHERE id = $1",
        )
        .bind(view_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(not_found("Lesson view", view_id))?;
        let lesson_duration = Self::lock_lesson_duration(&mut tx, lesson_id).await?;
        let stored = sqlx::query_scalar::<_, i64>(
            "SELECT viewed_duration FROM user_lesson_views WHERE id = $1 FOR UPDATE",
        )
        .bind(view_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(not_found("Lesson view", view_id))?;

        let (viewed_duration, is_viewed) = progress.resolve(stored, lesson_duration);
        sqlx::query(
            "UPDATE user_lesson_views SET viewed_duration = $2, is_viewed = $3, \
             last_viewed_date = $4 WHERE id = $1",
        )
        .bind(view_id)
        .bind(viewed_duration)
        .bind(is_viewed)
        .bind(progress.last_viewed_date)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;
        tx.commit().await.map_err(map_db_error)?;

        self.get_view(view_id).await
    }

    async fn delete_view(&self, view_id: Uuid) -> PortResult<()> {
        let deleted = sqlx::query("DELETE FROM user_lesson_views WHERE id = $1")
            .bind(view_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Lesson view {} not found", view_id)));
        }
        Ok(())
    }

    async fn product_totals(&self) -> PortResult<Vec<ProductTotals>> {
        let records = sqlx::query_as::<_, TotalsRecord>(
            "SELECT p.id AS product_id, p.title, \
                    COALESCE(v.watched, 0)::BIGINT AS watched_lessons_count, \
                    COALESCE(v.total, 0)::BIGINT AS total_viewed_time, \
                    COALESCE(a.students, 0)::BIGINT AS students_count \
             FROM products p \
             LEFT JOIN ( \
                 SELECT pl.product_id, \
                        COUNT(*) FILTER (WHERE ulv.is_viewed) AS watched, \
                        LEAST(SUM(ulv.viewed_duration), 9223372036854775807) AS total \
                 FROM product_lessons pl \
                 JOIN user_lesson_views ulv ON ulv.lesson_id = pl.lesson_id \
                 GROUP BY pl.product_id \
             ) v ON v.product_id = p.id \
             LEFT JOIN ( \
                 SELECT product_id, COUNT(*) AS students \
                 FROM product_access GROUP BY product_id \
             ) a ON a.product_id = p.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(records
            .into_iter()
            .map(|r| ProductTotals {
                product_id: r.product_id,
                title: r.title,
                watched_lessons_count: r.watched_lessons_count,
                total_viewed_time: r.total_viewed_time,
                students_count: r.students_count,
            })
            .collect())
    }
}
