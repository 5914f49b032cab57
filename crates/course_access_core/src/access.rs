//! crates/course_access_core/src/access.rs
//!
//! Decides which products and lessons a user can reach, and gates product
//! writes on ownership.

use crate::domain::{
    Lesson, LessonProgress, NewProduct, Product, ProductChanges, ProductLessons,
};
use crate::ports::{DatabaseService, PortError, PortResult};
use crate::progress::ProgressRecorder;
use crate::validation;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Union of the lessons of `products`, each lesson kept once, ordered by
/// title then id.
pub fn distinct_lessons(products: &[Product]) -> Vec<Lesson> {
    let mut seen = HashSet::new();
    let mut lessons: Vec<Lesson> = products
        .iter()
        .flat_map(|p| p.lessons.iter())
        .filter(|l| seen.insert(l.id))
        .cloned()
        .collect();
    lessons.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
    lessons
}

#[derive(Clone)]
pub struct AccessResolver {
    db: Arc<dyn DatabaseService>,
    progress: ProgressRecorder,
}

impl AccessResolver {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        let progress = ProgressRecorder::new(db.clone());
        Self { db, progress }
    }

    /// Loads the product and fails with `Forbidden` unless `user_id` owns it.
    pub async fn authorize_product_write(&self, user_id: Uuid, product_id: Uuid) -> PortResult<Product> {
        let product = self.db.get_product(product_id).await?;
        if !product.is_owned_by(user_id) {
            warn!(%user_id, %product_id, "Rejected product write by non-owner");
            return Err(PortError::Forbidden(format!(
                "only the owner may modify product {}",
                product_id
            )));
        }
        Ok(product)
    }

    pub async fn create_product(&self, owner_id: Uuid, product: &NewProduct) -> PortResult<Product> {
        let product = validation::validate_new_product(product)?;
        self.db.create_product(owner_id, &product).await
    }

    pub async fn update_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        changes: &ProductChanges,
    ) -> PortResult<Product> {
        self.authorize_product_write(user_id, product_id).await?;
        let changes = validation::validate_product_changes(changes)?;
        self.db.update_product(product_id, &changes).await
    }

    pub async fn delete_product(&self, user_id: Uuid, product_id: Uuid) -> PortResult<()> {
        self.authorize_product_write(user_id, product_id).await?;
        self.db.delete_product(product_id).await
    }

    pub async fn accessible_products(&self, user_id: Uuid) -> PortResult<Vec<Product>> {
        let mut products = self.db.products_accessible_to(user_id).await?;
        products.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    pub async fn accessible_lessons(&self, user_id: Uuid) -> PortResult<Vec<Lesson>> {
        let products = self.db.products_accessible_to(user_id).await?;
        Ok(distinct_lessons(&products))
    }

    /// The caller's progress on every lesson of one product.
    ///
    /// An unknown product and a product the caller cannot access both fail
    /// with the same `NotFound`, so the response never reveals which it was.
    pub async fn product_lessons(&self, user_id: Uuid, product_id: Uuid) -> PortResult<ProductLessons> {
        let hidden = || PortError::NotFound(format!("Product {} not found", product_id));

        let product = match self.db.get_product(product_id).await {
            Ok(product) => product,
            Err(PortError::NotFound(_)) => return Err(hidden()),
            Err(e) => return Err(e),
        };
        if !product.grants_access_to(user_id) {
            return Err(hidden());
        }

        let mut lessons = Vec::with_capacity(product.lessons.len());
        for lesson in &product.lessons {
            let view = self.progress.get_or_create(user_id, lesson).await?;
            lessons.push(LessonProgress {
                lesson_id: lesson.id,
                lesson_title: lesson.title.clone(),
                video_link: lesson.video_link.clone(),
                duration: lesson.duration,
                is_viewed: view.is_viewed,
                viewed_duration: view.viewed_duration,
                last_viewed_date: view.last_viewed_date,
            });
        }

        Ok(ProductLessons {
            product_title: product.title,
            lessons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;
    use chrono::Utc;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: name.to_string(),
            created_at: Utc::now(),
        }
    }

    fn lesson(title: &str) -> Lesson {
        Lesson {
            id: Uuid::new_v4(),
            title: title.to_string(),
            video_link: format!("https://videos.example.com/{}", title),
            duration: 600,
            included_in_products: Vec::new(),
        }
    }

    fn product(title: &str, owner: &User, lessons: Vec<Lesson>) -> Product {
        Product {
            id: Uuid::new_v4(),
            title: title.to_string(),
            owner: owner.clone(),
            users_with_access: Vec::new(),
            lessons,
        }
    }

    #[test]
    fn test_shared_lesson_listed_once() {
        let owner = user("owner");
        let shared = lesson("shared");
        let algebra = lesson("algebra");
        let physics = lesson("physics");

        let math = product("Math", &owner, vec![algebra.clone(), shared.clone()]);
        let science = product("Science", &owner, vec![shared.clone(), physics.clone()]);

        let lessons = distinct_lessons(&[math, science]);
        let ids: Vec<Uuid> = lessons.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![algebra.id, physics.id, shared.id]);
    }

    #[test]
    fn test_no_products_no_lessons() {
        assert!(distinct_lessons(&[]).is_empty());
    }

    #[test]
    fn test_owner_is_not_implicitly_a_student() {
        let owner = user("owner");
        let student = user("student");
        let mut p = product("Math", &owner, Vec::new());
        p.users_with_access.push(student.clone());

        assert!(p.is_owned_by(owner.id));
        assert!(!p.grants_access_to(owner.id));
        assert!(p.grants_access_to(student.id));
        assert!(!p.is_owned_by(student.id));
    }
}
