//! crates/course_access_core/src/statistics.rs
//!
//! Per-product completion and acquisition metrics over the whole user base.

use crate::domain::{ProductStatistics, ProductTotals};
use crate::ports::{DatabaseService, PortResult};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Share of all registered users that have access to a product, in percent.
/// Zero when there are no users at all.
pub fn acquisition_percentage(students_count: i64, total_users: i64) -> f64 {
    if total_users <= 0 {
        return 0.0;
    }
    students_count as f64 / total_users as f64 * 100.0
}

/// What the fold needs to know about one product.
#[derive(Debug, Clone)]
pub struct ProductFacts {
    pub product_id: Uuid,
    pub title: String,
    pub lesson_ids: Vec<Uuid>,
    pub students_count: i64,
}

/// What the fold needs to know about one view row.
#[derive(Debug, Clone, Copy)]
pub struct ViewFact {
    pub lesson_id: Uuid,
    pub viewed_duration: i64,
    pub is_viewed: bool,
}

/// Sums view rows into per-product totals with one pass over `views`.
///
/// A row counts toward every product that contains its lesson; rows are not
/// deduplicated per lesson, so five users finishing one lesson add five.
/// The viewed-time sum saturates at `i64::MAX`.
pub fn fold_totals(products: &[ProductFacts], views: &[ViewFact]) -> Vec<ProductTotals> {
    let mut totals: Vec<ProductTotals> = products
        .iter()
        .map(|p| ProductTotals {
            product_id: p.product_id,
            title: p.title.clone(),
            watched_lessons_count: 0,
            total_viewed_time: 0,
            students_count: p.students_count,
        })
        .collect();

    let mut by_lesson: HashMap<Uuid, Vec<usize>> = HashMap::new();
    for (idx, product) in products.iter().enumerate() {
        for lesson_id in &product.lesson_ids {
            by_lesson.entry(*lesson_id).or_default().push(idx);
        }
    }

    for view in views {
        let Some(indices) = by_lesson.get(&view.lesson_id) else {
            continue;
        };
        for &idx in indices {
            let entry = &mut totals[idx];
            entry.total_viewed_time = entry.total_viewed_time.saturating_add(view.viewed_duration);
            if view.is_viewed {
                entry.watched_lessons_count += 1;
            }
        }
    }

    totals
}

pub fn aggregate(totals: Vec<ProductTotals>, total_users: i64) -> Vec<ProductStatistics> {
    totals
        .into_iter()
        .map(|t| ProductStatistics {
            product_id: t.product_id,
            product: t.title,
            watched_lessons_count: t.watched_lessons_count,
            total_viewed_time: t.total_viewed_time,
            students_count: t.students_count,
            acquisition_percentage: acquisition_percentage(t.students_count, total_users),
        })
        .collect()
}

#[derive(Clone)]
pub struct StatisticsAggregator {
    db: Arc<dyn DatabaseService>,
}

impl StatisticsAggregator {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// One record per product. Order follows whatever the store yields.
    pub async fn compute(&self) -> PortResult<Vec<ProductStatistics>> {
        let totals = self.db.product_totals().await?;
        let total_users = self.db.count_users().await?;
        Ok(aggregate(totals, total_users))
    }
}
