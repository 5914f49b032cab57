//! crates/course_access_core/src/progress.rs
//!
//! The viewed-threshold rule and the only write path for `UserLessonView` rows.
//! Every create or update goes through `ProgressRecorder`, which hands the
//! store the threshold rule to apply against the lesson duration it holds at
//! write time.

use crate::domain::{
    Lesson, LessonChanges, LessonViewChanges, NewLessonView, ProgressWrite, UserLessonView,
};
use crate::ports::{DatabaseService, PortError, PortResult};
use crate::validation;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Share of a lesson that must be watched for it to count as viewed.
pub const VIEWED_THRESHOLD_PERCENT: i64 = 80;

/// `viewed_duration >= 0.8 * lesson_duration`, inclusive at the boundary.
///
/// Evaluated in widened integers so the boundary is exact for every duration.
pub fn evaluate(viewed_duration: i64, lesson_duration: i64) -> bool {
    i128::from(viewed_duration) * 100
        >= i128::from(lesson_duration) * i128::from(VIEWED_THRESHOLD_PERCENT)
}

impl ProgressWrite {
    /// A write judged by the viewed threshold.
    pub fn judged(viewed_duration: Option<i64>, at: DateTime<Utc>) -> Self {
        Self {
            viewed_duration,
            last_viewed_date: at,
            rule: evaluate,
        }
    }
}

/// Maps a missing referenced entity to a validation failure on the payload.
fn unknown_reference(kind: &'static str, id: Uuid) -> impl FnOnce(PortError) -> PortError {
    move |e| match e {
        PortError::NotFound(_) => PortError::Validation(format!("unknown {} {}", kind, id)),
        other => other,
    }
}

#[derive(Clone)]
pub struct ProgressRecorder {
    db: Arc<dyn DatabaseService>,
}

impl ProgressRecorder {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Fetches the caller's row for `lesson`, creating a zeroed one on first access.
    pub async fn get_or_create(&self, user_id: Uuid, lesson: &Lesson) -> PortResult<UserLessonView> {
        let initial = ProgressWrite::judged(Some(0), Utc::now());
        self.db.get_or_create_view(user_id, lesson.id, &initial).await
    }

    pub async fn record(&self, view: &NewLessonView) -> PortResult<UserLessonView> {
        let viewed_duration = validation::validate_viewed_duration(view.viewed_duration)?;
        self.db
            .get_user(view.user_id)
            .await
            .map_err(unknown_reference("user", view.user_id))?;
        self.db
            .get_lesson(view.lesson_id)
            .await
            .map_err(unknown_reference("lesson", view.lesson_id))?;

        let progress = ProgressWrite::judged(Some(viewed_duration), Utc::now());
        self.db
            .insert_view(view.user_id, view.lesson_id, &progress)
            .await
    }

    /// Applies `changes` to an existing row. A request without a new
    /// `viewed_duration` still re-evaluates and touches `last_viewed_date`.
    pub async fn update(
        &self,
        view_id: Uuid,
        changes: &LessonViewChanges,
    ) -> PortResult<UserLessonView> {
        let viewed_duration = changes
            .viewed_duration
            .map(validation::validate_viewed_duration)
            .transpose()?;
        let progress = ProgressWrite::judged(viewed_duration, Utc::now());
        self.db.update_view(view_id, &progress).await
    }

    /// Updates a lesson. A new duration re-evaluates every view row on it in
    /// the same store operation.
    pub async fn update_lesson(&self, lesson_id: Uuid, changes: &LessonChanges) -> PortResult<Lesson> {
        let changes = validation::validate_lesson_changes(changes)?;
        let lesson = self.db.update_lesson(lesson_id, &changes, evaluate).await?;
        if changes.touches_duration() {
            debug!(%lesson_id, duration = lesson.duration, "Re-evaluated views after duration change");
        }
        Ok(lesson)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        assert!(evaluate(480, 600));
        assert!(!evaluate(479, 600));
        assert!(evaluate(960, 1200));
        assert!(!evaluate(959, 1200));
    }

    #[test]
    fn test_threshold_holds_across_durations() {
        for duration in 1..=2_000_i64 {
            for viewed in [0, duration / 2, duration - 1, duration, duration * 2] {
                let expected = (viewed as f64) >= 0.8 * (duration as f64) - 1e-9;
                assert_eq!(
                    evaluate(viewed, duration),
                    expected,
                    "viewed={} duration={}",
                    viewed,
                    duration
                );
            }
        }
    }

    #[test]
    fn test_boundary_on_exact_multiples_of_five() {
        for duration in (5..=5_000_i64).step_by(5) {
            let boundary = duration * 4 / 5;
            assert!(evaluate(boundary, duration));
            assert!(!evaluate(boundary - 1, duration));
        }
    }

    #[test]
    fn test_fresh_record_is_not_viewed() {
        let write = ProgressWrite::judged(Some(0), Utc::now());
        assert_eq!(write.resolve(0, 600), (0, false));
    }

    #[test]
    fn test_write_without_duration_keeps_stored_value() {
        let write = ProgressWrite::judged(None, Utc::now());
        assert_eq!(write.resolve(500, 600), (500, true));
        assert_eq!(write.resolve(500, 1200), (500, false));
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        assert!(evaluate(i64::MAX, i64::MAX));
        assert!(!evaluate(0, i64::MAX));
    }

    #[test]
    fn test_zero_duration_counts_as_viewed() {
        assert!(evaluate(0, 0));
    }
}
