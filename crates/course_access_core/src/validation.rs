//! crates/course_access_core/src/validation.rs
//!
//! Field rules for every write payload. Each function returns the normalized
//! value (trimmed strings, deduplicated id lists) or `PortError::Validation`.

use crate::domain::{LessonChanges, NewLesson, NewProduct, ProductChanges};
use crate::ports::{PortError, PortResult};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use uuid::Uuid;

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_VIDEO_LINK_LEN: usize = 200;
pub const MAX_USERNAME_LEN: usize = 150;
/// Upper bound on the seconds recorded on one view row (about 31 years).
pub const MAX_VIEWED_DURATION: i64 = 1_000_000_000;

static VIDEO_LINK: OnceLock<Regex> = OnceLock::new();

fn video_link_pattern() -> &'static Regex {
    VIDEO_LINK.get_or_init(|| {
        Regex::new(
            r"(?i)^https?://[a-z0-9]([a-z0-9\-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9\-]*[a-z0-9])?)*(:[0-9]{1,5})?(/[^\s]*)?$",
        )
        .expect("video link pattern compiles")
    })
}

pub fn validate_title(field: &str, value: &str) -> PortResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PortError::Validation(format!("{} must not be blank", field)));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(PortError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_TITLE_LEN
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_video_link(value: &str) -> PortResult<String> {
    let trimmed = value.trim();
    if trimmed.len() > MAX_VIDEO_LINK_LEN {
        return Err(PortError::Validation(format!(
            "video_link must be at most {} characters",
            MAX_VIDEO_LINK_LEN
        )));
    }
    if !video_link_pattern().is_match(trimmed) {
        return Err(PortError::Validation(format!(
            "video_link '{}' is not a valid http(s) URL",
            trimmed
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_duration(duration: i64) -> PortResult<i64> {
    if duration <= 0 {
        return Err(PortError::Validation(
            "duration must be a positive number of seconds".to_string(),
        ));
    }
    Ok(duration)
}

pub fn validate_viewed_duration(viewed_duration: i64) -> PortResult<i64> {
    if viewed_duration < 0 {
        return Err(PortError::Validation(
            "viewed_duration must not be negative".to_string(),
        ));
    }
    if viewed_duration > MAX_VIEWED_DURATION {
        return Err(PortError::Validation(format!(
            "viewed_duration must be at most {} seconds",
            MAX_VIEWED_DURATION
        )));
    }
    Ok(viewed_duration)
}

pub fn validate_username(value: &str) -> PortResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_USERNAME_LEN {
        return Err(PortError::Validation(format!(
            "username must be between 1 and {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(PortError::Validation(
            "username must not contain whitespace".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Drops repeated ids, keeping first-seen order.
pub fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

pub fn validate_new_product(product: &NewProduct) -> PortResult<NewProduct> {
    Ok(NewProduct {
        title: validate_title("title", &product.title)?,
        users_with_access: dedup_ids(&product.users_with_access),
        lessons: dedup_ids(&product.lessons),
    })
}

pub fn validate_product_changes(changes: &ProductChanges) -> PortResult<ProductChanges> {
    Ok(ProductChanges {
        title: changes
            .title
            .as_deref()
            .map(|t| validate_title("title", t))
            .transpose()?,
        users_with_access: changes.users_with_access.as_deref().map(dedup_ids),
        lessons: changes.lessons.as_deref().map(dedup_ids),
    })
}

pub fn validate_new_lesson(lesson: &NewLesson) -> PortResult<NewLesson> {
    Ok(NewLesson {
        title: validate_title("title", &lesson.title)?,
        video_link: validate_video_link(&lesson.video_link)?,
        duration: validate_duration(lesson.duration)?,
    })
}

pub fn validate_lesson_changes(changes: &LessonChanges) -> PortResult<LessonChanges> {
    Ok(LessonChanges {
        title: changes
            .title
            .as_deref()
            .map(|t| validate_title("title", t))
            .transpose()?,
        video_link: changes
            .video_link
            .as_deref()
            .map(validate_video_link)
            .transpose()?,
        duration: changes.duration.map(validate_duration).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_is_trimmed_and_bounded() {
        assert_eq!(validate_title("title", "  Math ").unwrap(), "Math");
        assert!(validate_title("title", "   ").is_err());
        assert!(validate_title("title", &"x".repeat(MAX_TITLE_LEN + 1)).is_err());
        assert!(validate_title("title", &"x".repeat(MAX_TITLE_LEN)).is_ok());
    }

    #[test]
    fn test_video_link_requires_http_scheme() {
        assert!(validate_video_link("https://videos.example.com/l1.mp4").is_ok());
        assert!(validate_video_link("http://localhost:8080/watch?v=1").is_ok());
        assert!(validate_video_link("ftp://example.com/l1").is_err());
        assert!(validate_video_link("not a url").is_err());
        assert!(validate_video_link("https://").is_err());
    }

    #[test]
    fn test_video_link_host_needs_a_real_label() {
        assert!(validate_video_link("https://.").is_err());
        assert!(validate_video_link("https://-").is_err());
        assert!(validate_video_link("https://a..b/x").is_err());
        assert!(validate_video_link("https://-cdn.example.com/x").is_err());
        assert!(validate_video_link("https://cdn-1.example.com:443/x").is_ok());
        assert!(validate_video_link("http://a").is_ok());
    }

    #[test]
    fn test_durations() {
        assert!(validate_duration(0).is_err());
        assert!(validate_duration(-5).is_err());
        assert_eq!(validate_duration(600).unwrap(), 600);
        assert_eq!(validate_viewed_duration(0).unwrap(), 0);
        assert!(validate_viewed_duration(-1).is_err());
        assert_eq!(
            validate_viewed_duration(MAX_VIEWED_DURATION).unwrap(),
            MAX_VIEWED_DURATION
        );
        assert!(matches!(
            validate_viewed_duration(MAX_VIEWED_DURATION + 1),
            Err(PortError::Validation(_))
        ));
        assert!(validate_viewed_duration(i64::MAX).is_err());
    }

    #[test]
    fn test_dedup_ids_keeps_first_seen_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedup_ids(&[a, b, a, b, a]), vec![a, b]);
    }

    #[test]
    fn test_partial_lesson_changes_only_check_present_fields() {
        let changes = LessonChanges {
            duration: Some(1200),
            ..Default::default()
        };
        let validated = validate_lesson_changes(&changes).unwrap();
        assert_eq!(validated.duration, Some(1200));
        assert!(validated.title.is_none());

        let bad = LessonChanges {
            duration: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            validate_lesson_changes(&bad),
            Err(PortError::Validation(_))
        ));
    }

    #[test]
    fn test_username_rules() {
        assert_eq!(validate_username(" alice ").unwrap(), "alice");
        assert!(validate_username("").is_err());
        assert!(validate_username("al ice").is_err());
    }
}
