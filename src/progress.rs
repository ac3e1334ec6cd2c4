//! Per-learner, per-course key/value state written by the content player.
//!
//! Keys and values are passed through untouched. A few well-known SCORM 1.2
//! and 2004 elements also feed the coarse `completion_status` and `score`
//! columns so reports don't have to dig through the raw data.

use crate::{
    models::{CompletionStatus, ProgressRecord, ProgressWrite},
    store::{Store, StoreError},
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("course {0} not found")]
    CourseNotFound(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ProgressTracker {
    store: Arc<dyn Store>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Merges `key = value` into the (user, course) record, creating it if needed.
    pub async fn set(
        &self,
        user_id: i64,
        course_id: i64,
        key: &str,
        value: Value,
    ) -> Result<ProgressRecord, ProgressError> {
        let write = ProgressWrite {
            user_id,
            course_id,
            key: key.to_string(),
            status: status_for(key, &value),
            score: score_for(key, &value),
            value,
        };
        let record = self.store.merge_progress(&write).await.map_err(|e| match e {
            StoreError::NotFound("course") => ProgressError::CourseNotFound(course_id),
            other => other.into(),
        })?;
        tracing::debug!(user_id, course_id, key, status = %record.completion_status, "progress stored");
        Ok(record)
    }

    /// Stored value for `key`, or `""` when the record or key doesn't exist.
    pub async fn get(&self, user_id: i64, course_id: i64, key: &str) -> Result<Value, ProgressError> {
        let value = self
            .store
            .find_progress(user_id, course_id)
            .await?
            .and_then(|mut r| r.progress_data.remove(key))
            .unwrap_or_else(empty);
        Ok(value)
    }

    pub async fn record(&self, user_id: i64, course_id: i64) -> Result<Option<ProgressRecord>, ProgressError> {
        Ok(self.store.find_progress(user_id, course_id).await?)
    }
}

/// What `get` answers for anything never written.
pub fn empty() -> Value {
    Value::String(String::new())
}

fn status_for(key: &str, value: &Value) -> Option<CompletionStatus> {
    let status = CompletionStatus::parse(value.as_str()?)?;
    match key {
        "cmi.core.lesson_status" | "cmi.completion_status" => Some(status),
        // 2004 splits pass/fail out of completion
        "cmi.success_status" => {
            matches!(status, CompletionStatus::Passed | CompletionStatus::Failed).then_some(status)
        }
        _ => None,
    }
}

fn score_for(key: &str, value: &Value) -> Option<f64> {
    if !matches!(key, "cmi.core.score.raw" | "cmi.score.raw") {
        return None;
    }
    let score: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    score.filter(|s| s.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, NewCourse, NewUser};
    use crate::store::{memory::MemoryStore, CourseRepository, TeamRepository};
    use serde_json::json;

    async fn setup() -> (ProgressTracker, i64, i64) {
        let store = Arc::new(MemoryStore::new());
        let course = store
            .create_course(&NewCourse {
                title: "Fire drill".into(),
                description: String::new(),
                price: 0.0,
                language: Language::En,
                is_marketplace: true,
                time_to_complete: 10,
                company_id: None,
            })
            .await
            .unwrap();
        let user = store
            .create_user(&NewUser { email: "ana@example.com".into(), ..Default::default() })
            .await
            .unwrap();
        (ProgressTracker::new(store), user.id, course.id)
    }

    #[tokio::test]
    async fn get_before_any_set_is_empty() {
        let (tracker, user, course) = setup().await;
        assert_eq!(tracker.get(user, course, "cmi.suspend_data").await.unwrap(), json!(""));
        assert_eq!(tracker.get(user, 999, "anything").await.unwrap(), json!(""));
    }

    #[tokio::test]
    async fn set_merges_keys_instead_of_replacing() {
        let (tracker, user, course) = setup().await;
        tracker.set(user, course, "a", json!(1)).await.unwrap();
        tracker.set(user, course, "b", json!({"nested": true})).await.unwrap();
        tracker.set(user, course, "a", json!("two")).await.unwrap();

        assert_eq!(tracker.get(user, course, "a").await.unwrap(), json!("two"));
        assert_eq!(tracker.get(user, course, "b").await.unwrap(), json!({"nested": true}));
        assert_eq!(tracker.get(user, course, "c").await.unwrap(), json!(""));
    }

    #[tokio::test]
    async fn concurrent_sets_to_different_keys_are_all_kept() {
        let (tracker, user, course) = setup().await;
        let tracker = Arc::new(tracker);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let t = tracker.clone();
                tokio::spawn(async move { t.set(user, course, &format!("k{i}"), json!(i)).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let record = tracker.record(user, course).await.unwrap().unwrap();
        assert_eq!(record.progress_data.len(), 16);
    }

    #[tokio::test]
    async fn status_and_score_keys_update_summary_columns() {
        let (tracker, user, course) = setup().await;
        tracker.set(user, course, "cmi.core.lesson_status", json!("incomplete")).await.unwrap();
        tracker.set(user, course, "cmi.core.score.raw", json!("87.5")).await.unwrap();
        let record = tracker.set(user, course, "cmi.success_status", json!("passed")).await.unwrap();

        assert_eq!(record.completion_status, CompletionStatus::Passed);
        assert_eq!(record.score, Some(87.5));
    }

    #[tokio::test]
    async fn unrecognised_status_is_stored_verbatim() {
        let (tracker, user, course) = setup().await;
        let record = tracker.set(user, course, "cmi.core.lesson_status", json!("wobbly")).await.unwrap();

        assert_eq!(record.completion_status, CompletionStatus::NotAttempted);
        assert_eq!(tracker.get(user, course, "cmi.core.lesson_status").await.unwrap(), json!("wobbly"));
    }

    #[tokio::test]
    async fn set_on_missing_course_fails() {
        let (tracker, user, _) = setup().await;
        assert!(matches!(
            tracker.set(user, 404, "a", json!(1)).await,
            Err(ProgressError::CourseNotFound(404))
        ));
    }

    #[test]
    fn success_status_only_counts_for_pass_or_fail() {
        assert_eq!(status_for("cmi.success_status", &json!("unknown")), None);
        assert_eq!(status_for("cmi.completion_status", &json!("completed")), Some(CompletionStatus::Completed));
        assert_eq!(status_for("cmi.suspend_data", &json!("passed")), None);
        assert_eq!(score_for("cmi.score.raw", &json!(42)), Some(42.0));
        assert_eq!(score_for("cmi.score.raw", &json!("n/a")), None);
    }
}
