//! Session recorder
//!
//! Accumulates timed task outcomes for one participant and renders them as
//! the results document. Appending is the only mutation; a rejected record
//! leaves the sequence exactly as it was.

use crate::error::TaskError;
use crate::storage::ResultStore;
use crate::types::{CompletionStatus, Quantitative, Qualitative, SessionDocument, TaskResult};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

/// Append-only record of one participant's task results
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    participant_id: String,
    started_at: DateTime<Utc>,
    results: Vec<TaskResult>,
}

impl SessionRecorder {
    /// Start an empty session for `participant_id`
    pub fn create(participant_id: impl Into<String>) -> Result<Self, TaskError> {
        let participant_id = participant_id.into();
        if participant_id.trim().is_empty() {
            return Err(TaskError::InvalidParticipant(participant_id));
        }
        Ok(Self {
            participant_id,
            started_at: Utc::now(),
            results: Vec::new(),
        })
    }

    /// Append one timed outcome
    pub fn record_result(
        &mut self,
        duration_millis: i64,
        status: CompletionStatus,
    ) -> Result<TaskResult, TaskError> {
        let duration_millis =
            u64::try_from(duration_millis).map_err(|_| TaskError::InvalidDuration(duration_millis))?;

        let result = TaskResult::new(duration_millis, status);
        self.results.push(result);
        debug!(
            participant = %self.participant_id,
            duration_millis,
            %status,
            count = self.results.len(),
            "Recorded task result"
        );
        Ok(result)
    }

    /// Append one outcome whose status arrives as its wire name
    /// (`"COMPLETE"` or `"GIVE_UP"`)
    pub fn record_raw(&mut self, duration_millis: i64, status: &str) -> Result<TaskResult, TaskError> {
        if duration_millis < 0 {
            return Err(TaskError::InvalidDuration(duration_millis));
        }
        let status: CompletionStatus = status.parse()?;
        self.record_result(duration_millis, status)
    }

    /// Render the results document in append order
    pub fn to_json(&self) -> SessionDocument {
        SessionDocument {
            quantitative: Quantitative {
                timings: self.results.clone(),
            },
            qualitative: Qualitative::default(),
        }
    }

    /// Compact serialized form of [`to_json`](SessionRecorder::to_json)
    pub fn to_json_string(&self) -> Result<String, TaskError> {
        Ok(serde_json::to_string(&self.to_json())?)
    }

    /// Write the results document to `store`.
    ///
    /// Not retried; on failure the recorded results are untouched and the
    /// caller may try again.
    pub fn export_to_storage(&self, store: &ResultStore) -> Result<PathBuf, TaskError> {
        store.write(self)
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_documented_example() {
        let mut recorder = SessionRecorder::create("p42").unwrap();
        recorder.record_result(15000, CompletionStatus::Complete).unwrap();
        recorder.record_result(9000, CompletionStatus::GiveUp).unwrap();

        assert_eq!(
            recorder.to_json_string().unwrap(),
            r#"{"quantitative":{"timings":[{"durationMillis":15000,"status":"COMPLETE"},{"durationMillis":9000,"status":"GIVE_UP"}]},"qualitative":{}}"#
        );
    }

    #[test]
    fn test_empty_session_document() {
        let recorder = SessionRecorder::create("p1").unwrap();
        assert_eq!(
            recorder.to_json_string().unwrap(),
            r#"{"quantitative":{"timings":[]},"qualitative":{}}"#
        );
    }

    #[test]
    fn test_empty_participant_rejected() {
        assert!(matches!(
            SessionRecorder::create(""),
            Err(TaskError::InvalidParticipant(_))
        ));
        assert!(matches!(
            SessionRecorder::create("   "),
            Err(TaskError::InvalidParticipant(_))
        ));
    }

    #[test]
    fn test_negative_duration_leaves_results_untouched() {
        let mut recorder = SessionRecorder::create("p7").unwrap();
        recorder.record_result(100, CompletionStatus::Complete).unwrap();
        let before = recorder.to_json();

        let err = recorder.record_result(-1, CompletionStatus::Complete).unwrap_err();
        assert!(matches!(err, TaskError::InvalidDuration(-1)));
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.to_json(), before);
    }

    #[test]
    fn test_unknown_status_leaves_results_untouched() {
        let mut recorder = SessionRecorder::create("p7").unwrap();
        recorder.record_raw(2500, "GIVE_UP").unwrap();

        assert!(matches!(
            recorder.record_raw(100, "SKIPPED"),
            Err(TaskError::InvalidStatus(_))
        ));
        assert!(matches!(
            recorder.record_raw(-5, "SKIPPED"),
            Err(TaskError::InvalidDuration(-5))
        ));
        assert_eq!(recorder.results(), &[TaskResult::new(2500, CompletionStatus::GiveUp)]);
    }

    #[test]
    fn test_append_order_preserved() {
        let mut recorder = SessionRecorder::create("p3").unwrap();
        let durations = [12, 0, 99_999, 7, 180_000, 3];
        for (i, d) in durations.iter().enumerate() {
            let status = if i % 2 == 0 {
                CompletionStatus::Complete
            } else {
                CompletionStatus::GiveUp
            };
            recorder.record_result(*d, status).unwrap();
        }

        let doc = recorder.to_json();
        assert_eq!(doc.len(), durations.len());
        let recorded: Vec<i64> = doc
            .quantitative
            .timings
            .iter()
            .map(|t| t.duration_millis as i64)
            .collect();
        assert_eq!(recorded, durations.to_vec());
    }

    #[test]
    fn test_to_json_is_idempotent() {
        let mut recorder = SessionRecorder::create("p9").unwrap();
        recorder.record_result(321, CompletionStatus::Complete).unwrap();
        let first = recorder.to_json_string().unwrap();
        let second = recorder.to_json_string().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_duration_accepted() {
        let mut recorder = SessionRecorder::create("p0").unwrap();
        let result = recorder.record_result(0, CompletionStatus::Complete).unwrap();
        assert_eq!(result.duration_millis, 0);
    }

    #[test]
    fn test_record_returns_appended_result() {
        let mut recorder = SessionRecorder::create("p0").unwrap();
        recorder.record_result(700, CompletionStatus::Complete).unwrap();
        let result = recorder.record_raw(1800, "GIVE_UP").unwrap();
        assert_eq!(result, TaskResult::new(1800, CompletionStatus::GiveUp));
        assert_eq!(recorder.to_json().quantitative.timings.last(), Some(&result));
    }
}
