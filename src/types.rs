//! Core types for the HCI task timer
//!
//! This module defines the data that flows between the sequencer, the
//! recorder and the exported results document.

use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a single task attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    /// Participant pressed "Finished!"
    Complete,
    /// Participant pressed "Give Up"
    GiveUp,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Complete => "COMPLETE",
            CompletionStatus::GiveUp => "GIVE_UP",
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETE" => Ok(CompletionStatus::Complete),
            "GIVE_UP" => Ok(CompletionStatus::GiveUp),
            other => Err(TaskError::InvalidStatus(other.to_string())),
        }
    }
}

/// Timed outcome of one task attempt
///
/// Immutable once created; the recorder only ever appends these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// Elapsed time between task start and the finish/give-up signal
    pub duration_millis: u64,
    /// How the attempt ended
    pub status: CompletionStatus,
}

impl TaskResult {
    pub fn new(duration_millis: u64, status: CompletionStatus) -> Self {
        Self {
            duration_millis,
            status,
        }
    }
}

/// A prompt shown to the participant together with its screenshot reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskPrompt {
    /// Round the prompt belongs to
    pub round: usize,
    /// Position within the round (0-based)
    pub index: usize,
    /// Instruction text
    pub text: &'static str,
    /// Opaque screenshot identifier resolved by the host UI
    pub screenshot: &'static str,
}

/// Timing section of the results document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantitative {
    pub timings: Vec<TaskResult>,
}

/// Survey section of the results document, currently always empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualitative {}

/// The persisted results document for one participant
///
/// Serializes as
/// `{"quantitative":{"timings":[...]},"qualitative":{}}` with fields in that
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub quantitative: Quantitative,
    #[serde(default)]
    pub qualitative: Qualitative,
}

impl SessionDocument {
    /// Parse a results document from JSON
    pub fn from_json(json: &str) -> Result<Self, TaskError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Number of recorded timings
    pub fn len(&self) -> usize {
        self.quantitative.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantitative.timings.is_empty()
    }

    /// Count of timings with the given status
    pub fn count_status(&self, status: CompletionStatus) -> usize {
        self.quantitative
            .timings
            .iter()
            .filter(|t| t.status == status)
            .count()
    }

    /// Sum of all durations, saturating at `u64::MAX`
    pub fn total_duration_millis(&self) -> u64 {
        self.quantitative
            .timings
            .iter()
            .fold(0u64, |total, t| total.saturating_add(t.duration_millis))
    }
}
