//! Error types for the HCI task timer

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the sequencer, recorder, session and result store
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Invalid round index {0}: only rounds 0, 1 and 2 exist")]
    InvalidRound(usize),

    /// `round` is `None` when no round has been selected yet
    #[error("Task index {index} is out of range ({count} tasks in {})", round_label(.round))]
    OutOfRange {
        round: Option<usize>,
        index: usize,
        count: usize,
    },

    #[error("Invalid duration: {0} ms is negative")]
    InvalidDuration(i64),

    #[error("Invalid completion status: {0:?}")]
    InvalidStatus(String),

    #[error("Invalid participant id: {0:?}")]
    InvalidParticipant(String),

    #[error("{control} control is not enabled yet")]
    ControlDisabled { control: &'static str },

    #[error("Cannot {action} while task is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: &'static str,
    },

    #[error("Round {round} has {recorded} of {expected} results recorded")]
    RoundIncomplete {
        round: usize,
        recorded: usize,
        expected: usize,
    },

    #[error("Storage unavailable: {} is not mounted or not a directory", .0.display())]
    StorageUnavailable(PathBuf),

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TaskError {
    /// Whether the surrounding application may reasonably offer a retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::StorageUnavailable(_) | TaskError::Write { .. })
    }
}

fn round_label(round: &Option<usize>) -> String {
    match round {
        Some(round) => format!("round {round}"),
        None => "no selected round".to_string(),
    }
}
