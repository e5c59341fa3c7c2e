//! Results storage
//!
//! One JSON document per participant at
//! `<documents-root>/HCI-Task-Results/<participant>.json`. Writes go through a
//! temporary file in the same directory that is renamed into place, so a
//! reader sees either the previous document or the new one.

use crate::error::TaskError;
use crate::recorder::SessionRecorder;
use crate::types::SessionDocument;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Directory under the documents root that holds results files
pub const RESULTS_DIR: &str = "HCI-Task-Results";

/// Export boundary for session results
#[derive(Debug, Clone)]
pub struct ResultStore {
    documents_root: PathBuf,
}

impl ResultStore {
    pub fn new(documents_root: impl Into<PathBuf>) -> Self {
        Self {
            documents_root: documents_root.into(),
        }
    }

    pub fn documents_root(&self) -> &Path {
        &self.documents_root
    }

    pub fn results_dir(&self) -> PathBuf {
        self.documents_root.join(RESULTS_DIR)
    }

    /// The storage medium counts as mounted when the documents root exists
    /// and is a directory
    pub fn is_available(&self) -> bool {
        self.documents_root.is_dir()
    }

    /// File path for a participant's results
    pub fn path_for(&self, participant_id: &str) -> Result<PathBuf, TaskError> {
        validate_file_stem(participant_id)?;
        Ok(self.results_dir().join(format!("{participant_id}.json")))
    }

    /// Serialize `recorder` and write it, replacing any earlier document for
    /// the same participant
    pub fn write(&self, recorder: &SessionRecorder) -> Result<PathBuf, TaskError> {
        let path = self.path_for(recorder.participant_id())?;

        if !self.is_available() {
            warn!(
                root = %self.documents_root.display(),
                "No storage mounted, unable to write results"
            );
            return Err(TaskError::StorageUnavailable(self.documents_root.clone()));
        }

        let json = recorder.to_json_string()?;
        let dir = self.results_dir();
        let write_err = |source| TaskError::Write {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&dir).map_err(write_err)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        info!(
            participant = %recorder.participant_id(),
            results = recorder.len(),
            started_at = %recorder.started_at().to_rfc3339(),
            path = %path.display(),
            "Exported session results"
        );
        Ok(path)
    }

    /// Read back a previously exported document
    pub fn read(&self, participant_id: &str) -> Result<SessionDocument, TaskError> {
        let path = self.path_for(participant_id)?;
        let json = fs::read_to_string(&path).map_err(|source| TaskError::Read {
            path: path.clone(),
            source,
        })?;
        SessionDocument::from_json(&json)
    }
}

fn validate_file_stem(participant_id: &str) -> Result<(), TaskError> {
    let invalid = participant_id.trim().is_empty()
        || participant_id == "."
        || participant_id == ".."
        || participant_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(TaskError::InvalidParticipant(participant_id.to_string()));
    }
    Ok(())
}
