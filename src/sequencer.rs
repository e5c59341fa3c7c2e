//! Task sequencing within a round

use crate::error::TaskError;
use crate::rounds::{round_config, TaskRoundConfig};
use crate::types::TaskPrompt;

/// Tracks progress through the prompts of the active round
#[derive(Debug, Clone, Default)]
pub struct TaskSequencer {
    active: Option<&'static TaskRoundConfig>,
    current: usize,
}

impl TaskSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `round_index` the active round and rewind to its first task.
    ///
    /// On failure the previously active round and index are kept.
    pub fn select_round(&mut self, round_index: usize) -> Result<(), TaskError> {
        let config = round_config(round_index)?;
        self.active = Some(config);
        self.current = 0;
        Ok(())
    }

    /// Prompt at the current index
    pub fn current_prompt(&self) -> Result<TaskPrompt, TaskError> {
        let config = self.active.ok_or(TaskError::OutOfRange {
            round: None,
            index: self.current,
            count: 0,
        })?;
        config.prompt(self.current).ok_or(TaskError::OutOfRange {
            round: Some(config.round_index),
            index: self.current,
            count: config.task_count(),
        })
    }

    /// Move to the next task. Not bounds checked; see [`is_round_complete`].
    ///
    /// [`is_round_complete`]: TaskSequencer::is_round_complete
    pub fn advance(&mut self) {
        self.current += 1;
    }

    pub fn is_round_complete(&self) -> bool {
        match self.active {
            Some(config) => self.current >= config.task_count(),
            None => true,
        }
    }

    /// Active round index, if one is selected
    pub fn round(&self) -> Option<usize> {
        self.active.map(|c| c.round_index)
    }

    pub fn round_config(&self) -> Option<&'static TaskRoundConfig> {
        self.active
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Tasks left in the active round, including the current one
    pub fn remaining(&self) -> usize {
        self.active
            .map(|c| c.task_count().saturating_sub(self.current))
            .unwrap_or(0)
    }
}
