//! Fixed round table
//!
//! Every study runs the same three rounds: a training round followed by two
//! measured task sets. Rounds are looked up by index; there is no per-round
//! branching anywhere else in the crate.

use crate::error::TaskError;
use crate::types::TaskPrompt;
use serde::Serialize;

/// Number of rounds in a session
pub const ROUND_COUNT: usize = 3;

/// Index of the training round
pub const TRAINING_ROUND: usize = 0;

/// Index of the last round; finishing it ends the session
pub const FINAL_ROUND: usize = ROUND_COUNT - 1;

/// Delay after task start before "Finished!" becomes available (milliseconds)
pub const FINISH_ENABLE_DELAY_MS: u64 = 1_000;

/// Delay after task start before "Give Up" becomes available (milliseconds)
pub const GIVE_UP_ENABLE_DELAY_MS: u64 = 3 * 60 * 1_000;

/// Message shown between rounds
pub const TRANSITION_MESSAGE: &str = "Ok, get ready for the real thing!";

/// Immutable configuration of one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskRoundConfig {
    pub round_index: usize,
    /// Human-readable round name
    pub name: &'static str,
    pub prompts: &'static [&'static str],
    /// Screenshot identifiers, parallel to `prompts`
    pub screenshot_refs: &'static [&'static str],
}

impl TaskRoundConfig {
    /// Number of tasks in this round
    pub fn task_count(&self) -> usize {
        self.prompts.len()
    }

    /// Prompt at `index`, if the round has one
    pub fn prompt(&self, index: usize) -> Option<TaskPrompt> {
        let text = *self.prompts.get(index)?;
        let screenshot = *self.screenshot_refs.get(index)?;
        Some(TaskPrompt {
            round: self.round_index,
            index,
            text,
            screenshot,
        })
    }

    pub fn is_training(&self) -> bool {
        self.round_index == TRAINING_ROUND
    }
}

const TRAINING_PROMPTS: &[&str] = &[
    "Your first training task will be to press the green \"Finished!\" button. This is the button you should press when you have completed a task.",
    "Your next task will be to try out swiping between a screenshot and an image. Go on, swipe this text to the left, and swipe right to bring it back. Click the green button when you are done.",
    "Finally, there is a red button that is currently disabled. You can either wait 3 minutes for it to become available, or just remember that it's there if things take too long. Click either button to move on.",
];

const TASK_SET_1_PROMPTS: &[&str] = &[
    "Please perform task 1",
    "Please perform task 2",
    "Please perform task 3",
];

const TASK_SET_2_PROMPTS: &[&str] = &["Please perform task 1", "Please perform task 2"];

const THREE_SCREENSHOTS: &[&str] = &["geospatial_task", "web_image_archive_task", "wilfred"];

const TWO_SCREENSHOTS: &[&str] = &["geospatial_task", "web_image_archive_task"];

/// The round table, indexed by round number
pub static ROUNDS: [TaskRoundConfig; ROUND_COUNT] = [
    TaskRoundConfig {
        round_index: 0,
        name: "training",
        prompts: TRAINING_PROMPTS,
        screenshot_refs: THREE_SCREENSHOTS,
    },
    TaskRoundConfig {
        round_index: 1,
        name: "task set 1",
        prompts: TASK_SET_1_PROMPTS,
        screenshot_refs: THREE_SCREENSHOTS,
    },
    TaskRoundConfig {
        round_index: 2,
        name: "task set 2",
        prompts: TASK_SET_2_PROMPTS,
        screenshot_refs: TWO_SCREENSHOTS,
    },
];

/// Look up a round configuration by index
pub fn round_config(round_index: usize) -> Result<&'static TaskRoundConfig, TaskError> {
    ROUNDS
        .get(round_index)
        .ok_or(TaskError::InvalidRound(round_index))
}

/// Expected task count for a round
pub fn expected_task_count(round_index: usize) -> Option<usize> {
    match round_index {
        0 => Some(3),
        1 => Some(3),
        2 => Some(2),
        _ => None,
    }
}
