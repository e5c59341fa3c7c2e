//! Runtime configuration with environment variable support
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HCI_TASK_DOCUMENTS_ROOT` | Directory that holds `HCI-Task-Results/` | `$HOME/Documents` |
//! | `HCI_TASK_START_ROUND` | Round the session starts at (0-2) | `0` |
//! | `HCI_TASK_CHECKPOINT_ROUNDS` | Export after every round, not only at the end | `false` |
//!
//! Timer delays and round sizes are constants in [`crate::rounds`].

use crate::rounds::{FINAL_ROUND, TRAINING_ROUND};
use crate::storage::ResultStore;
use std::env;
use std::path::PathBuf;
use tracing::warn;

/// Environment variable for the documents root
pub const ENV_DOCUMENTS_ROOT: &str = "HCI_TASK_DOCUMENTS_ROOT";

/// Environment variable for the starting round
pub const ENV_START_ROUND: &str = "HCI_TASK_START_ROUND";

/// Environment variable enabling per-round checkpoints
pub const ENV_CHECKPOINT_ROUNDS: &str = "HCI_TASK_CHECKPOINT_ROUNDS";

/// Documents folder name used when only `$HOME` is known
pub const DEFAULT_DOCUMENTS_DIR: &str = "Documents";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyConfig {
    /// Root directory under which results are stored
    pub documents_root: PathBuf,
    /// Round to start the session at
    pub start_round: usize,
    /// Write the results file after every round as well as at the end
    pub checkpoint_rounds: bool,
}

impl StudyConfig {
    /// Load from the process environment, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::defaults_with_home(lookup("HOME"));

        let documents_root = lookup(ENV_DOCUMENTS_ROOT)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.documents_root);

        let start_round = match lookup(ENV_START_ROUND) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(round) if round <= FINAL_ROUND => round,
                _ => {
                    warn!(value = %raw, "Ignoring invalid {ENV_START_ROUND}");
                    defaults.start_round
                }
            },
            None => defaults.start_round,
        };

        let checkpoint_rounds = match lookup(ENV_CHECKPOINT_ROUNDS) {
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "Ignoring invalid {ENV_CHECKPOINT_ROUNDS}");
                defaults.checkpoint_rounds
            }),
            None => defaults.checkpoint_rounds,
        };

        Self {
            documents_root,
            start_round,
            checkpoint_rounds,
        }
    }

    /// Defaults, ignoring the environment except for `$HOME`
    pub fn defaults() -> Self {
        Self::defaults_with_home(env::var("HOME").ok())
    }

    fn defaults_with_home(home: Option<String>) -> Self {
        let documents_root = match home {
            Some(home) if !home.is_empty() => PathBuf::from(home).join(DEFAULT_DOCUMENTS_DIR),
            _ => PathBuf::from(DEFAULT_DOCUMENTS_DIR),
        };
        Self {
            documents_root,
            start_round: TRAINING_ROUND,
            checkpoint_rounds: false,
        }
    }

    pub fn result_store(&self) -> ResultStore {
        ResultStore::new(&self.documents_root)
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_use_home_documents() {
        let config = StudyConfig::from_lookup(lookup_from(&[("HOME", "/home/study")]));
        assert_eq!(config.documents_root, PathBuf::from("/home/study/Documents"));
        assert_eq!(config.start_round, 0);
        assert!(!config.checkpoint_rounds);
    }

    #[test]
    fn test_env_overrides() {
        let config = StudyConfig::from_lookup(lookup_from(&[
            ("HOME", "/home/study"),
            (ENV_DOCUMENTS_ROOT, "/sdcard/Documents"),
            (ENV_START_ROUND, "2"),
            (ENV_CHECKPOINT_ROUNDS, "yes"),
        ]));
        assert_eq!(config.documents_root, PathBuf::from("/sdcard/Documents"));
        assert_eq!(config.start_round, 2);
        assert!(config.checkpoint_rounds);
        assert_eq!(
            config.result_store().results_dir(),
            PathBuf::from("/sdcard/Documents/HCI-Task-Results")
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = StudyConfig::from_lookup(lookup_from(&[
            (ENV_START_ROUND, "3"),
            (ENV_CHECKPOINT_ROUNDS, "sometimes"),
        ]));
        assert_eq!(config.start_round, 0);
        assert!(!config.checkpoint_rounds);
        assert_eq!(config.documents_root, PathBuf::from("Documents"));
    }
}
