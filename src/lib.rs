//! HCI Task Timer - timed usability tasks for HCI studies
//!
//! A study participant works through a fixed sequence of rounds (training,
//! task set 1, task set 2). Each task is timed from the moment its prompt is
//! shown until the participant either finishes or gives up, and the results
//! are exported as one JSON document per participant.
//!
//! ## Modules
//!
//! - **Sequencer / Recorder**: the round-by-round prompt walk and the
//!   append-only result log
//! - **Session**: the per-task state machine a host UI drives through the
//!   [`TaskDriver`] trait
//! - **Storage**: the `<documents-root>/HCI-Task-Results/<participant>.json`
//!   export boundary

pub mod config;
pub mod controls;
pub mod error;
pub mod recorder;
pub mod rounds;
pub mod sequencer;
pub mod session;
pub mod storage;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::StudyConfig;
pub use controls::{Control, ControlState, TaskControls, TimerFired, TimerRequest};
pub use error::TaskError;
pub use recorder::SessionRecorder;
pub use rounds::{round_config, TaskRoundConfig, ROUNDS};
pub use sequencer::TaskSequencer;
pub use session::{
    Clock, DriverEvent, ManualClock, MonotonicClock, RoundSummary, StudySession, TaskDriver,
    TaskPhase,
};
pub use storage::ResultStore;
pub use types::{CompletionStatus, SessionDocument, TaskPrompt, TaskResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
