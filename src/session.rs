//! Study session orchestration
//!
//! A [`StudySession`] walks one participant through the rounds of a study.
//! Each task moves through
//! `AwaitingStart -> InProgress -> (Completed | GivenUp)` and then either
//! back to `AwaitingStart` for the next prompt or to `RoundDone`.
//!
//! The session never touches a screen or a timer itself. It reports what to
//! show and what to schedule through the [`TaskDriver`] trait, and the host
//! feeds participant signals and fired timers back in through
//! [`StudySession::handle`].

use crate::config::StudyConfig;
use crate::controls::{Control, ControlState, TaskControls, TimerFired, TimerRequest};
use crate::error::TaskError;
use crate::recorder::SessionRecorder;
use crate::rounds::{FINAL_ROUND, TRANSITION_MESSAGE};
use crate::sequencer::TaskSequencer;
use crate::storage::ResultStore;
use crate::types::{CompletionStatus, TaskPrompt, TaskResult};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Millisecond time source used to measure task durations
pub trait Clock {
    fn now_millis(&self) -> u64;
}

/// Wall-clock time elapsed since the clock was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Clock advanced explicitly by the host. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get().saturating_add(millis));
    }

    pub fn set(&self, millis: u64) {
        self.now.set(millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.get()
    }
}

/// Where the session is in the per-task flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Prompt shown, clock not started
    AwaitingStart,
    /// Clock running
    InProgress,
    Completed,
    GivenUp,
    /// Every prompt of the round has a result
    RoundDone,
    /// The final round is done; the session is ready for export
    SessionDone,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::AwaitingStart => "awaiting start",
            TaskPhase::InProgress => "in progress",
            TaskPhase::Completed => "completed",
            TaskPhase::GivenUp => "given up",
            TaskPhase::RoundDone => "round done",
            TaskPhase::SessionDone => "session done",
        }
    }
}

/// Signals the host feeds into the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    /// Start the clock for the prompt on screen
    Start,
    /// Participant pressed "Finished!"
    Finish,
    /// Participant pressed "Give Up"
    GiveUp,
    /// A timer requested through [`TaskDriver::schedule_timer`] elapsed
    Timer(TimerFired),
    /// Participant is ready for the next round
    NextRound,
}

/// Summary handed to the host when a non-final round ends
#[derive(Debug)]
pub struct RoundSummary {
    pub round: usize,
    pub next_round: usize,
    /// Results recorded during this round
    pub recorded: usize,
    pub message: &'static str,
    /// Outcome of the per-round export, when checkpointing is enabled
    pub checkpoint: Option<Result<PathBuf, TaskError>>,
}

/// Host UI callbacks
///
/// Only prompt display and timer scheduling are required; the remaining
/// notifications default to no-ops.
pub trait TaskDriver {
    /// Present a prompt and its screenshot
    fn show_prompt(&mut self, prompt: &TaskPrompt);

    /// Schedule a one-shot timer and deliver [`DriverEvent::Timer`] with
    /// `request.fired()` once it elapses
    fn schedule_timer(&mut self, request: TimerRequest);

    fn control_changed(&mut self, _control: Control, _state: ControlState) {}

    fn task_ended(&mut self, _prompt: &TaskPrompt, _result: &TaskResult) {}

    fn round_finished(&mut self, _summary: RoundSummary) {}

    fn session_finished(&mut self, _recorder: &SessionRecorder) {}
}

/// One participant's run through the study rounds
#[derive(Debug)]
pub struct StudySession<C: Clock = MonotonicClock> {
    sequencer: TaskSequencer,
    recorder: SessionRecorder,
    controls: TaskControls,
    phase: TaskPhase,
    task_started_at: Option<u64>,
    round_start_len: usize,
    auto_start: bool,
    checkpoint_rounds: bool,
    store: ResultStore,
    clock: C,
}

impl<C: Clock> StudySession<C> {
    /// Create a session positioned at the first prompt of the configured
    /// start round. Call [`present`](StudySession::present) once to show it.
    pub fn new(participant_id: impl Into<String>, config: &StudyConfig, clock: C) -> Result<Self, TaskError> {
        let recorder = SessionRecorder::create(participant_id)?;
        let mut sequencer = TaskSequencer::new();
        sequencer.select_round(config.start_round)?;

        info!(
            participant = %recorder.participant_id(),
            round = config.start_round,
            "Study session created"
        );

        Ok(Self {
            sequencer,
            recorder,
            controls: TaskControls::new(),
            phase: TaskPhase::AwaitingStart,
            task_started_at: None,
            round_start_len: 0,
            auto_start: true,
            checkpoint_rounds: config.checkpoint_rounds,
            store: config.result_store(),
            clock,
        })
    }

    /// Start the clock as soon as a prompt is shown instead of waiting for
    /// [`DriverEvent::Start`]. Enabled by default.
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Show the current prompt
    pub fn present<D: TaskDriver>(&mut self, driver: &mut D) -> Result<(), TaskError> {
        self.expect_phase(TaskPhase::AwaitingStart, "present a prompt")?;
        let prompt = self.sequencer.current_prompt()?;
        debug!(round = prompt.round, index = prompt.index, "Presenting task");
        driver.show_prompt(&prompt);
        if self.auto_start {
            self.start_task(driver);
        }
        Ok(())
    }

    /// Apply one host signal
    pub fn handle<D: TaskDriver>(&mut self, event: DriverEvent, driver: &mut D) -> Result<(), TaskError> {
        match event {
            DriverEvent::Start => {
                self.expect_phase(TaskPhase::AwaitingStart, "start a task")?;
                self.start_task(driver);
                Ok(())
            }
            DriverEvent::Finish => self.end_task(CompletionStatus::Complete, driver),
            DriverEvent::GiveUp => self.end_task(CompletionStatus::GiveUp, driver),
            DriverEvent::Timer(fired) => {
                if self.controls.apply(fired) {
                    debug!(control = ?fired.control, "Control enabled");
                    driver.control_changed(fired.control, self.controls.state(fired.control));
                } else {
                    debug!(
                        control = ?fired.control,
                        generation = fired.generation,
                        "Ignoring timer from an earlier task"
                    );
                }
                Ok(())
            }
            DriverEvent::NextRound => self.next_round(driver),
        }
    }

    /// Write the results document to the configured store
    pub fn export(&self) -> Result<PathBuf, TaskError> {
        self.recorder.export_to_storage(&self.store)
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn round(&self) -> Option<usize> {
        self.sequencer.round()
    }

    pub fn current_prompt(&self) -> Result<TaskPrompt, TaskError> {
        self.sequencer.current_prompt()
    }

    pub fn controls(&self) -> &TaskControls {
        &self.controls
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn is_finished(&self) -> bool {
        self.phase == TaskPhase::SessionDone
    }

    fn start_task<D: TaskDriver>(&mut self, driver: &mut D) {
        for request in self.controls.reset_for_new_task() {
            driver.control_changed(request.control, self.controls.state(request.control));
            driver.schedule_timer(request);
        }
        self.task_started_at = Some(self.clock.now_millis());
        self.phase = TaskPhase::InProgress;
    }

    fn end_task<D: TaskDriver>(&mut self, status: CompletionStatus, driver: &mut D) -> Result<(), TaskError> {
        let (action, control, ended) = match status {
            CompletionStatus::Complete => ("finish", Control::Finish, TaskPhase::Completed),
            CompletionStatus::GiveUp => ("give up", Control::GiveUp, TaskPhase::GivenUp),
        };
        self.expect_phase(TaskPhase::InProgress, action)?;
        if !self.controls.is_enabled(control) {
            return Err(TaskError::ControlDisabled {
                control: control.label(),
            });
        }

        let prompt = self.sequencer.current_prompt()?;
        let started = self.task_started_at.unwrap_or_else(|| self.clock.now_millis());
        let elapsed = self.clock.now_millis().saturating_sub(started);
        let elapsed = i64::try_from(elapsed).unwrap_or(i64::MAX);
        let result = self.recorder.record_result(elapsed, status)?;

        self.phase = ended;
        self.task_started_at = None;
        self.controls.cancel();
        info!(
            round = prompt.round,
            index = prompt.index,
            duration_millis = result.duration_millis,
            %status,
            "Task ended"
        );
        driver.task_ended(&prompt, &result);

        self.sequencer.advance();
        if self.sequencer.is_round_complete() {
            self.finish_round(driver)
        } else {
            self.phase = TaskPhase::AwaitingStart;
            self.present(driver)
        }
    }

    fn finish_round<D: TaskDriver>(&mut self, driver: &mut D) -> Result<(), TaskError> {
        let config = self.sequencer.round_config().ok_or(TaskError::OutOfRange {
            round: None,
            index: self.sequencer.current_index(),
            count: 0,
        })?;
        let recorded = self.recorder.len() - self.round_start_len;
        if recorded != config.task_count() {
            return Err(TaskError::RoundIncomplete {
                round: config.round_index,
                recorded,
                expected: config.task_count(),
            });
        }

        if config.round_index >= FINAL_ROUND {
            self.phase = TaskPhase::SessionDone;
            info!(
                participant = %self.recorder.participant_id(),
                results = self.recorder.len(),
                "Session finished"
            );
            driver.session_finished(&self.recorder);
            return Ok(());
        }

        self.phase = TaskPhase::RoundDone;
        let checkpoint = self.checkpoint_rounds.then(|| {
            let outcome = self.export();
            if let Err(e) = &outcome {
                warn!(error = %e, round = config.round_index, "Round checkpoint failed");
            }
            outcome
        });
        info!(round = config.round_index, recorded, "Round finished");
        driver.round_finished(RoundSummary {
            round: config.round_index,
            next_round: config.round_index + 1,
            recorded,
            message: TRANSITION_MESSAGE,
            checkpoint,
        });
        Ok(())
    }

    fn next_round<D: TaskDriver>(&mut self, driver: &mut D) -> Result<(), TaskError> {
        self.expect_phase(TaskPhase::RoundDone, "start the next round")?;
        let next = self.sequencer.round().map_or(0, |r| r + 1);
        self.sequencer.select_round(next)?;
        self.round_start_len = self.recorder.len();
        self.phase = TaskPhase::AwaitingStart;
        info!(round = next, "Round started");
        self.present(driver)
    }

    fn expect_phase(&self, expected: TaskPhase, action: &'static str) -> Result<(), TaskError> {
        if self.phase != expected {
            return Err(TaskError::InvalidTransition {
                action,
                phase: self.phase.as_str(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RESULTS_DIR;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct RecordingDriver {
        prompts: Vec<TaskPrompt>,
        timers: Vec<TimerRequest>,
        control_changes: Vec<(Control, bool)>,
        ended: Vec<TaskResult>,
        rounds: Vec<RoundSummary>,
        finished: Option<usize>,
    }

    impl RecordingDriver {
        fn fire_latest(&self, control: Control) -> DriverEvent {
            let request = self
                .timers
                .iter()
                .rev()
                .find(|t| t.control == control)
                .expect("timer was scheduled");
            DriverEvent::Timer(request.fired())
        }
    }

    impl TaskDriver for RecordingDriver {
        fn show_prompt(&mut self, prompt: &TaskPrompt) {
            self.prompts.push(*prompt);
        }

        fn schedule_timer(&mut self, request: TimerRequest) {
            self.timers.push(request);
        }

        fn control_changed(&mut self, control: Control, state: ControlState) {
            self.control_changes.push((control, state.enabled));
        }

        fn task_ended(&mut self, _prompt: &TaskPrompt, result: &TaskResult) {
            self.ended.push(*result);
        }

        fn round_finished(&mut self, summary: RoundSummary) {
            self.rounds.push(summary);
        }

        fn session_finished(&mut self, recorder: &SessionRecorder) {
            self.finished = Some(recorder.len());
        }
    }

    fn config_at(root: &std::path::Path, start_round: usize) -> StudyConfig {
        StudyConfig {
            documents_root: root.to_path_buf(),
            start_round,
            checkpoint_rounds: false,
        }
    }

    fn finish_current(
        session: &mut StudySession<ManualClock>,
        driver: &mut RecordingDriver,
        clock: &ManualClock,
        millis: u64,
    ) {
        let fired = driver.fire_latest(Control::Finish);
        session.handle(fired, driver).unwrap();
        clock.advance(millis);
        session.handle(DriverEvent::Finish, driver).unwrap();
    }

    #[test]
    fn test_full_session_walkthrough() {
        let root = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let mut driver = RecordingDriver::default();
        let mut session = StudySession::new("p42", &config_at(root.path(), 0), clock.clone()).unwrap();
        session.present(&mut driver).unwrap();

        for round in 0..=FINAL_ROUND {
            assert_eq!(session.round(), Some(round));
            let count = session.sequencer.round_config().unwrap().task_count();
            for _ in 0..count {
                finish_current(&mut session, &mut driver, &clock, 1500);
            }
            if round < FINAL_ROUND {
                assert_eq!(session.phase(), TaskPhase::RoundDone);
                session.handle(DriverEvent::NextRound, &mut driver).unwrap();
            }
        }

        assert!(session.is_finished());
        assert_eq!(driver.finished, Some(8));
        assert_eq!(driver.prompts.len(), 8);
        assert_eq!(driver.rounds.len(), 2);
        assert_eq!(driver.rounds[0].message, TRANSITION_MESSAGE);
        assert!(driver.ended.iter().all(|r| r.duration_millis == 1500));

        let path = session.export().unwrap();
        assert_eq!(path, root.path().join(RESULTS_DIR).join("p42.json"));
        let doc = session.store().read("p42").unwrap();
        assert_eq!(doc.len(), 8);
    }

    #[test]
    fn test_first_prompt_presented_once() {
        let root = tempfile::tempdir().unwrap();
        let mut driver = RecordingDriver::default();
        let mut session = StudySession::new("p1", &config_at(root.path(), 0), ManualClock::new()).unwrap();
        session.present(&mut driver).unwrap();

        assert_eq!(driver.prompts.len(), 1);
        assert_eq!(driver.timers.len(), 2);
        assert!(matches!(
            session.present(&mut driver),
            Err(TaskError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_finish_not_available_before_timer() {
        let root = tempfile::tempdir().unwrap();
        let mut driver = RecordingDriver::default();
        let mut session = StudySession::new("p1", &config_at(root.path(), 0), ManualClock::new()).unwrap();
        session.present(&mut driver).unwrap();

        let err = session.handle(DriverEvent::Finish, &mut driver).unwrap_err();
        assert!(matches!(err, TaskError::ControlDisabled { control: "Finished" }));
        assert!(session.recorder().is_empty());
        assert_eq!(session.phase(), TaskPhase::InProgress);
    }

    #[test]
    fn test_give_up_after_delay_records_give_up() {
        let root = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let mut driver = RecordingDriver::default();
        let mut session = StudySession::new("p1", &config_at(root.path(), 1), clock.clone()).unwrap();
        session.present(&mut driver).unwrap();

        assert!(matches!(
            session.handle(DriverEvent::GiveUp, &mut driver),
            Err(TaskError::ControlDisabled { control: "Give Up" })
        ));

        clock.advance(180_000);
        let fired = driver.fire_latest(Control::GiveUp);
        session.handle(fired, &mut driver).unwrap();
        clock.advance(250);
        session.handle(DriverEvent::GiveUp, &mut driver).unwrap();

        assert_eq!(
            session.recorder().results(),
            &[TaskResult::new(180_250, CompletionStatus::GiveUp)]
        );
        assert_eq!(session.current_prompt().unwrap().index, 1);
    }

    #[test]
    fn test_stale_timer_does_not_enable_next_task() {
        let root = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let mut driver = RecordingDriver::default();
        let mut session = StudySession::new("p1", &config_at(root.path(), 0), clock.clone()).unwrap();
        session.present(&mut driver).unwrap();

        let old_give_up = driver.fire_latest(Control::GiveUp);
        finish_current(&mut session, &mut driver, &clock, 10);

        session.handle(old_give_up, &mut driver).unwrap();
        assert!(!session.controls().is_enabled(Control::GiveUp));
    }

    #[test]
    fn test_manual_start() {
        let root = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let mut driver = RecordingDriver::default();
        let mut session = StudySession::new("p1", &config_at(root.path(), 2), clock.clone())
            .unwrap()
            .with_auto_start(false);
        session.present(&mut driver).unwrap();
        assert_eq!(session.phase(), TaskPhase::AwaitingStart);
        assert!(driver.timers.is_empty());

        clock.advance(5_000);
        session.handle(DriverEvent::Start, &mut driver).unwrap();
        assert_eq!(session.phase(), TaskPhase::InProgress);
        finish_current(&mut session, &mut driver, &clock, 700);
        assert_eq!(session.recorder().results()[0].duration_millis, 700);
        assert_eq!(session.phase(), TaskPhase::AwaitingStart);
    }

    #[test]
    fn test_next_round_requires_round_done() {
        let root = tempfile::tempdir().unwrap();
        let mut driver = RecordingDriver::default();
        let mut session = StudySession::new("p1", &config_at(root.path(), 0), ManualClock::new()).unwrap();
        session.present(&mut driver).unwrap();

        assert!(matches!(
            session.handle(DriverEvent::NextRound, &mut driver),
            Err(TaskError::InvalidTransition { .. })
        ));
        assert_eq!(session.round(), Some(0));
    }

    #[test]
    fn test_invalid_start_round_rejected() {
        let root = tempfile::tempdir().unwrap();
        let result = StudySession::new("p1", &config_at(root.path(), 3), ManualClock::new());
        assert!(matches!(result, Err(TaskError::InvalidRound(3))));
    }

    #[test]
    fn test_checkpoint_written_after_each_round() {
        let root = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let mut driver = RecordingDriver::default();
        let mut config = config_at(root.path(), 0);
        config.checkpoint_rounds = true;
        let mut session = StudySession::new("p8", &config, clock.clone()).unwrap();
        session.present(&mut driver).unwrap();

        for _ in 0..3 {
            finish_current(&mut session, &mut driver, &clock, 20);
        }

        let summary = &driver.rounds[0];
        assert_eq!(summary.recorded, 3);
        assert!(matches!(summary.checkpoint, Some(Ok(_))));
        assert_eq!(session.store().read("p8").unwrap().len(), 3);
    }

    #[test]
    fn test_failed_checkpoint_does_not_abort_session() {
        let root = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let mut driver = RecordingDriver::default();
        let config = StudyConfig {
            documents_root: root.path().join("unmounted"),
            start_round: 0,
            checkpoint_rounds: true,
        };
        let mut session = StudySession::new("p9", &config, clock.clone()).unwrap();
        session.present(&mut driver).unwrap();
        for _ in 0..3 {
            finish_current(&mut session, &mut driver, &clock, 20);
        }

        let summary = &driver.rounds[0];
        assert_eq!(summary.recorded, 3);
        assert!(matches!(
            summary.checkpoint,
            Some(Err(TaskError::StorageUnavailable(_)))
        ));
        assert_eq!(session.phase(), TaskPhase::RoundDone);
        assert_eq!(session.recorder().len(), 3);

        session.handle(DriverEvent::NextRound, &mut driver).unwrap();
        assert_eq!(session.round(), Some(1));
        assert_eq!(driver.prompts.last().unwrap().round, 1);
        finish_current(&mut session, &mut driver, &clock, 30);
        assert_eq!(session.recorder().len(), 4);
    }

    #[test]
    fn test_export_failure_keeps_results() {
        let root = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let mut driver = RecordingDriver::default();
        let config = StudyConfig {
            documents_root: root.path().join("unmounted"),
            start_round: 2,
            checkpoint_rounds: true,
        };
        let mut session = StudySession::new("p8", &config, clock.clone()).unwrap();
        session.present(&mut driver).unwrap();
        for _ in 0..2 {
            finish_current(&mut session, &mut driver, &clock, 20);
        }

        assert!(session.is_finished());
        let err = session.export().unwrap_err();
        assert!(matches!(err, TaskError::StorageUnavailable(_)));
        assert_eq!(session.recorder().len(), 2);
    }
}
