//! tasktimer - terminal host for HCI task studies
//!
//! Commands:
//! - run: walk a participant through the study rounds and export the results
//! - rounds: print the round table
//! - validate: check a results file
//! - doctor: diagnose storage and configuration

use clap::{Parser, Subcommand};
use std::fs;
use std::collections::VecDeque;
use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use chrono::Utc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use hci_task_timer::config::StudyConfig;
use hci_task_timer::controls::{Control, ControlState, TimerFired, TimerRequest};
use hci_task_timer::recorder::SessionRecorder;
use hci_task_timer::rounds::{expected_task_count, ROUNDS, ROUND_COUNT};
use hci_task_timer::session::{
    Clock, DriverEvent, MonotonicClock, RoundSummary, StudySession, TaskDriver, TaskPhase,
};
use hci_task_timer::storage::ResultStore;
use hci_task_timer::types::{CompletionStatus, SessionDocument, TaskPrompt, TaskResult};
use hci_task_timer::{TaskError, VERSION};

/// tasktimer - timed usability tasks for HCI studies
#[derive(Parser)]
#[command(name = "tasktimer")]
#[command(author = "UNR HCI Lab")]
#[command(version = VERSION)]
#[command(about = "Run timed usability tasks and record results", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a study session in the terminal
    Run {
        /// Participant identifier (a random id is generated when omitted)
        #[arg(short, long)]
        participant: Option<String>,

        /// Documents root holding HCI-Task-Results/ (overrides HCI_TASK_DOCUMENTS_ROOT)
        #[arg(long)]
        documents_root: Option<PathBuf>,

        /// Round to start at (overrides HCI_TASK_START_ROUND)
        #[arg(long)]
        start_round: Option<usize>,

        /// Export after every round as well as at the end
        #[arg(long)]
        checkpoint_rounds: bool,

        /// Wait for Enter before timing each task
        #[arg(long)]
        manual_start: bool,
    },

    /// Print the round table
    Rounds {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a results file
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose storage and configuration
    Doctor {
        /// Documents root to check (overrides HCI_TASK_DOCUMENTS_ROOT)
        #[arg(long)]
        documents_root: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    match cli.command {
        Commands::Run {
            participant,
            documents_root,
            start_round,
            checkpoint_rounds,
            manual_start,
        } => {
            let mut config = StudyConfig::from_env();
            if let Some(root) = documents_root {
                config.documents_root = root;
            }
            if let Some(round) = start_round {
                config.start_round = round;
            }
            config.checkpoint_rounds |= checkpoint_rounds;
            let participant = participant.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
            cmd_run(participant, &config, manual_start)
        }
        Commands::Rounds { json } => cmd_rounds(json),
        Commands::Validate { input, json } => cmd_validate(&input, json),
        Commands::Doctor {
            documents_root,
            json,
        } => {
            let mut config = StudyConfig::from_env();
            if let Some(root) = documents_root {
                config.documents_root = root;
            }
            cmd_doctor(&config, json)
        }
    }
}

// Interactive session

enum LoopEvent {
    Line(String),
    Timer(TimerFired),
    InputClosed,
}

/// Terminal implementation of the host UI
struct TerminalDriver {
    tx: Sender<LoopEvent>,
    interactive: bool,
}

impl TaskDriver for TerminalDriver {
    fn show_prompt(&mut self, prompt: &TaskPrompt) {
        let count = expected_task_count(prompt.round).unwrap_or(0);
        println!();
        println!(
            "[{} - task {}/{}] {}",
            ROUNDS[prompt.round].name,
            prompt.index + 1,
            count,
            prompt.text
        );
        println!("  screenshot: {}", prompt.screenshot);
    }

    fn schedule_timer(&mut self, request: TimerRequest) {
        let tx = self.tx.clone();
        thread::spawn(move || {
            thread::sleep(request.delay);
            // The receiver is gone once the session has ended
            let _ = tx.send(LoopEvent::Timer(request.fired()));
        });
    }

    fn control_changed(&mut self, control: Control, state: ControlState) {
        if !self.interactive {
            return;
        }
        if state.enabled {
            let key = match control {
                Control::Finish => "f",
                Control::GiveUp => "g",
            };
            println!("  {} is now available (type {key} + Enter)", control.label());
        }
    }

    fn task_ended(&mut self, _prompt: &TaskPrompt, result: &TaskResult) {
        let verb = match result.status {
            CompletionStatus::Complete => "Finished",
            CompletionStatus::GiveUp => "Gave up",
        };
        println!("  {verb} after {:.1} s", result.duration_millis as f64 / 1000.0);
    }

    fn round_finished(&mut self, summary: RoundSummary) {
        println!();
        println!("{}", summary.message);
        match summary.checkpoint {
            Some(Ok(path)) => println!("  (saved {})", path.display()),
            Some(Err(e)) => eprintln!("  checkpoint failed: {e}"),
            None => {}
        }
        println!("Press Enter to begin {}.", ROUNDS[summary.next_round].name);
    }

    fn session_finished(&mut self, recorder: &SessionRecorder) {
        println!();
        println!("Thank you! {} tasks recorded.", recorder.len());
    }
}

fn spawn_stdin_reader(tx: Sender<LoopEvent>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(LoopEvent::Line(line)).is_err() {
                        return;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = tx.send(LoopEvent::InputClosed);
    });
}

enum Command {
    Event(DriverEvent),
    Quit,
}

/// Input that arrived while a control was still disabled.
///
/// Piped input is read ahead of the timers, so its presses are held here and
/// replayed in order once the control they need is enabled.
#[derive(Debug, Default)]
struct DeferredInput {
    events: VecDeque<DriverEvent>,
}

impl DeferredInput {
    fn push(&mut self, event: DriverEvent) {
        self.events.push_back(event);
    }

    fn push_front(&mut self, event: DriverEvent) {
        self.events.push_front(event);
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Next held event, unless it presses a control that `can_press` rejects
    fn next_ready(&mut self, can_press: impl Fn(Control) -> bool) -> Option<DriverEvent> {
        let ready = match self.events.front()? {
            DriverEvent::Finish => can_press(Control::Finish),
            DriverEvent::GiveUp => can_press(Control::GiveUp),
            _ => true,
        };
        if ready {
            self.events.pop_front()
        } else {
            None
        }
    }
}

fn parse_command(line: &str, phase: TaskPhase) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "f" | "finish" | "finished" => Some(Command::Event(DriverEvent::Finish)),
        "g" | "give up" | "giveup" => Some(Command::Event(DriverEvent::GiveUp)),
        "s" | "start" => Some(Command::Event(DriverEvent::Start)),
        "n" | "next" => Some(Command::Event(DriverEvent::NextRound)),
        "q" | "quit" => Some(Command::Quit),
        "" => match phase {
            TaskPhase::RoundDone => Some(Command::Event(DriverEvent::NextRound)),
            TaskPhase::AwaitingStart => Some(Command::Event(DriverEvent::Start)),
            _ => None,
        },
        _ => None,
    }
}

fn cmd_run(participant: String, config: &StudyConfig, manual_start: bool) -> Result<(), CliFailure> {
    let interactive = atty::is(atty::Stream::Stdin);
    let (tx, rx) = mpsc::channel();
    spawn_stdin_reader(tx.clone());

    let mut driver = TerminalDriver { tx, interactive };
    let mut session = StudySession::new(participant, config, MonotonicClock::new())?
        .with_auto_start(!manual_start);

    if interactive {
        println!("Participant {}", session.recorder().participant_id());
        println!("Commands: f = finished, g = give up, n = next round, Enter = continue, q = quit");
    }
    session.present(&mut driver)?;

    let mut deferred = DeferredInput::default();
    let mut input_closed = false;

    while !session.is_finished() {
        let waiting = session.phase() == TaskPhase::InProgress;
        if let Some(event) = deferred.next_ready(|c| !waiting || session.controls().is_enabled(c)) {
            if let Err(e) = session.handle(event, &mut driver) {
                match e {
                    TaskError::ControlDisabled { .. } => deferred.push_front(event),
                    TaskError::InvalidTransition { .. } => {
                        debug!(error = %e, "Dropped queued input");
                    }
                    e => return Err(e.into()),
                }
            }
            continue;
        }
        if input_closed && deferred.is_empty() {
            return Err(CliFailure::Aborted(session.recorder().len()));
        }

        let event = match rx.recv() {
            Ok(LoopEvent::Timer(fired)) => DriverEvent::Timer(fired),
            Ok(LoopEvent::Line(line)) => match parse_command(&line, session.phase()) {
                Some(Command::Event(event)) if !interactive && !deferred.is_empty() => {
                    deferred.push(event);
                    continue;
                }
                Some(Command::Event(event)) => event,
                Some(Command::Quit) => return Err(CliFailure::Aborted(session.recorder().len())),
                None => {
                    if interactive {
                        println!("  unrecognized input {:?}", line.trim());
                    }
                    continue;
                }
            },
            Ok(LoopEvent::InputClosed) => {
                input_closed = true;
                continue;
            }
            Err(_) => return Err(CliFailure::Aborted(session.recorder().len())),
        };

        match session.handle(event, &mut driver) {
            Ok(()) => {}
            Err(TaskError::ControlDisabled { .. }) if !interactive => deferred.push(event),
            Err(e @ (TaskError::ControlDisabled { .. } | TaskError::InvalidTransition { .. })) => {
                debug!(error = %e, "Ignored participant input");
                println!("  {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }

    export_with_retry(&session, &rx)
}

fn export_with_retry<C: Clock>(
    session: &StudySession<C>,
    rx: &Receiver<LoopEvent>,
) -> Result<(), CliFailure> {
    loop {
        match session.export() {
            Ok(path) => {
                println!("Results written to {}", path.display());
                return Ok(());
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Export failed");
                eprintln!("Could not save results: {e}");
                println!("Type r + Enter to retry, q + Enter to give up.");
                loop {
                    match rx.recv() {
                        Ok(LoopEvent::Line(line)) => match line.trim() {
                            "r" => break,
                            "q" => return Err(e.into()),
                            _ => continue,
                        },
                        Ok(LoopEvent::Timer(_)) => continue,
                        Ok(LoopEvent::InputClosed) | Err(_) => return Err(e.into()),
                    }
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

// Round table

fn cmd_rounds(json: bool) -> Result<(), CliFailure> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ROUNDS)?);
        return Ok(());
    }

    for round in &ROUNDS {
        println!("Round {} ({}), {} tasks", round.round_index, round.name, round.task_count());
        for (i, (text, shot)) in round.prompts.iter().zip(round.screenshot_refs).enumerate() {
            println!("  {}. {} [{}]", i + 1, text, shot);
        }
    }
    Ok(())
}

// Validation

fn read_input(path: &std::path::Path) -> Result<String, CliFailure> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn cmd_validate(input: &std::path::Path, json: bool) -> Result<(), CliFailure> {
    let content = read_input(input)?;
    let full_session = full_session_len();
    let report = validation_report(&content);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.valid {
        println!(
            "Valid: {} timings ({} complete, {} given up), {} ms total",
            report.timings, report.complete, report.give_up, report.total_duration_millis
        );
        if !report.full_session {
            println!("  note: a full session has {full_session} timings");
        }
    } else if let Some(error) = &report.error {
        println!("Invalid: {error}");
    }

    if report.valid {
        Ok(())
    } else {
        Err(CliFailure::ValidationFailed(report.error.unwrap_or_default()))
    }
}

fn full_session_len() -> usize {
    (0..ROUND_COUNT).filter_map(expected_task_count).sum()
}

fn validation_report(content: &str) -> ValidationReport {
    match SessionDocument::from_json(content) {
        Ok(doc) => ValidationReport {
            valid: true,
            timings: doc.len(),
            complete: doc.count_status(CompletionStatus::Complete),
            give_up: doc.count_status(CompletionStatus::GiveUp),
            total_duration_millis: doc.total_duration_millis(),
            full_session: doc.len() == full_session_len(),
            error: None,
        },
        Err(e) => ValidationReport {
            valid: false,
            timings: 0,
            complete: 0,
            give_up: 0,
            total_duration_millis: 0,
            full_session: false,
            error: Some(e.to_string()),
        },
    }
}

// Doctor

fn cmd_doctor(config: &StudyConfig, json: bool) -> Result<(), CliFailure> {
    let store = config.result_store();
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("tasktimer {VERSION}"),
    });

    let round_table_ok = ROUNDS.iter().all(|r| {
        Some(r.prompts.len()) == expected_task_count(r.round_index)
            && r.prompts.len() == r.screenshot_refs.len()
    });
    checks.push(DoctorCheck {
        name: "round_table".to_string(),
        status: if round_table_ok { CheckStatus::Ok } else { CheckStatus::Error },
        message: format!("{ROUND_COUNT} rounds, starting at round {}", config.start_round),
    });

    checks.push(storage_check(&store));

    let results_dir = store.results_dir();
    checks.push(if results_dir.is_dir() {
        let files = fs::read_dir(&results_dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count()
            })
            .unwrap_or(0);
        DoctorCheck {
            name: "results_dir".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} ({files} results files)", results_dir.display()),
        }
    } else {
        DoctorCheck {
            name: "results_dir".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} will be created on first export", results_dir.display()),
        }
    });

    let failed = checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    let report = DoctorReport {
        version: VERSION.to_string(),
        checked_at: Utc::now().to_rfc3339(),
        checkpoint_rounds: config.checkpoint_rounds,
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("tasktimer doctor ({})", report.checked_at);
        for check in &report.checks {
            let marker = match check.status {
                CheckStatus::Ok => "ok",
                CheckStatus::Warning => "warn",
                CheckStatus::Error => "error",
            };
            println!("  [{marker}] {}: {}", check.name, check.message);
        }
    }

    if failed {
        Err(CliFailure::DoctorFailed)
    } else {
        Ok(())
    }
}

fn storage_check(store: &ResultStore) -> DoctorCheck {
    if store.is_available() {
        DoctorCheck {
            name: "storage".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} is available", store.documents_root().display()),
        }
    } else {
        DoctorCheck {
            name: "storage".to_string(),
            status: CheckStatus::Error,
            message: format!("{} is not mounted or not a directory", store.documents_root().display()),
        }
    }
}

// Error types

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Task(TaskError),
    Json(serde_json::Error),
    ValidationFailed(String),
    DoctorFailed,
    Aborted(usize),
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<TaskError> for CliFailure {
    fn from(e: TaskError) -> Self {
        CliFailure::Task(e)
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Task(e @ TaskError::StorageUnavailable(_)) => CliError {
                code: "STORAGE_UNAVAILABLE".to_string(),
                message: e.to_string(),
                hint: Some("Mount the storage or pass --documents-root".to_string()),
            },
            CliFailure::Task(e @ TaskError::Write { .. }) => CliError {
                code: "WRITE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check that the results directory is writable".to_string()),
            },
            CliFailure::Task(e) => CliError {
                code: "TASK_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CliFailure::ValidationFailed(msg) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: msg,
                hint: Some("Results files look like {\"quantitative\":{\"timings\":[...]},\"qualitative\":{}}".to_string()),
            },
            CliFailure::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            CliFailure::Aborted(recorded) => CliError {
                code: "ABORTED".to_string(),
                message: format!("Session ended before the last task ({recorded} results discarded)"),
                hint: None,
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    valid: bool,
    timings: usize,
    complete: usize,
    give_up: usize,
    total_duration_millis: u64,
    full_session: bool,
    error: Option<String>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checked_at: String,
    checkpoint_rounds: bool,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validation_report_total_saturates() {
        let content = format!(
            r#"{{"quantitative":{{"timings":[{{"durationMillis":{},"status":"COMPLETE"}},{{"durationMillis":1,"status":"GIVE_UP"}}]}},"qualitative":{{}}}}"#,
            u64::MAX
        );
        let report = validation_report(&content);
        assert!(report.valid);
        assert_eq!(report.timings, 2);
        assert_eq!(report.complete, 1);
        assert_eq!(report.give_up, 1);
        assert_eq!(report.total_duration_millis, u64::MAX);
        assert!(!report.full_session);
    }

    #[test]
    fn test_validation_report_invalid_json() {
        let report = validation_report("{\"quantitative\":");
        assert!(!report.valid);
        assert!(report.error.is_some());
    }

    #[test]
    fn test_deferred_press_waits_for_its_control() {
        let mut deferred = DeferredInput::default();
        deferred.push(DriverEvent::Finish);
        deferred.push(DriverEvent::Start);

        assert_eq!(deferred.next_ready(|_| false), None);
        assert_eq!(
            deferred.next_ready(|c| c == Control::Finish),
            Some(DriverEvent::Finish)
        );
        assert_eq!(deferred.next_ready(|_| false), Some(DriverEvent::Start));
        assert!(deferred.is_empty());
    }

    #[test]
    fn test_deferred_presses_keep_order() {
        let mut deferred = DeferredInput::default();
        deferred.push(DriverEvent::GiveUp);
        deferred.push(DriverEvent::Finish);

        // Finish is enabled first but the earlier give-up press still holds the queue
        assert_eq!(deferred.next_ready(|c| c == Control::Finish), None);
        assert_eq!(deferred.next_ready(|_| true), Some(DriverEvent::GiveUp));
        assert_eq!(deferred.next_ready(|_| true), Some(DriverEvent::Finish));
        assert_eq!(deferred.next_ready(|_| true), None);
    }
}
