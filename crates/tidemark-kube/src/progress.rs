//! Progress reporting for upgrade runs
//!
//! The executor emits a [`ProgressEvent`] for every step it starts, finishes
//! or fails. Reporters decide how to show them:
//! - **ProgressReporter**: styled lines on stderr
//! - **JsonProgressReporter**: one JSON object per line, for CI
//! - **QuietProgressReporter**: failures and warnings only
//! - **RecordingProgress**: keeps events in memory, for tests

use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use console::style;

/// A unit of work the executor reports on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Locating the installation and its recorded version
    ReadVersion,
    /// Reading the cloud flag and configuration
    ReadState,
    /// Checking source and target versions
    VersionGate,
    /// Asking the operator to go ahead
    Confirm,
    /// Running one resource manager
    Install { manager: String },
    /// Sweeping one managed kind
    Reconcile { kind: String },
}

impl Step {
    /// Short machine-friendly name
    pub fn name(&self) -> &'static str {
        match self {
            Step::ReadVersion => "read-version",
            Step::ReadState => "read-state",
            Step::VersionGate => "version-gate",
            Step::Confirm => "confirm",
            Step::Install { .. } => "install",
            Step::Reconcile { .. } => "reconcile",
        }
    }

    /// Manager name or kind, for per-item steps
    pub fn subject(&self) -> Option<&str> {
        match self {
            Step::Install { manager } => Some(manager.as_str()),
            Step::Reconcile { kind } => Some(kind.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::ReadVersion => write!(f, "Reading installed version"),
            Step::ReadState => write!(f, "Reading installation state"),
            Step::VersionGate => write!(f, "Checking version compatibility"),
            Step::Confirm => write!(f, "Waiting for confirmation"),
            Step::Install { manager } => write!(f, "Upgrading {}", manager),
            Step::Reconcile { kind } => write!(f, "Syncing {}", kind),
        }
    }
}

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    StepStarted { step: Step },
    StepSucceeded { step: Step, detail: Option<String> },
    StepFailed { step: Step, error: String },
    Warning { message: String },
}

impl ProgressEvent {
    /// Status of the step this event reports, if any
    pub fn status(&self) -> Option<StepStatus> {
        match self {
            ProgressEvent::StepStarted { .. } => Some(StepStatus::Running),
            ProgressEvent::StepSucceeded { .. } => Some(StepStatus::Succeeded),
            ProgressEvent::StepFailed { .. } => Some(StepStatus::Failed),
            ProgressEvent::Warning { .. } => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            ProgressEvent::StepStarted { step } => serde_json::json!({
                "type": "step_started",
                "step": step.name(),
                "subject": step.subject(),
            }),
            ProgressEvent::StepSucceeded { step, detail } => serde_json::json!({
                "type": "step_succeeded",
                "step": step.name(),
                "subject": step.subject(),
                "detail": detail,
            }),
            ProgressEvent::StepFailed { step, error } => serde_json::json!({
                "type": "step_failed",
                "step": step.name(),
                "subject": step.subject(),
                "error": error,
            }),
            ProgressEvent::Warning { message } => serde_json::json!({
                "type": "warning",
                "message": message,
            }),
        }
    }
}

/// Status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Running,
    Succeeded,
    Failed,
}

impl StepStatus {
    fn symbol(&self) -> &'static str {
        match self {
            StepStatus::Running => "◐",
            StepStatus::Succeeded => "✓",
            StepStatus::Failed => "✗",
        }
    }

    fn styled_symbol(&self) -> console::StyledObject<&'static str> {
        match self {
            StepStatus::Running => style(self.symbol()).cyan(),
            StepStatus::Succeeded => style(self.symbol()).green(),
            StepStatus::Failed => style(self.symbol()).red(),
        }
    }
}

/// Receives progress events from the executor
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Styled progress on stderr
pub struct ProgressReporter {
    start_time: Instant,
    /// Also print a line when a step starts
    verbose: bool,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            verbose: false,
        }
    }

    /// Create with verbose output
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    fn line(&self, event: &ProgressEvent) -> Option<String> {
        match event {
            ProgressEvent::StepStarted { step } => self.verbose.then(|| {
                format!("  {} {}...", StepStatus::Running.styled_symbol(), step)
            }),
            ProgressEvent::StepSucceeded { step, detail } => {
                let detail = detail
                    .as_ref()
                    .map(|d| format!(" - {}", style(d).dim()))
                    .unwrap_or_default();
                Some(format!(
                    "  {} {}{}",
                    StepStatus::Succeeded.styled_symbol(),
                    step,
                    detail
                ))
            }
            ProgressEvent::StepFailed { step, error } => Some(format!(
                "  {} {} - {}",
                StepStatus::Failed.styled_symbol(),
                step,
                style(error).red()
            )),
            ProgressEvent::Warning { message } => {
                Some(format!("  {} {}", style("⚠").yellow(), message))
            }
        }
    }

    /// Print the closing line of a run
    pub fn print_summary(&self, success: bool) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let _ = writeln!(io::stderr());
        if success {
            let _ = writeln!(
                io::stderr(),
                "{} Upgrade complete ({:.1}s)",
                style("✓").green().bold(),
                elapsed
            );
        } else {
            let _ = writeln!(
                io::stderr(),
                "{} Upgrade stopped ({:.1}s)",
                style("✗").red().bold(),
                elapsed
            );
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressReporter {
    fn emit(&self, event: &ProgressEvent) {
        if let Some(line) = self.line(event) {
            let _ = writeln!(io::stderr(), "{}", line);
        }
    }
}

/// Progress reporter that only shows failures and warnings
pub struct QuietProgressReporter;

impl QuietProgressReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for QuietProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for QuietProgressReporter {
    fn emit(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StepFailed { step, error } => eprintln!("Error: {}: {}", step, error),
            ProgressEvent::Warning { message } => eprintln!("Warning: {}", message),
            _ => {}
        }
    }
}

/// JSON-lines progress reporter for CI/CD integration
pub struct JsonProgressReporter<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
}

impl JsonProgressReporter<io::Stdout> {
    /// Write events to stdout
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for JsonProgressReporter<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> JsonProgressReporter<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ProgressSink for JsonProgressReporter<W> {
    fn emit(&self, event: &ProgressEvent) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{}", event.to_json());
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in order
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Steps that failed
    pub fn failed_steps(&self) -> Vec<Step> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::StepFailed { step, .. } => Some(step),
                _ => None,
            })
            .collect()
    }

    /// Warning messages
    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Warning { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install(manager: &str) -> Step {
        Step::Install {
            manager: manager.to_string(),
        }
    }

    #[test]
    fn test_step_status_symbols() {
        assert_eq!(StepStatus::Running.symbol(), "◐");
        assert_eq!(StepStatus::Succeeded.symbol(), "✓");
        assert_eq!(StepStatus::Failed.symbol(), "✗");
    }

    #[test]
    fn test_step_display() {
        assert_eq!(install("rbac").to_string(), "Upgrading rbac");
        let reconcile = Step::Reconcile {
            kind: "deployments.apps".to_string(),
        };
        assert_eq!(reconcile.to_string(), "Syncing deployments.apps");
        assert_eq!(reconcile.subject(), Some("deployments.apps"));
        assert_eq!(Step::Confirm.subject(), None);
    }

    #[test]
    fn test_started_lines_only_when_verbose() {
        let started = ProgressEvent::StepStarted {
            step: install("rbac"),
        };
        assert!(ProgressReporter::new().line(&started).is_none());
        assert!(ProgressReporter::new().verbose().line(&started).is_some());

        let failed = ProgressEvent::StepFailed {
            step: install("rbac"),
            error: "forbidden".to_string(),
        };
        let line = ProgressReporter::new().line(&failed).unwrap();
        assert!(line.contains("Upgrading rbac"));
        assert!(line.contains("forbidden"));
    }

    #[test]
    fn test_json_lines() {
        let reporter = JsonProgressReporter::with_writer(Vec::new());
        reporter.emit(&ProgressEvent::StepStarted {
            step: install("config"),
        });
        reporter.emit(&ProgressEvent::Warning {
            message: "downgrade".to_string(),
        });

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "step_started");
        assert_eq!(lines[0]["step"], "install");
        assert_eq!(lines[0]["subject"], "config");
        assert_eq!(lines[1]["type"], "warning");
    }

    #[test]
    fn test_recording_progress() {
        let recording = RecordingProgress::new();
        recording.emit(&ProgressEvent::StepFailed {
            step: install("scheduler"),
            error: "boom".to_string(),
        });
        recording.emit(&ProgressEvent::Warning {
            message: "careful".to_string(),
        });

        assert_eq!(recording.events().len(), 2);
        assert_eq!(recording.failed_steps(), vec![install("scheduler")]);
        assert_eq!(recording.warnings(), vec!["careful"]);
        assert_eq!(recording.events()[0].status(), Some(StepStatus::Failed));
    }
}
