use super::instances::RunId;
use super::state::{RunStatus, SessionSummary};
use crate::error::ErrorKind;
use tokio::sync::broadcast;

/// Engine events for real-time updates
#[derive(Debug, Clone)]
pub enum EngineEvent {
    // Session events
    SessionStarted {
        session_id: String,
    },
    SessionFinished {
        summary: SessionSummary,
    },

    // Run events
    RunStarted {
        run_id: RunId,
        script: String,
        step_count: usize,
    },
    RunFinished {
        run_id: RunId,
        script: String,
        status: RunStatus,
        duration_ms: Option<u64>,
    },

    // Step events
    StepStarted {
        run_id: RunId,
        index: usize,
        display: String,
    },
    StepPassed {
        run_id: RunId,
        index: usize,
        duration_ms: u64,
    },
    StepFailed {
        run_id: RunId,
        index: usize,
        kind: ErrorKind,
        error: String,
        duration_ms: u64,
        fatal: bool,
    },
    StepSkipped {
        run_id: RunId,
        index: usize,
        reason: String,
    },

    /// A run-scoped instance could not be closed at teardown
    TeardownFailed {
        run_id: RunId,
        name: String,
        error: String,
    },

    Log {
        run_id: RunId,
        step: Option<usize>,
        message: String,
    },
}

impl EngineEvent {
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Self::SessionStarted { .. } | Self::SessionFinished { .. } => None,
            Self::RunStarted { run_id, .. }
            | Self::RunFinished { run_id, .. }
            | Self::StepStarted { run_id, .. }
            | Self::StepPassed { run_id, .. }
            | Self::StepFailed { run_id, .. }
            | Self::StepSkipped { run_id, .. }
            | Self::TeardownFailed { run_id, .. }
            | Self::Log { run_id, .. } => Some(*run_id),
        }
    }
}

/// Event emitter shared by every engine of a session
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<EngineEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    /// Nobody listening is fine
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration as StdDuration;

struct ActiveStep {
    bar: Option<ProgressBar>,
    text: String,
}

/// Console event listener for printing real-time updates.
///
/// Runs of different scripts interleave, so every line is prefixed with the
/// script it belongs to.
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<EngineEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let mut scripts: HashMap<RunId, String> = HashMap::new();
        let mut active: HashMap<RunId, ActiveStep> = HashMap::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::debug!("console listener lagged by {} events", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let label = event
                .run_id()
                .and_then(|id| scripts.get(&id))
                .cloned()
                .unwrap_or_default();

            match event {
                EngineEvent::SessionStarted { session_id } => {
                    multi
                        .println(format!(
                            "\n{} Session started: {}",
                            "▶".green().bold(),
                            session_id.cyan()
                        ))
                        .ok();
                }

                EngineEvent::SessionFinished { summary } => {
                    for step in active.drain().map(|(_, step)| step) {
                        if let Some(pb) = step.bar {
                            pb.finish();
                        }
                    }
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

                    println!("\n{} Session finished", "■".blue().bold());
                    println!(
                        "  Runs: {} ({} completed, {} failed, {} cancelled)",
                        summary.total_runs,
                        summary.completed_runs.to_string().green(),
                        summary.failed_runs.to_string().red(),
                        summary.cancelled_runs.to_string().yellow()
                    );
                    println!(
                        "  Steps: {} passed, {} failed, {} skipped",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.skipped.to_string().yellow()
                    );
                    if let Some(duration) = summary.total_duration_ms {
                        println!("  Duration: {}ms", duration);
                    }
                    break;
                }

                EngineEvent::RunStarted {
                    run_id,
                    script,
                    step_count,
                } => {
                    println!(
                        "\n  {} Script: {} ({} commands)",
                        "→".blue(),
                        script.white().bold(),
                        step_count
                    );
                    scripts.insert(run_id, script);
                }

                EngineEvent::RunFinished {
                    run_id,
                    script,
                    status,
                    duration_ms,
                } => {
                    if let Some(pb) = active.remove(&run_id).and_then(|s| s.bar) {
                        pb.finish();
                    }
                    let status_str = match status {
                        RunStatus::Completed => "COMPLETED".green().bold(),
                        RunStatus::Failed { step } => format!("FAILED at step {}", step).red().bold(),
                        RunStatus::Cancelled => "CANCELLED".yellow().bold(),
                        _ => "UNKNOWN".white().bold(),
                    };
                    println!("  {} Script {} [{}]", "←".blue(), script, status_str);
                    if let Some(duration) = duration_ms {
                        println!("    Duration: {}ms", duration);
                    }
                    scripts.remove(&run_id);
                }

                EngineEvent::StepStarted {
                    run_id,
                    index,
                    display,
                } => {
                    let pb = multi.add(ProgressBar::new_spinner());
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }

                    let text = format!("{} [{}] {}... ", label.dimmed(), index, display);
                    pb.set_message(text.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));

                    active.insert(run_id, ActiveStep { bar: Some(pb), text });
                }

                EngineEvent::StepPassed {
                    run_id, duration_ms, ..
                } => {
                    if let Some(step) = active.remove(&run_id) {
                        if let Some(pb) = step.bar {
                            pb.finish_and_clear();
                        }
                        println!("    {} {}({}ms)", "✓".green(), step.text, duration_ms);
                    }
                }

                EngineEvent::StepFailed {
                    run_id,
                    kind,
                    error,
                    duration_ms,
                    fatal,
                    ..
                } => {
                    if let Some(step) = active.remove(&run_id) {
                        if let Some(pb) = step.bar {
                            pb.finish_and_clear();
                        }
                        let mark = if fatal { "✗".red() } else { "!".yellow() };
                        println!("    {} {}({}ms)", mark, step.text, duration_ms);
                        println!("        {} {}", format!("{}:", kind).red(), error);
                    }
                }

                EngineEvent::StepSkipped {
                    index, reason, ..
                } => {
                    println!(
                        "    {} {} [{}] ({})",
                        "○".yellow(),
                        label.dimmed(),
                        index,
                        reason.dimmed()
                    );
                }

                EngineEvent::TeardownFailed { name, error, .. } => {
                    multi
                        .println(format!(
                            "    {} could not close '{}': {}",
                            "⚠".yellow(),
                            name,
                            error
                        ))
                        .ok();
                }

                EngineEvent::Log { message, .. } => {
                    multi.println(format!("      {}", message)).ok();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emitter_without_listeners_does_not_fail() {
        let emitter = EventEmitter::default();
        emitter.emit(EngineEvent::SessionStarted {
            session_id: "s".to_string(),
        });
    }

    #[tokio::test]
    async fn test_clones_share_one_channel() {
        let (emitter, mut rx) = EventEmitter::new();
        let run_id = RunId::new();
        emitter.clone().emit(EngineEvent::Log {
            run_id,
            step: Some(2),
            message: "hello".to_string(),
        });

        match rx.recv().await.unwrap() {
            EngineEvent::Log { step, message, .. } => {
                assert_eq!(step, Some(2));
                assert_eq!(message, "hello");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_session_events_have_no_run() {
        let event = EngineEvent::SessionStarted {
            session_id: "s".to_string(),
        };
        assert!(event.run_id().is_none());
    }
}
