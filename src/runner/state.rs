use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::instances::{CloseFailure, RunId};
use crate::error::ErrorKind;

/// Engine state over a script's command sequence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunStatus {
    Pending,
    Running { step: usize },
    Completed,
    Failed { step: usize },
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed { .. } | RunStatus::Cancelled
        )
    }
}

/// Outcome of one script step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Ok,
    Failed { kind: ErrorKind, error: String },
    Skipped { reason: String },
}

/// State for a single step execution
#[derive(Debug, Clone)]
pub struct StepState {
    pub index: usize,
    pub command_name: String,
    pub command_display: String,
    pub status: StepStatus,
    pub started_at: Option<Instant>,
    pub duration_ms: Option<u64>,
}

impl StepState {
    pub fn new(index: usize, name: &str, display: &str) -> Self {
        Self {
            index,
            command_name: name.to_string(),
            command_display: display.to_string(),
            status: StepStatus::Pending,
            started_at: None,
            duration_ms: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn pass(&mut self) {
        self.finish(StepStatus::Ok);
    }

    pub fn fail(&mut self, kind: ErrorKind, error: String) {
        self.finish(StepStatus::Failed { kind, error });
    }

    pub fn skip(&mut self, reason: &str) {
        self.status = StepStatus::Skipped {
            reason: reason.to_string(),
        };
    }

    fn finish(&mut self, status: StepStatus) {
        self.status = status;
        if let Some(start) = self.started_at {
            self.duration_ms = Some(start.elapsed().as_millis() as u64);
        }
    }

    pub fn to_report(&self) -> StepReport {
        StepReport {
            index: self.index,
            command_name: self.command_name.clone(),
            command_display: self.command_display.clone(),
            status: self.status.clone(),
            duration_ms: self.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub index: usize,
    pub command_name: String,
    pub command_display: String,
    pub status: StepStatus,
    pub duration_ms: Option<u64>,
}

/// State for one run of a script
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: RunId,
    pub script_name: String,
    pub script_path: Option<String>,
    pub status: RunStatus,
    pub steps: Vec<StepState>,
    pub started_at: Option<Instant>,
    pub total_duration_ms: Option<u64>,
    pub teardown_failures: Vec<CloseFailure>,
}

impl RunState {
    pub fn new(run_id: RunId, name: &str, path: Option<String>, steps: Vec<StepState>) -> Self {
        Self {
            run_id,
            script_name: name.to_string(),
            script_path: path,
            status: RunStatus::Pending,
            steps,
            started_at: None,
            total_duration_ms: None,
            teardown_failures: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Mark every step from `from` on that has not run as skipped
    pub fn skip_remaining(&mut self, from: usize, reason: &str) {
        for step in self.steps.iter_mut().skip(from) {
            if matches!(step.status, StepStatus::Pending) {
                step.skip(reason);
            }
        }
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        if let Some(start) = self.started_at {
            self.total_duration_ms = Some(start.elapsed().as_millis() as u64);
        }
    }

    pub fn to_report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id,
            script_name: self.script_name.clone(),
            script_path: self.script_path.clone(),
            status: self.status,
            steps: self.steps.iter().map(|s| s.to_report()).collect(),
            total_duration_ms: self.total_duration_ms,
            teardown_failures: self.teardown_failures.clone(),
        }
    }
}

/// What a finished run hands back to its caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: RunId,
    pub script_name: String,
    pub script_path: Option<String>,
    pub status: RunStatus,
    pub steps: Vec<StepReport>,
    pub total_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown_failures: Vec<CloseFailure>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Steps that failed, fatal or not
    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed { .. }))
    }

    /// (ok, failed, skipped)
    pub fn counts(&self) -> (u32, u32, u32) {
        self.steps.iter().fold((0, 0, 0), |(o, f, s), step| match step.status {
            StepStatus::Ok => (o + 1, f, s),
            StepStatus::Failed { .. } => (o, f + 1, s),
            StepStatus::Skipped { .. } => (o, f, s + 1),
            StepStatus::Pending => (o, f, s),
        })
    }

    /// Steps in the order they were executed (ok or failed)
    pub fn executed_steps(&self) -> Vec<usize> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Ok | StepStatus::Failed { .. }))
            .map(|s| s.index)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub total_runs: u32,
    pub completed_runs: u32,
    pub failed_runs: u32,
    pub cancelled_runs: u32,
    pub total_steps: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total_duration_ms: Option<u64>,
}

impl SessionSummary {
    pub fn from_reports(session_id: &str, runs: &[RunReport], total_duration_ms: Option<u64>) -> Self {
        let mut summary = SessionSummary {
            session_id: session_id.to_string(),
            total_runs: runs.len() as u32,
            completed_runs: 0,
            failed_runs: 0,
            cancelled_runs: 0,
            total_steps: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            total_duration_ms,
        };

        for run in runs {
            match run.status {
                RunStatus::Completed => summary.completed_runs += 1,
                RunStatus::Failed { .. } => summary.failed_runs += 1,
                RunStatus::Cancelled => summary.cancelled_runs += 1,
                RunStatus::Pending | RunStatus::Running { .. } => {}
            }
            let (ok, failed, skipped) = run.counts();
            summary.total_steps += run.steps.len() as u32;
            summary.passed += ok;
            summary.failed += failed;
            summary.skipped += skipped;
        }
        summary
    }

    pub fn all_completed(&self) -> bool {
        self.completed_runs == self.total_runs
    }
}
