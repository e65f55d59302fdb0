use crate::runner::state::{RunReport, SessionSummary};
use serde::{Deserialize, Serialize};

/// Session results for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResults {
    pub session_id: String,
    pub runs: Vec<RunReport>,
    pub summary: SessionSummary,
    pub generated_at: String,
}

impl SessionResults {
    pub fn new(session_id: &str, runs: Vec<RunReport>, total_duration_ms: Option<u64>) -> Self {
        let summary = SessionSummary::from_reports(session_id, &runs, total_duration_ms);
        Self {
            session_id: session_id.to_string(),
            runs,
            summary,
            generated_at: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }
}
