use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::model::Action;
use crate::replayer::{ReplayRun, StepError};

/// Outcome of one replayed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Passed,
    Failed,
    /// Not reached because the run was stopped
    Skipped,
}

/// Replay results for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResults {
    pub recording_id: Option<String>,
    pub recording_name: String,
    pub total: usize,
    pub cursor: usize,
    pub cancelled: bool,
    pub actions: Vec<Action>,
    pub errors: Vec<StepError>,
    pub duration_ms: Option<u64>,
    pub generated_at: String,
}

impl ReplayResults {
    pub fn from_run(run: &ReplayRun, recording_id: Option<&str>) -> Self {
        Self {
            recording_id: recording_id.map(str::to_string),
            recording_name: run.name.clone(),
            total: run.total(),
            cursor: run.cursor,
            cancelled: run.cancelled,
            actions: run.actions.clone(),
            errors: run.errors.clone(),
            duration_ms: run.duration_ms,
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn outcome(&self, index: usize) -> StepOutcome {
        if self.errors.iter().any(|e| e.index == index) {
            StepOutcome::Failed
        } else if index >= self.cursor {
            StepOutcome::Skipped
        } else {
            StepOutcome::Passed
        }
    }

    pub fn error_for(&self, index: usize) -> Option<&StepError> {
        self.errors.iter().find(|e| e.index == index)
    }

    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn skipped(&self) -> usize {
        self.total.saturating_sub(self.cursor)
    }
}
