use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::model::Action;

/// Lifecycle of a replay run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayStatus {
    Idle,
    Running,
    /// Stop requested; the in-flight step still completes
    Stopping,
    Done,
}

impl ReplayStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplayStatus::Done)
    }
}

/// A failed step, kept with the action that caused it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepError {
    pub index: usize,
    pub message: String,
    pub action: Action,
}

/// Snapshot published while a run progresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayProgress {
    pub cursor: usize,
    pub total: usize,
    pub error_count: usize,
    pub status: ReplayStatus,
}

/// Transient state of one replay run.
///
/// `cursor` only grows and `errors` is append-only; both are frozen once the
/// run is done.
#[derive(Debug, Clone)]
pub struct ReplayRun {
    pub name: String,
    pub actions: Vec<Action>,
    pub cursor: usize,
    pub errors: Vec<StepError>,
    pub cancelled: bool,
    pub status: ReplayStatus,
    pub started_at: Option<Instant>,
    pub duration_ms: Option<u64>,
}

impl ReplayRun {
    pub fn new(name: &str, actions: Vec<Action>) -> Self {
        Self {
            name: name.to_string(),
            actions,
            cursor: 0,
            errors: Vec::new(),
            cancelled: false,
            status: ReplayStatus::Idle,
            started_at: None,
            duration_ms: None,
        }
    }

    pub fn start(&mut self) {
        self.status = ReplayStatus::Running;
        self.started_at = Some(Instant::now());
    }

    pub fn current_action(&self) -> Option<&Action> {
        if self.status.is_terminal() {
            return None;
        }
        self.actions.get(self.cursor)
    }

    pub fn record_error(&mut self, message: String) {
        if self.status.is_terminal() {
            return;
        }
        if let Some(action) = self.actions.get(self.cursor) {
            self.errors.push(StepError {
                index: self.cursor,
                message,
                action: action.clone(),
            });
        }
    }

    /// Move past the current step; returns whether another step remains
    pub fn advance(&mut self) -> bool {
        if !self.status.is_terminal() && self.cursor < self.actions.len() {
            self.cursor += 1;
        }
        self.cursor < self.actions.len()
    }

    /// One-way: once set, the flag stays set
    pub fn request_stop(&mut self) {
        self.cancelled = true;
        if self.status == ReplayStatus::Running {
            self.status = ReplayStatus::Stopping;
        }
    }

    pub fn finish(&mut self) {
        self.status = ReplayStatus::Done;
        if let Some(start) = self.started_at {
            self.duration_ms = Some(start.elapsed().as_millis() as u64);
        }
    }

    pub fn total(&self) -> usize {
        self.actions.len()
    }

    pub fn progress(&self) -> ReplayProgress {
        ReplayProgress {
            cursor: self.cursor,
            total: self.actions.len(),
            error_count: self.errors.len(),
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_and_errors_freeze_when_done() {
        let mut run = ReplayRun::new("r", vec![Action::click("#a", 1), Action::click("#b", 2)]);
        run.start();
        run.record_error("element not found: #a".to_string());
        assert!(run.advance());
        assert!(!run.advance());
        run.finish();

        assert!(!run.advance());
        run.record_error("late".to_string());
        assert_eq!(run.cursor, 2);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].index, 0);
        assert_eq!(run.errors[0].action.target, "#a");
        assert!(run.current_action().is_none());
    }

    #[test]
    fn test_stop_is_one_way() {
        let mut run = ReplayRun::new("r", vec![Action::click("#a", 1)]);
        run.start();
        run.request_stop();
        assert_eq!(run.status, ReplayStatus::Stopping);
        run.finish();
        assert!(run.cancelled);
        assert_eq!(
            run.progress(),
            ReplayProgress {
                cursor: 0,
                total: 1,
                error_count: 0,
                status: ReplayStatus::Done
            }
        );
    }
}
