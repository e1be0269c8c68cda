use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Final numbers of a replay run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub duration_ms: Option<u64>,
}

/// Replay events for real-time updates
#[derive(Debug, Clone)]
pub enum ReplayEvent {
    RunStarted {
        name: String,
        total: usize,
    },
    StepStarted {
        index: usize,
        description: String,
    },
    StepPassed {
        index: usize,
        duration_ms: u64,
    },
    StepFailed {
        index: usize,
        error: String,
        duration_ms: u64,
    },
    StopRequested {
        index: usize,
    },
    RunFinished {
        name: String,
        summary: ReplaySummary,
    },
}

/// Event emitter for broadcasting replay events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<ReplayEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<ReplayEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: ReplayEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplayEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing replay progress
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<ReplayEvent>) {
        use colored::Colorize;
        use std::io::IsTerminal;

        let interactive = std::io::stdout().is_terminal();
        let mut spinner: Option<ProgressBar> = None;
        let mut step_text = String::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("console listener skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                ReplayEvent::RunStarted { name, total } => {
                    println!(
                        "\n{} Replaying: {} ({} actions)",
                        "▶".green().bold(),
                        name.cyan(),
                        total
                    );
                }

                ReplayEvent::StepStarted { index, description } => {
                    let pb = ProgressBar::new_spinner();
                    if !interactive {
                        // Piped output: no terminal escape codes
                        pb.set_draw_target(ProgressDrawTarget::hidden());
                    }
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    step_text = format!("[{}] {}... ", index + 1, description.dimmed());
                    pb.set_message(step_text.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                ReplayEvent::StepPassed { duration_ms, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("    {} {}({}ms)", "✓".green(), step_text, duration_ms);
                }

                ReplayEvent::StepFailed {
                    error, duration_ms, ..
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("    {} {}({}ms)", "✗".red(), step_text, duration_ms);
                    println!("      {}", error.red());
                }

                ReplayEvent::StopRequested { index } => {
                    if let Some(pb) = &spinner {
                        pb.set_message(format!("{} {}", step_text, "■ stopping".yellow()));
                    } else {
                        println!("    {} stop requested at step {}", "■".yellow(), index + 1);
                    }
                }

                ReplayEvent::RunFinished { name, summary } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let status = if summary.cancelled {
                        "STOPPED".yellow().bold()
                    } else if summary.failed == 0 {
                        "PASSED".green().bold()
                    } else {
                        "FINISHED WITH ERRORS".red().bold()
                    };
                    println!("\n{} Replay {} [{}]", "■".blue().bold(), name, status);
                    println!(
                        "  {} of {} steps run, {} failed",
                        summary.completed.to_string().green(),
                        summary.total,
                        summary.failed.to_string().red()
                    );
                    if let Some(duration) = summary.duration_ms {
                        println!("  Duration: {}ms", duration);
                    }
                }
            }
        }
    }
}
