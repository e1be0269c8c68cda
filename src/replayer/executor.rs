//! Replay executor.
//!
//! A run is a spawned task that walks the action sequence strictly in order.
//! Each step resolves the locator, highlights the first match, dispatches the
//! interaction, holds for the observation delay and restores the styles.
//! Step failures are recorded on the run and never end it; only a stop
//! request does, and only at a step boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::dom::{DomError, KeyStroke, LiveDocument, StyleProperty, TextInputState};
use crate::model::{derive_key_code, is_printable_key, Action, ActionKind};

use super::events::{EventEmitter, ReplayEvent, ReplaySummary};
use super::state::{ReplayProgress, ReplayRun};

pub const DEFAULT_OBSERVATION_DELAY: Duration = Duration::from_millis(800);
pub const DEFAULT_HIGHLIGHT_BACKGROUND: &str = "rgba(255, 255, 0, 0.3)";
pub const DEFAULT_HIGHLIGHT_OUTLINE: &str = "2px solid red";

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("a replay is already running; stop it first")]
    AlreadyRunning,

    #[error("replay task aborted: {0}")]
    Aborted(String),
}

/// Timing and highlight settings for replay
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Hold after each dispatch so an operator can follow along
    pub observation_delay: Duration,
    pub highlight_background: String,
    pub highlight_outline: String,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            observation_delay: DEFAULT_OBSERVATION_DELAY,
            highlight_background: DEFAULT_HIGHLIGHT_BACKGROUND.to_string(),
            highlight_outline: DEFAULT_HIGHLIGHT_OUTLINE.to_string(),
        }
    }
}

/// Drives recorded actions against a live document, one run at a time
pub struct Replayer<D> {
    document: Arc<D>,
    options: ReplayOptions,
    emitter: EventEmitter,
    active: Arc<AtomicBool>,
}

impl<D> Replayer<D>
where
    D: LiveDocument + 'static,
{
    pub fn new(document: Arc<D>, options: ReplayOptions) -> Self {
        Self {
            document,
            options,
            emitter: EventEmitter::default(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ReplayEvent> {
        self.emitter.subscribe()
    }

    pub fn document(&self) -> &Arc<D> {
        &self.document
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start replaying `actions` on a new task.
    ///
    /// Fails with [`ReplayError::AlreadyRunning`] while a previous run has not
    /// finished. Must be called from within a tokio runtime.
    pub fn start(&self, name: &str, actions: Vec<Action>) -> Result<ReplayHandle, ReplayError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ReplayError::AlreadyRunning);
        }
        let guard = ActiveGuard(self.active.clone());

        let run = ReplayRun::new(name, actions);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(run.progress());

        let document = self.document.clone();
        let options = self.options.clone();
        let emitter = self.emitter.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            execute_run(&*document, &options, &emitter, run, cancel_rx, progress_tx).await
        });

        Ok(ReplayHandle {
            cancel: cancel_tx,
            progress: progress_rx,
            task,
        })
    }
}

/// Clears the single-flight flag when the run task ends, however it ends
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owner's handle to a running replay
pub struct ReplayHandle {
    cancel: watch::Sender<bool>,
    progress: watch::Receiver<ReplayProgress>,
    task: JoinHandle<ReplayRun>,
}

impl ReplayHandle {
    /// Request a stop; the in-flight step completes first
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }

    pub fn progress(&self) -> ReplayProgress {
        *self.progress.borrow()
    }

    pub fn watch_progress(&self) -> watch::Receiver<ReplayProgress> {
        self.progress.clone()
    }

    /// Share the stop trigger, e.g. with a Ctrl+C handler
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal(self.cancel.clone())
    }

    /// Wait for the run to end and return its final state
    pub async fn wait(self) -> Result<ReplayRun, ReplayError> {
        self.task
            .await
            .map_err(|e| ReplayError::Aborted(e.to_string()))
    }
}

/// Cloneable stop trigger for a run
#[derive(Clone)]
pub struct StopSignal(watch::Sender<bool>);

impl StopSignal {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

async fn execute_run<D: LiveDocument + ?Sized>(
    document: &D,
    options: &ReplayOptions,
    emitter: &EventEmitter,
    mut run: ReplayRun,
    mut cancel: watch::Receiver<bool>,
    progress: watch::Sender<ReplayProgress>,
) -> ReplayRun {
    run.start();
    progress.send_replace(run.progress());
    emitter.emit(ReplayEvent::RunStarted {
        name: run.name.clone(),
        total: run.total(),
    });
    log::info!("replay '{}' started ({} actions)", run.name, run.total());

    while let Some(action) = run.current_action().cloned() {
        if *cancel.borrow() {
            run.request_stop();
            break;
        }

        let index = run.cursor;
        emitter.emit(ReplayEvent::StepStarted {
            index,
            description: action.describe(),
        });
        let started = Instant::now();

        let outcome = execute_step(document, options, &action, &mut cancel).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => emitter.emit(ReplayEvent::StepPassed { index, duration_ms }),
            Err(message) => {
                log::warn!("step {} failed: {}", index + 1, message);
                run.record_error(message.clone());
                emitter.emit(ReplayEvent::StepFailed {
                    index,
                    error: message,
                    duration_ms,
                });
            }
        }

        // A stop during the final step leaves nothing to skip.
        let steps_left = run.cursor + 1 < run.total();
        if steps_left && *cancel.borrow() {
            run.request_stop();
            emitter.emit(ReplayEvent::StopRequested { index });
        }
        run.advance();
        progress.send_replace(run.progress());
    }

    run.finish();
    progress.send_replace(run.progress());
    log::info!(
        "replay '{}' done: {}/{} steps, {} errors{}",
        run.name,
        run.cursor,
        run.total(),
        run.errors.len(),
        if run.cancelled { " (stopped)" } else { "" }
    );
    emitter.emit(ReplayEvent::RunFinished {
        name: run.name.clone(),
        summary: ReplaySummary {
            total: run.total(),
            completed: run.cursor,
            failed: run.errors.len(),
            cancelled: run.cancelled,
            duration_ms: run.duration_ms,
        },
    });
    run
}

/// One step; the error is the message recorded on the run
async fn execute_step<D: LiveDocument + ?Sized>(
    document: &D,
    options: &ReplayOptions,
    action: &Action,
    cancel: &mut watch::Receiver<bool>,
) -> Result<(), String> {
    let not_found = || format!("element not found: {}", action.target);
    let replay_error = |e: DomError| format!("replay error: {}", e);

    if action.target.is_empty() {
        return Err(not_found());
    }
    let element = document
        .query_selector_all(&action.target)
        .await
        .map_err(replay_error)?
        .into_iter()
        .next()
        .ok_or_else(not_found)?;

    let background = document
        .inline_style(&element, StyleProperty::Background)
        .await
        .map_err(replay_error)?;
    let outline = document
        .inline_style(&element, StyleProperty::Outline)
        .await
        .map_err(replay_error)?;

    let result = async {
        document
            .set_inline_style(&element, StyleProperty::Background, &options.highlight_background)
            .await?;
        document
            .set_inline_style(&element, StyleProperty::Outline, &options.highlight_outline)
            .await?;
        dispatch(document, &element, action).await?;
        observe(options.observation_delay, cancel).await;
        Ok::<(), DomError>(())
    }
    .await;

    // Restore even when dispatch failed after highlighting
    let restored = async {
        document
            .set_inline_style(&element, StyleProperty::Background, &background)
            .await?;
        document
            .set_inline_style(&element, StyleProperty::Outline, &outline)
            .await
    }
    .await;

    result.and(restored).map_err(replay_error)
}

async fn dispatch<D: LiveDocument + ?Sized>(
    document: &D,
    element: &D::Element,
    action: &Action,
) -> Result<(), DomError> {
    match &action.kind {
        ActionKind::Click => document.click(element).await,
        ActionKind::Keydown {
            key,
            key_code,
            code,
        } => {
            let stroke = KeyStroke {
                key: key.clone(),
                key_code: *key_code,
                code: if code.is_empty() {
                    derive_key_code(key)
                } else {
                    code.clone()
                },
            };
            document.dispatch_key_down(element, &stroke).await?;

            if let Some(state) = document.text_input_state(element).await? {
                if let Some(next) = apply_keystroke(&state, key) {
                    document.set_text_input_state(element, &next).await?;
                    document.dispatch_input(element).await?;
                }
            }
            Ok(())
        }
        ActionKind::Scroll { scroll_x, scroll_y } => {
            if document.is_viewport(element).await? {
                document.scroll_window_to(*scroll_x, *scroll_y, true).await
            } else {
                document
                    .set_scroll_offsets(element, *scroll_x, *scroll_y)
                    .await
            }
        }
    }
}

/// Visible effect of a key press on a text field, or `None` for keys without one.
///
/// A printable character is appended and the caret moves to the end.
/// `Backspace` removes the character before the caret (the end when the
/// field reports no caret) and moves the caret back by one.
pub fn apply_keystroke(state: &TextInputState, key: &str) -> Option<TextInputState> {
    if key == "Backspace" {
        let mut chars: Vec<char> = state.value.chars().collect();
        let caret = state.caret.unwrap_or(chars.len()).min(chars.len());
        if caret == 0 {
            return Some(state.clone());
        }
        chars.remove(caret - 1);
        return Some(TextInputState {
            value: chars.into_iter().collect(),
            caret: Some(caret - 1),
        });
    }

    if is_printable_key(key) {
        let value = format!("{}{}", state.value, key);
        let caret = Some(value.chars().count());
        return Some(TextInputState { value, caret });
    }

    None
}

/// Observation delay, cut short by a stop request
async fn observe(delay: Duration, cancel: &mut watch::Receiver<bool>) {
    let stop_requested = async {
        let requested = cancel.wait_for(|stop| *stop).await.is_ok();
        // A dropped handle can no longer stop the run
        if !requested {
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = stop_requested => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{DispatchedEvent, MemoryDocument, NodeId, ScrollOffset};
    use crate::replayer::state::ReplayStatus;

    fn replayer(doc: &Arc<MemoryDocument>) -> Replayer<MemoryDocument> {
        Replayer::new(doc.clone(), ReplayOptions::default())
    }

    fn button(doc: &MemoryDocument, id: &str) -> NodeId {
        let node = doc.append_element(doc.body(), "button");
        doc.set_id(node, id);
        node
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_sequence_finishes() {
        let doc = Arc::new(MemoryDocument::new());
        let run = replayer(&doc).start("empty", vec![]).unwrap().wait().await.unwrap();
        assert_eq!(run.status, ReplayStatus::Done);
        assert_eq!(run.cursor, 0);
        assert!(run.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_steps_processed_in_order() {
        let doc = Arc::new(MemoryDocument::new());
        let a = button(&doc, "a");
        let b = button(&doc, "b");
        let actions = vec![
            Action::click("#a", 1),
            Action::click("#b", 2),
            Action::click("#a", 3),
        ];

        let started = Instant::now();
        let run = replayer(&doc).start("r", actions).unwrap().wait().await.unwrap();
        assert_eq!(run.cursor, 3);
        assert_eq!(run.status, ReplayStatus::Done);
        assert!(!run.cancelled);
        assert_eq!(doc.dispatched(a), vec![DispatchedEvent::Click, DispatchedEvent::Click]);
        assert_eq!(doc.dispatched(b), vec![DispatchedEvent::Click]);
        assert!(started.elapsed() >= DEFAULT_OBSERVATION_DELAY * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_target_is_recorded() {
        let doc = Arc::new(MemoryDocument::new());
        let ok = button(&doc, "ok");
        let actions = vec![Action::click("#missing", 1), Action::click("#ok", 2)];

        let run = replayer(&doc).start("r", actions).unwrap().wait().await.unwrap();
        assert_eq!(run.cursor, 2);
        assert_eq!(run.status, ReplayStatus::Done);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].message, "element not found: #missing");
        assert_eq!(run.errors[0].action.target, "#missing");
        assert_eq!(doc.dispatched(ok), vec![DispatchedEvent::Click]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_observation_delay() {
        let doc = Arc::new(MemoryDocument::new());
        let nodes: Vec<NodeId> = ["one", "two", "three"].iter().map(|id| button(&doc, id)).collect();
        let actions = vec![
            Action::click("#one", 1),
            Action::click("#two", 2),
            Action::click("#three", 3),
        ];

        let replayer = replayer(&doc);
        let handle = replayer.start("r", actions).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.progress().cursor, 0);
        handle.stop();

        let run = handle.wait().await.unwrap();
        assert_eq!(run.cursor, 1);
        assert!(run.cancelled);
        assert_eq!(run.status, ReplayStatus::Done);
        assert_eq!(doc.dispatched(nodes[0]), vec![DispatchedEvent::Click]);
        assert!(doc.dispatched(nodes[1]).is_empty());
        assert!(doc.dispatched(nodes[2]).is_empty());
        assert!(!replayer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_last_step_completes_run() {
        let doc = Arc::new(MemoryDocument::new());
        let only = button(&doc, "only");

        let handle = replayer(&doc)
            .start("r", vec![Action::click("#only", 1)])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop();

        let run = handle.wait().await.unwrap();
        assert_eq!(run.cursor, 1);
        assert!(!run.cancelled);
        assert_eq!(run.status, ReplayStatus::Done);
        assert_eq!(doc.dispatched(only), vec![DispatchedEvent::Click]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight() {
        let doc = Arc::new(MemoryDocument::new());
        button(&doc, "a");
        let replayer = replayer(&doc);

        let handle = replayer.start("first", vec![Action::click("#a", 1)]).unwrap();
        assert!(matches!(
            replayer.start("second", vec![]),
            Err(ReplayError::AlreadyRunning)
        ));
        handle.wait().await.unwrap();
        assert!(replayer.start("third", vec![]).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_highlight_then_restore() {
        let doc = Arc::new(MemoryDocument::new());
        let node = button(&doc, "a");
        doc.set_style(node, StyleProperty::Outline, "1px dotted blue");

        let handle = replayer(&doc).start("r", vec![Action::click("#a", 1)]).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(doc.style(node, StyleProperty::Background), DEFAULT_HIGHLIGHT_BACKGROUND);
        assert_eq!(doc.style(node, StyleProperty::Outline), DEFAULT_HIGHLIGHT_OUTLINE);

        handle.wait().await.unwrap();
        assert_eq!(doc.style(node, StyleProperty::Background), "");
        assert_eq!(doc.style(node, StyleProperty::Outline), "1px dotted blue");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_is_recorded_and_styles_restored() {
        let doc = Arc::new(MemoryDocument::new());
        let broken = button(&doc, "broken");
        let fine = button(&doc, "fine");
        doc.inject_fault(broken, "handler threw");

        let actions = vec![Action::click("#broken", 1), Action::click("#fine", 2)];
        let run = replayer(&doc).start("r", actions).unwrap().wait().await.unwrap();

        assert_eq!(run.cursor, 2);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].message, "replay error: handler threw");
        assert_eq!(doc.style(broken, StyleProperty::Background), "");
        assert_eq!(doc.style(broken, StyleProperty::Outline), "");
        assert_eq!(doc.dispatched(fine), vec![DispatchedEvent::Click]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keydown_emulates_typing() {
        let doc = Arc::new(MemoryDocument::new());
        let input = doc.append_element(doc.body(), "input");
        doc.set_text_input(input, "hello", Some(3));
        let target = "body > input:nth-child(1)";
        let actions = vec![
            Action::keydown(target, "Backspace", 8, "Backspace", 1),
            Action::keydown(target, "!", 49, "", 2),
            Action::keydown(target, "Shift", 16, "ShiftLeft", 3),
        ];

        let run = replayer(&doc).start("r", actions).unwrap().wait().await.unwrap();
        assert!(run.errors.is_empty());
        assert_eq!(doc.value(input), "helo!");
        assert_eq!(doc.caret(input), Some(5));

        let dispatched = doc.dispatched(input);
        assert_eq!(dispatched.len(), 5);
        assert_eq!(dispatched[1], DispatchedEvent::Input);
        match &dispatched[4] {
            DispatchedEvent::KeyDown(stroke) => assert_eq!(stroke.code, "ShiftLeft"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_window_and_element() {
        let doc = Arc::new(MemoryDocument::new());
        let feed = button(&doc, "feed");
        let actions = vec![
            Action::scroll("html", 0.0, 900.0, 1),
            Action::scroll("#feed", 0.0, 120.0, 2),
        ];

        let run = replayer(&doc).start("r", actions).unwrap().wait().await.unwrap();
        assert!(run.errors.is_empty());
        assert_eq!(doc.window_scroll(), ScrollOffset::new(0.0, 900.0));
        assert_eq!(doc.last_window_scroll_smooth(), Some(true));
        assert_eq!(doc.scroll_offsets(feed), ScrollOffset::new(0.0, 120.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_broadcast_in_order() {
        let doc = Arc::new(MemoryDocument::new());
        button(&doc, "a");
        let (emitter, mut events) = EventEmitter::new();
        let replayer = Replayer::new(doc.clone(), ReplayOptions::default()).with_emitter(emitter);

        let actions = vec![Action::click("#a", 1), Action::click("#gone", 2)];
        replayer.start("r", actions).unwrap().wait().await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(match event {
                ReplayEvent::RunStarted { total, .. } => format!("start:{}", total),
                ReplayEvent::StepStarted { index, .. } => format!("step:{}", index),
                ReplayEvent::StepPassed { index, .. } => format!("pass:{}", index),
                ReplayEvent::StepFailed { index, .. } => format!("fail:{}", index),
                ReplayEvent::StopRequested { index } => format!("stop:{}", index),
                ReplayEvent::RunFinished { summary, .. } => {
                    format!("done:{}/{}", summary.completed, summary.failed)
                }
            });
        }
        assert_eq!(
            kinds,
            vec!["start:2", "step:0", "pass:0", "step:1", "fail:1", "done:2/1"]
        );
    }

    #[test]
    fn test_apply_keystroke() {
        let state = |value: &str, caret| TextInputState {
            value: value.to_string(),
            caret,
        };
        assert_eq!(apply_keystroke(&state("ab", Some(2)), "c"), Some(state("abc", Some(3))));
        assert_eq!(apply_keystroke(&state("abc", Some(1)), "Backspace"), Some(state("bc", Some(0))));
        assert_eq!(apply_keystroke(&state("abc", None), "Backspace"), Some(state("ab", Some(2))));
        assert_eq!(apply_keystroke(&state("abc", Some(0)), "Backspace"), Some(state("abc", Some(0))));
        assert_eq!(apply_keystroke(&state("héé", Some(3)), "Backspace"), Some(state("hé", Some(2))));
        assert_eq!(apply_keystroke(&state("abc", Some(1)), "ArrowLeft"), None);
    }
}
