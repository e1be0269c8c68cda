//! Event recorder: normalizes captured document events into actions.
//!
//! Capture hosts push raw [`CapturedEvent`]s into a channel while the recorder
//! is attached. The recorder turns them into [`Action`]s in arrival order;
//! scroll bursts are held back until their target has been quiet for the
//! configured window.

use chrono::{Local, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::dom::{CaptureHost, CaptureKind, CapturedEvent, DomError};
use crate::locator::LocatorGenerator;
use crate::model::{default_recording_name, Action, Recording};
use crate::store::{RecordingStore, StoreError};

use super::scroll::{ScrollCoalescer, SettledScroll};

/// Pointer id the engine's own UI controls put on synthetic clicks
pub const SYNTHETIC_POINTER_ID: i64 = -1;

/// Default quiet window for scroll coalescing
pub const DEFAULT_SCROLL_QUIET_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("recording is still in progress; stop it before saving")]
    StillRecording,

    #[error("capture failed: {0}")]
    Capture(#[from] DomError),

    #[error("failed to save recording: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Source of capture timestamps, epoch milliseconds
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Captures interactions into an action buffer
pub struct EventRecorder {
    generator: LocatorGenerator,
    state: RecorderState,
    buffer: Vec<Action>,
    pending_name: Option<String>,
    events: Option<mpsc::UnboundedReceiver<CapturedEvent>>,
    scrolls: ScrollCoalescer,
    clock: Clock,
    last_timestamp: i64,
}

impl fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecorder")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("pending_name", &self.pending_name)
            .finish()
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new(LocatorGenerator::default(), DEFAULT_SCROLL_QUIET_WINDOW)
    }
}

impl EventRecorder {
    pub fn new(generator: LocatorGenerator, scroll_quiet_window: Duration) -> Self {
        Self {
            generator,
            state: RecorderState::Idle,
            buffer: Vec::new(),
            pending_name: None,
            events: None,
            scrolls: ScrollCoalescer::new(scroll_quiet_window),
            clock: Arc::new(|| Utc::now().timestamp_millis()),
            last_timestamp: 0,
        }
    }

    /// Replace the wall clock used for action timestamps
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// Actions captured so far, in capture order
    pub fn actions(&self) -> &[Action] {
        &self.buffer
    }

    pub fn pending_name(&self) -> Option<&str> {
        self.pending_name.as_deref()
    }

    /// Clear the buffer and begin capturing from `host`.
    ///
    /// A blank `name` leaves the recording to be named at save time. Starting
    /// while already recording keeps the existing attachment.
    pub async fn start<H>(&mut self, host: &H, name: Option<&str>) -> Result<(), RecorderError>
    where
        H: CaptureHost + ?Sized,
    {
        self.buffer.clear();
        self.scrolls.clear();
        self.last_timestamp = 0;
        self.pending_name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        if self.events.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            host.attach_capture(tx).await?;
            self.events = Some(rx);
        } else {
            log::debug!("recorder already attached, restarting buffer");
        }

        self.state = RecorderState::Recording;
        log::info!(
            "recording started{}",
            self.pending_name
                .as_deref()
                .map(|n| format!(": {}", n))
                .unwrap_or_default()
        );
        Ok(())
    }

    /// Detach from `host` and return to idle, keeping the buffer.
    ///
    /// Events already delivered are processed and pending scroll bursts are
    /// flushed. Safe to call when not recording.
    pub async fn stop<H>(&mut self, host: &H) -> Result<(), RecorderError>
    where
        H: CaptureHost + ?Sized,
    {
        let Some(mut events) = self.events.take() else {
            self.state = RecorderState::Idle;
            return Ok(());
        };

        let detached = host.detach_capture().await;
        events.close();
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
        }
        for settled in self.scrolls.take_all() {
            self.push_scroll(settled);
        }

        self.state = RecorderState::Idle;
        log::info!("recording stopped with {} actions", self.buffer.len());
        detached.map_err(RecorderError::from)
    }

    /// Drop captured actions without leaving the current state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scrolls.clear();
        self.last_timestamp = 0;
    }

    /// Wait for the next captured event or scroll deadline and process it.
    ///
    /// Returns the actions appended by that step (possibly none, e.g. for an
    /// ignored click), or `None` once the recorder is no longer attached or the
    /// host closed the event stream. Cancel-safe.
    pub async fn process_next(&mut self) -> Option<Vec<Action>> {
        enum Step {
            Event(Option<CapturedEvent>),
            Deadline,
        }

        let deadline = self.scrolls.next_deadline();
        let events = self.events.as_mut()?;
        let step = match deadline {
            Some(deadline) => tokio::select! {
                event = events.recv() => Step::Event(event),
                _ = tokio::time::sleep_until(deadline) => Step::Deadline,
            },
            None => Step::Event(events.recv().await),
        };

        match step {
            Step::Event(Some(event)) => Some(self.handle_event(event)),
            Step::Deadline => Some(self.flush_due(Instant::now())),
            Step::Event(None) => {
                log::warn!("capture stream closed by host");
                self.events = None;
                self.state = RecorderState::Idle;
                let flushed = self.flush_all();
                if flushed.is_empty() {
                    None
                } else {
                    Some(flushed)
                }
            }
        }
    }

    /// Normalize one captured event.
    ///
    /// Returns the appended actions. Scrolls are only queued here and come out
    /// of [`flush_due`](Self::flush_due) once settled, unless a click or key
    /// press arrives first: pending scrolls are then appended ahead of it so
    /// the buffer keeps capture order.
    pub fn handle_event(&mut self, event: CapturedEvent) -> Vec<Action> {
        if !self.is_recording() {
            return Vec::new();
        }

        if let CaptureKind::Click { pointer_id } = event.kind {
            if pointer_id == SYNTHETIC_POINTER_ID {
                log::debug!("ignoring synthetic click");
                return Vec::new();
            }
        }

        let target = self.generator.locate(&event.target);
        if target.is_empty() || self.generator.policy().mentions_instrumentation(&target) {
            log::debug!("skipping event without usable locator");
            return Vec::new();
        }

        match event.kind {
            CaptureKind::Click { .. } => {
                let mut appended = self.flush_all();
                let action = Action::click(target, self.next_timestamp());
                appended.push(self.push(action));
                appended
            }
            CaptureKind::Keydown {
                key,
                key_code,
                code,
            } => {
                let mut appended = self.flush_all();
                let action = Action::keydown(target, key, key_code, code, self.next_timestamp());
                appended.push(self.push(action));
                appended
            }
            CaptureKind::Scroll {
                element_offset,
                window_offset,
            } => {
                let offset = if event.target.targets_viewport() {
                    window_offset
                } else {
                    element_offset
                };
                self.scrolls.observe(&target, offset.x, offset.y, Instant::now());
                Vec::new()
            }
        }
    }

    /// Append scroll actions for bursts that have been quiet since before `now`
    pub fn flush_due(&mut self, now: Instant) -> Vec<Action> {
        self.scrolls
            .take_due(now)
            .into_iter()
            .map(|settled| self.push_scroll(settled))
            .collect()
    }

    fn flush_all(&mut self) -> Vec<Action> {
        self.scrolls
            .take_all()
            .into_iter()
            .map(|settled| self.push_scroll(settled))
            .collect()
    }

    /// Persist the buffer as a recording and select it.
    ///
    /// The buffer and pending name are cleared only after the store confirms
    /// the save; on failure they are kept for a retry. Detaching needs the
    /// capture host, so a recorder that is still attached is rejected with
    /// [`RecorderError::StillRecording`]; `PageContext::save_recording` stops
    /// it first.
    pub async fn save<S>(&mut self, store: &S) -> Result<Recording, RecorderError>
    where
        S: RecordingStore + ?Sized,
    {
        if self.is_recording() {
            return Err(RecorderError::StillRecording);
        }

        let now = Local::now();
        let name = self
            .pending_name
            .clone()
            .unwrap_or_else(|| default_recording_name(now));
        let recording = Recording::new(name, self.buffer.clone(), now);

        store.save(recording.clone()).await?;
        self.buffer.clear();
        self.pending_name = None;
        self.last_timestamp = 0;

        if let Err(e) = store.set_selected(&recording.id).await {
            log::warn!("saved recording {} but could not select it: {}", recording.id, e);
        }
        log::info!(
            "saved recording '{}' ({} actions)",
            recording.name,
            recording.count
        );
        Ok(recording)
    }

    fn push_scroll(&mut self, settled: SettledScroll) -> Action {
        let action = Action::scroll(settled.target, settled.x, settled.y, self.next_timestamp());
        self.push(action)
    }

    fn push(&mut self, action: Action) -> Action {
        log::debug!("recorded {}", action.describe());
        self.buffer.push(action.clone());
        action
    }

    // Wall clocks can step backwards; timestamps within a buffer must not.
    fn next_timestamp(&mut self) -> i64 {
        let now = (self.clock)().max(self.last_timestamp);
        self.last_timestamp = now;
        now
    }
}
