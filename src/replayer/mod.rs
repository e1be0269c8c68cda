//! Replayer: a single-flight, cancellable runner that reproduces recorded
//! actions against a live document and collects per-step errors.

pub mod events;
pub mod executor;
pub mod state;

pub use events::{ConsoleEventListener, EventEmitter, ReplayEvent, ReplaySummary};
pub use executor::{
    apply_keystroke, ReplayError, ReplayHandle, ReplayOptions, Replayer, StopSignal,
    DEFAULT_HIGHLIGHT_BACKGROUND, DEFAULT_HIGHLIGHT_OUTLINE, DEFAULT_OBSERVATION_DELAY,
};
pub use state::{ReplayProgress, ReplayRun, ReplayStatus, StepError};
