//! Recorder: captures clicks, key presses and settled scroll positions from a
//! live document into an ordered action buffer, and saves it as a recording.

pub mod event_recorder;
pub mod scroll;

pub use event_recorder::{
    Clock, EventRecorder, RecorderError, RecorderState, DEFAULT_SCROLL_QUIET_WINDOW,
    SYNTHETIC_POINTER_ID,
};
pub use scroll::{ScrollCoalescer, SettledScroll};
