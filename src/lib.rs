pub mod dom;
pub mod locator;
pub mod messaging;
pub mod model;
pub mod recorder;
pub mod replayer;
pub mod report;
pub mod store;
pub mod utils;

// Re-export common items
pub use locator::{locate, ExclusionPolicy, LocatorGenerator};
pub use model::{Action, ActionKind, Recording};
pub use recorder::EventRecorder;
pub use replayer::{ReplayHandle, ReplayRun, Replayer};
pub use store::RecordingStore;
