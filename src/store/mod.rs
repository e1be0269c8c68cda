//! Persistence of saved recordings and the current selection.

pub mod json;
pub mod memory;
pub mod traits;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use traits::{RecordingStore, StoreError};
