//! Action and recording schema shared by the recorder, the replayer and the store.

pub mod action;
pub mod recording;

pub use action::{derive_key_code, is_printable_key, Action, ActionKind};
pub use recording::{
    default_recording_name, proposed_recording_name, Recording, StoreLayout, STORE_LAYOUT_VERSION,
};
