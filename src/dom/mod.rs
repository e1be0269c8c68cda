//! Document abstraction shared by recording and replay.

pub mod error;
pub mod memory;
pub mod path;
pub mod selector;
pub mod traits;
pub mod web;

pub use error::DomError;
pub use memory::{DispatchedEvent, MemoryDocument, NodeId};
pub use path::{CaptureKind, CapturedEvent, ElementPath, NodeDescriptor, ScrollOffset};
pub use selector::{is_plain_identifier, SelectorList, SelectorTree};
pub use traits::{CaptureHost, KeyStroke, LiveDocument, StyleProperty, TextInputState};
pub use web::{BrowserType, WebDocument, WebDocumentConfig, WebElement};
