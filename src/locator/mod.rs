//! Locator generation: element path to re-resolvable selector string.

pub mod generator;
pub mod policy;

pub use generator::{locate, LocatorGenerator};
pub use policy::{ExclusionPolicy, DEFAULT_EXCLUSION_PATTERNS, DEFAULT_INSTRUMENTATION_MARKERS};
