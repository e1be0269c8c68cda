use thiserror::Error;

/// Failures raised by a live document while resolving or driving elements
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomError {
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// The element handle no longer points at a node in the document
    #[error("stale element: {0}")]
    StaleElement(String),

    /// A script or event handler failed inside the document
    #[error("{0}")]
    Script(String),

    #[error("browser error: {0}")]
    Browser(String),
}

impl DomError {
    pub fn invalid_selector(selector: &str, reason: impl Into<String>) -> Self {
        DomError::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}
