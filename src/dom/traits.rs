use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::DomError;
use super::path::CapturedEvent;

/// Inline style properties touched by replay highlighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleProperty {
    Background,
    Outline,
}

impl StyleProperty {
    pub fn css_name(&self) -> &'static str {
        match self {
            StyleProperty::Background => "background-color",
            StyleProperty::Outline => "outline",
        }
    }
}

/// Value and caret of a text-input-capable element.
///
/// The caret is a character offset; `None` means the element reports no selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInputState {
    pub value: String,
    pub caret: Option<usize>,
}

/// Fields of a synthetic key-down event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStroke {
    pub key: String,
    pub key_code: u32,
    pub code: String,
}

/// A document the replayer can resolve locators against and drive.
///
/// Implementations exist for an in-process tree and for a browser page; the
/// replayer only ever talks to this trait.
#[async_trait]
pub trait LiveDocument: Send + Sync {
    /// Handle to a resolved element
    type Element: Clone + Send + Sync + std::fmt::Debug;

    /// All elements matching `selector`, in document order
    async fn query_selector_all(&self, selector: &str) -> Result<Vec<Self::Element>, DomError>;

    /// Whether the element is the document root or body
    async fn is_viewport(&self, element: &Self::Element) -> Result<bool, DomError>;

    async fn inline_style(
        &self,
        element: &Self::Element,
        property: StyleProperty,
    ) -> Result<String, DomError>;

    async fn set_inline_style(
        &self,
        element: &Self::Element,
        property: StyleProperty,
        value: &str,
    ) -> Result<(), DomError>;

    /// Invoke the element's native click behavior
    async fn click(&self, element: &Self::Element) -> Result<(), DomError>;

    async fn dispatch_key_down(
        &self,
        element: &Self::Element,
        stroke: &KeyStroke,
    ) -> Result<(), DomError>;

    /// Current value and caret, or `None` if the element does not accept text
    async fn text_input_state(
        &self,
        element: &Self::Element,
    ) -> Result<Option<TextInputState>, DomError>;

    async fn set_text_input_state(
        &self,
        element: &Self::Element,
        state: &TextInputState,
    ) -> Result<(), DomError>;

    /// Fire a bubbling `input` notification
    async fn dispatch_input(&self, element: &Self::Element) -> Result<(), DomError>;

    async fn scroll_window_to(&self, x: f64, y: f64, smooth: bool) -> Result<(), DomError>;

    async fn set_scroll_offsets(
        &self,
        element: &Self::Element,
        x: f64,
        y: f64,
    ) -> Result<(), DomError>;
}

/// A document that can report user interactions observed in capture phase
#[async_trait]
pub trait CaptureHost: Send + Sync {
    /// Start forwarding click, key-down and scroll events into `sink`
    async fn attach_capture(&self, sink: mpsc::UnboundedSender<CapturedEvent>)
        -> Result<(), DomError>;

    /// Stop forwarding; safe to call when nothing is attached
    async fn detach_capture(&self) -> Result<(), DomError>;
}
