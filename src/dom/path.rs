//! Serializable snapshots of event targets, as delivered by a capture host.

use serde::{Deserialize, Serialize};

/// One element in a target's ancestor chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Lowercase tag name
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    /// 1-based position among the parent's element children
    #[serde(default = "first_position")]
    pub position: usize,
}

fn first_position() -> usize {
    1
}

impl NodeDescriptor {
    pub fn new(tag: &str, position: usize) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            id: None,
            classes: Vec::new(),
            position,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_classes(mut self, classes: &[&str]) -> Self {
        self.classes = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    /// `html` and `body` stand for the document itself
    pub fn is_root_like(&self) -> bool {
        self.tag == "html" || self.tag == "body"
    }
}

/// Target element followed by its ancestors, innermost first.
///
/// A chain that does not end at `html` describes a detached subtree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementPath {
    pub nodes: Vec<NodeDescriptor>,
}

impl ElementPath {
    pub fn new(nodes: Vec<NodeDescriptor>) -> Self {
        Self { nodes }
    }

    pub fn target(&self) -> Option<&NodeDescriptor> {
        self.nodes.first()
    }

    /// Whether the event target is the document root or body
    pub fn targets_viewport(&self) -> bool {
        self.target().map(|n| n.is_root_like()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

impl ScrollOffset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Raw interaction observed in capture phase, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub target: ElementPath,
    #[serde(flatten)]
    pub kind: CaptureKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CaptureKind {
    Click {
        #[serde(rename = "pointerId", default)]
        pointer_id: i64,
    },
    Keydown {
        key: String,
        #[serde(rename = "keyCode", default)]
        key_code: u32,
        #[serde(default)]
        code: String,
    },
    /// Both offset pairs are sampled; the recorder picks the one that applies
    Scroll {
        #[serde(rename = "elementOffset", default)]
        element_offset: ScrollOffset,
        #[serde(rename = "windowOffset", default)]
        window_offset: ScrollOffset,
    },
}
