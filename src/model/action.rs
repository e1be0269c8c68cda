use serde::{Deserialize, Serialize};

/// One captured interaction.
///
/// Serializes to the flat shape shared with stored recordings:
/// `{"type": "keydown", "target": "#q", "key": "a", "keyCode": 65, "code": "KeyA", "timestamp": 1}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Locator produced by the locator generator
    pub target: String,
    /// Capture time, epoch milliseconds
    pub timestamp: i64,
}

/// Type-specific payload of an [`Action`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Keydown {
        key: String,
        #[serde(rename = "keyCode", default)]
        key_code: u32,
        #[serde(default)]
        code: String,
    },
    Scroll {
        #[serde(rename = "scrollX", default)]
        scroll_x: f64,
        #[serde(rename = "scrollY", default)]
        scroll_y: f64,
    },
}

impl Action {
    pub fn click(target: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind: ActionKind::Click,
            target: target.into(),
            timestamp,
        }
    }

    pub fn keydown(
        target: impl Into<String>,
        key: impl Into<String>,
        key_code: u32,
        code: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let key = key.into();
        let code = code.into();
        let code = if code.is_empty() {
            derive_key_code(&key)
        } else {
            code
        };
        Self {
            kind: ActionKind::Keydown {
                key,
                key_code,
                code,
            },
            target: target.into(),
            timestamp,
        }
    }

    pub fn scroll(target: impl Into<String>, scroll_x: f64, scroll_y: f64, timestamp: i64) -> Self {
        Self {
            kind: ActionKind::Scroll { scroll_x, scroll_y },
            target: target.into(),
            timestamp,
        }
    }

    /// Type name as it appears on the wire
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ActionKind::Click => "click",
            ActionKind::Keydown { .. } => "keydown",
            ActionKind::Scroll { .. } => "scroll",
        }
    }

    /// Short human-readable line for progress displays
    pub fn describe(&self) -> String {
        match &self.kind {
            ActionKind::Click => format!("click: {}", self.target),
            ActionKind::Keydown { key, .. } => format!("keydown: {} ({})", self.target, key),
            ActionKind::Scroll { scroll_x, scroll_y } => {
                format!("scroll: {} ({}, {})", self.target, scroll_x, scroll_y)
            }
        }
    }
}

/// Physical key code for a logical key when the event did not carry one.
pub fn derive_key_code(key: &str) -> String {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => format!("Key{}", c.to_ascii_uppercase()),
        (Some(c), None) if c.is_ascii_digit() => format!("Digit{}", c),
        (Some(' '), None) => "Space".to_string(),
        _ => key.to_string(),
    }
}

/// Whether a key value produces a single visible character
pub fn is_printable_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_control())
}
