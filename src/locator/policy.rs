//! Rules that keep unstable identifiers and the engine's own UI out of locators.

use regex::Regex;
use std::sync::LazyLock;

use crate::dom::NodeDescriptor;

/// Default patterns, matched against `#<id>`.
///
/// Generated ids (`#item-12`, `#row_3`) and state keywords tend to change
/// between capture and replay. Keywords match in any case so camelCase ids
/// like `isChecked` are caught too.
pub const DEFAULT_EXCLUSION_PATTERNS: &[&str] = &[
    r"^#.*-\d+$",
    r"^#.*_\d+$",
    r"(?i).*style.*",
    r"(?i).*focus.*",
    r"(?i).*hover.*",
    r"(?i).*active.*",
    r"(?i).*select.*",
    r"(?i).*check.*",
    r"(?i).*open.*",
];

/// Namespaces used by the recorder's own panel and injected scripts
pub const DEFAULT_INSTRUMENTATION_MARKERS: &[&str] = &["plasmo", "lumi-recorder"];

static DEFAULT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DEFAULT_EXCLUSION_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Injectable exclusion policy for the locator generator
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    patterns: Vec<Regex>,
    instrumentation_markers: Vec<String>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.clone(),
            instrumentation_markers: DEFAULT_INSTRUMENTATION_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl ExclusionPolicy {
    pub fn new(patterns: Vec<Regex>, instrumentation_markers: Vec<String>) -> Self {
        Self {
            patterns,
            instrumentation_markers: instrumentation_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Build a policy from pattern strings, e.g. as read from configuration
    pub fn from_patterns<S: AsRef<str>>(
        patterns: &[S],
        instrumentation_markers: &[S],
    ) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(
            patterns,
            instrumentation_markers
                .iter()
                .map(|m| m.as_ref().to_string())
                .collect(),
        ))
    }

    /// Policy that excludes nothing but still rejects the given instrumentation markers
    pub fn permissive(instrumentation_markers: Vec<String>) -> Self {
        Self::new(Vec::new(), instrumentation_markers)
    }

    pub fn excludes_id(&self, id: &str) -> bool {
        let selector = format!("#{}", id);
        self.patterns.iter().any(|p| p.is_match(&selector))
    }

    /// Whether the node belongs to the engine's own UI
    pub fn is_instrumentation(&self, node: &NodeDescriptor) -> bool {
        let id = node.id.as_deref().unwrap_or_default();
        std::iter::once(node.tag.as_str())
            .chain(std::iter::once(id))
            .chain(node.classes.iter().map(String::as_str))
            .any(|name| self.mentions_instrumentation(name))
    }

    /// Whether a name or a generated locator references an instrumentation namespace
    pub fn mentions_instrumentation(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let text = text.to_lowercase();
        self.instrumentation_markers
            .iter()
            .any(|m| text.contains(m.as_str()))
    }
}
