//! Element path to selector string.
//!
//! Fallback chain, first applicable wins:
//! 1. `#id` when the target's id is a plain identifier the policy accepts
//! 2. `tag` for the root, body, or a node without a parent
//! 3. the parent's locator followed by `> tag:nth-child(position)`
//!
//! The walk in rule 3 stops at the first ancestor that qualifies for rule 1 or 2,
//! so chains start with `#id`, `body`, or `html`.

use crate::dom::{is_plain_identifier, ElementPath, NodeDescriptor};

use super::policy::ExclusionPolicy;

#[derive(Debug, Clone, Default)]
pub struct LocatorGenerator {
    policy: ExclusionPolicy,
}

impl LocatorGenerator {
    pub fn new(policy: ExclusionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ExclusionPolicy {
        &self.policy
    }

    /// Locator for the target of `path`; empty when no usable locator exists.
    pub fn locate(&self, path: &ElementPath) -> String {
        if path.nodes.is_empty() || path.nodes.iter().any(|n| self.policy.is_instrumentation(n)) {
            return String::new();
        }

        let mut fragments = Vec::new();
        for (depth, node) in path.nodes.iter().enumerate() {
            if !is_plain_identifier(&node.tag) {
                return String::new();
            }
            if let Some(id) = self.stable_id(node) {
                fragments.push(format!("#{}", id));
                break;
            }
            if node.is_root_like() || depth + 1 == path.nodes.len() {
                fragments.push(node.tag.clone());
                break;
            }
            fragments.push(format!("{}:nth-child({})", node.tag, node.position));
        }

        fragments.reverse();
        fragments.join(" > ")
    }

    fn stable_id<'a>(&self, node: &'a NodeDescriptor) -> Option<&'a str> {
        node.id
            .as_deref()
            .filter(|id| is_plain_identifier(id) && !self.policy.excludes_id(id))
    }
}

/// Locator under the default exclusion policy
pub fn locate(path: &ElementPath) -> String {
    LocatorGenerator::default().locate(path)
}
