//! Per-file bookkeeping of references seen during one substitution pass.

use std::collections::HashMap;

use crate::error::AssetError;

/// Raw reference text -> resolved flag, in order of first appearance. Scoped to a single file's
/// resolution and dropped with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingReferences {
    order: Vec<String>,
    resolved: HashMap<String, bool>,
}

impl PendingReferences {
    pub fn mark(&mut self, raw: &str, resolved: bool) {
        match self.resolved.get_mut(raw) {
            Some(flag) => *flag = resolved,
            None => {
                self.order.push(raw.to_string());
                self.resolved.insert(raw.to_string(), resolved);
            }
        }
    }

    pub fn all_resolved(&self) -> bool {
        self.resolved.values().all(|resolved| *resolved)
    }

    /// Distinct unresolved reference strings in order of first appearance.
    pub fn unresolved(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|raw| self.resolved.get(raw.as_str()) == Some(&false))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The error signal for a file that still has unresolved references, if any.
    pub fn into_error(self, file: &str) -> Option<AssetError> {
        let references = self.unresolved();
        if references.is_empty() {
            None
        } else {
            Some(AssetError::UnresolvedReferences {
                file: file.to_string(),
                references,
            })
        }
    }
}
