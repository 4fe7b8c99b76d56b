//! Node state as delivered on the reconcile port.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The string→string metadata map the host persists per node.
///
/// Ordered so stores that iterate it (the KV component) see keys in
/// ascending order without sorting.
pub type Metadata = BTreeMap<String, String>;

/// Snapshot of the host's canonical node record, delivered to components
/// on the reconcile port.
///
/// Only the metadata map is visible to components; the rest of the host
/// record is opaque by design.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// Metadata previously written by this node via reconcile patches.
    #[serde(default)]
    pub metadata: Metadata,
}

impl NodeState {
    /// Create an empty node state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node state carrying the given metadata.
    pub fn with_metadata(metadata: Metadata) -> Self {
        Self { metadata }
    }

    /// Look up a metadata value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_lookup() {
        let mut meta = Metadata::new();
        meta.insert("cron-running".to_string(), "true".to_string());
        let state = NodeState::with_metadata(meta);

        assert_eq!(state.get("cron-running"), Some("true"));
        assert_eq!(state.get("missing"), None);
    }

    #[test]
    fn metadata_iterates_in_key_order() {
        let mut meta = Metadata::new();
        meta.insert("kv-b".to_string(), "2".to_string());
        meta.insert("kv-a".to_string(), "1".to_string());

        let keys: Vec<_> = meta.keys().cloned().collect();
        assert_eq!(keys, vec!["kv-a", "kv-b"]);
    }
}
