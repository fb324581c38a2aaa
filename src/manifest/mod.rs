//! The shared manifest: logical asset path -> revisioned, prefixed output path.
//!
//! [`ManifestStore`] is written only by the `rev` stage and read by the `replace` stage and by
//! [`ManifestWriter`](persist::ManifestWriter). It lives for the lifetime of an
//! [`AssetPipeline`](crate::stage::AssetPipeline); a fresh pipeline starts empty.
//!
//! Every registration takes a new, strictly increasing assignment index, and the prefix for the
//! entry is chosen as `prefix_pool[index % len]` at registration time. Re-registering a logical
//! path therefore replaces the entry wholesale and may move it to a different prefix.

use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicU64, Ordering},
};

use crate::config::PrefixPool;

pub mod persist;

pub use persist::{ManifestTarget, ManifestWriter, DEFAULT_MANIFEST_DEBOUNCE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub logical_path: String,
    pub output_path: String,
    pub prefixed_path: String,
    pub index: u64,
}

impl ManifestEntry {
    /// The output path under a prefix chosen from `pool` by this entry's assignment index.
    pub fn prefixed_with(&self, pool: &PrefixPool) -> String {
        format!("{}{}", pool.select(self.index), self.output_path)
    }
}

#[derive(Debug, Default)]
pub struct ManifestStore {
    entries: RwLock<HashMap<String, ManifestEntry>>,
    next_index: AtomicU64,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `logical_path`. Always succeeds.
    pub fn register(
        &self,
        logical_path: &str,
        output_path: &str,
        prefix_pool: &PrefixPool,
    ) -> ManifestEntry {
        let mut entries = self.entries.write();
        // Taken under the write lock so index order matches publication order.
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let entry = ManifestEntry {
            logical_path: logical_path.to_string(),
            output_path: output_path.to_string(),
            prefixed_path: format!("{}{}", prefix_pool.select(index), output_path),
            index,
        };
        if let Some(previous) = entries.insert(logical_path.to_string(), entry.clone()) {
            tracing::debug!(
                "[ManifestStore] {} re-registered: {} -> {} (index {} -> {})",
                logical_path,
                previous.output_path,
                entry.output_path,
                previous.index,
                entry.index
            );
        } else {
            tracing::debug!(
                "[ManifestStore] {} registered as {} (index {})",
                logical_path,
                entry.prefixed_path,
                entry.index
            );
        }
        entry
    }

    pub fn lookup(&self, logical_path: &str) -> Option<ManifestEntry> {
        self.entries.read().get(logical_path).cloned()
    }

    /// The subset of `logical_paths` that has no entry yet.
    pub fn missing<'a, I>(&self, logical_paths: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let entries = self.entries.read();
        logical_paths
            .into_iter()
            .filter(|path| !entries.contains_key(path.as_str()))
            .cloned()
            .collect()
    }

    /// Point-in-time copy of logical path -> prefixed path, in key order.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.prefixed_path.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
