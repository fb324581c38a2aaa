//! The `rev` stage: give each asset a content-fingerprinted name and record it in the manifest.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    asset::AssetFile,
    config::{AssetConfig, PrefixPool},
    error::AssetError,
    event::StageSink,
    fingerprint::fingerprint,
    manifest::{ManifestStore, ManifestWriter},
    paths::{dest_path, logical_path, revisioned_path, to_slash},
    stage::Stage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevOptions {
    /// Assign prefixes from the configured pool. When false, entries registered by this stage get
    /// no prefix.
    pub prefix: bool,
}

impl Default for RevOptions {
    fn default() -> Self {
        RevOptions { prefix: true }
    }
}

#[derive(Clone)]
pub struct RevStage {
    store: Arc<ManifestStore>,
    writer: Arc<ManifestWriter>,
    prefix: PrefixPool,
    src: PathBuf,
    dest: PathBuf,
    cleanup: bool,
    hash: bool,
}

impl RevStage {
    pub fn new(
        config: &AssetConfig,
        store: Arc<ManifestStore>,
        writer: Arc<ManifestWriter>,
        options: RevOptions,
    ) -> Self {
        RevStage {
            store,
            writer,
            prefix: if options.prefix {
                config.prefix.clone()
            } else {
                PrefixPool::none()
            },
            src: config.src.clone(),
            dest: config.dest.clone(),
            cleanup: config.cleanup,
            hash: config.hash,
        }
    }

    /// Rename one asset, register it, schedule a manifest write and hand it downstream. Files that
    /// cannot be renamed are reported on the sink and not forwarded.
    pub async fn process(&self, file: AssetFile, sink: &StageSink) -> Result<(), AssetError> {
        match self.revision(file).await {
            Ok(renamed) => sink.push(renamed),
            Err(e) => {
                tracing::warn!("[RevStage] {}", e);
                sink.error(e)
            }
        }
    }

    /// The renaming itself, without the sink.
    pub async fn revision(&self, mut file: AssetFile) -> Result<AssetFile, AssetError> {
        let fingerprint = self.hash.then(|| fingerprint(&file.contents));
        let new_path = revisioned_path(&file.path, fingerprint.as_deref())?;

        let base = file.cwd.join(&self.src);
        let logical = relative_key(&base, &file.path);
        let output = relative_key(&base, &new_path);

        if self.cleanup {
            self.remove_stale(&file.cwd, &logical, &output).await;
        }

        let entry = self.store.register(&logical, &output, &self.prefix);
        tracing::debug!(
            "[RevStage] {} -> {}",
            entry.logical_path,
            entry.prefixed_path
        );
        self.writer.schedule_write();

        file.path = new_path;
        Ok(file)
    }

    async fn remove_stale(&self, cwd: &Path, logical: &str, output: &str) {
        match self.store.lookup(logical) {
            Some(previous) if previous.output_path != output => {
                remove_best_effort(&dest_path(cwd, &self.dest, &previous.output_path)).await;
            }
            Some(_) => {}
            None if self.hash => {
                // First hashed build over a tree written without hashing.
                let unhashed = dest_path(cwd, &self.dest, logical);
                if tokio::fs::try_exists(&unhashed).await.unwrap_or(false) {
                    remove_best_effort(&unhashed).await;
                }
            }
            None => {}
        }
    }
}

impl Stage for RevStage {
    fn name(&self) -> &'static str {
        "rev"
    }

    async fn transform(&self, file: AssetFile, sink: &StageSink) -> Result<(), AssetError> {
        self.process(file, sink).await
    }
}

fn relative_key(base: &Path, path: &Path) -> String {
    logical_path(base, path).unwrap_or_else(|e| {
        tracing::warn!(
            "[RevStage] {:?} is outside the source root {:?} ({}), keying it by full path",
            path,
            base,
            e
        );
        to_slash(path)
    })
}

async fn remove_best_effort(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("[RevStage] Removed superseded output {:?}", path),
        Err(e) => tracing::debug!("[RevStage] Could not remove {:?}: {}", path, e),
    }
}
