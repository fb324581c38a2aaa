//! # Watch Service
//!
//! [`AssetWatcher`] keeps `dest` in step with `src` during development. File system events under
//! `cwd/src` are debounced (`notify-debouncer-full`), and every changed asset is run back through
//! the build stages of a long-lived [`AssetPipeline`]:
//!
//! 1. **Debouncer thread**: collects create/modify events for files with a configured `rev` or
//!    `replace` extension, skipping hidden files.
//! 2. **Rebuild task**: spawned on the provided runtime; reads the changed files, runs them
//!    through [`BuildStage`](crate::pipeline::BuildStage), writes the outputs and flushes the
//!    manifest.
//!
//! Because the pipeline (and so the manifest store) outlives each rebuild, a changed asset is
//! re-registered, and with `cleanup` enabled its previous revision is removed from `dest`.
//! Files that reference it are not rebuilt automatically; touch them to pick up the new path.
//!
//! ```rust,no_run
//! use assetrev::{config::AssetConfig, stage::AssetPipeline, watch::AssetWatcher};
//! use std::sync::Arc;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let pipeline = Arc::new(AssetPipeline::new(AssetConfig::default(), "./site"));
//! let _watcher = AssetWatcher::new(pipeline, runtime.handle().clone())?;
//! // Keep `_watcher` alive for as long as changes should be picked up.
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, Debouncer, FileIdMap,
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::runtime::Handle;

use crate::{
    asset::AssetFile,
    config::AssetConfig,
    error::AssetError,
    pipeline::{run_build, write_outputs},
    stage::AssetPipeline,
};

/// Quiet period before a batch of file events is acted on.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(300);

type SourceWatcher = Debouncer<RecommendedWatcher, FileIdMap>;

pub struct AssetWatcher {
    debouncer: SourceWatcher,
    src_root: PathBuf,
}

impl AssetWatcher {
    pub fn new(pipeline: Arc<AssetPipeline>, runtime: Handle) -> Result<Self, AssetError> {
        let src_root = pipeline.root().join(&pipeline.config().src);
        let config = pipeline.config().clone();
        let mut debouncer = new_debouncer(
            WATCH_DEBOUNCE,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let changed: BTreeSet<PathBuf> = events
                        .iter()
                        .filter(|event| {
                            matches!(event.event.kind, EventKind::Create(_) | EventKind::Modify(_))
                        })
                        .flat_map(|event| event.paths.iter())
                        .filter(|path| is_watched(&config, path))
                        .cloned()
                        .collect();
                    if changed.is_empty() {
                        return;
                    }
                    tracing::info!("[AssetWatcher] {} changed file(s)", changed.len());
                    let pipeline = pipeline.clone();
                    runtime.spawn(async move {
                        if let Err(e) = rebuild(&pipeline, changed).await {
                            tracing::error!("[AssetWatcher] Rebuild failed: {}", e);
                        }
                    });
                }
                Err(errors) => {
                    tracing::error!("[AssetWatcher] Notify debouncer returned errors: {:?}", errors);
                }
            },
        )?;
        debouncer
            .watcher()
            .watch(&src_root, RecursiveMode::Recursive)?;
        tracing::info!("[AssetWatcher] Watching {:?}", src_root);
        Ok(AssetWatcher {
            debouncer,
            src_root,
        })
    }

    pub fn src_root(&self) -> &Path {
        &self.src_root
    }

    /// Stop watching. Rebuilds already spawned run to completion.
    pub fn stop(mut self) -> Result<(), AssetError> {
        let unwatch_res = self.debouncer.watcher().unwatch(&self.src_root);
        tracing::debug!(
            "[AssetWatcher] Unwatch {:?} = {:?}",
            self.src_root,
            unwatch_res
        );
        Ok(unwatch_res?)
    }
}

fn is_watched(config: &AssetConfig, path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false);
    !hidden && (config.is_rev_target(path) || config.is_replace_target(path))
}

async fn rebuild(pipeline: &AssetPipeline, changed: BTreeSet<PathBuf>) -> Result<(), AssetError> {
    let mut files = Vec::with_capacity(changed.len());
    for path in changed {
        match tokio::fs::read(&path).await {
            Ok(contents) => files.push(AssetFile::new(pipeline.root(), path, contents)),
            // Editors often replace files through a temporary that is gone by now.
            Err(e) => tracing::debug!("[AssetWatcher] Skipping {:?}: {}", path, e),
        }
    }
    let output = run_build(pipeline, files).await?;
    for error in &output.errors {
        tracing::warn!("[AssetWatcher] {}", error);
    }
    let written = write_outputs(&output.files, pipeline.config()).await?;
    tracing::info!("[AssetWatcher] Rebuilt {} file(s)", written.len());
    Ok(())
}
