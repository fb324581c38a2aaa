//! # Stages
//!
//! A stage consumes [`AssetFile`]s and hands results downstream through a [`StageSink`]. Two are
//! provided:
//!
//! - [`rev::RevStage`]: renames each asset after a fingerprint of its contents and registers the
//!   mapping in the shared [`ManifestStore`].
//! - [`replace::ReplaceStage`]: rewrites `asset://` references in text content to the revisioned
//!   paths, waiting a bounded time for assets that have not been registered yet.
//!
//! Both are built from one [`AssetPipeline`], which owns the manifest store and its debounced
//! writer for the lifetime of the run. Stages from the same pipeline observe each other's
//! registrations immediately, so a `replace` running concurrently with a `rev` can pick up
//! entries as they land.
//!
//! ```rust,no_run
//! use assetrev::{asset::AssetFile, config::AssetConfig, event::StageSink, stage::AssetPipeline};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), assetrev::AssetError> {
//! let pipeline = AssetPipeline::new(AssetConfig::default(), "/work");
//! let rev = pipeline.rev();
//! let replace = pipeline.replace();
//! let (sink, mut rx) = StageSink::channel();
//!
//! rev.process(AssetFile::new("/work", "/work/src/assets/app.css", "body{}"), &sink).await?;
//! replace
//!     .process(AssetFile::new("/work", "/work/src/index.html", "<link href='asset://app.css'>"), &sink)
//!     .await?;
//! drop(sink);
//! while let Some(event) = rx.recv().await {
//!     println!("{event}");
//! }
//! pipeline.manifest().flush().await?;
//! # Ok(())
//! # }
//! ```

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    asset::AssetFile,
    config::AssetConfig,
    error::AssetError,
    event::StageSink,
    fingerprint::startup_fingerprint,
    manifest::{ManifestStore, ManifestTarget, ManifestWriter},
};

pub mod diagnostic;
pub mod reference;
pub mod replace;
pub mod rev;

pub use diagnostic::PendingReferences;
pub use replace::{ReplaceOptions, ReplaceStage, ResolutionOutcome, ResolutionState};
pub use rev::{RevOptions, RevStage};

/// A processing step over asset files.
///
/// `transform` returns `Err` only when the sink is gone. Per-file failures are reported as
/// [`crate::event::PipelineEvent::Error`] on the sink and do not abort other files.
pub trait Stage: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn transform(
        &self,
        file: AssetFile,
        sink: &StageSink,
    ) -> impl Future<Output = Result<(), AssetError>> + Send;
}

/// Shared state for one run: configuration, the manifest store and its writer.
pub struct AssetPipeline {
    config: AssetConfig,
    root: PathBuf,
    store: Arc<ManifestStore>,
    writer: Arc<ManifestWriter>,
}

impl AssetPipeline {
    pub fn new(config: AssetConfig, root: impl Into<PathBuf>) -> Self {
        Self::with_startup_stamp(config, root, &startup_fingerprint())
    }

    /// Like [`AssetPipeline::new`] with a fixed manifest filename fingerprint.
    pub fn with_startup_stamp(
        config: AssetConfig,
        root: impl Into<PathBuf>,
        startup_stamp: &str,
    ) -> Self {
        let root = root.into();
        let store = Arc::new(ManifestStore::new());
        let target = ManifestTarget::new(&config, &root, startup_stamp);
        tracing::debug!(
            "[AssetPipeline] Manifest {} -> {:?}",
            target.output_path,
            target.file
        );
        let writer = Arc::new(ManifestWriter::new(target, store.clone()));
        AssetPipeline {
            config,
            root,
            store,
            writer,
        }
    }

    /// Replace the manifest writer's quiet window. Call before any stage is built.
    pub fn with_manifest_debounce(mut self, window: Duration) -> Self {
        self.writer = Arc::new(ManifestWriter::with_window(
            self.writer.target().clone(),
            self.store.clone(),
            window,
        ));
        self
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> Arc<ManifestStore> {
        self.store.clone()
    }

    pub fn manifest(&self) -> Arc<ManifestWriter> {
        self.writer.clone()
    }

    pub fn rev(&self) -> RevStage {
        self.rev_with(RevOptions::default())
    }

    pub fn rev_with(&self, options: RevOptions) -> RevStage {
        RevStage::new(
            &self.config,
            self.store.clone(),
            self.writer.clone(),
            options,
        )
    }

    pub fn replace(&self) -> ReplaceStage {
        self.replace_with(ReplaceOptions::default())
    }

    pub fn replace_with(&self, options: ReplaceOptions) -> ReplaceStage {
        ReplaceStage::new(
            &self.config,
            self.store.clone(),
            self.writer.target(),
            options,
        )
    }
}
