//! File-system plumbing around the stages: load a source tree, drive files through the stages
//! with every file in flight at once, and write what comes out under `dest`.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use parking_lot::Mutex;
use tokio::task::JoinSet;
use walkdir::{DirEntry, WalkDir};

use crate::{
    asset::AssetFile,
    config::AssetConfig,
    error::AssetError,
    event::{PipelineEvent, StageSink},
    stage::{AssetPipeline, ReplaceStage, RevStage, Stage},
};

/// Everything a stage emitted for one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    pub files: Vec<AssetFile>,
    pub errors: Vec<AssetError>,
}

impl StageOutput {
    pub fn has_unresolved(&self) -> bool {
        self.errors.iter().any(AssetError::is_unresolved)
    }

    fn collect(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::File(file) => self.files.push(file),
            PipelineEvent::Error(e) => self.errors.push(e),
        }
    }
}

/// Feed `files` to `stage` concurrently and gather its output.
///
/// Files are spawned onto the current runtime together, so a file waiting on the manifest does
/// not hold back files that would register the entries it needs.
pub async fn run_stage<S: Stage>(
    stage: Arc<S>,
    files: Vec<AssetFile>,
) -> Result<StageOutput, AssetError> {
    let (sink, mut rx) = StageSink::channel();
    let mut tasks = JoinSet::new();
    tracing::debug!("[{}] Processing {} file(s)", stage.name(), files.len());
    for file in files {
        let stage = stage.clone();
        let sink = sink.clone();
        tasks.spawn(async move { stage.transform(file, &sink).await });
    }
    drop(sink);

    let mut output = StageOutput::default();
    while let Some(joined) = tasks.join_next().await {
        joined??;
        while let Ok(event) = rx.try_recv() {
            output.collect(event);
        }
    }
    while let Some(event) = rx.recv().await {
        output.collect(event);
    }
    Ok(output)
}

/// A file whose references were still unresolved when its retry budget ran out.
struct Deferred {
    /// Contents as read, before any substitution.
    source: AssetFile,
    /// Path of the record emitted for it.
    emitted: PathBuf,
    error: Option<AssetError>,
}

/// Replace then rev, chosen per file by extension. Files matching neither pass through.
///
/// Unresolved-reference errors are held back rather than emitted: a stylesheet that is itself
/// waiting on a missing image registers only after its own budget runs out, which may be just
/// after the pages referencing it gave up. [`run_build`] settles those once the batch is done.
pub struct BuildStage {
    config: AssetConfig,
    replace: ReplaceStage,
    rev: RevStage,
    deferred: Mutex<Vec<Deferred>>,
}

impl BuildStage {
    pub fn new(pipeline: &AssetPipeline) -> Self {
        BuildStage {
            config: pipeline.config().clone(),
            replace: pipeline.replace(),
            rev: pipeline.rev(),
            deferred: Mutex::new(Vec::new()),
        }
    }

    /// Rev the file if it is a rev target and return what should be emitted. Errors are reported
    /// on the sink.
    async fn finish(
        &self,
        file: AssetFile,
        sink: &StageSink,
    ) -> Result<Option<AssetFile>, AssetError> {
        if !self.config.is_rev_target(&file.path) {
            return Ok(Some(file));
        }
        match self.rev.revision(file).await {
            Ok(renamed) => Ok(Some(renamed)),
            Err(e) => {
                tracing::warn!("[RevStage] {}", e);
                sink.error(e)?;
                Ok(None)
            }
        }
    }

    /// Re-run substitution for every held-back file against the current manifest, re-emitting
    /// files whose output changed. Repeats while anything changes, at most once per held-back
    /// file, then moves the remaining errors into `output`.
    async fn settle(&self, output: &mut StageOutput) {
        let mut deferred = std::mem::take(&mut *self.deferred.lock());
        if deferred.is_empty() {
            return;
        }
        tracing::debug!(
            "[Pipeline] Settling {} file(s) with unresolved references",
            deferred.len()
        );
        for _ in 0..deferred.len() {
            let mut changed = false;
            for item in deferred.iter_mut() {
                let pass = self.replace.substitute(&item.source.text());
                item.error = pass.pending.clone().into_error(&item.source.basename());
                let Some(slot) = output.files.iter_mut().find(|f| f.path == item.emitted) else {
                    continue;
                };
                if slot.contents == pass.output.as_bytes() {
                    continue;
                }
                let mut file = item.source.clone();
                file.contents = pass.output.into_bytes();
                if self.config.is_rev_target(&file.path) {
                    match self.rev.revision(file).await {
                        Ok(renamed) => file = renamed,
                        Err(e) => {
                            tracing::warn!("[RevStage] {}", e);
                            output.errors.push(e);
                            continue;
                        }
                    }
                }
                tracing::debug!(
                    "[Pipeline] {} changed after settling",
                    item.source.basename()
                );
                item.emitted = file.path.clone();
                *slot = file;
                changed = true;
            }
            if !changed {
                break;
            }
        }
        for item in deferred {
            if let Some(error) = item.error {
                tracing::error!("[ReplaceStage] {}", error);
                output.errors.push(error);
            }
        }
    }
}

impl Stage for BuildStage {
    fn name(&self) -> &'static str {
        "build"
    }

    async fn transform(&self, file: AssetFile, sink: &StageSink) -> Result<(), AssetError> {
        if !self.config.is_replace_target(&file.path) {
            if let Some(file) = self.finish(file, sink).await? {
                sink.push(file)?;
            }
            return Ok(());
        }

        let source = file.clone();
        let (inner, mut rx) = StageSink::channel();
        self.replace.process(file, &inner).await?;
        drop(inner);
        let mut replaced = Vec::new();
        let mut unresolved = None;
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::File(f) => replaced.push(f),
                PipelineEvent::Error(e) if e.is_unresolved() => unresolved = Some(e),
                PipelineEvent::Error(e) => sink.error(e)?,
            }
        }

        for file in replaced {
            let Some(file) = self.finish(file, sink).await? else {
                continue;
            };
            if let Some(error) = unresolved.take() {
                self.deferred.lock().push(Deferred {
                    source: source.clone(),
                    emitted: file.path.clone(),
                    error: Some(error),
                });
            }
            sink.push(file)?;
        }
        Ok(())
    }
}

/// Run a whole tree through [`BuildStage`], settle late references and flush the manifest if
/// anything was registered.
pub async fn run_build(
    pipeline: &AssetPipeline,
    files: Vec<AssetFile>,
) -> Result<StageOutput, AssetError> {
    let stage = Arc::new(BuildStage::new(pipeline));
    let mut output = run_stage(stage.clone(), files).await?;
    stage.settle(&mut output).await;
    if !pipeline.store().is_empty() {
        pipeline.manifest().flush().await?;
    }
    tracing::info!(
        "[Pipeline] {} file(s) emitted, {} error(s), {} manifest entries",
        output.files.len(),
        output.errors.len(),
        pipeline.store().len()
    );
    Ok(output)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Load every non-hidden file under `cwd/src`.
pub async fn read_tree(cwd: &Path, config: &AssetConfig) -> Result<Vec<AssetFile>, AssetError> {
    let root = cwd.join(&config.src);
    if !root.is_dir() {
        return Err(AssetError::NotFound(format!(
            "source directory {root:?} does not exist"
        )));
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(&root)
        .into_iter()
        .filter_entry(|e| !is_hidden(e) || e.path() == root)
    {
        let entry = entry?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = tokio::fs::read(&path).await?;
        files.push(AssetFile::new(cwd, path, contents));
    }
    tracing::debug!("[Pipeline] Read {} file(s) under {:?}", files.len(), root);
    Ok(files)
}

/// Write emitted files to `cwd/dest`, mirroring their location under `cwd/src`.
pub async fn write_outputs(
    files: &[AssetFile],
    config: &AssetConfig,
) -> Result<Vec<PathBuf>, AssetError> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let relative = file.path.strip_prefix(file.cwd.join(&config.src))?;
        let target = file.cwd.join(&config.dest).join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &file.contents).await?;
        written.push(target);
    }
    Ok(written)
}
