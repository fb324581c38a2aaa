//! The `replace` stage: rewrite `asset://` references to revisioned output paths.
//!
//! Each file runs its own [`Resolution`], a small state machine:
//!
//! ```text
//!            all resolved
//! Scanning ───────────────▶ Resolved
//!    │  ▲
//!    │  │ targets present, or budget spent
//!    ▼  │
//! Waiting ── (sleep interval, retries += 1, poll manifest membership only)
//!
//! Scanning with unresolved references and no budget left ──▶ Exhausted
//! ```
//!
//! While waiting only the manifest is polled for the logical paths the last pass could not
//! resolve; the text is not rescanned until they are all present or the retry budget runs out.
//! That keeps large files from being rescanned over and over while assets elsewhere in the
//! pipeline are still being revisioned.
//!
//! A file is always emitted. If references remain unresolved once the budget is spent, the partial
//! result is emitted and an [`AssetError::UnresolvedReferences`] is signalled alongside it.

use std::{collections::BTreeSet, sync::Arc, time::Duration};
use tokio::time::{sleep, Instant};

use crate::{
    asset::AssetFile,
    config::{AssetConfig, PrefixPool},
    error::AssetError,
    event::StageSink,
    manifest::{ManifestStore, ManifestTarget},
    stage::{
        diagnostic::PendingReferences,
        reference::{scan, AssetReference},
        Stage,
    },
};

/// Per-stage overrides of the pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceOptions {
    /// When set, the prefix is picked from this pool by each entry's assignment index at lookup
    /// time instead of using the prefix stored at registration.
    pub prefix: Option<PrefixPool>,
    pub interval: Option<Duration>,
    pub repeat: Option<u32>,
    pub asset_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReplaceStage {
    store: Arc<ManifestStore>,
    prefix: PrefixPool,
    prefix_override: bool,
    asset_path: String,
    manifest_path: String,
    manifest_output: String,
    interval: Duration,
    repeat: u32,
}

/// Result of one full substitution pass over a text.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionPass {
    pub output: String,
    pub pending: PendingReferences,
    /// Logical paths the pass looked up and did not find.
    pub missing: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Scanning,
    Waiting,
    Resolved,
    Exhausted,
}

impl ResolutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResolutionState::Resolved | ResolutionState::Exhausted)
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub contents: String,
    pub state: ResolutionState,
    pub retries: u32,
    pub pending: PendingReferences,
}

impl ReplaceStage {
    pub fn new(
        config: &AssetConfig,
        store: Arc<ManifestStore>,
        manifest: &ManifestTarget,
        options: ReplaceOptions,
    ) -> Self {
        let asset_path = options
            .asset_path
            .unwrap_or_else(|| config.asset_path.clone());
        ReplaceStage {
            store,
            prefix_override: options.prefix.is_some(),
            prefix: options.prefix.unwrap_or_else(|| config.prefix.clone()),
            manifest_path: format!("{}{}", asset_path, manifest.basename),
            manifest_output: manifest.output_path.clone(),
            asset_path,
            interval: options.interval.unwrap_or_else(|| config.retry_interval()),
            repeat: options.repeat.unwrap_or(config.repeat),
        }
    }

    /// Start resolving `source`. Nothing happens until the resolution is stepped or run.
    pub fn resolution(&self, label: impl Into<String>, source: String) -> Resolution<'_> {
        Resolution {
            stage: self,
            label: label.into(),
            source,
            state: ResolutionState::Scanning,
            retries: 0,
            deadline: retry_deadline(Instant::now(), self.interval, self.repeat),
            awaiting: BTreeSet::new(),
            last_pass: None,
        }
    }

    /// Resolve one file and hand it downstream, together with an error signal when references
    /// are left unresolved.
    pub async fn process(&self, mut file: AssetFile, sink: &StageSink) -> Result<(), AssetError> {
        let source = match String::from_utf8(std::mem::take(&mut file.contents)) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    "[ReplaceStage] {:?} is not valid UTF-8, passing it through unchanged",
                    file.path
                );
                file.contents = e.into_bytes();
                return sink.push(file);
            }
        };

        let basename = file.basename();
        let outcome = self.resolution(basename.clone(), source).run().await;
        if let Some(error) = outcome.pending.into_error(&basename) {
            tracing::error!("[ReplaceStage] {}", error);
            sink.error(error)?;
        }
        file.contents = outcome.contents.into_bytes();
        sink.push(file)
    }

    /// Substitute every reference the manifest can currently resolve, leaving the rest intact.
    pub fn substitute(&self, text: &str) -> SubstitutionPass {
        let mut pass = SubstitutionPass {
            output: String::with_capacity(text.len()),
            ..Default::default()
        };
        let mut cursor = 0;
        for reference in scan(text) {
            pass.output.push_str(&text[cursor..reference.range.start]);
            cursor = reference.range.end;
            match self.resolve(&reference) {
                Ok(resolved) => {
                    pass.pending.mark(reference.raw, true);
                    pass.output.push_str(&resolved);
                }
                Err(logical_path) => {
                    pass.pending.mark(reference.raw, false);
                    pass.missing.insert(logical_path);
                    pass.output.push_str(reference.raw);
                }
            }
        }
        pass.output.push_str(&text[cursor..]);
        pass
    }

    /// The substitution for `reference`, or its logical path when the manifest has no entry.
    fn resolve(&self, reference: &AssetReference<'_>) -> Result<String, String> {
        if reference.is_bare() {
            return Ok(self.asset_path.clone());
        }
        let logical_path = reference.logical_path(&self.asset_path);
        if logical_path == self.manifest_path {
            return Ok(format!("{}{}", self.prefix.first(), self.manifest_output));
        }
        match self.store.lookup(&logical_path) {
            Some(entry) if self.prefix_override => Ok(entry.prefixed_with(&self.prefix)),
            Some(entry) => Ok(entry.prefixed_path),
            None => Err(logical_path),
        }
    }
}

impl Stage for ReplaceStage {
    fn name(&self) -> &'static str {
        "replace"
    }

    async fn transform(&self, file: AssetFile, sink: &StageSink) -> Result<(), AssetError> {
        self.process(file, sink).await
    }
}

/// Roughly thirty years; stands in for "never" when the budget does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + interval * repeat`, saturating instead of overflowing.
fn retry_deadline(start: Instant, interval: Duration, repeat: u32) -> Instant {
    interval
        .checked_mul(repeat)
        .and_then(|budget| start.checked_add(budget))
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Resolution of a single file's references against the manifest.
pub struct Resolution<'s> {
    stage: &'s ReplaceStage,
    label: String,
    source: String,
    state: ResolutionState,
    retries: u32,
    deadline: Instant,
    awaiting: BTreeSet<String>,
    last_pass: Option<SubstitutionPass>,
}

impl Resolution<'_> {
    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Start + `interval * repeat`. No waiting happens past this instant; only the final scan can
    /// run later.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Logical paths being polled for while in [`ResolutionState::Waiting`].
    pub fn awaiting(&self) -> &BTreeSet<String> {
        &self.awaiting
    }

    /// Advance one transition. Terminal states are returned unchanged.
    pub async fn step(&mut self) -> ResolutionState {
        match self.state {
            ResolutionState::Scanning => {
                let pass = self.stage.substitute(&self.source);
                self.state = if pass.pending.all_resolved() {
                    tracing::debug!(
                        "[ReplaceStage] {}: resolved {} reference(s) after {} retries",
                        self.label,
                        pass.pending.len(),
                        self.retries
                    );
                    ResolutionState::Resolved
                } else if self.retries >= self.stage.repeat {
                    ResolutionState::Exhausted
                } else {
                    self.awaiting = pass.missing.clone();
                    ResolutionState::Waiting
                };
                self.last_pass = Some(pass);
            }
            ResolutionState::Waiting => {
                self.retries += 1;
                tracing::debug!(
                    "[ReplaceStage] {}: waiting on {} asset(s), retry {}/{}",
                    self.label,
                    self.awaiting.len(),
                    self.retries,
                    self.stage.repeat
                );
                sleep(self.stage.interval).await;
                let still_missing = self.stage.store.missing(&self.awaiting);
                if still_missing.is_empty() || self.retries >= self.stage.repeat {
                    self.state = ResolutionState::Scanning;
                } else {
                    self.awaiting = still_missing.into_iter().collect();
                }
            }
            ResolutionState::Resolved | ResolutionState::Exhausted => {}
        }
        self.state
    }

    /// Step until resolved or exhausted.
    pub async fn run(mut self) -> ResolutionOutcome {
        while !self.state.is_terminal() {
            self.step().await;
        }
        let pass = self.last_pass.unwrap_or_else(|| SubstitutionPass {
            output: self.source,
            ..Default::default()
        });
        ResolutionOutcome {
            contents: pass.output,
            state: self.state,
            retries: self.retries,
            pending: pass.pending,
        }
    }
}
