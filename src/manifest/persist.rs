//! Debounced persistence of the manifest as a loadable script.
//!
//! The artifact is a single file assigning the manifest map to a global binding:
//!
//! ```text
//! window.assetManifest = {"/assets/app.css":"/assets/app-1a2b3c4d.css"};
//! ```
//!
//! Its filename carries a fingerprint computed once when the [`ManifestTarget`] is built (from the
//! startup time, not the contents), so rewrites during a run always land on the same file.
//!
//! [`ManifestWriter::schedule_write`] may be called any number of times. Calls arriving within the
//! quiet window of each other collapse into one write that happens one window after the last call.

use once_cell::sync::OnceCell;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    time::timeout,
};

use crate::{
    config::AssetConfig,
    error::AssetError,
    manifest::ManifestStore,
    paths::{dest_path, split_extension},
};

pub const DEFAULT_MANIFEST_DEBOUNCE: Duration = Duration::from_millis(250);

/// Where the manifest lives, both as referenced from content and on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestTarget {
    /// Manifest template basename, e.g. `manifest.js`.
    pub basename: String,
    /// `assetPath + manifest basename`; the logical path references use to reach the manifest.
    pub declared_path: String,
    /// `assetPath + stem + '-' + startup fingerprint + ext`.
    pub output_path: String,
    pub global_var: String,
    /// Physical location under `root/dest`.
    pub file: PathBuf,
}

impl ManifestTarget {
    pub fn new(config: &AssetConfig, root: &Path, startup_stamp: &str) -> Self {
        let basename = Path::new(&config.manifest)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| config.manifest.clone());
        let (stem, ext) = split_extension(&basename);
        let output_path = format!("{}{}-{}{}", config.asset_path, stem, startup_stamp, ext);
        ManifestTarget {
            declared_path: format!("{}{}", config.asset_path, basename),
            file: dest_path(root, &config.dest, &output_path),
            output_path,
            global_var: config.global_var.clone(),
            basename,
        }
    }

    pub fn render(&self, snapshot: &BTreeMap<String, String>) -> Result<String, AssetError> {
        Ok(format!(
            "{} = {};\n",
            self.global_var,
            serde_json::to_string(snapshot)?
        ))
    }
}

enum WriteRequest {
    Schedule,
    Flush(oneshot::Sender<Result<(), AssetError>>),
}

pub struct ManifestWriter {
    target: ManifestTarget,
    store: Arc<ManifestStore>,
    window: Duration,
    writes: Arc<AtomicUsize>,
    tx: OnceCell<UnboundedSender<WriteRequest>>,
}

impl ManifestWriter {
    pub fn new(target: ManifestTarget, store: Arc<ManifestStore>) -> Self {
        Self::with_window(target, store, DEFAULT_MANIFEST_DEBOUNCE)
    }

    pub fn with_window(target: ManifestTarget, store: Arc<ManifestStore>, window: Duration) -> Self {
        ManifestWriter {
            target,
            store,
            window,
            writes: Arc::new(AtomicUsize::new(0)),
            tx: OnceCell::new(),
        }
    }

    pub fn target(&self) -> &ManifestTarget {
        &self.target
    }

    /// Number of completed manifest writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Request a write once the quiet window passes without further requests. Must be called from
    /// within a tokio runtime; the writer task is spawned on first use.
    pub fn schedule_write(&self) {
        if self.sender().send(WriteRequest::Schedule).is_err() {
            tracing::warn!("[ManifestWriter] Writer task has stopped, dropping write request");
        }
    }

    /// Write now, folding in any pending debounced write, and report the outcome.
    pub async fn flush(&self) -> Result<(), AssetError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.sender()
            .send(WriteRequest::Flush(done_tx))
            .map_err(|_| AssetError::Pipeline("manifest writer task has stopped".to_string()))?;
        done_rx
            .await
            .map_err(|_| AssetError::Pipeline("manifest writer task has stopped".to_string()))?
    }

    fn sender(&self) -> &UnboundedSender<WriteRequest> {
        self.tx.get_or_init(|| {
            let (tx, rx) = unbounded_channel();
            tokio::spawn(run_writer(
                rx,
                self.target.clone(),
                self.store.clone(),
                self.window,
                self.writes.clone(),
            ));
            tx
        })
    }
}

#[tracing::instrument(skip_all)]
async fn run_writer(
    mut rx: UnboundedReceiver<WriteRequest>,
    target: ManifestTarget,
    store: Arc<ManifestStore>,
    window: Duration,
    writes: Arc<AtomicUsize>,
) {
    tracing::debug!("[ManifestWriter] Starting writer for {:?}", target.file);
    while let Some(request) = rx.recv().await {
        let mut waiters = Vec::new();
        match request {
            WriteRequest::Flush(done) => waiters.push(done),
            WriteRequest::Schedule => loop {
                // Each request inside the window restarts the quiet period.
                match timeout(window, rx.recv()).await {
                    Ok(Some(WriteRequest::Schedule)) => continue,
                    Ok(Some(WriteRequest::Flush(done))) => {
                        waiters.push(done);
                        break;
                    }
                    Ok(None) | Err(_) => break,
                }
            },
        }

        let result = write_manifest(&target, &store).await;
        match &result {
            Ok(()) => {
                writes.fetch_add(1, Ordering::SeqCst);
                tracing::info!(
                    "[ManifestWriter] Wrote {} entries to {:?}",
                    store.len(),
                    target.file
                );
            }
            Err(e) => tracing::error!("[ManifestWriter] {}", e),
        }
        for done in waiters {
            done.send(result.clone()).ok();
        }
    }
    tracing::debug!("[ManifestWriter] Writer for {:?} stopped", target.file);
}

async fn write_manifest(target: &ManifestTarget, store: &ManifestStore) -> Result<(), AssetError> {
    let failed = |reason: String| AssetError::ManifestWrite {
        path: target.file.to_string_lossy().to_string(),
        reason,
    };
    let body = target.render(&store.snapshot())?;
    if let Some(parent) = target.file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| failed(e.to_string()))?;
    }
    tokio::fs::write(&target.file, body)
        .await
        .map_err(|e| failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrefixPool;

    fn target_in(root: &Path) -> ManifestTarget {
        ManifestTarget::new(&AssetConfig::default(), root, "cafebabe")
    }

    #[test]
    fn test_target_paths() {
        let target = target_in(Path::new("/work"));
        assert_eq!(target.declared_path, "/assets/manifest.js");
        assert_eq!(target.output_path, "/assets/manifest-cafebabe.js");
        assert_eq!(
            target.file,
            PathBuf::from("/work/dist/assets/manifest-cafebabe.js")
        );
    }

    #[test]
    fn test_render_is_global_assignment() {
        let target = target_in(Path::new("/work"));
        let mut snapshot = BTreeMap::new();
        snapshot.insert(
            "/assets/app.css".to_string(),
            "/assets/app-1a2b3c4d.css".to_string(),
        );
        assert_eq!(
            target.render(&snapshot).unwrap(),
            "window.assetManifest = {\"/assets/app.css\":\"/assets/app-1a2b3c4d.css\"};\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bursts_coalesce_into_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ManifestStore::new());
        let writer = ManifestWriter::new(target_in(dir.path()), store.clone());

        for i in 0..20 {
            store.register(
                &format!("/assets/{i}.png"),
                &format!("/assets/{i}-x.png"),
                &PrefixPool::none(),
            );
            writer.schedule_write();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(writer.writes(), 0, "still inside the quiet window");

        tokio::time::sleep(DEFAULT_MANIFEST_DEBOUNCE * 2).await;
        assert_eq!(writer.writes(), 1);

        let written = std::fs::read_to_string(&writer.target().file).unwrap();
        assert!(written.starts_with("window.assetManifest = {"));
        assert!(written.contains("\"/assets/19.png\":\"/assets/19-x.png\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_triggers_write_separately() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ManifestStore::new());
        let writer = ManifestWriter::with_window(
            target_in(dir.path()),
            store.clone(),
            Duration::from_millis(50),
        );

        writer.schedule_write();
        tokio::time::sleep(Duration::from_millis(200)).await;
        writer.schedule_write();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(writer.writes(), 2);
    }

    #[tokio::test]
    async fn test_flush_writes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ManifestStore::new());
        let writer = ManifestWriter::with_window(
            target_in(dir.path()),
            store.clone(),
            Duration::from_secs(60),
        );
        store.register("/assets/a.css", "/assets/a-1.css", &PrefixPool::none());
        writer.schedule_write();
        writer.flush().await.unwrap();
        assert_eq!(writer.writes(), 1);
        assert!(writer.target().file.exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the destination directory should be.
        std::fs::write(dir.path().join("dist"), b"not a directory").unwrap();
        let writer = ManifestWriter::new(target_in(dir.path()), Arc::new(ManifestStore::new()));
        let result = writer.flush().await;
        assert!(matches!(result, Err(AssetError::ManifestWrite { .. })));
        assert_eq!(writer.writes(), 0);
    }
}
