//! Shared test utilities

use std::path::Path;

use crate::{asset::AssetFile, config::AssetConfig, stage::AssetPipeline};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Write `(relative path, contents)` pairs under `root`, creating directories as needed.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

/// An in-memory file under `root/src`.
pub fn src_file(root: &Path, rel: &str, contents: &str) -> AssetFile {
    AssetFile::new(root, root.join("src").join(rel), contents)
}

/// A pipeline with a fixed manifest stamp and a fast retry budget.
pub fn test_pipeline(root: &Path, interval_ms: u64, repeat: u32) -> AssetPipeline {
    init_logging();
    let config = AssetConfig {
        interval: interval_ms,
        repeat,
        ..Default::default()
    };
    AssetPipeline::with_startup_stamp(config, root, "0badf00d")
}
