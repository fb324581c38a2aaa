//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Create a small site under `<temp_dir>/site/src` and return the project root.
///
/// Layout:
/// - `assets/styles/app.css` referencing `assets/img/logo.svg`
/// - `assets/img/logo.svg`
/// - `assets/js/main.js` using the bare marker and the manifest
/// - `index.html` referencing the stylesheet, the script and the manifest
#[allow(dead_code)]
pub fn create_test_site(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("site");
    write_file(
        &root,
        "src/assets/styles/app.css",
        "header { background: url(asset://img/logo.svg) no-repeat; }\n",
    );
    write_file(
        &root,
        "src/assets/img/logo.svg",
        "<svg xmlns=\"http://www.w3.org/2000/svg\"/>\n",
    );
    write_file(
        &root,
        "src/assets/js/main.js",
        "const base = 'asset://';\nconst manifest = window.assetManifest;\n",
    );
    write_file(
        &root,
        "src/index.html",
        r#"<!doctype html>
<html>
<head>
  <link rel="stylesheet" href="asset://styles/app.css">
  <script src="asset://manifest.js"></script>
  <script src="asset://js/main.js"></script>
</head>
<body></body>
</html>
"#,
    );
    root
}

#[allow(dead_code)]
pub fn write_file(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    path
}
