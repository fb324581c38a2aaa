//! End-to-end builds of a small site through the public API.

mod common;

use assetrev::{
    config::{AssetConfig, ConfigProvider, TomlConfigProvider},
    fingerprint::fingerprint,
    pipeline::{read_tree, run_build, run_stage, write_outputs},
    stage::AssetPipeline,
    AssetError,
};
use common::{create_test_site, init_logging, write_file};
use std::{collections::BTreeMap, path::Path, sync::Arc, time::Duration};

fn dest(root: &Path, output_path: &str) -> std::path::PathBuf {
    root.join("dist").join(output_path.trim_start_matches('/'))
}

fn read_manifest(path: &Path) -> BTreeMap<String, String> {
    let text = std::fs::read_to_string(path).unwrap();
    let json = text
        .strip_prefix("window.assetManifest = ")
        .and_then(|rest| rest.strip_suffix(";\n"))
        .unwrap();
    serde_json::from_str(json).unwrap()
}

#[tokio::test]
async fn test_build_site() {
    init_logging();
    let temp_dir = tempfile::tempdir().unwrap();
    let root = create_test_site(&temp_dir);
    let config = AssetConfig {
        interval: 10,
        ..Default::default()
    };
    let pipeline = AssetPipeline::with_startup_stamp(config.clone(), &root, "5eed5eed");

    let files = read_tree(&root, &config).await.unwrap();
    let output = run_build(&pipeline, files).await.unwrap();
    assert!(output.errors.is_empty(), "{:?}", output.errors);
    write_outputs(&output.files, &config).await.unwrap();

    let store = pipeline.store();
    let logo = store.lookup("/assets/img/logo.svg").unwrap();
    let css = store.lookup("/assets/styles/app.css").unwrap();
    let js = store.lookup("/assets/js/main.js").unwrap();

    // The stylesheet is fingerprinted after its references were rewritten.
    let css_contents = std::fs::read_to_string(dest(&root, &css.output_path)).unwrap();
    assert_eq!(
        css_contents,
        format!(
            "header {{ background: url({}) no-repeat; }}\n",
            logo.output_path
        )
    );
    assert_eq!(
        css.output_path,
        format!(
            "/assets/styles/app-{}.css",
            fingerprint(css_contents.as_bytes())
        )
    );

    let html = std::fs::read_to_string(root.join("dist/index.html")).unwrap();
    assert!(html.contains(&format!("href=\"{}\"", css.output_path)));
    assert!(html.contains(&format!("src=\"{}\"", js.output_path)));
    assert!(html.contains("src=\"/assets/manifest-5eed5eed.js\""));
    assert!(!html.contains("asset:/"));

    let script = std::fs::read_to_string(dest(&root, &js.output_path)).unwrap();
    assert!(script.starts_with("const base = '/assets/';"));

    let manifest_file = pipeline.manifest().target().file.clone();
    assert_eq!(manifest_file, root.join("dist/assets/manifest-5eed5eed.js"));
    let manifest = read_manifest(&manifest_file);
    assert_eq!(manifest.len(), 3);
    assert_eq!(manifest["/assets/styles/app.css"], css.prefixed_path);
    assert_eq!(manifest["/assets/img/logo.svg"], logo.prefixed_path);
}

#[tokio::test]
async fn test_unresolved_reference_is_reported_once() {
    init_logging();
    let temp_dir = tempfile::tempdir().unwrap();
    let root = create_test_site(&temp_dir);
    write_file(
        &root,
        "src/about.html",
        "<img src=\"asset://img/missing.png\"><img src=\"asset://img/missing.png\">",
    );
    let config = AssetConfig {
        interval: 10,
        repeat: 2,
        ..Default::default()
    };
    let pipeline = AssetPipeline::new(config.clone(), &root);

    let files = read_tree(&root, &config).await.unwrap();
    let count = files.len();
    let output = run_build(&pipeline, files).await.unwrap();

    assert_eq!(output.files.len(), count, "every file is still emitted");
    assert_eq!(output.errors.len(), 1);
    assert!(output.has_unresolved());
    match &output.errors[0] {
        AssetError::UnresolvedReferences { file, references } => {
            assert_eq!(file, "about.html");
            assert_eq!(references, &vec!["asset://img/missing.png".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    let message = output.errors[0].to_string();
    assert!(message.contains("\"interval\""));
    assert!(message.contains("\"repeat\""));
}

#[tokio::test]
async fn test_missing_image_only_fails_its_stylesheet() {
    init_logging();
    let temp_dir = tempfile::tempdir().unwrap();
    let root = create_test_site(&temp_dir);
    write_file(
        &root,
        "src/assets/styles/app.css",
        "header { background: url(asset://img/logo.svg); }\nfooter { background: url(asset://img/missing.png); }\n",
    );
    let config = AssetConfig {
        interval: 10,
        repeat: 3,
        ..Default::default()
    };
    let pipeline = AssetPipeline::new(config.clone(), &root);

    let files = read_tree(&root, &config).await.unwrap();
    let output = run_build(&pipeline, files).await.unwrap();

    assert_eq!(output.errors.len(), 1, "{:?}", output.errors);
    match &output.errors[0] {
        AssetError::UnresolvedReferences { file, references } => {
            assert_eq!(file, "app.css");
            assert_eq!(references, &vec!["asset://img/missing.png".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }

    let css = pipeline.store().lookup("/assets/styles/app.css").unwrap();
    let html = output
        .files
        .iter()
        .find(|f| f.basename() == "index.html")
        .unwrap()
        .text();
    assert!(html.contains(&format!("href=\"{}\"", css.output_path)));
    assert!(!html.contains("asset://styles/app.css"));
}

#[tokio::test]
async fn test_late_registration_resolves_across_stages() {
    init_logging();
    let temp_dir = tempfile::tempdir().unwrap();
    let root = create_test_site(&temp_dir);
    let config = AssetConfig {
        interval: 10,
        repeat: 50,
        ..Default::default()
    };
    let pipeline = AssetPipeline::new(config.clone(), &root);
    let files = read_tree(&root, &config).await.unwrap();
    let (pages, assets): (Vec<_>, Vec<_>) = files
        .into_iter()
        .partition(|file| file.basename() == "index.html");

    let replace = Arc::new(pipeline.replace());
    let rev = Arc::new(pipeline.rev());
    let (pages_out, assets_out) = tokio::join!(run_stage(replace, pages), async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        run_stage(rev, assets).await
    });
    let pages_out = pages_out.unwrap();
    assert!(assets_out.unwrap().errors.is_empty());
    assert!(pages_out.errors.is_empty(), "{:?}", pages_out.errors);

    let html = pages_out.files[0].text();
    let css = pipeline.store().lookup("/assets/styles/app.css").unwrap();
    assert!(html.contains(&css.output_path));
}

#[tokio::test]
async fn test_prefix_pool_from_config_file() {
    init_logging();
    let temp_dir = tempfile::tempdir().unwrap();
    let root = create_test_site(&temp_dir);
    let config_path = write_file(
        &root,
        "assetrev.toml",
        "prefix = [\"//a.example.com\", \"//b.example.com\"]\ninterval = 10\n",
    );
    let config = TomlConfigProvider::new(config_path).load().unwrap();
    let pipeline = AssetPipeline::with_startup_stamp(config.clone(), &root, "5eed5eed");

    let files = read_tree(&root, &config).await.unwrap();
    let output = run_build(&pipeline, files).await.unwrap();
    assert!(output.errors.is_empty(), "{:?}", output.errors);

    let store = pipeline.store();
    let mut prefixes: Vec<String> = store
        .snapshot()
        .values()
        .map(|prefixed| prefixed.split("/assets/").next().unwrap().to_string())
        .collect();
    prefixes.sort();
    prefixes.dedup();
    assert_eq!(prefixes, vec!["//a.example.com", "//b.example.com"]);

    let html = output
        .files
        .iter()
        .find(|f| f.basename() == "index.html")
        .unwrap()
        .text();
    assert!(html.contains("src=\"//a.example.com/assets/manifest-5eed5eed.js\""));
    let css = store.lookup("/assets/styles/app.css").unwrap();
    assert!(html.contains(&format!("href=\"{}\"", css.prefixed_path)));
}

#[tokio::test]
async fn test_hashed_build_removes_unhashed_outputs() {
    init_logging();
    let temp_dir = tempfile::tempdir().unwrap();
    let root = create_test_site(&temp_dir);

    let plain = AssetConfig {
        hash: false,
        interval: 10,
        ..Default::default()
    };
    let first = AssetPipeline::new(plain.clone(), &root);
    let output = run_build(&first, read_tree(&root, &plain).await.unwrap())
        .await
        .unwrap();
    write_outputs(&output.files, &plain).await.unwrap();
    let unhashed = root.join("dist/assets/img/logo.svg");
    assert!(unhashed.exists());

    let hashed = AssetConfig {
        interval: 10,
        ..Default::default()
    };
    let second = AssetPipeline::new(hashed.clone(), &root);
    let output = run_build(&second, read_tree(&root, &hashed).await.unwrap())
        .await
        .unwrap();
    write_outputs(&output.files, &hashed).await.unwrap();

    assert!(!unhashed.exists());
    let logo = second.store().lookup("/assets/img/logo.svg").unwrap();
    assert!(dest(&root, &logo.output_path).exists());
}
