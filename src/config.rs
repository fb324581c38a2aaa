//! Process-wide configuration for the `rev` and `replace` stages.
//!
//! [`AssetConfig`] holds the defaults; [`ConfigOverrides`] layers (from a TOML file, a CLI, or
//! code) are merged on top of it with later layers winning. Per-stage overrides live in
//! [`RevOptions`](crate::stage::RevOptions) and [`ReplaceOptions`](crate::stage::ReplaceOptions).

use crate::error::AssetError;
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
    time::Duration,
};

/// An ordered pool of URL prefixes. Entries are handed out by assignment index modulo the pool
/// length, so a pool of one behaves like a fixed prefix and an empty pool means no prefix.
///
/// Deserializes from either a single string or a list of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PrefixPool(Vec<String>);

impl PrefixPool {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PrefixPool(prefixes.into_iter().map(Into::into).collect())
    }

    pub fn none() -> Self {
        PrefixPool(Vec::new())
    }

    pub fn select(&self, index: u64) -> &str {
        if self.0.is_empty() {
            return "";
        }
        let slot = (index % self.0.len() as u64) as usize;
        &self.0[slot]
    }

    pub fn first(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for PrefixPool {
    fn from(prefix: &str) -> Self {
        PrefixPool(vec![prefix.to_string()])
    }
}

impl From<Vec<String>> for PrefixPool {
    fn from(prefixes: Vec<String>) -> Self {
        PrefixPool(prefixes)
    }
}

impl<'de> Deserialize<'de> for PrefixPool {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawPrefix {
            Single(String),
            Rotating(Vec<String>),
        }

        Ok(match RawPrefix::deserialize(deserializer)? {
            RawPrefix::Single(prefix) => PrefixPool(vec![prefix]),
            RawPrefix::Rotating(prefixes) => PrefixPool(prefixes),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetConfig {
    pub prefix: PrefixPool,
    /// Source root, relative to each file's `cwd`. Stripped to form logical paths.
    pub src: PathBuf,
    /// Destination root, relative to each file's `cwd`.
    pub dest: PathBuf,
    /// Base path that replaces the `asset://` marker.
    pub asset_path: String,
    /// Manifest basename template; the extension is kept and a startup fingerprint inserted.
    pub manifest: String,
    pub global_var: String,
    /// Milliseconds between resolution retries.
    pub interval: u64,
    pub repeat: u32,
    pub cleanup: bool,
    pub hash: bool,
    pub rev_extensions: Vec<String>,
    pub replace_extensions: Vec<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        AssetConfig {
            prefix: PrefixPool::from(""),
            src: PathBuf::from("src"),
            dest: PathBuf::from("dist"),
            asset_path: "/assets/".to_string(),
            manifest: "manifest.js".to_string(),
            global_var: "window.assetManifest".to_string(),
            interval: 100,
            repeat: 10,
            cleanup: true,
            hash: true,
            rev_extensions: [
                "css", "js", "png", "jpg", "jpeg", "gif", "svg", "webp", "woff", "woff2", "ttf",
                "eot", "ico",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
            replace_extensions: ["css", "html", "htm", "js"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl AssetConfig {
    /// Apply an override layer; only fields set in `overrides` change.
    pub fn merge(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(prefix) = overrides.prefix {
            self.prefix = prefix;
        }
        if let Some(src) = overrides.src {
            self.src = src;
        }
        if let Some(dest) = overrides.dest {
            self.dest = dest;
        }
        if let Some(asset_path) = overrides.asset_path {
            self.asset_path = asset_path;
        }
        if let Some(manifest) = overrides.manifest {
            self.manifest = manifest;
        }
        if let Some(global_var) = overrides.global_var {
            self.global_var = global_var;
        }
        if let Some(interval) = overrides.interval {
            self.interval = interval;
        }
        if let Some(repeat) = overrides.repeat {
            self.repeat = repeat;
        }
        if let Some(cleanup) = overrides.cleanup {
            self.cleanup = cleanup;
        }
        if let Some(hash) = overrides.hash {
            self.hash = hash;
        }
        if let Some(rev_extensions) = overrides.rev_extensions {
            self.rev_extensions = rev_extensions;
        }
        if let Some(replace_extensions) = overrides.replace_extensions {
            self.replace_extensions = replace_extensions;
        }
        self
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    /// Checks that would otherwise surface as confusing lookups later on.
    pub fn validate(&self) -> Result<(), AssetError> {
        if self.manifest.trim().is_empty() {
            return Err(AssetError::Config("manifest name cannot be empty".to_string()));
        }
        if self.global_var.trim().is_empty() {
            return Err(AssetError::Config("globalVar cannot be empty".to_string()));
        }
        if self.src == self.dest {
            return Err(AssetError::Config(format!(
                "src and dest must differ, both are {:?}",
                self.src
            )));
        }
        Ok(())
    }

    pub fn is_rev_target(&self, path: &Path) -> bool {
        has_extension(path, &self.rev_extensions)
    }

    pub fn is_replace_target(&self, path: &Path) -> bool {
        has_extension(path, &self.replace_extensions)
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// A partial configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigOverrides {
    pub prefix: Option<PrefixPool>,
    pub src: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub asset_path: Option<String>,
    pub manifest: Option<String>,
    pub global_var: Option<String>,
    pub interval: Option<u64>,
    pub repeat: Option<u32>,
    pub cleanup: Option<bool>,
    pub hash: Option<bool>,
    pub rev_extensions: Option<Vec<String>>,
    pub replace_extensions: Option<Vec<String>>,
}

pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Result<AssetConfig, AssetError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn overrides(&self) -> Result<ConfigOverrides, AssetError> {
        tracing::debug!("Attempting to read asset config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(ConfigOverrides::default());
        }
        let content = read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn load(&self) -> Result<AssetConfig, AssetError> {
        let config = AssetConfig::default().merge(self.overrides()?);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_prefix_pool_rotation() {
        let pool = PrefixPool::new(["//cdn0", "//cdn1", "//cdn2"]);
        assert_eq!(pool.select(0), "//cdn0");
        assert_eq!(pool.select(4), "//cdn1");
        assert_eq!(pool.select(3), pool.select(0));
        assert_eq!(pool.first(), "//cdn0");

        let empty = PrefixPool::none();
        assert_eq!(empty.select(7), "");
        assert_eq!(empty.first(), "");
    }

    #[test]
    fn test_prefix_from_string_or_list() {
        let single: ConfigOverrides = toml::from_str(r#"prefix = "//cdn.example.com""#).unwrap();
        assert_eq!(single.prefix, Some(PrefixPool::from("//cdn.example.com")));

        let list: ConfigOverrides = toml::from_str(r#"prefix = ["//a", "//b"]"#).unwrap();
        assert_eq!(list.prefix.map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_merge_later_layers_win() {
        let first: ConfigOverrides = toml::from_str(
            r#"
            assetPath = "/static/"
            repeat = 3
            "#,
        )
        .unwrap();
        let second = ConfigOverrides {
            repeat: Some(5),
            hash: Some(false),
            ..Default::default()
        };
        let config = AssetConfig::default().merge(first).merge(second);
        assert_eq!(config.asset_path, "/static/");
        assert_eq!(config.repeat, 5);
        assert!(!config.hash);
        assert_eq!(config.interval, 100);
        assert_eq!(config.src, PathBuf::from("src"));
    }

    #[test]
    fn test_toml_provider_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("assetrev.toml"));
        assert_eq!(provider.load().unwrap(), AssetConfig::default());
    }

    #[test]
    fn test_toml_provider_rejects_same_src_and_dest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assetrev.toml");
        std::fs::write(&path, "src = \"web\"\ndest = \"web\"\n").unwrap();
        let provider = TomlConfigProvider::new(path);
        assert!(matches!(provider.load(), Err(AssetError::Config(_))));
    }

    #[test]
    fn test_extension_classification() {
        let config = AssetConfig::default();
        assert!(config.is_rev_target(Path::new("a/b.PNG")));
        assert!(!config.is_replace_target(Path::new("a/b.png")));
        assert!(config.is_replace_target(Path::new("index.html")));
        assert!(!config.is_rev_target(Path::new("README")));
    }
}
