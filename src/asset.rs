use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
};

/// A file-like record flowing through a stage: absolute `path`, raw `contents`, and the `cwd`
/// that `src`/`dest` roots are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub cwd: PathBuf,
}

impl AssetFile {
    pub fn new(cwd: impl Into<PathBuf>, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        AssetFile {
            path: path.into(),
            contents: contents.into(),
            cwd: cwd.into(),
        }
    }

    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Contents decoded as text; invalid UTF-8 sequences are replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).to_string()
    }
}

impl Display for AssetFile {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{} ({} bytes)", self.path.display(), self.contents.len())
    }
}
