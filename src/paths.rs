//! Path helpers shared by the stages: logical keys, revisioned names and destination locations.
//!
//! Logical and output paths are always `/`-separated and rooted (`/assets/app.css`), regardless
//! of the host path separator, so they can be compared against `assetPath + suffix` strings
//! pulled out of text content.
use std::path::{Component, Path, PathBuf};

use crate::error::AssetError;

/// Render a relative path as a rooted, `/`-separated string.
pub fn to_slash(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                out.push('/');
                out.push_str(&part.to_string_lossy());
            }
            Component::ParentDir => out.push_str("/.."),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// The logical path of `path`: the path with `root` stripped, rendered by [`to_slash`].
pub fn logical_path(root: &Path, path: &Path) -> Result<String, AssetError> {
    Ok(to_slash(path.strip_prefix(root)?))
}

/// `dir/stem-<fingerprint>.ext`, or `path` unchanged when no fingerprint is given.
pub fn revisioned_path(path: &Path, fingerprint: Option<&str>) -> Result<PathBuf, AssetError> {
    let Some(fingerprint) = fingerprint else {
        return Ok(path.to_path_buf());
    };
    let stem = path
        .file_stem()
        .ok_or_else(|| {
            AssetError::Fingerprint(format!("cannot derive a revisioned name for {path:?}"))
        })?
        .to_string_lossy();
    let filename = match path.extension() {
        Some(ext) => format!("{stem}-{fingerprint}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{fingerprint}"),
    };
    Ok(path.with_file_name(filename))
}

/// Physical location of an output path (as stored in the manifest) under `cwd/dest`.
pub fn dest_path(cwd: &Path, dest: &Path, output_path: &str) -> PathBuf {
    let mut full = cwd.join(dest);
    for part in output_path.split('/').filter(|p| !p.is_empty()) {
        full.push(part);
    }
    full
}

/// Split `name.ext` into (`name`, `.ext`). Names without an extension return an empty extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(dot) => name.split_at(dot),
    }
}
