//! # assetrev
//!
//! Asset revisioning for build pipelines: fingerprinted filenames, a shared manifest, and
//! rewriting of `asset://` references to the revisioned paths.
//!
//! ## Overview
//!
//! A build runs two kinds of stage over a stream of files:
//!
//! - **rev** renames each asset after a fingerprint of its contents (`app.css` becomes
//!   `app-1a2b3c4d.css`), records `logical path -> output path` in the shared manifest, and
//!   optionally deletes the output a previous revision of the same asset left behind.
//! - **replace** rewrites every `asset://some/path` reference in text content to the
//!   (optionally CDN-prefixed) output path recorded in the manifest.
//!
//! Stages run concurrently and in no particular order. A file referencing an asset that has not
//! been revisioned yet waits for it, polling the manifest a bounded number of times before giving
//! up with an [`AssetError::UnresolvedReferences`] signal. The file is still emitted either way.
//!
//! The manifest is also written to disk as a small script (`window.assetManifest = {...};`) so
//! client code can resolve asset URLs at runtime. Writes are debounced: a burst of registrations
//! produces one write.
//!
//! ### Key Features
//!
//! - **Content fingerprints**: SHA-256 of the bytes, truncated to eight hex characters
//! - **Concurrent resolution**: references resolve as soon as the asset they name is registered
//! - **Prefix rotation**: entries take prefixes round-robin from a pool (e.g. several CDN hosts)
//! - **Error tolerance**: unresolved references are signalled, never fatal to the run
//! - **Stale output cleanup**: superseded revisions are removed from `dest`
//!
//! ## Architecture
//!
//! - **[`stage`]**: [`stage::AssetPipeline`] owns the shared state and builds the stages
//! - **[`manifest`]**: the manifest store and its debounced writer
//! - **[`pipeline`]**: driving stages over a directory tree
//! - **[`config`]**: configuration and its TOML provider
//! - **[`event`]**: what stages emit
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use assetrev::{
//!     config::AssetConfig,
//!     pipeline::{read_tree, run_build, write_outputs},
//!     stage::AssetPipeline,
//! };
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), assetrev::AssetError> {
//!     let root = Path::new("./site");
//!     let config = AssetConfig::default();
//!     let pipeline = AssetPipeline::new(config.clone(), root);
//!
//!     let files = read_tree(root, &config).await?;
//!     let output = run_build(&pipeline, files).await?;
//!     write_outputs(&output.files, &config).await?;
//!
//!     for error in &output.errors {
//!         eprintln!("{error}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: library only
//! - **service**: file watching (`notify`)
//! - **bin**: the `assetrev` command line tool

pub mod asset;
pub mod config;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod manifest;
pub mod paths;
pub mod pipeline;
pub mod stage;
#[cfg(test)]
mod tests;
#[cfg(feature = "service")]
pub mod watch;

pub use error::*;
