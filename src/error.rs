use std::{io, path::StripPrefixError};

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as TokioSendError;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

use crate::event::PipelineEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum AssetError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Fingerprint error: {0}")]
    Fingerprint(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    #[error("Failed to write asset manifest {path}: {reason}")]
    ManifestWrite { path: String, reason: String },
    #[error("{file}: Stalled or unable to process asset url: {}. This can occur if the file doesn't exist or is very large and takes time to process. You can update the \"interval\" or \"repeat\" options.", .references.join(", "))]
    UnresolvedReferences {
        file: String,
        references: Vec<String>,
    },
}

impl AssetError {
    /// True for errors that name references the manifest never caught up with.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, AssetError::UnresolvedReferences { .. })
    }
}

impl From<StripPrefixError> for AssetError {
    fn from(src: StripPrefixError) -> AssetError {
        AssetError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for AssetError {
    fn from(src: toml::de::Error) -> AssetError {
        AssetError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for AssetError {
    fn from(src: JsonError) -> AssetError {
        AssetError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for AssetError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => AssetError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => AssetError::PermissionDenied,
            _ => AssetError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for AssetError {
    fn from(x: walkdir::Error) -> Self {
        match x.into_io_error() {
            Some(io_error) => io_error.into(),
            None => AssetError::Io("directory walk hit a filesystem loop".to_string()),
        }
    }
}

impl From<TokioSendError<PipelineEvent>> for AssetError {
    fn from(x: TokioSendError<PipelineEvent>) -> Self {
        AssetError::Pipeline(format!(
            "Channel send Error, could not transmit pipeline event {}",
            x.0
        ))
    }
}

impl From<tokio::task::JoinError> for AssetError {
    fn from(x: tokio::task::JoinError) -> Self {
        AssetError::Pipeline(format!("Stage task failed to complete: {x}"))
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for AssetError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => AssetError::Io(format!(
                "notify-debouncer: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => AssetError::Io(format!(
                "notify-debouncer: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => AssetError::NotFound(format!(
                "notify-debouncer: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => AssetError::NotFound(format!(
                "notify-debouncer: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                AssetError::Config("notify-debouncer invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => {
                AssetError::Io("notify-debouncer max file watch limit reached".to_string())
            }
        }
    }
}
