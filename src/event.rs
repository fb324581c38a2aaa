use std::fmt::{Display, Formatter};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{asset::AssetFile, error::AssetError};

/// What a stage hands downstream: a finished file, or an error signal that does not stop the
/// rest of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    File(AssetFile),
    Error(AssetError),
}

impl Display for PipelineEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PipelineEvent::File(file) => write!(f, "File({file})"),
            PipelineEvent::Error(e) => write!(f, "Error({e})"),
        }
    }
}

/// Downstream end of a stage. Cheap to clone; one per pipeline run is typical.
#[derive(Debug, Clone)]
pub struct StageSink {
    tx: UnboundedSender<PipelineEvent>,
}

impl StageSink {
    pub fn channel() -> (StageSink, UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = unbounded_channel();
        (StageSink { tx }, rx)
    }

    pub fn push(&self, file: AssetFile) -> Result<(), AssetError> {
        Ok(self.tx.send(PipelineEvent::File(file))?)
    }

    pub fn error(&self, error: AssetError) -> Result<(), AssetError> {
        Ok(self.tx.send(PipelineEvent::Error(error))?)
    }
}
