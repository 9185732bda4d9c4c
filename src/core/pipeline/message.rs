//! Values carried on the inter-stage channels.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A file submitted for identification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTask {
    pub path: PathBuf,
}

impl FileTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Envelope for every inter-stage channel.
///
/// `EndOfStream` tells the receiving stage to finish and pass the
/// marker on to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageMessage<T> {
    Item(T),
    EndOfStream,
}

impl<T> StageMessage<T> {
    pub fn is_end(&self) -> bool {
        matches!(self, StageMessage::EndOfStream)
    }
}
