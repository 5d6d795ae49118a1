use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("read failed at offset {offset}: {source}")]
    StreamRead {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build marker automaton: {0}")]
    PatternBuild(#[from] aho_corasick::BuildError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    pub(crate) fn read_at(offset: u64, source: io::Error) -> Self {
        Self::StreamRead { offset, source }
    }
}

/// Failure reported by an [`ArtifactSink`](crate::ArtifactSink).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Artifact already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Storage error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
