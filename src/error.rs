use facemind_capture::EmbeddingError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("identity name must not be empty")]
    EmptyName,

    #[error("identity {0:?} is already enrolled")]
    DuplicateName(String),

    #[error("embedding has dimension {actual} but the gallery expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid embedding: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("gallery I/O failed at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("gallery encoding failed at {path:?}")]
    Codec {
        path: PathBuf,
        #[source]
        source: postcard::Error,
    },

    #[error("corrupt gallery: {0}")]
    Corrupt(String),
}

impl Error {
    /// True for failures of the persistence layer rather than of the request
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Io { .. } | Error::Codec { .. } | Error::Corrupt(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
