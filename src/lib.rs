pub mod config;
pub mod engine;
pub mod error;
pub mod gallery;
pub mod matcher;
pub mod storage;

pub use engine::Engine;
pub use error::{Error, Result};
pub use gallery::{Gallery, Snapshot};
pub use matcher::{cosine_similarity, Identity, MatchResult, Matcher};
pub use storage::{FaceRecord, FileStore, GalleryStore, MemoryStore};

// Re-export capture types for convenience
pub use facemind_capture::{
    capture, read_embedding, CaptureState, Embedding, EmbeddingError, Frame, FrameSource,
    JsonLinesSource, Stabilizer,
};
