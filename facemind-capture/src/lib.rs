pub mod embedding;
pub mod source;
pub mod stabilizer;

// Re-export commonly used types
pub use embedding::{read_embedding, Embedding, EmbeddingError};
pub use source::{Frame, FrameSource, JsonLinesSource};
pub use stabilizer::{capture, CaptureState, Stabilizer};
