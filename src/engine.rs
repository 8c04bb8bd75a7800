use crate::config::Config;
use crate::error::Result;
use crate::gallery::Gallery;
use crate::matcher::{MatchResult, Matcher};
use crate::storage::GalleryStore;
use facemind_capture::{Embedding, Frame};
use log::debug;

/// Enrollment and recognition over one gallery
pub struct Engine<S> {
    gallery: Gallery<S>,
    matcher: Matcher,
}

impl<S: GalleryStore> Engine<S> {
    pub fn new(gallery: Gallery<S>, matcher: Matcher) -> Self {
        Self { gallery, matcher }
    }

    pub fn open(store: S, cfg: &Config) -> Result<Self> {
        let gallery = Gallery::open_with_dimension(store, cfg.dimension)?;
        Ok(Self::new(gallery, Matcher::new(cfg.batch_size)))
    }

    pub fn enroll(&self, name: &str, embedding: &Embedding) -> Result<()> {
        self.gallery.enroll(name, embedding)
    }

    pub fn recognize(&self, embedding: &Embedding, threshold: f32) -> Result<MatchResult> {
        let snapshot = self.gallery.load();
        let result = self.matcher.best_match(&snapshot, embedding, threshold)?;
        debug!(
            "recognized {} with similarity {:.4} over {} identities",
            result.identity,
            result.similarity,
            snapshot.len()
        );
        Ok(result)
    }

    /// Recognize every face of one frame against the same snapshot
    pub fn recognize_all(
        &self,
        embeddings: &[Embedding],
        threshold: f32,
    ) -> Result<Vec<MatchResult>> {
        let snapshot = self.gallery.load();
        embeddings
            .iter()
            .map(|e| self.matcher.best_match(&snapshot, e, threshold))
            .collect()
    }

    /// Recognize every face of a frame; a frame without faces yields nothing
    pub fn recognize_frame(&self, frame: Frame, threshold: f32) -> Result<Vec<MatchResult>> {
        self.recognize_all(&frame.into_faces(), threshold)
    }

    pub fn top_k(&self, embedding: &Embedding, k: usize) -> Result<Vec<(String, f32)>> {
        self.matcher.top_k(&self.gallery.load(), embedding, k)
    }

    pub fn gallery(&self) -> &Gallery<S> {
        &self.gallery
    }
}
