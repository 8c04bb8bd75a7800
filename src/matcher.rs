use crate::error::{Error, Result};
use crate::gallery::Snapshot;
use facemind_capture::Embedding;
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use std::fmt;

pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Label reported when nothing clears the threshold
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Known(name) => Some(name),
            Identity::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or(UNKNOWN))
    }
}

/// Outcome of one recognition. `similarity` is the best score found even
/// when it did not clear the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Identity,
    pub similarity: f32,
}

impl MatchResult {
    pub fn unknown(similarity: f32) -> Self {
        Self {
            identity: Identity::Unknown,
            similarity,
        }
    }
}

/// Nearest-neighbour search by cosine similarity over a gallery snapshot,
/// scanning `batch_size` rows at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matcher {
    batch_size: usize,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl Matcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Best enrolled identity for `query`. A match requires
    /// `similarity > threshold`; on equal scores the lower row index wins.
    pub fn best_match(
        &self,
        gallery: &Snapshot,
        query: &Embedding,
        threshold: f32,
    ) -> Result<MatchResult> {
        if gallery.is_empty() {
            return Ok(MatchResult::unknown(0.0));
        }
        gallery.check_dimension(query)?;

        let q = query.view();
        let q_norm = query.norm();
        let mut best_index = 0usize;
        let mut best = f32::NEG_INFINITY;

        for (batch_no, (rows, norms)) in gallery.batches(self.batch_size).enumerate() {
            let sims = batch_similarities(rows, norms, q, q_norm);
            if let Some((i, s)) = first_max(sims.view()) {
                if s > best {
                    best = s;
                    best_index = batch_no * self.batch_size + i;
                }
            }
        }

        if best > threshold {
            let label = gallery.label(best_index).ok_or_else(|| {
                Error::Corrupt(format!("no label for gallery row {}", best_index))
            })?;
            Ok(MatchResult {
                identity: Identity::Known(label.to_string()),
                similarity: best,
            })
        } else {
            Ok(MatchResult::unknown(best))
        }
    }

    /// Similarity of `query` against every row, in row order
    pub fn scores(&self, gallery: &Snapshot, query: &Embedding) -> Result<Vec<f32>> {
        if gallery.is_empty() {
            return Ok(vec![]);
        }
        gallery.check_dimension(query)?;

        let q = query.view();
        let q_norm = query.norm();
        let mut out = Vec::with_capacity(gallery.len());
        for (rows, norms) in gallery.batches(self.batch_size) {
            let sims = batch_similarities(rows, norms, q, q_norm);
            out.extend(sims.iter().copied());
        }
        Ok(out)
    }

    /// The `k` most similar identities, best first
    pub fn top_k(
        &self,
        gallery: &Snapshot,
        query: &Embedding,
        k: usize,
    ) -> Result<Vec<(String, f32)>> {
        let mut ranked: Vec<(usize, f32)> = self
            .scores(gallery, query)?
            .into_iter()
            .enumerate()
            .collect();
        // Stable sort keeps lower indices first among equal scores
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(ranked
            .into_iter()
            .take(k)
            .filter_map(|(i, s)| gallery.label(i).map(|l| (l.to_string(), s)))
            .collect())
    }
}

/// Cosine similarity of two embeddings, `0.0` if either has zero length
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> Result<f32> {
    if a.dim() != b.dim() {
        return Err(Error::DimensionMismatch {
            expected: a.dim(),
            actual: b.dim(),
        });
    }
    Ok(cosine(a.view(), a.norm(), b.view(), b.norm()))
}

fn batch_similarities(
    rows: ArrayView2<'_, f32>,
    norms: ArrayView1<'_, f64>,
    q: ArrayView1<'_, f32>,
    q_norm: f64,
) -> Array1<f32> {
    Zip::from(rows.rows())
        .and(norms)
        .map_collect(|row, &norm| cosine(row, norm, q, q_norm))
}

fn cosine(a: ArrayView1<'_, f32>, a_norm: f64, b: ArrayView1<'_, f32>, b_norm: f64) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum();
    (dot / (a_norm * b_norm)).clamp(-1.0, 1.0) as f32
}

/// Index and value of the first maximum
fn first_max(values: ArrayView1<'_, f32>) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |acc, (i, v)| match acc {
            Some((_, best)) if best >= v => acc,
            _ => Some((i, v)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::Gallery;
    use crate::storage::MemoryStore;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    fn gallery(entries: &[(&str, &[f32])]) -> Gallery<MemoryStore> {
        let gallery = Gallery::open(MemoryStore::new()).unwrap();
        for (name, values) in entries {
            gallery.enroll(name, &emb(values)).unwrap();
        }
        gallery
    }

    #[test]
    fn test_cosine_similarity() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.0, 2.0]);
        let c = emb(&[-3.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &c).unwrap() + 1.0).abs() < 1e-6);
        assert!(matches!(
            cosine_similarity(&a, &emb(&[1.0])),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_vectors_score_zero() {
        let zero = emb(&[0.0, 0.0]);
        let a = emb(&[1.0, 1.0]);
        assert_eq!(cosine_similarity(&zero, &a).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&a, &zero).unwrap(), 0.0);

        let g = gallery(&[("zero", &[0.0, 0.0]), ("a", &[1.0, 1.0])]);
        let scores = Matcher::default().scores(&g.load(), &zero).unwrap();
        assert_eq!(scores, vec![0.0, 0.0]);
    }

    #[test]
    fn test_best_match_zero_norm_query() {
        let g = gallery(&[("a", &[1.0, 0.0]), ("b", &[0.0, 1.0])]);
        let result = Matcher::new(1)
            .best_match(&g.load(), &emb(&[0.0, 0.0]), 0.5)
            .unwrap();
        assert_eq!(result, MatchResult::unknown(0.0));
        assert!(!result.identity.is_known());
    }

    #[test]
    fn test_best_match_skips_zero_norm_row() {
        let g = gallery(&[("zero", &[0.0, 0.0]), ("a", &[1.0, 1.0])]);
        let result = Matcher::default()
            .best_match(&g.load(), &emb(&[2.0, 2.0]), 0.5)
            .unwrap();
        assert_eq!(result.identity, Identity::Known("a".into()));
        assert!(result.identity.is_known());
        assert!((result.similarity - 1.0).abs() < 1e-6);

        // Zero row scores 0, which still beats a negative match
        let result = Matcher::default()
            .best_match(&g.load(), &emb(&[-1.0, -1.0]), -0.5)
            .unwrap();
        assert_eq!(result.identity, Identity::Known("zero".into()));
        assert_eq!(result.similarity, 0.0);
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let g = gallery(&[]);
        let result = Matcher::default()
            .best_match(&g.load(), &emb(&[1.0, 2.0, 3.0]), -1.0)
            .unwrap();
        assert_eq!(result, MatchResult::unknown(0.0));
        assert_eq!(result.identity.to_string(), "unknown");
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let g = gallery(&[("alice", &[1.0, 0.0])]);
        let m = Matcher::default();
        let result = m.best_match(&g.load(), &emb(&[1.0, 0.0]), 1.0).unwrap();
        assert_eq!(result.identity, Identity::Unknown);
        assert_eq!(result.similarity, 1.0);

        let result = m.best_match(&g.load(), &emb(&[1.0, 0.0]), 0.99).unwrap();
        assert_eq!(result.identity, Identity::Known("alice".into()));
    }

    #[test]
    fn test_negative_best_is_reported() {
        let g = gallery(&[("alice", &[1.0, 0.0])]);
        let result = Matcher::default()
            .best_match(&g.load(), &emb(&[-1.0, 0.0]), 0.5)
            .unwrap();
        assert_eq!(result.identity, Identity::Unknown);
        assert!((result.similarity + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_tie_prefers_lower_index_across_batches() {
        let g = gallery(&[
            ("x", &[0.0, 1.0]),
            ("first", &[2.0, 0.0]),
            ("y", &[0.0, -1.0]),
            ("second", &[5.0, 0.0]),
        ]);
        for batch in [1, 2, 3, 4, 100] {
            let result = Matcher::new(batch)
                .best_match(&g.load(), &emb(&[1.0, 0.0]), 0.5)
                .unwrap();
            assert_eq!(result.identity, Identity::Known("first".into()));
        }
    }

    #[test]
    fn test_top_k() {
        let g = gallery(&[
            ("a", &[1.0, 0.0]),
            ("b", &[0.0, 1.0]),
            ("c", &[1.0, 1.0]),
            ("d", &[1.0, 0.0]),
        ]);
        let top = Matcher::new(3)
            .top_k(&g.load(), &emb(&[1.0, 0.0]), 3)
            .unwrap();
        let names: Vec<&str> = top.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "d", "c"]);
    }

    #[test]
    fn test_first_max() {
        let values = Array1::from_vec(vec![0.1, 0.7, 0.7, 0.2]);
        assert_eq!(first_max(values.view()), Some((1, 0.7)));
        assert_eq!(first_max(Array1::<f32>::zeros(0).view()), None);
    }

    #[test]
    fn test_zero_batch_size_means_one() {
        assert_eq!(Matcher::new(0).batch_size(), 1);
        assert_eq!(Matcher::default().batch_size(), DEFAULT_BATCH_SIZE);
    }
}
