use anyhow::{Context, Result};
use ndarray::{Array1, ArrayView1};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("embedding has no components")]
    Empty,
    #[error("embedding component {index} is not a finite number")]
    NonFinite { index: usize },
    #[error("embedding blob of {0} bytes is not a whole number of f32 values")]
    BadBlobLength(usize),
}

/// Face embedding produced by an upstream recognition model.
///
/// The vector is validated once on construction: it is never empty and every
/// component is finite, so downstream similarity math never sees NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    vector: Array1<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite { index });
        }
        Ok(Self {
            vector: Array1::from_vec(values),
        })
    }

    /// Decode a blob of little-endian f32 values
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, EmbeddingError> {
        if bytes.len() % 4 != 0 {
            return Err(EmbeddingError::BadBlobLength(bytes.len()));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::new(values)
    }

    /// Encode as D little-endian f32 values, the persisted blob layout
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        self.vector.view()
    }

    /// L2 norm, accumulated in f64
    pub fn norm(&self) -> f64 {
        self.vector
            .iter()
            .map(|&x| f64::from(x) * f64::from(x))
            .sum::<f64>()
            .sqrt()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

/// Read an embedding from disk.
///
/// `.json` files hold a JSON array of numbers; anything else is treated as a
/// raw little-endian f32 blob.
pub fn read_embedding(path: &Path) -> Result<Embedding> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let embedding = if is_json {
        let values: Vec<f32> = serde_json::from_slice(&data)
            .with_context(|| format!("parsing JSON embedding {}", path.display()))?;
        Embedding::new(values)
    } else {
        Embedding::from_le_bytes(&data)
    };
    embedding.with_context(|| format!("invalid embedding in {}", path.display()))
}
