use crate::error::{Error, Result};
use crate::storage::{FaceRecord, GalleryStore};
use facemind_capture::Embedding;
use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Immutable view of the gallery: an (N, D) matrix, its N labels, and the
/// precomputed L2 norm of every row. Row `i` belongs to label `i`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    matrix: Array2<f32>,
    norms: Array1<f64>,
    labels: Vec<String>,
    dimension: Option<usize>,
}

impl Snapshot {
    pub fn empty(dimension: Option<usize>) -> Self {
        Self {
            matrix: Array2::zeros((0, dimension.unwrap_or(0))),
            norms: Array1::zeros(0),
            labels: vec![],
            dimension,
        }
    }

    fn from_records(records: &[FaceRecord], pinned: Option<usize>) -> Result<Self> {
        let Some(first) = records.first() else {
            return Ok(Self::empty(pinned));
        };
        let dim = match pinned {
            Some(d) => d,
            None => first.decode()?.dim(),
        };

        let mut data = Vec::with_capacity(records.len() * dim);
        let mut labels = Vec::with_capacity(records.len());
        let mut seen = HashSet::new();
        for record in records {
            let embedding = record.decode()?;
            if embedding.dim() != dim && pinned.is_some() {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: embedding.dim(),
                });
            }
            if embedding.dim() != dim {
                return Err(Error::Corrupt(format!(
                    "record {:?} has dimension {}, gallery has {}",
                    record.name,
                    embedding.dim(),
                    dim
                )));
            }
            if !seen.insert(record.name.as_str()) {
                warn!("gallery contains duplicate label {:?}", record.name);
            }
            data.extend(embedding.view().iter().copied());
            labels.push(record.name.clone());
        }

        let matrix = Array2::from_shape_vec((labels.len(), dim), data)
            .map_err(|e| Error::Corrupt(e.to_string()))?;
        Ok(Self::from_parts(matrix, labels))
    }

    fn from_parts(matrix: Array2<f32>, labels: Vec<String>) -> Self {
        let norms = matrix.map_axis(Axis(1), |row| {
            row.iter()
                .map(|&x| f64::from(x) * f64::from(x))
                .sum::<f64>()
                .sqrt()
        });
        let dimension = Some(matrix.ncols());
        Self {
            matrix,
            norms,
            labels,
            dimension,
        }
    }

    /// Copy of this snapshot with one more row appended
    fn with_row(&self, name: &str, embedding: &Embedding) -> Result<Self> {
        let rows = self.labels.len() + 1;
        let data: Vec<f32> = self
            .matrix
            .iter()
            .chain(embedding.view().iter())
            .copied()
            .collect();
        let matrix = Array2::from_shape_vec((rows, embedding.dim()), data)
            .map_err(|e| Error::Corrupt(e.to_string()))?;

        let mut labels = self.labels.clone();
        labels.push(name.to_string());
        Ok(Self::from_parts(matrix, labels))
    }

    pub fn matrix(&self) -> ArrayView2<'_, f32> {
        self.matrix.view()
    }

    pub fn norms(&self) -> ArrayView1<'_, f64> {
        self.norms.view()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Established embedding dimension, if any
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l == name)
    }

    /// Row chunks of at most `size` rows, paired with their norms
    pub(crate) fn batches(
        &self,
        size: usize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView1<'_, f64>)> + '_ {
        self.matrix
            .axis_chunks_iter(Axis(0), size)
            .zip(self.norms.axis_chunks_iter(Axis(0), size))
    }

    pub(crate) fn check_dimension(&self, embedding: &Embedding) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != embedding.dim() => Err(Error::DimensionMismatch {
                expected,
                actual: embedding.dim(),
            }),
            _ => Ok(()),
        }
    }
}

/// Enrolled identities backed by a [`GalleryStore`].
///
/// Enrollments are serialized through the store mutex; readers grab the
/// current `Arc<Snapshot>` and scan it without holding any lock. A new
/// snapshot is published only after the store write succeeded.
pub struct Gallery<S> {
    store: Mutex<S>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl<S: GalleryStore> Gallery<S> {
    pub fn open(store: S) -> Result<Self> {
        Self::open_with_dimension(store, None)
    }

    /// Open with the embedding dimension pinned up front, so even the first
    /// enrollment is checked against the feature extractor's output size.
    pub fn open_with_dimension(store: S, dimension: Option<usize>) -> Result<Self> {
        let records = store.load_records()?;
        let snapshot = Snapshot::from_records(&records, dimension)?;
        info!(
            "loaded gallery: {} identities, dimension {:?}",
            snapshot.len(),
            snapshot.dimension()
        );
        Ok(Self {
            store: Mutex::new(store),
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Consistent (matrix, labels) pair as of now
    pub fn load(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.load().contains(name)
    }

    pub fn enroll(&self, name: &str, embedding: &Embedding) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::EmptyName);
        }

        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.load();
        if current.contains(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        current.check_dimension(embedding)?;

        let next = current.with_row(name, embedding)?;
        store.append_record(FaceRecord::new(name, embedding))?;
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);

        info!("enrolled {:?} ({} identities)", name, current.len() + 1);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.load().is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.load().dimension()
    }

    pub fn labels(&self) -> Vec<String> {
        self.load().labels().to_vec()
    }
}
