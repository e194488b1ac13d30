use crate::error::{Result, VectorStoreError};
use crate::similarity::{l2_normalize, Metric};
use knowledge_corpus::{EntityKind, EntityReference};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One nearest-neighbor hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub reference: EntityReference,
    pub score: f32,
}

/// Interchangeable nearest-neighbor backend.
///
/// Lifecycle: `add` any number of batches, `build`, then `search`. Adding
/// after a build clears the ready flag until the next `build`.
pub trait VectorBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn dimension(&self) -> usize;

    fn metric(&self) -> Metric;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_ready(&self) -> bool;

    /// Append a batch. The whole batch is rejected when any vector has the
    /// wrong dimension or the two slices differ in length.
    fn add(&mut self, vectors: &[Vec<f32>], references: &[EntityReference]) -> Result<()>;

    fn build(&mut self) -> Result<()>;

    /// Up to `k` hits sorted by score descending. An empty or unbuilt
    /// backend yields no hits.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        kinds: Option<&[EntityKind]>,
        min_score: Option<f32>,
    ) -> Result<Vec<VectorHit>>;
}

/// Flat row-major vector storage with its position → reference map.
///
/// `references.len() * dimension == data.len()` holds after every call.
#[derive(Debug, Clone)]
pub(crate) struct VectorSlab {
    pub dimension: usize,
    pub metric: Metric,
    pub data: Vec<f32>,
    pub references: Vec<EntityReference>,
}

impl VectorSlab {
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            dimension,
            metric,
            data: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.data[start..start + self.dimension]
    }

    pub fn push_batch(&mut self, vectors: &[Vec<f32>], references: &[EntityReference]) -> Result<()> {
        if vectors.len() != references.len() {
            return Err(VectorStoreError::InvalidArgument(format!(
                "{} vectors but {} entity references",
                vectors.len(),
                references.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            let start = self.data.len();
            self.data.extend_from_slice(vector);
            if self.metric == Metric::Cosine {
                l2_normalize(&mut self.data[start..]);
            }
        }
        self.references.extend_from_slice(references);
        Ok(())
    }

    /// Validate and prepare a query the same way stored rows were prepared.
    pub fn prepare_query(&self, query: &[f32]) -> Result<Vec<f32>> {
        if query.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let mut prepared = query.to_vec();
        if self.metric == Metric::Cosine {
            l2_normalize(&mut prepared);
        }
        Ok(prepared)
    }
}

/// Filter `(position, score)` pairs and keep the best `k`, ties broken by
/// entity reference ascending.
pub(crate) fn select_top_k(
    scored: impl IntoIterator<Item = (usize, f32)>,
    references: &[EntityReference],
    k: usize,
    kinds: Option<&[EntityKind]>,
    min_score: Option<f32>,
) -> Vec<VectorHit> {
    if k == 0 {
        return Vec::new();
    }
    let mut hits: Vec<VectorHit> = scored
        .into_iter()
        .filter(|(_, score)| score.is_finite())
        .filter(|(_, score)| min_score.map_or(true, |min| *score >= min))
        .filter_map(|(position, score)| {
            references
                .get(position)
                .map(|reference| VectorHit {
                    reference: *reference,
                    score,
                })
        })
        .filter(|hit| kinds.map_or(true, |kinds| kinds.contains(&hit.reference.kind)))
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.reference.cmp(&b.reference))
    });
    hits.truncate(k);
    hits
}
