use crate::backend::{select_top_k, VectorBackend, VectorHit, VectorSlab};
use crate::error::{Result, VectorStoreError};
use crate::similarity::Metric;
use knowledge_corpus::{EntityKind, EntityReference};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Exact nearest-neighbor backend.
///
/// `build` packs all rows into one matrix so a search is a single
/// matrix-vector product rather than a loop over stored vectors.
pub struct ExactIndex {
    slab: VectorSlab,
    matrix: Option<Array2<f32>>,
    sq_norms: Option<Array1<f32>>,
}

impl ExactIndex {
    #[must_use]
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            slab: VectorSlab::new(dimension, metric),
            matrix: None,
            sq_norms: None,
        }
    }

    fn scores(&self, matrix: &Array2<f32>, query: &[f32]) -> Array1<f32> {
        let query = ArrayView1::from(query);
        let mut scores = matrix.dot(&query);
        if self.slab.metric == Metric::Euclidean {
            let query_sq = query.dot(&query);
            if let Some(sq_norms) = &self.sq_norms {
                for (score, row_sq) in scores.iter_mut().zip(sq_norms.iter()) {
                    let distance_sq = row_sq - 2.0 * *score + query_sq;
                    *score = Metric::score_from_distance(distance_sq.max(0.0).sqrt());
                }
            }
        }
        scores
    }
}

impl VectorBackend for ExactIndex {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn dimension(&self) -> usize {
        self.slab.dimension
    }

    fn metric(&self) -> Metric {
        self.slab.metric
    }

    fn len(&self) -> usize {
        self.slab.len()
    }

    fn is_ready(&self) -> bool {
        self.matrix.is_some()
    }

    fn add(&mut self, vectors: &[Vec<f32>], references: &[EntityReference]) -> Result<()> {
        self.slab.push_batch(vectors, references)?;
        self.matrix = None;
        self.sq_norms = None;
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        let matrix = Array2::from_shape_vec(
            (self.slab.len(), self.slab.dimension),
            self.slab.data.clone(),
        )
        .map_err(|err| VectorStoreError::IndexError(format!("failed to pack vectors: {err}")))?;
        self.sq_norms = Some(matrix.map_axis(Axis(1), |row| row.dot(&row)));
        self.matrix = Some(matrix);
        log::debug!(
            "Exact index built: {} vectors, dimension {}",
            self.slab.len(),
            self.slab.dimension
        );
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        kinds: Option<&[EntityKind]>,
        min_score: Option<f32>,
    ) -> Result<Vec<VectorHit>> {
        let Some(matrix) = self.matrix.as_ref() else {
            return Ok(Vec::new());
        };
        if self.slab.len() == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let query = self.slab.prepare_query(query)?;
        let scores = self.scores(matrix, &query);
        Ok(select_top_k(
            scores.iter().copied().enumerate(),
            &self.slab.references,
            k,
            kinds,
            min_score,
        ))
    }
}
