use crate::backend::{select_top_k, VectorBackend, VectorHit, VectorSlab};
use crate::error::{Result, VectorStoreError};
use crate::hashing::unit_signed;
use crate::similarity::{dot, Metric};
use knowledge_corpus::{EntityKind, EntityReference};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Random-hyperplane LSH parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LshParams {
    /// Independent hash tables; more tables raise recall.
    pub tables: usize,
    /// Hyperplanes per table (signature bits, at most 64).
    pub bits: usize,
    pub seed: u64,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            tables: 8,
            bits: 12,
            seed: 0x5eed_1d3a,
        }
    }
}

impl LshParams {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.tables == 0 {
            return Err("lsh.tables must be > 0".to_string());
        }
        if self.bits == 0 || self.bits > 64 {
            return Err("lsh.bits must be in 1..=64".to_string());
        }
        Ok(())
    }
}

/// Approximate backend: candidates come from LSH buckets, then get rescored
/// exactly. Falls back to a full scan when the buckets are too sparse to
/// fill `k`.
pub struct LshIndex {
    slab: VectorSlab,
    params: LshParams,
    hyperplanes: Vec<f32>,
    buckets: Option<Vec<HashMap<u64, Vec<usize>>>>,
}

impl LshIndex {
    pub fn new(dimension: usize, metric: Metric, params: LshParams) -> Result<Self> {
        params
            .validate()
            .map_err(VectorStoreError::InvalidArgument)?;
        let mut state = params.seed ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let hyperplanes = (0..params.tables * params.bits * dimension)
            .map(|_| unit_signed(&mut state))
            .collect();
        Ok(Self {
            slab: VectorSlab::new(dimension, metric),
            params,
            hyperplanes,
            buckets: None,
        })
    }

    fn signature(&self, table: usize, vector: &[f32]) -> u64 {
        let dim = self.slab.dimension;
        let mut signature = 0u64;
        for bit in 0..self.params.bits {
            let start = (table * self.params.bits + bit) * dim;
            let plane = &self.hyperplanes[start..start + dim];
            if dot(plane, vector) >= 0.0 {
                signature |= 1 << bit;
            }
        }
        signature
    }

    fn candidates(&self, buckets: &[HashMap<u64, Vec<usize>>], query: &[f32]) -> BTreeSet<usize> {
        let mut candidates = BTreeSet::new();
        for (table, bucket) in buckets.iter().enumerate() {
            if let Some(positions) = bucket.get(&self.signature(table, query)) {
                candidates.extend(positions.iter().copied());
            }
        }
        candidates
    }
}

impl VectorBackend for LshIndex {
    fn name(&self) -> &'static str {
        "lsh"
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
        self.buckets.is_some()
    }

    fn add(&mut self, vectors: &[Vec<f32>], references: &[EntityReference]) -> Result<()> {
        self.slab.push_batch(vectors, references)?;
        self.buckets = None;
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        let mut buckets: Vec<HashMap<u64, Vec<usize>>> = vec![HashMap::new(); self.params.tables];
        for position in 0..self.slab.len() {
            let row = self.slab.row(position);
            for (table, bucket) in buckets.iter_mut().enumerate() {
                bucket
                    .entry(self.signature(table, row))
                    .or_default()
                    .push(position);
            }
        }
        log::debug!(
            "LSH index built: {} vectors, {} tables x {} bits",
            self.slab.len(),
            self.params.tables,
            self.params.bits
        );
        self.buckets = Some(buckets);
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        kinds: Option<&[EntityKind]>,
        min_score: Option<f32>,
    ) -> Result<Vec<VectorHit>> {
        let Some(buckets) = self.buckets.as_deref() else {
            return Ok(Vec::new());
        };
        if self.slab.len() == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let query = self.slab.prepare_query(query)?;
        let metric = self.slab.metric;
        let candidates = self.candidates(buckets, &query);
        let hits = select_top_k(
            candidates
                .iter()
                .map(|&position| (position, metric.score(self.slab.row(position), &query))),
            &self.slab.references,
            k,
            kinds,
            min_score,
        );
        if hits.len() >= k {
            return Ok(hits);
        }

        log::debug!(
            "LSH buckets yielded {} of {} requested hits, scanning all vectors",
            hits.len(),
            k
        );
        Ok(select_top_k(
            (0..self.slab.len()).map(|position| (position, metric.score(self.slab.row(position), &query))),
            &self.slab.references,
            k,
            kinds,
            min_score,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::ExactIndex;

    fn vectors(n: usize, dim: usize) -> Vec<Vec<f32>> {
        let mut state = 7u64;
        (0..n)
            .map(|_| (0..dim).map(|_| unit_signed(&mut state)).collect())
            .collect()
    }

    #[test]
    fn rejects_bad_params() {
        let params = LshParams {
            bits: 65,
            ..LshParams::default()
        };
        assert!(LshIndex::new(4, Metric::Cosine, params).is_err());
    }

    #[test]
    fn finds_exact_duplicate_as_top_hit() {
        let data = vectors(200, 16);
        let refs: Vec<EntityReference> = (0..200)
            .map(|id| EntityReference::new(EntityKind::Snippet, id))
            .collect();
        let mut index = LshIndex::new(16, Metric::Cosine, LshParams::default()).unwrap();
        index.add(&data, &refs).unwrap();
        index.build().unwrap();

        let hits = index.search(&data[42], 5, None, None).unwrap();
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].reference.id, 42);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn agrees_with_exact_on_top_hit() {
        let data = vectors(64, 8);
        let refs: Vec<EntityReference> = (0..64)
            .map(|id| EntityReference::new(EntityKind::Document, id))
            .collect();
        let mut lsh = LshIndex::new(8, Metric::Cosine, LshParams::default()).unwrap();
        let mut exact = ExactIndex::new(8, Metric::Cosine);
        lsh.add(&data, &refs).unwrap();
        exact.add(&data, &refs).unwrap();
        lsh.build().unwrap();
        exact.build().unwrap();

        for target in [0usize, 17, 63] {
            let a = lsh.search(&data[target], 1, None, None).unwrap();
            let b = exact.search(&data[target], 1, None, None).unwrap();
            assert_eq!(a[0].reference, b[0].reference);
        }
    }
}
