use crate::backend::{VectorBackend, VectorHit};
use crate::error::{Result, VectorStoreError};
use crate::exact::ExactIndex;
use crate::lsh::{LshIndex, LshParams};
use crate::similarity::Metric;
use knowledge_corpus::{EmbeddingRecord, EntityKind, EntityReference};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Exact,
    Lsh(LshParams),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub metric: Metric,
    pub backend: BackendKind,
}

impl IndexConfig {
    #[must_use]
    pub const fn exact(metric: Metric) -> Self {
        Self {
            metric,
            backend: BackendKind::Exact,
        }
    }

    #[must_use]
    pub const fn lsh(metric: Metric, params: LshParams) -> Self {
        Self {
            metric,
            backend: BackendKind::Lsh(params),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        match self.backend {
            BackendKind::Exact => Ok(()),
            BackendKind::Lsh(params) => params.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub backend: String,
    pub metric: Metric,
    pub dimension: usize,
    pub size: usize,
    pub ready: bool,
}

/// Outcome of loading stored embeddings into a fresh backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub loaded: usize,
    /// Records skipped because their dimension differs from the index.
    pub skipped: usize,
}

/// Double-buffered handle around a [`VectorBackend`].
///
/// Searches clone the current backend `Arc` under a short read lock and run
/// without holding it. A rebuild fills a brand-new backend and publishes it
/// with one pointer swap, so no reader ever sees a half-filled position map.
pub struct VectorIndex {
    dimension: usize,
    config: IndexConfig,
    current: RwLock<Arc<dyn VectorBackend>>,
}

impl VectorIndex {
    pub fn new(dimension: usize, config: IndexConfig) -> Result<Self> {
        if dimension == 0 {
            return Err(VectorStoreError::InvalidArgument(
                "index dimension must be > 0".to_string(),
            ));
        }
        config
            .validate()
            .map_err(VectorStoreError::InvalidArgument)?;
        let empty = create_backend(dimension, config)?;
        Ok(Self {
            dimension,
            config,
            current: RwLock::new(Arc::from(empty)),
        })
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub const fn config(&self) -> IndexConfig {
        self.config
    }

    /// A fresh, empty backend matching this index's configuration.
    pub fn create_backend(&self) -> Result<Box<dyn VectorBackend>> {
        create_backend(self.dimension, self.config)
    }

    /// Snapshot of the backend currently serving searches.
    #[must_use]
    pub fn current(&self) -> Arc<dyn VectorBackend> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Publish `backend`, returning the one it replaced.
    pub fn swap(&self, backend: Box<dyn VectorBackend>) -> Result<Arc<dyn VectorBackend>> {
        if backend.dimension() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: backend.dimension(),
            });
        }
        let next: Arc<dyn VectorBackend> = Arc::from(backend);
        let mut guard = self
            .current
            .write()
            .map_err(|_| VectorStoreError::IndexError("index lock poisoned".to_string()))?;
        Ok(std::mem::replace(&mut *guard, next))
    }

    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        kinds: Option<&[EntityKind]>,
        min_score: Option<f32>,
    ) -> Result<Vec<VectorHit>> {
        self.current().search(query, k, kinds, min_score)
    }

    /// Build a new backend from stored embeddings and swap it in.
    ///
    /// Records whose dimension does not match are skipped and counted.
    pub fn rebuild(&self, records: &[EmbeddingRecord]) -> Result<RebuildSummary> {
        let mut backend = self.create_backend()?;
        let (matching, mismatched): (Vec<&EmbeddingRecord>, Vec<&EmbeddingRecord>) = records
            .iter()
            .partition(|record| record.vector.len() == self.dimension);

        for record in &mismatched {
            log::warn!(
                "Skipping embedding for {}: dimension {} != index dimension {}",
                record.reference,
                record.vector.len(),
                self.dimension
            );
        }

        let vectors: Vec<Vec<f32>> = matching.iter().map(|record| record.vector.clone()).collect();
        let references: Vec<EntityReference> =
            matching.iter().map(|record| record.reference).collect();
        backend.add(&vectors, &references)?;
        backend.build()?;
        self.swap(backend)?;

        log::info!(
            "Vector index rebuilt: {} vectors loaded, {} skipped",
            matching.len(),
            mismatched.len()
        );
        Ok(RebuildSummary {
            loaded: matching.len(),
            skipped: mismatched.len(),
        })
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let backend = self.current();
        IndexStats {
            backend: backend.name().to_string(),
            metric: backend.metric(),
            dimension: backend.dimension(),
            size: backend.len(),
            ready: backend.is_ready(),
        }
    }
}

fn create_backend(dimension: usize, config: IndexConfig) -> Result<Box<dyn VectorBackend>> {
    Ok(match config.backend {
        BackendKind::Exact => Box::new(ExactIndex::new(dimension, config.metric)),
        BackendKind::Lsh(params) => Box::new(LshIndex::new(dimension, config.metric, params)?),
    })
}
