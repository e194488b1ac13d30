use crate::error::{Result, VectorStoreError};
use crate::pipeline::{with_timeout, EmbeddingPipeline};
use crate::similarity::is_zero_vector;
use knowledge_corpus::{EmbeddingRecord, EntityKind, EntityReference, Record, Repository};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindReport {
    pub total: usize,
    pub indexed: usize,
    /// Records whose embedding came back as a zero vector or could not be stored.
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub kinds: BTreeMap<EntityKind, KindReport>,
}

impl IndexReport {
    #[must_use]
    pub fn indexed(&self) -> usize {
        self.kinds.values().map(|kind| kind.indexed).sum()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.kinds.values().map(|kind| kind.failed).sum()
    }
}

/// Embeds repository records and writes the vectors back to storage.
pub struct EmbeddingIndexer {
    pipeline: Arc<EmbeddingPipeline>,
    storage_timeout: Duration,
}

impl EmbeddingIndexer {
    #[must_use]
    pub const fn new(pipeline: Arc<EmbeddingPipeline>, storage_timeout: Duration) -> Self {
        Self {
            pipeline,
            storage_timeout,
        }
    }

    /// Re-embed every record of every kind.
    pub async fn index_all(&self, repository: &dyn Repository) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        for kind in EntityKind::ALL {
            let kind_report = self.index_kind(repository, kind).await?;
            log::info!(
                "Indexed {} {kind} records ({} failed of {})",
                kind_report.indexed,
                kind_report.failed,
                kind_report.total
            );
            report.kinds.insert(kind, kind_report);
        }
        Ok(report)
    }

    pub async fn index_kind(&self, repository: &dyn Repository, kind: EntityKind) -> Result<KindReport> {
        let records = with_timeout(self.storage_timeout, async {
            repository.get_all(kind).await.map_err(VectorStoreError::from)
        })
        .await?;
        let texts: Vec<String> = records.iter().map(Record::embedding_text).collect();
        let vectors = self.pipeline.encode_batch(&texts).await;

        let mut report = KindReport {
            total: records.len(),
            ..KindReport::default()
        };
        for (record, vector) in records.iter().zip(vectors) {
            if self.store(repository, record.reference(), vector).await {
                report.indexed += 1;
            } else {
                report.failed += 1;
            }
        }
        Ok(report)
    }

    /// Embed and upsert a single entity. Returns whether a vector was stored.
    pub async fn reindex_entity(
        &self,
        repository: &dyn Repository,
        reference: EntityReference,
    ) -> Result<bool> {
        let record = with_timeout(self.storage_timeout, async {
            repository.get_by_id(reference).await.map_err(VectorStoreError::from)
        })
        .await?;
        let mut vectors = self.pipeline.encode_batch(&[record.embedding_text()]).await;
        let Some(vector) = vectors.pop() else {
            return Ok(false);
        };
        Ok(self.store(repository, reference, vector).await)
    }

    async fn store(&self, repository: &dyn Repository, reference: EntityReference, vector: Vec<f32>) -> bool {
        if is_zero_vector(&vector) {
            log::warn!("No usable embedding for {reference}, leaving it for a later run");
            return false;
        }
        let record = EmbeddingRecord::new(reference, vector, self.pipeline.model_name());
        match with_timeout(self.storage_timeout, async {
            repository.upsert_embedding(record).await.map_err(VectorStoreError::from)
        })
        .await
        {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Failed to store embedding for {reference}: {err}");
                false
            }
        }
    }
}
