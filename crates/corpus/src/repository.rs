use crate::embedding::EmbeddingRecord;
use crate::entity::{EntityKind, EntityReference};
use crate::error::Result;
use crate::record::Record;
use async_trait::async_trait;

/// Storage collaborator: records for enrichment and lexical scans, plus
/// persisted embedding vectors.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Fetch one record, `CorpusError::NotFound` when it does not exist.
    async fn get_by_id(&self, reference: EntityReference) -> Result<Record>;

    /// All records of one kind, ascending by id.
    async fn get_all(&self, kind: EntityKind) -> Result<Vec<Record>>;

    async fn count(&self, kind: EntityKind) -> Result<usize> {
        Ok(self.get_all(kind).await?.len())
    }

    /// Stored embeddings, optionally narrowed to one kind and/or one model.
    async fn get_all_embeddings(
        &self,
        kind: Option<EntityKind>,
        model_name: Option<&str>,
    ) -> Result<Vec<EmbeddingRecord>>;

    async fn get_embedding(
        &self,
        reference: EntityReference,
        model_name: &str,
    ) -> Result<Option<EmbeddingRecord>>;

    /// Insert or replace the embedding keyed by `(kind, id, model_name)`.
    async fn upsert_embedding(&self, record: EmbeddingRecord) -> Result<()>;
}
