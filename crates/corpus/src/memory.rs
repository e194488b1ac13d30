use crate::embedding::EmbeddingRecord;
use crate::entity::{EntityKind, EntityReference};
use crate::error::{CorpusError, Result};
use crate::record::Record;
use crate::repository::Repository;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const CORPUS_SCHEMA_VERSION: u32 = 1;

type EmbeddingKey = (EntityReference, String);

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<EntityReference, Record>,
    embeddings: BTreeMap<EmbeddingKey, EmbeddingRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCorpus {
    schema_version: u32,
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    embeddings: Vec<EmbeddingRecord>,
}

/// In-process repository backed by ordered maps, persisted as one JSON file.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.reference(), record))
            .collect();
        Self {
            state: RwLock::new(State {
                records,
                embeddings: BTreeMap::new(),
            }),
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let persisted: PersistedCorpus = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != CORPUS_SCHEMA_VERSION {
            return Err(CorpusError::UnsupportedSchema {
                found: persisted.schema_version,
                expected: CORPUS_SCHEMA_VERSION,
            });
        }
        let repo = Self::from_records(persisted.records);
        {
            let mut state = repo.write()?;
            for record in persisted.embeddings {
                state.embeddings.insert(record.key(), record);
            }
        }
        log::debug!(
            "Loaded corpus from {}: {} records, {} embeddings",
            path.display(),
            repo.len(),
            repo.embedding_count()
        );
        Ok(repo)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let persisted = {
            let state = self.read()?;
            PersistedCorpus {
                schema_version: CORPUS_SCHEMA_VERSION,
                records: state.records.values().cloned().collect(),
                embeddings: state.embeddings.values().cloned().collect(),
            }
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Insert or replace a record, returning the previous one.
    pub fn insert(&self, record: Record) -> Result<Option<Record>> {
        Ok(self.write()?.records.insert(record.reference(), record))
    }

    /// Remove a record together with every embedding stored for it.
    pub fn remove(&self, reference: EntityReference) -> Result<Option<Record>> {
        let mut state = self.write()?;
        state.embeddings.retain(|(owner, _), _| *owner != reference);
        Ok(state.records.remove(&reference))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().map_or(0, |state| state.records.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn embedding_count(&self) -> usize {
        self.read().map_or(0, |state| state.embeddings.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| CorpusError::Storage("memory repository lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| CorpusError::Storage("memory repository lock poisoned".to_string()))
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_by_id(&self, reference: EntityReference) -> Result<Record> {
        self.read()?
            .records
            .get(&reference)
            .cloned()
            .ok_or(CorpusError::NotFound(reference))
    }

    async fn get_all(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let state = self.read()?;
        let start = EntityReference::new(kind, i64::MIN);
        Ok(state
            .records
            .range(start..)
            .take_while(|(reference, _)| reference.kind == kind)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn count(&self, kind: EntityKind) -> Result<usize> {
        Ok(self
            .read()?
            .records
            .keys()
            .filter(|reference| reference.kind == kind)
            .count())
    }

    async fn get_all_embeddings(
        &self,
        kind: Option<EntityKind>,
        model_name: Option<&str>,
    ) -> Result<Vec<EmbeddingRecord>> {
        Ok(self
            .read()?
            .embeddings
            .values()
            .filter(|record| kind.map_or(true, |kind| record.reference.kind == kind))
            .filter(|record| model_name.map_or(true, |model| record.model_name == model))
            .cloned()
            .collect())
    }

    async fn get_embedding(
        &self,
        reference: EntityReference,
        model_name: &str,
    ) -> Result<Option<EmbeddingRecord>> {
        Ok(self
            .read()?
            .embeddings
            .get(&(reference, model_name.to_string()))
            .cloned())
    }

    async fn upsert_embedding(&self, record: EmbeddingRecord) -> Result<()> {
        let mut state = self.write()?;
        if !state.records.contains_key(&record.reference) {
            return Err(CorpusError::NotFound(record.reference));
        }
        state.embeddings.insert(record.key(), record);
        Ok(())
    }
}
