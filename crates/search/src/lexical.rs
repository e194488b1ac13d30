use crate::error::{Result, SearchError};
use crate::types::Candidate;
use knowledge_corpus::{CorpusError, EntityKind, Record, Repository};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-kind field weights for substring hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    pub profile: BTreeMap<String, f32>,
    pub snippet: BTreeMap<String, f32>,
    pub document: BTreeMap<String, f32>,
}

fn weights(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
    pairs
        .iter()
        .map(|(field, weight)| ((*field).to_string(), *weight))
        .collect()
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            profile: weights(&[("name", 0.5), ("title", 0.3), ("bio", 0.2)]),
            snippet: weights(&[("title", 0.7), ("content", 0.3)]),
            document: weights(&[("title", 0.7), ("body", 0.3)]),
        }
    }
}

impl LexicalConfig {
    #[must_use]
    pub const fn fields(&self, kind: EntityKind) -> &BTreeMap<String, f32> {
        match kind {
            EntityKind::Profile => &self.profile,
            EntityKind::Snippet => &self.snippet,
            EntityKind::Document => &self.document,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for kind in EntityKind::ALL {
            if let Some((field, weight)) = self
                .fields(kind)
                .iter()
                .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
            {
                return Err(format!("lexical.{kind}.{field} has invalid weight {weight}"));
            }
        }
        Ok(())
    }
}

/// Case-insensitive literal substring matching over declared text fields.
///
/// No stemming, no fuzzy matching: a field either contains the query or it
/// does not.
pub struct LexicalEngine {
    repository: Arc<dyn Repository>,
    config: LexicalConfig,
    storage_timeout: Duration,
}

impl LexicalEngine {
    #[must_use]
    pub fn new(repository: Arc<dyn Repository>, config: LexicalConfig, storage_timeout: Duration) -> Self {
        Self {
            repository,
            config,
            storage_timeout,
        }
    }

    /// Score = Σ weight × boost of fields containing the query, capped at
    /// 1.0. Fields without a boost use 1.0.
    #[must_use]
    pub fn score_record(&self, needle: &str, record: &Record, boosts: &BTreeMap<String, f32>) -> f32 {
        let weights = self.config.fields(record.kind());
        let score: f32 = record
            .searchable_fields()
            .into_iter()
            .filter(|(_, text)| text.to_lowercase().contains(needle))
            .filter_map(|(field, _)| {
                weights
                    .get(field)
                    .map(|weight| weight * boosts.get(field).copied().unwrap_or(1.0))
            })
            .sum();
        score.min(1.0)
    }

    /// Matching records sorted by score descending, ties in scan order
    /// (kinds as requested, then ascending id).
    pub async fn search(
        &self,
        query: &str,
        kinds: Option<&[EntityKind]>,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        self.search_boosted(query, kinds, limit, &BTreeMap::new()).await
    }

    /// [`Self::search`] with per-field weight multipliers.
    pub async fn search_boosted(
        &self,
        query: &str,
        kinds: Option<&[EntityKind]>,
        limit: usize,
        boosts: &BTreeMap<String, f32>,
    ) -> Result<Vec<Candidate>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let kinds = kinds.unwrap_or(&EntityKind::ALL);
        let mut hits = Vec::new();
        for kind in kinds {
            let records = tokio::time::timeout(self.storage_timeout, self.repository.get_all(*kind))
                .await
                .map_err(|_| {
                    SearchError::CorpusError(CorpusError::Storage(format!(
                        "listing {kind} records timed out"
                    )))
                })??;
            hits.extend(records.iter().filter_map(|record| {
                let score = self.score_record(&needle, record, boosts);
                (score > 0.0).then(|| Candidate::new(record.reference(), score))
            }));
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        log::debug!("Lexical: {} hits for '{}'", hits.len(), query);
        Ok(hits)
    }
}
