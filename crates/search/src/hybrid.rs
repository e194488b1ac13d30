use crate::config::HybridConfig;
use crate::error::{Result, SearchError};
use crate::fusion::{FusionEngine, FusionMethod, FusionWeights, MethodResults};
use crate::lexical::LexicalEngine;
use crate::metadata::{default_facet_fields, get_facets, validate_facet_fields, MetadataEngine};
use crate::request::SearchRequest;
use crate::types::{Candidate, EnabledMethods, ScoreBreakdown, SearchHit, SearchMethod, SearchResults};
use knowledge_corpus::{CorpusError, EntityKind, EntityReference, Record, Repository};
use knowledge_vector_store::{
    is_zero_vector, EmbeddingIndexer, EmbeddingPipeline, EmbeddingProvider, IndexStats, KindReport,
    RebuildSummary, VectorIndex,
};
use serde::Serialize;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Outcome of a full re-embed plus index reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub kinds: BTreeMap<EntityKind, KindReport>,
    /// Vectors now served by the index.
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HybridStatistics {
    pub config: HybridConfig,
    pub weights: FusionWeights,
    pub enabled: EnabledMethods,
    pub fusion: FusionMethod,
    pub index: IndexStats,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub entity_counts: BTreeMap<EntityKind, usize>,
    pub embedding_count: usize,
}

/// Hybrid search orchestrator: vector + lexical + metadata, fused.
///
/// Each sub-search is isolated. When one fails or times out it is reported
/// in `degraded_methods` and the call still answers from the others.
pub struct HybridSearch {
    config: HybridConfig,
    weights: RwLock<FusionWeights>,
    repository: Arc<dyn Repository>,
    pipeline: Arc<EmbeddingPipeline>,
    index: VectorIndex,
    indexer: EmbeddingIndexer,
    lexical: LexicalEngine,
    metadata: MetadataEngine,
    fusion: FusionEngine,
}

impl HybridSearch {
    pub fn new(
        config: HybridConfig,
        repository: Arc<dyn Repository>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate().map_err(SearchError::InvalidConfig)?;

        let storage_timeout = config.timeouts.storage();
        let pipeline = Arc::new(EmbeddingPipeline::new(provider, &config.embedding)?);
        let index = VectorIndex::new(pipeline.dimension(), config.index)?;
        let weights = config.weights.normalized();
        if weights.sum() <= 0.0 {
            log::warn!("All fusion weights are zero, weighted_sum searches will return nothing");
        }

        log::info!(
            "Hybrid search ready: model={}, dim={}, backend={}, fusion={}",
            pipeline.model_name(),
            pipeline.dimension(),
            index.stats().backend,
            config.fusion
        );

        Ok(Self {
            indexer: EmbeddingIndexer::new(Arc::clone(&pipeline), storage_timeout),
            lexical: LexicalEngine::new(Arc::clone(&repository), config.lexical.clone(), storage_timeout),
            metadata: MetadataEngine::new(Arc::clone(&repository), storage_timeout),
            fusion: FusionEngine::new(config.rrf_k),
            weights: RwLock::new(weights),
            repository,
            pipeline,
            index,
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &HybridConfig {
        &self.config
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<EmbeddingPipeline> {
        &self.pipeline
    }

    #[must_use]
    pub const fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Current (normalized) weights.
    #[must_use]
    pub fn weights(&self) -> FusionWeights {
        *self.weights.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any subset of the weights, then renormalize all three.
    ///
    /// Validation happens before anything is published, so a rejected update
    /// leaves the previous weights in place.
    pub fn update_weights(
        &self,
        vector: Option<f32>,
        fulltext: Option<f32>,
        metadata: Option<f32>,
    ) -> Result<FusionWeights> {
        let mut guard = self.weights.write().unwrap_or_else(PoisonError::into_inner);
        let next = FusionWeights::new(
            vector.unwrap_or(guard.vector),
            fulltext.unwrap_or(guard.fulltext),
            metadata.unwrap_or(guard.metadata),
        );
        next.validate()?;
        if next.sum() <= 0.0 {
            log::warn!("All fusion weights set to zero, weighted_sum searches will return nothing");
        }
        *guard = next.normalized();
        log::info!(
            "Fusion weights updated: vector={:.3}, fulltext={:.3}, metadata={:.3}",
            guard.vector,
            guard.fulltext,
            guard.metadata
        );
        Ok(*guard)
    }

    /// Convenience form of [`Self::hybrid_search`] with default options.
    pub async fn search(&self, query: &str, k: usize) -> Result<SearchResults> {
        self.hybrid_search(&SearchRequest::new(query).with_k(k)).await
    }

    pub async fn hybrid_search(&self, request: &SearchRequest) -> Result<SearchResults> {
        let started = Instant::now();
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        for filter in &request.filters {
            filter.validate()?;
        }
        if request.include_facets {
            validate_facet_fields(&request.facet_fields)?;
        }
        if let Some((field, boost)) = request
            .field_boosts
            .iter()
            .find(|(_, boost)| !boost.is_finite() || **boost < 0.0)
        {
            return Err(SearchError::InvalidConfig(format!(
                "field boost for '{field}' must be >= 0, got {boost}"
            )));
        }
        let weights = match request.weights {
            Some(weights) => {
                weights.validate()?;
                weights.normalized()
            }
            None => self.weights(),
        };
        let enabled = request
            .methods
            .map_or(self.config.enabled, |methods| methods.intersect(self.config.enabled));
        let fusion = request.fusion.unwrap_or(self.config.fusion);
        // Rank- and max-based fusion ignore weights, so a zero weight only
        // silences a method under the weighted sum.
        let runs = |method: SearchMethod| {
            enabled.is_enabled(method) && (!fusion.uses_weights() || weights.get(method) > 0.0)
        };
        let min_score = request.min_score.filter(|_| fusion.is_score_scaled());
        if request.min_score.is_some() && min_score.is_none() {
            log::debug!("min_score ignored for {fusion} totals");
        }

        let mut results = SearchResults::empty(query, format!("hybrid/{fusion}"));
        results.filters = request.filters.clone();
        if request.k == 0 {
            results.elapsed_ms = elapsed_ms(started);
            return Ok(results);
        }

        log::debug!("Hybrid search: query='{query}', k={}, fusion={fusion}", request.k);

        let pool = request.k.saturating_mul(self.config.candidate_multiplier);
        let kinds = request.kinds.as_deref();
        let (run_vector, run_lexical) = (runs(SearchMethod::Vector), runs(SearchMethod::Fulltext));

        let vector = async {
            if run_vector {
                Some(self.vector_candidates(query, pool, kinds).await)
            } else {
                None
            }
        };
        let lexical = async {
            if run_lexical {
                Some(
                    self.lexical
                        .search_boosted(query, kinds, pool, &request.field_boosts)
                        .await,
                )
            } else {
                None
            }
        };
        let (vector, lexical) = if self.config.parallel {
            tokio::join!(vector, lexical)
        } else {
            (vector.await, lexical.await)
        };

        let mut lists = MethodResults::new();
        collect(SearchMethod::Vector, vector, &mut lists, &mut results);
        collect(SearchMethod::Fulltext, lexical, &mut lists, &mut results);

        if runs(SearchMethod::Metadata) && !request.filters.is_empty() {
            let pooled: BTreeSet<EntityReference> = lists
                .values()
                .flatten()
                .map(|candidate| candidate.reference)
                .collect();
            let scored = if pooled.is_empty() {
                self.metadata
                    .scan(kinds.unwrap_or(&EntityKind::ALL), &request.filters)
                    .await
            } else {
                let pooled: Vec<EntityReference> = pooled.into_iter().collect();
                Ok(self.metadata.filter_and_score(&pooled, &request.filters).await)
            };
            collect(SearchMethod::Metadata, Some(scored), &mut lists, &mut results);
        }

        for candidates in lists.values_mut() {
            sort_candidates(candidates);
        }

        let fused = self.fusion.fuse(fusion, &lists, &weights);
        let hits: Vec<SearchHit> = fused
            .into_iter()
            .filter(|candidate| candidate.total() > 0.0)
            .filter(|candidate| min_score.map_or(true, |min| candidate.total() >= min))
            .take(request.k)
            .enumerate()
            .map(|(position, candidate)| SearchHit {
                reference: candidate.reference,
                score: candidate.total(),
                rank: position + 1,
                breakdown: request.include_scores.then_some(candidate.breakdown),
                content: None,
            })
            .collect();

        let (hits, records) = self.enrich(hits).await;
        if request.include_facets {
            let fields = if request.facet_fields.is_empty() {
                let mut present: Vec<EntityKind> = Vec::new();
                for record in &records {
                    if !present.contains(&record.kind()) {
                        present.push(record.kind());
                    }
                }
                default_facet_fields(&present)
            } else {
                request.facet_fields.clone()
            };
            results.facets = Some(get_facets(records.iter(), &fields));
        }

        results.hits = hits;
        results.elapsed_ms = elapsed_ms(started);
        log::info!(
            "Hybrid search '{query}': {} hits in {:.1}ms (degraded: {:?})",
            results.hits.len(),
            results.elapsed_ms,
            results.degraded_methods
        );
        Ok(results)
    }

    /// Entities nearest to the stored embedding of `(kind, id)`, same kind,
    /// excluding the entity itself.
    pub async fn find_similar(&self, kind: EntityKind, id: i64, k: usize) -> Result<SearchResults> {
        let started = Instant::now();
        let target = EntityReference::new(kind, id);
        let mut results = SearchResults::empty(target.to_string(), "similarity");
        if k == 0 {
            return Ok(results);
        }

        let model = self.pipeline.model_name().to_string();
        let stored = self
            .storage(
                "loading embedding",
                self.repository.get_embedding(target, &model),
            )
            .await;
        let embedding = match stored {
            Ok(Some(embedding)) => embedding,
            Ok(None) => {
                log::debug!("No {model} embedding stored for {target}");
                results.elapsed_ms = elapsed_ms(started);
                return Ok(results);
            }
            Err(err) => {
                log::warn!("Could not load embedding for {target}: {err}");
                results.degraded_methods.push(SearchMethod::Vector);
                results.elapsed_ms = elapsed_ms(started);
                return Ok(results);
            }
        };

        let neighbours = self
            .index
            .search(&embedding.vector, k.saturating_add(1), Some(&[kind]), None)?;
        let hits: Vec<SearchHit> = neighbours
            .into_iter()
            .filter(|hit| hit.reference != target)
            .take(k)
            .enumerate()
            .map(|(position, hit)| SearchHit {
                reference: hit.reference,
                score: hit.score,
                rank: position + 1,
                breakdown: Some(ScoreBreakdown {
                    total: hit.score,
                    vector: hit.score,
                    methods: vec![SearchMethod::Vector],
                    ..ScoreBreakdown::default()
                }),
                content: None,
            })
            .collect();

        let (hits, _) = self.enrich(hits).await;
        results.hits = hits;
        results.contributing_methods.push(SearchMethod::Vector);
        results.elapsed_ms = elapsed_ms(started);
        Ok(results)
    }

    /// Re-embed the whole corpus, then reload the index from storage.
    pub async fn rebuild_index(&self) -> Result<RebuildReport> {
        let report = self.indexer.index_all(self.repository.as_ref()).await?;
        let summary = self.load_index().await?;
        log::info!(
            "Rebuilt index: {} embedded, {} failed, {} loaded",
            report.indexed(),
            report.failed(),
            summary.loaded
        );
        Ok(RebuildReport {
            kinds: report.kinds,
            loaded: summary.loaded,
            skipped: summary.skipped,
        })
    }

    /// Reload stored embeddings for the current model without re-embedding.
    pub async fn load_index(&self) -> Result<RebuildSummary> {
        let model = self.pipeline.model_name().to_string();
        let records = self
            .storage(
                "loading embeddings",
                self.repository.get_all_embeddings(None, Some(&model)),
            )
            .await?;
        Ok(self.index.rebuild(&records)?)
    }

    /// Re-embed one entity and publish a refreshed index. Returns whether a
    /// vector was stored.
    pub async fn reindex_entity(&self, reference: EntityReference) -> Result<bool> {
        let stored = self
            .indexer
            .reindex_entity(self.repository.as_ref(), reference)
            .await?;
        if stored {
            self.load_index().await?;
        }
        Ok(stored)
    }

    pub async fn get_statistics(&self) -> Result<HybridStatistics> {
        let mut entity_counts = BTreeMap::new();
        for kind in EntityKind::ALL {
            let count = self
                .storage("counting records", self.repository.count(kind))
                .await?;
            entity_counts.insert(kind, count);
        }
        let model = self.pipeline.model_name().to_string();
        let embedding_count = self
            .storage(
                "loading embeddings",
                self.repository.get_all_embeddings(None, Some(&model)),
            )
            .await?
            .len();

        Ok(HybridStatistics {
            config: self.config.clone(),
            weights: self.weights(),
            enabled: self.config.enabled,
            fusion: self.config.fusion,
            index: self.index.stats(),
            embedding_model: model,
            embedding_dimension: self.pipeline.dimension(),
            entity_counts,
            embedding_count,
        })
    }

    async fn vector_candidates(
        &self,
        query: &str,
        pool: usize,
        kinds: Option<&[EntityKind]>,
    ) -> Result<Vec<Candidate>> {
        let embedding = self.pipeline.encode_query(query).await?;
        if is_zero_vector(&embedding) {
            log::debug!("Query '{query}' has no embeddable content");
            return Ok(Vec::new());
        }
        let hits = self.index.search(&embedding, pool, kinds, None)?;
        Ok(hits
            .into_iter()
            .filter(|hit| hit.score > 0.0)
            .map(|hit| Candidate::new(hit.reference, hit.score))
            .collect())
    }

    /// Attach record summaries. Returns the loaded records for faceting.
    async fn enrich(&self, mut hits: Vec<SearchHit>) -> (Vec<SearchHit>, Vec<Record>) {
        let mut records = Vec::with_capacity(hits.len());
        for hit in &mut hits {
            let loaded = self
                .storage("loading record", self.repository.get_by_id(hit.reference))
                .await;
            match loaded {
                Ok(record) => {
                    hit.content = Some(record.summary());
                    records.push(record);
                }
                Err(err) => {
                    log::warn!("Enrichment failed for {}: {err}", hit.reference);
                    hit.content = Some(json!({ "error": err.to_string() }));
                }
            }
        }
        (hits, records)
    }

    async fn storage<T, F>(&self, what: &str, future: F) -> Result<T>
    where
        F: Future<Output = knowledge_corpus::Result<T>>,
    {
        let timeout = self.config.timeouts.storage();
        tokio::time::timeout(timeout, future)
            .await
            .map_err(|_| CorpusError::Storage(format!("{what} timed out after {timeout:?}")))?
            .map_err(SearchError::from)
    }
}

fn collect(
    method: SearchMethod,
    outcome: Option<Result<Vec<Candidate>>>,
    lists: &mut MethodResults,
    results: &mut SearchResults,
) {
    match outcome {
        None => {}
        Some(Ok(candidates)) => {
            log::debug!("{method}: {} candidates", candidates.len());
            results.contributing_methods.push(method);
            lists.insert(method, candidates);
        }
        Some(Err(err)) => {
            log::warn!("{method} search degraded: {err}");
            results.degraded_methods.push(method);
        }
    }
}

fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.reference.cmp(&b.reference))
    });
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowledge_corpus::{MemoryRepository, Snippet};
    use knowledge_vector_store::{EmbeddingConfig, FeatureHashEmbedder};
    use pretty_assertions::assert_eq;

    const DIM: usize = 64;

    fn snippet(id: i64, title: &str, content: &str) -> Record {
        Record::Snippet(Snippet {
            id,
            title: title.to_string(),
            content: content.to_string(),
            content_type: None,
            category: None,
            is_validated: false,
            confidence_score: 0.0,
        })
    }

    fn engine(records: Vec<Record>, config: HybridConfig) -> HybridSearch {
        let provider = Arc::new(FeatureHashEmbedder::new(DIM).unwrap());
        let config = config.with_embedding(EmbeddingConfig {
            model_name: provider.model_name().to_string(),
            dimension: DIM,
            ..EmbeddingConfig::default()
        });
        HybridSearch::new(config, Arc::new(MemoryRepository::from_records(records)), provider).unwrap()
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let engine = engine(vec![], HybridConfig::default());
        assert!(matches!(engine.search("  ", 5).await, Err(SearchError::EmptyQuery)));
    }

    #[tokio::test]
    async fn lexical_only_before_any_indexing() {
        let engine = engine(
            vec![snippet(1, "rust ownership", ""), snippet(2, "python", "")],
            HybridConfig::default(),
        );
        let results = engine.search("rust", 5).await.unwrap();
        assert_eq!(results.references(), vec![EntityReference::new(EntityKind::Snippet, 1)]);
        assert_eq!(results.algorithm, "hybrid/weighted_sum");
        assert_eq!(
            results.contributing_methods,
            vec![SearchMethod::Vector, SearchMethod::Fulltext]
        );
        assert!(results.degraded_methods.is_empty());
        assert_eq!(results.hits[0].rank, 1);
    }

    #[tokio::test]
    async fn update_weights_is_partial_and_normalized() {
        let engine = engine(vec![], HybridConfig::default());
        let weights = engine.update_weights(Some(1.0), None, Some(0.0)).unwrap();
        assert!((weights.sum() - 1.0).abs() < 1e-6);
        assert!((weights.vector - 1.0 / 1.3).abs() < 1e-6);
        assert_eq!(weights.metadata, 0.0);

        let before = engine.weights();
        assert!(matches!(
            engine.update_weights(Some(-0.5), None, None),
            Err(SearchError::InvalidWeights(_))
        ));
        assert_eq!(engine.weights(), before);
    }

    #[tokio::test]
    async fn zero_k_returns_empty_results() {
        let engine = engine(vec![snippet(1, "rust", "")], HybridConfig::default());
        let results = engine.search("rust", 0).await.unwrap();
        assert!(results.is_empty());
    }
}
