use async_trait::async_trait;
use knowledge_corpus::{
    CorpusError, EmbeddingRecord, EntityKind, EntityReference, MemoryRepository, Profile, Record,
    Repository, Snippet,
};
use knowledge_search::{
    EnabledMethods, FusionMethod, FusionWeights, HybridConfig, HybridSearch, Predicate,
    SearchMethod, SearchRequest, TimeoutConfig,
};
use knowledge_vector_store::{EmbeddingConfig, EmbeddingProvider, FeatureHashEmbedder};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DIM: usize = 128;

fn snippet(id: i64, title: &str) -> Record {
    Record::Snippet(Snippet {
        id,
        title: title.to_string(),
        content: String::new(),
        content_type: None,
        category: Some(if id % 2 == 0 { "even" } else { "odd" }.to_string()),
        is_validated: false,
        confidence_score: 0.5,
    })
}

fn profile(id: i64, name: &str, verified: bool, domain: &str) -> Record {
    Record::Profile(Profile {
        id,
        name: name.to_string(),
        title: Some("Engineer".to_string()),
        bio: None,
        email: None,
        source_url: None,
        source_domain: Some(domain.to_string()),
        is_verified: verified,
        confidence_score: 0.9,
    })
}

fn corpus() -> Vec<Record> {
    vec![
        snippet(1, "cats and dogs"),
        snippet(2, "machine learning basics"),
        snippet(3, "deep learning neural networks"),
    ]
}

fn config() -> HybridConfig {
    HybridConfig::default().with_embedding(EmbeddingConfig {
        model_name: format!("feature-hash-{DIM}"),
        dimension: DIM,
        ..EmbeddingConfig::default()
    })
}

fn engine_over(repository: Arc<dyn Repository>, config: HybridConfig) -> HybridSearch {
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(FeatureHashEmbedder::new(DIM).expect("embedder"));
    HybridSearch::new(config, repository, provider).expect("engine")
}

fn snippet_ref(id: i64) -> EntityReference {
    EntityReference::new(EntityKind::Snippet, id)
}

/// Delegates to a memory repository, with switchable failures.
struct FlakyRepository {
    inner: MemoryRepository,
    fail_listing: AtomicBool,
    stall_listing: AtomicBool,
    fail_lookup_of: Option<EntityReference>,
}

impl FlakyRepository {
    fn new(records: Vec<Record>) -> Self {
        Self {
            inner: MemoryRepository::from_records(records),
            fail_listing: AtomicBool::new(false),
            stall_listing: AtomicBool::new(false),
            fail_lookup_of: None,
        }
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn get_by_id(&self, reference: EntityReference) -> knowledge_corpus::Result<Record> {
        if self.fail_lookup_of == Some(reference) {
            return Err(CorpusError::Storage("connection reset".to_string()));
        }
        self.inner.get_by_id(reference).await
    }

    async fn get_all(&self, kind: EntityKind) -> knowledge_corpus::Result<Vec<Record>> {
        if self.stall_listing.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(CorpusError::Storage("listing unavailable".to_string()));
        }
        self.inner.get_all(kind).await
    }

    async fn get_all_embeddings(
        &self,
        kind: Option<EntityKind>,
        model_name: Option<&str>,
    ) -> knowledge_corpus::Result<Vec<EmbeddingRecord>> {
        self.inner.get_all_embeddings(kind, model_name).await
    }

    async fn get_embedding(
        &self,
        reference: EntityReference,
        model_name: &str,
    ) -> knowledge_corpus::Result<Option<EmbeddingRecord>> {
        self.inner.get_embedding(reference, model_name).await
    }

    async fn upsert_embedding(&self, record: EmbeddingRecord) -> knowledge_corpus::Result<()> {
        self.inner.upsert_embedding(record).await
    }
}

#[tokio::test]
async fn vector_only_search_ranks_neural_document_first() {
    let engine = engine_over(
        Arc::new(MemoryRepository::from_records(corpus())),
        config().with_weights(FusionWeights::new(1.0, 0.0, 0.0)),
    );
    let report = engine.rebuild_index().await.expect("rebuild");
    assert_eq!(report.loaded, 3);
    assert_eq!(report.kinds[&EntityKind::Snippet].indexed, 3);

    let results = engine.search("neural networks", 2).await.expect("search");
    assert_eq!(results.hits[0].reference, snippet_ref(3));
    assert!(results.len() <= 2);
    assert_eq!(results.contributing_methods, vec![SearchMethod::Vector]);
    assert_eq!(results.algorithm, "hybrid/weighted_sum");
}

#[tokio::test]
async fn hybrid_results_are_ranked_densely_with_breakdowns() {
    let engine = engine_over(Arc::new(MemoryRepository::from_records(corpus())), config());
    engine.rebuild_index().await.expect("rebuild");

    let request = SearchRequest::new("learning").with_k(5).include_scores(true);
    let results = engine.hybrid_search(&request).await.expect("search");

    let ranks: Vec<usize> = results.hits.iter().map(|hit| hit.rank).collect();
    assert_eq!(ranks, (1..=results.len()).collect::<Vec<_>>());
    for pair in results.hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    let top = results.hits[0].breakdown.as_ref().expect("breakdown");
    assert!(top.methods.contains(&SearchMethod::Fulltext));
    assert!((top.total - results.hits[0].score).abs() < 1e-6);
    assert!(results.hits.iter().all(|hit| hit.content.is_some()));
}

#[tokio::test]
async fn per_request_fusion_override_changes_algorithm_tag() {
    let engine = engine_over(Arc::new(MemoryRepository::from_records(corpus())), config());
    engine.rebuild_index().await.expect("rebuild");

    let request = SearchRequest::new("learning").with_fusion(FusionMethod::ReciprocalRank);
    let results = engine.hybrid_search(&request).await.expect("search");
    assert_eq!(results.algorithm, "hybrid/reciprocal_rank_fusion");
    assert!(!results.is_empty());
    assert!(results.hits.iter().all(|hit| hit.score <= 2.0 / 61.0 + 1e-6));
}

#[tokio::test]
async fn failing_lexical_source_degrades_instead_of_failing() {
    let repository = Arc::new(FlakyRepository::new(corpus()));
    let engine = engine_over(repository.clone(), config());
    engine.rebuild_index().await.expect("rebuild");

    repository.fail_listing.store(true, Ordering::SeqCst);
    let results = engine.search("neural networks", 3).await.expect("search");

    assert_eq!(results.degraded_methods, vec![SearchMethod::Fulltext]);
    assert_eq!(results.contributing_methods, vec![SearchMethod::Vector]);
    assert_eq!(results.hits[0].reference, snippet_ref(3));
}

#[tokio::test(start_paused = true)]
async fn stalled_storage_times_out_as_degraded() {
    let repository = Arc::new(FlakyRepository::new(corpus()));
    let config = HybridConfig {
        timeouts: TimeoutConfig { storage_ms: 50 },
        ..config()
    };
    let engine = engine_over(repository.clone(), config);
    engine.rebuild_index().await.expect("rebuild");

    repository.stall_listing.store(true, Ordering::SeqCst);
    let results = engine.search("learning", 3).await.expect("search");
    assert_eq!(results.degraded_methods, vec![SearchMethod::Fulltext]);
}

#[tokio::test]
async fn enrichment_failure_is_marked_on_the_hit() {
    let mut repository = FlakyRepository::new(corpus());
    repository.fail_lookup_of = Some(snippet_ref(2));
    let engine = engine_over(
        Arc::new(repository),
        config().with_enabled(EnabledMethods::only(SearchMethod::Fulltext)),
    );

    let results = engine.search("learning", 5).await.expect("search");
    let failed = results
        .hits
        .iter()
        .find(|hit| hit.reference == snippet_ref(2))
        .expect("hit kept");
    assert!(failed.enrichment_error().expect("marker").contains("connection reset"));
    let ok = results
        .hits
        .iter()
        .find(|hit| hit.reference == snippet_ref(3))
        .expect("hit");
    assert_eq!(ok.enrichment_error(), None);
}

#[tokio::test]
async fn all_zero_weights_return_nothing() {
    let engine = engine_over(Arc::new(MemoryRepository::from_records(corpus())), config());
    engine.rebuild_index().await.expect("rebuild");
    engine
        .update_weights(Some(0.0), Some(0.0), Some(0.0))
        .expect("zero weights are accepted");

    let results = engine.search("learning", 5).await.expect("search");
    assert!(results.is_empty());
    assert!(results.contributing_methods.is_empty());
}

#[tokio::test]
async fn metadata_only_scans_requested_kinds() {
    let mut records = corpus();
    records.extend([
        profile(10, "Ada", true, "example.org"),
        profile(11, "Bob", false, "example.org"),
        profile(12, "Cy", true, "other.net"),
    ]);
    let engine = engine_over(Arc::new(MemoryRepository::from_records(records)), config());

    let request = SearchRequest::new("anyone")
        .with_kinds(vec![EntityKind::Profile])
        .with_filter("is_verified=true".parse::<Predicate>().expect("filter"))
        .with_weights(FusionWeights::new(0.0, 0.0, 1.0))
        .with_facets(Vec::new());
    let results = engine.hybrid_search(&request).await.expect("search");

    let ids: Vec<i64> = results.hits.iter().map(|hit| hit.reference.id).collect();
    assert_eq!(ids, vec![10, 12]);
    assert_eq!(results.contributing_methods, vec![SearchMethod::Metadata]);
    assert_eq!(results.filters.len(), 1);

    let facets = results.facets.expect("facets");
    assert_eq!(facets["is_verified"]["true"], 2);
    assert_eq!(facets["source_domain"]["example.org"], 1);
    assert_eq!(facets["source_domain"]["other.net"], 1);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let engine = engine_over(Arc::new(MemoryRepository::from_records(corpus())), config());
    let bad_filter = SearchRequest::new("x").with_filter(Predicate::at_least("category", 1.0));
    assert!(engine.hybrid_search(&bad_filter).await.is_err());

    let bad_facet = SearchRequest::new("x").with_facets(vec!["shoe_size".to_string()]);
    assert!(engine.hybrid_search(&bad_facet).await.is_err());

    let bad_boost = SearchRequest::new("x")
        .with_field_boosts([("title".to_string(), -1.0)].into_iter().collect());
    assert!(engine.hybrid_search(&bad_boost).await.is_err());
}

#[tokio::test]
async fn score_floor_applies_to_score_scaled_fusion_only() {
    let engine = engine_over(Arc::new(MemoryRepository::from_records(corpus())), config());
    engine.rebuild_index().await.expect("rebuild");

    let rrf = SearchRequest::new("learning")
        .with_fusion(FusionMethod::ReciprocalRank)
        .with_min_score(0.3);
    let results = engine.hybrid_search(&rrf).await.expect("search");
    assert!(!results.is_empty());
    assert!(results.hits.iter().all(|hit| hit.score <= 2.0 / 61.0 + 1e-6));

    let weighted = SearchRequest::new("learning").with_min_score(2.0);
    assert!(engine.hybrid_search(&weighted).await.expect("search").is_empty());
}

#[tokio::test]
async fn weights_do_not_gate_rank_or_max_fusion() {
    let engine = engine_over(Arc::new(MemoryRepository::from_records(corpus())), config());
    engine.rebuild_index().await.expect("rebuild");

    engine
        .update_weights(Some(1.0), Some(0.0), Some(0.0))
        .expect("weights");
    let rrf = SearchRequest::new("learning").with_fusion(FusionMethod::ReciprocalRank);
    let results = engine.hybrid_search(&rrf).await.expect("search");
    assert_eq!(
        results.contributing_methods,
        vec![SearchMethod::Vector, SearchMethod::Fulltext]
    );

    engine
        .update_weights(Some(0.0), Some(0.0), Some(0.0))
        .expect("weights");
    let max = SearchRequest::new("learning").with_fusion(FusionMethod::MaxScore);
    let results = engine.hybrid_search(&max).await.expect("search");
    assert!(!results.is_empty());
    assert_eq!(
        results.contributing_methods,
        vec![SearchMethod::Vector, SearchMethod::Fulltext]
    );
}

#[tokio::test]
async fn request_methods_only_narrow_the_configured_set() {
    let engine = engine_over(
        Arc::new(MemoryRepository::from_records(corpus())),
        config().with_enabled(EnabledMethods::only(SearchMethod::Vector)),
    );
    engine.rebuild_index().await.expect("rebuild");

    let request = SearchRequest::new("learning").with_methods(EnabledMethods::default());
    let results = engine.hybrid_search(&request).await.expect("search");
    assert_eq!(results.contributing_methods, vec![SearchMethod::Vector]);
}

#[tokio::test]
async fn find_similar_excludes_the_target() {
    let engine = engine_over(Arc::new(MemoryRepository::from_records(corpus())), config());
    engine.rebuild_index().await.expect("rebuild");

    let results = engine
        .find_similar(EntityKind::Snippet, 2, 5)
        .await
        .expect("similar");
    assert_eq!(results.algorithm, "similarity");
    assert!(!results.is_empty());
    assert!(results.references().iter().all(|r| *r != snippet_ref(2)));
    assert_eq!(results.hits[0].reference, snippet_ref(3));

    let unknown = engine
        .find_similar(EntityKind::Snippet, 999, 5)
        .await
        .expect("similar");
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn find_similar_accepts_unbounded_k() {
    let engine = engine_over(Arc::new(MemoryRepository::from_records(corpus())), config());
    engine.rebuild_index().await.expect("rebuild");

    let results = engine
        .find_similar(EntityKind::Snippet, 2, usize::MAX)
        .await
        .expect("similar");
    assert_eq!(results.len(), 2);
    assert!(results.references().iter().all(|r| *r != snippet_ref(2)));
}

#[tokio::test]
async fn reindex_entity_refreshes_served_vectors() {
    let repository = Arc::new(MemoryRepository::from_records(corpus()));
    let engine = engine_over(
        repository.clone(),
        config().with_weights(FusionWeights::new(1.0, 0.0, 0.0)),
    );
    engine.rebuild_index().await.expect("rebuild");

    repository
        .insert(snippet(1, "neural networks everywhere"))
        .expect("insert");
    assert!(engine.reindex_entity(snippet_ref(1)).await.expect("reindex"));

    let results = engine.search("neural networks", 1).await.expect("search");
    assert_eq!(results.hits[0].reference, snippet_ref(1));
}

#[tokio::test]
async fn statistics_report_counts_and_model() {
    let engine = engine_over(Arc::new(MemoryRepository::from_records(corpus())), config());
    engine.rebuild_index().await.expect("rebuild");

    let stats = engine.get_statistics().await.expect("stats");
    assert_eq!(stats.entity_counts[&EntityKind::Snippet], 3);
    assert_eq!(stats.entity_counts[&EntityKind::Profile], 0);
    assert_eq!(stats.embedding_count, 3);
    assert_eq!(stats.index.size, 3);
    assert_eq!(stats.embedding_dimension, DIM);
    assert!(serde_json::to_value(&stats).is_ok());
}

proptest! {
    #[test]
    fn updated_weights_are_normalized(
        v in proptest::option::of(0.0f32..5.0),
        f in proptest::option::of(0.0f32..5.0),
        m in proptest::option::of(0.0f32..5.0),
    ) {
        let engine = engine_over(Arc::new(MemoryRepository::new()), config());
        let weights = engine.update_weights(v, f, m).expect("valid weights");
        prop_assert_eq!(weights, engine.weights());
        if weights.sum() > 0.0 {
            prop_assert!((weights.sum() - 1.0).abs() < 1e-4);
        }
        prop_assert!(weights.vector >= 0.0 && weights.fulltext >= 0.0 && weights.metadata >= 0.0);
    }
}
