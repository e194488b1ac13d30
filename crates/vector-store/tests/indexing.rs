use knowledge_corpus::{
    EntityKind, EntityReference, MemoryRepository, Record, Repository, Snippet,
};
use knowledge_vector_store::{
    EmbeddingConfig, EmbeddingIndexer, EmbeddingPipeline, FeatureHashEmbedder, IndexConfig,
    VectorBackend, VectorIndex,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn snippet(id: i64, title: &str) -> Record {
    Record::Snippet(Snippet {
        id,
        title: title.to_string(),
        content: String::new(),
        content_type: None,
        category: None,
        is_validated: false,
        confidence_score: 0.0,
    })
}

fn pipeline() -> Arc<EmbeddingPipeline> {
    let config = EmbeddingConfig::default();
    let provider = Arc::new(FeatureHashEmbedder::new(config.dimension).expect("embedder"));
    Arc::new(EmbeddingPipeline::new(provider, &config).expect("pipeline"))
}

#[tokio::test]
async fn neural_query_prefers_deep_learning_document() {
    let repo = MemoryRepository::from_records(vec![
        snippet(1, "cats and dogs"),
        snippet(2, "machine learning basics"),
        snippet(3, "deep learning neural networks"),
    ]);
    let pipeline = pipeline();
    let indexer = EmbeddingIndexer::new(pipeline.clone(), Duration::from_secs(5));

    let report = indexer.index_all(&repo).await.expect("index");
    assert_eq!(report.indexed(), 3);
    assert_eq!(report.kinds[&EntityKind::Snippet].total, 3);

    let index = VectorIndex::new(pipeline.dimension(), IndexConfig::default()).expect("index");
    let embeddings = repo
        .get_all_embeddings(None, Some(pipeline.model_name()))
        .await
        .expect("embeddings");
    index.rebuild(&embeddings).expect("rebuild");

    let query = pipeline.encode_query("neural networks").await.expect("query");
    let hits = index.search(&query, 2, None, None).expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].reference, EntityReference::new(EntityKind::Snippet, 3));

    let cats = EntityReference::new(EntityKind::Snippet, 1);
    let all = index.search(&query, 3, None, None).expect("search");
    let position = |reference| all.iter().position(|hit| hit.reference == reference);
    assert!(position(EntityReference::new(EntityKind::Snippet, 3)) < position(cats));
}

#[tokio::test]
async fn reindexing_same_entity_updates_in_place() {
    let repo = MemoryRepository::from_records(vec![snippet(1, "rust ownership")]);
    let pipeline = pipeline();
    let indexer = EmbeddingIndexer::new(pipeline.clone(), Duration::from_secs(5));
    let reference = EntityReference::new(EntityKind::Snippet, 1);

    indexer.index_all(&repo).await.expect("first pass");
    repo.insert(snippet(1, "rust borrowing")).expect("insert");
    assert!(indexer.reindex_entity(&repo, reference).await.expect("reindex"));

    assert_eq!(repo.embedding_count(), 1);
    let stored = repo
        .get_embedding(reference, pipeline.model_name())
        .await
        .expect("lookup")
        .expect("present");
    let expected = pipeline.encode_query("rust borrowing").await.expect("encode");
    assert_eq!(stored.vector, expected);
}

#[tokio::test]
async fn empty_texts_are_reported_as_failed() {
    let repo = MemoryRepository::from_records(vec![snippet(1, ""), snippet(2, "graph databases")]);
    let indexer = EmbeddingIndexer::new(pipeline(), Duration::from_secs(5));
    let report = indexer.index_all(&repo).await.expect("index");
    let snippets = report.kinds[&EntityKind::Snippet];
    assert_eq!((snippets.indexed, snippets.failed), (1, 1));
}

fn kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop_oneof![
        Just(EntityKind::Document),
        Just(EntityKind::Profile),
        Just(EntityKind::Snippet),
    ]
}

proptest! {
    #[test]
    fn search_respects_k_order_and_kind_filter(
        rows in proptest::collection::vec(
            (kind_strategy(), proptest::collection::vec(-1.0f32..1.0, 4)),
            1..40,
        ),
        query in proptest::collection::vec(-1.0f32..1.0, 4),
        k in 0usize..10,
        filter in kind_strategy(),
    ) {
        let index = VectorIndex::new(4, IndexConfig::default()).unwrap();
        let mut backend = index.create_backend().unwrap();
        let vectors: Vec<Vec<f32>> = rows.iter().map(|(_, v)| v.clone()).collect();
        let refs: Vec<EntityReference> = rows
            .iter()
            .enumerate()
            .map(|(id, (kind, _))| EntityReference::new(*kind, id as i64))
            .collect();
        backend.add(&vectors, &refs).unwrap();
        backend.build().unwrap();
        index.swap(backend).unwrap();

        let hits = index.search(&query, k, Some(&[filter]), None).unwrap();
        prop_assert!(hits.len() <= k);
        prop_assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        prop_assert!(hits.iter().all(|h| h.reference.kind == filter));
        prop_assert!(hits.iter().all(|h| (-1.0001..=1.0001).contains(&h.score)));
    }
}
