use crate::embeddings::EmbeddingProvider;
use crate::error::{Result, VectorStoreError};
use crate::similarity::{is_zero_vector, l2_normalize};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_name: String,
    pub dimension: usize,
    /// L2-normalize every vector. Fixed for the pipeline's lifetime.
    pub normalize: bool,
    pub batch_size: usize,
    /// Query embeddings kept in memory; 0 disables the cache.
    pub cache_capacity: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: "feature-hash-384".to_string(),
            dimension: 384,
            normalize: true,
            batch_size: 32,
            cache_capacity: 256,
            timeout_ms: 10_000,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.dimension == 0 {
            return Err("embedding.dimension must be > 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("embedding.batch_size must be > 0".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("embedding.timeout_ms must be > 0".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Run `future` with a deadline, folding the elapsed case into an error.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| VectorStoreError::Timeout(duration))?
}

/// Batching, normalization and failure isolation around a provider.
///
/// `encode_batch` never fails as a whole: a slot whose provider call fails,
/// times out or returns the wrong dimension comes back as a zero vector.
pub struct EmbeddingPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    normalize: bool,
    batch_size: usize,
    timeout: Duration,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl EmbeddingPipeline {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Result<Self> {
        config
            .validate()
            .map_err(VectorStoreError::InvalidArgument)?;
        if provider.dimension() != config.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: config.dimension,
                actual: provider.dimension(),
            });
        }
        Ok(Self {
            provider,
            normalize: config.normalize,
            batch_size: config.batch_size,
            timeout: config.timeout(),
            cache: NonZeroUsize::new(config.cache_capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        })
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    #[must_use]
    pub const fn normalizes(&self) -> bool {
        self.normalize
    }

    /// Encode one query text. Unlike batches, a failure here is returned so
    /// the caller can mark the vector method as degraded.
    pub async fn encode_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cached(text) {
            return Ok(hit);
        }

        let raw = with_timeout(self.timeout, self.provider.encode(text)).await?;
        let vector = self.finish(raw)?;
        if !is_zero_vector(&vector) {
            self.remember(text, &vector);
        }
        Ok(vector)
    }

    /// Encode `texts` in provider batches, preserving order and length.
    pub async fn encode_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            match with_timeout(self.timeout, self.provider.encode_batch(chunk)).await {
                Ok(vectors) if vectors.len() == chunk.len() => {
                    out.extend(vectors.into_iter().map(|raw| self.finish_or_zero(raw)));
                }
                Ok(vectors) => {
                    log::warn!(
                        "Embedding provider returned {} vectors for {} inputs, retrying element-wise",
                        vectors.len(),
                        chunk.len()
                    );
                    self.encode_each(chunk, &mut out).await;
                }
                Err(err) => {
                    log::warn!("Embedding batch of {} failed ({err}), retrying element-wise", chunk.len());
                    self.encode_each(chunk, &mut out).await;
                }
            }
        }
        debug_assert_eq!(out.len(), texts.len());
        out
    }

    async fn encode_each(&self, texts: &[String], out: &mut Vec<Vec<f32>>) {
        for text in texts {
            let vector = match with_timeout(self.timeout, self.provider.encode(text)).await {
                Ok(raw) => self.finish_or_zero(raw),
                Err(err) => {
                    log::warn!("Embedding failed for one input ({err}), using zero vector");
                    self.zero()
                }
            };
            out.push(vector);
        }
    }

    fn finish(&self, mut raw: Vec<f32>) -> Result<Vec<f32>> {
        if raw.len() != self.dimension() {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension(),
                actual: raw.len(),
            });
        }
        if self.normalize {
            l2_normalize(&mut raw);
        }
        Ok(raw)
    }

    fn finish_or_zero(&self, raw: Vec<f32>) -> Vec<f32> {
        self.finish(raw).unwrap_or_else(|err| {
            log::warn!("Discarding provider output ({err}), using zero vector");
            self.zero()
        })
    }

    fn zero(&self) -> Vec<f32> {
        vec![0.0; self.dimension()]
    }

    fn cached(&self, text: &str) -> Option<Vec<f32>> {
        let cache = self.cache.as_ref()?;
        let mut cache = cache.lock().ok()?;
        let hit = cache.get(&text.to_string()).cloned();
        hit
    }

    fn remember(&self, text: &str, vector: &[f32]) {
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.put(text.to_string(), vector.to_vec());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::FeatureHashEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every batch call and every input containing "bad".
    struct FlakyProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn encode(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if text.contains("bad") {
                return Err(VectorStoreError::EmbeddingError("boom".to_string()));
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn encode_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(VectorStoreError::EmbeddingError("batch endpoint down".to_string()))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        fn model_name(&self) -> &str {
            "slow"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![1.0, 0.0])
        }
    }

    fn config(dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            dimension,
            batch_size: 2,
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn failed_slots_become_zero_vectors_in_place() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
        });
        let pipeline = EmbeddingPipeline::new(provider, &config(2)).unwrap();
        let texts: Vec<String> = ["ok", "bad one", "fine", "also bad", "last"]
            .iter()
            .map(ToString::to_string)
            .collect();

        let vectors = pipeline.encode_batch(&texts).await;
        assert_eq!(vectors.len(), 5);
        let zero_slots: Vec<usize> = vectors
            .iter()
            .enumerate()
            .filter(|(_, v)| is_zero_vector(v))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(zero_slots, vec![1, 3]);
        assert!((vectors[0].iter().map(|v| v * v).sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn query_cache_avoids_second_provider_call() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
        });
        let pipeline = EmbeddingPipeline::new(provider.clone(), &config(2)).unwrap();
        let first = pipeline.encode_query("hello").await.unwrap();
        let second = pipeline.encode_query("hello").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
        assert!(pipeline.encode_query("bad").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let cfg = EmbeddingConfig {
            timeout_ms: 50,
            ..config(2)
        };
        let pipeline = EmbeddingPipeline::new(Arc::new(SlowProvider), &cfg).unwrap();
        let err = pipeline.encode_query("anything").await.unwrap_err();
        assert!(matches!(err, VectorStoreError::Timeout(_)));

        let vectors = pipeline.encode_batch(&["a".to_string()]).await;
        assert!(is_zero_vector(&vectors[0]));
    }

    #[test]
    fn provider_dimension_must_match_config() {
        let provider = Arc::new(FeatureHashEmbedder::new(16).unwrap());
        let err = EmbeddingPipeline::new(provider, &config(32)).err();
        assert!(matches!(
            err,
            Some(VectorStoreError::DimensionMismatch { expected: 32, actual: 16 })
        ));
    }
}
