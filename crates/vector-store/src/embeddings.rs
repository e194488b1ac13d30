use crate::error::{Result, VectorStoreError};
use crate::hashing::{fnv1a_64, splitmix64};
use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

/// Text → fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Encode many texts; output order matches input order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.encode(text).await?);
        }
        Ok(out)
    }
}

const BIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic offline embedder based on signed feature hashing.
///
/// Every lowercase word and adjacent word pair is hashed to one dimension
/// with a pseudo-random sign, so texts sharing vocabulary end up close in
/// cosine space. Output is not normalized; the pipeline owns that choice.
#[derive(Debug, Clone)]
pub struct FeatureHashEmbedder {
    model_name: String,
    dimension: usize,
}

impl FeatureHashEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VectorStoreError::InvalidArgument(
                "embedding dimension must be > 0".to_string(),
            ));
        }
        Ok(Self {
            model_name: format!("feature-hash-{dimension}"),
            dimension,
        })
    }

    #[must_use]
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    #[must_use]
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];
        let words: Vec<String> = text.unicode_words().map(str::to_lowercase).collect();

        for word in &words {
            self.accumulate(&mut vec, word, 1.0);
        }
        for pair in words.windows(2) {
            self.accumulate(&mut vec, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }
        vec
    }

    fn accumulate(&self, vec: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a_64(feature.as_bytes());
        let slot = (hash % self.dimension as u64) as usize;
        let mut state = hash;
        let sign = if splitmix64(&mut state) >> 63 == 0 { 1.0 } else { -1.0 };
        vec[slot] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for FeatureHashEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}
