use crate::embeddings::EmbeddingProvider;
use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::spawn_blocking;

pub const LOCAL_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const LOCAL_DIMENSION: usize = 384;

/// On-device sentence embeddings (all-MiniLM-L6-v2 via ONNX Runtime).
///
/// The model is downloaded into `cache_dir` on first use. Inference is
/// CPU-bound and runs on the blocking pool.
pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    max_batch: usize,
}

impl LocalEmbedder {
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        let mut options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            log::debug!("Local embedding model cache: {}", dir.display());
            options = options.with_cache_dir(dir);
        }
        let model = TextEmbedding::try_new(options).map_err(|err| {
            VectorStoreError::EmbeddingError(format!("Failed to load {LOCAL_MODEL_NAME}: {err}"))
        })?;
        log::info!("Loaded local embedding model {LOCAL_MODEL_NAME}");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            max_batch: 32,
        })
    }

    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn model_name(&self) -> &str {
        LOCAL_MODEL_NAME
    }

    fn dimension(&self) -> usize {
        LOCAL_DIMENSION
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.encode_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("model returned no vector".to_string()))
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let owned = texts.to_vec();
        let model = Arc::clone(&self.model);
        let max_batch = self.max_batch;
        spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| {
                VectorStoreError::EmbeddingError("Failed to lock embedding model".into())
            })?;
            model
                .embed(owned, Some(max_batch))
                .map_err(|err| VectorStoreError::EmbeddingError(format!("Inference failed: {err}")))
        })
        .await
        .map_err(|err| VectorStoreError::EmbeddingError(format!("Join error: {err}")))?
    }
}
