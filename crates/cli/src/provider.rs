use anyhow::{bail, Context, Result};
use knowledge_vector_store::{
    EmbeddingConfig, EmbeddingProvider, FeatureHashEmbedder, HttpEmbedder, HttpEmbedderConfig,
};
use std::env;
#[cfg(feature = "local-embeddings")]
use std::path::PathBuf;
use std::sync::Arc;

pub const MODE_ENV: &str = "KNOWLEDGE_EMBEDDING_MODE";

/// Build the embedding provider selected by `KNOWLEDGE_EMBEDDING_MODE`
/// (`hash` when unset). Dimension and model name come from the config so
/// persisted embeddings stay comparable across runs; `local` always uses
/// all-MiniLM-L6-v2 and needs the `local-embeddings` feature.
pub fn from_env(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let mode = env::var(MODE_ENV).unwrap_or_else(|_| "hash".to_string());
    match mode.trim().to_ascii_lowercase().as_str() {
        "hash" => {
            let embedder = FeatureHashEmbedder::new(config.dimension)
                .context("Failed to create feature-hash embedder")?
                .with_model_name(config.model_name.clone());
            Ok(Arc::new(embedder))
        }
        "http" => {
            let defaults = HttpEmbedderConfig::default();
            let http = HttpEmbedderConfig {
                api_base: env::var("KNOWLEDGE_EMBEDDING_API_BASE").unwrap_or(defaults.api_base),
                path: env::var("KNOWLEDGE_EMBEDDING_API_PATH").unwrap_or(defaults.path),
                model: config.model_name.clone(),
                dimension: config.dimension,
                api_key: env::var("KNOWLEDGE_EMBEDDING_API_KEY").ok(),
                timeout_ms: config.timeout_ms,
            };
            log::debug!("Using HTTP embeddings at {}{}", http.api_base, http.path);
            let embedder = HttpEmbedder::new(http).context("Failed to create HTTP embedder")?;
            Ok(Arc::new(embedder))
        }
        "local" => local(config),
        other => bail!("Unknown {MODE_ENV} '{other}' (expected hash, http or local)"),
    }
}

#[cfg(feature = "local-embeddings")]
fn local(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    use knowledge_vector_store::{LocalEmbedder, LOCAL_DIMENSION};

    if config.dimension != LOCAL_DIMENSION {
        bail!(
            "local embeddings are {LOCAL_DIMENSION}-dimensional but embedding.dimension is {}",
            config.dimension
        );
    }
    let cache_dir = env::var_os("KNOWLEDGE_MODEL_DIR").map(PathBuf::from);
    let embedder = LocalEmbedder::new(cache_dir)
        .context("Failed to load local embedding model")?
        .with_max_batch(config.batch_size);
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "local-embeddings"))]
fn local(_config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    bail!("{MODE_ENV}=local requires building with the `local-embeddings` feature")
}
