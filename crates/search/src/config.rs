use crate::error::{Result, SearchError};
use crate::fusion::{FusionEngine, FusionMethod, FusionWeights};
use crate::lexical::LexicalConfig;
use crate::types::EnabledMethods;
use knowledge_vector_store::{EmbeddingConfig, IndexConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for each repository call. Provider calls use `embedding.timeout_ms`.
    pub storage_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { storage_ms: 5_000 }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub const fn storage(&self) -> Duration {
        Duration::from_millis(self.storage_ms)
    }
}

/// Everything one orchestrator instance needs. Instances with different
/// configs coexist freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub weights: FusionWeights,
    pub enabled: EnabledMethods,
    pub fusion: FusionMethod,
    pub rrf_k: f32,
    /// Each method fetches `k * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
    /// Run vector and lexical search concurrently.
    pub parallel: bool,
    pub lexical: LexicalConfig,
    pub timeouts: TimeoutConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            enabled: EnabledMethods::default(),
            fusion: FusionMethod::WeightedSum,
            rrf_k: FusionEngine::DEFAULT_RRF_K,
            candidate_multiplier: 3,
            parallel: true,
            lexical: LexicalConfig::default(),
            timeouts: TimeoutConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl HybridConfig {
    #[must_use]
    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = weights;
        self
    }

    #[must_use]
    pub fn with_fusion(mut self, fusion: FusionMethod) -> Self {
        self.fusion = fusion;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: EnabledMethods) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.embedding = embedding;
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = index;
        self
    }

    /// Sequential sub-searches, useful for deterministic debugging.
    #[must_use]
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        self.weights.validate().map_err(|err| err.to_string())?;
        if !self.rrf_k.is_finite() || self.rrf_k <= 0.0 {
            return Err(format!("rrf_k must be > 0, got {}", self.rrf_k));
        }
        if self.candidate_multiplier == 0 {
            return Err("candidate_multiplier must be >= 1".to_string());
        }
        if self.timeouts.storage_ms == 0 {
            return Err("timeouts.storage_ms must be > 0".to_string());
        }
        self.lexical.validate()?;
        self.embedding.validate()?;
        self.index.validate()?;
        Ok(())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| SearchError::InvalidConfig(format!("invalid TOML: {err}")))?;
        config.validate().map_err(SearchError::InvalidConfig)?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
            SearchError::InvalidConfig(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }
}
