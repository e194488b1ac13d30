//! # Knowledge Vector Store
//!
//! Embedding pipeline and nearest-neighbor search over entity vectors.
//!
//! ## Features
//!
//! - **Exact search** as one batched matrix-vector product (`ndarray`)
//! - **Approximate search** via random-hyperplane LSH behind the same trait
//! - **Double-buffered index**: rebuilds never block or corrupt in-flight searches
//! - **Failure-isolated batching**: one bad input yields one zero vector
//! - **Pluggable providers**: offline feature hashing, an HTTP endpoint, or
//!   an on-device MiniLM model (`local-embeddings` feature)
//!
//! ## Architecture
//!
//! ```text
//! Record::embedding_text()
//!     │
//!     ├──> EmbeddingPipeline (batching, timeout, L2 normalize, LRU query cache)
//!     │      └─> EmbeddingProvider (FeatureHashEmbedder | HttpEmbedder)
//!     │
//!     ├──> EmbeddingIndexer ──> Repository::upsert_embedding
//!     │
//!     └──> VectorIndex (RwLock<Arc<dyn VectorBackend>>)
//!            ├─> ExactIndex
//!            └─> LshIndex
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use knowledge_vector_store::{IndexConfig, VectorIndex};
//!
//! # fn main() -> knowledge_vector_store::Result<()> {
//! let index = VectorIndex::new(3, IndexConfig::default())?;
//! let hits = index.search(&[1.0, 0.0, 0.0], 10, None, None)?;
//! assert!(hits.is_empty());
//! # Ok(())
//! # }
//! ```

mod backend;
mod embeddings;
mod error;
mod exact;
mod hashing;
mod http;
mod index;
mod indexer;
#[cfg(feature = "local-embeddings")]
mod local;
mod lsh;
mod pipeline;
mod similarity;

pub use backend::{VectorBackend, VectorHit};
pub use embeddings::{EmbeddingProvider, FeatureHashEmbedder};
pub use error::{Result, VectorStoreError};
pub use exact::ExactIndex;
pub use http::{HttpEmbedder, HttpEmbedderConfig};
pub use index::{BackendKind, IndexConfig, IndexStats, RebuildSummary, VectorIndex};
pub use indexer::{EmbeddingIndexer, IndexReport, KindReport};
#[cfg(feature = "local-embeddings")]
pub use local::{LocalEmbedder, LOCAL_DIMENSION, LOCAL_MODEL_NAME};
pub use lsh::{LshIndex, LshParams};
pub use pipeline::{with_timeout, EmbeddingConfig, EmbeddingPipeline};
pub use similarity::{
    cosine_similarity, dot, euclidean_distance, is_zero_vector, l2_normalize, Metric,
};
