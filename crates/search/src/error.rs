use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Empty query")]
    EmptyQuery,

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Unknown fusion method '{0}' (expected weighted_sum, reciprocal_rank_fusion or max_score)")]
    UnknownFusionMethod(String),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] knowledge_vector_store::VectorStoreError),

    #[error("Corpus error: {0}")]
    CorpusError(#[from] knowledge_corpus::CorpusError),
}
