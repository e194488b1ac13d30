//! Hybrid retrieval: vector, lexical and metadata search fused into one ranking.

mod config;
mod error;
mod fusion;
mod hybrid;
mod lexical;
mod metadata;
mod request;
mod types;

pub use config::{HybridConfig, TimeoutConfig};
pub use error::{Result, SearchError};
pub use fusion::{FusedCandidate, FusionEngine, FusionMethod, FusionWeights, MethodResults};
pub use hybrid::{HybridSearch, HybridStatistics, RebuildReport};
pub use lexical::{LexicalConfig, LexicalEngine};
pub use metadata::{
    default_facet_fields, get_facets, validate_facet_fields, MetadataEngine, Predicate, PredicateOp,
};
pub use request::{SearchRequest, DEFAULT_K};
pub use types::{
    Candidate, EnabledMethods, Facets, ScoreBreakdown, SearchHit, SearchMethod, SearchResults,
};
