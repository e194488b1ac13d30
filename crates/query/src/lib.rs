//! # Knowledge Query
//!
//! Turns a natural-language query into a [`SearchStrategy`] for the hybrid
//! orchestrator, and keeps a short per-session history.
//!
//! ## Pipeline
//!
//! ```text
//! raw query
//!     │ normalize_query
//!     ▼
//! IntentClassifier ──> (intent, confidence)
//! EntityExtractor  ──> non-overlapping spans
//! QueryExpander    ──> synonym / related terms
//! StrategyOptimizer ─> intent preset → entity refinements → keyword filters
//!     │
//!     ├──> SessionStore (bounded history per session id)
//!     └──> SearchStrategy::to_request() → knowledge_search::SearchRequest
//! ```
//!
//! ## Example
//!
//! ```
//! use knowledge_query::{QueryIntent, QueryUnderstandingEngine, UnderstandingConfig};
//!
//! # fn main() -> knowledge_query::Result<()> {
//! let engine = QueryUnderstandingEngine::new(UnderstandingConfig::default())?;
//! let understanding = engine.understand("List all verified developers", None, false)?;
//! assert_eq!(understanding.intent, QueryIntent::List);
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod entities;
mod error;
mod expansion;
mod intent;
mod session;
mod strategy;

pub use config::UnderstandingConfig;
pub use engine::{normalize_query, QueryUnderstanding, QueryUnderstandingEngine, UnderstandingStatistics};
pub use entities::{EntityCategory, EntityExtractor, ExtractedEntity, Vocabularies};
pub use error::{QueryError, Result};
pub use expansion::{ExpansionTables, QueryExpander, DEFAULT_MAX_EXPANSIONS};
pub use intent::{default_rules, IntentClassifier, IntentRule, QueryIntent, FALLBACK_CONFIDENCE};
pub use session::{SessionContext, SessionLimits, SessionStore};
pub use strategy::{KeywordRules, SearchStrategy, StrategyOptimizer};
