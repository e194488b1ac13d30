//! # Knowledge Corpus
//!
//! Data model shared by every retrieval engine, plus the storage seam.
//!
//! ## Architecture
//!
//! ```text
//! Record (Profile | Snippet | Document)
//!     │
//!     ├──> reference()          → EntityReference (kind, id)
//!     ├──> searchable_fields()  → lexical engine
//!     ├──> attributes()         → metadata engine (AttributeSchema)
//!     ├──> embedding_text()     → embedding pipeline
//!     └──> summary()            → enrichment payload
//!
//! Repository (async trait)
//!     └──> MemoryRepository (ordered maps + JSON file)
//! ```

mod embedding;
mod entity;
mod error;
mod memory;
mod record;
mod repository;
mod schema;

pub use embedding::EmbeddingRecord;
pub use entity::{EntityKind, EntityReference};
pub use error::{CorpusError, Result};
pub use memory::{MemoryRepository, CORPUS_SCHEMA_VERSION};
pub use record::{truncate_chars, Document, Profile, Record, Snippet};
pub use repository::Repository;
pub use schema::{AttributeDef, AttributeSchema, AttributeType, AttributeValue};
