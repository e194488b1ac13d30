use crate::metadata::Predicate;
use knowledge_corpus::EntityReference;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One of the three independent signal sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Vector,
    Fulltext,
    Metadata,
}

impl SearchMethod {
    pub const ALL: [Self; 3] = [Self::Vector, Self::Fulltext, Self::Metadata];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Fulltext => "fulltext",
            Self::Metadata => "metadata",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnabledMethods {
    pub vector: bool,
    pub fulltext: bool,
    pub metadata: bool,
}

impl Default for EnabledMethods {
    fn default() -> Self {
        Self {
            vector: true,
            fulltext: true,
            metadata: true,
        }
    }
}

impl EnabledMethods {
    #[must_use]
    pub const fn only(method: SearchMethod) -> Self {
        Self {
            vector: matches!(method, SearchMethod::Vector),
            fulltext: matches!(method, SearchMethod::Fulltext),
            metadata: matches!(method, SearchMethod::Metadata),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self, method: SearchMethod) -> bool {
        match method {
            SearchMethod::Vector => self.vector,
            SearchMethod::Fulltext => self.fulltext,
            SearchMethod::Metadata => self.metadata,
        }
    }

    /// Methods enabled in both sets.
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        Self {
            vector: self.vector && other.vector,
            fulltext: self.fulltext && other.fulltext,
            metadata: self.metadata && other.metadata,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> Vec<SearchMethod> {
        SearchMethod::ALL
            .into_iter()
            .filter(|method| self.is_enabled(*method))
            .collect()
    }
}

/// A scored candidate from a single method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub reference: EntityReference,
    pub score: f32,
}

impl Candidate {
    #[must_use]
    pub const fn new(reference: EntityReference, score: f32) -> Self {
        Self { reference, score }
    }
}

/// Per-method raw scores behind a fused total. Absent methods score 0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total: f32,
    pub vector: f32,
    pub fulltext: f32,
    pub metadata: f32,
    /// Methods whose candidate list contained this entity.
    pub methods: Vec<SearchMethod>,
}

impl ScoreBreakdown {
    #[must_use]
    pub const fn score(&self, method: SearchMethod) -> f32 {
        match method {
            SearchMethod::Vector => self.vector,
            SearchMethod::Fulltext => self.fulltext,
            SearchMethod::Metadata => self.metadata,
        }
    }

    pub fn set_score(&mut self, method: SearchMethod, score: f32) {
        match method {
            SearchMethod::Vector => self.vector = score,
            SearchMethod::Fulltext => self.fulltext = score,
            SearchMethod::Metadata => self.metadata = score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub reference: EntityReference,
    pub score: f32,
    /// 1-based, dense.
    pub rank: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
    /// Enrichment payload, or `{"error": ...}` when the record could not be loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl SearchHit {
    #[must_use]
    pub fn enrichment_error(&self) -> Option<&str> {
        self.content
            .as_ref()
            .and_then(|content| content.get("error"))
            .and_then(Value::as_str)
    }
}

/// `attribute → value → count` over a result window.
pub type Facets = BTreeMap<String, BTreeMap<String, usize>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub elapsed_ms: f64,
    pub algorithm: String,
    pub filters: Vec<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Facets>,
    /// Methods that ran to completion for this call.
    pub contributing_methods: Vec<SearchMethod>,
    /// Methods that were requested but failed or timed out.
    pub degraded_methods: Vec<SearchMethod>,
}

impl SearchResults {
    #[must_use]
    pub fn empty(query: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            hits: Vec::new(),
            elapsed_ms: 0.0,
            algorithm: algorithm.into(),
            filters: Vec::new(),
            facets: None,
            contributing_methods: Vec::new(),
            degraded_methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    #[must_use]
    pub fn references(&self) -> Vec<EntityReference> {
        self.hits.iter().map(|hit| hit.reference).collect()
    }
}
