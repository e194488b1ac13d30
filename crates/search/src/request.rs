use crate::fusion::{FusionMethod, FusionWeights};
use crate::metadata::Predicate;
use crate::types::EnabledMethods;
use knowledge_corpus::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_K: usize = 10;

/// Arguments of one hybrid search call.
///
/// The optional overrides let a per-query strategy replace the
/// orchestrator's weights or fusion algorithm for this call only. A
/// `methods` override can only narrow the configured methods.
///
/// `min_score` applies to fused totals on the score scale (weighted sum,
/// max score). Reciprocal-rank totals are rank-based and ignore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub k: usize,
    #[serde(default)]
    pub kinds: Option<Vec<EntityKind>>,
    #[serde(default)]
    pub filters: Vec<Predicate>,
    #[serde(default)]
    pub include_scores: bool,
    #[serde(default)]
    pub include_facets: bool,
    #[serde(default)]
    pub facet_fields: Vec<String>,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub weights: Option<FusionWeights>,
    #[serde(default)]
    pub methods: Option<EnabledMethods>,
    #[serde(default)]
    pub fusion: Option<FusionMethod>,
    /// Multipliers on lexical field weights, keyed by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_boosts: BTreeMap<String, f32>,
}

impl SearchRequest {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: DEFAULT_K,
            kinds: None,
            filters: Vec::new(),
            include_scores: false,
            include_facets: false,
            facet_fields: Vec::new(),
            min_score: None,
            weights: None,
            methods: None,
            fusion: None,
            field_boosts: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    #[must_use]
    pub fn with_kinds(mut self, kinds: Vec<EntityKind>) -> Self {
        self.kinds = (!kinds.is_empty()).then_some(kinds);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: impl IntoIterator<Item = Predicate>) -> Self {
        self.filters.extend(filters);
        self
    }

    #[must_use]
    pub fn include_scores(mut self, include: bool) -> Self {
        self.include_scores = include;
        self
    }

    /// Request facets; an empty field list means the per-kind defaults.
    #[must_use]
    pub fn with_facets(mut self, fields: Vec<String>) -> Self {
        self.include_facets = true;
        self.facet_fields = fields;
        self
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    #[must_use]
    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    #[must_use]
    pub fn with_methods(mut self, methods: EnabledMethods) -> Self {
        self.methods = Some(methods);
        self
    }

    #[must_use]
    pub fn with_fusion(mut self, fusion: FusionMethod) -> Self {
        self.fusion = Some(fusion);
        self
    }

    #[must_use]
    pub fn with_field_boosts(mut self, boosts: BTreeMap<String, f32>) -> Self {
        self.field_boosts = boosts;
        self
    }
}
