use crate::entities::{EntityCategory, ExtractedEntity};
use crate::intent::QueryIntent;
use knowledge_corpus::{AttributeValue, EntityKind};
use knowledge_search::{EnabledMethods, FusionWeights, Predicate, SearchRequest, DEFAULT_K};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use unicode_segmentation::UnicodeSegmentation;

const VERIFIED_ATTRIBUTE: &str = "is_verified";
const CONFIDENCE_ATTRIBUTE: &str = "confidence";
const SENIOR_MIN_CONFIDENCE: f64 = 0.8;
const QUALITY_MIN_CONFIDENCE: f64 = 0.7;
const QUALITY_MIN_SCORE: f32 = 0.5;
const TECHNICAL_VECTOR_STEP: f32 = 0.1;
const TECHNICAL_VECTOR_CAP: f32 = 0.8;
const TECHNICAL_FULLTEXT_STEP: f32 = 0.05;
const TECHNICAL_FULLTEXT_FLOOR: f32 = 0.1;

/// Everything the orchestrator needs to run one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStrategy {
    pub methods: EnabledMethods,
    pub weights: FusionWeights,
    pub filters: Vec<Predicate>,
    /// Empty means every kind.
    pub kinds: Vec<EntityKind>,
    pub k: usize,
    pub min_score: f32,
    pub expansion_terms: Vec<String>,
    /// Multipliers on the lexical field weights, keyed by field name.
    pub boost_fields: BTreeMap<String, f32>,
    /// Hint for callers that post-process results. The orchestrator
    /// returns fused order and never reranks.
    pub rerank: bool,
}

impl Default for SearchStrategy {
    fn default() -> Self {
        Self {
            methods: EnabledMethods::default(),
            weights: FusionWeights::default(),
            filters: Vec::new(),
            kinds: Vec::new(),
            k: DEFAULT_K,
            min_score: 0.3,
            expansion_terms: Vec::new(),
            boost_fields: BTreeMap::new(),
            rerank: false,
        }
    }
}

impl SearchStrategy {
    /// Preset for `intent` before any refinement.
    #[must_use]
    pub fn for_intent(intent: QueryIntent) -> Self {
        let base = Self::default();
        match intent {
            QueryIntent::FindPerson => Self {
                kinds: vec![EntityKind::Profile],
                weights: FusionWeights::new(0.4, 0.4, 0.2),
                k: 15,
                boost_fields: boosts(&[("name", 2.0), ("title", 1.5)]),
                ..base
            },
            QueryIntent::FindKnowledge => Self {
                kinds: vec![EntityKind::Snippet, EntityKind::Document],
                weights: FusionWeights::new(0.6, 0.3, 0.1),
                k: 10,
                boost_fields: boosts(&[("title", 1.5), ("content", 1.0)]),
                ..base
            },
            QueryIntent::Compare => Self {
                weights: FusionWeights::new(0.7, 0.2, 0.1),
                k: 20,
                rerank: true,
                ..base
            },
            QueryIntent::List => Self {
                weights: FusionWeights::new(0.3, 0.3, 0.4),
                k: 50,
                min_score: 0.2,
                ..base
            },
            QueryIntent::Filter => Self {
                weights: FusionWeights::new(0.2, 0.3, 0.5),
                k: 20,
                ..base
            },
            QueryIntent::Recommend => Self {
                weights: FusionWeights::new(0.8, 0.1, 0.1),
                k: 10,
                rerank: true,
                ..base
            },
            QueryIntent::Explain => Self {
                kinds: vec![EntityKind::Snippet, EntityKind::Document],
                weights: FusionWeights::new(0.6, 0.3, 0.1),
                k: 5,
                ..base
            },
            QueryIntent::Search | QueryIntent::Question => base,
        }
    }

    /// Request for the orchestrator. With `expand`, expansion terms are
    /// appended to the query text.
    #[must_use]
    pub fn to_request(&self, query: &str, expand: bool) -> SearchRequest {
        let text = if expand && !self.expansion_terms.is_empty() {
            format!("{query} {}", self.expansion_terms.join(" "))
        } else {
            query.to_string()
        };
        SearchRequest::new(text)
            .with_k(self.k)
            .with_kinds(self.kinds.clone())
            .with_filters(self.filters.iter().cloned())
            .with_min_score(self.min_score)
            .with_weights(self.weights)
            .with_methods(self.methods)
            .with_field_boosts(self.boost_fields.clone())
    }

    fn set_confidence_floor(&mut self, floor: f64) {
        self.filters
            .retain(|filter| filter.attribute != CONFIDENCE_ATTRIBUTE);
        self.filters.push(Predicate::at_least(CONFIDENCE_ATTRIBUTE, floor));
    }

    fn has_filter(&self, attribute: &str) -> bool {
        self.filters.iter().any(|filter| filter.attribute == attribute)
    }
}

fn boosts(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
    pairs
        .iter()
        .map(|(field, boost)| ((*field).to_string(), *boost))
        .collect()
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|word| (*word).to_string()).collect()
}

/// Whole-word triggers for filter refinements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordRules {
    /// Adds `is_verified = true`.
    pub verification: Vec<String>,
    /// Adds `confidence >= 0.8`.
    pub seniority: Vec<String>,
    /// Sets `min_score = 0.5` and `confidence >= 0.7`.
    pub quality: Vec<String>,
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self {
            verification: words(&["verified", "authentic"]),
            seniority: words(&["senior", "lead", "principal", "staff"]),
            quality: words(&["best", "top", "excellent", "expert"]),
        }
    }
}

/// Intent preset, then entity refinements, then keyword refinements.
/// Later steps override earlier ones.
pub struct StrategyOptimizer {
    rules: KeywordRules,
}

impl StrategyOptimizer {
    #[must_use]
    pub const fn new(rules: KeywordRules) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn optimize(
        &self,
        query: &str,
        intent: QueryIntent,
        entities: &[ExtractedEntity],
    ) -> SearchStrategy {
        let mut strategy = SearchStrategy::for_intent(intent);

        for entity in entities {
            match entity.category {
                EntityCategory::Role if strategy.kinds.is_empty() => {
                    strategy.kinds = vec![EntityKind::Profile];
                }
                EntityCategory::Skill | EntityCategory::Technology => {
                    let weights = &mut strategy.weights;
                    weights.vector = (weights.vector + TECHNICAL_VECTOR_STEP).min(TECHNICAL_VECTOR_CAP);
                    weights.fulltext =
                        (weights.fulltext - TECHNICAL_FULLTEXT_STEP).max(TECHNICAL_FULLTEXT_FLOOR);
                }
                _ => {}
            }
        }

        let lowered = query.to_lowercase();
        let tokens: Vec<&str> = lowered.unicode_words().collect();
        let mentions = |triggers: &[String]| {
            triggers
                .iter()
                .any(|trigger| tokens.iter().any(|token| *token == trigger.as_str()))
        };

        if mentions(&self.rules.verification) && !strategy.has_filter(VERIFIED_ATTRIBUTE) {
            strategy
                .filters
                .push(Predicate::equals(VERIFIED_ATTRIBUTE, AttributeValue::Bool(true)));
        }
        if mentions(&self.rules.seniority) {
            strategy.set_confidence_floor(SENIOR_MIN_CONFIDENCE);
        }
        if mentions(&self.rules.quality) {
            strategy.min_score = QUALITY_MIN_SCORE;
            strategy.set_confidence_floor(QUALITY_MIN_CONFIDENCE);
        }

        strategy.weights = strategy.weights.normalized();
        log::debug!(
            "Strategy for {intent}: k={}, kinds={:?}, {} filters",
            strategy.k,
            strategy.kinds,
            strategy.filters.len()
        );
        strategy
    }
}
