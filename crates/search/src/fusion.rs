use crate::error::SearchError;
use crate::types::{Candidate, ScoreBreakdown, SearchMethod};
use knowledge_corpus::EntityReference;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Rank-fusion algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// total = Σ score × weight
    #[default]
    WeightedSum,
    /// total = Σ 1 / (k + rank)
    #[serde(rename = "reciprocal_rank_fusion", alias = "rrf")]
    ReciprocalRank,
    /// total = max score over methods
    MaxScore,
}

impl FusionMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WeightedSum => "weighted_sum",
            Self::ReciprocalRank => "reciprocal_rank_fusion",
            Self::MaxScore => "max_score",
        }
    }

    /// Only the weighted sum reads per-method weights.
    #[must_use]
    pub const fn uses_weights(self) -> bool {
        matches!(self, Self::WeightedSum)
    }

    /// Totals live on the raw score scale, so a score floor is meaningful.
    /// Reciprocal-rank totals are at most `methods / (k + 1)`.
    #[must_use]
    pub const fn is_score_scaled(self) -> bool {
        !matches!(self, Self::ReciprocalRank)
    }
}

impl fmt::Display for FusionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FusionMethod {
    type Err = SearchError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "weighted_sum" => Ok(Self::WeightedSum),
            "reciprocal_rank_fusion" | "rrf" => Ok(Self::ReciprocalRank),
            "max_score" => Ok(Self::MaxScore),
            other => Err(SearchError::UnknownFusionMethod(other.to_string())),
        }
    }
}

/// Per-method weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub vector: f32,
    pub fulltext: f32,
    pub metadata: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::new(0.5, 0.3, 0.2)
    }
}

impl FusionWeights {
    #[must_use]
    pub const fn new(vector: f32, fulltext: f32, metadata: f32) -> Self {
        Self {
            vector,
            fulltext,
            metadata,
        }
    }

    #[must_use]
    pub const fn get(&self, method: SearchMethod) -> f32 {
        match method {
            SearchMethod::Vector => self.vector,
            SearchMethod::Fulltext => self.fulltext,
            SearchMethod::Metadata => self.metadata,
        }
    }

    #[must_use]
    pub fn sum(&self) -> f32 {
        self.vector + self.fulltext + self.metadata
    }

    /// Scale to sum to 1. All-zero weights are returned unchanged.
    #[must_use]
    pub fn normalized(self) -> Self {
        let total = self.sum();
        if total <= 0.0 {
            return self;
        }
        Self::new(self.vector / total, self.fulltext / total, self.metadata / total)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        for (name, value) in [
            ("vector", self.vector),
            ("fulltext", self.fulltext),
            ("metadata", self.metadata),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SearchError::InvalidWeights(format!(
                    "{name} weight must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Per-method candidate lists, each already in that method's rank order.
pub type MethodResults = BTreeMap<SearchMethod, Vec<Candidate>>;

#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub reference: EntityReference,
    pub breakdown: ScoreBreakdown,
}

impl FusedCandidate {
    #[must_use]
    pub const fn total(&self) -> f32 {
        self.breakdown.total
    }
}

/// Merges independently scored candidate lists into one ranking.
#[derive(Debug, Clone, Copy)]
pub struct FusionEngine {
    /// RRF constant k (typically 60)
    rrf_k: f32,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RRF_K)
    }
}

impl FusionEngine {
    pub const DEFAULT_RRF_K: f32 = 60.0;

    #[must_use]
    pub const fn new(rrf_k: f32) -> Self {
        Self { rrf_k }
    }

    #[must_use]
    pub const fn rrf_k(&self) -> f32 {
        self.rrf_k
    }

    /// Fuse `results` with `method`.
    ///
    /// Returns candidates sorted by total descending, ties broken by entity
    /// reference ascending. Every candidate keeps its raw per-method scores.
    #[must_use]
    pub fn fuse(
        &self,
        method: FusionMethod,
        results: &MethodResults,
        weights: &FusionWeights,
    ) -> Vec<FusedCandidate> {
        let mut fused: BTreeMap<EntityReference, ScoreBreakdown> = BTreeMap::new();

        for (search_method, candidates) in results {
            for (position, candidate) in candidates.iter().enumerate() {
                let entry = fused.entry(candidate.reference).or_default();
                if entry.methods.contains(search_method) {
                    // Duplicate within one list: keep the better raw score,
                    // the contribution was already counted at the better rank.
                    let best = entry.score(*search_method).max(candidate.score);
                    entry.set_score(*search_method, best);
                    continue;
                }
                entry.methods.push(*search_method);
                entry.set_score(*search_method, candidate.score);

                let contribution = match method {
                    FusionMethod::WeightedSum => candidate.score * weights.get(*search_method),
                    FusionMethod::ReciprocalRank => 1.0 / (self.rrf_k + position as f32 + 1.0),
                    FusionMethod::MaxScore => candidate.score,
                };
                entry.total = match method {
                    FusionMethod::MaxScore if entry.methods.len() > 1 => entry.total.max(contribution),
                    FusionMethod::MaxScore => contribution,
                    _ => entry.total + contribution,
                };
            }
        }

        let mut ranked: Vec<FusedCandidate> = fused
            .into_iter()
            .map(|(reference, breakdown)| FusedCandidate {
                reference,
                breakdown,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.total()
                .partial_cmp(&a.total())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.reference.cmp(&b.reference))
        });

        log::debug!("Fused {} candidates with {method}", ranked.len());
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowledge_corpus::EntityKind;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn r(id: i64) -> EntityReference {
        EntityReference::new(EntityKind::Snippet, id)
    }

    fn c(id: i64, score: f32) -> Candidate {
        Candidate::new(r(id), score)
    }

    fn ids(fused: &[FusedCandidate]) -> Vec<i64> {
        fused.iter().map(|f| f.reference.id).collect()
    }

    #[test]
    fn weighted_sum_tie_resolves_by_reference() {
        let mut results = MethodResults::new();
        results.insert(SearchMethod::Vector, vec![c(7, 0.9), c(3, 0.0)]);
        results.insert(SearchMethod::Fulltext, vec![c(3, 0.9), c(7, 0.0)]);

        let fused = FusionEngine::default().fuse(
            FusionMethod::WeightedSum,
            &results,
            &FusionWeights::new(0.5, 0.5, 0.0),
        );
        assert!((fused[0].total() - 0.45).abs() < 1e-6);
        assert!((fused[1].total() - 0.45).abs() < 1e-6);
        assert_eq!(ids(&fused), vec![3, 7]);
        assert_eq!(fused[0].breakdown.fulltext, 0.9);
        assert_eq!(fused[0].breakdown.vector, 0.0);
    }

    #[test]
    fn rrf_rewards_single_method_leaders() {
        // 1 leads vector, 2 leads fulltext, 3 is last in both.
        let mut results = MethodResults::new();
        results.insert(SearchMethod::Vector, vec![c(1, 0.9), c(4, 0.8), c(3, 0.1)]);
        results.insert(SearchMethod::Fulltext, vec![c(2, 0.9), c(5, 0.8), c(3, 0.1)]);

        let fused = FusionEngine::default().fuse(
            FusionMethod::ReciprocalRank,
            &results,
            &FusionWeights::new(0.5, 0.5, 0.0),
        );
        let position = |id| fused.iter().position(|f| f.reference.id == id).unwrap();
        assert!(position(1) < position(3));
        assert!(position(2) < position(3));
        assert!((fused[position(1)].total() - 1.0 / 61.0).abs() < 1e-7);
    }

    #[test]
    fn max_score_keeps_strongest_signal() {
        let mut results = MethodResults::new();
        results.insert(SearchMethod::Vector, vec![c(1, 0.4)]);
        results.insert(SearchMethod::Fulltext, vec![c(1, 0.7), c(2, 0.5)]);
        results.insert(SearchMethod::Metadata, vec![c(2, 0.2)]);

        let fused = FusionEngine::default().fuse(
            FusionMethod::MaxScore,
            &results,
            &FusionWeights::default(),
        );
        assert_eq!(ids(&fused), vec![1, 2]);
        assert!((fused[0].total() - 0.7).abs() < 1e-6);
        assert!((fused[1].total() - 0.5).abs() < 1e-6);
        assert_eq!(
            fused[1].breakdown.methods,
            vec![SearchMethod::Fulltext, SearchMethod::Metadata]
        );
    }

    #[test]
    fn parses_fusion_method_names() {
        assert_eq!("rrf".parse::<FusionMethod>().unwrap(), FusionMethod::ReciprocalRank);
        assert_eq!(
            " Max_Score ".parse::<FusionMethod>().unwrap(),
            FusionMethod::MaxScore
        );
        assert!(matches!(
            "borda".parse::<FusionMethod>(),
            Err(SearchError::UnknownFusionMethod(name)) if name == "borda"
        ));
    }

    #[test]
    fn normalization_leaves_zero_weights_alone() {
        let zero = FusionWeights::new(0.0, 0.0, 0.0);
        assert_eq!(zero.normalized(), zero);
        assert!(FusionWeights::new(-0.1, 0.5, 0.5).validate().is_err());
    }

    fn method_lists() -> impl Strategy<Value = MethodResults> {
        let list = proptest::collection::vec((0i64..20, 0.0f32..1.0), 0..15);
        (list.clone(), list.clone(), list).prop_map(|(v, f, m)| {
            let to_candidates = |items: Vec<(i64, f32)>| -> Vec<Candidate> {
                items.into_iter().map(|(id, score)| c(id, score)).collect()
            };
            let mut results = MethodResults::new();
            results.insert(SearchMethod::Vector, to_candidates(v));
            results.insert(SearchMethod::Fulltext, to_candidates(f));
            results.insert(SearchMethod::Metadata, to_candidates(m));
            results
        })
    }

    fn fusion_method() -> impl Strategy<Value = FusionMethod> {
        prop_oneof![
            Just(FusionMethod::WeightedSum),
            Just(FusionMethod::ReciprocalRank),
            Just(FusionMethod::MaxScore),
        ]
    }

    proptest! {
        #[test]
        fn fusion_is_deterministic_and_sorted(
            results in method_lists(),
            method in fusion_method(),
            v in 0.0f32..1.0,
            f in 0.0f32..1.0,
            m in 0.0f32..1.0,
        ) {
            let engine = FusionEngine::default();
            let weights = FusionWeights::new(v, f, m);
            let first = engine.fuse(method, &results, &weights);
            let second = engine.fuse(method, &results, &weights);
            prop_assert_eq!(&first, &second);

            for pair in first.windows(2) {
                let ordered = pair[0].total() > pair[1].total()
                    || (pair[0].total() == pair[1].total() && pair[0].reference < pair[1].reference);
                prop_assert!(ordered);
            }
        }

        #[test]
        fn normalized_weights_sum_to_one(
            v in 0.0f32..10.0,
            f in 0.0f32..10.0,
            m in 0.0f32..10.0,
        ) {
            prop_assume!(v + f + m > 1e-3);
            let normalized = FusionWeights::new(v, f, m).normalized();
            prop_assert!((normalized.sum() - 1.0).abs() < 1e-5);
        }
    }
}
