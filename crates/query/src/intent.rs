use crate::error::{QueryError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// Nothing more specific matched.
    Search,
    FindPerson,
    FindKnowledge,
    Compare,
    List,
    Filter,
    Recommend,
    Explain,
    Question,
}

impl QueryIntent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::FindPerson => "find_person",
            Self::FindKnowledge => "find_knowledge",
            Self::Compare => "compare",
            Self::List => "list",
            Self::Filter => "filter",
            Self::Recommend => "recommend",
            Self::Explain => "explain",
            Self::Question => "question",
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patterns that vote for one intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRule {
    pub intent: QueryIntent,
    pub patterns: Vec<String>,
}

impl IntentRule {
    fn new(intent: QueryIntent, patterns: &[&str]) -> Self {
        Self {
            intent,
            patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

/// Built-in rules in precedence order. On a confidence tie the earlier
/// rule wins, so structural intents (compare, list) beat topical ones.
#[must_use]
pub fn default_rules() -> Vec<IntentRule> {
    vec![
        IntentRule::new(
            QueryIntent::Compare,
            &[
                r"\b(compare|versus|vs|difference between)\b",
                r"\b(better|best|which)\b.*\b(or|vs|versus)\b",
                r"\badvantages? of\b",
                r"\b(pros and cons|trade-?offs)\b",
            ],
        ),
        IntentRule::new(
            QueryIntent::List,
            &[
                r"^(list|show|display|get) all\b",
                r"\ball\b.*\b(with|having|who)\b",
                r"\bevery\b.*\b(that|who|with)\b",
            ],
        ),
        IntentRule::new(
            QueryIntent::FindPerson,
            &[
                r"\b(who is|find|show|search for)\b.*\b(person|people|expert|engineer|developer|scientist)\b",
                r"\b(looking for|need|want)\b.*\b(someone|anyone|developer|engineer|expert)\b",
                r"\bprofile.*\b(with|having|who has)\b",
                r"\b(list|show|find) all\b.*\b(people|persons|developers|engineers|experts)\b",
            ],
        ),
        IntentRule::new(
            QueryIntent::FindKnowledge,
            &[
                r"\b(how to|how do|how can)\b",
                r"\b(what is|what are|explain|describe)\b",
                r"\b(tutorial|guide|learn|documentation|docs)\b",
                r"\b(example|sample|demo)\b.*\b(of|for)\b",
                r"\b(introduction to|basics of|getting started with)\b",
            ],
        ),
        IntentRule::new(
            QueryIntent::Filter,
            &[
                r"\b(filter|refine|narrow)\b",
                r"\b(only|just|exclusively)\b.*\b(with|having|from)\b",
                r"\bverified\b",
                r"\b(senior|junior|lead|principal)\b",
            ],
        ),
        IntentRule::new(
            QueryIntent::Recommend,
            &[
                r"\b(recommend|suggest|advice)\b",
                r"\bwhat should\b",
                r"\bbest\b.*\b(for|to)\b",
                r"\bsuitable for\b",
            ],
        ),
        IntentRule::new(
            QueryIntent::Explain,
            &[
                r"\b(why|explain|describe|tell me about)\b",
                r"\b(understand|clarify)\b",
                r"\bwhat does\b.*\bmean\b",
                r"\b(definition of|meaning of)\b",
            ],
        ),
        IntentRule::new(
            QueryIntent::Question,
            &[
                r"^(is|are|do|does|can|could|would|should|will)\b",
                r"\?\s*$",
            ],
        ),
    ]
}

pub const FALLBACK_CONFIDENCE: f32 = 0.4;
const BASE_CONFIDENCE: f32 = 0.6;
const PER_MATCH_CONFIDENCE: f32 = 0.15;
const MAX_CONFIDENCE: f32 = 0.95;

/// Regex vote counter over a fixed rule table.
pub struct IntentClassifier {
    rules: Vec<(QueryIntent, Vec<Regex>)>,
}

impl IntentClassifier {
    pub fn new(rules: &[IntentRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let compiled = rule
                    .patterns
                    .iter()
                    .map(|pattern| {
                        RegexBuilder::new(pattern)
                            .case_insensitive(true)
                            .build()
                            .map_err(|source| QueryError::InvalidPattern {
                                intent: rule.intent,
                                source,
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((rule.intent, compiled))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Number of intents with at least one pattern.
    #[must_use]
    pub fn intent_count(&self) -> usize {
        self.rules.iter().filter(|(_, patterns)| !patterns.is_empty()).count()
    }

    /// `(intent, confidence)`; confidence grows with the number of matching
    /// patterns. No match at all yields `(Search, 0.4)`.
    #[must_use]
    pub fn classify(&self, query: &str) -> (QueryIntent, f32) {
        let query = query.trim().to_lowercase();
        let mut best: Option<(QueryIntent, f32)> = None;

        for (intent, patterns) in &self.rules {
            let matches = patterns.iter().filter(|pattern| pattern.is_match(&query)).count();
            if matches == 0 {
                continue;
            }
            let confidence = (BASE_CONFIDENCE + PER_MATCH_CONFIDENCE * matches as f32).min(MAX_CONFIDENCE);
            if best.map_or(true, |(_, current)| confidence > current) {
                best = Some((*intent, confidence));
            }
        }

        best.unwrap_or((QueryIntent::Search, FALLBACK_CONFIDENCE))
    }
}
