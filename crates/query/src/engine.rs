use crate::config::UnderstandingConfig;
use crate::entities::{EntityExtractor, ExtractedEntity};
use crate::error::{QueryError, Result};
use crate::expansion::QueryExpander;
use crate::intent::{IntentClassifier, QueryIntent};
use crate::session::{SessionContext, SessionStore};
use crate::strategy::{SearchStrategy, StrategyOptimizer};
use knowledge_search::SearchError;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryUnderstanding {
    pub original_query: String,
    pub normalized_query: String,
    pub intent: QueryIntent,
    pub confidence: f32,
    pub entities: Vec<ExtractedEntity>,
    pub expanded_terms: Vec<String>,
    pub strategy: SearchStrategy,
    /// Session snapshot after this turn, when a session id was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<SessionContext>,
    pub processing_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnderstandingStatistics {
    pub active_sessions: usize,
    pub total_queries_in_context: usize,
    pub intent_patterns: usize,
    pub known_technologies: usize,
    pub known_roles: usize,
    pub known_skills: usize,
    pub known_domains: usize,
    pub known_companies: usize,
    pub synonym_groups: usize,
}

/// Intent, entities, expansions and a search strategy for one query, plus
/// per-session history.
pub struct QueryUnderstandingEngine {
    config: UnderstandingConfig,
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    expander: QueryExpander,
    optimizer: StrategyOptimizer,
    sessions: SessionStore,
}

impl QueryUnderstandingEngine {
    pub fn new(config: UnderstandingConfig) -> Result<Self> {
        config.validate().map_err(QueryError::InvalidConfig)?;
        let engine = Self {
            classifier: IntentClassifier::new(&config.intents)?,
            extractor: EntityExtractor::new(&config.vocabularies),
            expander: QueryExpander::new(config.expansion.clone(), config.max_expansions),
            optimizer: StrategyOptimizer::new(config.keywords.clone()),
            sessions: SessionStore::new(config.session),
            config,
        };
        log::info!(
            "Query understanding ready: {} intents, {} keywords",
            engine.classifier.intent_count(),
            engine.extractor.keyword_count()
        );
        Ok(engine)
    }

    #[must_use]
    pub const fn config(&self) -> &UnderstandingConfig {
        &self.config
    }

    pub fn understand(
        &self,
        query: &str,
        session_id: Option<&str>,
        preserve_context: bool,
    ) -> Result<QueryUnderstanding> {
        let started = Instant::now();
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Err(SearchError::EmptyQuery.into());
        }

        let (intent, confidence) = self.classifier.classify(&normalized);
        log::debug!("Intent: {intent} (confidence: {confidence:.2})");
        let entities = self.extractor.extract(&normalized);
        let expanded_terms = self.expander.expand(&normalized, &entities);
        let mut strategy = self.optimizer.optimize(&normalized, intent, &entities);
        strategy.expansion_terms = expanded_terms.clone();

        let context = session_id.and_then(|id| {
            if preserve_context {
                Some(self.sessions.record(id, query, intent, &entities))
            } else {
                self.sessions.get(id)
            }
        });

        let processing_ms = started.elapsed().as_secs_f64() * 1000.0;
        log::info!(
            "Understood '{query}' as {intent} with {} entities in {processing_ms:.2}ms",
            entities.len()
        );
        Ok(QueryUnderstanding {
            original_query: query.to_string(),
            normalized_query: normalized,
            intent,
            confidence,
            entities,
            expanded_terms,
            strategy,
            context,
            processing_ms,
        })
    }

    #[must_use]
    pub fn session_context(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.get(session_id)
    }

    /// Returns whether the session existed.
    pub fn clear_session_context(&self, session_id: &str) -> bool {
        self.sessions.clear(session_id)
    }

    #[must_use]
    pub fn statistics(&self) -> UnderstandingStatistics {
        let vocabularies = &self.config.vocabularies;
        UnderstandingStatistics {
            active_sessions: self.sessions.len(),
            total_queries_in_context: self.sessions.total_queries(),
            intent_patterns: self.classifier.intent_count(),
            known_technologies: vocabularies.technologies.len(),
            known_roles: vocabularies.roles.len(),
            known_skills: vocabularies.skills.len(),
            known_domains: vocabularies.domains.len(),
            known_companies: vocabularies.companies.len(),
            synonym_groups: self.expander.synonym_groups(),
        }
    }
}

/// Collapse whitespace and blank out characters other than word
/// characters, whitespace and `- . @ + # " ? '`.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    let kept: String = query
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() || "-.@+#\"?'".contains(c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}
