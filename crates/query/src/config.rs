use crate::entities::Vocabularies;
use crate::error::{QueryError, Result};
use crate::expansion::{ExpansionTables, DEFAULT_MAX_EXPANSIONS};
use crate::intent::{default_rules, IntentRule};
use crate::session::SessionLimits;
use crate::strategy::KeywordRules;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tables and limits of the query understanding engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnderstandingConfig {
    /// Intent rules in precedence order.
    pub intents: Vec<IntentRule>,
    pub vocabularies: Vocabularies,
    pub expansion: ExpansionTables,
    pub keywords: KeywordRules,
    pub max_expansions: usize,
    pub session: SessionLimits,
}

impl Default for UnderstandingConfig {
    fn default() -> Self {
        Self {
            intents: default_rules(),
            vocabularies: Vocabularies::default(),
            expansion: ExpansionTables::default(),
            keywords: KeywordRules::default(),
            max_expansions: DEFAULT_MAX_EXPANSIONS,
            session: SessionLimits::default(),
        }
    }
}

impl UnderstandingConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        for rule in &self.intents {
            if rule.patterns.is_empty() {
                return Err(format!("intent {} has no patterns", rule.intent));
            }
        }
        for (i, rule) in self.intents.iter().enumerate() {
            if self.intents[..i].iter().any(|earlier| earlier.intent == rule.intent) {
                return Err(format!("intent {} is listed twice", rule.intent));
            }
        }
        self.vocabularies.validate()?;
        self.session.validate()?;
        Ok(())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| QueryError::InvalidConfig(format!("invalid TOML: {err}")))?;
        config.validate().map_err(QueryError::InvalidConfig)?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
            QueryError::InvalidConfig(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }
}
