use crate::entities::ExtractedEntity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_MAX_EXPANSIONS: usize = 5;

/// Per entity: up to this many synonyms and this many related terms.
const ENTITY_TERMS: usize = 2;

/// Synonym and related-term tables. Values keep their declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionTables {
    pub synonyms: BTreeMap<String, Vec<String>>,
    pub related_terms: BTreeMap<String, Vec<String>>,
}

fn table(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(key, values)| {
            (
                (*key).to_string(),
                values.iter().map(|value| (*value).to_string()).collect(),
            )
        })
        .collect()
}

impl Default for ExpansionTables {
    fn default() -> Self {
        Self {
            synonyms: table(&[
                ("engineer", &["developer", "programmer", "coder"]),
                ("developer", &["engineer", "programmer"]),
                ("scientist", &["researcher", "analyst"]),
                ("expert", &["specialist", "professional", "guru"]),
                ("machine learning", &["ml", "deep learning", "ai"]),
                ("artificial intelligence", &["ai", "machine learning", "ml"]),
                ("web development", &["web dev", "frontend", "backend", "full stack"]),
                ("data science", &["data analysis", "analytics", "data engineering"]),
                ("python", &["py", "python3"]),
                ("javascript", &["js", "node", "typescript"]),
                ("database", &["db", "sql", "nosql", "data store"]),
                ("cloud", &["aws", "azure", "gcp", "cloud computing"]),
            ]),
            related_terms: table(&[
                ("react", &["javascript", "frontend", "ui", "component"]),
                ("docker", &["container", "kubernetes", "devops", "deployment"]),
                ("tensorflow", &["machine learning", "deep learning", "neural network", "ai"]),
                ("aws", &["cloud", "amazon", "ec2", "s3", "lambda"]),
                ("nlp", &["natural language", "text processing", "language model"]),
                ("api", &["rest", "graphql", "endpoint", "web service"]),
            ]),
        }
    }
}

pub struct QueryExpander {
    tables: ExpansionTables,
    max_expansions: usize,
}

impl QueryExpander {
    #[must_use]
    pub const fn new(tables: ExpansionTables, max_expansions: usize) -> Self {
        Self {
            tables,
            max_expansions,
        }
    }

    #[must_use]
    pub fn synonym_groups(&self) -> usize {
        self.tables.synonyms.len()
    }

    /// Extra search terms for `query`.
    ///
    /// Entities contribute their first two synonyms and related terms, each
    /// raw word its first synonym and first related term. Terms already
    /// contained in the query are dropped.
    #[must_use]
    pub fn expand(&self, query: &str, entities: &[ExtractedEntity]) -> Vec<String> {
        let lowered = query.to_lowercase();
        let mut candidates: Vec<&str> = Vec::new();

        for entity in entities {
            let key = entity.normalized.as_str();
            for source in [&self.tables.synonyms, &self.tables.related_terms] {
                if let Some(terms) = source.get(key) {
                    candidates.extend(terms.iter().take(ENTITY_TERMS).map(String::as_str));
                }
            }
        }
        for word in lowered.unicode_words() {
            for source in [&self.tables.synonyms, &self.tables.related_terms] {
                if let Some(first) = source.get(word).and_then(|terms| terms.first()) {
                    candidates.push(first);
                }
            }
        }

        let mut expansions: Vec<String> = Vec::new();
        for term in candidates {
            if expansions.len() >= self.max_expansions {
                break;
            }
            let term = term.to_lowercase();
            if lowered.contains(&term) || expansions.contains(&term) {
                continue;
            }
            expansions.push(term);
        }
        expansions
    }
}
