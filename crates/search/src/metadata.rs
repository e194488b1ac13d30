use crate::error::{Result, SearchError};
use crate::types::{Candidate, Facets};
use knowledge_corpus::{
    AttributeSchema, AttributeType, AttributeValue, CorpusError, EntityKind, EntityReference,
    Record, Repository,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PredicateOp {
    Equals { value: AttributeValue },
    AtLeast { value: f64 },
    InSet { values: Vec<AttributeValue> },
}

/// A typed metadata condition resolved against [`AttributeSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub attribute: String,
    #[serde(flatten)]
    pub op: PredicateOp,
}

impl Predicate {
    #[must_use]
    pub fn equals(attribute: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            attribute: attribute.into(),
            op: PredicateOp::Equals { value },
        }
    }

    #[must_use]
    pub fn at_least(attribute: impl Into<String>, value: f64) -> Self {
        Self {
            attribute: attribute.into(),
            op: PredicateOp::AtLeast { value },
        }
    }

    #[must_use]
    pub fn in_set(attribute: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            attribute: attribute.into(),
            op: PredicateOp::InSet { values },
        }
    }

    /// Check the attribute exists in some kind and the operands fit its type.
    pub fn validate(&self) -> Result<()> {
        let ty = AttributeSchema::resolve(&self.attribute).ok_or_else(|| {
            SearchError::InvalidFilter(format!("unknown attribute '{}'", self.attribute))
        })?;
        let mismatch = |found: AttributeType| {
            SearchError::InvalidFilter(format!(
                "attribute '{}' is {ty}, got a {found} value",
                self.attribute
            ))
        };
        match &self.op {
            PredicateOp::Equals { value } if value.attribute_type() != ty => {
                Err(mismatch(value.attribute_type()))
            }
            PredicateOp::AtLeast { value } if ty != AttributeType::Number || !value.is_finite() => {
                Err(SearchError::InvalidFilter(format!(
                    "'>=' needs a numeric attribute and a finite bound, got '{}' ({ty})",
                    self.attribute
                )))
            }
            PredicateOp::InSet { values } if values.is_empty() => Err(SearchError::InvalidFilter(
                format!("'in' filter on '{}' needs at least one value", self.attribute),
            )),
            PredicateOp::InSet { values } => values
                .iter()
                .find(|value| value.attribute_type() != ty)
                .map_or(Ok(()), |value| Err(mismatch(value.attribute_type()))),
            _ => Ok(()),
        }
    }

    /// Whether `record` satisfies this predicate. Attributes outside the
    /// record's kind schema never match.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let Some(actual) = record.attribute(&self.attribute) else {
            return false;
        };
        match &self.op {
            PredicateOp::Equals { value } => actual == *value,
            PredicateOp::AtLeast { value } => actual.as_number().is_some_and(|n| n >= *value),
            PredicateOp::InSet { values } => values.contains(&actual),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            PredicateOp::Equals { value } => write!(f, "{}={value}", self.attribute),
            PredicateOp::AtLeast { value } => write!(f, "{}>={value}", self.attribute),
            PredicateOp::InSet { values } => {
                let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{} in {}", self.attribute, joined.join("|"))
            }
        }
    }
}

impl FromStr for Predicate {
    type Err = SearchError;

    /// Parses `attr>=number`, `attr in a|b|c` and `attr=value`.
    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let resolve = |name: &str| {
            AttributeSchema::resolve(name)
                .ok_or_else(|| SearchError::InvalidFilter(format!("unknown attribute '{name}'")))
        };
        let parse_value = |ty, value: &str| {
            AttributeValue::parse_as(ty, value)
                .map_err(|err| SearchError::InvalidFilter(format!("{raw}: {err}")))
        };

        let predicate = if let Some((name, bound)) = raw.split_once(">=") {
            let name = name.trim();
            let bound = parse_value(AttributeType::Number, bound)?
                .as_number()
                .unwrap_or_default();
            resolve(name)?;
            Self::at_least(name, bound)
        } else if let Some((name, values)) = raw.split_once(" in ") {
            let name = name.trim();
            let ty = resolve(name)?;
            let values = values
                .split('|')
                .filter(|value| !value.trim().is_empty())
                .map(|value| parse_value(ty, value))
                .collect::<Result<Vec<_>>>()?;
            Self::in_set(name, values)
        } else if let Some((name, value)) = raw.split_once('=') {
            let name = name.trim();
            let ty = resolve(name)?;
            Self::equals(name, parse_value(ty, value)?)
        } else {
            return Err(SearchError::InvalidFilter(format!(
                "cannot parse filter '{raw}' (expected attr=value, attr>=number or attr in a|b)"
            )));
        };
        predicate.validate()?;
        Ok(predicate)
    }
}

/// Validate requested facet fields against the schema.
pub fn validate_facet_fields(fields: &[String]) -> Result<()> {
    match fields
        .iter()
        .find(|field| AttributeSchema::resolve(field).is_none())
    {
        Some(field) => Err(SearchError::InvalidFilter(format!(
            "unknown facet field '{field}'"
        ))),
        None => Ok(()),
    }
}

/// Tally attribute values over `records`. Records without a value for a
/// field are not counted for it.
#[must_use]
pub fn get_facets<'a>(records: impl IntoIterator<Item = &'a Record>, fields: &[String]) -> Facets {
    let mut facets: Facets = fields
        .iter()
        .map(|field| (field.clone(), Default::default()))
        .collect();
    for record in records {
        for field in fields {
            if let Some(value) = record.attribute(field) {
                if let Some(counts) = facets.get_mut(field) {
                    *counts.entry(value.to_string()).or_insert(0) += 1;
                }
            }
        }
    }
    facets
}

/// Default facet fields for the kinds present in `kinds`, first-seen order.
#[must_use]
pub fn default_facet_fields(kinds: &[EntityKind]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for kind in kinds {
        for field in AttributeSchema::default_facets(*kind) {
            if !fields.iter().any(|existing| existing == field) {
                fields.push((*field).to_string());
            }
        }
    }
    fields
}

/// Scores candidates by the fraction of predicates they satisfy.
pub struct MetadataEngine {
    repository: Arc<dyn Repository>,
    storage_timeout: Duration,
}

impl MetadataEngine {
    #[must_use]
    pub fn new(repository: Arc<dyn Repository>, storage_timeout: Duration) -> Self {
        Self {
            repository,
            storage_timeout,
        }
    }

    /// `satisfied / total` per candidate, in input order. A candidate that
    /// satisfies nothing still comes back with score 0; with no predicates
    /// every candidate scores 1. Candidates that cannot be loaded are skipped.
    pub async fn filter_and_score(
        &self,
        candidates: &[EntityReference],
        filters: &[Predicate],
    ) -> Vec<Candidate> {
        let mut scored = Vec::with_capacity(candidates.len());
        for reference in candidates {
            match self.load(*reference).await {
                Ok(record) => scored.push(Candidate::new(*reference, score_record(&record, filters))),
                Err(err) if err.is_not_found() => {
                    log::debug!("Metadata: {reference} vanished from storage, skipping");
                }
                Err(err) => log::warn!("Metadata: could not load {reference}: {err}"),
            }
        }
        scored
    }

    /// Score every record of `kinds`, for calls where no other method
    /// produced candidates.
    pub async fn scan(&self, kinds: &[EntityKind], filters: &[Predicate]) -> Result<Vec<Candidate>> {
        let mut scored = Vec::new();
        for kind in kinds {
            let records = tokio::time::timeout(self.storage_timeout, self.repository.get_all(*kind))
                .await
                .map_err(|_| {
                    SearchError::CorpusError(CorpusError::Storage(format!(
                        "listing {kind} records timed out"
                    )))
                })??;
            scored.extend(
                records
                    .iter()
                    .map(|record| Candidate::new(record.reference(), score_record(record, filters))),
            );
        }
        Ok(scored)
    }

    async fn load(&self, reference: EntityReference) -> std::result::Result<Record, CorpusError> {
        tokio::time::timeout(self.storage_timeout, self.repository.get_by_id(reference))
            .await
            .map_err(|_| CorpusError::Storage(format!("loading {reference} timed out")))?
    }
}

fn score_record(record: &Record, filters: &[Predicate]) -> f32 {
    if filters.is_empty() {
        return 1.0;
    }
    let satisfied = filters.iter().filter(|filter| filter.matches(record)).count();
    satisfied as f32 / filters.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowledge_corpus::{MemoryRepository, Profile, Snippet};
    use pretty_assertions::assert_eq;

    fn profile(id: i64, verified: bool, confidence: f64, domain: &str) -> Record {
        Record::Profile(Profile {
            id,
            name: format!("person {id}"),
            title: None,
            bio: None,
            email: None,
            source_url: None,
            source_domain: Some(domain.to_string()),
            is_verified: verified,
            confidence_score: confidence,
        })
    }

    fn snippet(id: i64, category: &str) -> Record {
        Record::Snippet(Snippet {
            id,
            title: "t".to_string(),
            content: "c".to_string(),
            content_type: Some("guide".to_string()),
            category: Some(category.to_string()),
            is_validated: false,
            confidence_score: 0.9,
        })
    }

    #[test]
    fn parses_all_predicate_forms() {
        assert_eq!(
            "is_verified=true".parse::<Predicate>().unwrap(),
            Predicate::equals("is_verified", AttributeValue::Bool(true))
        );
        assert_eq!(
            "confidence >= 0.8".parse::<Predicate>().unwrap(),
            Predicate::at_least("confidence", 0.8)
        );
        assert_eq!(
            "category in rust|go".parse::<Predicate>().unwrap(),
            Predicate::in_set(
                "category",
                vec![
                    AttributeValue::Text("rust".to_string()),
                    AttributeValue::Text("go".to_string())
                ]
            )
        );
    }

    #[test]
    fn rejects_malformed_predicates() {
        for raw in [
            "colour=red",
            "is_verified=maybe",
            "source_domain>=3",
            "confidence>=high",
            "category in ",
            "nonsense",
        ] {
            assert!(
                matches!(raw.parse::<Predicate>(), Err(SearchError::InvalidFilter(_))),
                "{raw} should be rejected"
            );
        }
        let wrong_type = Predicate::equals("confidence", AttributeValue::Text("x".to_string()));
        assert!(wrong_type.validate().is_err());
    }

    #[test]
    fn predicate_serializes_flat() {
        let json = serde_json::to_value(Predicate::at_least("confidence", 0.7)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"attribute": "confidence", "op": "at_least", "value": 0.7})
        );
    }

    #[tokio::test]
    async fn scores_fraction_of_satisfied_filters() {
        let repo = Arc::new(MemoryRepository::from_records(vec![
            profile(1, true, 0.9, "a.org"),
            profile(2, false, 0.9, "a.org"),
            profile(3, false, 0.1, "b.org"),
            snippet(4, "rust"),
        ]));
        let engine = MetadataEngine::new(repo, Duration::from_secs(1));
        let filters = vec![
            Predicate::equals("is_verified", AttributeValue::Bool(true)),
            Predicate::at_least("confidence", 0.8),
        ];
        let refs: Vec<EntityReference> = [1, 2, 3]
            .iter()
            .map(|id| EntityReference::new(EntityKind::Profile, *id))
            .chain([
                EntityReference::new(EntityKind::Snippet, 4),
                EntityReference::new(EntityKind::Profile, 99),
            ])
            .collect();

        let scored = engine.filter_and_score(&refs, &filters).await;
        let scores: Vec<(i64, f32)> = scored.iter().map(|c| (c.reference.id, c.score)).collect();
        // Snippet 4 has no is_verified attribute, so only the confidence filter matches.
        assert_eq!(scores, vec![(1, 1.0), (2, 0.5), (3, 0.0), (4, 0.5)]);

        let neutral = engine.filter_and_score(&refs[..2], &[]).await;
        assert!(neutral.iter().all(|c| c.score == 1.0));
    }

    #[test]
    fn facets_count_only_the_window() {
        let records = vec![
            profile(1, true, 0.9, "a.org"),
            profile(2, false, 0.9, "a.org"),
            snippet(3, "rust"),
        ];
        let fields = vec!["source_domain".to_string(), "is_verified".to_string(), "category".to_string()];
        let facets = get_facets(&records[..2], &fields);
        assert_eq!(facets["source_domain"]["a.org"], 2);
        assert_eq!(facets["is_verified"]["true"], 1);
        assert_eq!(facets["is_verified"]["false"], 1);
        assert!(facets["category"].is_empty());
    }

    #[test]
    fn default_facets_merge_kinds() {
        assert_eq!(
            default_facet_fields(&[EntityKind::Snippet, EntityKind::Document]),
            vec!["category", "content_type", "author"]
        );
        assert!(validate_facet_fields(&["colour".to_string()]).is_err());
    }
}
