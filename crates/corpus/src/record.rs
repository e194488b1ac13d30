use crate::entity::{EntityKind, EntityReference};
use crate::schema::{AttributeSchema, AttributeValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const PROFILE_BIO_EMBED_CHARS: usize = 500;
const BODY_EMBED_CHARS: usize = 1000;
const PROFILE_BIO_SUMMARY_CHARS: usize = 200;
const BODY_SUMMARY_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub source_domain: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_validated: bool,
    #[serde(default)]
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A record of any entity kind.
///
/// Engines only rely on the shared capability below (reference, searchable
/// text, attributes, embedding text, enrichment summary), never on the
/// concrete variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Profile(Profile),
    Snippet(Snippet),
    Document(Document),
}

impl Record {
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Profile(_) => EntityKind::Profile,
            Self::Snippet(_) => EntityKind::Snippet,
            Self::Document(_) => EntityKind::Document,
        }
    }

    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Profile(p) => p.id,
            Self::Snippet(s) => s.id,
            Self::Document(d) => d.id,
        }
    }

    #[must_use]
    pub const fn reference(&self) -> EntityReference {
        EntityReference::new(self.kind(), self.id())
    }

    /// Text fields the lexical engine scans, as `(field name, text)`.
    /// Absent optional fields are omitted.
    #[must_use]
    pub fn searchable_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Profile(p) => {
                let mut fields = vec![("name", p.name.as_str())];
                if let Some(title) = p.title.as_deref() {
                    fields.push(("title", title));
                }
                if let Some(bio) = p.bio.as_deref() {
                    fields.push(("bio", bio));
                }
                fields
            }
            Self::Snippet(s) => vec![("title", s.title.as_str()), ("content", s.content.as_str())],
            Self::Document(d) => vec![("title", d.title.as_str()), ("body", d.body.as_str())],
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        let text = |value: &Option<String>| value.clone().map(AttributeValue::Text);
        match (self, name) {
            (Self::Profile(p), "is_verified") => Some(AttributeValue::Bool(p.is_verified)),
            (Self::Profile(p), "source_domain") => text(&p.source_domain),
            (Self::Profile(p), "confidence") => Some(AttributeValue::Number(p.confidence_score)),
            (Self::Snippet(s), "category") => text(&s.category),
            (Self::Snippet(s), "content_type") => text(&s.content_type),
            (Self::Snippet(s), "is_validated") => Some(AttributeValue::Bool(s.is_validated)),
            (Self::Snippet(s), "confidence") => Some(AttributeValue::Number(s.confidence_score)),
            (Self::Document(d), "content_type") => text(&d.content_type),
            (Self::Document(d), "author") => text(&d.author_name),
            _ => None,
        }
    }

    /// All schema attributes that carry a value.
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<&'static str, AttributeValue> {
        AttributeSchema::for_kind(self.kind())
            .iter()
            .filter_map(|attr| self.attribute(attr.name).map(|value| (attr.name, value)))
            .collect()
    }

    /// Bounded text handed to the embedding provider.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        let parts: Vec<&str> = match self {
            Self::Profile(p) => vec![
                Some(p.name.as_str()),
                p.title.as_deref(),
                p.bio
                    .as_deref()
                    .map(|bio| truncate_chars(bio, PROFILE_BIO_EMBED_CHARS)),
            ]
            .into_iter()
            .flatten()
            .collect(),
            Self::Snippet(s) => vec![
                s.title.as_str(),
                truncate_chars(&s.content, BODY_EMBED_CHARS),
            ],
            Self::Document(d) => vec![
                Some(d.title.as_str()),
                Some(truncate_chars(&d.body, BODY_EMBED_CHARS)),
                d.summary.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect(),
        };
        parts
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Compact JSON payload attached to search hits at enrichment time.
    #[must_use]
    pub fn summary(&self) -> Value {
        match self {
            Self::Profile(p) => json!({
                "id": p.id,
                "name": p.name,
                "title": p.title,
                "bio": p.bio.as_deref().map(|bio| truncate_chars(bio, PROFILE_BIO_SUMMARY_CHARS)),
                "is_verified": p.is_verified,
                "source_domain": p.source_domain,
            }),
            Self::Snippet(s) => json!({
                "id": s.id,
                "title": s.title,
                "content": truncate_chars(&s.content, BODY_SUMMARY_CHARS),
                "category": s.category,
                "content_type": s.content_type,
            }),
            Self::Document(d) => json!({
                "id": d.id,
                "title": d.title,
                "body": truncate_chars(&d.body, BODY_SUMMARY_CHARS),
                "author": d.author_name,
                "url": d.url,
            }),
        }
    }
}

/// Prefix of `text` holding at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}
