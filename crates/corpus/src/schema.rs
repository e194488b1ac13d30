//! Typed attribute schema per entity kind.
//!
//! Metadata predicates and facets resolve attribute names against this table
//! instead of poking at untyped maps.

use crate::entity::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Bool,
    Number,
    Text,
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::Number => "number",
            Self::Text => "text",
        })
    }
}

/// Attribute value carried by a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    #[must_use]
    pub const fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Bool(_) => AttributeType::Bool,
            Self::Number(_) => AttributeType::Number,
            Self::Text(_) => AttributeType::Text,
        }
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Parse a raw string into a value of the given type.
    pub fn parse_as(ty: AttributeType, raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        match ty {
            AttributeType::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Self::Bool(true)),
                "false" | "no" | "0" => Ok(Self::Bool(false)),
                other => Err(format!("expected a boolean, got '{other}'")),
            },
            AttributeType::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(Self::Number)
                .ok_or_else(|| format!("expected a number, got '{raw}'")),
            AttributeType::Text => Ok(Self::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: &'static str,
    pub ty: AttributeType,
}

const fn def(name: &'static str, ty: AttributeType) -> AttributeDef {
    AttributeDef { name, ty }
}

const PROFILE: &[AttributeDef] = &[
    def("is_verified", AttributeType::Bool),
    def("source_domain", AttributeType::Text),
    def("confidence", AttributeType::Number),
];

const SNIPPET: &[AttributeDef] = &[
    def("category", AttributeType::Text),
    def("content_type", AttributeType::Text),
    def("is_validated", AttributeType::Bool),
    def("confidence", AttributeType::Number),
];

const DOCUMENT: &[AttributeDef] = &[
    def("content_type", AttributeType::Text),
    def("author", AttributeType::Text),
];

pub struct AttributeSchema;

impl AttributeSchema {
    #[must_use]
    pub const fn for_kind(kind: EntityKind) -> &'static [AttributeDef] {
        match kind {
            EntityKind::Profile => PROFILE,
            EntityKind::Snippet => SNIPPET,
            EntityKind::Document => DOCUMENT,
        }
    }

    #[must_use]
    pub fn lookup(kind: EntityKind, name: &str) -> Option<AttributeType> {
        Self::for_kind(kind)
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.ty)
    }

    /// Type of `name` in any kind that declares it.
    #[must_use]
    pub fn resolve(name: &str) -> Option<AttributeType> {
        EntityKind::ALL
            .iter()
            .find_map(|kind| Self::lookup(*kind, name))
    }

    /// Facet fields used when a caller asks for facets without naming any.
    #[must_use]
    pub const fn default_facets(kind: EntityKind) -> &'static [&'static str] {
        match kind {
            EntityKind::Profile => &["source_domain", "is_verified"],
            EntityKind::Snippet => &["category", "content_type"],
            EntityKind::Document => &["content_type", "author"],
        }
    }
}
