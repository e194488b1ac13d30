use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of record an [`EntityReference`] points at.
///
/// Variants are declared alphabetically so the derived ordering matches the
/// lexical ordering of their names, which the ranking tie-break relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Document,
    Profile,
    Snippet,
}

impl EntityKind {
    pub const ALL: [Self; 3] = [Self::Document, Self::Profile, Self::Snippet];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Profile => "profile",
            Self::Snippet => "snippet",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "document" | "content" => Ok(Self::Document),
            "profile" => Ok(Self::Profile),
            "snippet" => Ok(Self::Snippet),
            other => Err(format!(
                "unknown entity kind '{other}' (expected document, profile or snippet)"
            )),
        }
    }
}

/// Opaque `(kind, id)` pointer into external storage.
///
/// Ordered by kind, then id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityReference {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityReference {
    #[must_use]
    pub const fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for EntityReference {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (kind, id) = raw
            .split_once(':')
            .ok_or_else(|| format!("invalid entity reference '{raw}' (expected kind:id)"))?;
        let kind = kind.parse::<EntityKind>()?;
        let id = id
            .trim()
            .parse::<i64>()
            .map_err(|err| format!("invalid entity id in '{raw}': {err}"))?;
        Ok(Self { kind, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_kind_then_id() {
        let mut refs = vec![
            EntityReference::new(EntityKind::Snippet, 1),
            EntityReference::new(EntityKind::Document, 9),
            EntityReference::new(EntityKind::Profile, 2),
            EntityReference::new(EntityKind::Document, 3),
        ];
        refs.sort();
        let rendered: Vec<String> = refs.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["document:3", "document:9", "profile:2", "snippet:1"]
        );
    }

    #[test]
    fn parses_reference_and_kind_aliases() {
        assert_eq!(
            "profile:42".parse::<EntityReference>().unwrap(),
            EntityReference::new(EntityKind::Profile, 42)
        );
        assert_eq!("Content".parse::<EntityKind>().unwrap(), EntityKind::Document);
        assert!("user:1".parse::<EntityReference>().is_err());
        assert!("profile:x".parse::<EntityReference>().is_err());
    }
}
