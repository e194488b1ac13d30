use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Person,
    Skill,
    Technology,
    Role,
    Company,
    Domain,
}

impl EntityCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Skill => "skill",
            Self::Technology => "technology",
            Self::Role => "role",
            Self::Company => "company",
            Self::Domain => "domain",
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized span of the normalized query. `start`/`end` are byte
/// offsets into that string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub text: String,
    pub category: EntityCategory,
    pub confidence: f32,
    pub start: usize,
    pub end: usize,
    pub normalized: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabularies {
    pub technologies: Vec<String>,
    pub roles: Vec<String>,
    pub skills: Vec<String>,
    pub domains: Vec<String>,
    pub companies: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|word| (*word).to_string()).collect()
}

impl Default for Vocabularies {
    fn default() -> Self {
        Self {
            technologies: words(&[
                "python", "java", "javascript", "typescript", "c++", "c#", "ruby", "go", "rust",
                "react", "angular", "vue", "node.js", "django", "flask", "spring", "express",
                "tensorflow", "pytorch", "keras", "scikit-learn", "pandas", "numpy", "docker",
                "kubernetes", "aws", "azure", "gcp", "jenkins", "git", "terraform", "sql", "nosql",
                "mongodb", "postgresql", "mysql", "redis", "elasticsearch", "html", "css", "sass",
                "webpack", "babel", "graphql", "rest", "api",
            ]),
            roles: words(&[
                "engineer", "developer", "programmer", "scientist", "analyst", "architect",
                "manager", "director", "lead", "senior", "junior", "principal", "staff",
                "software engineer", "data scientist", "ml engineer", "data engineer",
                "devops engineer", "full stack", "frontend", "backend", "ai researcher",
                "research scientist", "cloud architect", "security engineer",
            ]),
            skills: words(&[
                "machine learning", "deep learning", "nlp", "computer vision", "data analysis",
                "web development", "mobile development", "cloud computing", "devops", "cicd",
                "data engineering", "mlops", "software engineering", "system design", "algorithms",
                "data structures", "databases", "distributed systems", "microservices",
                "api design", "testing", "debugging", "optimization",
            ]),
            domains: words(&[
                "artificial intelligence", "machine learning", "data science", "web development",
                "mobile development", "cloud computing", "cybersecurity", "blockchain", "iot",
                "robotics", "fintech", "healthcare", "e-commerce", "education",
            ]),
            companies: words(&[
                "google", "microsoft", "amazon", "facebook", "meta", "apple", "netflix", "uber",
                "airbnb", "tesla", "openai", "anthropic", "deepmind", "nvidia",
            ]),
        }
    }
}

impl Vocabularies {
    /// Categories in lookup priority: a keyword listed under several
    /// categories belongs to the first one here.
    fn by_priority(&self) -> [(EntityCategory, &[String]); 5] {
        [
            (EntityCategory::Technology, self.technologies.as_slice()),
            (EntityCategory::Role, self.roles.as_slice()),
            (EntityCategory::Skill, self.skills.as_slice()),
            (EntityCategory::Domain, self.domains.as_slice()),
            (EntityCategory::Company, self.companies.as_slice()),
        ]
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for (category, list) in self.by_priority() {
            if list.iter().any(|keyword| keyword.trim().is_empty()) {
                return Err(format!("{category} vocabulary contains an empty keyword"));
            }
        }
        Ok(())
    }
}

const KEYWORD_CONFIDENCE: f32 = 0.9;
const QUOTED_PERSON_CONFIDENCE: f32 = 0.7;

struct Occurrence<'a> {
    start: usize,
    end: usize,
    keyword: &'a str,
    category: EntityCategory,
}

/// Greedy dictionary matcher: longest keyword first, never overlapping an
/// accepted span, always on token boundaries.
pub struct EntityExtractor {
    /// Deduplicated keywords, lowercase.
    keywords: Vec<(String, EntityCategory)>,
}

impl EntityExtractor {
    #[must_use]
    pub fn new(vocabularies: &Vocabularies) -> Self {
        let mut seen: HashMap<String, EntityCategory> = HashMap::new();
        let mut keywords = Vec::new();
        for (category, list) in vocabularies.by_priority() {
            for keyword in list {
                let keyword = keyword.trim().to_lowercase();
                if keyword.is_empty() || seen.contains_key(&keyword) {
                    continue;
                }
                seen.insert(keyword.clone(), category);
                keywords.push((keyword, category));
            }
        }
        Self { keywords }
    }

    #[must_use]
    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// Entities sorted by span start.
    #[must_use]
    pub fn extract(&self, query: &str) -> Vec<ExtractedEntity> {
        let folded = fold_case(query);

        let mut occurrences: Vec<Occurrence<'_>> = Vec::new();
        for (keyword, category) in &self.keywords {
            let mut from = 0;
            while let Some(offset) = folded[from..].find(keyword.as_str()) {
                let start = from + offset;
                let end = start + keyword.len();
                if on_token_boundary(&folded, start, end) {
                    occurrences.push(Occurrence {
                        start,
                        end,
                        keyword,
                        category: *category,
                    });
                }
                from = start + folded[start..].chars().next().map_or(1, char::len_utf8);
            }
        }
        occurrences.sort_by(|a, b| {
            b.keyword
                .chars()
                .count()
                .cmp(&a.keyword.chars().count())
                .then(a.start.cmp(&b.start))
        });

        let mut entities: Vec<ExtractedEntity> = Vec::new();
        for occurrence in occurrences {
            let overlaps = entities
                .iter()
                .any(|entity| occurrence.start < entity.end && entity.start < occurrence.end);
            if overlaps {
                continue;
            }
            entities.push(ExtractedEntity {
                text: query[occurrence.start..occurrence.end].to_string(),
                category: occurrence.category,
                confidence: KEYWORD_CONFIDENCE,
                start: occurrence.start,
                end: occurrence.end,
                normalized: occurrence.keyword.to_string(),
            });
        }

        for (start, end) in quoted_spans(query) {
            let covered = entities
                .iter()
                .any(|entity| entity.start <= start && end <= entity.end);
            if covered {
                continue;
            }
            let text = &query[start..end];
            entities.push(ExtractedEntity {
                text: text.to_string(),
                category: EntityCategory::Person,
                confidence: QUOTED_PERSON_CONFIDENCE,
                start,
                end,
                normalized: text.to_lowercase(),
            });
        }

        entities.sort_by_key(|entity| entity.start);
        log::debug!("Extracted {} entities from '{query}'", entities.len());
        entities
    }
}

/// Lowercase char by char, keeping any char whose lowercase form has a
/// different UTF-8 length, so byte offsets line up with the input.
fn fold_case(text: &str) -> String {
    text.chars()
        .map(|c| {
            let mut lower = c.to_lowercase();
            match (lower.next(), lower.next()) {
                (Some(l), None) if l.len_utf8() == c.len_utf8() => l,
                _ => c,
            }
        })
        .collect()
}

/// Inner spans of non-empty `"..."` pairs, left to right.
fn quoted_spans(text: &str) -> Vec<(usize, usize)> {
    let quotes: Vec<usize> = text.match_indices('"').map(|(index, _)| index).collect();
    let mut spans = Vec::new();
    let mut i = 0;
    while i + 1 < quotes.len() {
        let (open, close) = (quotes[i], quotes[i + 1]);
        if close > open + 1 {
            spans.push((open + 1, close));
            i += 2;
        } else {
            i += 1;
        }
    }
    spans
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn on_token_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extract(query: &str) -> Vec<(String, EntityCategory)> {
        EntityExtractor::new(&Vocabularies::default())
            .extract(query)
            .into_iter()
            .map(|entity| (entity.text, entity.category))
            .collect()
    }

    #[test]
    fn multiword_skill_is_one_span() {
        assert_eq!(
            extract("machine learning engineer"),
            vec![
                ("machine learning".to_string(), EntityCategory::Skill),
                ("engineer".to_string(), EntityCategory::Role),
            ]
        );
    }

    #[test]
    fn longest_keyword_wins_and_spans_never_overlap() {
        let entities = EntityExtractor::new(&Vocabularies::default()).extract("Senior Data Scientist at Google");
        let spans: Vec<(usize, usize)> = entities.iter().map(|e| (e.start, e.end)).collect();
        assert_eq!(spans, vec![(0, 6), (7, 21), (25, 31)]);
        assert_eq!(entities[1].normalized, "data scientist");
        assert_eq!(entities[1].text, "Data Scientist");
        assert_eq!(entities[2].category, EntityCategory::Company);
        for pair in entities.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn keywords_need_token_boundaries() {
        // "go" inside "google", "rest" inside "interested", "java" inside "javascript".
        assert_eq!(
            extract("interested in javascript at google"),
            vec![
                ("javascript".to_string(), EntityCategory::Technology),
                ("google".to_string(), EntityCategory::Company),
            ]
        );
        assert_eq!(extract("c++ and node.js"), vec![
            ("c++".to_string(), EntityCategory::Technology),
            ("node.js".to_string(), EntityCategory::Technology),
        ]);
    }

    #[test]
    fn shared_keyword_takes_first_priority_category() {
        let categories: Vec<EntityCategory> = extract("web development").into_iter().map(|e| e.1).collect();
        assert_eq!(categories, vec![EntityCategory::Skill]);
    }

    #[test]
    fn quoted_text_becomes_person_unless_covered() {
        let entities = EntityExtractor::new(&Vocabularies::default()).extract(r#"find "Ada Lovelace" or "python""#);
        let people: Vec<&ExtractedEntity> = entities
            .iter()
            .filter(|e| e.category == EntityCategory::Person)
            .collect();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].text, "Ada Lovelace");
        assert!((people[0].confidence - 0.7).abs() < 1e-6);
        assert!(entities.iter().any(|e| e.normalized == "python" && e.category == EntityCategory::Technology));
    }

    #[test]
    fn offsets_survive_non_ascii_input() {
        let entities = EntityExtractor::new(&Vocabularies::default()).extract("Ünïcode RUST");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "RUST");
        assert_eq!(entities[0].normalized, "rust");
    }
}
