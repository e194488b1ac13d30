use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Similarity metric of an index. Scores are always "higher is better".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Dot product of L2-normalized vectors, in `[-1, 1]`.
    #[default]
    Cosine,
    /// `1 / (1 + euclidean distance)`, in `(0, 1]`.
    Euclidean,
}

impl Metric {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        }
    }

    /// Turn a euclidean distance into a bounded similarity.
    #[must_use]
    pub fn score_from_distance(distance: f32) -> f32 {
        1.0 / (1.0 + distance.max(0.0))
    }

    /// Score one stored row against a prepared query.
    #[must_use]
    pub fn score(self, row: &[f32], query: &[f32]) -> f32 {
        match self {
            Self::Cosine => dot(row, query),
            Self::Euclidean => Self::score_from_distance(euclidean_distance(row, query)),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(format!("unknown metric '{other}' (expected cosine or euclidean)")),
        }
    }
}

#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale `vec` to unit length in place. Zero vectors stay zero.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product = dot(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// True when every component is exactly zero, the marker the embedding
/// pipeline leaves in slots whose provider call failed.
#[must_use]
pub fn is_zero_vector(vec: &[f32]) -> bool {
    vec.iter().all(|v| *v == 0.0)
}
