use crate::entity::EntityReference;
use serde::{Deserialize, Serialize};

/// A stored vector for one entity under one embedding model.
///
/// Storage keys these by `(kind, id, model_name)`; writing the same triple
/// again replaces the previous vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub reference: EntityReference,
    pub vector: Vec<f32>,
    pub dimension: usize,
    pub model_name: String,
    pub norm: f32,
}

impl EmbeddingRecord {
    #[must_use]
    pub fn new(reference: EntityReference, vector: Vec<f32>, model_name: impl Into<String>) -> Self {
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        Self {
            reference,
            dimension: vector.len(),
            vector,
            model_name: model_name.into(),
            norm,
        }
    }

    #[must_use]
    pub fn key(&self) -> (EntityReference, String) {
        (self.reference, self.model_name.clone())
    }
}
