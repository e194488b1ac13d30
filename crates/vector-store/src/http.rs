use crate::embeddings::EmbeddingProvider;
use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpEmbedderConfig {
    pub api_base: String,
    pub path: String,
    pub model: String,
    pub dimension: usize,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for HttpEmbedderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            path: "/embeddings".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            api_key: None,
            timeout_ms: 10_000,
        }
    }
}

/// Embedding provider speaking the OpenAI-compatible `/embeddings` API.
pub struct HttpEmbedder {
    client: Client,
    config: HttpEmbedderConfig,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self> {
        if config.dimension == 0 {
            return Err(VectorStoreError::InvalidArgument(
                "embedding dimension must be > 0".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| VectorStoreError::EmbeddingError(format!("http client: {err}")))?;
        Ok(Self { client, config })
    }

    async fn request(&self, texts: &[String]) -> Result<Value> {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), self.config.path);
        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
            "dimensions": self.config.dimension,
        });
        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| VectorStoreError::EmbeddingError(format!("embedding request: {err}")))?;
        response
            .json::<Value>()
            .await
            .map_err(|err| VectorStoreError::EmbeddingError(format!("embedding response: {err}")))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.encode_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("empty embedding response".to_string()))
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let json = self.request(texts).await?;
        let vectors = parse_embedding_response(&json)?;
        if vectors.len() != texts.len() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "embedding response has {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

/// Extract vectors from an `/embeddings` response, ordered by `index`.
fn parse_embedding_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| VectorStoreError::EmbeddingError("response is missing data array".to_string()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (fallback_index, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map_or(fallback_index, |v| v as usize);
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| VectorStoreError::EmbeddingError("item missing embedding array".to_string()))?;
        let vector = embedding
            .iter()
            .map(|value| {
                value
                    .as_f64()
                    .map(|number| number as f32)
                    .ok_or_else(|| VectorStoreError::EmbeddingError("embedding value must be numeric".to_string()))
            })
            .collect::<Result<Vec<f32>>>()?;
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}
