use crate::embeddings::EmbeddingProvider;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP embedding provider: posts `{"texts": [...]}` to `<endpoint>/embed`
/// and expects `{"embeddings": [[...], ...]}` back, one row per input text.
pub struct RemoteEmbedder {
    endpoint: Url,
    api_key: Option<String>,
    client: Client,
    dimensions: usize,
}

impl RemoteEmbedder {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        let base = Url::parse(endpoint)?;
        let endpoint = base.join("embed")?;
        Ok(Self {
            endpoint,
            api_key,
            client: Client::new(),
            dimensions,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbedRequest { texts });

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(EmbeddingError::BackendResponse {
                endpoint: self.endpoint.to_string(),
                details: format!("status {}", response.status()),
            });
        }

        let payload: EmbedResponse = response.json().await?;
        validate_embeddings(
            payload.embeddings,
            texts.len(),
            self.dimensions,
            self.endpoint.as_str(),
        )
    }
}

fn validate_embeddings(
    embeddings: Vec<Vec<f32>>,
    expected_rows: usize,
    dimensions: usize,
    endpoint: &str,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if embeddings.len() != expected_rows {
        return Err(EmbeddingError::BackendResponse {
            endpoint: endpoint.to_string(),
            details: format!(
                "expected {} embedding rows, got {}",
                expected_rows,
                embeddings.len()
            ),
        });
    }

    for vector in &embeddings {
        if vector.len() != dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimensions,
                got: vector.len(),
            });
        }
    }

    Ok(embeddings)
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        let mut vectors = self.request(&texts).await?;
        vectors.pop().ok_or_else(|| EmbeddingError::BackendResponse {
            endpoint: self.endpoint.to_string(),
            details: "empty embedding response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_embeddings, RemoteEmbedder};
    use crate::error::EmbeddingError;

    #[test]
    fn endpoint_join_appends_embed_path() {
        let embedder = RemoteEmbedder::new("http://localhost:8080/", None, 4).unwrap();
        assert_eq!(embedder.endpoint.as_str(), "http://localhost:8080/embed");
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(matches!(
            RemoteEmbedder::new("not a url", None, 4),
            Err(EmbeddingError::Url(_))
        ));
    }

    #[test]
    fn row_count_mismatch_is_a_backend_error() {
        let result = validate_embeddings(vec![vec![0.0; 4]], 2, 4, "http://x/embed");
        assert!(matches!(
            result,
            Err(EmbeddingError::BackendResponse { .. })
        ));
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let result = validate_embeddings(vec![vec![0.0; 3]], 1, 4, "http://x/embed");
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: 4,
                got: 3
            })
        ));
    }

    #[test]
    fn well_formed_rows_pass_through() {
        let rows = vec![vec![0.1, 0.2], vec![0.3, 0.4]];
        let validated = validate_embeddings(rows.clone(), 2, 2, "http://x/embed").unwrap();
        assert_eq!(validated, rows);
    }
}
