use crate::error::EmbeddingError;
use async_trait::async_trait;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps free text to a fixed-dimension vector. Deterministic for identical
/// input; the dimension is fixed for the lifetime of a provider instance.
/// Provider failures propagate — they are never silently swallowed.
#[async_trait]
pub trait EmbeddingProvider {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl<P> EmbeddingProvider for Box<P>
where
    P: EmbeddingProvider + ?Sized + Send + Sync,
{
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        (**self).embed_batch(texts).await
    }
}

/// Local deterministic embedder: word unigrams and bigrams folded into a
/// signed hash bucket, L2-normalized. Text with no word characters embeds
/// to the zero vector, a valid low-similarity signal.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(embed_word_shingles(text, self.dimensions))
    }
}

fn embed_word_shingles(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0f32; dimensions.max(1)];
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    for (index, word) in words.iter().enumerate() {
        fold_token(&mut vector, word);
        if let Some(next) = words.get(index + 1) {
            fold_token(&mut vector, &format!("{word} {next}"));
        }
    }

    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in &mut vector {
            *value /= magnitude;
        }
    }

    vector
}

// Signed hashing trick: the low hash bit picks the sign so colliding
// tokens partially cancel instead of piling up.
fn fold_token(vector: &mut [f32], token: &str) {
    let mut hash = 0x811c_9dc5u32;
    for byte in token.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    let bucket = (hash >> 1) as usize % vector.len();
    vector[bucket] += if hash & 1 == 0 { 1.0 } else { -1.0 };
}
