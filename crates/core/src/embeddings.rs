use crate::error::EmbedError;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

pub trait Embedder {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Output position `i` holds the vector of `texts[i]`.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Corpus Embedder: embeds `texts` in batches of `batch_size`, preserving order.
pub fn embed_corpus(
    embedder: &dyn Embedder,
    texts: &[&str],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if batch_size == 0 {
        return Err(EmbedError::InvalidArgument(
            "batch size must be at least 1".to_string(),
        ));
    }

    let start = Instant::now();
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        let embedded = embedder.embed_batch(batch)?;
        if embedded.len() != batch.len() {
            return Err(EmbedError::BatchSize {
                expected: batch.len(),
                actual: embedded.len(),
            });
        }
        vectors.extend(embedded);
    }

    debug!(
        texts = texts.len(),
        batch_size,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "corpus embedded"
    );

    Ok(vectors)
}

/// Model-free embedder hashing word unigrams and character trigrams into a
/// fixed number of buckets. Output is L2-normalized; empty text maps to the
/// zero vector.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    fn bucket(&self, token: &str) -> usize {
        let mut hash = 1469598103934665603u64;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        (hash % self.dimensions.max(1) as u64) as usize
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0f32; self.dimensions()];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            vector[self.bucket(word)] += 1.0;

            let padded = format!(" {word} ").chars().collect::<Vec<_>>();
            for window in padded.windows(3) {
                let gram = window.iter().collect::<String>();
                vector[self.bucket(&gram)] += 0.5;
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}
