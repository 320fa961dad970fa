//! Embedding function seam
//!
//! The retrieval contract only needs `embed(text) -> vector` of a fixed
//! dimension. `HashingEmbedder` is a dependency-free reference implementation
//! (signed feature hashing over unigrams and bigrams); production deployments
//! inject a model-backed embedder behind the same trait.

use async_trait::async_trait;

use crate::error::AdvisorError;

/// Trait for embedding backends
///
/// Implementations must be thread-safe (Send + Sync) since advisory tasks
/// share one embedder.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text` into a vector of exactly `dimension()` components.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdvisorError>;

    fn dimension(&self) -> usize;

    /// Embedder name for logging
    fn embedder_name(&self) -> &'static str;
}

/// Deterministic feature-hashing embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn accumulate(&self, feature: &str, weight: f32, out: &mut [f32]) {
        let h = fnv1a(feature.as_bytes());
        // Dimension is bounded by config validation, so the remainder fits usize.
        let bucket = (h % self.dimension as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        out[bucket] += sign * weight;
    }

    /// Synchronous embedding, shared by the async trait impl and tooling
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, AdvisorError> {
        let tokens = Self::tokens(text);
        if tokens.is_empty() {
            return Err(AdvisorError::EmbeddingFailure(
                "text contains no tokens".to_string(),
            ));
        }

        let mut v = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.accumulate(token, 1.0, &mut v);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&format!("{} {}", pair[0], pair[1]), 0.5, &mut v);
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdvisorError> {
        self.embed_sync(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embedder_name(&self) -> &'static str {
        "hashing"
    }
}

/// 64-bit FNV-1a; stable across platforms and releases
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::similarity::cosine_similarity;

    #[tokio::test]
    async fn embedding_is_deterministic_and_normalised() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("Landing gear retracted at low altitude").await.unwrap();
        let b = e.embed("landing GEAR retracted, at low altitude").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn related_text_scores_higher_than_unrelated() {
        let e = HashingEmbedder::new(256);
        let query = e.embed_sync("gear up low altitude warning").unwrap();
        let related = e.embed_sync("Gear up at low altitude: extend landing gear").unwrap();
        let unrelated = e.embed_sync("Cabin pressurisation controller fault").unwrap();
        let s_related = cosine_similarity(&query, &related).unwrap();
        let s_unrelated = cosine_similarity(&query, &unrelated).unwrap();
        assert!(s_related > s_unrelated);
    }

    #[test]
    fn empty_text_is_embedding_failure() {
        let e = HashingEmbedder::new(16);
        assert!(matches!(
            e.embed_sync("  --  "),
            Err(AdvisorError::EmbeddingFailure(_))
        ));
    }
}
