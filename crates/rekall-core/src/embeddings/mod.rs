//! Semantic Embeddings
//!
//! The engine reaches every embedding model through the [`Embedder`]
//! trait so the rest of the crate compiles and tests without the
//! `embeddings` feature. When the model is missing or fails to load,
//! callers receive the distinguished [`EmbeddingError::Unavailable`] so
//! hybrid search can degrade to keyword-only scoring.

pub mod cache;

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod local;

pub use cache::{CacheStats, EmbeddingCache, PrecomputeReport};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Embedding vector dimension (all-MiniLM-L6-v2 output).
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Maximum text length passed to the embedder; longer text is truncated.
pub const MAX_TEXT_LENGTH: usize = 8192;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Embedder not installed or failed to load; hybrid search recovers
    /// from this locally, everywhere else it surfaces
    #[error("Embedder unavailable: {0}")]
    Unavailable(String),
    /// Embedding generation failed
    #[error("Embedding generation failed: {0}")]
    Failed(String),
    /// Invalid input (empty, wrong dimension, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Persistent embedding store failure
    #[error("Embedding storage error: {0}")]
    Storage(String),
}

/// Embedding result type
pub type Result<T> = std::result::Result<T, EmbeddingError>;

// ============================================================================
// EMBEDDER CONTRACT
// ============================================================================

/// A polymorphic embedding capability: text in, 384-dimension vector out.
pub trait Embedder: Send + Sync {
    /// Encode one text into an embedding vector.
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Encode a batch of texts. The default implementation encodes one
    /// at a time; model-backed implementations override with true
    /// batching.
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }

    /// Identifier of the underlying model, persisted alongside vectors.
    /// A stored vector whose model does not match is invalidated.
    fn model_name(&self) -> &str;
}

/// Placeholder embedder used when no model is configured. Every call
/// reports [`EmbeddingError::Unavailable`].
#[derive(Debug, Clone, Default)]
pub struct UnavailableEmbedder;

impl Embedder for UnavailableEmbedder {
    fn encode(&self, _text: &str) -> Result<Vec<f32>> {
        Err(EmbeddingError::Unavailable(
            "no embedding model configured".to_string(),
        ))
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// A semantic embedding vector.
#[derive(Debug, Clone)]
pub struct Embedding {
    /// The embedding vector
    pub vector: Vec<f32>,
    /// Dimensions of the vector
    pub dimensions: usize,
}

impl Embedding {
    /// Create a new embedding from a vector.
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// Compute cosine similarity with another embedding.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.dimensions != other.dimensions {
            return 0.0;
        }
        cosine_similarity(&self.vector, &other.vector)
    }

    /// Normalize the vector to unit length in place.
    pub fn normalize(&mut self) {
        l2_normalize(&mut self.vector);
    }

    /// Check whether the vector has unit length within f32 tolerance.
    pub fn is_normalized(&self) -> bool {
        let norm = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        (norm - 1.0).abs() < 0.001
    }

    /// Convert to little-endian bytes for storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Reconstruct from stored bytes. Returns `None` when the byte count
    /// is not a multiple of 4.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Cosine similarity of two vectors. For pre-normalized vectors this is
/// the plain inner product.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// L2-normalize a vector in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use sha2::{Digest, Sha256};

    /// Deterministic embedder for tests: seeds a normalized vector from
    /// the SHA-256 of the input so identical texts embed identically.
    pub struct MockEmbedder;

    impl Embedder for MockEmbedder {
        fn encode(&self, text: &str) -> Result<Vec<f32>> {
            Ok(mock_vector(text))
        }

        fn model_name(&self) -> &str {
            "mock-embedder"
        }
    }

    /// Embedder that always fails as unavailable, for degradation tests.
    pub struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            Err(EmbeddingError::Unavailable("model import failed".into()))
        }

        fn model_name(&self) -> &str {
            "failing-embedder"
        }
    }

    pub fn mock_vector(text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut vector: Vec<f32> = (0..EMBEDDING_DIMENSIONS)
            .map(|i| {
                let byte = digest[i % digest.len()] as f32;
                ((byte + i as f32) / 255.0).sin()
            })
            .collect();
        l2_normalize(&mut vector);
        vector
    }
}
