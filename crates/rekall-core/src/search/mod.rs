//! Retrieval: BM25 keyword scoring, hybrid fusion, vector index.

pub mod bm25;
pub mod hybrid;
pub mod vector;

pub use bm25::{average_doc_length, bm25_score};
pub use hybrid::{HybridOptions, HybridSearcher, ScoredRecord};
pub use vector::{SimilarHit, VectorIndex, VectorIndexError};
