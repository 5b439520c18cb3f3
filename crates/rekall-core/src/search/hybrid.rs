//! Hybrid Search (Semantic + BM25)
//!
//! Weighted fusion of embedding similarity and BM25 keyword scoring over
//! a candidate set of records. When the embedder is unavailable the
//! search degrades gracefully: semantic scores drop to zero and the
//! effective weights shift to keyword-only, so a missing model never
//! takes retrieval down with it.

use serde::Serialize;
use std::sync::Arc;

use super::bm25::{average_doc_length, bm25_score};
use crate::embeddings::{cosine_similarity, EmbeddingCache, EmbeddingError};
use crate::storage::records::MemoryRecord;

/// Tunables for one hybrid search call.
#[derive(Debug, Clone)]
pub struct HybridOptions {
    /// Maximum results returned
    pub top_k: usize,
    /// Drop results scoring below this
    pub threshold: f64,
    /// Weight of the semantic score
    pub semantic_weight: f64,
    /// Weight of the BM25 score
    pub bm25_weight: f64,
    /// Disable embedding lookups entirely (keyword scoring only)
    pub use_semantic: bool,
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            threshold: 0.0,
            semantic_weight: 0.7,
            bm25_weight: 0.3,
            use_semantic: true,
        }
    }
}

/// A candidate record with its fusion scores attached. Every input field
/// of the record is preserved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredRecord {
    /// The matched record
    #[serde(flatten)]
    pub record: MemoryRecord,
    /// `semantic_weight * semantic + bm25_weight * bm25`
    pub hybrid_score: f64,
    /// Cosine similarity between query and content embeddings
    pub semantic_score: f64,
    /// BM25 keyword score
    pub bm25_score: f64,
}

/// Hybrid searcher over the embedding cache.
pub struct HybridSearcher {
    cache: Arc<EmbeddingCache>,
}

impl HybridSearcher {
    /// Create a searcher that embeds queries and candidates through
    /// `cache`.
    pub fn new(cache: Arc<EmbeddingCache>) -> Self {
        Self { cache }
    }

    /// Score `records` against `query` and return the fused ranking:
    /// sorted by hybrid score descending, truncated to `top_k`, filtered
    /// by `threshold`. Candidates with empty content are skipped.
    pub fn search(
        &self,
        query: &str,
        records: &[MemoryRecord],
        options: &HybridOptions,
    ) -> Result<Vec<ScoredRecord>, EmbeddingError> {
        if query.trim().is_empty() || records.is_empty() {
            return Ok(Vec::new());
        }

        let avg_doc_length = average_doc_length(records.iter().map(|r| r.content.as_str()));

        // Embed the query once. An unavailable embedder is recovered
        // locally: weights shift to keyword-only. Other failures surface.
        let mut degraded = false;
        let query_vector = if options.use_semantic {
            match self.cache.embed(query) {
                Ok(vector) => Some(vector),
                Err(EmbeddingError::Unavailable(reason)) => {
                    tracing::warn!("Embedder unavailable, BM25-only search: {reason}");
                    degraded = true;
                    None
                }
                Err(other) => return Err(other),
            }
        } else {
            None
        };

        let (semantic_weight, bm25_weight) = if degraded {
            (0.0, 1.0)
        } else {
            (options.semantic_weight, options.bm25_weight)
        };

        let mut scored = Vec::with_capacity(records.len());
        for record in records {
            if record.content.trim().is_empty() {
                continue;
            }

            let keyword = bm25_score(query, &record.content, avg_doc_length);

            let semantic = match &query_vector {
                Some(qv) => match self.cache.embed(&record.content) {
                    Ok(dv) => cosine_similarity(qv, &dv) as f64,
                    Err(EmbeddingError::Unavailable(_)) => 0.0,
                    Err(other) => return Err(other),
                },
                None => 0.0,
            };

            scored.push(ScoredRecord {
                record: record.clone(),
                hybrid_score: semantic_weight * semantic + bm25_weight * keyword,
                semantic_score: semantic,
                bm25_score: keyword,
            });
        }

        scored.sort_by(|a, b| {
            b.hybrid_score
                .partial_cmp(&a.hybrid_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(options.top_k);
        scored.retain(|s| s.hybrid_score >= options.threshold);

        Ok(scored)
    }

    /// BM25-only convenience: keyword weights, no embedding lookups.
    pub fn keyword_search(
        &self,
        query: &str,
        records: &[MemoryRecord],
        top_k: usize,
    ) -> Vec<ScoredRecord> {
        self.search(
            query,
            records,
            &HybridOptions {
                top_k,
                semantic_weight: 0.0,
                bm25_weight: 1.0,
                use_semantic: false,
                ..Default::default()
            },
        )
        // No embedding path is taken with use_semantic=false.
        .unwrap_or_default()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::test_util::{FailingEmbedder, MockEmbedder};
    use crate::storage::pool::ConnectionPool;
    use crate::storage::records::{content_hash, RecordStatus, Scope};
    use chrono::Utc;
    use std::time::Duration;

    fn record(id: &str, content: &str) -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            id: id.to_string(),
            content_hash: content_hash(content),
            content: content.to_string(),
            project_id: "LFI".to_string(),
            scope: Scope::Project,
            status: RecordStatus::Active,
            importance: 0.5,
            confidence: 0.8,
            tags: vec![],
            knowledge_domain: "general".to_string(),
            created_at: now,
            updated_at: now,
            session_id: None,
        }
    }

    fn searcher_with(embedder: Arc<dyn crate::embeddings::Embedder>) -> (tempfile::TempDir, HybridSearcher) {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::new(dir.path().join("test.db"), 5, Duration::from_secs(5));
        let cache = EmbeddingCache::new(pool, embedder, 100).unwrap();
        (dir, HybridSearcher::new(Arc::new(cache)))
    }

    #[test]
    fn test_degrades_to_bm25_when_embedder_unavailable() {
        let (_dir, searcher) = searcher_with(Arc::new(FailingEmbedder));
        let records = vec![record("1", "office setup guide")];

        let results = searcher
            .search("office", &records, &HybridOptions::default())
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].semantic_score, 0.0);
        assert!(results[0].bm25_score > 0.0);
        assert!((results[0].hybrid_score - results[0].bm25_score).abs() < 1e-12);
    }

    #[test]
    fn test_exact_semantic_match_ranks_first() {
        let (_dir, searcher) = searcher_with(Arc::new(MockEmbedder));
        let records = vec![
            record("1", "completely unrelated text about cooking"),
            record("2", "deploy pipeline checklist"),
        ];

        // Identical text embeds identically under the mock: similarity 1.
        let results = searcher
            .search("deploy pipeline checklist", &records, &HybridOptions::default())
            .unwrap();

        assert_eq!(results[0].record.id, "2");
        assert!((results[0].semantic_score - 1.0).abs() < 1e-5);
        assert!(results[0].hybrid_score > results[1].hybrid_score);
    }

    #[test]
    fn test_weighted_fusion_formula() {
        let (_dir, searcher) = searcher_with(Arc::new(MockEmbedder));
        let records = vec![record("1", "office setup guide")];

        let results = searcher
            .search("office", &records, &HybridOptions::default())
            .unwrap();

        let r = &results[0];
        let expected = 0.7 * r.semantic_score + 0.3 * r.bm25_score;
        assert!((r.hybrid_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_use_semantic_false_keeps_weights() {
        let (_dir, searcher) = searcher_with(Arc::new(MockEmbedder));
        let records = vec![record("1", "office setup guide")];

        let results = searcher
            .search(
                "office",
                &records,
                &HybridOptions {
                    use_semantic: false,
                    ..Default::default()
                },
            )
            .unwrap();

        let r = &results[0];
        assert_eq!(r.semantic_score, 0.0);
        assert!((r.hybrid_score - 0.3 * r.bm25_score).abs() < 1e-12);
    }

    #[test]
    fn test_keyword_search_scores_pure_bm25() {
        let (_dir, searcher) = searcher_with(Arc::new(FailingEmbedder));
        let records = vec![
            record("1", "office setup guide"),
            record("2", "kitchen renovation"),
        ];

        let results = searcher.keyword_search("office", &records, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.id, "1");
        assert!((results[0].hybrid_score - results[0].bm25_score).abs() < 1e-12);
    }

    #[test]
    fn test_top_k_and_threshold() {
        let (_dir, searcher) = searcher_with(Arc::new(MockEmbedder));
        let records: Vec<MemoryRecord> = (0..5)
            .map(|i| record(&i.to_string(), &format!("office note number {i}")))
            .collect();

        let top2 = searcher
            .search(
                "office note",
                &records,
                &HybridOptions {
                    top_k: 2,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(top2.len(), 2);

        let none = searcher
            .search(
                "office note",
                &records,
                &HybridOptions {
                    threshold: 100.0,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_empty_query_and_empty_content() {
        let (_dir, searcher) = searcher_with(Arc::new(MockEmbedder));
        let records = vec![record("1", "   "), record("2", "real content")];

        assert!(searcher
            .search("", &records, &HybridOptions::default())
            .unwrap()
            .is_empty());

        let results = searcher
            .search("real", &records, &HybridOptions::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, "2");
    }

    #[test]
    fn test_result_preserves_record_fields() {
        let (_dir, searcher) = searcher_with(Arc::new(MockEmbedder));
        let mut rec = record("keep-fields", "office setup guide");
        rec.tags = vec!["#strategy".to_string()];
        rec.session_id = Some("sess-9".to_string());

        let results = searcher
            .search("office", &[rec], &HybridOptions::default())
            .unwrap();
        let r = &results[0].record;
        assert_eq!(r.id, "keep-fields");
        assert_eq!(r.tags, vec!["#strategy"]);
        assert_eq!(r.session_id.as_deref(), Some("sess-9"));
    }
}
