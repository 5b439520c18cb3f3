//! Content-hashed embedding cache
//!
//! Two tiers in front of the embedder: a bounded in-process LRU and the
//! persistent `embeddings` table. Lookups are keyed by the SHA-256 of
//! the content, so unchanged text never re-embeds. Every persistent read
//! bumps `accessed_at`; a stored vector whose model no longer matches
//! the active embedder is invalidated and recomputed.

use chrono::Utc;
use lru::LruCache;
use rusqlite::{params, OptionalExtension};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use super::{l2_normalize, Embedder, Embedding, EmbeddingError, Result, MAX_TEXT_LENGTH};
use crate::storage::pool::ConnectionPool;
use crate::storage::records::content_hash;

/// Report from a batch precompute run.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecomputeReport {
    /// Embeddings newly computed
    pub computed: usize,
    /// Texts skipped because their hash was already stored
    pub skipped: usize,
    /// Texts that failed to embed
    pub errors: usize,
}

/// Aggregate view over the persistent embedding store.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Rows in the persistent store
    pub persistent_count: usize,
    /// Entries currently held in the in-process LRU
    pub cached_entries: usize,
    /// Most recent `created_at` (RFC-3339), if any rows exist
    pub newest_created_at: Option<String>,
    /// Most recent `accessed_at` (RFC-3339), if any rows exist
    pub newest_accessed_at: Option<String>,
}

/// Bounded LRU + persistent store in front of an [`Embedder`].
pub struct EmbeddingCache {
    cache: Mutex<LruCache<String, Vec<f32>>>,
    pool: Arc<ConnectionPool>,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingCache {
    /// Create a cache over `pool`'s database with the given LRU capacity.
    pub fn new(pool: Arc<ConnectionPool>, embedder: Arc<dyn Embedder>, max_entries: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("max(1) is non-zero");
        {
            let conn = pool.checkout().map_err(storage_err)?;
            crate::storage::migrations::apply_migrations(&conn).map_err(storage_err)?;
        }
        Ok(Self {
            cache: Mutex::new(LruCache::new(capacity)),
            pool,
            embedder,
        })
    }

    /// The embedder behind this cache.
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Embed `text`, serving from the LRU or the persistent store when
    /// the content hash is already known.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        let hash = content_hash(text);

        if let Some(vector) = self.cache_get(&hash) {
            return Ok(vector);
        }
        if let Some(vector) = self.load_persistent(&hash)? {
            self.cache_put(&hash, vector.clone());
            return Ok(vector);
        }

        let vector = self.compute_and_store(&hash, text)?;
        self.cache_put(&hash, vector.clone());
        Ok(vector)
    }

    /// Fetch a stored embedding by content hash without invoking the
    /// embedder. Persistent hits bump `accessed_at`.
    pub fn get(&self, hash: &str) -> Result<Option<Vec<f32>>> {
        if let Some(vector) = self.cache_get(hash) {
            return Ok(Some(vector));
        }
        match self.load_persistent(hash)? {
            Some(vector) => {
                self.cache_put(hash, vector.clone());
                Ok(Some(vector))
            }
            None => Ok(None),
        }
    }

    /// Whether an embedding exists for `hash` (either tier).
    pub fn has(&self, hash: &str) -> Result<bool> {
        if self.cache.lock().expect("cache lock poisoned").peek(hash).is_some() {
            return Ok(true);
        }
        let conn = self.pool.checkout().map_err(storage_err)?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM embeddings WHERE content_hash = ?1",
                [hash],
                |r| r.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(found.is_some())
    }

    /// Batch precompute: embed every text whose hash is not yet stored.
    pub fn precompute(&self, texts: &[String]) -> PrecomputeReport {
        let mut report = PrecomputeReport::default();
        for text in texts {
            if text.trim().is_empty() {
                report.skipped += 1;
                continue;
            }
            let hash = content_hash(text);
            match self.has(&hash) {
                Ok(true) => report.skipped += 1,
                Ok(false) => match self.embed(text) {
                    Ok(_) => report.computed += 1,
                    Err(e) => {
                        tracing::warn!("Precompute failed for one text: {e}");
                        report.errors += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!("Precompute lookup failed: {e}");
                    report.errors += 1;
                }
            }
        }
        report
    }

    /// Aggregate statistics over both tiers.
    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self.pool.checkout().map_err(storage_err)?;
        let (count, newest_created, newest_accessed): (usize, Option<String>, Option<String>) =
            conn.query_row(
                "SELECT COUNT(*), MAX(created_at), MAX(accessed_at) FROM embeddings",
                [],
                |r| Ok((r.get::<_, i64>(0)? as usize, r.get(1)?, r.get(2)?)),
            )
            .map_err(storage_err)?;

        Ok(CacheStats {
            persistent_count: count,
            cached_entries: self.cache.lock().expect("cache lock poisoned").len(),
            newest_created_at: newest_created,
            newest_accessed_at: newest_accessed,
        })
    }

    /// Drop every in-process entry. Persistent rows are untouched.
    pub fn clear_session_cache(&self) {
        self.cache.lock().expect("cache lock poisoned").clear();
    }

    /// Whether `hash` currently sits in the in-process LRU (no promotion).
    pub fn cached(&self, hash: &str) -> bool {
        self.cache.lock().expect("cache lock poisoned").peek(hash).is_some()
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    fn cache_get(&self, hash: &str) -> Option<Vec<f32>> {
        self.cache
            .lock()
            .expect("cache lock poisoned")
            .get(hash)
            .cloned()
    }

    fn cache_put(&self, hash: &str, vector: Vec<f32>) {
        self.cache
            .lock()
            .expect("cache lock poisoned")
            .put(hash.to_string(), vector);
    }

    fn load_persistent(&self, hash: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.pool.checkout().map_err(storage_err)?;
        let row: Option<(Vec<u8>, String)> = conn
            .query_row(
                "SELECT embedding, model FROM embeddings WHERE content_hash = ?1",
                [hash],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(storage_err)?;

        let (blob, model) = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        if model != self.embedder.model_name() {
            // Model changed since this vector was computed; invalidate.
            conn.execute("DELETE FROM embeddings WHERE content_hash = ?1", [hash])
                .map_err(storage_err)?;
            tracing::debug!("Invalidated embedding for {hash}: model {model} superseded");
            return Ok(None);
        }

        conn.execute(
            "UPDATE embeddings SET accessed_at = ?1 WHERE content_hash = ?2",
            params![Utc::now().to_rfc3339(), hash],
        )
        .map_err(storage_err)?;

        match Embedding::from_bytes(&blob) {
            Some(embedding) => Ok(Some(embedding.vector)),
            None => {
                // Corrupt blob: drop the row and recompute on demand.
                conn.execute("DELETE FROM embeddings WHERE content_hash = ?1", [hash])
                    .map_err(storage_err)?;
                Ok(None)
            }
        }
    }

    fn compute_and_store(&self, hash: &str, text: &str) -> Result<Vec<f32>> {
        let truncated = truncate_chars(text, MAX_TEXT_LENGTH);
        let mut vector = self.embedder.encode(truncated)?;
        l2_normalize(&mut vector);

        let now = Utc::now().to_rfc3339();
        let conn = self.pool.checkout().map_err(storage_err)?;
        conn.execute(
            "INSERT OR REPLACE INTO embeddings
             (content_hash, embedding, dimension, model, created_at, accessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                hash,
                Embedding::new(vector.clone()).to_bytes(),
                vector.len() as i64,
                self.embedder.model_name(),
                now,
            ],
        )
        .map_err(storage_err)?;

        Ok(vector)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn storage_err(e: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::Storage(e.to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::test_util::{FailingEmbedder, MockEmbedder};
    use std::time::Duration;

    fn temp_cache(max_entries: usize) -> (tempfile::TempDir, EmbeddingCache) {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::new(dir.path().join("test.db"), 5, Duration::from_secs(5));
        let cache = EmbeddingCache::new(pool, Arc::new(MockEmbedder), max_entries).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_embed_normalized_and_deterministic() {
        let (_dir, cache) = temp_cache(10);
        let a = cache.embed("office setup guide").unwrap();
        let b = cache.embed("office setup guide").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_persistence_survives_cache_clear_bit_exact() {
        let (_dir, cache) = temp_cache(10);
        let original = cache.embed("durable fact").unwrap();

        cache.clear_session_cache();
        assert!(!cache.cached(&content_hash("durable fact")));

        let reloaded = cache.embed("durable fact").unwrap();
        assert_eq!(original, reloaded);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let (_dir, cache) = temp_cache(3);
        let texts = ["one", "two", "three"];
        for t in texts {
            cache.embed(t).unwrap();
        }
        // Refresh "one" so "two" becomes least recently used.
        cache.embed("one").unwrap();
        cache.embed("four").unwrap();

        assert!(cache.cached(&content_hash("one")));
        assert!(!cache.cached(&content_hash("two")));
        assert!(cache.cached(&content_hash("three")));
        assert!(cache.cached(&content_hash("four")));

        // Evicted entry is still in the persistent store.
        assert!(cache.has(&content_hash("two")).unwrap());
    }

    #[test]
    fn test_persistent_read_bumps_accessed_at() {
        let (_dir, cache) = temp_cache(10);
        cache.embed("track access").unwrap();
        let before = cache.stats().unwrap().newest_accessed_at.unwrap();

        std::thread::sleep(Duration::from_millis(10));
        cache.clear_session_cache();
        cache.get(&content_hash("track access")).unwrap();

        let after = cache.stats().unwrap().newest_accessed_at.unwrap();
        assert!(after > before);
    }

    #[test]
    fn test_model_mismatch_invalidates() {
        let (_dir, cache) = temp_cache(10);
        let hash = content_hash("model change");

        // Plant a row attributed to a superseded model.
        {
            let conn = cache.pool.checkout().unwrap();
            conn.execute(
                "INSERT INTO embeddings (content_hash, embedding, dimension, model, created_at, accessed_at)
                 VALUES (?1, ?2, 4, 'old-model', ?3, ?3)",
                params![hash, vec![0u8; 16], Utc::now().to_rfc3339()],
            )
            .unwrap();
        }

        let vector = cache.embed("model change").unwrap();
        assert_eq!(vector.len(), crate::embeddings::EMBEDDING_DIMENSIONS);

        let conn = cache.pool.checkout().unwrap();
        let model: String = conn
            .query_row(
                "SELECT model FROM embeddings WHERE content_hash = ?1",
                [hash.as_str()],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(model, "mock-embedder");
    }

    #[test]
    fn test_precompute_skips_known_hashes() {
        let (_dir, cache) = temp_cache(10);
        cache.embed("already here").unwrap();

        let texts = vec!["already here".to_string(), "brand new".to_string(), "  ".to_string()];
        let report = cache.precompute(&texts);
        assert_eq!(report.computed, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.errors, 0);

        // Second run computes nothing.
        let again = cache.precompute(&texts);
        assert_eq!(again.computed, 0);
        assert_eq!(again.skipped, 3);
    }

    #[test]
    fn test_unavailable_embedder_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::new(dir.path().join("test.db"), 5, Duration::from_secs(5));
        let cache = EmbeddingCache::new(pool, Arc::new(FailingEmbedder), 10).unwrap();

        let err = cache.embed("anything").unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable(_)));

        let report = cache.precompute(&["text".to_string()]);
        assert_eq!(report.errors, 1);
    }

    #[test]
    fn test_empty_text_rejected() {
        let (_dir, cache) = temp_cache(10);
        assert!(matches!(
            cache.embed("   "),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }
}
