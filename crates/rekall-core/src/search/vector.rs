//! Persistent Vector Index
//!
//! Exact inner-product index over L2-normalized vectors (inner product of
//! normalized vectors = cosine similarity). Deliberately flat rather than
//! approximate: the search contract breaks score ties by insertion order
//! and deletes by rebuilding, neither of which an ANN graph can honor.
//! Deletes are rare (archival keeps embeddings), so rebuild cost is
//! bounded by maintenance cadence.
//!
//! Persistence is a two-file pair per collection: `{name}.index` holds the
//! raw little-endian f32 rows behind a small header, `{name}.meta.json` is
//! a JSON sidecar mapping hash <-> position plus per-entry metadata. Both
//! files are rewritten atomically before any mutating call returns. If
//! either file is corrupt on load the index resets to empty - no data is
//! lost, the vectors live in the embeddings table and can be re-imported.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::embeddings::l2_normalize;
use crate::storage::pool::ConnectionPool;

/// File magic for the index blob.
const INDEX_MAGIC: &[u8; 4] = b"RKIX";
/// Index blob format version.
const INDEX_VERSION: u32 = 1;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector index error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VectorIndexError {
    /// Vector has the wrong dimension
    #[error("Invalid dimensions: expected {expected}, got {got}")]
    InvalidDimensions {
        /// Expected dimension
        expected: usize,
        /// Supplied dimension
        got: usize,
    },
    /// Failed to persist or load the index pair
    #[error("Persistence failed: {0}")]
    Persistence(String),
    /// Underlying storage failure during import
    #[error("Import failed: {0}")]
    Import(String),
}

/// Vector index result type
pub type Result<T> = std::result::Result<T, VectorIndexError>;

// ============================================================================
// TYPES
// ============================================================================

/// One similarity hit from [`VectorIndex::find_similar`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarHit {
    /// Content hash of the stored vector
    pub content_hash: String,
    /// Cosine similarity to the query (inner product of unit vectors)
    pub similarity: f32,
    /// Metadata stored alongside the vector, if any
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    hash_to_pos: HashMap<String, usize>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// Flat normalized inner-product index with two-file persistence.
pub struct VectorIndex {
    dimension: usize,
    index_path: PathBuf,
    meta_path: PathBuf,
    /// Row-major vector storage; row `i` belongs to `pos_to_hash[i]`.
    vectors: Vec<f32>,
    hash_to_pos: HashMap<String, usize>,
    pos_to_hash: Vec<String>,
    metadata: HashMap<String, serde_json::Value>,
}

impl VectorIndex {
    /// Open (or create) the collection `name` under `persist_dir`.
    /// Corruption of either persisted file resets the index to empty.
    pub fn open(persist_dir: impl AsRef<Path>, name: &str, dimension: usize) -> Result<Self> {
        let dir = persist_dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|e| VectorIndexError::Persistence(format!("create {}: {e}", dir.display())))?;

        let mut index = Self {
            dimension,
            index_path: dir.join(format!("{name}.index")),
            meta_path: dir.join(format!("{name}.meta.json")),
            vectors: Vec::new(),
            hash_to_pos: HashMap::new(),
            pos_to_hash: Vec::new(),
            metadata: HashMap::new(),
        };
        index.load();
        Ok(index)
    }

    /// Number of stored vectors.
    pub fn count(&self) -> usize {
        debug_assert_eq!(self.hash_to_pos.len(), self.pos_to_hash.len());
        debug_assert_eq!(self.vectors.len(), self.pos_to_hash.len() * self.dimension);
        self.pos_to_hash.len()
    }

    /// True when the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Configured vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Whether a vector is stored for `hash`.
    pub fn has(&self, hash: &str) -> bool {
        self.hash_to_pos.contains_key(hash)
    }

    /// Store a vector under `hash`, replacing any previous entry for the
    /// same hash. The vector is L2-normalized before storage and both
    /// persistence files are rewritten before returning.
    pub fn store(
        &mut self,
        hash: &str,
        vector: &[f32],
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        self.insert(hash, vector, metadata)?;
        self.save()
    }

    /// Bulk store; persistence is deferred to a single final write.
    pub fn batch_store(
        &mut self,
        items: Vec<(String, Vec<f32>, Option<serde_json::Value>)>,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        for (hash, vector, metadata) in items {
            self.insert(&hash, &vector, metadata)?;
        }
        self.save()
    }

    fn insert(
        &mut self,
        hash: &str,
        vector: &[f32],
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimensions {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        if self.hash_to_pos.contains_key(hash) {
            self.remove_entry(hash);
        }

        let mut normalized = vector.to_vec();
        l2_normalize(&mut normalized);

        self.hash_to_pos.insert(hash.to_string(), self.pos_to_hash.len());
        self.pos_to_hash.push(hash.to_string());
        self.vectors.extend_from_slice(&normalized);
        if let Some(meta) = metadata {
            self.metadata.insert(hash.to_string(), meta);
        }
        Ok(())
    }

    /// Reconstruct the stored (normalized) vector for `hash`.
    pub fn get(&self, hash: &str) -> Option<Vec<f32>> {
        let pos = *self.hash_to_pos.get(hash)?;
        let start = pos * self.dimension;
        Some(self.vectors[start..start + self.dimension].to_vec())
    }

    /// Find the `top_k` most similar stored vectors with
    /// `similarity >= threshold`, sorted descending. Ties break by
    /// insertion order.
    pub fn find_similar(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarHit>> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimensions {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut normalized = query.to_vec();
        l2_normalize(&mut normalized);

        let mut hits: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(pos, row)| {
                let dot: f32 = row.iter().zip(normalized.iter()).map(|(a, b)| a * b).sum();
                (pos, dot)
            })
            .filter(|(_, sim)| *sim >= threshold)
            .collect();

        // Stable sort on descending score keeps insertion order for ties.
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);

        Ok(hits
            .into_iter()
            .map(|(pos, similarity)| {
                let hash = &self.pos_to_hash[pos];
                SimilarHit {
                    content_hash: hash.clone(),
                    similarity,
                    metadata: self.metadata.get(hash).cloned(),
                }
            })
            .collect())
    }

    /// Delete the vector stored under `hash` (no-op when absent). The
    /// index is rebuilt without the entry and persisted.
    pub fn delete(&mut self, hash: &str) -> Result<()> {
        if !self.hash_to_pos.contains_key(hash) {
            return Ok(());
        }
        self.remove_entry(hash);
        self.metadata.remove(hash);
        self.save()
    }

    /// Bulk import from the persistent embeddings table. Rows whose blob
    /// length disagrees with their recorded dimension are skipped.
    /// Returns the number of vectors imported.
    pub fn import_from_embeddings(&mut self, pool: &std::sync::Arc<ConnectionPool>) -> Result<usize> {
        let conn = pool
            .checkout()
            .map_err(|e| VectorIndexError::Import(e.to_string()))?;

        let mut stmt = conn
            .prepare("SELECT content_hash, embedding, dimension FROM embeddings")
            .map_err(|e| VectorIndexError::Import(e.to_string()))?;
        let rows: Vec<(String, Vec<u8>, usize)> = stmt
            .query_map([], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get::<_, i64>(2)? as usize))
            })
            .map_err(|e| VectorIndexError::Import(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(conn);

        let mut items = Vec::new();
        for (hash, blob, dimension) in rows {
            if dimension != self.dimension || blob.len() != dimension * 4 {
                tracing::warn!("Skipping embedding {hash}: dimension {dimension} does not fit index");
                continue;
            }
            if let Some(embedding) = crate::embeddings::Embedding::from_bytes(&blob) {
                items.push((hash, embedding.vector, None));
            }
        }

        let imported = items.len();
        self.batch_store(items)?;
        Ok(imported)
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    /// Remove one entry by rebuilding the dense storage without it.
    fn remove_entry(&mut self, hash: &str) {
        let removed_pos = match self.hash_to_pos.remove(hash) {
            Some(pos) => pos,
            None => return,
        };

        let dim = self.dimension;
        let mut vectors = Vec::with_capacity(self.vectors.len().saturating_sub(dim));
        let mut pos_to_hash = Vec::with_capacity(self.pos_to_hash.len() - 1);
        let mut hash_to_pos = HashMap::with_capacity(self.hash_to_pos.len());

        for (pos, entry_hash) in self.pos_to_hash.iter().enumerate() {
            if pos == removed_pos {
                continue;
            }
            let start = pos * dim;
            hash_to_pos.insert(entry_hash.clone(), pos_to_hash.len());
            pos_to_hash.push(entry_hash.clone());
            vectors.extend_from_slice(&self.vectors[start..start + dim]);
        }

        self.vectors = vectors;
        self.pos_to_hash = pos_to_hash;
        self.hash_to_pos = hash_to_pos;
    }

    fn save(&self) -> Result<()> {
        let mut blob = Vec::with_capacity(16 + self.vectors.len() * 4);
        blob.extend_from_slice(INDEX_MAGIC);
        blob.extend_from_slice(&INDEX_VERSION.to_le_bytes());
        blob.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        blob.extend_from_slice(&(self.count() as u32).to_le_bytes());
        for value in &self.vectors {
            blob.extend_from_slice(&value.to_le_bytes());
        }
        write_atomic(&self.index_path, &blob)?;

        let sidecar = Sidecar {
            hash_to_pos: self.hash_to_pos.clone(),
            metadata: self.metadata.clone(),
        };
        let json = serde_json::to_vec(&sidecar)
            .map_err(|e| VectorIndexError::Persistence(e.to_string()))?;
        write_atomic(&self.meta_path, &json)?;
        Ok(())
    }

    fn load(&mut self) {
        if !self.index_path.is_file() || !self.meta_path.is_file() {
            return;
        }
        if let Err(e) = self.try_load() {
            tracing::warn!(
                "Vector index {} corrupt ({e}); starting empty",
                self.index_path.display()
            );
            self.vectors.clear();
            self.hash_to_pos.clear();
            self.pos_to_hash.clear();
            self.metadata.clear();
        }
    }

    fn try_load(&mut self) -> std::result::Result<(), String> {
        let blob = fs::read(&self.index_path).map_err(|e| e.to_string())?;
        if blob.len() < 16 || &blob[0..4] != INDEX_MAGIC {
            return Err("bad index header".to_string());
        }
        let version = u32::from_le_bytes(blob[4..8].try_into().unwrap());
        if version != INDEX_VERSION {
            return Err(format!("unsupported index version {version}"));
        }
        let dimension = u32::from_le_bytes(blob[8..12].try_into().unwrap()) as usize;
        let count = u32::from_le_bytes(blob[12..16].try_into().unwrap()) as usize;
        if dimension != self.dimension {
            return Err(format!(
                "dimension mismatch: file has {dimension}, index expects {}",
                self.dimension
            ));
        }
        let expected_bytes = 16 + count * dimension * 4;
        if blob.len() != expected_bytes {
            return Err("index blob truncated".to_string());
        }

        let vectors: Vec<f32> = blob[16..]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let sidecar_raw = fs::read_to_string(&self.meta_path).map_err(|e| e.to_string())?;
        let sidecar: Sidecar = serde_json::from_str(&sidecar_raw).map_err(|e| e.to_string())?;
        if sidecar.hash_to_pos.len() != count {
            return Err("sidecar/index row count mismatch".to_string());
        }

        let mut pos_to_hash = vec![String::new(); count];
        for (hash, &pos) in &sidecar.hash_to_pos {
            if pos >= count || !pos_to_hash[pos].is_empty() {
                return Err("sidecar positions out of range".to_string());
            }
            pos_to_hash[pos] = hash.clone();
        }

        self.vectors = vectors;
        self.hash_to_pos = sidecar.hash_to_pos;
        self.pos_to_hash = pos_to_hash;
        self.metadata = sidecar.metadata;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .map_err(|e| VectorIndexError::Persistence(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| VectorIndexError::Persistence(format!("rename {}: {e}", path.display())))?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DIM: usize = 8;

    fn unit(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; DIM];
        v[axis] = 1.0;
        v
    }

    fn temp_index() -> (tempfile::TempDir, VectorIndex) {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path(), "memories", DIM).unwrap();
        (dir, index)
    }

    #[test]
    fn test_store_and_find() {
        let (_dir, mut index) = temp_index();
        index.store("a", &unit(0), None).unwrap();
        index.store("b", &unit(1), None).unwrap();
        assert_eq!(index.count(), 2);

        let hits = index.find_similar(&unit(0), 5, 0.0).unwrap();
        assert_eq!(hits[0].content_hash, "a");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_filters() {
        let (_dir, mut index) = temp_index();
        index.store("near", &unit(0), None).unwrap();
        index.store("far", &unit(1), None).unwrap();

        let hits = index.find_similar(&unit(0), 5, 0.9).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content_hash, "near");
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let (_dir, mut index) = temp_index();
        // Same vector under three hashes: identical similarity.
        index.store("first", &unit(2), None).unwrap();
        index.store("second", &unit(2), None).unwrap();
        index.store("third", &unit(2), None).unwrap();

        let hits = index.find_similar(&unit(2), 3, 0.0).unwrap();
        let order: Vec<&str> = hits.iter().map(|h| h.content_hash.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_update_replaces_without_growth() {
        let (_dir, mut index) = temp_index();
        index.store("a", &unit(0), None).unwrap();
        index.store("a", &unit(3), None).unwrap();
        assert_eq!(index.count(), 1);

        let hits = index.find_similar(&unit(3), 1, 0.5).unwrap();
        assert_eq!(hits[0].content_hash, "a");
    }

    #[test]
    fn test_vectors_normalized_on_store() {
        let (_dir, mut index) = temp_index();
        let mut long = unit(0);
        long[0] = 25.0;
        index.store("a", &long, None).unwrap();

        let stored = index.get("a").unwrap();
        let norm: f32 = stored.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_delete_rebuilds() {
        let (_dir, mut index) = temp_index();
        index.store("a", &unit(0), None).unwrap();
        index.store("b", &unit(1), None).unwrap();
        index.store("c", &unit(2), None).unwrap();

        index.delete("b").unwrap();
        assert_eq!(index.count(), 2);
        assert!(!index.has("b"));
        assert!(index.find_similar(&unit(1), 5, 0.9).unwrap().is_empty());
        // Remaining entries still found
        assert_eq!(index.find_similar(&unit(2), 1, 0.9).unwrap()[0].content_hash, "c");

        // Deleting a missing hash is a no-op
        index.delete("missing").unwrap();
        assert_eq!(index.count(), 2);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut index = VectorIndex::open(dir.path(), "memories", DIM).unwrap();
            index
                .store("a", &unit(0), Some(serde_json::json!({"project": "LFI"})))
                .unwrap();
            index.store("b", &unit(1), None).unwrap();
        }

        let reopened = VectorIndex::open(dir.path(), "memories", DIM).unwrap();
        assert_eq!(reopened.count(), 2);
        let hits = reopened.find_similar(&unit(0), 1, 0.5).unwrap();
        assert_eq!(hits[0].content_hash, "a");
        assert_eq!(
            hits[0].metadata.as_ref().unwrap()["project"],
            serde_json::json!("LFI")
        );
    }

    #[test]
    fn test_corrupt_sidecar_resets_empty() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut index = VectorIndex::open(dir.path(), "memories", DIM).unwrap();
            index.store("a", &unit(0), None).unwrap();
        }
        fs::write(dir.path().join("memories.meta.json"), "{not json").unwrap();

        let reopened = VectorIndex::open(dir.path(), "memories", DIM).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_corrupt_blob_resets_empty() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut index = VectorIndex::open(dir.path(), "memories", DIM).unwrap();
            index.store("a", &unit(0), None).unwrap();
        }
        fs::write(dir.path().join("memories.index"), b"garbage").unwrap();

        let reopened = VectorIndex::open(dir.path(), "memories", DIM).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let (_dir, mut index) = temp_index();
        let err = index.store("a", &[1.0, 2.0], None).unwrap_err();
        assert!(matches!(
            err,
            VectorIndexError::InvalidDimensions { expected: 8, got: 2 }
        ));
        assert!(index.find_similar(&[1.0], 5, 0.0).is_err());
    }

    #[test]
    fn test_import_from_embeddings_table() {
        use crate::embeddings::test_util::MockEmbedder;
        use crate::embeddings::{EmbeddingCache, EMBEDDING_DIMENSIONS};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::new(dir.path().join("test.db"), 5, Duration::from_secs(5));
        let cache = EmbeddingCache::new(Arc::clone(&pool), Arc::new(MockEmbedder), 10).unwrap();
        cache.embed("first memory").unwrap();
        cache.embed("second memory").unwrap();

        let mut index = VectorIndex::open(dir.path(), "memories", EMBEDDING_DIMENSIONS).unwrap();
        let imported = index.import_from_embeddings(&pool).unwrap();
        assert_eq!(imported, 2);
        assert_eq!(index.count(), 2);
    }
}
