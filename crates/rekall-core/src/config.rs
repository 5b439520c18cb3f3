//! Engine configuration
//!
//! Every tunable the engine exposes, with the defaults the rest of the
//! crate assumes. Construct one per runtime; tests build theirs over a
//! temp directory instead of mutating process-wide state.

use std::path::PathBuf;

/// Configuration for a memory engine runtime.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory for record storage (one subdirectory per project).
    pub memory_dir: PathBuf,
    /// Path to the relational state database (embeddings, relationships,
    /// triggers, shared insights, decision outcomes, breaker state).
    pub db_path: PathBuf,
    /// Directory holding vector index collections (`{name}.index` +
    /// `{name}.meta.json` pairs).
    pub index_dir: PathBuf,

    /// Maximum connections per pool.
    pub pool_size: usize,
    /// Seconds a checkout waits before failing with a timeout.
    pub pool_timeout_s: f64,

    /// Hard cap on the in-process embedding cache.
    pub cache_max_entries: usize,
    /// Embedding vector dimension.
    pub embedding_dim: usize,

    /// Daily importance decay rate (`importance * rate^days`).
    pub decay_rate: f64,
    /// Multiplier applied on access reinforcement.
    pub reinforcement_factor: f64,
    /// Ceiling for reinforced importance.
    pub reinforcement_cap: f64,
    /// Records below this importance are archived by maintenance.
    pub low_importance_threshold: f64,
    /// Days without update before a record counts as stale.
    pub stale_days: i64,

    /// Consecutive failures before a breaker opens.
    pub breaker_threshold: u32,
    /// Seconds an open breaker waits before allowing a probe.
    pub breaker_recovery_s: f64,

    /// Days before a pending prospective trigger expires.
    pub trigger_expiry_days: i64,

    /// Hybrid fusion weight for the semantic score.
    pub semantic_weight: f64,
    /// Hybrid fusion weight for the BM25 score.
    pub bm25_weight: f64,
}

impl EngineConfig {
    /// Build a configuration rooted at `data_dir`, with the standard
    /// layout: `memories/` for records, `intelligence.db` for relational
    /// state, `vectors/` for index collections.
    pub fn with_root(data_dir: impl Into<PathBuf>) -> Self {
        let root = data_dir.into();
        Self {
            memory_dir: root.join("memories"),
            db_path: root.join("intelligence.db"),
            index_dir: root.join("vectors"),
            ..Self::default()
        }
    }

    /// Build a configuration rooted at the platform data directory
    /// (e.g. `~/.local/share/rekall` on Linux). Returns `None` when the
    /// platform provides no home directory.
    pub fn platform_default() -> Option<Self> {
        let proj_dirs = directories::ProjectDirs::from("com", "lfi", "rekall")?;
        Some(Self::with_root(proj_dirs.data_dir()))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_dir: PathBuf::from("memories"),
            db_path: PathBuf::from("intelligence.db"),
            index_dir: PathBuf::from("vectors"),
            pool_size: 5,
            pool_timeout_s: 30.0,
            cache_max_entries: 1000,
            embedding_dim: 384,
            decay_rate: 0.99,
            reinforcement_factor: 1.15,
            reinforcement_cap: 0.95,
            low_importance_threshold: 0.2,
            stale_days: 90,
            breaker_threshold: 3,
            breaker_recovery_s: 60.0,
            trigger_expiry_days: 90,
            semantic_weight: 0.7,
            bm25_weight: 0.3,
        }
    }
}
