//! # Rekall Core
//!
//! Personal long-term memory engine: a content-addressed store of small
//! text memories with a retrieval stack, a scoring lifecycle, and a graph
//! of relationships and future-firing triggers built over it.
//!
//! - **Storage**: markdown records with typed frontmatter, one file per
//!   memory, plus a pooled SQLite database (WAL) for relational state
//! - **Embeddings**: content-hashed cache (bounded LRU + persistent
//!   store) in front of a pluggable embedder
//! - **Retrieval**: BM25 keyword scoring fused with semantic similarity,
//!   degrading gracefully when the embedder is unavailable
//! - **Lifecycle**: importance scoring, exponential decay, access
//!   reinforcement, archival, freshness-gated embedding backfill
//! - **Resilience**: named circuit breakers around every foreign call
//! - **Prospection**: intent extraction and event/topic/time triggers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rekall_core::{EngineConfig, NewRecord, Runtime};
//!
//! let runtime = Runtime::new(EngineConfig::with_root("/path/to/data"))?;
//!
//! // Remember something
//! let record = runtime.store().create(NewRecord {
//!     content: "Clients respond faster to bullet points".into(),
//!     project_id: "LFI".into(),
//!     ..Default::default()
//! })?;
//!
//! // Search for it later
//! let candidates = runtime.store().list(&Default::default())?;
//! let hits = runtime.searcher().search(
//!     "client communication",
//!     &candidates,
//!     &runtime.search_options(),
//! )?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): compile SQLite into the binary
//! - `embeddings`: local ONNX embeddings via fastembed
//!   (all-MiniLM-L6-v2, 384 dimensions)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod adapters;
pub mod config;
pub mod consolidation;
pub mod embeddings;
pub mod energy;
pub mod freshness;
pub mod graph;
pub mod importance;
pub mod maintenance;
pub mod outcomes;
pub mod persona;
pub mod prospective;
pub mod resilience;
pub mod runtime;
pub mod search;
pub mod selftest;
pub mod sharing;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Configuration and runtime
pub use config::EngineConfig;
pub use runtime::{Runtime, RuntimeError};

// Storage layer
pub use storage::{
    content_hash, ConnectionPool, ListFilter, MemoryRecord, NewRecord, PoolError, PoolRegistry,
    PooledConnection, RecordPatch, RecordStatus, RecordStore, Scope, StoreError,
};

// Embeddings
pub use embeddings::{
    cosine_similarity, CacheStats, Embedder, Embedding, EmbeddingCache, EmbeddingError,
    PrecomputeReport, UnavailableEmbedder, EMBEDDING_DIMENSIONS,
};

#[cfg(feature = "embeddings")]
pub use embeddings::local::LocalEmbedder;

// Retrieval
pub use search::{
    average_doc_length, bm25_score, HybridOptions, HybridSearcher, ScoredRecord, SimilarHit,
    VectorIndex, VectorIndexError,
};

// Lifecycle
pub use importance::{base_importance, decay, detect_trigger_words, reinforce, AccessMeta};
pub use maintenance::{
    BackfillReport, CorpusStats, EmbeddingBackfill, HealthReport, MaintenanceReport,
    MaintenanceRunner,
};

// Resilience
pub use resilience::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerState, BreakerStatus, CircuitBreaker,
};

// Graph, triggers, routing, sharing
pub use graph::{Direction, GraphError, GraphStats, MemoryRelationship, RelationKind, RelationshipGraph};
pub use prospective::{
    ProspectiveTrigger, TriggerCondition, TriggerContext, TriggerError, TriggerKind,
    TriggerManager, TriggerStatus,
};
pub use energy::{EnergyAwareLoader, SortKey, TimeWindow, TIME_WINDOWS};
pub use persona::{record_persona, PersonaFilter};
pub use sharing::{
    CrossProjectSharer, ShareOutcome, ShareResult, SharedInsight, SharingError, SharingStats,
};

// Derived pipelines
pub use consolidation::{
    extract_learnings, ConsolidationOutcome, SessionConsolidator, SessionLearning, SessionQuality,
};
pub use freshness::{FreshnessReviewer, ReviewAction, ReviewOutcome, StaleMemory};
pub use outcomes::{
    categorize_decision, DecisionRegretLoop, OutcomeError, RegretSummary, RegretWarning,
};

// Diagnostics and adapters
pub use adapters::{GuardedLlm, LlmClient, LlmError, Notifier, StdoutNotifier};
pub use selftest::{CheckResult, SelfTest, SelfTestReport};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model (all-MiniLM-L6-v2, 384 dimensions)
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        EngineConfig, HybridOptions, HybridSearcher, ListFilter, MemoryRecord, NewRecord,
        RecordPatch, RecordStatus, RecordStore, Runtime, Scope, StoreError,
    };

    pub use crate::{Embedder, EmbeddingCache, EmbeddingError, VectorIndex};

    pub use crate::{
        BreakerRegistry, CircuitBreaker, CrossProjectSharer, DecisionRegretLoop,
        EmbeddingBackfill, EnergyAwareLoader, FreshnessReviewer, MaintenanceRunner,
        PersonaFilter, RelationshipGraph, SelfTest, SessionConsolidator, TriggerManager,
    };
}
