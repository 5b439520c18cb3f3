//! Engine runtime
//!
//! The root context object that owns the shared registries (connection
//! pools, circuit breakers) and the storage/embedding handles every
//! component hangs off. Nothing here is process-global: tests build
//! private runtimes over temp directories instead of resetting shared
//! state.

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{GuardedLlm, LlmClient};
use crate::config::EngineConfig;
use crate::consolidation::SessionConsolidator;
use crate::embeddings::{Embedder, EmbeddingCache, EmbeddingError};
use crate::energy::EnergyAwareLoader;
use crate::freshness::FreshnessReviewer;
use crate::graph::RelationshipGraph;
use crate::maintenance::{EmbeddingBackfill, MaintenanceRunner};
use crate::outcomes::DecisionRegretLoop;
use crate::persona::PersonaFilter;
use crate::prospective::TriggerManager;
use crate::resilience::{BreakerConfig, BreakerRegistry};
use crate::search::hybrid::{HybridOptions, HybridSearcher};
use crate::search::vector::{VectorIndex, VectorIndexError};
use crate::selftest::SelfTest;
use crate::sharing::CrossProjectSharer;
use crate::storage::pool::{ConnectionPool, PoolRegistry};
use crate::storage::records::{MemoryRecord, RecordPatch, RecordStore, StoreError};

/// Runtime construction error.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Record store could not be opened
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Embedding cache could not be opened
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Root handle over one engine instance.
pub struct Runtime {
    config: EngineConfig,
    pools: PoolRegistry,
    breakers: Arc<BreakerRegistry>,
    store: Arc<RecordStore>,
    cache: Arc<EmbeddingCache>,
    state_pool: Arc<ConnectionPool>,
}

impl Runtime {
    /// Build a runtime with an explicit embedder.
    pub fn with_embedder(
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RuntimeError> {
        let pools = PoolRegistry::new(
            config.pool_size,
            Duration::from_secs_f64(config.pool_timeout_s),
        );
        if let Some(parent) = config.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let state_pool = pools.get(&config.db_path);
        let store = Arc::new(RecordStore::new(&config.memory_dir)?);
        let cache = Arc::new(EmbeddingCache::new(
            Arc::clone(&state_pool),
            embedder,
            config.cache_max_entries,
        )?);
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig {
            failure_threshold: config.breaker_threshold,
            recovery_timeout: Duration::from_secs_f64(config.breaker_recovery_s),
        }));

        Ok(Self {
            config,
            pools,
            breakers,
            store,
            cache,
            state_pool,
        })
    }

    /// Build a runtime with the default embedder: the local model when
    /// the `embeddings` feature is enabled, otherwise a placeholder that
    /// reports unavailable (hybrid search degrades to keyword-only).
    pub fn new(config: EngineConfig) -> Result<Self, RuntimeError> {
        #[cfg(feature = "embeddings")]
        let embedder: Arc<dyn Embedder> = Arc::new(crate::embeddings::local::LocalEmbedder::new());
        #[cfg(not(feature = "embeddings"))]
        let embedder: Arc<dyn Embedder> = Arc::new(crate::embeddings::UnavailableEmbedder);

        Self::with_embedder(config, embedder)
    }

    /// The runtime configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The record store (sole writer of memory records).
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// The embedding cache.
    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// The circuit breaker registry.
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// The pool registry (for adapters with their own databases).
    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// The pool over the relational state database.
    pub fn state_pool(&self) -> &Arc<ConnectionPool> {
        &self.state_pool
    }

    // ------------------------------------------------------------------
    // Component handles
    // ------------------------------------------------------------------

    /// Hybrid searcher over the embedding cache.
    pub fn searcher(&self) -> HybridSearcher {
        HybridSearcher::new(Arc::clone(&self.cache))
    }

    /// Hybrid search options seeded from the configured weights.
    pub fn search_options(&self) -> HybridOptions {
        HybridOptions {
            semantic_weight: self.config.semantic_weight,
            bm25_weight: self.config.bm25_weight,
            ..Default::default()
        }
    }

    /// Daily maintenance runner.
    pub fn maintenance(&self) -> MaintenanceRunner {
        MaintenanceRunner::new(
            Arc::clone(&self.store),
            self.config.decay_rate,
            self.config.low_importance_threshold,
        )
    }

    /// Embedding backfill job.
    pub fn backfill(&self) -> EmbeddingBackfill {
        EmbeddingBackfill::new(Arc::clone(&self.store), Arc::clone(&self.cache))
    }

    /// Relationship graph over the state database.
    pub fn graph(&self) -> Result<RelationshipGraph, crate::graph::GraphError> {
        RelationshipGraph::new(Arc::clone(&self.state_pool))
    }

    /// Prospective trigger manager.
    pub fn triggers(&self) -> Result<TriggerManager, crate::prospective::TriggerError> {
        TriggerManager::new(Arc::clone(&self.state_pool))
    }

    /// Expire pending triggers older than the configured window.
    /// Returns the number expired.
    pub fn expire_triggers(&self) -> Result<usize, crate::prospective::TriggerError> {
        self.triggers()?.expire(self.config.trigger_expiry_days)
    }

    /// Access-time reinforcement with the configured factor and cap.
    pub fn reinforce(&self, id: &str) -> Result<MemoryRecord, StoreError> {
        let record = self.store.get(id)?;
        self.store.update(
            id,
            RecordPatch {
                importance: Some(crate::importance::reinforce_with(
                    record.importance,
                    self.config.reinforcement_factor,
                    self.config.reinforcement_cap,
                )),
                ..Default::default()
            },
        )
    }

    /// Cross-project sharer.
    pub fn sharer(&self) -> Result<CrossProjectSharer, crate::sharing::SharingError> {
        CrossProjectSharer::new(Arc::clone(&self.state_pool))
    }

    /// Decision regret loop.
    pub fn regret_loop(&self) -> Result<DecisionRegretLoop, crate::outcomes::OutcomeError> {
        DecisionRegretLoop::new(Arc::clone(&self.state_pool))
    }

    /// Persona filter with the default registry.
    pub fn persona_filter(&self) -> PersonaFilter {
        PersonaFilter::new()
    }

    /// Energy-aware loader over the record store.
    pub fn energy_loader(&self) -> EnergyAwareLoader {
        EnergyAwareLoader::new(Arc::clone(&self.store))
    }

    /// Freshness reviewer with the configured staleness window.
    pub fn freshness(&self) -> FreshnessReviewer {
        let mut reviewer = FreshnessReviewer::new(Arc::clone(&self.store));
        reviewer.stale_days = self.config.stale_days;
        reviewer
    }

    /// Session consolidator writing into `project_id`, wired to the
    /// embedding cache and trigger extraction.
    pub fn consolidator(
        &self,
        project_id: &str,
    ) -> Result<SessionConsolidator, crate::prospective::TriggerError> {
        Ok(SessionConsolidator::new(Arc::clone(&self.store), project_id)
            .with_embeddings(Arc::clone(&self.cache))
            .with_triggers(Arc::new(self.triggers()?)))
    }

    /// Open (or create) the vector index collection `name` sized to the
    /// configured embedding dimension.
    pub fn vector_index(&self, name: &str) -> Result<VectorIndex, VectorIndexError> {
        VectorIndex::open(&self.config.index_dir, name, self.config.embedding_dim)
    }

    /// Wrap an LLM client with the named breaker from this runtime's
    /// registry.
    pub fn guarded_llm(&self, name: &str, client: Arc<dyn LlmClient>) -> GuardedLlm {
        GuardedLlm::new(client, self.breakers.get(name))
    }

    /// Self-test suite over this runtime's surfaces.
    pub fn selftest(&self) -> SelfTest {
        SelfTest::new(
            &self.config.memory_dir,
            Arc::clone(&self.state_pool),
            Arc::clone(&self.breakers),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::test_util::MockEmbedder;
    use crate::storage::records::NewRecord;

    fn temp_runtime() -> (tempfile::TempDir, Runtime) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::with_root(dir.path());
        let runtime = Runtime::with_embedder(config, Arc::new(MockEmbedder)).unwrap();
        (dir, runtime)
    }

    #[test]
    fn test_runtime_wires_components() {
        let (_dir, runtime) = temp_runtime();

        let record = runtime
            .store()
            .create(NewRecord {
                content: "office setup guide".to_string(),
                project_id: "LFI".to_string(),
                ..Default::default()
            })
            .unwrap();

        let results = runtime
            .searcher()
            .search("office", &[record.clone()], &runtime.search_options())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].hybrid_score > 0.0);

        // Backfill sees the new record.
        let report = runtime.backfill().run();
        // The search above already embedded the content.
        assert_eq!(report.computed + report.skipped, 1);
    }

    #[test]
    fn test_runtime_isolated_per_instance() {
        let (_dir_a, runtime_a) = temp_runtime();
        let (_dir_b, runtime_b) = temp_runtime();

        runtime_a.breakers().get("llm").record_failure();
        assert_eq!(runtime_a.breakers().snapshot()[0].failure_count, 1);
        assert!(runtime_b.breakers().snapshot().is_empty());
    }

    #[test]
    fn test_runtime_selftest_on_fresh_instance() {
        let (_dir, runtime) = temp_runtime();
        runtime.cache().embed("warm the freshness probe").unwrap();

        let report = runtime.selftest().run_all();
        assert!(report.passed, "{report:?}");
    }

    #[test]
    fn test_vector_index_uses_configured_dimension() {
        let (_dir, runtime) = temp_runtime();
        let index = runtime.vector_index("memories").unwrap();
        assert_eq!(index.dimension(), runtime.config().embedding_dim);
    }
}
