//! End-to-end scenarios across the engine: ingestion through retrieval,
//! lifecycle maintenance, resilience, and prospection, wired through a
//! private runtime per test.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rekall_core::prelude::*;
use rekall_core::{
    BreakerError, BreakerState, ConnectionPool, Embedder, EmbeddingError, SelfTest,
    TriggerContext, TriggerKind,
};

// ----------------------------------------------------------------------------
// Test embedders
// ----------------------------------------------------------------------------

/// Deterministic embedder: identical text embeds identically.
struct MockEmbedder;

impl Embedder for MockEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        // FNV-1a over the content seeds a deterministic unit vector.
        let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            seed ^= byte as u64;
            seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let mut vector: Vec<f32> = (0..rekall_core::EMBEDDING_DIMENSIONS)
            .map(|i| (((seed >> (i % 57)) as f32) + i as f32).sin())
            .collect();
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut vector {
            *x /= norm;
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}

/// Embedder that is permanently unavailable.
struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn encode(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("model import failed".into()))
    }

    fn model_name(&self) -> &str {
        "failing-embedder"
    }
}

fn runtime_with(embedder: Arc<dyn Embedder>) -> (tempfile::TempDir, Runtime) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::with_root(dir.path());
    let runtime = Runtime::with_embedder(config, embedder).unwrap();
    (dir, runtime)
}

fn create(runtime: &Runtime, content: &str, importance: Option<f64>) -> MemoryRecord {
    runtime
        .store()
        .create(NewRecord {
            content: content.to_string(),
            project_id: "LFI".to_string(),
            importance,
            ..Default::default()
        })
        .unwrap()
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

/// Pool reuse: 5 threads x 20 insert-commit cycles through a pool of 5,
/// zero errors, exactly 100 rows, no more than 5 connections created.
#[test]
fn scenario_pool_reuse_under_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let pool = ConnectionPool::new(dir.path().join("shared.db"), 5, Duration::from_secs(10));
    {
        let conn = pool.checkout().unwrap();
        conn.execute(
            "CREATE TABLE cycles (id INTEGER PRIMARY KEY AUTOINCREMENT, thread_id INTEGER)",
            [],
        )
        .unwrap();
    }

    let mut handles = Vec::new();
    for tid in 0..5i64 {
        let pool = Arc::clone(&pool);
        handles.push(std::thread::spawn(move || {
            for _ in 0..20 {
                let conn = pool.checkout().unwrap();
                conn.execute("INSERT INTO cycles (thread_id) VALUES (?1)", [tid])
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let conn = pool.checkout().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM cycles", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 100);
    assert!(pool.created() <= 5);
}

/// Hybrid degradation: with the embedder down, the single candidate
/// scores keyword-only and the hybrid score equals the BM25 score.
#[test]
fn scenario_hybrid_degrades_without_embedder() {
    let (_dir, runtime) = runtime_with(Arc::new(FailingEmbedder));
    let record = create(&runtime, "office setup guide", None);

    let results = runtime
        .searcher()
        .search("office", &[record], &runtime.search_options())
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].semantic_score, 0.0);
    assert!(results[0].bm25_score > 0.0);
    assert!((results[0].hybrid_score - results[0].bm25_score).abs() < 1e-12);
}

/// Decay + archive: a 200-day-old record at importance 0.25 decays to
/// ~0.033 and is archived with the #archived tag in one maintenance run.
#[test]
fn scenario_decay_and_archive() {
    let (_dir, runtime) = runtime_with(Arc::new(MockEmbedder));
    let record = create(&runtime, "an aging observation", Some(0.25));

    // Backdate the record file by 200 days.
    let path = runtime
        .config()
        .memory_dir
        .join("LFI")
        .join(format!("{}.md", record.id));
    let raw = std::fs::read_to_string(&path).unwrap();
    let old_ms = (Utc::now() - chrono::Duration::days(200)).timestamp_millis();
    let rewritten: String = raw
        .lines()
        .map(|line| {
            if line.starts_with("created: ") || line.starts_with("updated: ") {
                format!("{}: {old_ms}", line.split(':').next().unwrap())
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(&path, rewritten).unwrap();

    let report = runtime.maintenance().run(false);
    assert_eq!(report.decay_count, 1);
    assert_eq!(report.archived_count, 1);

    let archived = runtime.store().get(&record.id).unwrap();
    assert_eq!(archived.status, RecordStatus::Archived);
    assert!(archived.tags.iter().any(|t| t == "#archived"));
    assert!((archived.importance - 0.25 * 0.99f64.powi(200)).abs() < 1e-6);

    // Second run is a no-op on the unchanged corpus.
    let second = runtime.maintenance().run(false);
    assert_eq!(second.decay_count, 0);
    assert_eq!(second.archived_count, 0);
}

/// Breaker cycle: threshold 3, recovery 300ms. Three failures open the
/// breaker, the next call is rejected without invoking the function, and
/// after the recovery window a single success closes it again.
#[test]
fn scenario_breaker_cycle() {
    let (_dir, runtime) = runtime_with(Arc::new(MockEmbedder));
    let breaker = runtime.breakers().get_with(
        "llm",
        rekall_core::BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(300),
        },
    );

    for _ in 0..3 {
        let _ = breaker.call::<(), _, _>(|| Err("backend down"));
    }
    assert_eq!(breaker.state(), BreakerState::Open);

    let mut invoked = false;
    let rejected = breaker.call::<(), _, _>(|| {
        invoked = true;
        Err("backend down")
    });
    assert!(!invoked);
    assert!(matches!(rejected, Err(BreakerError::Open { .. })));

    std::thread::sleep(Duration::from_millis(400));
    breaker.call::<_, &str, _>(|| Ok("recovered")).unwrap();
    assert_eq!(breaker.state(), BreakerState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

/// Causal chain: A->B, B->C, B->D. Shortest paths found; absent targets
/// return none.
#[test]
fn scenario_causal_chain() {
    let (_dir, runtime) = runtime_with(Arc::new(MockEmbedder));
    let graph = runtime.graph().unwrap();

    for (from, to) in [("A", "B"), ("B", "C"), ("B", "D")] {
        graph
            .link(from, to, rekall_core::RelationKind::Causal, "observed", 0.7)
            .unwrap();
    }

    assert_eq!(
        graph.find_causal_chain("A", "C", 5).unwrap(),
        Some(vec!["A".into(), "B".into(), "C".into()])
    );
    assert_eq!(
        graph.find_causal_chain("A", "D", 5).unwrap(),
        Some(vec!["A".into(), "B".into(), "D".into()])
    );
    assert_eq!(graph.find_causal_chain("A", "E", 5).unwrap(), None);
}

/// Trigger matching: "remember to check the deploy pipeline tomorrow"
/// produces one time trigger that matches tomorrow's date and ignores
/// unrelated keyword contexts.
#[test]
fn scenario_trigger_extraction_and_matching() {
    let (_dir, runtime) = runtime_with(Arc::new(MockEmbedder));
    let triggers = runtime.triggers().unwrap();

    let extracted = triggers
        .extract("remember to check the deploy pipeline tomorrow", "mem-1")
        .unwrap();
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].kind, TriggerKind::Time);

    let tomorrow = Utc::now().date_naive() + chrono::Duration::days(1);
    let matched = triggers
        .check(&TriggerContext {
            current_date: Some(tomorrow),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(matched.len(), 1);

    let unmatched = triggers
        .check(&TriggerContext {
            keywords: vec!["cooking".to_string()],
            ..Default::default()
        })
        .unwrap();
    assert!(unmatched.is_empty());
}

/// Full ingestion flow: consolidation extracts a learning, saves it,
/// embeds it, the backfill is then fresh, and hybrid search finds it.
#[test]
fn scenario_ingestion_to_retrieval() {
    let (_dir, runtime) = runtime_with(Arc::new(MockEmbedder));
    let consolidator = runtime.consolidator("LFI").unwrap();

    let outcome = consolidator
        .consolidate(
            "We learned that critical production deploys need a rollback rehearsal first.",
            Some("sess-1"),
        )
        .unwrap();
    assert_eq!(outcome.memories_saved, 1);

    // Ingestion embedded the learning, so backfill has nothing to do.
    let backfill = runtime.backfill();
    assert!(!backfill.is_stale());

    let candidates = runtime.store().list(&ListFilter::default()).unwrap();
    let hits = runtime
        .searcher()
        .search("production deploys", &candidates, &runtime.search_options())
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].record.tags.contains(&"#learning".to_string()));

    // Reinforcement on access bumps importance toward the cap.
    let before = hits[0].record.importance;
    let reinforced = runtime.store().reinforce(&hits[0].record.id).unwrap();
    assert!(reinforced.importance > before || reinforced.importance >= 0.95);
}

/// Sharing dedup: the second share of the same memory to the same target
/// reports a duplicate; stats see one insight.
#[test]
fn scenario_sharing_dedup() {
    let (_dir, runtime) = runtime_with(Arc::new(MockEmbedder));
    let sharer = runtime.sharer().unwrap();
    let record = create(&runtime, "retainer clients prefer monthly invoices", None);

    let first = sharer.share(&record, "other-project", 0.8).unwrap();
    assert!(first.shared);

    let second = sharer.share(&record, "other-project", 0.8).unwrap();
    assert!(!second.shared);
    assert_eq!(second.reason, rekall_core::ShareOutcome::Duplicate);

    assert_eq!(sharer.stats().unwrap().total_shared, 1);
}

/// The self-test battery passes on a freshly exercised runtime.
#[test]
fn scenario_selftest_green() {
    let (_dir, runtime) = runtime_with(Arc::new(MockEmbedder));
    create(&runtime, "warm the corpus", None);
    runtime.cache().embed("warm the corpus").unwrap();

    let report = runtime.selftest().run_all();
    assert!(report.passed, "{}", SelfTest::report_text(&report));
}
