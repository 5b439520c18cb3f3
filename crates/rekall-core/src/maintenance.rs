//! Daily memory maintenance
//!
//! Decay, archival, stats, and health checks over the record corpus,
//! plus the embedding backfill job with its freshness gate. Maintenance
//! never aborts on a per-record failure: errors are counted and the run
//! continues.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::embeddings::EmbeddingCache;
use crate::importance;
use crate::storage::records::{ListFilter, RecordPatch, RecordStore};

// ============================================================================
// REPORT TYPES
// ============================================================================

/// Corpus statistics collected for dashboards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusStats {
    /// Active memory count
    pub total_memories: usize,
    /// Memories with importance >= 0.8
    pub high_importance_count: usize,
    /// Mean importance across active memories
    pub avg_importance: f64,
    /// Per-project memory counts
    pub project_breakdown: HashMap<String, usize>,
    /// Tag usage counts
    pub tag_distribution: HashMap<String, usize>,
}

/// Health check over the record directory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Whether the memory directory exists and is readable
    pub memory_dir_accessible: bool,
    /// The directory checked
    pub memory_dir: String,
    /// Record files found
    pub memory_file_count: usize,
    /// Files that failed to parse
    pub corrupted_files: usize,
}

/// Result of one maintenance run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    /// When the run started
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration
    pub duration_ms: f64,
    /// Records whose importance changed
    pub decay_count: usize,
    /// Records archived for low importance
    pub archived_count: usize,
    /// Per-record failures skipped during decay/archival
    pub error_count: usize,
    /// Corpus statistics
    pub stats: CorpusStats,
    /// Directory health
    pub health: HealthReport,
}

/// Result of an embedding backfill run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    /// Embeddings newly computed
    pub computed: usize,
    /// Records skipped (already embedded, or empty content)
    pub skipped: usize,
    /// Records that failed to embed
    pub errors: usize,
    /// Active records considered
    pub total: usize,
    /// Wall-clock duration
    pub duration_ms: f64,
}

// ============================================================================
// MAINTENANCE RUNNER
// ============================================================================

/// Daily maintenance: decay application, low-importance archival, stats
/// collection, health checks.
pub struct MaintenanceRunner {
    store: Arc<RecordStore>,
    decay_rate: f64,
    low_importance_threshold: f64,
}

impl MaintenanceRunner {
    /// Create a runner over `store` with the given lifecycle tunables.
    pub fn new(store: Arc<RecordStore>, decay_rate: f64, low_importance_threshold: f64) -> Self {
        Self {
            store,
            decay_rate,
            low_importance_threshold,
        }
    }

    /// Run the complete maintenance pipeline. `dry_run` skips the decay
    /// and archival writes but always computes stats and health.
    pub fn run(&self, dry_run: bool) -> MaintenanceReport {
        let start = Instant::now();
        let timestamp = Utc::now();
        let mut error_count = 0;

        let (decay_count, archived_count) = if dry_run {
            (0, 0)
        } else {
            let decayed = self.apply_decay(&mut error_count);
            let archived = self.archive_low_importance(&mut error_count);
            (decayed, archived)
        };

        let stats = self.collect_stats();
        let health = self.health_check();

        let report = MaintenanceReport {
            timestamp,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            decay_count,
            archived_count,
            error_count,
            stats,
            health,
        };
        tracing::info!(
            "Maintenance complete: {} decayed, {} archived, {} errors",
            report.decay_count,
            report.archived_count,
            report.error_count
        );
        report
    }

    /// Apply decay to every active record based on days since last
    /// update. Writes back only when the value changes at f32 precision,
    /// so a same-day rerun is a no-op.
    fn apply_decay(&self, error_count: &mut usize) -> usize {
        let records = match self.store.list(&ListFilter::default()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Decay pass could not list records: {e}");
                *error_count += 1;
                return 0;
            }
        };

        let now = Utc::now();
        let mut decayed = 0;
        for record in records {
            let days = record.days_since_update(now);
            if days <= 0 {
                continue;
            }
            let new_importance =
                importance::decay_with_rate(record.importance, days, self.decay_rate);
            if (new_importance as f32) == (record.importance as f32) {
                continue;
            }
            match self.store.update(
                &record.id,
                RecordPatch {
                    importance: Some(new_importance),
                    ..Default::default()
                },
            ) {
                Ok(_) => decayed += 1,
                Err(e) => {
                    tracing::warn!("Decay failed for {}: {e}", record.id);
                    *error_count += 1;
                }
            }
        }
        decayed
    }

    /// Archive active records below the importance threshold.
    fn archive_low_importance(&self, error_count: &mut usize) -> usize {
        let records = match self.store.list(&ListFilter::default()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Archive pass could not list records: {e}");
                *error_count += 1;
                return 0;
            }
        };

        let mut archived = 0;
        for record in records {
            if record.importance >= self.low_importance_threshold {
                continue;
            }
            match self.store.archive(&record.id, Some("below importance threshold")) {
                Ok(_) => archived += 1,
                Err(e) => {
                    tracing::warn!("Archive failed for {}: {e}", record.id);
                    *error_count += 1;
                }
            }
        }
        archived
    }

    /// Collect corpus statistics over active records.
    pub fn collect_stats(&self) -> CorpusStats {
        let records = self.store.list(&ListFilter::default()).unwrap_or_default();
        if records.is_empty() {
            return CorpusStats {
                total_memories: 0,
                high_importance_count: 0,
                avg_importance: 0.0,
                project_breakdown: HashMap::new(),
                tag_distribution: HashMap::new(),
            };
        }

        let total = records.len();
        let high = records.iter().filter(|r| r.importance >= 0.8).count();
        let avg = records.iter().map(|r| r.importance).sum::<f64>() / total as f64;

        let mut projects: HashMap<String, usize> = HashMap::new();
        let mut tags: HashMap<String, usize> = HashMap::new();
        for record in &records {
            *projects.entry(record.project_id.clone()).or_default() += 1;
            for tag in &record.tags {
                *tags.entry(tag.clone()).or_default() += 1;
            }
        }

        CorpusStats {
            total_memories: total,
            high_importance_count: high,
            avg_importance: (avg * 1000.0).round() / 1000.0,
            project_breakdown: projects,
            tag_distribution: tags,
        }
    }

    /// Check directory accessibility and count corrupt record files.
    pub fn health_check(&self) -> HealthReport {
        let dir = self.store.memory_dir();
        let accessible = dir.exists() && dir.is_dir();
        if !accessible {
            return HealthReport {
                memory_dir_accessible: false,
                memory_dir: dir.display().to_string(),
                memory_file_count: 0,
                corrupted_files: 0,
            };
        }

        let (files, corrupt) = self.store.corruption_scan().unwrap_or((0, 0));
        HealthReport {
            memory_dir_accessible: true,
            memory_dir: dir.display().to_string(),
            memory_file_count: files,
            corrupted_files: corrupt,
        }
    }
}

// ============================================================================
// EMBEDDING BACKFILL
// ============================================================================

/// Pre-computes embeddings for active records that don't have one yet.
/// Complements [`MaintenanceRunner`] (which handles decay and archival).
pub struct EmbeddingBackfill {
    store: Arc<RecordStore>,
    cache: Arc<EmbeddingCache>,
}

impl EmbeddingBackfill {
    /// Create a backfill job over `store` and `cache`.
    pub fn new(store: Arc<RecordStore>, cache: Arc<EmbeddingCache>) -> Self {
        Self { store, cache }
    }

    /// Embed every active record whose content hash is not yet stored.
    pub fn run(&self) -> BackfillReport {
        let start = Instant::now();
        let mut computed = 0;
        let mut skipped = 0;
        let mut errors = 0;

        let records = match self.store.list(&ListFilter::default()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Backfill could not list records: {e}");
                return BackfillReport {
                    computed: 0,
                    skipped: 0,
                    errors: 1,
                    total: 0,
                    duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                };
            }
        };
        let total = records.len();

        for record in records {
            if record.content.trim().is_empty() {
                skipped += 1;
                continue;
            }
            match self.cache.has(&record.content_hash) {
                Ok(true) => {
                    skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Backfill lookup failed for {}: {e}", record.id);
                    errors += 1;
                    continue;
                }
            }
            match self.cache.embed(&record.content) {
                Ok(_) => computed += 1,
                Err(e) => {
                    tracing::warn!("Backfill embed failed for {}: {e}", record.id);
                    errors += 1;
                }
            }
        }

        let report = BackfillReport {
            computed,
            skipped,
            errors,
            total,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        tracing::info!(
            "Embedding backfill complete: {} computed, {} skipped, {} errors",
            report.computed,
            report.skipped,
            report.errors
        );
        report
    }

    /// Cheap freshness gate: stale when the newest record is newer than
    /// the newest embedding access. No records at all counts as fresh;
    /// records without any embeddings counts as stale.
    pub fn is_stale(&self) -> bool {
        let records = match self.store.list(&ListFilter::default()) {
            Ok(r) => r,
            Err(_) => return true,
        };
        if records.is_empty() {
            return false;
        }

        let newest_record = match records.iter().map(|r| r.created_at).max() {
            Some(t) => t,
            None => return false,
        };

        let stats = match self.cache.stats() {
            Ok(s) => s,
            Err(_) => return true,
        };
        let newest_access = match stats.newest_accessed_at {
            Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(t) => t.with_timezone(&Utc),
                Err(_) => return true,
            },
            None => return true,
        };

        newest_record > newest_access
    }

    /// Run only when the freshness gate reports stale.
    pub fn run_if_stale(&self) -> Option<BackfillReport> {
        if self.is_stale() {
            Some(self.run())
        } else {
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
