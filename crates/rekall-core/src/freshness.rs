//! Memory freshness review
//!
//! Scans the corpus for memories that haven't been updated recently and
//! flags them for review: identification of stale memories, a review
//! queue sorted by urgency, and a notification summary. The actual
//! review actions (refresh / archive) delegate to the record store.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::adapters::Notifier;
use crate::storage::records::{ListFilter, MemoryRecord, RecordStore, StoreError};

/// Default days-without-update before a memory counts as stale.
pub const DEFAULT_STALE_DAYS: i64 = 90;

/// Only memories at or below this importance are flagged by default.
pub const DEFAULT_MAX_IMPORTANCE: f64 = 0.3;

/// A memory flagged for freshness review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleMemory {
    /// The flagged record
    pub memory: MemoryRecord,
    /// Days since the last update
    pub days_since_update: i64,
    /// Review urgency: older and less important scores higher
    pub staleness_score: f64,
}

impl StaleMemory {
    /// One-line preview for review queues.
    pub fn summary(&self) -> String {
        let preview: String = self.memory.content.chars().take(120).collect();
        format!(
            "[{}d] {}: {}",
            self.days_since_update,
            self.memory.knowledge_domain,
            preview.replace('\n', " ")
        )
    }
}

/// Outcome of applying review actions.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    /// Memories looked at
    pub reviewed: usize,
    /// Memories refreshed (timestamp reset)
    pub refreshed: usize,
    /// Memories archived
    pub archived: usize,
    /// Memories skipped
    pub skipped: usize,
}

/// Action to take on one stale memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    /// Stamp the memory as freshly reviewed
    Refresh,
    /// Archive it
    Archive,
    /// Leave it for next time
    Skip,
}

/// Freshness reviewer over a record store.
pub struct FreshnessReviewer {
    store: Arc<RecordStore>,
    /// Minimum days since update to flag.
    pub stale_days: i64,
    /// Only flag memories with importance <= this, unless
    /// `include_all_importance` is set.
    pub max_importance: f64,
    /// Ignore the importance filter entirely.
    pub include_all_importance: bool,
}

impl FreshnessReviewer {
    /// Create a reviewer with the default thresholds.
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            stale_days: DEFAULT_STALE_DAYS,
            max_importance: DEFAULT_MAX_IMPORTANCE,
            include_all_importance: false,
        }
    }

    /// Find active memories not updated in `stale_days`, sorted by
    /// staleness score descending (most urgent first).
    pub fn scan(&self) -> Result<Vec<StaleMemory>, StoreError> {
        let now = Utc::now();
        let mut stale: Vec<StaleMemory> = self
            .store
            .list(&ListFilter::default())?
            .into_iter()
            .filter_map(|memory| {
                let days = memory.days_since_update(now);
                if days < self.stale_days {
                    return None;
                }
                if !self.include_all_importance && memory.importance > self.max_importance {
                    return None;
                }
                // Older and less important -> more urgently needs review.
                let score = (days as f64 / 30.0) * (1.0 - memory.importance);
                Some(StaleMemory {
                    days_since_update: days,
                    staleness_score: score,
                    memory,
                })
            })
            .collect();

        stale.sort_by(|a, b| {
            b.staleness_score
                .partial_cmp(&a.staleness_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(stale)
    }

    /// Mark a memory as freshly reviewed (resets its update timestamp).
    pub fn refresh(&self, memory_id: &str) -> Result<MemoryRecord, StoreError> {
        self.store.touch(memory_id)
    }

    /// Archive a stale memory.
    pub fn archive(&self, memory_id: &str) -> Result<MemoryRecord, StoreError> {
        self.store.archive(memory_id, Some("stale"))
    }

    /// Apply review actions to the head of the queue.
    pub fn apply(
        &self,
        stale: &[StaleMemory],
        actions: &[(String, ReviewAction)],
    ) -> ReviewOutcome {
        let mut outcome = ReviewOutcome::default();
        for (memory_id, action) in actions {
            if !stale.iter().any(|s| &s.memory.id == memory_id) {
                continue;
            }
            outcome.reviewed += 1;
            match action {
                ReviewAction::Refresh => {
                    if self.refresh(memory_id).is_ok() {
                        outcome.refreshed += 1;
                    }
                }
                ReviewAction::Archive => {
                    if self.archive(memory_id).is_ok() {
                        outcome.archived += 1;
                    }
                }
                ReviewAction::Skip => outcome.skipped += 1,
            }
        }
        outcome
    }

    /// Human-readable summary of the review queue, capped at `max_items`
    /// entries.
    pub fn review_summary(&self, stale: &[StaleMemory], max_items: usize) -> String {
        if stale.is_empty() {
            return "All memories are fresh. Nothing to review.".to_string();
        }

        let mut lines = vec![format!("{} memories need freshness review:", stale.len())];
        for s in stale.iter().take(max_items) {
            let preview: String = s.memory.content.chars().take(60).collect();
            lines.push(format!(
                "  {}d · {} · {:.1} · {}…",
                s.days_since_update,
                s.memory.knowledge_domain,
                s.memory.importance,
                preview.replace('\n', " ").trim()
            ));
        }
        if stale.len() > max_items {
            lines.push(format!("  …and {} more", stale.len() - max_items));
        }
        lines.join("\n")
    }

    /// Send the review summary through a notifier, falling back to
    /// stdout when the transport declines. Returns whether any channel
    /// accepted it.
    pub fn notify(&self, notifier: &dyn Notifier, stale: &[StaleMemory]) -> bool {
        let summary = self.review_summary(stale, 5);
        if notifier.send("Memory freshness review", &summary) {
            return true;
        }
        tracing::warn!("Notification transport declined; falling back to stdout");
        crate::adapters::StdoutNotifier.send("Memory freshness review", &summary)
    }
}

// ============================================================================
// TESTS
// ============================================================================
