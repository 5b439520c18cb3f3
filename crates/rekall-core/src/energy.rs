//! Energy-aware memory loading
//!
//! Loads memories appropriate for the time of day, prioritizing
//! different tag categories per window: morning = strategy, afternoon =
//! tasks, evening = learning, night = unfiltered maintenance window.

use chrono::{Local, Timelike};
use std::sync::Arc;

use crate::storage::records::{ListFilter, MemoryRecord, RecordStore, StoreError};

/// Ranking key for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Rank by importance (plus priority-tag bonus)
    Importance,
    /// Rank by creation time, newest first
    Created,
}

/// A time-of-day window with its memory priorities.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    /// Window name: morning, afternoon, evening, night
    pub name: &'static str,
    /// Start hour (inclusive)
    pub start_hour: u32,
    /// End hour (exclusive)
    pub end_hour: u32,
    /// Tags boosted inside this window
    pub priority_tags: &'static [&'static str],
    /// Ranking key
    pub sort_key: SortKey,
}

/// Score bonus for carrying one of the window's priority tags.
const PRIORITY_TAG_BONUS: f64 = 2.0;

/// The four clock windows covering a full day.
pub const TIME_WINDOWS: [TimeWindow; 4] = [
    TimeWindow {
        name: "morning",
        start_hour: 6,
        end_hour: 12,
        priority_tags: &["#strategy", "#decision", "#framework", "#positioning", "#architecture"],
        sort_key: SortKey::Importance,
    },
    TimeWindow {
        name: "afternoon",
        start_hour: 12,
        end_hour: 18,
        priority_tags: &["#task", "#commitment", "#logistics", "#operational", "#admin"],
        sort_key: SortKey::Created,
    },
    TimeWindow {
        name: "evening",
        start_hour: 18,
        end_hour: 24,
        priority_tags: &["#learning", "#pattern", "#reflection", "#insight", "#mistake"],
        sort_key: SortKey::Importance,
    },
    TimeWindow {
        name: "night",
        start_hour: 0,
        end_hour: 6,
        priority_tags: &[],
        sort_key: SortKey::Created,
    },
];

/// Loads memories filtered and ranked by time-of-day windows.
pub struct EnergyAwareLoader {
    store: Arc<RecordStore>,
    /// Force a specific hour (0-23) instead of the wall clock.
    pub override_hour: Option<u32>,
    /// Cap on memories returned by [`load_context`](Self::load_context).
    pub max_memories: usize,
}

impl EnergyAwareLoader {
    /// Create a loader over `store` with the default cap of 20.
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            override_hour: None,
            max_memories: 20,
        }
    }

    fn current_hour(&self) -> u32 {
        self.override_hour.unwrap_or_else(|| Local::now().hour())
    }

    /// The window covering the current hour (or `override_hour`).
    pub fn current_window(&self) -> &'static TimeWindow {
        let hour = self.current_hour() % 24;
        TIME_WINDOWS
            .iter()
            .find(|w| w.start_hour <= hour && hour < w.end_hour)
            .unwrap_or(&TIME_WINDOWS[3])
    }

    /// Load active memories ranked for the current window.
    ///
    /// Night window: no filtering, newest first. Every other window:
    /// `score = importance + 2.0` when any tag matches the window's
    /// priority set, sorted descending. Capped at `max_memories`.
    pub fn load_context(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        let records = self.store.list(&ListFilter::default())?;
        let window = self.current_window();
        Ok(self.rank_for_window(records, window))
    }

    fn rank_for_window(
        &self,
        mut records: Vec<MemoryRecord>,
        window: &TimeWindow,
    ) -> Vec<MemoryRecord> {
        if records.is_empty() {
            return records;
        }

        if window.sort_key == SortKey::Created && window.priority_tags.is_empty() {
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            records.truncate(self.max_memories);
            return records;
        }

        let mut scored: Vec<(f64, MemoryRecord)> = records
            .into_iter()
            .map(|record| {
                let mut score = record.importance;
                if record
                    .tags
                    .iter()
                    .any(|tag| window.priority_tags.contains(&tag.as_str()))
                {
                    score += PRIORITY_TAG_BONUS;
                }
                (score, record)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(self.max_memories)
            .map(|(_, record)| record)
            .collect()
    }

    /// Human-readable explanation of what the current window loads.
    pub fn explain(&self) -> String {
        let window = self.current_window();
        let loaded = self.load_context().unwrap_or_default();

        let mut lines = vec![format!(
            "Time window: {} ({}:00-{}:00)",
            window.name, window.start_hour, window.end_hour
        )];

        if window.priority_tags.is_empty() {
            lines.push("Priority tags: none (unfiltered maintenance window)".to_string());
        } else {
            lines.push(format!("Priority tags: {}", window.priority_tags.join(", ")));
        }

        lines.push(format!(
            "Memories loaded: {} (max {})",
            loaded.len(),
            self.max_memories
        ));

        if !loaded.is_empty() && !window.priority_tags.is_empty() {
            let priority_count = loaded
                .iter()
                .filter(|r| {
                    r.tags
                        .iter()
                        .any(|tag| window.priority_tags.contains(&tag.as_str()))
                })
                .count();
            lines.push(format!("With priority tags: {priority_count}"));
            lines.push(format!(
                "Without priority tags: {}",
                loaded.len() - priority_count
            ));
        }

        lines.join("\n")
    }
}

// ============================================================================
// TESTS
// ============================================================================
