//! Session consolidation
//!
//! Extracts durable learnings from conversation text using pattern
//! detection, scores importance, deduplicates against the existing
//! corpus, and saves survivors through the record store. Saved learnings
//! are embedded through the cache and scanned for prospective triggers,
//! so ingestion feeds the whole retrieval stack.
//!
//! Session file discovery and transcript parsing stay outside the
//! engine; callers hand in plain conversation text.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::sync::{Arc, OnceLock};

use crate::embeddings::{EmbeddingCache, EmbeddingError};
use crate::importance;
use crate::prospective::TriggerManager;
use crate::storage::records::{ListFilter, NewRecord, RecordStore, StoreError};

/// Conversations shorter than this are considered trivial.
const MIN_CONVERSATION_CHARS: usize = 50;

/// Word-overlap ratio above which two texts count as duplicates.
const DUPLICATE_OVERLAP: f64 = 0.7;

/// A learning extracted from a session, not yet persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLearning {
    /// The learning text
    pub content: String,
    /// Derived importance
    pub importance: f64,
}

/// Quality metrics for a consolidated session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuality {
    /// Learnings extracted
    pub total_memories: usize,
    /// Learnings with importance >= 0.7
    pub high_value_count: usize,
    /// Share of high-value learnings (0 when nothing was extracted)
    pub quality_score: f64,
}

/// Result of one consolidation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationOutcome {
    /// Learnings extracted from the conversation
    pub memories_extracted: usize,
    /// Learnings saved as new records
    pub memories_saved: usize,
    /// Learnings dropped as duplicates of existing records
    pub memories_deduplicated: usize,
    /// Session quality metrics
    pub session_quality: SessionQuality,
}

// ============================================================================
// EXTRACTION PATTERNS
// ============================================================================

fn learning_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?:learned|discovered|realized|found out|noticed) that ([^.!?]+[.!?])",
            r"(?:key insight|important to note|worth remembering):? ([^.!?]+[.!?])",
            r"(?:pattern|trend) (?:I noticed|observed|saw):? ([^.!?]+[.!?])",
        ]
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("learning pattern is valid")
        })
        .collect()
    })
}

fn correction_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"user:.*?(?:actually|correction|no,|wrong|mistake|should be|meant to say) ([^.!?]+[.!?])",
            r"user:.*?(?:better way|instead try|prefer) ([^.!?]+[.!?])",
        ]
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .dot_matches_new_line(true)
                .build()
                .expect("correction pattern is valid")
        })
        .collect()
    })
}

fn problem_solution_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        RegexBuilder::new(
            r"(?:problem|issue|challenge):.*?([^.!?]+[.!?]).*?(?:solution|fix|approach):.*?([^.!?]+[.!?])",
        )
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("problem/solution pattern is valid")
    })
}

fn assistant_insight_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        RegexBuilder::new(r"assistant:.*?([A-Z][^.!?]{30,}[.!?])")
            .dot_matches_new_line(true)
            .build()
            .expect("insight pattern is valid")
    })
}

/// Throwaway phrasing that marks a response as conversational filler.
const TRIVIAL_PHRASES: [&str; 6] = ["let me", "i'll", "here's", "sure", "okay", "got it"];

/// Phrasing that marks a response as actual guidance worth keeping.
const INSIGHT_INDICATORS: [&str; 18] = [
    "better to",
    "key is",
    "important",
    "pattern",
    "approach",
    "when you",
    "if you",
    "works well",
    "effective",
    "i've found",
    "rather than",
    "instead of",
    "acknowledge",
    "reframe",
    "ask",
    "often hide",
    "surface",
    "recommend",
];

/// Extract learnings from conversation text. Fast, deterministic, no
/// model calls.
pub fn extract_learnings(conversation: &str) -> Vec<SessionLearning> {
    let mut learnings = Vec::new();
    if conversation.len() < MIN_CONVERSATION_CHARS {
        return learnings;
    }

    // Explicit learning statements
    for pattern in learning_patterns() {
        for caps in pattern.captures_iter(conversation) {
            let content = caps[1].trim().to_string();
            if content.len() > 20 {
                let score = importance::base_importance(&content);
                if score >= 0.5 {
                    learnings.push(SessionLearning {
                        content,
                        importance: score,
                    });
                }
            }
        }
    }

    // User corrections carry strong signal: boost importance.
    for pattern in correction_patterns() {
        for caps in pattern.captures_iter(conversation) {
            let content = caps[1].trim().to_string();
            if content.len() > 15 {
                let boosted = (importance::base_importance(&content) * 1.2).min(0.95);
                learnings.push(SessionLearning {
                    content: format!("Correction: {content}"),
                    importance: boosted,
                });
            }
        }
    }

    // Problem/solution pairs
    for caps in problem_solution_pattern().captures_iter(conversation) {
        let problem = caps[1].trim();
        let solution = caps[2].trim();
        if problem.len() > 10 && solution.len() > 10 {
            let content = format!("Problem: {problem} Solution: {solution}");
            let score = importance::base_importance(&content);
            if score >= 0.6 {
                learnings.push(SessionLearning {
                    content,
                    importance: score,
                });
            }
        }
    }

    // Substantial assistant guidance, capped per session
    let mut insight_count = 0;
    for caps in assistant_insight_pattern().captures_iter(conversation) {
        if insight_count >= 3 {
            break;
        }
        let insight = caps[1].trim().to_string();
        let lower = insight.to_lowercase();
        if TRIVIAL_PHRASES.iter().any(|p| lower.contains(p)) {
            continue;
        }
        if !INSIGHT_INDICATORS.iter().any(|p| lower.contains(p)) {
            continue;
        }
        let score = importance::base_importance(&insight);
        if score >= 0.5 {
            learnings.push(SessionLearning {
                content: insight,
                importance: score,
            });
            insight_count += 1;
        }
    }

    learnings
}

fn normalized_words(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

/// Whether two texts overlap enough to count as duplicates. Checks both
/// directions so a short paraphrase of a longer memory is caught.
pub fn is_duplicate(a: &str, b: &str) -> bool {
    let words_a = normalized_words(a);
    let words_b = normalized_words(b);
    if words_a.is_empty() || words_b.is_empty() {
        return false;
    }
    let overlap = words_a.intersection(&words_b).count() as f64;
    overlap / words_a.len() as f64 >= DUPLICATE_OVERLAP
        || overlap / words_b.len() as f64 >= DUPLICATE_OVERLAP
}

// ============================================================================
// CONSOLIDATOR
// ============================================================================

/// Extracts and consolidates memories from session conversations.
pub struct SessionConsolidator {
    store: Arc<RecordStore>,
    cache: Option<Arc<EmbeddingCache>>,
    triggers: Option<Arc<TriggerManager>>,
    project_id: String,
}

impl SessionConsolidator {
    /// Create a consolidator writing into `project_id`.
    pub fn new(store: Arc<RecordStore>, project_id: impl Into<String>) -> Self {
        Self {
            store,
            cache: None,
            triggers: None,
            project_id: project_id.into(),
        }
    }

    /// Also embed saved learnings through `cache`.
    pub fn with_embeddings(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Also scan saved learnings for prospective triggers.
    pub fn with_triggers(mut self, triggers: Arc<TriggerManager>) -> Self {
        self.triggers = Some(triggers);
        self
    }

    /// Drop learnings that duplicate existing records in this project.
    pub fn deduplicate(&self, learnings: Vec<SessionLearning>) -> Result<Vec<SessionLearning>, StoreError> {
        let existing = self.store.list(&ListFilter {
            project_id: Some(self.project_id.clone()),
            ..Default::default()
        })?;

        Ok(learnings
            .into_iter()
            .filter(|learning| {
                !existing
                    .iter()
                    .any(|record| is_duplicate(&learning.content, &record.content))
            })
            .collect())
    }

    /// Full pipeline: extract, deduplicate, save, embed, scan for
    /// triggers. Per-learning embedding and trigger failures are logged
    /// and skipped.
    pub fn consolidate(
        &self,
        conversation: &str,
        session_id: Option<&str>,
    ) -> Result<ConsolidationOutcome, StoreError> {
        let extracted = extract_learnings(conversation);
        let extracted_count = extracted.len();

        let unique = self.deduplicate(extracted)?;
        let deduplicated = extracted_count - unique.len();

        let mut saved = 0;
        let mut high_value = 0;
        for learning in &unique {
            if learning.importance >= 0.7 {
                high_value += 1;
            }
            let record = self.store.create(NewRecord {
                content: learning.content.clone(),
                project_id: self.project_id.clone(),
                importance: Some(learning.importance),
                tags: vec!["#learning".to_string()],
                session_id: session_id.map(String::from),
                ..Default::default()
            })?;
            saved += 1;

            if let Some(cache) = &self.cache {
                match cache.embed(&record.content) {
                    Ok(_) => {}
                    Err(EmbeddingError::Unavailable(_)) => {}
                    Err(e) => tracing::warn!("Embedding failed for {}: {e}", record.id),
                }
            }
            if let Some(triggers) = &self.triggers {
                if let Err(e) = triggers.extract(&record.content, &record.id) {
                    tracing::warn!("Trigger extraction failed for {}: {e}", record.id);
                }
            }
        }

        let quality_score = if unique.is_empty() {
            0.0
        } else {
            high_value as f64 / unique.len() as f64
        };

        Ok(ConsolidationOutcome {
            memories_extracted: extracted_count,
            memories_saved: saved,
            memories_deduplicated: deduplicated,
            session_quality: SessionQuality {
                total_memories: unique.len(),
                high_value_count: high_value,
                quality_score,
            },
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::test_util::MockEmbedder;
    use crate::storage::pool::ConnectionPool;
    use std::time::Duration;

    #[test]
    fn test_extract_learning_statements() {
        let text = "We learned that production deploys fail on Fridays without a checklist. \
                    Key insight: clients respond faster to bullet points.";
        let learnings = extract_learnings(text);
        assert_eq!(learnings.len(), 2);
        assert!(learnings[0].content.contains("production deploys"));
        assert!(learnings[1].content.contains("bullet points"));
    }

    #[test]
    fn test_extract_corrections_boosted_and_prefixed() {
        let text = "user: actually the invoice cadence should be monthly not weekly for retainer clients.";
        let learnings = extract_learnings(text);
        assert_eq!(learnings.len(), 1);
        assert!(learnings[0].content.starts_with("Correction: "));
        let base = importance::base_importance(
            learnings[0].content.trim_start_matches("Correction: "),
        );
        assert!((learnings[0].importance - (base * 1.2).min(0.95)).abs() < 1e-9);
    }

    #[test]
    fn test_extract_problem_solution_pair() {
        let text = "Problem: the staging database kept drifting from production schema over weeks. \
                    Solution: run the migration diff check in CI before every merge to main.";
        let learnings = extract_learnings(text);
        assert!(learnings
            .iter()
            .any(|l| l.content.starts_with("Problem: ") && l.content.contains("Solution: ")));
    }

    #[test]
    fn test_assistant_insights_filtered_and_capped() {
        let text = "assistant: Sure thing, happy to help with whatever you need today friend. \
                    assistant: The key is to batch similar client requests into a single weekly review block. \
                    assistant: Rather than emailing each stakeholder, a shared decision log works well for alignment. \
                    assistant: When you see scope creep, it is better to reprice early than renegotiate late. \
                    assistant: If you track regret patterns, pricing mistakes surface within two client cycles.";
        let learnings = extract_learnings(text);
        // Filler filtered, cap of 3 applied.
        assert!(learnings.len() <= 3);
        assert!(!learnings.iter().any(|l| l.content.to_lowercase().contains("sure thing")));
    }

    #[test]
    fn test_short_conversation_skipped() {
        assert!(extract_learnings("learned that x.").is_empty());
    }

    #[test]
    fn test_is_duplicate_overlap() {
        assert!(is_duplicate(
            "clients respond faster to bullet points",
            "we know clients respond faster to bullet points already"
        ));
        assert!(!is_duplicate(
            "clients respond faster to bullet points",
            "the deploy pipeline needs a rollback stage"
        ));
        assert!(!is_duplicate("", "anything"));
    }

    #[test]
    fn test_consolidate_saves_embeds_and_extracts_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordStore::new(dir.path().join("memories")).unwrap());
        let pool = ConnectionPool::new(dir.path().join("test.db"), 5, Duration::from_secs(5));
        let cache = Arc::new(
            EmbeddingCache::new(Arc::clone(&pool), Arc::new(MockEmbedder), 100).unwrap(),
        );
        let triggers = Arc::new(TriggerManager::new(pool).unwrap());

        let consolidator = SessionConsolidator::new(Arc::clone(&store), "LFI")
            .with_embeddings(Arc::clone(&cache))
            .with_triggers(Arc::clone(&triggers));

        let text = "We learned that the critical production cutover needs a rehearsal first. \
                    Remember to schedule the cutover rehearsal tomorrow.";
        let outcome = consolidator.consolidate(text, Some("sess-1")).unwrap();

        assert_eq!(outcome.memories_saved, 1);
        assert_eq!(outcome.session_quality.total_memories, 1);

        let records = store.list(&ListFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].tags.contains(&"#learning".to_string()));
        assert_eq!(records[0].session_id.as_deref(), Some("sess-1"));

        // Embedded through the cache
        assert!(cache.has(&records[0].content_hash).unwrap());

        // Second pass dedups against the saved record.
        let again = consolidator.consolidate(text, Some("sess-2")).unwrap();
        assert_eq!(again.memories_saved, 0);
        assert_eq!(again.memories_deduplicated, 1);
    }
}
