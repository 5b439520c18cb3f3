//! Decision outcome loop
//!
//! Records decisions and their outcomes, then warns proactively before a
//! regretted call is repeated: fuzzy keyword matching against historical
//! decisions, coarse categorization for broader pattern matching, and
//! summary statistics.

use chrono::Utc;
use rusqlite::params;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::storage::pool::{ConnectionPool, PoolError};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Decision loop error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum OutcomeError {
    /// Pool checkout failure
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Decision loop result type
pub type Result<T> = std::result::Result<T, OutcomeError>;

// ============================================================================
// CATEGORIES
// ============================================================================

/// A category of decisions for fuzzy pattern matching.
#[derive(Debug, Clone)]
pub struct DecisionCategory {
    /// Category name
    pub category: &'static str,
    /// Keywords any of which places a decision in this category
    pub keywords: &'static [&'static str],
}

impl DecisionCategory {
    /// Whether `text` matches any keyword in this category.
    pub fn matches(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords.iter().any(|kw| lower.contains(kw))
    }
}

/// Default categories for common business and engineering decisions.
pub const DEFAULT_CATEGORIES: [DecisionCategory; 8] = [
    DecisionCategory {
        category: "tooling",
        keywords: &["framework", "library", "tool", "plugin", "package", "sdk", "react", "vue", "angular"],
    },
    DecisionCategory {
        category: "process",
        keywords: &["review", "skip", "bypass", "shortcut", "workaround", "hack", "defer", "postpone"],
    },
    DecisionCategory {
        category: "timeline",
        keywords: &["delay", "rush", "deadline", "launch", "ship", "push back", "extend"],
    },
    DecisionCategory {
        category: "hiring",
        keywords: &["hire", "recruit", "candidate", "contractor", "freelancer", "team"],
    },
    DecisionCategory {
        category: "pricing",
        keywords: &["price", "discount", "rate", "cost", "fee", "charge", "quote"],
    },
    DecisionCategory {
        category: "scope",
        keywords: &["scope", "feature", "requirement", "add", "remove", "cut", "expand"],
    },
    DecisionCategory {
        category: "communication",
        keywords: &["email", "call", "meeting", "message", "follow up", "respond"],
    },
    DecisionCategory {
        category: "delegation",
        keywords: &["delegate", "assign", "outsource", "hand off", "take on"],
    },
];

/// Categorize a decision against the default categories.
pub fn categorize_decision(text: &str) -> Option<&'static str> {
    DEFAULT_CATEGORIES
        .iter()
        .find(|c| c.matches(text))
        .map(|c| c.category)
}

// ============================================================================
// TYPES
// ============================================================================

/// Warning about a potentially regrettable decision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegretWarning {
    /// The decision being considered
    pub decision: String,
    /// How many similar decisions exist in history
    pub total_occurrences: usize,
    /// How many of those were regretted
    pub regret_count: usize,
    /// regret_count / total_occurrences
    pub regret_rate: f64,
    /// A previously recorded bad outcome, when one exists
    pub worst_outcome: Option<String>,
    /// The best alternative recorded alongside a regret
    pub alternative_suggested: Option<String>,
}

impl RegretWarning {
    /// True when at least half of the similar decisions were regretted.
    pub fn is_high_risk(&self) -> bool {
        self.regret_rate >= 0.5
    }

    /// Human-readable warning text.
    pub fn format(&self) -> String {
        let mut lines = vec![format!(
            "Regret warning: You've made this call {} times. {} times you regretted it ({:.0}% regret rate).",
            self.total_occurrences,
            self.regret_count,
            self.regret_rate * 100.0
        )];
        if let Some(alternative) = &self.alternative_suggested {
            lines.push(format!("  Consider instead: {alternative}"));
        }
        if let Some(worst) = &self.worst_outcome {
            lines.push(format!("  Previous bad outcome: {worst}"));
        }
        lines.join("\n")
    }
}

/// Summary statistics about decision regrets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegretSummary {
    /// Decisions recorded
    pub total_decisions: usize,
    /// Decisions marked regretted
    pub total_regrets: usize,
    /// total_regrets / total_decisions
    pub regret_rate: f64,
    /// Most frequently regretted decision texts with their counts
    pub top_regretted: Vec<(String, usize)>,
}

// ============================================================================
// LOOP
// ============================================================================

/// Decision history with proactive regret warnings.
pub struct DecisionRegretLoop {
    pool: Arc<ConnectionPool>,
    /// Minimum similar past decisions before warning.
    pub min_occurrences: usize,
    /// Minimum regret rate before warning.
    pub min_regret_rate: f64,
}

impl DecisionRegretLoop {
    /// Open the loop over `pool`'s database, creating tables as needed.
    pub fn new(pool: Arc<ConnectionPool>) -> Result<Self> {
        {
            let conn = pool.checkout()?;
            crate::storage::migrations::apply_migrations(&conn)?;
        }
        Ok(Self {
            pool,
            min_occurrences: 2,
            min_regret_rate: 0.5,
        })
    }

    /// Record a decision as it is made. Returns the decision id.
    pub fn record_decision(&self, decision_content: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO decision_outcomes (id, decision_content, category, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                decision_content,
                categorize_decision(decision_content),
                Utc::now().timestamp()
            ],
        )?;
        Ok(id)
    }

    /// Record how a decision turned out.
    pub fn record_outcome(
        &self,
        decision_id: &str,
        outcome: &str,
        regret_detected: bool,
        alternative: Option<&str>,
    ) -> Result<()> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "UPDATE decision_outcomes
             SET outcome = ?1, regret_detected = ?2, alternative = ?3
             WHERE id = ?4",
            params![outcome, regret_detected as i64, alternative, decision_id],
        )?;
        Ok(())
    }

    /// Check a decision being considered against historical regret
    /// patterns. Returns a warning when enough similar decisions exist
    /// and enough of them were regretted.
    pub fn check_decision(&self, decision_text: &str) -> Result<Option<RegretWarning>> {
        let keywords = extract_keywords(decision_text);
        if keywords.is_empty() {
            return Ok(None);
        }

        let clauses = vec!["decision_content LIKE ?"; keywords.len()].join(" OR ");
        let sql = format!(
            "SELECT decision_content, outcome, regret_detected, alternative
             FROM decision_outcomes
             WHERE {clauses}
             ORDER BY created_at DESC"
        );

        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(&sql)?;
        let patterns: Vec<String> = keywords.iter().map(|k| format!("%{k}%")).collect();
        let rows: Vec<(String, Option<String>, bool, Option<String>)> = stmt
            .query_map(rusqlite::params_from_iter(patterns.iter()), |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get::<_, i64>(2)? != 0,
                    row.get(3)?,
                ))
            })?
            .collect::<rusqlite::Result<_>>()?;

        if rows.len() < self.min_occurrences {
            return Ok(None);
        }

        let total = rows.len();
        let regrets = rows.iter().filter(|(_, _, regret, _)| *regret).count();
        let regret_rate = regrets as f64 / total as f64;
        if regret_rate < self.min_regret_rate {
            return Ok(None);
        }

        let alternative_suggested = rows
            .iter()
            .find(|(_, _, regret, alternative)| *regret && alternative.is_some())
            .and_then(|(_, _, _, alternative)| alternative.clone());
        let worst_outcome = rows
            .iter()
            .find(|(_, outcome, _, _)| outcome.as_deref() == Some("bad"))
            .map(|(content, _, _, _)| content.clone());

        Ok(Some(RegretWarning {
            decision: decision_text.to_string(),
            total_occurrences: total,
            regret_count: regrets,
            regret_rate: (regret_rate * 100.0).round() / 100.0,
            worst_outcome,
            alternative_suggested,
        }))
    }

    /// Summary statistics for dashboards.
    pub fn summary(&self) -> Result<RegretSummary> {
        let conn = self.pool.checkout()?;
        let (total, regrets): (usize, usize) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN regret_detected THEN 1 ELSE 0 END), 0)
             FROM decision_outcomes",
            [],
            |r| {
                Ok((
                    r.get::<_, i64>(0)? as usize,
                    r.get::<_, i64>(1)? as usize,
                ))
            },
        )?;

        let mut stmt = conn.prepare(
            "SELECT decision_content, COUNT(*) AS count
             FROM decision_outcomes
             WHERE regret_detected = 1
             GROUP BY decision_content
             ORDER BY count DESC
             LIMIT 5",
        )?;
        let top_regretted: Vec<(String, usize)> = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<_>>()?;

        Ok(RegretSummary {
            total_decisions: total,
            total_regrets: regrets,
            regret_rate: if total > 0 {
                ((regrets as f64 / total as f64) * 100.0).round() / 100.0
            } else {
                0.0
            },
            top_regretted,
        })
    }
}

// Common stop words filtered out during keyword extraction.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "can", "shall",
    "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "about", "like",
    "through", "after", "before", "between", "out", "up", "down", "if", "or", "and", "but",
    "not", "no", "so", "than", "too", "very", "just", "that", "this", "it", "its", "my", "we",
    "our", "let", "us", "me", "i", "you", "he", "she", "they", "them", "what", "which", "who",
    "when", "where", "how", "all", "each", "every", "both", "few", "more", "some", "any",
    "most", "other", "new", "old", "also",
];

/// Extract up to five significant keywords for fuzzy matching.
fn extract_keywords(text: &str) -> Vec<String> {
    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| w.len() >= 3 && !stop.contains(w))
    {
        if seen.insert(word.to_string()) {
            keywords.push(word.to_string());
            if keywords.len() == 5 {
                break;
            }
        }
    }
    keywords
}

// ============================================================================
// TESTS
// ============================================================================
