//! Prospective memory triggers
//!
//! Event/topic/time-based memory surfacing: memories carry "trigger
//! conditions" - future events or contexts that should cause them to
//! resurface.
//!
//! - **Event-based:** surface when a session involves a given project
//! - **Topic-based:** remind when a topic comes up in conversation
//! - **Time-based:** flag after a date
//!
//! Triggers are extracted from conversation content via intent phrases
//! like "next time", "remember to", "don't forget", "when we get to".
//! Captures that cannot be classified into a usable condition are
//! silently skipped.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::{Regex, RegexBuilder};
use rusqlite::params;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::OnceLock;

use crate::storage::pool::{ConnectionPool, PoolError};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Trigger manager error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// Pool checkout failure
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Trigger manager result type
pub type Result<T> = std::result::Result<T, TriggerError>;

// ============================================================================
// TYPES
// ============================================================================

/// Trigger kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Fires when a session involves a matching project
    Event,
    /// Fires on keyword overlap with the session
    Topic,
    /// Fires once a date is reached
    Time,
}

impl TriggerKind {
    /// String form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Event => "event",
            TriggerKind::Topic => "topic",
            TriggerKind::Time => "time",
        }
    }

    /// Parse from the stored string form.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "event" => Some(TriggerKind::Event),
            "topic" => Some(TriggerKind::Topic),
            "time" => Some(TriggerKind::Time),
            _ => None,
        }
    }
}

/// Trigger lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerStatus {
    /// Waiting for its condition
    Pending,
    /// Condition met and surfaced
    Fired,
    /// Dismissed by the user
    Dismissed,
    /// Aged out without firing
    Expired,
}

impl TriggerStatus {
    /// String form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerStatus::Pending => "pending",
            TriggerStatus::Fired => "fired",
            TriggerStatus::Dismissed => "dismissed",
            TriggerStatus::Expired => "expired",
        }
    }

    /// Parse from the stored string form, defaulting to pending.
    pub fn parse_name(s: &str) -> Self {
        match s {
            "fired" => TriggerStatus::Fired,
            "dismissed" => TriggerStatus::Dismissed,
            "expired" => TriggerStatus::Expired,
            _ => TriggerStatus::Pending,
        }
    }
}

/// The matching criteria attached to a trigger, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum TriggerCondition {
    /// Fire once the session date reaches `after_date`
    Time {
        /// Date gate (inclusive)
        after_date: NaiveDate,
    },
    /// Fire when the session project matches or keywords overlap
    Event {
        /// Referenced project, when one was named
        project: Option<String>,
        /// Stopword-filtered keywords
        keywords: Vec<String>,
    },
    /// Fire on any keyword overlap
    Topic {
        /// Stopword-filtered keywords
        keywords: Vec<String>,
    },
}

impl TriggerCondition {
    fn to_json(&self) -> serde_json::Value {
        match self {
            TriggerCondition::Time { after_date } => {
                json!({ "after_date": after_date.format("%Y-%m-%d").to_string() })
            }
            TriggerCondition::Event { project, keywords } => match project {
                Some(p) => json!({ "project": p, "keywords": keywords }),
                None => json!({ "keywords": keywords }),
            },
            TriggerCondition::Topic { keywords } => json!({ "keywords": keywords }),
        }
    }

    fn from_json(kind: TriggerKind, value: &serde_json::Value) -> Option<Self> {
        let keywords = || -> Vec<String> {
            value
                .get("keywords")
                .and_then(|k| k.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default()
        };
        match kind {
            TriggerKind::Time => {
                let date = value.get("after_date")?.as_str()?;
                Some(TriggerCondition::Time {
                    after_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?,
                })
            }
            TriggerKind::Event => Some(TriggerCondition::Event {
                project: value
                    .get("project")
                    .and_then(|p| p.as_str())
                    .map(|p| p.to_string()),
                keywords: keywords(),
            }),
            TriggerKind::Topic => Some(TriggerCondition::Topic { keywords: keywords() }),
        }
    }
}

/// A single prospective trigger attached to a memory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProspectiveTrigger {
    /// Row id
    pub trigger_id: i64,
    /// The memory this trigger surfaces
    pub memory_id: String,
    /// Trigger kind
    pub kind: TriggerKind,
    /// Matching criteria
    pub condition: TriggerCondition,
    /// Lifecycle status
    pub status: TriggerStatus,
    /// When the trigger was extracted
    pub created_at: DateTime<Utc>,
    /// When it fired, if it has
    pub fired_at: Option<DateTime<Utc>>,
}

/// Current session context checked against pending triggers.
#[derive(Debug, Clone, Default)]
pub struct TriggerContext {
    /// Active project name
    pub project: Option<String>,
    /// Keywords from the current session
    pub keywords: Vec<String>,
    /// Today's date
    pub current_date: Option<NaiveDate>,
}

// ============================================================================
// PATTERNS
// ============================================================================

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "to", "of", "in", "on", "at", "for", "and", "or", "but", "is", "it",
    "be", "do", "we", "i", "you", "he", "she", "they", "this", "that", "with", "from", "as",
    "by", "not", "if", "so", "up", "out", "my", "our", "your", "its", "was", "are", "has",
    "had", "have", "will", "can", "should", "would", "could", "also", "just", "about", "me",
    "us", "them", "been", "did", "does", "done", "get", "got", "make", "than", "then", "when",
    "what", "which", "who", "how", "all", "each", "no", "any", "some", "more", "most", "very",
];

const TIME_KEYWORDS: &[&str] = &[
    "tomorrow", "next week", "next month", "next year", "monday", "tuesday", "wednesday",
    "thursday", "friday", "saturday", "sunday", "january", "february", "march", "april", "may",
    "june", "july", "august", "september", "october", "november", "december",
];

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

fn intent_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"next time (?:we |I |you )?(.+?)(?:\.|$)",
            r"remember to (.+?)(?:\.|$)",
            r"don'?t forget (?:to )?(.+?)(?:\.|$)",
            r"when we (?:get to|start|work on) (.+?)(?:\.|$)",
            r"note for (?:when|next|future) (.+?)(?:\.|$)",
            r"TODO:? (.+?)(?:\.|$)",
        ]
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("intent pattern is valid")
        })
        .collect()
    })
}

fn keyword_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[a-zA-Z][a-zA-Z0-9_-]*").expect("valid"))
}

fn project_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:project|repo|repository|codebase|app|application)\s+(\S+)").expect("valid")
    })
}

fn month_day_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2})",
        )
        .expect("valid")
    })
}

fn iso_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("valid"))
}

fn may_as_month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // "may" only counts as a month name, not the modal verb.
    PATTERN
        .get_or_init(|| Regex::new(r"(?:in|by|before|until|after)\s+may\b|\bmay\s+\d{1,2}\b").expect("valid"))
}

/// Extract meaningful keywords from text, filtering stopwords.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
    keyword_pattern()
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|w| w.len() > 1 && !stopwords.contains(w.as_str()))
        .collect()
}

/// Try to resolve a relative or named date phrase. Returns `None` when
/// nothing date-like is present.
fn parse_relative_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = text.to_lowercase();

    if lower.contains("tomorrow") {
        return Some(today + Duration::days(1));
    }
    if lower.contains("next week") {
        return Some(today + Duration::days(7));
    }
    if lower.contains("next month") {
        return Some(today + Duration::days(30));
    }
    if lower.contains("next year") {
        return Some(today + Duration::days(365));
    }

    if let Some(caps) = month_day_pattern().captures(&lower) {
        let month = MONTHS
            .iter()
            .find(|(name, _)| *name == &caps[1])
            .map(|(_, n)| *n)?;
        let day: u32 = caps[2].parse().ok()?;
        if let Some(mut target) = NaiveDate::from_ymd_opt(today.year(), month, day) {
            if target < today {
                target = NaiveDate::from_ymd_opt(today.year() + 1, month, day)?;
            }
            return Some(target);
        }
        return None;
    }

    if let Some(caps) = iso_date_pattern().captures(text) {
        return NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok();
    }

    None
}

/// Classify captured intent text into a trigger kind and condition.
/// Order: time first, then project references, then topic.
pub fn classify_trigger(text: &str, today: NaiveDate) -> (TriggerKind, TriggerCondition) {
    if let Some(after_date) = parse_relative_date(text, today) {
        return (TriggerKind::Time, TriggerCondition::Time { after_date });
    }

    let lower = text.to_lowercase();
    for kw in TIME_KEYWORDS {
        if lower.contains(kw) {
            if *kw == "may" && !may_as_month_pattern().is_match(&lower) {
                continue;
            }
            // Time keyword without a parseable date: best-effort gate a
            // week out.
            return (
                TriggerKind::Time,
                TriggerCondition::Time {
                    after_date: today + Duration::days(7),
                },
            );
        }
    }

    if let Some(caps) = project_pattern().captures(&lower) {
        return (
            TriggerKind::Event,
            TriggerCondition::Event {
                project: Some(caps[1].to_string()),
                keywords: extract_keywords(text),
            },
        );
    }

    (
        TriggerKind::Topic,
        TriggerCondition::Topic {
            keywords: extract_keywords(text),
        },
    )
}

// ============================================================================
// MANAGER
// ============================================================================

/// Manages prospective triggers: extraction, storage, matching, and
/// lifecycle (fire, dismiss, expire).
pub struct TriggerManager {
    pool: Arc<ConnectionPool>,
}

impl TriggerManager {
    /// Open the manager over `pool`'s database, creating tables as needed.
    pub fn new(pool: Arc<ConnectionPool>) -> Result<Self> {
        {
            let conn = pool.checkout()?;
            crate::storage::migrations::apply_migrations(&conn)?;
        }
        Ok(Self { pool })
    }

    /// Scan `text` for intent phrases and persist a trigger for each
    /// classifiable capture, associated with `memory_id`.
    pub fn extract(&self, text: &str, memory_id: &str) -> Result<Vec<ProspectiveTrigger>> {
        let now = Utc::now();
        let today = now.date_naive();
        let mut created = Vec::new();

        let conn = self.pool.checkout()?;
        for pattern in intent_patterns() {
            for caps in pattern.captures_iter(text) {
                let captured = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
                if captured.is_empty() {
                    continue;
                }

                let (kind, condition) = classify_trigger(captured, today);

                // Nothing to match on: skip silently.
                let usable = match &condition {
                    TriggerCondition::Time { .. } => true,
                    TriggerCondition::Event { keywords, .. } => !keywords.is_empty(),
                    TriggerCondition::Topic { keywords } => !keywords.is_empty(),
                };
                if !usable {
                    continue;
                }

                conn.execute(
                    "INSERT INTO prospective_triggers
                     (memory_id, trigger_type, condition, status, created_at)
                     VALUES (?1, ?2, ?3, 'pending', ?4)",
                    params![
                        memory_id,
                        kind.as_str(),
                        condition.to_json().to_string(),
                        now.to_rfc3339()
                    ],
                )?;
                let trigger_id = conn.last_insert_rowid();

                created.push(ProspectiveTrigger {
                    trigger_id,
                    memory_id: memory_id.to_string(),
                    kind,
                    condition,
                    status: TriggerStatus::Pending,
                    created_at: now,
                    fired_at: None,
                });
            }
        }

        Ok(created)
    }

    /// Check pending triggers against the current session context and
    /// return those whose condition subsumes it.
    pub fn check(&self, context: &TriggerContext) -> Result<Vec<ProspectiveTrigger>> {
        let pending = self.load_by_status(TriggerStatus::Pending, None)?;
        Ok(pending
            .into_iter()
            .filter(|t| trigger_matches(t, context))
            .collect())
    }

    /// Mark a trigger fired with the current timestamp.
    pub fn fire(&self, trigger_id: i64) -> Result<()> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "UPDATE prospective_triggers SET status = 'fired', fired_at = ?1 WHERE trigger_id = ?2",
            params![Utc::now().to_rfc3339(), trigger_id],
        )?;
        Ok(())
    }

    /// Mark a trigger dismissed by the user.
    pub fn dismiss(&self, trigger_id: i64) -> Result<()> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "UPDATE prospective_triggers SET status = 'dismissed' WHERE trigger_id = ?1",
            params![trigger_id],
        )?;
        Ok(())
    }

    /// Expire pending triggers older than `max_age_days`. Fired and
    /// dismissed triggers are left untouched. Returns the count expired.
    pub fn expire(&self, max_age_days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(max_age_days)).to_rfc3339();
        let conn = self.pool.checkout()?;
        let changed = conn.execute(
            "UPDATE prospective_triggers SET status = 'expired'
             WHERE status = 'pending' AND created_at < ?1",
            params![cutoff],
        )?;
        Ok(changed)
    }

    /// Pending triggers, oldest first, capped at `limit`.
    pub fn pending(&self, limit: usize) -> Result<Vec<ProspectiveTrigger>> {
        self.load_by_status(TriggerStatus::Pending, Some(limit))
    }

    fn load_by_status(
        &self,
        status: TriggerStatus,
        limit: Option<usize>,
    ) -> Result<Vec<ProspectiveTrigger>> {
        let conn = self.pool.checkout()?;
        let sql = format!(
            "SELECT trigger_id, memory_id, trigger_type, condition, status, created_at, fired_at
             FROM prospective_triggers WHERE status = ?1 ORDER BY created_at ASC{}",
            match limit {
                Some(n) => format!(" LIMIT {n}"),
                None => String::new(),
            }
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([status.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut triggers = Vec::new();
        for row in rows {
            let (trigger_id, memory_id, kind_str, condition_raw, status_str, created_raw, fired_raw) =
                row?;
            let kind = match TriggerKind::parse_name(&kind_str) {
                Some(k) => k,
                None => continue,
            };
            let condition_json: serde_json::Value = match serde_json::from_str(&condition_raw) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let condition = match TriggerCondition::from_json(kind, &condition_json) {
                Some(c) => c,
                None => continue,
            };
            triggers.push(ProspectiveTrigger {
                trigger_id,
                memory_id,
                kind,
                condition,
                status: TriggerStatus::parse_name(&status_str),
                created_at: DateTime::parse_from_rfc3339(&created_raw)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                fired_at: fired_raw
                    .and_then(|f| DateTime::parse_from_rfc3339(&f).ok())
                    .map(|d| d.with_timezone(&Utc)),
            });
        }
        Ok(triggers)
    }
}

fn keywords_overlap(condition_keywords: &[String], context_keywords: &[String]) -> bool {
    if condition_keywords.is_empty() || context_keywords.is_empty() {
        return false;
    }
    let cond: HashSet<String> = condition_keywords.iter().map(|k| k.to_lowercase()).collect();
    context_keywords
        .iter()
        .any(|k| cond.contains(&k.to_lowercase()))
}

fn trigger_matches(trigger: &ProspectiveTrigger, context: &TriggerContext) -> bool {
    match &trigger.condition {
        TriggerCondition::Time { after_date } => match context.current_date {
            Some(current) => current >= *after_date,
            None => false,
        },
        TriggerCondition::Event { project, keywords } => {
            if let (Some(cond_project), Some(ctx_project)) = (project, &context.project) {
                if cond_project.eq_ignore_ascii_case(ctx_project) {
                    return true;
                }
            }
            keywords_overlap(keywords, &context.keywords)
        }
        TriggerCondition::Topic { keywords } => keywords_overlap(keywords, &context.keywords),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn temp_manager() -> (tempfile::TempDir, TriggerManager) {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::new(dir.path().join("test.db"), 5, StdDuration::from_secs(5));
        let manager = TriggerManager::new(pool).unwrap();
        (dir, manager)
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn test_extract_keywords_filters_stopwords() {
        let keywords = extract_keywords("check the deploy pipeline for us");
        assert_eq!(keywords, vec!["check", "deploy", "pipeline"]);
    }

    #[test]
    fn test_classify_tomorrow_as_time() {
        let (kind, condition) = classify_trigger("check the deploy pipeline tomorrow", today());
        assert_eq!(kind, TriggerKind::Time);
        assert_eq!(
            condition,
            TriggerCondition::Time {
                after_date: today() + Duration::days(1)
            }
        );
    }

    #[test]
    fn test_classify_relative_phrases() {
        for (phrase, days) in [("next week", 7), ("next month", 30), ("next year", 365)] {
            let (kind, condition) = classify_trigger(&format!("review plans {phrase}"), today());
            assert_eq!(kind, TriggerKind::Time);
            assert_eq!(
                condition,
                TriggerCondition::Time {
                    after_date: today() + Duration::days(days)
                }
            );
        }
    }

    #[test]
    fn test_classify_iso_date() {
        let (kind, condition) = classify_trigger("ship the report by 2030-06-15", today());
        assert_eq!(kind, TriggerKind::Time);
        assert_eq!(
            condition,
            TriggerCondition::Time {
                after_date: NaiveDate::from_ymd_opt(2030, 6, 15).unwrap()
            }
        );
    }

    #[test]
    fn test_classify_month_day_rolls_forward() {
        let (kind, condition) = classify_trigger("revisit pricing on March 1", today());
        assert_eq!(kind, TriggerKind::Time);
        match condition {
            TriggerCondition::Time { after_date } => assert!(after_date >= today()),
            other => panic!("expected time condition, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_weekday_falls_back_a_week() {
        let (kind, condition) = classify_trigger("follow up on friday", today());
        assert_eq!(kind, TriggerKind::Time);
        assert_eq!(
            condition,
            TriggerCondition::Time {
                after_date: today() + Duration::days(7)
            }
        );
    }

    #[test]
    fn test_may_modal_verb_not_a_month() {
        let (kind, _) = classify_trigger("we may want to refactor the parser", today());
        assert_eq!(kind, TriggerKind::Topic);
    }

    #[test]
    fn test_classify_project_reference_as_event() {
        let (kind, condition) = classify_trigger("migrate the database in project phoenix", today());
        assert_eq!(kind, TriggerKind::Event);
        match condition {
            TriggerCondition::Event { project, keywords } => {
                assert_eq!(project.as_deref(), Some("phoenix"));
                assert!(keywords.contains(&"migrate".to_string()));
            }
            other => panic!("expected event condition, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_default_topic() {
        let (kind, condition) = classify_trigger("tighten the backup strategy", today());
        assert_eq!(kind, TriggerKind::Topic);
        match condition {
            TriggerCondition::Topic { keywords } => {
                assert!(keywords.contains(&"backup".to_string()));
            }
            other => panic!("expected topic condition, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_creates_trigger_and_matches_context() {
        let (_dir, manager) = temp_manager();
        let triggers = manager
            .extract("remember to check the deploy pipeline tomorrow", "mem-1")
            .unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::Time);
        assert_eq!(triggers[0].memory_id, "mem-1");

        // Matches once tomorrow arrives
        let matched = manager
            .check(&TriggerContext {
                current_date: Some(today() + Duration::days(1)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(matched.len(), 1);

        // Keyword-only context does not match a time trigger
        let unmatched = manager
            .check(&TriggerContext {
                keywords: vec!["cooking".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert!(unmatched.is_empty());
    }

    #[test]
    fn test_extract_multiple_patterns() {
        let (_dir, manager) = temp_manager();
        let text = "Don't forget to renew the certificates. TODO: archive old invoices. \
                    Next time we review pricing tiers.";
        let triggers = manager.extract(text, "mem-2").unwrap();
        assert_eq!(triggers.len(), 3);
        assert!(triggers.iter().all(|t| t.status == TriggerStatus::Pending));
    }

    #[test]
    fn test_extract_skips_stopword_only_captures() {
        let (_dir, manager) = temp_manager();
        // "do it" reduces to nothing after stopword filtering.
        let triggers = manager.extract("remember to do it", "mem-3").unwrap();
        assert!(triggers.is_empty());
    }

    #[test]
    fn test_topic_trigger_keyword_overlap() {
        let (_dir, manager) = temp_manager();
        manager
            .extract("next time we discuss the onboarding funnel", "mem-4")
            .unwrap();

        let matched = manager
            .check(&TriggerContext {
                keywords: vec!["funnel".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(matched.len(), 1);

        let unmatched = manager
            .check(&TriggerContext {
                keywords: vec!["unrelated".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert!(unmatched.is_empty());
    }

    #[test]
    fn test_event_trigger_project_match_case_insensitive() {
        let (_dir, manager) = temp_manager();
        manager
            .extract("when we get to project Phoenix migrate the queue", "mem-5")
            .unwrap();

        let matched = manager
            .check(&TriggerContext {
                project: Some("PHOENIX".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].kind, TriggerKind::Event);
    }

    #[test]
    fn test_fire_and_dismiss_lifecycle() {
        let (_dir, manager) = temp_manager();
        let triggers = manager
            .extract("remember to rotate the api keys tomorrow", "mem-6")
            .unwrap();
        let id = triggers[0].trigger_id;

        manager.fire(id).unwrap();
        assert!(manager.pending(20).unwrap().is_empty());

        // Fired triggers no longer match
        let matched = manager
            .check(&TriggerContext {
                current_date: Some(today() + Duration::days(2)),
                ..Default::default()
            })
            .unwrap();
        assert!(matched.is_empty());

        let more = manager
            .extract("remember to water the plants tomorrow", "mem-7")
            .unwrap();
        manager.dismiss(more[0].trigger_id).unwrap();
        assert!(manager.pending(20).unwrap().is_empty());
    }

    #[test]
    fn test_expire_only_old_pending() {
        let (_dir, manager) = temp_manager();
        let triggers = manager
            .extract("remember to reconcile the ledger tomorrow", "mem-8")
            .unwrap();

        // Fresh trigger survives a 90-day expiry pass.
        assert_eq!(manager.expire(90).unwrap(), 0);

        // Backdate it, then expire.
        {
            let conn = manager.pool.checkout().unwrap();
            let old = (Utc::now() - Duration::days(120)).to_rfc3339();
            conn.execute(
                "UPDATE prospective_triggers SET created_at = ?1 WHERE trigger_id = ?2",
                params![old, triggers[0].trigger_id],
            )
            .unwrap();
        }
        assert_eq!(manager.expire(90).unwrap(), 1);
        assert!(manager.pending(20).unwrap().is_empty());
    }

    #[test]
    fn test_condition_json_roundtrip() {
        let event = TriggerCondition::Event {
            project: Some("phoenix".to_string()),
            keywords: vec!["migrate".to_string()],
        };
        let parsed =
            TriggerCondition::from_json(TriggerKind::Event, &event.to_json()).unwrap();
        assert_eq!(parsed, event);

        let time = TriggerCondition::Time {
            after_date: NaiveDate::from_ymd_opt(2030, 3, 1).unwrap(),
        };
        let parsed = TriggerCondition::from_json(TriggerKind::Time, &time.to_json()).unwrap();
        assert_eq!(parsed, time);
    }
}
