//! Importance scoring engine
//!
//! Importance scores (0.0-1.0) built from:
//! - Base importance from content signals
//! - Decay over time (0.99^days)
//! - Reinforcement from access (+15% with 0.95 cap)
//! - Trigger word detection for boost
//!
//! All arithmetic runs in `f64` so repeated decay/reinforcement cycles
//! don't drift; persisted values are f32-compatible decimals.

use chrono::{DateTime, Utc};

/// Daily decay rate.
pub const DEFAULT_DECAY_RATE: f64 = 0.99;

/// Reinforcement multiplier applied on access.
pub const REINFORCEMENT_FACTOR: f64 = 1.15;

/// Ceiling for reinforced importance; leaves headroom for future growth.
pub const REINFORCEMENT_CAP: f64 = 0.95;

/// Words that mark a memory as high-signal when present.
pub const TRIGGER_WORDS: [&str; 23] = [
    // Urgency
    "critical",
    "urgent",
    "breaking",
    "production",
    "broken",
    "failed",
    // Patterns
    "pattern",
    "across",
    "multiple",
    "clients",
    "projects",
    "universal",
    // Impact
    "mistake",
    "error",
    "failure",
    "success",
    "win",
    "breakthrough",
    // Learning markers
    "learned",
    "discovered",
    "realized",
    "insight",
    "revelation",
];

/// Weighted keyword signals for base importance.
const IMPORTANCE_SIGNALS: [(&str, f64); 10] = [
    ("critical", 0.3),
    ("urgent", 0.25),
    ("breaking", 0.25),
    ("production", 0.2),
    ("pattern", 0.15),
    ("across", 0.1),
    ("clients", 0.1),
    ("mistake", 0.15),
    ("failed", 0.15),
    ("success", 0.1),
];

/// Access metadata consulted by the full scoring pipeline.
#[derive(Debug, Clone)]
pub struct AccessMeta {
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last accessed
    pub last_accessed: DateTime<Utc>,
    /// How many times the memory has been accessed
    pub access_count: u32,
}

/// Calculate base importance from content signals.
///
/// Returns a score in [0.3, 1.0] built from keyword signals, content
/// length, and emphasis markers (exclamations, ALL-CAPS words, multiple
/// sentences).
pub fn base_importance(content: &str) -> f64 {
    if content.is_empty() {
        return 0.3;
    }

    let mut score = 0.5;
    let content_lower = content.to_lowercase();

    for (keyword, weight) in IMPORTANCE_SIGNALS {
        if content_lower.contains(keyword) {
            score += weight;
        }
    }

    // Length bonus: substantial content is more likely to matter.
    let word_count = content.split_whitespace().count();
    if word_count > 100 {
        score += 0.2;
    } else if word_count > 50 {
        score += 0.1;
    }

    // Emphasis markers
    if content.contains('!') {
        score += 0.05;
    }
    let caps_words = content
        .split_whitespace()
        .filter(|w| w.len() > 2 && w.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()))
        .filter(|w| w.chars().any(|c| c.is_alphabetic()))
        .count();
    if caps_words > 0 {
        score += (caps_words as f64 * 0.05).min(0.1);
    }

    // Multiple sentences indicate structured thought.
    let sentence_count = content.matches(['.', '!', '?']).count();
    if sentence_count > 2 {
        score += 0.05;
    }

    score.clamp(0.3, 1.0)
}

/// Apply decay: `importance * rate^days`. Negative day counts are treated
/// as zero; the result never goes below 0.
pub fn decay_with_rate(importance: f64, days_since: i64, rate: f64) -> f64 {
    let days = days_since.max(0);
    (importance * rate.powi(days as i32)).max(0.0)
}

/// Apply the default daily decay (0.99^days).
pub fn decay(importance: f64, days_since: i64) -> f64 {
    decay_with_rate(importance, days_since, DEFAULT_DECAY_RATE)
}

/// Apply reinforcement with an explicit factor and cap.
pub fn reinforce_with(importance: f64, factor: f64, cap: f64) -> f64 {
    (importance * factor).min(cap)
}

/// Apply the default reinforcement: +15% capped at 0.95.
pub fn reinforce(importance: f64) -> f64 {
    reinforce_with(importance, REINFORCEMENT_FACTOR, REINFORCEMENT_CAP)
}

/// Detect trigger words in content, case-insensitively. Returns distinct
/// matches preserving the casing of their first occurrence.
pub fn detect_trigger_words(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }

    let mut detected: Vec<String> = Vec::new();
    for word in content.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let lower = word.to_lowercase();
        if TRIGGER_WORDS.contains(&lower.as_str())
            && !detected.iter().any(|d| d.to_lowercase() == lower)
        {
            detected.push(word.to_string());
        }
    }
    detected
}

/// Complete importance scoring pipeline: base score, decay by days since
/// last access, reinforcement when recently or repeatedly accessed, then
/// a trigger word boost (+5% per distinct word, capped at +20%).
pub fn importance_score(content: &str, meta: &AccessMeta, now: DateTime<Utc>) -> f64 {
    let base = base_importance(content);

    let days_since_access = (now - meta.last_accessed).num_days().max(0);
    let mut score = decay(base, days_since_access);

    if days_since_access == 0 || meta.access_count > 1 {
        score = reinforce(score);
    }

    let triggers = detect_trigger_words(content);
    if !triggers.is_empty() {
        let boost = (triggers.len() as f64 * 0.05).min(0.2);
        score = (score + boost).min(1.0);
    }

    score
}

// ============================================================================
// TESTS
// ============================================================================
