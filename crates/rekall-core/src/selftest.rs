//! Self-test diagnostics
//!
//! A fixed battery of health probes against the storage, embedding, and
//! resilience layers:
//! - temp-file write/read round-trip
//! - required database tables present
//! - embeddings added within the last 7 days
//! - in-memory search logic produces the expected result on a fixed corpus
//! - no circuit breakers in OPEN state
//! - memory directory enumerable
//!
//! Individual probe failures are reported without stopping the suite.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::resilience::BreakerRegistry;
use crate::storage::pool::ConnectionPool;

/// Tables every healthy state database contains.
const REQUIRED_TABLES: [&str; 5] = [
    "embeddings",
    "memory_relationships",
    "prospective_triggers",
    "shared_insights",
    "decision_outcomes",
];

/// Result of one probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// Probe name
    pub name: &'static str,
    /// Whether the probe passed
    pub passed: bool,
    /// Human-readable outcome
    pub message: String,
    /// Probe duration
    pub duration_ms: f64,
}

fn check_result(name: &'static str, passed: bool, message: String, start: Instant) -> CheckResult {
    CheckResult {
        name,
        passed,
        message,
        duration_ms: (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0,
    }
}

/// Aggregate report from a full self-test run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfTestReport {
    /// True only when every probe passed
    pub passed: bool,
    /// Individual probe results, in execution order
    pub checks: Vec<CheckResult>,
    /// Wall-clock duration of the whole run
    pub total_duration_ms: f64,
    /// e.g. "6/6 checks passed"
    pub summary: String,
    /// When the run finished
    pub timestamp: DateTime<Utc>,
}

/// Diagnostic health-check suite for a runtime's storage surfaces.
pub struct SelfTest {
    memory_dir: PathBuf,
    pool: Arc<ConnectionPool>,
    breakers: Arc<BreakerRegistry>,
}

impl SelfTest {
    /// Build a suite probing `memory_dir`, `pool`'s database, and the
    /// breaker registry.
    pub fn new(
        memory_dir: impl Into<PathBuf>,
        pool: Arc<ConnectionPool>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self {
            memory_dir: memory_dir.into(),
            pool,
            breakers,
        }
    }

    /// Run all six probes and aggregate the report.
    pub fn run_all(&self) -> SelfTestReport {
        let start = Instant::now();
        let checks = vec![
            self.check_memory_readwrite(),
            self.check_db_accessible(),
            self.check_embeddings_fresh(),
            self.check_search_functional(),
            self.check_breaker_state(),
            self.check_memory_dir(),
        ];

        let passed_count = checks.iter().filter(|c| c.passed).count();
        let total = checks.len();

        SelfTestReport {
            passed: passed_count == total,
            checks,
            total_duration_ms: (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0,
            summary: format!("{passed_count}/{total} checks passed"),
            timestamp: Utc::now(),
        }
    }

    /// Render a report as human-readable text.
    pub fn report_text(report: &SelfTestReport) -> String {
        let mut lines = vec![
            "=== Rekall self-test report ===".to_string(),
            format!("Timestamp: {}", report.timestamp.to_rfc3339()),
            format!("Result: {}", report.summary),
            String::new(),
        ];
        for check in &report.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            lines.push(format!(
                "  [{status}] {}: {} ({}ms)",
                check.name, check.message, check.duration_ms
            ));
        }
        lines.push(String::new());
        lines.push(format!("Total duration: {}ms", report.total_duration_ms));
        lines.push(format!(
            "Overall: {}",
            if report.passed {
                "ALL CHECKS PASSED"
            } else {
                "SOME CHECKS FAILED"
            }
        ));
        lines.join("\n")
    }

    // ------------------------------------------------------------------
    // Individual probes
    // ------------------------------------------------------------------

    /// Write a probe file to a temp location, read it back, clean up.
    pub fn check_memory_readwrite(&self) -> CheckResult {
        let name = "memory_readwrite";
        let start = Instant::now();

        let probe_path = std::env::temp_dir().join(format!(
            "rekall-selftest-{}.md",
            uuid::Uuid::new_v4()
        ));
        let payload = "---\nid: selftest-probe\n---\nself-test OK";

        let outcome = std::fs::write(&probe_path, payload)
            .and_then(|_| std::fs::read_to_string(&probe_path));
        let _ = std::fs::remove_file(&probe_path);

        match outcome {
            Ok(readback) if readback == payload => {
                check_result(name, true, "Write and read-back OK".into(), start)
            }
            Ok(_) => check_result(name, false, "Read-back mismatch".into(), start),
            Err(e) => check_result(name, false, format!("IO error: {e}"), start),
        }
    }

    /// Verify the state database contains the expected tables.
    pub fn check_db_accessible(&self) -> CheckResult {
        let name = "db_accessible";
        let start = Instant::now();

        let conn = match self.pool.checkout() {
            Ok(c) => c,
            Err(e) => return check_result(name, false, format!("Checkout failed: {e}"), start),
        };

        let tables: Vec<String> = match conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .and_then(|mut stmt| {
                stmt.query_map([], |r| r.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()
            }) {
            Ok(t) => t,
            Err(e) => return check_result(name, false, format!("DB error: {e}"), start),
        };

        let missing: Vec<&str> = REQUIRED_TABLES
            .iter()
            .filter(|t| !tables.iter().any(|found| found == *t))
            .copied()
            .collect();

        if missing.is_empty() {
            check_result(
                name,
                true,
                format!("DB accessible, {} tables found", tables.len()),
                start,
            )
        } else {
            check_result(
                name,
                false,
                format!("Missing tables: {}", missing.join(", ")),
                start,
            )
        }
    }

    /// Check that embeddings were created within the last 7 days.
    pub fn check_embeddings_fresh(&self) -> CheckResult {
        let name = "embeddings_fresh";
        let start = Instant::now();

        let conn = match self.pool.checkout() {
            Ok(c) => c,
            Err(e) => return check_result(name, false, format!("Checkout failed: {e}"), start),
        };

        let cutoff = (Utc::now() - Duration::days(7)).to_rfc3339();
        let count: i64 = match conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE created_at > ?1",
            [cutoff],
            |r| r.get(0),
        ) {
            Ok(c) => c,
            Err(e) => return check_result(name, false, format!("DB error: {e}"), start),
        };

        if count > 0 {
            check_result(
                name,
                true,
                format!("{count} embeddings created in last 7 days"),
                start,
            )
        } else {
            check_result(
                name,
                false,
                "No embeddings created in last 7 days".into(),
                start,
            )
        }
    }

    /// Run a fixed in-memory query to verify search logic end to end.
    pub fn check_search_functional(&self) -> CheckResult {
        let name = "search_functional";
        let start = Instant::now();

        let corpus = [
            ("1", "Rust memory management techniques"),
            ("2", "JavaScript async patterns"),
            ("3", "Database indexing strategies"),
        ];
        let query = "memory";
        let results: Vec<&str> = corpus
            .iter()
            .filter(|(_, content)| content.to_lowercase().contains(query))
            .map(|(id, _)| *id)
            .collect();

        if results == ["1"] {
            check_result(name, true, "In-memory search functioning".into(), start)
        } else {
            check_result(
                name,
                false,
                format!("Search returned unexpected results: {results:?}"),
                start,
            )
        }
    }

    /// Fail when any registered breaker is OPEN. An empty registry passes.
    pub fn check_breaker_state(&self) -> CheckResult {
        let name = "circuit_breaker_state";
        let start = Instant::now();

        let open = self.breakers.open_breakers();
        if open.is_empty() {
            check_result(name, true, "No open circuit breakers".into(), start)
        } else {
            check_result(
                name,
                false,
                format!("OPEN circuit breakers: {}", open.join(", ")),
                start,
            )
        }
    }

    /// Verify the memory directory exists and is enumerable.
    pub fn check_memory_dir(&self) -> CheckResult {
        let name = "memory_dir";
        let start = Instant::now();

        if !self.memory_dir.is_dir() {
            return check_result(
                name,
                false,
                format!("Memory directory not found: {}", self.memory_dir.display()),
                start,
            );
        }

        match std::fs::read_dir(&self.memory_dir) {
            Ok(entries) => {
                let count = entries.flatten().count();
                check_result(name, true, format!("{count} entries found"), start)
            }
            Err(e) => check_result(name, false, format!("Cannot enumerate: {e}"), start),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
