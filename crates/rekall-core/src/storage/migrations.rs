//! Database Migrations
//!
//! Versioned schema for the relational state file: embeddings,
//! relationships, prospective triggers, shared insights, decision
//! outcomes, and persisted circuit breaker state.

use rusqlite::Connection;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Embeddings, relationships, triggers",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Cross-project sharing",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Decision outcomes and breaker state",
        up: MIGRATION_V3_UP,
    },
];

/// V1: embedding store, relationship graph, prospective triggers
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    content_hash TEXT PRIMARY KEY,
    embedding BLOB NOT NULL,
    dimension INTEGER NOT NULL DEFAULT 384,
    model TEXT NOT NULL,
    created_at TEXT NOT NULL,
    accessed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_embeddings_accessed ON embeddings(accessed_at);

CREATE TABLE IF NOT EXISTS memory_relationships (
    id TEXT PRIMARY KEY,
    from_memory_id TEXT NOT NULL,
    to_memory_id TEXT NOT NULL,
    relationship_type TEXT NOT NULL,
    strength REAL DEFAULT 0.5,
    evidence TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE(from_memory_id, to_memory_id, relationship_type)
);

CREATE INDEX IF NOT EXISTS idx_rel_from ON memory_relationships(from_memory_id);
CREATE INDEX IF NOT EXISTS idx_rel_to ON memory_relationships(to_memory_id);
CREATE INDEX IF NOT EXISTS idx_rel_type ON memory_relationships(relationship_type);

CREATE TABLE IF NOT EXISTS prospective_triggers (
    trigger_id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL,
    trigger_type TEXT NOT NULL,
    condition TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    fired_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_triggers_status ON prospective_triggers(status);
CREATE INDEX IF NOT EXISTS idx_triggers_memory ON prospective_triggers(memory_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// V2: shared insights with per-project enable flag
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS shared_insights (
    id TEXT PRIMARY KEY,
    source_project TEXT NOT NULL,
    target_project TEXT NOT NULL,
    memory_id TEXT NOT NULL,
    memory_content TEXT NOT NULL,
    relevance_score REAL DEFAULT 0.0,
    created_at INTEGER NOT NULL,
    status TEXT DEFAULT 'active',
    UNIQUE(memory_id, target_project)
);

CREATE INDEX IF NOT EXISTS idx_shared_target ON shared_insights(target_project);
CREATE INDEX IF NOT EXISTS idx_shared_source ON shared_insights(source_project);

CREATE TABLE IF NOT EXISTS project_sharing_config (
    project_id TEXT PRIMARY KEY,
    share_enabled INTEGER DEFAULT 1,
    updated_at INTEGER NOT NULL
);
"#;

/// V3: decision outcome history and breaker state snapshots
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS decision_outcomes (
    id TEXT PRIMARY KEY,
    decision_content TEXT NOT NULL,
    category TEXT,
    outcome TEXT,
    regret_detected INTEGER NOT NULL DEFAULT 0,
    alternative TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_outcomes_regret ON decision_outcomes(regret_detected);

CREATE TABLE IF NOT EXISTS circuit_breaker_state (
    name TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    failure_count INTEGER NOT NULL DEFAULT 0,
    opened_at TEXT,
    updated_at TEXT NOT NULL
);
"#;

/// Apply any pending migrations to `conn`.
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| {
            r.get(0)
        })
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            tracing::debug!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            conn.execute(
                "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
                [migration.version],
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_and_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for expected in [
            "embeddings",
            "memory_relationships",
            "prospective_triggers",
            "shared_insights",
            "project_sharing_config",
            "decision_outcomes",
            "circuit_breaker_state",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }
}
