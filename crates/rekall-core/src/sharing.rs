//! Cross-project sharing
//!
//! Shares memory insights between projects with deduplication (unique on
//! memory and target), per-project enable/disable controls, and sharing
//! statistics. Backed by the relational state database through the pool.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::storage::pool::{ConnectionPool, PoolError};
use crate::storage::records::MemoryRecord;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Sharing error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SharingError {
    /// Pool checkout failure
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Sharing result type
pub type Result<T> = std::result::Result<T, SharingError>;

// ============================================================================
// TYPES
// ============================================================================

/// Why a share attempt did or didn't land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareOutcome {
    /// Insight stored
    Success,
    /// This memory was already shared to this target
    Duplicate,
    /// The target project has sharing disabled
    SharingDisabled,
}

/// Result of a share attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResult {
    /// Whether the insight was stored
    pub shared: bool,
    /// Id of the stored insight, when shared
    pub id: Option<String>,
    /// Outcome classification
    pub reason: ShareOutcome,
}

/// An insight shared into a project.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedInsight {
    /// Insight id
    pub id: String,
    /// Project the memory came from
    pub source_project: String,
    /// Project the insight was shared to
    pub target_project: String,
    /// The shared memory's id
    pub memory_id: String,
    /// Snapshot of the memory content at share time
    pub memory_content: String,
    /// Relevance of the insight to the target (0.0-1.0)
    pub relevance_score: f64,
    /// When the share happened
    pub created_at: DateTime<Utc>,
    /// Insight status (`active` unless retired)
    pub status: String,
}

/// Sharing statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingStats {
    /// Total insights shared
    pub total_shared: usize,
    /// Insight counts by source project
    pub by_source_project: HashMap<String, usize>,
    /// Insight counts by target project
    pub by_target_project: HashMap<String, usize>,
    /// Mean relevance across all insights
    pub avg_relevance: f64,
}

// ============================================================================
// SHARER
// ============================================================================

/// Persistent cross-project memory sharing.
pub struct CrossProjectSharer {
    pool: Arc<ConnectionPool>,
}

impl CrossProjectSharer {
    /// Open the sharer over `pool`'s database, creating tables as needed.
    pub fn new(pool: Arc<ConnectionPool>) -> Result<Self> {
        {
            let conn = pool.checkout()?;
            crate::storage::migrations::apply_migrations(&conn)?;
        }
        Ok(Self { pool })
    }

    /// Share a memory insight to another project.
    ///
    /// Checks the target's sharing flag (enabled by default) and
    /// deduplicates on `(memory_id, target_project)`.
    pub fn share(
        &self,
        memory: &MemoryRecord,
        target_project: &str,
        relevance_score: f64,
    ) -> Result<ShareResult> {
        if !self.is_sharing_enabled(target_project)? {
            return Ok(ShareResult {
                shared: false,
                id: None,
                reason: ShareOutcome::SharingDisabled,
            });
        }

        let insight_id = Uuid::new_v4().to_string();
        let conn = self.pool.checkout()?;
        let inserted = conn.execute(
            "INSERT INTO shared_insights
             (id, source_project, target_project, memory_id, memory_content,
              relevance_score, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active')",
            params![
                insight_id,
                memory.project_id,
                target_project,
                memory.id,
                memory.content,
                relevance_score.clamp(0.0, 1.0),
                Utc::now().timestamp()
            ],
        );

        match inserted {
            Ok(_) => Ok(ShareResult {
                shared: true,
                id: Some(insight_id),
                reason: ShareOutcome::Success,
            }),
            Err(e) if is_unique_violation(&e) => Ok(ShareResult {
                shared: false,
                id: None,
                reason: ShareOutcome::Duplicate,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// All active insights shared TO `project_id`, newest first. Empty
    /// when the project has sharing disabled.
    pub fn get_shared(&self, project_id: &str) -> Result<Vec<SharedInsight>> {
        if !self.is_sharing_enabled(project_id)? {
            return Ok(Vec::new());
        }

        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_project, target_project, memory_id, memory_content,
                    relevance_score, created_at, status
             FROM shared_insights
             WHERE target_project = ?1 AND status = 'active'
             ORDER BY created_at DESC",
        )?;
        let insights = stmt
            .query_map([project_id], |row| {
                let created: i64 = row.get(6)?;
                Ok(SharedInsight {
                    id: row.get(0)?,
                    source_project: row.get(1)?,
                    target_project: row.get(2)?,
                    memory_id: row.get(3)?,
                    memory_content: row.get(4)?,
                    relevance_score: row.get(5)?,
                    created_at: DateTime::from_timestamp(created, 0).unwrap_or_else(Utc::now),
                    status: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(insights)
    }

    /// Enable or disable sharing for a project.
    pub fn set_sharing_enabled(&self, project_id: &str, enabled: bool) -> Result<()> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO project_sharing_config (project_id, share_enabled, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(project_id)
             DO UPDATE SET share_enabled = excluded.share_enabled,
                           updated_at = excluded.updated_at",
            params![project_id, enabled as i64, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Whether sharing is enabled for a project. Projects without a
    /// configuration row default to enabled.
    pub fn is_sharing_enabled(&self, project_id: &str) -> Result<bool> {
        let conn = self.pool.checkout()?;
        let enabled: Option<i64> = conn
            .query_row(
                "SELECT share_enabled FROM project_sharing_config WHERE project_id = ?1",
                [project_id],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(enabled.map(|v| v != 0).unwrap_or(true))
    }

    /// Sharing statistics across all insights.
    pub fn stats(&self) -> Result<SharingStats> {
        let conn = self.pool.checkout()?;

        let total: usize = conn.query_row("SELECT COUNT(*) FROM shared_insights", [], |r| {
            r.get::<_, i64>(0).map(|v| v as usize)
        })?;

        let mut by_source = HashMap::new();
        let mut stmt = conn
            .prepare("SELECT source_project, COUNT(*) FROM shared_insights GROUP BY source_project")?;
        for row in stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))? {
            let (project, count) = row?;
            by_source.insert(project, count as usize);
        }

        let mut by_target = HashMap::new();
        let mut stmt = conn
            .prepare("SELECT target_project, COUNT(*) FROM shared_insights GROUP BY target_project")?;
        for row in stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))? {
            let (project, count) = row?;
            by_target.insert(project, count as usize);
        }

        let avg_relevance: f64 = conn.query_row(
            "SELECT COALESCE(AVG(relevance_score), 0.0) FROM shared_insights",
            [],
            |r| r.get(0),
        )?;

        Ok(SharingStats {
            total_shared: total,
            by_source_project: by_source,
            by_target_project: by_target,
            avg_relevance: (avg_relevance * 10000.0).round() / 10000.0,
        })
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// TESTS
// ============================================================================
