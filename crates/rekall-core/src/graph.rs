//! Memory Relationship Graph
//!
//! Typed directed edges between memories, stored in SQLite:
//!
//! - causal: A led to decision B
//! - contradicts: A and B conflict
//! - supports: A reinforces B
//! - requires: A depends on B
//! - related: A and B are semantically similar
//!
//! Core operations: link memories, walk relations, trace causal chains
//! (shortest path, breadth-first), detect contradictions.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::storage::pool::{ConnectionPool, PoolError};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Relationship graph error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Invalid input (unknown kind, out-of-range strength)
    #[error("Invalid relationship: {0}")]
    InvalidInput(String),
    /// Pool checkout failure
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Relationship graph result type
pub type Result<T> = std::result::Result<T, GraphError>;

// ============================================================================
// TYPES
// ============================================================================

/// Kinds of relationship edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// A led to decision B
    Causal,
    /// A and B conflict
    Contradicts,
    /// A reinforces B
    Supports,
    /// A depends on B
    Requires,
    /// A and B are semantically similar
    Related,
}

impl RelationKind {
    /// String form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Causal => "causal",
            RelationKind::Contradicts => "contradicts",
            RelationKind::Supports => "supports",
            RelationKind::Requires => "requires",
            RelationKind::Related => "related",
        }
    }

    /// Parse from the stored string form.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "causal" => Some(RelationKind::Causal),
            "contradicts" => Some(RelationKind::Contradicts),
            "supports" => Some(RelationKind::Supports),
            "requires" => Some(RelationKind::Requires),
            "related" => Some(RelationKind::Related),
            _ => None,
        }
    }
}

/// Traversal direction relative to a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Outgoing edges only
    From,
    /// Incoming edges only
    To,
    /// Either direction
    #[default]
    Both,
}

/// A relationship between two memories.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRelationship {
    /// Stable hash of `(from, to, kind)`
    pub id: String,
    /// Source memory id
    pub from_memory_id: String,
    /// Target memory id
    pub to_memory_id: String,
    /// Edge kind
    pub kind: RelationKind,
    /// Confidence in [0, 1]
    pub strength: f64,
    /// Why they're related
    pub evidence: String,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
}

/// Relationship graph statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    /// Total edges
    pub total_relationships: usize,
    /// Edge counts by kind
    pub by_kind: HashMap<String, usize>,
    /// Mean strength across all edges
    pub average_strength: f64,
}

// ============================================================================
// GRAPH
// ============================================================================

/// Manages relationships between memories.
pub struct RelationshipGraph {
    pool: Arc<ConnectionPool>,
}

impl RelationshipGraph {
    /// Open the graph over `pool`'s database, creating tables as needed.
    pub fn new(pool: Arc<ConnectionPool>) -> Result<Self> {
        {
            let conn = pool.checkout()?;
            crate::storage::migrations::apply_migrations(&conn)?;
        }
        Ok(Self { pool })
    }

    /// Create or update a relationship. Upserts on `(from, to, kind)`.
    /// Returns the edge id.
    pub fn link(
        &self,
        from_id: &str,
        to_id: &str,
        kind: RelationKind,
        evidence: &str,
        strength: f64,
    ) -> Result<String> {
        if !(0.0..=1.0).contains(&strength) {
            return Err(GraphError::InvalidInput(format!(
                "strength must be 0.0-1.0, got {strength}"
            )));
        }

        let id = edge_id(from_id, to_id, kind);
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO memory_relationships
             (id, from_memory_id, to_memory_id, relationship_type, strength, evidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(from_memory_id, to_memory_id, relationship_type)
             DO UPDATE SET strength = excluded.strength, evidence = excluded.evidence",
            params![
                id,
                from_id,
                to_id,
                kind.as_str(),
                strength,
                evidence,
                Utc::now().timestamp()
            ],
        )?;
        Ok(id)
    }

    /// Find memories related to `memory_id`, optionally filtered by kind
    /// and direction. Returns `(related_memory_id, relationship)` pairs
    /// sorted by strength then recency, both descending.
    pub fn related(
        &self,
        memory_id: &str,
        kind: Option<RelationKind>,
        direction: Direction,
    ) -> Result<Vec<(String, MemoryRelationship)>> {
        let direction_clause = match direction {
            Direction::From => "from_memory_id = ?1",
            Direction::To => "to_memory_id = ?1",
            Direction::Both => "(from_memory_id = ?1 OR to_memory_id = ?1)",
        };

        let (kind_clause, query_kind) = match kind {
            Some(k) => (" AND relationship_type = ?2", Some(k.as_str())),
            None => ("", None),
        };

        let sql = format!(
            "SELECT id, from_memory_id, to_memory_id, relationship_type,
                    strength, evidence, created_at
             FROM memory_relationships
             WHERE {direction_clause}{kind_clause}
             ORDER BY strength DESC, created_at DESC"
        );

        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(&sql)?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<MemoryRelationship> {
            let kind_str: String = row.get(3)?;
            let created: i64 = row.get(6)?;
            Ok(MemoryRelationship {
                id: row.get(0)?,
                from_memory_id: row.get(1)?,
                to_memory_id: row.get(2)?,
                kind: RelationKind::parse_name(&kind_str).unwrap_or(RelationKind::Related),
                strength: row.get(4)?,
                evidence: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                created_at: DateTime::from_timestamp(created, 0).unwrap_or_else(Utc::now),
            })
        };

        let rows: Vec<MemoryRelationship> = match query_kind {
            Some(k) => stmt
                .query_map(params![memory_id, k], map_row)?
                .collect::<rusqlite::Result<_>>()?,
            None => stmt
                .query_map(params![memory_id], map_row)?
                .collect::<rusqlite::Result<_>>()?,
        };

        Ok(rows
            .into_iter()
            .map(|rel| {
                let related_id = if rel.from_memory_id == memory_id {
                    rel.to_memory_id.clone()
                } else {
                    rel.from_memory_id.clone()
                };
                (related_id, rel)
            })
            .collect())
    }

    /// Find the shortest causal chain from `start_id` to `end_id` via
    /// breadth-first search over outgoing causal edges. Returns the path
    /// of memory ids, or `None` when no chain exists within `max_depth`.
    pub fn find_causal_chain(
        &self,
        start_id: &str,
        end_id: &str,
        max_depth: usize,
    ) -> Result<Option<Vec<String>>> {
        let mut queue: VecDeque<(String, Vec<String>)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        queue.push_back((start_id.to_string(), vec![start_id.to_string()]));
        visited.insert(start_id.to_string());

        while let Some((current, path)) = queue.pop_front() {
            if path.len() > max_depth {
                continue;
            }
            if current == end_id {
                return Ok(Some(path));
            }

            for (related_id, _) in
                self.related(&current, Some(RelationKind::Causal), Direction::From)?
            {
                if visited.insert(related_id.clone()) {
                    let mut next_path = path.clone();
                    next_path.push(related_id.clone());
                    queue.push_back((related_id, next_path));
                }
            }
        }

        Ok(None)
    }

    /// Find memories that contradict `memory_id` (either direction).
    pub fn detect_contradictions(
        &self,
        memory_id: &str,
    ) -> Result<Vec<(String, MemoryRelationship)>> {
        self.related(memory_id, Some(RelationKind::Contradicts), Direction::Both)
    }

    /// Graph-wide statistics.
    pub fn stats(&self) -> Result<GraphStats> {
        let conn = self.pool.checkout()?;

        let total: usize =
            conn.query_row("SELECT COUNT(*) FROM memory_relationships", [], |r| {
                r.get::<_, i64>(0).map(|v| v as usize)
            })?;

        let mut by_kind = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT relationship_type, COUNT(*) FROM memory_relationships GROUP BY relationship_type",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        for row in rows {
            let (kind, count) = row?;
            by_kind.insert(kind, count as usize);
        }

        let average_strength: f64 = conn.query_row(
            "SELECT COALESCE(AVG(strength), 0.0) FROM memory_relationships",
            [],
            |r| r.get(0),
        )?;

        Ok(GraphStats {
            total_relationships: total,
            by_kind,
            average_strength,
        })
    }
}

/// Stable edge id: truncated SHA-256 of `(from, to, kind)`.
fn edge_id(from_id: &str, to_id: &str, kind: RelationKind) -> String {
    let mut hasher = Sha256::new();
    hasher.update(from_id.as_bytes());
    hasher.update(to_id.as_bytes());
    hasher.update(kind.as_str().as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

// ============================================================================
// TESTS
// ============================================================================
