//! Memory Record Store
//!
//! Records are individually addressable markdown blobs with a typed
//! frontmatter header, one file per record at
//! `{memory_dir}/{project_id}/{id}.md`. Archived records live in an
//! `archived/` subdirectory of their project. The store is the sole
//! writer; every other component reads.
//!
//! Writes are atomic (temp file + rename). A blob missing `id`, `created`
//! or `project_id`, or with broken frontmatter fences, is treated as
//! corrupt: skipped by `list`, counted by the health check, never raised
//! to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::importance;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Record store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record with the given id
    #[error("Memory not found: {0}")]
    NotFound(String),
    /// Caller-supplied record data failed validation
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// Underlying filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// ENUMS
// ============================================================================

/// Visibility scope of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Visible to its own project only
    #[default]
    Project,
    /// Visible everywhere
    Universal,
}

impl Scope {
    /// String form used in frontmatter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Project => "project",
            Scope::Universal => "universal",
        }
    }

    /// Parse from frontmatter, defaulting to `project`.
    pub fn parse_name(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "universal" => Scope::Universal,
            _ => Scope::Project,
        }
    }
}

/// Lifecycle status of a record. Records are never deleted; archival is
/// a status flag plus an `#archived` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Live record, returned by default searches
    #[default]
    Active,
    /// Archived, excluded from default searches
    Archived,
}

impl RecordStatus {
    /// String form used in frontmatter.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Archived => "archived",
        }
    }

    /// Parse from frontmatter, defaulting to `active`.
    pub fn parse_name(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "archived" => RecordStatus::Archived,
            _ => RecordStatus::Active,
        }
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// The atomic unit of memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Stable opaque identifier, assigned at creation
    pub id: String,
    /// Unicode text content
    pub content: String,
    /// SHA-256 of `content`; key into the embedding cache
    pub content_hash: String,
    /// Owning project; routes persona and sharing
    pub project_id: String,
    /// Visibility scope
    pub scope: Scope,
    /// Lifecycle status
    pub status: RecordStatus,
    /// Importance score in [0, 1]
    pub importance: f64,
    /// Confidence score in [0, 1]
    pub confidence: f64,
    /// Ordered tags; duplicates ignored on write
    pub tags: Vec<String>,
    /// Coarse classifier label
    pub knowledge_domain: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp; always >= `created_at`
    pub updated_at: DateTime<Utc>,
    /// Provenance session, when known
    pub session_id: Option<String>,
}

impl MemoryRecord {
    /// Days elapsed since the last update, floored at zero.
    pub fn days_since_update(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_days().max(0)
    }
}

/// Compute the SHA-256 hex digest of record content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn dedupe_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for creating a new record.
///
/// Uses `deny_unknown_fields` so silently-ignored extras are rejected on
/// write while stored blobs stay permissive on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRecord {
    /// The content to remember
    pub content: String,
    /// Owning project
    pub project_id: String,
    /// Visibility scope
    #[serde(default)]
    pub scope: Scope,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
    /// Importance override; derived from content when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
    /// Confidence; defaults to 0.8
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Coarse classifier label; defaults to `general`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_domain: Option<String>,
    /// Provenance session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Partial update applied by [`RecordStore::update`]. `None` fields are
/// left untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    /// Replace the content (recomputes `content_hash`)
    pub content: Option<String>,
    /// Replace the importance score
    pub importance: Option<f64>,
    /// Replace the confidence score
    pub confidence: Option<f64>,
    /// Replace the tag list
    pub tags: Option<Vec<String>>,
    /// Replace the status (moves the file between active and archived)
    pub status: Option<RecordStatus>,
    /// Replace the knowledge domain
    pub knowledge_domain: Option<String>,
    /// Replace the scope
    pub scope: Option<Scope>,
}

/// Filter for [`RecordStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Restrict to one project
    pub project_id: Option<String>,
    /// Include archived records (off by default)
    pub include_archived: bool,
    /// Require this tag to be present
    pub tag: Option<String>,
    /// Require importance >= this
    pub min_importance: Option<f64>,
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// File-backed record store rooted at a memory directory.
pub struct RecordStore {
    memory_dir: PathBuf,
}

impl RecordStore {
    /// Open (creating if needed) a store rooted at `memory_dir`.
    pub fn new(memory_dir: impl Into<PathBuf>) -> Result<Self> {
        let memory_dir = memory_dir.into();
        fs::create_dir_all(&memory_dir)?;
        Ok(Self { memory_dir })
    }

    /// Root directory of the store.
    pub fn memory_dir(&self) -> &Path {
        &self.memory_dir
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.memory_dir.join(project_id)
    }

    fn record_path(&self, project_id: &str, id: &str, status: RecordStatus) -> PathBuf {
        match status {
            RecordStatus::Active => self.project_dir(project_id).join(format!("{id}.md")),
            RecordStatus::Archived => self
                .project_dir(project_id)
                .join("archived")
                .join(format!("{id}.md")),
        }
    }

    /// Create and persist a new record. Assigns an id, stamps
    /// `created_at = updated_at = now`, computes the content hash, and
    /// derives importance from content when none is supplied.
    pub fn create(&self, input: NewRecord) -> Result<MemoryRecord> {
        if input.content.trim().is_empty() {
            return Err(StoreError::InvalidRecord("content must not be empty".into()));
        }
        if input.project_id.trim().is_empty() {
            return Err(StoreError::InvalidRecord(
                "project_id must not be empty".into(),
            ));
        }

        let now = Utc::now();
        let importance = input
            .importance
            .map(clamp_unit)
            .unwrap_or_else(|| importance::base_importance(&input.content));

        let record = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            content_hash: content_hash(&input.content),
            content: input.content,
            project_id: input.project_id,
            scope: input.scope,
            status: RecordStatus::Active,
            importance,
            confidence: clamp_unit(input.confidence.unwrap_or(0.8)),
            tags: dedupe_tags(input.tags),
            knowledge_domain: input
                .knowledge_domain
                .unwrap_or_else(|| "general".to_string()),
            created_at: now,
            updated_at: now,
            session_id: input.session_id,
        };

        self.write_record(&record)?;
        Ok(record)
    }

    /// Fetch a record by id, searching active then archived files across
    /// all projects.
    pub fn get(&self, id: &str) -> Result<MemoryRecord> {
        for project in self.project_ids()? {
            for status in [RecordStatus::Active, RecordStatus::Archived] {
                let path = self.record_path(&project, id, status);
                if path.is_file() {
                    return parse_record_file(&path)
                        .map_err(|e| StoreError::InvalidRecord(format!("{}: {e}", path.display())));
                }
            }
        }
        Err(StoreError::NotFound(id.to_string()))
    }

    /// List records matching `filter`. Archived records are excluded
    /// unless explicitly requested; corrupt files are skipped with a
    /// warning. Order is unspecified.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<MemoryRecord>> {
        let mut records = Vec::new();
        let projects = match &filter.project_id {
            Some(p) => vec![p.clone()],
            None => self.project_ids()?,
        };

        for project in projects {
            let dir = self.project_dir(&project);
            self.collect_records(&dir, &mut records);
            if filter.include_archived {
                self.collect_records(&dir.join("archived"), &mut records);
            }
        }

        records.retain(|r| {
            if let Some(tag) = &filter.tag {
                if !r.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                    return false;
                }
            }
            if let Some(min) = filter.min_importance {
                if r.importance < min {
                    return false;
                }
            }
            true
        });

        Ok(records)
    }

    fn collect_records(&self, dir: &Path, out: &mut Vec<MemoryRecord>) {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "md").unwrap_or(false) && path.is_file() {
                match parse_record_file(&path) {
                    Ok(record) => out.push(record),
                    Err(e) => {
                        tracing::warn!("Skipping corrupt memory file {}: {e}", path.display());
                    }
                }
            }
        }
    }

    /// Apply a partial update. Content changes recompute the hash before
    /// anything else touches the record; status changes relocate the file.
    pub fn update(&self, id: &str, patch: RecordPatch) -> Result<MemoryRecord> {
        let mut record = self.get(id)?;
        let old_status = record.status;

        if let Some(content) = patch.content {
            if content.trim().is_empty() {
                return Err(StoreError::InvalidRecord("content must not be empty".into()));
            }
            record.content_hash = content_hash(&content);
            record.content = content;
        }
        if let Some(importance) = patch.importance {
            record.importance = clamp_unit(importance);
        }
        if let Some(confidence) = patch.confidence {
            record.confidence = clamp_unit(confidence);
        }
        if let Some(tags) = patch.tags {
            record.tags = dedupe_tags(tags);
        }
        if let Some(domain) = patch.knowledge_domain {
            record.knowledge_domain = domain;
        }
        if let Some(scope) = patch.scope {
            record.scope = scope;
        }
        if let Some(status) = patch.status {
            record.status = status;
            if status == RecordStatus::Archived
                && !record.tags.iter().any(|t| t == "#archived")
            {
                record.tags.push("#archived".to_string());
            }
        }

        record.updated_at = Utc::now().max(record.created_at);

        self.write_record(&record)?;
        if record.status != old_status {
            let old_path = self.record_path(&record.project_id, id, old_status);
            if old_path.is_file() {
                fs::remove_file(&old_path)?;
            }
        }
        Ok(record)
    }

    /// Archive a record: status flag plus `#archived` tag. Idempotent.
    pub fn archive(&self, id: &str, reason: Option<&str>) -> Result<MemoryRecord> {
        if let Some(reason) = reason {
            tracing::info!("Archiving {id}: {reason}");
        }
        self.update(
            id,
            RecordPatch {
                status: Some(RecordStatus::Archived),
                ..Default::default()
            },
        )
    }

    /// Stamp `updated_at` without changing anything else (freshness
    /// review "refresh" action).
    pub fn touch(&self, id: &str) -> Result<MemoryRecord> {
        self.update(id, RecordPatch::default())
    }

    /// Access-time reinforcement: bump importance through the
    /// reinforcement curve and stamp `updated_at`.
    pub fn reinforce(&self, id: &str) -> Result<MemoryRecord> {
        let record = self.get(id)?;
        self.update(
            id,
            RecordPatch {
                importance: Some(importance::reinforce(record.importance)),
                ..Default::default()
            },
        )
    }

    /// Enumerate project directories.
    pub fn project_ids(&self) -> Result<Vec<String>> {
        let mut projects = Vec::new();
        for entry in fs::read_dir(&self.memory_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    projects.push(name.to_string());
                }
            }
        }
        Ok(projects)
    }

    /// Walk every active record file and count parse failures.
    /// Returns `(file_count, corrupt_count)`.
    pub fn corruption_scan(&self) -> Result<(usize, usize)> {
        let mut files = 0;
        let mut corrupt = 0;
        for project in self.project_ids()? {
            let dir = self.project_dir(&project);
            let entries = match fs::read_dir(&dir) {
                Ok(e) => e,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map(|e| e == "md").unwrap_or(false) && path.is_file() {
                    files += 1;
                    if parse_record_file(&path).is_err() {
                        corrupt += 1;
                    }
                }
            }
        }
        Ok((files, corrupt))
    }

    fn write_record(&self, record: &MemoryRecord) -> Result<()> {
        let path = self.record_path(&record.project_id, &record.id, record.status);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("md.tmp");
        fs::write(&tmp, render_record(record))?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

// ============================================================================
// WIRE FORMAT
// ============================================================================

// Stable frontmatter key order; readers reject blobs missing id, created
// or project_id.
const FRONTMATTER_KEYS: [&str; 12] = [
    "id",
    "created",
    "updated",
    "project_id",
    "scope",
    "status",
    "importance",
    "confidence",
    "tags",
    "knowledge_domain",
    "content_hash",
    "session_id",
];

fn render_record(record: &MemoryRecord) -> String {
    let mut out = String::from("---\n");
    for key in FRONTMATTER_KEYS {
        let value = match key {
            "id" => record.id.clone(),
            "created" => record.created_at.timestamp_millis().to_string(),
            "updated" => record.updated_at.timestamp_millis().to_string(),
            "project_id" => record.project_id.clone(),
            "scope" => record.scope.as_str().to_string(),
            "status" => record.status.as_str().to_string(),
            "importance" => format!("{:.6}", record.importance),
            "confidence" => format!("{:.6}", record.confidence),
            "tags" => record.tags.join(", "),
            "knowledge_domain" => record.knowledge_domain.clone(),
            "content_hash" => record.content_hash.clone(),
            "session_id" => record.session_id.clone().unwrap_or_default(),
            _ => unreachable!(),
        };
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&value);
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(&record.content);
    out
}

fn parse_record_file(path: &Path) -> std::result::Result<MemoryRecord, String> {
    let raw = fs::read_to_string(path).map_err(|e| e.to_string())?;
    parse_record(&raw)
}

/// Parse a record blob. Unknown frontmatter keys are ignored for forward
/// compatibility; missing required keys are an error.
pub fn parse_record(raw: &str) -> std::result::Result<MemoryRecord, String> {
    let rest = raw
        .strip_prefix("---\n")
        .ok_or("missing opening frontmatter fence")?;
    let (header, body) = rest
        .split_once("\n---\n")
        .or_else(|| rest.split_once("\n---").map(|(h, b)| (h, b)))
        .ok_or("missing closing frontmatter fence")?;

    let mut fields: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
    for line in header.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }

    let required = |key: &str| -> std::result::Result<&str, String> {
        match fields.get(key) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(format!("missing required field '{key}'")),
        }
    };

    let id = required("id")?.to_string();
    let project_id = required("project_id")?.to_string();
    let created_at = parse_timestamp(required("created")?)
        .ok_or_else(|| "unparseable 'created' timestamp".to_string())?;
    let updated_at = fields
        .get("updated")
        .filter(|v| !v.is_empty())
        .and_then(|v| parse_timestamp(v))
        .unwrap_or(created_at)
        .max(created_at);

    let content = body.strip_prefix('\n').unwrap_or(body).to_string();

    let importance = match fields.get("importance").filter(|v| !v.is_empty()) {
        Some(v) => clamp_unit(v.parse::<f64>().map_err(|e| format!("bad importance: {e}"))?),
        None => 0.5,
    };
    let confidence = match fields.get("confidence").filter(|v| !v.is_empty()) {
        Some(v) => clamp_unit(v.parse::<f64>().map_err(|e| format!("bad confidence: {e}"))?),
        None => 0.8,
    };

    let tags = fields
        .get("tags")
        .map(|v| {
            dedupe_tags(
                v.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
            )
        })
        .unwrap_or_default();

    let stored_hash = fields.get("content_hash").map(|v| v.to_string());
    let hash = match stored_hash {
        Some(h) if !h.is_empty() => h,
        _ => content_hash(&content),
    };

    Ok(MemoryRecord {
        id,
        content,
        content_hash: hash,
        project_id,
        scope: fields.get("scope").map(|v| Scope::parse_name(v)).unwrap_or_default(),
        status: fields
            .get("status")
            .map(|v| RecordStatus::parse_name(v))
            .unwrap_or_default(),
        importance,
        confidence,
        tags,
        knowledge_domain: fields
            .get("knowledge_domain")
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "general".to_string()),
        created_at,
        updated_at,
        session_id: fields
            .get("session_id")
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string()),
    })
}

/// Parse a timestamp: epoch milliseconds canonically, ISO-8601 / RFC-3339
/// accepted on read.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ms) = value.parse::<i64>() {
        // Values below ~1e12 are epoch seconds from older writers.
        let ms = if ms.abs() < 1_000_000_000_000 { ms * 1000 } else { ms };
        return DateTime::from_timestamp_millis(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn new_record(content: &str) -> NewRecord {
        NewRecord {
            content: content.to_string(),
            project_id: "LFI".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_get_roundtrip() {
        let (_dir, store) = temp_store();
        let created = store
            .create(NewRecord {
                tags: vec!["#learning".into(), "#pattern".into()],
                session_id: Some("sess-42".into()),
                ..new_record("Client feedback loops work better weekly")
            })
            .unwrap();

        let fetched = store.get(&created.id).unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.content, created.content);
        assert_eq!(fetched.content_hash, content_hash(&created.content));
        assert_eq!(fetched.tags, vec!["#learning", "#pattern"]);
        assert_eq!(fetched.session_id.as_deref(), Some("sess-42"));
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[test]
    fn test_importance_derived_and_clamped() {
        let (_dir, store) = temp_store();
        let derived = store.create(new_record("plain note")).unwrap();
        assert!(derived.importance >= 0.3 && derived.importance <= 1.0);

        let clamped = store
            .create(NewRecord {
                importance: Some(7.5),
                confidence: Some(-0.4),
                ..new_record("out of range")
            })
            .unwrap();
        assert_eq!(clamped.importance, 1.0);
        assert_eq!(clamped.confidence, 0.0);
    }

    #[test]
    fn test_duplicate_tags_ignored() {
        let (_dir, store) = temp_store();
        let record = store
            .create(NewRecord {
                tags: vec!["#a".into(), "#A".into(), "#b".into(), "#a".into()],
                ..new_record("tag dedupe")
            })
            .unwrap();
        assert_eq!(record.tags, vec!["#a", "#b"]);
    }

    #[test]
    fn test_update_recomputes_hash() {
        let (_dir, store) = temp_store();
        let record = store.create(new_record("first version")).unwrap();
        let old_hash = record.content_hash.clone();

        let updated = store
            .update(
                &record.id,
                RecordPatch {
                    content: Some("second version".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_ne!(updated.content_hash, old_hash);
        assert_eq!(updated.content_hash, content_hash("second version"));
        assert!(updated.updated_at >= record.updated_at);
    }

    #[test]
    fn test_archive_moves_file_and_tags() {
        let (dir, store) = temp_store();
        let record = store.create(new_record("soon archived")).unwrap();

        let archived = store.archive(&record.id, Some("low importance")).unwrap();
        assert_eq!(archived.status, RecordStatus::Archived);
        assert!(archived.tags.iter().any(|t| t == "#archived"));

        let active_path = dir.path().join("LFI").join(format!("{}.md", record.id));
        let archived_path = dir
            .path()
            .join("LFI")
            .join("archived")
            .join(format!("{}.md", record.id));
        assert!(!active_path.exists());
        assert!(archived_path.exists());

        // Idempotent
        let again = store.archive(&record.id, None).unwrap();
        assert_eq!(
            again.tags.iter().filter(|t| *t == "#archived").count(),
            1
        );
    }

    #[test]
    fn test_list_excludes_archived_by_default() {
        let (_dir, store) = temp_store();
        let keep = store.create(new_record("keep me")).unwrap();
        let gone = store.create(new_record("archive me")).unwrap();
        store.archive(&gone.id, None).unwrap();

        let active = store.list(&ListFilter::default()).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keep.id);

        let all = store
            .list(&ListFilter {
                include_archived: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(all.len(), 2);

        // get() still finds archived records
        assert!(store.get(&gone.id).is_ok());
    }

    #[test]
    fn test_list_filters() {
        let (_dir, store) = temp_store();
        store
            .create(NewRecord {
                tags: vec!["#strategy".into()],
                importance: Some(0.9),
                ..new_record("strategic call")
            })
            .unwrap();
        store
            .create(NewRecord {
                importance: Some(0.4),
                project_id: "other".into(),
                ..new_record("other project note")
            })
            .unwrap();

        let by_project = store
            .list(&ListFilter {
                project_id: Some("LFI".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_project.len(), 1);

        let by_tag = store
            .list(&ListFilter {
                tag: Some("#strategy".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_tag.len(), 1);

        let by_importance = store
            .list(&ListFilter {
                min_importance: Some(0.8),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_importance.len(), 1);
    }

    #[test]
    fn test_corrupt_files_skipped_and_counted() {
        let (dir, store) = temp_store();
        store.create(new_record("healthy")).unwrap();

        let project = dir.path().join("LFI");
        fs::write(project.join("broken.md"), "no frontmatter here").unwrap();
        fs::write(
            project.join("missing-id.md"),
            "---\ncreated: 1706227200000\nproject_id: LFI\n---\nbody",
        )
        .unwrap();

        let listed = store.list(&ListFilter::default()).unwrap();
        assert_eq!(listed.len(), 1);

        let (files, corrupt) = store.corruption_scan().unwrap();
        assert_eq!(files, 3);
        assert_eq!(corrupt, 2);
    }

    #[test]
    fn test_iso_timestamps_accepted_on_read() {
        let raw = "---\nid: m1\ncreated: 2026-01-25T12:00:00+00:00\nupdated: 2026-01-26T12:00:00Z\nproject_id: LFI\n---\nbody text";
        let record = parse_record(raw).unwrap();
        assert_eq!(record.id, "m1");
        assert_eq!(record.content, "body text");
        assert!(record.updated_at > record.created_at);
    }

    #[test]
    fn test_updated_never_before_created() {
        let raw = "---\nid: m1\ncreated: 1706300000000\nupdated: 1706200000000\nproject_id: LFI\n---\nx";
        let record = parse_record(raw).unwrap();
        assert_eq!(record.updated_at, record.created_at);
    }

    #[test]
    fn test_rejects_empty_inputs() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.create(new_record("   ")),
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(matches!(
            store.create(NewRecord {
                project_id: "".into(),
                ..new_record("content")
            }),
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(matches!(
            store.get("no-such-id"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_reinforce_bumps_importance() {
        let (_dir, store) = temp_store();
        let record = store
            .create(NewRecord {
                importance: Some(0.5),
                ..new_record("reinforce me")
            })
            .unwrap();
        let reinforced = store.reinforce(&record.id).unwrap();
        assert!((reinforced.importance - 0.575).abs() < 1e-9);
    }
}
