//! Persona-aware memory filtering
//!
//! Groups projects into personas (business, technical, personal) and
//! filters memories so only contextually relevant ones surface. A
//! record's persona rides on its tags (`#business`, `#technical`,
//! `#personal`, `#universal`); untagged records are treated as universal
//! and always included.

use std::collections::HashMap;

use crate::storage::records::MemoryRecord;

/// The persona label applied when a project belongs to no persona.
pub const UNIVERSAL: &str = "universal";

/// Persona names recognized on record tags.
const PERSONA_LABELS: [&str; 4] = ["business", "technical", "personal", UNIVERSAL];

fn default_personas() -> HashMap<String, Vec<String>> {
    let mut map = HashMap::new();
    map.insert(
        "business".to_string(),
        ["LFI", "CogentAnalytics", "ConnectionLab", "ZeroArc", "Imply", "PowerTrack"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    map.insert(
        "technical".to_string(),
        ["memory-system", "rekall"].into_iter().map(String::from).collect(),
    );
    map.insert(
        "personal".to_string(),
        ["health", "family", "personal"].into_iter().map(String::from).collect(),
    );
    map
}

/// The persona carried by a record's tags, if any. Matches with or
/// without the `#` prefix, case-insensitively.
pub fn record_persona(record: &MemoryRecord) -> Option<String> {
    for tag in &record.tags {
        let name = tag.trim_start_matches('#').to_lowercase();
        if PERSONA_LABELS.contains(&name.as_str()) {
            return Some(name);
        }
    }
    None
}

/// Filter memories by persona context.
pub struct PersonaFilter {
    personas: HashMap<String, Vec<String>>,
}

impl Default for PersonaFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonaFilter {
    /// Create a filter with the default persona registry.
    pub fn new() -> Self {
        Self {
            personas: default_personas(),
        }
    }

    /// Detect which persona a project belongs to. Case-insensitive;
    /// returns `universal` for unknown or empty projects.
    pub fn detect(&self, project_id: &str) -> String {
        if project_id.is_empty() {
            return UNIVERSAL.to_string();
        }
        let lower = project_id.to_lowercase();
        for (persona, projects) in &self.personas {
            if projects.iter().any(|p| p.to_lowercase() == lower) {
                return persona.clone();
            }
        }
        UNIVERSAL.to_string()
    }

    /// Return the records matching `persona`: tagged with it, tagged
    /// universal, or carrying no persona tag at all. Order is preserved;
    /// inputs are not mutated.
    pub fn filter(&self, records: &[MemoryRecord], persona: &str) -> Vec<MemoryRecord> {
        let target = persona.to_lowercase();
        records
            .iter()
            .filter(|record| match record_persona(record) {
                None => true,
                Some(p) => p == target || p == UNIVERSAL,
            })
            .cloned()
            .collect()
    }

    /// Return a copy of `record` tagged with `persona`. No-op when the
    /// record already carries a persona tag.
    pub fn tag_record(&self, record: &MemoryRecord, persona: &str) -> MemoryRecord {
        let mut tagged = record.clone();
        if record_persona(record).is_none() {
            tagged.tags.push(format!("#{}", persona.to_lowercase()));
        }
        tagged
    }

    /// Projects associated with `persona` (case-insensitive lookup).
    pub fn relevant_projects(&self, persona: &str) -> Vec<String> {
        let target = persona.to_lowercase();
        self.personas
            .iter()
            .find(|(name, _)| name.to_lowercase() == target)
            .map(|(_, projects)| projects.clone())
            .unwrap_or_default()
    }

    /// Add or replace a persona and its project list.
    pub fn add_persona(&mut self, name: &str, projects: Vec<String>) {
        self.personas.insert(name.to_string(), projects);
    }

    /// A copy of the full persona registry.
    pub fn all_personas(&self) -> HashMap<String, Vec<String>> {
        self.personas.clone()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::{content_hash, RecordStatus, Scope};
    use chrono::Utc;

    fn record_with_tags(id: &str, tags: Vec<&str>) -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            id: id.to_string(),
            content: "content".to_string(),
            content_hash: content_hash("content"),
            project_id: "LFI".to_string(),
            scope: Scope::Project,
            status: RecordStatus::Active,
            importance: 0.5,
            confidence: 0.8,
            tags: tags.into_iter().map(String::from).collect(),
            knowledge_domain: "general".to_string(),
            created_at: now,
            updated_at: now,
            session_id: None,
        }
    }

    #[test]
    fn test_detect_known_projects() {
        let filter = PersonaFilter::new();
        assert_eq!(filter.detect("LFI"), "business");
        assert_eq!(filter.detect("lfi"), "business");
        assert_eq!(filter.detect("rekall"), "technical");
        assert_eq!(filter.detect("family"), "personal");
    }

    #[test]
    fn test_detect_unknown_is_universal() {
        let filter = PersonaFilter::new();
        assert_eq!(filter.detect("mystery-project"), UNIVERSAL);
        assert_eq!(filter.detect(""), UNIVERSAL);
    }

    #[test]
    fn test_filter_includes_untagged_and_universal() {
        let filter = PersonaFilter::new();
        let records = vec![
            record_with_tags("tagged-business", vec!["#business"]),
            record_with_tags("tagged-personal", vec!["#personal"]),
            record_with_tags("tagged-universal", vec!["#universal"]),
            record_with_tags("untagged", vec!["#learning"]),
        ];

        let business = filter.filter(&records, "business");
        let ids: Vec<&str> = business.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["tagged-business", "tagged-universal", "untagged"]);
    }

    #[test]
    fn test_filter_case_insensitive() {
        let filter = PersonaFilter::new();
        let records = vec![record_with_tags("a", vec!["#Business"])];
        assert_eq!(filter.filter(&records, "BUSINESS").len(), 1);
    }

    #[test]
    fn test_tag_record_is_idempotent() {
        let filter = PersonaFilter::new();
        let record = record_with_tags("a", vec!["#learning"]);

        let tagged = filter.tag_record(&record, "business");
        assert!(tagged.tags.contains(&"#business".to_string()));
        // Original untouched
        assert!(!record.tags.contains(&"#business".to_string()));

        let again = filter.tag_record(&tagged, "personal");
        assert!(!again.tags.contains(&"#personal".to_string()));
    }

    #[test]
    fn test_relevant_projects_and_overrides() {
        let mut filter = PersonaFilter::new();
        assert!(filter.relevant_projects("business").contains(&"LFI".to_string()));
        assert!(filter.relevant_projects("unknown").is_empty());

        filter.add_persona("creative", vec!["studio".to_string()]);
        assert_eq!(filter.detect("studio"), "creative");
        assert_eq!(filter.all_personas()["creative"], vec!["studio"]);
    }
}
