//! Core types for Recall

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a memory
pub type MemoryId = String;

/// A memory record as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier, immutable after creation
    pub id: MemoryId,
    /// Display title
    pub title: String,
    /// Memory type, fixed at creation
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Tags for categorization (de-duplicated, display order preserved)
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the memory was created
    pub created: DateTime<Utc>,
    /// When the memory was last mutated
    pub updated: DateTime<Utc>,
    /// Ids of related memories (directional, not validated)
    #[serde(default)]
    pub related: Vec<MemoryId>,
    /// Importance score (0.0 - 1.0)
    #[serde(default = "default_importance")]
    pub importance: f32,
    /// Free-text body
    #[serde(default)]
    pub content: String,
}

/// Default importance for new memories
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

fn default_importance() -> f32 {
    DEFAULT_IMPORTANCE
}

/// Memory type classification.
///
/// Each type owns one partition directory under the store root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// People, organizations, objects
    Entity,
    /// Abstract ideas, processes, knowledge
    #[default]
    Concept,
    /// Conversations and meetings
    Session,
}

impl MemoryType {
    /// Every type, in partition scan order
    pub const ALL: [MemoryType; 3] = [MemoryType::Entity, MemoryType::Concept, MemoryType::Session];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Entity => "entity",
            MemoryType::Concept => "concept",
            MemoryType::Session => "session",
        }
    }

    /// Name of the partition directory holding records of this type
    pub fn partition(&self) -> &'static str {
        match self {
            MemoryType::Entity => "entities",
            MemoryType::Concept => "concepts",
            MemoryType::Session => "sessions",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entity" => Ok(MemoryType::Entity),
            "concept" => Ok(MemoryType::Concept),
            "session" => Ok(MemoryType::Session),
            _ => Err(format!("Unknown memory type: {}", s)),
        }
    }
}

/// Store-wide counters, persisted in `metadata.record`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Timestamp of the last mutation
    pub last_updated: DateTime<Utc>,
    /// Number of live records
    pub memory_count: u64,
    /// Bumped on every mutation; a freshness hint for the search index
    pub index_version: u64,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            last_updated: now(),
            memory_count: 0,
            index_version: 1,
        }
    }
}

/// Read-only projection of a memory returned by search and list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: MemoryId,
    pub title: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub tags: Vec<String>,
    /// Relevance score (search) or 1.0 (list)
    pub score: f32,
    /// Excerpt of the content
    pub preview: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Input for creating a memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMemoryInput {
    pub title: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub related: Option<Vec<MemoryId>>,
    #[serde(default)]
    pub importance: Option<f32>,
    #[serde(default)]
    pub content: String,
}

impl CreateMemoryInput {
    pub fn new(title: impl Into<String>, memory_type: MemoryType, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            memory_type,
            tags: None,
            related: None,
            importance: None,
            content: content.into(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }
}

/// Input for updating a memory. Only fields that are `Some` are applied.
///
/// The type is not updatable: it determines the record's partition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMemoryInput {
    pub id: MemoryId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub related: Option<Vec<MemoryId>>,
    #[serde(default)]
    pub importance: Option<f32>,
    #[serde(default)]
    pub content: Option<String>,
}

impl UpdateMemoryInput {
    pub fn new(id: impl Into<MemoryId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Default number of results returned by search
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Options for ranked search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Restrict to these types (any of)
    #[serde(default)]
    pub types: Option<Vec<MemoryType>>,
    /// Require every one of these tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Maximum results (default 10)
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchOptions {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)
    }
}

/// Options for unranked listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOptions {
    /// Restrict to these types (any of)
    #[serde(default)]
    pub types: Option<Vec<MemoryType>>,
    /// Keep records carrying any of these tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Maximum results (unbounded when absent)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Input for building a new store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStoreInput {
    pub directory: String,
    #[serde(default)]
    pub overwrite: bool,
}

/// Input for tag operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagMemoryInput {
    pub id: MemoryId,
    pub tags: Vec<String>,
}

/// Input for relation operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelateMemoriesInput {
    pub source_id: MemoryId,
    pub target_ids: Vec<MemoryId>,
}

/// Default number of journal entries before the index is compacted
pub const DEFAULT_JOURNAL_COMPACT_THRESHOLD: usize = 64;

/// Configuration for a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the store
    pub root: PathBuf,
    /// Journal entries tolerated before the index snapshot is rewritten
    #[serde(default = "default_compact_threshold")]
    pub journal_compact_threshold: usize,
}

fn default_compact_threshold() -> usize {
    DEFAULT_JOURNAL_COMPACT_THRESHOLD
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            journal_compact_threshold: DEFAULT_JOURNAL_COMPACT_THRESHOLD,
        }
    }
}

/// Statistics about the memory store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub metadata: Metadata,
    pub indexed: usize,
    pub entity_count: usize,
    pub concept_count: usize,
    pub session_count: usize,
    pub distinct_tags: usize,
    pub journal_entries: usize,
}

/// Current time truncated to millisecond precision.
///
/// Stored timestamps carry milliseconds only, so anything compared against
/// a decoded record must be truncated the same way.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Render a timestamp in the on-disk form (`2023-06-15T14:30:00.000Z`)
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Order-preserving de-duplication that trims entries and drops empty ones
pub fn dedup_preserving_order<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.as_ref().trim();
        if item.is_empty() || out.iter().any(|existing| existing == item) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_parse() {
        assert_eq!("entity".parse::<MemoryType>(), Ok(MemoryType::Entity));
        assert_eq!(" Concept ".parse::<MemoryType>(), Ok(MemoryType::Concept));
        assert_eq!("SESSION".parse::<MemoryType>(), Ok(MemoryType::Session));
        assert!("note".parse::<MemoryType>().is_err());
    }

    #[test]
    fn test_partitions() {
        let dirs: Vec<_> = MemoryType::ALL.iter().map(|t| t.partition()).collect();
        assert_eq!(dirs, vec!["entities", "concepts", "sessions"]);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = now();
        let text = format_timestamp(&ts);
        assert!(text.ends_with('Z'));
        assert_eq!(parse_timestamp(&text), Some(ts));
    }

    #[test]
    fn test_parse_timestamp_offset() {
        let ts = parse_timestamp("2023-06-15T16:30:00+02:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2023-06-15T14:30:00.000Z");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_dedup_preserving_order() {
        assert_eq!(
            dedup_preserving_order(["b", "a", "b", " a ", "", "c"]),
            vec!["b", "a", "c"]
        );
    }

    #[test]
    fn test_metadata_json_keys() {
        let json = serde_json::to_value(Metadata::default()).unwrap();
        assert_eq!(json["memoryCount"], 0);
        assert_eq!(json["indexVersion"], 1);
        assert!(json.get("lastUpdated").is_some());
    }

    #[test]
    fn test_update_input_ignores_type() {
        let input: UpdateMemoryInput =
            serde_json::from_str(r#"{"id": "a", "type": "entity", "title": "T"}"#).unwrap();
        assert_eq!(input.id, "a");
        assert_eq!(input.title.as_deref(), Some("T"));
        assert!(input.content.is_none());
    }
}
