//! Persistent search index
//!
//! The in-memory [`InvertedIndex`] plus an id → record lookup map, persisted
//! as a snapshot file and an append-only journal of changes made since the
//! snapshot. Both carry the metadata index version they reflect, so a stale
//! or torn index is detected on load and rebuilt from the record store.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::inverted::InvertedIndex;
use super::preview::{preview_for_query, truncate_preview, PREVIEW_LENGTH};
use super::query::{Presence, Query};
use crate::error::{RecallError, Result};
use crate::storage::layout::{write_atomic, JOURNAL_FILE, SNAPSHOT_FILE};
use crate::storage::{RecordStore, ScanWarning};
use crate::types::{ListOptions, Memory, MemoryId, MemoryType, SearchOptions, SearchResult};

/// Snapshot layout version; bump when the serialized structure changes
const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format: u32,
    version: u64,
    index: &'a InvertedIndex,
    memories: &'a BTreeMap<MemoryId, Memory>,
}

#[derive(Deserialize)]
struct Snapshot {
    format: u32,
    version: u64,
    index: InvertedIndex,
    memories: BTreeMap<MemoryId, Memory>,
}

/// One line of the index journal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum JournalEntry {
    Upsert { version: u64, memory: Memory },
    Remove { version: u64, id: MemoryId },
}

/// Outcome of a full rebuild
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildReport {
    pub indexed: usize,
    pub version: u64,
    pub warnings: Vec<ScanWarning>,
}

/// Ranked, filterable view over every record in a store
#[derive(Debug)]
pub struct SearchIndex {
    snapshot_path: PathBuf,
    journal_path: PathBuf,
    compact_threshold: usize,
    inverted: InvertedIndex,
    memories: BTreeMap<MemoryId, Memory>,
    version: u64,
    journal_entries: usize,
}

impl SearchIndex {
    /// Empty index persisting under `root`
    pub fn new(root: &Path, compact_threshold: usize) -> Self {
        Self {
            snapshot_path: root.join(SNAPSHOT_FILE),
            journal_path: root.join(JOURNAL_FILE),
            compact_threshold: compact_threshold.max(1),
            inverted: InvertedIndex::new(),
            memories: BTreeMap::new(),
            version: 0,
            journal_entries: 0,
        }
    }

    /// Load the persisted snapshot and replay the journal on top of it
    pub fn load(root: &Path, compact_threshold: usize) -> Result<Self> {
        let mut index = Self::new(root, compact_threshold);

        let text = fs::read_to_string(&index.snapshot_path).map_err(|e| {
            RecallError::IndexUnavailable(format!("cannot read snapshot: {}", e))
        })?;
        let snapshot: Snapshot = serde_json::from_str(&text)
            .map_err(|e| RecallError::IndexUnavailable(format!("corrupt snapshot: {}", e)))?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(RecallError::IndexUnavailable(format!(
                "unsupported snapshot format {}",
                snapshot.format
            )));
        }
        index.inverted = snapshot.index;
        index.memories = snapshot.memories;
        index.version = snapshot.version;

        match fs::read_to_string(&index.journal_path) {
            Ok(journal) => {
                for (line_no, line) in journal.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let entry: JournalEntry = serde_json::from_str(line).map_err(|e| {
                        RecallError::IndexUnavailable(format!(
                            "corrupt journal line {}: {}",
                            line_no + 1,
                            e
                        ))
                    })?;
                    index.apply(entry);
                    index.journal_entries += 1;
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(RecallError::IndexUnavailable(format!(
                    "cannot read journal: {}",
                    e
                )))
            }
        }

        let consistent = index.inverted.len() == index.memories.len()
            && index.memories.keys().all(|id| index.inverted.contains(id));
        if !consistent {
            return Err(RecallError::IndexUnavailable(
                "postings disagree with record map".to_string(),
            ));
        }

        Ok(index)
    }

    /// Load the persisted index, rebuilding from `store` when it is missing,
    /// unreadable, or does not reflect `expected_version`.
    pub fn initialize(
        store: &RecordStore,
        compact_threshold: usize,
        expected_version: u64,
    ) -> Result<(Self, Option<RebuildReport>)> {
        match Self::load(store.root(), compact_threshold) {
            Ok(index) if index.version == expected_version => {
                tracing::debug!(
                    version = index.version,
                    records = index.len(),
                    journal = index.journal_entries,
                    "Loaded search index"
                );
                return Ok((index, None));
            }
            Ok(index) => {
                tracing::warn!(
                    index_version = index.version,
                    expected_version,
                    "Search index is stale, rebuilding"
                );
            }
            Err(e) => {
                tracing::warn!("Search index unavailable, rebuilding: {}", e);
            }
        }

        let mut index = Self::new(store.root(), compact_threshold);
        let report = index.rebuild(store, expected_version)?;
        Ok((index, Some(report)))
    }

    /// Re-derive the whole index from the record store and persist a fresh
    /// snapshot, discarding the journal.
    pub fn rebuild(&mut self, store: &RecordStore, version: u64) -> Result<RebuildReport> {
        let scan = store.scan()?;

        self.inverted = InvertedIndex::new();
        self.memories.clear();
        for memory in scan.memories {
            self.inverted.insert(&memory);
            self.memories.insert(memory.id.clone(), memory);
        }
        self.version = version;
        self.compact()?;

        tracing::info!(
            records = self.memories.len(),
            warnings = scan.warnings.len(),
            version,
            "Rebuilt search index"
        );

        Ok(RebuildReport {
            indexed: self.memories.len(),
            version,
            warnings: scan.warnings,
        })
    }

    /// Index a newly created record
    pub fn add(&mut self, memory: Memory, version: u64) {
        self.record(JournalEntry::Upsert { version, memory });
    }

    /// Re-index a changed record
    pub fn update(&mut self, memory: Memory, version: u64) {
        self.record(JournalEntry::Upsert { version, memory });
    }

    /// Drop a record. Returns whether it was indexed.
    pub fn remove(&mut self, id: &str, version: u64) -> bool {
        let present = self.memories.contains_key(id);
        self.record(JournalEntry::Remove {
            version,
            id: id.to_string(),
        });
        present
    }

    fn apply(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Upsert { version, memory } => {
                self.inverted.insert(&memory);
                self.memories.insert(memory.id.clone(), memory);
                self.version = version;
            }
            JournalEntry::Remove { version, id } => {
                self.inverted.remove(&id);
                self.memories.remove(&id);
                self.version = version;
            }
        }
    }

    /// Apply a change in memory, then persist it.
    ///
    /// Persistence failures are logged only: the version stamped on disk
    /// then lags the metadata and the next load rebuilds.
    fn record(&mut self, entry: JournalEntry) {
        let persisted = self.append(&entry);
        self.apply(entry);

        let persisted = persisted.and_then(|()| {
            self.journal_entries += 1;
            if self.journal_entries >= self.compact_threshold {
                self.compact()
            } else {
                Ok(())
            }
        });
        if let Err(e) = persisted {
            tracing::error!("Failed to persist search index change: {}", e);
        }
    }

    fn append(&self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Write the current state as a snapshot and truncate the journal
    pub fn compact(&mut self) -> Result<()> {
        let snapshot = SnapshotRef {
            format: SNAPSHOT_FORMAT,
            version: self.version,
            index: &self.inverted,
            memories: &self.memories,
        };
        write_atomic(&self.snapshot_path, &serde_json::to_vec(&snapshot)?)?;

        match fs::remove_file(&self.journal_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.journal_entries = 0;
        tracing::debug!(version = self.version, "Compacted search index");
        Ok(())
    }

    /// Ranked full-text search; query errors are returned
    pub fn try_search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let parsed = Query::parse(query)
            .map_err(|e| RecallError::IndexUnavailable(format!("bad query '{}': {}", query, e)))?;

        let types = options.types.as_deref().filter(|t| !t.is_empty());
        let tags: Vec<String> = options
            .tags
            .iter()
            .flatten()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let filtered = types.is_some() || !tags.is_empty();

        let mut hits: Vec<(&Memory, f32)> = self
            .inverted
            .evaluate(&parsed, filtered || !parsed.is_empty())
            .into_iter()
            .filter_map(|(id, score)| self.memories.get(&id).map(|m| (m, score)))
            .filter(|(m, _)| types.map_or(true, |types| types.contains(&m.memory_type)))
            .filter(|(m, _)| tags.iter().all(|tag| has_tag(m, tag)))
            .collect();

        hits.sort_by(|(a, a_score), (b, b_score)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| b.updated.cmp(&a.updated))
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(options.limit());

        let terms: Vec<&str> = parsed
            .clauses
            .iter()
            .filter(|c| c.presence != Presence::Prohibited)
            .map(|c| c.term.as_str())
            .collect();

        Ok(hits
            .into_iter()
            .map(|(memory, score)| {
                let preview = preview_for_query(&memory.content, query, terms.iter().copied());
                to_result(memory, score, preview)
            })
            .collect())
    }

    /// Ranked full-text search. Never fails: errors yield no results.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        match self.try_search(query, options) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("Search failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Unranked listing, most recently updated first.
    ///
    /// Type and tag filters each match when any requested value matches.
    /// Tags are compared exactly, the way they are stored.
    pub fn list(&self, options: &ListOptions) -> Vec<SearchResult> {
        let types = options.types.as_deref().filter(|t| !t.is_empty());
        let tags: Vec<&str> = options
            .tags
            .iter()
            .flatten()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();

        let mut selected: Vec<&Memory> = self
            .memories
            .values()
            .filter(|m| types.map_or(true, |types| types.contains(&m.memory_type)))
            .filter(|m| tags.is_empty() || m.tags.iter().any(|t| tags.contains(&t.as_str())))
            .collect();

        selected.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = options.limit {
            selected.truncate(limit);
        }

        selected
            .into_iter()
            .map(|m| to_result(m, 1.0, truncate_preview(&m.content, PREVIEW_LENGTH)))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Memory> {
        self.memories.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.memories.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    /// Metadata version the index reflects
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Changes recorded since the last snapshot
    pub fn journal_entries(&self) -> usize {
        self.journal_entries
    }

    pub fn count_of(&self, memory_type: MemoryType) -> usize {
        self.memories
            .values()
            .filter(|m| m.memory_type == memory_type)
            .count()
    }

    /// Number of distinct tags, compared case-insensitively
    pub fn distinct_tags(&self) -> usize {
        self.memories
            .values()
            .flat_map(|m| m.tags.iter().map(|t| t.to_lowercase()))
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Case-insensitive tag match for search filters; `tag` must already be lowercased
fn has_tag(memory: &Memory, tag: &str) -> bool {
    memory.tags.iter().any(|t| t.to_lowercase() == tag)
}

fn to_result(memory: &Memory, score: f32, preview: String) -> SearchResult {
    SearchResult {
        id: memory.id.clone(),
        title: memory.title.clone(),
        memory_type: memory.memory_type,
        tags: memory.tags.clone(),
        score,
        preview,
        created: memory.created,
        updated: memory.updated,
    }
}
