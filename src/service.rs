//! Memory service
//!
//! The only component that touches both the record store and the search
//! index. Every mutation is written to the record store first and then
//! applied to the index, all under one writer lock, so the two agree once
//! an operation returns.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{RecallError, Result};
use crate::search::{RebuildReport, SearchIndex};
use crate::storage::RecordStore;
use crate::types::{
    dedup_preserving_order, now, BuildStoreInput, CreateMemoryInput, ListOptions, Memory,
    MemoryType, Metadata, RelateMemoriesInput, SearchOptions, SearchResult, StoreConfig,
    StoreStats, TagMemoryInput, UpdateMemoryInput, DEFAULT_IMPORTANCE,
};

/// Store + index pair behind a single writer
pub struct MemoryService {
    config: StoreConfig,
    store: RecordStore,
    index: RwLock<SearchIndex>,
    writer: Mutex<()>,
}

impl MemoryService {
    /// Open (creating if needed) the store at `config.root` and load its index
    pub fn open(config: StoreConfig) -> Result<Self> {
        let store = RecordStore::new(&config.root);
        let metadata = store.initialize()?;

        let (index, report) = SearchIndex::initialize(
            &store,
            config.journal_compact_threshold,
            metadata.index_version,
        )?;
        if let Some(report) = report {
            store.reconcile_count(report.indexed as u64)?;
        }

        tracing::info!(
            root = %config.root.display(),
            records = index.len(),
            "Opened memory store"
        );

        Ok(Self {
            config,
            store,
            index: RwLock::new(index),
            writer: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn metadata(&self) -> Result<Metadata> {
        self.store.metadata()
    }

    /// Create a memory with a fresh id
    pub fn create(&self, input: CreateMemoryInput) -> Result<Memory> {
        let title = validate_title(&input.title)?;
        let importance = match input.importance {
            Some(value) => validate_importance(value)?,
            None => DEFAULT_IMPORTANCE,
        };

        let timestamp = now();
        let memory = Memory {
            id: Uuid::new_v4().to_string(),
            title,
            memory_type: input.memory_type,
            tags: dedup_preserving_order(input.tags.unwrap_or_default()),
            created: timestamp,
            updated: timestamp,
            related: dedup_preserving_order(input.related.unwrap_or_default()),
            importance,
            content: input.content,
        };

        let _guard = self.writer.lock();
        if let Some(existing) = self.store.locate(&memory.id) {
            return Err(RecallError::AlreadyExists(format!(
                "memory {} in {}",
                memory.id,
                existing.partition()
            )));
        }
        let metadata = self.store.save(&memory)?;
        self.index
            .write()
            .add(memory.clone(), metadata.index_version);

        tracing::debug!(id = %memory.id, memory_type = %memory.memory_type, "Created memory");
        Ok(memory)
    }

    /// Read one record from a known partition
    pub fn get(&self, id: &str, memory_type: MemoryType) -> Result<Memory> {
        self.store
            .get(id, memory_type)
            .ok_or_else(|| RecallError::NotFound(id.to_string()))
    }

    /// Read one record from whichever partition holds it
    pub fn find(&self, id: &str) -> Result<Memory> {
        self.store
            .find(id)
            .ok_or_else(|| RecallError::NotFound(id.to_string()))
    }

    /// Apply the fields present in `input`
    pub fn update(&self, input: UpdateMemoryInput) -> Result<Memory> {
        let title = input.title.as_deref().map(validate_title).transpose()?;
        let importance = input.importance.map(validate_importance).transpose()?;

        self.modify(&input.id, |memory| {
            if let Some(title) = title {
                memory.title = title;
            }
            if let Some(tags) = input.tags {
                memory.tags = dedup_preserving_order(tags);
            }
            if let Some(related) = input.related {
                memory.related = dedup_preserving_order(related);
            }
            if let Some(importance) = importance {
                memory.importance = importance;
            }
            if let Some(content) = input.content {
                memory.content = content;
            }
        })
    }

    /// Read-modify-write of one record under the writer lock
    fn modify<F>(&self, id: &str, change: F) -> Result<Memory>
    where
        F: FnOnce(&mut Memory),
    {
        let _guard = self.writer.lock();
        let mut memory = self
            .store
            .find(id)
            .ok_or_else(|| RecallError::NotFound(id.to_string()))?;

        change(&mut memory);
        memory.updated = now().max(memory.created);

        let metadata = self.store.update(&memory)?;
        self.index
            .write()
            .update(memory.clone(), metadata.index_version);

        tracing::debug!(id = %memory.id, "Updated memory");
        Ok(memory)
    }

    /// Delete a record. Returns false when no record has this id.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.writer.lock();
        let Some(memory_type) = self.store.locate(id) else {
            let mut index = self.index.write();
            if index.contains(id) {
                let version = index.version();
                index.remove(id, version);
            }
            return Ok(false);
        };

        match self.store.delete(id, memory_type)? {
            Some(metadata) => {
                self.index.write().remove(id, metadata.index_version);
                tracing::debug!(id, "Deleted memory");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ranked search; never fails
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        self.index.read().search(query, options)
    }

    pub fn list(&self, options: &ListOptions) -> Vec<SearchResult> {
        self.index.read().list(options)
    }

    /// Union `input.tags` into the record's tags
    pub fn add_tags(&self, input: TagMemoryInput) -> Result<Memory> {
        self.modify(&input.id, |memory| {
            memory.tags = dedup_preserving_order(memory.tags.iter().chain(&input.tags));
        })
    }

    /// Remove every tag in `input.tags`
    pub fn remove_tags(&self, input: TagMemoryInput) -> Result<Memory> {
        let removed: HashSet<&str> = input.tags.iter().map(|t| t.trim()).collect();
        self.modify(&input.id, |memory| {
            memory.tags.retain(|t| !removed.contains(t.as_str()));
        })
    }

    /// Add directional relations from the source record
    pub fn relate(&self, input: RelateMemoriesInput) -> Result<Memory> {
        self.modify(&input.source_id, |memory| {
            memory.related =
                dedup_preserving_order(memory.related.iter().chain(&input.target_ids));
        })
    }

    pub fn unrelate(&self, input: RelateMemoriesInput) -> Result<Memory> {
        let removed: HashSet<&str> = input.target_ids.iter().map(|t| t.trim()).collect();
        self.modify(&input.source_id, |memory| {
            memory.related.retain(|id| !removed.contains(id.as_str()));
        })
    }

    /// Rebuild the index from the record files and correct the record count
    pub fn rebuild_index(&self) -> Result<RebuildReport> {
        let _guard = self.writer.lock();
        let metadata = self.store.metadata()?;
        let report = self
            .index
            .write()
            .rebuild(&self.store, metadata.index_version)?;
        self.store.reconcile_count(report.indexed as u64)?;
        Ok(report)
    }

    /// Create a new, empty store. The service keeps using its own store
    /// unless the new one replaces it in place.
    pub fn build_store(&self, input: BuildStoreInput) -> Result<PathBuf> {
        let root = PathBuf::from(shellexpand::tilde(&input.directory).into_owned());

        let _guard = self.writer.lock();
        let store = RecordStore::build(&root, input.overwrite)?;
        let metadata = store.metadata()?;
        SearchIndex::new(store.root(), self.config.journal_compact_threshold)
            .rebuild(&store, metadata.index_version)?;

        if same_location(store.root(), self.store.root()) {
            let metadata = self.store.metadata()?;
            self.index
                .write()
                .rebuild(&self.store, metadata.index_version)?;
        }

        tracing::info!(root = %root.display(), overwrite = input.overwrite, "Built memory store");
        Ok(root)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let metadata = self.store.metadata()?;
        let index = self.index.read();
        Ok(StoreStats {
            metadata,
            indexed: index.len(),
            entity_count: index.count_of(MemoryType::Entity),
            concept_count: index.count_of(MemoryType::Concept),
            session_count: index.count_of(MemoryType::Session),
            distinct_tags: index.distinct_tags(),
            journal_entries: index.journal_entries(),
        })
    }
}

/// Whether two spellings of a directory name the same place on disk
fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(RecallError::InvalidInput("title must not be empty".to_string()));
    }
    Ok(title.to_string())
}

fn validate_importance(importance: f32) -> Result<f32> {
    if !importance.is_finite() {
        return Err(RecallError::InvalidInput(format!(
            "importance must be a number in [0, 1], got {}",
            importance
        )));
    }
    Ok(importance.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service() -> (TempDir, MemoryService) {
        let dir = TempDir::new().unwrap();
        let service = MemoryService::open(StoreConfig::new(dir.path().join("store"))).unwrap();
        (dir, service)
    }

    #[test]
    fn test_validation() {
        assert!(matches!(validate_title("  "), Err(RecallError::InvalidInput(_))));
        assert_eq!(validate_title(" Paris ").unwrap(), "Paris");
        assert_eq!(validate_importance(1.7).unwrap(), 1.0);
        assert_eq!(validate_importance(-0.2).unwrap(), 0.0);
        assert!(validate_importance(f32::NAN).is_err());
    }

    #[test]
    fn test_create_applies_defaults() {
        let (_dir, service) = service();
        let memory = service
            .create(CreateMemoryInput::new("Paris", MemoryType::Concept, "City").with_tags(["a", " a", "", "b"]))
            .unwrap();
        assert_eq!(memory.tags, vec!["a", "b"]);
        assert_eq!(memory.importance, DEFAULT_IMPORTANCE);
        assert_eq!(memory.created, memory.updated);
        assert_eq!(service.get(&memory.id, MemoryType::Concept).unwrap(), memory);
    }

    #[test]
    fn test_update_keeps_falsy_values() {
        let (_dir, service) = service();
        let memory = service
            .create(CreateMemoryInput::new("Paris", MemoryType::Entity, "City").with_tags(["x"]))
            .unwrap();

        let updated = service
            .update(UpdateMemoryInput {
                importance: Some(0.0),
                content: Some(String::new()),
                tags: Some(vec![]),
                ..UpdateMemoryInput::new(&memory.id)
            })
            .unwrap();
        assert_eq!(updated.importance, 0.0);
        assert_eq!(updated.content, "");
        assert!(updated.tags.is_empty());
        assert_eq!(updated.title, "Paris");
        assert_eq!(service.find(&memory.id).unwrap(), updated);
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let (_dir, service) = service();
        assert!(!service.delete("missing").unwrap());
        assert!(!service.delete("../escape").unwrap());
        assert_eq!(service.metadata().unwrap().memory_count, 0);
    }

    #[test]
    fn test_stats() {
        let (_dir, service) = service();
        service
            .create(CreateMemoryInput::new("A", MemoryType::Entity, "").with_tags(["x", "Y"]))
            .unwrap();
        service
            .create(CreateMemoryInput::new("B", MemoryType::Session, "").with_tags(["y"]))
            .unwrap();

        let stats = service.stats().unwrap();
        assert_eq!(stats.metadata.memory_count, 2);
        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.entity_count, 1);
        assert_eq!(stats.concept_count, 0);
        assert_eq!(stats.session_count, 1);
        assert_eq!(stats.distinct_tags, 2);
        assert_eq!(stats.journal_entries, 2);
    }
}
