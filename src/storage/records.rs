//! File-backed record store
//!
//! One file per record, partitioned by type, plus a metadata counter file.
//! Record writes never go through the search index; the index is derived
//! from [`RecordStore::scan`].

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::codec::{decode_with_report, encode};
use super::layout::{
    partition_dir, readme, record_id_from_path, record_path, write_atomic, write_new,
    JOURNAL_FILE, METADATA_FILE, README_FILE, SNAPSHOT_FILE,
};
use crate::error::{RecallError, Result};
use crate::types::{now, Memory, MemoryType, Metadata};

/// What went wrong (or was patched up) for one file during a scan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanIssue {
    /// The file could not be read or decoded and was left out
    Skipped { reason: String },
    /// These fields were missing or malformed and took default values
    Defaulted { fields: Vec<&'static str> },
    /// The header declared a different type than the partition holding the file
    TypeMismatch {
        declared: MemoryType,
        partition: MemoryType,
    },
    /// The header declared a different id than the file name
    IdMismatch { declared: String },
    /// Another partition already holds a record with this id
    DuplicateId { kept: MemoryType },
    /// A partition directory could not be listed
    UnreadablePartition { reason: String },
}

/// Diagnostic for a single file encountered during a scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub id: Option<String>,
    #[serde(flatten)]
    pub issue: ScanIssue,
}

/// Result of scanning every partition
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub memories: Vec<Memory>,
    pub warnings: Vec<ScanWarning>,
}

impl ScanReport {
    fn warn(&mut self, path: &Path, id: Option<&str>, issue: ScanIssue) {
        tracing::warn!(path = %path.display(), id = ?id, issue = ?issue, "record scan issue");
        self.warnings.push(ScanWarning {
            path: path.to_path_buf(),
            id: id.map(String::from),
            issue,
        });
    }
}

/// Store of record files under a root directory
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the root, the partitions and the metadata record exist.
    ///
    /// Idempotent. The README is written only when the metadata record is
    /// created, i.e. when the store itself is created.
    pub fn initialize(&self) -> Result<Metadata> {
        fs::create_dir_all(&self.root)?;
        for memory_type in MemoryType::ALL {
            fs::create_dir_all(partition_dir(&self.root, memory_type))?;
        }

        if let Some(metadata) = self.read_metadata()? {
            return Ok(metadata);
        }

        let metadata = Metadata::default();
        self.write_metadata(&metadata)?;

        let readme_path = self.root.join(README_FILE);
        if !readme_path.exists() {
            fs::write(&readme_path, readme())?;
        }

        tracing::info!(root = %self.root.display(), "Created memory store");
        Ok(metadata)
    }

    /// Create a store at `root`.
    ///
    /// An existing directory is refused unless `overwrite` is set, in which
    /// case the store-owned files are removed before the skeleton is written.
    pub fn build(root: impl Into<PathBuf>, overwrite: bool) -> Result<RecordStore> {
        let store = RecordStore::new(root);
        if store.root.exists() {
            if !overwrite {
                return Err(RecallError::AlreadyExists(format!(
                    "directory {} already exists; use overwrite to force creation",
                    store.root.display()
                )));
            }
            store.clear()?;
        }
        store.initialize()?;
        Ok(store)
    }

    /// Remove every file this store owns, leaving unrelated files alone
    fn clear(&self) -> Result<()> {
        for memory_type in MemoryType::ALL {
            let dir = partition_dir(&self.root, memory_type);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let path = entry?.path();
                if record_id_from_path(&path).is_some() {
                    fs::remove_file(&path)?;
                }
            }
        }

        for name in [METADATA_FILE, SNAPSHOT_FILE, JOURNAL_FILE, README_FILE] {
            match fs::remove_file(self.root.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(root = %self.root.display(), "Cleared existing memory store");
        Ok(())
    }

    /// Current metadata, or defaults when the record is missing or corrupt
    pub fn metadata(&self) -> Result<Metadata> {
        Ok(self.read_metadata()?.unwrap_or_default())
    }

    fn read_metadata(&self) -> Result<Option<Metadata>> {
        let path = self.root.join(METADATA_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&text) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring corrupt metadata record: {}", e);
                Ok(None)
            }
        }
    }

    fn write_metadata(&self, metadata: &Metadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        write_atomic(&self.root.join(METADATA_FILE), json.as_bytes())
    }

    /// Apply a count change, bump the index version and stamp the time
    fn bump(&self, count_delta: i64) -> Result<Metadata> {
        let mut metadata = self.metadata()?;
        metadata.memory_count = if count_delta < 0 {
            metadata.memory_count.saturating_sub(count_delta.unsigned_abs())
        } else {
            metadata.memory_count.saturating_add(count_delta as u64)
        };
        metadata.index_version += 1;
        metadata.last_updated = now();
        self.write_metadata(&metadata)?;
        Ok(metadata)
    }

    /// Overwrite the live record count if it disagrees with `count`.
    ///
    /// Does not bump the index version: no record changed.
    pub fn reconcile_count(&self, count: u64) -> Result<Metadata> {
        let mut metadata = self.metadata()?;
        if metadata.memory_count != count {
            tracing::warn!(
                recorded = metadata.memory_count,
                actual = count,
                "Correcting memory count"
            );
            metadata.memory_count = count;
            self.write_metadata(&metadata)?;
        }
        Ok(metadata)
    }

    fn path_for(&self, memory_type: MemoryType, id: &str) -> Result<PathBuf> {
        record_path(&self.root, memory_type, id)
            .ok_or_else(|| RecallError::InvalidInput(format!("unusable memory id: {:?}", id)))
    }

    /// Write a new record. Fails with `AlreadyExists` if the file exists.
    pub fn save(&self, memory: &Memory) -> Result<Metadata> {
        let path = self.path_for(memory.memory_type, &memory.id)?;
        let text = encode(memory);
        match write_new(&path, |file| file.write_all(text.as_bytes())) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RecallError::AlreadyExists(format!("memory {}", memory.id)));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(id = %memory.id, memory_type = %memory.memory_type, "Saved memory");
        self.bump(1)
    }

    /// Read a record. Absent, unreadable and undecodable files are all `None`.
    pub fn get(&self, id: &str, memory_type: MemoryType) -> Option<Memory> {
        let path = record_path(&self.root, memory_type, id)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read memory: {}", e);
                return None;
            }
        };
        match decode_with_report(&text, id) {
            Ok(decoded) => {
                let mut memory = decoded.memory;
                memory.id = id.to_string();
                memory.memory_type = memory_type;
                Some(memory)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to decode memory: {}", e);
                None
            }
        }
    }

    /// Partition currently holding `id`, if any
    pub fn locate(&self, id: &str) -> Option<MemoryType> {
        MemoryType::ALL.into_iter().find(|memory_type| {
            record_path(&self.root, *memory_type, id).is_some_and(|path| path.is_file())
        })
    }

    /// Look a record up by id across every partition
    pub fn find(&self, id: &str) -> Option<Memory> {
        MemoryType::ALL
            .into_iter()
            .find_map(|memory_type| self.get(id, memory_type))
    }

    /// Rewrite an existing record in full. Fails with `NotFound` if absent.
    pub fn update(&self, memory: &Memory) -> Result<Metadata> {
        let path = self.path_for(memory.memory_type, &memory.id)?;
        if !path.is_file() {
            return Err(RecallError::NotFound(memory.id.clone()));
        }
        write_atomic(&path, encode(memory).as_bytes())?;

        tracing::debug!(id = %memory.id, "Updated memory");
        self.bump(0)
    }

    /// Remove a record. A missing file is not an error and changes nothing.
    pub fn delete(&self, id: &str, memory_type: MemoryType) -> Result<Option<Metadata>> {
        let Some(path) = record_path(&self.root, memory_type, id) else {
            return Ok(None);
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(id, memory_type = %memory_type, "Deleted memory");
                self.bump(-1).map(Some)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Decode every record in every partition.
    ///
    /// A file that fails to read or decode is skipped and reported; the
    /// scan itself only fails if nothing under the root can be listed.
    pub fn scan(&self) -> Result<ScanReport> {
        if !self.root.is_dir() {
            return Err(RecallError::NotFound(format!(
                "memory store {}",
                self.root.display()
            )));
        }

        let mut report = ScanReport::default();
        let mut seen: HashMap<String, MemoryType> = HashMap::new();

        for partition in MemoryType::ALL {
            let dir = partition_dir(&self.root, partition);
            let mut paths: Vec<PathBuf> = match fs::read_dir(&dir) {
                Ok(entries) => entries
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .collect(),
                Err(e) => {
                    report.warn(
                        &dir,
                        None,
                        ScanIssue::UnreadablePartition {
                            reason: e.to_string(),
                        },
                    );
                    continue;
                }
            };
            paths.sort();

            for path in paths {
                let Some(id) = record_id_from_path(&path) else {
                    continue;
                };
                if let Some(memory) = self.scan_file(&path, &id, partition, &mut report) {
                    if let Some(kept) = seen.get(&memory.id) {
                        report.warn(&path, Some(&id), ScanIssue::DuplicateId { kept: *kept });
                        continue;
                    }
                    seen.insert(memory.id.clone(), partition);
                    report.memories.push(memory);
                }
            }
        }

        Ok(report)
    }

    fn scan_file(
        &self,
        path: &Path,
        id: &str,
        partition: MemoryType,
        report: &mut ScanReport,
    ) -> Option<Memory> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                report.warn(path, Some(id), ScanIssue::Skipped { reason: e.to_string() });
                return None;
            }
        };

        let decoded = match decode_with_report(&text, id) {
            Ok(decoded) => decoded,
            Err(e) => {
                report.warn(path, Some(id), ScanIssue::Skipped { reason: e.to_string() });
                return None;
            }
        };

        if !decoded.is_clean() {
            report.warn(
                path,
                Some(id),
                ScanIssue::Defaulted {
                    fields: decoded.defaulted.clone(),
                },
            );
        }

        let mut memory = decoded.memory;
        if memory.id != id {
            if !decoded.defaulted.contains(&"id") {
                report.warn(
                    path,
                    Some(id),
                    ScanIssue::IdMismatch {
                        declared: memory.id.clone(),
                    },
                );
            }
            memory.id = id.to_string();
        }
        if memory.memory_type != partition {
            if !decoded.defaulted.contains(&"type") {
                report.warn(
                    path,
                    Some(id),
                    ScanIssue::TypeMismatch {
                        declared: memory.memory_type,
                        partition,
                    },
                );
            }
            memory.memory_type = partition;
        }

        Some(memory)
    }

    /// Every decodable record; see [`RecordStore::scan`] for diagnostics
    pub fn list_all(&self) -> Result<Vec<Memory>> {
        Ok(self.scan()?.memories)
    }
}
