//! On-disk layout of a store root
//!
//! ```text
//! <root>/entities/<id>.record
//! <root>/concepts/<id>.record
//! <root>/sessions/<id>.record
//! <root>/metadata.record
//! <root>/index.snapshot
//! <root>/index.journal
//! <root>/README.md
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{format_timestamp, now, MemoryType};

pub const RECORD_EXTENSION: &str = "record";
pub const METADATA_FILE: &str = "metadata.record";
pub const SNAPSHOT_FILE: &str = "index.snapshot";
pub const JOURNAL_FILE: &str = "index.journal";
pub const README_FILE: &str = "README.md";

/// Whether `id` can be used as a single file name inside a partition
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\', '\0'])
        && id.chars().all(|c| !c.is_control())
}

pub fn partition_dir(root: &Path, memory_type: MemoryType) -> PathBuf {
    root.join(memory_type.partition())
}

/// Path of a record file, or `None` when `id` is not a safe file name
pub fn record_path(root: &Path, memory_type: MemoryType, id: &str) -> Option<PathBuf> {
    is_safe_id(id).then(|| {
        partition_dir(root, memory_type).join(format!("{}.{}", id, RECORD_EXTENSION))
    })
}

/// Id encoded in a record file name (`<id>.record`)
pub fn record_id_from_path(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|id| is_safe_id(id))
        .map(String::from)
}

/// Write `contents` to a sibling temporary file, then rename it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Create `path` exclusively and let `fill` write it. A partly written
/// file is removed when `fill` fails.
pub fn write_new<F>(path: &Path, fill: F) -> std::io::Result<()>
where
    F: FnOnce(&mut fs::File) -> std::io::Result<()>,
{
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;

    if let Err(e) = fill(&mut file).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

/// Human-readable description written once when a store is created
pub fn readme() -> String {
    format!(
        r#"# Memory Store

This directory contains memories managed by Recall.

## Directory Structure

- /entities: Information about specific people, organizations, or objects
- /concepts: Information about abstract ideas, processes, or knowledge
- /sessions: Information about specific conversations or meetings
- {snapshot}: Search index snapshot for efficient memory retrieval
- {journal}: Index changes recorded since the last snapshot
- {metadata}: Counters describing the memory store

The index files are derived data and are rebuilt from the record files
whenever they are missing or stale.

## File Format

Each memory is stored as a `.{ext}` file with a header block:

```markdown
---
id: "unique-id"
title: "Memory Title"
type: "entity|concept|session"
tags: ["tag1","tag2"]
created: "2023-06-15T14:30:00.000Z"
updated: "2023-06-15T14:30:00.000Z"
related: ["other-memory-id1","other-memory-id2"]
importance: 0.8
---

# Memory Title

Content of the memory...
```

Created on: {created}
"#,
        snapshot = SNAPSHOT_FILE,
        journal = JOURNAL_FILE,
        metadata = METADATA_FILE,
        ext = RECORD_EXTENSION,
        created = format_timestamp(&now()),
    )
}
