//! Record file codec
//!
//! A record file is a `---` delimited header of `key: <json literal>` lines,
//! a blank line, a `# <title>` heading, and the raw content:
//!
//! ```text
//! ---
//! id: "6f1c..."
//! title: "Trip to Paris"
//! type: "concept"
//! tags: ["travel"]
//! created: "2023-06-15T14:30:00.000Z"
//! updated: "2023-06-15T14:30:00.000Z"
//! related: []
//! importance: 0.5
//! ---
//!
//! # Trip to Paris
//!
//! Visited the Eiffel Tower in spring
//! ```
//!
//! Decoding is permissive: only a missing header block is an error. Fields
//! that are absent or unparseable fall back to defaults and are reported in
//! [`DecodedRecord::defaulted`] so bulk scans can surface them.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{RecallError, Result};
use crate::types::{
    dedup_preserving_order, format_timestamp, now, parse_timestamp, Memory, MemoryType,
    DEFAULT_IMPORTANCE,
};

/// Line that opens and closes the header block
pub const HEADER_DELIMITER: &str = "---";

/// A decoded record plus the fields that had to be defaulted
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub memory: Memory,
    pub defaulted: Vec<&'static str>,
}

impl DecodedRecord {
    pub fn is_clean(&self) -> bool {
        self.defaulted.is_empty()
    }
}

/// Encode a memory into its file form. Field order is fixed.
pub fn encode(memory: &Memory) -> String {
    let fields: [(&str, String); 8] = [
        ("id", literal(&memory.id)),
        ("title", literal(&memory.title)),
        ("type", literal(&memory.memory_type)),
        ("tags", literal(&memory.tags)),
        ("created", literal(&format_timestamp(&memory.created))),
        ("updated", literal(&format_timestamp(&memory.updated))),
        ("related", literal(&memory.related)),
        ("importance", literal(&memory.importance)),
    ];

    let mut out = String::with_capacity(256 + memory.content.len());
    out.push_str(HEADER_DELIMITER);
    out.push('\n');
    for (key, value) in fields {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&value);
        out.push('\n');
    }
    out.push_str(HEADER_DELIMITER);
    out.push_str("\n\n# ");
    out.push_str(&memory.title);
    out.push_str("\n\n");
    out.push_str(&memory.content);
    out
}

fn literal<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Decode a record, using `fallback_id` when the header carries no id.
pub fn decode(text: &str, fallback_id: &str) -> Result<Memory> {
    decode_with_report(text, fallback_id).map(|decoded| decoded.memory)
}

/// Decode a record and report which fields were defaulted.
pub fn decode_with_report(text: &str, fallback_id: &str) -> Result<DecodedRecord> {
    let (header, body) = split_header(text)
        .ok_or_else(|| RecallError::format(fallback_id, "header block not found"))?;

    let fields = parse_header(header);
    let mut defaulted = Vec::new();

    let id = match fields.get("id").and_then(non_empty_str) {
        Some(id) => id.to_string(),
        None => {
            defaulted.push("id");
            fallback_id.to_string()
        }
    };

    let header_title = fields.get("title").and_then(non_empty_str);
    let (heading, content) = split_body(body, header_title);
    let title = match (header_title, heading) {
        (Some(title), _) => title.to_string(),
        (None, heading) => {
            defaulted.push("title");
            heading
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| id.clone())
        }
    };

    let memory_type = match fields
        .get("type")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<MemoryType>().ok())
    {
        Some(t) => t,
        None => {
            defaulted.push("type");
            MemoryType::default()
        }
    };

    let tags = match fields.get("tags").and_then(string_list) {
        Some(tags) => tags,
        None => {
            defaulted.push("tags");
            Vec::new()
        }
    };

    let related = match fields.get("related").and_then(string_list) {
        Some(related) => related,
        None => {
            defaulted.push("related");
            Vec::new()
        }
    };

    let created = match fields.get("created").and_then(timestamp) {
        Some(ts) => ts,
        None => {
            defaulted.push("created");
            now()
        }
    };

    let mut updated = match fields.get("updated").and_then(timestamp) {
        Some(ts) => ts,
        None => {
            defaulted.push("updated");
            now()
        }
    };
    if updated < created {
        if !defaulted.contains(&"updated") {
            defaulted.push("updated");
        }
        updated = created;
    }

    let importance = match fields.get("importance").and_then(Value::as_f64) {
        Some(v) if v.is_finite() => (v as f32).clamp(0.0, 1.0),
        _ => {
            defaulted.push("importance");
            DEFAULT_IMPORTANCE
        }
    };

    Ok(DecodedRecord {
        memory: Memory {
            id,
            title,
            memory_type,
            tags,
            created,
            updated,
            related,
            importance,
            content: content.to_string(),
        },
        defaulted,
    })
}

/// Split `text` into header lines and body, or `None` without a header block.
fn split_header(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut offset = 0;
    let mut header_start = None;

    for line in text.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\n', '\r']);
        let next = offset + line.len();
        match header_start {
            None if bare == HEADER_DELIMITER => header_start = Some(next),
            None => return None,
            Some(start) if bare == HEADER_DELIMITER => {
                return Some((&text[start..offset], &text[next..]));
            }
            Some(_) => {}
        }
        offset = next;
    }

    None
}

fn parse_header(header: &str) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    for line in header.lines() {
        let Some((key, raw)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let raw = raw.trim();
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.insert(key.to_string(), value);
    }
    fields
}

/// Separate the generated heading from the content.
///
/// Prefers an exact `# <title>` match so titles containing line breaks
/// survive; otherwise takes a single `# ` line as the heading.
fn split_body<'a>(body: &'a str, title: Option<&str>) -> (Option<String>, &'a str) {
    let body = body.trim_start_matches(['\r', '\n']);

    if let Some(title) = title {
        let heading = format!("# {}", title);
        if let Some(rest) = body.strip_prefix(heading.as_str()) {
            if rest.is_empty() {
                return (Some(title.to_string()), rest);
            }
            if let Some(rest) = strip_line_break(rest) {
                return (Some(title.to_string()), strip_line_break(rest).unwrap_or(rest));
            }
        }
    }

    if let Some(after) = body.strip_prefix("# ") {
        let (line, rest) = match after.find('\n') {
            Some(i) => (&after[..i], &after[i + 1..]),
            None => (after, ""),
        };
        let heading = line.trim_end_matches('\r').trim().to_string();
        return (Some(heading), strip_line_break(rest).unwrap_or(rest));
    }

    (None, body)
}

fn strip_line_break(s: &str) -> Option<&str> {
    s.strip_prefix("\r\n").or_else(|| s.strip_prefix('\n'))
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// A JSON array of strings, or a bare comma-separated string
fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => {
            let strings: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
            strings.map(dedup_preserving_order)
        }
        Value::String(s) => Some(dedup_preserving_order(
            s.trim_matches(|c: char| c == '[' || c == ']').split(','),
        )),
        _ => None,
    }
}

fn timestamp(value: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    value.as_str().and_then(parse_timestamp)
}
