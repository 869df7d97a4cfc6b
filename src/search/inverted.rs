//! Incremental inverted index with per-field BM25 scoring
//!
//! Postings map each term to the documents containing it and the term
//! frequency in every field. Documents can be inserted and removed one at a
//! time; nothing is rebuilt wholesale.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::query::{Presence, Query};
use super::tokenizer::tokenize;
use crate::types::Memory;

/// BM25 term frequency saturation
const K1: f32 = 1.2;
/// BM25 length normalization
const B: f32 = 0.75;

const FIELD_COUNT: usize = 4;

/// Indexed document field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Tags,
    Content,
    Type,
}

impl Field {
    pub const ALL: [Field; FIELD_COUNT] = [Field::Title, Field::Tags, Field::Content, Field::Type];

    fn slot(self) -> usize {
        match self {
            Field::Title => 0,
            Field::Tags => 1,
            Field::Content => 2,
            Field::Type => 3,
        }
    }

    /// Score multiplier for matches in this field
    pub fn boost(self) -> f32 {
        match self {
            Field::Title => 10.0,
            Field::Tags => 5.0,
            Field::Content => 1.0,
            Field::Type => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Tags => "tags",
            Field::Content => "content",
            Field::Type => "type",
        }
    }
}

impl std::str::FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "title" => Ok(Field::Title),
            "tags" | "tag" => Ok(Field::Tags),
            "content" => Ok(Field::Content),
            "type" => Ok(Field::Type),
            _ => Err(format!("Unknown field: {}", s)),
        }
    }
}

/// Per-field term frequencies for one document
type FieldCounts = [u32; FIELD_COUNT];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct DocStats {
    /// Token count per field
    lengths: FieldCounts,
    /// Distinct terms, kept so removal touches only this document's postings
    terms: Vec<String>,
}

/// The inverted index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndex {
    postings: BTreeMap<String, BTreeMap<String, FieldCounts>>,
    docs: BTreeMap<String, DocStats>,
    total_lengths: [u64; FIELD_COUNT],
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(String::as_str)
    }

    /// Index a memory, replacing any previous version of it
    pub fn insert(&mut self, memory: &Memory) {
        self.remove(&memory.id);

        let texts = [
            memory.title.clone(),
            memory.tags.join(" "),
            memory.content.clone(),
            memory.memory_type.as_str().to_string(),
        ];

        let mut stats = DocStats::default();
        let mut counts: BTreeMap<String, FieldCounts> = BTreeMap::new();
        for field in Field::ALL {
            let tokens = tokenize(&texts[field.slot()]);
            stats.lengths[field.slot()] = tokens.len() as u32;
            for token in tokens {
                counts.entry(token).or_default()[field.slot()] += 1;
            }
        }

        for (slot, length) in stats.lengths.iter().enumerate() {
            self.total_lengths[slot] += u64::from(*length);
        }
        stats.terms = counts.keys().cloned().collect();
        for (term, field_counts) in counts {
            self.postings
                .entry(term)
                .or_default()
                .insert(memory.id.clone(), field_counts);
        }
        self.docs.insert(memory.id.clone(), stats);
    }

    /// Drop a document's postings. Returns whether it was indexed.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(stats) = self.docs.remove(id) else {
            return false;
        };

        for (slot, length) in stats.lengths.iter().enumerate() {
            self.total_lengths[slot] = self.total_lengths[slot].saturating_sub(u64::from(*length));
        }
        for term in &stats.terms {
            if let Some(docs) = self.postings.get_mut(term) {
                docs.remove(id);
                if docs.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        true
    }

    /// Documents containing `term`, optionally only in `field`
    fn docs_with<'a>(&'a self, term: &str, field: Option<Field>) -> HashSet<&'a str> {
        self.postings
            .get(term)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, counts)| match field {
                        Some(f) => counts[f.slot()] > 0,
                        None => true,
                    })
                    .map(|(id, _)| id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// BM25 contribution of `term` to `id`, summed over the fields in scope
    fn score(&self, term: &str, field: Option<Field>, id: &str) -> f32 {
        let Some(docs) = self.postings.get(term) else {
            return 0.0;
        };
        let (Some(counts), Some(stats)) = (docs.get(id), self.docs.get(id)) else {
            return 0.0;
        };

        let n = self.docs.len() as f32;
        let df = docs.len() as f32;
        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

        Field::ALL
            .into_iter()
            .filter(|f| field.map_or(true, |scope| scope == *f))
            .map(|f| {
                let tf = counts[f.slot()] as f32;
                if tf == 0.0 {
                    return 0.0;
                }
                let avg_len = (self.total_lengths[f.slot()] as f32 / n).max(1.0);
                let len = stats.lengths[f.slot()] as f32;
                let norm = tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * len / avg_len));
                f.boost() * idf * norm
            })
            .sum()
    }

    /// Evaluate a query, returning matching document ids with scores.
    ///
    /// Without required clauses a document must match at least one optional
    /// clause. A query with no positive clauses selects every document not
    /// prohibited when `select_all` is set, and nothing otherwise.
    pub fn evaluate(&self, query: &Query, select_all: bool) -> Vec<(String, f32)> {
        let mut candidates: HashSet<&str> = {
            let mut required = query.clauses_with(Presence::Required).peekable();
            if required.peek().is_some() {
                let mut sets = required.map(|c| self.docs_with(&c.term, c.field));
                let first = sets.next().unwrap_or_default();
                sets.fold(first, |acc, set| acc.intersection(&set).copied().collect())
            } else if query.has_positive_clauses() {
                query
                    .clauses_with(Presence::Optional)
                    .flat_map(|c| self.docs_with(&c.term, c.field))
                    .collect()
            } else if select_all {
                self.doc_ids().collect()
            } else {
                HashSet::new()
            }
        };

        for clause in query.clauses_with(Presence::Prohibited) {
            for id in self.docs_with(&clause.term, clause.field) {
                candidates.remove(id);
            }
        }

        candidates
            .into_iter()
            .map(|id| {
                let score = query
                    .clauses
                    .iter()
                    .filter(|c| c.presence != Presence::Prohibited)
                    .map(|c| self.score(&c.term, c.field, id))
                    .sum();
                (id.to_string(), score)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{now, MemoryType};

    fn memory(id: &str, title: &str, tags: &[&str], content: &str) -> Memory {
        let ts = now();
        Memory {
            id: id.to_string(),
            title: title.to_string(),
            memory_type: MemoryType::Concept,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created: ts,
            updated: ts,
            related: vec![],
            importance: 0.5,
            content: content.to_string(),
        }
    }

    fn ids(hits: &[(String, f32)]) -> Vec<&str> {
        let mut ids: Vec<&str> = hits.iter().map(|(id, _)| id.as_str()).collect();
        ids.sort();
        ids
    }

    fn index() -> InvertedIndex {
        let mut index = InvertedIndex::new();
        index.insert(&memory("a", "Trip to Paris", &["travel"], "Visited the Eiffel Tower"));
        index.insert(&memory("b", "Rust notes", &["code"], "Ownership and borrowing in Paris"));
        index.insert(&memory("c", "Groceries", &["travel", "list"], "Milk, eggs, bread"));
        index
    }

    #[test]
    fn test_optional_union() {
        let idx = index();
        let hits = idx.evaluate(&Query::parse("eiffel milk").unwrap(), false);
        assert_eq!(ids(&hits), vec!["a", "c"]);
    }

    #[test]
    fn test_required_and_prohibited() {
        let idx = index();
        let hits = idx.evaluate(&Query::parse("+paris -tags:code").unwrap(), false);
        assert_eq!(ids(&hits), vec!["a"]);
    }

    #[test]
    fn test_field_scope() {
        let idx = index();
        let hits = idx.evaluate(&Query::parse("title:paris").unwrap(), false);
        assert_eq!(ids(&hits), vec!["a"]);
    }

    #[test]
    fn test_title_outranks_content() {
        let idx = index();
        let hits = idx.evaluate(&Query::parse("paris").unwrap(), false);
        let a = hits.iter().find(|(id, _)| id == "a").unwrap().1;
        let b = hits.iter().find(|(id, _)| id == "b").unwrap().1;
        assert!(a > b, "title match {} should outrank content match {}", a, b);
    }

    #[test]
    fn test_select_all_without_positive_clauses() {
        let idx = index();
        assert!(idx.evaluate(&Query::default(), false).is_empty());
        assert_eq!(ids(&idx.evaluate(&Query::default(), true)), vec!["a", "b", "c"]);
        let hits = idx.evaluate(&Query::parse("-travel").unwrap(), true);
        assert_eq!(ids(&hits), vec!["b"]);
    }

    #[test]
    fn test_remove_and_reinsert() {
        let mut idx = index();
        let before = idx.clone();

        assert!(idx.remove("a"));
        assert!(!idx.remove("a"));
        assert!(idx.evaluate(&Query::parse("eiffel").unwrap(), false).is_empty());

        idx.insert(&before_memory());
        assert_eq!(idx, before);
    }

    fn before_memory() -> Memory {
        memory("a", "Trip to Paris", &["travel"], "Visited the Eiffel Tower")
    }

    #[test]
    fn test_insert_replaces() {
        let mut idx = index();
        idx.insert(&memory("a", "Trip to Rome", &["travel"], "Saw the Colosseum"));
        assert_eq!(idx.len(), 3);
        assert!(idx.evaluate(&Query::parse("eiffel").unwrap(), false).is_empty());
        assert_eq!(ids(&idx.evaluate(&Query::parse("colosseum").unwrap(), false)), vec!["a"]);
    }

    #[test]
    fn test_type_field_indexed() {
        let idx = index();
        let hits = idx.evaluate(&Query::parse("+type:concept").unwrap(), false);
        assert_eq!(hits.len(), 3);
    }
}
