//! Search for Recall
//!
//! Implements:
//! - Field-weighted BM25 over an incrementally maintained inverted index
//! - A small query language (`+required -prohibited field:term`)
//! - Snapshot + journal persistence of the index
//! - Result previews

mod index;
mod inverted;
mod preview;
mod query;
mod tokenizer;

pub use index::{RebuildReport, SearchIndex};
pub use inverted::{Field, InvertedIndex};
pub use preview::{extract_preview, truncate_preview, PREVIEW_LENGTH};
pub use query::{Clause, Presence, Query, QueryError};
pub use tokenizer::tokenize;
