//! Property-based tests for recall
//!
//! These tests verify invariants that must hold for all inputs:
//! - Records survive an encode/decode round trip
//! - Decoders and parsers never panic
//! - Bounded operations stay bounded
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

use recall::types::{parse_timestamp, Memory, MemoryType};

fn memory_type() -> impl Strategy<Value = MemoryType> {
    prop_oneof![
        Just(MemoryType::Entity),
        Just(MemoryType::Concept),
        Just(MemoryType::Session),
    ]
}

/// Distinct, trimmed, non-empty strings as the service stores them
fn string_set() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-zA-Z0-9 _-]{0,12}", 0..6)
        .prop_map(recall::types::dedup_preserving_order)
}

fn memory() -> impl Strategy<Value = Memory> {
    (
        "[a-zA-Z0-9][a-zA-Z0-9_-]{0,35}",
        "[^\\s]([^\\r\\n]{0,40}[^\\s])?",
        memory_type(),
        string_set(),
        string_set(),
        0u32..=1000,
        0i64..4_000_000_000_000,
        0i64..1_000_000_000,
        "(\\PC|[\\r\\n\\t]){0,300}",
    )
        .prop_map(
            |(id, title, memory_type, tags, related, importance, created_ms, age_ms, content)| {
                let base = parse_timestamp("1970-01-01T00:00:00.000Z").unwrap();
                let created = base + chrono::Duration::milliseconds(created_ms);
                Memory {
                    id,
                    title,
                    memory_type,
                    tags,
                    created,
                    updated: created + chrono::Duration::milliseconds(age_ms),
                    related,
                    importance: importance as f32 / 1000.0,
                    content,
                }
            },
        )
}

// ============================================================================
// RECORD CODEC TESTS
// ============================================================================

mod codec_tests {
    use super::*;
    use recall::storage::{decode, decode_with_report, encode};

    proptest! {
        /// Invariant: decode(encode(m)) == m for well-formed records
        #[test]
        fn round_trip(m in memory()) {
            let decoded = decode(&encode(&m), "fallback").unwrap();
            prop_assert_eq!(decoded, m);
        }

        /// Invariant: a round-tripped record reports no defaulted fields
        #[test]
        fn round_trip_is_clean(m in memory()) {
            let decoded = decode_with_report(&encode(&m), "fallback").unwrap();
            prop_assert!(decoded.is_clean(), "defaulted: {:?}", decoded.defaulted);
        }

        /// Invariant: decoding never panics
        #[test]
        fn decode_never_panics(s in "\\PC*") {
            let _ = decode(&s, "fallback");
        }

        /// Invariant: any header block decodes, with sane field values
        #[test]
        fn header_always_decodes(lines in prop::collection::vec("[a-z]{0,8}:?[^\\n]{0,30}", 0..10)) {
            let text = format!("---\n{}\n---\nbody", lines.join("\n"));
            let m = decode(&text, "fallback").unwrap();
            prop_assert!(!m.id.is_empty());
            prop_assert!((0.0..=1.0).contains(&m.importance));
            prop_assert!(m.updated >= m.created);
        }
    }
}

// ============================================================================
// QUERY AND TOKENIZER TESTS
// ============================================================================

mod search_tests {
    use super::*;
    use recall::search::{tokenize, Query};

    proptest! {
        /// Invariant: tokenizing never panics and yields non-empty terms without separators
        #[test]
        fn tokens_are_normalized(s in "\\PC*") {
            for token in tokenize(&s) {
                prop_assert!(!token.is_empty());
                prop_assert!(!token.chars().any(char::is_whitespace));
            }
        }

        /// Invariant: ASCII input tokenizes to lowercase alphanumerics
        #[test]
        fn ascii_tokens_are_lowercase(s in "[ -~]{0,80}") {
            for token in tokenize(&s) {
                prop_assert!(token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
            }
        }

        /// Invariant: query parsing never panics
        #[test]
        fn parse_never_panics(s in "[+\\-a-z: ]{0,60}") {
            let _ = Query::parse(&s);
        }

        /// Invariant: every parsed term is a token
        #[test]
        fn parsed_terms_are_tokens(s in "[a-zA-Z0-9 ]{0,60}") {
            let query = Query::parse(&s).unwrap();
            let tokens = tokenize(&s);
            prop_assert_eq!(query.clauses.len(), tokens.len());
        }
    }
}

// ============================================================================
// PREVIEW TESTS
// ============================================================================

mod preview_tests {
    use super::*;
    use recall::search::{extract_preview, truncate_preview};

    proptest! {
        /// Invariant: previews are bounded by the match window plus markers
        #[test]
        fn preview_bounded(content in "\\PC{0,500}", query in "\\PC{1,20}") {
            let preview = extract_preview(&content, &query, 150);
            let limit = (50 + query.chars().count() + 100).max(150) + 6;
            prop_assert!(preview.chars().count() <= limit);
        }

        /// Invariant: a preview is a substring of the content apart from markers
        #[test]
        fn preview_is_excerpt(content in "[a-z ]{0,400}", query in "[a-z]{1,5}") {
            let preview = extract_preview(&content, &query, 150);
            let core = preview.trim_start_matches("...").trim_end_matches("...");
            prop_assert!(content.contains(core));
        }

        /// Invariant: truncation keeps short content intact
        #[test]
        fn truncate_short_is_identity(content in "\\PC{0,150}") {
            prop_assert_eq!(truncate_preview(&content, 150), content);
        }
    }
}
