//! Preview snippets for search and list results
//!
//! All offsets are in characters so a window never splits a UTF-8 sequence.

/// Default preview length
pub const PREVIEW_LENGTH: usize = 150;

/// Characters of context kept before a match
const LEADING_CONTEXT: usize = 50;
/// Characters kept after the end of a match
const TRAILING_CONTEXT: usize = 100;

const ELLIPSIS: &str = "...";

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Character offset of the first case-insensitive occurrence of `needle`
pub fn find_folded(content: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().map(fold).collect();
    if needle.is_empty() || needle.len() > content.len() {
        return None;
    }
    (0..=content.len() - needle.len()).find(|&start| {
        content[start..start + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(c, n)| fold(*c) == *n)
    })
}

/// First `max_length` characters, with an ellipsis when cut
pub fn truncate_preview(content: &str, max_length: usize) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(max_length).collect();
    if chars.next().is_some() {
        head + ELLIPSIS
    } else {
        head
    }
}

/// Window of `content` around the first occurrence of `query`.
///
/// Falls back to [`truncate_preview`] when `query` does not occur.
pub fn extract_preview(content: &str, query: &str, max_length: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    let query_len = query.chars().count();

    let Some(index) = find_folded(&chars, query) else {
        return truncate_preview(content, max_length);
    };

    let start = index.saturating_sub(LEADING_CONTEXT);
    let end = (index + query_len + TRAILING_CONTEXT).min(chars.len());

    let mut preview = String::new();
    if start > 0 {
        preview.push_str(ELLIPSIS);
    }
    preview.extend(&chars[start..end]);
    if end < chars.len() {
        preview.push_str(ELLIPSIS);
    }
    preview
}

/// Preview for a ranked hit: the whole query if it occurs, else the first
/// matching term, else the leading text.
pub fn preview_for_query<'a, I>(content: &str, query: &str, terms: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let chars: Vec<char> = content.chars().collect();
    let query = query.trim();
    if find_folded(&chars, query).is_some() {
        return extract_preview(content, query, PREVIEW_LENGTH);
    }
    match terms.into_iter().find(|t| find_folded(&chars, t).is_some()) {
        Some(term) => extract_preview(content, term, PREVIEW_LENGTH),
        None => truncate_preview(content, PREVIEW_LENGTH),
    }
}
