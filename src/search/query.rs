//! Free-text query parsing
//!
//! Whitespace-separated clauses. Each clause may be prefixed with `+`
//! (required) or `-` (prohibited) and scoped to one field with `field:`:
//!
//! ```text
//! eiffel +title:paris -tags:draft
//! ```

use thiserror::Error;

use super::inverted::Field;
use super::tokenizer::tokenize;

/// How a clause constrains matching documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Contributes to score; at least one must match when nothing is required
    Optional,
    /// Must match
    Required,
    /// Must not match
    Prohibited,
}

/// A single term constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub term: String,
    /// `None` searches every field
    pub field: Option<Field>,
    pub presence: Presence,
}

/// Query parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("missing term in clause '{0}'")]
    MissingTerm(String),
}

/// Parsed query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub clauses: Vec<Clause>,
}

impl Query {
    pub fn parse(input: &str) -> Result<Query, QueryError> {
        let mut clauses = Vec::new();

        for raw in input.split_whitespace() {
            let (presence, rest) = if let Some(rest) = raw.strip_prefix('+') {
                (Presence::Required, rest)
            } else if let Some(rest) = raw.strip_prefix('-') {
                (Presence::Prohibited, rest)
            } else {
                (Presence::Optional, raw)
            };

            let (field, text) = match rest.split_once(':') {
                Some((name, text)) => {
                    let field = name
                        .parse::<Field>()
                        .map_err(|_| QueryError::UnknownField(name.to_string()))?;
                    (Some(field), text)
                }
                None => (None, rest),
            };

            let terms = tokenize(text);
            if terms.is_empty() {
                // Bare punctuation carries nothing to match on; an explicit
                // prefix or field scope without a term is malformed.
                if presence != Presence::Optional || field.is_some() {
                    return Err(QueryError::MissingTerm(raw.to_string()));
                }
                continue;
            }

            clauses.extend(terms.into_iter().map(|term| Clause {
                term,
                field,
                presence,
            }));
        }

        Ok(Query { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether any clause can select documents on its own
    pub fn has_positive_clauses(&self) -> bool {
        self.clauses
            .iter()
            .any(|c| c.presence != Presence::Prohibited)
    }

    pub fn clauses_with(&self, presence: Presence) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(move |c| c.presence == presence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(term: &str, field: Option<Field>, presence: Presence) -> Clause {
        Clause {
            term: term.to_string(),
            field,
            presence,
        }
    }

    #[test]
    fn test_plain_terms() {
        let q = Query::parse("Eiffel tower").unwrap();
        assert_eq!(
            q.clauses,
            vec![
                clause("eiffel", None, Presence::Optional),
                clause("tower", None, Presence::Optional),
            ]
        );
    }

    #[test]
    fn test_presence_and_fields() {
        let q = Query::parse("+title:paris -tags:draft content:spring").unwrap();
        assert_eq!(
            q.clauses,
            vec![
                clause("paris", Some(Field::Title), Presence::Required),
                clause("draft", Some(Field::Tags), Presence::Prohibited),
                clause("spring", Some(Field::Content), Presence::Optional),
            ]
        );
    }

    #[test]
    fn test_compound_term_splits() {
        let q = Query::parse("+well-known").unwrap();
        assert_eq!(q.clauses.len(), 2);
        assert!(q.clauses.iter().all(|c| c.presence == Presence::Required));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            Query::parse("author:smith"),
            Err(QueryError::UnknownField("author".to_string()))
        );
        assert_eq!(
            Query::parse("+"),
            Err(QueryError::MissingTerm("+".to_string()))
        );
        assert_eq!(
            Query::parse("title:"),
            Err(QueryError::MissingTerm("title:".to_string()))
        );
    }

    #[test]
    fn test_empty_and_punctuation() {
        assert!(Query::parse("").unwrap().is_empty());
        assert!(Query::parse("  ... ").unwrap().is_empty());
        assert!(!Query::parse("-draft").unwrap().has_positive_clauses());
    }
}
