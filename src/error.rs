//! Error types for Recall

use thiserror::Error;

/// Result type alias for Recall operations
pub type Result<T> = std::result::Result<T, RecallError>;

/// Main error type for Recall
#[derive(Error, Debug)]
pub enum RecallError {
    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid record format in {source_name}: {reason}")]
    Format { source_name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Search index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecallError {
    pub(crate) fn format(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        RecallError::Format {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure is scoped to a single record or lookup.
    ///
    /// Bulk scans skip records that fail this way instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RecallError::NotFound(_) | RecallError::Format { .. })
    }

    /// Get error code for MCP protocol
    pub fn code(&self) -> i64 {
        match self {
            RecallError::NotFound(_) => -32001,
            RecallError::InvalidInput(_) => -32602,
            RecallError::AlreadyExists(_) => -32006,
            _ => -32000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RecallError::NotFound("x".into()).code(), -32001);
        assert_eq!(RecallError::InvalidInput("x".into()).code(), -32602);
        assert_eq!(RecallError::AlreadyExists("x".into()).code(), -32006);
        assert_eq!(RecallError::IndexUnavailable("x".into()).code(), -32000);
    }

    #[test]
    fn test_recoverable() {
        assert!(RecallError::NotFound("a".into()).is_recoverable());
        assert!(RecallError::format("a.record", "missing header").is_recoverable());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!RecallError::from(io).is_recoverable());
    }

    #[test]
    fn test_format_message() {
        let err = RecallError::format("concepts/abc.record", "header block not found");
        assert_eq!(
            err.to_string(),
            "Invalid record format in concepts/abc.record: header block not found"
        );
    }
}
