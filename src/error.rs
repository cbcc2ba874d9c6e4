use thiserror::Error;

/// Why a sampling call came back with nothing to recommend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// The user has no topics at all.
    NoTopics,
    /// Topics exist but the filters excluded every one of them.
    FilteredOut,
}

impl EmptyReason {
    pub fn message(&self) -> &'static str {
        match self {
            EmptyReason::NoTopics => "No topics available for assessment",
            EmptyReason::FilteredOut => "No topics match the specified filters",
        }
    }
}

/// Failures raised by a topic or session store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed input; nothing was read or written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown, expired or already resolved session.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("{}", .0.message())]
    EmptyResult(EmptyReason),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Stable short name for the error kind, used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::SessionNotFound(_) | EngineError::TopicNotFound(_) => "not_found",
            EngineError::EmptyResult(_) => "empty_result",
            EngineError::Storage(_) => "storage",
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Storage(StorageError::Sqlite(err))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_messages_are_distinguishable() {
        let none = EngineError::EmptyResult(EmptyReason::NoTopics).to_string();
        let filtered = EngineError::EmptyResult(EmptyReason::FilteredOut).to_string();
        assert_ne!(none, filtered);
        assert!(filtered.contains("filters"));
    }

    #[test]
    fn session_not_found_display() {
        let err = EngineError::SessionNotFound("abc123".to_string());
        assert_eq!(err.to_string(), "Session not found: abc123");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn sqlite_error_converts_to_storage() {
        let err: EngineError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, EngineError::Storage(StorageError::Sqlite(_))));
        assert_eq!(err.kind(), "storage");
    }

    #[test]
    fn validation_helper_builds_variant() {
        let err = EngineError::validation("count must be positive");
        assert!(matches!(err, EngineError::Validation(ref m) if m == "count must be positive"));
    }
}
