//! Error types for the case view layer

use std::fmt;
use std::io;

/// Result type alias for view-layer operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while building, fetching or refreshing views
#[derive(Debug)]
pub enum CoreError {
    /// The case database could not answer a query
    DataAccess(String),
    /// SQLite error from the case or preferences database
    Sqlite(rusqlite::Error),
    /// A refresh event was published to a channel nobody listens on
    StaleChannel(String),
    /// Programming error: empty criteria, bad data source id, bad page number
    Configuration(String),
    /// I/O error (content export)
    Io(io::Error),
    /// Serialization error
    Serialization(serde_json::Error),
}

impl CoreError {
    /// True for failures the tree-rendering path degrades on instead of failing
    pub fn is_data_access(&self) -> bool {
        matches!(self, CoreError::DataAccess(_) | CoreError::Sqlite(_))
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::DataAccess(e) => write!(f, "Data access error: {}", e),
            CoreError::Sqlite(e) => write!(f, "SQLite error: {}", e),
            CoreError::StaleChannel(name) => write!(f, "No such refresh channel: {}", name),
            CoreError::Configuration(e) => write!(f, "Configuration error: {}", e),
            CoreError::Io(e) => write!(f, "I/O error: {}", e),
            CoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Sqlite(e) => Some(e),
            CoreError::Io(e) => Some(e),
            CoreError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Sqlite(err)
    }
}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        CoreError::Io(err)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_stale_channel() {
        let err = CoreError::StaleChannel("FileSize_SIZE_50_200".to_string());
        assert_eq!(err.to_string(), "No such refresh channel: FileSize_SIZE_50_200");
    }

    #[test]
    fn test_data_access_classification() {
        assert!(CoreError::DataAccess("case not open".into()).is_data_access());
        assert!(CoreError::from(rusqlite::Error::InvalidQuery).is_data_access());
        assert!(!CoreError::Configuration("empty".into()).is_data_access());
    }
}
