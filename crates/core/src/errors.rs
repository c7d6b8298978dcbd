use std::path::PathBuf;

/// Result type alias for shmcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for shmcache operations
///
/// Lock contention is never an error: the lock operations report it as a
/// plain `false`. Lock misuse is never an error either: it panics. This type
/// only covers setting up and attaching to the shared region.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system operations on the backing file
    #[error("file system {operation} operation failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but does not hold a usable lock table
    #[error("lock table '{path}' is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    /// The backing file was written by an incompatible format version
    #[error("lock table format version mismatch: expected {expected}, found {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a file system error with context
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, operation: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a corruption error
    #[must_use]
    pub fn corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Corrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn version_mismatch(expected: u32, actual: u32) -> Self {
        Error::VersionMismatch { expected, actual }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = Error::io(
            "/tmp/table",
            "open",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        let msg = err.to_string();
        assert!(msg.contains("open"));
        assert!(msg.contains("/tmp/table"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_version_mismatch_display() {
        let err = Error::version_mismatch(1, 7);
        assert_eq!(
            err.to_string(),
            "lock table format version mismatch: expected 1, found 7"
        );
    }
}
