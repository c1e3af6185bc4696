//! Error types for the exportdata-core library.
//!
//! Every failure the codec can produce is a variant of [`Error`]. The four
//! codec-level kinds are kept distinct because they call for different
//! remediation: a missing artifact ([`Error::NotFound`]) usually means "compile
//! from source instead", a corrupt stream ([`Error::Format`]) means "reject the
//! file", an unknown version tag ([`Error::UnsupportedVersion`]) means "upgrade
//! the tool", and [`Error::Consistency`] points at caller misuse or a stale
//! cache.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for exportdata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all exportdata operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No artifact exists for the import path on the search path
    #[error("no export data found for import path '{import_path}'")]
    NotFound {
        /// The import path that was looked up
        import_path: String,
    },

    /// The byte stream is not valid export data or ends before a field
    #[error("malformed export data{} at offset {offset}: {details}", unit_suffix(.unit))]
    Format {
        /// Import path of the unit being decoded, when known
        unit: Option<String>,
        /// Byte offset where the error occurred
        offset: u64,
        /// Detailed description of the issue
        details: String,
    },

    /// A recognizable section carries a version tag this build cannot decode
    #[error("unsupported export data version '{}'{}", .tag.escape_ascii(), unit_suffix(.unit))]
    UnsupportedVersion {
        /// Import path of the unit being decoded, when known
        unit: Option<String>,
        /// The raw tag bytes as found in the stream
        tag: Vec<u8>,
    },

    /// The namespace cannot satisfy a reference, or a complete unit would be replaced
    #[error("inconsistent namespace for '{path}': {details}")]
    Consistency {
        /// Import path the inconsistency was detected on
        path: String,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The supplied stream or sink failed
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

fn unit_suffix(unit: &Option<String>) -> String {
    match unit {
        Some(path) => format!(" for '{path}'"),
        None => String::new(),
    }
}

impl Error {
    /// Creates a new not-found error
    pub fn not_found(import_path: impl Into<String>) -> Self {
        Self::NotFound {
            import_path: import_path.into(),
        }
    }

    /// Creates a new format error at the given offset
    pub fn format(offset: u64, details: impl Into<String>) -> Self {
        Self::Format {
            unit: None,
            offset,
            details: details.into(),
        }
    }

    /// Creates a new unsupported version error from the raw tag bytes
    pub fn unsupported_version(tag: impl Into<Vec<u8>>) -> Self {
        Self::UnsupportedVersion {
            unit: None,
            tag: tag.into(),
        }
    }

    /// Creates a new consistency error
    pub fn consistency(path: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Consistency {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Attaches the import path of the unit being decoded to stream-level errors.
    ///
    /// Errors that already name a unit are left alone.
    pub fn in_unit(self, path: &str) -> Self {
        match self {
            Self::Format {
                unit: None,
                offset,
                details,
            } => Self::Format {
                unit: Some(path.to_string()),
                offset,
                details,
            },
            Self::UnsupportedVersion { unit: None, tag } => Self::UnsupportedVersion {
                unit: Some(path.to_string()),
                tag,
            },
            other => other,
        }
    }

    /// Returns true if the caller can fall back to another source of type information
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the data is well-formed but produced by a newer or retired producer
    pub fn is_unsupported_version(&self) -> bool {
        matches!(self, Self::UnsupportedVersion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::format(42, "truncated string");
        assert!(err.to_string().contains("offset 42"));
        assert!(err.to_string().contains("truncated string"));

        let err = Error::unsupported_version(*b"c");
        assert!(err.to_string().contains("'c'"));
    }

    #[test]
    fn test_in_unit_attaches_path_once() {
        let err = Error::format(7, "bad").in_unit("a/b").in_unit("c/d");
        match &err {
            Error::Format { unit, .. } => assert_eq!(unit.as_deref(), Some("a/b")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("for 'a/b'"));

        let err = Error::consistency("x", "boom").in_unit("y");
        assert!(matches!(err, Error::Consistency { ref path, .. } if path == "x"));
    }

    #[test]
    fn test_classification() {
        assert!(Error::not_found("fmt").is_recoverable());
        assert!(!Error::format(0, "x").is_recoverable());
        assert!(Error::unsupported_version(*b"i9").is_unsupported_version());
        assert!(!Error::consistency("p", "d").is_unsupported_version());
    }
}
