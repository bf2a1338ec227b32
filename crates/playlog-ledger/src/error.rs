//! Error types for ledger operations.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// L001: Record file does not exist
    L001NotFound,
    /// L002: Record file already exists where a fresh epoch was requested
    L002AlreadyExists,
    /// L003: Record file content could not be decoded
    L003Decode,
    /// L004: Read or write on the record file failed
    L004Io,
    /// L005: Operation is deliberately not supported
    L005Unsupported,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L001NotFound => "L001",
            Self::L002AlreadyExists => "L002",
            Self::L003Decode => "L003",
            Self::L004Io => "L004",
            Self::L005Unsupported => "L005",
        }
    }
}

/// Errors that can occur while reading or writing a ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Missing file on load. Callers use this to decide to create a new epoch.
    #[error("[{code}] Record file not found: {}", path.display())]
    NotFound { code: &'static str, path: PathBuf },

    #[error("[{code}] Record file already exists: {}", path.display())]
    AlreadyExists { code: &'static str, path: PathBuf },

    /// Malformed durable content. Fatal for the epoch it belongs to.
    #[error("[{code}] Failed to decode record file {}: {message}", path.display())]
    Decode {
        code: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("[{code}] I/O error on {}: {source}", path.display())]
    Io {
        code: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[{code}] Operation not supported: {message}")]
    Unsupported { code: &'static str, message: String },
}

impl LedgerError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            code: ErrorCode::L001NotFound.as_str(),
            path: path.into(),
        }
    }

    pub fn already_exists(path: impl Into<PathBuf>) -> Self {
        Self::AlreadyExists {
            code: ErrorCode::L002AlreadyExists.as_str(),
            path: path.into(),
        }
    }

    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            code: ErrorCode::L003Decode.as_str(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            code: ErrorCode::L005Unsupported.as_str(),
            message: message.into(),
        }
    }

    /// Classify an I/O failure on `path`, keeping "not found" and "already
    /// exists" distinct from other errors.
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(path),
            std::io::ErrorKind::AlreadyExists => Self::already_exists(path),
            _ => Self::Io {
                code: ErrorCode::L004Io.as_str(),
                path: path.to_path_buf(),
                source,
            },
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::L001NotFound,
            Self::AlreadyExists { .. } => ErrorCode::L002AlreadyExists,
            Self::Decode { .. } => ErrorCode::L003Decode,
            Self::Io { .. } => ErrorCode::L004Io,
            Self::Unsupported { .. } => ErrorCode::L005Unsupported,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for LedgerError
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let path = Path::new("playlist_data/2024-01.json");

        let missing = LedgerError::from_io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(missing.is_not_found());

        let exists = LedgerError::from_io(
            path,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "there"),
        );
        assert_eq!(exists.code(), ErrorCode::L002AlreadyExists);

        let denied = LedgerError::from_io(
            path,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no"),
        );
        assert_eq!(denied.code(), ErrorCode::L004Io);
    }

    #[test]
    fn messages_carry_code() {
        let err = LedgerError::unsupported("removing tracks");
        assert!(err.to_string().starts_with("[L005]"));
    }
}
