use std::path::PathBuf;
use thiserror::Error;

/// Problems found while locating or reading registration files.
///
/// None of these abort discovery; they are rendered into
/// [`ParseResult::errors`](super::ParseResult).
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No CTest files found in {0}")]
    NoTestFiles(PathBuf),

    #[error("CTest file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: test '{name}' is not runnable: {reason}")]
    Unavailable {
        path: PathBuf,
        line: usize,
        name: String,
        reason: &'static str,
    },

    #[error("{path}:{line}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl DiscoveryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DiscoveryError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        DiscoveryError::Malformed {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}
