use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop an import run.
///
/// Per-file problems (unreadable metadata, malformed timestamps) never
/// show up here; they degrade to fallback values and a warning.
#[derive(Debug, Error)]
pub enum Error {
    #[error("source directory {} is not readable: {source}", path.display())]
    SourceUnreadable { path: PathBuf, source: io::Error },

    #[error("cannot create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("cannot compute checksum of {}: {source}", path.display())]
    Checksum { path: PathBuf, source: io::Error },

    #[error("cannot {op} {} to {}: {source}", from.display(), to.display())]
    Transfer {
        op: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("index error at {}: {source}", path.display())]
    Index { path: PathBuf, source: io::Error },

    #[error("corrupt index record {}: {source}", path.display())]
    CorruptRecord {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("unknown timezone `{0}`")]
    UnknownTimezone(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn index(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Index {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn create_dir(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }
}
