use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for source-tree code transformations
pub type SmaliResult<T> = std::result::Result<T, SmaliError>;

/// Code transformer errors
#[derive(Error, Debug)]
pub enum SmaliError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid package identity '{0}'")]
    InvalidPackage(String),

    #[error("no candidate name left for filler file in {}", .0.display())]
    NoFreeName(PathBuf),
}

impl SmaliError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> SmaliError {
        let path = path.into();
        move |source| SmaliError::Io { path, source }
    }
}
