use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::tools::ToolError;

/// Result type for identity store operations
pub type KeystoreResult<T> = std::result::Result<T, KeystoreError>;

/// Identity store errors
#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("cannot derive a keystore key: {0}")]
    InvalidKey(String),

    #[error("keystore generation failed: {0}")]
    GenerationFailed(#[from] ToolError),

    #[error("keystore generator reported success but {} does not exist", path.display())]
    MissingAfterGeneration { path: PathBuf },

    #[error("keystore I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
