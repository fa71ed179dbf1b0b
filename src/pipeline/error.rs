use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::keystore::KeystoreError;
use crate::manifest::ManifestError;
use crate::smali::SmaliError;
use crate::tools::ToolError;

/// Result type for pipeline stages
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Failure category reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    FetchError,
    UnpackError,
    ManifestError,
    RepackError,
    AlignError,
    SignError,
    UnknownError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::FetchError => "FetchError",
            ErrorKind::UnpackError => "UnpackError",
            ErrorKind::ManifestError => "ManifestError",
            ErrorKind::RepackError => "RepackError",
            ErrorKind::AlignError => "AlignError",
            ErrorKind::SignError => "SignError",
            ErrorKind::UnknownError => "UnknownError",
        };
        f.write_str(name)
    }
}

/// A job request that can never become a job
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Fatal failure of a pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("download failed: {0}")]
    Fetch(#[source] ToolError),

    #[error("decompile failed: {0}")]
    Unpack(#[source] ToolError),

    #[error("manifest processing failed: {0}")]
    Manifest(#[from] ManifestError),

    #[error("code transformation failed: {0}")]
    Code(#[from] SmaliError),

    #[error("recompile failed: {0}")]
    Repack(#[source] ToolError),

    #[error("zipalign failed: {0}")]
    Align(#[source] ToolError),

    #[error("keystore unavailable: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("signing failed: {0}")]
    Sign(#[source] ToolError),

    #[error("failed to publish {}: {source}", path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("pipeline task panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Fetch(_) => ErrorKind::FetchError,
            PipelineError::Unpack(_) => ErrorKind::UnpackError,
            PipelineError::Manifest(_) | PipelineError::Code(_) => ErrorKind::ManifestError,
            PipelineError::Repack(_) => ErrorKind::RepackError,
            PipelineError::Align(_) => ErrorKind::AlignError,
            PipelineError::Keystore(_) | PipelineError::Sign(_) => ErrorKind::SignError,
            PipelineError::Publish { .. } | PipelineError::Io { .. } | PipelineError::Panicked(_) => {
                ErrorKind::UnknownError
            }
        }
    }

    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> PipelineError {
        let context = context.into();
        move |source| PipelineError::Io { context, source }
    }
}
