use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for manifest and resource operations
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;

/// Manifest, resource and build-metadata errors
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed XML: {0}")]
    Parse(#[from] xml::reader::Error),

    #[error("failed to serialize XML: {0}")]
    Emit(#[from] xml::writer::Error),

    #[error("XML document has no root element")]
    EmptyDocument,

    #[error("unexpected root element <{0}>, expected <manifest>")]
    NotAManifest(String),

    #[error("malformed apktool.yml: {0}")]
    Metadata(#[from] serde_yaml::Error),

    #[error("package identity not found in manifest or apktool.yml")]
    MissingPackage,

    #[error("invalid package identity '{0}'")]
    InvalidPackage(String),
}
