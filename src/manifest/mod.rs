// Manifest Transformer
//
// Loads AndroidManifest.xml and the string resources of a decoded source
// tree into owned element trees, applies the hardening edits and writes them
// back before the tree is reassembled.

pub mod error;
pub mod document;
pub mod model;
pub mod metadata;
pub mod hardening;
pub mod resources;
pub mod display_name;

pub use error::{ManifestError, ManifestResult};
pub use document::{XmlDocument, XmlElement, XmlNode, ANDROID_NS};
pub use model::{is_valid_package_name, qualify_class_name, AndroidManifest, MANIFEST_FILE};
pub use metadata::{ApktoolMetadata, PackageIdentity, APKTOOL_METADATA_FILE};
pub use hardening::{harden_application, next_version_name, prune_permissions, HardenedVersion, DENIED_PERMISSIONS};
pub use resources::StringResources;
pub use display_name::{current_display_name, update_display_name, DisplayNameChange, UNKNOWN_APP};
