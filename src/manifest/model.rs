// AndroidManifest.xml model

use std::path::{Path, PathBuf};

use xml::name::OwnedName;

use super::document::{XmlDocument, XmlElement};
use super::error::{ManifestError, ManifestResult};

/// Manifest file name at the root of a decoded source tree
pub const MANIFEST_FILE: &str = "AndroidManifest.xml";

const ACTION_MAIN: &str = "android.intent.action.MAIN";
const CATEGORY_LAUNCHER: &str = "android.intent.category.LAUNCHER";

/// Decoded manifest bound to the file it was loaded from
#[derive(Debug, Clone)]
pub struct AndroidManifest {
    path: PathBuf,
    document: XmlDocument,
}

impl AndroidManifest {
    /// Load `AndroidManifest.xml` from a decoded source tree
    pub fn load(src_dir: &Path) -> ManifestResult<Self> {
        Self::load_file(&src_dir.join(MANIFEST_FILE))
    }

    pub fn load_file(path: &Path) -> ManifestResult<Self> {
        let document = XmlDocument::load(path)?;
        Self::from_document(path.to_path_buf(), document)
    }

    /// Parse manifest text that will later be saved to `path`
    pub fn parse(path: PathBuf, xml: &str) -> ManifestResult<Self> {
        let document = XmlDocument::parse_str(xml)?;
        Self::from_document(path, document)
    }

    fn from_document(path: PathBuf, document: XmlDocument) -> ManifestResult<Self> {
        if document.root.local_name() != "manifest" {
            return Err(ManifestError::NotAManifest(document.root.local_name().to_string()));
        }
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the tree back to the file it came from
    pub fn save(&self) -> ManifestResult<()> {
        self.document.save(&self.path)
    }

    pub fn root(&self) -> &XmlElement {
        &self.document.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.document.root
    }

    /// The `package` attribute, if present and non-blank
    pub fn package(&self) -> Option<&str> {
        self.root()
            .attribute(None, "package")
            .map(str::trim)
            .filter(|package| !package.is_empty())
    }

    pub fn set_package(&mut self, package: &str) {
        self.root_mut().set_attribute(OwnedName::local("package"), package);
    }

    pub fn version_code(&self) -> Option<u64> {
        self.root()
            .android_attribute("versionCode")
            .and_then(|code| code.trim().parse().ok())
    }

    pub fn version_name(&self) -> Option<&str> {
        self.root()
            .android_attribute("versionName")
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn set_version(&mut self, code: u64, name: &str) {
        let root = self.root_mut();
        root.set_android_attribute("versionCode", code.to_string());
        root.set_android_attribute("versionName", name);
    }

    /// Requested permission names, in document order
    pub fn permissions(&self) -> Vec<&str> {
        self.root()
            .elements()
            .filter(|e| matches!(e.local_name(), "uses-permission" | "uses-permission-sdk-23"))
            .filter_map(|e| e.android_attribute("name"))
            .collect()
    }

    pub fn application(&self) -> Option<&XmlElement> {
        self.root().child("application")
    }

    pub fn application_mut(&mut self) -> Option<&mut XmlElement> {
        self.root_mut().child_mut("application")
    }

    /// Activities and activity aliases reachable from the home screen
    pub fn launcher_components(&self) -> Vec<&XmlElement> {
        self.root()
            .descendants()
            .into_iter()
            .filter(|element| is_launcher(element))
            .collect()
    }

    /// Apply `visit` to every launcher component
    pub fn for_each_launcher_mut(&mut self, mut visit: impl FnMut(&mut XmlElement)) {
        self.root_mut().walk_mut(&mut |element| {
            if is_launcher(element) {
                visit(element);
            }
        });
    }

    /// Fully qualified class names of launcher activities.
    ///
    /// Relative names resolve against the current package and aliases
    /// resolve to their `targetActivity`.
    pub fn launcher_activity_classes(&self) -> Vec<String> {
        let package = self.package().unwrap_or_default();
        let mut classes: Vec<String> = Vec::new();
        for component in self.launcher_components() {
            let name = match component.local_name() {
                "activity-alias" => component.android_attribute("targetActivity"),
                _ => component.android_attribute("name"),
            };
            if let Some(name) = name {
                let class = qualify_class_name(package, name);
                if !classes.contains(&class) {
                    classes.push(class);
                }
            }
        }
        classes
    }
}

fn is_launcher(element: &XmlElement) -> bool {
    if !matches!(element.local_name(), "activity" | "activity-alias") {
        return false;
    }
    element
        .descendants()
        .into_iter()
        .filter(|e| e.local_name() == "intent-filter")
        .any(|filter| {
            let has = |kind: &str, value: &str| {
                filter
                    .elements()
                    .any(|e| e.local_name() == kind && e.android_attribute("name") == Some(value))
            };
            has("action", ACTION_MAIN) && has("category", CATEGORY_LAUNCHER)
        })
}

/// Resolve a component name as the platform does: `.Main` and `Main` are
/// relative to the package, anything dotted is already absolute
pub fn qualify_class_name(package: &str, name: &str) -> String {
    let name = name.trim();
    if name.starts_with('.') {
        format!("{}{}", package, name)
    } else if !name.contains('.') {
        format!("{}.{}", package, name)
    } else {
        name.to_string()
    }
}

/// Dotted identity with at least two `[A-Za-z_][A-Za-z0-9_]*` segments
pub fn is_valid_package_name(package: &str) -> bool {
    let segments: Vec<&str> = package.split('.').collect();
    segments.len() >= 2
        && segments.iter().all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
