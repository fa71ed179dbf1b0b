// apktool.yml build metadata and package identity resolution

use serde_yaml::Value;
use std::fs;
use std::path::Path;

use super::error::{ManifestError, ManifestResult};
use super::model::AndroidManifest;

/// Build metadata file apktool writes next to the manifest
pub const APKTOOL_METADATA_FILE: &str = "apktool.yml";

const DEFAULT_VERSION_CODE: u64 = 1;
const DEFAULT_VERSION_NAME: &str = "1.0";

/// Identity fields apktool records for the decoded archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApktoolMetadata {
    pub version_code: Option<u64>,
    pub version_name: Option<String>,
    pub package: Option<String>,
}

impl ApktoolMetadata {
    /// Parse apktool.yml text.
    ///
    /// Older apktool releases open the file with a `!!brut.androlib...` type
    /// tag; those lines carry no data and are skipped.
    pub fn parse(text: &str) -> ManifestResult<Self> {
        let cleaned: String = text
            .lines()
            .filter(|line| !line.trim_start().starts_with("!!"))
            .collect::<Vec<_>>()
            .join("\n");

        let value: Value = serde_yaml::from_str(&cleaned)?;
        let version_info = value.get("versionInfo");

        let version_code = version_info
            .and_then(|info| info.get("versionCode"))
            .and_then(scalar)
            .and_then(|code| code.parse().ok());
        let version_name = version_info.and_then(|info| info.get("versionName")).and_then(scalar);

        let package = value
            .get("renameManifestPackage")
            .and_then(scalar)
            .or_else(|| {
                value
                    .get("packageInfo")
                    .and_then(|info| info.get("renameManifestPackage"))
                    .and_then(scalar)
            })
            .or_else(|| value.get("package").and_then(scalar));

        Ok(Self {
            version_code,
            version_name,
            package,
        })
    }

    /// Load metadata from a decoded source tree; `None` when the file is absent
    pub fn load(src_dir: &Path) -> ManifestResult<Option<Self>> {
        let path = src_dir.join(APKTOOL_METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|source| ManifestError::Read { path, source })?;
        Self::parse(&text).map(Some)
    }

    /// Rewrite `versionCode`/`versionName` in place, line by line, leaving
    /// every other line of the file byte-identical. Returns false when the
    /// source tree has no apktool.yml.
    pub fn update_version(src_dir: &Path, version_code: u64, version_name: &str) -> ManifestResult<bool> {
        let path = src_dir.join(APKTOOL_METADATA_FILE);
        if !path.exists() {
            return Ok(false);
        }
        let text = fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;

        let mut rewritten: Vec<String> = Vec::new();
        for line in text.lines() {
            let indent = &line[..line.len() - line.trim_start().len()];
            let trimmed = line.trim_start();
            if trimmed.starts_with("versionCode:") {
                rewritten.push(format!("{}versionCode: '{}'", indent, version_code));
            } else if trimmed.starts_with("versionName:") {
                rewritten.push(format!("{}versionName: '{}'", indent, version_name.replace('\'', "''")));
            } else {
                rewritten.push(line.to_string());
            }
        }

        let mut output = rewritten.join("\n");
        if text.ends_with('\n') {
            output.push('\n');
        }
        fs::write(&path, output).map_err(|source| ManifestError::Write { path, source })?;
        Ok(true)
    }
}

fn scalar(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Package identity and version of the archive as decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentity {
    pub package: String,
    pub version_code: u64,
    pub version_name: String,
}

impl PackageIdentity {
    /// Resolve each field from the manifest first, then apktool.yml, then the
    /// defaults. A package found in neither is an error.
    pub fn resolve(manifest: &AndroidManifest, metadata: Option<&ApktoolMetadata>) -> ManifestResult<Self> {
        let package = manifest
            .package()
            .map(str::to_string)
            .or_else(|| metadata.and_then(|m| m.package.clone()))
            .ok_or(ManifestError::MissingPackage)?;

        let version_code = manifest
            .version_code()
            .or_else(|| metadata.and_then(|m| m.version_code))
            .unwrap_or(DEFAULT_VERSION_CODE);

        let version_name = manifest
            .version_name()
            .map(str::to_string)
            .or_else(|| metadata.and_then(|m| m.version_name.clone()))
            .unwrap_or_else(|| DEFAULT_VERSION_NAME.to_string());

        Ok(Self {
            package,
            version_code,
            version_name,
        })
    }
}
