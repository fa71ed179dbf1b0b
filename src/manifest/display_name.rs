// User-visible application name

use super::document::XmlElement;
use super::model::AndroidManifest;
use super::resources::{escape, StringResources};

/// Name reported when neither a launcher nor the application carries a label
pub const UNKNOWN_APP: &str = "Unknown App";

/// Display name before and after a rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayNameChange {
    pub old_name: String,
    pub new_name: String,
    /// Whether anything on disk or in the manifest was touched
    pub updated: bool,
}

impl DisplayNameChange {
    fn unchanged(name: String) -> Self {
        Self {
            old_name: name.clone(),
            new_name: name,
            updated: false,
        }
    }
}

fn label_of(element: &XmlElement) -> Option<&str> {
    element
        .android_attribute("label")
        .map(str::trim)
        .filter(|label| !label.is_empty())
}

/// Label of the first launcher, else the application label, resolved
/// through the default string table
pub fn current_display_name(manifest: &AndroidManifest, strings: &StringResources) -> String {
    manifest
        .launcher_components()
        .into_iter()
        .next()
        .and_then(label_of)
        .or_else(|| manifest.application().and_then(label_of))
        .map(|label| strings.resolve(label))
        .unwrap_or_else(|| UNKNOWN_APP.to_string())
}

/// Rename the app to `requested`.
///
/// Every launcher label and the application label are rewritten, through
/// their string resource when they reference one. Afterwards every
/// `app_name`/`label` string in every locale is overwritten as well. The
/// manifest is modified in memory only; the caller saves it.
///
/// With no name requested, or with neither a launcher nor an application
/// label to carry one, nothing changes and the current name is returned as
/// both old and new. Resource write failures are logged, never raised.
pub fn update_display_name(
    manifest: &mut AndroidManifest,
    strings: &StringResources,
    requested: Option<&str>,
) -> DisplayNameChange {
    let old_name = current_display_name(manifest, strings);

    let Some(new_name) = requested.map(str::trim).filter(|name| !name.is_empty()) else {
        return DisplayNameChange::unchanged(old_name);
    };

    let has_launcher = !manifest.launcher_components().is_empty();
    let has_application_label = manifest.application().and_then(label_of).is_some();
    if !has_launcher && !has_application_label {
        log::warn!("no launcher or application label to carry display name '{}'", new_name);
        return DisplayNameChange::unchanged(old_name);
    }

    let mut referenced: Vec<String> = Vec::new();
    let literal = escape(new_name);

    manifest.for_each_launcher_mut(|launcher| match label_of(launcher).and_then(StringResources::reference_name) {
        Some(name) => referenced.push(name.to_string()),
        None => launcher.set_android_attribute("label", literal.clone()),
    });

    if let Some(application) = manifest.application_mut() {
        if let Some(label) = label_of(application).map(str::to_string) {
            match StringResources::reference_name(&label) {
                Some(name) => referenced.push(name.to_string()),
                None => application.set_android_attribute("label", literal.clone()),
            }
        }
    }

    referenced.sort();
    referenced.dedup();
    for name in &referenced {
        match strings.set(name, new_name) {
            Ok(0) => log::warn!("string resource '{}' not found in any locale", name),
            Ok(count) => log::debug!("updated {} entries of string '{}'", count, name),
            Err(e) => log::warn!("failed to update string resource '{}': {}", name, e),
        }
    }

    match strings.set_display_strings(new_name) {
        Ok(count) if count > 0 => log::debug!("updated {} display strings across locales", count),
        Ok(_) => {}
        Err(e) => log::warn!("locale display name propagation failed: {}", e),
    }

    DisplayNameChange {
        old_name,
        new_name: new_name.to_string(),
        updated: true,
    }
}
