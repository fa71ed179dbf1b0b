// Public artifact layout and atomic placement

use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Icon densities, best first
const ICON_DENSITIES: &[&str] = &["xxxhdpi", "xxhdpi", "xhdpi", "hdpi", "mdpi"];
const ICON_NAMES: &[&str] = &["ic_launcher", "ic_launcher_round"];
const ICON_FOLDER_PREFIXES: &[&str] = &["mipmap-", "drawable-"];
const ICON_EXTENSIONS: &[&str] = &["png", "webp"];

/// Largest mtime shift applied to published artifacts, in seconds
pub const MTIME_JITTER_SECS: i64 = 1800;

/// Where published artifacts live on disk and how they are addressed
#[derive(Debug, Clone)]
pub struct PublicLayout {
    output_dir: PathBuf,
    base_url: String,
}

impl PublicLayout {
    pub fn new(output_dir: PathBuf, base_url: &str) -> Self {
        Self {
            output_dir,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `{output_dir}/uploads/{domain}/app/apk`
    pub fn public_dir(&self, domain: &str) -> PathBuf {
        self.output_dir.join("uploads").join(domain).join("app").join("apk")
    }

    /// `{base_url}/hardened/{name}`
    pub fn locator(&self, name: &str) -> String {
        format!("{}/hardened/{}", self.base_url, name)
    }
}

/// `{dir}/{file_name}_{12 hex}.tmp`
pub fn temp_path<R: Rng + ?Sized>(dir: &Path, file_name: &str, rng: &mut R) -> PathBuf {
    let token: u64 = rng.gen_range(0..(1u64 << 48));
    dir.join(format!("{}_{:012x}.tmp", file_name, token))
}

/// Move a fully written file onto its final name.
///
/// Both paths must be on the same filesystem; the rename is the commit
/// point, readers see either nothing or the complete file.
pub async fn publish(temp: &Path, destination: &Path) -> io::Result<()> {
    tokio::fs::rename(temp, destination).await
}

/// Copy `source` next to `destination` and rename it into place
pub async fn copy_atomically(source: &Path, destination: &Path) -> io::Result<()> {
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = destination.parent().unwrap_or_else(|| Path::new("."));
    let temp = temp_path(dir, &file_name, &mut rand::thread_rng());

    tokio::fs::copy(source, &temp).await?;
    if let Err(e) = tokio::fs::rename(&temp, destination).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

/// Delete `{file_name}*.idsig` side files in `dir`; returns how many went
pub fn remove_idsig_files(dir: &Path, file_name: &str) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("cannot list {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !(name.starts_with(file_name) && name.ends_with(".idsig")) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                log::debug!("removed {}", name);
                removed += 1;
            }
            Err(e) => log::warn!("failed to remove {}: {}", name, e),
        }
    }
    removed
}

/// A modification time within ±[`MTIME_JITTER_SECS`] of now
pub fn jittered_now<R: Rng + ?Sized>(rng: &mut R) -> SystemTime {
    let offset = rng.gen_range(-MTIME_JITTER_SECS..=MTIME_JITTER_SECS);
    let now = SystemTime::now();
    let shift = Duration::from_secs(offset.unsigned_abs());
    if offset < 0 {
        now.checked_sub(shift).unwrap_or(now)
    } else {
        now.checked_add(shift).unwrap_or(now)
    }
}

/// Set the mtime of each path; failures are logged and skipped
pub fn set_mtime(paths: &[&Path], time: SystemTime) -> usize {
    let mut touched = 0;
    for path in paths {
        let result = fs::File::options()
            .write(true)
            .open(path)
            .and_then(|file| file.set_modified(time));
        match result {
            Ok(()) => touched += 1,
            Err(e) => log::warn!("cannot set mtime on {}: {}", path.display(), e),
        }
    }
    touched
}

/// Launcher icon of a decoded tree: densest folder first, then name, then
/// `mipmap-` before `drawable-`, then png before webp
pub fn find_launcher_icon(src_dir: &Path) -> Option<PathBuf> {
    let res = src_dir.join("res");
    if !res.is_dir() {
        return None;
    }
    for density in ICON_DENSITIES {
        for name in ICON_NAMES {
            for prefix in ICON_FOLDER_PREFIXES {
                let folder = res.join(format!("{}{}", prefix, density));
                if !folder.is_dir() {
                    continue;
                }
                let found = ICON_EXTENSIONS
                    .iter()
                    .map(|ext| folder.join(format!("{}.{}", name, ext)))
                    .find(|candidate| candidate.is_file());
                if found.is_some() {
                    return found;
                }
            }
        }
    }
    None
}
