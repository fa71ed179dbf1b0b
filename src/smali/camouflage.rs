// Filler asset and drawable so each hardened build differs in content

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{SmaliError, SmaliResult};

const ASSET_NAMES: &[&str] = &[
    "remote_config.txt",
    "app_params.txt",
    "fallback_strings.txt",
    "build_metadata.txt",
    "version_info.txt",
    "updated_api_call.txt",
];

const ASSET_HEADLINES: &[&str] = &[
    "fallback_config=stable",
    "build_timestamp=2025-12-15",
    "Do not modify this file manually",
    "Build properties has been updated",
    "Version name was changed",
    "Api endpoint changed successfully",
];

const DRAWABLE_DENSITIES: &[&str] = &[
    "drawable-mdpi",
    "drawable-hdpi",
    "drawable-xhdpi",
    "drawable-xxhdpi",
    "drawable-xxxhdpi",
];

const DRAWABLE_NAMES: &[&str] = &[
    "ic_bg_splash.png",
    "bg_gradient.png",
    "placeholder.png",
    "default_thumb.png",
    "loading_bg.png",
    "empty_state.png",
    "banner_placeholder.png",
    "ic_empty_view.png",
    "splash_bg_placeholder.png",
    "thumb_fallback.png",
];

/// 1x1 greyscale PNG
const FILLER_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVQYV2NgYAAAAAMAAWgmWQ0AAAAASUVORK5CYII=";

/// Filler files actually written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CamouflageReport {
    pub asset: Option<PathBuf>,
    pub drawable: Option<PathBuf>,
}

impl CamouflageReport {
    pub fn files_added(&self) -> usize {
        usize::from(self.asset.is_some()) + usize::from(self.drawable.is_some())
    }
}

/// First candidate name, in random order, not already taken in `dir`
fn free_name<R: Rng + ?Sized>(dir: &Path, candidates: &[&str], rng: &mut R) -> SmaliResult<PathBuf> {
    let mut shuffled = candidates.to_vec();
    shuffled.shuffle(rng);
    shuffled
        .into_iter()
        .map(|name| dir.join(name))
        .find(|path| !path.exists())
        .ok_or_else(|| SmaliError::NoFreeName(dir.to_path_buf()))
}

/// Write a plausible text file under `assets/`
pub fn add_filler_asset<R: Rng + ?Sized>(src_dir: &Path, rng: &mut R) -> SmaliResult<PathBuf> {
    let assets = src_dir.join("assets");
    fs::create_dir_all(&assets).map_err(SmaliError::io(&assets))?;

    let path = free_name(&assets, ASSET_NAMES, rng)?;
    let headline = ASSET_HEADLINES.choose(rng).copied().unwrap_or_default();
    let noise_len = rng.gen_range(30..=120);
    let noise: String = (0..noise_len).map(|_| char::from(rng.sample(Alphanumeric))).collect();

    fs::write(&path, format!("{}\n{}", headline, noise)).map_err(SmaliError::io(&path))?;
    Ok(path)
}

/// Write a 1x1 PNG into a random `res/drawable-*dpi` folder
pub fn add_filler_drawable<R: Rng + ?Sized>(src_dir: &Path, rng: &mut R) -> SmaliResult<PathBuf> {
    let density = DRAWABLE_DENSITIES.choose(rng).copied().unwrap_or("drawable-mdpi");
    let folder = src_dir.join("res").join(density);
    fs::create_dir_all(&folder).map_err(SmaliError::io(&folder))?;

    let path = free_name(&folder, DRAWABLE_NAMES, rng)?;
    let png = STANDARD
        .decode(FILLER_PNG_BASE64)
        .map_err(|e| SmaliError::Io {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
    fs::write(&path, png).map_err(SmaliError::io(&path))?;
    Ok(path)
}

/// Add both filler files; failures are logged and leave the slot empty
pub fn add_camouflage<R: Rng + ?Sized>(src_dir: &Path, rng: &mut R) -> CamouflageReport {
    let asset = add_filler_asset(src_dir, rng)
        .map_err(|e| log::warn!("filler asset skipped: {}", e))
        .ok();
    let drawable = add_filler_drawable(src_dir, rng)
        .map_err(|e| log::warn!("filler drawable skipped: {}", e))
        .ok();
    CamouflageReport { asset, drawable }
}
