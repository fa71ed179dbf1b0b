// Package rename across smali roots and text resources

use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::error::{SmaliError, SmaliResult};
use crate::manifest::is_valid_package_name;

/// Extensions of files the dotted-identity sweep rewrites
const SWEPT_EXTENSIONS: &[&str] = &["smali", "xml", "yml", "json", "properties", "txt"];

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const LOWER_ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// What a rename touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    /// smali roots whose package directory was moved
    pub moved_roots: usize,
    /// `.smali` files whose type descriptors were rewritten
    pub rewritten_descriptors: usize,
    /// files whose dotted identity literal was rewritten
    pub swept_files: usize,
}

impl RenameReport {
    pub fn files_rewritten(&self) -> usize {
        self.rewritten_descriptors + self.swept_files
    }
}

/// `com.` + 3 lowercase letters + `.` + 10 lowercase alphanumerics.
///
/// The last segment always starts with a letter; the platform rejects
/// package segments that start with a digit.
pub fn random_package_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let pick = |rng: &mut R, alphabet: &[u8], n: usize| -> String {
        (0..n)
            .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
            .collect()
    };
    let middle = pick(&mut *rng, LOWERCASE, 3);
    let tail = pick(&mut *rng, LOWERCASE, 1) + &pick(&mut *rng, LOWER_ALNUM, 9);
    format!("com.{}.{}", middle, tail)
}

/// Top-level `smali*` directories of a decoded tree, sorted
pub fn smali_roots(src_dir: &Path) -> SmaliResult<Vec<PathBuf>> {
    let mut roots: Vec<PathBuf> = fs::read_dir(src_dir)
        .map_err(SmaliError::io(src_dir))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir() && entry.file_name().to_string_lossy().starts_with("smali"))
        .map(|entry| entry.path())
        .collect();
    roots.sort();
    Ok(roots)
}

/// Move every class of `old` to `new` and rewrite all references.
///
/// In each smali root the `old` package directory is moved (merged when the
/// target already exists) and `L{old}/` descriptors are rewritten in every
/// `.smali` file. Then the dotted literal is replaced in every text file of
/// the tree. The manifest `package` attribute is not touched here.
pub fn rename_package(src_dir: &Path, old: &str, new: &str) -> SmaliResult<RenameReport> {
    for package in [old, new] {
        if !is_valid_package_name(package) {
            return Err(SmaliError::InvalidPackage(package.to_string()));
        }
    }
    let mut report = RenameReport::default();
    if old == new {
        return Ok(report);
    }

    let old_path = old.replace('.', "/");
    let new_path = new.replace('.', "/");
    let old_descriptor = format!("L{}/", old_path);
    let new_descriptor = format!("L{}/", new_path);

    for root in smali_roots(src_dir)? {
        let from = root.join(&old_path);
        if from.is_dir() {
            relocate(&root, &from, &root.join(&new_path))?;
            report.moved_roots += 1;
        }

        for entry in WalkDir::new(&root) {
            let entry = entry?;
            if entry.file_type().is_file() && has_extension(entry.path(), &["smali"]) {
                if replace_in_file(entry.path(), &old_descriptor, &new_descriptor)? {
                    report.rewritten_descriptors += 1;
                }
            }
        }
    }

    for entry in WalkDir::new(src_dir) {
        let entry = entry?;
        if entry.file_type().is_file() && has_extension(entry.path(), SWEPT_EXTENSIONS) {
            if replace_in_file(entry.path(), old, new)? {
                report.swept_files += 1;
            }
        }
    }

    log::info!(
        "renamed {} -> {}: {} roots moved, {} descriptor files, {} literal files",
        old,
        new,
        report.moved_roots,
        report.rewritten_descriptors,
        report.swept_files
    );
    Ok(report)
}

/// Move `from` to `to` through a scratch name so that nested renames
/// (`a.b` to `a.b.c` and back) never move a directory into itself
fn relocate(root: &Path, from: &Path, to: &Path) -> SmaliResult<()> {
    let scratch = root.join(format!(".rename-{}", uuid::Uuid::new_v4().simple()));
    fs::rename(from, &scratch).map_err(SmaliError::io(from))?;
    prune_empty_parents(root, from);
    merge_into(&scratch, to)
}

fn merge_into(from: &Path, to: &Path) -> SmaliResult<()> {
    if !to.exists() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(SmaliError::io(parent))?;
        }
        return fs::rename(from, to).map_err(SmaliError::io(from));
    }

    for entry in fs::read_dir(from).map_err(SmaliError::io(from))? {
        let entry = entry.map_err(SmaliError::io(from))?;
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            merge_into(&entry.path(), &target)?;
        } else {
            fs::rename(entry.path(), &target).map_err(SmaliError::io(entry.path()))?;
        }
    }
    fs::remove_dir(from).map_err(SmaliError::io(from))
}

/// Remove directories left empty by a move, stopping at `root`
fn prune_empty_parents(root: &Path, moved: &Path) {
    let mut current = moved.parent();
    while let Some(dir) = current {
        if dir == root || fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|wanted| ext.eq_ignore_ascii_case(wanted)))
        .unwrap_or(false)
}

/// Literal replacement; files that are not UTF-8 are left alone
fn replace_in_file(path: &Path, from: &str, to: &str) -> SmaliResult<bool> {
    let bytes = fs::read(path).map_err(SmaliError::io(path))?;
    let Ok(content) = String::from_utf8(bytes) else {
        log::debug!("skipping non UTF-8 file {}", path.display());
        return Ok(false);
    };
    if !content.contains(from) {
        return Ok(false);
    }
    fs::write(path, content.replace(from, to)).map_err(SmaliError::io(path))?;
    Ok(true)
}
