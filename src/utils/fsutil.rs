use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sysinfo::{DiskExt, System, SystemExt};
use walkdir::{DirEntry, WalkDir};

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Total size in bytes of all regular files below `path`.
///
/// Unreadable entries are skipped rather than aborting the walk, so a
/// partially unmounted disk still yields a usable size estimate.
pub fn folder_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Size of a single path: file length, or recursive size for a directory.
pub fn path_size(path: &Path) -> u64 {
    if path.is_dir() {
        folder_size(path)
    } else {
        fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }
}

/// List directories and files sitting at exactly `level` below `root`.
///
/// Direct children are level 1. Hidden directories are pruned at every
/// depth, and the walk never descends below the target level. Returns
/// `(dirs, files)` where files are the ones inside level `level - 1`
/// directories.
pub fn list_level_entries(root: &Path, level: usize) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(level)
        .max_depth(level)
        .into_iter()
        .filter_entry(|e| !is_hidden_dir(e));

    for entry in walker.flatten() {
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        } else {
            files.push(entry.into_path());
        }
    }

    (dirs, files)
}

/// Remove a file or directory tree, tolerating a missing path.
pub fn remove_path(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Recreate `path` as an empty directory, clearing any previous content.
pub fn ensure_clean_dir(path: &Path) -> io::Result<()> {
    remove_path(path)?;
    fs::create_dir_all(path)
}

/// Copy a file, or a directory tree recursively, to `dest`.
///
/// `dest` names the target itself, not its parent. Existing files are
/// overwritten.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    if src.is_file() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dest)?;
        return Ok(());
    }

    for entry in WalkDir::new(src) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Free bytes on the filesystem holding `path`, when it can be resolved.
///
/// Picks the mounted disk with the longest mount point prefix of `path`.
pub fn free_space_under(path: &Path) -> Option<u64> {
    let mut system = System::new();
    system.refresh_disks_list();
    system
        .disks()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
}
