//! Freeform clip discovery.
//!
//! Walks the whole input tree. Every `clip_*` folder ships compressed
//! as its own package, and sidecar files (tar archives, or a JSON named
//! after its folder) ship untouched as single-file packages. Each clip
//! folder also receives a marker naming the batch it left with.

use std::fs;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde_json::{json, Value};
use walkdir::{DirEntry, WalkDir};

use super::{PackageRegistry, PackageSource};
use crate::config::TaskInfo;
use crate::constants::{BATCH_MARKER_FILE, BYTES_PER_GB};
use crate::models::{FileEntry, Group, Package};
use crate::utils::fsutil::{folder_size, path_size};

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Sidecar files ride along clip folders: tar archives, or a JSON
/// descriptor carrying the same name as the folder holding it.
fn is_sidecar(name: &str, parent_name: &str) -> bool {
    if name.ends_with(".tar") || name.ends_with(".tar.gz") {
        return true;
    }
    name.ends_with(".json") && name.trim_end_matches(".json") == parent_name
}

pub struct ClipSource {
    info: TaskInfo,
    sn: String,
    batch_name: String,
    remove_after_upload: bool,
}

impl ClipSource {
    pub fn new(info: &TaskInfo, sn: &str) -> Self {
        let batch_name = info
            .output_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        info!("Current batch name is {}", batch_name);

        ClipSource {
            info: info.clone(),
            sn: sn.to_string(),
            batch_name,
            remove_after_upload: info.bool_tag("remove_after_upload"),
        }
    }

    /// Static extras merged into this package's status notification.
    fn package_meta(&self, package: &Package) -> Value {
        let files: Vec<String> = package
            .file_list
            .iter()
            .map(|entry| entry.rel_path.to_string_lossy().to_string())
            .collect();
        json!({
            "source": self.info.input_root.to_string_lossy(),
            "file_size": package.size as f64 / BYTES_PER_GB,
            "package_name": files,
        })
    }

    fn admit_single(&self, package: Package, registry: &mut PackageRegistry) -> Result<()> {
        let size = package.size;
        if let Some(package) = registry.try_admit(package)? {
            let mut group = Group::new(&package.key);
            group.packages.push(package);
            registry.add_group(group);
            registry.add_pending(size);
        }
        Ok(())
    }

    fn collect_clip_folder(&self, path: &Path, registry: &mut PackageRegistry) -> Result<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let rel = path.strip_prefix(&self.info.input_root).unwrap_or(path);

        let mut entry = FileEntry::new(
            path.to_path_buf(),
            rel.join(format!("{}.zip", name)),
            folder_size(path),
        );
        entry.remove_after_transfer = true;
        entry.compress_before_transfer = true;

        // Record which batch this clip left with
        if let Err(err) = fs::write(path.join(BATCH_MARKER_FILE), &self.batch_name) {
            warn!("Could not write batch marker into {}: {}", path.display(), err);
        }

        let mut package = Package::new(&self.sn, &name, self.info.input_root.clone());
        package.data_type = Some("zgm".to_string());
        package.push_entry(entry);
        package.message_meta = Some(self.package_meta(&package));

        self.admit_single(package, registry)
    }

    fn collect_sidecar(&self, path: &Path, registry: &mut PackageRegistry) -> Result<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let rel_dir = path
            .parent()
            .and_then(|parent| parent.strip_prefix(&self.info.input_root).ok())
            .unwrap_or_else(|| Path::new(""));
        let size = path_size(path);

        let mut entry = FileEntry::new(path.to_path_buf(), rel_dir.join(&name), size);
        entry.remove_after_transfer = self.remove_after_upload;

        let mut package = Package::new(&self.sn, &name, self.info.input_root.clone());
        package.data_type = Some("zgs".to_string());
        package.push_entry(entry);
        package.message_meta = Some(self.package_meta(&package));

        self.admit_single(package, registry)
    }
}

#[async_trait]
impl PackageSource for ClipSource {
    async fn discover(&mut self, registry: &mut PackageRegistry) -> Result<()> {
        let input_root = self.info.input_root.clone();
        let walker = WalkDir::new(&input_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_hidden_dir(entry));

        for entry in walker.flatten() {
            if entry.depth() == 0 {
                continue;
            }
            let name = match entry.file_name().to_str() {
                Some(name) => name.to_string(),
                None => continue,
            };

            if entry.file_type().is_dir() && name.starts_with("clip_") {
                self.collect_clip_folder(entry.path(), registry)?;
            } else if entry.file_type().is_file() {
                let parent_name = entry
                    .path()
                    .parent()
                    .and_then(|parent| parent.file_name())
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                if is_sidecar(&name, parent_name) {
                    self.collect_sidecar(entry.path(), registry)?;
                }
            }
        }

        info!("{} groups queued for upload", registry.groups.len());
        Ok(())
    }
}
