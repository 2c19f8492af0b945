//! Trip-folder discovery for recorder disks.
//!
//! Trip roots sit a fixed number of levels below the input root and
//! carry a calendar date in their name. Inside each trip, recorder
//! clips become packages of their own while the remaining loose files
//! are staged aside and shipped as one shared archive that rides along
//! with every clip package of that trip.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde_json::Value;

use super::{write_invalid_package_report, PackageRegistry, PackageSource};
use crate::config::TaskInfo;
use crate::constants::{STAGE_DIR_NAME, TRIP_ROOT_LEVEL};
use crate::models::{FileEntry, Group, Package};
use crate::utils::archive::archive_folder;
use crate::utils::fsutil::{copy_tree, ensure_clean_dir, folder_size, list_level_entries, path_size};

lazy_static! {
    static ref TRIP_ROOT_RE: Regex = Regex::new(r"^car_(\d{4})-(\d{2})-(\d{2})").unwrap();
}

/// True for folder names like `car_2025-03-01_highway` whose embedded
/// date is a real calendar day.
fn is_trip_root(name: &str) -> bool {
    let captures = match TRIP_ROOT_RE.captures(name) {
        Some(captures) => captures,
        None => return false,
    };
    let year: i32 = captures[1].parse().unwrap_or(0);
    let month: u32 = captures[2].parse().unwrap_or(0);
    let day: u32 = captures[3].parse().unwrap_or(0);
    NaiveDate::from_ymd_opt(year, month, day).is_some()
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Recorder output must carry a `storage_info.json` with collection
/// metadata before it is worth shipping.
fn validate_raw_data(clip_path: &Path) -> Result<(), String> {
    let info_path = clip_path.join("storage_info.json");
    if !info_path.exists() {
        return Err("missing storage_info.json".to_string());
    }
    match read_json(&info_path) {
        Ok(content) if content.get("collectInfo").is_some() => Ok(()),
        Ok(_) => Err("key 'collectInfo' not found in storage_info.json".to_string()),
        Err(_) => Err("unreadable storage_info.json".to_string()),
    }
}

/// Trigger captures describe their vehicle in `metadata/vehicle_desc.json`.
fn validate_trigger(clip_path: &Path) -> Result<(), String> {
    let meta_root = clip_path.join("metadata");
    if !meta_root.exists() {
        return Err("missing metadata folder".to_string());
    }
    let desc_path = meta_root.join("vehicle_desc.json");
    if !desc_path.exists() {
        return Err("missing vehicle_desc.json".to_string());
    }
    match read_json(&desc_path) {
        Ok(content) if content.get("collect_info").is_some() => Ok(()),
        Ok(_) => Err("key 'collect_info' not found in vehicle_desc.json".to_string()),
        Err(_) => Err("unreadable vehicle_desc.json".to_string()),
    }
}

pub struct TripSource {
    info: TaskInfo,
    sn: String,
    invalid: Vec<(PathBuf, String)>,
}

impl TripSource {
    pub fn new(info: &TaskInfo, sn: &str) -> Self {
        TripSource {
            info: info.clone(),
            sn: sn.to_string(),
            invalid: Vec::new(),
        }
    }

    fn collect_trip(&mut self, trip_root: &Path, registry: &mut PackageRegistry) -> Result<()> {
        let trip_name = trip_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let trip_rel = trip_root
            .strip_prefix(&self.info.input_root)
            .unwrap_or(trip_root)
            .to_path_buf();

        // Loose trip files are copied aside so they can ship as one archive
        let misc_root = self.info.output_root.join("tmp").join(&trip_name);
        let common_stage = self
            .info
            .output_root
            .join(STAGE_DIR_NAME)
            .join(&trip_name)
            .join("common_part");
        ensure_clean_dir(&misc_root)?;
        fs::create_dir_all(&common_stage)?;

        let mut children: Vec<PathBuf> = fs::read_dir(trip_root)?
            .flatten()
            .map(|entry| entry.path())
            .collect();
        children.sort();

        let mut clip_entries = Vec::new();
        for child in children {
            let name = child
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            let check = if name.starts_with("AIPC_DATA") && child.is_dir() {
                validate_raw_data(&child)
            } else if name.starts_with("trigger_") && child.is_dir() {
                validate_trigger(&child)
            } else if name.contains("dlog") {
                warn!("Skipping {}", child.display());
                continue;
            } else {
                copy_tree(&child, &misc_root.join(&name))
                    .context(format!("Failed to stage {}", child.display()))?;
                continue;
            };

            if let Err(reason) = check {
                warn!("Rejecting {}: {}", child.display(), reason);
                self.invalid.push((child, reason));
                continue;
            }

            let mut entry = FileEntry::new(
                child.clone(),
                trip_rel.join(format!("{}.zip", name)),
                folder_size(&child),
            );
            entry.remove_after_transfer = true;
            entry.compress_before_transfer = true;
            clip_entries.push(entry);
        }
        info!("Trip {} holds {} clip packages", trip_name, clip_entries.len());

        // The loose files are archived once up front; every clip package
        // of this trip carries the same archive entry
        let common_archive = archive_folder(&misc_root, &common_stage)?;
        let common_size = path_size(&common_archive);
        let common_name = common_archive
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let common_entry = FileEntry::new(common_archive, trip_rel.join(common_name), common_size);

        for clip_entry in clip_entries {
            let clip_size = clip_entry.size;
            let key = clip_entry
                .abs_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            let mut package = Package::new(&self.sn, &key, self.info.input_root.clone());
            package.push_entry(clip_entry);
            package.push_entry(common_entry.clone());

            if let Some(package) = registry.try_admit(package)? {
                let mut group = Group::new(&key);
                group.packages.push(package);
                registry.add_group(group);
                registry.add_pending(clip_size);
            }
        }
        registry.add_pending(common_entry.size);
        Ok(())
    }
}

#[async_trait]
impl PackageSource for TripSource {
    async fn discover(&mut self, registry: &mut PackageRegistry) -> Result<()> {
        let (level_dirs, _) = list_level_entries(&self.info.input_root, TRIP_ROOT_LEVEL);
        let mut trip_roots: Vec<PathBuf> = level_dirs
            .into_iter()
            .filter(|dir| {
                dir.file_name()
                    .and_then(|n| n.to_str())
                    .map(is_trip_root)
                    .unwrap_or(false)
            })
            .collect();
        trip_roots.sort();
        info!(
            "Found {} trip folders under {}",
            trip_roots.len(),
            self.info.input_root.display()
        );

        for trip_root in trip_roots {
            self.collect_trip(&trip_root, registry)?;
        }

        write_invalid_package_report(&self.info.output_root, &self.sn, &self.invalid)?;
        Ok(())
    }
}
