//! Manifest-driven batch discovery.
//!
//! The input root carries CSV manifests describing vehicle groups:
//! collect date, VIN, source disk serial and the expected bag totals.
//! Bags sit two directory levels below each vehicle folder and are
//! accumulated into clips of a fixed byte budget. On first contact the
//! clips are registered with the task manager for data ids and the
//! whole disk layout is recorded with the remote record service; a
//! cache file stamped into the input root lets a rerun resume from the
//! service copy instead of re-registering.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use log::{error, info, warn};
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::{PackageRegistry, PackageSource};
use crate::config::TaskInfo;
use crate::constants::{BAG_PACKAGE_LEVEL, BATCH_CLIP_SIZE, SN_MARKER_FILE, UPLOAD_CACHE_FILE};
use crate::models::{FileEntry, Group, Package};
use crate::platform::jobs;
use crate::platform::remote_ledger::{
    upload_state, BagRecord, ClipRecord, DiskRecord, GroupRecord, RemoteLedgerClient,
};
use crate::platform::{PlatformClient, PlatformUnreachable};
use crate::utils::fsutil::list_level_entries;

/// Record-service data type for each source-type code. Unknown codes
/// pass through unchanged.
fn record_data_type(source_type: &str) -> String {
    match source_type {
        "agb" => "ubm",
        "agp" => "upm",
        "agt" => "t68",
        "agd" => "l2_dagger",
        "ag3" => "upm_14_15",
        "agc" => "upm_21",
        "age" => "t68_com",
        "agf" => "ay5",
        "ags" => "s7",
        "agh" => "thor_dagger",
        other => other,
    }
    .to_string()
}

/// Curated-zone path root for each source-type code, with the bucket
/// name substituted in.
fn yellow_path_root(source_type: &str, yellow_bucket: &str) -> String {
    let template = match source_type {
        "agb" => "oss://{bucket_name}/ubm/source/",
        "agp" => "oss://{bucket_name}/upm/source/",
        "agt" => "oss://{bucket_name}/t68/source/",
        "agd" => "oss://{bucket_name}/ubm/source/L2_Dagger/",
        "ag3" => "oss://{bucket_name}/upm/source/upm_A13Y_data/",
        "agc" => "oss://{bucket_name}/upm/source/upm_A13Y_021_data/",
        "age" => "oss://{bucket_name}/t68_com/huawei/raw_com_data/",
        "agf" => "oss://{bucket_name}/ubm/source/ubmthor_AY5/",
        "ags" => "oss://{bucket_name}/ubm/source/ubmthor_T68/",
        "agh" => "oss://{bucket_name}/ubm/source/ubmthor_dagger/",
        _ => "{bucket_name}",
    };
    template.replace("{bucket_name}", yellow_bucket)
}

/// One data row of a disk manifest CSV.
#[derive(Debug, Clone, PartialEq)]
struct ManifestRow {
    collect_date: String,
    vin: String,
    source_disk_sn: String,
    bag_count: u64,
    bag_size: u64,
}

/// Parse manifest rows, dropping the header line, the trailing totals
/// row and anything too short to carry the five expected columns.
fn parse_manifest(content: &str) -> Vec<ManifestRow> {
    let mut rows = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line_no == 0 || line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        if cols[0] == "total" {
            continue;
        }
        if cols.len() < 5 {
            warn!("Skipping malformed manifest row: {}", line);
            continue;
        }
        rows.push(ManifestRow {
            collect_date: cols[0].to_string(),
            vin: cols[1].to_string(),
            source_disk_sn: cols[2].to_string(),
            bag_count: cols[3].parse().unwrap_or(0),
            bag_size: cols[4].parse().unwrap_or(0),
        });
    }
    rows
}

/// Split a run of bags into clips. A clip closes as soon as its size
/// reaches the budget; the final clip keeps whatever remains.
fn accumulate_clips(bags: Vec<(BagRecord, u64)>, budget: u64) -> Vec<ClipRecord> {
    let mut clips = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0u64;
    for (bag, size) in bags {
        current.push(bag);
        current_size += size;
        if current_size >= budget {
            clips.push(ClipRecord {
                data_id: String::new(),
                state: upload_state::INIT,
                bag_infos: std::mem::take(&mut current),
            });
            current_size = 0;
        }
    }
    if !current.is_empty() {
        clips.push(ClipRecord {
            data_id: String::new(),
            state: upload_state::INIT,
            bag_infos: current,
        });
    }
    clips
}

fn yaml_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Pull the recorder timing fields out of a bag's `metadata.yaml` as
/// (duration, nanoseconds since epoch, wall-clock time). A missing or
/// malformed file yields empty strings rather than failing the bag.
fn load_bag_metadata(path: &Path) -> (String, String, String) {
    if !path.exists() {
        error!("Missing {}", path.display());
        return (String::new(), String::new(), String::new());
    }
    let parsed = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| serde_yaml::from_str::<serde_yaml::Value>(&content).map_err(anyhow::Error::from));
    let root = match parsed {
        Ok(root) => root,
        Err(err) => {
            error!("Could not parse {}: {}", path.display(), err);
            return (String::new(), String::new(), String::new());
        }
    };
    let recorder = &root["gacbag_bagfile_information"];
    (
        yaml_to_string(&recorder["duration"]["seconds"]),
        yaml_to_string(&recorder["starting_time"]["nanoseconds_since_epoch"]),
        yaml_to_string(&recorder["starting_time"]["time"]),
    )
}

/// Local scan result for one bag folder, kept aside until the service
/// copy of the disk record comes back.
struct ScannedBag {
    local_path: PathBuf,
    size: u64,
    files: Vec<FileEntry>,
}

pub struct BatchSource {
    info: TaskInfo,
    client: PlatformClient,
    sn: String,
    source_type: String,
    upload_date: String,
}

impl BatchSource {
    pub fn new(info: &TaskInfo, client: PlatformClient, sn: &str) -> Self {
        BatchSource {
            info: info.clone(),
            client,
            sn: sn.to_string(),
            source_type: info.tag("source_type").unwrap_or_default().to_string(),
            upload_date: Local::now().format("%Y%m%d").to_string(),
        }
    }

    /// Walk one bag folder: build its record with the placeholder red
    /// path, list every file, then stamp the disk serial marker into
    /// the folder.
    fn scan_package(&self, package_root: &Path, bagid_prefix: &str) -> (BagRecord, ScannedBag) {
        let base_name = package_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let bag_id = format!("{}_{}", bagid_prefix, base_name);
        let rel_path = package_root
            .strip_prefix(&self.info.input_root)
            .unwrap_or(package_root)
            .to_string_lossy()
            .to_string();

        let red_bucket = self.info.tag("red_bucket_name").unwrap_or_default();
        let yellow_bucket = self.info.tag("yellow_bucket_name").unwrap_or_default();
        let red_oss_path = format!(
            "oss://{}/{}/gpg/DATAID/{}",
            red_bucket, self.source_type, rel_path
        );
        let yellow_oss_path = format!(
            "{}{}",
            yellow_path_root(&self.source_type, yellow_bucket),
            rel_path
        );

        let mut files = Vec::new();
        let mut size = 0u64;
        for entry in WalkDir::new(package_root)
            .sort_by_file_name()
            .into_iter()
            .flatten()
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let file_size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let rel = entry
                .path()
                .strip_prefix(&self.info.input_root)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(FileEntry::new(entry.path().to_path_buf(), rel, file_size));
            size += file_size;
        }

        if let Err(err) = fs::write(package_root.join(SN_MARKER_FILE), &self.sn) {
            warn!(
                "Could not stamp {} into {}: {}",
                SN_MARKER_FILE,
                package_root.display(),
                err
            );
        }

        let record = BagRecord {
            id: None,
            bag_id,
            red_oss_path,
            yellow_oss_path,
            state: upload_state::INIT,
        };
        (
            record,
            ScannedBag {
                local_path: package_root.to_path_buf(),
                size,
                files,
            },
        )
    }

    /// Scan every bag folder under a vehicle directory and partition
    /// the run into clips.
    fn scan_group(
        &self,
        group_root: &Path,
        bagid_prefix: &str,
    ) -> (Vec<ClipRecord>, HashMap<String, ScannedBag>) {
        let (mut package_roots, _) = list_level_entries(group_root, BAG_PACKAGE_LEVEL);
        if package_roots.is_empty() {
            error!("No bag folders found under {}", group_root.display());
            return (Vec::new(), HashMap::new());
        }
        package_roots.sort();

        let mut scanned_bags = HashMap::new();
        let mut sized = Vec::new();
        for package_root in package_roots {
            let (record, scanned) = self.scan_package(&package_root, bagid_prefix);
            sized.push((record.clone(), scanned.size));
            scanned_bags.insert(record.bag_id, scanned);
        }
        (accumulate_clips(sized, BATCH_CLIP_SIZE), scanned_bags)
    }

    /// Read the manifests and build the local disk record. Returns the
    /// record, the per-bag scan results and the total byte count.
    fn scan_disk(&self) -> Result<(DiskRecord, HashMap<String, ScannedBag>, u64)> {
        let mut manifests: Vec<PathBuf> = fs::read_dir(&self.info.input_root)
            .with_context(|| format!("Failed to read {}", self.info.input_root.display()))?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().map(|e| e == "csv").unwrap_or(false))
            .collect();
        if manifests.is_empty() {
            bail!(
                "No disk manifest found under {}",
                self.info.input_root.display()
            );
        }
        manifests.sort();

        let mut rows = Vec::new();
        for manifest in &manifests {
            let content = fs::read_to_string(manifest)
                .with_context(|| format!("Failed to read {}", manifest.display()))?;
            rows.extend(parse_manifest(&content));
        }

        let yellow_bucket = self
            .info
            .tag("yellow_bucket_name")
            .unwrap_or_default()
            .to_string();
        let mut groups: Vec<(GroupRecord, HashMap<String, ScannedBag>)> = Vec::new();
        for row in rows {
            let collect_root = self.info.input_root.join(&row.collect_date);
            if !collect_root.exists() {
                error!("Missing collect folder {}", collect_root.display());
                continue;
            }
            let mut vehicle_dirs: Vec<PathBuf> = fs::read_dir(&collect_root)
                .with_context(|| format!("Failed to read {}", collect_root.display()))?
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            vehicle_dirs.sort();

            for vehicle_dir in vehicle_dirs {
                let vname = vehicle_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if !vname.contains(&row.vin) {
                    continue;
                }
                // Vehicle folders are either "{car}_{vin}" or the bare VIN
                let (car_id, bagid_prefix) = match vname.split_once('_') {
                    Some((car, _)) => (car.to_string(), car.to_string()),
                    None => (String::new(), row.vin.clone()),
                };

                let group_id = format!("{}_{}", row.vin, row.collect_date);
                if let Some((existing, _)) = groups.iter_mut().find(|(g, _)| g.group_id == group_id)
                {
                    // Another manifest row for the same vehicle and day
                    // folds into the first; its scan is discarded.
                    existing.source_bag_count += row.bag_count;
                    existing.source_bag_size += row.bag_size;
                    existing.source_disk_sn =
                        format!("{}/{}", existing.source_disk_sn, row.source_disk_sn);
                    continue;
                }

                let (clips, scanned_bags) = self.scan_group(&vehicle_dir, &bagid_prefix);

                let mut children: Vec<PathBuf> = fs::read_dir(&vehicle_dir)
                    .with_context(|| format!("Failed to read {}", vehicle_dir.display()))?
                    .flatten()
                    .map(|e| e.path())
                    .collect();
                children.sort();
                let head = children.first().cloned().unwrap_or_else(|| vehicle_dir.clone());
                let head_rel = head
                    .strip_prefix(&self.info.input_root)
                    .unwrap_or(&head)
                    .to_string_lossy()
                    .to_string();

                let record = GroupRecord {
                    group_id,
                    car_id,
                    source_disk_sn: row.source_disk_sn.clone(),
                    vin: row.vin.clone(),
                    collect_date: row.collect_date.clone(),
                    yellow_oss_path: format!(
                        "{}{}",
                        yellow_path_root(&self.source_type, &yellow_bucket),
                        head_rel
                    ),
                    state: upload_state::INIT,
                    source_bag_count: row.bag_count,
                    source_bag_size: row.bag_size,
                    data_infos: clips,
                };
                groups.push((record, scanned_bags));
            }
        }

        let mut disk = DiskRecord {
            id: None,
            sn_num: self.sn.clone(),
            data_type: record_data_type(&self.source_type),
            upload_date: self.upload_date.clone(),
            state: upload_state::INIT,
            group_infos: Vec::new(),
        };
        let mut bag_files: HashMap<String, ScannedBag> = HashMap::new();
        let mut total_bytes = 0u64;
        for (record, scanned_bags) in groups {
            for (bag_id, scanned) in scanned_bags {
                if bag_files.contains_key(&bag_id) {
                    bail!("Duplicate bag id {} across vehicle groups", bag_id);
                }
                total_bytes += scanned.size;
                bag_files.insert(bag_id, scanned);
            }
            disk.group_infos.push(record);
        }
        Ok((disk, bag_files, total_bytes))
    }

    /// Resume from the record service when the cache marker exists,
    /// otherwise register every clip and the disk layout, then drop
    /// the marker.
    async fn load_or_register(
        &mut self,
        mut disk: DiskRecord,
        bag_files: &HashMap<String, ScannedBag>,
        ledger: &RemoteLedgerClient,
    ) -> Result<DiskRecord> {
        let cache_path = self.info.input_root.join(UPLOAD_CACHE_FILE);
        if cache_path.exists() {
            let content = fs::read_to_string(&cache_path)
                .with_context(|| format!("Failed to read {}", cache_path.display()))?;
            let cache: Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", cache_path.display()))?;
            if let Some(sn) = cache.get("sn").and_then(Value::as_str) {
                self.sn = sn.to_string();
            }
            if let Some(upload_date) = cache.get("upload_date").and_then(Value::as_str) {
                self.upload_date = upload_date.to_string();
            }
            warn!(
                "Disk {} was already registered on {}, resuming from the record service",
                self.sn, self.upload_date
            );
            return ledger
                .find_disk(&self.sn, &self.upload_date)
                .await
                .ok_or_else(|| {
                    anyhow::Error::new(PlatformUnreachable(format!(
                        "No disk record found for {} on {}",
                        self.sn, self.upload_date
                    )))
                });
        }

        for group in &mut disk.group_infos {
            for clip in &mut group.data_infos {
                let lead = clip
                    .bag_infos
                    .first()
                    .ok_or_else(|| anyhow!("Clip without bags in group {}", group.group_id))?;
                let lead_size = bag_files.get(&lead.bag_id).map(|b| b.size).unwrap_or(0);
                let data_id =
                    jobs::register_clip(&self.client, &self.info, &lead.bag_id, lead_size).await?;
                clip.assign_data_id(&data_id);
            }
        }

        let reply = ledger.create_disk(&disk).await.ok_or_else(|| {
            anyhow::Error::new(PlatformUnreachable(format!(
                "Failed to register the disk record for {}",
                self.sn
            )))
        })?;
        let registered: DiskRecord = serde_json::from_value(reply)
            .context("Record service returned an unexpected disk shape")?;

        let cache = json!({ "sn": self.sn, "upload_date": self.upload_date });
        fs::write(&cache_path, cache.to_string())
            .with_context(|| format!("Failed to write {}", cache_path.display()))?;
        info!("Disk {} registered on {}", self.sn, self.upload_date);
        Ok(registered)
    }

    /// Status-notification extras for one bag: vehicle identity from
    /// the folder layout plus recorder timings from `metadata.yaml`.
    fn bag_message(&self, bag: &BagRecord, scanned: &ScannedBag, disk_sn: &str) -> Value {
        let bags: Vec<String> = scanned
            .files
            .iter()
            .filter(|entry| entry.abs_path.extension().map(|e| e == "bag").unwrap_or(false))
            .map(|entry| {
                entry
                    .abs_path
                    .strip_prefix(&scanned.local_path)
                    .unwrap_or(&entry.abs_path)
                    .to_string_lossy()
                    .to_string()
            })
            .collect();

        // The bag folder sits at {vehicle}/{session}/{date}
        let components: Vec<String> = scanned
            .local_path
            .iter()
            .map(|c| c.to_string_lossy().to_string())
            .collect();
        let vehicle = components
            .len()
            .checked_sub(3)
            .and_then(|i| components.get(i))
            .cloned()
            .unwrap_or_default();
        let date = components.last().cloned().unwrap_or_default();
        let car_id = vehicle.split('_').next().unwrap_or_default().to_string();
        let vin = vehicle.split('_').last().unwrap_or_default().to_string();

        let (duration, nanoseconds_since_epoch, collection_time) =
            load_bag_metadata(&scanned.local_path.join("metadata.yaml"));

        json!({
            "task_id": format!("{}_{}", car_id, date),
            "car_id": car_id,
            "vin": vin,
            "size": scanned.size,
            "upload_datetime": Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            "origin_storage_path": bag.red_oss_path,
            "oss_storage_path": bag.yellow_oss_path,
            "data_type": record_data_type(&self.source_type),
            "disk_sn": disk_sn,
            "bags": bags,
            "duration": duration,
            "collection_time": collection_time,
            "nanoseconds_since_epoch": nanoseconds_since_epoch,
        })
    }

    /// Turn the service disk record into upload groups, one per clip,
    /// grafting the local file listings back onto the bags.
    fn build_groups(
        &self,
        disk: DiskRecord,
        mut bag_files: HashMap<String, ScannedBag>,
        registry: &mut PackageRegistry,
    ) -> Result<()> {
        for group in disk.group_infos {
            let group_settled = upload_state::is_settled(group.state);
            let disk_sn = group.source_disk_sn.clone();
            let group_id = group.group_id.clone();
            for clip in group.data_infos {
                if clip.data_id.is_empty() {
                    warn!("Clip in group {} carries no data id, skipping", group_id);
                    continue;
                }
                let mut upload_group = Group::new(&clip.data_id);
                for bag in clip.bag_infos {
                    if group_settled && !registry.force_upload() {
                        info!(
                            "Group {} is already settled remotely, skipping bag {}",
                            group_id, bag.bag_id
                        );
                        continue;
                    }
                    let scanned = bag_files
                        .remove(&bag.bag_id)
                        .ok_or_else(|| anyhow!("No local scan for bag {}", bag.bag_id))?;
                    let mut package = Package::new(&self.sn, &bag.bag_id, scanned.local_path.clone());
                    package.task_id = Some(clip.data_id.clone());
                    package.remote_prefix =
                        Some(format!("{}/gpg/{}", self.source_type, clip.data_id));
                    package.remote_target = Some(bag.yellow_oss_path.clone());
                    package.message_meta = Some(self.bag_message(&bag, &scanned, &disk_sn));
                    for entry in scanned.files {
                        package.push_entry(entry);
                    }
                    if let Some(package) = registry.try_admit(package)? {
                        upload_group.packages.push(package);
                    }
                }
                registry.add_group(upload_group);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PackageSource for BatchSource {
    async fn discover(&mut self, registry: &mut PackageRegistry) -> Result<()> {
        info!(
            "Scanning disk manifests under {}",
            self.info.input_root.display()
        );
        let (scanned_disk, bag_files, total_bytes) = self.scan_disk()?;
        registry.add_pending(total_bytes);

        fs::create_dir_all(&self.info.output_root)
            .with_context(|| format!("Failed to create {}", self.info.output_root.display()))?;
        let snapshot = self.info.output_root.join("disk_info_scan.json");
        fs::write(&snapshot, serde_json::to_string_pretty(&scanned_disk)?)
            .with_context(|| format!("Failed to write {}", snapshot.display()))?;

        let ledger = RemoteLedgerClient::from_tags(self.client.clone(), &self.info)?;
        let disk = self
            .load_or_register(scanned_disk, &bag_files, &ledger)
            .await?;

        let disk_json = self.info.output_root.join("disk_info.json");
        fs::write(&disk_json, serde_json::to_string_pretty(&disk)?)
            .with_context(|| format!("Failed to write {}", disk_json.display()))?;

        self.build_groups(disk, bag_files, registry)?;
        info!("{} upload groups queued", registry.groups.len());
        Ok(())
    }
}
