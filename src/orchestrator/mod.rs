//! Upload orchestration.
//!
//! One run turns a discovered set of package groups into finished
//! transfers: a bounded pool of workers takes one group each, obtains
//! a remote location for groups that lack one, moves every file
//! through the storage backend, records the outcome in the local
//! ledger, and emits the per-package notification. The run ends with
//! a CSV report covering attempted and skipped packages and an exit
//! code summarizing the worst thing that happened.

pub mod progress;
pub mod report;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;

use crate::cli::SourceKind;
use crate::cloud::client::join_key;
use crate::cloud::{create_backend, BackendParams, StorageBackend};
use crate::config::TaskInfo;
use crate::constants::{BYTES_PER_GB, DIGEST_MAX_FILE_MB, LEDGER_DB_ROOT, STAGE_DIR_NAME};
use crate::discovery::{create_source, PackageRegistry};
use crate::ledger::{TransferLedger, TransferRecord};
use crate::models::{FileEntry, Group, Package, PackageStatus, ReturnCode};
use crate::platform::jobs;
use crate::platform::notify::{BagStateNotifier, HttpNotifier, Notifier};
use crate::platform::{PlatformClient, PlatformUnreachable};
use crate::utils::archive::archive_folder;
use crate::utils::fsutil::{free_space_under, remove_path};
use crate::utils::hash::calculate_sha256;

use progress::ProgressCounter;

/// Run one upload task end to end and return its exit code.
pub async fn run(
    info: TaskInfo,
    kind: SourceKind,
    sn: String,
    force_upload: bool,
    skip_notify: bool,
) -> ReturnCode {
    info!(
        "Starting {} upload for disk {} ({} -> {})",
        kind,
        sn,
        info.input_root.display(),
        info.output_root.display()
    );
    if !info.input_root.exists() {
        error!("Input root {} does not exist", info.input_root.display());
        return ReturnCode::MissingInput;
    }
    let source_type = match info.tag("source_type") {
        Some(value) => value.to_string(),
        None => {
            error!("Task info carries no source_type tag");
            return ReturnCode::UnknownError;
        }
    };

    let client = match PlatformClient::new() {
        Ok(client) => client,
        Err(err) => {
            error!("{:#}", err);
            return ReturnCode::UnknownError;
        }
    };
    let ledger = match TransferLedger::new(Path::new(LEDGER_DB_ROOT), &source_type) {
        Ok(ledger) => ledger,
        Err(err) => {
            error!("Could not open the transfer ledger: {:#}", err);
            return ReturnCode::UnknownError;
        }
    };

    let stage_root = info.output_root.join(STAGE_DIR_NAME);
    if let Err(err) = remove_path(&stage_root) {
        warn!("Could not clear {}: {}", stage_root.display(), err);
    }

    let mut registry = PackageRegistry::new(ledger.clone(), force_upload);
    let mut source = create_source(kind, &info, client.clone(), &sn);
    if let Err(err) = source.discover(&mut registry).await {
        error!("Discovery failed: {:#}", err);
        return classify(&err);
    }

    if registry.groups.is_empty() && registry.skipped.is_empty() {
        error!("No packages found under {}", info.input_root.display());
        return ReturnCode::MissingInput;
    }
    info!(
        "{} groups to upload, {} packages already done, {:.2} GB pending",
        registry.groups.len(),
        registry.skipped.len(),
        registry.pending_bytes as f64 / BYTES_PER_GB
    );
    if let Some(free) = free_space_under(&info.output_root) {
        if free < registry.pending_bytes {
            warn!(
                "Staging volume has {:.2} GB free for {:.2} GB of packages",
                free as f64 / BYTES_PER_GB,
                registry.pending_bytes as f64 / BYTES_PER_GB
            );
        }
    }

    let notifier = match build_notifier(kind, &client, &info, &sn, skip_notify) {
        Ok(notifier) => notifier,
        Err(err) => {
            error!("{:#}", err);
            return ReturnCode::UnknownError;
        }
    };

    let progress = ProgressCounter::new(registry.pending_bytes);
    let reporter = progress.spawn_reporter();

    let semaphore = Arc::new(Semaphore::new(info.worker_count().max(1)));
    let mut handles = Vec::new();
    for group in registry.groups.drain(..) {
        let semaphore = semaphore.clone();
        let uploader = GroupUploader {
            info: info.clone(),
            client: client.clone(),
            ledger: ledger.clone(),
            notifier: notifier.clone(),
            progress: progress.clone(),
            skip_notify,
        };
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let backend = match build_backend(&uploader.info) {
                Ok(backend) => backend,
                Err(err) => {
                    error!("{:#}", err);
                    let mut group = group;
                    fail_group(&mut group);
                    return (group, ReturnCode::UnknownError);
                }
            };
            uploader.run_group(backend.as_ref(), group).await
        }));
    }

    let mut outcome = ReturnCode::Success;
    let mut finished: Vec<Group> = Vec::new();
    for handle in handles {
        match handle.await {
            Ok((group, code)) => {
                outcome = worst_of(outcome, code);
                finished.push(group);
            }
            Err(err) => {
                error!("Upload worker crashed: {}", err);
                outcome = worst_of(outcome, ReturnCode::UnknownError);
            }
        }
    }
    reporter.abort();
    info!(
        "Uploads finished: {:.2} GB transferred",
        progress.transferred() as f64 / BYTES_PER_GB
    );

    let all: Vec<&Package> = finished
        .iter()
        .flat_map(|group| group.packages.iter())
        .chain(registry.skipped.iter())
        .collect();
    let default_data_type = info.tag("data_type").unwrap_or_default();
    if let Err(err) = report::write_upload_report(&info.output_root, &sn, default_data_type, &all) {
        error!("Could not write the upload report: {:#}", err);
        outcome = worst_of(outcome, ReturnCode::UnknownError);
    }

    if let Err(err) = remove_path(&stage_root) {
        warn!("Could not clear {}: {}", stage_root.display(), err);
    }
    outcome
}

/// Everything one group worker needs besides the backend it drives.
pub struct GroupUploader {
    pub info: TaskInfo,
    pub client: PlatformClient,
    pub ledger: TransferLedger,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub progress: ProgressCounter,
    pub skip_notify: bool,
}

impl GroupUploader {
    /// Upload every package of one group in order. Returns the group
    /// with statuses and timings filled in, plus its exit code.
    pub async fn run_group(
        &self,
        backend: &dyn StorageBackend,
        mut group: Group,
    ) -> (Group, ReturnCode) {
        if group.packages.is_empty() {
            return (group, ReturnCode::Success);
        }

        if group.packages[0].remote_prefix.is_none() {
            match jobs::create_package(&self.client, &self.info, &group.packages[0]).await {
                Ok(location) => {
                    for package in &mut group.packages {
                        package.task_id = Some(location.task_id.clone());
                        package.remote_prefix = Some(location.key_root.clone());
                    }
                }
                Err(err) => {
                    error!("No remote location for group {}: {:#}", group.id, err);
                    let code = classify(&err);
                    fail_group(&mut group);
                    return (group, code);
                }
            }
        }
        let task_id = match group.packages[0].task_id.clone() {
            Some(task_id) => task_id,
            None => {
                error!("Group {} carries no job id", group.id);
                fail_group(&mut group);
                return (group, ReturnCode::UnknownError);
            }
        };

        info!(
            "Uploading group {} ({} packages, {:.2} GB)",
            group.id,
            group.packages.len(),
            group.total_size() as f64 / BYTES_PER_GB
        );

        let curated_bucket = self
            .info
            .tag("yellow_bucket_name")
            .unwrap_or_default()
            .to_string();
        let mut failed = 0usize;
        for package in &mut group.packages {
            // Downstream consumers read the curated bucket off every
            // package, whatever discovery put there.
            package.remote_target = Some(curated_bucket.clone());
            package.started_at = Some(timestamp());
            let ok = self.upload_package(backend, &task_id, package).await;
            package.status = if ok {
                PackageStatus::Success
            } else {
                failed += 1;
                PackageStatus::Failed
            };
            package.finished_at = Some(timestamp());

            let record = TransferRecord {
                owner_id: package.owner_id.clone(),
                package_key: package.key.clone(),
                remote_root: package.remote_prefix.clone(),
                task_id: package.task_id.clone(),
                status: package.status.as_str().to_string(),
                size: package.size,
            };
            if let Err(err) = self.ledger.update_status(&record) {
                warn!("Ledger write for {} failed: {:#}", package.key, err);
            }
            if let Some(notifier) = &self.notifier {
                notifier.package_finished(package).await;
            }
        }

        if failed == 0 && self.info.bool_tag("notice_the_platform") && !self.skip_notify {
            if let Err(err) = jobs::completion_callback(&self.client, &self.info, &task_id).await {
                error!("{:#}", err);
                return (group, classify(&err));
            }
        }
        let code = if failed > 0 {
            ReturnCode::TransferError
        } else {
            ReturnCode::Success
        };
        (group, code)
    }

    /// Move one package's entries. Entries marked for removal are
    /// deleted after their attempt whether it succeeded or not.
    async fn upload_package(
        &self,
        backend: &dyn StorageBackend,
        task_id: &str,
        package: &mut Package,
    ) -> bool {
        let prefix = match package.remote_prefix.clone() {
            Some(prefix) => prefix,
            None => return false,
        };
        let stage_root = self
            .info
            .output_root
            .join(STAGE_DIR_NAME)
            .join(task_id)
            .join(&package.key);

        let mut all_ok = true;
        let mut transferred = 0u64;
        for entry in &package.file_list {
            let ok = upload_entry(backend, &prefix, &stage_root, entry).await;
            if entry.remove_after_transfer {
                if let Err(err) = remove_path(&entry.abs_path) {
                    warn!("Could not remove {}: {}", entry.abs_path.display(), err);
                }
            }
            if ok {
                transferred += entry.size;
                self.progress.add(entry.size);
            } else {
                all_ok = false;
            }
        }
        package.transferred_size += transferred;
        all_ok
    }
}

/// Move one entry: a folder flagged for compression is archived into
/// the staging area first, a plain directory streams file by file, a
/// file goes straight up.
async fn upload_entry(
    backend: &dyn StorageBackend,
    prefix: &str,
    stage_root: &Path,
    entry: &FileEntry,
) -> bool {
    let (local_path, key) = if entry.compress_before_transfer {
        match archive_folder(&entry.abs_path, stage_root) {
            Ok(archive) => {
                if let Ok(Some(digest)) = calculate_sha256(&archive, DIGEST_MAX_FILE_MB) {
                    debug!("sha256 {} for {}", digest, archive.display());
                }
                (archive, join_key(prefix, &entry.rel_path.to_string_lossy()))
            }
            Err(err) => {
                error!("Could not archive {}: {:#}", entry.abs_path.display(), err);
                return false;
            }
        }
    } else {
        (
            entry.abs_path.clone(),
            join_key(prefix, &entry.rel_path.to_string_lossy()),
        )
    };

    if !local_path.exists() {
        error!("Missing local path {}", local_path.display());
        return false;
    }
    if local_path.is_dir() {
        backend.upload_folder(&key, &local_path).await
    } else {
        backend.upload_file(&key, &local_path).await
    }
}

fn build_backend(info: &TaskInfo) -> Result<Box<dyn StorageBackend>> {
    let params = BackendParams {
        endpoint: info.tag("endpoint").unwrap_or_default().to_string(),
        access_key: info.tag("ak").unwrap_or_default().to_string(),
        secret_key: info.tag("sk").unwrap_or_default().to_string(),
        region: info.tag("region").unwrap_or_default().to_string(),
        bucket: info.tag("bucket_name").unwrap_or_default().to_string(),
        secure: info.bool_tag("secure"),
    };
    create_backend(info.tag("cloud_type").unwrap_or_default(), &params)
}

fn build_notifier(
    kind: SourceKind,
    client: &PlatformClient,
    info: &TaskInfo,
    sn: &str,
    skip_notify: bool,
) -> Result<Option<Arc<dyn Notifier>>> {
    if skip_notify {
        info!("Notifications are off for this run");
        return Ok(None);
    }
    let notifier: Arc<dyn Notifier> = match kind {
        SourceKind::Batch => Arc::new(BagStateNotifier::new(client.clone(), info)?),
        _ => Arc::new(HttpNotifier::new(client.clone(), info, sn)),
    };
    Ok(Some(notifier))
}

fn fail_group(group: &mut Group) {
    for package in &mut group.packages {
        package.status = PackageStatus::Failed;
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Platform exchanges that ran out of attempts map to the connection
/// exit code; everything else is the general failure.
fn classify(err: &anyhow::Error) -> ReturnCode {
    if err
        .chain()
        .any(|cause| cause.downcast_ref::<PlatformUnreachable>().is_some())
    {
        ReturnCode::ConnectionError
    } else {
        ReturnCode::UnknownError
    }
}

fn worst_of(a: ReturnCode, b: ReturnCode) -> ReturnCode {
    fn rank(code: ReturnCode) -> u8 {
        match code {
            ReturnCode::ConnectionError => 3,
            ReturnCode::UnknownError => 2,
            ReturnCode::TransferError => 1,
            _ => 0,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}
