//! Package discovery: turning a mounted disk into upload groups.
//!
//! Three source layouts are supported, one per fleet data flavor:
//!
//! - [`trip`]: date-stamped trip folders whose recorder clips each
//!   become a package, sharing one archive of the loose trip files.
//! - [`clip`]: freeform trees where `clip_*` folders and sidecar
//!   archives each become their own single-package group.
//! - [`batch`]: manifest-driven vehicle batches whose bags accumulate
//!   into fixed-size clips registered with the remote record service.
//!
//! Every source feeds a [`PackageRegistry`], which applies the shared
//! admission rule: a package whose key the local ledger already marks
//! uploaded is recorded for the report but not queued again, unless
//! force upload is on.

pub mod batch;
pub mod clip;
pub mod trip;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use log::{info, warn};

use crate::cli::SourceKind;
use crate::config::TaskInfo;
use crate::ledger::TransferLedger;
use crate::models::{Group, Package, PackageStatus};
use crate::platform::PlatformClient;

/// A discovery strategy that inspects the input root and fills the
/// registry with groups of packages.
#[async_trait]
pub trait PackageSource: Send {
    async fn discover(&mut self, registry: &mut PackageRegistry) -> Result<()>;
}

/// Collects what discovery found: groups queued for upload, packages
/// skipped as already done, and the byte total driving the progress
/// readout.
pub struct PackageRegistry {
    ledger: TransferLedger,
    force_upload: bool,
    pub groups: Vec<Group>,
    /// Recorded for the report but not queued.
    pub skipped: Vec<Package>,
    pub pending_bytes: u64,
}

impl PackageRegistry {
    pub fn new(ledger: TransferLedger, force_upload: bool) -> Self {
        PackageRegistry {
            ledger,
            force_upload,
            groups: Vec::new(),
            skipped: Vec::new(),
            pending_bytes: 0,
        }
    }

    /// Apply the shared admission rule. Hands the package back when it
    /// should be uploaded; records it as already done otherwise.
    pub fn try_admit(&mut self, mut package: Package) -> Result<Option<Package>> {
        if let Some(record) = self.ledger.check_status(&package.owner_id, &package.key)? {
            if record.is_uploaded() {
                if self.force_upload {
                    info!("Package {} already uploaded, forcing again", package.key);
                } else {
                    info!("Package {} already uploaded, skipping", package.key);
                    package.status = PackageStatus::Success;
                    package.remote_prefix = record.remote_root;
                    self.skipped.push(package);
                    return Ok(None);
                }
            }
        }
        Ok(Some(package))
    }

    pub fn force_upload(&self) -> bool {
        self.force_upload
    }

    /// Queue a group for upload. Empty groups are dropped.
    pub fn add_group(&mut self, group: Group) {
        if !group.packages.is_empty() {
            self.groups.push(group);
        }
    }

    pub fn add_pending(&mut self, bytes: u64) {
        self.pending_bytes += bytes;
    }
}

/// Build the discovery source for the selected layout.
pub fn create_source(
    kind: SourceKind,
    info: &TaskInfo,
    client: PlatformClient,
    sn: &str,
) -> Box<dyn PackageSource> {
    match kind {
        SourceKind::Trip => Box::new(trip::TripSource::new(info, sn)),
        SourceKind::Clip => Box::new(clip::ClipSource::new(info, sn)),
        SourceKind::Batch => Box::new(batch::BatchSource::new(info, client, sn)),
    }
}

/// Write the rejected-package report when validation turned anything
/// away. Returns the report path when one was written.
pub fn write_invalid_package_report(
    output_root: &Path,
    sn: &str,
    invalid: &[(PathBuf, String)],
) -> Result<Option<PathBuf>> {
    if invalid.is_empty() {
        return Ok(None);
    }

    let log_root = output_root.join("failed_log");
    fs::create_dir_all(&log_root)?;
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let report_path = log_root.join(format!("invalid_package_list_{}_{}.csv", sn, stamp));

    let mut content = String::from("package_path,desc\n");
    for (package_path, desc) in invalid {
        content.push_str(&format!("{},{}\n", package_path.display(), desc));
    }
    fs::write(&report_path, content)?;

    warn!(
        "{} packages failed validation, see {}",
        invalid.len(),
        report_path.display()
    );
    Ok(Some(report_path))
}
