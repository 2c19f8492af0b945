//! Post-run CSV report.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::info;

use crate::constants::BYTES_PER_GB;
use crate::models::{Package, PackageStatus};

const REPORT_HEADER: &str = "sn, package name, data type, size(GB), file count, \
start time, end time, local path, remote path, status, task id";

/// Write one row per package, attempted and skipped alike, plus a
/// totals line, into a timestamped CSV under the output root.
pub fn write_upload_report(
    output_root: &Path,
    sn: &str,
    default_data_type: &str,
    packages: &[&Package],
) -> Result<PathBuf> {
    fs::create_dir_all(output_root)
        .with_context(|| format!("Failed to create {}", output_root.display()))?;
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let path = output_root.join(format!("upload_record_{}.csv", stamp));

    let mut content = String::from(REPORT_HEADER);
    content.push('\n');

    let mut success_bytes = 0u64;
    for package in packages {
        if package.status == PackageStatus::Success {
            success_bytes += package.transferred_size;
        }
        let row = [
            sn.to_string(),
            package.key.clone(),
            package
                .data_type
                .clone()
                .unwrap_or_else(|| default_data_type.to_string()),
            format!("{:.4}", package.transferred_size as f64 / BYTES_PER_GB),
            package.file_count().to_string(),
            package.started_at.clone().unwrap_or_default(),
            package.finished_at.clone().unwrap_or_default(),
            package.local_root.display().to_string(),
            package.remote_prefix.clone().unwrap_or_default(),
            package.status.as_str().to_string(),
            package.task_id.clone().unwrap_or_default(),
        ];
        content.push_str(&row.join(","));
        content.push('\n');
    }

    let total_tb = success_bytes as f64 / BYTES_PER_GB / 1024.0;
    content.push_str(&format!("/,/,/,{:.4}TB,/,/,/,/,/,/,/\n", total_tb));

    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Upload report written to {}", path.display());
    Ok(path)
}
