//! Integration tests for package discovery scenarios.
//!
//! These tests drive the discovery strategies through the public
//! source factory against real directory trees and a real ledger
//! file, the way the orchestrator does at the start of a run.

use std::fs;

use anyhow::Result;
use serde_json::json;
use tempfile::TempDir;

use rust_uploader::cli::SourceKind;
use rust_uploader::config::TaskInfo;
use rust_uploader::discovery::{create_source, PackageRegistry};
use rust_uploader::ledger::{TransferLedger, TransferRecord};
use rust_uploader::platform::PlatformClient;

fn task_info(input: &TempDir, output: &TempDir) -> TaskInfo {
    TaskInfo {
        input_root: input.path().to_path_buf(),
        output_root: output.path().to_path_buf(),
        ..Default::default()
    }
}

fn success_row(owner: &str, key: &str) -> TransferRecord {
    TransferRecord {
        owner_id: owner.to_string(),
        package_key: key.to_string(),
        remote_root: Some("zgm/gpg/11".to_string()),
        task_id: Some("11".to_string()),
        status: "success".to_string(),
        size: 320,
    }
}

/// Test that a fresh clip tree produces one single-package group
#[tokio::test]
async fn test_clip_tree_yields_one_group() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    let ledger_dir = TempDir::new()?;

    // One valid clip folder holding ten files
    let clip = input.path().join("clip_20250101");
    fs::create_dir_all(&clip)?;
    for i in 0..10 {
        fs::write(clip.join(format!("frame_{:02}.bin", i)), vec![9u8; 32])?;
    }

    let info = task_info(&input, &output);
    let ledger = TransferLedger::new(ledger_dir.path(), "clip")?;
    let mut registry = PackageRegistry::new(ledger, false);
    let mut source = create_source(SourceKind::Clip, &info, PlatformClient::new()?, "SN001");

    source.discover(&mut registry).await?;

    assert_eq!(registry.groups.len(), 1);
    assert!(registry.skipped.is_empty());

    let package = &registry.groups[0].packages[0];
    assert_eq!(package.key, "clip_20250101");
    assert_eq!(package.owner_id, "SN001");
    assert_eq!(package.size, 320);
    assert_eq!(registry.pending_bytes, 320);

    // Clip folders ship compressed and are cleared after transfer
    assert!(package.file_list[0].compress_before_transfer);
    assert!(package.file_list[0].remove_after_transfer);
    Ok(())
}

/// Test that a re-run over an already-delivered tree queues nothing
#[tokio::test]
async fn test_clip_rerun_is_skipped_via_ledger() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    let ledger_dir = TempDir::new()?;

    let clip = input.path().join("clip_20250101");
    fs::create_dir_all(&clip)?;
    fs::write(clip.join("frame.bin"), vec![9u8; 32])?;

    let ledger = TransferLedger::new(ledger_dir.path(), "clip")?;
    ledger.update_status(&success_row("SN001", "clip_20250101"))?;

    let info = task_info(&input, &output);
    let mut registry = PackageRegistry::new(ledger, false);
    let mut source = create_source(SourceKind::Clip, &info, PlatformClient::new()?, "SN001");

    source.discover(&mut registry).await?;

    assert!(registry.groups.is_empty());
    assert_eq!(registry.skipped.len(), 1);
    assert_eq!(registry.pending_bytes, 0);

    // The prior remote location rides along into the report
    assert_eq!(
        registry.skipped[0].remote_prefix.as_deref(),
        Some("zgm/gpg/11")
    );
    Ok(())
}

/// Test that force upload re-queues a package the ledger marks done
#[tokio::test]
async fn test_force_upload_requeues_delivered_clip() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    let ledger_dir = TempDir::new()?;

    let clip = input.path().join("clip_20250101");
    fs::create_dir_all(&clip)?;
    fs::write(clip.join("frame.bin"), vec![9u8; 32])?;

    let ledger = TransferLedger::new(ledger_dir.path(), "clip")?;
    ledger.update_status(&success_row("SN001", "clip_20250101"))?;

    let info = task_info(&input, &output);
    let mut registry = PackageRegistry::new(ledger, true);
    let mut source = create_source(SourceKind::Clip, &info, PlatformClient::new()?, "SN001");

    source.discover(&mut registry).await?;

    assert_eq!(registry.groups.len(), 1);
    assert!(registry.skipped.is_empty());
    Ok(())
}

fn seed_trip(input: &TempDir, trip_name: &str) -> std::path::PathBuf {
    let trip = input.path().join("fleet/disk0").join(trip_name);

    let raw = trip.join("AIPC_DATA_001");
    fs::create_dir_all(&raw).unwrap();
    fs::write(
        raw.join("storage_info.json"),
        json!({"collectInfo": {"vin": "LSV001"}}).to_string(),
    )
    .unwrap();
    fs::write(raw.join("frames.bin"), vec![1u8; 256]).unwrap();

    let trigger = trip.join("trigger_002");
    fs::create_dir_all(trigger.join("metadata")).unwrap();
    fs::write(
        trigger.join("metadata/vehicle_desc.json"),
        json!({"collect_info": {}}).to_string(),
    )
    .unwrap();
    fs::write(trigger.join("event.bin"), vec![2u8; 64]).unwrap();

    fs::write(trip.join("calibration.txt"), b"cam0=1").unwrap();
    trip
}

/// Test that every clip package of a trip carries the shared archive
#[tokio::test]
async fn test_trip_packages_share_common_archive() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    let ledger_dir = TempDir::new()?;
    seed_trip(&input, "car_2025-03-01");

    let info = task_info(&input, &output);
    let ledger = TransferLedger::new(ledger_dir.path(), "trip")?;
    let mut registry = PackageRegistry::new(ledger, false);
    let mut source = create_source(SourceKind::Trip, &info, PlatformClient::new()?, "SN001");

    source.discover(&mut registry).await?;

    // One group per recorder clip, each holding clip + shared archive
    assert_eq!(registry.groups.len(), 2);
    for group in &registry.groups {
        let package = &group.packages[0];
        assert_eq!(package.file_count(), 2);
        assert!(package.file_list[0].compress_before_transfer);
        assert!(!package.file_list[1].compress_before_transfer);
    }

    let first = &registry.groups[0].packages[0].file_list[1];
    let second = &registry.groups[1].packages[0].file_list[1];
    assert_eq!(first.abs_path, second.abs_path);
    assert!(first.abs_path.exists());
    Ok(())
}

/// Test that invalid recorder clips are reported but never fatal
#[tokio::test]
async fn test_trip_invalid_clips_land_in_rejection_report() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    let ledger_dir = TempDir::new()?;

    let trip = input.path().join("fleet/disk0/car_2025-03-01");
    let broken = trip.join("AIPC_DATA_009");
    fs::create_dir_all(&broken)?;
    fs::write(broken.join("frames.bin"), vec![3u8; 16])?;

    let info = task_info(&input, &output);
    let ledger = TransferLedger::new(ledger_dir.path(), "trip")?;
    let mut registry = PackageRegistry::new(ledger, false);
    let mut source = create_source(SourceKind::Trip, &info, PlatformClient::new()?, "SN001");

    source.discover(&mut registry).await?;

    assert!(registry.groups.is_empty());

    let failed_log = output.path().join("failed_log");
    let reports: Vec<_> = fs::read_dir(&failed_log)?.flatten().collect();
    assert_eq!(reports.len(), 1);
    let content = fs::read_to_string(reports[0].path())?;
    assert!(content.starts_with("package_path,desc\n"));
    assert!(content.contains("AIPC_DATA_009,missing storage_info.json"));
    Ok(())
}

/// Test that non-trip folder names are ignored by trip discovery
#[tokio::test]
async fn test_trip_discovery_ignores_undated_folders() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    let ledger_dir = TempDir::new()?;

    // Wrong name shape and an impossible date at the trip level
    seed_trip(&input, "backup_2025-03-01");
    seed_trip(&input, "car_2025-02-30");

    let info = task_info(&input, &output);
    let ledger = TransferLedger::new(ledger_dir.path(), "trip")?;
    let mut registry = PackageRegistry::new(ledger, false);
    let mut source = create_source(SourceKind::Trip, &info, PlatformClient::new()?, "SN001");

    source.discover(&mut registry).await?;

    assert!(registry.groups.is_empty());
    assert!(registry.skipped.is_empty());
    Ok(())
}
