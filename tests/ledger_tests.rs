//! Integration tests for the durable transfer ledger.
//!
//! These tests exercise the ledger the way separate runs and separate
//! processes do: distinct handles on the same database file, status
//! transitions over time, and one file per source type.

use anyhow::Result;
use tempfile::TempDir;

use rust_uploader::ledger::{TransferLedger, TransferRecord};

fn record(owner: &str, key: &str, status: &str) -> TransferRecord {
    TransferRecord {
        owner_id: owner.to_string(),
        package_key: key.to_string(),
        remote_root: Some("zgm/gpg/5".to_string()),
        task_id: Some("5".to_string()),
        status: status.to_string(),
        size: 2048,
    }
}

/// Test that rows written by one run are visible to the next
#[test]
fn test_rows_survive_across_runs() -> Result<()> {
    let dir = TempDir::new()?;

    {
        let ledger = TransferLedger::new(dir.path(), "clip")?;
        ledger.update_status(&record("SN001", "clip_0001", "success"))?;
    }

    // A later process opens the same file and sees the outcome
    let ledger = TransferLedger::new(dir.path(), "clip")?;
    let found = ledger.check_status("SN001", "clip_0001")?.unwrap();
    assert!(found.is_uploaded());
    assert_eq!(found.remote_root.as_deref(), Some("zgm/gpg/5"));
    Ok(())
}

/// Test that two handles on one database agree on first-writer-wins
#[test]
fn test_init_record_single_winner_across_handles() -> Result<()> {
    let dir = TempDir::new()?;
    let first = TransferLedger::new(dir.path(), "clip")?;
    let second = TransferLedger::new(dir.path(), "clip")?;

    assert!(first.init_record(&record("SN001", "contested", "pending"))?);
    assert!(!second.init_record(&record("SN001", "contested", "pending"))?);

    // The losing writer still reads the winning row
    assert!(second.check_status("SN001", "contested")?.is_some());
    Ok(())
}

/// Test a package's full status history within one ledger row
#[test]
fn test_status_transitions_keep_remote_root() -> Result<()> {
    let dir = TempDir::new()?;
    let ledger = TransferLedger::new(dir.path(), "trip")?;

    ledger.update_status(&record("SN001", "AIPC_DATA_001", "pending"))?;
    assert!(!ledger.check_status("SN001", "AIPC_DATA_001")?.unwrap().is_uploaded());

    // A failed attempt is recorded without disturbing the location
    let mut failed = record("SN001", "AIPC_DATA_001", "failed");
    failed.remote_root = Some("other/root".to_string());
    ledger.update_status(&failed)?;
    let found = ledger.check_status("SN001", "AIPC_DATA_001")?.unwrap();
    assert_eq!(found.status, "failed");
    assert_eq!(found.remote_root.as_deref(), Some("zgm/gpg/5"));

    ledger.update_status(&record("SN001", "AIPC_DATA_001", "success"))?;
    assert!(ledger.check_status("SN001", "AIPC_DATA_001")?.unwrap().is_uploaded());
    Ok(())
}

/// Test that each source type keeps its own database file
#[test]
fn test_source_types_are_isolated() -> Result<()> {
    let dir = TempDir::new()?;
    let trip = TransferLedger::new(dir.path(), "trip")?;
    let clip = TransferLedger::new(dir.path(), "clip")?;

    trip.update_status(&record("SN001", "shared_key", "success"))?;

    assert!(dir.path().join("trip.db").exists());
    assert!(dir.path().join("clip.db").exists());
    assert!(clip.check_status("SN001", "shared_key")?.is_none());
    Ok(())
}

/// Test that owners partition the key space
#[test]
fn test_same_key_under_two_owners() -> Result<()> {
    let dir = TempDir::new()?;
    let ledger = TransferLedger::new(dir.path(), "clip")?;

    ledger.update_status(&record("SN001", "clip_0001", "success"))?;
    ledger.update_status(&record("SN002", "clip_0001", "failed"))?;

    assert!(ledger.check_status("SN001", "clip_0001")?.unwrap().is_uploaded());
    assert!(!ledger.check_status("SN002", "clip_0001")?.unwrap().is_uploaded());
    Ok(())
}
