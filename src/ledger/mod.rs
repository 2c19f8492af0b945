//! Durable per-package transfer ledger.
//!
//! One SQLite file per source type records which packages a given
//! device has already delivered, keyed by (owner id, package key).
//! The file outlives the process, which is what makes re-runs safe:
//! discovery consults it and skips anything already marked success.
//!
//! Connections are opened per call with a bounded busy wait, so
//! several workers (or a second process on the same machine) contend
//! on SQLite's own locking instead of an in-process mutex.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{Connection, OptionalExtension};

use crate::constants::LEDGER_BUSY_TIMEOUT_SECS;

/// One ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    pub owner_id: String,
    pub package_key: String,
    pub remote_root: Option<String>,
    pub task_id: Option<String>,
    pub status: String,
    pub size: u64,
}

impl TransferRecord {
    pub fn is_uploaded(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Clone)]
pub struct TransferLedger {
    db_path: PathBuf,
}

impl TransferLedger {
    /// Open (creating if needed) the ledger for one source type under
    /// `db_root`.
    pub fn new(db_root: &Path, source_type: &str) -> Result<Self> {
        std::fs::create_dir_all(db_root)
            .context(format!("Failed to create ledger dir {}", db_root.display()))?;

        let ledger = TransferLedger {
            db_path: db_root.join(format!("{}.db", source_type)),
        };

        let conn = ledger.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS transfer_records (
                owner_id    TEXT NOT NULL,
                package_key TEXT NOT NULL,
                remote_root TEXT,
                task_id     TEXT,
                status      TEXT,
                size        INTEGER,
                PRIMARY KEY (owner_id, package_key)
            )",
            [],
        )
        .context("Failed to create ledger table")?;

        debug!("Transfer ledger at {}", ledger.db_path.display());
        Ok(ledger)
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context(format!("Failed to open ledger {}", self.db_path.display()))?;
        conn.busy_timeout(Duration::from_secs(LEDGER_BUSY_TIMEOUT_SECS))
            .context("Failed to set ledger busy timeout")?;
        Ok(conn)
    }

    /// Fetch the record for a package, if one was ever written.
    pub fn check_status(
        &self,
        owner_id: &str,
        package_key: &str,
    ) -> Result<Option<TransferRecord>> {
        let conn = self.open()?;
        let record = conn
            .query_row(
                "SELECT owner_id, package_key, remote_root, task_id, status, size
                 FROM transfer_records WHERE owner_id = ?1 AND package_key = ?2",
                (owner_id, package_key),
                |row| {
                    Ok(TransferRecord {
                        owner_id: row.get(0)?,
                        package_key: row.get(1)?,
                        remote_root: row.get(2)?,
                        task_id: row.get(3)?,
                        status: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        size: row.get::<_, Option<i64>>(5)?.unwrap_or(0) as u64,
                    })
                },
            )
            .optional()
            .context("Failed to query ledger")?;
        Ok(record)
    }

    /// First recording of a package. Returns false without touching
    /// the existing row when the key is already present, which is the
    /// at-most-once guarantee concurrent workers rely on.
    pub fn init_record(&self, record: &TransferRecord) -> Result<bool> {
        let conn = self.open()?;
        let result = conn.execute(
            "INSERT INTO transfer_records
             (owner_id, package_key, remote_root, task_id, status, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                &record.owner_id,
                &record.package_key,
                &record.remote_root,
                &record.task_id,
                &record.status,
                record.size as i64,
            ),
        );

        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!(
                    "Ledger already holds ({}, {})",
                    record.owner_id, record.package_key
                );
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to insert ledger record"),
        }
    }

    /// Record a package's current status, inserting the row when it
    /// does not exist yet. An existing row keeps its remote_root.
    pub fn update_status(&self, record: &TransferRecord) -> Result<()> {
        if self
            .check_status(&record.owner_id, &record.package_key)?
            .is_none()
        {
            self.init_record(record)?;
            return Ok(());
        }

        let conn = self.open()?;
        conn.execute(
            "UPDATE transfer_records SET task_id = ?1, status = ?2, size = ?3
             WHERE owner_id = ?4 AND package_key = ?5",
            (
                &record.task_id,
                &record.status,
                record.size as i64,
                &record.owner_id,
                &record.package_key,
            ),
        )
        .context("Failed to update ledger record")?;
        Ok(())
    }
}
