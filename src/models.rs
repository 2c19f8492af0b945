use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One file or folder belonging to a package.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileEntry {
    pub abs_path: PathBuf,
    pub rel_path: PathBuf,
    pub size: u64,
    pub remove_after_transfer: bool,
    pub compress_before_transfer: bool,
}

impl FileEntry {
    pub fn new(abs_path: PathBuf, rel_path: PathBuf, size: u64) -> Self {
        FileEntry {
            abs_path,
            rel_path,
            size,
            remove_after_transfer: false,
            compress_before_transfer: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Pending,
    Success,
    Failed,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Pending => "pending",
            PackageStatus::Success => "success",
            PackageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of upload: a keyed set of files sharing one remote prefix.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Package {
    /// Identity of the source medium (disk serial or equivalent).
    pub owner_id: String,
    /// Unique key of the package under its owner.
    pub key: String,
    /// Local directory the file entries are rooted at.
    pub local_root: PathBuf,
    /// Remote object key prefix, assigned at registration or by the platform.
    pub remote_prefix: Option<String>,
    /// Destination bucket recorded for reporting.
    pub remote_target: Option<String>,
    /// Platform task this package was uploaded under.
    pub task_id: Option<String>,
    /// Bytes actually transferred, accumulated during upload.
    pub transferred_size: u64,
    /// Total bytes registered for this package.
    pub size: u64,
    pub file_list: Vec<FileEntry>,
    pub status: PackageStatus,
    pub data_type: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    /// Extra payload forwarded to the notification channel, when present.
    pub message_meta: Option<serde_json::Value>,
}

impl Package {
    pub fn new(owner_id: &str, key: &str, local_root: PathBuf) -> Self {
        Package {
            owner_id: owner_id.to_string(),
            key: key.to_string(),
            local_root,
            remote_prefix: None,
            remote_target: None,
            task_id: None,
            transferred_size: 0,
            size: 0,
            file_list: Vec::new(),
            status: PackageStatus::Pending,
            data_type: None,
            started_at: None,
            finished_at: None,
            message_meta: None,
        }
    }

    pub fn push_entry(&mut self, entry: FileEntry) {
        self.size += entry.size;
        self.file_list.push(entry);
    }

    pub fn file_count(&self) -> usize {
        self.file_list.len()
    }
}

/// Packages sharing one platform task and one remote prefix.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub id: String,
    pub packages: Vec<Package>,
}

impl Group {
    pub fn new(id: &str) -> Self {
        Group {
            id: id.to_string(),
            packages: Vec::new(),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.packages.iter().map(|p| p.size).sum()
    }
}

/// Process exit codes reported to the calling scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Success = 0,
    MissingInput = 1,
    ConnectionError = 2,
    TransferError = 3,
    UnknownError = 99,
}

impl ReturnCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}
