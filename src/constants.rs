//! Global constants for the fleet-uploader application.
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make configuration changes easier.

// Multipart transfer constants
/// Chunk size for multipart uploads (100MB)
pub const MULTIPART_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// S3 minimum part size for multipart uploads (5MB)
pub const S3_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// S3 maximum parts per upload
pub const S3_MAX_PARTS: u64 = 10000;

/// Worker pool size for parallel multipart uploads
pub const MULTIPART_WORKERS: usize = 4;

// Timeout and retry constants
/// Maximum upload retry attempts per file or part
pub const MAX_UPLOAD_RETRIES: usize = 3;

/// Base retry delay for storage calls in milliseconds
pub const RETRY_BASE_DELAY_MS: u64 = 250;

/// Maximum platform HTTP retry attempts
pub const MAX_HTTP_RETRIES: usize = 3;

/// Wait between failed platform HTTP attempts in seconds
pub const HTTP_RETRY_WAIT_SECS: u64 = 10;

/// Platform HTTP request timeout in seconds
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Progress reporting interval for uploads in seconds
pub const UPLOAD_PROGRESS_INTERVAL_SECS: u64 = 5;

// Tracking ledger constants
/// Bounded wait for the ledger file lock (30s)
pub const LEDGER_BUSY_TIMEOUT_SECS: u64 = 30;

/// Default directory holding per-source ledger databases
pub const LEDGER_DB_ROOT: &str = "/tmp/cloud_upload_records";

// Archiving constants
/// Chunk size for archive write operations (512KB)
pub const ARCHIVE_CHUNK_SIZE: usize = 512 * 1024;

/// Large file threshold for compression level decisions (100MB)
pub const LARGE_FILE_COMPRESSION_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Maximum file size considered for digest computation (MB)
pub const DIGEST_MAX_FILE_MB: u64 = 256;

// Discovery constants
/// Directory depth of trip roots below the input root
pub const TRIP_ROOT_LEVEL: usize = 3;

/// Directory depth of bags below a vehicle group root
pub const BAG_PACKAGE_LEVEL: usize = 2;

/// Batch strategy clip budget (50GB of bags per clip)
pub const BATCH_CLIP_SIZE: u64 = 50 * 1024 * 1024 * 1024;

// Common file names
/// Marker naming the output batch, written into clip source folders
pub const BATCH_MARKER_FILE: &str = "batch.txt";

/// Marker naming the source disk, written into bag folders
pub const SN_MARKER_FILE: &str = "sn.txt";

/// Disk scan index cached inside the input root
pub const UPLOAD_CACHE_FILE: &str = "kd_upload_cache.json";

/// Staging directory for package archives below the output root
pub const STAGE_DIR_NAME: &str = "tar_root";

// Reporting constants
/// Bytes per gigabyte, for report and notification size fields
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

// File extensions kept at store compression level
pub const COMPRESSED_EXTENSIONS: &[&str] = &[
    "zip", "gz", "tgz", "xz", "bz2", "7z", "rar", "jpg", "jpeg", "png", "mp4", "avi", "bag", "h264",
    "h265",
];

// Test constants
#[cfg(test)]
pub mod test {
    /// Test bag size used by batch clipping tests (20GB)
    pub const TEST_BAG_SIZE: u64 = 20 * 1024 * 1024 * 1024;
}
