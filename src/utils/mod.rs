//! Utility functions shared across discovery, staging, and upload.
//!
//! ## Components
//!
//! - **Archive**: ZIP staging of package folders with reuse of valid archives
//! - **Fsutil**: Directory walking, level-limited listing, and cleanup helpers
//! - **Hash**: SHA-256 calculation for staged archive integrity
//!
//! ## Staging a Folder
//!
//! ```no_run
//! use rust_uploader::utils::archive::archive_folder;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let source = Path::new("/mnt/disk/car_2024-01-15/clip_0001");
//! let stage = Path::new("/data/output/tar_root/task-42");
//!
//! let zip_path = archive_folder(source, stage)?;
//! println!("Staged archive: {}", zip_path.display());
//! # Ok(())
//! # }
//! ```

/// ZIP archive staging for package folders
pub mod archive;

/// Filesystem walking and cleanup helpers
pub mod fsutil;

/// Cryptographic hash calculation utilities
pub mod hash;
