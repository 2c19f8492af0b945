//! # fleet-uploader
//!
//! A multi-cloud upload orchestrator that moves fleet sensor-data
//! packages from mounted collection disks into object storage.
//!
//! ## Overview
//!
//! Vehicles record trips onto removable disks; this tool empties those
//! disks into the landing bucket of whichever cloud the deployment
//! uses. It discovers packages with one of three layout strategies,
//! registers them with the fleet platform, uploads every file with
//! multipart transfers where the size warrants it, and keeps a local
//! ledger so a re-inserted disk never uploads the same package twice.
//!
//! ## Features
//!
//! - **Five storage providers**: MinIO, Volcano TOS, Huawei OBS,
//!   Alibaba OSS and plain S3 behind one backend trait
//! - **Three discovery strategies**: date-stamped trips, freeform clip
//!   trees, and manifest-driven vehicle batches
//! - **Resumable multipart uploads**: serial parts can pick up where a
//!   previous run stopped; parallel parts trade that for speed
//! - **At-most-once delivery**: a SQLite ledger records every package
//!   outcome per source disk
//! - **Platform integration**: remote location assignment, per-package
//!   status notifications and completion callbacks
//! - **Post-run reporting**: a CSV of every package attempted or
//!   skipped, with byte totals
//!
//! ## Usage
//!
//! ### Running an upload task
//!
//! ```no_run
//! use std::path::Path;
//!
//! use rust_uploader::cli::SourceKind;
//! use rust_uploader::config::TaskInfo;
//! use rust_uploader::orchestrator;
//!
//! fn main() -> anyhow::Result<()> {
//!     let info = TaskInfo::from_json_file(Path::new("/tmp/task_info.json"))?;
//!     let runtime = tokio::runtime::Runtime::new()?;
//!     let code = runtime.block_on(orchestrator::run(
//!         info,
//!         SourceKind::Trip,
//!         "SN0012".to_string(),
//!         false,
//!         false,
//!     ));
//!     std::process::exit(code.code())
//! }
//! ```
//!
//! ### Talking to a bucket directly
//!
//! ```no_run
//! use std::path::Path;
//!
//! use rust_uploader::cloud::{create_backend, BackendParams};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let params = BackendParams {
//!     endpoint: "10.0.0.1:9000,10.0.0.2:9000".to_string(),
//!     access_key: "minio-ak".to_string(),
//!     secret_key: "minio-sk".to_string(),
//!     region: "cn-north-1".to_string(),
//!     bucket: "fleet-raw".to_string(),
//!     secure: false,
//! };
//! let backend = create_backend("minio", &params)?;
//! backend
//!     .upload_file("trip/gpg/7/car_2025-03-01/clip.zip", Path::new("/tmp/clip.zip"))
//!     .await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`models`]: Core data models shared across the pipeline
//! - [`discovery`]: The three package discovery strategies
//! - [`orchestrator`]: The upload pool, progress readout and report
//! - [`cloud`]: Storage backends and multipart transfer machinery
//! - [`ledger`]: The local at-most-once transfer ledger
//! - [`platform`]: HTTP integration with the fleet platform
//! - [`config`]: Task info and per-environment platform config
//! - [`utils`]: Archiving, hashing and filesystem helpers
//! - [`constants`]: Application-wide constants
//!
//! ## Feature Flags
//!
//! - `embed_config`: Embed the platform config files in the binary

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Core data models shared across the pipeline
pub mod models;

/// Package discovery strategies, one per fleet data flavor
pub mod discovery;

/// The upload pool, progress readout and final report
pub mod orchestrator;

/// Storage backends and multipart transfer machinery
pub mod cloud;

/// Local at-most-once transfer ledger
pub mod ledger;

/// HTTP integration with the fleet platform
pub mod platform;

/// Task info and per-environment platform config
pub mod config;

/// Archiving, hashing and filesystem helpers
pub mod utils;

/// Application constants and tuning values
pub mod constants;
