//! Object storage integration for upload targets.
//!
//! This module provides a unified interface over the S3-compatible
//! stores the fleet platform assigns as upload destinations:
//!
//! - `backend`: The provider-neutral `StorageBackend` trait and the
//!   factory that builds a concrete provider from its platform name.
//! - `client`: The shared S3 wire layer every provider delegates to,
//!   including small-object puts with retry and folder transfer.
//! - `multipart`: Chunked transfer for large files, with resumable
//!   serial and abort-on-failure parallel modes.
//! - `minio`, `oss`, `obs`, `tos`, `s3`: Provider adapters holding the
//!   connection quirks of each store.
//!
//! Providers never leak transport errors to callers. Each operation
//! reports success as a boolean and writes the failure detail to the
//! log, so orchestration code treats every store identically.

pub mod backend;
pub mod client;
pub mod minio;
pub mod multipart;
pub mod obs;
pub mod oss;
pub mod s3;
pub mod tos;

pub use backend::{create_backend, BackendParams, StorageBackend};
