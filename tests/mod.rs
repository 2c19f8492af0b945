//! Integration test modules for fleet-uploader.
//!
//! This module organizes all integration tests that verify
//! end-to-end functionality of the upload orchestrator.

mod discovery_tests;
mod ledger_tests;
mod multipart_tests;
