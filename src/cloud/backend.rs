//! Provider-neutral storage interface and the factory that selects a
//! concrete provider by name.
//!
//! Every method absorbs its own errors: failures are logged inside the
//! implementation and surfaced as `false` (or an empty listing) so
//! callers branch on outcome instead of unwinding provider-specific
//! error types.

use std::path::Path;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::cloud::minio::MinioBackend;
use crate::cloud::obs::ObsBackend;
use crate::cloud::oss::OssBackend;
use crate::cloud::s3::S3Backend;
use crate::cloud::tos::TosBackend;

/// Connection settings shared by every provider.
#[derive(Debug, Clone, Default)]
pub struct BackendParams {
    /// Service endpoint. May hold several comma-separated addresses.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Region name, where the provider uses one.
    pub region: String,
    pub bucket: String,
    /// Prefer https when the endpoint carries no scheme.
    pub secure: bool,
}

/// Object storage operations the orchestrator relies on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Upload one local file to `remote_key`. Returns success.
    async fn upload_file(&self, remote_key: &str, local_path: &Path) -> bool;

    /// Download `remote_key` to a local path, creating parent directories.
    async fn download_file(&self, remote_key: &str, local_path: &Path) -> bool;

    /// Upload a directory tree under `remote_prefix`, stopping at the
    /// first file that fails.
    async fn upload_folder(&self, remote_prefix: &str, local_dir: &Path) -> bool;

    /// Download every object under `remote_prefix` into `local_dir`.
    async fn download_folder(&self, remote_prefix: &str, local_dir: &Path) -> bool;

    /// Whether an object (or any object under a `/`-terminated prefix)
    /// exists.
    async fn exists(&self, remote_key: &str) -> bool;

    /// Object keys under `remote_prefix`, one level deep unless
    /// `recursive`.
    async fn list(&self, remote_prefix: &str, recursive: bool) -> Vec<String>;
}

#[cfg(test)]
impl std::fmt::Debug for dyn StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StorageBackend")
    }
}

/// Build the backend named by `cloud_type`.
pub fn create_backend(cloud_type: &str, params: &BackendParams) -> Result<Box<dyn StorageBackend>> {
    match cloud_type {
        "minio" => Ok(Box::new(MinioBackend::new(params)?)),
        "volcano" => Ok(Box::new(TosBackend::new(params)?)),
        "obs" => Ok(Box::new(ObsBackend::new(params)?)),
        "oss" => Ok(Box::new(OssBackend::new(params)?)),
        "s3" => Ok(Box::new(S3Backend::new(params)?)),
        other => Err(anyhow!("Unsupported cloud type: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn test_params() -> BackendParams {
        BackendParams {
            endpoint: "http://localhost:9000".to_string(),
            access_key: "test-access".to_string(),
            secret_key: "test-secret".to_string(),
            region: "cn-north-1".to_string(),
            bucket: "test-bucket".to_string(),
            secure: false,
        }
    }

    #[test]
    fn test_create_backend_supported_types() {
        for cloud_type in ["minio", "volcano", "obs", "oss", "s3"] {
            let backend = create_backend(cloud_type, &test_params());
            assert!(backend.is_ok(), "{} should construct", cloud_type);
        }
    }

    #[test]
    fn test_create_backend_unknown_type() {
        let result = create_backend("gcs", &test_params());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("gcs"));
    }

    #[tokio::test]
    async fn test_mock_backend_absorbs_failure() {
        let mut backend = MockStorageBackend::new();
        backend
            .expect_upload_file()
            .with(eq("records/a.zip"), mockall::predicate::always())
            .times(1)
            .returning(|_, _| false);

        assert!(!backend.upload_file("records/a.zip", Path::new("/tmp/a.zip")).await);
    }

    #[tokio::test]
    async fn test_mock_backend_list() {
        let mut backend = MockStorageBackend::new();
        backend
            .expect_list()
            .returning(|prefix, _| vec![format!("{}one", prefix), format!("{}two", prefix)]);

        let keys = backend.list("data/", true).await;
        assert_eq!(keys, vec!["data/one", "data/two"]);
    }
}
