//! Amazon S3 provider.
//!
//! The only provider that normally runs without an explicit endpoint:
//! an empty endpoint selects the public AWS service for the configured
//! region.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::cloud::backend::{BackendParams, StorageBackend};
use crate::cloud::client::{create_s3_client, S3Gateway};

pub struct S3Backend {
    gateway: S3Gateway,
}

impl S3Backend {
    pub fn new(params: &BackendParams) -> Result<Self> {
        let client = create_s3_client(
            &params.endpoint,
            &params.access_key,
            &params.secret_key,
            &params.region,
        )?;
        Ok(S3Backend {
            gateway: S3Gateway::new(client, &params.bucket),
        })
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn upload_file(&self, remote_key: &str, local_path: &Path) -> bool {
        self.gateway.upload_file(remote_key, local_path).await
    }

    async fn download_file(&self, remote_key: &str, local_path: &Path) -> bool {
        self.gateway.download_file(remote_key, local_path).await
    }

    async fn upload_folder(&self, remote_prefix: &str, local_dir: &Path) -> bool {
        self.gateway.upload_folder(remote_prefix, local_dir).await
    }

    async fn download_folder(&self, remote_prefix: &str, local_dir: &Path) -> bool {
        self.gateway.download_folder(remote_prefix, local_dir).await
    }

    async fn exists(&self, remote_key: &str) -> bool {
        self.gateway.exists(remote_key).await
    }

    async fn list(&self, remote_prefix: &str, recursive: bool) -> Vec<String> {
        self.gateway.list(remote_prefix, recursive).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_with_region_only() {
        let params = BackendParams {
            endpoint: String::new(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            region: "us-east-1".to_string(),
            bucket: "fleet-data".to_string(),
            secure: true,
        };
        let backend = S3Backend::new(&params).unwrap();
        assert_eq!(backend.gateway.bucket(), "fleet-data");
    }
}
