//! Huawei OBS provider.
//!
//! OBS endpoints are configured without a scheme; the secure flag
//! decides between http and https.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::cloud::backend::{BackendParams, StorageBackend};
use crate::cloud::client::{create_s3_client, normalize_endpoint, S3Gateway};

pub struct ObsBackend {
    gateway: S3Gateway,
}

impl ObsBackend {
    pub fn new(params: &BackendParams) -> Result<Self> {
        let client = create_s3_client(
            &normalize_endpoint(&params.endpoint, params.secure),
            &params.access_key,
            &params.secret_key,
            &params.region,
        )?;
        Ok(ObsBackend {
            gateway: S3Gateway::new(client, &params.bucket),
        })
    }
}

#[async_trait]
impl StorageBackend for ObsBackend {
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
    fn test_new_applies_scheme() {
        let params = BackendParams {
            endpoint: "obs.cn-east-3.myhuaweicloud.com".to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            region: "cn-east-3".to_string(),
            bucket: "fleet-obs".to_string(),
            secure: true,
        };
        let backend = ObsBackend::new(&params).unwrap();
        assert_eq!(backend.gateway.bucket(), "fleet-obs");
    }
}
