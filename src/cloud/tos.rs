//! Volcano Engine TOS provider.
//!
//! TOS signs requests against a mandatory region, so construction
//! rejects configurations that omit one.

use std::path::Path;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::cloud::backend::{BackendParams, StorageBackend};
use crate::cloud::client::{create_s3_client, normalize_endpoint, S3Gateway};

pub struct TosBackend {
    gateway: S3Gateway,
}

impl TosBackend {
    pub fn new(params: &BackendParams) -> Result<Self> {
        if params.region.is_empty() {
            return Err(anyhow!("TOS requires a region"));
        }

        let client = create_s3_client(
            &normalize_endpoint(&params.endpoint, params.secure),
            &params.access_key,
            &params.secret_key,
            &params.region,
        )?;
        Ok(TosBackend {
            gateway: S3Gateway::new(client, &params.bucket),
        })
    }
}

#[async_trait]
impl StorageBackend for TosBackend {
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

    fn tos_params(region: &str) -> BackendParams {
        BackendParams {
            endpoint: "tos-cn-beijing.volces.com".to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            region: region.to_string(),
            bucket: "fleet-tos".to_string(),
            secure: true,
        }
    }

    #[test]
    fn test_new_requires_region() {
        assert!(TosBackend::new(&tos_params("")).is_err());
        assert!(TosBackend::new(&tos_params("cn-beijing")).is_ok());
    }
}
