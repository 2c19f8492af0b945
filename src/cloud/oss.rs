//! Alibaba OSS provider.
//!
//! OSS connections in the field degrade in a way a fresh client
//! recovers from, so failed uploads rebuild the client between
//! attempts. Large objects transfer serially with resume enabled:
//! an interrupted run picks up the open session instead of starting
//! over.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::time::sleep;

use crate::cloud::backend::{BackendParams, StorageBackend};
use crate::cloud::client::{create_s3_client, join_key, relative_keys, S3Gateway};
use crate::cloud::multipart::TransferOptions;
use crate::constants::{MAX_UPLOAD_RETRIES, RETRY_BASE_DELAY_MS};

pub struct OssBackend {
    params: BackendParams,
    gateway: RwLock<S3Gateway>,
}

impl OssBackend {
    pub fn new(params: &BackendParams) -> Result<Self> {
        Ok(OssBackend {
            params: params.clone(),
            gateway: RwLock::new(Self::build_gateway(params)?),
        })
    }

    fn build_gateway(params: &BackendParams) -> Result<S3Gateway> {
        let client = create_s3_client(
            &params.endpoint,
            &params.access_key,
            &params.secret_key,
            &params.region,
        )?;
        Ok(S3Gateway::with_options(
            client,
            &params.bucket,
            TransferOptions {
                resume: true,
                parallel: false,
            },
        ))
    }

    fn gateway(&self) -> S3Gateway {
        self.gateway
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the client after a failed transfer. A rebuild failure
    /// keeps the old client, which the next retry will exercise again.
    fn rebuild_client(&self) {
        match Self::build_gateway(&self.params) {
            Ok(fresh) => {
                let mut guard = self
                    .gateway
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                *guard = fresh;
                debug!("Rebuilt OSS client after transfer failure");
            }
            Err(e) => warn!("Failed to rebuild OSS client: {}", e),
        }
    }
}

#[async_trait]
impl StorageBackend for OssBackend {
    async fn upload_file(&self, remote_key: &str, local_path: &Path) -> bool {
        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.gateway().put_file(remote_key, local_path).await {
                Ok(()) => return true,
                Err(e) => {
                    error!(
                        "OSS upload attempt {} for {} failed: {}",
                        attempt, remote_key, e
                    );
                    if attempt >= MAX_UPLOAD_RETRIES {
                        return false;
                    }

                    self.rebuild_client();
                    let delay =
                        Duration::from_millis(RETRY_BASE_DELAY_MS * 2u64.pow(attempt as u32));
                    sleep(delay).await;
                }
            }
        }
    }

    async fn download_file(&self, remote_key: &str, local_path: &Path) -> bool {
        self.gateway().download_file(remote_key, local_path).await
    }

    async fn upload_folder(&self, remote_prefix: &str, local_dir: &Path) -> bool {
        if !local_dir.is_dir() {
            error!("{} is not a folder", local_dir.display());
            return false;
        }

        // Route each file through upload_file so every one gets the
        // rebuild-and-retry treatment
        for (abs_path, rel) in relative_keys(local_dir) {
            let key = join_key(remote_prefix, &rel);
            if !self.upload_file(&key, &abs_path).await {
                error!("Folder upload stopped at {}", abs_path.display());
                return false;
            }
        }

        true
    }

    async fn download_folder(&self, remote_prefix: &str, local_dir: &Path) -> bool {
        self.gateway().download_folder(remote_prefix, local_dir).await
    }

    async fn exists(&self, remote_key: &str) -> bool {
        self.gateway().exists(remote_key).await
    }

    async fn list(&self, remote_prefix: &str, recursive: bool) -> Vec<String> {
        self.gateway().list(remote_prefix, recursive).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oss_params() -> BackendParams {
        BackendParams {
            endpoint: "https://oss-cn-shanghai.aliyuncs.com".to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            region: "cn-shanghai".to_string(),
            bucket: "fleet-archive".to_string(),
            secure: true,
        }
    }

    #[test]
    fn test_new_and_rebuild() {
        let backend = OssBackend::new(&oss_params()).unwrap();
        assert_eq!(backend.gateway().bucket(), "fleet-archive");

        // A rebuild swaps in a fresh client without disturbing config
        backend.rebuild_client();
        assert_eq!(backend.gateway().bucket(), "fleet-archive");
    }

    #[tokio::test]
    async fn test_upload_folder_rejects_file_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let backend = OssBackend::new(&oss_params()).unwrap();
        assert!(!backend.upload_folder("prefix", file.path()).await);
    }
}
