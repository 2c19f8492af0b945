//! MinIO provider.
//!
//! On-vehicle deployments front several MinIO nodes behind one
//! comma-separated endpoint list; requests rotate across the nodes so
//! a long batch does not pin a single server.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;

use crate::cloud::backend::{BackendParams, StorageBackend};
use crate::cloud::client::{create_s3_client, normalize_endpoint, S3Gateway};

pub struct MinioBackend {
    gateways: Vec<S3Gateway>,
    counter: AtomicUsize,
}

impl MinioBackend {
    pub fn new(params: &BackendParams) -> Result<Self> {
        let mut gateways = Vec::new();
        for endpoint in params.endpoint.split(',') {
            let endpoint = endpoint.trim();
            if endpoint.is_empty() {
                continue;
            }
            let client = create_s3_client(
                &normalize_endpoint(endpoint, params.secure),
                &params.access_key,
                &params.secret_key,
                &params.region,
            )?;
            gateways.push(S3Gateway::new(client, &params.bucket));
        }

        if gateways.is_empty() {
            return Err(anyhow!("No MinIO endpoint configured"));
        }

        debug!("MinIO backend with {} endpoint(s)", gateways.len());
        Ok(MinioBackend {
            gateways,
            counter: AtomicUsize::new(0),
        })
    }

    fn next_index(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % self.gateways.len()
    }

    fn pick(&self) -> &S3Gateway {
        &self.gateways[self.next_index()]
    }
}

#[async_trait]
impl StorageBackend for MinioBackend {
    async fn upload_file(&self, remote_key: &str, local_path: &Path) -> bool {
        self.pick().upload_file(remote_key, local_path).await
    }

    async fn download_file(&self, remote_key: &str, local_path: &Path) -> bool {
        self.pick().download_file(remote_key, local_path).await
    }

    async fn upload_folder(&self, remote_prefix: &str, local_dir: &Path) -> bool {
        self.pick().upload_folder(remote_prefix, local_dir).await
    }

    async fn download_folder(&self, remote_prefix: &str, local_dir: &Path) -> bool {
        self.pick().download_folder(remote_prefix, local_dir).await
    }

    async fn exists(&self, remote_key: &str) -> bool {
        self.pick().exists(remote_key).await
    }

    async fn list(&self, remote_prefix: &str, recursive: bool) -> Vec<String> {
        self.pick().list(remote_prefix, recursive).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multi_node_params() -> BackendParams {
        BackendParams {
            endpoint: "10.0.0.1:9000,10.0.0.2:9000, 10.0.0.3:9000".to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            region: String::new(),
            bucket: "vehicle-raw".to_string(),
            secure: false,
        }
    }

    #[test]
    fn test_splits_endpoint_list() {
        let backend = MinioBackend::new(&multi_node_params()).unwrap();
        assert_eq!(backend.gateways.len(), 3);
    }

    #[test]
    fn test_round_robin_rotation() {
        let backend = MinioBackend::new(&multi_node_params()).unwrap();
        let picks: Vec<usize> = (0..7).map(|_| backend.next_index()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let params = BackendParams {
            endpoint: " , ".to_string(),
            ..multi_node_params()
        };
        assert!(MinioBackend::new(&params).is_err());
    }
}
