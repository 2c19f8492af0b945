use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, error, warn};
use rusoto_core::{ByteStream, HttpClient, Region, RusotoError};
use rusoto_credential::StaticProvider;
use rusoto_s3::{
    GetObjectRequest, HeadObjectRequest, ListObjectsV2Request, PutObjectRequest, S3Client, S3,
};
use tokio::time::sleep;
use walkdir::WalkDir;

use crate::cloud::backend::StorageBackend;
use crate::cloud::multipart::{self, TransferOptions};
use crate::constants::{MAX_UPLOAD_RETRIES, MULTIPART_CHUNK_SIZE, RETRY_BASE_DELAY_MS};

/// Prefix the endpoint with a scheme when the configuration carries none.
pub fn normalize_endpoint(endpoint: &str, secure: bool) -> String {
    if endpoint.is_empty() || endpoint.contains("://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{}", endpoint)
    } else {
        format!("http://{}", endpoint)
    }
}

/// Join a remote prefix and a relative path into one object key.
pub fn join_key(prefix: &str, rel: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        rel.trim_start_matches('/')
    )
}

/// Collect every regular file under `local_dir` with its key-relative path.
///
/// The walk is sorted so folder uploads attempt files in a stable order.
pub fn relative_keys(local_dir: &Path) -> Vec<(PathBuf, String)> {
    WalkDir::new(local_dir)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(local_dir)
                .unwrap_or_else(|_| e.path())
                .to_string_lossy()
                .replace('\\', "/");
            (e.into_path(), rel)
        })
        .collect()
}

/// Create an S3-compatible client for a custom endpoint with static credentials.
///
/// An empty endpoint selects the provider's own region resolution, which is
/// what plain Amazon S3 deployments use.
pub fn create_s3_client(
    endpoint: &str,
    access_key: &str,
    secret_key: &str,
    region_name: &str,
) -> Result<Arc<S3Client>> {
    let region = if endpoint.is_empty() {
        match region_name.parse::<Region>() {
            Ok(r) => r,
            Err(_) => {
                warn!("Invalid region '{}', using default", region_name);
                Region::default()
            }
        }
    } else {
        let name = if region_name.is_empty() {
            "custom".to_string()
        } else {
            region_name.to_string()
        };
        Region::Custom {
            name,
            endpoint: endpoint.to_string(),
        }
    };

    let dispatcher = HttpClient::new().context("Failed to create HTTP client")?;
    let provider = StaticProvider::new_minimal(access_key.to_string(), secret_key.to_string());
    Ok(Arc::new(S3Client::new_with(dispatcher, provider, region)))
}

/// Shared object operations over one bucket, used by every storage adapter.
///
/// Adapters own client construction and per-provider quirks; the gateway
/// owns the wire mechanics. All `StorageBackend` methods absorb transport
/// errors into a boolean flag, which is the contract the orchestrator
/// relies on.
#[derive(Clone)]
pub struct S3Gateway {
    client: Arc<S3Client>,
    bucket: String,
    options: TransferOptions,
}

impl S3Gateway {
    pub fn new(client: Arc<S3Client>, bucket: &str) -> Self {
        Self::with_options(client, bucket, TransferOptions::default())
    }

    pub fn with_options(client: Arc<S3Client>, bucket: &str, options: TransferOptions) -> Self {
        S3Gateway {
            client,
            bucket: bucket.to_string(),
            options,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload one file, switching to the multipart protocol above the
    /// chunk-size threshold.
    pub async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let metadata = tokio::fs::metadata(path)
            .await
            .context(format!("Failed to get metadata for {}", path.display()))?;
        let file_size = metadata.len();

        if file_size > MULTIPART_CHUNK_SIZE {
            debug!(
                "Using multipart upload for {} ({} bytes)",
                path.display(),
                file_size
            );
            multipart::upload(
                &self.client,
                &self.bucket,
                key,
                path,
                file_size,
                &self.options,
            )
            .await
        } else {
            self.put_small_file(key, path).await
        }
    }

    /// Upload a small file with a single PutObject call, retried with backoff.
    async fn put_small_file(&self, key: &str, path: &Path) -> Result<()> {
        let mut file = fs::File::open(path)
            .context(format!("Failed to open {} for upload", path.display()))?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .context(format!("Failed to read {} for upload", path.display()))?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let request = PutObjectRequest {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                body: Some(ByteStream::from(contents.clone())),
                ..Default::default()
            };

            match self.client.put_object(request).await {
                Ok(_) => {
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= MAX_UPLOAD_RETRIES {
                        return Err(anyhow!(
                            "Failed to upload {} after {} attempts: {}",
                            key,
                            MAX_UPLOAD_RETRIES,
                            e
                        ));
                    }

                    // Exponential backoff
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * 2u64.pow(attempt as u32));
                    warn!(
                        "Upload attempt {} for {} failed, retrying in {:?}: {}",
                        attempt, key, delay, e
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    pub async fn get_file(&self, key: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create {}", parent.display()))?;
        }

        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            ..Default::default()
        };

        let output = self
            .client
            .get_object(request)
            .await
            .context(format!("Failed to fetch {}", key))?;
        let body = output
            .body
            .ok_or_else(|| anyhow!("Empty response body for {}", key))?;

        let mut reader = body.into_async_read();
        let mut file = tokio::fs::File::create(path)
            .await
            .context(format!("Failed to create {}", path.display()))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .context(format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Upload every file under `local_dir`, preserving relative paths below
    /// `prefix`. The first failing file stops the upload.
    pub async fn put_folder(&self, prefix: &str, local_dir: &Path) -> Result<()> {
        if !local_dir.is_dir() {
            return Err(anyhow!("{} is not a folder", local_dir.display()));
        }

        for (abs_path, rel) in relative_keys(local_dir) {
            let key = join_key(prefix, &rel);
            self.put_file(&key, &abs_path)
                .await
                .context(format!("Folder upload stopped at {}", abs_path.display()))?;
        }

        Ok(())
    }

    pub async fn get_folder(&self, prefix: &str, local_dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(local_dir)
            .await
            .context(format!("Failed to create {}", local_dir.display()))?;

        let keys = self.list_keys(prefix, true).await?;
        for key in keys {
            let rel = key
                .strip_prefix(prefix)
                .unwrap_or(&key)
                .trim_start_matches('/');
            let local_path = local_dir.join(rel);
            self.get_file(&key, &local_path)
                .await
                .context(format!("Folder download stopped at {}", key))?;
        }

        Ok(())
    }

    /// Existence probe. A prefix-style key (trailing separator) is truthy
    /// when at least one object lives below it.
    pub async fn head(&self, key: &str) -> Result<bool> {
        if key.ends_with('/') {
            let page = self.list_page(key, None, None, Some(1)).await?;
            return Ok(!page.0.is_empty());
        }

        let request = HeadObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            ..Default::default()
        };

        match self.client.head_object(request).await {
            Ok(_) => Ok(true),
            Err(RusotoError::Unknown(resp)) if resp.status.as_u16() == 404 => Ok(false),
            Err(RusotoError::Service(_)) => Ok(false),
            Err(e) => Err(anyhow!("Existence check for {} failed: {}", key, e)),
        }
    }

    /// List object keys below `prefix`. Non-recursive listing stops at the
    /// first path separator, mirroring a single directory level.
    pub async fn list_keys(&self, prefix: &str, recursive: bool) -> Result<Vec<String>> {
        let delimiter = if recursive { None } else { Some("/".to_string()) };
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let (mut page, next) = self
                .list_page(prefix, delimiter.clone(), token.clone(), None)
                .await?;
            keys.append(&mut page);

            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<String>,
        token: Option<String>,
        max_keys: Option<i64>,
    ) -> Result<(Vec<String>, Option<String>)> {
        let request = ListObjectsV2Request {
            bucket: self.bucket.clone(),
            prefix: Some(prefix.to_string()),
            delimiter,
            continuation_token: token,
            max_keys,
            ..Default::default()
        };

        let output = self
            .client
            .list_objects_v2(request)
            .await
            .context(format!("Failed to list {}", prefix))?;

        let keys = output
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|obj| obj.key)
            .collect();

        let next = if output.is_truncated.unwrap_or(false) {
            output.next_continuation_token
        } else {
            None
        };

        Ok((keys, next))
    }
}

#[async_trait]
impl StorageBackend for S3Gateway {
    async fn upload_file(&self, remote_key: &str, local_path: &Path) -> bool {
        match self.put_file(remote_key, local_path).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to upload {} to {}: {}",
                    local_path.display(),
                    remote_key,
                    e
                );
                false
            }
        }
    }

    async fn download_file(&self, remote_key: &str, local_path: &Path) -> bool {
        match self.get_file(remote_key, local_path).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to download {} to {}: {}",
                    remote_key,
                    local_path.display(),
                    e
                );
                false
            }
        }
    }

    async fn upload_folder(&self, remote_prefix: &str, local_dir: &Path) -> bool {
        match self.put_folder(remote_prefix, local_dir).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to upload folder {} to {}: {}",
                    local_dir.display(),
                    remote_prefix,
                    e
                );
                false
            }
        }
    }

    async fn download_folder(&self, remote_prefix: &str, local_dir: &Path) -> bool {
        match self.get_folder(remote_prefix, local_dir).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to download folder {} to {}: {}",
                    remote_prefix,
                    local_dir.display(),
                    e
                );
                false
            }
        }
    }

    async fn exists(&self, remote_key: &str) -> bool {
        match self.head(remote_key).await {
            Ok(found) => found,
            Err(e) => {
                error!("Existence check for {} failed: {}", remote_key, e);
                false
            }
        }
    }

    async fn list(&self, remote_prefix: &str, recursive: bool) -> Vec<String> {
        match self.list_keys(remote_prefix, recursive).await {
            Ok(keys) => keys,
            Err(e) => {
                error!("Listing {} failed: {}", remote_prefix, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("minio.fleet.local:9000", false),
            "http://minio.fleet.local:9000"
        );
        assert_eq!(
            normalize_endpoint("minio.fleet.local:9000", true),
            "https://minio.fleet.local:9000"
        );
        assert_eq!(
            normalize_endpoint("https://oss-cn-shanghai.aliyuncs.com", false),
            "https://oss-cn-shanghai.aliyuncs.com"
        );
        assert_eq!(normalize_endpoint("", true), "");
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("fleet/a1", "clip_0001.zip"), "fleet/a1/clip_0001.zip");
        assert_eq!(join_key("fleet/a1/", "clip_0001.zip"), "fleet/a1/clip_0001.zip");
        assert_eq!(join_key("fleet/a1/", "/sub/x.bin"), "fleet/a1/sub/x.bin");
    }

    #[test]
    fn test_relative_keys_sorted_and_flattened() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("b")).unwrap();
        fs::write(temp_dir.path().join("b/deep.bin"), b"x").unwrap();
        fs::write(temp_dir.path().join("a.bin"), b"x").unwrap();
        fs::write(temp_dir.path().join("c.bin"), b"x").unwrap();

        let keys: Vec<String> = relative_keys(temp_dir.path())
            .into_iter()
            .map(|(_, rel)| rel)
            .collect();

        assert_eq!(keys, vec!["a.bin", "b/deep.bin", "c.bin"]);
    }

    #[test]
    fn test_create_s3_client_custom_endpoint() {
        let client = create_s3_client("http://127.0.0.1:9000", "ak", "sk", "cn-east-1");
        assert!(client.is_ok());
    }

    #[test]
    fn test_create_s3_client_empty_endpoint_falls_back_to_region() {
        let client = create_s3_client("", "ak", "sk", "definitely-not-a-region");
        assert!(client.is_ok());
    }

    #[test]
    fn test_gateway_bucket() {
        let client = create_s3_client("http://127.0.0.1:9000", "ak", "sk", "test").unwrap();
        let gateway = S3Gateway::new(client, "raw-sensor-data");
        assert_eq!(gateway.bucket(), "raw-sensor-data");
    }
}
