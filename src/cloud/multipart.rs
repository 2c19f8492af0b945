//! Chunked, resumable upload protocol for files above the part-size
//! threshold.
//!
//! Two modes with deliberately different failure behavior: serial mode
//! uploads parts in order and leaves a failed session open so a later
//! run can resume from the completed-parts list; parallel mode spreads
//! parts over a bounded set of in-flight requests and aborts the whole
//! session on the first unrecoverable part failure.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::future;
use log::{debug, info, warn};
use rusoto_core::ByteStream;
use rusoto_s3::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedMultipartUpload,
    CompletedPart, CreateMultipartUploadRequest, ListMultipartUploadsRequest, ListPartsRequest,
    S3Client, UploadPartRequest, S3,
};
use tokio::fs::File as AsyncFile;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::sleep;

use crate::constants::{
    MAX_UPLOAD_RETRIES, MULTIPART_CHUNK_SIZE, MULTIPART_WORKERS, RETRY_BASE_DELAY_MS,
};

/// Behavior switches for one multipart transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Look for an open session with the same key and continue it.
    pub resume: bool,
    /// Upload missing parts concurrently instead of in order.
    pub parallel: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            resume: false,
            parallel: true,
        }
    }
}

/// Number of parts a file of `file_size` splits into.
pub fn num_parts(file_size: u64, chunk_size: u64) -> u64 {
    (file_size + chunk_size - 1) / chunk_size
}

/// Part numbers in `1..=total` not yet present in `existing`.
pub fn missing_parts(existing: &[CompletedPart], total: u64) -> Vec<u64> {
    (1..=total)
        .filter(|n| {
            !existing
                .iter()
                .any(|p| p.part_number == Some(*n as i64))
        })
        .collect()
}

/// True iff `parts` holds exactly the part numbers `1..=total`.
///
/// Completion must never be attempted with a gap or a duplicate; the
/// server would assemble a corrupt object from a partial set.
pub fn is_complete_set(parts: &[CompletedPart], total: u64) -> bool {
    if parts.len() as u64 != total {
        return false;
    }
    let mut numbers: Vec<i64> = parts.iter().filter_map(|p| p.part_number).collect();
    numbers.sort_unstable();
    numbers == (1..=total as i64).collect::<Vec<i64>>()
}

/// Upload one file in chunks, honoring the resume and parallelism options.
pub async fn upload(
    client: &Arc<S3Client>,
    bucket: &str,
    key: &str,
    path: &Path,
    file_size: u64,
    options: &TransferOptions,
) -> Result<()> {
    let total = num_parts(file_size, MULTIPART_CHUNK_SIZE);
    debug!(
        "Uploading {} as {} parts (parallel = {}, resume = {})",
        path.display(),
        total,
        options.parallel,
        options.resume
    );

    // Recover an open session for this key when resuming
    let (mut upload_id, existing) = if options.resume {
        find_resumable_session(client, bucket, key).await
    } else {
        (None, Vec::new())
    };

    if let Some(ref id) = upload_id {
        info!(
            "Resuming session {} for {} with {} completed parts",
            id,
            key,
            existing.len()
        );
    }

    if upload_id.is_none() {
        let create_result = client
            .create_multipart_upload(CreateMultipartUploadRequest {
                bucket: bucket.to_string(),
                key: key.to_string(),
                ..Default::default()
            })
            .await
            .context("Failed to initialize multipart upload")?;
        upload_id = Some(
            create_result
                .upload_id
                .ok_or_else(|| anyhow!("No upload ID returned for {}", key))?,
        );
    }
    let upload_id = upload_id.unwrap_or_default();

    let result = if options.parallel {
        parallel_upload(client, bucket, key, &upload_id, path, file_size, existing).await
    } else {
        serial_upload(client, bucket, key, &upload_id, path, file_size, existing).await
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if options.parallel => {
            // Parallel mode trades resumability for speed: tear the
            // session down so no half-finished parts linger server-side.
            let _ = client
                .abort_multipart_upload(AbortMultipartUploadRequest {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    upload_id: upload_id.clone(),
                    ..Default::default()
                })
                .await;
            Err(anyhow!("Part upload failed, aborted session {}: {}", upload_id, e))
        }
        Err(e) => {
            // Serial sessions stay open so a later resume can continue
            warn!(
                "Session {} for {} left open for resume: {}",
                upload_id, key, e
            );
            Err(e)
        }
    }
}

/// Find an open session whose key matches exactly, with its completed parts.
pub async fn find_resumable_session(
    client: &S3Client,
    bucket: &str,
    key: &str,
) -> (Option<String>, Vec<CompletedPart>) {
    let request = ListMultipartUploadsRequest {
        bucket: bucket.to_string(),
        prefix: Some(key.to_string()),
        ..Default::default()
    };

    let uploads = match client.list_multipart_uploads(request).await {
        Ok(output) => output.uploads.unwrap_or_default(),
        Err(e) => {
            warn!("Failed to list open sessions for {}: {}", key, e);
            return (None, Vec::new());
        }
    };

    for upload in uploads {
        if upload.key.as_deref() != Some(key) {
            continue;
        }
        let upload_id = match upload.upload_id {
            Some(id) => id,
            None => continue,
        };

        let parts_request = ListPartsRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.clone(),
            ..Default::default()
        };

        let parts = match client.list_parts(parts_request).await {
            Ok(output) => output
                .parts
                .unwrap_or_default()
                .into_iter()
                .map(|p| CompletedPart {
                    e_tag: p.e_tag,
                    part_number: p.part_number,
                })
                .collect(),
            Err(e) => {
                warn!("Failed to list parts of session {}: {}", upload_id, e);
                Vec::new()
            }
        };

        return (Some(upload_id), parts);
    }

    (None, Vec::new())
}

/// Read the byte range belonging to one 1-based part number.
async fn read_part(
    path: &Path,
    part_number: u64,
    chunk_size: u64,
    file_size: u64,
) -> Result<Vec<u8>> {
    let start_byte = (part_number - 1) * chunk_size;
    let end_byte = std::cmp::min(part_number * chunk_size, file_size);
    let part_size = (end_byte - start_byte) as usize;

    let mut file = AsyncFile::open(path)
        .await
        .context(format!("Failed to open {} for part read", path.display()))?;
    file.seek(std::io::SeekFrom::Start(start_byte)).await?;

    let mut buffer = vec![0u8; part_size];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}

/// Upload missing parts in order, one attempt each. A failure returns
/// immediately without touching the session.
async fn serial_upload(
    client: &Arc<S3Client>,
    bucket: &str,
    key: &str,
    upload_id: &str,
    path: &Path,
    file_size: u64,
    existing: Vec<CompletedPart>,
) -> Result<()> {
    let total = num_parts(file_size, MULTIPART_CHUNK_SIZE);
    let mut completed = existing.clone();

    for part_number in missing_parts(&existing, total) {
        let buffer = read_part(path, part_number, MULTIPART_CHUNK_SIZE, file_size).await?;

        debug!(
            "Uploading part {}/{} of {} ({} bytes)",
            part_number,
            total,
            key,
            buffer.len()
        );

        let output = client
            .upload_part(UploadPartRequest {
                bucket: bucket.to_string(),
                key: key.to_string(),
                upload_id: upload_id.to_string(),
                part_number: part_number as i64,
                body: Some(ByteStream::from(buffer)),
                ..Default::default()
            })
            .await
            .context(format!("Failed to upload part {} of {}", part_number, key))?;

        completed.push(CompletedPart {
            e_tag: Some(
                output
                    .e_tag
                    .ok_or_else(|| anyhow!("No ETag for part {} of {}", part_number, key))?,
            ),
            part_number: Some(part_number as i64),
        });
    }

    complete_session(client, bucket, key, upload_id, completed, total).await
}

/// Upload missing parts with bounded concurrency and per-part retries.
async fn parallel_upload(
    client: &Arc<S3Client>,
    bucket: &str,
    key: &str,
    upload_id: &str,
    path: &Path,
    file_size: u64,
    existing: Vec<CompletedPart>,
) -> Result<()> {
    let total = num_parts(file_size, MULTIPART_CHUNK_SIZE);
    let pending = missing_parts(&existing, total);

    if pending.is_empty() {
        debug!("All {} parts of {} already uploaded", total, key);
        return complete_session(client, bucket, key, upload_id, existing, total).await;
    }

    let mut completed = existing;

    // Process parts in chunks to bound in-flight requests
    for batch in pending.chunks(MULTIPART_WORKERS) {
        let mut batch_futures = Vec::with_capacity(batch.len());

        for &part_number in batch {
            let bucket = bucket.to_string();
            let key = key.to_string();
            let upload_id = upload_id.to_string();
            let client = Arc::clone(client);
            let path = path.to_path_buf();

            let part_future = async move {
                let mut attempts = 0;

                while attempts < MAX_UPLOAD_RETRIES {
                    attempts += 1;

                    let buffer =
                        read_part(&path, part_number, MULTIPART_CHUNK_SIZE, file_size).await?;

                    let request = UploadPartRequest {
                        bucket: bucket.clone(),
                        key: key.clone(),
                        upload_id: upload_id.clone(),
                        part_number: part_number as i64,
                        body: Some(ByteStream::from(buffer)),
                        ..Default::default()
                    };

                    match client.upload_part(request).await {
                        Ok(output) => {
                            let e_tag = output
                                .e_tag
                                .ok_or_else(|| anyhow!("No ETag in upload part response"))?;

                            return Ok::<_, anyhow::Error>(CompletedPart {
                                e_tag: Some(e_tag),
                                part_number: Some(part_number as i64),
                            });
                        }
                        Err(e) => {
                            if attempts >= MAX_UPLOAD_RETRIES {
                                return Err(anyhow!(
                                    "Failed to upload part {} after {} attempts: {}",
                                    part_number,
                                    MAX_UPLOAD_RETRIES,
                                    e
                                ));
                            }

                            // Exponential backoff
                            let delay = Duration::from_millis(
                                RETRY_BASE_DELAY_MS * 2u64.pow(attempts as u32),
                            );
                            warn!(
                                "Part {} attempt {} failed, retrying in {:?}: {}",
                                part_number, attempts, delay, e
                            );
                            sleep(delay).await;
                        }
                    }
                }

                Err(anyhow!(
                    "Failed to upload part {} after maximum retries",
                    part_number
                ))
            };

            batch_futures.push(part_future);
        }

        for result in future::join_all(batch_futures).await {
            completed.push(result?);
        }
    }

    complete_session(client, bucket, key, upload_id, completed, total).await
}

/// Commit the full ordered part set server-side.
async fn complete_session(
    client: &S3Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    mut parts: Vec<CompletedPart>,
    total: u64,
) -> Result<()> {
    parts.sort_by_key(|part| part.part_number.unwrap_or(0));

    if !is_complete_set(&parts, total) {
        return Err(anyhow!(
            "Refusing to complete {}: have {} of {} parts",
            key,
            parts.len(),
            total
        ));
    }

    client
        .complete_multipart_upload(CompleteMultipartUploadRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            multipart_upload: Some(CompletedMultipartUpload { parts: Some(parts) }),
            ..Default::default()
        })
        .await
        .context("Failed to complete multipart upload")?;

    debug!("Completed multipart upload for {}", key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn part(number: i64) -> CompletedPart {
        CompletedPart {
            e_tag: Some(format!("\"etag-{}\"", number)),
            part_number: Some(number),
        }
    }

    #[test]
    fn test_num_parts() {
        let chunk = MULTIPART_CHUNK_SIZE;
        assert_eq!(num_parts(chunk - 1, chunk), 1);
        assert_eq!(num_parts(chunk, chunk), 1);
        assert_eq!(num_parts(chunk + 1, chunk), 2);
        assert_eq!(num_parts(chunk * 10, chunk), 10);
    }

    #[test]
    fn test_missing_parts_resume() {
        // Parts 1 and 2 recovered from an open session; only the rest upload
        let existing = vec![part(1), part(2)];
        assert_eq!(missing_parts(&existing, 5), vec![3, 4, 5]);
        assert_eq!(missing_parts(&[], 3), vec![1, 2, 3]);
        assert!(missing_parts(&existing, 2).is_empty());
    }

    #[test]
    fn test_is_complete_set() {
        assert!(is_complete_set(&[part(2), part(1), part(3)], 3));
        assert!(!is_complete_set(&[part(1), part(3)], 3));
        assert!(!is_complete_set(&[part(1), part(1), part(2)], 3));
        assert!(!is_complete_set(&[part(1), part(2), part(3), part(4)], 3));
        assert!(is_complete_set(&[], 0));
    }

    #[tokio::test]
    async fn test_read_part_ranges() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let chunk = 4u64;
        let size = 10u64;
        assert_eq!(read_part(file.path(), 1, chunk, size).await.unwrap(), b"0123");
        assert_eq!(read_part(file.path(), 2, chunk, size).await.unwrap(), b"4567");
        assert_eq!(read_part(file.path(), 3, chunk, size).await.unwrap(), b"89");
    }

    #[test]
    fn test_default_options() {
        let options = TransferOptions::default();
        assert!(options.parallel);
        assert!(!options.resume);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let delays: Vec<_> = (1..=MAX_UPLOAD_RETRIES)
            .map(|attempt| Duration::from_millis(RETRY_BASE_DELAY_MS * 2u64.pow(attempt as u32)))
            .collect();

        assert_eq!(delays[0], Duration::from_millis(500));
        assert_eq!(delays[1], Duration::from_millis(1000));
        assert_eq!(delays[2], Duration::from_millis(2000));
    }

    proptest! {
        #[test]
        fn prop_part_count_matches_ceiling(file_size in 1u64..1_000_000, chunk_size in 1u64..10_000) {
            let total = num_parts(file_size, chunk_size);
            prop_assert!(total * chunk_size >= file_size);
            prop_assert!((total - 1) * chunk_size < file_size);
        }

        #[test]
        fn prop_part_ranges_cover_file(file_size in 1u64..100_000, chunk_size in 1u64..1_000) {
            let total = num_parts(file_size, chunk_size);
            let mut covered = 0u64;
            for part_number in 1..=total {
                let start = (part_number - 1) * chunk_size;
                let end = std::cmp::min(part_number * chunk_size, file_size);
                prop_assert!(end > start);
                covered += end - start;
            }
            prop_assert_eq!(covered, file_size);
        }

        #[test]
        fn prop_missing_and_existing_partition(total in 1u64..200, keep in proptest::collection::vec(1u64..200, 0..50)) {
            let existing: Vec<CompletedPart> = keep
                .iter()
                .filter(|n| **n <= total)
                .map(|n| part(*n as i64))
                .collect();
            let missing = missing_parts(&existing, total);

            // No overlap, and together they cover 1..=total
            for m in &missing {
                prop_assert!(!existing.iter().any(|p| p.part_number == Some(*m as i64)));
            }
            let mut all: Vec<u64> = missing;
            all.extend(existing.iter().filter_map(|p| p.part_number.map(|n| n as u64)));
            all.sort_unstable();
            all.dedup();
            prop_assert_eq!(all, (1..=total).collect::<Vec<u64>>());
        }
    }
}
