//! Integration tests for the chunked transfer plan.
//!
//! These tests pin down how large files split into parts, how a resume
//! skips what an earlier session already delivered, and the guard that
//! refuses to commit an incomplete part set.

use rusoto_s3::CompletedPart;

use rust_uploader::cloud::multipart::{
    is_complete_set, missing_parts, num_parts, TransferOptions,
};
use rust_uploader::constants::{MULTIPART_CHUNK_SIZE, S3_MAX_PARTS};

fn part(number: i64) -> CompletedPart {
    CompletedPart {
        e_tag: Some(format!("\"etag-{}\"", number)),
        part_number: Some(number),
    }
}

/// Test the part plan for a typical recorder bag just over 1 GB
#[test]
fn test_part_plan_for_large_bag() {
    let file_size = 1_181_116_006; // ~1.1 GB
    let total = num_parts(file_size, MULTIPART_CHUNK_SIZE);

    assert_eq!(total, 12);

    // Eleven full chunks plus a short final part
    let tail = file_size - (total - 1) * MULTIPART_CHUNK_SIZE;
    assert!(tail > 0);
    assert!(tail < MULTIPART_CHUNK_SIZE);
}

/// Test that a file of exactly one chunk needs no split
#[test]
fn test_chunk_boundary_is_single_part() {
    assert_eq!(num_parts(MULTIPART_CHUNK_SIZE, MULTIPART_CHUNK_SIZE), 1);
    assert_eq!(num_parts(MULTIPART_CHUNK_SIZE + 1, MULTIPART_CHUNK_SIZE), 2);
}

/// Test that the provider part ceiling is out of reach for fleet media
#[test]
fn test_part_count_stays_under_provider_ceiling() {
    // Bags top out well under a disk image; 500 GB is a generous bound
    let big = 500 * 1024 * 1024 * 1024u64;
    assert_eq!(num_parts(big, MULTIPART_CHUNK_SIZE), 5120);
    assert!(num_parts(big, MULTIPART_CHUNK_SIZE) <= S3_MAX_PARTS);
}

/// Test that a resumed session uploads only the parts it is missing
#[test]
fn test_resume_skips_recovered_parts() {
    let recovered = vec![part(1), part(2), part(5)];

    assert_eq!(missing_parts(&recovered, 6), vec![3, 4, 6]);

    // Nothing recovered means everything uploads
    assert_eq!(missing_parts(&[], 3), vec![1, 2, 3]);

    // Everything recovered means the session just completes
    assert!(missing_parts(&recovered, 2).is_empty());
}

/// Test the guard that refuses to commit gapped or padded part sets
#[test]
fn test_completion_requires_exact_part_cover() {
    assert!(is_complete_set(&[part(3), part(1), part(2)], 3));

    // A gap, a duplicate, and an extra part are each rejected
    assert!(!is_complete_set(&[part(1), part(3)], 3));
    assert!(!is_complete_set(&[part(1), part(1), part(3)], 3));
    assert!(!is_complete_set(&[part(1), part(2), part(3), part(4)], 3));
}

/// Test the default transfer behavior: parallel, no resume
#[test]
fn test_default_transfer_options() {
    let options = TransferOptions::default();
    assert!(options.parallel);
    assert!(!options.resume);
}
