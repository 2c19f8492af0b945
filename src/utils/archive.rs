use std::fs;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use zip::{write::FileOptions, ZipWriter};

use crate::constants::{
    ARCHIVE_CHUNK_SIZE as CHUNK_SIZE, COMPRESSED_EXTENSIONS, LARGE_FILE_COMPRESSION_THRESHOLD,
};

/// File entry with its compression options
struct ArchiveEntry {
    rel_path: String,
    abs_path: PathBuf,
    options: FileOptions,
}

/// Determine optimal compression level based on file type and size.
///
/// Files that are already compressed (bag recordings, H.264 streams, JPEGs)
/// or very large files use minimal compression for better throughput.
pub fn get_compression_options(path: &Path) -> FileOptions {
    // Detect file type from extension
    let low_compression = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => COMPRESSED_EXTENSIONS.contains(&ext),
        _ => false,
    };

    // Detect if it's very large, in which case use faster compression
    let large_file = match fs::metadata(path) {
        Ok(metadata) if metadata.len() > LARGE_FILE_COMPRESSION_THRESHOLD => true,
        _ => false,
    };

    if low_compression || large_file {
        FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(1))
            .unix_permissions(0o644)
    } else {
        FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(6))
            .unix_permissions(0o644)
    }
}

/// Worker function for archive threads
fn archive_worker(
    receiver: Receiver<Option<ArchiveEntry>>,
    zip: Arc<Mutex<ZipWriter<fs::File>>>,
) -> Result<()> {
    // Thread-local buffer to avoid repeated allocations
    let mut buffer = vec![0u8; CHUNK_SIZE];

    while let Ok(entry_opt) = receiver.recv() {
        match entry_opt {
            Some(entry) => {
                let start = Instant::now();

                let file = fs::File::open(&entry.abs_path)
                    .context(format!("Failed to open {}", entry.abs_path.display()))?;
                let file_size = file.metadata()?.len();
                let mut reader = BufReader::new(file);

                // Acquire lock only when ready to write to the zip
                {
                    let mut zip = zip.lock().unwrap();

                    zip.start_file(entry.rel_path.clone(), entry.options)
                        .context(format!("Failed to start file entry for {}", entry.rel_path))?;

                    // Stream file content in chunks to avoid large memory usage
                    loop {
                        let bytes_read = reader
                            .read(&mut buffer)
                            .context(format!("Failed to read from {}", entry.abs_path.display()))?;

                        if bytes_read == 0 {
                            break;
                        }

                        zip.write_all(&buffer[..bytes_read])
                            .context(format!("Failed to write to zip for {}", entry.rel_path))?;
                    }
                }

                debug!(
                    "Archived {} ({} bytes) in {:?}",
                    entry.rel_path,
                    file_size,
                    start.elapsed()
                );
            }
            None => {
                // End of work signaled by None
                break;
            }
        }
    }

    Ok(())
}

/// Check that an archive on disk is readable and structurally sound.
///
/// Opens the file and parses the central directory. A truncated archive
/// left by an aborted attempt fails this check and gets recreated.
pub fn verify_archive(path: &Path) -> bool {
    match fs::File::open(path) {
        Ok(file) => zip::ZipArchive::new(file).is_ok(),
        Err(_) => false,
    }
}

/// Stage a folder as a ZIP archive named `{folder_name}.zip` under `dest_dir`.
///
/// A valid archive already sitting at the target path is reused, so a
/// folder shared by several packages is only staged once per run.
/// Invalid leftovers are removed and rebuilt. Entries are rooted at the
/// folder name so extraction recreates the original layout.
///
/// # Arguments
///
/// * `source_dir` - Folder to stage
/// * `dest_dir` - Directory the archive is written into
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path to the staged ZIP file
/// * `Err` - If staging fails or the source folder is invalid
pub fn archive_folder(source_dir: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let start = Instant::now();

    let folder_name = source_dir
        .file_name()
        .and_then(|n| n.to_str())
        .context(format!("Invalid source folder {}", source_dir.display()))?
        .to_string();

    fs::create_dir_all(dest_dir)
        .context(format!("Failed to create stage dir {}", dest_dir.display()))?;
    let zip_path = dest_dir.join(format!("{}.zip", folder_name));

    if zip_path.exists() {
        if verify_archive(&zip_path) {
            info!("Reusing staged archive {}", zip_path.display());
            return Ok(zip_path);
        }
        warn!("Removing invalid staged archive {}", zip_path.display());
        fs::remove_file(&zip_path)
            .context(format!("Failed to remove stale archive {}", zip_path.display()))?;
    }

    info!("Staging {} with multithreading...", source_dir.display());

    let zip_file = fs::File::create(&zip_path).context("Failed to create zip file")?;

    // Create zip writer and wrap in Arc<Mutex> for thread sharing
    let zip = Arc::new(Mutex::new(ZipWriter::new(zip_file)));

    // Set up crossbeam channels for work distribution
    let (sender, receiver) = bounded::<Option<ArchiveEntry>>(1000);

    // Calculate optimal thread count (1 thread per CPU core, max 8)
    let thread_count = std::cmp::min(num_cpus::get(), 8);

    let workers = (0..thread_count)
        .map(|i| {
            let worker_receiver = receiver.clone();
            let worker_zip = Arc::clone(&zip);

            std::thread::Builder::new()
                .name(format!("archive-{}", i))
                .spawn(move || {
                    if let Err(e) = archive_worker(worker_receiver, worker_zip) {
                        eprintln!("Error in archive worker {}: {}", i, e);
                        return false;
                    }
                    true
                })
                .unwrap()
        })
        .collect::<Vec<_>>();

    // Entries are rooted at the folder name
    let base_path = source_dir.parent().unwrap_or(source_dir);
    let mut dirs = Vec::new();
    scan_directory(base_path, source_dir, &mut dirs, &sender)?;

    // Signal end of work to all workers
    for _ in 0..thread_count {
        sender.send(None).unwrap();
    }

    // Wait for all workers to finish
    for worker in workers {
        worker.join().unwrap();
    }

    // Finalize the zip file
    {
        let mut zip = Arc::try_unwrap(zip)
            .map_err(|_| anyhow::anyhow!("Failed to unwrap Arc"))?
            .into_inner()
            .unwrap();

        // Add all directory entries (after files to avoid conflicts)
        for dir in dirs {
            zip.add_directory(dir, FileOptions::default())?;
        }

        zip.finish().context("Failed to finalize zip file")?;
    }

    info!("Staged {} in {:?}", zip_path.display(), start.elapsed());
    Ok(zip_path)
}

/// Scan directory and queue files for archiving
fn scan_directory(
    base_path: &Path,
    dir_path: &Path,
    dirs: &mut Vec<String>,
    sender: &Sender<Option<ArchiveEntry>>,
) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let path = entry.path();

        let rel_path = path
            .strip_prefix(base_path)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();

        if path.is_dir() {
            // Save directory for later addition
            dirs.push(format!("{}/", rel_path));

            // Recursively scan subdirectory
            scan_directory(base_path, &path, dirs, sender)?;
        } else {
            // Queue file for archiving with appropriate options
            let options = get_compression_options(&path);
            sender
                .send(Some(ArchiveEntry {
                    rel_path,
                    abs_path: path.clone(),
                    options,
                }))
                .unwrap();
        }
    }

    Ok(())
}
