//! Shared transfer progress readout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::constants::{BYTES_PER_GB, UPLOAD_PROGRESS_INTERVAL_SECS};

/// Byte counter every upload worker feeds, with a background task that
/// logs the running percentage on a fixed interval.
#[derive(Clone)]
pub struct ProgressCounter {
    total: u64,
    transferred: Arc<AtomicU64>,
}

impl ProgressCounter {
    pub fn new(total: u64) -> Self {
        ProgressCounter {
            total,
            transferred: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    /// Start the periodic log line. Abort the handle once uploads are
    /// done.
    pub fn spawn_reporter(&self) -> JoinHandle<()> {
        let counter = self.clone();
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(UPLOAD_PROGRESS_INTERVAL_SECS)).await;
                counter.log_progress();
            }
        })
    }

    fn log_progress(&self) {
        let done = self.transferred();
        if self.total == 0 {
            info!("Uploaded {:.2} GB", done as f64 / BYTES_PER_GB);
            return;
        }
        info!(
            "Upload progress: {:.1}% ({:.2} / {:.2} GB)",
            done as f64 * 100.0 / self.total as f64,
            done as f64 / BYTES_PER_GB,
            self.total as f64 / BYTES_PER_GB
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates_across_clones() {
        let counter = ProgressCounter::new(100);
        let other = counter.clone();
        counter.add(30);
        other.add(20);
        assert_eq!(counter.transferred(), 50);
        assert_eq!(other.transferred(), 50);
    }

    #[test]
    fn test_reporter_aborts_cleanly() {
        tokio_test::block_on(async {
            let counter = ProgressCounter::new(10);
            let reporter = counter.spawn_reporter();
            reporter.abort();
            assert!(reporter.await.unwrap_err().is_cancelled());
        });
    }
}
