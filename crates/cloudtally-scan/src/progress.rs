//! Scan progress reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

/// Progress information during a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    /// Accounts selected for this run.
    pub accounts_total: u64,
    /// Accounts that reached a terminal state.
    pub accounts_done: u64,
    /// Accounts whose credentials could not be obtained.
    pub accounts_failed: u64,
    /// (account, region) tasks finished so far.
    pub regions_scanned: u64,
    /// Classified records so far.
    pub records: u64,
    /// Permission gaps so far.
    pub gaps: u64,
    /// Account most recently started.
    pub current_account: String,
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Fraction of accounts finished, in `0.0..=1.0`.
    pub fn fraction_done(&self) -> f64 {
        if self.accounts_total == 0 {
            0.0
        } else {
            self.accounts_done as f64 / self.accounts_total as f64
        }
    }

    /// Regions finished per second.
    pub fn regions_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.regions_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Shared progress counters for one run.
///
/// Updated from every account and region task; each update broadcasts a
/// snapshot. Send errors are ignored since nobody may be listening.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    tx: broadcast::Sender<ScanProgress>,
    start_time: Instant,
    accounts_total: u64,
    accounts_done: AtomicU64,
    accounts_failed: AtomicU64,
    regions_scanned: AtomicU64,
    records: AtomicU64,
    gaps: AtomicU64,
    current_account: Mutex<String>,
}

impl ProgressTracker {
    pub fn new(tx: broadcast::Sender<ScanProgress>, accounts_total: usize) -> Self {
        Self {
            tx,
            start_time: Instant::now(),
            accounts_total: accounts_total as u64,
            accounts_done: AtomicU64::new(0),
            accounts_failed: AtomicU64::new(0),
            regions_scanned: AtomicU64::new(0),
            records: AtomicU64::new(0),
            gaps: AtomicU64::new(0),
            current_account: Mutex::new(String::new()),
        }
    }

    pub fn account_started(&self, account_id: &str) {
        if let Ok(mut current) = self.current_account.lock() {
            current.clear();
            current.push_str(account_id);
        }
        self.publish();
    }

    pub fn account_finished(&self, failed: bool) {
        self.accounts_done.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.accounts_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.publish();
    }

    pub fn region_finished(&self, records: usize, gaps: usize) {
        self.regions_scanned.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
        self.gaps.fetch_add(gaps as u64, Ordering::Relaxed);
        self.publish();
    }

    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            accounts_total: self.accounts_total,
            accounts_done: self.accounts_done.load(Ordering::Relaxed),
            accounts_failed: self.accounts_failed.load(Ordering::Relaxed),
            regions_scanned: self.regions_scanned.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            gaps: self.gaps.load(Ordering::Relaxed),
            current_account: self
                .current_account
                .lock()
                .map(|c| c.clone())
                .unwrap_or_default(),
            elapsed: self.start_time.elapsed(),
        }
    }

    fn publish(&self) {
        let _ = self.tx.send(self.snapshot());
    }
}
