//! Host database configuration.

use std::time::Duration;

/// Tuning for scanning and persistence.
#[derive(Debug, Clone)]
pub struct HostDbConfig {
    /// Shortest gap between probes of one host (default: 30 minutes).
    pub min_scan_interval: Duration,
    /// Longest gap between probes of one host (default: 7 days). Backoff
    /// on consecutive failures is capped here.
    pub max_scan_interval: Duration,
    /// Deadline for a single settings probe (default: 60 seconds).
    pub scan_timeout: Duration,
    /// Concurrent probe limit; caps open connections so the scanner cannot
    /// starve the gateway (default: 40).
    pub max_active_scans: usize,
    /// Scans retained per host before the oldest are folded into the
    /// historic uptime counters (default: 500).
    pub max_scan_history: usize,
    /// Consecutive failed probes after which a host is considered offline
    /// for utility purposes (default: 10). Offline hosts are demoted, never
    /// deleted.
    pub offline_after_failures: u32,
    /// Journal records between snapshot rewrites (default: 2048).
    pub snapshot_after_records: u64,
    /// How often the scan scheduler sweeps for due hosts (default: 60s).
    pub sweep_interval: Duration,
}

impl Default for HostDbConfig {
    fn default() -> Self {
        Self {
            min_scan_interval: Duration::from_secs(30 * 60),
            max_scan_interval: Duration::from_secs(7 * 24 * 60 * 60),
            scan_timeout: Duration::from_secs(60),
            max_active_scans: 40,
            max_scan_history: 500,
            offline_after_failures: 10,
            snapshot_after_records: 2048,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl HostDbConfig {
    /// Fast intervals for tests.
    pub fn fast() -> Self {
        Self {
            min_scan_interval: Duration::from_millis(50),
            max_scan_interval: Duration::from_secs(10),
            scan_timeout: Duration::from_millis(500),
            sweep_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    /// Probe interval for a host with the given failure streak: the minimum
    /// interval doubled per consecutive failure, capped at the maximum.
    pub fn scan_interval_after(&self, consecutive_failures: u32) -> Duration {
        let shift = consecutive_failures.min(24);
        let backoff = self
            .min_scan_interval
            .saturating_mul(1u32 << shift.min(31));
        backoff.min(self.max_scan_interval)
    }
}
