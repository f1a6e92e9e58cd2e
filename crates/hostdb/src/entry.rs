//! Per-host records.

use std::net::IpAddr;

use ballast_api::HostSettings;
use ballast_primitives::{BlockHeight, HostPublicKey};
use serde::{Deserialize, Serialize};

/// Outcome of one reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Unix timestamp of the probe, seconds.
    pub timestamp: u64,
    /// Whether the settings RPC completed.
    pub success: bool,
}

/// Everything the renter knows about one host.
///
/// Created on first announcement, mutated by the scanner and by
/// contract-outcome callbacks, evicted only on operator command. The scan
/// history is kept chronologically non-decreasing; [`HostEntry::record_scan`]
/// rejects out-of-order appends so racing scanners cannot corrupt the uptime
/// accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Host identity.
    pub public_key: HostPublicKey,
    /// Advertised `host:port`.
    pub net_address: String,
    /// IP the net address last resolved to, for subnet diversity checks.
    /// `None` until the first successful resolution.
    #[serde(default)]
    pub known_ip: Option<IpAddr>,
    /// Most recently scanned settings.
    pub settings: HostSettings,
    /// Height of the host's first announcement.
    pub first_seen_height: BlockHeight,

    /// Uptime accumulated before the oldest retained scan, seconds.
    pub historic_uptime_secs: u64,
    /// Downtime accumulated before the oldest retained scan, seconds.
    pub historic_downtime_secs: u64,
    /// Contract-level successes (formations, renewals, proofs).
    pub historic_successful_interactions: u64,
    /// Contract-level failures.
    pub historic_failed_interactions: u64,

    /// Probe outcomes, timestamps non-decreasing.
    pub scan_history: Vec<ScanRecord>,
    /// Failed probes since the last success, drives backoff and demotion.
    pub consecutive_failed_scans: u32,
}

impl HostEntry {
    /// Create an entry for a freshly announced host.
    ///
    /// Two synthetic successful scans are prepopulated (at `now` and one
    /// scan interval earlier) so the uptime factor is well-defined before
    /// the first real probe lands.
    pub fn new(
        public_key: HostPublicKey,
        net_address: String,
        settings: HostSettings,
        first_seen_height: BlockHeight,
        now_unix: u64,
        bootstrap_interval_secs: u64,
    ) -> Self {
        let scan_history = vec![
            ScanRecord {
                timestamp: now_unix.saturating_sub(bootstrap_interval_secs),
                success: true,
            },
            ScanRecord {
                timestamp: now_unix,
                success: true,
            },
        ];
        Self {
            public_key,
            net_address,
            known_ip: None,
            settings,
            first_seen_height,
            historic_uptime_secs: 0,
            historic_downtime_secs: 0,
            historic_successful_interactions: 0,
            historic_failed_interactions: 0,
            scan_history,
            consecutive_failed_scans: 0,
        }
    }

    /// Append a probe outcome.
    ///
    /// Returns `false` (without mutating) if `timestamp` precedes the newest
    /// retained scan; the caller logs and discards such appends.
    pub fn record_scan(&mut self, timestamp: u64, success: bool) -> bool {
        if let Some(last) = self.scan_history.last() {
            if timestamp < last.timestamp {
                return false;
            }
        }
        self.scan_history.push(ScanRecord { timestamp, success });
        if success {
            self.consecutive_failed_scans = 0;
        } else {
            self.consecutive_failed_scans = self.consecutive_failed_scans.saturating_add(1);
        }
        true
    }

    /// Record a contract-level outcome. Probe results never come through
    /// here; only formations, renewals, and proof outcomes do.
    pub fn record_interaction(&mut self, success: bool) {
        if success {
            self.historic_successful_interactions =
                self.historic_successful_interactions.saturating_add(1);
        } else {
            self.historic_failed_interactions =
                self.historic_failed_interactions.saturating_add(1);
        }
    }

    /// Fold the oldest scans into the historic counters until at most
    /// `max_scans` remain.
    ///
    /// Each dropped interval is attributed to the earlier scan's success
    /// bit, the same rule the uptime factor uses, so pruning never changes
    /// the computed ratio.
    pub fn prune_scan_history(&mut self, max_scans: usize) {
        while self.scan_history.len() > max_scans.max(1) {
            let oldest = self.scan_history[0];
            let next_ts = self.scan_history[1].timestamp;
            let interval = next_ts.saturating_sub(oldest.timestamp);
            if oldest.success {
                self.historic_uptime_secs = self.historic_uptime_secs.saturating_add(interval);
            } else {
                self.historic_downtime_secs = self.historic_downtime_secs.saturating_add(interval);
            }
            self.scan_history.remove(0);
        }
    }

    /// Whether the most recent probe succeeded.
    pub fn last_scan_successful(&self) -> bool {
        self.scan_history.last().map(|s| s.success).unwrap_or(false)
    }

    /// Timestamp of the most recent probe, if any.
    pub fn last_scan_time(&self) -> Option<u64> {
        self.scan_history.last().map(|s| s.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry() -> HostEntry {
        HostEntry::new(
            HostPublicKey::repeat_byte(1),
            "host.example:9982".into(),
            HostSettings::default(),
            100,
            10_000,
            1_800,
        )
    }

    #[test]
    fn test_bootstrap_scans() {
        let entry = test_entry();
        assert_eq!(entry.scan_history.len(), 2);
        assert!(entry.scan_history.iter().all(|s| s.success));
        assert_eq!(entry.scan_history[0].timestamp, 8_200);
        assert_eq!(entry.scan_history[1].timestamp, 10_000);
    }

    #[test]
    fn test_record_scan_rejects_out_of_order() {
        let mut entry = test_entry();
        assert!(entry.record_scan(11_000, true));
        assert!(!entry.record_scan(10_500, false));
        assert_eq!(entry.scan_history.len(), 3);
        // Equal timestamps are allowed; the history is non-decreasing.
        assert!(entry.record_scan(11_000, false));
    }

    #[test]
    fn test_consecutive_failures_reset_on_success() {
        let mut entry = test_entry();
        entry.record_scan(11_000, false);
        entry.record_scan(12_000, false);
        assert_eq!(entry.consecutive_failed_scans, 2);
        entry.record_scan(13_000, true);
        assert_eq!(entry.consecutive_failed_scans, 0);
    }

    #[test]
    fn test_prune_folds_into_historic() {
        let mut entry = test_entry();
        // History: 8_200 (up), 10_000 (up), then a failure span.
        entry.record_scan(11_000, false);
        entry.record_scan(12_000, true);

        entry.prune_scan_history(2);
        assert_eq!(entry.scan_history.len(), 2);
        // Dropped intervals: 8_200->10_000 attributed up, 10_000->11_000
        // attributed up (earlier scan succeeded).
        assert_eq!(entry.historic_uptime_secs, 2_800);
        assert_eq!(entry.historic_downtime_secs, 0);

        entry.prune_scan_history(1);
        // 11_000->12_000 attributed down.
        assert_eq!(entry.historic_downtime_secs, 1_000);
    }

    #[test]
    fn test_interactions_are_contract_level_only() {
        let mut entry = test_entry();
        entry.record_scan(11_000, false);
        assert_eq!(entry.historic_failed_interactions, 0);
        entry.record_interaction(false);
        entry.record_interaction(true);
        assert_eq!(entry.historic_failed_interactions, 1);
        assert_eq!(entry.historic_successful_interactions, 1);
    }
}
