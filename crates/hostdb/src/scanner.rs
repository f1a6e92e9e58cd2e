//! Background host probing.
//!
//! The scanner sweeps the database for hosts whose next probe is due, and
//! probes them through a bounded worker pool so concurrent connections
//! never exceed `max_active_scans`. A probe is one settings RPC with a
//! short deadline; its outcome is recorded as a scan (a data point, never
//! an error) and the host is reweighed in the tree. Per-host cadence
//! doubles with consecutive failures between the configured minimum and
//! maximum intervals.

use std::collections::HashSet;
use std::sync::Arc;

use ballast_api::{Gateway, HostRpcClient, RpcError};
use ballast_primitives::HostPublicKey;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, trace};

use crate::entry::HostEntry;
use crate::hostdb::{HostDb, unix_now};

/// The background scan task.
pub struct Scanner<C, G> {
    db: Arc<HostDb>,
    rpc: Arc<C>,
    gateway: Arc<G>,
    shutdown: watch::Receiver<bool>,
}

impl<C: HostRpcClient, G: Gateway> Scanner<C, G> {
    /// Create a scanner over `db`, probing through `rpc` and resolving
    /// addresses through `gateway`. The task exits when `shutdown` flips
    /// to true.
    pub fn new(
        db: Arc<HostDb>,
        rpc: Arc<C>,
        gateway: Arc<G>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            rpc,
            gateway,
            shutdown,
        }
    }

    /// Run until shutdown. Outstanding probes are aborted on exit.
    pub async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        let config = self.db.config().clone();
        let semaphore = Arc::new(Semaphore::new(config.max_active_scans));
        let in_flight: Arc<parking_lot::Mutex<HashSet<HostPublicKey>>> =
            Arc::new(parking_lot::Mutex::new(HashSet::new()));
        let mut probes: JoinSet<()> = JoinSet::new();
        let mut sweep = tokio::time::interval(config.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        debug!("scanner started");
        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    while probes.try_join_next().is_some() {}

                    let now = unix_now();
                    for entry in self.due_hosts(now) {
                        let key = entry.public_key;
                        if !in_flight.lock().insert(key) {
                            continue;
                        }
                        let db = Arc::clone(&self.db);
                        let rpc = Arc::clone(&self.rpc);
                        let gateway = Arc::clone(&self.gateway);
                        let semaphore = Arc::clone(&semaphore);
                        let in_flight = Arc::clone(&in_flight);
                        let timeout = config.scan_timeout;
                        probes.spawn(async move {
                            let _permit = semaphore
                                .acquire()
                                .await
                                .expect("scan semaphore is never closed");
                            probe(&db, &*rpc, &*gateway, &entry, timeout).await;
                            in_flight.lock().remove(&key);
                        });
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        probes.abort_all();
        while probes.join_next().await.is_some() {}
        debug!("scanner stopped");
    }

    /// Hosts whose next probe time has passed.
    fn due_hosts(&self, now: u64) -> Vec<HostEntry> {
        let config = self.db.config();
        self.db
            .all_hosts()
            .into_iter()
            .filter(|entry| {
                let interval = config
                    .scan_interval_after(entry.consecutive_failed_scans)
                    .as_secs();
                match entry.last_scan_time() {
                    Some(last) => now >= last.saturating_add(interval),
                    None => true,
                }
            })
            .collect()
    }
}

/// Probe one host: resolve its address, fetch settings, record the outcome.
async fn probe<C: HostRpcClient, G: Gateway>(
    db: &HostDb,
    rpc: &C,
    gateway: &G,
    entry: &HostEntry,
    timeout: std::time::Duration,
) {
    let key = entry.public_key;
    let addr = entry.net_address.as_str();

    let resolved_ip = match gateway.resolve(addr).await {
        Ok(ip) => Some(ip),
        Err(e) => {
            trace!(host = %key, %addr, error = %e, "address resolution failed");
            None
        }
    };

    let outcome = if resolved_ip.is_none() {
        Err(RpcError::Resolution(addr.to_string()))
    } else {
        tokio::time::timeout(timeout, rpc.settings(addr, timeout))
            .await
            .unwrap_or(Err(RpcError::Timeout(timeout.as_secs())))
    };

    let (success, settings) = match outcome {
        Ok(settings) => (true, Some(settings)),
        Err(e) => {
            trace!(host = %key, %addr, error = %e, "probe failed");
            (false, None)
        }
    };

    if let Err(e) = db.record_scan(key, unix_now(), success, settings, resolved_ip) {
        // Journal IO trouble, not a host problem.
        error!(host = %key, error = %e, "failed to record scan");
    }
}
