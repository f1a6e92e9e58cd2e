//! The host database coordinator.
//!
//! [`HostDb`] exclusively owns the host tree and the journal. Every
//! mutation - announcements, scan results, interaction outcomes, allowance
//! and height changes - goes through its methods, which hold the write lock
//! for the duration of the tree update and the journal append, so writers
//! are fully serialized and replaying the journal reconstructs exactly the
//! live state. Readers (the contractor, score queries) share the read lock;
//! writes are short and never touch the network.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use ballast_api::{Allowance, HostScoreBreakdown, HostSettings};
use ballast_primitives::{BlockHeight, HostPublicKey, NetworkParams, Weight};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::HostDbConfig;
use crate::entry::HostEntry;
use crate::error::HostDbError;
use crate::journal::{self, Journal, JournalRecord};
use crate::subnet::HostSubnet;
use crate::tree::{HostTree, SelectParams};
use crate::weight::{Usage, WeightContext};

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

struct Inner {
    tree: HostTree,
    ctx: WeightContext,
}

impl Inner {
    fn reweigh_all(&mut self) -> Result<(), HostDbError> {
        let ctx = self.ctx.clone();
        self.tree.reweigh(|entry| ctx.weight(entry))
    }
}

/// The renter's host database.
pub struct HostDb {
    inner: RwLock<Inner>,
    /// Lock order: `inner` lock first, then the journal. Mutations hold the
    /// write lock across their journal append so journal order matches
    /// apply order; snapshotting holds only the read lock.
    journal: Option<Mutex<Journal>>,
    config: HostDbConfig,
}

impl HostDb {
    /// Open the database in `dir`, replaying any persisted state.
    ///
    /// The journal suffix is folded into a fresh snapshot on open, so a
    /// crash loop cannot grow the log without bound.
    pub fn open(
        dir: &Path,
        config: HostDbConfig,
        params: NetworkParams,
        allowance: Allowance,
        current_height: BlockHeight,
    ) -> Result<Self, HostDbError> {
        let entries = journal::load(dir, config.min_scan_interval.as_secs())?;
        let mut journal = Journal::open(dir)?;
        journal.snapshot(&entries)?;

        let db = Self::from_entries(entries, Some(journal), config, params, allowance, current_height)?;
        info!(hosts = db.len(), "host database opened");
        Ok(db)
    }

    /// An unpersisted database, for tests and tooling.
    pub fn in_memory(
        config: HostDbConfig,
        params: NetworkParams,
        allowance: Allowance,
        current_height: BlockHeight,
    ) -> Self {
        Self::from_entries(HashMap::new(), None, config, params, allowance, current_height)
            .expect("empty tree cannot violate invariants")
    }

    fn from_entries(
        entries: HashMap<HostPublicKey, HostEntry>,
        journal: Option<Journal>,
        config: HostDbConfig,
        params: NetworkParams,
        allowance: Allowance,
        current_height: BlockHeight,
    ) -> Result<Self, HostDbError> {
        let ctx = WeightContext::new(allowance.with_defaults(), params, current_height);
        let mut tree = HostTree::new();
        for (_, entry) in entries {
            let weight = ctx.weight(&entry);
            tree.insert(entry, weight)?;
        }
        Ok(Self {
            inner: RwLock::new(Inner { tree, ctx }),
            journal: journal.map(Mutex::new),
            config,
        })
    }

    /// Number of known hosts.
    pub fn len(&self) -> usize {
        self.inner.read().tree.len()
    }

    /// Returns true if no hosts are known.
    pub fn is_empty(&self) -> bool {
        self.inner.read().tree.is_empty()
    }

    /// The configuration this database runs with.
    pub fn config(&self) -> &HostDbConfig {
        &self.config
    }

    /// The allowance currently driving the weights.
    pub fn allowance(&self) -> Allowance {
        self.inner.read().ctx.allowance.clone()
    }

    /// The height currently driving the age factor.
    pub fn current_height(&self) -> BlockHeight {
        self.inner.read().ctx.current_height
    }

    /// Register a host announcement.
    ///
    /// A new host gets two synthetic successful scans so its uptime factor
    /// is defined before the first probe; a known host only has its net
    /// address refreshed.
    pub fn host_announced(
        &self,
        public_key: HostPublicKey,
        net_address: String,
        first_seen_height: BlockHeight,
    ) -> Result<(), HostDbError> {
        let seen_at = unix_now();
        let mut inner = self.inner.write();
        if inner.tree.fetch(&public_key).is_some() {
            let ctx = inner.ctx.clone();
            inner.tree.modify(&public_key, |entry| {
                entry.net_address.clone_from(&net_address);
                ctx.weight(entry)
            })?;
        } else {
            let entry = HostEntry::new(
                public_key,
                net_address.clone(),
                HostSettings::default(),
                first_seen_height,
                seen_at,
                self.config.min_scan_interval.as_secs(),
            );
            let weight = inner.ctx.weight(&entry);
            inner.tree.insert(entry, weight)?;
            debug!(host = %public_key, %net_address, "host announced");
        }
        self.append_record(
            &inner,
            JournalRecord::HostSeen {
                public_key,
                net_address,
                first_seen_height,
                seen_at,
            },
        )
    }

    /// Record a probe outcome and reweigh the host.
    ///
    /// Out-of-order timestamps (from a racing scanner) are logged and
    /// discarded without touching the tree or the journal.
    pub fn record_scan(
        &self,
        public_key: HostPublicKey,
        timestamp: u64,
        success: bool,
        settings: Option<HostSettings>,
        resolved_ip: Option<IpAddr>,
    ) -> Result<(), HostDbError> {
        let mut inner = self.inner.write();
        let ctx = inner.ctx.clone();
        let max_history = self.config.max_scan_history;
        let mut accepted = false;
        inner.tree.modify(&public_key, |entry| {
            accepted = entry.record_scan(timestamp, success);
            if accepted {
                if let Some(settings) = &settings {
                    entry.settings = settings.clone();
                }
                if let Some(ip) = resolved_ip {
                    entry.known_ip = Some(ip);
                }
                entry.prune_scan_history(max_history);
            }
            ctx.weight(entry)
        })?;

        if !accepted {
            warn!(host = %public_key, timestamp, "out-of-order scan discarded");
            return Ok(());
        }
        self.append_record(
            &inner,
            JournalRecord::ScanResult {
                public_key,
                timestamp,
                success,
                settings,
                resolved_ip,
            },
        )?;
        drop(inner);
        self.maybe_snapshot()
    }

    /// Record a contract-level outcome (formation, renewal, proof).
    pub fn record_interaction(
        &self,
        public_key: HostPublicKey,
        success: bool,
    ) -> Result<(), HostDbError> {
        let mut inner = self.inner.write();
        let ctx = inner.ctx.clone();
        inner.tree.modify(&public_key, |entry| {
            entry.record_interaction(success);
            ctx.weight(entry)
        })?;
        self.append_record(
            &inner,
            JournalRecord::InteractionOutcome {
                public_key,
                success,
            },
        )
    }

    /// Evict a host on operator command. Hosts are never evicted
    /// automatically, no matter how badly they score.
    pub fn remove_host(&self, public_key: &HostPublicKey) -> Result<bool, HostDbError> {
        let mut inner = self.inner.write();
        let removed = inner.tree.remove(public_key)?.is_some();
        if removed {
            info!(host = %public_key, "host removed by operator");
            self.append_record(&inner, JournalRecord::HostRemoved {
                public_key: *public_key,
            })?;
        }
        Ok(removed)
    }

    /// Replace the allowance and recompute every weight atomically.
    pub fn set_allowance(&self, allowance: Allowance) -> Result<(), HostDbError> {
        let allowance = allowance.with_defaults();
        let mut inner = self.inner.write();
        inner.ctx.usage = Usage::from_allowance(&allowance);
        inner.ctx.allowance = allowance;
        inner.reweigh_all()
    }

    /// Advance (or rewind, after a reorg) the height and recompute weights.
    pub fn update_height(&self, height: BlockHeight) -> Result<(), HostDbError> {
        let mut inner = self.inner.write();
        if inner.ctx.current_height == height {
            return Ok(());
        }
        inner.ctx.current_height = height;
        inner.reweigh_all()
    }

    /// Weighted sample of `count` hosts. See [`HostTree::select_random`].
    ///
    /// The filter must not call back into this database; it runs under the
    /// tree's write lock and receives the host's weight directly instead.
    pub fn select_hosts<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
        excluded_keys: &HashSet<HostPublicKey>,
        excluded_subnets: &HashSet<HostSubnet>,
        filter: Option<&dyn Fn(&HostEntry, Weight) -> bool>,
    ) -> Result<Vec<HostEntry>, HostDbError> {
        let mut inner = self.inner.write();
        inner.tree.select_random(rng, SelectParams {
            count,
            excluded_keys,
            excluded_subnets,
            filter,
        })
    }

    /// Look up a host.
    pub fn fetch(&self, public_key: &HostPublicKey) -> Option<HostEntry> {
        self.inner.read().tree.fetch(public_key).cloned()
    }

    /// The stored weight of a host.
    pub fn weight_of(&self, public_key: &HostPublicKey) -> Option<Weight> {
        self.inner.read().tree.weight_of(public_key)
    }

    /// All known hosts.
    pub fn all_hosts(&self) -> Vec<HostEntry> {
        self.inner.read().tree.iter().cloned().collect()
    }

    /// Hosts that are accepting contracts and answering probes.
    pub fn active_hosts(&self) -> Vec<HostEntry> {
        let inner = self.inner.read();
        inner
            .tree
            .iter()
            .filter(|e| self.is_active(e))
            .cloned()
            .collect()
    }

    /// Whether an entry counts as active: accepting contracts, last probe
    /// succeeded, and not in a long failure streak.
    pub fn is_active(&self, entry: &HostEntry) -> bool {
        entry.settings.accepting_contracts
            && entry.last_scan_successful()
            && entry.consecutive_failed_scans < self.config.offline_after_failures
    }

    /// Score decomposition of a known host, conversion rate included.
    pub fn score_breakdown(
        &self,
        public_key: &HostPublicKey,
    ) -> Result<HostScoreBreakdown, HostDbError> {
        let inner = self.inner.read();
        let entry = inner
            .tree
            .fetch(public_key)
            .ok_or(HostDbError::UnknownHost(*public_key))?;
        let mut breakdown = inner.ctx.breakdown(entry);
        breakdown.conversion_rate = self.conversion_rate_locked(&inner, breakdown.score);
        Ok(breakdown)
    }

    /// Estimated score of a hypothetical host with the given settings,
    /// assuming perfect age and uptime.
    pub fn estimate_host_score(
        &self,
        settings: HostSettings,
        allowance: Option<Allowance>,
    ) -> HostScoreBreakdown {
        let inner = self.inner.read();
        let ctx = match allowance {
            Some(allowance) => WeightContext::new(
                allowance.with_defaults(),
                inner.ctx.params.clone(),
                inner.ctx.current_height,
            ),
            None => inner.ctx.clone(),
        };
        let entry = HostEntry::new(
            HostPublicKey::default(),
            String::new(),
            settings,
            inner.ctx.current_height,
            unix_now(),
            self.config.min_scan_interval.as_secs(),
        );
        let mut breakdown = ctx.estimate_breakdown(&entry);
        breakdown.conversion_rate = self.conversion_rate_locked(&inner, breakdown.score);
        breakdown
    }

    /// Write a snapshot and truncate the journal now. Snapshotting only
    /// reads the tree, so concurrent mutations stay unblocked for the
    /// duration of the file write.
    pub fn flush(&self) -> Result<(), HostDbError> {
        let inner = self.inner.read();
        if let Some(journal) = &self.journal {
            let entries: HashMap<_, _> = inner
                .tree
                .iter()
                .map(|e| (e.public_key, e.clone()))
                .collect();
            journal.lock().snapshot(&entries)?;
        }
        Ok(())
    }

    /// The conversion-rate rule of thumb: `min(100, score / total * 50)`,
    /// where total sums the active hosts. A median host reads about 50%.
    fn conversion_rate_locked(&self, inner: &Inner, score: Weight) -> f64 {
        let total: Weight = inner
            .tree
            .iter()
            .filter(|e| self.is_active(e))
            .filter_map(|e| inner.tree.weight_of(&e.public_key))
            .sum();
        let total = if total.is_zero() { Weight::ONE } else { total };
        let rate = score.to_f64_lossy() * 50.0 / total.to_f64_lossy();
        rate.min(100.0)
    }

    fn append_record(&self, _inner: &Inner, record: JournalRecord) -> Result<(), HostDbError> {
        if let Some(journal) = &self.journal {
            journal.lock().append(&record)?;
        }
        Ok(())
    }

    fn maybe_snapshot(&self) -> Result<(), HostDbError> {
        let due = self
            .journal
            .as_ref()
            .is_some_and(|j| j.lock().records_since_snapshot() >= self.config.snapshot_after_records);
        if due {
            self.flush()?;
        }
        Ok(())
    }
}
