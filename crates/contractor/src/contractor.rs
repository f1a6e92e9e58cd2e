//! The contractor control loop.

use std::collections::HashSet;
use std::sync::Arc;

use ballast_api::{
    Allowance, ConsensusView, ContractId, ContractTerms, HostRpcClient, Wallet, WalletError,
};
use ballast_hostdb::{HostDb, HostEntry, HostSubnet};
use ballast_primitives::{BlockHeight, Currency, HostPublicKey, Weight};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{ContractorConfig, INITIAL_FUNDING_DIVISOR, LOW_FUNDS_DIVISOR};
use crate::contract::{Contract, ContractState};
use crate::error::ContractorError;
use crate::set::{ContractSet, ContractsSummary};

/// What one maintenance cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Contracts formed with fresh hosts.
    pub formed: usize,
    /// Contracts renewed with their existing host.
    pub renewed: usize,
    /// Contracts moved to the archive.
    pub archived: usize,
    /// Renewal attempts that failed.
    pub renewal_failures: usize,
    /// Formation attempts that failed.
    pub formation_failures: usize,
    /// The formation batch was aborted for lack of allowance funds.
    pub insufficient_funds: bool,
}

/// Maintains the portfolio of storage contracts against the host database.
///
/// The contractor is the contract set's single writer. It drives on height
/// updates from the consensus view; a height moving backwards (reorg) is
/// harmless because every cycle re-derives contract states from the current
/// height alone.
pub struct Contractor<Cn, W, Rp> {
    db: Arc<HostDb>,
    consensus: Arc<Cn>,
    wallet: Arc<W>,
    rpc: Arc<Rp>,
    set: RwLock<ContractSet>,
    config: ContractorConfig,
    rng: Mutex<StdRng>,
    shutdown: watch::Receiver<bool>,
}

impl<Cn, W, Rp> Contractor<Cn, W, Rp>
where
    Cn: ConsensusView,
    W: Wallet,
    Rp: HostRpcClient,
{
    /// Create a contractor. The RNG seeds from the OS; tests use
    /// [`Contractor::with_rng_seed`] for reproducible sampling.
    pub fn new(
        db: Arc<HostDb>,
        consensus: Arc<Cn>,
        wallet: Arc<W>,
        rpc: Arc<Rp>,
        config: ContractorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            consensus,
            wallet,
            rpc,
            set: RwLock::new(ContractSet::new()),
            config,
            rng: Mutex::new(StdRng::from_os_rng()),
            shutdown,
        }
    }

    /// Replace the sampling RNG with a seeded one.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Contracts grouped for the control plane.
    pub fn contracts(&self) -> ContractsSummary {
        self.set.read().summary(self.db.current_height())
    }

    /// Number of active contracts.
    pub fn active_contract_count(&self) -> usize {
        self.set.read().len()
    }

    /// Cancel a contract on operator command. It archives immediately;
    /// funds recovery, where the protocol allows it, happens on chain.
    pub fn cancel_contract(&self, id: &ContractId) -> bool {
        let mut set = self.set.write();
        if let Some(contract) = set.get_mut(id) {
            contract.cancelled = true;
            contract.utility.good_for_upload = false;
            contract.utility.good_for_renew = false;
            set.archive(id);
            info!(contract = ?id, "contract cancelled by operator");
            true
        } else {
            false
        }
    }

    /// Apply spending deltas reported by the upload/download accounting.
    pub fn apply_spending(
        &self,
        id: &ContractId,
        storage: Currency,
        upload: Currency,
        download: Currency,
    ) -> bool {
        let mut set = self.set.write();
        let Some(contract) = set.get_mut(id) else {
            return false;
        };
        contract.storage_spending += storage;
        contract.upload_spending += upload;
        contract.download_spending += download;
        let spent = storage + upload + download;
        contract.renter_funds = contract.renter_funds.saturating_sub(spent);
        contract.last_revision += 1;
        true
    }

    /// Run until shutdown, one maintenance cycle per height update.
    ///
    /// A cycle in flight always completes before the loop re-checks the
    /// shutdown signal, so shutdown never half-applies a cycle.
    pub async fn run(self) -> Result<(), ContractorError> {
        let mut shutdown = self.shutdown.clone();
        let mut heights = self.consensus.subscribe_height();
        let mut last_height = self.db.current_height();
        debug!("contractor started");

        loop {
            tokio::select! {
                maybe_height = heights.next() => {
                    let Some(height) = maybe_height else { break };
                    if height < last_height || self.consensus.is_reorg() {
                        warn!(
                            from = last_height,
                            to = height,
                            "chain reorganization, re-evaluating contract states"
                        );
                    }
                    last_height = height;
                    self.db.update_height(height)?;
                    let report = self.maintain(height).await?;
                    if report != CycleReport::default() {
                        info!(?report, height, "maintenance cycle");
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("contractor stopped");
        Ok(())
    }

    /// One maintenance cycle at `height`.
    pub async fn maintain(&self, height: BlockHeight) -> Result<CycleReport, ContractorError> {
        let allowance = self.db.allowance();
        let mut report = CycleReport::default();
        if !allowance.is_active() {
            return Ok(report);
        }

        self.archive_finished(height, allowance.renew_window, &mut report);
        let min_score = self.minimum_acceptable_score();
        self.refresh_utilities(min_score);
        self.renew_due_contracts(height, &allowance, &mut report).await;

        let renewable = self.set.read().good_for_renew_count();
        let needed = (allowance.hosts as usize).saturating_sub(renewable);
        if needed > 0 {
            self.form_contracts(height, &allowance, needed, min_score, &mut report)
                .await;
        }
        Ok(report)
    }

    /// Move expired and cancelled contracts to the archive.
    fn archive_finished(
        &self,
        height: BlockHeight,
        renew_window: BlockHeight,
        report: &mut CycleReport,
    ) {
        let mut set = self.set.write();
        let finished: Vec<ContractId> = set
            .iter()
            .filter(|c| {
                matches!(
                    c.state(height, renew_window),
                    ContractState::Expired | ContractState::Cancelled
                )
            })
            .map(|c| c.id)
            .collect();
        for id in finished {
            set.archive(&id);
            report.archived += 1;
        }
    }

    /// The score below which a host is no longer worth renewing: the median
    /// active contract's host score divided by the safety factor. `None`
    /// until the portfolio has contracts to compare against.
    fn minimum_acceptable_score(&self) -> Option<Weight> {
        let set = self.set.read();
        let mut scores: Vec<Weight> = set
            .iter()
            .filter_map(|c| self.db.weight_of(&c.host_public_key))
            .collect();
        if scores.is_empty() {
            return None;
        }
        scores.sort_unstable();
        Some(scores[scores.len() / 2] / self.config.score_safety_factor)
    }

    /// Recompute utility flags from host health, score, and funds.
    ///
    /// A churned host (offline, price hike, below minimum score) keeps its
    /// contract - the money is already spent - but loses `good_for_renew`,
    /// and the upload scheduler migrates data off it before expiry.
    fn refresh_utilities(&self, min_score: Option<Weight>) {
        let mut set = self.set.write();
        for contract in set.iter_mut() {
            if contract.cancelled {
                continue;
            }
            let entry = self.db.fetch(&contract.host_public_key);
            let responsive = entry.as_ref().is_some_and(|e| self.db.is_active(e));
            let score_ok = match (min_score, self.db.weight_of(&contract.host_public_key)) {
                (Some(min), Some(score)) => score >= min,
                (None, Some(_)) => true,
                (_, None) => false,
            };
            let funded = contract.renter_funds > contract.total_cost / LOW_FUNDS_DIVISOR;

            let was_renewable = contract.utility.good_for_renew;
            contract.utility.good_for_renew = responsive && score_ok;
            contract.utility.good_for_upload = responsive && score_ok && funded;
            if was_renewable && !contract.utility.good_for_renew {
                debug!(
                    host = %contract.host_public_key,
                    responsive, score_ok,
                    "host churned, contract no longer renewable"
                );
            }
        }
    }

    /// Renew every contract inside its renew window that is still worth
    /// renewing. Failures become interaction records and clear
    /// `good_for_renew`; they are never propagated.
    async fn renew_due_contracts(
        &self,
        height: BlockHeight,
        allowance: &Allowance,
        report: &mut CycleReport,
    ) {
        let due: Vec<(ContractId, HostEntry)> = {
            let set = self.set.read();
            set.iter()
                .filter(|c| c.state(height, allowance.renew_window) == ContractState::Renewing)
                .filter_map(|c| {
                    self.db
                        .fetch(&c.host_public_key)
                        .map(|entry| (c.id, entry))
                })
                .collect()
        };

        for (old_id, entry) in due {
            let terms = self.contract_terms(&entry, allowance, height);
            if let Err(e) = self.wallet.fund_contract(terms.renter_funds).await {
                warn!(error = %e, "cannot fund renewal, leaving contract as is");
                break;
            }

            let renewed = self
                .rpc
                .renew_contract(
                    &entry.net_address,
                    old_id,
                    &terms,
                    self.config.formation_timeout,
                )
                .await;
            match renewed {
                Ok(formed) => {
                    let contract = Contract::from_formed(entry.public_key, &formed);
                    self.set.write().insert(contract);
                    self.record_interaction(entry.public_key, true);
                    report.renewed += 1;
                }
                Err(e) => {
                    debug!(host = %entry.public_key, error = %e, "renewal failed");
                    if let Some(contract) = self.set.write().get_mut(&old_id) {
                        contract.utility.good_for_renew = false;
                    }
                    self.record_interaction(entry.public_key, false);
                    report.renewal_failures += 1;
                }
            }
        }
    }

    /// Form contracts with freshly sampled hosts until the portfolio is
    /// full, the retry budget runs out, or the allowance cannot cover the
    /// next contract.
    async fn form_contracts(
        &self,
        height: BlockHeight,
        allowance: &Allowance,
        needed: usize,
        min_score: Option<Weight>,
        report: &mut CycleReport,
    ) {
        let mut available = allowance
            .funds
            .saturating_sub(self.set.read().committed_funds());

        let mut excluded_keys: HashSet<HostPublicKey> = self.config.blacklist.clone();
        let mut excluded_subnets: HashSet<HostSubnet> = HashSet::new();
        {
            let set = self.set.read();
            for host in set.hosts() {
                excluded_keys.insert(*host);
                if allowance.ip_violation_check {
                    if let Some(ip) = self.db.fetch(host).and_then(|e| e.known_ip) {
                        excluded_subnets.insert(HostSubnet::of(ip));
                    }
                }
            }
        }

        let mut formed = 0usize;
        let mut retries = self.config.formation_retry_budget;
        while formed < needed && retries > 0 {
            let candidates = match self.sample_candidates(
                needed - formed,
                &excluded_keys,
                &excluded_subnets,
                min_score,
            ) {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "host sampling failed");
                    break;
                }
            };
            if candidates.is_empty() {
                debug!(needed, formed, "no eligible hosts left to sample");
                break;
            }

            for entry in candidates {
                if formed >= needed || retries == 0 {
                    break;
                }
                retries -= 1;
                excluded_keys.insert(entry.public_key);

                let terms = self.contract_terms(&entry, allowance, height);
                let estimated = terms.renter_funds + entry.settings.contract_price;
                if available < estimated {
                    let err = ContractorError::InsufficientFunds {
                        needed: estimated,
                        available,
                    };
                    warn!(error = %err, "aborting formation batch");
                    report.insufficient_funds = true;
                    return;
                }
                match self.wallet.fund_contract(terms.renter_funds).await {
                    Ok(_) => {}
                    Err(e @ WalletError::InsufficientBalance { .. }) => {
                        warn!(error = %e, "aborting formation batch");
                        report.insufficient_funds = true;
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "wallet unavailable, stopping formation");
                        return;
                    }
                }

                let outcome = self
                    .rpc
                    .form_contract(&entry.net_address, &terms, self.config.formation_timeout)
                    .await;
                match outcome {
                    Ok(formed_contract) => {
                        available = available.saturating_sub(formed_contract.total_cost);
                        if allowance.ip_violation_check {
                            if let Some(ip) = entry.known_ip {
                                excluded_subnets.insert(HostSubnet::of(ip));
                            }
                        }
                        let contract = Contract::from_formed(entry.public_key, &formed_contract);
                        info!(
                            host = %entry.public_key,
                            contract = ?contract.id,
                            "formed contract"
                        );
                        self.set.write().insert(contract);
                        self.record_interaction(entry.public_key, true);
                        formed += 1;
                        report.formed += 1;
                    }
                    Err(e) => {
                        debug!(host = %entry.public_key, error = %e, "formation failed");
                        self.record_interaction(entry.public_key, false);
                        report.formation_failures += 1;
                    }
                }
            }
        }
    }

    /// Weighted sample of formation candidates: active, accepting, and at
    /// or above the minimum score.
    fn sample_candidates(
        &self,
        count: usize,
        excluded_keys: &HashSet<HostPublicKey>,
        excluded_subnets: &HashSet<HostSubnet>,
        min_score: Option<Weight>,
    ) -> Result<Vec<HostEntry>, ContractorError> {
        // The filter runs under the tree's write lock, so it must judge the
        // entry on its own fields rather than call back into the database.
        let offline_after_failures = self.db.config().offline_after_failures;
        let filter = move |entry: &HostEntry, weight: Weight| {
            let active = entry.settings.accepting_contracts
                && entry.last_scan_successful()
                && entry.consecutive_failed_scans < offline_after_failures;
            active && min_score.is_none_or(|min| weight >= min)
        };
        let mut rng = self.rng.lock();
        Ok(self.db.select_hosts(
            &mut *rng,
            count,
            excluded_keys,
            excluded_subnets,
            Some(&filter),
        )?)
    }

    /// Terms for forming or renewing with `entry`: a third of the per-host
    /// allowance up front, host collateral at its advertised rate capped by
    /// its max collateral.
    fn contract_terms(
        &self,
        entry: &HostEntry,
        allowance: &Allowance,
        height: BlockHeight,
    ) -> ContractTerms {
        let funding = allowance.funds / allowance.hosts.max(1) / INITIAL_FUNDING_DIVISOR;
        let expected_collateral = entry
            .settings
            .collateral
            .saturating_mul(allowance.period)
            .saturating_mul(allowance.expected_storage);
        ContractTerms {
            host_public_key: entry.public_key,
            renter_funds: funding,
            host_collateral: expected_collateral.min(entry.settings.max_collateral),
            start_height: height,
            end_height: height + allowance.period,
        }
    }

    /// Interaction outcomes feed the host database; a failure to record
    /// them is a persistence problem, logged and carried on.
    fn record_interaction(&self, host: HostPublicKey, success: bool) {
        if let Err(e) = self.db.record_interaction(host, success) {
            warn!(host = %host, error = %e, "failed to record interaction");
        }
    }
}
