//! End-to-end portfolio maintenance against deterministic collaborators.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::B256;
use ballast_api::{
    Allowance, ConsensusView, ContractId, ContractTerms, FormedContract, FundingOutput,
    HostRpcClient, HostSettings, RpcError, SignedTransaction, Wallet, WalletError, async_trait,
};
use ballast_contractor::{Contractor, ContractorConfig};
use ballast_hostdb::{HostDb, HostDbConfig, HostSubnet, weight};
use ballast_primitives::{BlockHeight, Currency, HostPublicKey, NetworkParams};
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use semver::Version;
use tokio::sync::{mpsc, watch};

struct MockConsensus {
    height: AtomicU64,
    reorg: AtomicBool,
    rx: Mutex<Option<mpsc::UnboundedReceiver<BlockHeight>>>,
}

impl MockConsensus {
    fn new(height: BlockHeight) -> (Arc<Self>, mpsc::UnboundedSender<BlockHeight>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let consensus = Arc::new(Self {
            height: AtomicU64::new(height),
            reorg: AtomicBool::new(false),
            rx: Mutex::new(Some(rx)),
        });
        (consensus, tx)
    }
}

impl ConsensusView for MockConsensus {
    fn current_height(&self) -> BlockHeight {
        self.height.load(Ordering::Relaxed)
    }

    fn subscribe_height(&self) -> BoxStream<'static, BlockHeight> {
        let rx = self.rx.lock().take().expect("single subscriber");
        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|h| (h, rx))
        })
        .boxed()
    }

    fn is_reorg(&self) -> bool {
        self.reorg.load(Ordering::Relaxed)
    }
}

struct MockWallet {
    balance: Mutex<Currency>,
}

impl MockWallet {
    fn new(balance: Currency) -> Self {
        Self {
            balance: Mutex::new(balance),
        }
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn balance(&self) -> Currency {
        *self.balance.lock()
    }

    async fn fund_contract(&self, amount: Currency) -> Result<Vec<FundingOutput>, WalletError> {
        let mut balance = self.balance.lock();
        match balance.checked_sub(amount) {
            Some(rest) => {
                *balance = rest;
                Ok(vec![FundingOutput {
                    id: B256::ZERO,
                    value: amount,
                }])
            }
            None => Err(WalletError::InsufficientBalance {
                requested: amount,
                available: *balance,
            }),
        }
    }

    async fn sign(&self, payload: Vec<u8>) -> Result<SignedTransaction, WalletError> {
        Ok(SignedTransaction { raw: payload })
    }
}

/// Host RPC double: every host answers settings; formation and renewal can
/// be failed per address.
struct MockRpc {
    next_id: AtomicU8,
    failing: Mutex<HashSet<String>>,
    formations: Mutex<Vec<String>>,
    renewals: Mutex<Vec<String>>,
    contract_price: Currency,
}

impl MockRpc {
    fn new(contract_price: Currency) -> Self {
        Self {
            next_id: AtomicU8::new(1),
            failing: Mutex::new(HashSet::new()),
            formations: Mutex::new(Vec::new()),
            renewals: Mutex::new(Vec::new()),
            contract_price,
        }
    }

    fn fail_address(&self, addr: &str) {
        self.failing.lock().insert(addr.to_string());
    }

    fn formed(&self, terms: &ContractTerms) -> FormedContract {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        FormedContract {
            id: ContractId::repeat_byte(n),
            total_cost: terms.renter_funds + self.contract_price,
            fees: Currency::ZERO,
            renter_funds: terms.renter_funds,
            start_height: terms.start_height,
            end_height: terms.end_height,
        }
    }
}

#[async_trait]
impl HostRpcClient for MockRpc {
    async fn settings(&self, _addr: &str, _timeout: Duration) -> Result<HostSettings, RpcError> {
        Ok(competitive_settings(self.contract_price))
    }

    async fn form_contract(
        &self,
        addr: &str,
        terms: &ContractTerms,
        _timeout: Duration,
    ) -> Result<FormedContract, RpcError> {
        if self.failing.lock().contains(addr) {
            return Err(RpcError::Rejected("unacceptable terms".into()));
        }
        self.formations.lock().push(addr.to_string());
        Ok(self.formed(terms))
    }

    async fn renew_contract(
        &self,
        addr: &str,
        _old_id: ContractId,
        terms: &ContractTerms,
        _timeout: Duration,
    ) -> Result<FormedContract, RpcError> {
        if self.failing.lock().contains(addr) {
            return Err(RpcError::Rejected("will not renew".into()));
        }
        self.renewals.lock().push(addr.to_string());
        Ok(self.formed(terms))
    }
}

fn competitive_settings(contract_price: Currency) -> HostSettings {
    HostSettings {
        storage_price: Currency::COIN / 10 / weight::TB_MONTH,
        collateral: Currency::COIN / 5 / weight::TB_MONTH,
        max_collateral: Currency::from_coins(1_000),
        contract_price,
        upload_bandwidth_price: Currency::ZERO,
        download_bandwidth_price: Currency::ZERO,
        remaining_storage: 10_000_000_000,
        total_storage: 20_000_000_000,
        version: Version::new(0, 4, 0),
        accepting_contracts: true,
    }
}

fn key(n: u8) -> HostPublicKey {
    HostPublicKey::repeat_byte(n)
}

fn addr(n: u8) -> String {
    format!("host{n}.example:9982")
}

fn test_allowance() -> Allowance {
    Allowance {
        funds: Currency::from_coins(3_000),
        hosts: 30,
        period: 1_000,
        renew_window: 200,
        expected_storage: 1_000_000,
        expected_upload: 24_192,
        expected_download: 12_096,
        expected_redundancy: 3.0,
        ip_violation_check: false,
    }
}

/// A database seeded with `count` scanned, distinct-subnet hosts.
fn seeded_db(
    count: u8,
    allowance: Allowance,
    height: BlockHeight,
    contract_price: Currency,
) -> Arc<HostDb> {
    let db = Arc::new(HostDb::in_memory(
        HostDbConfig::default(),
        NetworkParams::testing(),
        allowance,
        height,
    ));
    for n in 1..=count {
        db.host_announced(key(n), addr(n), 0).unwrap();
        let ts = db.fetch(&key(n)).unwrap().last_scan_time().unwrap();
        db.record_scan(
            key(n),
            ts + 600,
            true,
            Some(competitive_settings(contract_price)),
            Some(format!("203.0.{n}.1").parse().unwrap()),
        )
        .unwrap();
    }
    db
}

type TestContractor = Contractor<MockConsensus, MockWallet, MockRpc>;

fn build_contractor(
    db: Arc<HostDb>,
    rpc: Arc<MockRpc>,
) -> (TestContractor, Arc<MockConsensus>, watch::Sender<bool>) {
    let (consensus, _height_tx) = MockConsensus::new(db.current_height());
    let wallet = Arc::new(MockWallet::new(Currency::from_coins(1_000_000)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let contractor = Contractor::new(
        db,
        Arc::clone(&consensus),
        wallet,
        rpc,
        ContractorConfig {
            formation_retry_budget: 100,
            ..Default::default()
        },
        shutdown_rx,
    )
    .with_rng_seed(99);
    (contractor, consensus, shutdown_tx)
}

/// Deliberately tank a contracted host: enough failed probes to drop both
/// its uptime factor and its responsiveness.
fn fail_host(db: &HostDb, host: HostPublicKey) {
    let last = db.fetch(&host).unwrap().last_scan_time().unwrap();
    for i in 1..=20u64 {
        db.record_scan(host, last + i * 3_600, false, None, None).unwrap();
    }
}

#[tokio::test]
async fn portfolio_forms_to_target() {
    let db = seeded_db(40, test_allowance(), 100, Currency::from_coins(1));
    let rpc = Arc::new(MockRpc::new(Currency::from_coins(1)));
    let (contractor, _, _tx) = build_contractor(Arc::clone(&db), Arc::clone(&rpc));

    let report = contractor.maintain(100).await.unwrap();
    assert_eq!(report.formed, 30);
    assert!(!report.insufficient_funds);
    assert_eq!(contractor.active_contract_count(), 30);

    // All contracts are with distinct hosts and fully usable.
    let summary = contractor.contracts();
    assert_eq!(summary.active.len(), 30);
    let hosts: HashSet<_> = summary.active.iter().map(|c| c.host_public_key).collect();
    assert_eq!(hosts.len(), 30);
    assert!(summary.active.iter().all(|c| c.utility.good_for_upload));

    // A second cycle at the same height is a no-op.
    let report = contractor.maintain(100).await.unwrap();
    assert_eq!(report, Default::default());
}

#[tokio::test]
async fn churned_hosts_are_replaced_not_cancelled() {
    let db = seeded_db(40, test_allowance(), 100, Currency::from_coins(1));
    let rpc = Arc::new(MockRpc::new(Currency::from_coins(1)));
    let (contractor, _, _tx) = build_contractor(Arc::clone(&db), Arc::clone(&rpc));

    contractor.maintain(100).await.unwrap();
    let initial: Vec<_> = contractor
        .contracts()
        .active
        .iter()
        .map(|c| c.host_public_key)
        .collect();

    // Five contracted hosts go dark.
    for host in &initial[..5] {
        fail_host(&db, *host);
    }

    let report = contractor.maintain(150).await.unwrap();
    assert_eq!(report.formed, 5);
    assert_eq!(report.archived, 0, "sunk-cost contracts are kept");

    let summary = contractor.contracts();
    assert_eq!(summary.active.len(), 30, "30 renewable contracts");
    assert_eq!(summary.inactive.len(), 5, "5 churned but held contracts");
    for host in &initial[..5] {
        let held = summary.inactive.iter().any(|c| c.host_public_key == *host);
        assert!(held, "churned host keeps its contract");
    }

    // Entering the renew window of the original contracts (the five formed
    // at height 150 are not in theirs yet): good hosts renew, dark hosts
    // do not.
    let report = contractor.maintain(949).await.unwrap();
    assert_eq!(report.renewed, 25);
    assert_eq!(report.renewal_failures, 0);
    let summary = contractor.contracts();
    assert_eq!(summary.active.len(), 30);

    // Past expiry the dark hosts' contracts archive as expired.
    let report = contractor.maintain(1_101).await.unwrap();
    assert_eq!(report.archived, 5);
    let summary = contractor.contracts();
    assert!(summary.expired.len() >= 5);
    assert_eq!(summary.active.len(), 30);
}

#[tokio::test]
async fn renewal_failure_marks_contract() {
    let db = seeded_db(35, test_allowance(), 100, Currency::from_coins(1));
    let rpc = Arc::new(MockRpc::new(Currency::from_coins(1)));
    let (contractor, _, _tx) = build_contractor(Arc::clone(&db), Arc::clone(&rpc));

    contractor.maintain(100).await.unwrap();
    let victim = contractor.contracts().active[0].host_public_key;
    let victim_addr = db.fetch(&victim).unwrap().net_address;
    rpc.fail_address(&victim_addr);

    let before = db.fetch(&victim).unwrap().historic_failed_interactions;
    let report = contractor.maintain(950).await.unwrap();
    assert_eq!(report.renewed, 29);
    assert_eq!(report.renewal_failures, 1);
    // The failure became an interaction record and a fresh host replaced
    // the slot.
    assert_eq!(
        db.fetch(&victim).unwrap().historic_failed_interactions,
        before + 1
    );
    assert_eq!(report.formed, 1);
}

#[tokio::test]
async fn budget_overrun_aborts_formation_batch() {
    let allowance = Allowance {
        funds: Currency::from_coins(30),
        ..test_allowance()
    };
    // Contract price dwarfs the per-host funding; the first formation
    // cannot fit the budget.
    let db = seeded_db(35, allowance, 100, Currency::from_coins(500));
    let rpc = Arc::new(MockRpc::new(Currency::from_coins(500)));
    let (contractor, _, _tx) = build_contractor(Arc::clone(&db), Arc::clone(&rpc));

    let report = contractor.maintain(100).await.unwrap();
    assert!(report.insufficient_funds);
    assert_eq!(report.formed, 0);
    assert_eq!(contractor.active_contract_count(), 0);
}

#[tokio::test]
async fn formation_failures_retry_with_fresh_hosts() {
    let db = seeded_db(40, test_allowance(), 100, Currency::from_coins(1));
    let rpc = Arc::new(MockRpc::new(Currency::from_coins(1)));
    for n in 1..=5 {
        rpc.fail_address(&addr(n));
    }
    let (contractor, _, _tx) = build_contractor(Arc::clone(&db), Arc::clone(&rpc));

    let report = contractor.maintain(100).await.unwrap();
    assert_eq!(report.formed, 30);
    // Any sampled failing host was recorded and skipped past.
    for n in 1..=5u8 {
        let entry = db.fetch(&key(n)).unwrap();
        let contracted = contractor
            .contracts()
            .active
            .iter()
            .any(|c| c.host_public_key == key(n));
        assert!(!contracted);
        if entry.historic_failed_interactions > 0 {
            assert_eq!(entry.historic_successful_interactions, 0);
        }
    }
}

#[tokio::test]
async fn ip_diversity_spans_subnets() {
    let mut allowance = test_allowance();
    allowance.hosts = 5;
    allowance.ip_violation_check = true;

    let db = Arc::new(HostDb::in_memory(
        HostDbConfig::default(),
        NetworkParams::testing(),
        allowance,
        100,
    ));
    // Twelve hosts crammed into four /24s.
    for n in 1..=12u8 {
        db.host_announced(key(n), addr(n), 0).unwrap();
        let ts = db.fetch(&key(n)).unwrap().last_scan_time().unwrap();
        db.record_scan(
            key(n),
            ts + 600,
            true,
            Some(competitive_settings(Currency::from_coins(1))),
            Some(format!("203.0.{}.{n}", n % 4).parse().unwrap()),
        )
        .unwrap();
    }

    let rpc = Arc::new(MockRpc::new(Currency::from_coins(1)));
    let (contractor, _, _tx) = build_contractor(Arc::clone(&db), Arc::clone(&rpc));
    contractor.maintain(100).await.unwrap();

    let summary = contractor.contracts();
    assert_eq!(summary.active.len(), 4, "one contract per /24");
    let subnets: HashSet<_> = summary
        .active
        .iter()
        .map(|c| HostSubnet::of(db.fetch(&c.host_public_key).unwrap().known_ip.unwrap()))
        .collect();
    assert_eq!(subnets.len(), summary.active.len());
}

#[tokio::test]
async fn cancelled_contract_archives_immediately() {
    let db = seeded_db(35, test_allowance(), 100, Currency::from_coins(1));
    let rpc = Arc::new(MockRpc::new(Currency::from_coins(1)));
    let (contractor, _, _tx) = build_contractor(Arc::clone(&db), Arc::clone(&rpc));

    contractor.maintain(100).await.unwrap();
    let id = contractor.contracts().active[0].id;

    assert!(contractor.cancel_contract(&id));
    assert_eq!(contractor.active_contract_count(), 29);
    let summary = contractor.contracts();
    assert!(summary.expired.iter().any(|c| c.id == id && c.cancelled));

    // The slot is refilled next cycle.
    let report = contractor.maintain(101).await.unwrap();
    assert_eq!(report.formed, 1);
    assert!(!contractor.cancel_contract(&id), "already archived");
}

#[tokio::test]
async fn run_loop_drives_on_heights_and_stops() {
    let db = seeded_db(35, test_allowance(), 100, Currency::from_coins(1));
    let rpc = Arc::new(MockRpc::new(Currency::from_coins(1)));

    let (consensus, height_tx) = MockConsensus::new(100);
    let wallet = Arc::new(MockWallet::new(Currency::from_coins(1_000_000)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let contractor = Contractor::new(
        Arc::clone(&db),
        consensus,
        wallet,
        Arc::clone(&rpc),
        ContractorConfig {
            formation_retry_budget: 100,
            ..Default::default()
        },
        shutdown_rx,
    )
    .with_rng_seed(7);

    let handle = tokio::spawn(contractor.run());

    height_tx.send(101).unwrap();
    // Reorg: height moves backwards; the cycle re-derives states and the
    // loop keeps going.
    height_tx.send(99).unwrap();
    height_tx.send(102).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(db.current_height(), 102);
    assert_eq!(rpc.formations.lock().len(), 30);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("contractor failed to stop")
        .unwrap()
        .unwrap();
}
