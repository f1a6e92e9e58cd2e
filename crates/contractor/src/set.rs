//! The contract set.

use std::collections::HashMap;

use ballast_api::ContractId;
use ballast_primitives::{BlockHeight, Currency, HostPublicKey};

use crate::contract::Contract;

/// Contracts grouped for the control plane: active (renewable), inactive
/// (held but not renewable), and expired/cancelled history.
#[derive(Debug, Clone, Default)]
pub struct ContractsSummary {
    pub active: Vec<Contract>,
    pub inactive: Vec<Contract>,
    pub expired: Vec<Contract>,
}

/// All contracts the renter holds or has held.
///
/// The active set is indexed both by contract id and by host public key;
/// one host never holds two active contracts. Terminated contracts move to
/// the archive and stay queryable.
#[derive(Debug, Default)]
pub struct ContractSet {
    active: HashMap<ContractId, Contract>,
    by_host: HashMap<HostPublicKey, ContractId>,
    archive: HashMap<ContractId, Contract>,
}

impl ContractSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active contracts.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Returns true if no contracts are active.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Insert a new active contract. If the host already has one (a
    /// renewal), the old contract is archived first.
    pub fn insert(&mut self, contract: Contract) {
        if let Some(old_id) = self.by_host.get(&contract.host_public_key).copied() {
            if old_id != contract.id {
                if let Some(mut old) = self.active.remove(&old_id) {
                    old.utility.good_for_upload = false;
                    old.utility.good_for_renew = false;
                    self.archive.insert(old_id, old);
                }
            }
        }
        self.by_host.insert(contract.host_public_key, contract.id);
        self.active.insert(contract.id, contract);
    }

    /// Move an active contract to the archive.
    pub fn archive(&mut self, id: &ContractId) -> Option<&Contract> {
        let contract = self.active.remove(id)?;
        if self.by_host.get(&contract.host_public_key) == Some(id) {
            self.by_host.remove(&contract.host_public_key);
        }
        self.archive.insert(*id, contract);
        self.archive.get(id)
    }

    /// Look up an active contract by id.
    pub fn get(&self, id: &ContractId) -> Option<&Contract> {
        self.active.get(id)
    }

    /// Mutable access to an active contract.
    pub fn get_mut(&mut self, id: &ContractId) -> Option<&mut Contract> {
        self.active.get_mut(id)
    }

    /// The active contract held with a host, if any.
    pub fn by_host(&self, host: &HostPublicKey) -> Option<&Contract> {
        self.by_host.get(host).and_then(|id| self.active.get(id))
    }

    /// Iterate over active contracts.
    pub fn iter(&self) -> impl Iterator<Item = &Contract> {
        self.active.values()
    }

    /// Iterate mutably over active contracts.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Contract> {
        self.active.values_mut()
    }

    /// Hosts of all active contracts.
    pub fn hosts(&self) -> impl Iterator<Item = &HostPublicKey> {
        self.by_host.keys()
    }

    /// Active contracts still marked renewable.
    pub fn good_for_renew_count(&self) -> usize {
        self.active
            .values()
            .filter(|c| c.utility.good_for_renew)
            .count()
    }

    /// Funds committed across active contracts, for budget enforcement.
    pub fn committed_funds(&self) -> Currency {
        self.active.values().map(|c| c.total_cost).sum()
    }

    /// Group everything for the control plane at the given height.
    pub fn summary(&self, height: BlockHeight) -> ContractsSummary {
        let mut summary = ContractsSummary::default();
        for contract in self.active.values() {
            if contract.utility.good_for_renew {
                summary.active.push(contract.clone());
            } else {
                summary.inactive.push(contract.clone());
            }
        }
        for contract in self.archive.values() {
            if height >= contract.end_height || contract.cancelled {
                summary.expired.push(contract.clone());
            } else {
                summary.inactive.push(contract.clone());
            }
        }
        summary
    }
}
