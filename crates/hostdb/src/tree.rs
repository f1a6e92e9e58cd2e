//! Weighted host tree.
//!
//! A complete binary tree in array layout: node `i` has children `2i+1` and
//! `2i+2`, every node carries one host, and each node's `total` is its own
//! weight plus its children's totals. Completeness keeps the depth at
//! `log n` without rotation bookkeeping, so insert, remove, modify, fetch,
//! and one weighted draw are all O(log n).
//!
//! Weighted selection walks a uniform draw in `[0, total_weight)` down the
//! sums. Excluded or filtered hosts are detached for the duration of the
//! draw and restored afterwards, which keeps repeated draws proportional
//! without ever returning a duplicate.

use std::collections::{HashMap, HashSet};

use ballast_primitives::{HostPublicKey, Weight};
use rand::Rng;

use crate::entry::HostEntry;
use crate::error::HostDbError;
use crate::subnet::HostSubnet;

#[derive(Debug, Clone)]
struct Node {
    entry: HostEntry,
    weight: Weight,
    /// Weight of this node plus both subtrees.
    total: Weight,
}

/// Parameters of one weighted draw.
pub struct SelectParams<'a> {
    /// How many distinct hosts to return.
    pub count: usize,
    /// Hosts never returned.
    pub excluded_keys: &'a HashSet<HostPublicKey>,
    /// Subnets never returned; the draw also adds each selected host's
    /// subnet, so one draw spans distinct subnets.
    pub excluded_subnets: &'a HashSet<HostSubnet>,
    /// Extra predicate a host must satisfy to be returned. Receives the
    /// host's stored weight alongside the entry.
    pub filter: Option<&'a dyn Fn(&HostEntry, Weight) -> bool>,
}

/// The indexed, weighted collection of all known hosts.
#[derive(Debug, Default)]
pub struct HostTree {
    nodes: Vec<Node>,
    index: HashMap<HostPublicKey, usize>,
}

impl HostTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hosts in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no hosts are known.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sum of all host weights.
    pub fn total_weight(&self) -> Weight {
        self.nodes.first().map(|n| n.total).unwrap_or(Weight::ZERO)
    }

    /// Look up a host by key.
    pub fn fetch(&self, key: &HostPublicKey) -> Option<&HostEntry> {
        self.index.get(key).map(|&i| &self.nodes[i].entry)
    }

    /// The stored weight of a host.
    pub fn weight_of(&self, key: &HostPublicKey) -> Option<Weight> {
        self.index.get(key).map(|&i| self.nodes[i].weight)
    }

    /// Iterate over all entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &HostEntry> {
        self.nodes.iter().map(|n| &n.entry)
    }

    /// Insert a host, or replace it in place if the key is already present.
    pub fn insert(
        &mut self,
        entry: HostEntry,
        weight: Weight,
    ) -> Result<(), HostDbError> {
        if let Some(&i) = self.index.get(&entry.public_key) {
            let old_weight = self.nodes[i].weight;
            self.nodes[i].entry = entry;
            self.nodes[i].weight = weight;
            return self.shift_path(i, old_weight, weight);
        }

        let i = self.nodes.len();
        self.index.insert(entry.public_key, i);
        self.nodes.push(Node {
            entry,
            weight,
            total: weight,
        });
        // The new leaf's own total is set; fold its weight into ancestors.
        if i > 0 {
            self.shift_path((i - 1) / 2, Weight::ZERO, weight)?;
        }
        Ok(())
    }

    /// Remove a host, returning its entry.
    pub fn remove(&mut self, key: &HostPublicKey) -> Result<Option<HostEntry>, HostDbError> {
        let Some(&i) = self.index.get(key) else {
            return Ok(None);
        };

        // Detach the last node first; completeness is preserved by moving
        // it into the vacated slot.
        let last = self.nodes.len() - 1;
        let last_weight = self.nodes[last].weight;
        self.shift_path(last, last_weight, Weight::ZERO)?;
        let mut tail = self.nodes.pop().expect("tree is non-empty");
        self.index.remove(&tail.entry.public_key);

        if i == last {
            return Ok(Some(tail.entry));
        }

        let removed_weight = self.nodes[i].weight;
        std::mem::swap(&mut self.nodes[i].entry, &mut tail.entry);
        self.nodes[i].weight = last_weight;
        self.index.insert(self.nodes[i].entry.public_key, i);
        self.index.remove(key);
        self.shift_path(i, removed_weight, last_weight)?;
        Ok(Some(tail.entry))
    }

    /// Mutate a host's entry and store its recomputed weight.
    pub fn modify(
        &mut self,
        key: &HostPublicKey,
        f: impl FnOnce(&mut HostEntry) -> Weight,
    ) -> Result<(), HostDbError> {
        let Some(&i) = self.index.get(key) else {
            return Err(HostDbError::UnknownHost(*key));
        };
        let old_weight = self.nodes[i].weight;
        let new_weight = f(&mut self.nodes[i].entry);
        self.nodes[i].weight = new_weight;
        self.shift_path(i, old_weight, new_weight)
    }

    /// Select up to `params.count` distinct hosts, each with probability
    /// proportional to its weight among the non-excluded hosts.
    ///
    /// Exclusion is implemented by detaching a drawn-but-excluded host and
    /// redrawing; all detached hosts are restored before returning, so the
    /// tree is unchanged. The RNG is injected: a seeded generator
    /// reproduces the selection exactly.
    pub fn select_random<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        params: SelectParams<'_>,
    ) -> Result<Vec<HostEntry>, HostDbError> {
        let mut detached: Vec<(HostEntry, Weight)> = Vec::new();
        let mut taken_subnets: HashSet<HostSubnet> = HashSet::new();
        let mut out = Vec::with_capacity(params.count.min(self.len()));

        while out.len() < params.count && !self.is_empty() && !self.total_weight().is_zero() {
            let target = sample_below(rng, self.total_weight());
            let i = self.descend(target)?;
            let key = self.nodes[i].entry.public_key;
            let weight = self.nodes[i].weight;
            let entry = self
                .remove(&key)?
                .ok_or_else(|| HostDbError::invariant("descent landed on an unindexed node"))?;

            let subnet = entry.known_ip.map(HostSubnet::of);
            let subnet_clash = subnet.is_some_and(|s| {
                params.excluded_subnets.contains(&s) || taken_subnets.contains(&s)
            });
            let filtered = params.filter.is_some_and(|f| !f(&entry, weight));

            if !params.excluded_keys.contains(&key) && !subnet_clash && !filtered {
                if let Some(s) = subnet {
                    taken_subnets.insert(s);
                }
                out.push(entry.clone());
            }
            detached.push((entry, weight));
        }

        for (entry, weight) in detached {
            self.insert(entry, weight)?;
        }
        Ok(out)
    }

    /// Recompute every host's weight with `f` and rebuild the subtree sums
    /// in one O(n) pass. Used when the allowance or block height changes,
    /// which shifts every weight at once.
    pub fn reweigh(
        &mut self,
        f: impl Fn(&HostEntry) -> Weight,
    ) -> Result<(), HostDbError> {
        for node in &mut self.nodes {
            node.weight = f(&node.entry);
        }
        for i in (0..self.nodes.len()).rev() {
            let mut total = self.nodes[i].weight;
            for child in [2 * i + 1, 2 * i + 2] {
                if child < self.nodes.len() {
                    total = total
                        .checked_add(self.nodes[child].total)
                        .ok_or_else(|| HostDbError::invariant("subtree weight overflow"))?;
                }
            }
            self.nodes[i].total = total;
        }
        Ok(())
    }

    /// Verify that every node's total equals its weight plus its children's
    /// totals. Test and diagnostic use; a false return is a programming
    /// error, not bad data.
    pub fn invariant_holds(&self) -> bool {
        (0..self.nodes.len()).all(|i| {
            let mut expected = self.nodes[i].weight;
            for child in [2 * i + 1, 2 * i + 2] {
                if let Some(node) = self.nodes.get(child) {
                    expected = match expected.checked_add(node.total) {
                        Some(w) => w,
                        None => return false,
                    };
                }
            }
            self.nodes[i].total == expected
        }) && self.index.len() == self.nodes.len()
            && self
                .index
                .iter()
                .all(|(k, &i)| self.nodes[i].entry.public_key == *k)
    }

    /// Walk `target` down the subtree sums to the node it lands on.
    fn descend(&self, mut target: Weight) -> Result<usize, HostDbError> {
        let mut i = 0usize;
        loop {
            let left = 2 * i + 1;
            if let Some(node) = self.nodes.get(left) {
                if target < node.total {
                    i = left;
                    continue;
                }
                target = target
                    .checked_sub(node.total)
                    .ok_or_else(|| HostDbError::invariant("descend underflow at left child"))?;
            }
            if target < self.nodes[i].weight {
                return Ok(i);
            }
            target = target
                .checked_sub(self.nodes[i].weight)
                .ok_or_else(|| HostDbError::invariant("descend underflow at node weight"))?;
            let right = 2 * i + 2;
            if right >= self.nodes.len() {
                return Err(HostDbError::invariant(
                    "weighted descent ran past the tree",
                ));
            }
            i = right;
        }
    }

    /// Replace `old` with `new` in the totals of `i` and all its ancestors.
    fn shift_path(
        &mut self,
        mut i: usize,
        old: Weight,
        new: Weight,
    ) -> Result<(), HostDbError> {
        loop {
            let total = self.nodes[i]
                .total
                .checked_sub(old)
                .and_then(|t| t.checked_add(new))
                .ok_or_else(|| HostDbError::invariant("subtree weight underflow"))?;
            self.nodes[i].total = total;
            if i == 0 {
                return Ok(());
            }
            i = (i - 1) / 2;
        }
    }
}

/// Uniform draw in `[0, bound)` by rejection, exact for any 512-bit bound.
fn sample_below<R: Rng + ?Sized>(rng: &mut R, bound: Weight) -> Weight {
    debug_assert!(!bound.is_zero());
    let bits = bound.as_u512().bit_len();
    let words = bits.div_ceil(64);
    let top_mask = if bits % 64 == 0 {
        u64::MAX
    } else {
        (1u64 << (bits % 64)) - 1
    };
    loop {
        let mut limbs = [0u64; 8];
        for limb in limbs.iter_mut().take(words) {
            *limb = rng.next_u64();
        }
        limbs[words - 1] &= top_mask;
        let candidate = Weight::new(alloy_primitives::U512::from_limbs(limbs));
        if candidate < bound {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballast_api::HostSettings;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn entry(n: u8) -> HostEntry {
        HostEntry::new(
            HostPublicKey::repeat_byte(n),
            format!("host{n}.example:9982"),
            HostSettings::default(),
            0,
            1_000,
            600,
        )
    }

    fn entry_with_ip(n: u8, ip: &str) -> HostEntry {
        let mut e = entry(n);
        e.known_ip = Some(ip.parse().unwrap());
        e
    }

    fn no_exclusions() -> (HashSet<HostPublicKey>, HashSet<HostSubnet>) {
        (HashSet::new(), HashSet::new())
    }

    #[test]
    fn test_insert_is_idempotent_on_key() {
        let mut tree = HostTree::new();
        tree.insert(entry(1), Weight::from_u64(10)).unwrap();
        tree.insert(entry(1), Weight::from_u64(30)).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.total_weight(), Weight::from_u64(30));
        assert!(tree.invariant_holds());
    }

    #[test]
    fn test_remove_and_totals() {
        let mut tree = HostTree::new();
        for n in 1..=7u8 {
            tree.insert(entry(n), Weight::from_u64(n as u64)).unwrap();
        }
        assert_eq!(tree.total_weight(), Weight::from_u64(28));

        let removed = tree.remove(&HostPublicKey::repeat_byte(3)).unwrap();
        assert_eq!(
            removed.unwrap().public_key,
            HostPublicKey::repeat_byte(3)
        );
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.total_weight(), Weight::from_u64(25));
        assert!(tree.invariant_holds());
        assert!(tree.fetch(&HostPublicKey::repeat_byte(3)).is_none());

        // Removing an unknown key is not an error.
        assert!(tree.remove(&HostPublicKey::repeat_byte(99)).unwrap().is_none());
    }

    #[test]
    fn test_modify_updates_weight() {
        let mut tree = HostTree::new();
        for n in 1..=5u8 {
            tree.insert(entry(n), Weight::from_u64(10)).unwrap();
        }
        tree.modify(&HostPublicKey::repeat_byte(2), |e| {
            e.record_interaction(true);
            Weight::from_u64(40)
        })
        .unwrap();
        assert_eq!(tree.total_weight(), Weight::from_u64(80));
        assert!(tree.invariant_holds());
        assert_eq!(
            tree.fetch(&HostPublicKey::repeat_byte(2))
                .unwrap()
                .historic_successful_interactions,
            1
        );

        let missing = tree.modify(&HostPublicKey::repeat_byte(9), |_| Weight::ONE);
        assert!(matches!(missing, Err(HostDbError::UnknownHost(_))));
    }

    #[test]
    fn test_single_host_selection() {
        let mut tree = HostTree::new();
        tree.insert(entry(1), Weight::ten_pow(80)).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let (no_keys, no_subnets) = no_exclusions();
        let picked = tree
            .select_random(
                &mut rng,
                SelectParams {
                    count: 1,
                    excluded_keys: &no_keys,
                    excluded_subnets: &no_subnets,
                    filter: None,
                },
            )
            .unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].public_key, HostPublicKey::repeat_byte(1));

        let excluded: HashSet<_> = [HostPublicKey::repeat_byte(1)].into();
        let picked = tree
            .select_random(
                &mut rng,
                SelectParams {
                    count: 1,
                    excluded_keys: &excluded,
                    excluded_subnets: &no_subnets,
                    filter: None,
                },
            )
            .unwrap();
        assert!(picked.is_empty());
        // The tree is restored either way.
        assert_eq!(tree.len(), 1);
        assert!(tree.invariant_holds());
    }

    #[test]
    fn test_selection_returns_distinct_hosts() {
        let mut tree = HostTree::new();
        for n in 1..=20u8 {
            tree.insert(entry(n), Weight::from_u64(100)).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(7);
        let (no_keys, no_subnets) = no_exclusions();
        let picked = tree
            .select_random(
                &mut rng,
                SelectParams {
                    count: 10,
                    excluded_keys: &no_keys,
                    excluded_subnets: &no_subnets,
                    filter: None,
                },
            )
            .unwrap();
        assert_eq!(picked.len(), 10);
        let distinct: HashSet<_> = picked.iter().map(|e| e.public_key).collect();
        assert_eq!(distinct.len(), 10);
        assert_eq!(tree.len(), 20);
        assert!(tree.invariant_holds());
    }

    #[test]
    fn test_selection_is_reproducible_with_seed() {
        let mut tree = HostTree::new();
        for n in 1..=30u8 {
            tree.insert(entry(n), Weight::from_u64(1 + n as u64 * 13)).unwrap();
        }
        let (no_keys, no_subnets) = no_exclusions();
        let mut pick = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            tree.select_random(
                &mut rng,
                SelectParams {
                    count: 5,
                    excluded_keys: &no_keys,
                    excluded_subnets: &no_subnets,
                    filter: None,
                },
            )
            .unwrap()
            .iter()
            .map(|e| e.public_key)
            .collect::<Vec<_>>()
        };
        assert_eq!(pick(42), pick(42));
        assert_ne!(pick(42), pick(43));
    }

    #[test]
    fn test_subnet_diversity_within_one_draw() {
        let mut tree = HostTree::new();
        // Three hosts in one /24, one in another.
        tree.insert(entry_with_ip(1, "203.0.113.10"), Weight::from_u64(100)).unwrap();
        tree.insert(entry_with_ip(2, "203.0.113.20"), Weight::from_u64(100)).unwrap();
        tree.insert(entry_with_ip(3, "203.0.113.30"), Weight::from_u64(100)).unwrap();
        tree.insert(entry_with_ip(4, "198.51.100.1"), Weight::from_u64(100)).unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        let (no_keys, no_subnets) = no_exclusions();
        let picked = tree
            .select_random(
                &mut rng,
                SelectParams {
                    count: 4,
                    excluded_keys: &no_keys,
                    excluded_subnets: &no_subnets,
                    filter: None,
                },
            )
            .unwrap();
        // Only one host per /24 can be returned.
        assert_eq!(picked.len(), 2);
        let subnets: HashSet<_> = picked
            .iter()
            .map(|e| HostSubnet::of(e.known_ip.unwrap()))
            .collect();
        assert_eq!(subnets.len(), 2);
    }

    #[test]
    fn test_excluded_subnet_param() {
        let mut tree = HostTree::new();
        tree.insert(entry_with_ip(1, "203.0.113.10"), Weight::from_u64(100)).unwrap();
        tree.insert(entry_with_ip(2, "198.51.100.1"), Weight::from_u64(100)).unwrap();

        let excluded_subnets: HashSet<_> =
            [HostSubnet::of("203.0.113.99".parse().unwrap())].into();
        let no_keys = HashSet::new();
        let mut rng = StdRng::seed_from_u64(9);
        let picked = tree
            .select_random(
                &mut rng,
                SelectParams {
                    count: 2,
                    excluded_keys: &no_keys,
                    excluded_subnets: &excluded_subnets,
                    filter: None,
                },
            )
            .unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].public_key, HostPublicKey::repeat_byte(2));
    }

    #[test]
    fn test_filter_predicate() {
        let mut tree = HostTree::new();
        for n in 1..=4u8 {
            let mut e = entry(n);
            e.settings.accepting_contracts = n % 2 == 0;
            tree.insert(e, Weight::from_u64(100)).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(5);
        let (no_keys, no_subnets) = no_exclusions();
        let accepting = |e: &HostEntry, _: Weight| e.settings.accepting_contracts;
        let picked = tree
            .select_random(
                &mut rng,
                SelectParams {
                    count: 4,
                    excluded_keys: &no_keys,
                    excluded_subnets: &no_subnets,
                    filter: Some(&accepting),
                },
            )
            .unwrap();
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|e| e.settings.accepting_contracts));
    }

    #[test]
    fn test_empirical_frequency_tracks_weight() {
        // One host at 60% of the mass, one at 30%, one at 10%. Over many
        // seeded single draws the observed frequencies must match within a
        // chi-squared bound (3 d.o.f. at p=0.001 is 16.27).
        let mut tree = HostTree::new();
        tree.insert(entry(1), Weight::from_u64(6_000)).unwrap();
        tree.insert(entry(2), Weight::from_u64(3_000)).unwrap();
        tree.insert(entry(3), Weight::from_u64(1_000)).unwrap();

        let trials = 20_000usize;
        let mut counts: HashMap<HostPublicKey, usize> = HashMap::new();
        let mut rng = StdRng::seed_from_u64(1234);
        let (no_keys, no_subnets) = no_exclusions();
        for _ in 0..trials {
            let picked = tree
                .select_random(
                    &mut rng,
                    SelectParams {
                        count: 1,
                        excluded_keys: &no_keys,
                        excluded_subnets: &no_subnets,
                        filter: None,
                    },
                )
                .unwrap();
            *counts.entry(picked[0].public_key).or_default() += 1;
        }

        let expected = [
            (HostPublicKey::repeat_byte(1), 0.6),
            (HostPublicKey::repeat_byte(2), 0.3),
            (HostPublicKey::repeat_byte(3), 0.1),
        ];
        let mut chi2 = 0.0;
        for (key, p) in expected {
            let observed = *counts.get(&key).unwrap_or(&0) as f64;
            let expected_count = trials as f64 * p;
            chi2 += (observed - expected_count).powi(2) / expected_count;
        }
        assert!(chi2 < 16.27, "chi-squared {chi2}");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_invariant_after_operation_sequence(
            ops in proptest::collection::vec((0u8..3, 0u8..16, 1u64..1_000_000), 1..120)
        ) {
            let mut tree = HostTree::new();
            for (op, key, weight) in ops {
                match op {
                    0 => {
                        tree.insert(entry(key), Weight::from_u64(weight)).unwrap();
                    }
                    1 => {
                        tree.remove(&HostPublicKey::repeat_byte(key)).unwrap();
                    }
                    _ => {
                        let _ = tree.modify(&HostPublicKey::repeat_byte(key), |_| {
                            Weight::from_u64(weight)
                        });
                    }
                }
                prop_assert!(tree.invariant_holds());
            }
        }

        #[test]
        fn prop_selection_never_returns_excluded(
            seed in 0u64..1_000,
            excluded_n in 1u8..10,
        ) {
            let mut tree = HostTree::new();
            for n in 1..=10u8 {
                tree.insert(entry(n), Weight::from_u64(n as u64 * 7)).unwrap();
            }
            let excluded: HashSet<_> =
                (1..=excluded_n).map(HostPublicKey::repeat_byte).collect();
            let no_subnets = HashSet::new();
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = tree
                .select_random(
                    &mut rng,
                    SelectParams {
                        count: 10,
                        excluded_keys: &excluded,
                        excluded_subnets: &no_subnets,
                        filter: None,
                    },
                )
                .unwrap();
            prop_assert_eq!(picked.len(), 10 - excluded_n as usize);
            for e in &picked {
                prop_assert!(!excluded.contains(&e.public_key));
            }
            prop_assert!(tree.invariant_holds());
            prop_assert_eq!(tree.len(), 10);
        }
    }
}
