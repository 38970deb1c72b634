//! Fact sets and the hashed network states built from them.
//!
//! A [`Factbase`] keeps qualities and topologies in ordered sets, so iteration
//! is already canonical and the content hash needs no extra sort. The hash is
//! FNV-1a 64 over `'q' ++ encoding` / `'t' ++ encoding` records.
//!
//! Two states with the same hash are the same state. Collisions between
//! different fact sets are not detected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::exploit::Action;
use crate::fact::{Fact, FactCode, FactKind, Operator, Quality, Topology};
use crate::{AssetId, Code, StateId};

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

/// Content hash of a factbase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateHash(u64);

impl StateHash {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factbase {
    qualities: BTreeSet<Quality>,
    topologies: BTreeSet<Topology>,
}

impl Factbase {
    pub fn new(
        qualities: impl IntoIterator<Item = Quality>,
        topologies: impl IntoIterator<Item = Topology>,
    ) -> Self {
        Self {
            qualities: qualities.into_iter().collect(),
            topologies: topologies.into_iter().collect(),
        }
    }

    pub fn qualities(&self) -> impl Iterator<Item = &Quality> {
        self.qualities.iter()
    }

    pub fn topologies(&self) -> impl Iterator<Item = &Topology> {
        self.topologies.iter()
    }

    pub fn len(&self) -> usize {
        self.qualities.len() + self.topologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.qualities.is_empty() && self.topologies.is_empty()
    }

    // ========================================================================
    // Membership
    // ========================================================================

    pub fn contains(&self, fact: &Fact) -> bool {
        match fact {
            Fact::Quality(q) => self.qualities.contains(q),
            Fact::Topology(t) => self.topologies.contains(t),
        }
    }

    pub fn contains_quality(&self, quality: &Quality) -> bool {
        self.qualities.contains(quality)
    }

    pub fn contains_topology(&self, topology: &Topology) -> bool {
        self.topologies.contains(topology)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Apply one postcondition edit.
    pub fn apply(&mut self, action: Action, fact: &Fact) {
        match (action, fact) {
            (Action::Add, Fact::Quality(q)) => self.add_quality(*q),
            (Action::Update, Fact::Quality(q)) => self.update_quality(*q),
            (Action::Delete, Fact::Quality(q)) => self.delete_quality(q),
            (Action::Add, Fact::Topology(t)) => self.add_topology(*t),
            (Action::Update, Fact::Topology(t)) => self.update_topology(*t),
            (Action::Delete, Fact::Topology(t)) => self.delete_topology(t),
        }
    }

    pub fn add_quality(&mut self, quality: Quality) {
        self.qualities.insert(quality);
    }

    /// Replace every quality with the same `(asset, property)`; insert if none.
    pub fn update_quality(&mut self, quality: Quality) {
        self.delete_quality(&quality);
        self.qualities.insert(quality);
    }

    /// Remove every quality with the same `(asset, property)`. Absent is a no-op.
    pub fn delete_quality(&mut self, quality: &Quality) {
        let matching: Vec<Quality> = self
            .qualities
            .range(quality_key_range(quality.asset, quality.property))
            .copied()
            .collect();
        for q in matching {
            self.qualities.remove(&q);
        }
    }

    pub fn add_topology(&mut self, topology: Topology) {
        self.topologies.insert(topology);
    }

    /// Replace every topology with the same `(from, to, dir, property)`; insert if none.
    pub fn update_topology(&mut self, topology: Topology) {
        self.delete_topology(&topology);
        self.topologies.insert(topology);
    }

    pub fn delete_topology(&mut self, topology: &Topology) {
        self.topologies.retain(|t| !t.same_key(topology));
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Packed encodings of every fact, qualities first, in canonical order.
    pub fn encodings(&self) -> impl Iterator<Item = (FactCode, FactKind)> + '_ {
        self.qualities
            .iter()
            .map(|q| (q.encoding(), FactKind::Quality))
            .chain(
                self.topologies
                    .iter()
                    .map(|t| (t.encoding(), FactKind::Topology)),
            )
    }

    pub fn hash(&self) -> StateHash {
        let mut hash = FNV_OFFSET_BASIS;
        let mut add = |tag: u8, code: FactCode| {
            hash ^= tag as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
            for b in code.raw().to_le_bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        };
        for (code, kind) in self.encodings() {
            let tag = match kind {
                FactKind::Quality => b'q',
                FactKind::Topology => b't',
            };
            add(tag, code);
        }
        StateHash(hash)
    }
}

fn quality_key_range(asset: AssetId, property: Code) -> std::ops::RangeInclusive<Quality> {
    Quality::new(asset, property, Operator::Eq, Code::new(0))
        ..=Quality::new(asset, property, Operator::Ge, Code::new(u32::MAX))
}

// ============================================================================
// Network State
// ============================================================================

/// A factbase plus its cached hash and, once kept, its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    id: Option<StateId>,
    hash: StateHash,
    factbase: Factbase,
}

impl NetworkState {
    pub fn new(factbase: Factbase) -> Self {
        let hash = factbase.hash();
        Self {
            id: None,
            hash,
            factbase,
        }
    }

    pub fn id(&self) -> Option<StateId> {
        self.id
    }

    pub fn set_id(&mut self, id: StateId) {
        self.id = Some(id);
    }

    pub fn hash(&self) -> StateHash {
        self.hash
    }

    pub fn factbase(&self) -> &Factbase {
        &self.factbase
    }

    /// Copy this state and apply `effects` in order. The copy has no identity.
    pub fn successor(&self, effects: &[(Action, Fact)]) -> NetworkState {
        let mut factbase = self.factbase.clone();
        for (action, fact) in effects {
            factbase.apply(*action, fact);
        }
        NetworkState::new(factbase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::Direction;

    fn q(asset: u32, property: u32, value: u32) -> Quality {
        Quality::new(AssetId::new(asset), Code::new(property), Operator::Eq, Code::new(value))
    }

    fn t(from: u32, to: u32, property: u32, value: u32) -> Topology {
        Topology::new(
            AssetId::new(from),
            AssetId::new(to),
            Direction::Forward,
            Code::new(property),
            Operator::Eq,
            Code::new(value),
        )
    }

    #[test]
    fn hash_ignores_insertion_order() {
        let a = Factbase::new([q(0, 1, 2), q(1, 1, 2)], [t(0, 1, 3, 4)]);
        let b = Factbase::new([q(1, 1, 2), q(0, 1, 2)], [t(0, 1, 3, 4)]);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), Factbase::new([q(0, 1, 2)], [t(0, 1, 3, 4)]).hash());
    }

    #[test]
    fn quality_and_topology_with_same_bits_hash_differently() {
        let only_quality = Factbase::new([q(0, 0, 0)], []);
        let only_topology = Factbase::new([], [t(0, 0, 0, 0)]);
        assert_ne!(only_quality.hash(), only_topology.hash());
    }

    #[test]
    fn update_replaces_by_asset_and_property() {
        let mut fb = Factbase::new([q(0, 1, 2), q(0, 1, 3), q(0, 4, 2), q(1, 1, 2)], []);
        fb.update_quality(q(0, 1, 9));

        assert!(fb.contains_quality(&q(0, 1, 9)));
        assert!(!fb.contains_quality(&q(0, 1, 2)));
        assert!(!fb.contains_quality(&q(0, 1, 3)));
        assert!(fb.contains_quality(&q(0, 4, 2)));
        assert!(fb.contains_quality(&q(1, 1, 2)));
        assert_eq!(fb.len(), 3);
    }

    #[test]
    fn update_of_missing_key_inserts() {
        let mut fb = Factbase::default();
        fb.update_quality(q(2, 1, 1));
        assert!(fb.contains_quality(&q(2, 1, 1)));
    }

    #[test]
    fn delete_matches_key_and_tolerates_absence() {
        let mut fb = Factbase::new([q(0, 1, 2)], [t(0, 1, 3, 4), t(1, 0, 3, 4)]);
        fb.delete_quality(&q(0, 1, 7));
        assert!(fb.qualities().next().is_none());

        fb.delete_topology(&t(0, 1, 3, 99));
        assert!(!fb.contains_topology(&t(0, 1, 3, 4)));
        assert!(fb.contains_topology(&t(1, 0, 3, 4)));

        let before = fb.hash();
        fb.delete_quality(&q(5, 5, 5));
        assert_eq!(fb.hash(), before);
    }

    #[test]
    fn successor_leaves_the_source_untouched() {
        let state = NetworkState::new(Factbase::new([q(0, 1, 2)], []));
        let next = state.successor(&[(Action::Add, Fact::Quality(q(0, 3, 2)))]);

        assert_eq!(state.factbase().len(), 1);
        assert_eq!(next.factbase().len(), 2);
        assert_eq!(next.id(), None);
        assert_eq!(next.hash(), next.factbase().hash());
        assert_ne!(next.hash(), state.hash());
    }
}
