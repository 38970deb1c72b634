//! Hash → state identity indexes.
//!
//! The search driver only talks to [`DedupIndex`]. The index owns identity
//! allocation: [`DedupIndex::claim`] either finds the identity already
//! recorded for a hash or hands out the next one, as a single step. Edge
//! identities come from the same index.
//!
//! [`MemoryDedup`] is the single-owner default. [`SharedDedup`] is a
//! cloneable handle over a concurrent map and shared counters: clones see the
//! same entries and draw from the same identity sequence, so searches running
//! against clones of one index never record two identities for one hash.
//! Each state is claimed by exactly one search, and only that search expands
//! it; the union of their results is the complete graph.
//!
//! Nothing is cleared implicitly. Call [`DedupIndex::clear`] to reuse an
//! index for an unrelated search.

use ahash::AHashMap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::factbase::StateHash;
use crate::{EdgeId, StateId};

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("{what} identities exhausted after {issued}")]
    Exhausted { what: &'static str, issued: u64 },
    #[error("dedup backend error: {0}")]
    Backend(String),
}

/// Outcome of [`DedupIndex::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The hash was unseen and now maps to this new identity.
    Fresh(StateId),
    /// The hash was already recorded, possibly by another search.
    Existing(StateId),
}

impl Claim {
    pub fn id(self) -> StateId {
        match self {
            Claim::Fresh(id) | Claim::Existing(id) => id,
        }
    }
}

pub trait DedupIndex {
    /// Look up `hash`, allocating the next state identity if it is unseen.
    fn claim(&mut self, hash: StateHash) -> Result<Claim, DedupError>;

    /// Next edge identity.
    fn next_edge(&mut self) -> Result<EdgeId, DedupError>;

    fn lookup(&self, hash: StateHash) -> Option<StateId>;

    /// Forget every entry and restart both identity sequences at 0.
    fn clear(&mut self);

    /// Finish a batch of claims.
    fn commit(&mut self) -> Result<(), DedupError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn checked_id(what: &'static str, issued: u64) -> Result<u32, DedupError> {
    u32::try_from(issued).map_err(|_| DedupError::Exhausted { what, issued })
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryDedup {
    map: AHashMap<StateHash, StateId>,
    next_state: u64,
    next_edge: u64,
}

impl MemoryDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: AHashMap::with_capacity(capacity),
            ..Self::default()
        }
    }
}

impl DedupIndex for MemoryDedup {
    fn claim(&mut self, hash: StateHash) -> Result<Claim, DedupError> {
        match self.map.entry(hash) {
            std::collections::hash_map::Entry::Occupied(e) => Ok(Claim::Existing(*e.get())),
            std::collections::hash_map::Entry::Vacant(e) => {
                let id = StateId::new(checked_id("state", self.next_state)?);
                self.next_state += 1;
                e.insert(id);
                Ok(Claim::Fresh(id))
            }
        }
    }

    fn next_edge(&mut self) -> Result<EdgeId, DedupError> {
        let id = EdgeId::new(checked_id("edge", self.next_edge)?);
        self.next_edge += 1;
        Ok(id)
    }

    fn lookup(&self, hash: StateHash) -> Option<StateId> {
        self.map.get(&hash).copied()
    }

    fn clear(&mut self) {
        self.map.clear();
        self.next_state = 0;
        self.next_edge = 0;
    }

    fn commit(&mut self) -> Result<(), DedupError> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

// ============================================================================
// Shared (concurrent)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct SharedDedup {
    map: Arc<DashMap<StateHash, StateId, ahash::RandomState>>,
    next_state: Arc<AtomicU64>,
    next_edge: Arc<AtomicU64>,
    /// Claims since the last commit, across all clones.
    pending: Arc<AtomicUsize>,
}

impl SharedDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh claims not yet committed.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl DedupIndex for SharedDedup {
    fn claim(&mut self, hash: StateHash) -> Result<Claim, DedupError> {
        // The entry guard holds the shard lock, so allocation and insert are
        // one step for this hash.
        match self.map.entry(hash) {
            Entry::Occupied(e) => Ok(Claim::Existing(*e.get())),
            Entry::Vacant(e) => {
                let issued = self.next_state.fetch_add(1, Ordering::SeqCst);
                let id = StateId::new(checked_id("state", issued)?);
                e.insert(id);
                self.pending.fetch_add(1, Ordering::SeqCst);
                Ok(Claim::Fresh(id))
            }
        }
    }

    fn next_edge(&mut self) -> Result<EdgeId, DedupError> {
        let issued = self.next_edge.fetch_add(1, Ordering::SeqCst);
        Ok(EdgeId::new(checked_id("edge", issued)?))
    }

    fn lookup(&self, hash: StateHash) -> Option<StateId> {
        self.map.get(&hash).map(|id| *id)
    }

    fn clear(&mut self) {
        self.map.clear();
        self.next_state.store(0, Ordering::SeqCst);
        self.next_edge.store(0, Ordering::SeqCst);
        self.pending.store(0, Ordering::SeqCst);
    }

    fn commit(&mut self) -> Result<(), DedupError> {
        let committed = self.pending.swap(0, Ordering::SeqCst);
        tracing::debug!(committed, total = self.map.len(), "committed shared dedup batch");
        Ok(())
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
