//! Frontier-driven attack graph generation.
//!
//! Each iteration dequeues one state and runs two phases:
//!
//! 1. **Match** (read-only, parallel): every `(exploit, binding)` pair whose
//!    hypothesis is fully present in the state qualifies. Qualifying pairs are
//!    collected in `(exploit, binding)` order regardless of worker count.
//! 2. **Apply** (sequential, single writer): each qualifying pair produces a
//!    successor. A successor whose hash equals the source is dropped. An unseen
//!    hash gets the next identity, joins the frontier and gets an edge. A seen
//!    hash only gets an edge to the existing identity.
//!
//! The frontier is FIFO, so identities follow breadth-first discovery order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::dedup::{Claim, DedupError, DedupIndex, MemoryDedup};
use crate::exploit::{AssetBinding, Exploit, ModelError};
use crate::fact::{self, Asset, Quality, Topology};
use crate::factbase::{Factbase, NetworkState};
use crate::permutation::{Assignment, PermutationCache, PermutationError};
use crate::{EdgeId, ExploitId, Interner, StateId};

/// Upper bound on match-phase workers when none is configured.
pub const DEFAULT_MAX_WORKERS: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Permutation(#[from] PermutationError),
    #[error(transparent)]
    Dedup(#[from] DedupError),
    #[error("failed to build match-phase thread pool: {0}")]
    ThreadPool(String),
    #[error("checkpoint flush failed: {0:#}")]
    Checkpoint(anyhow::Error),
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Flush to the checkpoint sink every time this many new states have
    /// been discovered. `None` flushes only once, at the end.
    pub batch_size: Option<usize>,
    /// Upper bound on match-phase workers.
    pub threads: usize,
    /// Pre-allocated frontier capacity.
    pub initial_queue_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            threads: DEFAULT_MAX_WORKERS,
            initial_queue_capacity: 1024,
        }
    }
}

/// Workers for one match phase: one below two candidates, one per candidate
/// up to the bound, the bound beyond that.
pub fn worker_count(candidates: usize, max_workers: usize) -> usize {
    let max_workers = max_workers.max(1);
    if candidates < 2 {
        1
    } else {
        candidates.min(max_workers)
    }
}

// ============================================================================
// Inputs and outputs
// ============================================================================

/// Everything the search needs, fully materialized.
#[derive(Debug, Clone, Default)]
pub struct SearchInstance {
    pub interner: Interner,
    pub initial_qualities: Vec<Quality>,
    pub initial_topologies: Vec<Topology>,
    pub assets: Vec<Asset>,
    pub exploits: Vec<Exploit>,
}

/// "Applying `exploit` with `binding` turns `from` into `to`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: StateId,
    pub to: StateId,
    pub exploit: ExploitId,
    pub binding: Assignment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub interner: Interner,
    /// Discovered states in identity order.
    pub states: Vec<NetworkState>,
    pub edges: Vec<Edge>,
    pub elapsed: Duration,
}

impl SearchResult {
    /// The state this search claimed under `id`. States are stored in
    /// ascending identity order.
    pub fn state(&self, id: StateId) -> Option<&NetworkState> {
        self.states
            .binary_search_by_key(&Some(id), NetworkState::id)
            .ok()
            .map(|i| &self.states[i])
    }
}

/// Receives newly discovered states and edges while the search runs.
pub trait CheckpointSink {
    fn flush(&mut self, states: &[NetworkState], edges: &[Edge]) -> anyhow::Result<()>;
}

/// A sink that drops everything.
pub struct NoCheckpoint;

impl CheckpointSink for NoCheckpoint {
    fn flush(&mut self, _states: &[NetworkState], _edges: &[Edge]) -> anyhow::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Generator
// ============================================================================

pub struct Generator<D: DedupIndex = MemoryDedup> {
    interner: Interner,
    initial: Factbase,
    exploits: Vec<Exploit>,
    /// Bindings per exploit, in permutation order.
    bindings: Vec<Vec<AssetBinding>>,
    /// Flattened `(exploit index, binding index)` match candidates.
    candidates: Vec<(usize, usize)>,
    config: SearchConfig,
    dedup: D,
    pool: Option<rayon::ThreadPool>,
}

impl Generator<MemoryDedup> {
    pub fn new(instance: SearchInstance, config: SearchConfig) -> Result<Self, SearchError> {
        Self::with_dedup(instance, config, MemoryDedup::new())
    }
}

impl<D: DedupIndex> Generator<D> {
    /// Validate the instance, precompute every binding, and size the worker pool.
    pub fn with_dedup(instance: SearchInstance, config: SearchConfig, dedup: D) -> Result<Self, SearchError> {
        let SearchInstance {
            interner,
            initial_qualities,
            initial_topologies,
            assets,
            exploits,
        } = instance;

        fact::check_capacity(assets.len(), interner.len())?;
        for quality in &initial_qualities {
            quality.check_encodable()?;
        }
        for topology in &initial_topologies {
            topology.check_encodable()?;
        }
        for exploit in &exploits {
            exploit.check_encodable()?;
        }

        let mut permutations = PermutationCache::new(assets.len());
        let mut bindings = Vec::with_capacity(exploits.len());
        for exploit in &exploits {
            let assignments = permutations.get(exploit.params())?;
            let bound: Vec<AssetBinding> = assignments
                .iter()
                .map(|assignment| exploit.bind(assignment.clone()))
                .collect();
            bindings.push(bound);
        }

        let candidates: Vec<(usize, usize)> = bindings
            .iter()
            .enumerate()
            .flat_map(|(e, bound)| (0..bound.len()).map(move |b| (e, b)))
            .collect();

        let workers = worker_count(candidates.len(), config.threads);
        let pool = if workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("aggen-match-{i}"))
                .build()
                .map_err(|e| SearchError::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        info!(
            assets = assets.len(),
            exploits = exploits.len(),
            interned = interner.len(),
            permutation_sets = permutations.len(),
            candidates = candidates.len(),
            workers,
            "prepared attack graph search"
        );

        Ok(Self {
            interner,
            initial: Factbase::new(initial_qualities, initial_topologies),
            exploits,
            bindings,
            candidates,
            config,
            dedup,
            pool,
        })
    }

    pub fn exploits(&self) -> &[Exploit] {
        &self.exploits
    }

    /// Number of `(exploit, binding)` pairs tested per state.
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn run(self) -> Result<SearchResult, SearchError> {
        self.run_with_checkpoints(&mut NoCheckpoint)
    }

    /// Search until the frontier is empty, flushing to `sink` on the
    /// configured cadence and once at the end.
    ///
    /// Only states this run claims from the dedup index are expanded and
    /// returned. On a fresh index that is every reachable state, starting at
    /// identity 0. If the initial state was already claimed through a shared
    /// index, the run finds nothing of its own to do.
    pub fn run_with_checkpoints(mut self, sink: &mut dyn CheckpointSink) -> Result<SearchResult, SearchError> {
        let start = Instant::now();
        info!("generating attack graph");

        let mut initial = NetworkState::new(std::mem::take(&mut self.initial));
        let mut states = Vec::new();
        let mut edges: Vec<Edge> = Vec::new();
        let mut frontier = VecDeque::with_capacity(self.config.initial_queue_capacity.max(1));

        match self.dedup.claim(initial.hash())? {
            Claim::Fresh(id) => {
                initial.set_id(id);
                states.push(initial.clone());
                frontier.push_back(initial);
            }
            Claim::Existing(id) => {
                info!(state = %id, "initial state already claimed");
            }
        }
        self.dedup.commit()?;

        let mut flushed_states = 0usize;
        let mut flushed_edges = 0usize;

        while let Some(current) = frontier.pop_front() {
            let Some(current_id) = current.id() else {
                continue;
            };
            let applicable = self.applicable(&current);
            trace!(state = %current_id, applicable = applicable.len(), "expanding state");

            for (e, b) in applicable {
                let exploit = &self.exploits[e];
                let binding = &self.bindings[e][b];
                let effects = exploit.effects(&binding.assignment);
                let mut successor = current.successor(&effects);

                if successor.hash() == current.hash() {
                    continue;
                }

                let to = match self.dedup.claim(successor.hash())? {
                    Claim::Fresh(id) => {
                        successor.set_id(id);
                        frontier.push_back(successor.clone());
                        states.push(successor);
                        id
                    }
                    Claim::Existing(id) => id,
                };

                edges.push(Edge {
                    id: self.dedup.next_edge()?,
                    from: current_id,
                    to,
                    exploit: exploit.id(),
                    binding: binding.assignment.clone(),
                });
            }

            if let Some(batch) = self.config.batch_size.filter(|&b| b > 0) {
                if states.len() - flushed_states >= batch {
                    self.checkpoint(sink, &states[flushed_states..], &edges[flushed_edges..])?;
                    flushed_states = states.len();
                    flushed_edges = edges.len();
                    info!(
                        states = states.len(),
                        edges = edges.len(),
                        frontier = frontier.len(),
                        "checkpoint"
                    );
                }
            }
        }

        self.checkpoint(sink, &states[flushed_states..], &edges[flushed_edges..])?;

        let elapsed = start.elapsed();
        info!(
            states = states.len(),
            edges = edges.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "attack graph complete"
        );

        Ok(SearchResult {
            interner: self.interner,
            states,
            edges,
            elapsed,
        })
    }

    /// Match phase: qualifying `(exploit index, binding index)` pairs in order.
    fn applicable(&self, state: &NetworkState) -> Vec<(usize, usize)> {
        let factbase = state.factbase();
        let bindings = &self.bindings;
        let candidates = &self.candidates;
        let holds = move |&&(e, b): &&(usize, usize)| bindings[e][b].holds_in(factbase);

        match &self.pool {
            Some(pool) => {
                let workers = pool.current_num_threads().max(1);
                let chunk = candidates.len().div_ceil(workers).max(1);
                pool.install(|| {
                    candidates
                        .par_iter()
                        .with_min_len(chunk)
                        .filter(holds)
                        .copied()
                        .collect()
                })
            }
            None => candidates.iter().filter(holds).copied().collect(),
        }
    }

    fn checkpoint(
        &mut self,
        sink: &mut dyn CheckpointSink,
        states: &[NetworkState],
        edges: &[Edge],
    ) -> Result<(), SearchError> {
        if states.is_empty() && edges.is_empty() {
            return Ok(());
        }
        sink.flush(states, edges).map_err(SearchError::Checkpoint)?;
        self.dedup.commit()?;
        debug!(states = states.len(), edges = edges.len(), "flushed checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exploit::{Action, ParamFact, ParamQuality, Postcondition};
    use crate::fact::Operator;
    use crate::{AssetId, Code, ParamSlot};

    /// Codes: 0 compromised, 1 true, 2 root.
    fn instance(exploits: Vec<Exploit>, initial: Vec<Quality>) -> SearchInstance {
        let interner = Interner::populate(["compromised", "true", "root"]);
        let assets = ["A", "B"]
            .iter()
            .enumerate()
            .map(|(i, name)| Asset {
                id: AssetId::new(i as u32),
                name: name.to_string(),
                qualities: initial
                    .iter()
                    .filter(|q| q.asset.index() == i)
                    .copied()
                    .collect(),
            })
            .collect();
        SearchInstance {
            interner,
            initial_qualities: initial,
            initial_topologies: vec![],
            assets,
            exploits,
        }
    }

    fn q(asset: u32, property: u32) -> Quality {
        Quality::new(AssetId::new(asset), Code::new(property), Operator::Eq, Code::new(1))
    }

    fn pq(property: u32) -> ParamFact {
        ParamFact::Quality(ParamQuality {
            param: ParamSlot::new(0),
            property: Code::new(property),
            op: Operator::Eq,
            value: Code::new(1),
        })
    }

    fn escalate() -> Exploit {
        Exploit::new(
            ExploitId::new(0),
            "escalate",
            1,
            vec![pq(0)],
            vec![Postcondition {
                action: Action::Add,
                fact: pq(2),
            }],
        )
        .unwrap()
    }

    #[test]
    fn worker_count_scales_with_candidates() {
        assert_eq!(worker_count(0, 32), 1);
        assert_eq!(worker_count(1, 32), 1);
        assert_eq!(worker_count(2, 32), 2);
        assert_eq!(worker_count(32, 32), 32);
        assert_eq!(worker_count(33, 32), 32);
        assert_eq!(worker_count(500, 4), 4);
        assert_eq!(worker_count(10, 0), 1);
    }

    #[test]
    fn single_escalation_adds_one_state_and_edge() {
        let result = Generator::new(instance(vec![escalate()], vec![q(0, 0)]), SearchConfig::default())
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(result.states.len(), 2);
        assert_eq!(result.edges.len(), 1);
        let edge = &result.edges[0];
        assert_eq!((edge.from, edge.to), (StateId::new(0), StateId::new(1)));
        assert_eq!(edge.binding.as_slice(), &[AssetId::new(0)]);
        assert!(result.states[1].factbase().contains_quality(&q(0, 2)));
    }

    #[test]
    fn exploit_without_preconditions_applies_to_every_binding() {
        let grant = Exploit::new(
            ExploitId::new(0),
            "grant",
            1,
            vec![],
            vec![Postcondition {
                action: Action::Add,
                fact: pq(2),
            }],
        )
        .unwrap();

        let result = Generator::new(instance(vec![grant], vec![]), SearchConfig::default())
            .unwrap()
            .run()
            .unwrap();

        // {}, {A}, {B}, {A,B}
        assert_eq!(result.states.len(), 4);
        assert!(result.edges.iter().all(|e| e.from != e.to));
    }

    #[test]
    fn checkpoints_see_every_state_and_edge_once() {
        struct Collect {
            states: usize,
            edges: usize,
            flushes: usize,
        }
        impl CheckpointSink for Collect {
            fn flush(&mut self, states: &[NetworkState], edges: &[Edge]) -> anyhow::Result<()> {
                self.states += states.len();
                self.edges += edges.len();
                self.flushes += 1;
                Ok(())
            }
        }

        let grant = Exploit::new(
            ExploitId::new(0),
            "grant",
            1,
            vec![],
            vec![Postcondition {
                action: Action::Add,
                fact: pq(2),
            }],
        )
        .unwrap();
        let config = SearchConfig {
            batch_size: Some(1),
            ..SearchConfig::default()
        };
        let mut sink = Collect {
            states: 0,
            edges: 0,
            flushes: 0,
        };
        let result = Generator::new(instance(vec![grant], vec![]), config)
            .unwrap()
            .run_with_checkpoints(&mut sink)
            .unwrap();

        assert_eq!(sink.states, result.states.len());
        assert_eq!(sink.edges, result.edges.len());
        assert!(sink.flushes > 1);
    }

    #[test]
    fn failing_checkpoint_aborts_the_search() {
        struct Refuse;
        impl CheckpointSink for Refuse {
            fn flush(&mut self, _: &[NetworkState], _: &[Edge]) -> anyhow::Result<()> {
                anyhow::bail!("disk full")
            }
        }

        let err = Generator::new(instance(vec![escalate()], vec![q(0, 0)]), SearchConfig::default())
            .unwrap()
            .run_with_checkpoints(&mut Refuse)
            .unwrap_err();
        assert!(matches!(err, SearchError::Checkpoint(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn empty_asset_list_is_rejected() {
        let mut inst = instance(vec![escalate()], vec![]);
        inst.assets.clear();
        assert!(matches!(
            Generator::new(inst, SearchConfig::default()),
            Err(SearchError::Permutation(PermutationError::NoAssets))
        ));
    }
}
