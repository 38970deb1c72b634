//! Aggen attack graph storage
//!
//! Holds a finished (or in-progress) attack graph as relational-shaped tables:
//!
//! ```text
//! factbase            (id, hash)
//! factbase_item       (factbase_id, code, kind)
//! edge                (id, from, to, exploit_id)
//! edge_asset_binding  (edge_id, slot, asset)
//! keyvalue            (code, string)
//! ```
//!
//! Tables live in memory behind a lock, are written to a JSON snapshot file,
//! and can be fed incrementally during search through [`CheckpointSink`]. When
//! a checkpoint log is attached, every flush is also appended to it so an
//! interrupted run can be recovered on the next [`GraphStore::open`].

pub mod persistence;


use aggen_core::{
    AssetId, Assignment, CheckpointSink, Code, Edge, EdgeId, ExploitId, FactCode, FactKind, Interner,
    NetworkState, SearchResult, StateHash, StateId,
};
use ahash::{AHashMap, AHashSet};
use anyhow::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use aggen_core::EdgeRow;
pub use persistence::{CheckpointLog, CheckpointRecord};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("store holds no factbases; run `generate` first")]
    Empty,
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactbaseRow {
    pub id: StateId,
    pub hash: StateHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactbaseItemRow {
    pub factbase_id: StateId,
    pub code: FactCode,
    pub kind: FactKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAssetBindingRow {
    pub edge_id: EdgeId,
    pub slot: u32,
    pub asset: AssetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueRow {
    pub code: Code,
    pub string: String,
}

/// Vertex ids and edge rows, sorted, as the reduction pass consumes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphInfo {
    pub vertices: Vec<StateId>,
    pub edges: Vec<EdgeRow>,
}

/// Identity of an edge for duplicate suppression.
type EdgeKey = (StateId, StateId, ExploitId, Vec<AssetId>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    pub factbase: Vec<FactbaseRow>,
    pub factbase_item: Vec<FactbaseItemRow>,
    pub edge: Vec<EdgeRow>,
    pub edge_asset_binding: Vec<EdgeAssetBindingRow>,
    pub keyvalue: Vec<KeyValueRow>,
    #[serde(default)]
    pub elapsed_seconds: f64,

    #[serde(skip)]
    known_factbases: AHashSet<StateId>,
    #[serde(skip)]
    known_edges: AHashSet<EdgeKey>,
}

impl Tables {
    /// Rows for newly discovered states and edges.
    pub fn rows_for(states: &[NetworkState], edges: &[Edge]) -> CheckpointRecord {
        let mut record = CheckpointRecord::default();
        for state in states {
            let Some(id) = state.id() else { continue };
            record.factbases.push(FactbaseRow { id, hash: state.hash() });
            record
                .items
                .extend(state.factbase().encodings().map(|(code, kind)| FactbaseItemRow {
                    factbase_id: id,
                    code,
                    kind,
                }));
        }
        for edge in edges {
            record.edges.push(EdgeRow {
                id: edge.id,
                from: edge.from,
                to: edge.to,
                exploit: edge.exploit,
            });
            record
                .bindings
                .extend(edge.binding.iter().map(|(slot, asset)| EdgeAssetBindingRow {
                    edge_id: edge.id,
                    slot: slot.index() as u32,
                    asset,
                }));
        }
        record
    }

    /// Add a record's rows, skipping factbases already present and edges
    /// that duplicate an existing `(from, to, exploit, binding)`.
    pub fn merge(&mut self, record: CheckpointRecord) -> (usize, usize) {
        let CheckpointRecord {
            factbases,
            items,
            edges,
            bindings,
            keyvalue,
        } = record;

        if !keyvalue.is_empty() {
            self.keyvalue = keyvalue;
        }

        let mut fresh_states = AHashSet::new();
        for row in factbases {
            if self.known_factbases.insert(row.id) {
                fresh_states.insert(row.id);
                self.factbase.push(row);
            }
        }
        self.factbase_item
            .extend(items.into_iter().filter(|i| fresh_states.contains(&i.factbase_id)));

        let mut by_edge: AHashMap<EdgeId, Vec<EdgeAssetBindingRow>> = AHashMap::new();
        for b in bindings {
            by_edge.entry(b.edge_id).or_default().push(b);
        }

        let mut fresh_edges = 0;
        for row in edges {
            let mut binding = by_edge.remove(&row.id).unwrap_or_default();
            binding.sort_by_key(|b| b.slot);
            let key = (row.from, row.to, row.exploit, binding.iter().map(|b| b.asset).collect());
            if self.known_edges.insert(key) {
                self.edge.push(row);
                self.edge_asset_binding.extend(binding);
                fresh_edges += 1;
            }
        }

        (fresh_states.len(), fresh_edges)
    }

    /// Rebuild the lookup sets after deserializing or deleting rows.
    fn reindex(&mut self) {
        self.known_factbases = self.factbase.iter().map(|f| f.id).collect();

        let mut by_edge: AHashMap<EdgeId, Vec<&EdgeAssetBindingRow>> = AHashMap::new();
        for b in &self.edge_asset_binding {
            by_edge.entry(b.edge_id).or_default().push(b);
        }
        let mut known_edges = AHashSet::with_capacity(self.edge.len());
        for e in &self.edge {
            let mut binding = by_edge.remove(&e.id).unwrap_or_default();
            binding.sort_by_key(|b| b.slot);
            known_edges.insert((e.from, e.to, e.exploit, binding.iter().map(|b| b.asset).collect()));
        }
        self.known_edges = known_edges;
    }

    /// The binding stored for `edge`, in slot order.
    pub fn binding_of(&self, edge: EdgeId) -> Assignment {
        let mut rows: Vec<&EdgeAssetBindingRow> =
            self.edge_asset_binding.iter().filter(|b| b.edge_id == edge).collect();
        rows.sort_by_key(|b| b.slot);
        Assignment::new(rows.into_iter().map(|b| b.asset).collect())
    }

    fn set_keyvalue(&mut self, interner: &Interner) {
        self.keyvalue = interner
            .entries()
            .map(|(code, s)| KeyValueRow {
                code,
                string: s.to_string(),
            })
            .collect();
    }
}

// ============================================================================
// Store Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot file
    pub path: PathBuf,
    /// Append every checkpoint to `<path>.log` and replay it on open. A new
    /// store with a log removes any snapshot left at `path`, so a recovered
    /// run never mixes with an older one.
    pub checkpoint_log: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("attack_graph.json"),
            checkpoint_log: false,
        }
    }
}

impl StoreConfig {
    pub fn log_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".log");
        PathBuf::from(name)
    }
}

// ============================================================================
// Graph Store
// ============================================================================

pub struct GraphStore {
    config: StoreConfig,
    tables: Arc<RwLock<Tables>>,
    log: Option<CheckpointLog>,
}

impl GraphStore {
    /// Empty store; nothing is read from disk. With a checkpoint log the log
    /// is truncated and any snapshot at `path` is removed.
    pub fn new(config: StoreConfig) -> anyhow::Result<Self> {
        let log = if config.checkpoint_log {
            let log = CheckpointLog::open(&config.log_path())
                .with_context(|| format!("opening checkpoint log {}", config.log_path().display()))?;
            log.truncate()?;
            if config.path.exists() {
                std::fs::remove_file(&config.path)
                    .with_context(|| format!("removing stale snapshot {}", config.path.display()))?;
                tracing::info!(path = %config.path.display(), "removed snapshot of a previous run");
            }
            Some(log)
        } else {
            None
        };
        Ok(Self {
            config,
            tables: Arc::new(RwLock::new(Tables::default())),
            log,
        })
    }

    /// Load the snapshot if present, then replay any checkpoint log left by
    /// an interrupted run.
    pub fn open(config: StoreConfig) -> anyhow::Result<Self> {
        let mut tables = if config.path.exists() {
            load_tables(&config.path)?
        } else {
            Tables::default()
        };

        let log = if config.checkpoint_log {
            let log = CheckpointLog::open(&config.log_path())
                .with_context(|| format!("opening checkpoint log {}", config.log_path().display()))?;
            let replayed = log.replay(|record| {
                tables.merge(record);
                Ok(())
            })?;
            if replayed > 0 {
                tracing::info!(
                    records = replayed,
                    factbases = tables.factbase.len(),
                    edges = tables.edge.len(),
                    "recovered checkpoints"
                );
            }
            Some(log)
        } else {
            None
        };

        Ok(Self {
            config,
            tables: Arc::new(RwLock::new(tables)),
            log,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn tables(&self) -> Arc<RwLock<Tables>> {
        Arc::clone(&self.tables)
    }

    pub fn factbase_count(&self) -> usize {
        self.tables.read().factbase.len()
    }

    pub fn edge_count(&self) -> usize {
        self.tables.read().edge.len()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.tables.read().elapsed_seconds
    }

    // ========================================================================
    // Write Operations
    // ========================================================================

    /// Record the string table used to decode fact codes. It is logged as
    /// well, so a recovered run can still decode its items.
    pub fn record_interner(&self, interner: &Interner) -> anyhow::Result<()> {
        let mut tables = self.tables.write();
        tables.set_keyvalue(interner);
        if let Some(log) = &self.log {
            let record = CheckpointRecord {
                keyvalue: tables.keyvalue.clone(),
                ..CheckpointRecord::default()
            };
            log.append(&record)
                .with_context(|| format!("appending to {}", log.path().display()))?;
        }
        Ok(())
    }

    /// Append newly discovered states and edges.
    pub fn append(&self, states: &[NetworkState], edges: &[Edge]) -> anyhow::Result<(usize, usize)> {
        let record = Tables::rows_for(states, edges);
        if record.is_empty() {
            return Ok((0, 0));
        }
        if let Some(log) = &self.log {
            log.append(&record)
                .with_context(|| format!("appending to {}", log.path().display()))?;
        }
        Ok(self.tables.write().merge(record))
    }

    /// Replace the tables with a complete search result.
    pub fn save_search_result(&self, result: &SearchResult) -> anyhow::Result<()> {
        let record = Tables::rows_for(&result.states, &result.edges);
        let mut tables = Tables::default();
        tables.set_keyvalue(&result.interner);
        let (states, edges) = tables.merge(record);
        tables.elapsed_seconds = result.elapsed.as_secs_f64();

        if edges < result.edges.len() {
            tracing::debug!(
                duplicates = result.edges.len() - edges,
                "dropped duplicate edge rows"
            );
        }
        tracing::info!(factbases = states, edges, "stored search result");

        *self.tables.write() = tables;
        Ok(())
    }

    /// Remove edges (and their bindings) by id; returns how many were removed.
    pub fn delete_edges(&self, ids: &[EdgeId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let doomed: AHashSet<EdgeId> = ids.iter().copied().collect();
        let mut tables = self.tables.write();
        let before = tables.edge.len();
        tables.edge.retain(|e| !doomed.contains(&e.id));
        tables.edge_asset_binding.retain(|b| !doomed.contains(&b.edge_id));
        tables.reindex();
        before - tables.edge.len()
    }

    /// Write the snapshot file and truncate the checkpoint log.
    pub fn save(&self) -> anyhow::Result<()> {
        let json = {
            let tables = self.tables.read();
            serde_json::to_string_pretty(&*tables)?
        };
        if let Some(parent) = self.config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config.path, json)
            .with_context(|| format!("writing {}", self.config.path.display()))?;
        if let Some(log) = &self.log {
            log.truncate()?;
        }
        Ok(())
    }

    // ========================================================================
    // Read Operations
    // ========================================================================

    /// Sorted vertex ids and edge rows for the reduction pass.
    pub fn fetch_graph_info(&self) -> Result<GraphInfo, FetchError> {
        let tables = self.tables.read();
        if tables.factbase.is_empty() {
            return Err(FetchError::Empty);
        }
        let mut vertices: Vec<StateId> = tables.factbase.iter().map(|f| f.id).collect();
        vertices.sort_unstable();
        let mut edges = tables.edge.clone();
        edges.sort_unstable_by_key(|e| e.id);
        Ok(GraphInfo { vertices, edges })
    }

    /// Fact encodings stored for one factbase, in stored order.
    pub fn factbase_items(&self, id: StateId) -> Vec<(FactCode, FactKind)> {
        self.tables
            .read()
            .factbase_item
            .iter()
            .filter(|i| i.factbase_id == id)
            .map(|i| (i.code, i.kind))
            .collect()
    }

    /// The interning table rebuilt from `keyvalue` rows.
    pub fn interner(&self) -> Interner {
        let tables = self.tables.read();
        let mut rows: Vec<&KeyValueRow> = tables.keyvalue.iter().collect();
        rows.sort_by_key(|r| r.code);
        Interner::populate(rows.into_iter().map(|r| r.string.as_str()))
    }
}

impl CheckpointSink for GraphStore {
    fn flush(&mut self, states: &[NetworkState], edges: &[Edge]) -> anyhow::Result<()> {
        let (new_states, new_edges) = self.append(states, edges)?;
        tracing::debug!(new_states, new_edges, "checkpoint stored");
        Ok(())
    }
}

fn load_tables(path: &Path) -> anyhow::Result<Tables> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut tables: Tables =
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    tables.reindex();
    Ok(tables)
}

/// Open an existing snapshot at `path`.
pub fn open_store(path: impl Into<PathBuf>) -> anyhow::Result<GraphStore> {
    GraphStore::open(StoreConfig {
        path: path.into(),
        ..Default::default()
    })
}
