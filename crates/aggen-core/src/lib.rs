//! Aggen: attack-graph state-space generation
//!
//! Given an initial network description (per-asset *qualities* and inter-asset
//! *topologies*) and a catalog of parameterized exploits, the engine
//! enumerates every network state reachable by successively applying exploits
//! and records each application as an edge between two states.
//!
//! Key pieces:
//! 1. **String Interning**: property/value strings stored once, referenced by a `u32` code
//! 2. **Permutations**: every asset assignment for an exploit's parameter slots, cached per arity
//! 3. **Content hashing**: states are deduplicated by a deterministic hash of their facts
//! 4. **Frontier search**: breadth-first expansion with a parallel match phase
//!
//! ## Module Organization
//!
//! - `fact`: concrete qualities and topologies
//! - `factbase`: fact sets and hashed network states
//! - `exploit`: parameterized exploit templates and bindings
//! - `permutation`: parameter-slot → asset assignments
//! - `dedup`: pluggable hash → identity index
//! - `search`: the search driver
//! - `reduce`: back-edge removal over the finished id-level graph

pub mod dedup;
pub mod exploit;
pub mod fact;
pub mod factbase;
pub mod permutation;
pub mod reduce;
pub mod search;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export key types
pub use dedup::{Claim, DedupError, DedupIndex, MemoryDedup, SharedDedup};
pub use exploit::{Action, AssetBinding, Exploit, ModelError, ParamFact, ParamQuality, ParamTopology, Postcondition};
pub use fact::{Asset, Direction, Fact, FactCode, FactKind, Operator, Quality, Topology};
pub use factbase::{Factbase, NetworkState, StateHash};
pub use permutation::{Assignment, PermutationCache, PermutationError};
pub use reduce::{back_edges, is_acyclic, remove_back_edges, EdgeRow};
pub use search::{CheckpointSink, Edge, Generator, NoCheckpoint, SearchConfig, SearchError, SearchInstance, SearchResult};

// ============================================================================
// Identifiers
// ============================================================================

/// Index of an asset in the network model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(u32);

impl AssetId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position of a parameter in an exploit template (`0..params`).
///
/// Deliberately a different type from [`AssetId`]: a binding maps slots to
/// assets, and the two must never be swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSlot(u32);

impl ParamSlot {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Discovery-assigned state identity. The initial state is always `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(u32);

impl StateId {
    pub const INITIAL: StateId = StateId(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(u32);

impl EdgeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExploitId(u32);

impl ExploitId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ExploitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// String Interning (Compact Fact Storage)
// ============================================================================

/// Interned property/value code (4 bytes instead of 24+ for String)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(u32);

impl Code {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("no interned code for `{0}`")]
    UnknownString(String),
    #[error("code {code} out of range (table holds {len} strings)")]
    CodeOutOfRange { code: u32, len: usize },
}

/// Append-only string ↔ code table.
///
/// Codes are handed out in first-seen order. The table is filled once from the
/// model and exploit catalog, then only read during search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Interner {
    /// String to code mapping
    str_to_code: AHashMap<String, Code>,
    /// Code to string mapping (position == code)
    code_to_str: Vec<String>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from strings in order; repeats keep their first code.
    pub fn populate<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut interner = Self::new();
        for s in strings {
            interner.intern(s.as_ref());
        }
        interner
    }

    /// Intern a string, returning its code
    pub fn intern(&mut self, s: &str) -> Code {
        if let Some(code) = self.str_to_code.get(s) {
            return *code;
        }

        let code = Code(self.code_to_str.len() as u32);
        self.str_to_code.insert(s.to_string(), code);
        self.code_to_str.push(s.to_string());
        code
    }

    /// Look up an existing code without inserting.
    pub fn code_of(&self, s: &str) -> Result<Code, LookupError> {
        self.str_to_code
            .get(s)
            .copied()
            .ok_or_else(|| LookupError::UnknownString(s.to_string()))
    }

    /// Look up a string by code
    pub fn string_of(&self, code: Code) -> Result<&str, LookupError> {
        self.code_to_str
            .get(code.0 as usize)
            .map(String::as_str)
            .ok_or(LookupError::CodeOutOfRange {
                code: code.0,
                len: self.code_to_str.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.code_to_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_to_str.is_empty()
    }

    /// `(code, string)` pairs in code order.
    pub fn entries(&self) -> impl Iterator<Item = (Code, &str)> {
        self.code_to_str
            .iter()
            .enumerate()
            .map(|(i, s)| (Code(i as u32), s.as_str()))
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(bincode::serialize(&self.code_to_str)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let strings: Vec<String> = bincode::deserialize(bytes)?;
        Ok(Self::populate(strings))
    }
}

impl PartialEq for Interner {
    fn eq(&self, other: &Self) -> bool {
        self.code_to_str == other.code_to_str
    }
}

impl Eq for Interner {}

impl From<Vec<String>> for Interner {
    fn from(strings: Vec<String>) -> Self {
        Self::populate(strings)
    }
}

impl From<Interner> for Vec<String> {
    fn from(interner: Interner) -> Self {
        interner.code_to_str
    }
}
