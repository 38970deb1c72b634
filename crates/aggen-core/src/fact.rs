//! Concrete facts: qualities (one asset) and topologies (an ordered asset pair).
//!
//! Facts carry interned codes only; strings live in the [`Interner`](crate::Interner).
//! Each fact also has a packed 64-bit encoding used for hashing and for the
//! `factbase_item` rows written by persistence:
//!
//! ```text
//! quality : [asset:16][property:13][op:3][value:13]                  (45 bits)
//! topology: [from:16][to:16][dir:2][property:13][op:3][value:13]     (63 bits)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::exploit::ModelError;
use crate::{AssetId, Code, Interner, LookupError};

/// Largest asset count representable in a fact encoding.
pub const MAX_ASSETS: usize = 1 << ASSET_BITS;
/// Largest interning table representable in a fact encoding.
pub const MAX_CODES: usize = 1 << CODE_BITS;

const ASSET_BITS: u32 = 16;
const CODE_BITS: u32 = 13;
const OP_BITS: u32 = 3;
const DIR_BITS: u32 = 2;

/// Check that a model of this size fits the packed encoding.
pub fn check_capacity(assets: usize, codes: usize) -> Result<(), ModelError> {
    if assets > MAX_ASSETS {
        return Err(ModelError::CapacityExceeded {
            what: "assets",
            count: assets,
            limit: MAX_ASSETS,
        });
    }
    if codes > MAX_CODES {
        return Err(ModelError::CapacityExceeded {
            what: "interned strings",
            count: codes,
            limit: MAX_CODES,
        });
    }
    Ok(())
}

fn check_field(field: &'static str, value: u32, limit: usize) -> Result<(), ModelError> {
    if value as usize >= limit {
        return Err(ModelError::FieldOutOfRange { field, value, limit });
    }
    Ok(())
}

pub(crate) fn check_code(field: &'static str, code: Code) -> Result<(), ModelError> {
    check_field(field, code.raw(), MAX_CODES)
}

// ============================================================================
// Tokens
// ============================================================================

/// Comparison operator carried by a fact. Facts match by identity, so the
/// operator is part of what must be present, not something evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn parse(token: &str) -> Result<Self, ModelError> {
        match token.trim() {
            "=" | "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            other => Err(ModelError::UnknownOperator(other.to_string())),
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn bits(self) -> u64 {
        self as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
    Bidirectional,
}

impl Direction {
    pub fn parse(token: &str) -> Result<Self, ModelError> {
        match token.trim() {
            "->" => Ok(Self::Forward),
            "<-" => Ok(Self::Backward),
            "<->" => Ok(Self::Bidirectional),
            other => Err(ModelError::UnknownDirection(other.to_string())),
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Forward => "->",
            Self::Backward => "<-",
            Self::Bidirectional => "<->",
        }
    }

    fn bits(self) -> u64 {
        self as u64
    }
}

// ============================================================================
// Facts
// ============================================================================

/// Packed fact encoding (see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactCode(u64);

impl FactCode {
    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Quality,
    Topology,
}

impl FactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Topology => "topology",
        }
    }
}

/// One attribute of one asset. Field order matters: facts sharing
/// `(asset, property)` sort next to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quality {
    pub asset: AssetId,
    pub property: Code,
    pub op: Operator,
    pub value: Code,
}

impl Quality {
    pub fn new(asset: AssetId, property: Code, op: Operator, value: Code) -> Self {
        Self {
            asset,
            property,
            op,
            value,
        }
    }

    /// Same `(asset, property)`; the key UPDATE and DELETE match on.
    pub fn same_key(&self, other: &Quality) -> bool {
        self.asset == other.asset && self.property == other.property
    }

    pub fn encoding(&self) -> FactCode {
        let mut bits = self.asset.raw() as u64;
        bits = (bits << CODE_BITS) | self.property.raw() as u64;
        bits = (bits << OP_BITS) | self.op.bits();
        bits = (bits << CODE_BITS) | self.value.raw() as u64;
        FactCode(bits)
    }

    /// Every field fits its slot in [`Quality::encoding`].
    pub fn check_encodable(&self) -> Result<(), ModelError> {
        check_field("asset index", self.asset.raw(), MAX_ASSETS)?;
        check_code("property code", self.property)?;
        check_code("value code", self.value)
    }

    pub fn display(&self, interner: &Interner) -> Result<String, LookupError> {
        Ok(format!(
            "quality {}: {} {} {}",
            self.asset.raw(),
            interner.string_of(self.property)?,
            self.op.token(),
            interner.string_of(self.value)?
        ))
    }
}

/// A relationship between two assets. The key for UPDATE and DELETE is
/// `(from, to, dir, property)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Topology {
    pub from: AssetId,
    pub to: AssetId,
    pub dir: Direction,
    pub property: Code,
    pub op: Operator,
    pub value: Code,
}

impl Topology {
    pub fn new(
        from: AssetId,
        to: AssetId,
        dir: Direction,
        property: Code,
        op: Operator,
        value: Code,
    ) -> Self {
        Self {
            from,
            to,
            dir,
            property,
            op,
            value,
        }
    }

    pub fn same_key(&self, other: &Topology) -> bool {
        self.from == other.from
            && self.to == other.to
            && self.dir == other.dir
            && self.property == other.property
    }

    pub fn encoding(&self) -> FactCode {
        let mut bits = self.from.raw() as u64;
        bits = (bits << ASSET_BITS) | self.to.raw() as u64;
        bits = (bits << DIR_BITS) | self.dir.bits();
        bits = (bits << CODE_BITS) | self.property.raw() as u64;
        bits = (bits << OP_BITS) | self.op.bits();
        bits = (bits << CODE_BITS) | self.value.raw() as u64;
        FactCode(bits)
    }

    pub fn check_encodable(&self) -> Result<(), ModelError> {
        check_field("asset index", self.from.raw(), MAX_ASSETS)?;
        check_field("asset index", self.to.raw(), MAX_ASSETS)?;
        check_code("property code", self.property)?;
        check_code("value code", self.value)
    }

    pub fn display(&self, interner: &Interner) -> Result<String, LookupError> {
        Ok(format!(
            "topology {} {} {}: {} {} {}",
            self.from.raw(),
            self.dir.token(),
            self.to.raw(),
            interner.string_of(self.property)?,
            self.op.token(),
            interner.string_of(self.value)?
        ))
    }
}

/// Either kind of concrete fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fact {
    Quality(Quality),
    Topology(Topology),
}

impl Fact {
    pub fn kind(&self) -> FactKind {
        match self {
            Self::Quality(_) => FactKind::Quality,
            Self::Topology(_) => FactKind::Topology,
        }
    }

    pub fn encoding(&self) -> FactCode {
        match self {
            Self::Quality(q) => q.encoding(),
            Self::Topology(t) => t.encoding(),
        }
    }
}

impl From<Quality> for Fact {
    fn from(q: Quality) -> Self {
        Self::Quality(q)
    }
}

impl From<Topology> for Fact {
    fn from(t: Topology) -> Self {
        Self::Topology(t)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quality(q) => write!(
                f,
                "q({}, #{} {} #{})",
                q.asset.raw(),
                q.property.raw(),
                q.op.token(),
                q.value.raw()
            ),
            Self::Topology(t) => write!(
                f,
                "t({} {} {}, #{} {} #{})",
                t.from.raw(),
                t.dir.token(),
                t.to.raw(),
                t.property.raw(),
                t.op.token(),
                t.value.raw()
            ),
        }
    }
}

/// A named asset with the qualities it starts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub qualities: Vec<Quality>,
}
