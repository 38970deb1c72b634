//! Model ingestion for Aggen
//!
//! Reads a JSON network model and a JSON exploit catalog and compiles them
//! into a [`SearchInstance`]:
//! - asset names become asset indices in declaration order
//! - property/value strings are interned (initial qualities, then topologies,
//!   then exploit postconditions and preconditions)
//! - exploits get ids in catalog order
//!
//! Every malformed token is rejected here, before any search starts.

pub mod catalog;
pub mod network;

use aggen_core::fact::check_capacity;
use aggen_core::{
    Action, Asset, AssetId, Direction, Exploit, ExploitId, Interner, ModelError, Operator, ParamFact,
    ParamQuality, ParamSlot, ParamTopology, Postcondition, Quality, SearchInstance, Topology,
};
use ahash::AHashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use catalog::{ConditionSpec, ExploitCatalog, ExploitSpec, PostconditionSpec};
pub use network::{AssetSpec, NetworkModel, QualitySpec, TopologySpec};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {what}: {source}")]
    Json {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("network model declares no assets")]
    NoAssets,
    #[error("asset `{0}` is declared more than once")]
    DuplicateAsset(String),
    #[error("{context} references unknown asset `{name}`")]
    UnknownAsset { name: String, context: String },
    #[error("exploit `{exploit}`: {source}")]
    Exploit {
        exploit: String,
        #[source]
        source: ModelError,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

// ============================================================================
// Loading
// ============================================================================

pub fn parse_network(text: &str) -> Result<NetworkModel, IngestError> {
    serde_json::from_str(text).map_err(|source| IngestError::Json {
        what: "network model".to_string(),
        source,
    })
}

pub fn parse_catalog(text: &str) -> Result<ExploitCatalog, IngestError> {
    serde_json::from_str(text).map_err(|source| IngestError::Json {
        what: "exploit catalog".to_string(),
        source,
    })
}

pub fn load_network(path: &Path) -> Result<NetworkModel, IngestError> {
    let text = read(path)?;
    serde_json::from_str(&text).map_err(|source| IngestError::Json {
        what: path.display().to_string(),
        source,
    })
}

pub fn load_catalog(path: &Path) -> Result<ExploitCatalog, IngestError> {
    let text = read(path)?;
    serde_json::from_str(&text).map_err(|source| IngestError::Json {
        what: path.display().to_string(),
        source,
    })
}

/// Load both documents and compile them.
pub fn load_instance(network: &Path, catalog: &Path) -> Result<SearchInstance, IngestError> {
    let model = load_network(network)?;
    let exploits = load_catalog(catalog)?;
    info!(
        network = %network.display(),
        catalog = %catalog.display(),
        assets = model.assets.len(),
        facts = model.fact_count(),
        exploits = exploits.exploits.len(),
        "loaded model"
    );
    compile(&model, &exploits)
}

fn read(path: &Path) -> Result<String, IngestError> {
    std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Compilation
// ============================================================================

/// Resolve names, intern strings, parse tokens, and build exploits.
pub fn compile(model: &NetworkModel, catalog: &ExploitCatalog) -> Result<SearchInstance, IngestError> {
    if model.assets.is_empty() {
        return Err(IngestError::NoAssets);
    }

    let mut names = NameIndex::default();
    for (i, asset) in model.assets.iter().enumerate() {
        if !names.insert(&asset.name, AssetId::new(i as u32)) {
            return Err(IngestError::DuplicateAsset(asset.name.clone()));
        }
    }

    // Fix code order up front; later `intern` calls only return existing codes.
    let mut interner = intern_all(model, catalog);

    let mut assets = Vec::with_capacity(model.assets.len());
    let mut initial_qualities = Vec::new();
    for (i, spec) in model.assets.iter().enumerate() {
        let id = AssetId::new(i as u32);
        let mut qualities = Vec::with_capacity(spec.qualities.len());
        for q in &spec.qualities {
            qualities.push(Quality::new(
                id,
                interner.intern(&q.property),
                Operator::parse(&q.op)?,
                interner.intern(&q.value),
            ));
        }
        initial_qualities.extend(qualities.iter().copied());
        assets.push(Asset {
            id,
            name: spec.name.clone(),
            qualities,
        });
    }

    let mut initial_topologies = Vec::with_capacity(model.topologies.len());
    for t in &model.topologies {
        let context = || format!("topology {} {} {}", t.from, t.dir, t.to);
        initial_topologies.push(Topology::new(
            names.resolve(&t.from, context)?,
            names.resolve(&t.to, context)?,
            Direction::parse(&t.dir)?,
            interner.intern(&t.property),
            Operator::parse(&t.op)?,
            interner.intern(&t.value),
        ));
    }

    let mut exploits = Vec::with_capacity(catalog.exploits.len());
    for (i, spec) in catalog.exploits.iter().enumerate() {
        let exploit =
            compile_exploit(ExploitId::new(i as u32), spec, &mut interner).map_err(|source| IngestError::Exploit {
                exploit: spec.name.clone(),
                source,
            })?;
        exploits.push(exploit);
    }

    check_capacity(assets.len(), interner.len())?;

    debug!(
        assets = assets.len(),
        qualities = initial_qualities.len(),
        topologies = initial_topologies.len(),
        exploits = exploits.len(),
        interned = interner.len(),
        "compiled search instance"
    );

    Ok(SearchInstance {
        interner,
        initial_qualities,
        initial_topologies,
        assets,
        exploits,
    })
}

fn intern_all(model: &NetworkModel, catalog: &ExploitCatalog) -> Interner {
    let mut interner = Interner::new();
    for q in model.assets.iter().flat_map(|a| &a.qualities) {
        interner.intern(&q.property);
        interner.intern(&q.value);
    }
    for t in &model.topologies {
        interner.intern(&t.property);
        interner.intern(&t.value);
    }
    for exploit in &catalog.exploits {
        let conditions = exploit
            .postconditions
            .iter()
            .map(|p| &p.condition)
            .chain(&exploit.preconditions);
        for c in conditions {
            interner.intern(c.property());
            interner.intern(c.value());
        }
    }
    interner
}

fn compile_exploit(id: ExploitId, spec: &ExploitSpec, interner: &mut Interner) -> Result<Exploit, ModelError> {
    let mut preconditions = Vec::with_capacity(spec.preconditions.len());
    for c in &spec.preconditions {
        preconditions.push(compile_condition(c, interner)?);
    }
    let mut postconditions = Vec::with_capacity(spec.postconditions.len());
    for p in &spec.postconditions {
        postconditions.push(Postcondition {
            action: Action::parse(&p.action)?,
            fact: compile_condition(&p.condition, interner)?,
        });
    }
    Exploit::new(id, spec.name.clone(), spec.params, preconditions, postconditions)
}

fn compile_condition(condition: &ConditionSpec, interner: &mut Interner) -> Result<ParamFact, ModelError> {
    Ok(match condition {
        ConditionSpec::Quality {
            param,
            property,
            op,
            value,
        } => ParamFact::Quality(ParamQuality {
            param: ParamSlot::new(*param),
            property: interner.intern(property),
            op: Operator::parse(op)?,
            value: interner.intern(value),
        }),
        ConditionSpec::Topology {
            from,
            to,
            dir,
            property,
            op,
            value,
        } => ParamFact::Topology(ParamTopology {
            from: ParamSlot::new(*from),
            to: ParamSlot::new(*to),
            dir: Direction::parse(dir)?,
            property: interner.intern(property),
            op: Operator::parse(op)?,
            value: interner.intern(value),
        }),
    })
}

/// Asset name → index.
#[derive(Debug, Default)]
struct NameIndex {
    ids: AHashMap<String, AssetId>,
}

impl NameIndex {
    /// False if the name was already taken.
    fn insert(&mut self, name: &str, id: AssetId) -> bool {
        if self.ids.contains_key(name) {
            return false;
        }
        self.ids.insert(name.to_string(), id);
        true
    }

    fn resolve(&self, name: &str, context: impl FnOnce() -> String) -> Result<AssetId, IngestError> {
        self.ids.get(name).copied().ok_or_else(|| IngestError::UnknownAsset {
            name: name.to_string(),
            context: context(),
        })
    }
}
