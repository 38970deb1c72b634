//! Exploit catalog documents.
//!
//! Conditions name parameter slots, not assets:
//!
//! ```json
//! { "type": "quality",  "param": 0, "property": "root", "value": "true" }
//! { "type": "topology", "from": 0, "to": 1, "dir": "->", "property": "connected", "value": "true" }
//! ```
//!
//! Postconditions carry the same shape plus an `action`.

use serde::{Deserialize, Serialize};

use crate::network::{default_dir, default_op};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploitCatalog {
    #[serde(default)]
    pub exploits: Vec<ExploitSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploitSpec {
    pub name: String,
    pub params: usize,
    #[serde(default)]
    pub preconditions: Vec<ConditionSpec>,
    #[serde(default)]
    pub postconditions: Vec<PostconditionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionSpec {
    Quality {
        param: u32,
        property: String,
        #[serde(default = "default_op")]
        op: String,
        value: String,
    },
    Topology {
        from: u32,
        to: u32,
        #[serde(default = "default_dir")]
        dir: String,
        property: String,
        #[serde(default = "default_op")]
        op: String,
        value: String,
    },
}

impl ConditionSpec {
    pub fn property(&self) -> &str {
        match self {
            Self::Quality { property, .. } | Self::Topology { property, .. } => property,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Quality { value, .. } | Self::Topology { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostconditionSpec {
    pub action: String,
    #[serde(flatten)]
    pub condition: ConditionSpec,
}
