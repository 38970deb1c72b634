//! Network model documents: assets, their qualities, and topologies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkModel {
    #[serde(default)]
    pub assets: Vec<AssetSpec>,
    #[serde(default)]
    pub topologies: Vec<TopologySpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub name: String,
    #[serde(default)]
    pub qualities: Vec<QualitySpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySpec {
    pub property: String,
    #[serde(default = "default_op")]
    pub op: String,
    pub value: String,
}

/// A relationship between two named assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySpec {
    pub from: String,
    pub to: String,
    #[serde(default = "default_dir")]
    pub dir: String,
    pub property: String,
    #[serde(default = "default_op")]
    pub op: String,
    pub value: String,
}

impl NetworkModel {
    pub fn fact_count(&self) -> usize {
        self.assets.iter().map(|a| a.qualities.len()).sum::<usize>() + self.topologies.len()
    }
}

pub(crate) fn default_op() -> String {
    "=".to_string()
}

pub(crate) fn default_dir() -> String {
    "->".to_string()
}
