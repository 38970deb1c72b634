//! `aggen.json` configuration.
//!
//! Every field has a default, so an empty object (or no file at all) is a
//! valid configuration. Command-line flags are applied on top.

use aggen_core::SearchConfig;
use aggen_storage::StoreConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKind {
    /// Single-owner hash map
    #[default]
    Memory,
    /// Concurrent map with atomic check-and-insert
    Shared,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    #[serde(flatten)]
    pub engine: SearchConfig,
    pub dedup: DedupKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggenConfig {
    pub search: SearchSection,
    pub store: StoreConfig,
}

/// Flag values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub batch_size: Option<usize>,
    pub threads: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub shared_dedup: bool,
    pub store: Option<PathBuf>,
}

impl AggenConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Load `path` if given, otherwise start from defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(batch) = overrides.batch_size {
            self.search.engine.batch_size = Some(batch);
        }
        if let Some(threads) = overrides.threads {
            self.search.engine.threads = threads;
        }
        if let Some(capacity) = overrides.queue_capacity {
            self.search.engine.initial_queue_capacity = capacity;
        }
        if overrides.shared_dedup {
            self.search.dedup = DedupKind::Shared;
        }
        if let Some(store) = &overrides.store {
            self.store.path = store.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_all_defaults() {
        let config: AggenConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AggenConfig::default());
        assert_eq!(config.search.engine.threads, 32);
        assert_eq!(config.search.engine.initial_queue_capacity, 1024);
        assert_eq!(config.search.engine.batch_size, None);
        assert_eq!(config.store.path, PathBuf::from("attack_graph.json"));
    }

    #[test]
    fn search_section_reads_flat_fields() {
        let config: AggenConfig = serde_json::from_str(
            r#"{ "search": { "batch_size": 50, "threads": 4, "dedup": "shared" },
                 "store": { "path": "out/graph.json", "checkpoint_log": true } }"#,
        )
        .unwrap();
        assert_eq!(config.search.engine.batch_size, Some(50));
        assert_eq!(config.search.engine.threads, 4);
        assert_eq!(config.search.engine.initial_queue_capacity, 1024);
        assert_eq!(config.search.dedup, DedupKind::Shared);
        assert!(config.store.checkpoint_log);
    }

    #[test]
    fn flags_override_the_file() {
        let mut config: AggenConfig = serde_json::from_str(r#"{ "search": { "threads": 4 } }"#).unwrap();
        config.apply(&Overrides {
            batch_size: Some(10),
            threads: Some(2),
            queue_capacity: None,
            shared_dedup: true,
            store: Some(PathBuf::from("elsewhere.json")),
        });
        assert_eq!(config.search.engine.batch_size, Some(10));
        assert_eq!(config.search.engine.threads, 2);
        assert_eq!(config.search.engine.initial_queue_capacity, 1024);
        assert_eq!(config.search.dedup, DedupKind::Shared);
        assert_eq!(config.store.path, PathBuf::from("elsewhere.json"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = AggenConfig::resolve(Some(Path::new("/nonexistent/aggen.json"))).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/aggen.json"));
    }
}
