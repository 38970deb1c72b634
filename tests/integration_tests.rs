//! Integration tests for the complete Aggen pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - JSON model → compile → search
//! - Search → checkpointed store → snapshot
//! - Snapshot → back-edge removal → acyclic graph
//!
//! Run with: cargo test --test integration_tests

use aggen_core::{is_acyclic, remove_back_edges, EdgeId, ExploitId, Generator, SearchConfig, SharedDedup, StateId};
use aggen_model::{compile, parse_catalog, parse_network};
use aggen_storage::{open_store, GraphStore, StoreConfig};
use tempfile::tempdir;

const NETWORK: &str = r#"{
    "assets": [ { "name": "vault" } ]
}"#;

/// `open` needs nothing; `close` undoes it, which leads back to the start.
const CATALOG: &str = r#"{
    "exploits": [
        {
            "name": "open", "params": 1,
            "postconditions": [
                { "action": "add", "type": "quality", "param": 0, "property": "door", "value": "open" }
            ]
        },
        {
            "name": "close", "params": 1,
            "preconditions": [
                { "type": "quality", "param": 0, "property": "door", "value": "open" }
            ],
            "postconditions": [
                { "action": "delete", "type": "quality", "param": 0, "property": "door", "value": "open" }
            ]
        }
    ]
}"#;

fn instance() -> aggen_core::SearchInstance {
    let network = parse_network(NETWORK).unwrap();
    let catalog = parse_catalog(CATALOG).unwrap();
    compile(&network, &catalog).unwrap()
}

// ============================================================================
// Model → Search
// ============================================================================

#[test]
fn test_cyclic_model_revisits_the_initial_state() {
    let result = Generator::new(instance(), SearchConfig::default()).unwrap().run().unwrap();

    assert_eq!(result.states.len(), 2);
    assert_eq!(result.edges.len(), 2);

    // edge 1 is `close` taking the opened vault back to the start
    let back = &result.edges[1];
    assert_eq!(back.exploit, ExploitId::new(1));
    assert_eq!((back.from, back.to), (StateId::new(1), StateId::INITIAL));
}

#[test]
fn test_shared_dedup_matches_memory_dedup() {
    let memory = Generator::new(instance(), SearchConfig::default()).unwrap().run().unwrap();
    let shared = Generator::with_dedup(instance(), SearchConfig::default(), SharedDedup::new())
        .unwrap()
        .run()
        .unwrap();

    let hashes = |r: &aggen_core::SearchResult| r.states.iter().map(|s| s.hash()).collect::<Vec<_>>();
    assert_eq!(hashes(&memory), hashes(&shared));
    assert_eq!(memory.edges, shared.edges);
}

// ============================================================================
// Search → Store → Reduce
// ============================================================================

#[test]
fn test_checkpointed_search_reduces_to_a_dag() {
    let dir = tempdir().unwrap();
    let config = StoreConfig {
        path: dir.path().join("graph.json"),
        checkpoint_log: true,
    };

    {
        let mut store = GraphStore::new(config.clone()).unwrap();
        let search = SearchConfig {
            batch_size: Some(1),
            ..SearchConfig::default()
        };
        let result = Generator::new(instance(), search)
            .unwrap()
            .run_with_checkpoints(&mut store)
            .unwrap();
        assert_eq!(store.edge_count(), result.edges.len());

        store.save_search_result(&result).unwrap();
        store.save().unwrap();
    }

    let store = open_store(&config.path).unwrap();
    let info = store.fetch_graph_info().unwrap();
    assert!(!is_acyclic(&info.vertices, &info.edges));

    let mut edges = info.edges.clone();
    let back = remove_back_edges(&info.vertices, &mut edges);
    assert_eq!(back, vec![EdgeId::new(1)]);
    assert_eq!(store.delete_edges(&back), 1);
    store.save().unwrap();

    let reduced = open_store(&config.path).unwrap().fetch_graph_info().unwrap();
    assert_eq!(reduced.vertices.len(), 2);
    assert_eq!(reduced.edges.len(), 1);
    assert!(is_acyclic(&reduced.vertices, &reduced.edges));
}

#[test]
fn test_stored_facts_decode_through_the_stored_interner() {
    let dir = tempdir().unwrap();
    let store = GraphStore::new(StoreConfig {
        path: dir.path().join("graph.json"),
        checkpoint_log: false,
    })
    .unwrap();
    let result = Generator::new(instance(), SearchConfig::default()).unwrap().run().unwrap();
    store.save_search_result(&result).unwrap();

    let interner = store.interner();
    let opened = result.state(StateId::new(1)).unwrap();
    let quality = opened.factbase().qualities().next().unwrap();
    assert_eq!(quality.display(&interner).unwrap(), "quality 0: door = open");
    assert_eq!(store.factbase_items(StateId::new(1)).len(), 1);
    assert!(store.factbase_items(StateId::INITIAL).is_empty());
}
