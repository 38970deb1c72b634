//! File-based ingestion tests.

use aggen_core::{Generator, SearchConfig};
use aggen_model::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn loads_instance_from_files_and_searches_it() {
    let dir = tempdir().unwrap();
    let network = dir.path().join("network.json");
    let catalog = dir.path().join("exploits.json");

    fs::write(
        &network,
        r#"{ "assets": [
                { "name": "A", "qualities": [ { "property": "compromised", "value": "true" } ] },
                { "name": "B" }
            ] }"#,
    )
    .unwrap();
    fs::write(
        &catalog,
        r#"{ "exploits": [ {
                "name": "escalate", "params": 1,
                "preconditions":  [ { "type": "quality", "param": 0, "property": "compromised", "value": "true" } ],
                "postconditions": [ { "action": "add", "type": "quality", "param": 0, "property": "root", "value": "true" } ]
            } ] }"#,
    )
    .unwrap();

    let instance = load_instance(&network, &catalog).unwrap();
    assert_eq!(instance.assets.len(), 2);
    assert_eq!(instance.exploits.len(), 1);

    let result = Generator::new(instance, SearchConfig::default()).unwrap().run().unwrap();
    assert_eq!(result.states.len(), 2);
    assert_eq!(result.edges.len(), 1);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    let err = load_network(&missing).unwrap_err();
    assert!(matches!(err, IngestError::Io { .. }));
    assert!(err.to_string().contains("nope.json"));
}

#[test]
fn documents_round_trip_through_serde() {
    let catalog = ExploitCatalog {
        exploits: vec![ExploitSpec {
            name: "pivot".to_string(),
            params: 2,
            preconditions: vec![ConditionSpec::Topology {
                from: 0,
                to: 1,
                dir: "<->".to_string(),
                property: "trust".to_string(),
                op: "=".to_string(),
                value: "true".to_string(),
            }],
            postconditions: vec![PostconditionSpec {
                action: "update".to_string(),
                condition: ConditionSpec::Quality {
                    param: 1,
                    property: "owner".to_string(),
                    op: "=".to_string(),
                    value: "attacker".to_string(),
                },
            }],
        }],
    };

    let json = serde_json::to_string(&catalog).unwrap();
    assert!(json.contains(r#""type":"topology""#));
    assert_eq!(parse_catalog(&json).unwrap(), catalog);
}
