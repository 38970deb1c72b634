use aggen_core::permutation::generate;
use aggen_core::*;
use proptest::prelude::*;
use std::collections::HashSet;

const MAX_ASSETS: usize = 5;
const MAX_PARAMS: usize = 4;
const MAX_VERTICES: u32 = 24;

fn quality_strategy() -> impl Strategy<Value = Quality> {
    (0u32..8, 0u32..16, 0u32..16).prop_map(|(asset, property, value)| {
        Quality::new(AssetId::new(asset), Code::new(property), Operator::Eq, Code::new(value))
    })
}

fn edge_rows_strategy() -> impl Strategy<Value = (Vec<StateId>, Vec<EdgeRow>)> {
    (1u32..=MAX_VERTICES).prop_flat_map(|n| {
        prop::collection::vec((0..n, 0..n), 0..(n as usize * 3)).prop_map(move |pairs| {
            let vertices = (0..n).map(StateId::new).collect();
            let edges = pairs
                .into_iter()
                .enumerate()
                .map(|(i, (from, to))| EdgeRow {
                    id: EdgeId::new(i as u32),
                    from: StateId::new(from),
                    to: StateId::new(to),
                    exploit: ExploitId::new(0),
                })
                .collect();
            (vertices, edges)
        })
    })
}

/// Kahn's algorithm: every vertex drains iff there is no cycle.
fn has_cycle(vertices: &[StateId], edges: &[EdgeRow]) -> bool {
    let n = vertices.len();
    let mut indegree = vec![0usize; n];
    for e in edges {
        indegree[e.to.raw() as usize] += 1;
    }
    let mut ready: Vec<usize> = (0..n).filter(|&v| indegree[v] == 0).collect();
    let mut drained = 0;
    while let Some(v) = ready.pop() {
        drained += 1;
        for e in edges.iter().filter(|e| e.from.raw() as usize == v) {
            let to = e.to.raw() as usize;
            indegree[to] -= 1;
            if indegree[to] == 0 {
                ready.push(to);
            }
        }
    }
    drained != n
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn permutations_are_complete_and_distinct(params in 0usize..=MAX_PARAMS, assets in 1usize..=MAX_ASSETS) {
        let all = generate(params, assets).unwrap();
        prop_assert_eq!(all.len(), assets.pow(params as u32));

        let distinct: HashSet<&Assignment> = all.iter().collect();
        prop_assert_eq!(distinct.len(), all.len());

        for assignment in &all {
            prop_assert_eq!(assignment.len(), params);
            prop_assert!(assignment.as_slice().iter().all(|a| a.index() < assets));
        }

        // Repeats are included: the all-same assignment exists for every asset.
        if params > 0 {
            for asset in 0..assets {
                let same = Assignment::new(vec![AssetId::new(asset as u32); params]);
                prop_assert!(distinct.contains(&same));
            }
        }
    }

    #[test]
    fn factbase_hash_is_order_independent(mut facts in prop::collection::vec(quality_strategy(), 0..20)) {
        let forward = Factbase::new(facts.clone(), []);
        facts.reverse();
        let reversed = Factbase::new(facts, []);
        prop_assert_eq!(forward.hash(), reversed.hash());
        prop_assert_eq!(NetworkState::new(forward.clone()).hash(), forward.hash());
    }

    #[test]
    fn removing_back_edges_leaves_an_acyclic_graph((vertices, mut edges) in edge_rows_strategy()) {
        let before = edges.len();
        let removed = remove_back_edges(&vertices, &mut edges);

        prop_assert_eq!(edges.len() + removed.len(), before);
        prop_assert!(!has_cycle(&vertices, &edges));
        prop_assert!(is_acyclic(&vertices, &edges));
    }

    #[test]
    fn acyclic_graphs_lose_nothing((vertices, edges) in edge_rows_strategy()) {
        // Keep only edges that go "up" in id order: a DAG by construction.
        let dag: Vec<EdgeRow> = edges.into_iter().filter(|e| e.from < e.to).collect();
        prop_assert!(back_edges(&vertices, &dag).is_empty());
    }
}
