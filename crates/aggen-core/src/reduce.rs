//! Back-edge removal over the id-level graph.
//!
//! Works on `(vertex ids, edge rows)` as fetched from storage, never on fact
//! content. Vertices are visited in ascending id order and out-edges in
//! ascending edge id order, so the result is deterministic for a given input.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::{EdgeId, ExploitId, StateId};

/// One persisted edge, without its binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeRow {
    pub id: EdgeId,
    pub from: StateId,
    pub to: StateId,
    pub exploit: ExploitId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Ids of every edge that points back to a vertex still on the DFS stack.
///
/// Edge endpoints missing from `vertices` are added as vertices so a
/// dangling row cannot hide a cycle.
pub fn back_edges(vertices: &[StateId], edges: &[EdgeRow]) -> Vec<EdgeId> {
    let mut out_edges: AHashMap<StateId, Vec<EdgeRow>> = AHashMap::new();
    for edge in edges {
        out_edges.entry(edge.from).or_default().push(*edge);
    }
    for list in out_edges.values_mut() {
        list.sort_by_key(|e| e.id);
    }

    let mut order: Vec<StateId> = vertices
        .iter()
        .copied()
        .chain(edges.iter().flat_map(|e| [e.from, e.to]))
        .collect();
    order.sort_unstable();
    order.dedup();

    let mut color: AHashMap<StateId, Color> = order.iter().map(|&v| (v, Color::White)).collect();
    let mut back = Vec::new();
    let no_edges: Vec<EdgeRow> = Vec::new();

    for &root in &order {
        if color.get(&root) != Some(&Color::White) {
            continue;
        }

        // (vertex, index of the next out-edge to examine)
        let mut stack: Vec<(StateId, usize)> = vec![(root, 0)];
        color.insert(root, Color::Gray);

        while let Some(top) = stack.last_mut() {
            let (vertex, next) = *top;
            let outgoing = out_edges.get(&vertex).unwrap_or(&no_edges);

            let Some(edge) = outgoing.get(next) else {
                color.insert(vertex, Color::Black);
                stack.pop();
                continue;
            };
            top.1 += 1;

            match color.get(&edge.to).copied().unwrap_or(Color::White) {
                Color::White => {
                    color.insert(edge.to, Color::Gray);
                    stack.push((edge.to, 0));
                }
                Color::Gray => back.push(edge.id),
                Color::Black => {}
            }
        }
    }

    back.sort_unstable();
    back
}

/// Drop back edges from `edges`, returning the removed ids.
pub fn remove_back_edges(vertices: &[StateId], edges: &mut Vec<EdgeRow>) -> Vec<EdgeId> {
    let back = back_edges(vertices, edges);
    if !back.is_empty() {
        let doomed: AHashSet<EdgeId> = back.iter().copied().collect();
        edges.retain(|e| !doomed.contains(&e.id));
        tracing::debug!(removed = back.len(), remaining = edges.len(), "removed back edges");
    }
    back
}

/// True if the edge set has no directed cycle.
pub fn is_acyclic(vertices: &[StateId], edges: &[EdgeRow]) -> bool {
    back_edges(vertices, edges).is_empty()
}
