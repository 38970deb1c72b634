//! Graphviz rendering of a stored attack graph.
//!
//! Vertices are labelled by state id and edges by exploit id (plus the
//! exploit name when the catalog is at hand).

use aggen_storage::GraphInfo;
use std::fmt::Write;

pub fn render_dot(info: &GraphInfo, exploit_names: &[String]) -> String {
    fn dot_escape(s: &str) -> String {
        s.replace('\\', "\\\\").replace('"', "\\\"")
    }

    let mut out = String::new();
    out.push_str("digraph attack_graph {\n");
    out.push_str("  node [shape=circle, fontname=\"Helvetica\"];\n");
    out.push_str("  edge [fontname=\"Helvetica\"];\n\n");

    for v in &info.vertices {
        let _ = writeln!(out, "  s{v} [label=\"{v}\"];");
    }
    if !info.edges.is_empty() {
        out.push('\n');
    }
    for e in &info.edges {
        let label = match exploit_names.get(e.exploit.raw() as usize) {
            Some(name) => format!("{}: {}", e.exploit, dot_escape(name)),
            None => e.exploit.to_string(),
        };
        let _ = writeln!(out, "  s{} -> s{} [label=\"{label}\"];", e.from, e.to);
    }

    out.push_str("}\n");
    out
}
