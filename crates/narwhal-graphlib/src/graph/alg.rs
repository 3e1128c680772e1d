//! Helper algorithms over [`Graph`].

use super::Graph;
use std::collections::{BTreeSet, VecDeque};

/// Weakly connected components, each listed in breadth-first order from its first node.
pub fn components<N, E>(g: &Graph<N, E>) -> Vec<Vec<String>>
where
    N: Default,
    E: Default,
{
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut out: Vec<Vec<String>> = Vec::new();

    for start in g.node_ids() {
        if !seen.insert(start.clone()) {
            continue;
        }
        let mut comp: Vec<String> = Vec::new();
        let mut q: VecDeque<String> = VecDeque::new();
        q.push_back(start);
        while let Some(v) = q.pop_front() {
            for n in g.neighbors(&v) {
                if seen.insert(n.to_string()) {
                    q.push_back(n.to_string());
                }
            }
            comp.push(v);
        }
        out.push(comp);
    }

    out
}

/// Nodes without any incident edge.
pub fn isolated_nodes<N, E>(g: &Graph<N, E>) -> Vec<String>
where
    N: Default,
    E: Default,
{
    let mut touched: BTreeSet<&str> = BTreeSet::new();
    for e in g.edges() {
        touched.insert(e.v.as_str());
        touched.insert(e.w.as_str());
    }
    g.nodes()
        .filter(|id| !touched.contains(id))
        .map(str::to_string)
        .collect()
}
