use narwhal_graphlib::{EdgeKey, Graph, GraphOptions, alg};

#[test]
fn undirected_edges_are_symmetric() {
    let mut g: Graph<(), i32> = Graph::new(GraphOptions { directed: false });

    g.set_edge_with_label("b", "a", 7);

    assert!(g.has_edge("a", "b"));
    assert!(g.has_edge("b", "a"));
    assert_eq!(g.edge("a", "b"), Some(&7));
    assert_eq!(g.edge("b", "a"), Some(&7));
    assert_eq!(g.edges().cloned().collect::<Vec<_>>(), vec![EdgeKey::new("a", "b")]);
}

#[test]
fn directed_edges_keep_orientation() {
    let mut g: Graph<(), i32> = Graph::default();
    g.set_edge_with_label("b", "a", 7);

    assert!(g.has_edge("b", "a"));
    assert!(!g.has_edge("a", "b"));

    g.set_edge_with_label("a", "b", 8);
    assert_eq!(g.edge_count(), 2);
}

#[test]
fn undirected_neighbors_cover_both_directions() {
    let mut g: Graph<(), ()> = Graph::new(GraphOptions { directed: false });
    g.set_edge("a", "b");
    g.set_edge("b", "c");

    let mut neigh = g.neighbors("b");
    neigh.sort();
    assert_eq!(neigh, vec!["a", "c"]);
    assert_eq!(g.node_edges("b").len(), 2);
}

#[test]
fn components_and_isolated_nodes() {
    let mut g: Graph<(), ()> = Graph::default();
    g.set_path(&["a", "b", "c"]);
    g.set_edge("x", "y");
    g.ensure_node("lonely");

    let comps = alg::components(&g);
    assert_eq!(comps.len(), 3);
    assert_eq!(comps[0], vec!["a", "b", "c"]);
    assert_eq!(comps[1], vec!["x", "y"]);
    assert_eq!(alg::isolated_nodes(&g), vec!["lonely".to_string()]);
}
