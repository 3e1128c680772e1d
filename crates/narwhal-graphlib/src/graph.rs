//! Graph container APIs used by `narwhal`.
//!
//! Nodes and edges keep the order in which they were first inserted; the layout engine derives
//! its particle order from it. Every mutation is reported to subscribed listeners as a
//! [`GraphEvent`]. Listeners run synchronously on the mutating thread and must not call back into
//! the graph.

use rustc_hash::FxBuildHasher;

pub mod alg;
mod edge_key;
mod entries;
mod events;
mod options;

pub use edge_key::EdgeKey;
pub use events::{GraphEvent, Listener, SubscriptionId};
pub use options::GraphOptions;

use edge_key::EdgeKeyView;
use entries::{EdgeEntry, NodeEntry};

type HashMap<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;

pub struct Graph<N, E>
where
    N: Default,
    E: Default,
{
    options: GraphOptions,

    nodes: Vec<NodeEntry<N>>,
    node_index: HashMap<String, usize>,

    edges: Vec<EdgeEntry<E>>,
    edge_index: HashMap<EdgeKey, usize>,

    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl<N, E> Default for Graph<N, E>
where
    N: Default,
    E: Default,
{
    fn default() -> Self {
        Self::new(GraphOptions::default())
    }
}

impl<N, E> Graph<N, E>
where
    N: Default,
    E: Default,
{
    pub fn new(options: GraphOptions) -> Self {
        Self {
            options,
            nodes: Vec::new(),
            node_index: HashMap::default(),
            edges: Vec::new(),
            edge_index: HashMap::default(),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn options(&self) -> GraphOptions {
        self.options
    }

    pub fn is_directed(&self) -> bool {
        self.options.directed
    }

    /// Registers a listener that receives every subsequent [`GraphEvent`].
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&GraphEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn emit(&self, event: GraphEvent) {
        for (_, listener) in &self.listeners {
            listener(&event);
        }
    }

    fn edge_key_view<'a>(&self, v: &'a str, w: &'a str) -> EdgeKeyView<'a> {
        if self.options.directed || v <= w {
            EdgeKeyView { v, w }
        } else {
            EdgeKeyView { v: w, w: v }
        }
    }

    fn canonicalize_endpoints(&self, v: String, w: String) -> (String, String) {
        if self.options.directed || v <= w {
            (v, w)
        } else {
            (w, v)
        }
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn set_node(&mut self, id: impl Into<String>, label: N) -> &mut Self {
        let id = id.into();
        if let Some(&idx) = self.node_index.get(&id) {
            self.nodes[idx].label = label;
            self.emit(GraphEvent::NodeChanged(id));
            return self;
        }
        let idx = self.nodes.len();
        self.nodes.push(NodeEntry {
            id: id.clone(),
            label,
        });
        self.node_index.insert(id.clone(), idx);
        self.emit(GraphEvent::NodeAdded(id));
        self
    }

    pub fn ensure_node(&mut self, id: impl Into<String>) -> &mut Self {
        let id = id.into();
        if self.node_index.contains_key(&id) {
            return self;
        }
        self.set_node(id, N::default())
    }

    pub fn node(&self, id: &str) -> Option<&N> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx].label)
    }

    /// Mutable access to a node label. Edits made through this reference are not reported to
    /// listeners; use [`Graph::set_node`] when subscribers must observe the change.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut N> {
        self.node_index
            .get(id)
            .copied()
            .map(move |idx| &mut self.nodes[idx].label)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn for_each_node<F>(&self, mut f: F)
    where
        F: FnMut(&str, &N),
    {
        for n in &self.nodes {
            f(&n.id, &n.label);
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &EdgeKey> {
        self.edges.iter().map(|e| &e.key)
    }

    pub fn for_each_edge<F>(&self, mut f: F)
    where
        F: FnMut(&EdgeKey, &E),
    {
        for e in &self.edges {
            f(&e.key, &e.label);
        }
    }

    pub fn set_edge(&mut self, v: impl Into<String>, w: impl Into<String>) -> &mut Self {
        self.set_edge_inner(v.into(), w.into(), None)
    }

    pub fn set_edge_with_label(
        &mut self,
        v: impl Into<String>,
        w: impl Into<String>,
        label: E,
    ) -> &mut Self {
        self.set_edge_inner(v.into(), w.into(), Some(label))
    }

    fn set_edge_inner(&mut self, v: String, w: String, label: Option<E>) -> &mut Self {
        let (v, w) = self.canonicalize_endpoints(v, w);
        self.ensure_node(v.clone());
        self.ensure_node(w.clone());

        let key = EdgeKey { v, w };
        if let Some(&idx) = self.edge_index.get(&key) {
            if let Some(label) = label {
                self.edges[idx].label = label;
                self.emit(GraphEvent::EdgeChanged(key));
            }
            return self;
        }

        let idx = self.edges.len();
        self.edges.push(EdgeEntry {
            key: key.clone(),
            label: label.unwrap_or_default(),
        });
        self.edge_index.insert(key.clone(), idx);
        self.emit(GraphEvent::EdgeAdded(key));
        self
    }

    pub fn set_path(&mut self, nodes: &[&str]) -> &mut Self {
        for pair in nodes.windows(2) {
            self.set_edge(pair[0], pair[1]);
        }
        self
    }

    pub fn has_edge(&self, v: &str, w: &str) -> bool {
        let view = self.edge_key_view(v, w);
        self.edge_index.get(&view).is_some()
    }

    pub fn edge(&self, v: &str, w: &str) -> Option<&E> {
        let view = self.edge_key_view(v, w);
        let idx = *self.edge_index.get(&view)?;
        Some(&self.edges[idx].label)
    }

    pub fn edge_mut(&mut self, v: &str, w: &str) -> Option<&mut E> {
        let view = self.edge_key_view(v, w);
        let idx = *self.edge_index.get(&view)?;
        Some(&mut self.edges[idx].label)
    }

    fn reindex_edges(&mut self, from: usize) {
        for i in from..self.edges.len() {
            if let Some(v) = self.edge_index.get_mut(&self.edges[i].key) {
                *v = i;
            }
        }
    }

    pub fn remove_edge(&mut self, v: &str, w: &str) -> bool {
        let view = self.edge_key_view(v, w);
        let Some(idx) = self.edge_index.get(&view).copied() else {
            return false;
        };
        let entry = self.edges.remove(idx);
        self.edge_index.remove(&entry.key);
        self.reindex_edges(idx);
        self.emit(GraphEvent::EdgeRemoved(entry.key));
        true
    }

    /// Removes a node together with its incident edges.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(idx) = self.node_index.remove(id) else {
            return false;
        };

        self.nodes.remove(idx);
        for i in idx..self.nodes.len() {
            let node_id = self.nodes[i].id.as_str();
            if let Some(v) = self.node_index.get_mut(node_id) {
                *v = i;
            }
        }

        let mut removed: Vec<EdgeKey> = Vec::new();
        self.edges.retain(|e| {
            let incident = e.key.v == id || e.key.w == id;
            if incident {
                removed.push(e.key.clone());
            }
            !incident
        });
        if !removed.is_empty() {
            for key in &removed {
                self.edge_index.remove(key);
            }
            self.reindex_edges(0);
        }

        for key in removed {
            self.emit(GraphEvent::EdgeRemoved(key));
        }
        self.emit(GraphEvent::NodeRemoved(id.to_string()));
        true
    }

    /// Removes every node and edge. Listeners stay subscribed.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.node_index.clear();
        self.edges.clear();
        self.edge_index.clear();
        self.emit(GraphEvent::Cleared);
    }

    /// Nodes connected to `v` by an edge in either direction, in edge order, without duplicates.
    pub fn neighbors(&self, v: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for e in &self.edges {
            let other = if e.key.v == v {
                e.key.w.as_str()
            } else if e.key.w == v {
                e.key.v.as_str()
            } else {
                continue;
            };
            if !out.contains(&other) {
                out.push(other);
            }
        }
        out
    }

    pub fn node_edges(&self, v: &str) -> Vec<EdgeKey> {
        self.edges
            .iter()
            .filter(|e| e.key.v == v || e.key.w == v)
            .map(|e| e.key.clone())
            .collect()
    }
}
