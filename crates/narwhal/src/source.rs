//! Collaborators the engine talks to: where vertices and edges come from, and who gets told a
//! frame is ready.

use crate::vector::Vector2;
use narwhal_graphlib::{Graph, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Called when the source changed in any way. Must not block.
pub type ChangeListener = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct VertexSpec {
    pub id: String,
    pub position: Option<Vector2>,
    pub mass: f64,
    pub pinned: bool,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    pub length: Option<f64>,
    pub directed: bool,
}

/// An enumerable graph the engine mirrors. Enumeration order is the particle order after a
/// resync.
pub trait GraphSource: Send + Sync {
    fn vertices(&self) -> Vec<VertexSpec>;
    fn edges(&self) -> Vec<EdgeSpec>;
    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId;
    /// Removes a listener. Returns `false` when `id` was not subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Receives one `invalidate` per completed tick.
pub trait RenderSink: Send + Sync {
    fn invalidate(&self);
}

impl<F> RenderSink for F
where
    F: Fn() + Send + Sync,
{
    fn invalidate(&self) {
        self()
    }
}

/// Vertex label for graphs fed to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl NodeData {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    /// Both coordinates, when both are present.
    pub fn position(&self) -> Option<Vector2> {
        Some(Vector2::new(self.x?, self.y?))
    }
}

/// Edge label for graphs fed to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub directed: bool,
}

impl GraphSource for RwLock<Graph<NodeData, EdgeData>> {
    fn vertices(&self) -> Vec<VertexSpec> {
        let g = self.read().unwrap_or_else(PoisonError::into_inner);
        g.nodes()
            .map(|id| {
                let label = g.node(id).cloned().unwrap_or_default();
                VertexSpec {
                    id: id.to_string(),
                    position: label.position(),
                    mass: label.mass.unwrap_or(1.0),
                    pinned: label.fixed,
                    data: label.data,
                }
            })
            .collect()
    }

    fn edges(&self) -> Vec<EdgeSpec> {
        let g = self.read().unwrap_or_else(PoisonError::into_inner);
        let directed_graph = g.is_directed();
        g.edges()
            .map(|key| {
                let label = g.edge(&key.v, &key.w).cloned().unwrap_or_default();
                EdgeSpec {
                    source: key.v.clone(),
                    target: key.w.clone(),
                    length: label.length,
                    directed: directed_graph && label.directed,
                }
            })
            .collect()
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        let mut g = self.write().unwrap_or_else(PoisonError::into_inner);
        g.subscribe(move |_event| listener())
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.write()
            .unwrap_or_else(PoisonError::into_inner)
            .unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn graph_source_lists_vertices_in_insertion_order() {
        let mut g: Graph<NodeData, EdgeData> = Graph::default();
        g.set_node("b", NodeData::at(1.0, 2.0));
        g.set_node(
            "a",
            NodeData {
                mass: Some(3.0),
                fixed: true,
                ..Default::default()
            },
        );
        g.set_edge_with_label(
            "b",
            "a",
            EdgeData {
                length: Some(4.0),
                directed: true,
            },
        );
        let source = RwLock::new(g);

        let vs = source.vertices();
        assert_eq!(
            vs.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(),
            ["b", "a"]
        );
        assert_eq!(vs[0].position, Some(Vector2::new(1.0, 2.0)));
        assert_eq!(vs[1].position, None);
        assert_eq!(vs[1].mass, 3.0);
        assert!(vs[1].pinned);

        let es = source.edges();
        assert_eq!(es.len(), 1);
        assert_eq!((es[0].source.as_str(), es[0].target.as_str()), ("b", "a"));
        assert_eq!(es[0].length, Some(4.0));
        assert!(es[0].directed);
    }

    #[test]
    fn subscribers_hear_every_mutation() {
        let source = RwLock::new(Graph::<NodeData, EdgeData>::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let id = source.subscribe(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        {
            let mut g = source.write().unwrap();
            g.set_edge("a", "b");
            g.remove_node("a");
        }
        // NodeAdded x2, EdgeAdded, EdgeRemoved, NodeRemoved
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        assert!(source.unsubscribe(id));
        source.write().unwrap().set_node("z", NodeData::default());
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert!(!source.unsubscribe(id));
    }

    #[test]
    fn node_data_json_is_sparse() {
        let json = serde_json::to_string(&NodeData::at(1.0, 2.0)).unwrap();
        assert_eq!(json, r#"{"x":1.0,"y":2.0}"#);
    }
}
