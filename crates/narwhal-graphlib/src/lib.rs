//! Graph container used as the vertex/edge source of the `narwhal` layout engine.
//!
//! The container keeps to insertion-ordered nodes and edges, string ids, and a
//! synchronous change-notification hook so a layout can resynchronize after structural edits.

mod graph;

pub use graph::{EdgeKey, Graph, GraphEvent, GraphOptions, Listener, SubscriptionId, alg};
