//! Change notification types.

use super::EdgeKey;

/// A structural change reported to graph listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    NodeAdded(String),
    /// `set_node` replaced the label of an existing node.
    NodeChanged(String),
    NodeRemoved(String),
    EdgeAdded(EdgeKey),
    EdgeChanged(EdgeKey),
    EdgeRemoved(EdgeKey),
    Cleared,
}

impl GraphEvent {
    /// Whether the event adds or removes nodes or edges.
    pub fn is_structural(&self) -> bool {
        !matches!(self, GraphEvent::NodeChanged(_) | GraphEvent::EdgeChanged(_))
    }
}

pub type Listener = Box<dyn Fn(&GraphEvent) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(in crate::graph) u64);

impl SubscriptionId {
    /// Wraps a raw id, for other listener registries that want to hand out the same type.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}
