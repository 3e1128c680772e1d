#![forbid(unsafe_code)]

//! Headless force-directed graph layout.
//!
//! Edges act as springs, every pair of nodes repels, and a Barnes-Hut quadtree keeps the
//! repulsion pass at O(n log n). [`ParticleSystem`] is the single-threaded simulation; [`Layout`]
//! wraps it with a start/stop lifecycle, a periodic [`Scheduler`], a [`GraphSource`] to mirror and
//! a [`RenderSink`] to notify.

pub mod barnes_hut;
pub mod bounds;
pub mod error;
pub mod forces;
pub mod integrator;
pub mod layout;
pub mod options;
pub mod particle;
pub mod rng;
pub mod scheduler;
pub mod source;
pub mod system;
pub mod vector;

pub use bounds::{Bounds, Viewport};
pub use error::{Error, Result};
pub use integrator::Energy;
pub use layout::{
    EdgeSnapshot, EventListener, Layout, LayoutEvent, NodeSnapshot, RunSummary, StopReason,
};
pub use options::{LayoutOptions, ViewportOptions};
pub use particle::{Particle, ParticleId, Spring, SpringId};
pub use rng::XorShift64Star;
pub use scheduler::{ManualScheduler, Scheduler, ThreadScheduler, TickCallback};
pub use source::{
    ChangeListener, EdgeData, EdgeSpec, GraphSource, NodeData, RenderSink, VertexSpec,
};
pub use system::{Command, Nearest, ParticleSystem, TickOutcome};
pub use vector::Vector2;

/// Graph container used as a [`GraphSource`].
pub use narwhal_graphlib as graphlib;
pub use narwhal_graphlib::SubscriptionId;
