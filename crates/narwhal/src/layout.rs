//! The runtime handle: lifecycle, scheduling and thread-safe access to a [`ParticleSystem`].
//!
//! `Layout` is `Send + Sync` and every method takes `&self`, so it can sit behind an `Arc` shared
//! by a UI thread and the tick thread. Ticks never overlap: a tick that fires while the previous
//! one is still running is dropped, not queued. Position and pin writes are queued and applied
//! at the start of the next tick.

use crate::bounds::Bounds;
use crate::error::Result;
use crate::integrator::Energy;
use crate::options::LayoutOptions;
use crate::particle::{ParticleId, SpringId};
use crate::scheduler::{Scheduler, ThreadScheduler, TickCallback};
use crate::source::{GraphSource, RenderSink};
use crate::system::{Command, Nearest, ParticleSystem, TickOutcome};
use crate::vector::Vector2;
use narwhal_graphlib::SubscriptionId;
use serde::Serialize;
use std::any::Any;
use std::ops::ControlFlow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called.
    Requested,
    /// Energy stayed settled for the auto-stop window.
    Converged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutEvent {
    Started,
    Stopped(StopReason),
}

pub type EventListener = Box<dyn Fn(&LayoutEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    #[serde(skip)]
    pub id: ParticleId,
    pub label: String,
    pub position: Vector2,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<Vector2>,
    pub velocity: Vector2,
    pub mass: f64,
    pub pinned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSnapshot {
    #[serde(skip)]
    pub id: SpringId,
    pub source: String,
    pub target: String,
    pub source_position: Vector2,
    pub target_position: Vector2,
    pub rest_length: f64,
    pub directed: bool,
}

/// Result of [`Layout::run_to_convergence`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub ticks: usize,
    pub converged: bool,
    pub energy: Energy,
}

struct Frame {
    outcome: TickOutcome,
    auto_stop: bool,
}

struct Shared {
    system: Mutex<ParticleSystem>,
    commands: Mutex<Vec<Command>>,
    busy: AtomicBool,
    running: AtomicBool,
    /// Raised by graph-source listeners; consumed by the next tick.
    resync: Arc<AtomicBool>,
    sink: RwLock<Option<Arc<dyn RenderSink>>>,
    listeners: RwLock<Vec<EventListener>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

impl Shared {
    fn emit(&self, event: LayoutEvent) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(&event);
        }
    }

    /// Running → Idle. Only the first caller emits the event.
    fn finish(&self, reason: StopReason) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return false;
        }
        tracing::debug!(?reason, "layout stopped");
        self.emit(LayoutEvent::Stopped(reason));
        true
    }

    /// One guarded tick. `None` when the frame was dropped or the tick panicked.
    fn run_tick(&self, now: Instant) -> Option<Frame> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("previous tick still running, frame dropped");
            return None;
        }

        let frame = {
            let mut system = lock(&self.system);
            if self.resync.swap(false, Ordering::AcqRel) {
                system.enqueue(Command::Resync);
            }
            let commands = std::mem::take(&mut *lock(&self.commands));
            for command in commands {
                system.enqueue(command);
            }
            let auto_stop = system.options().auto_stop;
            match catch_unwind(AssertUnwindSafe(|| system.tick(now))) {
                Ok(outcome) => Some(Frame { outcome, auto_stop }),
                Err(payload) => {
                    tracing::error!(panic = panic_message(payload.as_ref()), "layout tick panicked");
                    None
                }
            }
        };

        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink.invalidate();
        }

        self.busy.store(false, Ordering::Release);
        frame
    }
}

pub struct Layout {
    shared: Arc<Shared>,
    scheduler: Mutex<Box<dyn Scheduler>>,
    /// The attached source and our listener on it.
    subscription: Mutex<Option<(Arc<dyn GraphSource>, SubscriptionId)>>,
}

impl std::fmt::Debug for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layout")
            .field("running", &self.is_running())
            .field("system", &*lock(&self.shared.system))
            .finish_non_exhaustive()
    }
}

impl Layout {
    /// A layout ticking on its own thread.
    pub fn new(options: LayoutOptions) -> Result<Self> {
        Self::with_scheduler(options, Box::new(ThreadScheduler::new()))
    }

    pub fn with_scheduler(options: LayoutOptions, scheduler: Box<dyn Scheduler>) -> Result<Self> {
        let system = ParticleSystem::new(options)?;
        Ok(Self {
            shared: Arc::new(Shared {
                system: Mutex::new(system),
                commands: Mutex::new(Vec::new()),
                busy: AtomicBool::new(false),
                running: AtomicBool::new(false),
                resync: Arc::new(AtomicBool::new(false)),
                sink: RwLock::new(None),
                listeners: RwLock::new(Vec::new()),
            }),
            scheduler: Mutex::new(scheduler),
            subscription: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn tick_callback(&self) -> TickCallback {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        Box::new(move || {
            let Some(shared) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            if !shared.running.load(Ordering::Acquire) {
                return ControlFlow::Break(());
            }
            match shared.run_tick(Instant::now()) {
                Some(frame) if frame.outcome.converged && frame.auto_stop => {
                    shared.finish(StopReason::Converged);
                    ControlFlow::Break(())
                }
                _ => ControlFlow::Continue(()),
            }
        })
    }

    /// Idle → Running. Resynchronizes from the attached source, then schedules ticks. Does
    /// nothing when already running.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let interval = {
            let mut system = lock(&self.shared.system);
            self.shared.resync.store(false, Ordering::Release);
            system.resync_attached();
            system.restart_settling();
            Duration::from_millis(system.options().tick_interval_ms)
        };
        tracing::debug!(?interval, "layout started");
        self.shared.emit(LayoutEvent::Started);
        lock(&self.scheduler).start(interval, self.tick_callback());
    }

    /// Running → Idle. No further ticks are scheduled; one already in progress finishes.
    pub fn stop(&self) {
        self.shared.finish(StopReason::Requested);
        lock(&self.scheduler).stop();
    }

    /// Mirrors `source` from now on, replacing any previously attached source. The source's
    /// change notifications only flag a resync; the rebuild itself happens on the tick thread.
    pub fn attach_source(&self, source: Arc<dyn GraphSource>) {
        let mut subscription = lock(&self.subscription);
        if let Some((old, id)) = subscription.take() {
            old.unsubscribe(id);
        }
        let flag = Arc::clone(&self.shared.resync);
        let id = source.subscribe(Box::new(move || flag.store(true, Ordering::Release)));
        *subscription = Some((Arc::clone(&source), id));
        drop(subscription);

        let mut system = lock(&self.shared.system);
        system.resync(source.as_ref());
        system.attach_source(source);
    }

    /// Stops listening to the attached source. Particles and springs stay as they are.
    pub fn detach_source(&self) -> Option<Arc<dyn GraphSource>> {
        if let Some((source, id)) = lock(&self.subscription).take() {
            source.unsubscribe(id);
        }
        self.shared.resync.store(false, Ordering::Release);
        lock(&self.shared.system).detach_source()
    }

    /// Asks the next tick to rebuild from the attached source.
    pub fn request_resync(&self) {
        self.shared.resync.store(true, Ordering::Release);
    }

    pub fn set_render_sink(&self, sink: impl RenderSink + 'static) {
        *self.shared.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(sink));
    }

    pub fn clear_render_sink(&self) {
        *self.shared.sink.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Registers a lifecycle listener. Listeners must not register further listeners.
    pub fn on_event<F>(&self, listener: F)
    where
        F: Fn(&LayoutEvent) + Send + Sync + 'static,
    {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Read access to the engine state as of the last completed tick.
    pub fn with_system<R>(&self, f: impl FnOnce(&ParticleSystem) -> R) -> R {
        f(&lock(&self.shared.system))
    }

    pub fn add_node(&self, label: &str, position: Option<Vector2>) -> ParticleId {
        lock(&self.shared.system).add_node(label, position)
    }

    pub fn add_edge(&self, source: &str, target: &str, length: Option<f64>) -> Option<SpringId> {
        lock(&self.shared.system).add_edge(source, target, length)
    }

    pub fn get_node(&self, label: &str) -> Option<NodeSnapshot> {
        let system = lock(&self.shared.system);
        let id = system.get_node(label)?;
        node_snapshot(&system, id)
    }

    pub fn nodes(&self) -> Vec<NodeSnapshot> {
        let system = lock(&self.shared.system);
        (0..system.particles().len())
            .filter_map(|i| node_snapshot(&system, ParticleId(i)))
            .collect()
    }

    pub fn edges(&self) -> Vec<EdgeSnapshot> {
        let system = lock(&self.shared.system);
        let particles = system.particles();
        system
            .springs()
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                let a = particles.get(s.source.0)?;
                let b = particles.get(s.target.0)?;
                Some(EdgeSnapshot {
                    id: SpringId(i),
                    source: a.label.clone(),
                    target: b.label.clone(),
                    source_position: a.position,
                    target_position: b.position,
                    rest_length: s.rest_length,
                    directed: s.directed,
                })
            })
            .collect()
    }

    pub fn energy(&self) -> Energy {
        lock(&self.shared.system).energy()
    }

    pub fn graph_bounds(&self) -> Bounds {
        lock(&self.shared.system).graph_bounds()
    }

    pub fn view_bounds(&self) -> Option<Bounds> {
        lock(&self.shared.system).view_bounds()
    }

    pub fn to_screen(&self, p: Vector2) -> Option<Vector2> {
        lock(&self.shared.system).to_screen(p)
    }

    pub fn from_screen(&self, s: Vector2) -> Option<Vector2> {
        lock(&self.shared.system).from_screen(s)
    }

    pub fn nearest(&self, screen: Vector2) -> Option<Nearest> {
        lock(&self.shared.system).nearest(screen)
    }

    pub fn set_screen_size(&self, width: f64, height: f64) -> Result<()> {
        lock(&self.shared.system).set_screen_size(width, height)
    }

    pub fn set_screen_padding(&self, padding: [f64; 4]) -> Result<()> {
        lock(&self.shared.system).set_screen_padding(padding)
    }

    /// Queues a move for the next tick.
    pub fn set_position(&self, label: impl Into<String>, position: Vector2) {
        lock(&self.shared.commands).push(Command::SetPosition {
            label: label.into(),
            position,
        });
    }

    /// Queues a pin toggle for the next tick.
    pub fn set_pinned(&self, label: impl Into<String>, pinned: bool) {
        lock(&self.shared.commands).push(Command::SetPinned {
            label: label.into(),
            pinned,
        });
    }

    /// Replaces the options. A running layout picks up a new tick interval immediately.
    pub fn set_options(&self, options: LayoutOptions) -> Result<()> {
        let interval_changed = {
            let mut system = lock(&self.shared.system);
            let before = system.options().tick_interval_ms;
            system.set_options(options)?;
            before != system.options().tick_interval_ms
        };
        if interval_changed && self.is_running() {
            let interval = Duration::from_millis(lock(&self.shared.system).options().tick_interval_ms);
            lock(&self.scheduler).start(interval, self.tick_callback());
        }
        Ok(())
    }

    /// Runs one tick on the calling thread through the same overlap guard as scheduled ticks.
    /// Does not change the lifecycle state.
    pub fn tick_now(&self) -> Option<TickOutcome> {
        self.shared.run_tick(Instant::now()).map(|f| f.outcome)
    }

    /// Steps the simulation on the calling thread until it converges or `max_ticks` have run.
    /// Time advances by the tick interval per step, so the auto-stop window is measured in
    /// simulated time and the result does not depend on how fast the host is.
    pub fn run_to_convergence(&self, max_ticks: usize) -> RunSummary {
        let step = Duration::from_millis(lock(&self.shared.system).options().tick_interval_ms);
        let origin = Instant::now();
        let mut summary = RunSummary {
            ticks: 0,
            converged: false,
            energy: Energy::default(),
        };

        for i in 0..max_ticks {
            let now = origin + step * i as u32;
            let Some(frame) = self.shared.run_tick(now) else {
                continue;
            };
            summary.ticks = i + 1;
            summary.energy = frame.outcome.energy;
            if frame.outcome.converged {
                summary.converged = true;
                break;
            }
        }
        summary
    }
}

impl Drop for Layout {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        lock(&self.scheduler).stop();
        if let Some((source, id)) = lock(&self.subscription).take() {
            source.unsubscribe(id);
        }
    }
}

fn node_snapshot(system: &ParticleSystem, id: ParticleId) -> Option<NodeSnapshot> {
    let p = system.node(id)?;
    Some(NodeSnapshot {
        id,
        label: p.label.clone(),
        position: p.position,
        screen: system.to_screen(p.position),
        velocity: p.velocity,
        mass: p.mass,
        pinned: p.pinned,
        data: p.data.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use crate::source::{EdgeData, NodeData};
    use narwhal_graphlib::Graph;
    use std::sync::atomic::AtomicUsize;

    fn manual() -> (Layout, ManualScheduler) {
        let handle = ManualScheduler::new();
        let layout = Layout::with_scheduler(
            LayoutOptions {
                random_seed: Some(5),
                ..Default::default()
            },
            Box::new(handle.clone()),
        )
        .unwrap();
        (layout, handle)
    }

    #[test]
    fn start_is_idempotent_and_emits_once() {
        let (layout, sched) = manual();
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        layout.on_event(move |ev| e.lock().unwrap().push(*ev));

        layout.start();
        layout.start();
        assert!(layout.is_running());
        assert!(sched.is_active());
        assert_eq!(sched.interval(), Some(Duration::from_millis(18)));

        layout.stop();
        layout.stop();
        assert!(!layout.is_running());
        assert!(!sched.is_active());
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                LayoutEvent::Started,
                LayoutEvent::Stopped(StopReason::Requested)
            ]
        );
    }

    #[test]
    fn render_sink_is_notified_once_per_tick() {
        let (layout, sched) = manual();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        layout.set_render_sink(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        layout.add_edge("a", "b", None);

        layout.start();
        assert_eq!(sched.fire_n(4), 4);
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert!(layout.tick_now().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn busy_guard_drops_overlapping_ticks() {
        let (layout, _sched) = manual();
        layout.shared.busy.store(true, Ordering::SeqCst);
        assert!(layout.tick_now().is_none());
        layout.shared.busy.store(false, Ordering::SeqCst);
        assert!(layout.tick_now().is_some());
    }

    #[test]
    fn queued_writes_land_on_the_next_tick() {
        let (layout, _sched) = manual();
        layout.add_node("a", Some(Vector2::ZERO));
        layout.set_pinned("a", true);
        layout.set_position("a", Vector2::new(4.0, 4.0));
        assert_eq!(layout.get_node("a").unwrap().position, Vector2::ZERO);

        layout.tick_now();
        let a = layout.get_node("a").unwrap();
        assert!(a.pinned);
        assert_eq!(a.position, Vector2::new(4.0, 4.0));
    }

    #[test]
    fn snapshots_expose_screen_positions_after_a_tick() {
        let (layout, _sched) = manual();
        layout.add_edge("a", "b", Some(2.0));
        assert!(layout.nodes().iter().all(|n| n.screen.is_none()));

        layout.tick_now();
        let nodes = layout.nodes();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.screen.is_some()));

        let edges = layout.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].source.as_str(), edges[0].target.as_str()), ("a", "b"));
        assert_eq!(edges[0].rest_length, 2.0);
    }

    fn shared_graph() -> Arc<RwLock<Graph<NodeData, EdgeData>>> {
        let mut g: Graph<NodeData, EdgeData> = Graph::default();
        g.set_node("a", NodeData::at(0.0, 0.0));
        g.set_node("b", NodeData::at(1.0, 0.0));
        g.set_edge("a", "b");
        Arc::new(RwLock::new(g))
    }

    fn listeners(graph: &RwLock<Graph<NodeData, EdgeData>>) -> usize {
        graph.read().unwrap().listener_count()
    }

    #[test]
    fn reattaching_and_dropping_release_the_source_listener() {
        let graph = shared_graph();
        let (layout, _sched) = manual();
        layout.attach_source(graph.clone());
        layout.attach_source(graph.clone());
        assert_eq!(listeners(&graph), 1);

        let other = shared_graph();
        layout.attach_source(other.clone());
        assert_eq!(listeners(&graph), 0);
        assert_eq!(listeners(&other), 1);

        drop(layout);
        assert_eq!(listeners(&other), 0);
    }

    #[test]
    fn detached_source_changes_are_not_mirrored() {
        let graph = shared_graph();
        let (layout, _sched) = manual();
        layout.attach_source(graph.clone());
        assert!(layout.detach_source().is_some());
        assert_eq!(listeners(&graph), 0);

        graph.write().unwrap().set_node("c", NodeData::default());
        layout.request_resync();
        layout.tick_now();
        assert_eq!(layout.nodes().len(), 2);
        assert!(layout.detach_source().is_none());
    }

    #[test]
    fn requested_resync_rebuilds_on_the_next_tick() {
        let graph = shared_graph();
        let (layout, _sched) = manual();
        layout.attach_source(graph.clone());
        layout.add_node("scratch", None);
        assert_eq!(layout.with_system(|s| s.particles().len()), 3);

        layout.request_resync();
        layout.tick_now();
        assert_eq!(layout.with_system(|s| s.particles().len()), 2);
        assert!(layout.get_node("scratch").is_none());
    }

    #[test]
    fn cleared_render_sink_stops_hearing_ticks() {
        let (layout, _sched) = manual();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        layout.set_render_sink(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        layout.tick_now();
        layout.clear_render_sink();
        layout.tick_now();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(layout.with_system(|s| s.tick_count()), 2);
    }
}
