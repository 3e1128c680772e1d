//! The simulation state and the tick that advances it.
//!
//! A [`ParticleSystem`] is single-threaded: every write to particle state happens either inside
//! [`ParticleSystem::tick`] or through calls made by whoever holds `&mut` to it. Writers on other
//! threads go through [`Command`]s, which the next tick drains before doing any physics.

use crate::bounds::{Bounds, Viewport, graph_bounds};
use crate::error::{Error, Result};
use crate::forces;
use crate::integrator::{self, Energy};
use crate::options::LayoutOptions;
use crate::particle::{Particle, ParticleId, Spring, SpringId};
use crate::rng::XorShift64Star;
use crate::source::{EdgeSpec, GraphSource, VertexSpec};
use crate::vector::Vector2;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long the mean energy must stay at or below the stop threshold before the layout counts
/// as converged.
pub const AUTO_STOP_WINDOW: Duration = Duration::from_secs(1);

/// Half-width of the square around the graph centre where unplaced nodes appear.
pub const NEW_NODE_RADIUS: f64 = 5.0;

/// A write requested from outside the tick loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Moves a particle and zeroes its velocity. Works on pinned particles too.
    SetPosition { label: String, position: Vector2 },
    SetPinned { label: String, pinned: bool },
    /// Rebuilds particles and springs from the attached graph source.
    Resync,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickOutcome {
    pub energy: Energy,
    /// Energy has stayed settled for longer than [`AUTO_STOP_WINDOW`].
    pub converged: bool,
    /// The view bounds moved this tick.
    pub view_changed: bool,
    /// A force pass failed and was skipped.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Nearest {
    pub id: ParticleId,
    pub label: String,
    pub position: Vector2,
    pub screen: Vector2,
    /// Distance to the query point in pixels.
    pub distance: f64,
}

pub struct ParticleSystem {
    options: LayoutOptions,
    particles: Vec<Particle>,
    springs: Vec<Spring>,
    index: FxHashMap<String, ParticleId>,
    rng: XorShift64Star,
    graph_bounds: Bounds,
    viewport: Viewport,
    energy: Energy,
    settled_since: Option<Instant>,
    pending: VecDeque<Command>,
    source: Option<Arc<dyn GraphSource>>,
    /// Position each vertex had in the source at the last resync.
    supplied: FxHashMap<String, Option<Vector2>>,
    /// Pins set through [`Command::SetPinned`]; they outrank the source's flag on resync.
    pin_overrides: FxHashMap<String, bool>,
    ticks: u64,
}

impl std::fmt::Debug for ParticleSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleSystem")
            .field("particles", &self.particles.len())
            .field("springs", &self.springs.len())
            .field("energy", &self.energy)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

fn seeded_rng(options: &LayoutOptions) -> XorShift64Star {
    match options.random_seed {
        Some(seed) => XorShift64Star::new(seed),
        None => XorShift64Star::from_entropy(),
    }
}

impl ParticleSystem {
    pub fn new(options: LayoutOptions) -> Result<Self> {
        options.validate()?;
        let vp = &options.viewport;
        Ok(Self {
            rng: seeded_rng(&options),
            viewport: Viewport::new(vp.width, vp.height, vp.padding),
            graph_bounds: graph_bounds(&[]),
            options,
            particles: Vec::new(),
            springs: Vec::new(),
            index: FxHashMap::default(),
            energy: Energy::default(),
            settled_since: None,
            pending: VecDeque::new(),
            source: None,
            supplied: FxHashMap::default(),
            pin_overrides: FxHashMap::default(),
            ticks: 0,
        })
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Replaces the options. Spring stiffness follows the new value; a changed seed reseeds.
    pub fn set_options(&mut self, options: LayoutOptions) -> Result<()> {
        options.validate()?;
        if options.stiffness != self.options.stiffness {
            for s in &mut self.springs {
                s.stiffness = options.stiffness;
            }
        }
        if options.random_seed.is_some() && options.random_seed != self.options.random_seed {
            self.rng = seeded_rng(&options);
        }
        self.viewport.width = options.viewport.width;
        self.viewport.height = options.viewport.height;
        self.viewport.padding = options.viewport.padding;
        self.options = options;
        Ok(())
    }

    pub fn set_screen_size(&mut self, width: f64, height: f64) -> Result<()> {
        let mut options = self.options.clone();
        options.viewport.width = width;
        options.viewport.height = height;
        self.set_options(options)
    }

    pub fn set_screen_padding(&mut self, padding: [f64; 4]) -> Result<()> {
        let mut options = self.options.clone();
        options.viewport.padding = padding;
        self.set_options(options)
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn springs(&self) -> &[Spring] {
        &self.springs
    }

    pub fn node(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(id.0)
    }

    pub fn get_node(&self, label: &str) -> Option<ParticleId> {
        self.index.get(label).copied()
    }

    pub fn energy(&self) -> Energy {
        self.energy
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn graph_bounds(&self) -> Bounds {
        self.graph_bounds
    }

    pub fn view_bounds(&self) -> Option<Bounds> {
        self.viewport.view_bounds()
    }

    pub fn to_screen(&self, p: Vector2) -> Option<Vector2> {
        self.viewport.to_screen(p)
    }

    pub fn from_screen(&self, s: Vector2) -> Option<Vector2> {
        self.viewport.from_screen(s)
    }

    /// Returns the existing particle for `label`, or creates one. Without a position the new
    /// particle lands at random near the centre of the current graph bounds.
    pub fn add_node(&mut self, label: &str, position: Option<Vector2>) -> ParticleId {
        if let Some(id) = self.get_node(label) {
            return id;
        }
        let position = position.unwrap_or_else(|| {
            self.graph_bounds.center() + self.rng.vector_in_square(NEW_NODE_RADIUS)
        });
        self.push_particle(Particle::new(label, position))
    }

    fn push_particle(&mut self, particle: Particle) -> ParticleId {
        let id = ParticleId(self.particles.len());
        self.index.insert(particle.label.clone(), id);
        self.particles.push(particle);
        id
    }

    /// Connects two labels, creating missing endpoints.
    ///
    /// Returns `None` for a self loop. When both endpoints already existed and a spring between
    /// them in the same direction is present, that spring is returned (with its rest length
    /// updated if one is given) instead of adding a second one. Freshly created endpoints skip
    /// that check.
    pub fn add_edge(&mut self, source: &str, target: &str, length: Option<f64>) -> Option<SpringId> {
        if source == target {
            return None;
        }
        let existed = self.index.contains_key(source) && self.index.contains_key(target);
        let s = self.add_node(source, None);
        let t = self.add_node(target, None);
        Some(self.connect(s, t, length, false, existed))
    }

    /// Like [`add_edge`](Self::add_edge) but never creates particles: a missing endpoint yields
    /// `None`.
    pub fn add_edge_existing(
        &mut self,
        source: &str,
        target: &str,
        length: Option<f64>,
    ) -> Option<SpringId> {
        if source == target {
            return None;
        }
        let s = self.get_node(source)?;
        let t = self.get_node(target)?;
        Some(self.connect(s, t, length, false, true))
    }

    fn connect(
        &mut self,
        source: ParticleId,
        target: ParticleId,
        length: Option<f64>,
        directed: bool,
        dedup: bool,
    ) -> SpringId {
        if dedup {
            if let Some(i) = self.springs.iter().position(|s| s.connects(source, target)) {
                if let Some(length) = length {
                    self.springs[i].rest_length = length;
                }
                return SpringId(i);
            }
        }
        let id = SpringId(self.springs.len());
        self.springs.push(Spring {
            source,
            target,
            rest_length: length.unwrap_or(self.options.default_edge_length),
            stiffness: self.options.stiffness,
            directed,
        });
        id
    }

    /// Queues a write for the start of the next tick.
    pub fn enqueue(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    pub fn attach_source(&mut self, source: Arc<dyn GraphSource>) {
        self.source = Some(source);
    }

    pub fn detach_source(&mut self) -> Option<Arc<dyn GraphSource>> {
        self.source.take()
    }

    /// Rebuilds every particle and spring from `source`, in source order.
    ///
    /// A vertex that was already mirrored keeps its simulated position unless the source has
    /// moved it since the last resync. Pinning follows the source, except for pins set through
    /// [`Command::SetPinned`].
    pub fn resync(&mut self, source: &dyn GraphSource) {
        let previous: FxHashMap<String, Vector2> = self
            .particles
            .drain(..)
            .filter_map(|p| {
                let vertex = p.vertex?;
                (!p.position.is_degenerate()).then_some((vertex, p.position))
            })
            .collect();
        let supplied = std::mem::take(&mut self.supplied);
        self.springs.clear();
        self.index.clear();

        let vertices = source.vertices();
        let edges = source.edges();
        for v in &vertices {
            let moved = v.position.is_some_and(Vector2::is_finite)
                && supplied.get(&v.id) != Some(&v.position);
            let kept = if moved {
                None
            } else {
                previous.get(&v.id).copied()
            };
            self.add_vertex(v, kept);
        }
        let index = &self.index;
        self.pin_overrides.retain(|label, _| index.contains_key(label));

        let mut dropped = 0usize;
        for e in &edges {
            if self.add_edge_spec(e).is_none() {
                dropped += 1;
            }
        }

        tracing::debug!(
            particles = self.particles.len(),
            springs = self.springs.len(),
            dropped_edges = dropped,
            "resynchronized from graph source"
        );
    }

    /// Resyncs from the attached source. Returns `false` when none is attached.
    pub fn resync_attached(&mut self) -> bool {
        match self.source.clone() {
            Some(source) => {
                self.resync(source.as_ref());
                true
            }
            None => false,
        }
    }

    /// Forgets how long energy has been settled, restarting the auto-stop window.
    pub fn restart_settling(&mut self) {
        self.settled_since = None;
    }

    fn add_vertex(&mut self, v: &VertexSpec, kept: Option<Vector2>) -> ParticleId {
        if let Some(id) = self.get_node(&v.id) {
            return id;
        }
        let supplied = match v.position {
            Some(p) if !p.is_finite() => {
                tracing::warn!(vertex = %v.id, ?p, "non-finite vertex position ignored");
                None
            }
            other => other,
        };
        let mass = if v.mass.is_finite() && v.mass > 0.0 {
            v.mass
        } else {
            tracing::warn!(vertex = %v.id, mass = v.mass, "invalid vertex mass, using 1");
            1.0
        };
        let position = kept.or(supplied).unwrap_or_else(|| {
            self.graph_bounds.center() + self.rng.vector_in_square(NEW_NODE_RADIUS)
        });
        let pinned = self.pin_overrides.get(&v.id).copied().unwrap_or(v.pinned);

        let mut particle = Particle::new(v.id.clone(), position)
            .with_mass(mass)
            .pinned(pinned);
        particle.data = v.data.clone();
        particle.vertex = Some(v.id.clone());
        self.supplied.insert(v.id.clone(), v.position);
        self.push_particle(particle)
    }

    fn add_edge_spec(&mut self, e: &EdgeSpec) -> Option<SpringId> {
        if e.source == e.target {
            return None;
        }
        let s = self.get_node(&e.source)?;
        let t = self.get_node(&e.target)?;
        Some(self.connect(s, t, e.length, e.directed, true))
    }

    /// Drops every particle and spring. Options, source and seed state are kept.
    pub fn clear(&mut self) {
        self.particles.clear();
        self.springs.clear();
        self.index.clear();
        self.supplied.clear();
        self.pin_overrides.clear();
        self.energy = Energy::default();
        self.settled_since = None;
        self.graph_bounds = graph_bounds(&[]);
        self.viewport.reset();
    }

    /// [`clear`](Self::clear) plus a fresh RNG, a zero tick count and an empty command queue.
    pub fn reset(&mut self) {
        self.clear();
        self.pending.clear();
        self.rng = seeded_rng(&self.options);
        self.ticks = 0;
    }

    /// Like [`ParticleSystem::get_node`], but a missing label is an error.
    pub fn require_node(&self, label: &str) -> Result<ParticleId> {
        self.get_node(label).ok_or_else(|| Error::UnknownNode {
            label: label.to_string(),
        })
    }

    fn drain_commands(&mut self) {
        while let Some(command) = self.pending.pop_front() {
            let applied = match command {
                Command::SetPosition { label, position } => {
                    if !(position.is_finite() || position.is_undefined()) {
                        tracing::debug!(%label, ?position, "non-finite position ignored");
                        continue;
                    }
                    self.require_node(&label).map(|id| {
                        let p = &mut self.particles[id.0];
                        p.position = position;
                        p.velocity = Vector2::ZERO;
                    })
                }
                Command::SetPinned { label, pinned } => self.require_node(&label).map(|id| {
                    self.particles[id.0].pinned = pinned;
                    self.pin_overrides.insert(label, pinned);
                }),
                Command::Resync => {
                    if !self.resync_attached() {
                        tracing::debug!("resync requested without a graph source");
                    }
                    Ok(())
                }
            };
            if let Err(err) = applied {
                tracing::debug!(%err, "queued command ignored");
            }
        }
    }

    /// Advances the simulation by one step. `now` drives the auto-stop debounce only.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        self.drain_commands();
        self.ticks += 1;

        let opts = &self.options;
        let mut degraded = false;

        integrator::reset_velocities(&mut self.particles);
        if opts.stiffness > 0.0 {
            forces::apply_springs(&mut self.particles, &self.springs, &mut self.rng);
        }
        if opts.repulsion > 0.0 && !self.particles.is_empty() {
            let bounds = graph_bounds(&self.particles);
            if let Err(err) = forces::apply_repulsion(
                &mut self.particles,
                bounds,
                opts.repulsion,
                opts.theta,
                opts.barnes_hut,
                &mut self.rng,
            ) {
                tracing::warn!(error = %err, tick = self.ticks, "repulsion pass skipped");
                degraded = true;
            }
        }
        forces::apply_center_drift(&mut self.particles);
        if opts.gravity {
            forces::apply_center_gravity(&mut self.particles, opts.repulsion);
        }

        self.energy = integrator::integrate(&mut self.particles, opts.dt, opts.friction);

        self.graph_bounds = graph_bounds(&self.particles);
        let view_changed = self.viewport.ease_toward(self.graph_bounds);

        let converged = if self.energy.mean <= self.options.stop_threshold {
            let since = *self.settled_since.get_or_insert(now);
            now.saturating_duration_since(since) > AUTO_STOP_WINDOW
        } else {
            self.settled_since = None;
            false
        };

        TickOutcome {
            energy: self.energy,
            converged,
            view_changed,
            degraded,
        }
    }

    /// Nearest particle to a screen-space point, skipping undefined positions.
    pub fn nearest(&self, screen: Vector2) -> Option<Nearest> {
        if self.particles.is_empty() {
            return None;
        }
        let mut viewport = self.viewport.clone();
        if viewport.view_bounds().is_none() {
            viewport.ease_toward(graph_bounds(&self.particles));
        }

        let mut best: Option<Nearest> = None;
        for (i, p) in self.particles.iter().enumerate() {
            if p.position.is_degenerate() {
                continue;
            }
            let Some(at) = viewport.to_screen(p.position) else {
                continue;
            };
            let distance = at.distance(screen);
            if best.as_ref().is_none_or(|b| distance < b.distance) {
                best = Some(Nearest {
                    id: ParticleId(i),
                    label: p.label.clone(),
                    position: p.position,
                    screen: at,
                    distance,
                });
            }
        }
        best
    }
}
