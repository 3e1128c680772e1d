//! Barnes-Hut quadtree for approximate all-pairs repulsion.
//!
//! The tree is rebuilt from scratch every tick and never outlives it. Branches live in an arena
//! (`Vec<Branch>`) and reference children by index. Each branch keeps a running mass and a running
//! mass-weighted position sum; the centre of mass is only divided out during traversal.
//!
//! Traversal is breadth-first from the root. A branch whose `sqrt(size.x * size.y) / distance`
//! exceeds `theta` is opened; otherwise its aggregate acts as a single pseudo-body. `theta == 0`
//! opens every branch and reproduces the exact pairwise sum.

use crate::bounds::Bounds;
use crate::error::{Error, Result};
use crate::particle::Particle;
use crate::rng::XorShift64Star;
use crate::vector::Vector2;
use std::collections::VecDeque;

/// Fraction of a new branch's extent used to separate two coincident particles.
pub const COLLISION_JITTER: f64 = 0.08;

/// Bisection depth at which insertion gives up. Distinct finite coordinates separate long before
/// this; hitting it means positions collapsed to the same float repeatedly.
pub const MAX_DEPTH: usize = 1100;

const ROOT: usize = 0;

const NE: usize = 0;
const NW: usize = 1;
const SE: usize = 2;
const SW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Particle(usize),
    Branch(usize),
}

#[derive(Debug, Clone)]
struct Branch {
    origin: Vector2,
    size: Vector2,
    depth: usize,
    mass: f64,
    /// Sum of `position * mass` over everything that passed through this branch.
    mass_position: Vector2,
    slots: [Slot; 4],
}

impl Branch {
    fn new(origin: Vector2, size: Vector2, depth: usize) -> Self {
        Self {
            origin,
            size,
            depth,
            mass: 0.0,
            mass_position: Vector2::ZERO,
            slots: [Slot::Empty; 4],
        }
    }

    fn quadrant_of(&self, p: Vector2) -> usize {
        let rel = p - self.origin;
        let half = self.size / 2.0;
        match (rel.y < half.y, rel.x < half.x) {
            (true, true) => NW,
            (true, false) => NE,
            (false, true) => SW,
            (false, false) => SE,
        }
    }

    fn quadrant_origin(&self, quad: usize) -> Vector2 {
        let half = self.size / 2.0;
        let mut origin = self.origin;
        if quad == SE || quad == SW {
            origin.y += half.y;
        }
        if quad == NE || quad == SE {
            origin.x += half.x;
        }
        origin
    }

    fn accumulate(&mut self, position: Vector2, mass: f64) {
        self.mass += mass;
        self.mass_position += position * mass;
    }

    fn center_of_mass(&self) -> Vector2 {
        self.mass_position / self.mass
    }

    fn width(&self) -> f64 {
        (self.size.x * self.size.y).sqrt()
    }
}

#[derive(Debug, Clone)]
pub struct BarnesHutTree {
    branches: Vec<Branch>,
    theta: f64,
}

impl BarnesHutTree {
    /// Builds a tree over `bounds` and inserts every particle with a usable position.
    ///
    /// Insertion may move particles: when two share exact coordinates, the one already in the
    /// tree is jittered inside the new branch so the pair separates.
    pub fn build(
        bounds: Bounds,
        theta: f64,
        particles: &mut [Particle],
        rng: &mut XorShift64Star,
    ) -> Result<Self> {
        let mut tree = Self {
            branches: vec![Branch::new(bounds.top_left, bounds.size(), 0)],
            theta,
        };
        for idx in 0..particles.len() {
            let p = particles[idx].position;
            if p.is_degenerate() || !p.is_finite() {
                continue;
            }
            tree.insert(idx, particles, rng)?;
        }
        Ok(tree)
    }

    fn insert(
        &mut self,
        idx: usize,
        particles: &mut [Particle],
        rng: &mut XorShift64Star,
    ) -> Result<()> {
        let mut pending: Vec<(usize, usize)> = vec![(idx, ROOT)];

        while let Some((pi, bi)) = pending.pop() {
            let position = particles[pi].position;
            let mass = particles[pi].mass;
            let quad = self.branches[bi].quadrant_of(position);

            match self.branches[bi].slots[quad] {
                Slot::Empty => {
                    let branch = &mut self.branches[bi];
                    branch.slots[quad] = Slot::Particle(pi);
                    branch.accumulate(position, mass);
                }
                Slot::Branch(child) => {
                    self.branches[bi].accumulate(position, mass);
                    pending.push((pi, child));
                }
                Slot::Particle(existing) => {
                    let depth = self.branches[bi].depth + 1;
                    if depth > MAX_DEPTH {
                        return Err(Error::TreeDepthExceeded { depth: MAX_DEPTH });
                    }
                    let origin = self.branches[bi].quadrant_origin(quad);
                    let size = self.branches[bi].size / 2.0;
                    let child = self.branches.len();
                    self.branches.push(Branch::new(origin, size, depth));

                    let parent = &mut self.branches[bi];
                    parent.slots[quad] = Slot::Branch(child);
                    parent.accumulate(position, mass);

                    let old = &mut particles[existing];
                    if old.position == position {
                        old.position = jitter(old.position, origin, size, rng);
                    }

                    pending.push((existing, child));
                    pending.push((pi, child));
                }
            }
        }
        Ok(())
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn total_mass(&self) -> f64 {
        self.branches[ROOT].mass
    }

    /// Centre of mass of everything in the tree, `None` when empty.
    pub fn center_of_mass(&self) -> Option<Vector2> {
        let root = &self.branches[ROOT];
        (root.mass > 0.0).then(|| root.center_of_mass())
    }

    /// Particle indices held in leaf slots, in arena order.
    pub fn leaves(&self) -> Vec<usize> {
        self.branches
            .iter()
            .flat_map(|b| b.slots.iter())
            .filter_map(|s| match s {
                Slot::Particle(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    /// Net repulsion acting on `particles[query]`, before division by its mass.
    pub fn repulsion_on(
        &self,
        query: usize,
        particles: &[Particle],
        repulsion: f64,
        rng: &mut XorShift64Star,
    ) -> Vector2 {
        let position = particles[query].position;
        let mut total = Vector2::ZERO;
        let mut queue: VecDeque<Slot> = VecDeque::new();
        queue.push_back(Slot::Branch(ROOT));

        while let Some(slot) = queue.pop_front() {
            match slot {
                Slot::Empty => {}
                Slot::Particle(other) => {
                    if other == query {
                        continue;
                    }
                    let body = &particles[other];
                    total += repulsion_force(position - body.position, body.mass, repulsion, rng);
                }
                Slot::Branch(bi) => {
                    let branch = &self.branches[bi];
                    if branch.mass <= 0.0 {
                        continue;
                    }
                    let com = branch.center_of_mass();
                    let distance = (position - com).magnitude();
                    if branch.width() / distance > self.theta {
                        queue.extend(branch.slots.iter().copied());
                    } else {
                        total += repulsion_force(position - com, branch.mass, repulsion, rng);
                    }
                }
            }
        }
        total
    }
}

fn jitter(p: Vector2, origin: Vector2, size: Vector2, rng: &mut XorShift64Star) -> Vector2 {
    let spread = size * COLLISION_JITTER;
    let x = p.x - spread.x / 2.0 + rng.next_f64_unit() * spread.x;
    let y = p.y - spread.y / 2.0 + rng.next_f64_unit() * spread.y;
    Vector2::new(
        x.max(origin.x).min(origin.x + size.x),
        y.max(origin.y).min(origin.y + size.y),
    )
}

/// Inverse-square push away from a body of `mass` displaced by `delta`. The distance is clamped
/// to at least 1; a zero delta picks a random direction.
pub fn repulsion_force(
    delta: Vector2,
    mass: f64,
    repulsion: f64,
    rng: &mut XorShift64Star,
) -> Vector2 {
    let magnitude = delta.magnitude();
    let distance = magnitude.max(1.0);
    let direction = if magnitude > 0.0 {
        delta.normalize()
    } else {
        rng.unit_vector()
    };
    direction * (repulsion * mass) / (distance * distance)
}

/// Exact O(n²) repulsion for every particle, before division by mass. Particles with unusable
/// positions neither give nor receive force.
pub fn brute_force_repulsion(
    particles: &[Particle],
    repulsion: f64,
    rng: &mut XorShift64Star,
) -> Vec<Vector2> {
    let usable = |p: &Particle| !p.position.is_degenerate() && p.position.is_finite();
    let mut out = vec![Vector2::ZERO; particles.len()];
    for (i, a) in particles.iter().enumerate() {
        if !usable(a) {
            continue;
        }
        for (j, b) in particles.iter().enumerate() {
            if i == j || !usable(b) {
                continue;
            }
            out[i] += repulsion_force(a.position - b.position, b.mass, repulsion, rng);
        }
    }
    out
}
