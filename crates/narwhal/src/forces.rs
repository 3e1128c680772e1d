//! Force passes run once per tick. Every pass only accumulates into `Particle::force`; nothing here
//! moves a particle except the collision jitter done while building the quadtree.

use crate::barnes_hut::{BarnesHutTree, brute_force_repulsion};
use crate::bounds::Bounds;
use crate::error::Result;
use crate::particle::{Particle, Spring};
use crate::rng::XorShift64Star;
use crate::vector::Vector2;

/// Hooke's law along every spring, split evenly between the two endpoints.
pub fn apply_springs(particles: &mut [Particle], springs: &[Spring], rng: &mut XorShift64Star) {
    for spring in springs {
        let (s, t) = (spring.source.0, spring.target.0);
        if s >= particles.len() || t >= particles.len() {
            continue;
        }
        let (ps, pt) = (particles[s].position, particles[t].position);
        if !(ps.is_finite() && pt.is_finite()) {
            continue;
        }
        let delta = pt - ps;
        let magnitude = delta.magnitude();
        let direction = if magnitude > 0.0 {
            delta.normalize()
        } else {
            rng.unit_vector()
        };
        let q = spring.stiffness * (spring.rest_length - magnitude);
        particles[s].apply_force(direction * (-q / 2.0));
        particles[t].apply_force(direction * (q / 2.0));
    }
}

/// Mutual repulsion. With `barnes_hut` a fresh quadtree over `bounds` approximates the far field;
/// without it every pair is summed exactly.
pub fn apply_repulsion(
    particles: &mut [Particle],
    bounds: Bounds,
    repulsion: f64,
    theta: f64,
    barnes_hut: bool,
    rng: &mut XorShift64Star,
) -> Result<()> {
    if !barnes_hut {
        let forces = brute_force_repulsion(particles, repulsion, rng);
        for (p, f) in particles.iter_mut().zip(forces) {
            p.apply_force(f);
        }
        return Ok(());
    }

    let tree = BarnesHutTree::build(bounds, theta, particles, rng)?;
    for i in 0..particles.len() {
        let p = particles[i].position;
        if p.is_degenerate() || !p.is_finite() {
            continue;
        }
        let f = tree.repulsion_on(i, particles, repulsion, rng);
        particles[i].apply_force(f);
    }
    Ok(())
}

/// Pulls every particle by minus the mean of the finite positions so the layout does not wander
/// off.
pub fn apply_center_drift(particles: &mut [Particle]) {
    let mut sum = Vector2::ZERO;
    let mut count = 0usize;
    for p in particles.iter() {
        if !p.position.is_finite() {
            continue;
        }
        sum += p.position;
        count += 1;
    }
    if count == 0 {
        return;
    }
    let drift = -sum / count as f64;
    for p in particles.iter_mut() {
        p.apply_force(drift);
    }
}

/// Attraction toward the origin, proportional to distance.
pub fn apply_center_gravity(particles: &mut [Particle], repulsion: f64) {
    let strength = repulsion / 100.0;
    for p in particles.iter_mut() {
        if !p.position.is_finite() {
            continue;
        }
        let f = -p.position * strength;
        p.apply_force(f);
    }
}
