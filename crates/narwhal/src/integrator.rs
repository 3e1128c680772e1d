//! Explicit Euler step with friction and an explosion guard.

use crate::particle::Particle;
use crate::vector::Vector2;
use serde::Serialize;

/// Squared speed above which a velocity is considered to have exploded.
pub const EXPLOSION_LIMIT: f64 = 1_000_000.0;

/// Squared-velocity statistics over all particles after an integration step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Energy {
    pub sum: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Velocities carry no momentum across ticks: each tick starts from rest.
pub fn reset_velocities(particles: &mut [Particle]) {
    for p in particles.iter_mut() {
        p.velocity = Vector2::ZERO;
    }
}

pub fn integrate(particles: &mut [Particle], dt: f64, friction: f64) -> Energy {
    let mut energy = Energy::default();

    for p in particles.iter_mut() {
        if p.pinned {
            p.velocity = Vector2::ZERO;
        } else {
            let mut v = (p.velocity + p.force * dt) * (1.0 - friction);
            let speed_sq = v.magnitude_squared();
            if speed_sq > EXPLOSION_LIMIT {
                v = v / speed_sq;
            }
            p.velocity = v;
        }
        p.force = Vector2::ZERO;
        p.position += p.velocity * dt;

        let e = p.velocity.magnitude_squared();
        if e.is_finite() {
            energy.sum += e;
            energy.max = energy.max.max(e);
        }
        energy.count += 1;
    }

    if energy.count > 0 {
        energy.mean = energy.sum / energy.count as f64;
    }
    energy
}
