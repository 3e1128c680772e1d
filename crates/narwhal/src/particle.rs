//! Physical state mirrored onto graph vertices (particles) and edges (springs).

use crate::vector::Vector2;

/// Index of a particle in the engine's particle list. Stable until the next resync or reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleId(pub usize);

/// Index of a spring in the engine's spring list. Stable until the next resync or reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpringId(pub usize);

#[derive(Debug, Clone)]
pub struct Particle {
    pub label: String,
    pub position: Vector2,
    pub velocity: Vector2,
    /// Accumulated force for the current tick, already divided by `mass`.
    pub force: Vector2,
    pub mass: f64,
    /// Pinned particles are only moved by explicit position requests.
    pub pinned: bool,
    /// Opaque payload carried for consumers.
    pub data: Option<serde_json::Value>,
    /// Id of the graph vertex this particle mirrors, when it came from a graph source.
    pub vertex: Option<String>,
}

impl Particle {
    pub fn new(label: impl Into<String>, position: Vector2) -> Self {
        Self {
            label: label.into(),
            position,
            velocity: Vector2::ZERO,
            force: Vector2::ZERO,
            mass: 1.0,
            pinned: false,
            data: None,
            vertex: None,
        }
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    /// Mass division happens here, not in the integrator.
    pub fn apply_force(&mut self, force: Vector2) {
        self.force += force / self.mass;
    }
}

#[derive(Debug, Clone)]
pub struct Spring {
    pub source: ParticleId,
    pub target: ParticleId,
    pub rest_length: f64,
    pub stiffness: f64,
    /// Rendering hint only; the force is symmetric either way.
    pub directed: bool,
}

impl Spring {
    pub fn connects(&self, source: ParticleId, target: ParticleId) -> bool {
        self.source == source && self.target == target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_force_divides_by_mass() {
        let mut p = Particle::new("a", Vector2::ZERO).with_mass(4.0);
        p.apply_force(Vector2::new(8.0, -4.0));
        p.apply_force(Vector2::new(4.0, 0.0));
        assert_eq!(p.force, Vector2::new(3.0, -1.0));
    }
}
