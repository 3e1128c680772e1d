//! Engine-owned random source.
//!
//! Tie-breaking for zero-length deltas and the quadtree collision jitter both draw from this
//! generator, so a fixed seed makes whole layouts reproducible.

use crate::vector::Vector2;

/// xorshift64* generator.
#[derive(Debug, Clone)]
pub struct XorShift64Star {
    state: u64,
}

impl XorShift64Star {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    /// Seeds from the wall clock; used when no explicit seed is configured.
    pub fn from_entropy() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E3779B97F4A7C15);
        Self::new(nanos ^ 0x9E3779B97F4A7C15)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D_u64)
    }

    /// Uniform in `[0, 1)` with 53 bits of precision.
    pub fn next_f64_unit(&mut self) -> f64 {
        let u = self.next_u64() >> 11;
        (u as f64) / ((1u64 << 53) as f64)
    }

    /// Uniform in `(-1, 1)`.
    pub fn next_f64_signed(&mut self) -> f64 {
        (self.next_f64_unit() * 2.0) - 1.0
    }

    /// A direction of magnitude 1.
    pub fn unit_vector(&mut self) -> Vector2 {
        let angle = self.next_f64_unit() * std::f64::consts::TAU;
        Vector2::new(angle.cos(), angle.sin())
    }

    /// Uniform point in the square `[-radius, radius]²`.
    pub fn vector_in_square(&mut self, radius: f64) -> Vector2 {
        Vector2::new(
            radius * self.next_f64_signed(),
            radius * self.next_f64_signed(),
        )
    }
}
