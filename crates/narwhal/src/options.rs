use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tunables of the simulation. Unknown JSON keys are rejected; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct LayoutOptions {
    /// Repulsion coefficient between every pair of particles.
    pub repulsion: f64,
    /// Spring constant applied to every edge.
    pub stiffness: f64,
    /// Fraction of velocity removed per tick, in `[0, 1]`.
    pub friction: f64,
    /// Integration timestep.
    pub dt: f64,
    /// Barnes-Hut accuracy threshold. `0` opens every branch.
    pub theta: f64,
    /// Adds a pull toward the origin scaled by `repulsion / 100`.
    pub gravity: bool,
    /// Use the quadtree approximation; when off, repulsion is summed exactly over all pairs.
    pub barnes_hut: bool,
    /// Mean squared velocity at or below which the layout counts as settled.
    pub stop_threshold: f64,
    /// Stop ticking once settled for the debounce window.
    pub auto_stop: bool,
    pub tick_interval_ms: u64,
    /// Seed for the engine RNG. Unset means seeded from the clock.
    pub random_seed: Option<u64>,
    /// Rest length for edges added without an explicit length.
    pub default_edge_length: f64,
    pub viewport: ViewportOptions,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            repulsion: 1000.0,
            stiffness: 600.0,
            friction: 0.5,
            dt: 0.02,
            theta: 0.4,
            gravity: false,
            barnes_hut: true,
            stop_threshold: 0.05,
            auto_stop: true,
            tick_interval_ms: 18,
            random_seed: None,
            default_edge_length: 1.0,
            viewport: ViewportOptions::default(),
        }
    }
}

impl LayoutOptions {
    pub fn validate(&self) -> Result<()> {
        non_negative("repulsion", self.repulsion)?;
        non_negative("stiffness", self.stiffness)?;
        non_negative("theta", self.theta)?;
        non_negative("stopThreshold", self.stop_threshold)?;
        non_negative("defaultEdgeLength", self.default_edge_length)?;
        if !self.friction.is_finite() || !(0.0..=1.0).contains(&self.friction) {
            return Err(invalid("friction", self.friction));
        }
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(invalid("dt", self.dt));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("tickIntervalMs", self.tick_interval_ms));
        }
        self.viewport.validate()
    }
}

/// Screen geometry used to map model coordinates to pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ViewportOptions {
    pub width: f64,
    pub height: f64,
    /// Top, right, bottom, left.
    pub padding: [f64; 4],
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            padding: [20.0; 4],
        }
    }
}

impl ViewportOptions {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("viewport.width", self.width), ("viewport.height", self.height)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(invalid(name, v));
            }
        }
        for v in self.padding {
            non_negative("viewport.padding", v)?;
        }
        let [top, right, bottom, left] = self.padding;
        if left + right >= self.width {
            return Err(invalid("viewport.padding", left + right));
        }
        if top + bottom >= self.height {
            return Err(invalid("viewport.padding", top + bottom));
        }
        Ok(())
    }
}

fn non_negative(name: &'static str, v: f64) -> Result<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(invalid(name, v))
    }
}

fn invalid(name: &'static str, value: impl ToString) -> Error {
    Error::InvalidOption {
        name,
        value: value.to_string(),
    }
}
