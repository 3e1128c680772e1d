//! Graph bounds, smoothed view bounds and model/view coordinate mapping.
//!
//! Graph bounds are recomputed every tick from live positions and feed the Barnes-Hut root.
//! View bounds trail them through a low-pass filter so the viewport does not jitter per tick.

use crate::particle::Particle;
use crate::vector::Vector2;
use serde::{Deserialize, Serialize};

/// Margin added on every side of the tight position box, in model units.
pub const GRAPH_MARGIN: f64 = 1.0;
/// Minimum extent per axis of the graph bounds, in model units.
pub const MIN_EXTENT: f64 = 4.0;
/// Fraction of the remaining distance the view bounds travel per update.
pub const VIEW_EASING: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub top_left: Vector2,
    pub bottom_right: Vector2,
}

impl Bounds {
    pub fn new(top_left: Vector2, bottom_right: Vector2) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    pub fn size(&self) -> Vector2 {
        self.bottom_right - self.top_left
    }

    pub fn center(&self) -> Vector2 {
        self.top_left + self.size() / 2.0
    }

    pub fn contains(&self, p: Vector2) -> bool {
        p.x >= self.top_left.x
            && p.x <= self.bottom_right.x
            && p.y >= self.top_left.y
            && p.y <= self.bottom_right.y
    }

    /// Tight box over the non-degenerate positions, or `None` when there are none.
    pub fn enclosing(particles: &[Particle]) -> Option<Bounds> {
        let mut out: Option<Bounds> = None;
        for p in particles {
            let pt = p.position;
            if pt.is_degenerate() || !pt.is_finite() {
                continue;
            }
            match out.as_mut() {
                None => out = Some(Bounds::new(pt, pt)),
                Some(b) => {
                    b.top_left.x = b.top_left.x.min(pt.x);
                    b.top_left.y = b.top_left.y.min(pt.y);
                    b.bottom_right.x = b.bottom_right.x.max(pt.x);
                    b.bottom_right.y = b.bottom_right.y.max(pt.y);
                }
            }
        }
        out
    }
}

/// Padded, floored bounding box of the live positions. Falls back to `(-1,-1)..(1,1)` before
/// padding when no particle has a usable position.
pub fn graph_bounds(particles: &[Particle]) -> Bounds {
    let tight = Bounds::enclosing(particles)
        .unwrap_or_else(|| Bounds::new(Vector2::new(-1.0, -1.0), Vector2::new(1.0, 1.0)));
    let margin = Vector2::new(GRAPH_MARGIN, GRAPH_MARGIN);
    let padded = Bounds::new(tight.top_left - margin, tight.bottom_right + margin);

    let center = padded.center();
    let size = padded.size();
    let half = Vector2::new(size.x.max(MIN_EXTENT), size.y.max(MIN_EXTENT)) / 2.0;
    Bounds::new(center - half, center + half)
}

/// Screen geometry plus the eased view bounds used for coordinate mapping.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    /// Pixel margins: top, right, bottom, left.
    pub padding: [f64; 4],
    view_bounds: Option<Bounds>,
}

impl Viewport {
    pub fn new(width: f64, height: f64, padding: [f64; 4]) -> Self {
        Self {
            width,
            height,
            padding,
            view_bounds: None,
        }
    }

    pub fn view_bounds(&self) -> Option<Bounds> {
        self.view_bounds
    }

    pub fn reset(&mut self) {
        self.view_bounds = None;
    }

    /// Moves the view bounds toward `target`. The first call snaps; later calls blend by
    /// [`VIEW_EASING`] and only commit once the change amounts to more than a pixel. Returns
    /// whether the view bounds changed.
    pub fn ease_toward(&mut self, target: Bounds) -> bool {
        let Some(current) = self.view_bounds else {
            self.view_bounds = Some(target);
            return true;
        };

        let eased = Bounds::new(
            current.top_left + (target.top_left - current.top_left) * VIEW_EASING,
            current.bottom_right + (target.bottom_right - current.bottom_right) * VIEW_EASING,
        );
        let moved_tl = current.top_left.distance(eased.top_left);
        let moved_br = current.bottom_right.distance(eased.bottom_right);
        if moved_tl * self.width > 1.0 || moved_br * self.height > 1.0 {
            self.view_bounds = Some(eased);
            return true;
        }
        false
    }

    fn drawable(&self) -> Vector2 {
        let [top, right, bottom, left] = self.padding;
        Vector2::new(self.width - (left + right), self.height - (top + bottom))
    }

    pub fn to_screen(&self, p: Vector2) -> Option<Vector2> {
        let bounds = self.view_bounds?;
        let size = bounds.size();
        let drawable = self.drawable();
        let rel = p - bounds.top_left;
        Some(Vector2::new(
            self.padding[3] + rel.x / size.x * drawable.x,
            self.padding[0] + rel.y / size.y * drawable.y,
        ))
    }

    pub fn from_screen(&self, s: Vector2) -> Option<Vector2> {
        let bounds = self.view_bounds?;
        let size = bounds.size();
        let drawable = self.drawable();
        Some(Vector2::new(
            (s.x - self.padding[3]) / drawable.x * size.x + bounds.top_left.x,
            (s.y - self.padding[0]) / drawable.y * size.y + bounds.top_left.y,
        ))
    }
}
