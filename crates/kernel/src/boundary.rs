//! Boundary and fluid construction utilities.
//!
//! These generate sample positions only; the solver decides particle kind and
//! mass when it inserts them. Segments include their start point and exclude
//! their end point, so chained segments (square sides, polyline walls) never
//! place two samples on a shared corner.

use std::f32::consts::TAU;

use glam::Vec2;

/// Evenly spaced samples on the segment `a -> b`.
///
/// `n = floor(|b - a| / spacing)` samples are placed at `a + (k / n)(b - a)`
/// for `k` in `0..n`. Segments shorter than one spacing yield just `a`.
pub fn wall_segment(a: Vec2, b: Vec2, spacing: f32) -> Vec<Vec2> {
    let n = (a.distance(b) / spacing).floor() as usize;
    if n == 0 {
        return vec![a];
    }
    let step = (b - a) / n as f32;
    (0..n).map(|k| a + step * k as f32).collect()
}

/// Ring of samples on a circle, `ceil(2 pi r / spacing)` of them.
pub fn circle_ring(center: Vec2, radius: f32, spacing: f32) -> Vec<Vec2> {
    let n = ((TAU * radius) / spacing).ceil().max(1.0) as usize;
    (0..n)
        .map(|k| {
            let angle = TAU * k as f32 / n as f32;
            center + radius * Vec2::new(angle.cos(), angle.sin())
        })
        .collect()
}

/// Outline of an axis-aligned square with the given half-width.
pub fn square_ring(center: Vec2, half_width: f32, spacing: f32) -> Vec<Vec2> {
    let corners = [
        center + Vec2::new(-half_width, -half_width),
        center + Vec2::new(half_width, -half_width),
        center + Vec2::new(half_width, half_width),
        center + Vec2::new(-half_width, half_width),
    ];
    (0..4)
        .flat_map(|k| wall_segment(corners[k], corners[(k + 1) % 4], spacing))
        .collect()
}

/// Lattice filling `[min, max]` at `spacing`, both corners included when the
/// extent is a whole number of spacings.
pub fn liquid_block(min: Vec2, max: Vec2, spacing: f32) -> Vec<Vec2> {
    let extent = (max - min).max(Vec2::ZERO);
    // Tolerate round-off so an exact multiple keeps its last row.
    let nx = (extent.x / spacing + 1.0e-4).floor() as usize + 1;
    let ny = (extent.y / spacing + 1.0e-4).floor() as usize + 1;
    (0..ny)
        .flat_map(|iy| (0..nx).map(move |ix| min + spacing * Vec2::new(ix as f32, iy as f32)))
        .collect()
}

/// Row-fill seeding: `count` samples starting at `start`, advancing by
/// `spacing` along x and wrapping to a new row (one spacing further along y)
/// once a row spans `row_width`.
pub fn row_fill(start: Vec2, row_width: f32, spacing: f32, count: usize) -> Vec<Vec2> {
    let mut samples = Vec::with_capacity(count);
    let mut cursor = start;
    for _ in 0..count {
        samples.push(cursor);
        if cursor.x - start.x < row_width {
            cursor.x += spacing;
        } else {
            cursor.x = start.x;
            cursor.y += spacing;
        }
    }
    samples
}

/// Two-click wall tool.
///
/// The first click records a pending endpoint; the second emits the segment
/// between the two clicks and clears the pending point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WallTool {
    pending: Option<Vec2>,
}

impl WallTool {
    /// Tool with no pending endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint waiting for its partner, if any.
    pub fn pending(&self) -> Option<Vec2> {
        self.pending
    }

    /// Register a click. Returns the wall samples on every second click.
    pub fn click(&mut self, point: Vec2, spacing: f32) -> Option<Vec<Vec2>> {
        match self.pending.take() {
            None => {
                self.pending = Some(point);
                None
            }
            Some(start) => Some(wall_segment(start, point, spacing)),
        }
    }

    /// Forget a pending endpoint.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Sign-alternating horizontal drift for movable boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryMotion {
    /// Drift speed.
    pub speed: f32,
    /// Ticks between direction flips. Zero disables flipping.
    pub period: u64,
}

impl BoundaryMotion {
    /// Velocity imposed during tick number `tick`.
    pub fn velocity_at(&self, tick: u64) -> Vec2 {
        let forward = self.period == 0 || (tick / self.period) % 2 == 0;
        let sign = if forward { 1.0 } else { -1.0 };
        Vec2::new(sign * self.speed, 0.0)
    }
}
