//! Space-filling curves that map 2D cell coordinates to a 1D cell index.
//!
//! Sorting particles by this index keeps spatially close particles close in
//! memory. Three orderings are supported:
//!
//! - [`SpaceFillingCurve::Xyz`]: row-major, `cx + cy * cells_per_row`.
//! - [`SpaceFillingCurve::ZOrder`]: Morton code, bits of `cx` and `cy`
//!   interleaved with bit 0 of `cx` in bit 0 of the result.
//! - [`SpaceFillingCurve::Hilbert`]: distance along a Hilbert curve covering
//!   the smallest power-of-two square that contains the grid.
//!
//! Every encoding has an exact inverse, so a compact cell entry can be turned
//! back into its Cartesian coordinate.

use serde::{Deserialize, Serialize};

/// Largest supported number of cells along one axis. Morton and Hilbert
/// indices of 16-bit coordinates fit into a `u32`.
pub const MAX_CELLS_PER_AXIS: u32 = 1 << 16;

/// Cell ordering, chosen once when the solver is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpaceFillingCurve {
    /// Row-major order.
    Xyz,
    /// Morton / Z-order.
    #[default]
    ZOrder,
    /// Hilbert order.
    Hilbert,
}

/// Encoder/decoder for one grid size and one curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellEncoder {
    curve: SpaceFillingCurve,
    cells_per_row: u32,
    /// Side of the Hilbert square, a power of two.
    hilbert_side: u32,
}

impl CellEncoder {
    /// Build an encoder for a grid of `cells_x` by `cells_y` cells.
    ///
    /// Both dimensions must be in `1..=MAX_CELLS_PER_AXIS`; the solver
    /// configuration checks this before a grid is ever built.
    pub fn new(curve: SpaceFillingCurve, cells_x: u32, cells_y: u32) -> Self {
        debug_assert!(cells_x >= 1 && cells_x <= MAX_CELLS_PER_AXIS);
        debug_assert!(cells_y >= 1 && cells_y <= MAX_CELLS_PER_AXIS);
        Self {
            curve,
            cells_per_row: cells_x.max(1),
            hilbert_side: cells_x.max(cells_y).max(1).next_power_of_two(),
        }
    }

    /// Curve this encoder implements.
    pub fn curve(&self) -> SpaceFillingCurve {
        self.curve
    }

    /// Encode a cell coordinate.
    #[inline]
    pub fn encode(&self, cx: u32, cy: u32) -> u32 {
        match self.curve {
            SpaceFillingCurve::Xyz => cx + cy * self.cells_per_row,
            SpaceFillingCurve::ZOrder => morton_encode(cx, cy),
            SpaceFillingCurve::Hilbert => hilbert_encode(self.hilbert_side, cx, cy),
        }
    }

    /// Decode a cell index produced by [`CellEncoder::encode`].
    #[inline]
    pub fn decode(&self, index: u32) -> (u32, u32) {
        match self.curve {
            SpaceFillingCurve::Xyz => (index % self.cells_per_row, index / self.cells_per_row),
            SpaceFillingCurve::ZOrder => morton_decode(index),
            SpaceFillingCurve::Hilbert => hilbert_decode(self.hilbert_side, index),
        }
    }
}

// ---------------------------------------------------------------------------
// Morton / Z-order
// ---------------------------------------------------------------------------

/// Spread the low 16 bits of `v` so that bit `k` lands on bit `2k`.
#[inline]
fn part1by1(v: u32) -> u32 {
    let mut x = v & 0x0000_ffff;
    x = (x | (x << 8)) & 0x00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333;
    x = (x | (x << 1)) & 0x5555_5555;
    x
}

/// Inverse of [`part1by1`]: gather the even bits of `v`.
#[inline]
fn compact1by1(v: u32) -> u32 {
    let mut x = v & 0x5555_5555;
    x = (x ^ (x >> 1)) & 0x3333_3333;
    x = (x ^ (x >> 2)) & 0x0f0f_0f0f;
    x = (x ^ (x >> 4)) & 0x00ff_00ff;
    x = (x ^ (x >> 8)) & 0x0000_ffff;
    x
}

/// Interleave `cx` (even bits) and `cy` (odd bits).
#[inline]
pub fn morton_encode(cx: u32, cy: u32) -> u32 {
    part1by1(cx) | (part1by1(cy) << 1)
}

/// Split a Morton code back into `(cx, cy)`.
#[inline]
pub fn morton_decode(code: u32) -> (u32, u32) {
    (compact1by1(code), compact1by1(code >> 1))
}

// ---------------------------------------------------------------------------
// Hilbert
// ---------------------------------------------------------------------------

/// Rotate/flip a quadrant so the sub-curve has the canonical orientation.
#[inline]
fn hilbert_rotate(side: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = side - 1 - *x;
            *y = side - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

/// Distance of `(cx, cy)` along the Hilbert curve filling a `side` x `side`
/// square. `side` must be a power of two.
pub fn hilbert_encode(side: u32, cx: u32, cy: u32) -> u32 {
    let n = side as u64;
    let (mut x, mut y) = (cx as u64, cy as u64);
    let mut d = 0u64;
    let mut s = n / 2;
    while s > 0 {
        let rx = u64::from(x & s > 0);
        let ry = u64::from(y & s > 0);
        d += s * s * ((3 * rx) ^ ry);
        hilbert_rotate(n, &mut x, &mut y, rx, ry);
        s /= 2;
    }
    d as u32
}

/// Inverse of [`hilbert_encode`].
pub fn hilbert_decode(side: u32, index: u32) -> (u32, u32) {
    let n = side as u64;
    let mut t = index as u64;
    let (mut x, mut y) = (0u64, 0u64);
    let mut s = 1u64;
    while s < n {
        let rx = 1 & (t / 2);
        let ry = 1 & (t ^ rx);
        hilbert_rotate(s, &mut x, &mut y, rx, ry);
        x += s * rx;
        y += s * ry;
        t /= 4;
        s *= 2;
    }
    (x as u32, y as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURVES: [SpaceFillingCurve; 3] = [
        SpaceFillingCurve::Xyz,
        SpaceFillingCurve::ZOrder,
        SpaceFillingCurve::Hilbert,
    ];

    #[test]
    fn round_trip_every_cell_of_non_square_grid() {
        for curve in CURVES {
            let encoder = CellEncoder::new(curve, 37, 21);
            for cy in 0..21 {
                for cx in 0..37 {
                    let index = encoder.encode(cx, cy);
                    assert_eq!(
                        encoder.decode(index),
                        (cx, cy),
                        "{curve:?} failed for ({cx}, {cy}) -> {index}"
                    );
                }
            }
        }
    }

    #[test]
    fn round_trip_at_axis_limit() {
        let max = MAX_CELLS_PER_AXIS - 1;
        for curve in CURVES {
            let encoder = CellEncoder::new(curve, MAX_CELLS_PER_AXIS, MAX_CELLS_PER_AXIS);
            for &(cx, cy) in &[(0, 0), (max, 0), (0, max), (max, max), (12345, 54321)] {
                assert_eq!(encoder.decode(encoder.encode(cx, cy)), (cx, cy), "{curve:?}");
            }
        }
    }

    #[test]
    fn encodings_are_unique() {
        for curve in CURVES {
            let encoder = CellEncoder::new(curve, 16, 16);
            let mut seen: Vec<u32> = (0..16)
                .flat_map(|cy| (0..16).map(move |cx| (cx, cy)))
                .map(|(cx, cy)| encoder.encode(cx, cy))
                .collect();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), 256, "{curve:?} produced duplicate indices");
        }
    }

    #[test]
    fn morton_interleaves_x_first() {
        assert_eq!(morton_encode(1, 0), 0b01);
        assert_eq!(morton_encode(0, 1), 0b10);
        assert_eq!(morton_encode(3, 0), 0b0101);
        assert_eq!(morton_encode(2, 3), 0b1110);
    }

    #[test]
    fn hilbert_first_order_visits_quadrants_in_u_shape() {
        let order: Vec<(u32, u32)> = (0..4).map(|d| hilbert_decode(2, d)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 1), (1, 0)]);
    }

    #[test]
    fn hilbert_steps_are_unit_length() {
        let side = 32;
        let mut prev = hilbert_decode(side, 0);
        for d in 1..side * side {
            let next = hilbert_decode(side, d);
            let dist = prev.0.abs_diff(next.0) + prev.1.abs_diff(next.1);
            assert_eq!(dist, 1, "jump between {d} and its predecessor");
            prev = next;
        }
    }

    #[test]
    fn row_major_matches_formula() {
        let encoder = CellEncoder::new(SpaceFillingCurve::Xyz, 10, 4);
        assert_eq!(encoder.encode(3, 2), 23);
        assert_eq!(encoder.decode(23), (3, 2));
    }
}
