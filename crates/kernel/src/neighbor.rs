//! Compressed linked-cell neighbor search ordered by a space-filling curve.
//!
//! Each pass:
//!
//! 1. encodes every particle's grid cell with the configured curve,
//! 2. stably sorts the particle store by that cell index,
//! 3. scans the sorted store into a compact array with one entry per
//!    occupied cell,
//! 4. for every occupied cell, finds the occupied cells of its 3x3
//!    neighborhood in the compact array and collects every particle pair
//!    closer than the support radius.
//!
//! Cells are `2h` wide, so the 3x3 neighborhood always contains every particle
//! within `2h`. Positions outside the configured box are clamped onto the edge
//! cells, which keeps the search correct (just slower) for escaped particles.

use std::ops::Range;

use glam::Vec2;
use rayon::prelude::*;

use crate::curve::{CellEncoder, SpaceFillingCurve};
use crate::particle::ParticleStore;

/// One occupied cell in the sorted particle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactCell {
    /// Index of the cell's first particle in the sorted store.
    pub first_particle: u32,
    /// Encoded cell coordinate. Unique within one pass.
    pub cell_index: u32,
}

/// Uniform grid plus the compact cell array of the last pass.
#[derive(Debug, Clone)]
pub struct NeighborSearch {
    cell_size: f32,
    radius_sq: f32,
    grid_min: Vec2,
    grid_dims: [u32; 2],
    encoder: CellEncoder,
    compact_cells: Vec<CompactCell>,
}

impl NeighborSearch {
    /// Create a search structure for particles with smoothing length `h`
    /// inside `[domain_min, domain_max]`.
    ///
    /// The domain is expected to have been validated (see
    /// `SolverConfig::validate`); degenerate extents collapse to one cell.
    pub fn new(h: f32, domain_min: Vec2, domain_max: Vec2, curve: SpaceFillingCurve) -> Self {
        let cell_size = 2.0 * h;
        let extent = domain_max - domain_min;
        let dims = [
            (extent.x / cell_size).ceil().max(1.0) as u32,
            (extent.y / cell_size).ceil().max(1.0) as u32,
        ];
        Self {
            cell_size,
            radius_sq: cell_size * cell_size,
            grid_min: domain_min,
            grid_dims: dims,
            encoder: CellEncoder::new(curve, dims[0], dims[1]),
            compact_cells: Vec::new(),
        }
    }

    /// Grid cell edge length, `2h`.
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Cells along x and y.
    pub fn grid_dims(&self) -> [u32; 2] {
        self.grid_dims
    }

    /// Encoder used for cell indices.
    pub fn encoder(&self) -> &CellEncoder {
        &self.encoder
    }

    /// Occupied cells of the last pass, ordered by first particle.
    pub fn compact_cells(&self) -> &[CompactCell] {
        &self.compact_cells
    }

    /// Half-open particle range of compact entry `entry`.
    pub fn cell_range(&self, entry: usize, particle_count: usize) -> Range<usize> {
        let start = self.compact_cells[entry].first_particle as usize;
        let end = self
            .compact_cells
            .get(entry + 1)
            .map_or(particle_count, |next| next.first_particle as usize);
        start..end
    }

    /// Map a world-space position to a cell `(cx, cy)`, clamped to the grid.
    #[inline]
    pub fn pos_to_cell(&self, p: Vec2) -> (u32, u32) {
        let cx = ((p.x - self.grid_min.x) / self.cell_size)
            .floor()
            .max(0.0)
            .min((self.grid_dims[0] - 1) as f32) as u32;
        let cy = ((p.y - self.grid_min.y) / self.cell_size)
            .floor()
            .max(0.0)
            .min((self.grid_dims[1] - 1) as f32) as u32;
        (cx, cy)
    }

    /// Run one full pass: sort the store by cell and rebuild every neighbor
    /// list. Ids stay valid; array indices do not.
    pub fn compute(&mut self, store: &mut ParticleStore) {
        let n = store.len();
        if n == 0 {
            self.compact_cells.clear();
            return;
        }

        // --- 1. Cell index per particle ---
        let cell_indices: Vec<u32> = store
            .position
            .par_iter()
            .map(|&p| {
                let (cx, cy) = self.pos_to_cell(p);
                self.encoder.encode(cx, cy)
            })
            .collect();
        store.cell_index = cell_indices;

        // --- 2. Stable sort by cell index ---
        let already_sorted = store.cell_index.windows(2).all(|w| w[0] <= w[1]);
        if !already_sorted {
            let mut order: Vec<u32> = (0..n as u32).collect();
            order.par_sort_by_key(|&i| store.cell_index[i as usize]);
            store.permute(&order);
        }

        // --- 3. Compact cell array ---
        self.compact_cells.clear();
        for (i, &cell_index) in store.cell_index.iter().enumerate() {
            let starts_cell = self
                .compact_cells
                .last()
                .map_or(true, |last| last.cell_index != cell_index);
            if starts_cell {
                self.compact_cells.push(CompactCell {
                    first_particle: i as u32,
                    cell_index,
                });
            }
        }

        // --- 4. Candidate ranges per occupied cell ---
        let candidates: Vec<Vec<Range<usize>>> = (0..self.compact_cells.len())
            .into_par_iter()
            .map(|entry| self.stencil_ranges(entry, n))
            .collect();

        // Map each particle to its compact entry.
        let mut entry_of = vec![0u32; n];
        for entry in 0..self.compact_cells.len() {
            for i in self.cell_range(entry, n) {
                entry_of[i] = entry as u32;
            }
        }

        // --- 5. Pairwise distance checks; each particle writes its own lists ---
        let radius_sq = self.radius_sq;
        let position = &store.position;
        let kind = &store.kind;
        let (fluid, boundary): (Vec<Vec<u32>>, Vec<Vec<u32>>) = (0..n)
            .into_par_iter()
            .map(|i| {
                let xi = position[i];
                let mut fluid = Vec::new();
                let mut boundary = Vec::new();
                for range in &candidates[entry_of[i] as usize] {
                    for j in range.clone() {
                        if j == i || xi.distance_squared(position[j]) >= radius_sq {
                            continue;
                        }
                        if kind[j].is_boundary() {
                            boundary.push(j as u32);
                        } else {
                            fluid.push(j as u32);
                        }
                    }
                }
                (fluid, boundary)
            })
            .unzip();

        store.neighbors = fluid;
        store.boundary_neighbors = boundary;
    }

    /// Particle ranges of the occupied cells in the 3x3 block around `entry`.
    fn stencil_ranges(&self, entry: usize, particle_count: usize) -> Vec<Range<usize>> {
        let (cx, cy) = self.encoder.decode(self.compact_cells[entry].cell_index);
        let mut ranges = Vec::with_capacity(9);
        for dy in -1i64..=1 {
            let ny = cy as i64 + dy;
            if ny < 0 || ny >= self.grid_dims[1] as i64 {
                continue;
            }
            for dx in -1i64..=1 {
                let nx = cx as i64 + dx;
                if nx < 0 || nx >= self.grid_dims[0] as i64 {
                    continue;
                }
                let target = self.encoder.encode(nx as u32, ny as u32);
                if let Some(found) = self.find_cell(target) {
                    ranges.push(self.cell_range(found, particle_count));
                }
            }
        }
        ranges
    }

    /// Compact entry holding `cell_index`, if that cell is occupied.
    ///
    /// Entries are sorted by cell index because the store is.
    #[inline]
    fn find_cell(&self, cell_index: u32) -> Option<usize> {
        self.compact_cells
            .binary_search_by_key(&cell_index, |c| c.cell_index)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::ParticleKind;

    fn store_with(points: &[(f32, f32, ParticleKind)]) -> ParticleStore {
        let mut store = ParticleStore::new();
        for &(x, y, kind) in points {
            store.push(Vec2::new(x, y), 1.0, 1.0, kind);
        }
        store
    }

    fn neighbors_of(store: &ParticleStore, id: u32) -> Vec<u32> {
        let i = store.index_of(crate::particle::ParticleId(id)).unwrap();
        let mut ids: Vec<u32> = store.neighbors[i]
            .iter()
            .chain(&store.boundary_neighbors[i])
            .map(|&j| store.id[j as usize].0)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn single_particle_no_neighbors() {
        let mut store = store_with(&[(5.0, 5.0, ParticleKind::Fluid)]);
        let mut search = NeighborSearch::new(1.0, Vec2::ZERO, Vec2::splat(10.0), SpaceFillingCurve::ZOrder);
        search.compute(&mut store);
        assert!(store.neighbors[0].is_empty());
        assert_eq!(search.compact_cells().len(), 1);
    }

    #[test]
    fn two_close_particles() {
        let mut store = store_with(&[(5.0, 5.0, ParticleKind::Fluid), (5.5, 5.0, ParticleKind::Fluid)]);
        let mut search = NeighborSearch::new(1.0, Vec2::ZERO, Vec2::splat(10.0), SpaceFillingCurve::Xyz);
        search.compute(&mut store);
        assert_eq!(neighbors_of(&store, 0), vec![1]);
        assert_eq!(neighbors_of(&store, 1), vec![0]);
    }

    #[test]
    fn radius_is_exclusive() {
        let mut store = store_with(&[(1.0, 1.0, ParticleKind::Fluid), (3.0, 1.0, ParticleKind::Fluid)]);
        let mut search = NeighborSearch::new(1.0, Vec2::ZERO, Vec2::splat(10.0), SpaceFillingCurve::Xyz);
        search.compute(&mut store);
        assert!(neighbors_of(&store, 0).is_empty());
    }

    #[test]
    fn particles_across_cell_boundary() {
        // Cells are 2 wide; 1.9 and 2.1 fall into adjacent cells.
        let mut store = store_with(&[(1.9, 1.0, ParticleKind::Fluid), (2.1, 1.0, ParticleKind::Fluid)]);
        let mut search = NeighborSearch::new(1.0, Vec2::ZERO, Vec2::splat(10.0), SpaceFillingCurve::Hilbert);
        search.compute(&mut store);
        assert_eq!(neighbors_of(&store, 0), vec![1]);
    }

    #[test]
    fn diagonal_cells_are_searched() {
        let mut store = store_with(&[(1.9, 1.9, ParticleKind::Fluid), (2.1, 2.1, ParticleKind::Fluid)]);
        let mut search = NeighborSearch::new(1.0, Vec2::ZERO, Vec2::splat(10.0), SpaceFillingCurve::ZOrder);
        search.compute(&mut store);
        assert_eq!(neighbors_of(&store, 0), vec![1]);
        assert_eq!(neighbors_of(&store, 1), vec![0]);
    }

    #[test]
    fn boundary_neighbors_are_partitioned() {
        let mut store = store_with(&[
            (5.0, 5.0, ParticleKind::Fluid),
            (5.5, 5.0, ParticleKind::Boundary),
            (5.0, 5.5, ParticleKind::MovableBoundary),
            (4.5, 5.0, ParticleKind::Fluid),
        ]);
        let mut search = NeighborSearch::new(1.0, Vec2::ZERO, Vec2::splat(10.0), SpaceFillingCurve::ZOrder);
        search.compute(&mut store);
        let i = store.index_of(crate::particle::ParticleId(0)).unwrap();
        assert_eq!(store.neighbors[i].len(), 1);
        assert_eq!(store.boundary_neighbors[i].len(), 2);
    }

    #[test]
    fn store_is_sorted_and_compact_array_is_consistent() {
        let points: Vec<(f32, f32, ParticleKind)> = (0..50)
            .map(|k| ((k * 7 % 19) as f32 * 0.5, (k * 3 % 17) as f32 * 0.5, ParticleKind::Fluid))
            .collect();
        let mut store = store_with(&points);
        let mut search = NeighborSearch::new(1.0, Vec2::ZERO, Vec2::splat(10.0), SpaceFillingCurve::Hilbert);
        search.compute(&mut store);

        assert!(store.cell_index.windows(2).all(|w| w[0] <= w[1]));
        let cells = search.compact_cells();
        for pair in cells.windows(2) {
            assert!(pair[0].first_particle < pair[1].first_particle);
            assert!(pair[0].cell_index < pair[1].cell_index);
        }
        for entry in 0..cells.len() {
            for i in search.cell_range(entry, store.len()) {
                assert_eq!(store.cell_index[i], cells[entry].cell_index);
            }
        }
    }

    #[test]
    fn particles_outside_domain_are_clamped() {
        let mut store = store_with(&[(-50.0, 5.0, ParticleKind::Fluid), (-49.5, 5.0, ParticleKind::Fluid)]);
        let mut search = NeighborSearch::new(1.0, Vec2::ZERO, Vec2::splat(10.0), SpaceFillingCurve::ZOrder);
        search.compute(&mut store);
        assert_eq!(neighbors_of(&store, 0), vec![1]);
    }
}
