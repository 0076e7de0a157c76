//! Particle data structures using a struct-of-arrays layout.
//!
//! Every per-particle field lives in its own `Vec`, and index `i` across all of
//! them refers to the same particle. The neighbor search reorders the whole
//! store by grid cell once per tick, so anything that must survive a tick
//! refers to particles by [`ParticleId`] rather than by array index.

use glam::Vec2;
use rayon::prelude::*;

/// Particle role discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum ParticleKind {
    /// Free fluid particle, integrated from forces.
    Fluid = 0,
    /// Static boundary sample, never integrated.
    Boundary = 1,
    /// Boundary sample driven by a scripted velocity.
    MovableBoundary = 2,
}

impl ParticleKind {
    /// `true` for both static and movable boundary samples.
    #[inline]
    pub fn is_boundary(self) -> bool {
        !matches!(self, ParticleKind::Fluid)
    }

    /// `true` for fluid particles.
    #[inline]
    pub fn is_fluid(self) -> bool {
        matches!(self, ParticleKind::Fluid)
    }
}

/// Stable particle handle. Unlike the array index it does not change when the
/// store is sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ParticleId(pub u32);

/// Struct-of-arrays particle storage.
#[derive(Debug, Clone, Default)]
pub struct ParticleStore {
    // ---- Identity ----
    /// Stable id of each particle.
    pub id: Vec<ParticleId>,
    /// Role of each particle.
    pub kind: Vec<ParticleKind>,

    // ---- Kinematics ----
    /// Current positions.
    pub position: Vec<Vec2>,
    /// Positions before the most recent integration.
    pub position_old: Vec<Vec2>,
    /// Velocities, the only vector field carried across ticks.
    pub velocity: Vec<Vec2>,
    /// Velocity after non-pressure forces only.
    pub predicted_velocity: Vec<Vec2>,

    // ---- Forces ----
    /// Net force (mass-scaled) applied by the integrator.
    pub forces: Vec<Vec2>,
    /// Acceleration due to pressure.
    pub pressure_acceleration: Vec<Vec2>,
    /// Acceleration due to viscosity.
    pub viscosity_acceleration: Vec<Vec2>,

    // ---- Scalar fields ----
    /// Particle mass.
    pub mass: Vec<f32>,
    /// Density from neighbor summation.
    pub density: Vec<f32>,
    /// `mass / density`.
    pub volume: Vec<f32>,
    /// Display radius derived from the volume.
    pub radius: Vec<f32>,
    /// Pressure, never negative after a solve.
    pub pressure: Vec<f32>,
    /// Diagonal of the implicit pressure operator. Zero skips relaxation.
    pub diagonal: Vec<f32>,
    /// Right hand side of the pressure system.
    pub source_term: Vec<f32>,
    /// `max(negVelocityDivergence - sourceTerm, 0)` from the last iteration.
    pub density_error: Vec<f32>,
    /// Density change produced by the current pressure field.
    pub neg_velocity_divergence: Vec<f32>,
    /// Encoded grid cell, recomputed by every neighbor search.
    pub cell_index: Vec<u32>,

    // ---- Neighborhoods ----
    /// Fluid neighbors as indices into this store.
    pub neighbors: Vec<Vec<u32>>,
    /// Boundary neighbors as indices into this store.
    pub boundary_neighbors: Vec<Vec<u32>>,

    /// `id_to_index[id]` is the current array index of particle `id`.
    id_to_index: Vec<u32>,
}

impl ParticleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of particles currently stored.
    pub fn len(&self) -> usize {
        self.position.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Append a particle at rest and return its id.
    ///
    /// Density starts at `rest_density` so boundary samples carry a sensible
    /// value for viscosity and display without ever being summed.
    pub fn push(&mut self, position: Vec2, mass: f32, rest_density: f32, kind: ParticleKind) -> ParticleId {
        let id = ParticleId(self.id_to_index.len() as u32);
        self.id_to_index.push(self.len() as u32);

        let volume = mass / rest_density;
        self.id.push(id);
        self.kind.push(kind);
        self.position.push(position);
        self.position_old.push(position);
        self.velocity.push(Vec2::ZERO);
        self.predicted_velocity.push(Vec2::ZERO);
        self.forces.push(Vec2::ZERO);
        self.pressure_acceleration.push(Vec2::ZERO);
        self.viscosity_acceleration.push(Vec2::ZERO);
        self.mass.push(mass);
        self.density.push(rest_density);
        self.volume.push(volume);
        self.radius.push(display_radius(volume));
        self.pressure.push(0.0);
        self.diagonal.push(0.0);
        self.source_term.push(0.0);
        self.density_error.push(0.0);
        self.neg_velocity_divergence.push(0.0);
        self.cell_index.push(0);
        self.neighbors.push(Vec::new());
        self.boundary_neighbors.push(Vec::new());
        id
    }

    /// Remove every particle. Ids restart from zero.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Current array index of `id`, if it exists.
    pub fn index_of(&self, id: ParticleId) -> Option<usize> {
        self.id_to_index.get(id.0 as usize).map(|&i| i as usize)
    }

    /// Number of fluid particles.
    pub fn fluid_count(&self) -> usize {
        self.kind.iter().filter(|k| k.is_fluid()).count()
    }

    /// Sum of all particle masses, accumulated in double precision.
    pub fn total_mass(&self) -> f64 {
        self.mass.iter().map(|&m| m as f64).sum()
    }

    /// Reorder every per-particle field so that new index `k` holds the
    /// particle previously at `order[k]`, then rebuild the id map.
    ///
    /// Neighbor lists are emptied rather than remapped; the caller is about to
    /// rebuild them.
    pub fn permute(&mut self, order: &[u32]) {
        debug_assert_eq!(order.len(), self.len());

        gather(&mut self.id, order);
        gather(&mut self.kind, order);
        gather(&mut self.position, order);
        gather(&mut self.position_old, order);
        gather(&mut self.velocity, order);
        gather(&mut self.predicted_velocity, order);
        gather(&mut self.forces, order);
        gather(&mut self.pressure_acceleration, order);
        gather(&mut self.viscosity_acceleration, order);
        gather(&mut self.mass, order);
        gather(&mut self.density, order);
        gather(&mut self.volume, order);
        gather(&mut self.radius, order);
        gather(&mut self.pressure, order);
        gather(&mut self.diagonal, order);
        gather(&mut self.source_term, order);
        gather(&mut self.density_error, order);
        gather(&mut self.neg_velocity_divergence, order);
        gather(&mut self.cell_index, order);

        for (index, id) in self.id.iter().enumerate() {
            self.id_to_index[id.0 as usize] = index as u32;
        }
        for list in self.neighbors.iter_mut().chain(self.boundary_neighbors.iter_mut()) {
            list.clear();
        }
    }

    /// Render-facing view of one particle.
    pub fn view(&self, index: usize) -> ParticleView {
        ParticleView {
            id: self.id[index],
            position: self.position[index],
            radius: self.radius[index],
            kind: self.kind[index],
        }
    }
}

/// What a renderer needs to draw one particle.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParticleView {
    /// Stable id.
    pub id: ParticleId,
    /// Current position.
    pub position: Vec2,
    /// Display radius.
    pub radius: f32,
    /// Fluid or boundary, used for coloring.
    pub kind: ParticleKind,
}

/// Radius of a disc with area `volume`.
#[inline]
pub fn display_radius(volume: f32) -> f32 {
    (volume.max(0.0) / std::f32::consts::PI).sqrt()
}

fn gather<T: Copy + Send + Sync>(values: &mut Vec<T>, order: &[u32]) {
    let reordered: Vec<T> = order.par_iter().map(|&src| values[src as usize]).collect();
    *values = reordered;
}
