//! SPH smoothing kernel functions and the non-pressure operators.
//!
//! Implements the 2D cubic spline kernel and its gradient, density summation,
//! the gradient-based artificial viscosity, gravity and the predicted
//! velocity consumed by the pressure solver.

use std::f32::consts::PI;

use glam::Vec2;
use rayon::prelude::*;

use crate::config::CflConfig;
use crate::particle::{display_radius, ParticleStore};

/// Distances below this are treated as coincident particles.
const MIN_DISTANCE: f32 = 1.0e-6;

/// Normalization of the 2D cubic spline: `5 / (14 pi h^2)`.
#[inline]
fn cubic_spline_norm_2d(h: f32) -> f32 {
    5.0 / (14.0 * PI * h * h)
}

/// Cubic spline smoothing kernel in 2D.
///
/// ```text
/// W(r, h) = alpha * ((2 - q)^3 - 4 (1 - q)^3)   for 0 <= q < 1
/// W(r, h) = alpha * (2 - q)^3                   for 1 <= q < 2
/// W(r, h) = 0                                   for q >= 2
/// ```
///
/// with `q = r / h` and `alpha = 5 / (14 pi h^2)`, which makes the kernel
/// integrate to one over the plane.
pub fn cubic_spline(r: f32, h: f32) -> f32 {
    let q = r / h;
    if q >= 2.0 {
        return 0.0;
    }
    let t2 = 2.0 - q;
    let t1 = (1.0 - q).max(0.0);
    cubic_spline_norm_2d(h) * (t2 * t2 * t2 - 4.0 * t1 * t1 * t1)
}

/// Gradient of the 2D cubic spline with respect to particle `i`.
///
/// `r_ij` is the displacement `x_i - x_j`. The gradient points from `i`
/// towards `j` (the kernel decreases with distance) and is zero for
/// coincident particles and outside the support.
pub fn cubic_spline_gradient(r_ij: Vec2, h: f32) -> Vec2 {
    let r = r_ij.length();
    let q = r / h;
    if q >= 2.0 || r < MIN_DISTANCE {
        return Vec2::ZERO;
    }
    let t2 = 2.0 - q;
    let t1 = (1.0 - q).max(0.0);
    let dw_dr = cubic_spline_norm_2d(h) / h * (-3.0 * t2 * t2 + 12.0 * t1 * t1);
    r_ij * (dw_dr / r)
}

// ---------------------------------------------------------------------------
// Density summation
// ---------------------------------------------------------------------------

/// Compute density, volume and display radius for every fluid particle.
///
/// ```text
/// rho_i = m_i W(0) + sum_j m_j W(|x_i - x_j|)
/// ```
///
/// The sum runs over fluid and boundary neighbors. A particle is never its own
/// neighbor, so the self term is added explicitly. Boundary samples keep the
/// density they were created with.
pub fn compute_density(store: &mut ParticleStore, h: f32) {
    let w0 = cubic_spline(0.0, h);
    let densities: Vec<f32> = (0..store.len())
        .into_par_iter()
        .map(|i| {
            if store.kind[i].is_boundary() {
                return store.density[i];
            }
            let xi = store.position[i];
            let mut rho = store.mass[i] * w0;
            for &j in store.neighbors[i].iter().chain(&store.boundary_neighbors[i]) {
                let j = j as usize;
                rho += store.mass[j] * cubic_spline(xi.distance(store.position[j]), h);
            }
            rho
        })
        .collect();

    store.density = densities;
    store
        .volume
        .par_iter_mut()
        .zip(store.radius.par_iter_mut())
        .zip(store.mass.par_iter().zip(store.density.par_iter()))
        .for_each(|((volume, radius), (&m, &rho))| {
            *volume = if rho > 0.0 { m / rho } else { 0.0 };
            *radius = display_radius(*volume);
        });
}

/// Kernel sum `sum_k W(|x_k|, h)` over an infinite square lattice of the given
/// spacing, including the origin.
///
/// A particle inside such a lattice with mass `rho0 / lattice_kernel_sum`
/// reads exactly `rho0`. The sum stops 64 spacings from the origin.
pub fn lattice_kernel_sum(h: f32, spacing: f32) -> f32 {
    let reach = ((2.0 * h / spacing).ceil() as i64).clamp(0, 64);
    let mut sum = 0.0_f64;
    for ix in -reach..=reach {
        for iy in -reach..=reach {
            let r = spacing * ((ix * ix + iy * iy) as f32).sqrt();
            sum += cubic_spline(r, h) as f64;
        }
    }
    sum as f32
}

// ---------------------------------------------------------------------------
// Viscosity, gravity and predicted velocity
// ---------------------------------------------------------------------------

/// Inputs of [`compute_non_pressure_forces`].
#[derive(Debug, Clone, Copy)]
pub struct ForceParams {
    /// Smoothing length.
    pub h: f32,
    /// Viscosity coefficient.
    pub viscosity: f32,
    /// Include boundary samples in the viscosity sum.
    pub boundary_viscosity: bool,
    /// Gravitational acceleration.
    pub gravity: Vec2,
    /// Density assigned to boundary samples in the viscosity sum.
    pub rest_density: f32,
    /// Current time step.
    pub dt: f32,
}

/// Artificial viscosity acceleration of particle `i` before scaling by the
/// viscosity coefficient.
///
/// ```text
/// visc_i = sum_j (m_j / rho_j) * ((v_i - v_j) . x_ij) / (|x_ij|^2 + 0.01 h^2) * grad W_ij
/// ```
fn viscosity_sum(store: &ParticleStore, i: usize, params: &ForceParams) -> Vec2 {
    let h = params.h;
    let eta = 0.01 * h * h;
    let xi = store.position[i];
    let vi = store.velocity[i];

    let term = |j: usize, rho_j: f32| {
        let x_ij = xi - store.position[j];
        let v_ij = vi - store.velocity[j];
        let weight = (store.mass[j] / rho_j) * v_ij.dot(x_ij) / (x_ij.length_squared() + eta);
        cubic_spline_gradient(x_ij, h) * weight
    };

    let mut sum = Vec2::ZERO;
    for &j in &store.neighbors[i] {
        let j = j as usize;
        sum += term(j, store.density[j]);
    }
    if params.boundary_viscosity {
        for &j in &store.boundary_neighbors[i] {
            sum += term(j as usize, params.rest_density);
        }
    }
    sum
}

/// Compute viscosity acceleration, net non-pressure force and predicted
/// velocity for every fluid particle.
///
/// ```text
/// forces_i = nu * visc_i + m_i * g
/// v*_i     = v_i + dt * forces_i / m_i
/// ```
///
/// Boundary samples get zero force and a predicted velocity equal to their
/// (possibly scripted) velocity.
pub fn compute_non_pressure_forces(store: &mut ParticleStore, params: &ForceParams) {
    let results: Vec<(Vec2, Vec2, Vec2)> = (0..store.len())
        .into_par_iter()
        .map(|i| {
            if store.kind[i].is_boundary() {
                return (Vec2::ZERO, Vec2::ZERO, store.velocity[i]);
            }
            let visc = viscosity_sum(store, i, params) * params.viscosity;
            let m = store.mass[i];
            let force = visc + params.gravity * m;
            let predicted = store.velocity[i] + params.dt * force / m;
            (visc, force, predicted)
        })
        .collect();

    for (i, (visc, force, predicted)) in results.into_iter().enumerate() {
        store.viscosity_acceleration[i] = visc;
        store.forces[i] = force;
        store.predicted_velocity[i] = predicted;
    }
}

// ---------------------------------------------------------------------------
// Adaptive timestep
// ---------------------------------------------------------------------------

/// CFL time step `dt = cfl * spacing / max_speed`, clamped to the configured
/// bounds. Returns `max_dt` while nothing moves.
pub fn compute_timestep(max_speed: f32, spacing: f32, cfl: &CflConfig) -> f32 {
    if max_speed <= 1.0e-12 || !max_speed.is_finite() {
        return cfl.max_dt;
    }
    (cfl.number * spacing / max_speed).clamp(cfl.min_dt, cfl.max_dt)
}
