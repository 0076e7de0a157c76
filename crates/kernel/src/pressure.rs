//! Implicit incompressible SPH (IISPH) pressure solver.
//!
//! Solves `A p = s` for the pressure field without assembling `A`: every
//! matrix-vector product is recomputed from neighbor kernel gradients. The
//! iteration is a relaxed Jacobi sweep with non-negative clamping.
//!
//! ```text
//! s_i  = rho0 - rho_i - dt sum_f m_j (v*_i - v*_j) . gradW_ij
//!                     - dt sum_b m_b (v*_i - v_b)  . gradW_ib
//! a_i  = -sum_f m_j (p_i + p_j) / rho0^2 gradW_ij - gamma sum_b m_b 2 p_i / rho0^2 gradW_ib
//! Ap_i = dt^2 (sum_f m_j (a_i - a_j) . gradW_ij + sum_b m_b a_i . gradW_ib)
//! p_i <- max(p_i + omega (s_i - Ap_i) / a_ii, 0)
//! ```
//!
//! Kernel gradients do not change during the iteration, so they are computed
//! once per solve and cached alongside the neighbor lists.

use glam::Vec2;
use rayon::prelude::*;

use crate::config::PressureConfig;
use crate::particle::ParticleStore;
use crate::sph::cubic_spline_gradient;

/// Outcome of one pressure solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SolveStats {
    /// Jacobi sweeps performed.
    pub iterations: u32,
    /// Average predicted density error relative to rest density.
    pub density_error: f32,
    /// Whether the error threshold was reached before the iteration cap.
    pub converged: bool,
}

/// IISPH solver with per-solve gradient caches.
#[derive(Debug, Clone)]
pub struct PressureSolver {
    config: PressureConfig,
    fluid_gradients: Vec<Vec<Vec2>>,
    boundary_gradients: Vec<Vec<Vec2>>,
}

impl PressureSolver {
    /// Create a solver with the given convergence controls.
    pub fn new(config: PressureConfig) -> Self {
        Self {
            config,
            fluid_gradients: Vec::new(),
            boundary_gradients: Vec::new(),
        }
    }

    /// Convergence controls in use.
    pub fn config(&self) -> &PressureConfig {
        &self.config
    }

    /// Run the full solve: initialization, iteration loop, and a final
    /// pressure acceleration evaluated with the converged pressures.
    ///
    /// Expects fresh neighbor lists, densities and predicted velocities.
    pub fn compute(&mut self, store: &mut ParticleStore, rest_density: f32, dt: f32, h: f32) -> SolveStats {
        let fluid_count = store.fluid_count();
        store.pressure.par_iter_mut().for_each(|p| *p = 0.0);
        if fluid_count == 0 {
            store.pressure_acceleration.par_iter_mut().for_each(|a| *a = Vec2::ZERO);
            return SolveStats {
                iterations: 0,
                density_error: 0.0,
                converged: true,
            };
        }

        self.cache_gradients(store, h);
        self.initialize(store, rest_density, dt);

        let PressureConfig {
            min_iterations,
            max_iterations,
            error_threshold,
            ..
        } = self.config;

        let mut iterations = 0u32;
        let mut density_error = f32::INFINITY;
        while (density_error > error_threshold || iterations < min_iterations) && iterations < max_iterations {
            self.update_pressure_acceleration(store, rest_density);
            let error_sum = self.update_divergence(store, dt);
            self.relax(store);
            iterations += 1;
            density_error = (error_sum / rest_density as f64 / fluid_count as f64) as f32;
        }

        let converged = density_error <= error_threshold;
        if !converged {
            tracing::warn!(
                iterations,
                density_error,
                threshold = error_threshold,
                "pressure solve hit the iteration cap without converging"
            );
        }

        self.update_pressure_acceleration(store, rest_density);

        SolveStats {
            iterations,
            density_error,
            converged,
        }
    }

    fn cache_gradients(&mut self, store: &ParticleStore, h: f32) {
        let gradients = |lists: &[Vec<u32>]| -> Vec<Vec<Vec2>> {
            lists
                .par_iter()
                .enumerate()
                .map(|(i, list)| {
                    // Only fluid rows are read; skip the boundary ones.
                    if store.kind[i].is_boundary() {
                        return Vec::new();
                    }
                    let xi = store.position[i];
                    list.iter()
                        .map(|&j| cubic_spline_gradient(xi - store.position[j as usize], h))
                        .collect()
                })
                .collect()
        };
        self.fluid_gradients = gradients(&store.neighbors);
        self.boundary_gradients = gradients(&store.boundary_neighbors);
    }

    /// Source term and diagonal element for every fluid particle.
    ///
    /// ```text
    /// s_i = rho0 - rho_i - dt sum_j m_j (v*_i - v*_j) . grad W_ij
    ///                    - dt sum_b m_b (v*_i - v_b) . grad W_ib
    /// ```
    ///
    /// Static samples have `v_b = 0`. A movable wall compresses the fluid it
    /// moves into.
    fn initialize(&self, store: &mut ParticleStore, rest_density: f32, dt: f32) {
        let gamma = self.config.boundary_gamma;
        let inv_rho0_sq = 1.0 / (rest_density * rest_density);

        let terms: Vec<(f32, f32)> = (0..store.len())
            .into_par_iter()
            .map(|i| {
                if store.kind[i].is_boundary() {
                    return (0.0, 0.0);
                }
                let fluid = &store.neighbors[i];
                let boundary = &store.boundary_neighbors[i];
                let fluid_grads = &self.fluid_gradients[i];
                let boundary_grads = &self.boundary_gradients[i];
                let vi = store.predicted_velocity[i];
                let mi = store.mass[i];

                let mut fluid_div = 0.0;
                let mut fluid_grad_sum = Vec2::ZERO;
                for (&j, &g) in fluid.iter().zip(fluid_grads) {
                    let j = j as usize;
                    fluid_div += store.mass[j] * (vi - store.predicted_velocity[j]).dot(g);
                    fluid_grad_sum += g * (store.mass[j] * inv_rho0_sq);
                }
                let mut boundary_div = 0.0;
                let mut boundary_grad_sum = Vec2::ZERO;
                for (&b, &g) in boundary.iter().zip(boundary_grads) {
                    let b = b as usize;
                    boundary_div += store.mass[b] * (vi - store.predicted_velocity[b]).dot(g);
                    boundary_grad_sum += g * (store.mass[b] * inv_rho0_sq);
                }
                let source = rest_density - store.density[i] - dt * fluid_div - dt * boundary_div;

                // Pressure acceleration of i per unit p_i, then its effect on
                // i's own density change.
                let c = -fluid_grad_sum - 2.0 * gamma * boundary_grad_sum;
                let mut diagonal = 0.0;
                for (&j, &g) in fluid.iter().zip(fluid_grads) {
                    let mj = store.mass[j as usize];
                    diagonal += mj * c.dot(g);
                    diagonal -= mj * (mi * inv_rho0_sq) * g.length_squared();
                }
                for (&b, &g) in boundary.iter().zip(boundary_grads) {
                    diagonal += store.mass[b as usize] * c.dot(g);
                }
                (source, dt * dt * diagonal)
            })
            .collect();

        for (i, (source, diagonal)) in terms.into_iter().enumerate() {
            store.source_term[i] = source;
            store.diagonal[i] = diagonal;
        }
    }

    fn update_pressure_acceleration(&self, store: &mut ParticleStore, rest_density: f32) {
        let gamma = self.config.boundary_gamma;
        let inv_rho0_sq = 1.0 / (rest_density * rest_density);

        let accelerations: Vec<Vec2> = (0..store.len())
            .into_par_iter()
            .map(|i| {
                if store.kind[i].is_boundary() {
                    return Vec2::ZERO;
                }
                let pi = store.pressure[i];
                let mut acc = Vec2::ZERO;
                for (&j, &g) in store.neighbors[i].iter().zip(&self.fluid_gradients[i]) {
                    let j = j as usize;
                    acc -= g * (store.mass[j] * (pi + store.pressure[j]) * inv_rho0_sq);
                }
                for (&b, &g) in store.boundary_neighbors[i].iter().zip(&self.boundary_gradients[i]) {
                    acc -= g * (gamma * store.mass[b as usize] * 2.0 * pi * inv_rho0_sq);
                }
                acc
            })
            .collect();

        store.pressure_acceleration = accelerations;
    }

    /// Density change produced by the current pressure accelerations and the
    /// summed positive density error, reduced across workers.
    fn update_divergence(&self, store: &mut ParticleStore, dt: f32) -> f64 {
        let divergence: Vec<(f32, f32)> = (0..store.len())
            .into_par_iter()
            .map(|i| {
                if store.kind[i].is_boundary() {
                    return (0.0, 0.0);
                }
                let ai = store.pressure_acceleration[i];
                let mut sum = 0.0;
                for (&j, &g) in store.neighbors[i].iter().zip(&self.fluid_gradients[i]) {
                    let j = j as usize;
                    sum += store.mass[j] * (ai - store.pressure_acceleration[j]).dot(g);
                }
                for (&b, &g) in store.boundary_neighbors[i].iter().zip(&self.boundary_gradients[i]) {
                    sum += store.mass[b as usize] * ai.dot(g);
                }
                let div = dt * dt * sum;
                (div, (div - store.source_term[i]).max(0.0))
            })
            .collect();

        let error_sum = divergence
            .par_iter()
            .map(|&(_, error)| error as f64)
            .sum::<f64>();

        for (i, (div, error)) in divergence.into_iter().enumerate() {
            store.neg_velocity_divergence[i] = div;
            store.density_error[i] = error;
        }
        error_sum
    }

    /// Jacobi relaxation. Particles with a zero diagonal keep their pressure.
    fn relax(&self, store: &mut ParticleStore) {
        let omega = self.config.relaxation;
        let kind = &store.kind;
        let diagonal = &store.diagonal;
        let source = &store.source_term;
        let divergence = &store.neg_velocity_divergence;
        store
            .pressure
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, p)| {
                if kind[i].is_boundary() || diagonal[i] == 0.0 {
                    return;
                }
                *p = (*p + omega * (source[i] - divergence[i]) / diagonal[i]).max(0.0);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::ParticleKind;
    use crate::sph::compute_density;

    fn config() -> PressureConfig {
        PressureConfig {
            min_iterations: 2,
            max_iterations: 100,
            error_threshold: 0.001,
            relaxation: 0.5,
            boundary_gamma: 1.0,
        }
    }

    /// Fluid pair with hand-built neighbor lists.
    fn compressed_pair(distance: f32) -> ParticleStore {
        let mut store = ParticleStore::new();
        store.push(Vec2::ZERO, 1.0, 1.0, ParticleKind::Fluid);
        store.push(Vec2::new(distance, 0.0), 1.0, 1.0, ParticleKind::Fluid);
        store.neighbors[0].push(1);
        store.neighbors[1].push(0);
        store
    }

    #[test]
    fn isolated_particle_has_zero_diagonal_and_pressure() {
        let mut store = ParticleStore::new();
        store.push(Vec2::ZERO, 1.0, 1.0, ParticleKind::Fluid);
        compute_density(&mut store, 1.0);
        let mut solver = PressureSolver::new(config());
        let stats = solver.compute(&mut store, 1.0, 0.01, 1.0);
        assert_eq!(store.diagonal[0], 0.0);
        assert_eq!(store.pressure[0], 0.0);
        assert_eq!(store.pressure_acceleration[0], Vec2::ZERO);
        assert!(stats.iterations >= 2);
    }

    #[test]
    fn diagonal_is_negative_with_neighbors() {
        let mut store = compressed_pair(0.5);
        compute_density(&mut store, 1.0);
        let mut solver = PressureSolver::new(config());
        solver.compute(&mut store, 1.0, 0.01, 1.0);
        assert!(store.diagonal[0] < 0.0, "diagonal = {}", store.diagonal[0]);
        assert_eq!(store.diagonal[0], store.diagonal[1]);
    }

    #[test]
    fn pressure_is_never_negative() {
        // A diverging pair wants tension; the clamp must remove it.
        let mut store = compressed_pair(0.8);
        compute_density(&mut store, 1.0);
        store.predicted_velocity[0] = Vec2::new(-5.0, 0.0);
        store.predicted_velocity[1] = Vec2::new(5.0, 0.0);
        let mut solver = PressureSolver::new(config());
        solver.compute(&mut store, 1.0, 0.01, 1.0);
        assert!(store.pressure.iter().all(|&p| p >= 0.0), "{:?}", store.pressure);
    }

    #[test]
    fn approaching_pair_is_pushed_apart() {
        let mut store = compressed_pair(0.8);
        compute_density(&mut store, 1.0);
        store.predicted_velocity[0] = Vec2::new(100.0, 0.0);
        store.predicted_velocity[1] = Vec2::new(-100.0, 0.0);
        let mut solver = PressureSolver::new(config());
        solver.compute(&mut store, 1.0, 0.01, 1.0);
        assert!(store.pressure[0] > 0.0);
        assert!(store.pressure_acceleration[0].x < 0.0);
        assert!(store.pressure_acceleration[1].x > 0.0);
        let net = store.pressure_acceleration[0] + store.pressure_acceleration[1];
        let scale = store.pressure_acceleration[0].length();
        assert!(net.length() <= 1.0e-5 * scale, "net pressure acceleration {net}");
    }

    /// Fluid particle at rest beside one boundary sample moving at `wall_velocity`.
    fn fluid_beside_wall(wall_velocity: Vec2) -> ParticleStore {
        let mut store = ParticleStore::new();
        store.push(Vec2::ZERO, 1.0, 1.0, ParticleKind::Fluid);
        store.push(Vec2::new(0.8, 0.0), 1.0, 1.0, ParticleKind::MovableBoundary);
        store.boundary_neighbors[0].push(1);
        store.velocity[1] = wall_velocity;
        store.predicted_velocity[1] = wall_velocity;
        compute_density(&mut store, 1.0);
        store
    }

    #[test]
    fn approaching_wall_lowers_source_term() {
        let mut resting = fluid_beside_wall(Vec2::ZERO);
        let mut approaching = fluid_beside_wall(Vec2::new(-500.0, 0.0));
        let mut solver = PressureSolver::new(config());
        solver.compute(&mut resting, 1.0, 0.01, 1.0);
        solver.compute(&mut approaching, 1.0, 0.01, 1.0);
        eprintln!(
            "source at rest = {}, approaching = {}",
            resting.source_term[0], approaching.source_term[0]
        );
        assert!(
            approaching.source_term[0] < resting.source_term[0],
            "an incoming wall must predict compression: {} vs {}",
            approaching.source_term[0],
            resting.source_term[0]
        );
        assert!(approaching.pressure[0] > resting.pressure[0]);
        assert!(approaching.pressure_acceleration[0].x < 0.0);
    }

    #[test]
    fn receding_wall_matches_fluid_moving_away() {
        // Only the relative velocity enters the boundary divergence.
        let mut wall_moves = fluid_beside_wall(Vec2::new(3.0, 0.0));
        let mut fluid_moves = fluid_beside_wall(Vec2::ZERO);
        fluid_moves.predicted_velocity[0] = Vec2::new(-3.0, 0.0);
        let mut solver = PressureSolver::new(config());
        solver.compute(&mut wall_moves, 1.0, 0.01, 1.0);
        solver.compute(&mut fluid_moves, 1.0, 0.01, 1.0);
        let a = wall_moves.source_term[0];
        let b = fluid_moves.source_term[0];
        assert!((a - b).abs() < 1.0e-6, "source terms differ: {a} vs {b}");
    }

    #[test]
    fn iteration_cap_is_respected() {
        let mut store = compressed_pair(0.8);
        compute_density(&mut store, 1.0);
        store.predicted_velocity[0] = Vec2::new(100.0, 0.0);
        store.predicted_velocity[1] = Vec2::new(-100.0, 0.0);
        let mut solver = PressureSolver::new(PressureConfig {
            min_iterations: 1,
            max_iterations: 1,
            error_threshold: 1.0e-12,
            ..config()
        });
        let stats = solver.compute(&mut store, 1.0, 0.01, 1.0);
        assert_eq!(stats.iterations, 1);
        assert!(!stats.converged);
    }

    #[test]
    fn empty_store_is_trivially_converged() {
        let mut store = ParticleStore::new();
        let mut solver = PressureSolver::new(config());
        let stats = solver.compute(&mut store, 1.0, 0.01, 1.0);
        assert_eq!(stats, SolveStats { iterations: 0, density_error: 0.0, converged: true });
    }
}
