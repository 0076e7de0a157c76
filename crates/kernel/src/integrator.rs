//! Semi-implicit (symplectic) Euler time integration.

use glam::Vec2;
use rayon::prelude::*;

use crate::particle::{ParticleKind, ParticleStore};

/// Add the mass-scaled pressure acceleration to the net force of every fluid
/// particle.
pub fn apply_pressure_force(store: &mut ParticleStore) {
    let kind = &store.kind;
    let mass = &store.mass;
    let pressure_acceleration = &store.pressure_acceleration;
    store
        .forces
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, force)| {
            if kind[i].is_fluid() {
                *force += pressure_acceleration[i] * mass[i];
            }
        });
}

/// Advance one step of length `dt` and return the largest fluid speed.
///
/// - fluid: `v += dt F / m`, then `x += dt v`
/// - movable boundary: `x += dt v` with the scripted velocity
/// - static boundary: untouched
///
/// `position_old` receives the pre-step position of every integrated particle.
pub fn integrate(store: &mut ParticleStore, dt: f32) -> f32 {
    let kind = &store.kind;
    let mass = &store.mass;
    let forces = &store.forces;
    store
        .position
        .par_iter_mut()
        .zip(store.position_old.par_iter_mut())
        .zip(store.velocity.par_iter_mut())
        .enumerate()
        .map(|(i, ((x, x_old), v))| match kind[i] {
            ParticleKind::Fluid => {
                *v += dt * forces[i] / mass[i];
                *x_old = *x;
                *x += dt * *v;
                v.length()
            }
            ParticleKind::MovableBoundary => {
                *x_old = *x;
                *x += dt * *v;
                0.0
            }
            ParticleKind::Boundary => 0.0,
        })
        .reduce(|| 0.0, f32::max)
}

/// Set the velocity of every movable boundary sample.
pub fn apply_scripted_velocity(store: &mut ParticleStore, velocity: Vec2) {
    let kind = &store.kind;
    store
        .velocity
        .par_iter_mut()
        .enumerate()
        .filter(|(i, _)| kind[*i] == ParticleKind::MovableBoundary)
        .for_each(|(_, v)| *v = velocity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fluid_follows_symplectic_euler() {
        let mut store = ParticleStore::new();
        store.push(Vec2::new(1.0, 1.0), 2.0, 1.0, ParticleKind::Fluid);
        store.velocity[0] = Vec2::new(1.0, 0.0);
        store.forces[0] = Vec2::new(0.0, 4.0);

        let max_speed = integrate(&mut store, 0.5);

        // v = (1, 0) + 0.5 * (0, 4) / 2 = (1, 1); x = (1, 1) + 0.5 * (1, 1)
        assert_eq!(store.velocity[0], Vec2::new(1.0, 1.0));
        assert_eq!(store.position[0], Vec2::new(1.5, 1.5));
        assert_eq!(store.position_old[0], Vec2::new(1.0, 1.0));
        assert!((max_speed - 2.0_f32.sqrt()).abs() < 1.0e-6);
    }

    #[test]
    fn static_boundary_is_untouched() {
        let mut store = ParticleStore::new();
        store.push(Vec2::new(3.0, 4.0), 1.0, 1.0, ParticleKind::Boundary);
        store.velocity[0] = Vec2::new(9.0, 9.0);
        store.forces[0] = Vec2::new(9.0, 9.0);
        integrate(&mut store, 0.1);
        assert_eq!(store.position[0], Vec2::new(3.0, 4.0));
    }

    #[test]
    fn movable_boundary_uses_scripted_velocity() {
        let mut store = ParticleStore::new();
        store.push(Vec2::ZERO, 1.0, 1.0, ParticleKind::MovableBoundary);
        store.push(Vec2::ZERO, 1.0, 1.0, ParticleKind::Fluid);
        store.forces[0] = Vec2::new(0.0, 100.0);
        apply_scripted_velocity(&mut store, Vec2::new(2.0, 0.0));
        let max_speed = integrate(&mut store, 0.5);
        assert_eq!(store.position[0], Vec2::new(1.0, 0.0));
        assert_eq!(store.velocity[1], Vec2::ZERO);
        assert_eq!(max_speed, 0.0);
    }

    #[test]
    fn pressure_force_is_mass_scaled() {
        let mut store = ParticleStore::new();
        store.push(Vec2::ZERO, 3.0, 1.0, ParticleKind::Fluid);
        store.push(Vec2::ONE, 3.0, 1.0, ParticleKind::Boundary);
        store.forces[0] = Vec2::new(1.0, 0.0);
        store.pressure_acceleration = vec![Vec2::new(0.0, 2.0), Vec2::new(5.0, 5.0)];
        apply_pressure_force(&mut store);
        assert_eq!(store.forces[0], Vec2::new(1.0, 6.0));
        assert_eq!(store.forces[1], Vec2::ZERO);
    }
}
