//! Two-particle symmetry test.
//!
//! Verifies Newton's 3rd law (forces equal and opposite) and momentum
//! conservation for a mirrored pair that is heavy enough to build pressure.

use glam::Vec2;
use kernel::{ParticleId, ParticleKind, Solver, SolverConfig};

/// Mirrored pair approaching each other along the x-axis, no gravity.
fn setup_two_particles(speed: f32) -> (Solver, ParticleId, ParticleId) {
    let mut config = SolverConfig {
        kernel_support: 1.0,
        particle_spacing: 1.0,
        // Twice the rest mass so the pair is compressed from the start.
        particle_mass: Some(2.0),
        gravity: Vec2::ZERO,
        ..SolverConfig::default()
    };
    config.grid.domain_min = Vec2::splat(-10.0);
    config.grid.domain_max = Vec2::splat(10.0);

    let mut solver = Solver::new(config).unwrap();
    let a = solver.add_particle(Vec2::new(-0.4, 0.0), ParticleKind::Fluid);
    let b = solver.add_particle(Vec2::new(0.4, 0.0), ParticleKind::Fluid);
    solver.set_velocity(a, Vec2::new(speed, 0.0));
    solver.set_velocity(b, Vec2::new(-speed, 0.0));
    (solver, a, b)
}

fn momentum(solver: &Solver) -> Vec2 {
    let p = solver.particles();
    (0..p.len()).map(|i| p.velocity[i] * p.mass[i]).sum()
}

#[test]
fn forces_equal_and_opposite() {
    let (mut solver, a, b) = setup_two_particles(1.0);
    solver.tick();

    let p = solver.particles();
    let ia = p.index_of(a).unwrap();
    let ib = p.index_of(b).unwrap();

    assert!(p.pressure[ia] > 0.0, "pair should be compressed, p = {}", p.pressure[ia]);
    assert!(
        (p.pressure[ia] - p.pressure[ib]).abs() <= 1.0e-6 * p.pressure[ia],
        "pressures differ: {} vs {}",
        p.pressure[ia],
        p.pressure[ib]
    );

    let fa = p.forces[ia];
    let fb = p.forces[ib];
    let tol = 1.0e-5 * fa.length().max(1.0);
    eprintln!("fa = {fa}, fb = {fb}");
    assert!(
        (fa + fb).length() < tol,
        "forces not equal and opposite: fa={fa}, fb={fb}"
    );
    // Pressure pushes a to the left, b to the right.
    assert!(p.pressure_acceleration[ia].x < 0.0);
    assert!(p.pressure_acceleration[ib].x > 0.0);
    // The force should be along the x-axis only (by symmetry).
    assert!(fa.y.abs() < tol, "fa.y should be ~0, got {}", fa.y);
}

#[test]
fn momentum_conserved() {
    let (mut solver, _, _) = setup_two_particles(2.0);
    let initial = momentum(&solver);
    assert!(initial.length() < 1.0e-10, "initial momentum should be 0");

    for _ in 0..20 {
        solver.tick();
    }

    let last = momentum(&solver);
    let scale = 2.0 * 2.0;
    assert!(
        last.length() < scale * 1.0e-4,
        "momentum not conserved: initial={initial}, final={last}"
    );
}
