//! Boundary invariance under a churning open box.
//!
//! Static boundary samples must never move, pressures must stay
//! non-negative, and total mass must be conserved while fluid sloshes under
//! gravity. Movable walls follow the scripted drift exactly.

use std::collections::HashMap;

use glam::Vec2;
use kernel::{ParticleId, ParticleKind, Solver, SolverConfig};

fn unit_config() -> SolverConfig {
    let mut config = SolverConfig {
        kernel_support: 1.0,
        particle_spacing: 1.0,
        boundary_viscosity: true,
        ..SolverConfig::default()
    };
    config.grid.domain_min = Vec2::splat(-20.0);
    config.grid.domain_max = Vec2::splat(20.0);
    config
}

fn open_box(solver: &mut Solver) -> Vec<ParticleId> {
    let mut walls = solver.add_wall(Vec2::new(-1.0, 6.0), Vec2::new(7.0, 6.0));
    walls.extend(solver.add_wall(Vec2::new(-1.0, -3.0), Vec2::new(-1.0, 6.0)));
    walls.extend(solver.add_wall(Vec2::new(6.0, -3.0), Vec2::new(6.0, 6.0)));
    solver.add_liquid_block(Vec2::ZERO, Vec2::splat(5.0));
    walls
}

#[test]
fn static_boundary_never_moves() {
    let mut solver = Solver::new(unit_config()).unwrap();
    let walls = open_box(&mut solver);

    let initial: HashMap<ParticleId, Vec2> = walls
        .iter()
        .map(|&id| (id, solver.inspect(id).unwrap().position))
        .collect();
    let initial_mass = solver.particles().total_mass();
    let fluid = solver.particles().fluid_count();

    for step in 0..100 {
        solver.tick();
        let p = solver.particles();

        for (&id, &x0) in &initial {
            let i = p.index_of(id).unwrap();
            // Bit-identical, not just close.
            assert_eq!(p.position[i], x0, "boundary {id:?} moved at step {step}");
            assert_eq!(p.kind[i], ParticleKind::Boundary);
        }
        assert!(
            p.pressure.iter().all(|&pr| pr >= 0.0),
            "negative pressure at step {step}"
        );
        assert_eq!(p.fluid_count(), fluid);
        assert_eq!(p.total_mass(), initial_mass, "mass changed at step {step}");
    }

    let metrics = solver.error_metrics();
    eprintln!("open box after 100 ticks: {metrics:?}");
    assert_eq!(metrics.mass_drift, 0.0);
}

#[test]
fn boundary_pressure_stays_zero() {
    let mut solver = Solver::new(unit_config()).unwrap();
    let walls = open_box(&mut solver);
    for _ in 0..20 {
        solver.tick();
    }
    for id in walls {
        let state = solver.inspect(id).unwrap();
        assert_eq!(state.pressure, 0.0, "boundary {id:?} carries pressure");
        assert_eq!(state.velocity, Vec2::ZERO);
    }
}

#[test]
fn movable_wall_follows_scripted_drift() {
    let mut config = unit_config();
    config.gravity = Vec2::ZERO;
    config.movable_boundary.speed = 1.0;
    config.movable_boundary.period = 10;
    let dt = config.time_step;

    let mut solver = Solver::new(config).unwrap();
    let wall = solver.add_movable_wall(Vec2::new(0.0, 0.0), Vec2::new(0.0, 5.0));
    assert_eq!(wall.len(), 5);
    let start: Vec<Vec2> = wall.iter().map(|&id| solver.inspect(id).unwrap().position).collect();

    for _ in 0..10 {
        solver.tick();
    }
    for (&id, &x0) in wall.iter().zip(&start) {
        let now = solver.inspect(id).unwrap();
        assert_eq!(now.kind, ParticleKind::MovableBoundary);
        assert!(
            (now.position.x - x0.x - 10.0 * dt).abs() < 1.0e-5,
            "forward drift wrong: {} -> {}",
            x0,
            now.position
        );
        assert_eq!(now.position.y, x0.y);
    }

    // Second half of the period runs back to the start.
    for _ in 0..10 {
        solver.tick();
    }
    for (&id, &x0) in wall.iter().zip(&start) {
        let now = solver.inspect(id).unwrap().position;
        assert!((now.x - x0.x).abs() < 1.0e-5, "wall did not return: {x0} -> {now}");
    }
}
