//! Scene construction: turns a [`SceneConfig`] into particles on a solver.

use kernel::{ParticleKind, Solver};

use crate::config::{BoundaryShape, SceneConfig};

/// Particle counts produced by [`build_scene`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneSummary {
    /// Fluid particles
    pub fluid: usize,
    /// Static boundary samples
    pub boundary: usize,
    /// Movable boundary samples
    pub movable: usize,
}

impl SceneSummary {
    /// All particles created.
    pub fn total(&self) -> usize {
        self.fluid + self.boundary + self.movable
    }
}

/// Place a boundary outline around the world center.
pub fn build_boundary(solver: &mut Solver, shape: BoundaryShape) -> usize {
    match shape {
        BoundaryShape::Circle => solver.build_circle_boundary().len(),
        BoundaryShape::Square => solver.build_square_boundary().len(),
        BoundaryShape::None => 0,
    }
}

/// Build every element of `scene` on `solver`
///
/// Boundaries go in first so that fluid seeded against them sees them from
/// the first tick.
pub fn build_scene(solver: &mut Solver, scene: &SceneConfig) -> SceneSummary {
    let mut summary = SceneSummary {
        boundary: build_boundary(solver, scene.boundary),
        ..SceneSummary::default()
    };

    for wall in &scene.walls {
        summary.boundary += solver.add_wall(wall.start, wall.end).len();
    }
    for wall in &scene.movable_walls {
        summary.movable += solver.add_movable_wall(wall.start, wall.end).len();
    }
    for block in &scene.liquid_blocks {
        summary.fluid += solver.add_liquid_block(block.min, block.max).len();
    }
    for spawn in &scene.particles {
        let id = solver.add_particle(spawn.position, spawn.kind);
        solver.set_velocity(id, spawn.velocity);
        match spawn.kind {
            ParticleKind::Fluid => summary.fluid += 1,
            ParticleKind::Boundary => summary.boundary += 1,
            ParticleKind::MovableBoundary => summary.movable += 1,
        }
    }
    if scene.seed_particles > 0 {
        summary.fluid += solver.seed_liquid(scene.seed_particles).len();
    }

    tracing::info!(
        "Scene built: {} fluid, {} boundary, {} movable boundary particles",
        summary.fluid,
        summary.boundary,
        summary.movable
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LiquidBlock, ParticleSpawn, WallConfig};
    use glam::Vec2;
    use kernel::SolverConfig;

    #[test]
    fn test_scene_counts_match_solver() {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        let scene = SceneConfig {
            boundary: BoundaryShape::Square,
            walls: vec![WallConfig {
                start: Vec2::new(400.0, 500.0),
                end: Vec2::new(500.0, 500.0),
            }],
            movable_walls: vec![WallConfig {
                start: Vec2::new(400.0, 300.0),
                end: Vec2::new(400.0, 350.0),
            }],
            liquid_blocks: vec![LiquidBlock {
                min: Vec2::new(500.0, 200.0),
                max: Vec2::new(520.0, 220.0),
            }],
            particles: vec![ParticleSpawn {
                position: Vec2::new(600.0, 350.0),
                velocity: Vec2::new(1.0, 0.0),
                kind: ParticleKind::Fluid,
            }],
            seed_particles: 12,
        };

        let summary = build_scene(&mut solver, &scene);
        // Square of half-width 300 at spacing 5: 4 sides of 120 samples.
        assert_eq!(summary.boundary, 480 + 20);
        assert_eq!(summary.movable, 10);
        assert_eq!(summary.fluid, 25 + 1 + 12);
        assert_eq!(summary.total(), solver.particle_count());
        assert_eq!(solver.particles().fluid_count(), summary.fluid);
    }

    #[test]
    fn test_spawned_velocity_is_applied() {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        let scene = SceneConfig {
            particles: vec![ParticleSpawn {
                position: Vec2::new(600.0, 350.0),
                velocity: Vec2::new(3.0, -1.0),
                kind: ParticleKind::Fluid,
            }],
            ..SceneConfig::default()
        };
        build_scene(&mut solver, &scene);
        assert_eq!(solver.particles().velocity[0], Vec2::new(3.0, -1.0));
    }

    #[test]
    fn test_no_boundary_shape_adds_nothing() {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        assert_eq!(build_boundary(&mut solver, BoundaryShape::None), 0);
        assert_eq!(solver.particle_count(), 0);
    }
}
