//! Solver orchestrator: owns the particle store and runs the per-tick
//! pipeline.
//!
//! ```text
//! scripted boundary velocity
//!   -> neighbor search (sort + lists)
//!   -> density
//!   -> viscosity, gravity, predicted velocity
//!   -> IISPH pressure solve
//!   -> pressure force
//!   -> symplectic Euler
//! ```
//!
//! Each phase is a data-parallel pass that fully joins before the next one
//! starts. Construction helpers (boundaries, walls, liquid) only run between
//! ticks.

use glam::Vec2;

use crate::boundary::{self, BoundaryMotion, WallTool};
use crate::config::{ConfigError, SolverConfig};
use crate::integrator;
use crate::neighbor::NeighborSearch;
use crate::particle::{ParticleId, ParticleKind, ParticleStore, ParticleView};
use crate::pressure::PressureSolver;
use crate::sph::{self, ForceParams};

/// Continuous, single-step or paused execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum RunMode {
    /// Tick on every update.
    Running,
    /// Tick once, then switch to `Paused`.
    SingleStep,
    /// Do nothing on update.
    #[default]
    Paused,
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TickStats {
    /// Tick number, starting at 1 for the first completed tick.
    pub tick: u64,
    /// Step length used.
    pub dt: f32,
    /// Pressure iterations.
    pub iterations: u32,
    /// Average predicted density error of the pressure solve.
    pub density_error: f32,
    /// Whether the pressure solve converged before its cap.
    pub converged: bool,
    /// Largest fluid speed after integration.
    pub max_speed: f32,
}

/// Aggregate error and conservation metrics of the current state.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorMetrics {
    /// Largest `|rho - rho0| / rho0` over fluid particles.
    pub max_density_deviation: f32,
    /// Mean of `|rho - rho0| / rho0` over fluid particles.
    pub average_density_deviation: f32,
    /// `|M - M0| / M0` since the scene last changed.
    pub mass_drift: f32,
    /// Largest fluid speed.
    pub max_speed: f32,
}

/// Detailed state of one particle for an inspector panel.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InspectedParticle {
    /// Stable id.
    pub id: ParticleId,
    /// Role.
    pub kind: ParticleKind,
    /// Position.
    pub position: Vec2,
    /// Velocity.
    pub velocity: Vec2,
    /// Density.
    pub density: f32,
    /// Pressure.
    pub pressure: f32,
    /// Fluid neighbor count.
    pub neighbor_count: usize,
    /// Boundary neighbor count.
    pub boundary_neighbor_count: usize,
    /// Diagonal of the pressure operator.
    pub diagonal: f32,
}

/// 2D IISPH fluid solver.
pub struct Solver {
    config: SolverConfig,
    store: ParticleStore,
    search: NeighborSearch,
    pressure: PressureSolver,
    motion: BoundaryMotion,
    wall_tool: WallTool,
    mode: RunMode,
    dt: f32,
    tick: u64,
    inspected: Option<ParticleId>,
    /// Total mass when the particle set last changed.
    reference_mass: f64,
    last_stats: TickStats,
}

impl Solver {
    /// Validate `config` and build an empty solver.
    pub fn new(config: SolverConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let search = NeighborSearch::new(
            config.kernel_support,
            config.grid.domain_min,
            config.grid.domain_max,
            config.grid.curve,
        );
        let [cells_x, cells_y] = search.grid_dims();
        tracing::info!(
            "Solver created: h={}, spacing={}, mass={}, curve={:?}, grid={}x{}",
            config.kernel_support,
            config.particle_spacing,
            config.particle_mass(),
            config.grid.curve,
            cells_x,
            cells_y,
        );

        Ok(Self {
            pressure: PressureSolver::new(config.pressure),
            motion: BoundaryMotion {
                speed: config.movable_boundary.speed,
                period: config.movable_boundary.period,
            },
            dt: config.time_step,
            search,
            store: ParticleStore::new(),
            wall_tool: WallTool::new(),
            mode: RunMode::default(),
            tick: 0,
            inspected: None,
            reference_mass: 0.0,
            last_stats: TickStats::default(),
            config,
        })
    }

    // ------------------------------------------------------------------
    // Tick pipeline
    // ------------------------------------------------------------------

    /// Advance the simulation by exactly one tick, regardless of run mode.
    pub fn tick(&mut self) -> TickStats {
        let dt = self.dt;
        let h = self.config.kernel_support;

        let scripted = self.motion.velocity_at(self.tick);
        integrator::apply_scripted_velocity(&mut self.store, scripted);

        self.search.compute(&mut self.store);
        sph::compute_density(&mut self.store, h);
        sph::compute_non_pressure_forces(
            &mut self.store,
            &ForceParams {
                h,
                viscosity: self.config.viscosity,
                boundary_viscosity: self.config.boundary_viscosity,
                gravity: self.config.gravity,
                rest_density: self.config.rest_density,
                dt,
            },
        );
        let solve = self.pressure.compute(&mut self.store, self.config.rest_density, dt, h);
        integrator::apply_pressure_force(&mut self.store);
        let max_speed = integrator::integrate(&mut self.store, dt);

        self.tick += 1;
        if let Some(cfl) = &self.config.cfl {
            self.dt = sph::compute_timestep(max_speed, self.config.particle_spacing, cfl);
        }

        let stats = TickStats {
            tick: self.tick,
            dt,
            iterations: solve.iterations,
            density_error: solve.density_error,
            converged: solve.converged,
            max_speed,
        };
        tracing::debug!(
            tick = stats.tick,
            iterations = stats.iterations,
            density_error = stats.density_error,
            max_speed = stats.max_speed,
            "tick complete"
        );
        self.last_stats = stats;
        stats
    }

    /// Tick according to the run mode. `SingleStep` ticks once and pauses.
    ///
    /// `SimulationRunner` sets the mode from its own state and calls this
    /// once per loop iteration.
    pub fn update(&mut self) -> Option<TickStats> {
        match self.mode {
            RunMode::Running => Some(self.tick()),
            RunMode::SingleStep => {
                let stats = self.tick();
                self.mode = RunMode::Paused;
                Some(stats)
            }
            RunMode::Paused => None,
        }
    }

    /// Current run mode.
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Change the run mode. Takes effect on the next update.
    pub fn set_mode(&mut self, mode: RunMode) {
        self.mode = mode;
    }

    /// Flip between running and paused.
    pub fn toggle_pause(&mut self) {
        self.mode = match self.mode {
            RunMode::Running => RunMode::Paused,
            RunMode::SingleStep | RunMode::Paused => RunMode::Running,
        };
    }

    /// Request exactly one tick on the next update.
    pub fn request_step(&mut self) {
        self.mode = RunMode::SingleStep;
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Add one particle at `position` and return its id.
    pub fn add_particle(&mut self, position: Vec2, kind: ParticleKind) -> ParticleId {
        let id = self.insert(position, kind);
        self.reference_mass = self.store.total_mass();
        id
    }

    fn insert(&mut self, position: Vec2, kind: ParticleKind) -> ParticleId {
        self.store.push(
            position,
            self.config.particle_mass(),
            self.config.rest_density,
            kind,
        )
    }

    fn insert_all(&mut self, positions: Vec<Vec2>, kind: ParticleKind) -> Vec<ParticleId> {
        let ids: Vec<ParticleId> = positions.into_iter().map(|p| self.insert(p, kind)).collect();
        self.reference_mass = self.store.total_mass();
        ids
    }

    /// Seed `count` fluid particles row by row, starting left of the world
    /// center and near the top of the world disc.
    pub fn seed_liquid(&mut self, count: usize) -> Vec<ParticleId> {
        let world = self.config.world;
        let start = world.center - Vec2::new(world.radius / 2.0, world.radius - 50.0);
        let samples = boundary::row_fill(start, world.radius, self.config.particle_spacing, count);
        tracing::info!("Seeding {} fluid particles at {}", count, start);
        self.insert_all(samples, ParticleKind::Fluid)
    }

    /// Fill the rectangle `[min, max]` with fluid at the rest spacing.
    pub fn add_liquid_block(&mut self, min: Vec2, max: Vec2) -> Vec<ParticleId> {
        let samples = boundary::liquid_block(min, max, self.config.particle_spacing);
        self.insert_all(samples, ParticleKind::Fluid)
    }

    /// Ring of static boundary samples on the world circle.
    pub fn build_circle_boundary(&mut self) -> Vec<ParticleId> {
        let world = self.config.world;
        let samples = boundary::circle_ring(world.center, world.radius, self.config.particle_spacing);
        tracing::info!("Circle boundary: {} samples, radius {}", samples.len(), world.radius);
        self.insert_all(samples, ParticleKind::Boundary)
    }

    /// Square outline of static boundary samples around the world center.
    pub fn build_square_boundary(&mut self) -> Vec<ParticleId> {
        let world = self.config.world;
        let samples = boundary::square_ring(world.center, world.radius, self.config.particle_spacing);
        tracing::info!("Square boundary: {} samples, half-width {}", samples.len(), world.radius);
        self.insert_all(samples, ParticleKind::Boundary)
    }

    /// Static wall from `a` towards `b`.
    pub fn add_wall(&mut self, a: Vec2, b: Vec2) -> Vec<ParticleId> {
        let samples = boundary::wall_segment(a, b, self.config.particle_spacing);
        self.insert_all(samples, ParticleKind::Boundary)
    }

    /// Wall of movable boundary samples from `a` towards `b`.
    pub fn add_movable_wall(&mut self, a: Vec2, b: Vec2) -> Vec<ParticleId> {
        let samples = boundary::wall_segment(a, b, self.config.particle_spacing);
        self.insert_all(samples, ParticleKind::MovableBoundary)
    }

    /// Two-click wall tool. The first click only records the endpoint.
    pub fn wall_click(&mut self, point: Vec2) -> Vec<ParticleId> {
        match self.wall_tool.click(point, self.config.particle_spacing) {
            Some(samples) => self.insert_all(samples, ParticleKind::Boundary),
            None => Vec::new(),
        }
    }

    /// Overwrite the velocity of particle `id`. Returns `false` for an
    /// unknown id.
    pub fn set_velocity(&mut self, id: ParticleId, velocity: Vec2) -> bool {
        match self.store.index_of(id) {
            Some(i) => {
                self.store.velocity[i] = velocity;
                true
            }
            None => false,
        }
    }

    /// Endpoint recorded by a first wall click, if any.
    pub fn pending_wall(&self) -> Option<Vec2> {
        self.wall_tool.pending()
    }

    /// Remove every particle and restart the tick counter.
    pub fn reset(&mut self) {
        tracing::info!("Resetting solver ({} particles removed)", self.store.len());
        self.store.clear();
        self.wall_tool.cancel();
        self.tick = 0;
        self.dt = self.config.time_step;
        self.inspected = None;
        self.reference_mass = 0.0;
        self.last_stats = TickStats::default();
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Configuration in use.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Particle state. Array order changes every tick; use ids to track
    /// particles.
    pub fn particles(&self) -> &ParticleStore {
        &self.store
    }

    /// Number of particles.
    pub fn particle_count(&self) -> usize {
        self.store.len()
    }

    /// Completed ticks since construction or reset.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Step length the next tick will use.
    pub fn time_step(&self) -> f32 {
        self.dt
    }

    /// Statistics of the most recent tick.
    pub fn last_stats(&self) -> TickStats {
        self.last_stats
    }

    /// Neighbor search structure, for diagnostics.
    pub fn neighbor_search(&self) -> &NeighborSearch {
        &self.search
    }

    /// Render data for every particle.
    pub fn views(&self) -> Vec<ParticleView> {
        (0..self.store.len()).map(|i| self.store.view(i)).collect()
    }

    /// Mark `id` as the particle shown by [`Solver::inspected`].
    pub fn set_inspected(&mut self, id: Option<ParticleId>) {
        self.inspected = id;
    }

    /// State of the designated inspected particle.
    pub fn inspected(&self) -> Option<InspectedParticle> {
        self.inspected.and_then(|id| self.inspect(id))
    }

    /// Detailed state of particle `id`.
    pub fn inspect(&self, id: ParticleId) -> Option<InspectedParticle> {
        let i = self.store.index_of(id)?;
        let s = &self.store;
        Some(InspectedParticle {
            id,
            kind: s.kind[i],
            position: s.position[i],
            velocity: s.velocity[i],
            density: s.density[i],
            pressure: s.pressure[i],
            neighbor_count: s.neighbors[i].len(),
            boundary_neighbor_count: s.boundary_neighbors[i].len(),
            diagonal: s.diagonal[i],
        })
    }

    /// Density and conservation metrics of the current state.
    pub fn error_metrics(&self) -> ErrorMetrics {
        let rho0 = self.config.rest_density;
        let mut max_dev = 0.0_f32;
        let mut sum_dev = 0.0_f64;
        let mut fluid = 0usize;
        let mut max_speed = 0.0_f32;
        for i in 0..self.store.len() {
            if !self.store.kind[i].is_fluid() {
                continue;
            }
            let dev = (self.store.density[i] - rho0).abs() / rho0;
            max_dev = max_dev.max(dev);
            sum_dev += dev as f64;
            fluid += 1;
            max_speed = max_speed.max(self.store.velocity[i].length());
        }

        let mass = self.store.total_mass();
        let mass_drift = if self.reference_mass > 1.0e-12 {
            ((mass - self.reference_mass) / self.reference_mass).abs() as f32
        } else {
            (mass - self.reference_mass).abs() as f32
        };

        ErrorMetrics {
            max_density_deviation: max_dev,
            average_density_deviation: if fluid > 0 { (sum_dev / fluid as f64) as f32 } else { 0.0 },
            mass_drift,
            max_speed,
        }
    }
}
