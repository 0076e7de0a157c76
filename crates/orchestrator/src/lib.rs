//! Orchestration Layer
//!
//! This crate drives the 2D SPH solver from outside, including:
//! - JSON scenario files (solver parameters plus initial scene)
//! - Scene construction on a [`kernel::Solver`]
//! - A background-thread runner with a command channel and live snapshots

#![warn(missing_docs)]

pub mod config;
pub mod runner;
pub mod scene;

pub use config::{ScenarioConfig, ScenarioError, SceneConfig};
pub use runner::{FrameSnapshot, RunnerCommand, RunnerError, RunnerState, SimulationRunner};
pub use scene::{build_scene, SceneSummary};

use std::path::Path;

use kernel::Solver;

/// Build a solver and its initial scene from a validated scenario
pub fn create_solver(config: &ScenarioConfig) -> Result<Solver, ScenarioError> {
    config.validate()?;
    let mut solver = Solver::new(config.solver.clone())?;
    let summary = build_scene(&mut solver, &config.scene);
    if summary.fluid == 0 {
        return Err(ScenarioError::EmptyScene(config.name.clone()));
    }
    Ok(solver)
}

/// Create a complete simulation from a scenario file
///
/// This function performs the full simulation setup pipeline:
/// 1. Load and validate the scenario
/// 2. Create the solver and build the scene
/// 3. Wrap it in a SimulationRunner for lifecycle management
///
/// # Example
/// ```no_run
/// use orchestrator::create_simulation;
///
/// let runner = create_simulation("configs/dam-break.json")?;
/// runner.start();
/// // ... query snapshots, pause, resume, etc.
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_simulation(config_path: impl AsRef<Path>) -> Result<SimulationRunner, ScenarioError> {
    let config_path = config_path.as_ref();
    tracing::info!("Creating simulation from scenario: {}", config_path.display());

    let config = ScenarioConfig::load(config_path)?;
    tracing::info!("Scenario loaded: {}", config.name);

    let solver = create_solver(&config)?;
    tracing::info!(
        "Simulation ready to start: {} particles, max_ticks = {:?}",
        solver.particle_count(),
        config.max_ticks
    );
    Ok(SimulationRunner::new(solver, config.max_ticks))
}
