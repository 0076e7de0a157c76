//! 2D SPH Fluid Simulation Kernel
//!
//! This crate provides the core of a 2D Smoothed Particle Hydrodynamics solver
//! with an implicit incompressible (IISPH) pressure solve. It is compute-only:
//! windowing, rendering and input live elsewhere and talk to [`Solver`]
//! through plain data.
//!
//! # Modules
//! - [`particle`] -- Struct-of-arrays particle storage, kinds and stable ids.
//! - [`curve`] -- Row-major, Morton and Hilbert cell orderings.
//! - [`neighbor`] -- Compressed linked-cell neighbor search.
//! - [`sph`] -- Cubic spline kernel, density, viscosity and CFL step.
//! - [`pressure`] -- IISPH relaxed Jacobi pressure solver.
//! - [`integrator`] -- Symplectic Euler and scripted boundary motion.
//! - [`boundary`] -- Circle, square, wall and liquid construction utilities.
//! - [`config`] -- Solver configuration and validation.
//! - [`solver`] -- Tick pipeline, run mode and inspection.

#![warn(missing_docs)]

pub mod boundary;
pub mod config;
pub mod curve;
pub mod integrator;
pub mod neighbor;
pub mod particle;
pub mod pressure;
pub mod solver;
pub mod sph;

pub use boundary::{BoundaryMotion, WallTool};
pub use config::{ConfigError, SolverConfig};
pub use curve::{CellEncoder, SpaceFillingCurve};
pub use neighbor::{CompactCell, NeighborSearch};
pub use particle::{ParticleId, ParticleKind, ParticleStore, ParticleView};
pub use pressure::{PressureSolver, SolveStats};
pub use solver::{ErrorMetrics, InspectedParticle, RunMode, Solver, TickStats};
pub use sph::{cubic_spline, cubic_spline_gradient};
