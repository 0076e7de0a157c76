//! Solver configuration and validation.
//!
//! Every tunable lives in [`SolverConfig`]; nothing in the solver reads a
//! module-level physics constant. All fields have serde defaults, so a
//! scenario file only needs to name what it changes.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::curve::{SpaceFillingCurve, MAX_CELLS_PER_AXIS};
use crate::sph::lattice_kernel_sum;

/// Errors found while validating a [`SolverConfig`]. All of them are fatal at
/// construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A length or density that must be strictly positive was not.
    #[error("{name} must be positive, got {value}")]
    NonPositive {
        /// Field name.
        name: &'static str,
        /// Offending value.
        value: f32,
    },

    /// A coefficient that must be non-negative was negative.
    #[error("{name} must be non-negative, got {value}")]
    Negative {
        /// Field name.
        name: &'static str,
        /// Offending value.
        value: f32,
    },

    /// A value was NaN or infinite.
    #[error("{name} must be finite")]
    NotFinite {
        /// Field name.
        name: &'static str,
    },

    /// Domain minimum is not strictly below the maximum on some axis.
    #[error("domain min {min:?} must be below max {max:?} on both axes")]
    InvertedDomain {
        /// Lower corner.
        min: [f32; 2],
        /// Upper corner.
        max: [f32; 2],
    },

    /// The domain needs more grid cells than a cell index can address.
    #[error("grid needs {cells} cells along one axis, at most {max} are supported")]
    GridTooLarge {
        /// Required cells along the larger axis.
        cells: u64,
        /// Supported maximum.
        max: u32,
    },

    /// Relaxation factor outside `(0, 1]`.
    #[error("relaxation factor must be in (0, 1], got {0}")]
    Relaxation(f32),

    /// Iteration bounds are unusable.
    #[error("pressure iterations need 1 <= min ({min}) <= max ({max})")]
    IterationBounds {
        /// Minimum iterations.
        min: u32,
        /// Maximum iterations.
        max: u32,
    },

    /// Adaptive step bounds are unusable.
    #[error("CFL step bounds need 0 < min_dt ({min_dt}) <= max_dt ({max_dt})")]
    CflBounds {
        /// Lower clamp.
        min_dt: f32,
        /// Upper clamp.
        max_dt: f32,
    },
}

/// Top-level solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Smoothing length `h`. The kernel vanishes at `2h`.
    #[serde(default = "default_kernel_support")]
    pub kernel_support: f32,
    /// Rest distance between seeded particles.
    #[serde(default = "default_particle_spacing")]
    pub particle_spacing: f32,
    /// Explicit particle mass; defaults to the rest-lattice calibrated mass.
    #[serde(default)]
    pub particle_mass: Option<f32>,
    /// Target fluid density.
    #[serde(default = "default_rest_density")]
    pub rest_density: f32,
    /// Artificial viscosity coefficient.
    #[serde(default = "default_viscosity")]
    pub viscosity: f32,
    /// Whether boundary samples take part in the viscosity sum.
    #[serde(default)]
    pub boundary_viscosity: bool,
    /// Gravitational acceleration. Positive y points down the screen.
    #[serde(default = "default_gravity")]
    pub gravity: Vec2,
    /// Fixed time step, and the initial step when CFL adaptation is on.
    #[serde(default = "default_time_step")]
    pub time_step: f32,
    /// Adaptive step; `None` keeps `time_step` constant.
    #[serde(default)]
    pub cfl: Option<CflConfig>,
    /// Pressure solver tuning.
    #[serde(default)]
    pub pressure: PressureConfig,
    /// Neighbor grid layout.
    #[serde(default)]
    pub grid: GridConfig,
    /// World disc used by the boundary generators and the seeder.
    #[serde(default)]
    pub world: WorldConfig,
    /// Scripted motion of movable boundary samples.
    #[serde(default)]
    pub movable_boundary: MotionConfig,
}

/// IISPH convergence controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureConfig {
    /// Iterations always performed, even when already converged.
    #[serde(default = "default_min_iterations")]
    pub min_iterations: u32,
    /// Safety cap; reaching it without convergence is logged.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Average predicted density error (relative to rest density) to reach.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f32,
    /// Jacobi relaxation factor omega.
    #[serde(default = "default_relaxation")]
    pub relaxation: f32,
    /// Weight of the boundary pressure mirroring terms.
    #[serde(default = "default_boundary_gamma")]
    pub boundary_gamma: f32,
}

/// Uniform grid covering the simulation box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cell ordering.
    #[serde(default)]
    pub curve: SpaceFillingCurve,
    /// Lower corner of the box. Particles outside are clamped onto edge cells.
    #[serde(default = "default_domain_min")]
    pub domain_min: Vec2,
    /// Upper corner of the box.
    #[serde(default = "default_domain_max")]
    pub domain_max: Vec2,
}

/// Reference disc of the scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Center of the circular or square boundary.
    #[serde(default = "default_world_center")]
    pub center: Vec2,
    /// Radius of the circle, half-width of the square.
    #[serde(default = "default_world_radius")]
    pub radius: f32,
}

/// Sign-alternating horizontal drift of movable boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Drift speed.
    #[serde(default = "default_motion_speed")]
    pub speed: f32,
    /// Ticks between direction flips.
    #[serde(default = "default_motion_period")]
    pub period: u64,
}

/// Adaptive time step `dt = number * spacing / max_speed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CflConfig {
    /// CFL number.
    #[serde(default = "default_cfl_number")]
    pub number: f32,
    /// Lower clamp.
    #[serde(default = "default_min_dt")]
    pub min_dt: f32,
    /// Upper clamp, also used while nothing moves.
    #[serde(default = "default_max_dt")]
    pub max_dt: f32,
}

// Default values
fn default_kernel_support() -> f32 {
    5.0
}

fn default_particle_spacing() -> f32 {
    5.0
}

fn default_rest_density() -> f32 {
    1.0
}

fn default_viscosity() -> f32 {
    1.0
}

fn default_gravity() -> Vec2 {
    Vec2::new(0.0, 9.8)
}

fn default_time_step() -> f32 {
    0.01
}

fn default_min_iterations() -> u32 {
    2
}

fn default_max_iterations() -> u32 {
    100
}

fn default_error_threshold() -> f32 {
    0.001
}

fn default_relaxation() -> f32 {
    0.5
}

fn default_boundary_gamma() -> f32 {
    1.0
}

fn default_domain_min() -> Vec2 {
    Vec2::new(300.0, 50.0)
}

fn default_domain_max() -> Vec2 {
    Vec2::new(900.0, 650.0)
}

fn default_world_center() -> Vec2 {
    Vec2::new(600.0, 350.0)
}

fn default_world_radius() -> f32 {
    300.0
}

fn default_motion_speed() -> f32 {
    10.0
}

fn default_motion_period() -> u64 {
    100
}

fn default_cfl_number() -> f32 {
    0.4
}

fn default_min_dt() -> f32 {
    1.0e-4
}

fn default_max_dt() -> f32 {
    0.01
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kernel_support: default_kernel_support(),
            particle_spacing: default_particle_spacing(),
            particle_mass: None,
            rest_density: default_rest_density(),
            viscosity: default_viscosity(),
            boundary_viscosity: false,
            gravity: default_gravity(),
            time_step: default_time_step(),
            cfl: None,
            pressure: PressureConfig::default(),
            grid: GridConfig::default(),
            world: WorldConfig::default(),
            movable_boundary: MotionConfig::default(),
        }
    }
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            min_iterations: default_min_iterations(),
            max_iterations: default_max_iterations(),
            error_threshold: default_error_threshold(),
            relaxation: default_relaxation(),
            boundary_gamma: default_boundary_gamma(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            curve: SpaceFillingCurve::default(),
            domain_min: default_domain_min(),
            domain_max: default_domain_max(),
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            center: default_world_center(),
            radius: default_world_radius(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed: default_motion_speed(),
            period: default_motion_period(),
        }
    }
}

impl Default for CflConfig {
    fn default() -> Self {
        Self {
            number: default_cfl_number(),
            min_dt: default_min_dt(),
            max_dt: default_max_dt(),
        }
    }
}

impl SolverConfig {
    /// Mass given to every particle created by the solver.
    ///
    /// Unless `particle_mass` overrides it, this is the mass at which a square
    /// lattice at `particle_spacing` sums to exactly `rest_density`. Fluid
    /// seeded on that lattice then starts without a density error.
    pub fn particle_mass(&self) -> f32 {
        self.particle_mass.unwrap_or_else(|| {
            self.rest_density / lattice_kernel_sum(self.kernel_support, self.particle_spacing)
        })
    }

    /// Neighbor search radius, `2h`.
    pub fn support_radius(&self) -> f32 {
        2.0 * self.kernel_support
    }

    /// Number of grid cells along x and y. Cells are `2h` wide.
    pub fn grid_dims(&self) -> [u64; 2] {
        let extent = self.grid.domain_max - self.grid.domain_min;
        let cell = self.support_radius();
        [
            (extent.x / cell).ceil().max(1.0) as u64,
            (extent.y / cell).ceil().max(1.0) as u64,
        ]
    }

    /// Check every field. Called by `Solver::new` before the first tick.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("kernel_support", self.kernel_support)?;
        positive("particle_spacing", self.particle_spacing)?;
        positive("rest_density", self.rest_density)?;
        positive("particle_mass", self.particle_mass())?;
        positive("time_step", self.time_step)?;
        non_negative("viscosity", self.viscosity)?;
        non_negative("boundary_gamma", self.pressure.boundary_gamma)?;
        positive("error_threshold", self.pressure.error_threshold)?;
        positive("world.radius", self.world.radius)?;
        non_negative("movable_boundary.speed", self.movable_boundary.speed)?;

        for (name, v) in [
            ("gravity", self.gravity),
            ("grid.domain_min", self.grid.domain_min),
            ("grid.domain_max", self.grid.domain_max),
            ("world.center", self.world.center),
        ] {
            if !v.is_finite() {
                return Err(ConfigError::NotFinite { name });
            }
        }

        let relaxation = self.pressure.relaxation;
        if !(relaxation > 0.0 && relaxation <= 1.0) {
            return Err(ConfigError::Relaxation(relaxation));
        }

        let PressureConfig { min_iterations, max_iterations, .. } = self.pressure;
        if min_iterations == 0 || min_iterations > max_iterations {
            return Err(ConfigError::IterationBounds {
                min: min_iterations,
                max: max_iterations,
            });
        }

        let (min, max) = (self.grid.domain_min, self.grid.domain_max);
        if min.x >= max.x || min.y >= max.y {
            return Err(ConfigError::InvertedDomain {
                min: min.to_array(),
                max: max.to_array(),
            });
        }

        let cells = self.grid_dims().into_iter().max().unwrap_or(1);
        if cells > MAX_CELLS_PER_AXIS as u64 {
            return Err(ConfigError::GridTooLarge {
                cells,
                max: MAX_CELLS_PER_AXIS,
            });
        }

        if let Some(cfl) = self.cfl {
            positive("cfl.number", cfl.number)?;
            if !(cfl.min_dt > 0.0 && cfl.min_dt <= cfl.max_dt) {
                return Err(ConfigError::CflBounds {
                    min_dt: cfl.min_dt,
                    max_dt: cfl.max_dt,
                });
            }
        }

        Ok(())
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { name });
    }
    if value <= 0.0 {
        return Err(ConfigError::NonPositive { name, value });
    }
    Ok(())
}

fn non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { name });
    }
    if value < 0.0 {
        return Err(ConfigError::Negative { name, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SolverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid_dims(), [60, 60]);
    }

    #[test]
    fn default_mass_makes_rest_lattice_read_rest_density() {
        let config = SolverConfig::default();
        let mass = config.particle_mass();
        let h = config.kernel_support;
        let s = config.particle_spacing;
        let density = mass * lattice_kernel_sum(h, s);
        eprintln!("mass = {mass}, lattice density = {density}");
        assert!(
            (density - config.rest_density).abs() < 1.0e-5,
            "lattice density {density}"
        );
        // Slightly below rho0 * spacing^2 because the lattice sum exceeds one.
        assert!(mass < 25.0 && mass > 24.9, "mass = {mass}");
    }

    #[test]
    fn explicit_mass_overrides_calibration() {
        let config = SolverConfig {
            particle_mass: Some(30.0),
            ..SolverConfig::default()
        };
        assert_eq!(config.particle_mass(), 30.0);
    }

    #[test]
    fn rejects_non_positive_kernel_support() {
        let config = SolverConfig {
            kernel_support: 0.0,
            ..SolverConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositive { name: "kernel_support", value: 0.0 })
        );
    }

    #[test]
    fn rejects_negative_spacing_and_mass() {
        let mut config = SolverConfig {
            particle_spacing: -1.0,
            ..SolverConfig::default()
        };
        assert!(config.validate().is_err());

        config.particle_spacing = 5.0;
        config.particle_mass = Some(-2.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { name: "particle_mass", .. })
        ));
    }

    #[test]
    fn rejects_inverted_domain() {
        let mut config = SolverConfig::default();
        config.grid.domain_min = Vec2::new(10.0, 0.0);
        config.grid.domain_max = Vec2::new(0.0, 10.0);
        assert!(matches!(config.validate(), Err(ConfigError::InvertedDomain { .. })));
    }

    #[test]
    fn rejects_oversized_grid() {
        let mut config = SolverConfig::default();
        config.kernel_support = 0.001;
        config.grid.domain_max = Vec2::new(1.0e6, 1.0e6);
        assert!(matches!(config.validate(), Err(ConfigError::GridTooLarge { .. })));
    }

    #[test]
    fn rejects_bad_iteration_bounds() {
        let mut config = SolverConfig::default();
        config.pressure.min_iterations = 10;
        config.pressure.max_iterations = 5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::IterationBounds { min: 10, max: 5 })
        );
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "kernel_support": 1.0,
            "particle_spacing": 1.0,
            "pressure": { "max_iterations": 50 },
            "grid": { "curve": "Hilbert", "domain_min": [-10.0, -10.0] }
        }"#;
        let config: SolverConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kernel_support, 1.0);
        assert_eq!(config.pressure.max_iterations, 50);
        assert_eq!(config.pressure.min_iterations, 2);
        assert_eq!(config.grid.curve, SpaceFillingCurve::Hilbert);
        assert_eq!(config.grid.domain_min, Vec2::new(-10.0, -10.0));
        assert_eq!(config.grid.domain_max, Vec2::new(900.0, 650.0));
        assert_eq!(config.gravity, Vec2::new(0.0, 9.8));
        assert!(config.validate().is_ok());
    }
}
