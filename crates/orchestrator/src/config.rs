//! Scenario files: solver parameters plus the scene to build.

use std::fs;
use std::path::{Path, PathBuf};

use glam::Vec2;
use kernel::{ConfigError, ParticleKind, SolverConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to load or validate a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The file could not be read.
    #[error("failed to read scenario file {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not a valid scenario document.
    #[error("failed to parse scenario JSON in {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// Solver parameters are out of range.
    #[error("invalid solver configuration: {0}")]
    Invalid(#[from] ConfigError),
    /// The scene would not create a single fluid particle.
    #[error("scenario '{0}' contains no fluid")]
    EmptyScene(String),
    /// `max_ticks` was set to zero.
    #[error("max_ticks must be at least 1")]
    ZeroMaxTicks,
}

/// A complete runnable scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Human-readable scenario name
    pub name: String,
    /// Solver parameters
    #[serde(default)]
    pub solver: SolverConfig,
    /// Initial particles
    #[serde(default)]
    pub scene: SceneConfig,
    /// Stop after this many ticks
    #[serde(default)]
    pub max_ticks: Option<u64>,
}

/// Which outline to place around the world center.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryShape {
    /// Ring on the world circle
    Circle,
    /// Square of half-width equal to the world radius
    Square,
    /// No outline
    #[default]
    None,
}

/// Rectangle filled with fluid at the rest spacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidBlock {
    /// Lower corner
    pub min: Vec2,
    /// Upper corner
    pub max: Vec2,
}

/// Straight wall between two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallConfig {
    /// First endpoint (sampled)
    pub start: Vec2,
    /// Second endpoint (not sampled)
    pub end: Vec2,
}

/// One explicitly placed particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleSpawn {
    /// Position
    pub position: Vec2,
    /// Initial velocity
    #[serde(default)]
    pub velocity: Vec2,
    /// Role, fluid unless stated
    #[serde(default = "default_kind")]
    pub kind: ParticleKind,
}

/// Everything placed before the first tick, built in field order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Outline around the world center
    #[serde(default)]
    pub boundary: BoundaryShape,
    /// Static walls
    #[serde(default)]
    pub walls: Vec<WallConfig>,
    /// Walls driven by the scripted drift
    #[serde(default)]
    pub movable_walls: Vec<WallConfig>,
    /// Fluid rectangles
    #[serde(default)]
    pub liquid_blocks: Vec<LiquidBlock>,
    /// Single particles
    #[serde(default)]
    pub particles: Vec<ParticleSpawn>,
    /// Row-fill seeding count
    #[serde(default)]
    pub seed_particles: usize,
}

fn default_kind() -> ParticleKind {
    ParticleKind::Fluid
}

impl SceneConfig {
    /// Whether the scene creates at least one fluid particle.
    pub fn has_fluid(&self) -> bool {
        self.seed_particles > 0
            || !self.liquid_blocks.is_empty()
            || self.particles.iter().any(|p| p.kind.is_fluid())
    }
}

impl ScenarioConfig {
    /// Load and validate a scenario from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: ScenarioConfig =
            serde_json::from_str(&contents).map_err(|source| ScenarioError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the solver parameters and the scene
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.solver.validate()?;

        if self.max_ticks == Some(0) {
            return Err(ScenarioError::ZeroMaxTicks);
        }
        if !self.scene.has_fluid() {
            return Err(ScenarioError::EmptyScene(self.name.clone()));
        }
        Ok(())
    }
}
