//! Reference test framework for SPH fluid simulation validation
//!
//! A reference test loads a scenario file, runs it for a fixed number of
//! ticks and validates the final (and per-tick) state against expected
//! criteria.

pub mod suite;

use std::path::PathBuf;

use glam::Vec2;
use kernel::{ErrorMetrics, ParticleStore};
use orchestrator::{create_solver, ScenarioConfig, ScenarioError};

/// Expected result criteria for a reference test
#[derive(Debug, Clone, Default)]
pub struct ExpectedResult {
    /// Fluid position bounds validation
    pub position_bounds: Option<PositionBoundsCheck>,
    /// Density deviation from rest
    pub density: Option<DensityCheck>,
    /// Pressure sign over the whole run
    pub pressure: Option<PressureCheck>,
    /// Conservation metrics validation
    pub conservation: Option<ConservationCheck>,
    /// Settling check (fluid at rest)
    pub settling: Option<SettlingCheck>,
}

/// Check that fluid particles remain within specified bounds
#[derive(Debug, Clone)]
pub struct PositionBoundsCheck {
    /// Minimum allowed position
    pub min: Vec2,
    /// Maximum allowed position
    pub max: Vec2,
}

/// Check fluid density against the rest density
#[derive(Debug, Clone)]
pub struct DensityCheck {
    /// Maximum allowed `|rho - rho0| / rho0` of any particle
    pub max_deviation: f32,
    /// Maximum allowed mean deviation
    pub max_average_deviation: f32,
}

/// Check that no particle ever receives a negative pressure
#[derive(Debug, Clone)]
pub struct PressureCheck {
    /// Smallest pressure tolerated (0.0 for a strict check)
    pub min_pressure: f32,
}

/// Check conservation metrics
#[derive(Debug, Clone)]
pub struct ConservationCheck {
    /// Maximum allowed mass conservation error (0.0 to 1.0)
    pub max_mass_error: f32,
}

/// Check that the fluid has come to rest
#[derive(Debug, Clone)]
pub struct SettlingCheck {
    /// Largest fluid speed tolerated during the settled window
    pub max_speed: f32,
    /// Ticks at the end of the run that must all satisfy `max_speed`
    pub window: usize,
}

/// Result of running a reference test
#[derive(Debug)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether test passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Final error metrics
    pub error_metrics: ErrorMetrics,
    /// Number of ticks executed
    pub ticks: usize,
    /// Simulated time
    pub sim_time: f64,
    /// Mean pressure iterations per tick
    pub average_iterations: f32,
    /// Ticks whose pressure solve hit the iteration cap
    pub unconverged_ticks: usize,
}

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Error message if failed
    pub message: Option<String>,
}

/// A reference test case
pub struct ReferenceTest {
    /// Test name
    pub name: String,
    /// Path to scenario file
    pub config_path: PathBuf,
    /// Number of ticks to run
    pub ticks: usize,
    /// Expected results to validate
    pub expected: ExpectedResult,
}

/// Quantities tracked on every tick rather than only at the end.
#[derive(Debug, Default)]
struct RunHistory {
    min_pressure: f32,
    /// Largest fluid speed per tick
    max_speeds: Vec<f32>,
    iterations: u64,
    unconverged: usize,
    sim_time: f64,
}

impl ReferenceTest {
    /// Run the reference test and return results
    pub fn run(&self) -> Result<TestResult, ScenarioError> {
        tracing::info!("Running reference test: {}", self.name);

        let config = ScenarioConfig::load(&self.config_path)?;
        let mut solver = create_solver(&config)?;
        tracing::info!(
            "Initialized: {} particles ({} fluid), h={}",
            solver.particle_count(),
            solver.particles().fluid_count(),
            config.solver.kernel_support,
        );

        tracing::info!("Running {} ticks...", self.ticks);
        let mut history = RunHistory {
            max_speeds: Vec::with_capacity(self.ticks),
            ..RunHistory::default()
        };
        for tick in 0..self.ticks {
            let stats = solver.tick();
            history.sim_time += stats.dt as f64;
            history.iterations += stats.iterations as u64;
            history.max_speeds.push(stats.max_speed);
            if !stats.converged {
                history.unconverged += 1;
            }
            let lowest = solver
                .particles()
                .pressure
                .iter()
                .copied()
                .fold(0.0_f32, f32::min);
            history.min_pressure = history.min_pressure.min(lowest);

            // Log progress every 10% of ticks
            if (tick + 1) % (self.ticks / 10).max(1) == 0 {
                let progress = ((tick + 1) as f32 / self.ticks as f32) * 100.0;
                tracing::info!("Progress: {:.0}% ({}/{})", progress, tick + 1, self.ticks);
            }
        }
        tracing::info!(
            "Simulation complete: {} ticks, {:.4} simulated",
            self.ticks,
            history.sim_time
        );

        let particles = solver.particles();
        let error_metrics = solver.error_metrics();

        let mut checks = Vec::new();
        if let Some(ref bounds) = self.expected.position_bounds {
            checks.push(validate_position_bounds(particles, bounds));
        }
        if let Some(ref density) = self.expected.density {
            checks.push(validate_density(&error_metrics, density));
        }
        if let Some(ref pressure) = self.expected.pressure {
            checks.push(validate_pressure(&history, pressure));
        }
        if let Some(ref conservation) = self.expected.conservation {
            checks.push(validate_conservation(&error_metrics, conservation));
        }
        if let Some(ref settling) = self.expected.settling {
            checks.push(validate_settling(&history, settling));
        }
        let passed = checks.iter().all(|c| c.passed);

        Ok(TestResult {
            name: self.name.clone(),
            passed,
            checks,
            error_metrics,
            ticks: self.ticks,
            sim_time: history.sim_time,
            average_iterations: history.iterations as f32 / self.ticks.max(1) as f32,
            unconverged_ticks: history.unconverged,
        })
    }
}

/// Validate that fluid particles remain within specified bounds
fn validate_position_bounds(particles: &ParticleStore, bounds: &PositionBoundsCheck) -> CheckResult {
    let mut violations = 0;
    let mut max_violation = 0.0_f32;

    for i in 0..particles.len() {
        if !particles.kind[i].is_fluid() {
            continue;
        }
        let pos = particles.position[i];
        let below = (bounds.min - pos).max(Vec2::ZERO);
        let above = (pos - bounds.max).max(Vec2::ZERO);
        let violation = below.max_element().max(above.max_element());
        if violation > 0.0 {
            violations += 1;
            max_violation = max_violation.max(violation);
        }
    }

    if violations == 0 {
        CheckResult {
            name: "Position Bounds".to_string(),
            passed: true,
            message: None,
        }
    } else {
        CheckResult {
            name: "Position Bounds".to_string(),
            passed: false,
            message: Some(format!(
                "{} particles out of bounds (max violation: {:.4})",
                violations, max_violation
            )),
        }
    }
}

/// Validate density deviation from rest
fn validate_density(metrics: &ErrorMetrics, check: &DensityCheck) -> CheckResult {
    let max_ok = metrics.max_density_deviation <= check.max_deviation;
    let avg_ok = metrics.average_density_deviation <= check.max_average_deviation;
    let summary = format!(
        "Max: {:.3}% (limit: {:.3}%), Average: {:.3}% (limit: {:.3}%)",
        metrics.max_density_deviation * 100.0,
        check.max_deviation * 100.0,
        metrics.average_density_deviation * 100.0,
        check.max_average_deviation * 100.0
    );
    CheckResult {
        name: "Density".to_string(),
        passed: max_ok && avg_ok,
        message: Some(summary),
    }
}

/// Validate the lowest pressure seen during the run
fn validate_pressure(history: &RunHistory, check: &PressureCheck) -> CheckResult {
    if history.min_pressure >= check.min_pressure {
        CheckResult {
            name: "Pressure Sign".to_string(),
            passed: true,
            message: Some(format!("Lowest pressure: {:.3e}", history.min_pressure)),
        }
    } else {
        CheckResult {
            name: "Pressure Sign".to_string(),
            passed: false,
            message: Some(format!(
                "Lowest pressure: {:.3e} (limit: {:.3e})",
                history.min_pressure, check.min_pressure
            )),
        }
    }
}

/// Validate conservation metrics
fn validate_conservation(metrics: &ErrorMetrics, check: &ConservationCheck) -> CheckResult {
    if metrics.mass_drift <= check.max_mass_error {
        CheckResult {
            name: "Conservation".to_string(),
            passed: true,
            message: Some(format!("Mass: {:.3e}%", metrics.mass_drift * 100.0)),
        }
    } else {
        CheckResult {
            name: "Conservation".to_string(),
            passed: false,
            message: Some(format!(
                "Mass: {:.3e}% (limit: {:.3e}%)",
                metrics.mass_drift * 100.0,
                check.max_mass_error * 100.0
            )),
        }
    }
}

/// Validate that the fluid stayed at rest over the final ticks
fn validate_settling(history: &RunHistory, check: &SettlingCheck) -> CheckResult {
    let start = history.max_speeds.len().saturating_sub(check.window);
    let window = &history.max_speeds[start..];
    let peak = window.iter().copied().fold(0.0_f32, f32::max);
    let unsettled = window.iter().filter(|&&s| s > check.max_speed).count();

    if window.is_empty() {
        return CheckResult {
            name: "Settling".to_string(),
            passed: false,
            message: Some("No ticks recorded".to_string()),
        };
    }

    if unsettled == 0 {
        CheckResult {
            name: "Settling".to_string(),
            passed: true,
            message: Some(format!(
                "Settled over last {} ticks (peak speed: {:.4}, limit: {:.4})",
                window.len(),
                peak,
                check.max_speed
            )),
        }
    } else {
        CheckResult {
            name: "Settling".to_string(),
            passed: false,
            message: Some(format!(
                "{} / {} ticks above speed limit (peak speed: {:.4}, limit: {:.4})",
                unsettled,
                window.len(),
                peak,
                check.max_speed
            )),
        }
    }
}

impl TestResult {
    /// Print a summary of the test result
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Test: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Ticks: {}", self.ticks);
        println!("Simulated time: {:.4}", self.sim_time);
        println!(
            "Pressure iterations: {:.1} per tick, {} ticks unconverged",
            self.average_iterations, self.unconverged_ticks
        );
        println!("\nError Metrics:");
        println!("  Max density deviation: {:.3}%", self.error_metrics.max_density_deviation * 100.0);
        println!("  Average density deviation: {:.3}%", self.error_metrics.average_density_deviation * 100.0);
        println!("  Mass drift: {:.3e}%", self.error_metrics.mass_drift * 100.0);
        println!("  Max speed: {:.4}", self.error_metrics.max_speed);
        println!("\nValidation Checks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}
