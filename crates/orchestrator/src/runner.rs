//! Simulation runner with lifecycle management
//!
//! `SimulationRunner` owns a [`Solver`] on a background thread. Controls
//! change a shared state flag; scene edits travel over a command channel and
//! are applied between ticks. After every tick (and after every batch of
//! commands) the thread publishes a [`FrameSnapshot`] for a renderer.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec2;
use kernel::{
    ErrorMetrics, InspectedParticle, ParticleId, ParticleKind, ParticleView, RunMode, Solver,
    TickStats,
};
use thiserror::Error;

use crate::config::BoundaryShape;
use crate::scene;

/// Runner state enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation created but not yet started
    Created,
    /// Simulation actively running
    Running,
    /// Run exactly one tick, then pause
    SingleStep,
    /// Simulation paused
    Paused,
    /// Simulation finished (stopped or reached max_ticks)
    Finished,
}

/// Scene edits applied by the runner thread between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunnerCommand {
    /// Add one particle
    SpawnParticle {
        /// Position
        position: Vec2,
        /// Role
        kind: ParticleKind,
    },
    /// Row-fill seed this many fluid particles
    SeedLiquid(usize),
    /// Fill a rectangle with fluid
    AddLiquidBlock {
        /// Lower corner
        min: Vec2,
        /// Upper corner
        max: Vec2,
    },
    /// One click of the two-click wall tool
    WallClick(Vec2),
    /// Place a boundary outline
    BuildBoundary(BoundaryShape),
    /// Remove every particle
    Reset,
    /// Change the designated inspected particle
    Inspect(Option<ParticleId>),
}

/// Render and diagnostics data published after each tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSnapshot {
    /// Completed ticks
    pub tick: u64,
    /// Per-particle render data
    pub views: Vec<ParticleView>,
    /// Statistics of the most recent tick
    pub stats: TickStats,
    /// Aggregate density and conservation metrics
    pub metrics: ErrorMetrics,
    /// State of the inspected particle
    pub inspected: Option<InspectedParticle>,
    /// First endpoint of an unfinished wall
    pub pending_wall: Option<Vec2>,
}

impl FrameSnapshot {
    fn capture(solver: &Solver) -> Self {
        Self {
            tick: solver.tick_count(),
            views: solver.views(),
            stats: solver.last_stats(),
            metrics: solver.error_metrics(),
            inspected: solver.inspected(),
            pending_wall: solver.pending_wall(),
        }
    }
}

/// Runner control failures.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The runner thread has exited and no longer accepts commands.
    #[error("simulation thread is no longer running")]
    Disconnected,
    /// The runner thread panicked.
    #[error("simulation thread panicked")]
    ThreadPanicked,
}

/// Shared state between the runner thread and control interface
struct SharedState {
    /// Current runner state
    state: RunnerState,
    /// Number of ticks executed
    tick_count: u64,
    /// Latest published frame
    snapshot: FrameSnapshot,
}

/// Recover the guard from a poisoned mutex; the state is plain data.
fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for controlling and querying a running simulation
pub struct SimulationRunner {
    /// Shared state (protected by mutex)
    shared: Arc<Mutex<SharedState>>,
    /// Scene edits for the runner thread
    commands: Sender<RunnerCommand>,
    /// Handle to the background thread; yields the solver on exit
    thread_handle: Option<thread::JoinHandle<Solver>>,
}

impl SimulationRunner {
    /// Create a new runner around `solver`
    ///
    /// The thread starts in [`RunnerState::Created`] and waits for
    /// [`SimulationRunner::start`]. With `max_ticks` set it finishes on its
    /// own after that many ticks.
    pub fn new(solver: Solver, max_ticks: Option<u64>) -> Self {
        let shared = Arc::new(Mutex::new(SharedState {
            state: RunnerState::Created,
            tick_count: solver.tick_count(),
            snapshot: FrameSnapshot::capture(&solver),
        }));
        let (commands, receiver) = mpsc::channel();

        let shared_clone = Arc::clone(&shared);
        let thread_handle =
            thread::spawn(move || run_simulation_loop(solver, shared_clone, receiver, max_ticks));

        Self {
            shared,
            commands,
            thread_handle: Some(thread_handle),
        }
    }

    /// Get current runner state
    pub fn state(&self) -> RunnerState {
        lock(&self.shared).state
    }

    /// Get current tick count
    pub fn tick_count(&self) -> u64 {
        lock(&self.shared).tick_count
    }

    /// Latest published frame
    pub fn snapshot(&self) -> FrameSnapshot {
        lock(&self.shared).snapshot.clone()
    }

    /// Start the simulation (transition from Created to Running)
    pub fn start(&self) {
        let mut guard = lock(&self.shared);
        if guard.state == RunnerState::Created {
            guard.state = RunnerState::Running;
        }
    }

    /// Pause the simulation
    pub fn pause(&self) {
        let mut guard = lock(&self.shared);
        if matches!(guard.state, RunnerState::Running | RunnerState::SingleStep) {
            guard.state = RunnerState::Paused;
        }
    }

    /// Resume the simulation
    pub fn resume(&self) {
        let mut guard = lock(&self.shared);
        if guard.state == RunnerState::Paused {
            guard.state = RunnerState::Running;
        }
    }

    /// Run exactly one tick, then pause
    pub fn step(&self) {
        let mut guard = lock(&self.shared);
        if matches!(guard.state, RunnerState::Created | RunnerState::Paused) {
            guard.state = RunnerState::SingleStep;
        }
    }

    /// Ask the thread to exit after the current tick
    pub fn stop(&self) {
        lock(&self.shared).state = RunnerState::Finished;
    }

    /// Queue a scene edit for the runner thread
    pub fn send(&self, command: RunnerCommand) -> Result<(), RunnerError> {
        self.commands
            .send(command)
            .map_err(|_| RunnerError::Disconnected)
    }

    /// Wait for the simulation thread to finish and take back the solver
    ///
    /// Blocks until the thread exits, so an unbounded run must be stopped
    /// first.
    pub fn join(mut self) -> Result<Solver, RunnerError> {
        let handle = self
            .thread_handle
            .take()
            .ok_or(RunnerError::Disconnected)?;
        handle.join().map_err(|_| RunnerError::ThreadPanicked)
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        // Signal the thread to exit if nobody joined it
        if self.thread_handle.is_some() {
            lock(&self.shared).state = RunnerState::Finished;
        }
    }
}

fn apply_command(solver: &mut Solver, command: RunnerCommand) {
    match command {
        RunnerCommand::SpawnParticle { position, kind } => {
            solver.add_particle(position, kind);
        }
        RunnerCommand::SeedLiquid(count) => {
            solver.seed_liquid(count);
        }
        RunnerCommand::AddLiquidBlock { min, max } => {
            solver.add_liquid_block(min, max);
        }
        RunnerCommand::WallClick(point) => {
            solver.wall_click(point);
        }
        RunnerCommand::BuildBoundary(shape) => {
            scene::build_boundary(solver, shape);
        }
        RunnerCommand::Reset => solver.reset(),
        RunnerCommand::Inspect(id) => solver.set_inspected(id),
    }
}

/// Apply every queued command. Returns whether anything changed.
fn drain_commands(solver: &mut Solver, receiver: &Receiver<RunnerCommand>) -> bool {
    let mut changed = false;
    while let Ok(command) = receiver.try_recv() {
        tracing::debug!("Applying runner command: {:?}", command);
        apply_command(solver, command);
        changed = true;
    }
    changed
}

/// Main simulation loop executed in background thread
fn run_simulation_loop(
    mut solver: Solver,
    shared: Arc<Mutex<SharedState>>,
    receiver: Receiver<RunnerCommand>,
    max_ticks: Option<u64>,
) -> Solver {
    let start_wall_time = Instant::now();
    let mut ticks_run = 0_u64;

    loop {
        if drain_commands(&mut solver, &receiver) {
            let mut guard = lock(&shared);
            guard.tick_count = solver.tick_count();
            guard.snapshot = FrameSnapshot::capture(&solver);
        }

        let current_state = lock(&shared).state;
        match current_state {
            RunnerState::Created => {
                thread::sleep(Duration::from_millis(10));
            }
            RunnerState::Paused => {
                solver.set_mode(RunMode::Paused);
                thread::sleep(Duration::from_millis(50));
            }
            RunnerState::Running | RunnerState::SingleStep => {
                solver.set_mode(if current_state == RunnerState::SingleStep {
                    RunMode::SingleStep
                } else {
                    RunMode::Running
                });
                let Some(stats) = solver.update() else {
                    continue;
                };
                ticks_run += 1;

                let finished = max_ticks.is_some_and(|max| ticks_run >= max);
                {
                    let mut guard = lock(&shared);
                    guard.tick_count = solver.tick_count();
                    guard.snapshot = FrameSnapshot::capture(&solver);
                    if finished {
                        guard.state = RunnerState::Finished;
                    } else if guard.state == RunnerState::SingleStep && solver.mode() == RunMode::Paused {
                        guard.state = RunnerState::Paused;
                    }
                }

                if finished {
                    tracing::info!(
                        "Simulation finished: reached max_ticks = {}",
                        ticks_run
                    );
                    break;
                }

                // Log progress periodically
                if ticks_run % 100 == 0 {
                    tracing::debug!(
                        "Tick {}: dt={:.5}, iterations={}, density_error={:.2e}, max_speed={:.3}, wall_time={:.2}s",
                        stats.tick,
                        stats.dt,
                        stats.iterations,
                        stats.density_error,
                        stats.max_speed,
                        start_wall_time.elapsed().as_secs_f64(),
                    );
                }
            }
            RunnerState::Finished => break,
        }
    }

    tracing::info!(
        "Simulation thread exiting: {} ticks run, {} particles, {:.2}s wall time",
        ticks_run,
        solver.particle_count(),
        start_wall_time.elapsed().as_secs_f64()
    );
    solver
}
