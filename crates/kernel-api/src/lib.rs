//! In-process API facade: owns a [`Simulation`], flushes its event log
//! and periodic snapshots to SQLite, and resumes persisted runs.

mod persistence;

use std::fmt;
use std::path::Path;

use contracts::{RunConfig, RunStatus};
use kernel_core::oracle::OracleClient;
use kernel_core::sim::{demo_world_source, RestoreError, Simulation, StepMetrics};
use kernel_core::world::WorldLoadError;

pub use persistence::{PersistenceError, ReplaySlice, SqliteRunStore};

#[derive(Debug)]
pub enum EngineError {
    World(WorldLoadError),
    Persistence(PersistenceError),
    Restore(RestoreError),
    /// The store knows the run but holds no snapshot to resume from.
    NoSnapshot(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::World(err) => write!(f, "world load failed: {err}"),
            Self::Persistence(err) => write!(f, "persistence failed: {err}"),
            Self::Restore(err) => write!(f, "restore failed: {err}"),
            Self::NoSnapshot(run_id) => {
                write!(f, "run {run_id:?} has no snapshot to resume from")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<WorldLoadError> for EngineError {
    fn from(value: WorldLoadError) -> Self {
        Self::World(value)
    }
}

impl From<PersistenceError> for EngineError {
    fn from(value: PersistenceError) -> Self {
        Self::Persistence(value)
    }
}

impl From<RestoreError> for EngineError {
    fn from(value: RestoreError) -> Self {
        Self::Restore(value)
    }
}

#[derive(Debug)]
struct PersistenceState {
    store: SqliteRunStore,
    flushed_events: usize,
    last_snapshot_tick: Option<u64>,
}

#[derive(Debug)]
pub struct EngineApi {
    sim: Simulation,
    persistence: Option<PersistenceState>,
    last_persistence_error: Option<String>,
}

impl EngineApi {
    /// The built-in scenario with the deterministic scripted oracle;
    /// this is what the CLI runs.
    pub fn bootstrap(config: RunConfig) -> Result<Self, EngineError> {
        let oracle = OracleClient::scripted(config.seed);
        let sim = Simulation::bootstrap(config, oracle)?;
        Ok(Self::with_simulation(sim))
    }

    /// Wrap a simulation the caller assembled (custom world, custom
    /// oracle).
    pub fn with_simulation(sim: Simulation) -> Self {
        Self {
            sim,
            persistence: None,
            last_persistence_error: None,
        }
    }

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        self.attach_store(SqliteRunStore::open(path)?);
        Ok(())
    }

    pub fn attach_store(&mut self, store: SqliteRunStore) {
        self.persistence = Some(PersistenceState {
            store,
            flushed_events: 0,
            last_snapshot_tick: None,
        });
    }

    /// Resume the built-in scenario from a store. The world is rebuilt
    /// from the demo source; agents and clock come from the snapshot.
    pub fn resume_demo_run(path: impl AsRef<Path>, run_id: &str) -> Result<Self, EngineError> {
        let store = SqliteRunStore::open(path)?;
        let slice = store.load_replay(run_id)?;
        let snapshot = slice
            .snapshot
            .ok_or_else(|| EngineError::NoSnapshot(run_id.to_string()))?;
        let oracle = OracleClient::scripted(slice.config.seed);
        let sim = Simulation::restore(slice.config, &demo_world_source(), oracle, &snapshot)?;
        let mut api = Self::with_simulation(sim);
        api.persistence = Some(PersistenceState {
            store,
            flushed_events: 0,
            last_snapshot_tick: Some(snapshot.tick),
        });
        Ok(api)
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn status(&self) -> &RunStatus {
        self.sim.status()
    }

    pub fn last_step_metrics(&self) -> StepMetrics {
        self.sim.last_step_metrics()
    }

    /// The most recent flush failure, if any. Persistence trouble never
    /// stops the simulation; it is surfaced here instead.
    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    /// Step up to `n` ticks, flushing after the batch.
    pub fn step(&mut self, n: u64) -> u64 {
        let committed = self.sim.step_n(n);
        self.flush();
        committed
    }

    pub fn run_to_tick(&mut self, tick: u64) -> u64 {
        let committed = self.sim.run_to_tick(tick);
        self.flush();
        committed
    }

    fn flush(&mut self) {
        let Some(state) = self.persistence.as_mut() else {
            return;
        };
        let tick = self.sim.status().current_tick;
        let cadence = self.sim.config().snapshot_every_ticks.max(1);
        let snapshot_due = state
            .last_snapshot_tick
            .map(|last| tick.saturating_sub(last) >= cadence)
            .unwrap_or(true);
        let snapshot = if snapshot_due {
            Some(self.sim.snapshot_for_current_tick())
        } else {
            None
        };

        let events = self.sim.events_since(state.flushed_events);
        let result = state.store.persist_delta(
            self.sim.config(),
            self.sim.status(),
            events,
            snapshot.as_ref(),
        );
        match result {
            Ok(()) => {
                state.flushed_events += events.len();
                if let Some(snapshot) = snapshot {
                    state.last_snapshot_tick = Some(snapshot.tick);
                }
                self.last_persistence_error = None;
            }
            Err(error) => {
                self.last_persistence_error = Some(error.to_string());
            }
        }
    }
}
