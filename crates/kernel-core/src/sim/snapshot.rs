use std::collections::BTreeMap;
use std::fmt;

use contracts::{RunConfig, Snapshot, WorldSource, SCHEMA_VERSION_V1};

use super::Simulation;
use crate::agent::Persona;
use crate::memory::MemoryRestoreError;
use crate::oracle::OracleClient;
use crate::world::{WorldLoadError, WorldModel};

/// Problems restoring a persisted run. All fatal: a run resumed from a
/// half-trusted snapshot would silently diverge from its own history.
#[derive(Debug)]
pub enum RestoreError {
    World(WorldLoadError),
    Memory(MemoryRestoreError),
    BadStateHash(String),
    RunMismatch { expected: String, found: String },
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::World(err) => write!(f, "world load failed: {err}"),
            Self::Memory(err) => write!(f, "memory restore failed: {err}"),
            Self::BadStateHash(raw) => write!(f, "snapshot state hash {raw:?} is not hex"),
            Self::RunMismatch { expected, found } => {
                write!(f, "snapshot belongs to run {found:?}, expected {expected:?}")
            }
        }
    }
}

impl std::error::Error for RestoreError {}

impl From<WorldLoadError> for RestoreError {
    fn from(value: WorldLoadError) -> Self {
        Self::World(value)
    }
}

impl From<MemoryRestoreError> for RestoreError {
    fn from(value: MemoryRestoreError) -> Self {
        Self::Memory(value)
    }
}

impl Simulation {
    /// Full persisted state at the current tick: every agent flattened,
    /// plus the mutable world state. The static grid is not persisted —
    /// restore reloads it from the same source.
    pub fn snapshot_for_current_tick(&self) -> Snapshot {
        let tick = self.status.current_tick;
        Snapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: self.config.run_id.clone(),
            tick,
            created_at: self.clock.timestamp(tick),
            snapshot_id: format!("snap_{}_{tick:06}", self.config.run_id),
            state_hash: format!("{:016x}", self.state_hash),
            world_events: self.world.placed_events(),
            agents: self.agents.values().map(Persona::to_snapshot).collect(),
        }
    }

    /// Rebuild a simulation from a snapshot plus the original world
    /// source and an oracle. The event log starts empty; determinism
    /// state (tick, state hash, every agent) resumes exactly.
    pub fn restore(
        config: RunConfig,
        source: &WorldSource,
        oracle: OracleClient,
        snapshot: &Snapshot,
    ) -> Result<Self, RestoreError> {
        if snapshot.run_id != config.run_id {
            return Err(RestoreError::RunMismatch {
                expected: config.run_id.clone(),
                found: snapshot.run_id.clone(),
            });
        }
        let state_hash = u64::from_str_radix(&snapshot.state_hash, 16)
            .map_err(|_| RestoreError::BadStateHash(snapshot.state_hash.clone()))?;

        let mut world = WorldModel::load(source)?;
        world.restore_events(&snapshot.world_events);

        let mut agents = BTreeMap::new();
        for agent_snapshot in &snapshot.agents {
            let persona = Persona::from_snapshot(agent_snapshot)?;
            agents.insert(persona.name().to_string(), persona);
        }

        Ok(Self::assemble(
            config,
            world,
            oracle,
            agents,
            snapshot.tick,
            state_hash,
        ))
    }
}
