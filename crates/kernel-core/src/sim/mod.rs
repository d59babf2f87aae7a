//! The orchestrator: one shared clock, agents cycled in fixed name order
//! each tick, movement and tile-event mutation committed serially so a
//! later agent can read what an earlier agent just did.

mod init;
mod snapshot;
mod step;

use std::collections::BTreeMap;

use contracts::{Event, RunConfig, RunMode, RunStatus, SCHEMA_VERSION_V1, SECONDS_PER_DAY};

use crate::agent::Persona;
use crate::oracle::OracleClient;
use crate::retrieval::{RetrievalConfig, RetrievalEngine};
use crate::world::{WorldLoadError, WorldModel};

pub use init::demo_world_source;
pub use snapshot::RestoreError;

/// Per-step bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepMetrics {
    pub advanced_ticks: u64,
    pub processed_agents: u64,
    pub nodes_recorded: u64,
}

/// Tick ↔ simulated-time arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameClock {
    pub seconds_per_tick: u64,
}

impl GameClock {
    pub fn now(&self, tick: u64) -> u64 {
        tick * self.seconds_per_tick.max(1)
    }

    pub fn day(&self, tick: u64) -> u64 {
        self.now(tick) / SECONDS_PER_DAY
    }

    pub fn minute_of_day(&self, tick: u64) -> u32 {
        ((self.now(tick) % SECONDS_PER_DAY) / 60) as u32
    }

    /// Synthetic wall-clock stamp, e.g. `d002T07:30:00`.
    pub fn timestamp(&self, tick: u64) -> String {
        let now = self.now(tick);
        let in_day = now % SECONDS_PER_DAY;
        format!(
            "d{:03}T{:02}:{:02}:{:02}",
            now / SECONDS_PER_DAY,
            in_day / 3_600,
            (in_day % 3_600) / 60,
            in_day % 60
        )
    }
}

#[derive(Debug)]
pub struct Simulation {
    config: RunConfig,
    status: RunStatus,
    clock: GameClock,
    world: WorldModel,
    agents: BTreeMap<String, Persona>,
    engine: RetrievalEngine,
    oracle: OracleClient,
    event_log: Vec<Event>,
    state_hash: u64,
    last_step_metrics: StepMetrics,
}

impl Simulation {
    /// Assemble a simulation around an already-loaded world. Every
    /// persona gets its presence event placed on its starting tile.
    pub fn new(
        config: RunConfig,
        world: WorldModel,
        oracle: OracleClient,
        personas: Vec<Persona>,
    ) -> Self {
        let mut agents = BTreeMap::new();
        for persona in personas {
            agents.insert(persona.name().to_string(), persona);
        }
        let mut sim = Self::assemble(config, world, oracle, agents, 0, 0);
        let placements = sim
            .agents
            .values()
            .map(|persona| (persona.name().to_string(), persona.scratch.tile))
            .collect::<Vec<_>>();
        for (name, tile) in placements {
            sim.world.add_event(tile, contracts::TileEvent::idle(name));
        }
        sim
    }

    /// Load the world from a source first; fatal on a malformed asset.
    pub fn from_source(
        config: RunConfig,
        source: &contracts::WorldSource,
        oracle: OracleClient,
        personas: Vec<Persona>,
    ) -> Result<Self, WorldLoadError> {
        let world = WorldModel::load(source)?;
        Ok(Self::new(config, world, oracle, personas))
    }

    pub(super) fn assemble(
        config: RunConfig,
        world: WorldModel,
        oracle: OracleClient,
        agents: BTreeMap<String, Persona>,
        current_tick: u64,
        state_hash: u64,
    ) -> Self {
        let status = RunStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: config.run_id.clone(),
            current_tick,
            max_ticks: config.max_ticks(),
            mode: RunMode::Paused,
        };
        let clock = GameClock {
            seconds_per_tick: config.seconds_per_tick,
        };
        Self {
            config,
            status,
            clock,
            world,
            agents,
            engine: RetrievalEngine::new(RetrievalConfig::default()),
            oracle,
            event_log: Vec::new(),
            state_hash,
            last_step_metrics: StepMetrics::default(),
        }
    }

    /// Swap the retrieval engine, e.g. to attach a worker pool.
    pub fn with_retrieval_engine(mut self, engine: RetrievalEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn clock(&self) -> GameClock {
        self.clock
    }

    pub fn world(&self) -> &WorldModel {
        &self.world
    }

    pub fn agents(&self) -> &BTreeMap<String, Persona> {
        &self.agents
    }

    pub fn agent(&self, name: &str) -> Option<&Persona> {
        self.agents.get(name)
    }

    pub fn events(&self) -> &[Event] {
        &self.event_log
    }

    /// Drain events recorded since the given index; persistence cursors
    /// use this to flush deltas.
    pub fn events_since(&self, index: usize) -> &[Event] {
        &self.event_log[index.min(self.event_log.len())..]
    }

    pub fn state_hash(&self) -> u64 {
        self.state_hash
    }

    pub fn last_step_metrics(&self) -> StepMetrics {
        self.last_step_metrics
    }
}

// ---------------------------------------------------------------------------
// Seeded mixing
// ---------------------------------------------------------------------------
// Splitmix-style hash mixing stands in for an RNG: every sample is a pure
// function of (seed, stream), so runs replay exactly.

pub(crate) fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut value = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    value ^= value.rotate_left(31);
    value = value.wrapping_mul(0x517C_C1B7_2722_0A95);
    value ^ (value >> 29)
}

pub(crate) fn sample_range_i64(seed: u64, stream: u64, min: i64, max: i64) -> i64 {
    if max <= min {
        return min;
    }
    let span = (max - min + 1) as u64;
    min + (mix_seed(seed, stream) % span) as i64
}

pub(crate) fn stable_text_hash(text: &str) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    for byte in text.as_bytes() {
        hash = hash.rotate_left(5) ^ u64::from(*byte);
        hash = hash.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    }
    hash
}

pub(crate) fn mix_state_hash(state_hash: u64, tick: u64, sequence_in_tick: u64) -> u64 {
    let mut hash = state_hash ^ tick.wrapping_mul(0xA24B_1C62_5B93_2D47);
    hash ^= sequence_in_tick.wrapping_mul(0x517C_C1B7_2722_0A95);
    hash.rotate_left(19)
}

#[cfg(test)]
mod tests;
