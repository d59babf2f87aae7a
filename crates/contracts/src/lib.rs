//! Cross-boundary contracts for the Hearthvale kernel, persistence layer,
//! and external callers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod cognition;
pub mod memory;
pub mod serde_u64_string;
pub mod spatial;
pub mod world;

pub use cognition::{
    ActionTarget, AgentSnapshot, DailySchedule, PersonaIdentity, ScheduleEntry, Scratch,
    SpatialKnowledge, MINUTES_PER_DAY,
};
pub use memory::{ConceptKind, ConceptNode, MemorySnapshot};
pub use spatial::{
    Address, AddressLevel, AddressParseError, TileCoord, TileEvent, IDLE_OBJECT, IDLE_PREDICATE,
};
pub use world::{WorldMeta, WorldSource};

pub const SCHEMA_VERSION_V1: &str = "1.0";
pub const SECONDS_PER_DAY: u64 = 86_400;

// ---------------------------------------------------------------------------
// Run configuration and status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    pub schema_version: String,
    pub run_id: String,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
    pub duration_days: u32,
    /// Simulated seconds that pass per tick.
    pub seconds_per_tick: u64,
    pub snapshot_every_ticks: u64,
    /// Perception defaults handed to each agent at creation.
    pub vision_radius: i64,
    pub attention_bandwidth: usize,
    pub retention: usize,
    /// Reflection defaults handed to each agent at creation.
    pub reflection_threshold: i64,
    pub reflection_focus: usize,
    pub notes: Option<String>,
}

impl RunConfig {
    pub fn ticks_per_day(&self) -> u64 {
        SECONDS_PER_DAY / self.seconds_per_tick.max(1)
    }

    pub fn max_ticks(&self) -> u64 {
        u64::from(self.duration_days) * self.ticks_per_day()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: "run_hearth_001".to_string(),
            seed: 1337,
            duration_days: 7,
            seconds_per_tick: 60,
            snapshot_every_ticks: 240,
            vision_radius: 4,
            attention_bandwidth: 3,
            retention: 5,
            reflection_threshold: 150,
            reflection_focus: 3,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Running,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStatus {
    pub schema_version: String,
    pub run_id: String,
    pub current_tick: u64,
    pub max_ticks: u64,
    pub mode: RunMode,
}

impl RunStatus {
    pub fn is_complete(&self) -> bool {
        self.current_tick >= self.max_ticks
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={} tick={}/{} mode={:?}",
            self.run_id, self.current_tick, self.max_ticks, self.mode
        )
    }
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// Everything the kernel records about a run, including degradations. The
/// event log is the system's observability surface; the persistence layer
/// flushes it verbatim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentMoved,
    EventPerceived,
    ChatRecorded,
    ScheduleAdopted,
    TaskDecomposed,
    ReflectionTriggered,
    InsightRecorded,
    OracleDegraded,
    TargetUnresolved,
    PathUnreachable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub schema_version: String,
    pub run_id: String,
    pub tick: u64,
    pub sequence_in_tick: u64,
    pub event_id: String,
    pub created_at: String,
    pub event_type: EventType,
    pub agent: Option<String>,
    /// Address string of where the event happened, when known.
    pub address: Option<String>,
    pub details: Option<Value>,
}

// ---------------------------------------------------------------------------
// Snapshot envelope
// ---------------------------------------------------------------------------

/// A tile event pinned to its coordinate, for persisting world state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacedEvent {
    pub coord: TileCoord,
    pub event: TileEvent,
}

/// Full persisted state of a run at one tick: every agent's flat snapshot
/// plus the mutable world state (tile events). The static world grid is
/// reloaded from its source, not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub schema_version: String,
    pub run_id: String,
    pub tick: u64,
    pub created_at: String,
    pub snapshot_id: String,
    /// Running determinism hash, hex-encoded.
    pub state_hash: String,
    pub world_events: Vec<PlacedEvent>,
    /// Sorted by persona name.
    pub agents: Vec<AgentSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_tick_math() {
        let config = RunConfig::default();
        assert_eq!(config.ticks_per_day(), 1_440);
        assert_eq!(config.max_ticks(), 7 * 1_440);
    }

    #[test]
    fn run_status_completion() {
        let status = RunStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: "run_hearth_001".to_string(),
            current_tick: 10,
            max_ticks: 10,
            mode: RunMode::Paused,
        };
        assert!(status.is_complete());
        assert!(status.to_string().contains("tick=10/10"));
    }

    #[test]
    fn config_seed_survives_json_round_trip() {
        let config = RunConfig {
            seed: u64::MAX,
            ..RunConfig::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let decoded: RunConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded.seed, u64::MAX);
    }
}
