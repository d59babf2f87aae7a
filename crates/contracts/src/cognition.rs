//! Cognition contract types: persona identity, daily schedules, action
//! targets, and the persisted form of an agent.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::memory::MemorySnapshot;
use crate::spatial::{Address, TileCoord};

/// Minutes in a simulated day; schedules address this range.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Who a persona is: the stable text fields the oracle plans and speaks
/// from, plus the home address used as the planning fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonaIdentity {
    pub name: String,
    pub age: i64,
    /// Innate disposition, e.g. "curious, blunt, restless".
    pub innate: String,
    /// Learned background, e.g. "trained as a baker in the capital".
    pub learned: String,
    /// What the persona is currently occupied with, updated by planning.
    pub currently: String,
    /// Daily rhythm summary, e.g. "early riser, in bed by ten".
    pub lifestyle: String,
    /// Home arena; where planning falls back to when nothing resolves.
    pub living_area: Address,
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// One block of a daily schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub task: String,
    /// Minute of day in `[0, MINUTES_PER_DAY)`.
    pub start_minute: u32,
    pub duration_minutes: u32,
    /// Set once `decompose_task` has expanded this entry in place.
    #[serde(default)]
    pub decomposed: bool,
}

impl ScheduleEntry {
    pub fn covers(&self, minute_of_day: u32) -> bool {
        minute_of_day >= self.start_minute
            && minute_of_day < self.start_minute.saturating_add(self.duration_minutes)
    }
}

/// A high-level plan for one simulated day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailySchedule {
    /// Day index since the start of the run.
    pub day: u64,
    pub entries: Vec<ScheduleEntry>,
}

impl DailySchedule {
    /// The entry covering the given minute, if any.
    pub fn entry_at(&self, minute_of_day: u32) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|entry| entry.covers(minute_of_day))
    }

    pub fn entry_at_mut(&mut self, minute_of_day: u32) -> Option<&mut ScheduleEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.covers(minute_of_day))
    }
}

// ---------------------------------------------------------------------------
// Action target
// ---------------------------------------------------------------------------

/// Where the current action is headed. Three resolvable forms plus the
/// degenerate stay-in-place fallback every failure path lands on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionTarget {
    /// Remain at the current tile.
    Stay,
    /// An explicit tile ("wait here").
    Tile { coord: TileCoord },
    /// Move toward another persona, stopping at the path midpoint.
    Persona { name: String },
    /// Anywhere inside the named region.
    Region { address: Address },
}

impl Default for ActionTarget {
    fn default() -> Self {
        Self::Stay
    }
}

// ---------------------------------------------------------------------------
// Scratch
// ---------------------------------------------------------------------------

/// Per-agent mutable working state. Mutates every tick; persisted and
/// restored as a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scratch {
    pub tile: TileCoord,
    /// Half-width of the square perception neighborhood.
    pub vision_radius: i64,
    /// Most events perceivable in one tick.
    pub attention_bandwidth: usize,
    /// How many recent own events count as already known.
    pub retention: usize,
    /// Description of the action in progress, e.g. "kneading dough".
    pub action_description: String,
    pub action_target: ActionTarget,
    /// Remaining tiles of the planned route, next step first.
    pub planned_path: Vec<TileCoord>,
    pub schedule: Option<DailySchedule>,
    /// Day index the schedule was last planned for.
    pub last_planned_day: Option<u64>,
    /// Cumulative non-idle poignancy since the last reflection.
    pub reflection_accum: i64,
    /// Accumulator level that triggers reflection.
    pub reflection_threshold: i64,
    /// How many focal questions one reflection considers.
    pub reflection_focus: usize,
    /// Simulation time of the last reflection, in seconds.
    pub last_reflection: u64,
}

impl Scratch {
    pub fn at(tile: TileCoord) -> Self {
        Self {
            tile,
            vision_radius: 4,
            attention_bandwidth: 3,
            retention: 5,
            action_description: "idle".to_string(),
            action_target: ActionTarget::Stay,
            planned_path: Vec::new(),
            schedule: None,
            last_planned_day: None,
            reflection_accum: 0,
            reflection_threshold: 150,
            reflection_focus: 3,
            last_reflection: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Agent snapshot
// ---------------------------------------------------------------------------

/// The persisted spatial knowledge of one agent:
/// world → sector → arena → objects.
pub type SpatialKnowledge = BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeSet<String>>>>;

/// Flat persisted form of one agent. Must round-trip losslessly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSnapshot {
    pub identity: PersonaIdentity,
    pub scratch: Scratch,
    pub spatial: SpatialKnowledge,
    pub memory: MemorySnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_lookup_by_minute() {
        let schedule = DailySchedule {
            day: 0,
            entries: vec![
                ScheduleEntry {
                    task: "sleep".to_string(),
                    start_minute: 0,
                    duration_minutes: 360,
                    decomposed: false,
                },
                ScheduleEntry {
                    task: "open the bakery".to_string(),
                    start_minute: 360,
                    duration_minutes: 120,
                    decomposed: false,
                },
            ],
        };
        assert_eq!(schedule.entry_at(0).map(|e| e.task.as_str()), Some("sleep"));
        assert_eq!(
            schedule.entry_at(400).map(|e| e.task.as_str()),
            Some("open the bakery")
        );
        assert!(schedule.entry_at(480).is_none());
    }

    #[test]
    fn action_target_serde_is_tagged() {
        let target = ActionTarget::Persona {
            name: "Bo Carter".to_string(),
        };
        let json = serde_json::to_string(&target).expect("serialize");
        assert!(json.contains("\"type\":\"persona\""));
        let back: ActionTarget = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, target);
    }

    #[test]
    fn scratch_defaults_are_sane() {
        let scratch = Scratch::at(TileCoord::new(3, 3));
        assert_eq!(scratch.vision_radius, 4);
        assert!(scratch.planned_path.is_empty());
        assert_eq!(scratch.action_target, ActionTarget::Stay);
    }
}
