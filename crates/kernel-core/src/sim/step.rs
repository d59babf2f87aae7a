use std::collections::{BTreeMap, BTreeSet};

use contracts::{AddressLevel, Event, EventType, RunMode, TileEvent};
use serde_json::{json, Value};

use super::{mix_state_hash, Simulation, StepMetrics};
use crate::agent::CycleView;

impl Simulation {
    /// Advance one tick. Agents run their full cognitive cycle in name
    /// order; each agent's movement and presence event commit before the
    /// next agent perceives, so same-tick reactions stay possible.
    /// Returns false once the run is complete.
    pub fn step(&mut self) -> bool {
        let previous_tick = self.status.current_tick;
        self.last_step_metrics = StepMetrics::default();
        if self.status.is_complete() {
            self.status.mode = RunMode::Paused;
            return false;
        }
        self.status.mode = RunMode::Running;
        let tick = previous_tick + 1;
        self.status.current_tick = tick;

        let mut sequence_in_tick = 0_u64;
        let mut processed_agents = 0_u64;
        let mut nodes_recorded = 0_u64;
        let names = self.agents.keys().cloned().collect::<Vec<_>>();

        for name in names {
            let mut persona_tiles = BTreeMap::new();
            let mut claimed_tiles = BTreeSet::new();
            for (other_name, other) in &self.agents {
                if other_name == &name {
                    continue;
                }
                persona_tiles.insert(other_name.clone(), other.scratch.tile);
                claimed_tiles.insert(other.scratch.tile);
                claimed_tiles.extend(other.scratch.planned_path.iter().copied());
            }

            let view = CycleView {
                world: &self.world,
                tick,
                now: self.clock.now(tick),
                day: self.clock.day(tick),
                minute_of_day: self.clock.minute_of_day(tick),
                persona_tiles: &persona_tiles,
                claimed_tiles: &claimed_tiles,
                seed: self.config.seed,
            };

            let Some(persona) = self.agents.get_mut(&name) else {
                continue;
            };
            let outcome = persona.cycle(&view, &self.engine, &self.oracle);
            let old_tile = persona.scratch.tile;
            persona.scratch.tile = outcome.next_tile;
            let action_description = persona.scratch.action_description.clone();

            processed_agents += 1;
            nodes_recorded +=
                (outcome.perceived_nodes.len() + outcome.insight_nodes.len()) as u64;

            // Serial commit: this is the only place tile events mutate.
            self.world.remove_subject_events(old_tile, &name);
            let presence = if action_description == "idle" {
                TileEvent::idle(name.clone())
            } else {
                TileEvent::new(
                    name.clone(),
                    "is",
                    action_description.clone(),
                    format!("{name} is {action_description}"),
                )
            };
            self.world.add_event(outcome.next_tile, presence);

            if outcome.next_tile != old_tile {
                let address = self
                    .world
                    .address_of(outcome.next_tile, AddressLevel::Arena)
                    .map(|address| address.to_string());
                self.record_event(
                    tick,
                    &mut sequence_in_tick,
                    EventType::AgentMoved,
                    Some(name.clone()),
                    address,
                    Some(json!({
                        "from": old_tile.to_string(),
                        "to": outcome.next_tile.to_string(),
                    })),
                );
            }
            for note in outcome.notes {
                self.record_event(
                    tick,
                    &mut sequence_in_tick,
                    note.event_type,
                    Some(name.clone()),
                    None,
                    Some(note.details),
                );
            }

            self.maybe_start_chat(&name, tick, &mut sequence_in_tick);
        }

        self.state_hash = mix_state_hash(self.state_hash, tick, sequence_in_tick);
        self.last_step_metrics = StepMetrics {
            advanced_ticks: tick - previous_tick,
            processed_agents,
            nodes_recorded,
        };
        if self.status.is_complete() {
            self.status.mode = RunMode::Paused;
        }
        true
    }

    pub fn step_n(&mut self, n: u64) -> u64 {
        let mut committed = 0_u64;
        for _ in 0..n {
            if !self.step() {
                break;
            }
            committed += 1;
        }
        committed
    }

    pub fn run_to_tick(&mut self, tick: u64) -> u64 {
        let mut committed = 0_u64;
        while self.status.current_tick < tick {
            if !self.step() {
                break;
            }
            committed += 1;
        }
        committed
    }

    /// When a just-moved persona stands next to another in the same
    /// arena, drop a chat event on its tile; the persona will perceive
    /// its own chat next tick and record the companion chat node.
    fn maybe_start_chat(&mut self, name: &str, tick: u64, sequence_in_tick: &mut u64) {
        let Some(persona) = self.agents.get(name) else {
            return;
        };
        let my_tile = persona.scratch.tile;
        let my_arena = self.world.address_of(my_tile, AddressLevel::Arena);
        if my_arena.is_none() {
            return;
        }
        let partner = self
            .agents
            .iter()
            .filter(|(other_name, _)| other_name.as_str() != name)
            .filter(|(_, other)| other.scratch.tile.manhattan(&my_tile) == 1)
            .find(|(_, other)| {
                self.world.address_of(other.scratch.tile, AddressLevel::Arena) == my_arena
            })
            .map(|(other_name, _)| other_name.clone());
        let Some(partner) = partner else {
            return;
        };

        let identity = persona.identity.clone();
        let history = vec![persona.scratch.action_description.clone()];
        match self.oracle.utter(&identity, &history) {
            Ok(line) => {
                self.world
                    .add_event(my_tile, TileEvent::new(name, "chat with", partner, line));
            }
            Err(error) => self.record_event(
                tick,
                sequence_in_tick,
                EventType::OracleDegraded,
                Some(name.to_string()),
                None,
                Some(json!({ "stage": "utter", "error": error.to_string() })),
            ),
        }
    }

    pub(super) fn record_event(
        &mut self,
        tick: u64,
        sequence_in_tick: &mut u64,
        event_type: EventType,
        agent: Option<String>,
        address: Option<String>,
        details: Option<Value>,
    ) {
        let event = Event {
            schema_version: contracts::SCHEMA_VERSION_V1.to_string(),
            run_id: self.config.run_id.clone(),
            tick,
            sequence_in_tick: *sequence_in_tick,
            event_id: format!("evt_{}_{}", tick, *sequence_in_tick),
            created_at: self.clock.timestamp(tick),
            event_type,
            agent,
            address,
            details,
        };
        self.event_log.push(event);
        *sequence_in_tick += 1;
    }
}
