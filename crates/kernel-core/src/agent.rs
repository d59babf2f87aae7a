//! The persona: identity, scratch state, private spatial knowledge, and
//! episodic memory, composed into one cognitive cycle per tick:
//! perceive → retrieve → plan → reflect → execute.
//!
//! Every oracle call inside the cycle has a stage-local fallback, so the
//! cycle always runs to completion and the worst outcome is standing
//! still with an unremarkable memory.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{
    ActionTarget, AgentSnapshot, ConceptKind, DailySchedule, EventType, PersonaIdentity,
    RunConfig, Scratch, TileCoord, SECONDS_PER_DAY,
};
use serde_json::json;

use crate::memory::{EmbeddingCache, MemoryRestoreError, MemoryStore, NewConcept};
use crate::oracle::{OracleClient, OracleError};
use crate::path::shortest_path;
use crate::perception::{dedupe_against_memory, gather_events, register_surroundings};
use crate::retrieval::RetrievalEngine;
use crate::sim::{mix_seed, stable_text_hash};
use crate::spatial::SpatialTree;
use crate::world::WorldModel;

/// How long a memory stays current before it logically expires. Expired
/// nodes are never deleted; the stamp is audit metadata.
const MEMORY_TTL_DAYS: u64 = 30;

/// Schedule blocks longer than this are decomposed before they run.
const DECOMPOSE_ABOVE_MINUTES: u32 = 60;

/// How many route targets a region resolution will try pathing to.
const ROUTE_CANDIDATES: usize = 4;

const CHAT_PREDICATE: &str = "chat with";

// ---------------------------------------------------------------------------
// Cycle inputs and outputs
// ---------------------------------------------------------------------------

/// Read-only view of the world an agent cycles against. Tile events
/// committed by earlier agents this tick are already visible.
pub struct CycleView<'a> {
    pub world: &'a WorldModel,
    pub tick: u64,
    /// Simulation time in seconds.
    pub now: u64,
    pub day: u64,
    pub minute_of_day: u32,
    /// Other personas' current tiles, by name.
    pub persona_tiles: &'a BTreeMap<String, TileCoord>,
    /// Tiles other agents stand on or have routed through: their full
    /// in-flight planned paths, not just their current positions.
    pub claimed_tiles: &'a BTreeSet<TileCoord>,
    pub seed: u64,
}

/// One observability record out of a cycle; the orchestrator turns these
/// into event-log rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleNote {
    pub event_type: EventType,
    pub details: serde_json::Value,
}

impl CycleNote {
    fn degraded(stage: &'static str, error: &OracleError) -> Self {
        Self {
            event_type: EventType::OracleDegraded,
            details: json!({ "stage": stage, "error": error.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub next_tile: TileCoord,
    /// Node ids recorded during perception, chats included.
    pub perceived_nodes: Vec<u64>,
    /// Focal query → ranked node ids.
    pub retrieved: BTreeMap<String, Vec<u64>>,
    /// Thought nodes inserted by reflection.
    pub insight_nodes: Vec<u64>,
    pub notes: Vec<CycleNote>,
}

// ---------------------------------------------------------------------------
// Persona
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub identity: PersonaIdentity,
    pub scratch: Scratch,
    pub spatial: SpatialTree,
    pub memory: MemoryStore,
    pub embeddings: EmbeddingCache,
}

impl Persona {
    pub fn new(identity: PersonaIdentity, config: &RunConfig, start: TileCoord) -> Self {
        let mut scratch = Scratch::at(start);
        scratch.vision_radius = config.vision_radius;
        scratch.attention_bandwidth = config.attention_bandwidth;
        scratch.retention = config.retention;
        scratch.reflection_threshold = config.reflection_threshold;
        scratch.reflection_focus = config.reflection_focus;
        Self {
            identity,
            scratch,
            spatial: SpatialTree::new(),
            memory: MemoryStore::new(),
            embeddings: EmbeddingCache::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Run the full cycle once. Each stage is entered exactly once.
    pub fn cycle(
        &mut self,
        view: &CycleView<'_>,
        engine: &RetrievalEngine,
        oracle: &OracleClient,
    ) -> TickOutcome {
        let mut notes = Vec::new();
        let perceived_nodes = self.perceive(view, oracle, &mut notes);
        let retrieved = self.retrieve(&perceived_nodes, engine, view.now);
        self.plan(view, &retrieved, oracle, &mut notes);
        let insight_nodes = self.reflect(view, engine, oracle, &mut notes);
        let next_tile = self.execute(view, &mut notes);
        TickOutcome {
            next_tile,
            perceived_nodes,
            retrieved,
            insight_nodes,
            notes,
        }
    }

    // -- Perceive ----------------------------------------------------------

    fn perceive(
        &mut self,
        view: &CycleView<'_>,
        oracle: &OracleClient,
        notes: &mut Vec<CycleNote>,
    ) -> Vec<u64> {
        register_surroundings(
            &mut self.spatial,
            view.world,
            self.scratch.tile,
            self.scratch.vision_radius,
        );
        let gathered = gather_events(
            view.world,
            self.scratch.tile,
            self.scratch.vision_radius,
            self.scratch.attention_bandwidth,
        );
        let fresh = dedupe_against_memory(&self.memory, self.scratch.retention, gathered);

        let mut recorded = Vec::new();
        for perceived in fresh {
            let event = perceived.event;
            let subject_tail = event
                .subject
                .rsplit(':')
                .next()
                .unwrap_or(event.subject.as_str())
                .to_string();
            let description = if event.is_idle() {
                format!("{subject_tail} is idle")
            } else {
                event.effective_description().to_string()
            };

            let poignancy = if event.is_idle() {
                1
            } else {
                match oracle.score_poignancy(ConceptKind::Event, &description) {
                    Ok(score) => score,
                    Err(error) => {
                        notes.push(CycleNote::degraded("score_poignancy", &error));
                        1
                    }
                }
            };
            if !event.is_idle() {
                self.ensure_embedding(&description, oracle, notes);
                self.scratch.reflection_accum += poignancy;
            }

            let node_id = self.memory.insert(NewConcept {
                kind: ConceptKind::Event,
                created: view.now,
                expires: Some(view.now + MEMORY_TTL_DAYS * SECONDS_PER_DAY),
                subject: event.subject.clone(),
                predicate: event.effective_predicate().to_string(),
                object: event.effective_object().to_string(),
                description: description.clone(),
                poignancy,
                keywords: event.keywords(),
                embedding_key: description.clone(),
                evidence: Vec::new(),
            });
            notes.push(CycleNote {
                event_type: EventType::EventPerceived,
                details: json!({ "node_id": node_id, "description": description }),
            });
            recorded.push(node_id);

            // A persona-vs-persona chat leaves a companion chat node
            // carrying what this agent was doing at the time.
            if event.subject == self.identity.name
                && event.effective_predicate() == CHAT_PREDICATE
            {
                let chat_description = self.scratch.action_description.clone();
                let chat_poignancy = match oracle.score_poignancy(ConceptKind::Chat, &chat_description)
                {
                    Ok(score) => score,
                    Err(error) => {
                        notes.push(CycleNote::degraded("score_poignancy", &error));
                        1
                    }
                };
                self.ensure_embedding(&chat_description, oracle, notes);
                let chat_id = self.memory.insert(NewConcept {
                    kind: ConceptKind::Chat,
                    created: view.now,
                    expires: Some(view.now + MEMORY_TTL_DAYS * SECONDS_PER_DAY),
                    subject: self.identity.name.clone(),
                    predicate: CHAT_PREDICATE.to_string(),
                    object: event.effective_object().to_string(),
                    description: chat_description,
                    poignancy: chat_poignancy,
                    keywords: BTreeSet::from([
                        self.identity.name.clone(),
                        event.effective_object().to_string(),
                    ]),
                    embedding_key: self.scratch.action_description.clone(),
                    evidence: Vec::new(),
                });
                notes.push(CycleNote {
                    event_type: EventType::ChatRecorded,
                    details: json!({ "node_id": chat_id, "with": event.effective_object() }),
                });
                recorded.push(chat_id);
            }
        }
        recorded
    }

    fn ensure_embedding(
        &mut self,
        key: &str,
        oracle: &OracleClient,
        notes: &mut Vec<CycleNote>,
    ) {
        if self.embeddings.contains(key) {
            return;
        }
        match oracle.embed(key) {
            Ok(vector) => self.embeddings.insert(key, vector),
            Err(error) => notes.push(CycleNote::degraded("embed", &error)),
        }
    }

    // -- Retrieve ----------------------------------------------------------

    fn retrieve(
        &mut self,
        perceived: &[u64],
        engine: &RetrievalEngine,
        now: u64,
    ) -> BTreeMap<String, Vec<u64>> {
        let focals = perceived
            .iter()
            .filter_map(|id| self.memory.node(*id))
            .map(|node| node.description.clone())
            .collect::<Vec<_>>();
        let mut out = BTreeMap::new();
        for focal in focals {
            let ranked = engine.retrieve(&mut self.memory, &self.embeddings, &focal, now);
            out.insert(focal, ranked);
        }
        out
    }

    // -- Plan --------------------------------------------------------------

    fn plan(
        &mut self,
        view: &CycleView<'_>,
        retrieved: &BTreeMap<String, Vec<u64>>,
        oracle: &OracleClient,
        notes: &mut Vec<CycleNote>,
    ) {
        if self.scratch.last_planned_day != Some(view.day) {
            let prior = self
                .memory
                .recent_non_idle(5)
                .iter()
                .map(|node| node.description.clone())
                .collect::<Vec<_>>();
            match oracle.plan_day(&self.identity, &prior, view.day) {
                Ok(entries) => {
                    notes.push(CycleNote {
                        event_type: EventType::ScheduleAdopted,
                        details: json!({ "day": view.day, "entries": entries.len() }),
                    });
                    self.scratch.schedule = Some(DailySchedule {
                        day: view.day,
                        entries,
                    });
                    self.scratch.last_planned_day = Some(view.day);
                }
                // Keep the previous day's schedule; the next tick retries.
                Err(error) => notes.push(CycleNote::degraded("plan_day", &error)),
            }
        }

        self.decompose_current_entry(view.minute_of_day, oracle, notes);

        let task = self
            .scratch
            .schedule
            .as_ref()
            .and_then(|schedule| schedule.entry_at(view.minute_of_day))
            .map(|entry| entry.task.clone())
            .unwrap_or_else(|| "idle".to_string());
        self.scratch.action_description = task.clone();

        // A route in flight keeps its target; re-resolving mid-walk would
        // thrash the path cache.
        if !self.scratch.planned_path.is_empty() {
            return;
        }

        let options = self.spatial.known_arenas(view.world.world_name());
        let context = retrieved
            .values()
            .flatten()
            .take(8)
            .filter_map(|id| self.memory.node(*id))
            .map(|node| node.description.clone())
            .collect::<Vec<_>>();
        match oracle.resolve_address(&self.identity, &task, &context, &options) {
            Ok(address) if view.world.knows_address(&address) => {
                self.scratch.action_target = ActionTarget::Region { address };
            }
            Ok(address) => {
                notes.push(CycleNote {
                    event_type: EventType::TargetUnresolved,
                    details: json!({ "address": address.to_string() }),
                });
                self.scratch.action_target = ActionTarget::Stay;
            }
            // Continue toward whatever was already in motion.
            Err(error) => notes.push(CycleNote::degraded("resolve_address", &error)),
        }
    }

    fn decompose_current_entry(
        &mut self,
        minute_of_day: u32,
        oracle: &OracleClient,
        notes: &mut Vec<CycleNote>,
    ) {
        let Some(schedule) = self.scratch.schedule.as_mut() else {
            return;
        };
        let Some(index) = schedule.entries.iter().position(|entry| {
            entry.covers(minute_of_day)
                && entry.duration_minutes > DECOMPOSE_ABOVE_MINUTES
                && !entry.decomposed
        }) else {
            return;
        };
        let block = schedule.entries[index].clone();
        match oracle.decompose_task(&block.task, block.duration_minutes) {
            Ok(steps) => {
                let rebased = steps
                    .into_iter()
                    .map(|mut step| {
                        step.start_minute += block.start_minute;
                        step.decomposed = true;
                        step
                    })
                    .collect::<Vec<_>>();
                notes.push(CycleNote {
                    event_type: EventType::TaskDecomposed,
                    details: json!({ "task": block.task, "steps": rebased.len() }),
                });
                schedule.entries.splice(index..=index, rebased);
            }
            Err(error) => {
                notes.push(CycleNote::degraded("decompose_task", &error));
                // Run the block undecomposed rather than retrying forever.
                schedule.entries[index].decomposed = true;
            }
        }
    }

    // -- Reflect -----------------------------------------------------------

    fn reflect(
        &mut self,
        view: &CycleView<'_>,
        engine: &RetrievalEngine,
        oracle: &OracleClient,
        notes: &mut Vec<CycleNote>,
    ) -> Vec<u64> {
        if self.scratch.reflection_accum < self.scratch.reflection_threshold {
            return Vec::new();
        }

        // Focal questions: the most recent non-idle memories, most
        // poignant first, ties to the older node.
        let questions = {
            let mut recent = self.memory.recent_non_idle(self.scratch.reflection_focus * 2);
            recent.sort_by(|a, b| {
                b.poignancy
                    .cmp(&a.poignancy)
                    .then(a.node_id.cmp(&b.node_id))
            });
            recent
                .iter()
                .take(self.scratch.reflection_focus)
                .map(|node| node.description.clone())
                .collect::<Vec<_>>()
        };
        notes.push(CycleNote {
            event_type: EventType::ReflectionTriggered,
            details: json!({ "questions": questions.len(), "accumulated": self.scratch.reflection_accum }),
        });

        let mut inserted = Vec::new();
        for question in questions {
            let evidence_ids =
                engine.retrieve(&mut self.memory, &self.embeddings, &question, view.now);
            let statements = evidence_ids
                .iter()
                .filter_map(|id| self.memory.node(*id))
                .map(|node| node.description.clone())
                .collect::<Vec<_>>();
            match oracle.reflect(&question, &statements) {
                Ok(insight) => {
                    let poignancy = match oracle.score_poignancy(ConceptKind::Thought, &insight) {
                        Ok(score) => score,
                        Err(error) => {
                            notes.push(CycleNote::degraded("score_poignancy", &error));
                            1
                        }
                    };
                    self.ensure_embedding(&insight, oracle, notes);
                    let node_id = self.memory.insert(NewConcept {
                        kind: ConceptKind::Thought,
                        created: view.now,
                        expires: Some(view.now + MEMORY_TTL_DAYS * SECONDS_PER_DAY),
                        subject: self.identity.name.clone(),
                        predicate: "reflects on".to_string(),
                        object: question.clone(),
                        description: insight.clone(),
                        poignancy,
                        keywords: BTreeSet::from([self.identity.name.clone()]),
                        embedding_key: insight,
                        evidence: evidence_ids,
                    });
                    notes.push(CycleNote {
                        event_type: EventType::InsightRecorded,
                        details: json!({ "node_id": node_id, "question": question }),
                    });
                    inserted.push(node_id);
                }
                // Skip this question's insight; the cycle moves on.
                Err(error) => notes.push(CycleNote::degraded("reflect", &error)),
            }
        }

        // The accumulator resets whether or not anything was synthesized.
        self.scratch.reflection_accum = 0;
        self.scratch.last_reflection = view.now;
        inserted
    }

    // -- Execute -----------------------------------------------------------

    fn execute(&mut self, view: &CycleView<'_>, notes: &mut Vec<CycleNote>) -> TileCoord {
        if !self.scratch.planned_path.is_empty() {
            return self.scratch.planned_path.remove(0);
        }

        let current = self.scratch.tile;
        let candidates = match self.scratch.action_target.clone() {
            ActionTarget::Stay => return current,
            ActionTarget::Tile { coord } => {
                if view.world.is_collision(coord) {
                    notes.push(CycleNote {
                        event_type: EventType::TargetUnresolved,
                        details: json!({ "tile": coord.to_string() }),
                    });
                    self.scratch.action_target = ActionTarget::Stay;
                    return current;
                }
                vec![coord]
            }
            ActionTarget::Persona { name } => match view.persona_tiles.get(&name) {
                Some(theirs) => {
                    let full = shortest_path(view.world, current, *theirs);
                    if full.is_empty() {
                        notes.push(CycleNote {
                            event_type: EventType::PathUnreachable,
                            details: json!({ "toward": name }),
                        });
                        self.scratch.action_target = ActionTarget::Stay;
                        return current;
                    }
                    vec![full[full.len() / 2]]
                }
                None => {
                    notes.push(CycleNote {
                        event_type: EventType::TargetUnresolved,
                        details: json!({ "persona": name }),
                    });
                    self.scratch.action_target = ActionTarget::Stay;
                    return current;
                }
            },
            ActionTarget::Region { address } => {
                let tiles = view.world.tiles_for_address(&address);
                let open = tiles
                    .iter()
                    .copied()
                    .filter(|coord| !view.world.is_collision(*coord))
                    .collect::<Vec<_>>();
                if open.is_empty() {
                    notes.push(CycleNote {
                        event_type: EventType::TargetUnresolved,
                        details: json!({ "address": address.to_string() }),
                    });
                    self.scratch.action_target = ActionTarget::Stay;
                    return current;
                }
                // Step aside for tiles other agents hold or are heading
                // to, as long as something else remains.
                let unclaimed = open
                    .iter()
                    .copied()
                    .filter(|coord| !view.claimed_tiles.contains(coord))
                    .collect::<Vec<_>>();
                let pool = if unclaimed.is_empty() { open } else { unclaimed };
                sample_route_candidates(&pool, view.seed, view.tick, &self.identity.name)
            }
        };

        let mut best: Option<Vec<TileCoord>> = None;
        for target in candidates {
            let path = shortest_path(view.world, current, target);
            if path.is_empty() {
                continue;
            }
            if best.as_ref().map(|held| path.len() < held.len()).unwrap_or(true) {
                best = Some(path);
            }
        }
        match best {
            Some(path) if path.len() > 1 => {
                self.scratch.planned_path = path[1..].to_vec();
                self.scratch.planned_path.remove(0)
            }
            Some(_) => current,
            None => {
                notes.push(CycleNote {
                    event_type: EventType::PathUnreachable,
                    details: json!({ "from": current.to_string() }),
                });
                self.scratch.action_target = ActionTarget::Stay;
                current
            }
        }
    }

    // -- Persistence -------------------------------------------------------

    pub fn to_snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            identity: self.identity.clone(),
            scratch: self.scratch.clone(),
            spatial: self.spatial.as_knowledge().clone(),
            memory: self.memory.to_snapshot(&self.embeddings),
        }
    }

    pub fn from_snapshot(snapshot: &AgentSnapshot) -> Result<Self, MemoryRestoreError> {
        let (memory, embeddings) = MemoryStore::from_snapshot(&snapshot.memory)?;
        Ok(Self {
            identity: snapshot.identity.clone(),
            scratch: snapshot.scratch.clone(),
            spatial: SpatialTree::from_knowledge(snapshot.spatial.clone()),
            memory,
            embeddings,
        })
    }
}

/// Up to [`ROUTE_CANDIDATES`] tiles sampled from the pool, seeded by run,
/// tick, and persona so the pick replays identically.
fn sample_route_candidates(
    pool: &[TileCoord],
    seed: u64,
    tick: u64,
    name: &str,
) -> Vec<TileCoord> {
    if pool.len() <= ROUTE_CANDIDATES {
        return pool.to_vec();
    }
    let base = mix_seed(seed, tick ^ stable_text_hash(name));
    let mut out = Vec::new();
    let mut taken = BTreeSet::new();
    for stream in 0..32u64 {
        if out.len() >= ROUTE_CANDIDATES {
            break;
        }
        let index = (mix_seed(base, stream) as usize) % pool.len();
        if taken.insert(index) {
            out.push(pool[index]);
        }
    }
    // Hash collisions starved the sample; top up from the front.
    for coord in pool {
        if out.len() >= ROUTE_CANDIDATES {
            break;
        }
        if !out.contains(coord) {
            out.push(*coord);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{RetryPolicy, UnavailableOracle};
    use crate::retrieval::RetrievalConfig;
    use contracts::{Address, TileEvent, WorldSource};
    use std::time::Duration;

    fn test_world() -> WorldModel {
        let mut source = WorldSource::open_grid("hearthvale", 8, 6);
        for y in 0..6 {
            for x in 0..8 {
                source.sectors[y][x] = "t1".to_string();
                source.arenas[y][x] = if x < 4 { "b1" } else { "c1" }.to_string();
            }
        }
        source.sector_legend.insert("t1".to_string(), "old town".to_string());
        source.arena_legend.insert("b1".to_string(), "bakery".to_string());
        source.arena_legend.insert("c1".to_string(), "commons".to_string());
        WorldModel::load(&source).expect("load")
    }

    fn test_identity(name: &str) -> PersonaIdentity {
        PersonaIdentity {
            name: name.to_string(),
            age: 30,
            innate: "steady".to_string(),
            learned: "local".to_string(),
            currently: "working at the bakery".to_string(),
            lifestyle: "early riser".to_string(),
            living_area: Address::arena("hearthvale", "old town", "bakery"),
        }
    }

    fn empty_view<'a>(
        world: &'a WorldModel,
        persona_tiles: &'a BTreeMap<String, TileCoord>,
        claimed: &'a BTreeSet<TileCoord>,
        tick: u64,
    ) -> CycleView<'a> {
        CycleView {
            world,
            tick,
            now: tick * 60,
            day: tick * 60 / SECONDS_PER_DAY,
            minute_of_day: ((tick * 60 % SECONDS_PER_DAY) / 60) as u32,
            persona_tiles,
            claimed_tiles: claimed,
            seed: 1337,
        }
    }

    fn down_client() -> OracleClient {
        OracleClient::new(
            Box::new(UnavailableOracle),
            RetryPolicy {
                max_attempts: 2,
                backoff: Duration::from_millis(1),
            },
        )
    }

    #[test]
    fn perceive_records_nearby_events_once() {
        let mut world = test_world();
        world.add_event(
            TileCoord::new(1, 1),
            TileEvent::new("oven", "is", "smoking", "the oven is smoking"),
        );
        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(0, 0),
        );
        let tiles = BTreeMap::new();
        let claimed = BTreeSet::new();
        let engine = RetrievalEngine::new(RetrievalConfig::default());
        let oracle = OracleClient::scripted(9);

        let first = persona.cycle(&empty_view(&world, &tiles, &claimed, 1), &engine, &oracle);
        assert_eq!(first.perceived_nodes.len(), 1);

        // The same triple within the retention window is not news.
        let second = persona.cycle(&empty_view(&world, &tiles, &claimed, 2), &engine, &oracle);
        assert!(second.perceived_nodes.is_empty());
        assert_eq!(persona.memory.sequence(ConceptKind::Event).len(), 1);
    }

    #[test]
    fn perception_survives_a_dead_oracle_with_floor_poignancy() {
        let mut world = test_world();
        world.add_event(
            TileCoord::new(1, 0),
            TileEvent::new("cart", "is", "burning", "the cart is burning"),
        );
        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(0, 0),
        );
        let tiles = BTreeMap::new();
        let claimed = BTreeSet::new();
        let engine = RetrievalEngine::new(RetrievalConfig::default());

        let outcome = persona.cycle(&empty_view(&world, &tiles, &claimed, 1), &engine, &down_client());
        assert_eq!(outcome.perceived_nodes.len(), 1);
        let node = persona.memory.node(outcome.perceived_nodes[0]).expect("node");
        assert_eq!(node.poignancy, 1);
        assert!(outcome
            .notes
            .iter()
            .any(|note| note.event_type == EventType::OracleDegraded));
    }

    #[test]
    fn spatial_tree_learns_what_the_agent_sees() {
        let world = test_world();
        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(3, 3),
        );
        let tiles = BTreeMap::new();
        let claimed = BTreeSet::new();
        let engine = RetrievalEngine::new(RetrievalConfig::default());
        let oracle = OracleClient::scripted(9);
        persona.cycle(&empty_view(&world, &tiles, &claimed, 1), &engine, &oracle);

        assert!(persona
            .spatial
            .knows(&Address::arena("hearthvale", "old town", "bakery")));
        assert!(persona
            .spatial
            .knows(&Address::arena("hearthvale", "old town", "commons")));
    }

    #[test]
    fn first_tick_adopts_a_schedule_and_a_target() {
        let world = test_world();
        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(0, 0),
        );
        let tiles = BTreeMap::new();
        let claimed = BTreeSet::new();
        let engine = RetrievalEngine::new(RetrievalConfig::default());
        let oracle = OracleClient::scripted(9);
        let outcome = persona.cycle(&empty_view(&world, &tiles, &claimed, 1), &engine, &oracle);

        assert!(persona.scratch.schedule.is_some());
        assert_eq!(persona.scratch.last_planned_day, Some(0));
        assert!(outcome
            .notes
            .iter()
            .any(|note| note.event_type == EventType::ScheduleAdopted));
    }

    #[test]
    fn dead_oracle_keeps_the_agent_idle_but_ticking() {
        let world = test_world();
        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(2, 2),
        );
        let tiles = BTreeMap::new();
        let claimed = BTreeSet::new();
        let engine = RetrievalEngine::new(RetrievalConfig::default());
        let outcome = persona.cycle(&empty_view(&world, &tiles, &claimed, 1), &engine, &down_client());

        assert_eq!(outcome.next_tile, TileCoord::new(2, 2));
        assert!(persona.scratch.schedule.is_none());
        assert_eq!(persona.scratch.action_target, ActionTarget::Stay);
    }

    #[test]
    fn reflection_fires_at_threshold_and_resets() {
        let world = test_world();
        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(0, 0),
        );
        persona.scratch.reflection_threshold = 10;
        // Seed memory with weighty events and prime the accumulator.
        for i in 0..3 {
            persona.memory.insert(NewConcept {
                kind: ConceptKind::Event,
                created: 30,
                expires: None,
                subject: "mill".to_string(),
                predicate: "is".to_string(),
                object: format!("burning {i}"),
                description: format!("the mill is burning {i}"),
                poignancy: 8,
                keywords: BTreeSet::from(["mill".to_string()]),
                embedding_key: format!("the mill is burning {i}"),
                evidence: Vec::new(),
            });
        }
        persona.scratch.reflection_accum = 24;

        let tiles = BTreeMap::new();
        let claimed = BTreeSet::new();
        let engine = RetrievalEngine::new(RetrievalConfig::default());
        let oracle = OracleClient::scripted(9);
        let outcome = persona.cycle(&empty_view(&world, &tiles, &claimed, 1), &engine, &oracle);

        assert!(!outcome.insight_nodes.is_empty());
        assert_eq!(persona.scratch.reflection_accum, 0);
        assert_eq!(persona.scratch.last_reflection, 60);
        let thought = persona
            .memory
            .node(outcome.insight_nodes[0])
            .expect("thought");
        assert_eq!(thought.kind, ConceptKind::Thought);
        assert!(!thought.evidence.is_empty());
    }

    #[test]
    fn reflection_resets_even_when_the_oracle_is_down() {
        let world = test_world();
        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(0, 0),
        );
        persona.scratch.reflection_threshold = 5;
        persona.scratch.reflection_accum = 9;
        persona.memory.insert(NewConcept {
            kind: ConceptKind::Event,
            created: 30,
            expires: None,
            subject: "mill".to_string(),
            predicate: "is".to_string(),
            object: "burning".to_string(),
            description: "the mill is burning".to_string(),
            poignancy: 8,
            keywords: BTreeSet::from(["mill".to_string()]),
            embedding_key: "the mill is burning".to_string(),
            evidence: Vec::new(),
        });

        let tiles = BTreeMap::new();
        let claimed = BTreeSet::new();
        let engine = RetrievalEngine::new(RetrievalConfig::default());
        let outcome = persona.cycle(&empty_view(&world, &tiles, &claimed, 1), &engine, &down_client());

        assert!(outcome.insight_nodes.is_empty());
        assert_eq!(persona.scratch.reflection_accum, 0);
    }

    #[test]
    fn execute_pops_the_cached_path_before_replanning() {
        let world = test_world();
        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(0, 0),
        );
        persona.scratch.planned_path = vec![TileCoord::new(1, 0), TileCoord::new(2, 0)];
        let tiles = BTreeMap::new();
        let claimed = BTreeSet::new();
        let mut notes = Vec::new();
        let view = empty_view(&world, &tiles, &claimed, 1);
        assert_eq!(persona.execute(&view, &mut notes), TileCoord::new(1, 0));
        assert_eq!(persona.scratch.planned_path, vec![TileCoord::new(2, 0)]);
        assert!(notes.is_empty());
    }

    #[test]
    fn approach_target_stops_at_the_midpoint() {
        let world = test_world();
        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(0, 0),
        );
        persona.scratch.action_target = ActionTarget::Persona {
            name: "Bo Carter".to_string(),
        };
        let tiles = BTreeMap::from([("Bo Carter".to_string(), TileCoord::new(6, 0))]);
        let claimed = BTreeSet::new();
        let mut notes = Vec::new();
        let view = empty_view(&world, &tiles, &claimed, 1);
        let next = persona.execute(&view, &mut notes);
        assert_eq!(next, TileCoord::new(1, 0));
        // Path runs to the midpoint (3, 0), not Bo's tile.
        assert_eq!(
            persona.scratch.planned_path.last().copied(),
            Some(TileCoord::new(3, 0))
        );
    }

    #[test]
    fn region_target_avoids_claimed_tiles_when_possible() {
        let mut source = WorldSource::open_grid("hearthvale", 3, 1);
        for x in 0..3 {
            source.sectors[0][x] = "t1".to_string();
            source.arenas[0][x] = "n1".to_string();
        }
        source.sector_legend.insert("t1".to_string(), "old town".to_string());
        source.arena_legend.insert("n1".to_string(), "nook".to_string());
        let world = WorldModel::load(&source).expect("load");

        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(0, 0),
        );
        persona.scratch.action_target = ActionTarget::Region {
            address: Address::arena("hearthvale", "old town", "nook"),
        };
        let tiles = BTreeMap::new();
        // Everything except (1, 0) is claimed by someone else's route.
        let claimed = BTreeSet::from([TileCoord::new(0, 0), TileCoord::new(2, 0)]);
        let mut notes = Vec::new();
        let view = empty_view(&world, &tiles, &claimed, 1);
        let next = persona.execute(&view, &mut notes);
        assert_eq!(next, TileCoord::new(1, 0));
    }

    #[test]
    fn snapshot_round_trip_restores_the_whole_persona() {
        let world = test_world();
        let mut persona = Persona::new(
            test_identity("Ada Reyes"),
            &RunConfig::default(),
            TileCoord::new(0, 0),
        );
        let tiles = BTreeMap::new();
        let claimed = BTreeSet::new();
        let engine = RetrievalEngine::new(RetrievalConfig::default());
        let oracle = OracleClient::scripted(9);
        for tick in 1..=5 {
            persona.cycle(&empty_view(&world, &tiles, &claimed, tick), &engine, &oracle);
        }

        let snapshot = persona.to_snapshot();
        let json = serde_json::to_string(&snapshot).expect("serialize");
        let decoded: AgentSnapshot = serde_json::from_str(&json).expect("deserialize");
        let restored = Persona::from_snapshot(&decoded).expect("restore");
        assert_eq!(restored, persona);
    }
}
