//! Perception stage: what an agent notices in one tick.
//!
//! Three steps, each a pure function over borrowed state: register every
//! address seen within the vision radius into the agent's spatial tree,
//! gather the nearest same-arena tile events up to the attention
//! bandwidth, and drop events whose triple the agent already recorded
//! within its retention window.

use contracts::{AddressLevel, TileCoord, TileEvent};

use crate::memory::MemoryStore;
use crate::spatial::SpatialTree;
use crate::world::WorldModel;

/// A tile event as seen from the agent's position.
#[derive(Debug, Clone, PartialEq)]
pub struct PerceivedEvent {
    pub coord: TileCoord,
    pub event: TileEvent,
    pub distance_sq: u64,
}

/// Register the deepest address of every tile within the vision radius.
/// Idempotent; prefixes come along for free.
pub fn register_surroundings(
    tree: &mut SpatialTree,
    world: &WorldModel,
    center: TileCoord,
    radius: i64,
) {
    for coord in world.nearby_tiles(center, radius) {
        if let Some(address) = world.deepest_address_of(coord) {
            tree.register(&address);
        }
    }
}

/// Collect events on tiles sharing the observer's arena, nearest first,
/// capped at the attention bandwidth. Ordering is fully deterministic:
/// distance, then coordinate, then canonical key.
pub fn gather_events(
    world: &WorldModel,
    center: TileCoord,
    radius: i64,
    attention_bandwidth: usize,
) -> Vec<PerceivedEvent> {
    let observer_arena = world.address_of(center, AddressLevel::Arena);
    let mut seen = Vec::new();
    for coord in world.nearby_tiles(center, radius) {
        if world.address_of(coord, AddressLevel::Arena) != observer_arena {
            continue;
        }
        if let Some(tile) = world.tile_at(coord) {
            for event in tile.events() {
                seen.push(PerceivedEvent {
                    coord,
                    event: event.clone(),
                    distance_sq: center.distance_sq(&coord),
                });
            }
        }
    }
    seen.sort_by(|a, b| {
        a.distance_sq
            .cmp(&b.distance_sq)
            .then(a.coord.cmp(&b.coord))
            .then(a.event.canonical_key().cmp(&b.event.canonical_key()))
    });
    seen.truncate(attention_bandwidth);
    seen
}

/// Drop events whose (subject, predicate, object) triple is already in the
/// agent's recent memory window — or earlier in this same batch, so one
/// tick never records a triple twice.
pub fn dedupe_against_memory(
    store: &MemoryStore,
    retention: usize,
    events: Vec<PerceivedEvent>,
) -> Vec<PerceivedEvent> {
    let mut known = store.latest_triples(retention);
    events
        .into_iter()
        .filter(|perceived| known.insert(perceived.event.triple_key()))
        .collect()
}
