use contracts::{Address, PersonaIdentity, RunConfig, WorldSource};

use super::Simulation;
use crate::agent::Persona;
use crate::oracle::OracleClient;
use crate::world::{WorldLoadError, WorldModel};

/// The built-in demo town: a 12×8 grid split into an old town and a
/// river quarter, four arenas with one notable object each, a short wall,
/// and a spawn point per persona. Small enough to read in a test failure,
/// rich enough to exercise every address depth.
pub fn demo_world_source() -> WorldSource {
    let mut source = WorldSource::open_grid("hearthvale", 12, 8);

    for y in 0..8usize {
        for x in 0..12usize {
            source.sectors[y][x] = if x < 6 { "s1" } else { "s2" }.to_string();
        }
    }
    for y in 0..3usize {
        for x in 0..3usize {
            source.arenas[y][x] = "a1".to_string(); // bakery
        }
        for x in 3..6usize {
            source.arenas[y][x] = "a2".to_string(); // commons
        }
        for x in 6..9usize {
            source.arenas[y][x] = "a3".to_string(); // boathouse
        }
        for x in 9..12usize {
            source.arenas[y][x] = "a4".to_string(); // market
        }
    }
    source.objects[1][1] = "o1".to_string(); // oven
    source.objects[1][7] = "o2".to_string(); // skiff
    source.objects[1][10] = "o3".to_string(); // stall

    // A garden wall across part of the lower streets.
    for y in 4..7u32 {
        source.set_collision(5, y);
    }

    source.spawns[2][1] = "p1".to_string();
    source.spawns[2][7] = "p2".to_string();
    source.spawns[2][10] = "p3".to_string();

    source.sector_legend.insert("s1".to_string(), "old town".to_string());
    source.sector_legend.insert("s2".to_string(), "river quarter".to_string());
    source.arena_legend.insert("a1".to_string(), "bakery".to_string());
    source.arena_legend.insert("a2".to_string(), "commons".to_string());
    source.arena_legend.insert("a3".to_string(), "boathouse".to_string());
    source.arena_legend.insert("a4".to_string(), "market".to_string());
    source.object_legend.insert("o1".to_string(), "oven".to_string());
    source.object_legend.insert("o2".to_string(), "skiff".to_string());
    source.object_legend.insert("o3".to_string(), "stall".to_string());
    source.spawn_legend.insert("p1".to_string(), "ada-home".to_string());
    source.spawn_legend.insert("p2".to_string(), "bo-home".to_string());
    source.spawn_legend.insert("p3".to_string(), "nadia-home".to_string());

    source
}

fn demo_identities() -> Vec<(PersonaIdentity, &'static str)> {
    vec![
        (
            PersonaIdentity {
                name: "Ada Reyes".to_string(),
                age: 34,
                innate: "steady, warm, exacting".to_string(),
                learned: "apprenticed under the old miller before taking over the bakery"
                    .to_string(),
                currently: "keeping the bakery running through the busy season".to_string(),
                lifestyle: "up before dawn, asleep early".to_string(),
                living_area: Address::arena("hearthvale", "old town", "bakery"),
            },
            "ada-home",
        ),
        (
            PersonaIdentity {
                name: "Bo Carter".to_string(),
                age: 41,
                innate: "quiet, patient, stubborn".to_string(),
                learned: "boatwright by trade, taught by his mother".to_string(),
                currently: "rebuilding the skiff at the boathouse".to_string(),
                lifestyle: "works with the tide, naps at noon".to_string(),
                living_area: Address::arena("hearthvale", "river quarter", "boathouse"),
            },
            "bo-home",
        ),
        (
            PersonaIdentity {
                name: "Nadia Flores".to_string(),
                age: 27,
                innate: "quick, curious, talkative".to_string(),
                learned: "ran a stall in three towns before settling here".to_string(),
                currently: "trading at the market stall".to_string(),
                lifestyle: "late riser, last to leave the market".to_string(),
                living_area: Address::arena("hearthvale", "river quarter", "market"),
            },
            "nadia-home",
        ),
    ]
}

impl Simulation {
    /// The deterministic built-in scenario: demo town, three personas at
    /// their spawn points. Fatal if the built-in world fails validation,
    /// which would be a programming error worth hearing about loudly.
    pub fn bootstrap(config: RunConfig, oracle: OracleClient) -> Result<Self, WorldLoadError> {
        let source = demo_world_source();
        let world = WorldModel::load(&source)?;
        let mut personas = Vec::new();
        for (identity, spawn_label) in demo_identities() {
            // Spawn labels are part of the built-in asset; a missing one
            // is the same class of fatal error as a bad layer.
            let start =
                world
                    .spawn_tile(spawn_label)
                    .ok_or_else(|| WorldLoadError::MissingSpawn {
                        label: spawn_label.to_string(),
                    })?;
            personas.push(Persona::new(identity, &config, start));
        }
        Ok(Self::new(config, world, oracle, personas))
    }
}
