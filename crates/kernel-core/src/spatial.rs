//! An agent's private spatial knowledge: the worlds, sectors, arenas, and
//! objects it has personally seen, kept as a nested tree.
//!
//! Registration is idempotent and never forgets; the tree is the option
//! set planning draws target addresses from.

use contracts::{Address, SpatialKnowledge};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpatialTree {
    tree: SpatialKnowledge,
}

impl SpatialTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an address and every prefix above it.
    pub fn register(&mut self, address: &Address) {
        let world = self.tree.entry(address.world_name().to_string()).or_default();
        let Some(sector) = address.sector_name() else {
            return;
        };
        let sector = world.entry(sector.to_string()).or_default();
        let Some(arena) = address.arena_name() else {
            return;
        };
        let arena = sector.entry(arena.to_string()).or_default();
        if let Some(object) = address.object_name() {
            arena.insert(object.to_string());
        }
    }

    pub fn knows(&self, address: &Address) -> bool {
        let Some(world) = self.tree.get(address.world_name()) else {
            return false;
        };
        let Some(sector_name) = address.sector_name() else {
            return true;
        };
        let Some(sector) = world.get(sector_name) else {
            return false;
        };
        let Some(arena_name) = address.arena_name() else {
            return true;
        };
        let Some(arena) = sector.get(arena_name) else {
            return false;
        };
        match address.object_name() {
            Some(object) => arena.contains(object),
            None => true,
        }
    }

    pub fn sectors(&self, world: &str) -> Vec<String> {
        self.tree
            .get(world)
            .map(|sectors| sectors.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn arenas(&self, world: &str, sector: &str) -> Vec<String> {
        self.tree
            .get(world)
            .and_then(|sectors| sectors.get(sector))
            .map(|arenas| arenas.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn objects(&self, world: &str, sector: &str, arena: &str) -> Vec<String> {
        self.tree
            .get(world)
            .and_then(|sectors| sectors.get(sector))
            .and_then(|arenas| arenas.get(arena))
            .map(|objects| objects.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every arena-level address known in a world, in deterministic
    /// order: the candidate list planning offers the oracle.
    pub fn known_arenas(&self, world: &str) -> Vec<Address> {
        let mut out = Vec::new();
        if let Some(sectors) = self.tree.get(world) {
            for (sector, arenas) in sectors {
                for arena in arenas.keys() {
                    out.push(Address::arena(world, sector, arena));
                }
            }
        }
        out
    }

    pub fn as_knowledge(&self) -> &SpatialKnowledge {
        &self.tree
    }

    pub fn from_knowledge(tree: SpatialKnowledge) -> Self {
        Self { tree }
    }
}
