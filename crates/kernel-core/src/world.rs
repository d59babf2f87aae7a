//! Shared world model: a tile grid carrying hierarchical address labels,
//! collision flags, and per-tile event sets, plus a reverse index from
//! every address prefix to the tiles it covers.
//!
//! The grid and the index are built once at load and never change; the
//! only mutable state is each tile's event set.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use contracts::{Address, AddressLevel, PlacedEvent, TileCoord, TileEvent, WorldSource};

// ---------------------------------------------------------------------------
// Tile
// ---------------------------------------------------------------------------

/// One cell of the world grid. Labels are resolved from the source legends
/// at load; an empty label means the layer has nothing here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tile {
    pub sector: String,
    pub arena: String,
    pub object: String,
    pub spawn: String,
    pub collision: bool,
    events: BTreeMap<String, TileEvent>,
}

impl Tile {
    pub fn events(&self) -> impl Iterator<Item = &TileEvent> {
        self.events.values()
    }

    pub fn has_event(&self, event: &TileEvent) -> bool {
        self.events.contains_key(&event.canonical_key())
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

// ---------------------------------------------------------------------------
// Load errors
// ---------------------------------------------------------------------------

/// Fatal problems in a world source. There is no safe synthetic default
/// for a missing or malformed world, so loading aborts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldLoadError {
    EmptyGrid,
    LayerHeight {
        layer: &'static str,
        expected: usize,
        found: usize,
    },
    LayerWidth {
        layer: &'static str,
        row: usize,
        expected: usize,
        found: usize,
    },
    UnknownCode {
        layer: &'static str,
        code: String,
        x: u32,
        y: u32,
    },
    /// A deeper layer is labeled where a shallower one is not, which would
    /// produce an address that skips a level.
    OrphanLabel {
        layer: &'static str,
        x: u32,
        y: u32,
    },
    /// A spawn label the scenario requires is absent from the asset.
    MissingSpawn { label: String },
}

impl fmt::Display for WorldLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGrid => write!(f, "world grid has zero width or height"),
            Self::LayerHeight {
                layer,
                expected,
                found,
            } => write!(f, "{layer} layer has {found} rows, expected {expected}"),
            Self::LayerWidth {
                layer,
                row,
                expected,
                found,
            } => write!(
                f,
                "{layer} layer row {row} has {found} cells, expected {expected}"
            ),
            Self::UnknownCode { layer, code, x, y } => write!(
                f,
                "{layer} layer has unknown code {code:?} at ({x}, {y})"
            ),
            Self::OrphanLabel { layer, x, y } => write!(
                f,
                "{layer} label at ({x}, {y}) has no enclosing label one level up"
            ),
            Self::MissingSpawn { label } => {
                write!(f, "world asset has no spawn point labeled {label:?}")
            }
        }
    }
}

impl std::error::Error for WorldLoadError {}

// ---------------------------------------------------------------------------
// WorldModel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WorldModel {
    world_name: String,
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
    /// Address-prefix string → tiles covered by that prefix.
    address_index: BTreeMap<String, BTreeSet<TileCoord>>,
    /// Spawn label → tile.
    spawn_index: BTreeMap<String, TileCoord>,
}

impl WorldModel {
    /// Build the grid and reverse index from a layered source. O(w×h).
    pub fn load(source: &WorldSource) -> Result<Self, WorldLoadError> {
        let width = source.meta.width as usize;
        let height = source.meta.height as usize;
        if width == 0 || height == 0 {
            return Err(WorldLoadError::EmptyGrid);
        }

        let layers: [(&'static str, &Vec<Vec<String>>); 5] = [
            ("collision", &source.collision),
            ("sector", &source.sectors),
            ("arena", &source.arenas),
            ("object", &source.objects),
            ("spawn", &source.spawns),
        ];
        for (name, layer) in layers {
            if layer.len() != height {
                return Err(WorldLoadError::LayerHeight {
                    layer: name,
                    expected: height,
                    found: layer.len(),
                });
            }
            for (row, cells) in layer.iter().enumerate() {
                if cells.len() != width {
                    return Err(WorldLoadError::LayerWidth {
                        layer: name,
                        row,
                        expected: width,
                        found: cells.len(),
                    });
                }
            }
        }

        let mut model = Self {
            world_name: source.meta.world_name.clone(),
            width: source.meta.width,
            height: source.meta.height,
            tiles: vec![Tile::default(); width * height],
            address_index: BTreeMap::new(),
            spawn_index: BTreeMap::new(),
        };

        for y in 0..source.meta.height {
            for x in 0..source.meta.width {
                let coord = TileCoord::new(x, y);
                let collision = cell(&source.collision, x, y) == source.meta.collision_code;
                let sector = resolve(&source.sector_legend, "sector", &source.sectors, x, y)?;
                let arena = resolve(&source.arena_legend, "arena", &source.arenas, x, y)?;
                let object = resolve(&source.object_legend, "object", &source.objects, x, y)?;
                let spawn = resolve(&source.spawn_legend, "spawn", &source.spawns, x, y)?;
                if !arena.is_empty() && sector.is_empty() {
                    return Err(WorldLoadError::OrphanLabel {
                        layer: "arena",
                        x,
                        y,
                    });
                }
                if !object.is_empty() && arena.is_empty() {
                    return Err(WorldLoadError::OrphanLabel {
                        layer: "object",
                        x,
                        y,
                    });
                }

                if let Some(spawn_label) = non_empty(&spawn) {
                    model.spawn_index.insert(spawn_label.to_string(), coord);
                }
                for prefix in address_prefixes(&model.world_name, &sector, &arena, &object) {
                    model
                        .address_index
                        .entry(prefix.to_string())
                        .or_default()
                        .insert(coord);
                }

                let tile = &mut model.tiles[y as usize * width + x as usize];
                tile.sector = sector;
                tile.arena = arena;
                tile.object = object;
                tile.spawn = spawn;
                tile.collision = collision;
            }
        }

        Ok(model)
    }

    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    pub fn tile_at(&self, coord: TileCoord) -> Option<&Tile> {
        if !self.contains(coord) {
            return None;
        }
        self.tiles
            .get(coord.y as usize * self.width as usize + coord.x as usize)
    }

    fn tile_at_mut(&mut self, coord: TileCoord) -> Option<&mut Tile> {
        if !self.contains(coord) {
            return None;
        }
        self.tiles
            .get_mut(coord.y as usize * self.width as usize + coord.x as usize)
    }

    /// Out-of-bounds counts as collision.
    pub fn is_collision(&self, coord: TileCoord) -> bool {
        self.tile_at(coord).map(|tile| tile.collision).unwrap_or(true)
    }

    /// The square neighborhood of `center` clipped to world bounds,
    /// row-major order, including `center` itself.
    pub fn nearby_tiles(&self, center: TileCoord, radius: i64) -> Vec<TileCoord> {
        let radius = radius.max(0);
        let x_min = (i64::from(center.x) - radius).max(0) as u32;
        let y_min = (i64::from(center.y) - radius).max(0) as u32;
        let x_max = ((i64::from(center.x) + radius) as u64).min(u64::from(self.width) - 1) as u32;
        let y_max = ((i64::from(center.y) + radius) as u64).min(u64::from(self.height) - 1) as u32;
        let mut out = Vec::new();
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                out.push(TileCoord::new(x, y));
            }
        }
        out
    }

    /// The address of a tile truncated to `level`, or `None` when the tile
    /// has no label at that depth.
    pub fn address_of(&self, coord: TileCoord, level: AddressLevel) -> Option<Address> {
        let tile = self.tile_at(coord)?;
        match level {
            AddressLevel::World => Some(Address::world(&self.world_name)),
            AddressLevel::Sector => non_empty(&tile.sector)
                .map(|sector| Address::sector(&self.world_name, sector)),
            AddressLevel::Arena => match (non_empty(&tile.sector), non_empty(&tile.arena)) {
                (Some(sector), Some(arena)) => {
                    Some(Address::arena(&self.world_name, sector, arena))
                }
                _ => None,
            },
            AddressLevel::Object => match (
                non_empty(&tile.sector),
                non_empty(&tile.arena),
                non_empty(&tile.object),
            ) {
                (Some(sector), Some(arena), Some(object)) => {
                    Some(Address::object(&self.world_name, sector, arena, object))
                }
                _ => None,
            },
        }
    }

    /// The deepest address this tile carries.
    pub fn deepest_address_of(&self, coord: TileCoord) -> Option<Address> {
        self.address_of(coord, AddressLevel::Object)
            .or_else(|| self.address_of(coord, AddressLevel::Arena))
            .or_else(|| self.address_of(coord, AddressLevel::Sector))
            .or_else(|| self.address_of(coord, AddressLevel::World))
    }

    /// Tiles covered by an address prefix. Empty when the address names
    /// nothing in this world.
    pub fn tiles_for_address(&self, address: &Address) -> BTreeSet<TileCoord> {
        self.address_index
            .get(&address.to_string())
            .cloned()
            .unwrap_or_default()
    }

    pub fn knows_address(&self, address: &Address) -> bool {
        self.address_index.contains_key(&address.to_string())
    }

    pub fn spawn_tile(&self, label: &str) -> Option<TileCoord> {
        self.spawn_index.get(label).copied()
    }

    /// Insert an event into a tile's set. Idempotent; returns whether the
    /// set changed. Out-of-bounds coordinates are ignored.
    pub fn add_event(&mut self, coord: TileCoord, event: TileEvent) -> bool {
        match self.tile_at_mut(coord) {
            Some(tile) => tile.events.insert(event.canonical_key(), event).is_none(),
            None => false,
        }
    }

    /// Remove an event by canonical identity. Idempotent.
    pub fn remove_event(&mut self, coord: TileCoord, event: &TileEvent) -> bool {
        match self.tile_at_mut(coord) {
            Some(tile) => tile.events.remove(&event.canonical_key()).is_some(),
            None => false,
        }
    }

    /// Remove every event a subject has on a tile, regardless of form.
    pub fn remove_subject_events(&mut self, coord: TileCoord, subject: &str) {
        if let Some(tile) = self.tile_at_mut(coord) {
            tile.events.retain(|_, event| event.subject != subject);
        }
    }

    /// Every tile event in the world, pinned to its coordinate, in
    /// deterministic row-major then key order. Snapshot support.
    pub fn placed_events(&self) -> Vec<PlacedEvent> {
        let mut out = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let coord = TileCoord::new(x, y);
                if let Some(tile) = self.tile_at(coord) {
                    for event in tile.events() {
                        out.push(PlacedEvent {
                            coord,
                            event: event.clone(),
                        });
                    }
                }
            }
        }
        out
    }

    /// Drop all tile events and install the given set. Restore support.
    pub fn restore_events(&mut self, placed: &[PlacedEvent]) {
        for tile in &mut self.tiles {
            tile.events.clear();
        }
        for entry in placed {
            self.add_event(entry.coord, entry.event.clone());
        }
    }
}

fn cell<'a>(layer: &'a [Vec<String>], x: u32, y: u32) -> &'a str {
    layer[y as usize][x as usize].trim()
}

fn non_empty(label: &str) -> Option<&str> {
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

/// Look a layer cell up in its legend. Blank and `"0"` cells mean "no
/// label"; any other code must be in the legend.
fn resolve(
    legend: &BTreeMap<String, String>,
    layer_name: &'static str,
    layer: &[Vec<String>],
    x: u32,
    y: u32,
) -> Result<String, WorldLoadError> {
    let code = cell(layer, x, y);
    if code.is_empty() || code == "0" {
        return Ok(String::new());
    }
    legend
        .get(code)
        .cloned()
        .ok_or(WorldLoadError::UnknownCode {
            layer: layer_name,
            code: code.to_string(),
            x,
            y,
        })
}

fn address_prefixes(world: &str, sector: &str, arena: &str, object: &str) -> Vec<Address> {
    let mut out = vec![Address::world(world)];
    if let Some(sector) = non_empty(sector) {
        out.push(Address::sector(world, sector));
        if let Some(arena) = non_empty(arena) {
            out.push(Address::arena(world, sector, arena));
            if let Some(object) = non_empty(object) {
                out.push(Address::object(world, sector, arena, object));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::WorldSource;

    /// A 4×3 world: sector "market row" on the left half, arena "cafe"
    /// with a stove object inside it, one wall, one spawn point.
    fn small_source() -> WorldSource {
        let mut source = WorldSource::open_grid("riverbend", 4, 3);
        for y in 0..3 {
            for x in 0..2 {
                source.sectors[y][x] = "s1".to_string();
            }
        }
        source.arenas[0][0] = "a1".to_string();
        source.arenas[0][1] = "a1".to_string();
        source.objects[0][1] = "o1".to_string();
        source.spawns[2][0] = "p1".to_string();
        source.set_collision(3, 1);
        source.sector_legend.insert("s1".to_string(), "market row".to_string());
        source.arena_legend.insert("a1".to_string(), "cafe".to_string());
        source.object_legend.insert("o1".to_string(), "stove".to_string());
        source.spawn_legend.insert("p1".to_string(), "ada-home".to_string());
        source
    }

    #[test]
    fn load_builds_labels_and_collision() {
        let world = WorldModel::load(&small_source()).expect("load");
        let tile = world.tile_at(TileCoord::new(1, 0)).expect("tile");
        assert_eq!(tile.sector, "market row");
        assert_eq!(tile.arena, "cafe");
        assert_eq!(tile.object, "stove");
        assert!(world.is_collision(TileCoord::new(3, 1)));
        assert!(!world.is_collision(TileCoord::new(0, 0)));
    }

    #[test]
    fn out_of_bounds_is_collision_and_no_tile() {
        let world = WorldModel::load(&small_source()).expect("load");
        assert!(world.tile_at(TileCoord::new(9, 9)).is_none());
        assert!(world.is_collision(TileCoord::new(4, 0)));
    }

    #[test]
    fn nearby_tiles_clip_to_bounds() {
        let world = WorldModel::load(&small_source()).expect("load");
        let near = world.nearby_tiles(TileCoord::new(0, 0), 1);
        assert_eq!(near, vec![
            TileCoord::new(0, 0),
            TileCoord::new(1, 0),
            TileCoord::new(0, 1),
            TileCoord::new(1, 1),
        ]);
    }

    #[test]
    fn address_index_covers_every_prefix() {
        let world = WorldModel::load(&small_source()).expect("load");
        let sector: Address = "riverbend:market row".parse().expect("address");
        assert_eq!(world.tiles_for_address(&sector).len(), 6);
        let object: Address = "riverbend:market row:cafe:stove".parse().expect("address");
        assert_eq!(
            world.tiles_for_address(&object),
            BTreeSet::from([TileCoord::new(1, 0)])
        );
        let unknown: Address = "riverbend:harbor".parse().expect("address");
        assert!(world.tiles_for_address(&unknown).is_empty());
    }

    #[test]
    fn spawn_lookup() {
        let world = WorldModel::load(&small_source()).expect("load");
        assert_eq!(world.spawn_tile("ada-home"), Some(TileCoord::new(0, 2)));
        assert_eq!(world.spawn_tile("nowhere"), None);
    }

    #[test]
    fn event_set_is_idempotent_by_canonical_key() {
        let mut world = WorldModel::load(&small_source()).expect("load");
        let coord = TileCoord::new(0, 0);
        let event = TileEvent::new("Ada Reyes", "is", "cooking", "Ada Reyes is cooking");
        assert!(world.add_event(coord, event.clone()));
        assert!(!world.add_event(coord, event.clone()));
        assert_eq!(world.tile_at(coord).expect("tile").event_count(), 1);
        assert!(world.remove_event(coord, &event));
        assert!(!world.remove_event(coord, &event));
    }

    #[test]
    fn remove_subject_events_clears_all_forms() {
        let mut world = WorldModel::load(&small_source()).expect("load");
        let coord = TileCoord::new(0, 0);
        world.add_event(coord, TileEvent::idle("Ada Reyes"));
        world.add_event(
            coord,
            TileEvent::new("Ada Reyes", "is", "cooking", "Ada Reyes is cooking"),
        );
        world.remove_subject_events(coord, "Ada Reyes");
        assert_eq!(world.tile_at(coord).expect("tile").event_count(), 0);
    }

    #[test]
    fn load_rejects_ragged_layers() {
        let mut source = small_source();
        source.arenas[1].pop();
        let err = WorldModel::load(&source).unwrap_err();
        assert!(matches!(err, WorldLoadError::LayerWidth { layer: "arena", .. }));
    }

    #[test]
    fn load_rejects_unknown_codes() {
        let mut source = small_source();
        source.sectors[2][3] = "s9".to_string();
        let err = WorldModel::load(&source).unwrap_err();
        assert!(matches!(err, WorldLoadError::UnknownCode { layer: "sector", .. }));
    }

    #[test]
    fn load_rejects_orphan_labels() {
        let mut source = small_source();
        // Arena label on a tile with no sector.
        source.arenas[2][3] = "a1".to_string();
        let err = WorldModel::load(&source).unwrap_err();
        assert!(matches!(err, WorldLoadError::OrphanLabel { layer: "arena", .. }));
    }

    #[test]
    fn placed_events_round_trip() {
        let mut world = WorldModel::load(&small_source()).expect("load");
        world.add_event(
            TileCoord::new(1, 0),
            TileEvent::new("stove", "is", "heating soup", "the stove is heating soup"),
        );
        world.add_event(TileCoord::new(0, 2), TileEvent::idle("Bo Carter"));
        let placed = world.placed_events();
        assert_eq!(placed.len(), 2);

        let mut fresh = WorldModel::load(&small_source()).expect("load");
        fresh.restore_events(&placed);
        assert_eq!(fresh.placed_events(), placed);
    }
}
