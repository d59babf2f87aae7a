//! World-load contract: the layered code grids and legends an external
//! loader hands to `WorldModel::load`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Global facts about a world asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldMeta {
    pub world_name: String,
    pub width: u32,
    pub height: u32,
    /// Pixel size of one tile in the source asset; carried for callers that
    /// need to map pixel positions, unused by the kernel itself.
    pub tile_size: u32,
    /// The code in the collision layer that marks a blocked tile.
    pub collision_code: String,
}

/// A rectangular grid of per-layer codes plus the lookup tables mapping
/// codes to labels. Rows are top-to-bottom, cells left-to-right; every
/// layer must be exactly `height` rows of `width` cells. An empty cell
/// (or `"0"`) means "nothing here" on every layer but collision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldSource {
    pub meta: WorldMeta,
    pub collision: Vec<Vec<String>>,
    pub sectors: Vec<Vec<String>>,
    pub arenas: Vec<Vec<String>>,
    pub objects: Vec<Vec<String>>,
    pub spawns: Vec<Vec<String>>,
    pub sector_legend: BTreeMap<String, String>,
    pub arena_legend: BTreeMap<String, String>,
    pub object_legend: BTreeMap<String, String>,
    pub spawn_legend: BTreeMap<String, String>,
}

impl WorldSource {
    /// An all-open grid with no labels, useful as a scaffold for callers
    /// that fill in layers programmatically.
    pub fn open_grid(world_name: impl Into<String>, width: u32, height: u32) -> Self {
        let blank_row = vec![String::new(); width as usize];
        let blank = vec![blank_row; height as usize];
        Self {
            meta: WorldMeta {
                world_name: world_name.into(),
                width,
                height,
                tile_size: 32,
                collision_code: "1".to_string(),
            },
            collision: blank.clone(),
            sectors: blank.clone(),
            arenas: blank.clone(),
            objects: blank.clone(),
            spawns: blank,
            sector_legend: BTreeMap::new(),
            arena_legend: BTreeMap::new(),
            object_legend: BTreeMap::new(),
            spawn_legend: BTreeMap::new(),
        }
    }

    pub fn set_collision(&mut self, x: u32, y: u32) {
        let code = self.meta.collision_code.clone();
        if let Some(cell) = self
            .collision
            .get_mut(y as usize)
            .and_then(|row| row.get_mut(x as usize))
        {
            *cell = code;
        }
    }
}
