//! Shortest-path search over the collision grid: a breadth-first wavefront
//! with a fixed backtrack order so equal-length paths always resolve the
//! same way.

use std::collections::VecDeque;

use contracts::TileCoord;

use crate::world::WorldModel;

/// Neighbor order tried during expansion and backtracking: up, left,
/// down, right. This fixed order is what makes path choice deterministic
/// among equal-length alternatives.
const DIRECTIONS: [(i64, i64); 4] = [(0, -1), (-1, 0), (0, 1), (1, 0)];

const UNREACHED: u32 = u32::MAX;

/// Shortest 4-connected path from `start` to `end`, inclusive of both
/// endpoints. Returns an empty path when either endpoint is blocked or
/// out of bounds, or when no route exists. Never hangs: the wavefront
/// visits each cell at most once, bounding the loop at width × height
/// iterations.
pub fn shortest_path(world: &WorldModel, start: TileCoord, end: TileCoord) -> Vec<TileCoord> {
    if world.is_collision(start) || world.is_collision(end) {
        return Vec::new();
    }
    if start == end {
        return vec![start];
    }

    let width = world.width() as usize;
    let height = world.height() as usize;
    let index = |coord: TileCoord| coord.y as usize * width + coord.x as usize;

    let mut distance = vec![UNREACHED; width * height];
    distance[index(start)] = 0;

    let mut frontier = VecDeque::new();
    frontier.push_back(start);
    let iteration_bound = width * height;
    let mut expanded = 0usize;

    while let Some(current) = frontier.pop_front() {
        if current == end {
            break;
        }
        expanded += 1;
        if expanded > iteration_bound {
            // Unreachable under the BFS invariant; kept as a hard stop.
            return Vec::new();
        }
        let next_distance = distance[index(current)] + 1;
        for neighbor in neighbors(world, current) {
            let slot = &mut distance[index(neighbor)];
            if *slot == UNREACHED {
                *slot = next_distance;
                frontier.push_back(neighbor);
            }
        }
    }

    if distance[index(end)] == UNREACHED {
        return Vec::new();
    }

    // Walk back from the end, always taking the first neighbor (in fixed
    // direction order) that is exactly one step closer to the start.
    let mut path = vec![end];
    let mut current = end;
    while current != start {
        let want = distance[index(current)] - 1;
        let mut stepped = false;
        for neighbor in neighbors(world, current) {
            if distance[index(neighbor)] == want {
                path.push(neighbor);
                current = neighbor;
                stepped = true;
                break;
            }
        }
        if !stepped {
            // Disconnected distance field; cannot happen after a completed
            // wavefront, treated as unreachable.
            return Vec::new();
        }
    }
    path.reverse();
    path
}

fn neighbors(world: &WorldModel, coord: TileCoord) -> impl Iterator<Item = TileCoord> + '_ {
    DIRECTIONS.iter().filter_map(move |(dx, dy)| {
        let x = i64::from(coord.x) + dx;
        let y = i64::from(coord.y) + dy;
        if x < 0 || y < 0 {
            return None;
        }
        let next = TileCoord::new(x as u32, y as u32);
        if world.is_collision(next) {
            None
        } else {
            Some(next)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::WorldSource;
    use crate::world::WorldModel;

    fn open_world(width: u32, height: u32, walls: &[(u32, u32)]) -> WorldModel {
        let mut source = WorldSource::open_grid("riverbend", width, height);
        for (x, y) in walls {
            source.set_collision(*x, *y);
        }
        WorldModel::load(&source).expect("load")
    }

    #[test]
    fn straight_line_on_open_grid() {
        let world = open_world(5, 1, &[]);
        let path = shortest_path(&world, TileCoord::new(0, 0), TileCoord::new(4, 0));
        assert_eq!(path.len(), 5);
        assert_eq!(path[0], TileCoord::new(0, 0));
        assert_eq!(path[4], TileCoord::new(4, 0));
    }

    #[test]
    fn start_equals_end() {
        let world = open_world(3, 3, &[]);
        let path = shortest_path(&world, TileCoord::new(1, 1), TileCoord::new(1, 1));
        assert_eq!(path, vec![TileCoord::new(1, 1)]);
    }

    #[test]
    fn detours_around_center_wall() {
        // 5×5 open grid, one wall at (2,2): the diagonal corner trip still
        // costs 8 moves, 9 tiles inclusive, and never touches the wall.
        let world = open_world(5, 5, &[(2, 2)]);
        let path = shortest_path(&world, TileCoord::new(0, 0), TileCoord::new(4, 4));
        assert_eq!(path.len(), 9);
        assert!(!path.contains(&TileCoord::new(2, 2)));
        for pair in path.windows(2) {
            assert_eq!(pair[0].manhattan(&pair[1]), 1);
        }
    }

    #[test]
    fn every_step_is_in_bounds_and_walkable() {
        let world = open_world(6, 4, &[(1, 1), (2, 1), (3, 1), (4, 1)]);
        let path = shortest_path(&world, TileCoord::new(0, 0), TileCoord::new(5, 3));
        assert!(!path.is_empty());
        for coord in &path {
            assert!(!world.is_collision(*coord));
        }
    }

    #[test]
    fn unreachable_returns_empty() {
        // A full vertical wall splits the grid.
        let world = open_world(5, 3, &[(2, 0), (2, 1), (2, 2)]);
        let path = shortest_path(&world, TileCoord::new(0, 1), TileCoord::new(4, 1));
        assert!(path.is_empty());
    }

    #[test]
    fn blocked_endpoints_return_empty() {
        let world = open_world(3, 3, &[(0, 0)]);
        assert!(shortest_path(&world, TileCoord::new(0, 0), TileCoord::new(2, 2)).is_empty());
        assert!(shortest_path(&world, TileCoord::new(2, 2), TileCoord::new(0, 0)).is_empty());
        assert!(
            shortest_path(&world, TileCoord::new(1, 1), TileCoord::new(8, 8)).is_empty()
        );
    }

    #[test]
    fn equal_length_routes_resolve_identically() {
        let world = open_world(4, 4, &[]);
        let first = shortest_path(&world, TileCoord::new(0, 0), TileCoord::new(3, 3));
        let second = shortest_path(&world, TileCoord::new(0, 0), TileCoord::new(3, 3));
        assert_eq!(first, second);
        assert_eq!(first.len(), 7);
    }
}
