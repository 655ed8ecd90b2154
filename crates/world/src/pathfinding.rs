//! Walkability grid over the whole planet and a deterministic A* search.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::chunk::Chunk;
use crate::position::{global_tile, TileCoord, CHUNK_TILE_SIZE};

/// A 2D grid position used by the deterministic pathfinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Frontier entry. Pops in ascending `(estimate, cost, pos)` order so equal
/// candidates always resolve the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frontier {
    estimate: i32,
    cost: i32,
    pos: GridPos,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.estimate, other.cost, other.pos).cmp(&(self.estimate, self.cost, self.pos))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Best known way to reach a tile.
#[derive(Debug, Clone, Copy)]
struct Reached {
    cost: i32,
    from: Option<GridPos>,
}

const STEPS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Walkability of every tile on a planet, one bit per tile.
///
/// Tiles of chunks that were never generated read as blocked. The grid wraps
/// in both axes like the world does.
pub struct PathfindingGrid {
    side: u32,
    walkable: Vec<u64>,
}

impl PathfindingGrid {
    pub fn new(world_size: u16) -> Self {
        let side = world_size.max(1) as u32 * CHUNK_TILE_SIZE as u32;
        let bits = side as usize * side as usize;
        Self {
            side,
            walkable: vec![0; bits.div_ceil(64)],
        }
    }

    /// Tiles per side.
    pub fn side(&self) -> u32 {
        self.side
    }

    fn bit(&self, x: i32, y: i32) -> usize {
        let side = self.side as i32;
        let x = x.rem_euclid(side) as usize;
        let y = y.rem_euclid(side) as usize;
        y * self.side as usize + x
    }

    pub fn is_walkable(&self, pos: GridPos) -> bool {
        let bit = self.bit(pos.x, pos.y);
        self.walkable[bit / 64] & (1 << (bit % 64)) != 0
    }

    pub fn set_walkable(&mut self, pos: GridPos, walkable: bool) {
        let bit = self.bit(pos.x, pos.y);
        if walkable {
            self.walkable[bit / 64] |= 1 << (bit % 64);
        } else {
            self.walkable[bit / 64] &= !(1 << (bit % 64));
        }
    }

    /// Refresh every tile covered by a chunk.
    pub fn update_chunk(&mut self, chunk: &Chunk) {
        for tile in TileCoord::all() {
            let (gx, gy) = global_tile(chunk.position(), tile);
            self.set_walkable(GridPos::new(gx as i32, gy as i32), !chunk.is_tile_blocked(tile));
        }
    }

    fn wrap(&self, pos: GridPos) -> GridPos {
        let side = self.side as i32;
        GridPos::new(pos.x.rem_euclid(side), pos.y.rem_euclid(side))
    }

    /// Manhattan distance taking the short way around each axis.
    pub fn wrapped_distance(&self, a: GridPos, b: GridPos) -> i32 {
        let side = self.side as i32;
        let axis = |d: i32| {
            let d = d.rem_euclid(side);
            d.min(side - d)
        };
        axis(a.x - b.x) + axis(a.y - b.y)
    }

    /// Shortest 4-connected path between two global tiles, crossing the
    /// wrapped edges when that is shorter. Positions are wrapped into the grid.
    ///
    /// Expansion order is fixed, so the same grid always yields the same path.
    /// Gives up after `max_expansions` tiles have been settled.
    pub fn find_path(&self, start: GridPos, goal: GridPos, max_expansions: usize) -> Option<Vec<GridPos>> {
        let start = self.wrap(start);
        let goal = self.wrap(goal);
        if start == goal {
            return Some(vec![start]);
        }
        if !self.is_walkable(start) || !self.is_walkable(goal) {
            return None;
        }

        let mut frontier = BinaryHeap::from([Frontier {
            estimate: self.wrapped_distance(start, goal),
            cost: 0,
            pos: start,
        }]);
        let mut reached = BTreeMap::from([(start, Reached { cost: 0, from: None })]);
        let mut settled = BTreeSet::new();

        while let Some(Frontier { cost, pos, .. }) = frontier.pop() {
            if !settled.insert(pos) {
                continue;
            }
            if pos == goal {
                let mut path = vec![goal];
                let mut cursor = goal;
                while let Some(prev) = reached.get(&cursor).and_then(|r| r.from) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            if settled.len() > max_expansions {
                return None;
            }

            for (dx, dy) in STEPS {
                let next = self.wrap(GridPos::new(pos.x + dx, pos.y + dy));
                if settled.contains(&next) || !self.is_walkable(next) {
                    continue;
                }
                let next_cost = cost + 1;
                if reached.get(&next).is_some_and(|r| r.cost <= next_cost) {
                    continue;
                }
                reached.insert(
                    next,
                    Reached {
                        cost: next_cost,
                        from: Some(pos),
                    },
                );
                frontier.push(Frontier {
                    estimate: next_cost + self.wrapped_distance(next, goal),
                    cost: next_cost,
                    pos: next,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{GridPos, PathfindingGrid};

    fn open_grid(world_size: u16) -> PathfindingGrid {
        let mut grid = PathfindingGrid::new(world_size);
        let side = grid.side() as i32;
        for y in 0..side {
            for x in 0..side {
                grid.set_walkable(GridPos::new(x, y), true);
            }
        }
        grid
    }

    #[test]
    fn straight_path_in_open_space() {
        let grid = open_grid(2);
        let path = grid.find_path(GridPos::new(0, 0), GridPos::new(3, 0), 1024).expect("path");
        assert_eq!(
            path,
            vec![GridPos::new(0, 0), GridPos::new(1, 0), GridPos::new(2, 0), GridPos::new(3, 0)]
        );
    }

    #[test]
    fn detours_resolve_the_same_way_every_time() {
        let mut grid = open_grid(2);
        grid.set_walkable(GridPos::new(5, 5), false);
        let first = grid.find_path(GridPos::new(4, 5), GridPos::new(6, 5), 4096).expect("path");
        assert_eq!(first.len(), 5);
        assert!(!first.contains(&GridPos::new(5, 5)));
        for _ in 0..4 {
            assert_eq!(grid.find_path(GridPos::new(4, 5), GridPos::new(6, 5), 4096), Some(first.clone()));
        }
    }

    #[test]
    fn grid_paths_wrap_around_the_edge() {
        let mut grid = PathfindingGrid::new(2);
        let side = grid.side() as i32;
        for x in 0..side {
            grid.set_walkable(GridPos::new(x, 0), true);
        }
        let path = grid
            .find_path(GridPos::new(1, 0), GridPos::new(side - 2, 0), 256)
            .expect("path should exist");
        assert_eq!(
            path,
            vec![
                GridPos::new(1, 0),
                GridPos::new(0, 0),
                GridPos::new(side - 1, 0),
                GridPos::new(side - 2, 0),
            ]
        );
    }

    #[test]
    fn wrapped_distance_takes_the_short_way() {
        let grid = PathfindingGrid::new(4);
        let side = grid.side() as i32;
        assert_eq!(grid.wrapped_distance(GridPos::new(0, 0), GridPos::new(side - 1, 0)), 1);
        assert_eq!(grid.wrapped_distance(GridPos::new(2, 3), GridPos::new(4, 1)), 4);
    }

    #[test]
    fn ungenerated_tiles_block() {
        let grid = PathfindingGrid::new(4);
        assert!(!grid.is_walkable(GridPos::new(3, 3)));
        assert!(grid.find_path(GridPos::new(0, 0), GridPos::new(2, 0), 64).is_none());
    }

    #[test]
    fn expansion_budget_is_honoured() {
        let grid = open_grid(4);
        assert!(grid.find_path(GridPos::new(0, 0), GridPos::new(12, 12), 8).is_none());
    }
}
