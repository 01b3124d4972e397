//! Static map data a game container plays on: the tile grid, per-team spawn
//! points and the navigation graph derived from them.

use crate::math::Vec2;
use crate::navigation::{NavGraph, TileSource};
use crate::protocol::{SlotId, Team};
use std::collections::HashSet;
use thiserror::Error;

/// Tile id of open floor in the built-in maps
pub const FLOOR_TILE: u32 = 0;
/// Tile id of walls in the built-in maps
pub const WALL_TILE: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("tilemap has no rows")]
    Empty,
    #[error("row {row} has {found} tiles, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Row-major grid of tile ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tilemap {
    width: u32,
    height: u32,
    tiles: Vec<u32>,
}

impl Tilemap {
    pub fn from_rows(rows: Vec<Vec<u32>>) -> Result<Self, MapError> {
        let expected = rows.first().map(Vec::len).ok_or(MapError::Empty)?;
        if expected == 0 {
            return Err(MapError::Empty);
        }

        let mut tiles = Vec::with_capacity(expected * rows.len());
        for (row, tiles_in_row) in rows.iter().enumerate() {
            if tiles_in_row.len() != expected {
                return Err(MapError::RaggedRow {
                    row,
                    expected,
                    found: tiles_in_row.len(),
                });
            }
            tiles.extend_from_slice(tiles_in_row);
        }

        Ok(Self {
            width: expected as u32,
            height: rows.len() as u32,
            tiles,
        })
    }
}

impl TileSource for Tilemap {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn tile_at(&self, x: u32, y: u32) -> u32 {
        self.tiles[(y * self.width + x) as usize]
    }
}

#[derive(Debug, Clone)]
pub struct GameMap {
    pub name: String,
    tilemap: Tilemap,
    /// Pixels per tile, only meaningful to a renderer
    tile_size: u32,
    team_one_spawns: Vec<Vec2>,
    team_two_spawns: Vec<Vec2>,
    graph: NavGraph,
}

impl GameMap {
    pub fn new(
        name: impl Into<String>,
        tilemap: Tilemap,
        tile_size: u32,
        safe_tiles: &HashSet<u32>,
        team_one_spawns: Vec<Vec2>,
        team_two_spawns: Vec<Vec2>,
    ) -> Self {
        let graph = NavGraph::build(&tilemap, safe_tiles);
        Self {
            name: name.into(),
            tilemap,
            tile_size,
            team_one_spawns,
            team_two_spawns,
            graph,
        }
    }

    /// Walled 24x16 arena with four pillars and five spawns per side
    pub fn arena() -> Self {
        let (w, h) = (24u32, 16u32);
        let pillars = [(8, 4), (15, 4), (8, 11), (15, 11)];

        let mut tiles = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let border = x == 0 || y == 0 || x == w - 1 || y == h - 1;
                let pillar = pillars
                    .iter()
                    .any(|&(px, py)| (x == px || x == px + 1) && (y == py || y == py + 1));
                tiles.push(if border || pillar { WALL_TILE } else { FLOOR_TILE });
            }
        }
        let tilemap = Tilemap {
            width: w,
            height: h,
            tiles,
        };

        let team_one_spawns = (0..5).map(|i| Vec2::new(2.0, 4.0 + 2.0 * i as f32)).collect();
        let team_two_spawns = (0..5)
            .map(|i| Vec2::new((w - 3) as f32, 4.0 + 2.0 * i as f32))
            .collect();

        Self::new(
            "arena",
            tilemap,
            32,
            &HashSet::from([FLOOR_TILE]),
            team_one_spawns,
            team_two_spawns,
        )
    }

    pub fn tilemap(&self) -> &Tilemap {
        &self.tilemap
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn graph(&self) -> &NavGraph {
        &self.graph
    }

    pub fn spawns(&self, team: Team) -> &[Vec2] {
        match team {
            Team::One => &self.team_one_spawns,
            Team::Two => &self.team_two_spawns,
            Team::None | Team::Any => &[],
        }
    }

    /// Spawn point for a slot on a team, indexed by slot id. Falls back to
    /// the map centre when the team has no spawns.
    pub fn spawn_point(&self, team: Team, slot: SlotId) -> Vec2 {
        let spawns = self.spawns(team);
        if spawns.is_empty() {
            return Vec2::new(
                (self.tilemap.width() as f32 - 1.0) / 2.0,
                (self.tilemap.height() as f32 - 1.0) / 2.0,
            );
        }
        spawns[slot as usize % spawns.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::TileCoord;

    #[test]
    fn test_tilemap_from_rows() {
        let map = Tilemap::from_rows(vec![vec![0, 1, 2], vec![3, 4, 5]]).unwrap();
        assert_eq!(map.width(), 3);
        assert_eq!(map.height(), 2);
        assert_eq!(map.tile_at(2, 1), 5);
        assert_eq!(map.tile_at(1, 0), 1);
    }

    #[test]
    fn test_tilemap_rejects_bad_rows() {
        assert_eq!(Tilemap::from_rows(vec![]), Err(MapError::Empty));
        assert_eq!(Tilemap::from_rows(vec![vec![]]), Err(MapError::Empty));
        assert_eq!(
            Tilemap::from_rows(vec![vec![0, 0], vec![0]]),
            Err(MapError::RaggedRow {
                row: 1,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_arena_layout() {
        let arena = GameMap::arena();
        let graph = arena.graph();

        assert!(!graph.contains(TileCoord::new(0, 0)));
        assert!(!graph.contains(TileCoord::new(8, 4)));
        assert!(graph.contains(TileCoord::new(1, 1)));

        for team in [Team::One, Team::Two] {
            assert_eq!(arena.spawns(team).len(), 5);
            for spawn in arena.spawns(team) {
                let (tile, distance) = graph.nearest(*spawn).unwrap();
                assert!(distance < 1e-6, "spawn {:?} is not on a walkable tile", tile);
            }
        }
    }

    #[test]
    fn test_spawn_point_wraps_and_falls_back() {
        let arena = GameMap::arena();
        assert_eq!(arena.spawn_point(Team::One, 0), arena.spawns(Team::One)[0]);
        assert_eq!(arena.spawn_point(Team::Two, 7), arena.spawns(Team::Two)[2]);

        let centre = arena.spawn_point(Team::None, 3);
        assert_eq!(centre, Vec2::new(11.5, 7.5));
    }
}
