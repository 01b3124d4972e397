//! Walkable-tile adjacency graph.
//!
//! Every tile whose id is in the safe set becomes a node, joined to each of
//! its eight neighbours that is also safe. Adjacency is symmetric by
//! construction even though it is stored as directed lists.

use crate::math::Vec2;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Discrete tile position. The tile's centre sits at `(x, y)` in tile units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn center(self) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32)
    }
}

/// Read access to a rectangular grid of tile ids
pub trait TileSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn tile_at(&self, x: u32, y: u32) -> u32;
}

/// Directed edge to a neighbouring walkable tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub to: TileCoord,
    /// Always 1.0 for now; the search ignores it
    pub weight: f32,
}

#[derive(Debug, Clone, Default)]
pub struct NavGraph {
    nodes: BTreeMap<TileCoord, Vec<Edge>>,
}

impl NavGraph {
    /// Builds the graph in a single pass over the map
    pub fn build(map: &impl TileSource, safe: &HashSet<u32>) -> Self {
        let mut nodes = BTreeMap::new();
        let (w, h) = (map.width() as i64, map.height() as i64);

        for y in 0..h {
            for x in 0..w {
                if !safe.contains(&map.tile_at(x as u32, y as u32)) {
                    continue;
                }

                let mut edges = Vec::with_capacity(8);
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let (nx, ny) = (x + dx, y + dy);
                        if nx < 0 || ny < 0 || nx >= w || ny >= h {
                            continue;
                        }
                        if safe.contains(&map.tile_at(nx as u32, ny as u32)) {
                            edges.push(Edge {
                                to: TileCoord::new(nx as u32, ny as u32),
                                weight: 1.0,
                            });
                        }
                    }
                }

                nodes.insert(TileCoord::new(x as u32, y as u32), edges);
            }
        }

        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, tile: TileCoord) -> bool {
        self.nodes.contains_key(&tile)
    }

    pub fn neighbors(&self, tile: TileCoord) -> &[Edge] {
        self.nodes.get(&tile).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn nodes(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.nodes.keys().copied()
    }

    /// Closest node to `pos` and its distance, by linear scan
    pub fn nearest(&self, pos: Vec2) -> Option<(TileCoord, f32)> {
        let mut best: Option<(TileCoord, f32)> = None;
        for &tile in self.nodes.keys() {
            let distance = tile.center().distance(pos);
            match best {
                Some((_, d)) if d <= distance => {}
                _ => best = Some((tile, distance)),
            }
        }
        best
    }

    /// Breadth-first route from `from` to `to`.
    ///
    /// The returned tiles exclude `from` and end with `to`. Empty when the
    /// two are equal or no route exists.
    pub fn find_path(&self, from: TileCoord, to: TileCoord) -> Vec<TileCoord> {
        if from == to || !self.contains(from) || !self.contains(to) {
            return Vec::new();
        }

        let mut came_from: HashMap<TileCoord, TileCoord> = HashMap::new();
        let mut frontier = VecDeque::from([from]);
        came_from.insert(from, from);

        while let Some(current) = frontier.pop_front() {
            if current == to {
                break;
            }
            for edge in self.neighbors(current) {
                if !came_from.contains_key(&edge.to) {
                    came_from.insert(edge.to, current);
                    frontier.push_back(edge.to);
                }
            }
        }

        if !came_from.contains_key(&to) {
            return Vec::new();
        }

        let mut path = vec![to];
        let mut current = to;
        while let Some(&previous) = came_from.get(&current) {
            if previous == from {
                break;
            }
            path.push(previous);
            current = previous;
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_map::Tilemap;

    fn safe() -> HashSet<u32> {
        HashSet::from([0])
    }

    // 5x3 open field with a single blocked tile in the middle
    fn field_with_obstacle() -> Tilemap {
        Tilemap::from_rows(vec![
            vec![0, 0, 0, 0, 0],
            vec![0, 0, 1, 0, 0],
            vec![0, 0, 0, 0, 0],
        ])
        .unwrap()
    }

    #[test]
    fn test_safe_tiles_become_nodes() {
        let graph = NavGraph::build(&field_with_obstacle(), &safe());
        assert_eq!(graph.len(), 14);
        assert!(!graph.contains(TileCoord::new(2, 1)));
    }

    #[test]
    fn test_eight_way_adjacency() {
        let graph = NavGraph::build(&field_with_obstacle(), &safe());

        // corner tile has three neighbours
        assert_eq!(graph.neighbors(TileCoord::new(0, 0)).len(), 3);
        // tile next to the obstacle loses that edge
        assert_eq!(graph.neighbors(TileCoord::new(1, 1)).len(), 7);
        assert!(graph
            .neighbors(TileCoord::new(1, 1))
            .iter()
            .all(|e| e.to != TileCoord::new(2, 1) && e.weight == 1.0));
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        let graph = NavGraph::build(&field_with_obstacle(), &safe());
        for tile in graph.nodes() {
            for edge in graph.neighbors(tile) {
                assert!(graph.neighbors(edge.to).iter().any(|e| e.to == tile));
            }
        }
    }

    #[test]
    fn test_path_avoids_obstacle() {
        let graph = NavGraph::build(&field_with_obstacle(), &safe());
        let path = graph.find_path(TileCoord::new(0, 1), TileCoord::new(4, 1));

        assert_eq!(path.len(), 4);
        assert_eq!(path.last(), Some(&TileCoord::new(4, 1)));
        assert!(!path.contains(&TileCoord::new(2, 1)));

        // consecutive waypoints are graph neighbours
        let mut previous = TileCoord::new(0, 1);
        for &tile in &path {
            assert!(graph.neighbors(previous).iter().any(|e| e.to == tile));
            previous = tile;
        }
    }

    #[test]
    fn test_unreachable_target_gives_empty_path() {
        let map = Tilemap::from_rows(vec![vec![0, 0, 1, 0, 0], vec![0, 0, 1, 0, 0]]).unwrap();
        let graph = NavGraph::build(&map, &safe());
        assert!(graph
            .find_path(TileCoord::new(0, 0), TileCoord::new(4, 1))
            .is_empty());
    }

    #[test]
    fn test_same_tile_gives_empty_path() {
        let graph = NavGraph::build(&field_with_obstacle(), &safe());
        assert!(graph
            .find_path(TileCoord::new(3, 2), TileCoord::new(3, 2))
            .is_empty());
    }

    #[test]
    fn test_nearest_node() {
        let graph = NavGraph::build(&field_with_obstacle(), &safe());

        let (tile, distance) = graph.nearest(Vec2::new(3.2, 0.1)).unwrap();
        assert_eq!(tile, TileCoord::new(3, 0));
        assert!(distance < 0.3);

        // the obstacle centre resolves to one of its walkable neighbours
        let (tile, distance) = graph.nearest(Vec2::new(2.0, 1.0)).unwrap();
        assert_ne!(tile, TileCoord::new(2, 1));
        assert!((distance - 1.0).abs() < 1e-6);

        assert!(NavGraph::default().nearest(Vec2::ZERO).is_none());
    }
}
