//! Per-entity movement: turns a target point into a route over the
//! navigation graph and advances the entity along it tick by tick.

use crate::math::Vec2;
use crate::navigation::{NavGraph, TileCoord};
use std::collections::VecDeque;

/// A target farther than this from every walkable tile centre is off the mesh
pub const TARGET_ACCEPT_RADIUS: f32 = 0.72;
/// Distance at which a waypoint counts as reached
pub const WAYPOINT_RADIUS: f32 = 0.1;
/// Distance at which the final target counts as reached
pub const ARRIVAL_RADIUS: f32 = 0.01;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathfindingHelper {
    /// Current position
    pub pos: Vec2,
    /// Point the entity is heading for
    pub target: Vec2,
    path: VecDeque<TileCoord>,
}

impl PathfindingHelper {
    pub fn new(pos: Vec2, target: Vec2) -> Self {
        Self {
            pos,
            target,
            path: VecDeque::new(),
        }
    }

    /// Aims at `target` and computes a route to it.
    ///
    /// Returns false without changing anything when the target has a negative
    /// coordinate or lies outside the walkable mesh. An accepted target with no
    /// route leaves the path empty, so the entity heads straight for it.
    pub fn set_target(&mut self, graph: &NavGraph, target: Vec2) -> bool {
        if target.x < 0.0 || target.y < 0.0 || !target.is_finite() {
            return false;
        }

        let goal = match graph.nearest(target) {
            Some((tile, distance)) if distance <= TARGET_ACCEPT_RADIUS => tile,
            _ => return false,
        };
        let start = match graph.nearest(self.pos) {
            Some((tile, _)) => tile,
            None => return false,
        };

        self.target = target;
        self.path = graph.find_path(start, goal).into();
        true
    }

    /// Moves up to `distance` along the current route
    pub fn update(&mut self, distance: f32) {
        if self.path.len() < 2 {
            let to_target = self.target - self.pos;
            let remaining = to_target.length();
            if remaining <= ARRIVAL_RADIUS || remaining <= distance {
                self.pos = self.target;
                self.path.clear();
            } else {
                self.pos += to_target * (distance / remaining);
            }
            return;
        }

        let waypoint = self.path[0].center();
        let to_waypoint = waypoint - self.pos;
        let remaining = to_waypoint.length();
        if remaining <= distance {
            self.pos = waypoint;
        } else {
            self.pos += to_waypoint * (distance / remaining);
        }

        if self.pos.distance(waypoint) < WAYPOINT_RADIUS {
            self.path.pop_front();
        }
    }

    /// Drops the route and holds the current position
    pub fn stop(&mut self) {
        self.target = self.pos;
        self.path.clear();
    }

    /// Moves instantly, discarding any route
    pub fn teleport(&mut self, pos: Vec2) {
        self.pos = pos;
        self.stop();
    }

    pub fn path(&self) -> &VecDeque<TileCoord> {
        &self.path
    }

    pub fn is_moving(&self) -> bool {
        !self.path.is_empty() || self.pos.distance(self.target) > ARRIVAL_RADIUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_map::Tilemap;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::HashSet;

    // 10x6 floor with a wall splitting it except for a gap at the bottom
    fn walled_graph() -> NavGraph {
        let rows = (0..6)
            .map(|y| {
                (0..10)
                    .map(|x| if x == 5 && y < 5 { 1 } else { 0 })
                    .collect()
            })
            .collect();
        NavGraph::build(&Tilemap::from_rows(rows).unwrap(), &HashSet::from([0]))
    }

    #[test]
    fn test_rejects_negative_target() {
        let graph = walled_graph();
        let mut helper = PathfindingHelper::new(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0));

        assert!(!helper.set_target(&graph, Vec2::new(-0.2, 3.0)));
        assert_eq!(helper.target, Vec2::new(1.0, 1.0));
        assert!(helper.path().is_empty());
    }

    #[test]
    fn test_rejects_target_off_the_mesh() {
        let graph = walled_graph();
        let mut helper = PathfindingHelper::new(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0));

        // inside the wall column, more than 0.72 from any floor centre
        assert!(!helper.set_target(&graph, Vec2::new(5.0, 2.0)));
        // far outside the map
        assert!(!helper.set_target(&graph, Vec2::new(40.0, 40.0)));
        assert_eq!(helper.target, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_route_goes_around_the_wall() {
        let graph = walled_graph();
        let mut helper = PathfindingHelper::new(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0));

        assert!(helper.set_target(&graph, Vec2::new(8.2, 1.1)));
        assert!(helper.path().len() >= 2);
        assert!(helper.path().iter().any(|t| t.x == 5 && t.y == 5));
        assert_eq!(helper.path().back(), Some(&TileCoord::new(8, 1)));
    }

    #[test]
    fn test_converges_on_reachable_target() {
        let graph = walled_graph();
        let mut helper = PathfindingHelper::new(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0));
        let target = Vec2::new(8.3, 0.8);
        assert!(helper.set_target(&graph, target));

        for _ in 0..10_000 {
            helper.update(0.05);
            // never walks through the wall column above the gap
            assert!(!(helper.pos.x > 4.6 && helper.pos.x < 5.4 && helper.pos.y < 4.4));
            if !helper.is_moving() {
                break;
            }
        }

        assert!(helper.path().is_empty());
        assert!(helper.pos.distance(target) <= ARRIVAL_RADIUS);
    }

    #[test]
    fn test_waypoints_are_consumed_in_order() {
        let graph = walled_graph();
        let mut helper = PathfindingHelper::new(Vec2::new(0.0, 0.0), Vec2::ZERO);
        assert!(helper.set_target(&graph, Vec2::new(3.0, 0.0)));
        assert_eq!(helper.path().len(), 3);

        helper.update(1.0);
        assert_eq!(helper.path().len(), 2);
        assert_eq!(helper.path().front(), Some(&TileCoord::new(2, 0)));
    }

    #[test]
    fn test_direct_approach_without_route() {
        let graph = walled_graph();
        let mut helper = PathfindingHelper::new(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0));
        assert!(helper.set_target(&graph, Vec2::new(1.5, 1.0)));
        assert!(helper.path().len() < 2);

        helper.update(0.2);
        assert_approx_eq!(helper.pos.x, 1.2);
        assert_approx_eq!(helper.pos.y, 1.0);

        // final step clamps onto the target instead of overshooting
        helper.update(1.0);
        assert_eq!(helper.pos, Vec2::new(1.5, 1.0));
        assert!(!helper.is_moving());
    }

    #[test]
    fn test_stop_and_teleport() {
        let graph = walled_graph();
        let mut helper = PathfindingHelper::new(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0));
        assert!(helper.set_target(&graph, Vec2::new(8.0, 3.0)));
        helper.update(0.5);

        helper.stop();
        assert!(!helper.is_moving());
        assert_eq!(helper.target, helper.pos);

        helper.teleport(Vec2::new(2.0, 2.0));
        assert_eq!(helper.pos, Vec2::new(2.0, 2.0));
        assert!(helper.path().is_empty());
    }
}
