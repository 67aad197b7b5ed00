#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Navigation system that moves units around impassable terrain.
//!
//! [`Pathfinder`] runs a deterministic A* search over the tile grid and
//! [`Navigator`] wraps it with the per-unit [`PathRequest`] memory used to walk
//! the resulting waypoints. Before planning, the navigator probes the straight
//! line to the destination and skips the search entirely when nothing blocks
//! it.

mod pathfinder;
mod request;

use std::collections::BTreeMap;

use glam::Vec2;
use serde::Deserialize;
use skirmish_core::{TacticsError, TerrainView, UnitId};
use tracing::debug;

pub use pathfinder::{containing_cell, nearest_walkable, Pathfinder};
pub use request::PathRequest;

/// Parameters controlling search limits and waypoint following.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct NavigationTuning {
    /// Cost travelled, in grid units, after which a partial route is accepted.
    pub max_search_cost: f32,
    /// Maximum number of node expansions before the search gives up.
    pub max_expansions: usize,
    /// Radius, in cells, searched for a walkable substitute of a blocked goal.
    pub goal_search_radius: u32,
    /// Minimum number of evenly spaced points tested by the line-of-sight probe.
    pub line_of_sight_samples: u32,
    /// Distance at which a waypoint counts as reached.
    pub arrival_threshold: f32,
    /// Distance the destination may drift before the route is planned again.
    pub replan_tolerance: f32,
}

impl Default for NavigationTuning {
    fn default() -> Self {
        Self {
            max_search_cost: 32.0,
            max_expansions: 4096,
            goal_search_radius: 5,
            line_of_sight_samples: 8,
            arrival_threshold: 16.0,
            replan_tolerance: 16.0,
        }
    }
}

/// Reports whether a unit can walk the straight segment between two points.
///
/// Evenly spaced points along the segment and its endpoint are tested. The
/// number of points grows with the segment so no sample gap exceeds half a
/// tile.
#[must_use]
pub fn line_of_sight(terrain: &TerrainView<'_>, from: Vec2, to: Vec2, samples: u32) -> bool {
    let half_tile = terrain.grid().tile_length() * 0.5;
    let needed = if half_tile > 0.0 {
        (from.distance(to) / half_tile).ceil()
    } else {
        0.0
    };
    let samples = samples.max(needed.min(u32::MAX as f32) as u32);

    let interior_clear = (1..=samples).all(|step| {
        let t = step as f32 / (samples + 1) as f32;
        terrain.is_walkable_at(from.lerp(to, t))
    });
    interior_clear && terrain.is_walkable_at(to)
}

/// Where a steered unit should head this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Heading {
    /// The unit is close enough to its destination and should stop.
    Arrived,
    /// The unit should move straight toward the provided point.
    Toward(Vec2),
}

/// Pathfinder plus the per-unit waypoint memory.
#[derive(Debug, Default)]
pub struct Navigator {
    tuning: NavigationTuning,
    pathfinder: Pathfinder,
    requests: BTreeMap<UnitId, PathRequest>,
}

impl Navigator {
    /// Creates a navigator with the provided tuning.
    #[must_use]
    pub fn new(tuning: NavigationTuning) -> Self {
        Self {
            pathfinder: Pathfinder::new(tuning.clone()),
            tuning,
            requests: BTreeMap::new(),
        }
    }

    /// Tuning applied by the navigator.
    #[must_use]
    pub fn tuning(&self) -> &NavigationTuning {
        &self.tuning
    }

    /// Path request currently held for the unit.
    #[must_use]
    pub fn request(&self, unit: UnitId) -> Option<&PathRequest> {
        self.requests.get(&unit).filter(|request| request.is_active())
    }

    /// Reports whether the unit is mid-route and its next waypoint is still walkable.
    #[must_use]
    pub fn has_valid_path(&self, unit: UnitId, terrain: &TerrainView<'_>) -> bool {
        self.request(unit)
            .and_then(PathRequest::next_waypoint)
            .map_or(false, |waypoint| terrain.is_walkable_at(waypoint))
    }

    /// Decides where the unit heads to make progress toward `destination`.
    ///
    /// The destination is clamped one tile inside the map. A clear straight
    /// line drops any stored route; otherwise the route is (re)planned when
    /// missing or stale and followed one waypoint at a time.
    pub fn steer(
        &mut self,
        unit: UnitId,
        from: Vec2,
        destination: Vec2,
        terrain: &TerrainView<'_>,
    ) -> Result<Heading, TacticsError> {
        let destination = terrain.clamp_inside(destination, terrain.grid().tile_length());
        if from.distance(destination) <= self.tuning.arrival_threshold {
            self.forget(unit);
            return Ok(Heading::Arrived);
        }

        if line_of_sight(terrain, from, destination, self.tuning.line_of_sight_samples) {
            self.forget(unit);
            return Ok(Heading::Toward(destination));
        }

        let request = self.requests.entry(unit).or_default();
        if request.needs_replan(destination, self.tuning.replan_tolerance) {
            match self.pathfinder.plan(terrain, from, destination) {
                Ok(path) => {
                    debug!(
                        unit = unit.get(),
                        waypoints = path.len(),
                        "planned route"
                    );
                    *request = PathRequest::new(destination, path);
                }
                Err(error) => {
                    request.clear();
                    return Err(error);
                }
            }
        }

        Ok(request
            .advance(from, self.tuning.arrival_threshold)
            .map_or(Heading::Toward(destination), Heading::Toward))
    }

    /// Drops any route stored for the unit.
    pub fn forget(&mut self, unit: UnitId) {
        let _ = self.requests.remove(&unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::{TerrainKind, TileCoord, TileGrid};

    fn grid(columns: u32, rows: u32) -> TileGrid {
        TileGrid::new(TileCoord::new(columns), TileCoord::new(rows), 32.0)
    }

    fn walled() -> Vec<TerrainKind> {
        // 8x8 field with a vertical wall at column 4 leaving row 7 open.
        let mut cells = vec![TerrainKind::Open; 64];
        for row in 0..7 {
            cells[row * 8 + 4] = TerrainKind::Blocked;
        }
        cells
    }

    #[test]
    fn clear_line_moves_directly() {
        let cells = vec![TerrainKind::Open; 64];
        let terrain = TerrainView::new(&cells, grid(8, 8));
        let mut navigator = Navigator::default();

        let heading = navigator
            .steer(UnitId::new(1), Vec2::new(48.0, 48.0), Vec2::new(200.0, 48.0), &terrain)
            .expect("heading");
        assert_eq!(heading, Heading::Toward(Vec2::new(200.0, 48.0)));
        assert!(navigator.request(UnitId::new(1)).is_none());
    }

    #[test]
    fn wall_forces_a_planned_route() {
        let cells = walled();
        let terrain = TerrainView::new(&cells, grid(8, 8));
        let mut navigator = Navigator::default();
        let unit = UnitId::new(3);
        let from = Vec2::new(48.0, 48.0);

        let heading = navigator
            .steer(unit, from, Vec2::new(208.0, 48.0), &terrain)
            .expect("heading");
        let Heading::Toward(waypoint) = heading else {
            panic!("expected movement, got {heading:?}");
        };
        assert!(waypoint.distance(from) <= 32.0 * std::f32::consts::SQRT_2 + 0.01);
        assert!(navigator.has_valid_path(unit, &terrain));
    }

    #[test]
    fn arrival_clears_the_route() {
        let cells = walled();
        let terrain = TerrainView::new(&cells, grid(8, 8));
        let mut navigator = Navigator::default();
        let unit = UnitId::new(3);

        let _ = navigator
            .steer(unit, Vec2::new(48.0, 48.0), Vec2::new(208.0, 48.0), &terrain)
            .expect("heading");
        let heading = navigator
            .steer(unit, Vec2::new(200.0, 50.0), Vec2::new(208.0, 48.0), &terrain)
            .expect("heading");
        assert_eq!(heading, Heading::Arrived);
        assert!(navigator.request(unit).is_none());
    }

    #[test]
    fn unreachable_destination_reports_no_path() {
        let mut cells = vec![TerrainKind::Open; 64];
        for row in 0..8 {
            cells[row * 8 + 4] = TerrainKind::Blocked;
        }
        let terrain = TerrainView::new(&cells, grid(8, 8));
        let mut navigator = Navigator::default();

        let result = navigator.steer(
            UnitId::new(1),
            Vec2::new(48.0, 48.0),
            Vec2::new(208.0, 48.0),
            &terrain,
        );
        assert!(matches!(result, Err(TacticsError::NoPathFound { .. })));
        assert!(navigator.request(UnitId::new(1)).is_none());
    }

    #[test]
    fn line_of_sight_detects_thin_walls() {
        let cells = walled();
        let terrain = TerrainView::new(&cells, grid(8, 8));

        assert!(!line_of_sight(&terrain, Vec2::new(16.0, 16.0), Vec2::new(240.0, 16.0), 8));
        assert!(line_of_sight(&terrain, Vec2::new(16.0, 16.0), Vec2::new(16.0, 240.0), 8));
        assert!(!line_of_sight(&terrain, Vec2::new(16.0, 16.0), Vec2::new(-5.0, 16.0), 8));
    }
}
