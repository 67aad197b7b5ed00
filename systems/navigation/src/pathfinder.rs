//! Deterministic A* search over the 8-connected tile grid.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    f32::consts::SQRT_2,
};

use glam::Vec2;
use skirmish_core::{CellCoord, TacticsError, TerrainView};
use tracing::{debug, trace};

use crate::NavigationTuning;

const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (0, -1),
    (1, 0),
    (0, 1),
    (-1, 0),
    (1, -1),
    (1, 1),
    (-1, 1),
    (-1, -1),
];

/// Grid search that reuses its scratch buffers between calls.
#[derive(Debug, Default)]
pub struct Pathfinder {
    tuning: NavigationTuning,
    open: BinaryHeap<OpenNode>,
    g_scores: Vec<f32>,
    parents: Vec<Option<usize>>,
    closed: Vec<bool>,
    counter: u64,
}

impl Pathfinder {
    /// Creates a pathfinder with the provided tuning.
    #[must_use]
    pub fn new(tuning: NavigationTuning) -> Self {
        Self {
            tuning,
            ..Self::default()
        }
    }

    /// Plans a route between two world positions.
    ///
    /// The result lists cell centers, excluding the start cell. `Some` with an
    /// empty list means both positions share a cell. `None` means the goal is
    /// unreachable from the start.
    pub fn find_path(
        &mut self,
        terrain: &TerrainView<'_>,
        start: Vec2,
        goal: Vec2,
    ) -> Option<Vec<Vec2>> {
        let start_cell = terrain.cell_at(start)?;
        if !terrain.is_walkable(start_cell) {
            trace!(?start_cell, "path search starts on blocked terrain");
            return None;
        }

        let requested = terrain.cell_at(goal)?;
        let goal_cell = if terrain.is_walkable(requested) {
            requested
        } else {
            nearest_walkable(terrain, requested, self.tuning.goal_search_radius)?
        };

        if start_cell == goal_cell {
            return Some(Vec::new());
        }

        let end = self.search(terrain, start_cell, goal_cell)?;
        Some(self.reconstruct(terrain, end))
    }

    /// Same as [`Pathfinder::find_path`] but reports failures as [`TacticsError`].
    pub fn plan(
        &mut self,
        terrain: &TerrainView<'_>,
        start: Vec2,
        goal: Vec2,
    ) -> Result<Vec<Vec2>, TacticsError> {
        self.find_path(terrain, start, goal)
            .ok_or_else(|| TacticsError::NoPathFound {
                from: containing_cell(terrain, start),
                to: containing_cell(terrain, goal),
            })
    }

    fn search(
        &mut self,
        terrain: &TerrainView<'_>,
        start: CellCoord,
        goal: CellCoord,
    ) -> Option<usize> {
        let grid = terrain.grid();
        let columns = usize::try_from(grid.columns().get()).unwrap_or(0);
        let cell_count = grid.cell_count();
        let start_index = cell_index(columns, start)?;
        let goal_index = cell_index(columns, goal)?;

        self.reset(cell_count);
        self.g_scores[start_index] = 0.0;
        self.push(start_index, heuristic(start, goal));

        let mut expansions = 0_usize;
        while let Some(node) = self.open.pop() {
            if self.closed[node.index] {
                continue;
            }
            self.closed[node.index] = true;

            if node.index == goal_index {
                trace!(expansions, "path search reached goal");
                return Some(node.index);
            }

            let travelled = self.g_scores[node.index];
            if travelled >= self.tuning.max_search_cost {
                debug!(
                    expansions,
                    travelled, "path search settled for a partial route"
                );
                return Some(node.index);
            }

            expansions += 1;
            if expansions > self.tuning.max_expansions {
                debug!(expansions, "path search exceeded its expansion cap");
                return None;
            }

            let current = cell_from_index(columns, node.index);
            for (dc, dr) in NEIGHBOR_OFFSETS {
                let Some(next) = offset(current, dc, dr) else {
                    continue;
                };
                let Some(factor) = terrain.kind(next).and_then(|kind| kind.cost_factor()) else {
                    continue;
                };
                let diagonal = dc != 0 && dr != 0;
                if diagonal && cuts_corner(terrain, current, dc, dr) {
                    continue;
                }
                let Some(next_index) = cell_index(columns, next) else {
                    continue;
                };
                if self.closed[next_index] {
                    continue;
                }

                let step = if diagonal { SQRT_2 } else { 1.0 };
                let tentative = travelled + step * factor;
                if tentative < self.g_scores[next_index] {
                    self.g_scores[next_index] = tentative;
                    self.parents[next_index] = Some(node.index);
                    self.push(next_index, tentative + heuristic(next, goal));
                }
            }
        }

        trace!(expansions, "path search exhausted the open set");
        None
    }

    fn reset(&mut self, cell_count: usize) {
        self.open.clear();
        self.counter = 0;
        self.g_scores.clear();
        self.g_scores.resize(cell_count, f32::INFINITY);
        self.parents.clear();
        self.parents.resize(cell_count, None);
        self.closed.clear();
        self.closed.resize(cell_count, false);
    }

    fn push(&mut self, index: usize, f_score: f32) {
        self.open.push(OpenNode {
            f_score,
            order: self.counter,
            index,
        });
        self.counter += 1;
    }

    fn reconstruct(&self, terrain: &TerrainView<'_>, end: usize) -> Vec<Vec2> {
        let columns = usize::try_from(terrain.grid().columns().get()).unwrap_or(0);
        let mut cells = Vec::new();
        let mut cursor = end;
        while let Some(parent) = self.parents.get(cursor).copied().flatten() {
            cells.push(cell_from_index(columns, cursor));
            cursor = parent;
        }
        cells
            .into_iter()
            .rev()
            .map(|cell| terrain.cell_center(cell))
            .collect()
    }
}

#[derive(Clone, Copy, Debug)]
struct OpenNode {
    f_score: f32,
    order: u64,
    index: usize,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the lowest score pops first.
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Nearest walkable cell on the square rings around `cell`.
///
/// Rings are scanned outward up to `radius`; within a ring the first walkable
/// cell in row-major order wins.
#[must_use]
pub fn nearest_walkable(
    terrain: &TerrainView<'_>,
    cell: CellCoord,
    radius: u32,
) -> Option<CellCoord> {
    let radius = i32::try_from(radius).unwrap_or(i32::MAX);
    for ring in 1..=radius {
        for dr in -ring..=ring {
            for dc in -ring..=ring {
                if dc.abs() != ring && dr.abs() != ring {
                    continue;
                }
                if let Some(candidate) = offset(cell, dc, dr) {
                    if terrain.is_walkable(candidate) {
                        return Some(candidate);
                    }
                }
            }
        }
    }
    None
}

/// Grid cell containing the position, clamped onto the grid.
#[must_use]
pub fn containing_cell(terrain: &TerrainView<'_>, position: Vec2) -> CellCoord {
    let grid = terrain.grid();
    let tile = grid.tile_length().max(f32::EPSILON);
    let last_column = grid.columns().get().saturating_sub(1) as f32;
    let last_row = grid.rows().get().saturating_sub(1) as f32;
    let column = (position.x / tile).floor().clamp(0.0, last_column);
    let row = (position.y / tile).floor().clamp(0.0, last_row);
    CellCoord::new(column as u32, row as u32)
}

fn cuts_corner(terrain: &TerrainView<'_>, from: CellCoord, dc: i32, dr: i32) -> bool {
    let horizontal = offset(from, dc, 0).map_or(false, |cell| terrain.is_walkable(cell));
    let vertical = offset(from, 0, dr).map_or(false, |cell| terrain.is_walkable(cell));
    !(horizontal && vertical)
}

fn offset(cell: CellCoord, dc: i32, dr: i32) -> Option<CellCoord> {
    let column = cell.column().checked_add_signed(dc)?;
    let row = cell.row().checked_add_signed(dr)?;
    Some(CellCoord::new(column, row))
}

fn heuristic(from: CellCoord, to: CellCoord) -> f32 {
    let dc = from.column().abs_diff(to.column()) as f32;
    let dr = from.row().abs_diff(to.row()) as f32;
    (dc * dc + dr * dr).sqrt()
}

fn cell_index(columns: usize, cell: CellCoord) -> Option<usize> {
    let row = usize::try_from(cell.row()).ok()?;
    let column = usize::try_from(cell.column()).ok()?;
    row.checked_mul(columns)?.checked_add(column)
}

fn cell_from_index(columns: usize, index: usize) -> CellCoord {
    let columns = columns.max(1);
    let column = u32::try_from(index % columns).unwrap_or(u32::MAX);
    let row = u32::try_from(index / columns).unwrap_or(u32::MAX);
    CellCoord::new(column, row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::{TerrainKind, TileCoord, TileGrid};

    fn grid(columns: u32, rows: u32) -> TileGrid {
        TileGrid::new(TileCoord::new(columns), TileCoord::new(rows), 32.0)
    }

    fn center(column: u32, row: u32) -> Vec2 {
        Vec2::new(column as f32 * 32.0 + 16.0, row as f32 * 32.0 + 16.0)
    }

    fn paint(cells: &mut [TerrainKind], columns: u32, blocked: &[(u32, u32)], kind: TerrainKind) {
        for &(column, row) in blocked {
            cells[(row * columns + column) as usize] = kind;
        }
    }

    #[test]
    fn straight_corridor_yields_each_cell_once() {
        let cells = vec![TerrainKind::Open; 6];
        let terrain = TerrainView::new(&cells, grid(6, 1));
        let mut pathfinder = Pathfinder::default();

        let path = pathfinder
            .find_path(&terrain, center(0, 0), center(5, 0))
            .expect("path");
        let expected: Vec<Vec2> = (1..=5).map(|column| center(column, 0)).collect();
        assert_eq!(path, expected);
    }

    #[test]
    fn same_cell_is_an_empty_route() {
        let cells = vec![TerrainKind::Open; 4];
        let terrain = TerrainView::new(&cells, grid(2, 2));
        let path = Pathfinder::default().find_path(&terrain, Vec2::new(3.0, 3.0), Vec2::new(30.0, 20.0));
        assert_eq!(path, Some(Vec::new()));
    }

    #[test]
    fn diagonal_steps_do_not_cut_corners() {
        let mut cells = vec![TerrainKind::Open; 4];
        paint(&mut cells, 2, &[(1, 0)], TerrainKind::Blocked);
        let terrain = TerrainView::new(&cells, grid(2, 2));

        let path = Pathfinder::default()
            .find_path(&terrain, center(0, 0), center(1, 1))
            .expect("path");
        assert_eq!(path, vec![center(0, 1), center(1, 1)]);
    }

    #[test]
    fn enclosed_goal_returns_none() {
        let mut cells = vec![TerrainKind::Open; 49];
        let wall: Vec<(u32, u32)> = (3..=5)
            .flat_map(|column| (3..=5).map(move |row| (column, row)))
            .filter(|&cell| cell != (4, 4))
            .collect();
        paint(&mut cells, 7, &wall, TerrainKind::Blocked);
        let terrain = TerrainView::new(&cells, grid(7, 7));

        let path = Pathfinder::default().find_path(&terrain, center(0, 0), center(4, 4));
        assert_eq!(path, None);
    }

    #[test]
    fn blocked_goal_retargets_to_nearest_walkable_cell() {
        let mut cells = vec![TerrainKind::Open; 25];
        paint(&mut cells, 5, &[(4, 2)], TerrainKind::Blocked);
        let terrain = TerrainView::new(&cells, grid(5, 5));

        let path = Pathfinder::default()
            .find_path(&terrain, center(0, 2), center(4, 2))
            .expect("path");
        assert_eq!(path.last().copied(), Some(center(3, 1)));
    }

    #[test]
    fn blocked_start_returns_none() {
        let mut cells = vec![TerrainKind::Open; 4];
        paint(&mut cells, 2, &[(0, 0)], TerrainKind::Blocked);
        let terrain = TerrainView::new(&cells, grid(2, 2));
        assert_eq!(
            Pathfinder::default().find_path(&terrain, center(0, 0), center(1, 1)),
            None
        );
    }

    #[test]
    fn slow_terrain_is_avoided_when_a_detour_is_cheap() {
        let mut cells = vec![TerrainKind::Open; 15];
        paint(&mut cells, 5, &[(2, 1)], TerrainKind::Slow);
        let terrain = TerrainView::new(&cells, grid(5, 3));

        let path = Pathfinder::default()
            .find_path(&terrain, center(0, 1), center(4, 1))
            .expect("path");
        assert!(!path.contains(&center(2, 1)));
    }

    #[test]
    fn relaxation_bound_returns_a_partial_route() {
        let cells = vec![TerrainKind::Open; 100];
        let terrain = TerrainView::new(&cells, grid(100, 1));
        let tuning = NavigationTuning {
            max_search_cost: 10.0,
            ..NavigationTuning::default()
        };

        let path = Pathfinder::new(tuning)
            .find_path(&terrain, center(0, 0), center(99, 0))
            .expect("partial path");
        assert_eq!(path.len(), 10);
        assert_eq!(path.last().copied(), Some(center(10, 0)));
    }

    #[test]
    fn plan_reports_cells_when_unreachable() {
        let mut cells = vec![TerrainKind::Open; 3];
        paint(&mut cells, 3, &[(1, 0)], TerrainKind::Blocked);
        let terrain = TerrainView::new(&cells, grid(3, 1));

        let error = Pathfinder::default()
            .plan(&terrain, center(0, 0), center(2, 0))
            .expect_err("wall splits the corridor");
        assert_eq!(
            error,
            TacticsError::NoPathFound {
                from: CellCoord::new(0, 0),
                to: CellCoord::new(2, 0),
            }
        );
    }

    #[test]
    fn ring_search_prefers_row_major_order() {
        let mut cells = vec![TerrainKind::Open; 9];
        paint(&mut cells, 3, &[(1, 1), (0, 0)], TerrainKind::Blocked);
        let terrain = TerrainView::new(&cells, grid(3, 3));

        assert_eq!(
            nearest_walkable(&terrain, CellCoord::new(1, 1), 5),
            Some(CellCoord::new(1, 0))
        );
    }
}
