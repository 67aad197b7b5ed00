//! Tile grid geometry and read-only terrain access.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Index within the tile grid measured in whole tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileCoord(u32);

impl TileCoord {
    /// Creates a new tile coordinate wrapper.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the underlying tile index.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Reports whether the two cells touch, including diagonally.
    #[must_use]
    pub fn is_adjacent_to(self, other: CellCoord) -> bool {
        let columns = self.column.abs_diff(other.column);
        let rows = self.row.abs_diff(other.row);
        columns <= 1 && rows <= 1 && columns + rows > 0
    }
}

/// Describes the discrete tile layout of the battlefield.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileGrid {
    columns: TileCoord,
    rows: TileCoord,
    tile_length: f32,
}

impl TileGrid {
    /// Creates a new tile grid description.
    #[must_use]
    pub const fn new(columns: TileCoord, rows: TileCoord, tile_length: f32) -> Self {
        Self {
            columns,
            rows,
            tile_length,
        }
    }

    /// Number of columns contained in the grid.
    #[must_use]
    pub const fn columns(&self) -> TileCoord {
        self.columns
    }

    /// Number of rows contained in the grid.
    #[must_use]
    pub const fn rows(&self) -> TileCoord {
        self.rows
    }

    /// Side length of a single square tile expressed in world units.
    #[must_use]
    pub const fn tile_length(&self) -> f32 {
        self.tile_length
    }

    /// Total width of the grid measured in world units.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.columns.get() as f32 * self.tile_length
    }

    /// Total height of the grid measured in world units.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.rows.get() as f32 * self.tile_length
    }

    /// Number of cells covered by the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        let count = u64::from(self.columns.get()) * u64::from(self.rows.get());
        usize::try_from(count).unwrap_or(0)
    }
}

/// Terrain categories that influence walkability and traversal cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainKind {
    /// Ordinary ground.
    #[default]
    Open,
    /// Ground that doubles the cost of entering it.
    Slow,
    /// Ground no unit can enter.
    Blocked,
}

impl TerrainKind {
    /// Multiplier applied to edges entering a tile of this kind.
    ///
    /// Returns `None` for terrain that cannot be entered at all.
    #[must_use]
    pub const fn cost_factor(self) -> Option<f32> {
        match self {
            Self::Open => Some(1.0),
            Self::Slow => Some(2.0),
            Self::Blocked => None,
        }
    }

    /// Reports whether units may stand on this terrain.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        !matches!(self, Self::Blocked)
    }
}

/// Read-only view into the dense terrain grid.
#[derive(Clone, Copy, Debug)]
pub struct TerrainView<'a> {
    cells: &'a [TerrainKind],
    grid: TileGrid,
}

impl<'a> TerrainView<'a> {
    /// Captures a new terrain view backed by the provided row-major cells.
    #[must_use]
    pub fn new(cells: &'a [TerrainKind], grid: TileGrid) -> Self {
        Self { cells, grid }
    }

    /// Grid geometry backing the view.
    #[must_use]
    pub const fn grid(&self) -> TileGrid {
        self.grid
    }

    /// Terrain stored for the provided cell, if it lies within the grid.
    #[must_use]
    pub fn kind(&self, cell: CellCoord) -> Option<TerrainKind> {
        self.index(cell)
            .and_then(|index| self.cells.get(index).copied())
    }

    /// Reports whether the cell exists and can be entered.
    #[must_use]
    pub fn is_walkable(&self, cell: CellCoord) -> bool {
        self.kind(cell).map_or(false, TerrainKind::is_walkable)
    }

    /// Converts a world position into the cell containing it.
    #[must_use]
    pub fn cell_at(&self, position: Vec2) -> Option<CellCoord> {
        let tile = self.grid.tile_length();
        if !position.is_finite() || tile <= 0.0 || position.x < 0.0 || position.y < 0.0 {
            return None;
        }

        let column = (position.x / tile).floor();
        let row = (position.y / tile).floor();
        if column >= self.grid.columns().get() as f32 || row >= self.grid.rows().get() as f32 {
            return None;
        }

        Some(CellCoord::new(column as u32, row as u32))
    }

    /// Reports whether the position lies on walkable terrain.
    #[must_use]
    pub fn is_walkable_at(&self, position: Vec2) -> bool {
        self.cell_at(position)
            .map_or(false, |cell| self.is_walkable(cell))
    }

    /// World position at the center of the provided cell.
    #[must_use]
    pub fn cell_center(&self, cell: CellCoord) -> Vec2 {
        let tile = self.grid.tile_length();
        Vec2::new(
            (cell.column() as f32 + 0.5) * tile,
            (cell.row() as f32 + 0.5) * tile,
        )
    }

    /// Clamps a position so it stays at least `margin` away from the map edges.
    #[must_use]
    pub fn clamp_inside(&self, position: Vec2, margin: f32) -> Vec2 {
        Vec2::new(
            clamp_axis(position.x, self.grid.width(), margin),
            clamp_axis(position.y, self.grid.height(), margin),
        )
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if cell.column() < self.grid.columns().get() && cell.row() < self.grid.rows().get() {
            let row = usize::try_from(cell.row()).ok()?;
            let column = usize::try_from(cell.column()).ok()?;
            let width = usize::try_from(self.grid.columns().get()).ok()?;
            row.checked_mul(width)?.checked_add(column)
        } else {
            None
        }
    }
}

fn clamp_axis(value: f32, extent: f32, margin: f32) -> f32 {
    if extent <= margin * 2.0 {
        return extent * 0.5;
    }
    value.clamp(margin, extent - margin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(columns: u32, rows: u32) -> TileGrid {
        TileGrid::new(TileCoord::new(columns), TileCoord::new(rows), 32.0)
    }

    #[test]
    fn cell_at_floors_positions() {
        let cells = vec![TerrainKind::Open; 12];
        let view = TerrainView::new(&cells, grid(4, 3));

        assert_eq!(view.cell_at(Vec2::new(0.0, 0.0)), Some(CellCoord::new(0, 0)));
        assert_eq!(view.cell_at(Vec2::new(63.9, 32.0)), Some(CellCoord::new(1, 1)));
        assert_eq!(view.cell_at(Vec2::new(128.0, 0.0)), None);
        assert_eq!(view.cell_at(Vec2::new(-0.1, 5.0)), None);
    }

    #[test]
    fn blocked_and_missing_cells_are_not_walkable() {
        let mut cells = vec![TerrainKind::Open; 4];
        cells[3] = TerrainKind::Blocked;
        let view = TerrainView::new(&cells, grid(2, 2));

        assert!(view.is_walkable(CellCoord::new(0, 1)));
        assert!(!view.is_walkable(CellCoord::new(1, 1)));
        assert!(!view.is_walkable(CellCoord::new(2, 0)));
    }

    #[test]
    fn clamp_inside_respects_margin() {
        let cells = vec![TerrainKind::Open; 100];
        let view = TerrainView::new(&cells, grid(10, 10));

        let clamped = view.clamp_inside(Vec2::new(-50.0, 400.0), 32.0);
        assert_eq!(clamped, Vec2::new(32.0, 288.0));
    }

    #[test]
    fn adjacency_includes_diagonals_only_once_removed() {
        let origin = CellCoord::new(3, 3);
        assert!(origin.is_adjacent_to(CellCoord::new(4, 4)));
        assert!(origin.is_adjacent_to(CellCoord::new(3, 2)));
        assert!(!origin.is_adjacent_to(origin));
        assert!(!origin.is_adjacent_to(CellCoord::new(5, 3)));
    }
}
