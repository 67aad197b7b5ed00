//! TOML description of a battle and the commands that set it up.

use std::{fs, path::Path};

use anyhow::{ensure, Context, Result};
use glam::Vec2;
use serde::Deserialize;
use skirmish_core::{
    CellCoord, Command, TeamId, TerrainKind, TileCoord, UnitCategory, UnitStats,
};
use skirmish_engine::EngineTuning;

/// Battle loaded from disk or the built-in default.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Scenario {
    /// Grid dimensions.
    pub(crate) battlefield: Battlefield,
    /// Rectangles of terrain painted after the grid is configured.
    pub(crate) terrain: Vec<TerrainStroke>,
    /// Money granted to teams before the first tick.
    pub(crate) treasury: Vec<Funding>,
    /// Units spawned before the first tick, in order.
    pub(crate) units: Vec<Placement>,
    /// Overrides for the engine tuning.
    pub(crate) tuning: EngineTuning,
}

/// Size of the tile grid.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Battlefield {
    pub(crate) columns: u32,
    pub(crate) rows: u32,
    pub(crate) tile_length: f32,
}

impl Default for Battlefield {
    fn default() -> Self {
        Self {
            columns: 24,
            rows: 24,
            tile_length: 32.0,
        }
    }
}

/// Inclusive rectangle of cells sharing one terrain kind.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TerrainStroke {
    pub(crate) kind: TerrainKind,
    pub(crate) from: [u32; 2],
    pub(crate) to: [u32; 2],
}

impl TerrainStroke {
    fn cells(&self) -> impl Iterator<Item = CellCoord> {
        let columns = self.from[0].min(self.to[0])..=self.from[0].max(self.to[0]);
        let rows = self.from[1].min(self.to[1])..=self.from[1].max(self.to[1]);
        rows.flat_map(move |row| columns.clone().map(move |column| CellCoord::new(column, row)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Funding {
    pub(crate) team: u8,
    pub(crate) amount: u32,
}

/// Single unit dropped onto the battlefield with its category preset.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Placement {
    pub(crate) team: u8,
    pub(crate) category: UnitCategory,
    pub(crate) position: [f32; 2],
}

impl Scenario {
    /// Reads and validates a scenario file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid scenario {}", path.display()))
    }

    /// Parses and validates scenario text.
    pub(crate) fn parse(text: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(text).context("malformed scenario TOML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Two bases with mixed squads separated by a partial wall.
    pub(crate) fn built_in() -> Self {
        let placement = |team, category, x, y| Placement {
            team,
            category,
            position: [x, y],
        };
        Self {
            battlefield: Battlefield::default(),
            terrain: vec![
                TerrainStroke {
                    kind: TerrainKind::Blocked,
                    from: [11, 4],
                    to: [12, 15],
                },
                TerrainStroke {
                    kind: TerrainKind::Slow,
                    from: [6, 16],
                    to: [17, 18],
                },
            ],
            treasury: vec![
                Funding { team: 0, amount: 600 },
                Funding { team: 1, amount: 600 },
            ],
            units: vec![
                placement(0, UnitCategory::Structure, 64.0, 64.0),
                placement(1, UnitCategory::Structure, 704.0, 704.0),
                placement(0, UnitCategory::Melee, 180.0, 220.0),
                placement(0, UnitCategory::Melee, 220.0, 200.0),
                placement(0, UnitCategory::Melee, 260.0, 180.0),
                placement(0, UnitCategory::Ranged, 150.0, 260.0),
                placement(0, UnitCategory::Ranged, 200.0, 250.0),
                placement(0, UnitCategory::Ranged, 250.0, 240.0),
                placement(1, UnitCategory::Melee, 580.0, 520.0),
                placement(1, UnitCategory::Melee, 540.0, 560.0),
                placement(1, UnitCategory::Ranged, 620.0, 540.0),
                placement(1, UnitCategory::Ranged, 560.0, 600.0),
                placement(1, UnitCategory::Aerial, 640.0, 620.0),
            ],
            tuning: EngineTuning::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        let Battlefield {
            columns,
            rows,
            tile_length,
        } = self.battlefield;
        ensure!(columns > 0 && rows > 0, "battlefield must have at least one cell");
        ensure!(
            tile_length.is_finite() && tile_length > 0.0,
            "tile length must be positive, got {tile_length}"
        );
        for stroke in &self.terrain {
            for corner in [stroke.from, stroke.to] {
                ensure!(
                    corner[0] < columns && corner[1] < rows,
                    "terrain cell {corner:?} lies outside the {columns}x{rows} grid"
                );
            }
        }
        for unit in &self.units {
            ensure!(
                unit.position.iter().all(|axis| axis.is_finite()),
                "unit position {:?} is not finite",
                unit.position
            );
        }
        Ok(())
    }

    /// Commands that build the battlefield in a freshly created world.
    pub(crate) fn commands(&self) -> Vec<Command> {
        let Battlefield {
            columns,
            rows,
            tile_length,
        } = self.battlefield;
        let mut commands = vec![Command::ConfigureBattlefield {
            columns: TileCoord::new(columns),
            rows: TileCoord::new(rows),
            tile_length,
        }];
        for stroke in &self.terrain {
            commands.extend(stroke.cells().map(|cell| Command::PaintTerrain {
                cell,
                kind: stroke.kind,
            }));
        }
        commands.extend(self.treasury.iter().map(|funding| Command::FundTeam {
            team: TeamId::new(funding.team),
            amount: funding.amount,
        }));
        commands.extend(self.units.iter().map(|unit| Command::SpawnUnit {
            team: TeamId::new(unit.team),
            category: unit.category,
            position: Vec2::from(unit.position),
            stats: UnitStats::for_category(unit.category, tile_length),
        }));
        commands
    }
}
