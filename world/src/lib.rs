#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative battlefield state for Skirmish.
//!
//! The world owns terrain, units, and team treasuries. It changes only when
//! [`apply`] executes a [`Command`], and it reports every change through
//! [`Event`] values. Systems observe it exclusively through [`query`].

use std::{collections::BTreeMap, time::Duration};

use glam::Vec2;
use skirmish_core::{
    strike_gate, AttackProfile, AttackRejection, CellCoord, Command, Event, Health, TeamId,
    TerrainKind, TerrainView, TileCoord, TileGrid, UnitCategory, UnitDeath, UnitId, UnitStats,
};
use tracing::{debug, info, warn};

const DEFAULT_GRID_COLUMNS: TileCoord = TileCoord::new(24);
const DEFAULT_GRID_ROWS: TileCoord = TileCoord::new(24);
const DEFAULT_TILE_LENGTH: f32 = 32.0;

/// Represents the authoritative battlefield state.
#[derive(Debug)]
pub struct World {
    tile_grid: TileGrid,
    terrain: TerrainGrid,
    units: Vec<Unit>,
    next_unit_id: u32,
    treasuries: BTreeMap<TeamId, u32>,
    tick_index: u64,
}

impl World {
    /// Creates an empty battlefield using the default 24 by 24 grid.
    #[must_use]
    pub fn new() -> Self {
        let tile_grid = TileGrid::new(DEFAULT_GRID_COLUMNS, DEFAULT_GRID_ROWS, DEFAULT_TILE_LENGTH);
        Self {
            terrain: TerrainGrid::new(&tile_grid),
            tile_grid,
            units: Vec::new(),
            next_unit_id: 0,
            treasuries: BTreeMap::new(),
            tick_index: 0,
        }
    }

    fn unit_index(&self, unit: UnitId) -> Option<usize> {
        self.units
            .binary_search_by_key(&unit, |candidate| candidate.id)
            .ok()
    }

    fn unit_mut(&mut self, unit: UnitId) -> Option<&mut Unit> {
        let index = self.unit_index(unit)?;
        self.units.get_mut(index)
    }

    fn terrain_view(&self) -> TerrainView<'_> {
        TerrainView::new(&self.terrain.cells, self.tile_grid)
    }

    fn spawn(
        &mut self,
        team: TeamId,
        category: UnitCategory,
        position: Vec2,
        stats: UnitStats,
        out_events: &mut Vec<Event>,
    ) {
        if !self.terrain_view().is_walkable_at(position) {
            warn!(
                team = team.get(),
                ?category,
                x = position.x,
                y = position.y,
                "spawn position is not walkable"
            );
            return;
        }

        let id = UnitId::new(self.next_unit_id);
        self.next_unit_id = self.next_unit_id.saturating_add(1);
        self.units.push(Unit::from_stats(id, team, category, position, stats));
        out_events.push(Event::UnitSpawned {
            unit: id,
            team,
            category,
            position,
        });
    }

    fn advance(&mut self, dt: Duration) {
        let dt_secs = dt.as_secs_f32();
        let terrain = TerrainView::new(&self.terrain.cells, self.tile_grid);
        for unit in self.units.iter_mut() {
            unit.since_last_attack = unit.since_last_attack.saturating_add(dt);
            unit.integrate(dt_secs, &terrain);
        }
    }

    fn resolve_attack(&mut self, attacker: UnitId, target: UnitId, out_events: &mut Vec<Event>) {
        let verdict = self.check_attack(attacker, target);
        let (attacker_index, target_index) = match verdict {
            Ok(indices) => indices,
            Err(reason) => {
                debug!(
                    attacker = attacker.get(),
                    target = target.get(),
                    ?reason,
                    "attack rejected"
                );
                out_events.push(Event::AttackRejected {
                    attacker,
                    target,
                    reason,
                });
                return;
            }
        };

        let (damage, killer_team) = {
            let striker = &mut self.units[attacker_index];
            striker.since_last_attack = Duration::ZERO;
            (striker.attack.damage, striker.team)
        };

        let victim = &mut self.units[target_index];
        victim.health = victim.health.after_damage(damage);
        let remaining = victim.health.current();
        out_events.push(Event::AttackResolved {
            attacker,
            target,
            damage,
            remaining,
        });

        if remaining == 0 {
            self.kill(target_index, killer_team, out_events);
        }
    }

    fn check_attack(
        &self,
        attacker: UnitId,
        target: UnitId,
    ) -> Result<(usize, usize), AttackRejection> {
        let attacker_index = self
            .unit_index(attacker)
            .ok_or(AttackRejection::MissingAttacker)?;
        let target_index = self
            .unit_index(target)
            .ok_or(AttackRejection::MissingTarget)?;
        let striker = &self.units[attacker_index];
        let victim = &self.units[target_index];

        if !striker.health.is_alive() {
            return Err(AttackRejection::MissingAttacker);
        }
        if !victim.health.is_alive() {
            return Err(AttackRejection::MissingTarget);
        }
        if striker.team == victim.team {
            return Err(AttackRejection::FriendlyTarget);
        }

        let distance = striker.position.distance(victim.position);
        strike_gate(&striker.attack, striker.since_last_attack, distance)?;
        Ok((attacker_index, target_index))
    }

    fn kill(&mut self, index: usize, killer_team: TeamId, out_events: &mut Vec<Event>) {
        let fallen = self.units.remove(index);
        for unit in self.units.iter_mut() {
            if unit.target == Some(fallen.id) {
                unit.target = None;
            }
        }

        let death = UnitDeath {
            unit: fallen.id,
            team: fallen.team,
            killer_team,
            refund: fallen.refund,
        };
        info!(
            unit = fallen.id.get(),
            team = fallen.team.get(),
            killer_team = killer_team.get(),
            refund = fallen.refund,
            "unit died"
        );
        out_events.push(Event::UnitDied(death));

        if fallen.refund > 0 {
            let balance = self.credit(killer_team, fallen.refund);
            out_events.push(Event::TreasuryChanged {
                team: killer_team,
                balance,
            });
        }
    }

    fn credit(&mut self, team: TeamId, amount: u32) -> u32 {
        let balance = self.treasuries.entry(team).or_insert(0);
        *balance = balance.saturating_add(amount);
        *balance
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::ConfigureBattlefield {
            columns,
            rows,
            tile_length,
        } => {
            world.tile_grid = TileGrid::new(columns, rows, tile_length);
            world.terrain = TerrainGrid::new(&world.tile_grid);
            world.units.clear();
            world.treasuries.clear();
        }
        Command::PaintTerrain { cell, kind } => {
            let columns = world.tile_grid.columns().get();
            if world.terrain.paint(columns, cell, kind) {
                out_events.push(Event::TerrainPainted { cell, kind });
            }
        }
        Command::SpawnUnit {
            team,
            category,
            position,
            stats,
        } => world.spawn(team, category, position, stats, out_events),
        Command::FundTeam { team, amount } => {
            let balance = world.credit(team, amount);
            out_events.push(Event::TreasuryChanged { team, balance });
        }
        Command::Tick { dt } => {
            world.tick_index = world.tick_index.saturating_add(1);
            world.advance(dt);
            out_events.push(Event::TimeAdvanced { dt });
        }
        Command::SteerUnit { unit, velocity } => {
            if let Some(steered) = world.unit_mut(unit) {
                steered.steer(velocity);
            }
        }
        Command::SetTarget { unit, target } => {
            if let Some(aiming) = world.unit_mut(unit) {
                aiming.target = target;
            }
        }
        Command::ResolveAttack { attacker, target } => {
            world.resolve_attack(attacker, target, out_events);
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::collections::BTreeSet;

    use super::World;
    use skirmish_core::{TeamId, TerrainView, TileGrid, UnitSnapshot, UnitView};

    /// Provides the world's tile grid definition.
    #[must_use]
    pub fn tile_grid(world: &World) -> TileGrid {
        world.tile_grid
    }

    /// Exposes a read-only view of the terrain grid.
    #[must_use]
    pub fn terrain_view(world: &World) -> TerrainView<'_> {
        world.terrain_view()
    }

    /// Captures a read-only view of every unit on the battlefield.
    #[must_use]
    pub fn unit_view(world: &World) -> UnitView {
        UnitView::from_snapshots(
            world
                .units
                .iter()
                .map(|unit| UnitSnapshot {
                    id: unit.id,
                    team: unit.team,
                    category: unit.category,
                    position: unit.position,
                    velocity: unit.velocity,
                    health: unit.health,
                    attack: unit.attack,
                    speed: unit.speed,
                    vision: unit.vision,
                    refund: unit.refund,
                    since_last_attack: unit.since_last_attack,
                    target: unit.target,
                })
                .collect(),
        )
    }

    /// Money currently held by the team.
    #[must_use]
    pub fn treasury(world: &World, team: TeamId) -> u32 {
        world.treasuries.get(&team).copied().unwrap_or(0)
    }

    /// Teams that still field at least one unit, in ascending order.
    #[must_use]
    pub fn teams(world: &World) -> Vec<TeamId> {
        world
            .units
            .iter()
            .map(|unit| unit.team)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of ticks processed since the world was created.
    #[must_use]
    pub fn tick_index(world: &World) -> u64 {
        world.tick_index
    }
}

#[derive(Clone, Debug)]
struct Unit {
    id: UnitId,
    team: TeamId,
    category: UnitCategory,
    position: Vec2,
    velocity: Vec2,
    health: Health,
    attack: AttackProfile,
    speed: f32,
    vision: f32,
    refund: u32,
    since_last_attack: Duration,
    target: Option<UnitId>,
}

impl Unit {
    fn from_stats(
        id: UnitId,
        team: TeamId,
        category: UnitCategory,
        position: Vec2,
        stats: UnitStats,
    ) -> Self {
        Self {
            id,
            team,
            category,
            position,
            velocity: Vec2::ZERO,
            health: Health::full(stats.max_health),
            attack: stats.attack,
            speed: stats.speed,
            vision: stats.vision,
            refund: stats.refund,
            since_last_attack: stats.attack.cooldown().unwrap_or(Duration::ZERO),
            target: None,
        }
    }

    fn steer(&mut self, velocity: Vec2) {
        self.velocity = if self.category.is_mobile() && velocity.is_finite() {
            velocity.clamp_length_max(self.speed.max(0.0))
        } else {
            Vec2::ZERO
        };
    }

    fn integrate(&mut self, dt_secs: f32, terrain: &TerrainView<'_>) {
        if self.velocity == Vec2::ZERO {
            return;
        }

        let step = self.velocity * dt_secs;
        let candidates = [
            self.position + step,
            self.position + Vec2::new(step.x, 0.0),
            self.position + Vec2::new(0.0, step.y),
        ];
        if let Some(next) = candidates
            .into_iter()
            .find(|candidate| terrain.is_walkable_at(*candidate))
        {
            self.position = next;
        }
    }
}

#[derive(Clone, Debug)]
struct TerrainGrid {
    cells: Vec<TerrainKind>,
}

impl TerrainGrid {
    fn new(grid: &TileGrid) -> Self {
        Self {
            cells: vec![TerrainKind::Open; grid.cell_count()],
        }
    }

    fn paint(&mut self, columns: u32, cell: CellCoord, kind: TerrainKind) -> bool {
        if cell.column() >= columns {
            return false;
        }
        let Some(index) = index(columns, cell) else {
            return false;
        };
        match self.cells.get_mut(index) {
            Some(slot) => {
                *slot = kind;
                true
            }
            None => false,
        }
    }
}

fn index(columns: u32, cell: CellCoord) -> Option<usize> {
    let width = usize::try_from(columns).ok()?;
    let row = usize::try_from(cell.row()).ok()?;
    let column = usize::try_from(cell.column()).ok()?;
    row.checked_mul(width)?.checked_add(column)
}
