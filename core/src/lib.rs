#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Skirmish tactical engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and pure systems. Adapters submit [`Command`] values
//! describing desired mutations, the world executes those commands via its
//! `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to. Systems consume immutable views such as [`UnitView`] and
//! [`TerrainView`] and respond exclusively with new command batches or
//! [`UnitIntent`] records.

mod terrain;

use std::time::Duration;

use glam::Vec2;
use serde::{Deserialize, Serialize};

pub use terrain::{CellCoord, TerrainKind, TerrainView, TileCoord, TileGrid};

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Replaces the battlefield with an empty, open grid of the provided size.
    ConfigureBattlefield {
        /// Number of tile columns laid out in the grid.
        columns: TileCoord,
        /// Number of tile rows laid out in the grid.
        rows: TileCoord,
        /// Length of each square tile measured in world units.
        tile_length: f32,
    },
    /// Overwrites the terrain stored for a single cell.
    PaintTerrain {
        /// Cell receiving the new terrain.
        cell: CellCoord,
        /// Terrain to store for the cell.
        kind: TerrainKind,
    },
    /// Introduces a new unit onto the battlefield.
    SpawnUnit {
        /// Team that controls the unit.
        team: TeamId,
        /// Broad class of the unit.
        category: UnitCategory,
        /// World position the unit appears at.
        position: Vec2,
        /// Combat and movement statistics assigned to the unit.
        stats: UnitStats,
    },
    /// Adds money to a team's treasury.
    FundTeam {
        /// Team receiving the funds.
        team: TeamId,
        /// Amount credited.
        amount: u32,
    },
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Stores the velocity a unit should travel at during the next tick.
    SteerUnit {
        /// Unit being steered.
        unit: UnitId,
        /// Desired velocity in world units per second.
        velocity: Vec2,
    },
    /// Replaces the attack target a unit is tracking.
    SetTarget {
        /// Unit whose target changes.
        unit: UnitId,
        /// New target, or `None` to stop attacking.
        target: Option<UnitId>,
    },
    /// Requests that the attacker strike the target once.
    ResolveAttack {
        /// Unit delivering the attack.
        attacker: UnitId,
        /// Unit receiving the attack.
        target: UnitId,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms that a cell's terrain changed.
    TerrainPainted {
        /// Cell that changed.
        cell: CellCoord,
        /// Terrain now stored for the cell.
        kind: TerrainKind,
    },
    /// Confirms that a unit entered the battlefield.
    UnitSpawned {
        /// Identifier assigned to the unit by the world.
        unit: UnitId,
        /// Team that controls the unit.
        team: TeamId,
        /// Broad class of the unit.
        category: UnitCategory,
        /// Position the unit occupies after spawning.
        position: Vec2,
    },
    /// Reports a team's treasury after it changed.
    TreasuryChanged {
        /// Team whose treasury changed.
        team: TeamId,
        /// Balance after the change.
        balance: u32,
    },
    /// Confirms that an attack landed.
    AttackResolved {
        /// Unit that delivered the attack.
        attacker: UnitId,
        /// Unit that received the attack.
        target: UnitId,
        /// Health removed by the attack.
        damage: u32,
        /// Health the target retains afterwards.
        remaining: u32,
    },
    /// Reports that an attack request failed the strike gate.
    AttackRejected {
        /// Unit that attempted the attack.
        attacker: UnitId,
        /// Unit the attack was aimed at.
        target: UnitId,
        /// Specific reason the attack failed.
        reason: AttackRejection,
    },
    /// Announces that a unit's health reached zero and it left the battlefield.
    UnitDied(UnitDeath),
}

/// Unique identifier assigned to a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(u32);

impl UnitId {
    /// Creates a new unit identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of the side a unit fights for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(u8);

impl TeamId {
    /// Creates a new team identifier.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u8 {
        self.0
    }
}

/// Broad unit classes recognised by the tactical engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCategory {
    /// Close-quarters ground unit.
    Melee,
    /// Ground unit that fires from a distance.
    Ranged,
    /// Flying siege unit.
    Aerial,
    /// Immobile building such as a home base.
    Structure,
}

impl UnitCategory {
    /// Points contributed to force estimates.
    #[must_use]
    pub const fn force_weight(self) -> u32 {
        match self {
            Self::Melee => 3,
            Self::Ranged => 5,
            Self::Aerial => 8,
            Self::Structure => 0,
        }
    }

    /// Base score used when ranking threats to an ally.
    #[must_use]
    pub const fn threat_score(self) -> f32 {
        match self {
            Self::Aerial => 150.0,
            Self::Ranged => 100.0,
            Self::Melee => 80.0,
            Self::Structure => 0.0,
        }
    }

    /// Rank used for opportunistic targeting; lower ranks are attacked first.
    #[must_use]
    pub const fn target_rank(self) -> u8 {
        match self {
            Self::Aerial => 0,
            Self::Ranged => 1,
            Self::Melee => 2,
            Self::Structure => 3,
        }
    }

    /// Reports whether units of this category can move.
    #[must_use]
    pub const fn is_mobile(self) -> bool {
        !matches!(self, Self::Structure)
    }
}

/// Attack parameters of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttackProfile {
    /// Health removed by a single successful attack.
    pub damage: u32,
    /// Maximum distance, in world units, at which an attack may land.
    pub range: f32,
    /// Attacks per second; the cooldown between attacks is its inverse.
    pub attack_speed: f32,
}

impl AttackProfile {
    /// Minimum time between two attacks, or `None` when the unit never attacks.
    #[must_use]
    pub fn cooldown(&self) -> Option<Duration> {
        if !(self.attack_speed.is_finite() && self.attack_speed > 0.0) {
            return None;
        }
        Duration::try_from_secs_f32(1.0 / self.attack_speed).ok()
    }

    /// Reports whether enough time elapsed since the previous attack.
    #[must_use]
    pub fn is_ready(&self, since_last_attack: Duration) -> bool {
        self.cooldown()
            .map_or(false, |cooldown| since_last_attack >= cooldown)
    }
}

/// Checks the cooldown and range conditions that every attack must satisfy.
///
/// Both the combat system and the world run the same gate so an attack that
/// the system proposes is judged identically when the world applies it.
pub fn strike_gate(
    attack: &AttackProfile,
    since_last_attack: Duration,
    distance: f32,
) -> Result<(), AttackRejection> {
    if !attack.is_ready(since_last_attack) {
        return Err(AttackRejection::CoolingDown);
    }
    if distance > attack.range {
        return Err(AttackRejection::OutOfRange);
    }
    Ok(())
}

/// Current and maximum health of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    current: u32,
    max: u32,
}

impl Health {
    /// Creates a health record.
    #[must_use]
    pub const fn new(current: u32, max: u32) -> Self {
        Self { current, max }
    }

    /// Creates a health record at full strength.
    #[must_use]
    pub const fn full(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Health remaining.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.current
    }

    /// Health at full strength.
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Remaining health as a fraction of the maximum.
    #[must_use]
    pub fn ratio(&self) -> f32 {
        (self.current as f32 / self.max.max(1) as f32).clamp(0.0, 1.0)
    }

    /// Reports whether any health remains.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.current > 0
    }

    /// Returns the record after removing `amount`, clamped at zero.
    #[must_use]
    pub const fn after_damage(self, amount: u32) -> Self {
        Self {
            current: self.current.saturating_sub(amount),
            max: self.max,
        }
    }
}

/// Statistics assigned to a unit when it spawns.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Health at full strength.
    pub max_health: u32,
    /// Attack parameters.
    pub attack: AttackProfile,
    /// Travel speed in world units per second.
    pub speed: f32,
    /// Radius within which the unit perceives other units.
    pub vision: f32,
    /// Money granted to the killing team when the unit dies.
    pub refund: u32,
}

impl UnitStats {
    /// Default statistics for a category on a grid with the provided tile length.
    #[must_use]
    pub fn for_category(category: UnitCategory, tile_length: f32) -> Self {
        let vision = 5.0 * tile_length;
        match category {
            UnitCategory::Melee => Self {
                max_health: 100,
                attack: AttackProfile {
                    damage: 15,
                    range: tile_length,
                    attack_speed: 1.0,
                },
                speed: 60.0,
                vision,
                refund: 350,
            },
            UnitCategory::Ranged => Self {
                max_health: 90,
                attack: AttackProfile {
                    damage: 20,
                    range: 3.0 * tile_length,
                    attack_speed: 0.5,
                },
                speed: 50.0,
                vision,
                refund: 425,
            },
            UnitCategory::Aerial => Self {
                max_health: 700,
                attack: AttackProfile {
                    damage: 40,
                    range: 5.0 * tile_length,
                    attack_speed: 0.2,
                },
                speed: 40.0,
                vision,
                refund: 820,
            },
            UnitCategory::Structure => Self {
                max_health: 1000,
                attack: AttackProfile {
                    damage: 0,
                    range: 0.0,
                    attack_speed: 0.0,
                },
                speed: 0.0,
                vision,
                refund: 0,
            },
        }
    }
}

/// Immutable representation of a single unit's state used for queries.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitSnapshot {
    /// Unique identifier assigned to the unit.
    pub id: UnitId,
    /// Team that controls the unit.
    pub team: TeamId,
    /// Broad class of the unit.
    pub category: UnitCategory,
    /// Current world position.
    pub position: Vec2,
    /// Velocity applied during the most recent tick.
    pub velocity: Vec2,
    /// Current and maximum health.
    pub health: Health,
    /// Attack parameters.
    pub attack: AttackProfile,
    /// Travel speed in world units per second.
    pub speed: f32,
    /// Radius within which the unit perceives other units.
    pub vision: f32,
    /// Money granted to the killing team when the unit dies.
    pub refund: u32,
    /// Time elapsed since the unit last attacked.
    pub since_last_attack: Duration,
    /// Unit currently being attacked, if any.
    pub target: Option<UnitId>,
}

impl UnitSnapshot {
    /// Reports whether the unit has health remaining.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// Reports whether the other unit fights for a different team.
    #[must_use]
    pub fn is_enemy_of(&self, other: &UnitSnapshot) -> bool {
        self.team != other.team
    }

    /// Euclidean distance to the other unit.
    #[must_use]
    pub fn distance_to(&self, other: &UnitSnapshot) -> f32 {
        self.position.distance(other.position)
    }
}

/// Read-only snapshot describing every unit on the battlefield.
#[derive(Clone, Debug, Default)]
pub struct UnitView {
    snapshots: Vec<UnitSnapshot>,
}

impl UnitView {
    /// Creates a new unit view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<UnitSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured unit snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitSnapshot> {
        self.snapshots.iter()
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<UnitSnapshot> {
        self.snapshots
    }

    /// Number of captured units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether the view holds no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Looks up a unit by identifier.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&UnitSnapshot> {
        self.snapshots
            .binary_search_by_key(&id, |snapshot| snapshot.id)
            .ok()
            .and_then(|index| self.snapshots.get(index))
    }

    /// Looks up a unit that must still be alive.
    pub fn require(&self, id: UnitId) -> Result<&UnitSnapshot, TacticsError> {
        self.get(id)
            .filter(|snapshot| snapshot.is_alive())
            .ok_or(TacticsError::StaleReference { unit: id })
    }

    /// Home base of the team: its lowest-id living structure.
    #[must_use]
    pub fn home_base(&self, team: TeamId) -> Option<&UnitSnapshot> {
        self.iter().find(|snapshot| {
            snapshot.team == team
                && snapshot.category == UnitCategory::Structure
                && snapshot.is_alive()
        })
    }

    /// Base the team attacks: the lowest-id living structure of any other team.
    #[must_use]
    pub fn enemy_base(&self, team: TeamId) -> Option<&UnitSnapshot> {
        self.iter().find(|snapshot| {
            snapshot.team != team
                && snapshot.category == UnitCategory::Structure
                && snapshot.is_alive()
        })
    }

    /// Living mobile units that fight against the provided team.
    pub fn mobile_enemies_of(&self, team: TeamId) -> impl Iterator<Item = &UnitSnapshot> {
        self.iter().filter(move |snapshot| {
            snapshot.team != team && snapshot.category.is_mobile() && snapshot.is_alive()
        })
    }

    /// Living mobile units that fight for the provided team.
    pub fn mobile_allies_of(&self, team: TeamId) -> impl Iterator<Item = &UnitSnapshot> {
        self.iter().filter(move |snapshot| {
            snapshot.team == team && snapshot.category.is_mobile() && snapshot.is_alive()
        })
    }
}

/// Explicit per-tick context handed to resolvers instead of global counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickContext {
    tick: u64,
    dt: Duration,
}

impl TickContext {
    /// Creates the context for the provided tick.
    #[must_use]
    pub const fn new(tick: u64, dt: Duration) -> Self {
        Self { tick, dt }
    }

    /// Monotonic index of the tick being processed.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated time covered by the tick.
    #[must_use]
    pub const fn dt(&self) -> Duration {
        self.dt
    }
}

/// Behaviors the decision waterfall can select for a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Behavior {
    /// Keeps walking a multi-tile path already in progress.
    FollowPath,
    /// Leaves everything to intercept enemies threatening the home base.
    InterceptBaseThreat,
    /// Focuses the most damaging threat class in the area.
    HuntPriorityThreat,
    /// Stays next to a melee ally that is fighting.
    HoldWithAlly,
    /// Keeps formation behind the reserved melee ally.
    SupportAlly,
    /// Holds a perimeter around the home base.
    DefendBase,
    /// Surrounds a focal enemy together with nearby allies.
    GroupAssault,
    /// Approaches and fights the nearest enemy.
    EngageNearest,
    /// Probes toward the enemy base when no enemy units remain.
    AdvanceOnEnemyBase,
    /// Falls back toward the home base when outnumbered.
    Retreat,
    /// Stands still.
    Hold,
}

/// Movement and attack instruction produced for one unit in one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitIntent {
    /// Unit the intent applies to.
    pub unit: UnitId,
    /// Behavior that produced the intent.
    pub behavior: Behavior,
    /// Desired velocity in world units per second.
    pub velocity: Vec2,
    /// Unit to attack this tick, if any.
    pub attack: Option<UnitId>,
}

/// Payload of the death signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnitDeath {
    /// Unit that died.
    pub unit: UnitId,
    /// Team the unit fought for.
    pub team: TeamId,
    /// Team of the unit that delivered the killing blow.
    pub killer_team: TeamId,
    /// Money refunded to the killing team.
    pub refund: u32,
}

/// Reasons an attack request may be rejected by the strike gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackRejection {
    /// The attacker no longer exists.
    MissingAttacker,
    /// The target no longer exists or is already dead.
    MissingTarget,
    /// The target fights for the attacker's team.
    FriendlyTarget,
    /// Not enough time elapsed since the attacker's previous attack.
    CoolingDown,
    /// The target lies beyond the attacker's range.
    OutOfRange,
}

/// Recoverable failures raised while deciding what a unit does.
///
/// None of these abort a tick: the decision waterfall falls through to the
/// next branch and steering holds position for the tick.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum TacticsError {
    /// The pathfinder exhausted its search without reaching the goal.
    #[error("no path from cell {from:?} to cell {to:?}")]
    NoPathFound {
        /// Cell the search started from.
        from: CellCoord,
        /// Cell the search aimed for.
        to: CellCoord,
    },
    /// A referenced unit is dead or missing.
    #[error("unit {unit:?} is dead or missing")]
    StaleReference {
        /// Identifier that no longer resolves.
        unit: UnitId,
    },
    /// A branch found nothing to act upon.
    #[error("{branch:?} found no candidate")]
    NoCandidate {
        /// Branch that came up empty.
        branch: Behavior,
    },
    /// A direction was requested between two coincident points.
    #[error("direction between coincident points")]
    DegenerateGeometry,
}

/// Unit vector pointing from `from` toward `to`.
pub fn direction_between(from: Vec2, to: Vec2) -> Result<Vec2, TacticsError> {
    (to - from)
        .try_normalize()
        .ok_or(TacticsError::DegenerateGeometry)
}
