#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Decision engine that picks one behavior per unit per tick.
//!
//! Each mobile unit walks the same ordered waterfall of `(predicate,
//! behavior)` branches, re-evaluated from scratch every tick. The first branch
//! whose predicate holds and whose plan succeeds wins. Recoverable failures
//! fall through to the next branch, so every unit always ends up with a plan.
//! Plans are then turned into velocities by the navigator, which owns each
//! unit's route, and an attack target is chosen for the tick.

mod geometry;
mod profile;
mod waterfall;

use std::collections::BTreeMap;

use glam::Vec2;
use serde::Deserialize;
use skirmish_core::{
    direction_between, Behavior, TerrainView, TickContext, UnitId, UnitIntent, UnitSnapshot,
    UnitView,
};
use skirmish_system_navigation::{Heading, NavigationTuning, Navigator};
use skirmish_system_perception::PerceptionSnapshot;
use skirmish_system_support::SupportResolver;
use tracing::{debug, trace};

pub use profile::{BehaviorProfile, ProfileTable, ProfileTuning};

/// Radii, bands and fractions consulted by the waterfall.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TacticsTuning {
    /// Radius around a unit inside which a mobile enemy puts it in combat.
    pub combat_radius: f32,
    /// Radius around the home base searched for enemies to intercept.
    pub base_vigilance_radius: f32,
    /// Fraction of attack range kept from an intercepted enemy.
    pub intercept_fraction: f32,
    /// Fraction of the intercept distance below which the unit backs off.
    pub intercept_backoff: f32,
    /// Radius searched for aerial enemies worth hunting.
    pub hunt_radius: f32,
    /// Fraction of attack range kept from a hunted enemy.
    pub hunt_fraction: f32,
    /// Fraction of attack range below which a hunter backs off.
    pub hunt_backoff: f32,
    /// Radius searched for an in-combat melee ally to stay with.
    pub ally_scan_radius: f32,
    /// Radius around the ally searched for the threat to fight.
    pub threat_radius: f32,
    /// Multiple of attack range inside which threats to the ally are preferred.
    pub preferred_threat_range: f32,
    /// Ideal distance kept from the supported ally.
    pub support_ideal: f32,
    /// Distance below the ideal that is still accepted.
    pub support_inner_tolerance: f32,
    /// Distance above the ideal that is still accepted.
    pub support_outer_tolerance: f32,
    /// Furthest a positioning step may take the unit from its anchor.
    pub support_leash: f32,
    /// Length of a single positioning step toward or away from the enemy.
    pub positioning_step: f32,
    /// Fraction of attack range kept from the enemy while positioning.
    pub enemy_optimal_fraction: f32,
    /// Fraction of the optimal distance below which positioning backs off.
    pub enemy_backoff_fraction: f32,
    /// Radius around the home base counted for guards and threats.
    pub defend_radius: f32,
    /// Furthest a defender follows an enemy away from the base.
    pub defend_leash: f32,
    /// Cap on the engagement distance of a defender.
    pub defend_optimal_cap: f32,
    /// Radius of the perimeter held around a quiet base.
    pub perimeter_radius: f32,
    /// Tolerance of the perimeter band.
    pub perimeter_tolerance: f32,
    /// Number of other mobile allies near the base needed before a unit stops defending.
    pub min_base_guards: usize,
    /// Radius around the unit summed for allied force.
    pub ally_force_radius: f32,
    /// Radius around the unit summed for enemy force.
    pub enemy_force_radius: f32,
    /// Ally to enemy force ratio below which the unit retreats.
    pub retreat_ratio: f32,
    /// Distance from the home base a retreating unit stops at.
    pub retreat_distance: f32,
    /// Fraction of attack range kept while engaging the nearest enemy.
    pub engage_fraction: f32,
    /// Radius within which allies of the same profile join an assault.
    pub recruit_radius: f32,
    /// Per-profile constants.
    pub profiles: ProfileTable,
}

impl Default for TacticsTuning {
    fn default() -> Self {
        Self {
            combat_radius: 120.0,
            base_vigilance_radius: 250.0,
            intercept_fraction: 0.6,
            intercept_backoff: 0.7,
            hunt_radius: 600.0,
            hunt_fraction: 0.85,
            hunt_backoff: 0.5,
            ally_scan_radius: 120.0,
            threat_radius: 150.0,
            preferred_threat_range: 1.5,
            support_ideal: 60.0,
            support_inner_tolerance: 10.0,
            support_outer_tolerance: 15.0,
            support_leash: 120.0,
            positioning_step: 30.0,
            enemy_optimal_fraction: 0.85,
            enemy_backoff_fraction: 0.6,
            defend_radius: 200.0,
            defend_leash: 150.0,
            defend_optimal_cap: 120.0,
            perimeter_radius: 100.0,
            perimeter_tolerance: 30.0,
            min_base_guards: 1,
            ally_force_radius: 400.0,
            enemy_force_radius: 300.0,
            retreat_ratio: 0.5,
            retreat_distance: 96.0,
            engage_fraction: 0.6,
            recruit_radius: 500.0,
            profiles: ProfileTable::default(),
        }
    }
}

/// How a plan wants the unit to move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Movement {
    /// Stand still this tick.
    Hold,
    /// Travel toward the provided world position.
    MoveTo(Vec2),
}

/// Outcome of the waterfall for a single unit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plan {
    /// Branch that produced the plan.
    pub behavior: Behavior,
    /// Requested movement.
    pub movement: Movement,
    /// Enemy the plan revolves around, attacked first when in range.
    pub focus: Option<UnitId>,
}

impl Plan {
    /// Plan that stands still without a focus.
    #[must_use]
    pub const fn hold(behavior: Behavior) -> Self {
        Self {
            behavior,
            movement: Movement::Hold,
            focus: None,
        }
    }
}

/// Read-only inputs shared by every decision in a tick.
#[derive(Clone, Copy, Debug)]
pub struct TacticalInputs<'a> {
    /// Live unit snapshot.
    pub units: &'a UnitView,
    /// Battlefield terrain.
    pub terrain: TerrainView<'a>,
    /// Perception built earlier in the tick.
    pub perception: &'a PerceptionSnapshot,
    /// Support reservations resolved earlier in the tick.
    pub support: &'a SupportResolver,
}

/// Decision engine plus the navigator owning every unit's route.
#[derive(Debug, Default)]
pub struct Tactics {
    tuning: TacticsTuning,
    navigator: Navigator,
    commitments: BTreeMap<UnitId, Behavior>,
    decided: Vec<(UnitId, Behavior)>,
}

impl Tactics {
    /// Creates a decision engine with the provided tuning.
    #[must_use]
    pub fn new(tuning: TacticsTuning, navigation: NavigationTuning) -> Self {
        Self {
            tuning,
            navigator: Navigator::new(navigation),
            commitments: BTreeMap::new(),
            decided: Vec::new(),
        }
    }

    /// Tuning consulted by the waterfall.
    #[must_use]
    pub fn tuning(&self) -> &TacticsTuning {
        &self.tuning
    }

    /// Navigator holding each unit's route.
    #[must_use]
    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Behavior the unit committed to on the last handled tick.
    ///
    /// A tick spent following a route keeps the commitment of the branch
    /// that planned it.
    #[must_use]
    pub fn commitment(&self, unit: UnitId) -> Option<Behavior> {
        self.commitments.get(&unit).copied()
    }

    /// Runs the waterfall for one unit without steering it.
    ///
    /// Returns `None` for units without a behavior profile or that are no
    /// longer alive.
    #[must_use]
    pub fn decide(&self, unit: UnitId, inputs: &TacticalInputs<'_>) -> Option<Plan> {
        let unit = inputs.units.require(unit).ok()?;
        let profile = BehaviorProfile::for_category(unit.category)?;
        let situation = waterfall::Situation {
            unit,
            profile,
            style: self.tuning.profiles.get(profile),
            inputs,
            navigator: &self.navigator,
            tuning: &self.tuning,
            commitments: &self.commitments,
        };
        Some(waterfall::decide(&situation))
    }

    /// Produces one intent per living mobile unit, sorted by unit id.
    ///
    /// The output buffer is cleared before it is populated.
    pub fn handle(
        &mut self,
        context: TickContext,
        inputs: &TacticalInputs<'_>,
        out: &mut Vec<UnitIntent>,
    ) {
        out.clear();
        self.decided.clear();

        for unit in inputs.units.iter().filter(|unit| unit.is_alive()) {
            let Some(plan) = self.decide(unit.id, inputs) else {
                continue;
            };
            debug!(
                tick = context.tick(),
                unit = unit.id.get(),
                behavior = ?plan.behavior,
                movement = ?plan.movement,
                focus = plan.focus.map(|focus| focus.get()),
                "decided"
            );
            if plan.behavior != Behavior::FollowPath {
                self.decided.push((unit.id, plan.behavior));
            }

            let velocity = self.steer(unit, plan.movement, &inputs.terrain);
            out.push(UnitIntent {
                unit: unit.id,
                behavior: plan.behavior,
                velocity,
                attack: select_attack(unit, plan.focus, inputs.units),
            });
        }

        self.commitments.retain(|unit, _| inputs.units.get(*unit).is_some());
        self.commitments.extend(self.decided.drain(..));
    }

    /// Drops the route and commitment held for a unit that left the battlefield.
    pub fn forget(&mut self, unit: UnitId) {
        self.navigator.forget(unit);
        let _ = self.commitments.remove(&unit);
    }

    fn steer(&mut self, unit: &UnitSnapshot, movement: Movement, terrain: &TerrainView<'_>) -> Vec2 {
        let destination = match movement {
            Movement::Hold => {
                self.navigator.forget(unit.id);
                return Vec2::ZERO;
            }
            Movement::MoveTo(destination) => destination,
        };

        match self.navigator.steer(unit.id, unit.position, destination, terrain) {
            Ok(Heading::Arrived) => Vec2::ZERO,
            Ok(Heading::Toward(point)) => direction_between(unit.position, point)
                .map_or(Vec2::ZERO, |direction| direction * unit.speed),
            Err(error) => {
                debug!(unit = unit.id.get(), %error, "holding position");
                Vec2::ZERO
            }
        }
    }
}

/// Chooses the enemy to strike this tick.
///
/// The plan's focus wins when it is in range. Otherwise the in-range enemy
/// with the best category rank is taken, nearest first, then lowest id.
#[must_use]
pub fn select_attack(unit: &UnitSnapshot, focus: Option<UnitId>, units: &UnitView) -> Option<UnitId> {
    let in_range = |other: &UnitSnapshot| {
        other.is_alive() && unit.is_enemy_of(other) && unit.distance_to(other) <= unit.attack.range
    };

    if let Some(focus) = focus.and_then(|focus| units.get(focus)) {
        if in_range(focus) {
            return Some(focus.id);
        }
    }

    let chosen = units
        .iter()
        .filter(|other| in_range(*other))
        .min_by(|left, right| {
            left.category
                .target_rank()
                .cmp(&right.category.target_rank())
                .then(unit.distance_to(left).total_cmp(&unit.distance_to(right)))
                .then(left.id.cmp(&right.id))
        })
        .map(|other| other.id);
    if chosen.is_none() {
        trace!(unit = unit.id.get(), "no enemy in range");
    }
    chosen
}
