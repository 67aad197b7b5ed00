//! Ordered behavior branches evaluated top to bottom for every unit.

use std::collections::BTreeMap;

use glam::Vec2;
use skirmish_core::{Behavior, TacticsError, UnitCategory, UnitId, UnitSnapshot, UnitView};
use skirmish_system_navigation::Navigator;
use tracing::trace;

use crate::{
    geometry::{behind, engage, hold_formation, leashed, ring_slot},
    BehaviorProfile, Movement, Plan, ProfileTuning, TacticalInputs, TacticsTuning,
};

/// Everything a branch may consult about the deciding unit.
pub(crate) struct Situation<'a> {
    pub(crate) unit: &'a UnitSnapshot,
    pub(crate) profile: BehaviorProfile,
    pub(crate) style: &'a ProfileTuning,
    pub(crate) inputs: &'a TacticalInputs<'a>,
    pub(crate) navigator: &'a Navigator,
    pub(crate) tuning: &'a TacticsTuning,
    /// Behavior each unit committed to on the previous tick.
    pub(crate) commitments: &'a BTreeMap<UnitId, Behavior>,
}

impl Situation<'_> {
    fn units(&self) -> &UnitView {
        self.inputs.units
    }

    fn position(&self) -> Vec2 {
        self.unit.position
    }

    fn range(&self) -> f32 {
        self.unit.attack.range
    }

    fn enemies(&self) -> impl Iterator<Item = &UnitSnapshot> {
        self.inputs.units.mobile_enemies_of(self.unit.team)
    }

    fn home_base(&self) -> Option<&UnitSnapshot> {
        self.inputs.units.home_base(self.unit.team)
    }

    fn in_combat(&self, ally: &UnitSnapshot) -> bool {
        self.enemies()
            .any(|enemy| enemy.distance_to(ally) <= self.tuning.combat_radius)
    }

    /// Units without a commitment, or whose last one came from the force strategy.
    fn is_idle(&self, unit: UnitId) -> bool {
        self.commitments
            .get(&unit)
            .map_or(true, |behavior| FORCE_STRATEGY.contains(behavior))
    }
}

const FORCE_STRATEGY: [Behavior; 5] = [
    Behavior::GroupAssault,
    Behavior::EngageNearest,
    Behavior::AdvanceOnEnemyBase,
    Behavior::Retreat,
    Behavior::Hold,
];

struct Branch {
    behavior: Behavior,
    applies: fn(&Situation<'_>) -> bool,
    plan: fn(&Situation<'_>) -> Result<Plan, TacticsError>,
}

const WATERFALL: [Branch; 7] = [
    Branch {
        behavior: Behavior::FollowPath,
        applies: follows_path,
        plan: follow_path,
    },
    Branch {
        behavior: Behavior::InterceptBaseThreat,
        applies: base_threatened,
        plan: intercept_base_threat,
    },
    Branch {
        behavior: Behavior::HuntPriorityThreat,
        applies: priority_threat_nearby,
        plan: hunt_priority_threat,
    },
    Branch {
        behavior: Behavior::HoldWithAlly,
        applies: supports_allies,
        plan: hold_with_ally,
    },
    Branch {
        behavior: Behavior::SupportAlly,
        applies: holds_reservation,
        plan: support_ally,
    },
    Branch {
        behavior: Behavior::DefendBase,
        applies: base_unguarded,
        plan: defend_base,
    },
    Branch {
        behavior: Behavior::GroupAssault,
        applies: always,
        plan: force_strategy,
    },
];

/// Runs the waterfall; the first branch that applies and plans successfully wins.
pub(crate) fn decide(situation: &Situation<'_>) -> Plan {
    settle(situation, &WATERFALL)
}

fn settle(situation: &Situation<'_>, branches: &[Branch]) -> Plan {
    for branch in branches {
        if !(branch.applies)(situation) {
            continue;
        }
        match (branch.plan)(situation) {
            Ok(plan) => return plan,
            Err(error) => trace!(
                unit = situation.unit.id.get(),
                branch = ?branch.behavior,
                %error,
                "branch fell through"
            ),
        }
    }
    Plan::hold(Behavior::Hold)
}

fn nearest<'u>(
    candidates: impl Iterator<Item = &'u UnitSnapshot>,
    point: Vec2,
) -> Option<&'u UnitSnapshot> {
    candidates.min_by(|left, right| {
        left.position
            .distance(point)
            .total_cmp(&right.position.distance(point))
            .then(left.id.cmp(&right.id))
    })
}

fn always(_: &Situation<'_>) -> bool {
    true
}

fn follows_path(situation: &Situation<'_>) -> bool {
    situation
        .navigator
        .has_valid_path(situation.unit.id, &situation.inputs.terrain)
}

/// Keeps walking the stored route while the rest of the waterfall still wants
/// to reach its destination. Otherwise the fresh plan replaces it.
fn follow_path(situation: &Situation<'_>) -> Result<Plan, TacticsError> {
    let request = situation
        .navigator
        .request(situation.unit.id)
        .ok_or(TacticsError::NoCandidate {
            branch: Behavior::FollowPath,
        })?;
    let wanted = settle(situation, &WATERFALL[1..]);
    let Movement::MoveTo(point) = wanted.movement else {
        return Ok(wanted);
    };

    let terrain = &situation.inputs.terrain;
    let point = terrain.clamp_inside(point, terrain.grid().tile_length());
    let drift = point.distance(request.destination());
    if drift > situation.navigator.tuning().replan_tolerance {
        trace!(
            unit = situation.unit.id.get(),
            drift,
            behavior = ?wanted.behavior,
            "route destination went stale"
        );
        return Ok(wanted);
    }
    Ok(Plan {
        behavior: Behavior::FollowPath,
        movement: Movement::MoveTo(request.destination()),
        focus: wanted.focus,
    })
}

fn base_threatened(situation: &Situation<'_>) -> bool {
    situation.home_base().is_some()
        && situation.inputs.perception.base_danger(situation.unit.team) > 0.0
}

fn intercept_base_threat(situation: &Situation<'_>) -> Result<Plan, TacticsError> {
    let base = situation.home_base().ok_or(TacticsError::NoCandidate {
        branch: Behavior::InterceptBaseThreat,
    })?;
    let vigilance = situation.tuning.base_vigilance_radius;
    let threat = nearest(
        situation
            .enemies()
            .filter(|enemy| enemy.distance_to(base) <= vigilance),
        situation.position(),
    )
    .ok_or(TacticsError::NoCandidate {
        branch: Behavior::InterceptBaseThreat,
    })?;

    let optimal = situation.range() * situation.tuning.intercept_fraction;
    let backoff = optimal * situation.tuning.intercept_backoff;
    Ok(Plan {
        behavior: Behavior::InterceptBaseThreat,
        movement: engage(situation.position(), threat.position, optimal, backoff),
        focus: Some(threat.id),
    })
}

fn priority_threat_nearby(situation: &Situation<'_>) -> bool {
    situation.style.hunts_aerial
        && situation.enemies().any(|enemy| {
            enemy.category == UnitCategory::Aerial
                && enemy.distance_to(situation.unit) <= situation.tuning.hunt_radius
        })
}

fn hunt_priority_threat(situation: &Situation<'_>) -> Result<Plan, TacticsError> {
    let radius = situation.tuning.hunt_radius;
    let prey = nearest(
        situation.enemies().filter(|enemy| {
            enemy.category == UnitCategory::Aerial && enemy.distance_to(situation.unit) <= radius
        }),
        situation.position(),
    )
    .ok_or(TacticsError::NoCandidate {
        branch: Behavior::HuntPriorityThreat,
    })?;

    let optimal = situation.range() * situation.tuning.hunt_fraction;
    let backoff = situation.range() * situation.tuning.hunt_backoff;
    Ok(Plan {
        behavior: Behavior::HuntPriorityThreat,
        movement: engage(situation.position(), prey.position, optimal, backoff),
        focus: Some(prey.id),
    })
}

fn supports_allies(situation: &Situation<'_>) -> bool {
    situation.style.supports_allies
}

fn hold_with_ally(situation: &Situation<'_>) -> Result<Plan, TacticsError> {
    let ally = combat_anchor(situation).ok_or(TacticsError::NoCandidate {
        branch: Behavior::HoldWithAlly,
    })?;
    let threat = threat_to_ally(situation, ally).ok_or(TacticsError::NoCandidate {
        branch: Behavior::HoldWithAlly,
    })?;

    let formation = behind(
        ally.position,
        Some(threat.position),
        situation.position(),
        situation.tuning.support_ideal,
    );
    Ok(Plan {
        behavior: Behavior::HoldWithAlly,
        movement: hold_formation(
            situation.position(),
            ally.position,
            formation,
            Some(threat.position),
            situation.range(),
            situation.tuning,
        ),
        focus: Some(threat.id),
    })
}

/// Reserved ally when it is fighting, otherwise the nearest fighting melee ally.
fn combat_anchor<'a>(situation: &'a Situation<'_>) -> Option<&'a UnitSnapshot> {
    let reserved = situation
        .inputs
        .support
        .assignment(situation.unit.id)
        .filter(|assignment| situation.inputs.support.ally_in_combat(assignment.ally))
        .and_then(|assignment| situation.units().require(assignment.ally).ok());
    if reserved.is_some() {
        return reserved;
    }

    let scan = situation.tuning.ally_scan_radius;
    nearest(
        situation
            .units()
            .mobile_allies_of(situation.unit.team)
            .filter(|ally| ally.category == UnitCategory::Melee)
            .filter(|ally| ally.distance_to(situation.unit) <= scan)
            .filter(|ally| situation.in_combat(ally)),
        situation.position(),
    )
}

/// Highest priority enemy near the ally, preferring those the unit can nearly reach.
fn threat_to_ally<'a>(
    situation: &'a Situation<'_>,
    ally: &UnitSnapshot,
) -> Option<&'a UnitSnapshot> {
    let near_ally: Vec<&UnitSnapshot> = situation
        .enemies()
        .filter(|enemy| enemy.distance_to(ally) <= situation.tuning.threat_radius)
        .collect();
    let reach = situation.range() * situation.tuning.preferred_threat_range;
    let preferred: Vec<&UnitSnapshot> = near_ally
        .iter()
        .copied()
        .filter(|enemy| enemy.distance_to(situation.unit) <= reach)
        .collect();
    let pool = if preferred.is_empty() {
        near_ally
    } else {
        preferred
    };

    pool.into_iter().max_by(|left, right| {
        threat_priority(situation.unit, ally, left)
            .total_cmp(&threat_priority(situation.unit, ally, right))
            .then(right.id.cmp(&left.id))
    })
}

fn threat_priority(unit: &UnitSnapshot, ally: &UnitSnapshot, threat: &UnitSnapshot) -> f32 {
    let to_ally = threat.distance_to(ally);
    let proximity = if to_ally <= 80.0 {
        50.0
    } else if to_ally <= 120.0 {
        30.0
    } else {
        0.0
    };
    let exposure = (threat.distance_to(unit) / 20.0).min(20.0);
    threat.category.threat_score() + proximity - exposure
}

fn holds_reservation(situation: &Situation<'_>) -> bool {
    situation
        .inputs
        .support
        .assignment(situation.unit.id)
        .is_some()
}

fn support_ally(situation: &Situation<'_>) -> Result<Plan, TacticsError> {
    let assignment = situation
        .inputs
        .support
        .assignment(situation.unit.id)
        .ok_or(TacticsError::NoCandidate {
            branch: Behavior::SupportAlly,
        })?;
    let ally = situation.units().require(assignment.ally)?;
    let enemy = situation
        .inputs
        .perception
        .nearest_enemy(situation.unit.id)
        .and_then(|contact| situation.units().get(contact.unit));

    let formation = behind(
        ally.position,
        enemy.map(|enemy| enemy.position),
        situation.position(),
        situation.tuning.support_ideal,
    );
    Ok(Plan {
        behavior: Behavior::SupportAlly,
        movement: hold_formation(
            situation.position(),
            ally.position,
            formation,
            enemy.map(|enemy| enemy.position),
            situation.range(),
            situation.tuning,
        ),
        focus: enemy.map(|enemy| enemy.id),
    })
}

fn base_unguarded(situation: &Situation<'_>) -> bool {
    let Some(base) = situation.home_base() else {
        return false;
    };
    let guards = situation
        .units()
        .mobile_allies_of(situation.unit.team)
        .filter(|ally| ally.id != situation.unit.id)
        .filter(|ally| ally.distance_to(base) <= situation.tuning.defend_radius)
        .count();
    guards < situation.tuning.min_base_guards
}

fn defend_base(situation: &Situation<'_>) -> Result<Plan, TacticsError> {
    let base = situation.home_base().ok_or(TacticsError::NoCandidate {
        branch: Behavior::DefendBase,
    })?;
    let tuning = situation.tuning;

    let intruder = nearest(
        situation
            .enemies()
            .filter(|enemy| enemy.distance_to(base) <= tuning.defend_radius),
        situation.position(),
    );
    if let Some(intruder) = intruder {
        let optimal = tuning
            .defend_optimal_cap
            .min(situation.range() * tuning.enemy_optimal_fraction);
        let backoff = optimal * tuning.enemy_backoff_fraction;
        let movement = match engage(situation.position(), intruder.position, optimal, backoff) {
            Movement::MoveTo(point) => {
                Movement::MoveTo(leashed(point, base.position, tuning.defend_leash))
            }
            Movement::Hold => Movement::Hold,
        };
        return Ok(Plan {
            behavior: Behavior::DefendBase,
            movement,
            focus: Some(intruder.id),
        });
    }

    let distance = situation.unit.distance_to(base);
    let movement = if (distance - tuning.perimeter_radius).abs() <= tuning.perimeter_tolerance {
        Movement::Hold
    } else {
        Movement::MoveTo(behind(
            base.position,
            None,
            situation.position(),
            tuning.perimeter_radius,
        ))
    };
    Ok(Plan {
        behavior: Behavior::DefendBase,
        movement,
        focus: None,
    })
}

fn force_strategy(situation: &Situation<'_>) -> Result<Plan, TacticsError> {
    let tuning = situation.tuning;
    let team = situation.unit.team;
    let ally_force: u32 = situation
        .units()
        .mobile_allies_of(team)
        .filter(|ally| ally.distance_to(situation.unit) <= tuning.ally_force_radius)
        .map(|ally| ally.category.force_weight())
        .sum();
    let enemy_force: u32 = situation
        .enemies()
        .filter(|enemy| enemy.distance_to(situation.unit) <= tuning.enemy_force_radius)
        .map(|enemy| enemy.category.force_weight())
        .sum();

    if enemy_force > 0 && ally_force >= enemy_force {
        if let Ok(plan) = group_assault(situation) {
            return Ok(plan);
        }
    }

    if situation.enemies().next().is_none() {
        return Ok(advance_on_enemy_base(situation));
    }

    if (ally_force as f32) / (enemy_force.max(1) as f32) < tuning.retreat_ratio {
        return Ok(retreat(situation));
    }

    Ok(engage_nearest(situation))
}

fn group_assault(situation: &Situation<'_>) -> Result<Plan, TacticsError> {
    let recruits: Vec<&UnitSnapshot> = situation
        .units()
        .mobile_allies_of(situation.unit.team)
        .filter(|ally| BehaviorProfile::for_category(ally.category) == Some(situation.profile))
        .filter(|ally| ally.distance_to(situation.unit) <= situation.tuning.recruit_radius)
        .filter(|ally| ally.id == situation.unit.id || situation.is_idle(ally.id))
        .collect();
    let index = recruits
        .iter()
        .position(|ally| ally.id == situation.unit.id)
        .ok_or(TacticsError::StaleReference {
            unit: situation.unit.id,
        })?;

    let centroid = recruits
        .iter()
        .fold(Vec2::ZERO, |sum, ally| sum + ally.position)
        / recruits.len() as f32;
    let focal = nearest(situation.enemies(), centroid).ok_or(TacticsError::NoCandidate {
        branch: Behavior::GroupAssault,
    })?;

    let radius = situation.range() * situation.style.standoff + situation.style.spread(index);
    let slot = ring_slot(focal.position, centroid, index, recruits.len(), radius);
    Ok(Plan {
        behavior: Behavior::GroupAssault,
        movement: Movement::MoveTo(slot),
        focus: Some(focal.id),
    })
}

fn advance_on_enemy_base(situation: &Situation<'_>) -> Plan {
    let Some(base) = situation.units().enemy_base(situation.unit.team) else {
        return Plan::hold(Behavior::Hold);
    };
    let optimal = situation.range() * situation.tuning.hunt_fraction;
    Plan {
        behavior: Behavior::AdvanceOnEnemyBase,
        movement: engage(situation.position(), base.position, optimal, 0.0),
        focus: Some(base.id),
    }
}

fn retreat(situation: &Situation<'_>) -> Plan {
    let Some(base) = situation.home_base() else {
        return Plan::hold(Behavior::Hold);
    };
    let distance = situation.tuning.retreat_distance;
    let movement = if situation.unit.distance_to(base) <= distance {
        Movement::Hold
    } else {
        Movement::MoveTo(behind(base.position, None, situation.position(), distance))
    };
    Plan {
        behavior: Behavior::Retreat,
        movement,
        focus: None,
    }
}

fn engage_nearest(situation: &Situation<'_>) -> Plan {
    let Some(enemy) = nearest(situation.enemies(), situation.position()) else {
        return Plan::hold(Behavior::Hold);
    };
    let optimal = situation.range() * situation.tuning.engage_fraction;
    let backoff = optimal * situation.tuning.intercept_backoff;
    Plan {
        behavior: Behavior::EngageNearest,
        movement: engage(situation.position(), enemy.position, optimal, backoff),
        focus: Some(enemy.id),
    }
}
