//! Distance bands and formation points shared by the behavior branches.

use std::f32::consts::TAU;

use glam::Vec2;
use skirmish_core::direction_between;

use crate::{Movement, TacticsTuning};

/// Holds inside `[backoff, optimal]` of the enemy, otherwise moves to the
/// point at `optimal` distance on the line between the two.
pub(crate) fn engage(from: Vec2, enemy: Vec2, optimal: f32, backoff: f32) -> Movement {
    let distance = from.distance(enemy);
    if distance >= backoff && distance <= optimal {
        return Movement::Hold;
    }
    // Standing exactly on the enemy counts as arrived.
    direction_between(enemy, from)
        .map_or(Movement::Hold, |away| Movement::MoveTo(enemy + away * optimal))
}

/// Point `distance` away from `anchor` on the side facing away from `threat`.
///
/// Without a threat the point lies between the anchor and `from`.
pub(crate) fn behind(anchor: Vec2, threat: Option<Vec2>, from: Vec2, distance: f32) -> Vec2 {
    let away = threat
        .and_then(|threat| direction_between(threat, anchor).ok())
        .or_else(|| direction_between(anchor, from).ok())
        .unwrap_or(Vec2::X);
    anchor + away * distance
}

/// Keeps a unit near its anchor while it trades fire with an optional enemy.
///
/// Anchor distance takes precedence: a unit outside the anchor band always
/// returns to the formation point first. Steps toward or away from the enemy
/// are refused when they would break the leash.
pub(crate) fn hold_formation(
    from: Vec2,
    anchor: Vec2,
    formation: Vec2,
    enemy: Option<Vec2>,
    range: f32,
    tuning: &TacticsTuning,
) -> Movement {
    let to_anchor = from.distance(anchor);
    let inner = tuning.support_ideal - tuning.support_inner_tolerance;
    let outer = tuning.support_ideal + tuning.support_outer_tolerance;
    if to_anchor < inner || to_anchor > outer {
        return Movement::MoveTo(formation);
    }

    let Some(enemy) = enemy else {
        return Movement::Hold;
    };
    let optimal = range * tuning.enemy_optimal_fraction;
    let backoff = optimal * tuning.enemy_backoff_fraction;
    let distance = from.distance(enemy);

    let step = if distance < backoff {
        direction_between(enemy, from).map(|away| away * tuning.positioning_step)
    } else if distance > optimal {
        let length = tuning.positioning_step.min(distance - optimal);
        direction_between(from, enemy).map(|toward| toward * length)
    } else {
        return Movement::Hold;
    };

    match step {
        Ok(offset) if (from + offset).distance(anchor) <= tuning.support_leash => {
            Movement::MoveTo(from + offset)
        }
        _ => Movement::Hold,
    }
}

/// Keeps `point` within `leash` of `center`.
pub(crate) fn leashed(point: Vec2, center: Vec2, leash: f32) -> Vec2 {
    if point.distance(center) <= leash {
        return point;
    }
    direction_between(center, point).map_or(center, |outward| center + outward * leash)
}

/// Slot `index` of `count` evenly spaced around `focal`, starting on the side
/// facing `centroid`.
pub(crate) fn ring_slot(focal: Vec2, centroid: Vec2, index: usize, count: usize, radius: f32) -> Vec2 {
    let facing = centroid - focal;
    let base_angle = facing.y.atan2(facing.x);
    let share = index as f32 / count.max(1) as f32;
    let angle = base_angle + share * TAU;
    focal + Vec2::new(angle.cos(), angle.sin()) * radius
}
