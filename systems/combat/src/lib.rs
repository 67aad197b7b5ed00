#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Combat resolver that turns tracked targets into attack requests.
//!
//! The system inspects every living unit's current target and emits a
//! [`Command::ResolveAttack`] when the shared strike gate passes. The world
//! re-runs the same gate when applying the command and owns every mutation
//! that follows: damage, the cooldown reset and the death signal.

use skirmish_core::{strike_gate, Command, TickContext, UnitId, UnitView};
use tracing::{debug, trace};

/// Pure system that proposes attacks for units whose gate is open.
#[derive(Debug, Default)]
pub struct Combat {
    ready: Vec<(UnitId, UnitId)>,
}

impl Combat {
    /// Creates a new combat system with an empty scratch buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits one `ResolveAttack` per unit able to strike its target this tick.
    ///
    /// Targets that are missing, dead, or on the attacker's own team are
    /// skipped without touching the output.
    pub fn handle(&mut self, context: TickContext, units: &UnitView, out: &mut Vec<Command>) {
        self.ready.clear();

        for attacker in units.iter().filter(|unit| unit.is_alive()) {
            let Some(target_id) = attacker.target else {
                continue;
            };
            let target = match units.require(target_id) {
                Ok(target) => target,
                Err(error) => {
                    trace!(attacker = attacker.id.get(), %error, "ignoring stale target");
                    continue;
                }
            };
            if !attacker.is_enemy_of(target) {
                continue;
            }

            let distance = attacker.distance_to(target);
            match strike_gate(&attacker.attack, attacker.since_last_attack, distance) {
                Ok(()) => {
                    debug!(
                        tick = context.tick(),
                        attacker = attacker.id.get(),
                        target = target_id.get(),
                        damage = attacker.attack.damage,
                        "strike"
                    );
                    self.ready.push((attacker.id, target_id));
                }
                Err(reason) => {
                    trace!(attacker = attacker.id.get(), ?reason, "strike gate closed");
                }
            }
        }

        out.extend(
            self.ready
                .iter()
                .map(|&(attacker, target)| Command::ResolveAttack { attacker, target }),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use glam::Vec2;
    use skirmish_core::{Health, TeamId, UnitCategory, UnitSnapshot, UnitStats};

    use super::*;

    fn unit(id: u32, team: u8, x: f32, target: Option<u32>) -> UnitSnapshot {
        let stats = UnitStats::for_category(UnitCategory::Melee, 32.0);
        UnitSnapshot {
            id: UnitId::new(id),
            team: TeamId::new(team),
            category: UnitCategory::Melee,
            position: Vec2::new(x, 0.0),
            velocity: Vec2::ZERO,
            health: Health::full(stats.max_health),
            attack: stats.attack,
            speed: stats.speed,
            vision: stats.vision,
            refund: stats.refund,
            since_last_attack: Duration::from_secs(1),
            target: target.map(UnitId::new),
        }
    }

    fn run(units: Vec<UnitSnapshot>) -> Vec<Command> {
        let mut out = Vec::new();
        Combat::new().handle(
            TickContext::new(1, Duration::from_millis(100)),
            &UnitView::from_snapshots(units),
            &mut out,
        );
        out
    }

    #[test]
    fn ready_unit_in_range_strikes() {
        let commands = run(vec![unit(1, 0, 0.0, Some(2)), unit(2, 1, 20.0, None)]);
        assert_eq!(
            commands,
            vec![Command::ResolveAttack {
                attacker: UnitId::new(1),
                target: UnitId::new(2),
            }]
        );
    }

    #[test]
    fn gate_blocks_distance_and_cooldown() {
        let mut cooling = unit(1, 0, 0.0, Some(3));
        cooling.since_last_attack = Duration::from_millis(400);
        let commands = run(vec![
            cooling,
            unit(2, 0, 0.0, Some(4)),
            unit(3, 1, 10.0, None),
            unit(4, 1, 200.0, None),
        ]);
        assert!(commands.is_empty());
    }

    #[test]
    fn stale_and_friendly_targets_are_ignored() {
        let mut fallen = unit(3, 1, 10.0, None);
        fallen.health = Health::new(0, 100);
        let commands = run(vec![
            unit(1, 0, 0.0, Some(3)),
            unit(2, 0, 5.0, Some(1)),
            fallen,
            unit(4, 0, 0.0, Some(99)),
        ]);
        assert!(commands.is_empty());
    }
}
