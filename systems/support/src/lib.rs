#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Stable matching of ranged units to the melee allies they cover.
//!
//! The resolver keeps each ranged unit's reservation across ticks and only
//! revisits it when the reserved ally disappears or when another ally in
//! combat has been left without any cover. Counting within a pass is
//! monotonic: once a reservation is written it is never revoked before the
//! pass ends.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use skirmish_core::{
    TacticsError, TeamId, TickContext, UnitCategory, UnitId, UnitSnapshot, UnitView,
};
use tracing::{debug, trace};

/// Parameters controlling reservation scoring.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SupportTuning {
    /// Radius around an ally inside which a mobile enemy puts it in combat.
    pub combat_radius: f32,
    /// Radius around an ally inside which unreserved ranged units count as load.
    pub crowding_radius: f32,
}

impl Default for SupportTuning {
    fn default() -> Self {
        Self {
            combat_radius: 120.0,
            crowding_radius: 80.0,
        }
    }
}

/// Reservation held by a single ranged unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupportAssignment {
    /// Melee ally the unit is reserved to.
    pub ally: UnitId,
    /// Whether the ally was in combat when the reservation was last resolved.
    pub active: bool,
}

/// Support assignment resolver that remembers reservations between ticks.
#[derive(Debug, Default)]
pub struct SupportResolver {
    tuning: SupportTuning,
    assignments: BTreeMap<UnitId, SupportAssignment>,
    reservations: BTreeMap<UnitId, u32>,
    in_combat: BTreeSet<UnitId>,
}

impl SupportResolver {
    /// Creates a resolver with the provided tuning.
    #[must_use]
    pub fn new(tuning: SupportTuning) -> Self {
        Self {
            tuning,
            ..Self::default()
        }
    }

    /// Reservation currently held by the unit.
    #[must_use]
    pub fn assignment(&self, unit: UnitId) -> Option<SupportAssignment> {
        self.assignments.get(&unit).copied()
    }

    /// Iterator over every reservation in ascending unit order.
    pub fn assignments(&self) -> impl Iterator<Item = (UnitId, SupportAssignment)> + '_ {
        self.assignments
            .iter()
            .map(|(&unit, &assignment)| (unit, assignment))
    }

    /// Number of ranged units reserved to the ally after the last pass.
    #[must_use]
    pub fn reservations(&self, ally: UnitId) -> u32 {
        self.reservations.get(&ally).copied().unwrap_or(0)
    }

    /// Reports whether the melee ally was in combat during the last pass.
    #[must_use]
    pub fn ally_in_combat(&self, ally: UnitId) -> bool {
        self.in_combat.contains(&ally)
    }

    /// Drops every trace of a unit that left the battlefield.
    pub fn forget(&mut self, unit: UnitId) {
        let _ = self.assignments.remove(&unit);
        let _ = self.reservations.remove(&unit);
        let _ = self.in_combat.remove(&unit);
        self.assignments
            .retain(|_, assignment| assignment.ally != unit);
    }

    /// Recomputes reservations for every team present in the view.
    pub fn resolve(&mut self, context: TickContext, units: &UnitView) {
        self.reservations.clear();
        self.in_combat.clear();

        let living_ranged: BTreeSet<UnitId> = units
            .iter()
            .filter(|unit| unit.category == UnitCategory::Ranged && unit.is_alive())
            .map(|unit| unit.id)
            .collect();
        self.assignments
            .retain(|unit, _| living_ranged.contains(unit));

        let teams: BTreeSet<TeamId> = units.iter().map(|unit| unit.team).collect();
        for team in teams {
            self.resolve_team(context, units, team);
        }
    }

    fn resolve_team(&mut self, context: TickContext, units: &UnitView, team: TeamId) {
        let ranged: Vec<&UnitSnapshot> = units
            .iter()
            .filter(|unit| {
                unit.team == team && unit.category == UnitCategory::Ranged && unit.is_alive()
            })
            .collect();
        if ranged.is_empty() {
            return;
        }

        let melee: Vec<&UnitSnapshot> = units
            .iter()
            .filter(|unit| {
                unit.team == team && unit.category == UnitCategory::Melee && unit.is_alive()
            })
            .collect();
        if melee.is_empty() {
            for unit in &ranged {
                let _ = self.assignments.remove(&unit.id);
            }
            trace!(
                tick = context.tick(),
                team = team.get(),
                "no melee allies to support"
            );
            return;
        }

        for ally in &melee {
            if self.enemy_near(units, ally, self.tuning.combat_radius) {
                let _ = self.in_combat.insert(ally.id);
            }
        }

        self.clear_stale(units, &ranged, team);

        let mut prior: BTreeMap<UnitId, u32> = BTreeMap::new();
        for unit in &ranged {
            if let Some(assignment) = self.assignments.get(&unit.id) {
                *prior.entry(assignment.ally).or_default() += 1;
            }
        }

        self.release_for_starving(context, units, &ranged, &melee, &prior);

        for unit in &ranged {
            if let Some(assignment) = self.assignments.get(&unit.id) {
                *self.reservations.entry(assignment.ally).or_default() += 1;
            }
        }

        for unit in &ranged {
            if self.assignments.contains_key(&unit.id) {
                continue;
            }
            let Some(ally) = self.best_candidate(unit, &ranged, &melee) else {
                continue;
            };
            *self.reservations.entry(ally).or_default() += 1;
            let _ = self.assignments.insert(
                unit.id,
                SupportAssignment {
                    ally,
                    active: false,
                },
            );
            debug!(
                tick = context.tick(),
                unit = unit.id.get(),
                ally = ally.get(),
                "reserved support"
            );
        }

        for unit in &ranged {
            if let Some(assignment) = self.assignments.get_mut(&unit.id) {
                assignment.active = self.in_combat.contains(&assignment.ally);
            }
        }
    }

    fn clear_stale(&mut self, units: &UnitView, ranged: &[&UnitSnapshot], team: TeamId) {
        for unit in ranged {
            let Some(assignment) = self.assignments.get(&unit.id) else {
                continue;
            };
            let verdict = units.require(assignment.ally).and_then(|ally| {
                if ally.team == team && ally.category == UnitCategory::Melee {
                    Ok(())
                } else {
                    Err(TacticsError::StaleReference { unit: ally.id })
                }
            });
            if let Err(error) = verdict {
                trace!(unit = unit.id.get(), %error, "dropping reservation");
                let _ = self.assignments.remove(&unit.id);
            }
        }
    }

    fn release_for_starving(
        &mut self,
        context: TickContext,
        units: &UnitView,
        ranged: &[&UnitSnapshot],
        melee: &[&UnitSnapshot],
        prior: &BTreeMap<UnitId, u32>,
    ) {
        if melee.len() < 2 {
            return;
        }

        let starving: Vec<&UnitSnapshot> = melee
            .iter()
            .copied()
            .filter(|ally| self.in_combat.contains(&ally.id))
            .filter(|ally| prior.get(&ally.id).copied().unwrap_or(0) == 0)
            .collect();

        for ally in starving {
            let released = ranged
                .iter()
                .copied()
                .filter(|unit| {
                    self.assignments.get(&unit.id).map_or(false, |assignment| {
                        !self.in_combat.contains(&assignment.ally)
                    })
                })
                .filter(|unit| !self.enemy_near(units, unit, unit.attack.range))
                .min_by(|left, right| {
                    left.distance_to(ally)
                        .total_cmp(&right.distance_to(ally))
                        .then(left.id.cmp(&right.id))
                });

            if let Some(unit) = released {
                let _ = self.assignments.remove(&unit.id);
                debug!(
                    tick = context.tick(),
                    unit = unit.id.get(),
                    starving = ally.id.get(),
                    "released reservation for an ally without cover"
                );
            }
        }
    }

    fn best_candidate(
        &self,
        unit: &UnitSnapshot,
        ranged: &[&UnitSnapshot],
        melee: &[&UnitSnapshot],
    ) -> Option<UnitId> {
        melee
            .iter()
            .map(|ally| {
                let crowd = ranged
                    .iter()
                    .filter(|other| other.id != unit.id)
                    .filter(|other| !self.assignments.contains_key(&other.id))
                    .filter(|other| other.distance_to(ally) <= self.tuning.crowding_radius)
                    .count();
                let load = self.reservations(ally.id) as usize + crowd;
                let urgency = u8::from(!self.in_combat.contains(&ally.id));
                let distance = unit.position.distance_squared(ally.position);
                (urgency, load, distance, ally.id)
            })
            .min_by(|left, right| {
                left.0
                    .cmp(&right.0)
                    .then(left.1.cmp(&right.1))
                    .then(left.2.total_cmp(&right.2))
                    .then(left.3.cmp(&right.3))
            })
            .map(|(_, _, _, ally)| ally)
    }

    fn enemy_near(&self, units: &UnitView, unit: &UnitSnapshot, radius: f32) -> bool {
        units
            .mobile_enemies_of(unit.team)
            .any(|enemy| enemy.distance_to(unit) <= radius)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use glam::Vec2;
    use skirmish_core::{Health, UnitStats};

    use super::*;

    fn unit(id: u32, team: u8, category: UnitCategory, x: f32, y: f32) -> UnitSnapshot {
        let stats = UnitStats::for_category(category, 32.0);
        UnitSnapshot {
            id: UnitId::new(id),
            team: TeamId::new(team),
            category,
            position: Vec2::new(x, y),
            velocity: Vec2::ZERO,
            health: Health::full(stats.max_health),
            attack: stats.attack,
            speed: stats.speed,
            vision: stats.vision,
            refund: stats.refund,
            since_last_attack: Duration::ZERO,
            target: None,
        }
    }

    fn context(tick: u64) -> TickContext {
        TickContext::new(tick, Duration::from_millis(100))
    }

    #[test]
    fn prefers_allies_in_combat() {
        let units = UnitView::from_snapshots(vec![
            unit(1, 0, UnitCategory::Melee, 100.0, 100.0),
            unit(2, 0, UnitCategory::Melee, 400.0, 100.0),
            unit(3, 0, UnitCategory::Ranged, 110.0, 200.0),
            unit(9, 1, UnitCategory::Melee, 450.0, 100.0),
        ]);
        let mut resolver = SupportResolver::default();
        resolver.resolve(context(0), &units);

        assert_eq!(
            resolver.assignment(UnitId::new(3)),
            Some(SupportAssignment {
                ally: UnitId::new(2),
                active: true,
            })
        );
        assert!(resolver.ally_in_combat(UnitId::new(2)));
        assert!(!resolver.ally_in_combat(UnitId::new(1)));
    }

    #[test]
    fn no_melee_allies_clears_the_team() {
        let mut units = vec![
            unit(1, 0, UnitCategory::Melee, 100.0, 100.0),
            unit(2, 0, UnitCategory::Ranged, 150.0, 100.0),
        ];
        let mut resolver = SupportResolver::default();
        resolver.resolve(context(0), &UnitView::from_snapshots(units.clone()));
        assert!(resolver.assignment(UnitId::new(2)).is_some());

        let _ = units.remove(0);
        resolver.resolve(context(1), &UnitView::from_snapshots(units));
        assert!(resolver.assignment(UnitId::new(2)).is_none());
    }

    #[test]
    fn dead_allies_are_dropped_before_reuse() {
        let mut fallen = unit(1, 0, UnitCategory::Melee, 100.0, 100.0);
        let units = vec![
            fallen.clone(),
            unit(2, 0, UnitCategory::Melee, 300.0, 100.0),
            unit(3, 0, UnitCategory::Ranged, 100.0, 150.0),
        ];
        let mut resolver = SupportResolver::default();
        resolver.resolve(context(0), &UnitView::from_snapshots(units.clone()));
        assert_eq!(
            resolver.assignment(UnitId::new(3)).map(|entry| entry.ally),
            Some(UnitId::new(1))
        );

        fallen.health = Health::new(0, 100);
        let mut next = units;
        next[0] = fallen;
        resolver.resolve(context(1), &UnitView::from_snapshots(next));
        assert_eq!(
            resolver.assignment(UnitId::new(3)).map(|entry| entry.ally),
            Some(UnitId::new(2))
        );
    }

    #[test]
    fn idle_reservation_is_released_for_a_starving_ally() {
        let quiet = vec![
            unit(1, 0, UnitCategory::Melee, 100.0, 100.0),
            unit(2, 0, UnitCategory::Melee, 500.0, 100.0),
            unit(3, 0, UnitCategory::Ranged, 100.0, 150.0),
            unit(4, 0, UnitCategory::Ranged, 500.0, 150.0),
        ];
        let mut resolver = SupportResolver::default();
        resolver.resolve(context(0), &UnitView::from_snapshots(quiet.clone()));
        assert_eq!(
            resolver.assignment(UnitId::new(3)).map(|entry| entry.ally),
            Some(UnitId::new(1))
        );
        assert_eq!(
            resolver.assignment(UnitId::new(4)).map(|entry| entry.ally),
            Some(UnitId::new(2))
        );

        // A third melee ally comes under attack with nobody covering it.
        let mut contested = quiet;
        contested.push(unit(5, 0, UnitCategory::Melee, 300.0, 500.0));
        contested.push(unit(9, 1, UnitCategory::Melee, 300.0, 560.0));
        resolver.resolve(context(1), &UnitView::from_snapshots(contested));

        let covering: Vec<UnitId> = resolver
            .assignments()
            .filter(|(_, assignment)| assignment.ally == UnitId::new(5))
            .map(|(unit, _)| unit)
            .collect();
        assert_eq!(covering, vec![UnitId::new(3)]);
        assert!(resolver
            .assignment(UnitId::new(3))
            .map_or(false, |entry| entry.active));
    }

    #[test]
    fn forget_drops_reservations_to_the_dead_ally() {
        let units = UnitView::from_snapshots(vec![
            unit(1, 0, UnitCategory::Melee, 100.0, 100.0),
            unit(2, 0, UnitCategory::Ranged, 100.0, 150.0),
        ]);
        let mut resolver = SupportResolver::default();
        resolver.resolve(context(0), &units);
        resolver.forget(UnitId::new(1));

        assert!(resolver.assignment(UnitId::new(2)).is_none());
        assert_eq!(resolver.reservations(UnitId::new(1)), 0);
    }
}
