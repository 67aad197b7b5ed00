#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Perception aggregator that summarises the battlefield once per tick.
//!
//! The aggregator rebuilds a [`PerceptionSnapshot`] from scratch every call.
//! The only state it carries between calls is the smoothed danger of each
//! base, which damps one-tick spikes that would otherwise make units flap
//! between behaviors.

use std::{collections::BTreeMap, ops::Range};

use glam::Vec2;
use serde::Deserialize;
use skirmish_core::{TeamId, TileGrid, UnitCategory, UnitId, UnitSnapshot, UnitView};
use tracing::trace;

/// Parameters that shape danger estimation.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PerceptionTuning {
    /// Vision radius, in tiles, granted to units whose own vision is shorter.
    pub default_vision_tiles: f32,
    /// Weight of the averaged enemy threat in a unit's danger score.
    pub enemy_threat_weight: f32,
    /// Weight of missing own health in a unit's danger score.
    pub own_health_weight: f32,
    /// Radius, in tiles, around a base inside which enemies create pressure.
    pub base_vigilance_tiles: f32,
    /// Weight of missing base health in the raw base danger.
    pub base_health_weight: f32,
    /// Flat penalty added when a pressured base has no mobile ally nearby.
    pub isolation_penalty: f32,
    /// Exponential smoothing factor α applied to base danger.
    pub danger_smoothing: f32,
}

impl Default for PerceptionTuning {
    fn default() -> Self {
        Self {
            default_vision_tiles: 5.0,
            enemy_threat_weight: 0.6,
            own_health_weight: 0.4,
            base_vigilance_tiles: 6.0,
            base_health_weight: 0.5,
            isolation_penalty: 0.2,
            danger_smoothing: 0.1,
        }
    }
}

/// Another unit seen by the observer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    /// Unit that was seen.
    pub unit: UnitId,
    /// Distance between observer and the seen unit.
    pub distance: f32,
}

/// Everything perceived about a single living unit this tick.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitPerception {
    /// Unit the record describes.
    pub id: UnitId,
    /// Team the unit fights for.
    pub team: TeamId,
    /// Position at the time of the scan.
    pub position: Vec2,
    /// Remaining health as a fraction of the maximum.
    pub health_ratio: f32,
    /// Threat exposure in `[0, 1]`.
    pub danger: f32,
    /// Closest visible mobile enemy.
    pub nearest_enemy: Option<Contact>,
    /// Closest visible mobile ally.
    pub nearest_ally: Option<Contact>,
    visible: Range<usize>,
}

/// Smoothed danger recorded for one base.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BaseDanger {
    /// Structure the score belongs to.
    pub base: UnitId,
    /// Team owning the structure.
    pub team: TeamId,
    /// Smoothed danger in `[0, 1]`.
    pub danger: f32,
}

/// Read-only summary of one tick's battlefield, keyed by unit id.
#[derive(Clone, Debug, Default)]
pub struct PerceptionSnapshot {
    units: Vec<UnitPerception>,
    contacts: Vec<Contact>,
    bases: Vec<BaseDanger>,
}

impl PerceptionSnapshot {
    /// Record for the unit, if it was alive during the scan.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&UnitPerception> {
        self.units
            .binary_search_by_key(&id, |entry| entry.id)
            .ok()
            .and_then(|index| self.units.get(index))
    }

    /// Iterator over every perceived unit in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitPerception> {
        self.units.iter()
    }

    /// Units seen by the observer, nearest first.
    #[must_use]
    pub fn visible(&self, id: UnitId) -> &[Contact] {
        self.unit(id)
            .and_then(|entry| self.contacts.get(entry.visible.clone()))
            .unwrap_or(&[])
    }

    /// Distance recorded between two units when the first one sees the second.
    #[must_use]
    pub fn distance_between(&self, observer: UnitId, seen: UnitId) -> Option<f32> {
        self.visible(observer)
            .iter()
            .find(|contact| contact.unit == seen)
            .map(|contact| contact.distance)
    }

    /// Health ratio captured for the unit.
    #[must_use]
    pub fn health_ratio(&self, id: UnitId) -> Option<f32> {
        self.unit(id).map(|entry| entry.health_ratio)
    }

    /// Danger score of the unit, zero when it is unknown.
    #[must_use]
    pub fn danger(&self, id: UnitId) -> f32 {
        self.unit(id).map_or(0.0, |entry| entry.danger)
    }

    /// Closest visible mobile enemy of the unit.
    #[must_use]
    pub fn nearest_enemy(&self, id: UnitId) -> Option<Contact> {
        self.unit(id).and_then(|entry| entry.nearest_enemy)
    }

    /// Closest visible mobile ally of the unit.
    #[must_use]
    pub fn nearest_ally(&self, id: UnitId) -> Option<Contact> {
        self.unit(id).and_then(|entry| entry.nearest_ally)
    }

    /// Smoothed danger of the base with the lowest id owned by the team.
    #[must_use]
    pub fn base_danger(&self, team: TeamId) -> f32 {
        self.bases
            .iter()
            .find(|entry| entry.team == team)
            .map_or(0.0, |entry| entry.danger)
    }

    /// Smoothed danger of every base in ascending id order.
    #[must_use]
    pub fn bases(&self) -> &[BaseDanger] {
        &self.bases
    }
}

/// Builds perception snapshots and carries base-danger smoothing state.
#[derive(Debug, Default)]
pub struct Perception {
    tuning: PerceptionTuning,
    smoothed: BTreeMap<UnitId, f32>,
    sightings: Vec<Vec<Contact>>,
}

impl Perception {
    /// Creates an aggregator with the provided tuning.
    #[must_use]
    pub fn new(tuning: PerceptionTuning) -> Self {
        Self {
            tuning,
            smoothed: BTreeMap::new(),
            sightings: Vec::new(),
        }
    }

    /// Tuning currently applied by the aggregator.
    #[must_use]
    pub fn tuning(&self) -> &PerceptionTuning {
        &self.tuning
    }

    /// Scans every living unit and produces this tick's snapshot.
    pub fn update(&mut self, units: &UnitView, grid: TileGrid) -> PerceptionSnapshot {
        let living: Vec<&UnitSnapshot> = units.iter().filter(|unit| unit.is_alive()).collect();
        let default_vision = self.tuning.default_vision_tiles * grid.tile_length();

        self.sightings.iter_mut().for_each(Vec::clear);
        if self.sightings.len() < living.len() {
            self.sightings.resize_with(living.len(), Vec::new);
        }

        for (first_index, first) in living.iter().enumerate() {
            let first_reach = first.vision.max(default_vision);
            for (offset, second) in living.iter().skip(first_index + 1).enumerate() {
                let second_index = first_index + 1 + offset;
                let distance = first.distance_to(second);
                if distance <= first_reach {
                    self.sightings[first_index].push(Contact {
                        unit: second.id,
                        distance,
                    });
                }
                if distance <= second.vision.max(default_vision) {
                    self.sightings[second_index].push(Contact {
                        unit: first.id,
                        distance,
                    });
                }
            }
        }

        let mut snapshot = PerceptionSnapshot::default();
        for (index, unit) in living.iter().enumerate() {
            let seen = &mut self.sightings[index];
            seen.sort_by(|left, right| {
                left.distance
                    .total_cmp(&right.distance)
                    .then(left.unit.cmp(&right.unit))
            });

            let reach = unit.vision.max(default_vision);
            let entry = summarise(unit, seen, units, reach, &self.tuning, snapshot.contacts.len());
            snapshot.contacts.extend(seen.iter().copied());
            snapshot.units.push(entry);
        }

        snapshot.bases = self.update_bases(&living, grid);
        snapshot
    }

    fn update_bases(&mut self, living: &[&UnitSnapshot], grid: TileGrid) -> Vec<BaseDanger> {
        let vigilance = self.tuning.base_vigilance_tiles * grid.tile_length();
        let alpha = self.tuning.danger_smoothing.clamp(0.0, 1.0);
        let mut bases = Vec::new();

        for base in living
            .iter()
            .filter(|unit| unit.category == UnitCategory::Structure)
        {
            let raw = raw_base_danger(base, living, vigilance, &self.tuning);
            let previous = self.smoothed.get(&base.id).copied().unwrap_or(0.0);
            let danger = (previous * (1.0 - alpha) + raw * alpha).clamp(0.0, 1.0);
            trace!(base = base.id.get(), raw, danger, "base danger updated");
            bases.push(BaseDanger {
                base: base.id,
                team: base.team,
                danger,
            });
        }

        self.smoothed = bases.iter().map(|entry| (entry.base, entry.danger)).collect();
        bases
    }
}

fn summarise(
    unit: &UnitSnapshot,
    seen: &[Contact],
    units: &UnitView,
    reach: f32,
    tuning: &PerceptionTuning,
    start: usize,
) -> UnitPerception {
    let health_ratio = unit.health.ratio();
    let mut nearest_enemy = None;
    let mut nearest_ally = None;
    let mut threat_total = 0.0;
    let mut enemy_count = 0_u32;

    for contact in seen {
        let Some(other) = units.get(contact.unit) else {
            continue;
        };
        if !other.category.is_mobile() {
            continue;
        }

        if other.team == unit.team {
            if nearest_ally.is_none() {
                nearest_ally = Some(*contact);
            }
            continue;
        }

        if nearest_enemy.is_none() {
            nearest_enemy = Some(*contact);
        }
        let closeness = 1.0 - contact.distance / reach.max(f32::EPSILON);
        let frailty = 1.0 + (1.0 - other.health.ratio());
        threat_total += (closeness * frailty).max(0.0);
        enemy_count += 1;
    }

    let danger = if enemy_count == 0 {
        0.0
    } else {
        let average = threat_total / enemy_count as f32;
        (average * tuning.enemy_threat_weight + (1.0 - health_ratio) * tuning.own_health_weight)
            .clamp(0.0, 1.0)
    };

    UnitPerception {
        id: unit.id,
        team: unit.team,
        position: unit.position,
        health_ratio,
        danger,
        nearest_enemy,
        nearest_ally,
        visible: start..start + seen.len(),
    }
}

fn raw_base_danger(
    base: &UnitSnapshot,
    living: &[&UnitSnapshot],
    vigilance: f32,
    tuning: &PerceptionTuning,
) -> f32 {
    let mut pressure = 0.0;
    let mut guarded = false;

    for other in living.iter().filter(|other| other.category.is_mobile()) {
        let distance = base.distance_to(other);
        if distance > vigilance {
            continue;
        }
        if other.team == base.team {
            guarded = true;
        } else {
            pressure += (vigilance - distance) / vigilance.max(f32::EPSILON);
        }
    }

    let pressure = f32::min(pressure, 1.0);
    let mut raw = pressure + (1.0 - base.health.ratio()) * tuning.base_health_weight;
    if pressure > 0.0 && !guarded {
        raw += tuning.isolation_penalty;
    }
    raw.clamp(0.0, 1.0)
}
