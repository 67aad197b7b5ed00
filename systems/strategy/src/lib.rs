#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Base-level strategist that picks a tactical mode per team.
//!
//! Every tick each team holding a home base scores the four modes from its
//! treasury, the pressure on its base and the balance of mobile forces. A
//! persistent personality biases the scores and a small amount of seeded
//! noise keeps evenly matched options from locking in forever.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use skirmish_core::{TeamId, TickContext, UnitView};
use tracing::{debug, info};

/// Overall posture a team adopts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TacticalMode {
    /// Push forward while the balance of forces allows.
    Aggressive,
    /// Pull back and protect the home base.
    Defensive,
    /// Save money while the base is safe.
    Economic,
    /// No strong preference.
    #[default]
    Balanced,
}

/// Weights and limits applied by the strategist.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct StrategyTuning {
    /// Half-width of the uniform range personalities are drawn from.
    pub bias_spread: f32,
    /// Standard deviation of the per-score noise.
    pub jitter: f32,
    /// Treasury at which the economic score saturates.
    pub money_cap: f32,
    /// Weight of the force advantage in the aggressive score.
    pub advantage_weight: f32,
    /// Weight of base pressure in the defensive score.
    pub pressure_weight: f32,
    /// Weight of the wealth term in the economic score.
    pub economy_weight: f32,
    /// Constant score of the balanced mode.
    pub balanced_score: f32,
}

impl Default for StrategyTuning {
    fn default() -> Self {
        Self {
            bias_spread: 0.15,
            jitter: 0.05,
            money_cap: 1500.0,
            advantage_weight: 1.0,
            pressure_weight: 1.2,
            economy_weight: 0.8,
            balanced_score: 0.35,
        }
    }
}

/// Persistent bias a team applies to its mode scores.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Personality {
    /// Bias added to the aggressive score.
    pub aggression: f32,
    /// Bias added to the defensive score.
    pub caution: f32,
    /// Bias added to the economic score.
    pub greed: f32,
}

/// Inputs the strategist scores for a single team.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TeamOutlook {
    /// Team being scored.
    pub team: TeamId,
    /// Money in the team's treasury.
    pub money: u32,
    /// Smoothed danger of the team's home base.
    pub pressure: f32,
    /// Force weight of the team's mobile units.
    pub ally_force: u32,
    /// Force weight of every opposing mobile unit.
    pub enemy_force: u32,
}

impl TeamOutlook {
    /// Measures the force balance for `team` from the unit view.
    ///
    /// Returns `None` when the team holds no home base.
    #[must_use]
    pub fn measure(team: TeamId, units: &UnitView, money: u32, pressure: f32) -> Option<Self> {
        let _ = units.home_base(team)?;
        let ally_force = units
            .mobile_allies_of(team)
            .map(|unit| unit.category.force_weight())
            .sum();
        let enemy_force = units
            .mobile_enemies_of(team)
            .map(|unit| unit.category.force_weight())
            .sum();
        Some(Self {
            team,
            money,
            pressure,
            ally_force,
            enemy_force,
        })
    }

    /// Share of the combined mobile force fighting for the team.
    #[must_use]
    pub fn advantage(&self) -> f32 {
        let total = self.ally_force.saturating_add(self.enemy_force);
        if total == 0 {
            0.5
        } else {
            self.ally_force as f32 / total as f32
        }
    }
}

/// Seeded strategist holding each team's personality and current mode.
#[derive(Debug)]
pub struct Strategist {
    tuning: StrategyTuning,
    rng: ChaCha8Rng,
    personalities: BTreeMap<TeamId, Personality>,
    modes: BTreeMap<TeamId, TacticalMode>,
}

impl Strategist {
    /// Creates a strategist whose randomness derives from `seed`.
    #[must_use]
    pub fn new(tuning: StrategyTuning, seed: u64) -> Self {
        Self {
            tuning,
            rng: ChaCha8Rng::seed_from_u64(seed),
            personalities: BTreeMap::new(),
            modes: BTreeMap::new(),
        }
    }

    /// Mode chosen for the team on the most recent update.
    #[must_use]
    pub fn mode(&self, team: TeamId) -> Option<TacticalMode> {
        self.modes.get(&team).copied()
    }

    /// Personality drawn for the team, if it has been seen.
    #[must_use]
    pub fn personality(&self, team: TeamId) -> Option<Personality> {
        self.personalities.get(&team).copied()
    }

    /// Rescores every team in `outlooks`; teams missing from it lose their mode.
    pub fn update(&mut self, context: TickContext, outlooks: &[TeamOutlook]) {
        self.modes
            .retain(|team, _| outlooks.iter().any(|outlook| outlook.team == *team));

        for outlook in outlooks {
            let personality = self.personality_for(outlook.team);
            let scores = self.score(outlook, personality);
            let mode = pick(&scores);
            debug!(
                tick = context.tick(),
                team = outlook.team.get(),
                ?scores,
                ?mode,
                "scored tactical modes"
            );

            let previous = self.modes.insert(outlook.team, mode);
            if previous != Some(mode) {
                info!(
                    tick = context.tick(),
                    team = outlook.team.get(),
                    ?previous,
                    ?mode,
                    "tactical mode changed"
                );
            }
        }
    }

    fn personality_for(&mut self, team: TeamId) -> Personality {
        if let Some(personality) = self.personalities.get(&team) {
            return *personality;
        }
        let spread = self.tuning.bias_spread.abs();
        let personality = Personality {
            aggression: self.rng.gen_range(-spread..=spread),
            caution: self.rng.gen_range(-spread..=spread),
            greed: self.rng.gen_range(-spread..=spread),
        };
        let _ = self.personalities.insert(team, personality);
        personality
    }

    fn score(&mut self, outlook: &TeamOutlook, personality: Personality) -> [(TacticalMode, f32); 4] {
        let tuning = &self.tuning;
        let pressure = outlook.pressure.clamp(0.0, 1.0);
        let wealth = if tuning.money_cap > 0.0 {
            (outlook.money as f32 / tuning.money_cap).min(1.0)
        } else {
            1.0
        };

        let mut scores = [
            (
                TacticalMode::Aggressive,
                outlook.advantage() * tuning.advantage_weight + personality.aggression,
            ),
            (
                TacticalMode::Defensive,
                pressure * tuning.pressure_weight + personality.caution,
            ),
            (
                TacticalMode::Economic,
                wealth * (1.0 - pressure) * tuning.economy_weight + personality.greed,
            ),
            (TacticalMode::Balanced, tuning.balanced_score),
        ];

        if let Ok(noise) = Normal::new(0.0_f32, tuning.jitter.abs()) {
            for (_, score) in scores.iter_mut() {
                *score += noise.sample(&mut self.rng);
            }
        }
        scores
    }
}

fn pick(scores: &[(TacticalMode, f32); 4]) -> TacticalMode {
    let mut best = scores[0];
    for &candidate in &scores[1..] {
        if candidate.1 > best.1 {
            best = candidate;
        }
    }
    best.0
}
