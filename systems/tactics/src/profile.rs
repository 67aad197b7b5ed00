//! Closed set of behavior profiles and their per-profile constants.

use serde::Deserialize;
use skirmish_core::UnitCategory;

/// Decision style a mobile unit follows, chosen by its category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BehaviorProfile {
    /// Ranged unit that covers melee allies and hunts aerial threats.
    Marksman,
    /// Melee unit that leads assaults.
    Vanguard,
    /// Aerial siege unit that fights from long range.
    Siege,
}

impl BehaviorProfile {
    /// Profile driving units of the category; structures have none.
    #[must_use]
    pub const fn for_category(category: UnitCategory) -> Option<Self> {
        match category {
            UnitCategory::Ranged => Some(Self::Marksman),
            UnitCategory::Melee => Some(Self::Vanguard),
            UnitCategory::Aerial => Some(Self::Siege),
            UnitCategory::Structure => None,
        }
    }
}

/// Constants parameterising a single profile.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileTuning {
    /// Whether the profile stays with and covers melee allies.
    pub supports_allies: bool,
    /// Whether the profile breaks off to hunt aerial enemies.
    pub hunts_aerial: bool,
    /// Fraction of attack range kept from the focal enemy in a group assault.
    pub standoff: f32,
    /// Extra ring radius added to every assault slot.
    pub spread_base: f32,
    /// Extra ring radius added per slot index modulo three.
    pub spread_step: f32,
}

impl ProfileTuning {
    /// Ring spread applied to the assault slot with the provided index.
    #[must_use]
    pub fn spread(&self, slot: usize) -> f32 {
        self.spread_base + self.spread_step * (slot % 3) as f32
    }
}

/// Tuning for every profile.
///
/// Deserialising overrides individual fields; anything left out keeps the
/// profile's own preset rather than a shared default.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "TableOverrides")]
pub struct ProfileTable {
    /// Constants for [`BehaviorProfile::Marksman`].
    pub marksman: ProfileTuning,
    /// Constants for [`BehaviorProfile::Vanguard`].
    pub vanguard: ProfileTuning,
    /// Constants for [`BehaviorProfile::Siege`].
    pub siege: ProfileTuning,
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self {
            marksman: ProfileTuning {
                supports_allies: true,
                hunts_aerial: true,
                standoff: 0.85,
                spread_base: 20.0,
                spread_step: 8.0,
            },
            vanguard: ProfileTuning {
                supports_allies: false,
                hunts_aerial: false,
                standoff: 0.5,
                spread_base: 0.0,
                spread_step: 0.0,
            },
            siege: ProfileTuning {
                supports_allies: false,
                hunts_aerial: false,
                standoff: 0.85,
                spread_base: 12.0,
                spread_step: 6.0,
            },
        }
    }
}

impl ProfileTable {
    /// Constants for the provided profile.
    #[must_use]
    pub fn get(&self, profile: BehaviorProfile) -> &ProfileTuning {
        match profile {
            BehaviorProfile::Marksman => &self.marksman,
            BehaviorProfile::Vanguard => &self.vanguard,
            BehaviorProfile::Siege => &self.siege,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TableOverrides {
    marksman: Overrides,
    vanguard: Overrides,
    siege: Overrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Overrides {
    supports_allies: Option<bool>,
    hunts_aerial: Option<bool>,
    standoff: Option<f32>,
    spread_base: Option<f32>,
    spread_step: Option<f32>,
}

impl Overrides {
    fn apply(self, preset: &mut ProfileTuning) {
        if let Some(value) = self.supports_allies {
            preset.supports_allies = value;
        }
        if let Some(value) = self.hunts_aerial {
            preset.hunts_aerial = value;
        }
        if let Some(value) = self.standoff {
            preset.standoff = value;
        }
        if let Some(value) = self.spread_base {
            preset.spread_base = value;
        }
        if let Some(value) = self.spread_step {
            preset.spread_step = value;
        }
    }
}

impl From<TableOverrides> for ProfileTable {
    fn from(overrides: TableOverrides) -> Self {
        let mut table = Self::default();
        overrides.marksman.apply(&mut table.marksman);
        overrides.vanguard.apply(&mut table.vanguard);
        overrides.siege.apply(&mut table.siege);
        table
    }
}
