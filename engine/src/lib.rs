#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-tick pipeline that drives every Skirmish system against the world.
//!
//! The engine owns the authoritative [`World`] together with one instance of
//! each system. [`Engine::per_tick_update`] advances the clock, rebuilds
//! perception, resolves support reservations, runs the decision waterfall,
//! resolves combat and finally dispatches death signals before rescoring the
//! strategist. Every phase reads fresh views of the world; only the world
//! mutates state, and it does so exclusively through [`Command`] values.

use std::{fmt, time::Duration};

use serde::Deserialize;
use skirmish_core::{Command, Event, TeamId, TickContext, UnitDeath, UnitIntent};
use skirmish_system_combat::Combat;
use skirmish_system_navigation::NavigationTuning;
use skirmish_system_perception::{Perception, PerceptionTuning};
use skirmish_system_strategy::{StrategyTuning, Strategist, TeamOutlook};
use skirmish_system_support::{SupportResolver, SupportTuning};
use skirmish_system_tactics::{TacticalInputs, Tactics, TacticsTuning};
use skirmish_world::{self as world, query, World};
use tracing::{debug, info_span};

pub use skirmish_system_strategy::TacticalMode;

/// Tuning for every system driven by the engine.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    /// Perception aggregator tuning.
    pub perception: PerceptionTuning,
    /// Pathfinder and waypoint follower tuning.
    pub navigation: NavigationTuning,
    /// Support resolver tuning.
    pub support: SupportTuning,
    /// Decision waterfall tuning.
    pub tactics: TacticsTuning,
    /// Strategist tuning.
    pub strategy: StrategyTuning,
}

/// Callback invoked once for every unit that dies.
pub type DeathHook = Box<dyn FnMut(&UnitDeath)>;

/// Owns the world and every system, and runs them in a fixed order.
pub struct Engine {
    world: World,
    perception: Perception,
    support: SupportResolver,
    tactics: Tactics,
    combat: Combat,
    strategist: Strategist,
    hooks: Vec<DeathHook>,
    events: Vec<Event>,
    commands: Vec<Command>,
    intents: Vec<UnitIntent>,
}

impl Engine {
    /// Creates an engine around `world`, seeding the strategist with `seed`.
    #[must_use]
    pub fn new(world: World, tuning: EngineTuning, seed: u64) -> Self {
        let EngineTuning {
            perception,
            navigation,
            support,
            tactics,
            strategy,
        } = tuning;
        Self {
            world,
            perception: Perception::new(perception),
            support: SupportResolver::new(support),
            tactics: Tactics::new(tactics, navigation),
            combat: Combat::new(),
            strategist: Strategist::new(strategy, seed),
            hooks: Vec::new(),
            events: Vec::new(),
            commands: Vec::new(),
            intents: Vec::new(),
        }
    }

    /// Read-only access to the authoritative world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Support reservations resolved on the most recent tick.
    #[must_use]
    pub fn support(&self) -> &SupportResolver {
        &self.support
    }

    /// Mode the strategist picked for the team on the most recent tick.
    #[must_use]
    pub fn tactical_mode(&self, team: TeamId) -> Option<TacticalMode> {
        self.strategist.mode(team)
    }

    /// Registers a hook that runs once for every death, in registration order.
    pub fn on_unit_died(&mut self, hook: DeathHook) {
        self.hooks.push(hook);
    }

    /// Applies an external command, dispatching any death it causes.
    pub fn apply(&mut self, command: Command, out_events: &mut Vec<Event>) {
        let start = out_events.len();
        world::apply(&mut self.world, command, out_events);
        dispatch_deaths(
            &out_events[start..],
            &mut self.support,
            &mut self.tactics,
            &mut self.hooks,
        );
    }

    /// Runs the full pipeline once and returns the intents, sorted by unit id.
    pub fn per_tick_update(&mut self, dt: Duration) -> Vec<UnitIntent> {
        self.events.clear();
        world::apply(&mut self.world, Command::Tick { dt }, &mut self.events);
        let context = TickContext::new(query::tick_index(&self.world), dt);
        let span = info_span!("tick", tick = context.tick());
        let _entered = span.enter();

        let units = query::unit_view(&self.world);
        let perception = self
            .perception
            .update(&units, query::tile_grid(&self.world));
        self.support.resolve(context, &units);

        let inputs = TacticalInputs {
            units: &units,
            terrain: query::terrain_view(&self.world),
            perception: &perception,
            support: &self.support,
        };
        self.tactics.handle(context, &inputs, &mut self.intents);

        for intent in &self.intents {
            world::apply(
                &mut self.world,
                Command::SteerUnit {
                    unit: intent.unit,
                    velocity: intent.velocity,
                },
                &mut self.events,
            );
            world::apply(
                &mut self.world,
                Command::SetTarget {
                    unit: intent.unit,
                    target: intent.attack,
                },
                &mut self.events,
            );
        }

        self.commands.clear();
        self.combat
            .handle(context, &query::unit_view(&self.world), &mut self.commands);
        for command in self.commands.drain(..) {
            world::apply(&mut self.world, command, &mut self.events);
        }

        dispatch_deaths(
            &self.events,
            &mut self.support,
            &mut self.tactics,
            &mut self.hooks,
        );

        let survivors = query::unit_view(&self.world);
        let outlooks: Vec<TeamOutlook> = query::teams(&self.world)
            .into_iter()
            .filter_map(|team| {
                TeamOutlook::measure(
                    team,
                    &survivors,
                    query::treasury(&self.world, team),
                    perception.base_danger(team),
                )
            })
            .collect();
        self.strategist.update(context, &outlooks);

        self.intents.clone()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("world", &self.world)
            .field("support", &self.support)
            .field("tactics", &self.tactics)
            .field("strategist", &self.strategist)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

fn dispatch_deaths(
    events: &[Event],
    support: &mut SupportResolver,
    tactics: &mut Tactics,
    hooks: &mut [DeathHook],
) {
    for event in events {
        let Event::UnitDied(death) = event else {
            continue;
        };
        debug!(
            unit = death.unit.get(),
            killer_team = death.killer_team.get(),
            hooks = hooks.len(),
            "dispatching death"
        );
        support.forget(death.unit);
        tactics.forget(death.unit);
        for hook in hooks.iter_mut() {
            hook(death);
        }
    }
}
