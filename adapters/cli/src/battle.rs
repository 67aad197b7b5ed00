//! Drives the engine through a scenario and summarises the outcome.

use std::{cell::RefCell, fmt, rc::Rc, time::Duration};

use skirmish_core::{Command, Event, TeamId, UnitCategory, UnitDeath, UnitId};
use skirmish_engine::{Engine, TacticalMode};
use skirmish_world::{query, World};
use tracing::{info, warn};

use crate::scenario::Scenario;

/// Engine loaded with a scenario plus the deaths it has reported.
pub(crate) struct Battle {
    engine: Engine,
    deaths: Rc<RefCell<Vec<UnitDeath>>>,
}

impl Battle {
    /// Builds the scenario's battlefield and registers the death recorder.
    pub(crate) fn new(scenario: &Scenario, seed: u64) -> Self {
        let mut engine = Engine::new(World::new(), scenario.tuning.clone(), seed);
        let mut events = Vec::new();
        for command in scenario.commands() {
            let placement = matches!(command, Command::SpawnUnit { .. });
            let before = events.len();
            engine.apply(command, &mut events);
            let spawned = events[before..]
                .iter()
                .any(|event| matches!(event, Event::UnitSpawned { .. }));
            if placement && !spawned {
                warn!("scenario unit skipped");
            }
        }

        let deaths = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&deaths);
        engine.on_unit_died(Box::new(move |death| sink.borrow_mut().push(*death)));
        Self { engine, deaths }
    }

    /// Advances up to `ticks` steps, stopping early once one team remains.
    pub(crate) fn run(&mut self, ticks: u32, dt: Duration) -> Report {
        let mut elapsed = 0;
        while elapsed < ticks && query::teams(self.engine.world()).len() > 1 {
            let _ = self.engine.per_tick_update(dt);
            elapsed += 1;
        }
        info!(ticks = elapsed, deaths = self.deaths.borrow().len(), "battle finished");
        self.report(elapsed)
    }

    fn report(&self, ticks: u32) -> Report {
        let world = self.engine.world();
        let units = query::unit_view(world);
        let survivors = units
            .iter()
            .map(|unit| Survivor {
                unit: unit.id,
                team: unit.team,
                category: unit.category,
                health: unit.health.current(),
                max_health: unit.health.max(),
            })
            .collect();
        let mut teams: Vec<TeamId> = self
            .deaths
            .borrow()
            .iter()
            .flat_map(|death| [death.team, death.killer_team])
            .chain(query::teams(world))
            .collect();
        teams.sort_unstable();
        teams.dedup();
        let standings = teams
            .into_iter()
            .map(|team| Standing {
                team,
                treasury: query::treasury(world, team),
                mode: self.engine.tactical_mode(team),
            })
            .collect();

        Report {
            ticks,
            deaths: self.deaths.borrow().clone(),
            survivors,
            standings,
        }
    }
}

/// Outcome printed once the battle ends.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Report {
    ticks: u32,
    deaths: Vec<UnitDeath>,
    survivors: Vec<Survivor>,
    standings: Vec<Standing>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Survivor {
    unit: UnitId,
    team: TeamId,
    category: UnitCategory,
    health: u32,
    max_health: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Standing {
    team: TeamId,
    treasury: u32,
    mode: Option<TacticalMode>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ticks simulated: {}", self.ticks)?;

        writeln!(f, "deaths: {}", self.deaths.len())?;
        for death in &self.deaths {
            writeln!(
                f,
                "  unit {} (team {}) killed by team {}, refund {}",
                death.unit.get(),
                death.team.get(),
                death.killer_team.get(),
                death.refund
            )?;
        }

        writeln!(f, "survivors: {}", self.survivors.len())?;
        for survivor in &self.survivors {
            writeln!(
                f,
                "  unit {} (team {}, {:?}) {}/{} hp",
                survivor.unit.get(),
                survivor.team.get(),
                survivor.category,
                survivor.health,
                survivor.max_health
            )?;
        }

        writeln!(f, "teams:")?;
        for standing in &self.standings {
            let mode = standing
                .mode
                .map_or_else(|| "none".to_owned(), |mode| format!("{mode:?}"));
            writeln!(
                f,
                "  team {}: treasury {}, mode {}",
                standing.team.get(),
                standing.treasury,
                mode
            )?;
        }
        Ok(())
    }
}
