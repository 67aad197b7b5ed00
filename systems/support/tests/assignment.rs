use std::{collections::BTreeMap, time::Duration};

use glam::Vec2;
use skirmish_core::{Command, TeamId, TickContext, UnitCategory, UnitId, UnitStats};
use skirmish_system_support::SupportResolver;
use skirmish_world::{self as world, query, World};

fn spawn(world: &mut World, team: u8, category: UnitCategory, x: f32, y: f32) {
    let mut events = Vec::new();
    world::apply(
        world,
        Command::SpawnUnit {
            team: TeamId::new(team),
            category,
            position: Vec2::new(x, y),
            stats: UnitStats::for_category(category, 32.0),
        },
        &mut events,
    );
    assert_eq!(events.len(), 1, "spawn at ({x}, {y}) was refused");
}

fn context(tick: u64) -> TickContext {
    TickContext::new(tick, Duration::from_millis(100))
}

#[test]
fn reservation_to_an_ally_in_combat_is_kept() {
    let mut world = World::new();
    spawn(&mut world, 0, UnitCategory::Melee, 200.0, 200.0);
    spawn(&mut world, 0, UnitCategory::Melee, 520.0, 200.0);
    spawn(&mut world, 0, UnitCategory::Ranged, 220.0, 300.0);
    spawn(&mut world, 0, UnitCategory::Ranged, 500.0, 300.0);
    spawn(&mut world, 1, UnitCategory::Melee, 200.0, 100.0);
    spawn(&mut world, 1, UnitCategory::Melee, 560.0, 120.0);

    let mut resolver = SupportResolver::default();
    let units = query::unit_view(&world);
    resolver.resolve(context(0), &units);
    let first: Vec<_> = resolver.assignments().collect();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|(_, assignment)| assignment.active));

    for tick in 1..20 {
        resolver.resolve(context(tick), &units);
        let again: Vec<_> = resolver.assignments().collect();
        assert_eq!(again, first, "reservations changed on tick {tick}");
    }
}

#[test]
fn idle_allies_share_supporters_evenly() {
    let mut world = World::new();
    for column in 0..3 {
        spawn(&mut world, 0, UnitCategory::Melee, 100.0 + 250.0 * column as f32, 100.0);
    }
    for index in 0..7 {
        spawn(&mut world, 0, UnitCategory::Ranged, 60.0 + 90.0 * index as f32, 600.0);
    }

    let mut resolver = SupportResolver::default();
    resolver.resolve(context(0), &query::unit_view(&world));

    let chosen: Vec<(u32, u32)> = resolver
        .assignments()
        .map(|(unit, assignment)| (unit.get(), assignment.ally.get()))
        .collect();
    assert_eq!(
        chosen,
        vec![(3, 0), (4, 1), (5, 2), (6, 1), (7, 2), (8, 0), (9, 2)]
    );

    let mut counts: BTreeMap<UnitId, u32> = BTreeMap::new();
    for (_, assignment) in resolver.assignments() {
        *counts.entry(assignment.ally).or_default() += 1;
    }
    assert_eq!(
        counts,
        BTreeMap::from([(UnitId::new(0), 2), (UnitId::new(1), 2), (UnitId::new(2), 3)])
    );
    for (ally, count) in &counts {
        assert_eq!(resolver.reservations(*ally), *count);
    }
}

#[test]
fn reservations_survive_movement_without_deaths() {
    let mut world = World::new();
    spawn(&mut world, 0, UnitCategory::Melee, 100.0, 100.0);
    spawn(&mut world, 0, UnitCategory::Melee, 400.0, 100.0);
    spawn(&mut world, 0, UnitCategory::Ranged, 250.0, 300.0);

    let mut resolver = SupportResolver::default();
    resolver.resolve(context(0), &query::unit_view(&world));
    let reserved = resolver.assignment(UnitId::new(2)).map(|entry| entry.ally);
    assert!(reserved.is_some());

    let mut events = Vec::new();
    world::apply(
        &mut world,
        Command::SteerUnit {
            unit: UnitId::new(2),
            velocity: Vec2::new(50.0, 0.0),
        },
        &mut events,
    );
    for tick in 1..10 {
        world::apply(
            &mut world,
            Command::Tick {
                dt: Duration::from_millis(100),
            },
            &mut events,
        );
        resolver.resolve(context(tick), &query::unit_view(&world));
        assert_eq!(
            resolver.assignment(UnitId::new(2)).map(|entry| entry.ally),
            reserved
        );
    }
}
