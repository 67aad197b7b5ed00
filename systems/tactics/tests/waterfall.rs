use std::time::Duration;

use glam::Vec2;
use skirmish_core::{
    Behavior, CellCoord, Command, TeamId, TerrainKind, TickContext, TileCoord, UnitCategory,
    UnitId, UnitIntent, UnitStats,
};
use skirmish_system_perception::Perception;
use skirmish_system_support::SupportResolver;
use skirmish_system_tactics::{Movement, Plan, TacticalInputs, Tactics};
use skirmish_world::{self as world, query, World};

struct Harness {
    world: World,
    perception: Perception,
    support: SupportResolver,
    tactics: Tactics,
    tick: u64,
}

impl Harness {
    fn new() -> Self {
        Self {
            world: World::new(),
            perception: Perception::default(),
            support: SupportResolver::default(),
            tactics: Tactics::default(),
            tick: 0,
        }
    }

    fn apply(&mut self, command: Command) -> usize {
        let mut events = Vec::new();
        world::apply(&mut self.world, command, &mut events);
        events.len()
    }

    fn spawn(&mut self, team: u8, category: UnitCategory, x: f32, y: f32) -> UnitId {
        let before = query::unit_view(&self.world).len();
        assert_eq!(
            self.apply(Command::SpawnUnit {
                team: TeamId::new(team),
                category,
                position: Vec2::new(x, y),
                stats: UnitStats::for_category(category, 32.0),
            }),
            1,
            "spawn at ({x}, {y}) was refused"
        );
        let units = query::unit_view(&self.world);
        assert_eq!(units.len(), before + 1);
        units
            .iter()
            .map(|unit| unit.id)
            .max()
            .expect("spawned unit")
    }

    fn block(&mut self, column: u32, row: u32) {
        let _ = self.apply(Command::PaintTerrain {
            cell: CellCoord::new(column, row),
            kind: TerrainKind::Blocked,
        });
    }

    fn decide(&mut self, unit: UnitId) -> Option<Plan> {
        let context = TickContext::new(self.tick, Duration::from_millis(100));
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
        self.tactics.decide(unit, &inputs)
    }

    fn handle(&mut self) -> Vec<UnitIntent> {
        let context = TickContext::new(self.tick, Duration::from_millis(100));
        self.tick += 1;
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
        let mut intents = Vec::new();
        self.tactics.handle(context, &inputs, &mut intents);
        intents
    }
}

fn close(left: Vec2, right: Vec2) -> bool {
    left.distance(right) < 1e-2
}

fn destination(plan: &Plan) -> Vec2 {
    match plan.movement {
        Movement::MoveTo(point) => point,
        Movement::Hold => panic!("expected movement, got hold in {plan:?}"),
    }
}

#[test]
fn marksman_stays_with_a_fighting_melee_ally() {
    let mut harness = Harness::new();
    let _ally = harness.spawn(0, UnitCategory::Melee, 300.0, 300.0);
    let marksman = harness.spawn(0, UnitCategory::Ranged, 300.0, 380.0);
    let attacker = harness.spawn(1, UnitCategory::Melee, 300.0, 250.0);

    let plan = harness.decide(marksman).expect("plan");
    assert_eq!(plan.behavior, Behavior::HoldWithAlly);
    assert_eq!(plan.focus, Some(attacker));
    assert!(close(destination(&plan), Vec2::new(300.0, 360.0)));
}

#[test]
fn idle_marksman_keeps_formation_behind_its_ally() {
    let mut harness = Harness::new();
    let _ally = harness.spawn(0, UnitCategory::Melee, 200.0, 200.0);
    let marksman = harness.spawn(0, UnitCategory::Ranged, 200.0, 300.0);
    let _distant = harness.spawn(1, UnitCategory::Melee, 600.0, 600.0);

    let plan = harness.decide(marksman).expect("plan");
    assert_eq!(plan.behavior, Behavior::SupportAlly);
    assert_eq!(plan.focus, None);
    assert!(close(destination(&plan), Vec2::new(200.0, 260.0)));
}

#[test]
fn threats_to_the_home_base_are_intercepted() {
    let mut harness = Harness::new();
    let _base = harness.spawn(0, UnitCategory::Structure, 100.0, 100.0);
    let defender = harness.spawn(0, UnitCategory::Ranged, 400.0, 400.0);
    let raider = harness.spawn(1, UnitCategory::Melee, 200.0, 100.0);

    let plan = harness.decide(defender).expect("plan");
    assert_eq!(plan.behavior, Behavior::InterceptBaseThreat);
    assert_eq!(plan.focus, Some(raider));
    let stand_off = destination(&plan).distance(Vec2::new(200.0, 100.0));
    assert!((stand_off - 57.6).abs() < 1e-2, "stand off {stand_off}");
}

#[test]
fn only_marksmen_hunt_aerial_threats() {
    let mut harness = Harness::new();
    let marksman = harness.spawn(0, UnitCategory::Ranged, 100.0, 100.0);
    let flier = harness.spawn(1, UnitCategory::Aerial, 500.0, 100.0);
    let brawler = harness.spawn(0, UnitCategory::Melee, 100.0, 140.0);

    let hunt = harness.decide(marksman).expect("plan");
    assert_eq!(hunt.behavior, Behavior::HuntPriorityThreat);
    assert_eq!(hunt.focus, Some(flier));
    assert!(close(destination(&hunt), Vec2::new(418.4, 100.0)));

    let engage = harness.decide(brawler).expect("plan");
    assert_eq!(engage.behavior, Behavior::EngageNearest);
    assert_eq!(engage.focus, Some(flier));
}

#[test]
fn lone_unit_returns_to_an_unguarded_base() {
    let mut harness = Harness::new();
    let _base = harness.spawn(0, UnitCategory::Structure, 100.0, 100.0);
    let sentry = harness.spawn(0, UnitCategory::Melee, 400.0, 100.0);
    let _far = harness.spawn(1, UnitCategory::Melee, 700.0, 700.0);

    let plan = harness.decide(sentry).expect("plan");
    assert_eq!(plan.behavior, Behavior::DefendBase);
    assert!(close(destination(&plan), Vec2::new(200.0, 100.0)));
}

#[test]
fn outnumbered_unit_retreats_toward_home() {
    let mut harness = Harness::new();
    let _base = harness.spawn(0, UnitCategory::Structure, 100.0, 100.0);
    let _guard = harness.spawn(0, UnitCategory::Melee, 150.0, 100.0);
    let straggler = harness.spawn(0, UnitCategory::Melee, 500.0, 400.0);
    let _siege = harness.spawn(1, UnitCategory::Aerial, 500.0, 600.0);

    let plan = harness.decide(straggler).expect("plan");
    assert_eq!(plan.behavior, Behavior::Retreat);
    assert_eq!(plan.focus, None);
    assert!(close(destination(&plan), Vec2::new(176.8, 157.6)));
}

#[test]
fn empty_field_advances_on_the_enemy_base() {
    let mut harness = Harness::new();
    let _base = harness.spawn(0, UnitCategory::Structure, 100.0, 100.0);
    let _guard = harness.spawn(0, UnitCategory::Melee, 150.0, 100.0);
    let scout = harness.spawn(0, UnitCategory::Melee, 300.0, 300.0);
    let target = harness.spawn(1, UnitCategory::Structure, 650.0, 650.0);

    let plan = harness.decide(scout).expect("plan");
    assert_eq!(plan.behavior, Behavior::AdvanceOnEnemyBase);
    assert_eq!(plan.focus, Some(target));
}

#[test]
fn stronger_group_surrounds_the_focal_enemy() {
    let mut harness = Harness::new();
    let squad = [
        harness.spawn(0, UnitCategory::Melee, 200.0, 300.0),
        harness.spawn(0, UnitCategory::Melee, 200.0, 340.0),
        harness.spawn(0, UnitCategory::Melee, 200.0, 380.0),
    ];
    let focal = harness.spawn(1, UnitCategory::Melee, 400.0, 340.0);

    let mut slots = Vec::new();
    for member in squad {
        let plan = harness.decide(member).expect("plan");
        assert_eq!(plan.behavior, Behavior::GroupAssault);
        assert_eq!(plan.focus, Some(focal));
        let slot = destination(&plan);
        assert!((slot.distance(Vec2::new(400.0, 340.0)) - 16.0).abs() < 1e-2);
        slots.push(slot);
    }
    assert!(!close(slots[0], slots[1]));
    assert!(!close(slots[1], slots[2]));
    assert!(!close(slots[0], slots[2]));
}

#[test]
fn structures_receive_no_intent() {
    let mut harness = Harness::new();
    let base = harness.spawn(0, UnitCategory::Structure, 100.0, 100.0);
    let guard = harness.spawn(0, UnitCategory::Melee, 140.0, 100.0);

    assert_eq!(harness.decide(base), None);
    let intents = harness.handle();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].unit, guard);
}

#[test]
fn walled_off_enemy_leaves_the_unit_standing() {
    let mut harness = Harness::new();
    let _ = harness.apply(Command::ConfigureBattlefield {
        columns: TileCoord::new(8),
        rows: TileCoord::new(8),
        tile_length: 32.0,
    });
    for (column, row) in [(5, 0), (5, 1), (5, 2), (6, 2), (7, 2)] {
        harness.block(column, row);
    }
    let seeker = harness.spawn(0, UnitCategory::Melee, 48.0, 208.0);
    let _hidden = harness.spawn(1, UnitCategory::Melee, 208.0, 48.0);

    let intents = harness.handle();
    let intent = intents
        .iter()
        .find(|intent| intent.unit == seeker)
        .expect("intent");
    assert_eq!(intent.behavior, Behavior::GroupAssault);
    assert_eq!(intent.velocity, Vec2::ZERO);
    assert!(harness.tactics.navigator().request(seeker).is_none());
}

#[test]
fn routes_around_walls_are_followed_on_later_ticks() {
    let mut harness = Harness::new();
    for row in 0..16 {
        harness.block(9, row);
    }
    let walker = harness.spawn(0, UnitCategory::Melee, 100.0, 300.0);
    let _enemy = harness.spawn(1, UnitCategory::Melee, 500.0, 300.0);

    let intents = harness.handle();
    let first = intents
        .iter()
        .find(|intent| intent.unit == walker)
        .expect("intent");
    assert_eq!(first.behavior, Behavior::EngageNearest);
    assert!(first.velocity.length() > 0.0);

    let plan = harness.decide(walker).expect("plan");
    assert_eq!(plan.behavior, Behavior::FollowPath);
    assert!(close(destination(&plan), Vec2::new(480.8, 300.0)));
}

#[test]
fn drifting_target_replaces_the_stale_route() {
    let mut harness = Harness::new();
    for row in 0..16 {
        harness.block(9, row);
    }
    let walker = harness.spawn(0, UnitCategory::Melee, 100.0, 300.0);
    let enemy = harness.spawn(1, UnitCategory::Melee, 500.0, 300.0);

    let _ = harness.handle();
    let planned = harness
        .tactics
        .navigator()
        .request(walker)
        .expect("route")
        .destination();
    assert!(close(planned, Vec2::new(480.8, 300.0)));

    let _ = harness.apply(Command::SteerUnit {
        unit: enemy,
        velocity: Vec2::new(0.0, 60.0),
    });
    let _ = harness.apply(Command::Tick {
        dt: Duration::from_secs(2),
    });

    let plan = harness.decide(walker).expect("plan");
    assert_eq!(plan.behavior, Behavior::EngageNearest);
    assert_eq!(plan.focus, Some(enemy));
    let wanted = destination(&plan);
    assert!(wanted.distance(planned) > 16.0, "wanted {wanted}");

    let intents = harness.handle();
    let intent = intents
        .iter()
        .find(|intent| intent.unit == walker)
        .expect("intent");
    assert_eq!(intent.behavior, Behavior::EngageNearest);
    let replanned = harness
        .tactics
        .navigator()
        .request(walker)
        .expect("route")
        .destination();
    assert!(close(replanned, wanted), "replanned {replanned}");
}

#[test]
fn busy_allies_are_left_out_of_the_assault_ring() {
    let mut harness = Harness::new();
    let _base = harness.spawn(0, UnitCategory::Structure, 100.0, 100.0);
    let guard = harness.spawn(0, UnitCategory::Melee, 150.0, 100.0);
    let left = harness.spawn(0, UnitCategory::Melee, 400.0, 300.0);
    let right = harness.spawn(0, UnitCategory::Melee, 400.0, 340.0);
    let focal = harness.spawn(1, UnitCategory::Melee, 600.0, 320.0);
    let centre = Vec2::new(600.0, 320.0);

    let midpoint = |harness: &mut Harness| {
        let slots: Vec<Vec2> = [left, right]
            .into_iter()
            .map(|member| {
                let plan = harness.decide(member).expect("plan");
                assert_eq!(plan.behavior, Behavior::GroupAssault);
                assert_eq!(plan.focus, Some(focal));
                destination(&plan)
            })
            .collect();
        (slots[0] + slots[1]) / 2.0
    };

    // Without history every ally counts as idle, so the ring has three slots.
    assert!(!close(midpoint(&mut harness), centre));

    let _ = harness.handle();
    assert_eq!(harness.tactics.commitment(guard), Some(Behavior::DefendBase));
    assert_eq!(harness.tactics.commitment(left), Some(Behavior::GroupAssault));
    assert!(close(midpoint(&mut harness), centre));
}
