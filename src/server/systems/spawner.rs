//! # Camp Spawners
//!
//! Keeps each faction's ward stocked with conscriptable creatures. Camps are
//! lazy: outside a respawn reset they only restock while a player is inside
//! the ward, and never more often than their cooldown allows.

use bevy::{ecs::hierarchy::ChildOf, prelude::*};
use rand::Rng;

use crate::{
    common::components::{
        faction::Faction,
        sigil::Creature,
        spawner::CampSpawner,
        Behaviour, Health, Loc,
    },
    server::resources::layout::DungeonLayout,
};

pub const DEFAULT_RESPAWN_MS: u32 = 60_000;

pub fn tick_spawners(
    mut commands: Commands,
    time: Res<Time>,
    layout: Res<DungeonLayout>,
    mut camps: Query<(Entity, &mut CampSpawner)>,
    spawned: Query<&ChildOf, With<Creature>>,
    players: Query<(&Loc, &Behaviour)>,
) {
    let elapsed = time.elapsed().as_millis();
    for (camp_ent, mut camp) in camps.iter_mut() {
        let cooled =
            elapsed.saturating_sub(camp.last_spawn_attempt) >= camp.respawn_timer_ms as u128;
        if !camp.needs_respawn && !cooled {
            continue;
        }

        // an empty ward restocks only when forced by a reset
        let ward = layout.ward_for(camp.faction);
        let player_in_ward = players
            .iter()
            .any(|(loc, b)| matches!(b, Behaviour::Controlled) && ward.contains(**loc));
        if !camp.needs_respawn && !player_in_ward {
            continue;
        }

        let alive = spawned.iter().filter(|c| c.parent() == camp_ent).count();
        for _ in alive..camp.max_count as usize {
            spawn_creature(&mut commands, &camp, camp_ent);
        }
        camp.needs_respawn = false;
        camp.last_spawn_attempt = elapsed;
    }
}

fn spawn_creature(commands: &mut Commands, camp: &CampSpawner, camp_ent: Entity) {
    if camp.grounds.w <= 0 || camp.grounds.h <= 0 {
        warn!("camp {:?} has degenerate grounds, spawn skipped", camp.faction);
        return;
    }
    let mut rng = rand::rng();
    let power = rng.random_range(5..=15);
    let name = match camp.faction {
        Faction::Radiant => "a radiant warden",
        Faction::Umbral => "an umbral husk",
    };
    commands.spawn((
        Creature { faction: camp.faction, power },
        Health::full(400 + power * 20),
        Behaviour::Sentinel,
        Loc::new(camp.grounds.random_point()),
        Name::new(name),
        ChildOf(camp_ent),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::components::{Pt, Rect};
    use std::time::Duration;

    fn test_app() -> App {
        let mut app = App::new();
        app.init_resource::<Time>();
        app.init_resource::<DungeonLayout>();
        app.add_systems(Update, tick_spawners);
        app
    }

    fn spawn_camp(app: &mut App, faction: Faction) -> Entity {
        let ward = app.world().resource::<DungeonLayout>().ward_for(faction);
        let grounds = Rect::new(ward.x + 2, ward.y + 2, 10, 10);
        app.world_mut()
            .spawn((CampSpawner::new(faction, grounds, 4, DEFAULT_RESPAWN_MS), Loc::from_xy(grounds.x, grounds.y)))
            .id()
    }

    fn creature_count(app: &mut App, camp: Entity) -> usize {
        let world = app.world_mut();
        let mut query = world.query::<(&Creature, &ChildOf)>();
        query.iter(world).filter(|(_, c)| c.parent() == camp).count()
    }

    #[test]
    fn test_camp_restocks_only_while_a_player_is_in_the_ward() {
        let mut app = test_app();
        let camp = spawn_camp(&mut app, Faction::Radiant);

        // cooled down, but the ward is empty
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_millis(DEFAULT_RESPAWN_MS as u64 + 1));
        app.update();
        assert_eq!(creature_count(&mut app, camp), 0);

        let ward = app.world().resource::<DungeonLayout>().radiant_ward;
        app.world_mut()
            .spawn((Behaviour::Controlled, Loc::new(Pt::new(ward.x + 1, ward.y + 1, 0))));
        app.update();
        assert_eq!(creature_count(&mut app, camp), 4);
    }

    #[test]
    fn test_camp_respects_cooldown_between_attempts() {
        let mut app = test_app();
        let camp = spawn_camp(&mut app, Faction::Umbral);
        let ward = app.world().resource::<DungeonLayout>().umbral_ward;
        app.world_mut()
            .spawn((Behaviour::Controlled, Loc::new(Pt::new(ward.x + 1, ward.y + 1, 0))));

        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_millis(DEFAULT_RESPAWN_MS as u64 + 1));
        app.update();
        assert_eq!(creature_count(&mut app, camp), 4);

        // kill the stock; the camp must wait out its cooldown
        let world = app.world_mut();
        let mut query = world.query::<(Entity, &Creature)>();
        let dead: Vec<Entity> = query.iter(world).map(|(e, _)| e).collect();
        for ent in dead {
            app.world_mut().despawn(ent);
        }
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_millis(1_000));
        app.update();
        assert_eq!(creature_count(&mut app, camp), 0);

        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_millis(DEFAULT_RESPAWN_MS as u64));
        app.update();
        assert_eq!(creature_count(&mut app, camp), 4);
    }

    #[test]
    fn test_respawn_reset_bypasses_player_gate() {
        let mut app = test_app();
        let camp = spawn_camp(&mut app, Faction::Radiant);

        app.world_mut().get_mut::<CampSpawner>(camp).unwrap().needs_respawn = true;
        app.update();

        assert_eq!(creature_count(&mut app, camp), 4);
        assert!(!app.world().get::<CampSpawner>(camp).unwrap().needs_respawn);
    }
}
