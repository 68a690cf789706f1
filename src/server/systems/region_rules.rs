//! # Region Rules
//!
//! Periodic sweep of the dungeon's standing rules: sigils dissolve when
//! carried outside, and the arena is locked whenever no sequence or cleanup
//! is running.

use bevy::prelude::*;

use crate::{
    common::{
        components::{faction::Faction, sigil::Sigil, spawner::CampSpawner, Behaviour, Loc},
        message::{Do, Event, MsgId},
    },
    server::{
        resources::{
            layout::DungeonLayout,
            scheduler::{Action, Scheduler},
        },
        systems::encounter::Encounter,
    },
};

pub fn enforce_region_rules(
    time: Res<Time>,
    layout: Res<DungeonLayout>,
    mut scheduler: ResMut<Scheduler>,
    encounters: Query<&Encounter>,
    mut movers: Query<(Entity, &mut Loc), Without<CampSpawner>>,
    behaviours: Query<&Behaviour>,
    sigils: Query<(Entity, &Sigil)>,
    mut writer: EventWriter<Do>,
) {
    // a sigil carried out of the dungeon dissolves; actual removal runs
    // through the scheduler so it lands in the same serialized step as every
    // other state change
    for (ent, _) in sigils.iter() {
        let outside = movers
            .get(ent)
            .map(|(_, loc)| !layout.in_dungeon(**loc))
            .unwrap_or(false);
        if outside {
            scheduler.defer(time.elapsed(), Action::DissolveSigil { ent });
        }
    }

    let locked = encounters.iter().all(|enc| !enc.in_sequence());
    if !locked {
        return;
    }
    let intruders: Vec<(Entity, Option<Entity>, Option<Sigil>)> = movers
        .iter()
        .filter(|&(ent, loc)| {
            matches!(behaviours.get(ent), Ok(Behaviour::Controlled)) && layout.arena.contains(**loc)
        })
        .map(|(ent, _)| {
            let sigil = sigils.get(ent).ok().map(|(_, s)| *s);
            (ent, sigil.and_then(|s| s.puppet), sigil)
        })
        .collect();
    for (ent, puppet, sigil) in intruders {
        let faction = sigil.map(|s| s.faction).unwrap_or(Faction::Umbral);
        let dest = layout.staging_for(faction).random_point();
        if let Ok((_, mut loc)) = movers.get_mut(ent) {
            *loc = Loc::new(dest);
        }
        if let Some(puppet_ent) = puppet {
            if let Ok((_, mut loc)) = movers.get_mut(puppet_ent) {
                *loc = Loc::new(dest);
            }
        }
        writer.write(Do { event: Event::Notify { ent, msg: MsgId::Recalled } });
    }
}
