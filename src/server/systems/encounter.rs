//! # Encounter Orchestrator
//!
//! The recurring Hollowdeep boss encounter: a poll decides which faction's
//! army is called to battle, a grace period lets stragglers conscript, the
//! opposing overlord is seated in the arena under a hard deadline, and every
//! ending (victory, timeout, abandonment) converges on the same teardown.
//!
//! All phase mutation happens in [`apply_actions`], [`boss_slain`] and
//! [`enlistment`], which run chained on the `Update` schedule, so no two
//! callbacks for the same encounter ever interleave.

use std::time::Duration;

use bevy::prelude::*;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;

use crate::{
    common::{
        components::{
            faction::Faction,
            overlord::Overlord,
            sigil::{Creature, Puppet, Sigil},
            spawner::CampSpawner,
            Behaviour, Health, Loc,
        },
        message::{Do, Event, MsgId, Try},
    },
    server::resources::{
        layout::DungeonLayout,
        scheduler::{Action, Fire, Scheduler, TimerHandle},
    },
};

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const GRACE_PERIOD: Duration = Duration::from_secs(60);
pub const TRANSPORT_DELAY: Duration = Duration::from_secs(60);
pub const SEQUENCE_TICK: Duration = Duration::from_secs(60);
pub const CLEANUP_DELAY: Duration = Duration::from_secs(5 * 60);
pub const TEARDOWN_DEFER: Duration = Duration::from_secs(1);
pub const RESPAWN_RESET_DELAY: Duration = Duration::from_secs(10);

/// Cool-down between encounter attempts (wall clock).
pub const COOLDOWN_MINUTES: i64 = 5;
/// Hard cutoff for an overlord fight (wall clock).
pub const DEADLINE_MINUTES: i64 = 90;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Idle,
    Sequencing,
    InProgress,
    Cleanup,
}

/// One dungeon's encounter state. Lives on a controller entity for the whole
/// process lifetime; only the phase fields, boss and armies cycle between
/// encounters.
#[derive(Component, Debug)]
pub struct Encounter {
    pub enabled: bool,
    pub phase: Phase,
    /// Earliest wall-clock time the next poll may start a sequence. `None`
    /// while a sequence is pending or running.
    pub next_encounter: Option<DateTime<Utc>>,
    /// Set exactly while `phase == InProgress`.
    pub deadline: Option<DateTime<Utc>>,
    pub alignment: Option<Faction>,
    pub boss: Option<Entity>,
    /// Players slated for transport into the arena.
    pub pending: Vec<Entity>,
    pub players_in_sequence: bool,
    pub radiant_army: Vec<Entity>,
    pub umbral_army: Vec<Entity>,
    pub poll_handle: Option<TimerHandle>,
    pub sequence_handle: Option<TimerHandle>,
    pub cleanup_handle: Option<TimerHandle>,
}

impl Encounter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Encounter {
            enabled: true,
            phase: Phase::Idle,
            next_encounter: Some(now),
            deadline: None,
            alignment: None,
            boss: None,
            pending: Vec::new(),
            players_in_sequence: false,
            radiant_army: Vec::new(),
            umbral_army: Vec::new(),
            poll_handle: None,
            sequence_handle: None,
            cleanup_handle: None,
        }
    }

    pub fn army_mut(&mut self, faction: Faction) -> &mut Vec<Entity> {
        match faction {
            Faction::Radiant => &mut self.radiant_army,
            Faction::Umbral => &mut self.umbral_army,
        }
    }

    /// A sequence is active once its tick or cleanup timer is running. The
    /// grace period is intentionally not counted, matching the arena lockout
    /// rules.
    pub fn in_sequence(&self) -> bool {
        self.sequence_handle.is_some() || self.cleanup_handle.is_some()
    }
}

/// The single serialized transition system: applies every due [`Action`] in
/// the order the scheduler delivered them.
#[allow(clippy::too_many_arguments)]
pub fn apply_actions(
    mut commands: Commands,
    time: Res<Time>,
    layout: Res<DungeonLayout>,
    mut scheduler: ResMut<Scheduler>,
    mut reader: EventReader<Fire>,
    mut writer: EventWriter<Do>,
    mut encounters: Query<&mut Encounter>,
    mut movers: Query<(Entity, &mut Loc), Without<CampSpawner>>,
    behaviours: Query<&Behaviour>,
    sigils: Query<&Sigil>,
    mut puppets: Query<&mut Puppet>,
    creatures: Query<(Entity, &Creature)>,
    healths: Query<&Health>,
    mut camps: Query<(Entity, &mut CampSpawner)>,
) {
    for &Fire { action } in reader.read() {
        match action {
            Action::Poll { ctrl } => {
                let Ok(mut enc) = encounters.get_mut(ctrl) else { continue };
                if !enc.enabled {
                    continue;
                }
                let now = Utc::now();
                let Some(due) = enc.next_encounter else { continue };
                if due > now {
                    continue;
                }

                // drop contributions whose creature despawned or was released
                enc.radiant_army.retain(|&e| puppets.get(e).is_ok());
                enc.umbral_army.retain(|&e| puppets.get(e).is_ok());

                let score = |army: &[Entity]| -> i32 {
                    army.iter()
                        .filter(|&&e| healths.get(e).map(|h| h.alive()).unwrap_or(false))
                        .filter_map(|&e| creatures.get(e).ok())
                        .map(|(_, c)| c.power)
                        .sum()
                };
                let radiant = score(&enc.radiant_army);
                let umbral = score(&enc.umbral_army);

                if radiant == 0 && umbral == 0 {
                    // nobody is contributing; back off instead of busy-looping
                    enc.next_encounter = Some(now + TimeDelta::minutes(COOLDOWN_MINUTES));
                    continue;
                }

                let called = if radiant > umbral {
                    Faction::Radiant
                } else if umbral > radiant {
                    Faction::Umbral
                } else if rand::rng().random_bool(0.5) {
                    Faction::Radiant
                } else {
                    Faction::Umbral
                };
                info!("call to arms: radiant {} vs umbral {}, {:?} called", radiant, umbral, called);

                let onlookers: Vec<Entity> = movers
                    .iter()
                    .filter(|&(ent, loc)| {
                        matches!(behaviours.get(ent), Ok(Behaviour::Controlled))
                            && layout.in_dungeon(**loc)
                    })
                    .map(|(ent, _)| ent)
                    .collect();
                for ent in onlookers {
                    match sigils.get(ent).ok() {
                        Some(sigil) if sigil.faction == called => {
                            writer.write(Do { event: Event::Notify { ent, msg: MsgId::Called } });
                            if sigil.conscripted() {
                                writer.write(Do { event: Event::Notify { ent, msg: MsgId::TransportWarning } });
                                enc.pending.push(ent);
                            } else {
                                writer.write(Do { event: Event::Notify { ent, msg: MsgId::ConscriptWarning } });
                            }
                        }
                        _ => {
                            writer.write(Do { event: Event::Notify { ent, msg: MsgId::EnemyCalled } });
                        }
                    }
                }

                enc.alignment = Some(called);
                enc.phase = Phase::Sequencing;
                // block re-triggering until the pending sequence resolves
                enc.next_encounter = None;
                scheduler.once(time.elapsed(), GRACE_PERIOD, Action::BeginSequence { ctrl });
            }

            Action::BeginSequence { ctrl } => {
                let Ok(mut enc) = encounters.get_mut(ctrl) else { continue };
                if enc.phase != Phase::Sequencing {
                    continue;
                }
                if enc.pending.is_empty() {
                    // everyone dropped out during the grace period; designed abort
                    enc.phase = Phase::Idle;
                    enc.alignment = None;
                    enc.next_encounter = Some(Utc::now() + TimeDelta::minutes(COOLDOWN_MINUTES));
                    continue;
                }
                let Some(called) = enc.alignment else {
                    warn!("sequence pending without an alignment; normalizing");
                    scheduler.defer(time.elapsed(), Action::Teardown { ctrl });
                    continue;
                };

                let (overlord, health, name) = Overlord::opposing(called);
                info!("{} takes the arena against the {:?} army", name.as_str(), called);
                let boss = commands
                    .spawn((overlord, health, name, Loc::new(layout.boss_seat)))
                    .id();
                enc.boss = Some(boss);
                enc.deadline = Some(Utc::now() + TimeDelta::minutes(DEADLINE_MINUTES));
                enc.phase = Phase::InProgress;
                enc.sequence_handle = Some(scheduler.repeating(
                    time.elapsed(),
                    SEQUENCE_TICK,
                    SEQUENCE_TICK,
                    Action::SequenceTick { ctrl },
                ));

                evict_arena(&layout, &mut movers, &behaviours, &sigils, &mut writer);

                // the defenders' camps muster for the fight
                for (_, mut camp) in camps.iter_mut() {
                    if camp.faction == called.opposite() {
                        camp.needs_respawn = true;
                    }
                }

                scheduler.once(time.elapsed(), TRANSPORT_DELAY, Action::Transport { ctrl });
                scheduler.once(
                    time.elapsed(),
                    Duration::from_secs(12),
                    Action::Briefing { ctrl, msg: MsgId::BriefingObjective },
                );
                scheduler.once(
                    time.elapsed(),
                    Duration::from_secs(24),
                    Action::Briefing { ctrl, msg: MsgId::BriefingWards },
                );
                scheduler.once(
                    time.elapsed(),
                    Duration::from_secs(36),
                    Action::Briefing { ctrl, msg: MsgId::BriefingMortality },
                );
            }

            Action::SequenceTick { ctrl } => {
                let Ok(mut enc) = encounters.get_mut(ctrl) else { continue };
                // a cancelled timer may still have a tick in flight
                if enc.phase != Phase::InProgress || enc.sequence_handle.is_none() {
                    continue;
                }
                let now = Utc::now();
                let expired = enc.deadline.map(|d| now > d).unwrap_or(false);
                let abandoned = enc.players_in_sequence
                    && !arena_has_players(&layout, &movers, &behaviours);

                if expired {
                    for ent in arena_players(&layout, &movers, &behaviours) {
                        writer.write(Do { event: Event::Notify { ent, msg: MsgId::DoomFailure } });
                    }
                }
                if expired || abandoned {
                    if let Some(handle) = enc.sequence_handle.take() {
                        scheduler.cancel(handle);
                    }
                    // teardown mutates broadly; run it on its own scheduling step
                    scheduler.once(time.elapsed(), TEARDOWN_DEFER, Action::Teardown { ctrl });
                }
            }

            Action::Transport { ctrl } => {
                let Ok(mut enc) = encounters.get_mut(ctrl) else { continue };
                if enc.phase != Phase::InProgress {
                    continue;
                }
                // individual dropout never aborts the whole transport; a
                // participant filtered out here stays out until the next
                // call to arms
                enc.pending.retain(|&ent| {
                    let Ok(sigil) = sigils.get(ent) else { return false };
                    if !sigil.conscripted() {
                        return false;
                    }
                    movers
                        .get(ent)
                        .map(|(_, loc)| layout.in_dungeon(**loc))
                        .unwrap_or(false)
                });

                if enc.pending.is_empty() {
                    if let Some(handle) = enc.sequence_handle.take() {
                        scheduler.cancel(handle);
                    }
                    scheduler.defer(time.elapsed(), Action::Teardown { ctrl });
                    continue;
                }

                for ent in enc.pending.clone() {
                    let Some(puppet_ent) = sigils.get(ent).ok().and_then(|s| s.puppet) else {
                        continue;
                    };
                    // a dead companion keeps its owner out of the teleport,
                    // not off the roster
                    let alive = healths.get(puppet_ent).map(|h| h.alive()).unwrap_or(false);
                    if !alive {
                        continue;
                    }
                    let dest = layout.arena_gate.random_point();
                    if let Ok((_, mut loc)) = movers.get_mut(ent) {
                        *loc = Loc::new(dest);
                    }
                    if let Ok((_, mut loc)) = movers.get_mut(puppet_ent) {
                        *loc = Loc::new(dest);
                    }
                    if let Ok(mut puppet) = puppets.get_mut(puppet_ent) {
                        puppet.following = true;
                    }
                    writer.write(Do { event: Event::Notify { ent, msg: MsgId::Summoned } });
                    enc.players_in_sequence = true;
                }
            }

            Action::Teardown { ctrl } => {
                let Ok(mut enc) = encounters.get_mut(ctrl) else { continue };
                if let Some(boss) = enc.boss.take() {
                    if let Ok(mut ec) = commands.get_entity(boss) {
                        ec.despawn();
                    }
                }
                enc.players_in_sequence = false;
                if let Some(handle) = enc.sequence_handle.take() {
                    scheduler.cancel(handle);
                }
                if let Some(handle) = enc.cleanup_handle.take() {
                    scheduler.cancel(handle);
                }
                evict_arena(&layout, &mut movers, &behaviours, &sigils, &mut writer);
                let losing = enc.alignment.take().map(|f| f.opposite());
                enc.deadline = None;
                enc.pending.clear();
                if let Some(faction) = losing {
                    scheduler.once(
                        time.elapsed(),
                        RESPAWN_RESET_DELAY,
                        Action::RespawnReset { ctrl, faction },
                    );
                }
                enc.next_encounter = Some(Utc::now() + TimeDelta::minutes(COOLDOWN_MINUTES));
                enc.phase = Phase::Idle;
                info!("encounter torn down; dungeon idle");
            }

            Action::Briefing { ctrl, msg } => {
                let Ok(enc) = encounters.get(ctrl) else { continue };
                for &ent in &enc.pending {
                    writer.write(Do { event: Event::Notify { ent, msg } });
                }
            }

            Action::RespawnReset { ctrl: _, faction } => {
                for (ent, creature) in creatures.iter() {
                    if creature.faction == faction && puppets.get(ent).is_err() {
                        if let Ok(mut ec) = commands.get_entity(ent) {
                            ec.despawn();
                        }
                    }
                }
                for (_, mut camp) in camps.iter_mut() {
                    if camp.faction == faction {
                        camp.last_spawn_attempt = 0;
                        camp.needs_respawn = true;
                    }
                }
                info!("{:?} camps reset", faction);
            }

            Action::SpawnerAudit { ctrl: _ } => {
                let mut normalized = 0;
                for (_, mut camp) in camps.iter_mut() {
                    if camp.respawn_timer_ms == 0 {
                        camp.respawn_timer_ms = crate::server::systems::spawner::DEFAULT_RESPAWN_MS;
                        normalized += 1;
                    }
                }
                info!("camp audit complete, {} normalized", normalized);
            }

            Action::DissolveSigil { ent } => {
                let Ok(&sigil) = sigils.get(ent) else { continue };
                if let Some(puppet_ent) = sigil.puppet {
                    if let Ok(mut ec) = commands.get_entity(puppet_ent) {
                        ec.despawn();
                    }
                }
                commands.entity(ent).remove::<Sigil>();
                for mut enc in encounters.iter_mut() {
                    enc.pending.retain(|&e| e != ent);
                    if let Some(puppet_ent) = sigil.puppet {
                        enc.radiant_army.retain(|&e| e != puppet_ent);
                        enc.umbral_army.retain(|&e| e != puppet_ent);
                    }
                }
                writer.write(Do { event: Event::Notify { ent, msg: MsgId::SigilDissolved } });
            }
        }
    }
}

/// External trigger: the host's combat layer reports the overlord dead.
pub fn boss_slain(
    mut commands: Commands,
    time: Res<Time>,
    layout: Res<DungeonLayout>,
    mut scheduler: ResMut<Scheduler>,
    mut reader: EventReader<Try>,
    mut writer: EventWriter<Do>,
    mut encounters: Query<(Entity, &mut Encounter)>,
    movers: Query<(Entity, &Loc), Without<CampSpawner>>,
    behaviours: Query<&Behaviour>,
    sigils: Query<&Sigil>,
    puppets: Query<(Entity, &Puppet)>,
) {
    for &Try { event } in reader.read() {
        let Event::Death { ent } = event else { continue };
        for (ctrl, mut enc) in encounters.iter_mut() {
            if enc.boss != Some(ent) || enc.phase != Phase::InProgress {
                continue;
            }
            if let Some(handle) = enc.sequence_handle.take() {
                scheduler.cancel(handle);
            }
            for (player, loc) in movers.iter() {
                if matches!(behaviours.get(player), Ok(Behaviour::Controlled))
                    && layout.arena.contains(**loc)
                {
                    writer.write(Do { event: Event::Notify { ent: player, msg: MsgId::Victory } });
                }
            }
            enc.phase = Phase::Cleanup;
            enc.deadline = None;
            enc.cleanup_handle =
                Some(scheduler.once(time.elapsed(), CLEANUP_DELAY, Action::Teardown { ctrl }));

            // puppets whose controlling sigil is gone do not outlive the fight
            for (puppet_ent, puppet) in puppets.iter() {
                let orphaned = sigils
                    .get(puppet.owner)
                    .map(|s| s.puppet != Some(puppet_ent))
                    .unwrap_or(true);
                if orphaned {
                    if let Ok(mut ec) = commands.get_entity(puppet_ent) {
                        ec.despawn();
                    }
                }
            }
            info!("overlord slain; cleanup in {:?}", CLEANUP_DELAY);
        }
    }
}

/// Conscription and release requests from the host's item layer.
pub fn enlistment(
    mut commands: Commands,
    layout: Res<DungeonLayout>,
    mut reader: EventReader<Try>,
    mut writer: EventWriter<Do>,
    mut encounters: Query<&mut Encounter>,
    mut sigils: Query<&mut Sigil>,
    creatures: Query<(&Creature, &Health)>,
    locs: Query<&Loc>,
    mut behaviours: Query<&mut Behaviour>,
) {
    for &Try { event } in reader.read() {
        match event {
            Event::Conscript { ent, creature } => {
                let Ok(mut sigil) = sigils.get_mut(ent) else { continue };
                if sigil.conscripted() {
                    continue;
                }
                let Ok((c, health)) = creatures.get(creature) else { continue };
                if c.faction != sigil.faction || !health.alive() {
                    continue;
                }
                let inside = locs
                    .get(ent)
                    .map(|loc| layout.in_dungeon(**loc))
                    .unwrap_or(false);
                if !inside {
                    continue;
                }
                sigil.puppet = Some(creature);
                commands.entity(creature).insert(Puppet::bound_to(ent));
                if let Ok(mut behaviour) = behaviours.get_mut(creature) {
                    *behaviour = Behaviour::Possessed;
                }
                let faction = sigil.faction;
                for mut enc in encounters.iter_mut() {
                    enc.army_mut(faction).push(creature);
                    // conscripting during the grace period still gets you
                    // transported, if your faction was the one called
                    if enc.phase == Phase::Sequencing
                        && enc.alignment == Some(faction)
                        && !enc.pending.contains(&ent)
                    {
                        enc.pending.push(ent);
                        writer.write(Do { event: Event::Notify { ent, msg: MsgId::TransportWarning } });
                    }
                }
            }
            Event::Release { ent } => {
                let Ok(mut sigil) = sigils.get_mut(ent) else { continue };
                let Some(creature) = sigil.puppet.take() else { continue };
                commands.entity(creature).remove::<Puppet>();
                if let Ok(mut behaviour) = behaviours.get_mut(creature) {
                    *behaviour = Behaviour::Sentinel;
                }
                let faction = sigil.faction;
                for mut enc in encounters.iter_mut() {
                    enc.army_mut(faction).retain(|&e| e != creature);
                    enc.pending.retain(|&e| e != ent);
                }
            }
            _ => {}
        }
    }
}

fn arena_players(
    layout: &DungeonLayout,
    movers: &Query<(Entity, &mut Loc), Without<CampSpawner>>,
    behaviours: &Query<&Behaviour>,
) -> Vec<Entity> {
    movers
        .iter()
        .filter(|&(ent, loc)| {
            matches!(behaviours.get(ent), Ok(Behaviour::Controlled)) && layout.arena.contains(**loc)
        })
        .map(|(ent, _)| ent)
        .collect()
}

fn arena_has_players(
    layout: &DungeonLayout,
    movers: &Query<(Entity, &mut Loc), Without<CampSpawner>>,
    behaviours: &Query<&Behaviour>,
) -> bool {
    !arena_players(layout, movers, behaviours).is_empty()
}

/// Move every player (and their puppet) out of the arena to their faction's
/// staging ground.
fn evict_arena(
    layout: &DungeonLayout,
    movers: &mut Query<(Entity, &mut Loc), Without<CampSpawner>>,
    behaviours: &Query<&Behaviour>,
    sigils: &Query<&Sigil>,
    writer: &mut EventWriter<Do>,
) {
    let evicted: Vec<(Entity, Option<Entity>, Faction)> = movers
        .iter()
        .filter(|&(ent, loc)| {
            matches!(behaviours.get(ent), Ok(Behaviour::Controlled)) && layout.arena.contains(**loc)
        })
        .map(|(ent, _)| {
            let sigil = sigils.get(ent).ok();
            (
                ent,
                sigil.and_then(|s| s.puppet),
                sigil.map(|s| s.faction).unwrap_or(Faction::Umbral),
            )
        })
        .collect();

    for (ent, puppet, faction) in evicted {
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
