//! # Encounter Persistence
//!
//! Version-prefixed bincode snapshots of the encounter record, so the
//! dungeon survives a server restart mid-fight. Old save versions are
//! upgraded through an explicit, ordered migration chain; an unreadable
//! save is a recoverable anomaly and never aborts startup.

use std::{env, fmt, fs, io, path::PathBuf, time::Duration};

use bevy::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    common::components::{faction::Faction, overlord::Overlord, Health, Loc},
    server::{
        resources::{
            layout::DungeonLayout,
            scheduler::{Action, Scheduler},
        },
        systems::encounter::{
            Encounter, Phase, CLEANUP_DELAY, POLL_INTERVAL, SEQUENCE_TICK,
        },
    },
};

pub const SAVE_VERSION: u32 = 3;
const SAVE_FILE: &str = "hollowdeep.sav";
const AUDIT_DELAY: Duration = Duration::from_secs(30);

/// Where the encounter snapshot lives; overridable via `HOLLOWDEEP_SAVE`.
#[derive(Resource)]
pub struct SavePath(pub PathBuf);

impl Default for SavePath {
    fn default() -> Self {
        SavePath(
            env::var_os("HOLLOWDEEP_SAVE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(SAVE_FILE)),
        )
    }
}

/// Current on-disk record. Armies, pending lists and timer handles are
/// deliberately not persisted; restart discards any in-flight grace period
/// and the recovery rules below rebuild the rest.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct EncounterRecord {
    pub enabled: bool,
    pub next_encounter_ms: Option<i64>,
    pub deadline_ms: Option<i64>,
    pub alignment: Option<Faction>,
    pub boss: Option<BossRecord>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct BossRecord {
    pub faction: Faction,
    pub health: i32,
}

/// v1 predates the enabled flag and carried army head-counts that are now
/// derived from live entities.
#[derive(Debug, Deserialize, Serialize)]
struct RecordV1 {
    next_encounter_ms: Option<i64>,
    deadline_ms: Option<i64>,
    alignment: Option<Faction>,
    boss_alive: bool,
    radiant_count: u32,
    umbral_count: u32,
}

/// v2 added the enabled flag but still recorded the boss as a bare bool.
#[derive(Debug, Deserialize, Serialize)]
struct RecordV2 {
    enabled: bool,
    next_encounter_ms: Option<i64>,
    deadline_ms: Option<i64>,
    alignment: Option<Faction>,
    boss_alive: bool,
}

#[derive(Debug)]
pub enum PersistError {
    Io(io::Error),
    Encode(bincode::error::EncodeError),
    Decode(bincode::error::DecodeError),
    UnknownVersion(u32),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io(err) => write!(f, "save io: {}", err),
            PersistError::Encode(err) => write!(f, "save encode: {}", err),
            PersistError::Decode(err) => write!(f, "save decode: {}", err),
            PersistError::UnknownVersion(v) => write!(f, "unknown save version {}", v),
        }
    }
}

impl From<io::Error> for PersistError {
    fn from(err: io::Error) -> Self {
        PersistError::Io(err)
    }
}

impl From<bincode::error::EncodeError> for PersistError {
    fn from(err: bincode::error::EncodeError) -> Self {
        PersistError::Encode(err)
    }
}

impl From<bincode::error::DecodeError> for PersistError {
    fn from(err: bincode::error::DecodeError) -> Self {
        PersistError::Decode(err)
    }
}

/// A decoded save plus anything the migration chain asked to run afterward.
pub struct Loaded {
    pub record: EncounterRecord,
    /// v1 saves predate the camp audit; run one shortly after restore.
    pub audit_camps: bool,
}

enum Raw {
    V1(RecordV1),
    V2(RecordV2),
    V3(EncounterRecord),
}

pub fn encode_record(record: &EncounterRecord) -> Result<Vec<u8>, PersistError> {
    let cfg = bincode::config::standard();
    let mut bytes = bincode::serde::encode_to_vec(SAVE_VERSION, cfg)?;
    bytes.extend(bincode::serde::encode_to_vec(record, cfg)?);
    Ok(bytes)
}

pub fn decode_record(bytes: &[u8]) -> Result<Loaded, PersistError> {
    let cfg = bincode::config::standard();
    let (version, used): (u32, usize) = bincode::serde::decode_from_slice(bytes, cfg)?;
    let body = &bytes[used..];
    let mut raw = match version {
        1 => Raw::V1(bincode::serde::decode_from_slice(body, cfg)?.0),
        2 => Raw::V2(bincode::serde::decode_from_slice(body, cfg)?.0),
        SAVE_VERSION => Raw::V3(bincode::serde::decode_from_slice(body, cfg)?.0),
        v => return Err(PersistError::UnknownVersion(v)),
    };

    // each pass moves exactly one version forward
    let mut audit_camps = false;
    loop {
        raw = match raw {
            Raw::V1(v1) => {
                audit_camps = true;
                Raw::V2(RecordV2 {
                    enabled: true,
                    next_encounter_ms: v1.next_encounter_ms,
                    deadline_ms: v1.deadline_ms,
                    alignment: v1.alignment,
                    boss_alive: v1.boss_alive,
                })
            }
            Raw::V2(v2) => {
                let boss = match (v2.boss_alive, v2.alignment) {
                    (true, Some(alignment)) => {
                        let (overlord, health, _) = Overlord::recipe(alignment.opposite());
                        Some(BossRecord { faction: overlord.faction, health: health.max })
                    }
                    _ => None,
                };
                Raw::V3(EncounterRecord {
                    enabled: v2.enabled,
                    next_encounter_ms: v2.next_encounter_ms,
                    deadline_ms: v2.deadline_ms,
                    alignment: v2.alignment,
                    boss,
                })
            }
            Raw::V3(record) => return Ok(Loaded { record, audit_camps }),
        };
    }
}

/// What restore should do with a decoded record. Pure so the policy is
/// testable without a world.
#[derive(Debug, PartialEq)]
pub enum Recovery {
    /// Deadline still ahead and the overlord was alive: put it back.
    ResumeFight(BossRecord),
    /// A sequence was underway but cannot continue; let the cleanup timer
    /// converge it.
    ResumeCleanup,
    /// Nothing was running; a deferred teardown normalizes stray state.
    Normalize,
}

pub fn recovery_for(record: &EncounterRecord, now: DateTime<Utc>) -> Recovery {
    let deadline = record.deadline_ms.and_then(DateTime::from_timestamp_millis);
    match (deadline, record.boss) {
        (Some(d), Some(b)) if d > now && b.health > 0 => Recovery::ResumeFight(b),
        (Some(_), _) => Recovery::ResumeCleanup,
        (None, _) => Recovery::Normalize,
    }
}

fn read_save(path: &PathBuf) -> Result<Option<Loaded>, PersistError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(decode_record(&bytes)?))
}

fn write_save(path: &PathBuf, record: &EncounterRecord) -> Result<(), PersistError> {
    fs::write(path, encode_record(record)?)?;
    Ok(())
}

impl Encounter {
    fn from_record(record: &EncounterRecord, now: DateTime<Utc>) -> Self {
        let mut enc = Encounter::new(now);
        enc.enabled = record.enabled;
        enc.next_encounter = record.next_encounter_ms.and_then(DateTime::from_timestamp_millis);
        enc.deadline = record.deadline_ms.and_then(DateTime::from_timestamp_millis);
        enc.alignment = record.alignment;
        enc
    }

    fn to_record(&self, boss: Option<BossRecord>) -> EncounterRecord {
        EncounterRecord {
            enabled: self.enabled,
            next_encounter_ms: self.next_encounter.map(|t| t.timestamp_millis()),
            deadline_ms: self.deadline.map(|t| t.timestamp_millis()),
            alignment: self.alignment,
            boss,
        }
    }
}

/// Startup: spawn the controller, restoring from the save when one exists.
pub fn restore_encounter(
    mut commands: Commands,
    time: Res<Time>,
    layout: Res<DungeonLayout>,
    path: Res<SavePath>,
    mut scheduler: ResMut<Scheduler>,
) {
    let now = Utc::now();
    let loaded = match read_save(&path.0) {
        Ok(loaded) => loaded,
        Err(err) => {
            warn!("unreadable save, starting fresh: {}", err);
            None
        }
    };

    let ctrl = commands.spawn_empty().id();
    let mut enc = match &loaded {
        Some(l) => Encounter::from_record(&l.record, now),
        None => Encounter::new(now),
    };
    if enc.enabled {
        enc.poll_handle = Some(scheduler.repeating(
            time.elapsed(),
            POLL_INTERVAL,
            POLL_INTERVAL,
            Action::Poll { ctrl },
        ));
    }

    if let Some(loaded) = loaded {
        if loaded.audit_camps {
            scheduler.once(time.elapsed(), AUDIT_DELAY, Action::SpawnerAudit { ctrl });
        }
        // a disabled dungeon restores its record but starts nothing
        if !enc.enabled {
            enc.deadline = None;
        } else {
            match recovery_for(&loaded.record, now) {
                Recovery::ResumeFight(record) => {
                    let (overlord, mut health, name) = Overlord::recipe(record.faction);
                    health.current = record.health.min(health.max);
                    let boss = commands
                        .spawn((overlord, health, name, Loc::new(layout.boss_seat)))
                        .id();
                    enc.boss = Some(boss);
                    enc.phase = Phase::InProgress;
                    enc.sequence_handle = Some(scheduler.repeating(
                        time.elapsed(),
                        SEQUENCE_TICK,
                        SEQUENCE_TICK,
                        Action::SequenceTick { ctrl },
                    ));
                    info!("restored mid-fight encounter, overlord at {} hp", record.health);
                }
                Recovery::ResumeCleanup => {
                    enc.phase = Phase::Cleanup;
                    enc.deadline = None;
                    enc.cleanup_handle = Some(scheduler.once(
                        time.elapsed(),
                        CLEANUP_DELAY,
                        Action::Teardown { ctrl },
                    ));
                    info!("restored encounter into cleanup");
                }
                Recovery::Normalize => {
                    scheduler.defer(time.elapsed(), Action::Teardown { ctrl });
                }
            }
        }
    }

    commands.entity(ctrl).insert(enc);
}

fn snapshot(
    encounters: &Query<&Encounter>,
    bosses: &Query<(&Overlord, &Health)>,
) -> Option<EncounterRecord> {
    let enc = encounters.single().ok()?;
    let boss = enc
        .boss
        .and_then(|e| bosses.get(e).ok())
        .map(|(overlord, health)| BossRecord { faction: overlord.faction, health: health.current });
    Some(enc.to_record(boss))
}

pub fn save_encounter(
    path: Res<SavePath>,
    encounters: Query<&Encounter>,
    bosses: Query<(&Overlord, &Health)>,
) {
    let Some(record) = snapshot(&encounters, &bosses) else { return };
    match write_save(&path.0, &record) {
        Ok(()) => debug!("encounter saved"),
        Err(err) => warn!("failed to write save: {}", err),
    }
}

pub fn save_on_exit(
    mut reader: EventReader<AppExit>,
    path: Res<SavePath>,
    encounters: Query<&Encounter>,
    bosses: Query<(&Overlord, &Health)>,
) {
    if reader.read().next().is_none() {
        return;
    }
    let Some(record) = snapshot(&encounters, &bosses) else { return };
    if let Err(err) = write_save(&path.0, &record) {
        warn!("failed to write save on exit: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn record(deadline: Option<DateTime<Utc>>, boss: Option<BossRecord>) -> EncounterRecord {
        EncounterRecord {
            enabled: true,
            next_encounter_ms: None,
            deadline_ms: deadline.map(|d| d.timestamp_millis()),
            alignment: Some(Faction::Radiant),
            boss,
        }
    }

    #[test]
    fn test_current_version_roundtrips() {
        let original = record(
            Some(Utc::now() + TimeDelta::minutes(30)),
            Some(BossRecord { faction: Faction::Umbral, health: 12_345 }),
        );

        let bytes = encode_record(&original).unwrap();
        let loaded = decode_record(&bytes).unwrap();

        assert_eq!(loaded.record, original);
        assert!(!loaded.audit_camps);
    }

    #[test]
    fn test_v1_migrates_with_defaults_and_requests_audit() {
        let cfg = bincode::config::standard();
        let v1 = RecordV1 {
            next_encounter_ms: Some(1_000),
            deadline_ms: None,
            alignment: None,
            boss_alive: false,
            radiant_count: 7,
            umbral_count: 3,
        };
        let mut bytes = bincode::serde::encode_to_vec(1u32, cfg).unwrap();
        bytes.extend(bincode::serde::encode_to_vec(&v1, cfg).unwrap());

        let loaded = decode_record(&bytes).unwrap();

        assert!(loaded.record.enabled, "v1 saves default to enabled");
        assert_eq!(loaded.record.next_encounter_ms, Some(1_000));
        assert_eq!(loaded.record.boss, None);
        assert!(loaded.audit_camps);
    }

    #[test]
    fn test_v2_boss_flag_becomes_a_full_health_record() {
        let cfg = bincode::config::standard();
        let v2 = RecordV2 {
            enabled: true,
            next_encounter_ms: None,
            deadline_ms: Some(5_000),
            alignment: Some(Faction::Radiant),
            boss_alive: true,
        };
        let mut bytes = bincode::serde::encode_to_vec(2u32, cfg).unwrap();
        bytes.extend(bincode::serde::encode_to_vec(&v2, cfg).unwrap());

        let loaded = decode_record(&bytes).unwrap();

        let boss = loaded.record.boss.expect("boss record synthesized");
        // the radiant army fights the umbral overlord
        assert_eq!(boss.faction, Faction::Umbral);
        let (_, health, _) = Overlord::recipe(Faction::Umbral);
        assert_eq!(boss.health, health.max);
        assert!(!loaded.audit_camps);
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let cfg = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(99u32, cfg).unwrap();

        assert!(matches!(
            decode_record(&bytes),
            Err(PersistError::UnknownVersion(99))
        ));
    }

    #[test]
    fn test_corrupt_bytes_are_an_error_not_a_panic() {
        assert!(matches!(
            decode_record(&[0xff, 0x02, 0x17]),
            Err(PersistError::Decode(_))
        ));
        assert!(matches!(decode_record(&[]), Err(PersistError::Decode(_))));
    }

    fn restore_app(path: PathBuf) -> App {
        let mut app = App::new();
        app.init_resource::<Time>();
        app.init_resource::<Scheduler>();
        app.init_resource::<DungeonLayout>();
        app.insert_resource(SavePath(path));
        app.add_systems(Startup, restore_encounter);
        app
    }

    fn restored(app: &mut App) -> (Phase, Option<Entity>, Option<i64>, bool, bool, bool) {
        let world = app.world_mut();
        let mut query = world.query::<&Encounter>();
        let enc = query.single(world).unwrap();
        (
            enc.phase,
            enc.boss,
            enc.deadline.map(|d| d.timestamp_millis()),
            enc.enabled,
            enc.poll_handle.is_some(),
            enc.sequence_handle.is_some(),
        )
    }

    #[test]
    fn test_restore_of_disabled_dungeon_starts_nothing() {
        let path = env::temp_dir().join("hollowdeep-disabled-restore.sav");
        let mut saved = record(
            Some(Utc::now() + TimeDelta::minutes(30)),
            Some(BossRecord { faction: Faction::Umbral, health: 9_000 }),
        );
        saved.enabled = false;
        fs::write(&path, encode_record(&saved).unwrap()).unwrap();

        let mut app = restore_app(path.clone());
        app.update();

        let (phase, boss, deadline, enabled, polling, ticking) = restored(&mut app);
        assert!(!enabled);
        assert_eq!(phase, Phase::Idle);
        assert_eq!(boss, None, "no overlord respawned while disabled");
        assert_eq!(deadline, None);
        assert!(!polling);
        assert!(!ticking);
        assert!(app.world().resource::<Scheduler>().scheduled().is_empty());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_restore_resumes_a_live_fight_at_recorded_health() {
        let path = env::temp_dir().join("hollowdeep-resume-restore.sav");
        let saved = record(
            Some(Utc::now() + TimeDelta::minutes(30)),
            Some(BossRecord { faction: Faction::Umbral, health: 9_000 }),
        );
        fs::write(&path, encode_record(&saved).unwrap()).unwrap();

        let mut app = restore_app(path.clone());
        app.update();

        let (phase, boss, deadline, enabled, polling, ticking) = restored(&mut app);
        assert!(enabled);
        assert_eq!(phase, Phase::InProgress);
        assert!(deadline.is_some());
        assert!(polling);
        assert!(ticking);
        let boss = boss.expect("overlord respawned");
        assert_eq!(app.world().get::<Health>(boss).unwrap().current, 9_000);
        assert_eq!(app.world().get::<Overlord>(boss).unwrap().faction, Faction::Umbral);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_recovery_prefers_resuming_a_live_fight() {
        let now = Utc::now();
        let boss = BossRecord { faction: Faction::Umbral, health: 9_000 };

        let live = record(Some(now + TimeDelta::minutes(10)), Some(boss));
        assert_eq!(recovery_for(&live, now), Recovery::ResumeFight(boss));

        let expired = record(Some(now - TimeDelta::minutes(10)), Some(boss));
        assert_eq!(recovery_for(&expired, now), Recovery::ResumeCleanup);

        let slain = record(Some(now + TimeDelta::minutes(10)), None);
        assert_eq!(recovery_for(&slain, now), Recovery::ResumeCleanup);

        let dead_boss = record(
            Some(now + TimeDelta::minutes(10)),
            Some(BossRecord { faction: Faction::Umbral, health: 0 }),
        );
        assert_eq!(recovery_for(&dead_boss, now), Recovery::ResumeCleanup);

        let idle = record(None, None);
        assert_eq!(recovery_for(&idle, now), Recovery::Normalize);
    }
}
