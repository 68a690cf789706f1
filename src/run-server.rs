mod common;
mod server;

use std::time::Duration;

use bevy::{
    app::ScheduleRunnerPlugin,
    log::LogPlugin,
    prelude::*,
    time::common_conditions::on_timer,
};

use crate::{
    common::{
        components::{faction::Faction, spawner::CampSpawner, Loc, Rect},
        message::{Do, Try},
    },
    server::{
        persist::{restore_encounter, save_encounter, save_on_exit, SavePath},
        resources::{
            layout::DungeonLayout,
            scheduler::{run_scheduler, Fire, Scheduler},
        },
        systems::{
            encounter::{apply_actions, boss_slain, enlistment},
            notify::deliver_notifications,
            region_rules::enforce_region_rules,
            spawner::tick_spawners,
        },
    },
};

const FRAME_INTERVAL: Duration = Duration::from_millis(100);
const REGION_SWEEP: Duration = Duration::from_secs(5);
const SAVE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// One creature camp per faction, centered in its ward.
fn spawn_camps(mut commands: Commands, layout: Res<DungeonLayout>) {
    for faction in [Faction::Radiant, Faction::Umbral] {
        let ward = layout.ward_for(faction);
        let grounds = Rect::new(ward.x + ward.w / 4, ward.y + ward.h / 4, ward.w / 2, ward.h / 2);
        commands.spawn((
            CampSpawner::new(faction, grounds, 6, crate::server::systems::spawner::DEFAULT_RESPAWN_MS),
            Loc::from_xy(grounds.x, grounds.y),
        ));
    }
}

fn main() {
    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(FRAME_INTERVAL)),
        LogPlugin {
            level: bevy::log::Level::DEBUG,
            filter: "bevy=warn,hollowdeep=debug".to_string(),
            ..default()
        },
    ));

    app.add_event::<Do>();
    app.add_event::<Try>();
    app.add_event::<Fire>();

    app.init_resource::<Scheduler>();
    app.init_resource::<DungeonLayout>();
    app.init_resource::<SavePath>();

    app.add_systems(Startup, (spawn_camps, restore_encounter));
    app.add_systems(
        Update,
        (
            run_scheduler,
            apply_actions,
            boss_slain,
            enlistment,
            tick_spawners,
            deliver_notifications,
        )
            .chain(),
    );
    app.add_systems(
        Update,
        enforce_region_rules
            .after(apply_actions)
            .run_if(on_timer(REGION_SWEEP)),
    );
    app.add_systems(Update, save_encounter.run_if(on_timer(SAVE_INTERVAL)));
    app.add_systems(Last, save_on_exit);

    app.run();
}
