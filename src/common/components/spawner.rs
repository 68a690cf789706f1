use bevy::prelude::*;

use crate::common::components::{faction::Faction, Rect};

/// A faction camp that keeps its ward stocked with conscriptable creatures.
#[derive(Clone, Component, Copy, Debug)]
pub struct CampSpawner {
    pub faction: Faction,
    /// Creatures spawn at random points inside these grounds.
    pub grounds: Rect,
    pub max_count: u8,
    pub respawn_timer_ms: u32,
    pub last_spawn_attempt: u128,
    /// Set by a respawn reset; bypasses the cooldown and player gate once.
    pub needs_respawn: bool,
}

impl CampSpawner {
    pub fn new(faction: Faction, grounds: Rect, max_count: u8, respawn_timer_ms: u32) -> Self {
        Self {
            faction,
            grounds,
            max_count,
            respawn_timer_ms,
            last_spawn_attempt: 0,
            needs_respawn: false,
        }
    }
}
