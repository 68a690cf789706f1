use bevy::prelude::*;

use crate::common::components::faction::Faction;

/// The army-contribution token a player carries while inside Hollowdeep.
///
/// A sigil is bound to one faction for its whole life. Conscription binds a
/// camp creature to the sigil as the player's puppet; while the binding holds
/// the creature counts toward the faction's army power and the player is a
/// candidate for transport when the call to arms sounds.
#[derive(Clone, Component, Copy, Debug)]
pub struct Sigil {
    pub faction: Faction,
    pub puppet: Option<Entity>,
}

impl Sigil {
    pub fn new(faction: Faction) -> Self {
        Sigil { faction, puppet: None }
    }

    pub fn conscripted(&self) -> bool {
        self.puppet.is_some()
    }
}

/// A creature spawned by a faction camp. `power` is its contribution to the
/// faction's army readiness score once conscripted.
#[derive(Clone, Component, Copy, Debug)]
pub struct Creature {
    pub faction: Faction,
    pub power: i32,
}

/// Marker added to a creature while it is conscripted as a player's puppet.
#[derive(Clone, Component, Copy, Debug)]
pub struct Puppet {
    pub owner: Entity,
    pub following: bool,
}

impl Puppet {
    pub fn bound_to(owner: Entity) -> Self {
        Puppet { owner, following: false }
    }
}
