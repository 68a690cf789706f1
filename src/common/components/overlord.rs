use bevy::prelude::*;

use crate::common::components::{faction::Faction, Health};

/// Boss entity marker. The overlord belongs to the faction the summoned army
/// is fighting against, so its faction is always the opposite of the
/// encounter's alignment.
#[derive(Clone, Component, Copy, Debug)]
pub struct Overlord {
    pub faction: Faction,
}

/// Construction recipe per faction. A tagged variant rather than distinct
/// boss types: the two overlords differ only in identity and stat line.
impl Overlord {
    pub fn recipe(faction: Faction) -> (Overlord, Health, Name) {
        let (hp, name) = match faction {
            Faction::Radiant => (24_000, "Serath, the Radiant Lord"),
            Faction::Umbral => (26_000, "Maltheus, the Umbral Lord"),
        };
        (Overlord { faction }, Health::full(hp), Name::new(name))
    }

    /// The overlord the called faction must defeat.
    pub fn opposing(called: Faction) -> (Overlord, Health, Name) {
        Self::recipe(called.opposite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_called_faction_fights_the_opposing_overlord() {
        let (overlord, health, _) = Overlord::opposing(Faction::Radiant);
        assert_eq!(overlord.faction, Faction::Umbral);
        assert!(health.alive());

        let (overlord, _, _) = Overlord::opposing(Faction::Umbral);
        assert_eq!(overlord.faction, Faction::Radiant);
    }
}
