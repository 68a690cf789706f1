//! # Dungeon Layout
//!
//! Fixed geometry of Hollowdeep: the approach corridor, the two faction
//! wards, and the lower arena where the overlord is fought. Answers the
//! containment side of the spatial-query contract; occupant enumeration is
//! done by the systems querying `Loc` against these bounds.

use bevy::prelude::*;

use crate::common::components::{faction::Faction, Pt, Rect};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegionId {
    Approach,
    RadiantWard,
    UmbralWard,
    Arena,
}

#[derive(Clone, Copy, Debug, Resource)]
pub struct DungeonLayout {
    pub approach: Rect,
    pub radiant_ward: Rect,
    pub umbral_ward: Rect,
    pub arena: Rect,
    /// Where evicted players of each faction land, outside the arena.
    pub radiant_staging: Rect,
    pub umbral_staging: Rect,
    /// Where transported participants arrive inside the arena.
    pub arena_gate: Rect,
    /// Where the overlord is seated when a sequence begins.
    pub boss_seat: Pt,
}

impl Default for DungeonLayout {
    fn default() -> Self {
        DungeonLayout {
            approach: Rect::new(560, 600, 24, 20),
            radiant_ward: Rect::new(380, 510, 134, 122),
            umbral_ward: Rect::new(380, 644, 150, 120),
            arena: Rect::new(380, 770, 248, 250),
            radiant_staging: Rect::new(484, 566, 16, 8),
            umbral_staging: Rect::new(484, 650, 16, 8),
            arena_gate: Rect::new(392, 854, 14, 16),
            boss_seat: Pt::new(556, 900, 45),
        }
    }
}

impl DungeonLayout {
    /// Which dungeon region contains `p`, if any. The arena wins ties since
    /// it sits below the wards.
    pub fn region_of(&self, p: Pt) -> Option<RegionId> {
        if self.arena.contains(p) {
            Some(RegionId::Arena)
        } else if self.radiant_ward.contains(p) {
            Some(RegionId::RadiantWard)
        } else if self.umbral_ward.contains(p) {
            Some(RegionId::UmbralWard)
        } else if self.approach.contains(p) {
            Some(RegionId::Approach)
        } else {
            None
        }
    }

    pub fn in_dungeon(&self, p: Pt) -> bool {
        self.region_of(p).is_some()
    }

    pub fn ward_for(&self, faction: Faction) -> Rect {
        match faction {
            Faction::Radiant => self.radiant_ward,
            Faction::Umbral => self.umbral_ward,
        }
    }

    pub fn staging_for(&self, faction: Faction) -> Rect {
        match faction {
            Faction::Radiant => self.radiant_staging,
            Faction::Umbral => self.umbral_staging,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_lookup() {
        let layout = DungeonLayout::default();

        assert_eq!(layout.region_of(Pt::new(400, 800, 0)), Some(RegionId::Arena));
        assert_eq!(layout.region_of(Pt::new(400, 520, 0)), Some(RegionId::RadiantWard));
        assert_eq!(layout.region_of(Pt::new(400, 700, 0)), Some(RegionId::UmbralWard));
        assert_eq!(layout.region_of(Pt::new(570, 610, 0)), Some(RegionId::Approach));
        assert_eq!(layout.region_of(Pt::new(0, 0, 0)), None);
    }

    #[test]
    fn test_staging_is_outside_the_arena() {
        let layout = DungeonLayout::default();

        for faction in [Faction::Radiant, Faction::Umbral] {
            let staging = layout.staging_for(faction);
            for _ in 0..50 {
                let p = staging.random_point();
                assert!(!layout.arena.contains(p));
                assert!(layout.in_dungeon(p));
            }
        }
    }

    #[test]
    fn test_arena_gate_is_inside_the_arena() {
        let layout = DungeonLayout::default();
        for _ in 0..50 {
            assert!(layout.arena.contains(layout.arena_gate.random_point()));
        }
    }
}
