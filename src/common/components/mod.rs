pub mod faction;
pub mod overlord;
pub mod sigil;
pub mod spawner;

use bevy::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Integer dungeon coordinate.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Pt {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Pt {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Pt { x, y, z }
    }
}

/// Axis-aligned floor rectangle, used for region bounds and staging areas.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Rect { x, y, w, h }
    }

    pub fn contains(&self, p: Pt) -> bool {
        p.x >= self.x && p.x < self.x + self.w && p.y >= self.y && p.y < self.y + self.h
    }

    /// Random floor point inside the rectangle.
    pub fn random_point(&self) -> Pt {
        let mut rng = rand::rng();
        Pt {
            x: rng.random_range(self.x..self.x + self.w.max(1)),
            y: rng.random_range(self.y..self.y + self.h.max(1)),
            z: 0,
        }
    }
}

#[derive(Clone, Component, Copy, Debug, Default, Deref, DerefMut, Deserialize, Eq, PartialEq, Serialize)]
pub struct Loc(Pt);

impl Loc {
    pub fn new(pt: Pt) -> Self {
        Loc(pt)
    }

    pub fn from_xy(x: i32, y: i32) -> Self {
        Loc(Pt::new(x, y, 0))
    }
}

#[derive(Clone, Component, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Health {
    pub fn full(max: i32) -> Self {
        Health { current: max, max }
    }

    pub fn alive(&self) -> bool {
        self.current > 0
    }
}

/// How an entity is driven: by a client, by camp AI, or as a player's puppet.
#[derive(Clone, Component, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Behaviour {
    Controlled,
    Sentinel,
    Possessed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains_is_half_open() {
        let rect = Rect::new(10, 20, 5, 5);

        assert!(rect.contains(Pt::new(10, 20, 0)));
        assert!(rect.contains(Pt::new(14, 24, 3)));
        assert!(!rect.contains(Pt::new(15, 20, 0)));
        assert!(!rect.contains(Pt::new(10, 25, 0)));
        assert!(!rect.contains(Pt::new(9, 20, 0)));
    }

    #[test]
    fn test_random_point_stays_inside() {
        let rect = Rect::new(-8, 40, 12, 3);

        for _ in 0..100 {
            assert!(rect.contains(rect.random_point()));
        }
    }
}
