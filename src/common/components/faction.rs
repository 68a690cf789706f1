use serde::{Deserialize, Serialize};

/// The two powers contesting Hollowdeep. An encounter is always aligned to
/// exactly one of them, or to neither while the dungeon idles.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Faction {
    Radiant,
    Umbral,
}

impl Faction {
    pub fn opposite(&self) -> Faction {
        match self {
            Faction::Radiant => Faction::Umbral,
            Faction::Umbral => Faction::Radiant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_is_involutive() {
        assert_eq!(Faction::Radiant.opposite(), Faction::Umbral);
        assert_eq!(Faction::Umbral.opposite(), Faction::Radiant);
        assert_eq!(Faction::Radiant.opposite().opposite(), Faction::Radiant);
    }
}
