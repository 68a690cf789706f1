use bevy::prelude::*;

/// Narrative messages sent to players. Delivery is fire-and-forget: the
/// notify system forwards whatever it can and drops the rest.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MsgId {
    EnemyCalled,
    Called,
    TransportWarning,
    ConscriptWarning,
    BriefingObjective,
    BriefingWards,
    BriefingMortality,
    DoomFailure,
    Victory,
    Recalled,
    Summoned,
    SigilDissolved,
}

impl MsgId {
    pub fn text(&self) -> &'static str {
        match self {
            MsgId::EnemyCalled => "Your enemy's forces are stronger, and they have been called to battle.",
            MsgId::Called => "The Call to Arms has sounded. Your faction is strong, and you have been called to battle!",
            MsgId::TransportWarning => "You will be carried into the depths within 60 seconds, unless you release your conscripted creature or it dies.",
            MsgId::ConscriptWarning => "You have under 60 seconds to conscript a creature, or you will not be summoned for the battle.",
            MsgId::BriefingObjective => "Fight your way to the arena and defeat the enemy overlord and its lieutenants!",
            MsgId::BriefingWards => "The overlord is warded against players. Only conscripted creatures can harm it; protect yours as it fights.",
            MsgId::BriefingMortality => "If you fall, your conscripted creature falls with you and you will be returned to your stronghold.",
            MsgId::DoomFailure => "You were unable to defeat the enemy overlord in the time allotted. Its doom spell takes hold!",
            MsgId::Victory => "The battle has ended. The arena will be cleared in five minutes and you will be returned to your stronghold.",
            MsgId::Recalled => "You are summoned back to your stronghold.",
            MsgId::Summoned => "You are carried into the depths to answer the Call to Arms!",
            MsgId::SigilDissolved => "Your sigil dissolves into aether.",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Event {
    /// Fire-and-forget narrative delivery.
    Notify { ent: Entity, msg: MsgId },
    /// An entity died. The host's combat layer raises this for the overlord.
    Death { ent: Entity },
    /// A player binds a camp creature as their puppet.
    Conscript { ent: Entity, creature: Entity },
    /// A player releases their puppet.
    Release { ent: Entity },
}

/// Authoritative event, applied by whichever system owns the concern.
#[derive(Clone, Copy, Debug, Event)]
pub struct Do {
    pub event: Event,
}

/// Requested event, validated before it becomes a `Do`.
#[derive(Clone, Copy, Debug, Event)]
pub struct Try {
    pub event: Event,
}
