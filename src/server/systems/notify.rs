//! Narrative delivery. The server has no chat transport of its own; it hands
//! finished text to the log, where the host's session layer picks it up.

use bevy::prelude::*;

use crate::common::message::{Do, Event};

pub fn deliver_notifications(mut reader: EventReader<Do>) {
    for &Do { event } in reader.read() {
        if let Event::Notify { ent, msg } = event {
            info!("to {:?}: {}", ent, msg.text());
        }
    }
}
