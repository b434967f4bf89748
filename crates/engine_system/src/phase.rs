//! Scheduler phases.
//!
//! A [`Phase`] is an ordinal bucket. Within one tick every system of a lower
//! phase finishes before any system of a higher phase begins, whatever order
//! they were registered in. Phase assignment is the only way to sequence a
//! producer before its consumer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An ordinal scheduler bucket. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Phase(pub u8);

impl Phase {
    /// Apply inbound network state.
    pub const NETWORK: Phase = Phase(0);
    /// Prepare world-level simulation.
    pub const PRE_GAME_WORLD: Phase = Phase(10);
    /// World-level simulation (physics integration, AI).
    pub const GAME_WORLD: Phase = Phase(20);
    /// React to world-level simulation.
    pub const POST_GAME_WORLD: Phase = Phase(30);
    /// Poll and translate input.
    pub const READ_INPUTS: Phase = Phase(40);
    /// Player-driven simulation.
    pub const GAME_PLAYERS: Phase = Phase(50);
    /// React to player-driven simulation.
    pub const POST_GAME_PLAYERS: Phase = Phase(60);
    /// Gather render data.
    pub const PRE_RENDER: Phase = Phase(70);
    /// Submit frames.
    pub const RENDER: Phase = Phase(80);

    const NAMED: [(Phase, &'static str); 9] = [
        (Self::NETWORK, "network"),
        (Self::PRE_GAME_WORLD, "pre-game-world"),
        (Self::GAME_WORLD, "game-world"),
        (Self::POST_GAME_WORLD, "post-game-world"),
        (Self::READ_INPUTS, "read-inputs"),
        (Self::GAME_PLAYERS, "game-players"),
        (Self::POST_GAME_PLAYERS, "post-game-players"),
        (Self::PRE_RENDER, "pre-render"),
        (Self::RENDER, "render"),
    ];

    /// The well-known name of this phase, if it has one.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(phase, _)| *phase == self)
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "phase-{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_phases_are_ordered() {
        let names: Vec<Phase> = Phase::NAMED.iter().map(|(phase, _)| *phase).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_display() {
        assert_eq!(Phase::GAME_WORLD.to_string(), "game-world");
        assert_eq!(Phase(21).to_string(), "phase-21");
    }
}
