//! Global game state definitions. States are stored by Bevy as a plain enum resource; switching
//! states updates the value and triggers the on-enter/on-exit schedules.

use bevy::prelude::*;

/// High-level state machine for the game loop.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, States)]
pub enum GameState {
    /// Waiting for the current level's map asset and building its controller.
    #[default]
    Loading,
    Playing,
    /// The last level's exit was reached. Simulation is frozen until the run is restarted.
    Complete,
}

/// Named system sets to structure the Update schedule. They are chained in this order, so a
/// tick always samples input before moving, moves before detecting contacts, and resolves
/// contacts before the HUD reads the results.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum GameSet {
    Input,
    Movement,
    Contacts,
    Effects,
    Ui,
}
