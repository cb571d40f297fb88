//! High-level plugin composition.
//!
//! `SoulGatePlugin` registers every gameplay plugin and the ordering of the per-frame sets. Each
//! subsystem owns its own resources.

use bevy::prelude::*;

use crate::camera::CameraPlugin;
use crate::collision::CollisionPlugin;
use crate::level::LevelPlugin;
use crate::map::MapPlugin;
use crate::movement::MovementPlugin;
use crate::player::PlayerPlugin;
use crate::progression::ProgressionPlugin;
use crate::spawner::SpawnerPlugin;
use crate::state::{GameSet, GameState};
use crate::transition::{not_transitioning, TransitionPlugin};
use crate::ui::UiPlugin;

/// Bundles every gameplay plugin into a single unit that can be added to the Bevy `App`.
pub struct SoulGatePlugin;

impl Plugin for SoulGatePlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<GameState>()
            .add_plugins((
                MapPlugin,         // Tiled map asset + loader.
                LevelPlugin,       // Level loading, controller, restart.
                ProgressionPlugin, // Level order and carried score.
                SpawnerPlugin,     // Populates and tears down levels.
                PlayerPlugin,      // Facing animation.
                MovementPlugin,    // Input + kinematic updates.
                CollisionPlugin,   // Tile collisions and player contacts.
                CameraPlugin,      // Camera follow and zoom.
                TransitionPlugin,  // Fade between levels.
                UiPlugin,          // HUD and run summary.
            ))
            // Input → Movement → Contacts → Effects → Ui, only while a level is being played.
            .configure_sets(
                Update,
                (
                    GameSet::Input,
                    GameSet::Movement,
                    GameSet::Contacts,
                    GameSet::Effects,
                    GameSet::Ui,
                )
                    .chain()
                    .run_if(in_state(GameState::Playing)),
            )
            // A finished level keeps rendering under the fade but takes no more input.
            .configure_sets(
                Update,
                (GameSet::Input, GameSet::Movement, GameSet::Contacts).run_if(not_transitioning),
            );
    }
}
