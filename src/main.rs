//! Application entry point: composes the Bevy runtime, core plugins, and window configuration,
//! then defers to the `SoulGatePlugin` defined in `app.rs`.

mod app;
mod camera;
mod collection;
mod collision;
mod level;
mod map;
mod movement;
mod player;
mod progression;
mod spawner;
mod state;
mod transition;
mod ui;

#[cfg(all(target_arch = "wasm32", feature = "web"))]
mod wasm;

use app::SoulGatePlugin;
use bevy::asset::AssetPlugin;
use bevy::prelude::*;
use bevy::render::texture::ImagePlugin;
use bevy::window::{Window, WindowResizeConstraints, WindowResolution};

fn main() {
    #[cfg(all(target_arch = "wasm32", feature = "web"))]
    wasm::set_panic_hook();

    // Maps are 16px tiles; the per-level camera zoom scales them up, so the window size only
    // decides how much of the map is visible.
    let primary_window = Window {
        title: "Soul Gate".to_string(),
        resolution: WindowResolution::new(1280.0, 720.0),
        resizable: true,
        resize_constraints: WindowResizeConstraints {
            min_width: 640.0,
            min_height: 360.0,
            max_width: f32::INFINITY,
            max_height: f32::INFINITY,
        },
        canvas: cfg!(all(target_arch = "wasm32", feature = "web"))
            .then(|| "#bevy-canvas".to_owned()),
        ..default()
    };

    // Nearest-neighbor sampling keeps pixel art crisp; hot reload is desktop only.
    let mut default_plugins = DefaultPlugins
        .set(WindowPlugin {
            primary_window: Some(primary_window),
            ..default()
        })
        .set(ImagePlugin::default_nearest());

    #[cfg(not(target_arch = "wasm32"))]
    {
        default_plugins = default_plugins.set(AssetPlugin {
            file_path: "assets".to_owned(),
            watch_for_changes_override: Some(true),
            ..default()
        });
    }

    #[cfg(all(target_arch = "wasm32", feature = "web"))]
    {
        default_plugins = default_plugins.set(AssetPlugin {
            file_path: "assets".to_owned(),
            watch_for_changes_override: Some(false),
            ..default()
        });
    }

    App::new()
        .insert_resource(ClearColor(Color::srgb(0.05, 0.04, 0.1)))
        .add_plugins(default_plugins)
        .add_plugins(SoulGatePlugin)
        .run();
}
