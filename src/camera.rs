//! Camera follow system. Keeps the main 2D camera centered on the player while respecting the
//! map's pixel bounds, and applies each level's zoom when it starts.

use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::collision::{rebuild_collision_map, CollisionMap};
use crate::level::LevelConfig;
use crate::player::Player;
use crate::progression::ProgressionCoordinator;
use crate::spawner::spawn_level;
use crate::state::{GameSet, GameState};

/// Registers the camera spawn, per-level framing and follow systems.
pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_camera)
            .add_systems(
                OnEnter(GameState::Playing),
                frame_level.after(spawn_level).after(rebuild_collision_map),
            )
            .add_systems(
                Update,
                follow_player_camera
                    .after(GameSet::Movement) // run after movement so camera sees latest transform
                    .run_if(has_player_and_camera),
            );
    }
}

/// Marker component so the follow system can locate the camera entity without relying on names.
#[derive(Component)]
pub struct FollowCamera;

/// Spawns the 2D camera tagged with `FollowCamera` so the follow system can locate it.
fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Name::new("MainCamera"),
        Camera2dBundle::default(),
        FollowCamera,
    ));
}

/// Run condition that only schedules the follow system when both a player and camera exist. This
/// prevents `get_single` misses while a level is being swapped out.
fn has_player_and_camera(
    player_query: Query<Entity, With<Player>>,
    camera_query: Query<Entity, With<FollowCamera>>,
) -> bool {
    !player_query.is_empty() && !camera_query.is_empty()
}

/// Where the camera may center along one axis of a map spanning `0..extent`. Maps narrower than
/// the view are centered instead.
pub fn clamp_axis(desired: f32, extent: f32, half_view: f32) -> f32 {
    if extent <= half_view * 2.0 {
        extent * 0.5
    } else {
        desired.clamp(half_view, extent - half_view)
    }
}

fn clamped_target(
    target: Vec2,
    map: &CollisionMap,
    window: Option<&Window>,
    scale: f32,
) -> Vec2 {
    let Some(window) = window else {
        return target;
    };
    if map.bounds.x <= 0.0 || map.bounds.y <= 0.0 {
        return target;
    }

    let half_width = window.resolution.width() * 0.5 * scale;
    let half_height = window.resolution.height() * 0.5 * scale;
    Vec2::new(
        clamp_axis(target.x, map.bounds.x, half_width),
        clamp_axis(target.y, map.bounds.y, half_height),
    )
}

/// Applies the level's zoom and snaps straight to the player so the camera never sweeps across the
/// map from the previous level's position.
fn frame_level(
    config: Res<LevelConfig>,
    progression: Res<ProgressionCoordinator>,
    map: Res<CollisionMap>,
    mut camera_query: Query<(&mut Transform, &mut OrthographicProjection), With<FollowCamera>>,
    player_query: Query<&Transform, (With<Player>, Without<FollowCamera>)>,
    window_query: Query<&Window, With<PrimaryWindow>>,
) {
    let Ok((mut camera_transform, mut projection)) = camera_query.get_single_mut() else {
        return;
    };

    let zoom = config
        .entry(progression.current_level())
        .map(|entry| entry.camera_zoom)
        .unwrap_or(1.0)
        .max(0.0001);
    projection.scale = 1.0 / zoom;

    let target = player_query
        .get_single()
        .map(|transform| transform.translation.truncate())
        .unwrap_or(map.bounds * 0.5);
    let framed = clamped_target(target, &map, window_query.get_single().ok(), projection.scale);
    camera_transform.translation.x = framed.x;
    camera_transform.translation.y = framed.y;
}

/// Smoothly interpolates the camera transform toward the player's location. The lerped motion
/// uses an exponential decay constant (`follow_speed`) to avoid overshooting while keeping the
/// player centered.
fn follow_player_camera(
    mut camera_query: Query<(&mut Transform, &OrthographicProjection), With<FollowCamera>>,
    player_query: Query<&Transform, (With<Player>, Without<FollowCamera>)>,
    map: Res<CollisionMap>,
    window_query: Query<&Window, With<PrimaryWindow>>,
    time: Res<Time>,
) {
    let Ok(player_transform) = player_query.get_single() else {
        return;
    };

    let Ok((mut camera_transform, projection)) = camera_query.get_single_mut() else {
        return;
    };

    let target = clamped_target(
        player_transform.translation.truncate(),
        &map,
        window_query.get_single().ok(),
        projection.scale,
    );
    let desired = target.extend(camera_transform.translation.z);

    let follow_speed = 6.0;
    let lerp_t = 1.0 - f32::exp(-follow_speed * time.delta_seconds());
    camera_transform.translation = camera_transform.translation.lerp(desired, lerp_t);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_inside_wide_maps() {
        assert_eq!(clamp_axis(10.0, 1000.0, 100.0), 100.0);
        assert_eq!(clamp_axis(500.0, 1000.0, 100.0), 500.0);
        assert_eq!(clamp_axis(990.0, 1000.0, 100.0), 900.0);
    }

    #[test]
    fn centers_maps_smaller_than_the_view() {
        assert_eq!(clamp_axis(10.0, 150.0, 100.0), 75.0);
    }
}
