use bevy::input::keyboard::KeyCode;
use bevy::prelude::*;

use crate::collision::{CollisionMap, CollisionPair};
use crate::level::ActiveLevel;
use crate::player::{Facing, MotionIntent, Player};
use crate::progression::ProgressionCoordinator;
use crate::state::GameSet;

/// Registers input sampling and the kinematic step.
pub struct MovementPlugin;

impl Plugin for MovementPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MovementSettings>().add_systems(
            Update,
            (
                read_player_input.in_set(GameSet::Input),
                apply_kinematics.in_set(GameSet::Movement),
            ),
        );
    }
}

/// Tunables for the kinematic step, in world units per second.
#[derive(Resource)]
pub struct MovementSettings {
    pub gravity: f32,
    pub terminal_velocity: f32,
    /// Rebounds slower than this come to rest instead of jittering on the floor.
    pub rest_speed: f32,
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            gravity: 300.0,
            terminal_velocity: -600.0,
            rest_speed: 12.0,
        }
    }
}

/// Linear velocity in world units per second (y-up).
#[derive(Component, Default, Deref, DerefMut)]
pub struct Velocity(pub Vec2);

/// Per-body physical defaults applied by the spawner.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub gravity_scale: f32,
    pub bounce: f32,
    pub collide_world_bounds: bool,
}

/// Bodies that never move (the exit gate).
#[derive(Component)]
pub struct Immovable;

#[derive(Component, Copy, Clone)]
pub struct Collider {
    pub half_extents: Vec2,
}

impl Collider {
    pub fn from_size(size: Vec2) -> Self {
        Self {
            half_extents: size * 0.5,
        }
    }
}

/// Asks the level controller for this tick's motion and writes it to the player.
fn read_player_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    level: Res<ActiveLevel>,
    progression: Res<ProgressionCoordinator>,
    mut query: Query<(&mut Velocity, &mut Facing), With<Player>>,
) {
    if !progression.accepts_motion() {
        return;
    }
    let Some(controller) = level.controller() else {
        return;
    };

    let motion = controller.advance(MotionIntent::from_keyboard(&keyboard));
    for (mut velocity, mut facing) in &mut query {
        velocity.0 = motion.velocity;
        facing.set_if_neq(motion.facing);
    }
}

/// Integrates gravity and velocity, then resolves tile and world-bound collisions for every
/// movable body.
fn apply_kinematics(
    time: Res<Time>,
    settings: Res<MovementSettings>,
    collision_map: Res<CollisionMap>,
    level: Res<ActiveLevel>,
    mut query: Query<
        (&mut Transform, &mut Velocity, &Body, &Collider, Has<Player>),
        Without<Immovable>,
    >,
) {
    let Some(controller) = level.controller() else {
        return;
    };
    let rules = controller.rules();
    let dt = time.delta_seconds();

    for (mut transform, mut velocity, body, collider, is_player) in &mut query {
        if body.gravity_scale != 0.0 {
            velocity.y -= settings.gravity * body.gravity_scale * dt;
            if velocity.y < settings.terminal_velocity {
                velocity.y = settings.terminal_velocity;
            }
        }

        let mut position = transform.translation;
        let half = collider.half_extents;
        let pair = if is_player {
            CollisionPair::PlayerPlatform
        } else {
            CollisionPair::CollectiblesPlatform
        };

        if rules.contains(pair) {
            resolve_horizontal(&mut position, &mut velocity.x, half, dt, &collision_map);
            let vertical = resolve_vertical(&mut position, velocity.y, half, dt, &collision_map);
            if vertical.down || vertical.up {
                velocity.y = rebound(velocity.y, body.bounce, settings.rest_speed);
            }
        } else {
            position += (velocity.0 * dt).extend(0.0);
        }

        if body.collide_world_bounds {
            clamp_to_bounds(
                &mut position,
                &mut velocity.0,
                half,
                collision_map.bounds,
                body.bounce,
                settings.rest_speed,
            );
        }

        transform.translation = position;
    }
}

/// Reflects an impact velocity, damped by `bounce`.
fn rebound(impact: f32, bounce: f32, rest_speed: f32) -> f32 {
    let reflected = -impact * bounce;
    if reflected.abs() < rest_speed {
        0.0
    } else {
        reflected
    }
}

fn clamp_to_bounds(
    position: &mut Vec3,
    velocity: &mut Vec2,
    half: Vec2,
    bounds: Vec2,
    bounce: f32,
    rest_speed: f32,
) {
    if bounds.x <= 0.0 || bounds.y <= 0.0 {
        return;
    }

    let min = half;
    let max = (bounds - half).max(half);

    if position.x < min.x || position.x > max.x {
        position.x = position.x.clamp(min.x, max.x);
        velocity.x = rebound(velocity.x, bounce, rest_speed);
    }
    if position.y < min.y || position.y > max.y {
        position.y = position.y.clamp(min.y, max.y);
        velocity.y = rebound(velocity.y, bounce, rest_speed);
    }
}

struct VerticalCollision {
    down: bool,
    up: bool,
}

const SKIN: f32 = 0.001;

fn resolve_horizontal(
    position: &mut Vec3,
    velocity: &mut f32,
    half: Vec2,
    dt: f32,
    map: &CollisionMap,
) {
    if velocity.abs() < f32::EPSILON {
        return;
    }

    let new_x = position.x + *velocity * dt;
    let dir = velocity.signum();

    let bottom = position.y - half.y + SKIN;
    let top = position.y + half.y - SKIN;

    let tile_size = map.tile_size.x;
    if tile_size <= 0.0 {
        position.x = new_x;
        return;
    }
    let min_tile_y = (bottom / map.tile_size.y).floor() as i32;
    let max_tile_y = (top / map.tile_size.y).floor() as i32;

    let edge = new_x + half.x * dir;
    let tile_x = (edge / tile_size).floor() as i32;
    for ty in min_tile_y..=max_tile_y {
        if map.is_solid(IVec2::new(tile_x, ty)) {
            position.x = if dir > 0.0 {
                tile_x as f32 * tile_size - half.x - SKIN
            } else {
                (tile_x + 1) as f32 * tile_size + half.x + SKIN
            };
            *velocity = 0.0;
            return;
        }
    }

    position.x = new_x;
}

/// Moves vertically, stopping at solid tiles. The velocity is left untouched so the caller can
/// turn the impact into a rebound.
fn resolve_vertical(
    position: &mut Vec3,
    velocity: f32,
    half: Vec2,
    dt: f32,
    map: &CollisionMap,
) -> VerticalCollision {
    let mut collision = VerticalCollision {
        down: false,
        up: false,
    };

    let new_y = position.y + velocity * dt;
    let dir = velocity.signum();
    let tile_width = map.tile_size.x;
    let tile_height = map.tile_size.y;
    if velocity == 0.0 || tile_width <= 0.0 || tile_height <= 0.0 {
        position.y = new_y;
        return collision;
    }

    let left = position.x - half.x + SKIN;
    let right = position.x + half.x - SKIN;
    let min_tile_x = (left / tile_width).floor() as i32;
    let max_tile_x = (right / tile_width).floor() as i32;

    let edge = new_y + half.y * dir;
    let tile_y = (edge / tile_height).floor() as i32;
    for tx in min_tile_x..=max_tile_x {
        if map.is_solid(IVec2::new(tx, tile_y)) {
            if dir < 0.0 {
                position.y = (tile_y + 1) as f32 * tile_height + half.y + SKIN;
                collision.down = true;
            } else {
                position.y = tile_y as f32 * tile_height - half.y - SKIN;
                collision.up = true;
            }
            return collision;
        }
    }

    position.y = new_y;
    collision
}
