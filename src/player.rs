//! Player avatar: marker component, facing, and the per-tick mapping from directional intent to
//! velocity. The mapping is a pure function so the level controller can own it without touching
//! the ECS.

use bevy::input::keyboard::KeyCode;
use bevy::prelude::*;

use crate::state::GameSet;

/// Speed on each axis while a direction is held, in world units per second.
pub const PLAYER_SPEED: f32 = 160.0;

/// Registers the sprite-facing system.
pub struct PlayerPlugin;

impl Plugin for PlayerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, animate_player.in_set(GameSet::Effects));
    }
}

/// Marker component used by many systems (camera follow, contact checks) to identify the player
/// entity.
#[derive(Component)]
pub struct Player;

#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Facing {
    Left,
    Right,
    #[default]
    Neutral,
}

impl Facing {
    pub fn animation(self) -> &'static str {
        match self {
            Facing::Left => "left",
            Facing::Right => "right",
            Facing::Neutral => "turn",
        }
    }

    /// Frame of the 9-frame `dude` sheet shown for this facing.
    pub fn frame(self) -> usize {
        match self {
            Facing::Left => 0,
            Facing::Neutral => 4,
            Facing::Right => 5,
        }
    }
}

/// Directions held this tick. Each flag is sampled independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionIntent {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl MotionIntent {
    pub fn from_keyboard(keyboard: &ButtonInput<KeyCode>) -> Self {
        Self {
            left: keyboard.any_pressed([KeyCode::ArrowLeft, KeyCode::KeyA]),
            right: keyboard.any_pressed([KeyCode::ArrowRight, KeyCode::KeyD]),
            up: keyboard.any_pressed([KeyCode::ArrowUp, KeyCode::KeyW]),
            down: keyboard.any_pressed([KeyCode::ArrowDown, KeyCode::KeyS]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerMotion {
    pub velocity: Vec2,
    pub facing: Facing,
}

/// Velocity is rebuilt from scratch every tick; nothing carries over from the previous one.
/// Left wins over right and up wins over down. World space is y-up, so "up" is positive.
pub fn motion_for(intent: MotionIntent) -> PlayerMotion {
    let (x, facing) = if intent.left {
        (-PLAYER_SPEED, Facing::Left)
    } else if intent.right {
        (PLAYER_SPEED, Facing::Right)
    } else {
        (0.0, Facing::Neutral)
    };

    let y = if intent.up {
        PLAYER_SPEED
    } else if intent.down {
        -PLAYER_SPEED
    } else {
        0.0
    };

    PlayerMotion {
        velocity: Vec2::new(x, y),
        facing,
    }
}

/// Initial player values for a level, before the ECS takes over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub facing: Facing,
}

impl PlayerState {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            facing: Facing::Neutral,
        }
    }
}

/// Swaps the sheet frame whenever the facing changes.
fn animate_player(mut query: Query<(&Facing, &mut TextureAtlas), (With<Player>, Changed<Facing>)>) {
    for (facing, mut atlas) in &mut query {
        debug!("Player animation: {}", facing.animation());
        atlas.index = facing.frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_input_means_standing_still() {
        let motion = motion_for(MotionIntent::default());
        assert_eq!(motion.velocity, Vec2::ZERO);
        assert_eq!(motion.facing, Facing::Neutral);
        assert_eq!(motion.facing.animation(), "turn");
    }

    #[test]
    fn axes_are_independent() {
        let motion = motion_for(MotionIntent {
            right: true,
            down: true,
            ..default()
        });
        assert_eq!(motion.velocity, Vec2::new(PLAYER_SPEED, -PLAYER_SPEED));
        assert_eq!(motion.facing, Facing::Right);
    }

    #[test]
    fn left_is_checked_before_right() {
        let motion = motion_for(MotionIntent {
            left: true,
            right: true,
            up: true,
            down: true,
        });
        assert_eq!(motion.velocity, Vec2::new(-PLAYER_SPEED, PLAYER_SPEED));
        assert_eq!(motion.facing.animation(), "left");
    }

    #[test]
    fn keyboard_intent_reads_arrows_and_wasd() {
        let mut keyboard = ButtonInput::<KeyCode>::default();
        keyboard.press(KeyCode::KeyA);
        keyboard.press(KeyCode::ArrowUp);

        let intent = MotionIntent::from_keyboard(&keyboard);
        assert!(intent.left && intent.up);
        assert!(!intent.right && !intent.down);
    }
}
