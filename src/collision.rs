//! Tile collision map for the platform layer, plus the player overlap checks that turn physical
//! contact into typed gameplay events.

use std::collections::HashSet;

use bevy::math::IVec2;
use bevy::prelude::*;

use crate::collection::CollectibleId;
use crate::level::ActiveLevel;
use crate::map::LevelDescriptor;
use crate::movement::Collider;
use crate::player::Player;
use crate::spawner::{Collectible, ExitDoor};
use crate::state::{GameSet, GameState};

/// Builds the collision map when a level starts and turns player overlaps into contact events.
pub struct CollisionPlugin;

impl Plugin for CollisionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CollisionMap>()
            .add_event::<PlayerContact>()
            .add_systems(OnEnter(GameState::Playing), rebuild_collision_map)
            .add_systems(
                Update,
                detect_player_contacts.in_set(GameSet::Contacts),
            );
    }
}

/// Solid cells of the platform layer in grid space. Rows are flipped so that `y` grows upward like
/// world space, with the bottom-left tile at `(0, 0)`.
#[derive(Resource, Default, Debug)]
pub struct CollisionMap {
    pub tile_size: Vec2,
    pub bounds: Vec2,
    pub solids: HashSet<IVec2>,
}

impl CollisionMap {
    pub fn from_level(level: &LevelDescriptor) -> Self {
        let platforms = level.platform_layer();
        let rows = platforms.height as i32;
        let solids = platforms
            .occupied()
            .map(|(column, row, _)| IVec2::new(column as i32, rows - 1 - row as i32))
            .collect();

        Self {
            tile_size: level.tile_size,
            bounds: level.pixel_bounds,
            solids,
        }
    }

    pub fn clear(&mut self) {
        self.solids.clear();
    }

    pub fn is_solid(&self, tile: IVec2) -> bool {
        self.solids.contains(&tile)
    }
}

/// Which pairs of bodies interact. The player/exit pair only exists once the gate is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionPair {
    PlayerPlatform,
    CollectiblesPlatform,
    PlayerCollectible,
    PlayerExit,
}

/// Pairs that currently interact in the running level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionRules {
    pairs: HashSet<CollisionPair>,
}

impl CollisionRules {
    /// Returns `false` if the pair was already registered.
    pub fn register(&mut self, pair: CollisionPair) -> bool {
        self.pairs.insert(pair)
    }

    pub fn contains(&self, pair: CollisionPair) -> bool {
        self.pairs.contains(&pair)
    }
}

/// Physical contacts reported to the level controller.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerContact {
    HitCollectible(CollectibleId),
    ReachedExit,
}

/// Axis-aligned box test. Touching edges count as contact.
pub fn boxes_touch(a: Vec2, a_half: Vec2, b: Vec2, b_half: Vec2) -> bool {
    let delta = (a - b).abs();
    let reach = a_half + b_half;
    delta.x <= reach.x && delta.y <= reach.y
}

/// Rebuilds the solid tile set from the active level's platform layer.
pub fn rebuild_collision_map(level: Res<ActiveLevel>, mut map: ResMut<CollisionMap>) {
    let Some(controller) = level.controller() else {
        map.clear();
        return;
    };

    *map = CollisionMap::from_level(controller.descriptor());

    if map.solids.is_empty() {
        warn!(
            "Collision map for '{}' is empty. The second tile layer should hold the platforms.",
            controller.descriptor().id
        );
    }
}

/// Emits a `PlayerContact` for every registered pair the player currently overlaps. Runs every
/// frame, so a collectible touched for several frames reports several times; collection
/// ignores the repeats.
fn detect_player_contacts(
    level: Res<ActiveLevel>,
    player_query: Query<(&Transform, &Collider), With<Player>>,
    collectibles: Query<(&Transform, &Collider, &Collectible)>,
    exits: Query<(&Transform, &Collider), With<ExitDoor>>,
    mut contacts: EventWriter<PlayerContact>,
) {
    if !level.is_live() {
        return;
    }
    let Some(controller) = level.controller() else {
        return;
    };

    let Ok((player_transform, player_collider)) = player_query.get_single() else {
        return;
    };

    let position = player_transform.translation.truncate();
    let half = player_collider.half_extents;
    let rules = controller.rules();

    if rules.contains(CollisionPair::PlayerCollectible) {
        for (transform, collider, collectible) in &collectibles {
            if boxes_touch(
                position,
                half,
                transform.translation.truncate(),
                collider.half_extents,
            ) {
                contacts.send(PlayerContact::HitCollectible(collectible.id));
            }
        }
    }

    // Without the pair there is no detector at all, so an early visit to the exit goes unnoticed.
    if rules.contains(CollisionPair::PlayerExit) {
        for (transform, collider) in &exits {
            if boxes_touch(
                position,
                half,
                transform.translation.truncate(),
                collider.half_extents,
            ) {
                contacts.send(PlayerContact::ReachedExit);
            }
        }
    }
}
