//! Entity spawning. A `SpawnPlan` is derived from the level descriptor first (pure data, easy to
//! test), then the systems below turn it into sprites and bodies when gameplay starts.
//!
//! Every entity created here carries `LevelEntity`, so tearing a level down is a single query.

use std::ops::RangeInclusive;

use bevy::prelude::*;
use rand::Rng;

use crate::collection::CollectibleId;
use crate::collision::{CollisionPair, CollisionRules};
use crate::level::{ActiveLevel, LevelConfig};
use crate::map::{LevelDescriptor, SpawnKind};
use crate::movement::{Body, Collider, Immovable, Velocity};
use crate::player::{Player, PlayerState};
use crate::state::GameState;

pub const PLAYER_BOUNCE: f32 = 0.2;

/// Range the per-collectible bounce is drawn from.
pub const COLLECTIBLE_BOUNCE: RangeInclusive<f32> = 0.4..=0.8;

const DUDE_FRAME: UVec2 = UVec2::new(32, 48);
const DUDE_FRAMES: u32 = 9;

/// Spawns the active level when gameplay starts and clears it when the next load begins.
pub struct SpawnerPlugin;

impl Plugin for SpawnerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(GameState::Loading), despawn_level)
            .add_systems(OnEnter(GameState::Playing), spawn_level);
    }
}

/// Tags everything that belongs to the running level.
#[derive(Component)]
pub struct LevelEntity;

#[derive(Component, Debug, Clone, Copy)]
pub struct Collectible {
    pub id: CollectibleId,
}

#[derive(Component)]
pub struct ExitDoor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectibleSpawn {
    pub id: CollectibleId,
    pub position: Vec2,
    pub bounce: f32,
}

/// Everything needed to populate a level, in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPlan {
    pub player: PlayerState,
    pub player_body: Body,
    pub collectibles: Vec<CollectibleSpawn>,
    pub collectible_gravity: f32,
    pub exit: Option<Vec2>,
    pub rules: CollisionRules,
}

impl SpawnPlan {
    pub fn from_descriptor(level: &LevelDescriptor, rng: &mut impl Rng) -> Self {
        let spawn_px = match level.records(SpawnKind::PlayerSpawn).next() {
            Some(record) => record.position,
            None => {
                warn!(
                    "Level '{}' has no player spawn; placing the player at the map origin.",
                    level.id
                );
                Vec2::ZERO
            }
        };

        let collectibles = level
            .records(SpawnKind::Collectible)
            .enumerate()
            .map(|(index, record)| CollectibleSpawn {
                id: CollectibleId(index as u32),
                position: level.to_world(record.position),
                bounce: rng.random_range(COLLECTIBLE_BOUNCE),
            })
            .collect();

        let exit = level
            .records(SpawnKind::Exit)
            .next()
            .map(|record| level.to_world(record.position));

        if exit.is_none() {
            warn!("Level '{}' has no exit; it cannot be completed.", level.id);
        }

        let mut rules = CollisionRules::default();
        rules.register(CollisionPair::PlayerPlatform);
        rules.register(CollisionPair::CollectiblesPlatform);
        rules.register(CollisionPair::PlayerCollectible);

        Self {
            player: PlayerState::at(level.to_world(spawn_px)),
            player_body: Body {
                gravity_scale: 0.0,
                bounce: PLAYER_BOUNCE,
                collide_world_bounds: true,
            },
            collectibles,
            collectible_gravity: 1.0,
            exit,
            rules,
        }
    }
}

/// Turns the active controller's plan into tiles, sprites and bodies. Collectibles already
/// taken are skipped.
pub fn spawn_level(
    mut commands: Commands,
    mut level: ResMut<ActiveLevel>,
    config: Res<LevelConfig>,
    asset_server: Res<AssetServer>,
    mut layouts: ResMut<Assets<TextureAtlasLayout>>,
) {
    let Some(controller) = level.controller() else {
        warn!("Entered gameplay without a loaded level; nothing to spawn.");
        return;
    };
    let descriptor = controller.descriptor();
    let plan = controller.plan();

    match descriptor.tileset {
        Some(tileset) => {
            let texture = asset_server.load(config.textures.tileset.clone());
            let layout = layouts.add(TextureAtlasLayout::from_grid(
                tileset.tile_size,
                tileset.columns,
                tileset.rows,
                None,
                None,
            ));

            // Background first, platforms just above it. Extra tile layers are still drawn.
            for (depth, layer) in descriptor.tile_layers().iter().enumerate() {
                let z = depth as f32 * 0.1;
                for (column, row, gid) in layer.occupied() {
                    let Some(index) = gid.checked_sub(tileset.first_gid) else {
                        continue;
                    };
                    commands.spawn((
                        LevelEntity,
                        SpriteBundle {
                            texture: texture.clone(),
                            sprite: Sprite {
                                custom_size: Some(descriptor.tile_size),
                                ..default()
                            },
                            transform: Transform::from_translation(
                                descriptor.tile_center(column, row).extend(z),
                            ),
                            ..default()
                        },
                        TextureAtlas {
                            layout: layout.clone(),
                            index: index as usize,
                        },
                    ));
                }
            }
        }
        None => warn!(
            "Level '{}' has no usable tileset; tiles will not be drawn.",
            descriptor.id
        ),
    }

    if let Some(exit_position) = plan.exit {
        commands.spawn((
            Name::new("Exit"),
            LevelEntity,
            ExitDoor,
            Immovable,
            SpriteBundle {
                texture: asset_server.load(config.textures.exit.clone()),
                sprite: Sprite {
                    custom_size: Some(config.exit_size),
                    ..default()
                },
                transform: Transform::from_translation(exit_position.extend(1.0)),
                ..default()
            },
            Collider::from_size(config.exit_size),
        ));
    }

    let star_texture = asset_server.load(config.textures.collectible.clone());
    let collection = controller.collection();
    for spawn in plan
        .collectibles
        .iter()
        .filter(|spawn| collection.is_active(spawn.id))
    {
        commands.spawn((
            Name::new(format!("Collectible {}", spawn.id.0)),
            LevelEntity,
            Collectible { id: spawn.id },
            SpriteBundle {
                texture: star_texture.clone(),
                sprite: Sprite {
                    custom_size: Some(config.collectible_size),
                    ..default()
                },
                transform: Transform::from_translation(spawn.position.extend(1.5)),
                ..default()
            },
            Velocity::default(),
            Body {
                gravity_scale: plan.collectible_gravity,
                bounce: spawn.bounce,
                collide_world_bounds: true,
            },
            Collider::from_size(config.collectible_size),
        ));
    }

    let dude_layout = layouts.add(TextureAtlasLayout::from_grid(
        DUDE_FRAME,
        DUDE_FRAMES,
        1,
        None,
        None,
    ));
    // The player always renders above the exit.
    commands.spawn((
        Name::new("Player"),
        LevelEntity,
        Player,
        SpriteBundle {
            texture: asset_server.load(config.textures.player.clone()),
            sprite: Sprite {
                custom_size: Some(config.player_size),
                ..default()
            },
            transform: Transform::from_translation(plan.player.position.extend(2.0)),
            ..default()
        },
        TextureAtlas {
            layout: dude_layout,
            index: plan.player.facing.frame(),
        },
        plan.player.facing,
        Velocity(plan.player.velocity),
        plan.player_body,
        Collider::from_size(config.player_size),
    ));

    info!(
        "Spawned level '{}': {} collectible(s), exit {}.",
        descriptor.id,
        collection.remaining(),
        if plan.exit.is_some() { "present" } else { "missing" }
    );
    level.mark_spawned();
}

/// Removes every entity of the previous level.
fn despawn_level(mut commands: Commands, query: Query<Entity, With<LevelEntity>>) {
    for entity in &query {
        commands.entity(entity).despawn_recursive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::parse_level;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn level_with_objects(objects: &str) -> LevelDescriptor {
        let json = format!(
            r#"{{
                "width": 4, "height": 4, "tilewidth": 16, "tileheight": 16,
                "layers": [
                    {{ "type": "tilelayer", "name": "bg", "width": 4, "height": 4, "data": [1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1] }},
                    {{ "type": "tilelayer", "name": "fg", "width": 4, "height": 4, "data": [0,0,0,0,0,0,0,0,0,0,0,0,2,2,2,2] }},
                    {{ "type": "objectgroup", "name": "objects", "objects": [{objects}] }}
                ]
            }}"#
        );
        parse_level("test", json.as_bytes()).unwrap()
    }

    #[test]
    fn places_entities_in_world_space() {
        let level = level_with_objects(
            r#"{ "name": "player", "x": 8, "y": 40 },
               { "type": "star", "x": 24, "y": 8 },
               { "type": "salida", "x": 56, "y": 40 }"#,
        );
        let plan = SpawnPlan::from_descriptor(&level, &mut StdRng::seed_from_u64(7));

        assert_eq!(plan.player.position, Vec2::new(8.0, 24.0));
        assert_eq!(plan.player.velocity, Vec2::ZERO);
        assert_eq!(plan.collectibles.len(), 1);
        assert_eq!(plan.collectibles[0].position, Vec2::new(24.0, 56.0));
        assert_eq!(plan.exit, Some(Vec2::new(56.0, 24.0)));
    }

    #[test]
    fn missing_player_spawn_falls_back_to_origin() {
        let level = level_with_objects(r#"{ "type": "star", "x": 24, "y": 8 }"#);
        let plan = SpawnPlan::from_descriptor(&level, &mut StdRng::seed_from_u64(1));

        assert_eq!(plan.player.position, level.to_world(Vec2::ZERO));
        assert!(plan.exit.is_none());
    }

    #[test]
    fn collectible_bounce_stays_in_range() {
        let stars: Vec<String> = (0..32)
            .map(|i| format!(r#"{{ "type": "star", "x": {i}, "y": 8 }}"#))
            .collect();
        let level = level_with_objects(&stars.join(","));
        let plan = SpawnPlan::from_descriptor(&level, &mut StdRng::seed_from_u64(42));

        assert_eq!(plan.collectibles.len(), 32);
        for spawn in &plan.collectibles {
            assert!(COLLECTIBLE_BOUNCE.contains(&spawn.bounce), "{}", spawn.bounce);
        }
        let ids: Vec<u32> = plan.collectibles.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn registers_everything_but_the_exit_pair() {
        let level = level_with_objects(r#"{ "name": "salida", "x": 0, "y": 0 }"#);
        let plan = SpawnPlan::from_descriptor(&level, &mut StdRng::seed_from_u64(3));

        assert!(plan.rules.contains(CollisionPair::PlayerPlatform));
        assert!(plan.rules.contains(CollisionPair::CollectiblesPlatform));
        assert!(plan.rules.contains(CollisionPair::PlayerCollectible));
        assert!(!plan.rules.contains(CollisionPair::PlayerExit));
        assert_eq!(plan.player_body.bounce, PLAYER_BOUNCE);
        assert_eq!(plan.player_body.gravity_scale, 0.0);
    }
}
