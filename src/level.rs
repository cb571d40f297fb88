//! Level orchestration: which maps exist, loading the current one, and the `LevelController`
//! that owns a single level's gameplay state from spawn to exit.
//!
//! The controller is plain data so it can be driven by tests. Bevy only wraps it in the
//! `ActiveLevel` resource and feeds it contact events every frame.

use std::fmt;

use bevy::asset::LoadState;
use bevy::input::keyboard::KeyCode;
use bevy::prelude::*;
use rand::Rng;

use crate::collection::{CollectOutcome, CollectibleId, CollectibleSet, CollectionState};
use crate::collision::{CollisionPair, CollisionRules, PlayerContact};
use crate::map::{LevelDescriptor, TiledMapAsset};
use crate::player::{motion_for, MotionIntent, PlayerMotion};
use crate::progression::ProgressionCoordinator;
use crate::spawner::{Collectible, SpawnPlan};
use crate::state::{GameSet, GameState};

/// Registers map loading, restart handling and contact resolution.
pub struct LevelPlugin;

impl Plugin for LevelPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LevelConfig>()
            .init_resource::<LevelAssets>()
            .init_resource::<ActiveLevel>()
            .add_event::<LevelComplete>()
            .add_systems(OnEnter(GameState::Loading), start_level_load)
            .add_systems(
                Update,
                monitor_level_loading.run_if(in_state(GameState::Loading)),
            )
            .add_systems(
                Update,
                (
                    restart_level.in_set(GameSet::Input),
                    apply_contacts.in_set(GameSet::Effects),
                ),
            );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LevelId(pub String);

impl From<&str> for LevelId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for LevelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the level sequence. Levels share all logic; only their data differs.
#[derive(Debug, Clone)]
pub struct LevelEntry {
    pub id: LevelId,
    pub map_path: String,
    pub camera_zoom: f32,
}

impl LevelEntry {
    fn new(id: &str, map_path: &str, camera_zoom: f32) -> Self {
        Self {
            id: LevelId::from(id),
            map_path: map_path.to_owned(),
            camera_zoom,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TexturePaths {
    pub tileset: String,
    pub player: String,
    pub collectible: String,
    pub exit: String,
}

/// Tweakable game configuration: the ordered level sequence, texture paths and sprite sizes.
#[derive(Resource, Debug, Clone)]
pub struct LevelConfig {
    pub levels: Vec<LevelEntry>,
    pub textures: TexturePaths,
    pub player_size: Vec2,
    pub collectible_size: Vec2,
    pub exit_size: Vec2,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                LevelEntry::new("level_1", "maps/level_1.tmj", 1.0),
                LevelEntry::new("level_2", "maps/level_2.tmj", 1.0),
                LevelEntry::new("level_3", "maps/level_3.tmj", 3.0),
            ],
            textures: TexturePaths {
                tileset: "textures/tileset.png".to_owned(),
                player: "textures/dude.png".to_owned(),
                collectible: "textures/star.png".to_owned(),
                exit: "textures/salida.png".to_owned(),
            },
            player_size: Vec2::new(32.0, 48.0),
            collectible_size: Vec2::new(24.0, 22.0),
            exit_size: Vec2::new(32.0, 32.0),
        }
    }
}

impl LevelConfig {
    /// Config entry for `id`, if the level is listed.
    pub fn entry(&self, id: &LevelId) -> Option<&LevelEntry> {
        self.levels.iter().find(|entry| &entry.id == id)
    }

    pub fn level_ids(&self) -> Vec<LevelId> {
        self.levels.iter().map(|entry| entry.id.clone()).collect()
    }
}

/// Handle bookkeeping for the map currently being loaded.
#[derive(Resource, Default)]
pub struct LevelAssets {
    pub map: Option<Handle<TiledMapAsset>>,
    pub map_path: Option<String>,
    /// Set once loading failed, so the error is reported a single time.
    pub failed: bool,
}

/// Emitted exactly once per level, when the player reaches the open exit.
#[derive(Event, Debug, Clone, PartialEq, Eq)]
pub struct LevelComplete {
    pub level: LevelId,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactOutcome {
    Ignored,
    Collected { id: CollectibleId, remaining: usize },
    /// The collectible `id` was the last one and the exit just opened.
    Unlocked { id: CollectibleId },
    Completed(LevelComplete),
}

/// Gameplay state for one level, from spawn until the exit is taken.
#[derive(Debug, Clone)]
pub struct LevelController {
    descriptor: LevelDescriptor,
    plan: SpawnPlan,
    collection: CollectionState,
    rules: CollisionRules,
    starting_score: u32,
    completed: bool,
}

impl LevelController {
    /// `starting_score` is the run score carried in from earlier levels.
    pub fn new(descriptor: LevelDescriptor, starting_score: u32, rng: &mut impl Rng) -> Self {
        let plan = SpawnPlan::from_descriptor(&descriptor, rng);
        let collection = CollectionState::new(
            CollectibleSet::new(plan.collectibles.iter().map(|spawn| (spawn.id, spawn.position))),
            plan.exit,
            starting_score,
        );
        let rules = plan.rules.clone();

        let mut controller = Self {
            descriptor,
            plan,
            collection,
            rules,
            starting_score,
            completed: false,
        };
        if controller.collection.is_unlocked() {
            controller.open_exit();
        }
        controller
    }

    /// A fresh copy of this level as it was when it started. Collection progress is discarded and
    /// the score goes back to what was carried in.
    pub fn restart(&self, rng: &mut impl Rng) -> Self {
        Self::new(self.descriptor.clone(), self.starting_score, rng)
    }

    /// Player motion for this tick. A finished level no longer moves the player.
    pub fn advance(&self, intent: MotionIntent) -> PlayerMotion {
        if self.completed {
            motion_for(MotionIntent::default())
        } else {
            motion_for(intent)
        }
    }

    /// Feeds one physical contact into the level. Completion is reported once; afterwards
    /// every contact is ignored.
    pub fn on_contact(&mut self, contact: PlayerContact) -> ContactOutcome {
        if self.completed {
            return ContactOutcome::Ignored;
        }

        match contact {
            PlayerContact::HitCollectible(id) => match self.collection.collect(id) {
                CollectOutcome::Ignored => ContactOutcome::Ignored,
                CollectOutcome::Collected { remaining } => {
                    ContactOutcome::Collected { id, remaining }
                }
                CollectOutcome::Unlocked => {
                    self.open_exit();
                    ContactOutcome::Unlocked { id }
                }
            },
            PlayerContact::ReachedExit => {
                if !self.rules.contains(CollisionPair::PlayerExit) {
                    return ContactOutcome::Ignored;
                }
                self.completed = true;
                ContactOutcome::Completed(LevelComplete {
                    level: self.descriptor.id.clone(),
                    score: self.collection.score(),
                })
            }
        }
    }

    /// Arms the player/exit overlap. A level authored without an exit stays uncompletable.
    fn open_exit(&mut self) {
        if self.collection.exit().is_some() {
            self.rules.register(CollisionPair::PlayerExit);
        }
    }

    pub fn level_id(&self) -> &LevelId {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &LevelDescriptor {
        &self.descriptor
    }

    pub fn plan(&self) -> &SpawnPlan {
        &self.plan
    }

    pub fn rules(&self) -> &CollisionRules {
        &self.rules
    }

    pub fn collection(&self) -> &CollectionState {
        &self.collection
    }

    pub fn score(&self) -> u32 {
        self.collection.score()
    }

    pub fn remaining(&self) -> usize {
        self.collection.remaining()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// The controller of the level being played, if one is loaded.
///
/// A new controller is not live until its entities have been spawned. Until then contacts come
/// from whatever is still on screen and must not reach it.
#[derive(Resource, Default)]
pub struct ActiveLevel {
    controller: Option<LevelController>,
    spawned: bool,
}

impl ActiveLevel {
    pub fn controller(&self) -> Option<&LevelController> {
        self.controller.as_ref()
    }

    pub fn controller_mut(&mut self) -> Option<&mut LevelController> {
        self.controller.as_mut()
    }

    /// True when the held controller can be played as `level` without loading anything.
    pub fn is_ready_for(&self, level: &LevelId) -> bool {
        self.controller
            .as_ref()
            .is_some_and(|controller| controller.level_id() == level && !controller.is_completed())
    }

    pub fn replace(&mut self, controller: LevelController) {
        self.controller = Some(controller);
        self.spawned = false;
    }

    pub fn clear(&mut self) {
        self.controller = None;
        self.spawned = false;
    }

    /// Called once the controller's entities exist in the world.
    pub fn mark_spawned(&mut self) {
        self.spawned = self.controller.is_some();
    }

    /// True when contacts detected this frame belong to the held controller.
    pub fn is_live(&self) -> bool {
        self.spawned && self.controller.is_some()
    }
}

/// Starts loading the current level's map, unless a restart already left a fresh controller.
fn start_level_load(
    asset_server: Res<AssetServer>,
    config: Res<LevelConfig>,
    progression: Res<ProgressionCoordinator>,
    mut level_assets: ResMut<LevelAssets>,
    mut active: ResMut<ActiveLevel>,
) {
    let level = progression.current_level();

    // A restart leaves a fresh controller behind; anything else gets rebuilt from the map.
    if active.is_ready_for(level) {
        return;
    }
    active.clear();

    let Some(entry) = config.entry(level) else {
        error!("Level '{}' is not listed in the level configuration.", level);
        level_assets.failed = true;
        return;
    };

    info!("Loading level '{}' from '{}'.", level, entry.map_path);
    level_assets.map = Some(asset_server.load(entry.map_path.clone()));
    level_assets.map_path = Some(entry.map_path.clone());
    level_assets.failed = false;
}

/// Polls the map handle and builds the level controller once the asset is ready. Load and
/// parse failures are reported once and leave the game in `Loading`.
fn monitor_level_loading(
    asset_server: Res<AssetServer>,
    mut level_assets: ResMut<LevelAssets>,
    maps: Res<Assets<TiledMapAsset>>,
    progression: Res<ProgressionCoordinator>,
    mut active: ResMut<ActiveLevel>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let level = progression.current_level();
    if active.is_ready_for(level) {
        next_state.set(GameState::Playing);
        return;
    }

    if level_assets.failed {
        return;
    }
    let Some(map_handle) = level_assets.map.clone() else {
        return;
    };
    let path = level_assets
        .map_path
        .clone()
        .unwrap_or_else(|| "<unknown>".to_owned());

    match asset_server.get_load_state(map_handle.id()) {
        Some(LoadState::Loaded) => {
            let Some(asset) = maps.get(&map_handle) else {
                return;
            };

            match LevelDescriptor::from_tiled(level.clone(), &asset.map) {
                Ok(descriptor) => {
                    let controller =
                        LevelController::new(descriptor, progression.score(), &mut rand::rng());
                    info!(
                        "Level '{}' ready: background '{}', platforms '{}', {} collectible(s), carrying score {}.",
                        level,
                        controller.descriptor().background_layer().name,
                        controller.descriptor().platform_layer().name,
                        controller.remaining(),
                        controller.score()
                    );
                    active.replace(controller);
                    next_state.set(GameState::Playing);
                }
                Err(err) => {
                    error!("Map '{}' for level '{}' is unusable: {}", path, level, err);
                    level_assets.failed = true;
                }
            }
        }
        Some(LoadState::Failed(err)) => {
            error!("Unable to load map '{}' for level '{}': {}", path, level, err);
            level_assets.failed = true;
        }
        _ => {}
    }
}

/// `R` reloads the current level. `just_pressed` makes it fire once per press, never while held.
fn restart_level(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut active: ResMut<ActiveLevel>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if !keyboard.just_pressed(KeyCode::KeyR) {
        return;
    }
    let Some(controller) = active.controller() else {
        return;
    };

    let fresh = controller.restart(&mut rand::rng());
    info!(
        "Restarting level '{}' with score {}.",
        fresh.level_id(),
        fresh.score()
    );
    active.replace(fresh);
    next_state.set(GameState::Loading);
}

/// Resolves this frame's contacts against the active controller: despawns collected entities
/// and announces completion.
pub fn apply_contacts(
    mut commands: Commands,
    mut contacts: EventReader<PlayerContact>,
    mut active: ResMut<ActiveLevel>,
    collectibles: Query<(Entity, &Collectible)>,
    mut completions: EventWriter<LevelComplete>,
) {
    // Contacts from a level that was just restarted or replaced are stale.
    if !active.is_live() {
        contacts.clear();
        return;
    }
    let Some(controller) = active.controller_mut() else {
        contacts.clear();
        return;
    };

    for contact in contacts.read() {
        let collected = match controller.on_contact(*contact) {
            ContactOutcome::Ignored => None,
            ContactOutcome::Collected { id, remaining } => {
                if let Some(entry) = controller.collection().collectibles().get(id) {
                    debug!("Collected {:?} at {}; {} remaining.", id, entry.position, remaining);
                }
                Some(id)
            }
            ContactOutcome::Unlocked { id } => {
                if let Some(exit) = controller.collection().exit() {
                    info!(
                        "All collectibles taken in '{}'; the exit at {} is open.",
                        controller.level_id(),
                        exit.position
                    );
                }
                Some(id)
            }
            ContactOutcome::Completed(done) => {
                info!("Level '{}' complete with score {}.", done.level, done.score);
                completions.send(done);
                None
            }
        };

        if let Some(id) = collected {
            for (entity, collectible) in &collectibles {
                if collectible.id == id {
                    commands.entity(entity).despawn_recursive();
                }
            }
        }
    }
}
