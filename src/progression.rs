//! Run progression: the ordered level sequence, the score carried between levels, and the
//! terminal "run complete" state with its restart path.
//!
//! The coordinator is the only thing that outlives a level. Each new `LevelController` receives
//! the carried score by value, so no level can reach back into an earlier one.

use bevy::input::keyboard::KeyCode;
use bevy::prelude::*;
use thiserror::Error;

use crate::level::{apply_contacts, LevelComplete, LevelConfig, LevelId};
use crate::state::{GameSet, GameState};
use crate::transition::TransitionState;

/// Registers the coordinator and the systems reacting to level completion and run restart.
pub struct ProgressionPlugin;

impl Plugin for ProgressionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ProgressionCoordinator>()
            .add_systems(
                Update,
                handle_level_complete
                    .in_set(GameSet::Effects)
                    .after(apply_contacts),
            )
            .add_systems(
                Update,
                confirm_run_restart.run_if(in_state(GameState::Complete)),
            );
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressionError {
    #[error("the level sequence is empty")]
    EmptySequence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressionState {
    pub current_level: LevelId,
    pub score: u32,
    pub terminal: bool,
}

/// What the game should do after a level's exit was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    NextLevel { level: LevelId, score: u32 },
    RunComplete { score: u32 },
}

/// Sequencer for the whole run. Lives for the whole app; levels come and go.
#[derive(Resource, Debug, Clone)]
pub struct ProgressionCoordinator {
    levels: Vec<LevelId>,
    index: usize,
    state: ProgressionState,
}

impl ProgressionCoordinator {
    /// Starts a run at the first of `levels` with score 0. The sequence must not be empty.
    pub fn new(levels: Vec<LevelId>) -> Result<Self, ProgressionError> {
        let first = levels.first().cloned().ok_or(ProgressionError::EmptySequence)?;
        Ok(Self {
            levels,
            index: 0,
            state: ProgressionState {
                current_level: first,
                score: 0,
                terminal: false,
            },
        })
    }

    /// Stores the finished level's score and moves on. Ignored once the run is over.
    pub fn on_level_complete(&mut self, score: u32) -> Option<Handoff> {
        if self.state.terminal {
            return None;
        }

        self.state.score = score;

        match self.levels.get(self.index + 1) {
            Some(next) => {
                self.index += 1;
                self.state.current_level = next.clone();
                Some(Handoff::NextLevel {
                    level: next.clone(),
                    score,
                })
            }
            None => {
                self.state.terminal = true;
                Some(Handoff::RunComplete { score })
            }
        }
    }

    /// Starts a new run from the first level. Only valid after the last level was finished.
    pub fn on_restart_requested(&mut self) -> bool {
        if !self.state.terminal {
            return false;
        }

        self.index = 0;
        self.state = ProgressionState {
            current_level: self.levels[0].clone(),
            score: 0,
            terminal: false,
        };
        true
    }

    pub fn current_level(&self) -> &LevelId {
        &self.state.current_level
    }

    /// Score carried into the current level.
    pub fn score(&self) -> u32 {
        self.state.score
    }

    pub fn is_terminal(&self) -> bool {
        self.state.terminal
    }

    pub fn accepts_motion(&self) -> bool {
        !self.is_terminal()
    }
}

impl FromWorld for ProgressionCoordinator {
    fn from_world(world: &mut World) -> Self {
        let levels = world
            .get_resource_or_insert_with(LevelConfig::default)
            .level_ids();
        Self::new(levels).unwrap_or_else(|err| panic!("invalid level configuration: {err}"))
    }
}

/// Hands finished levels to the coordinator and starts the fade or ends the run.
fn handle_level_complete(
    mut completions: EventReader<LevelComplete>,
    mut progression: ResMut<ProgressionCoordinator>,
    mut transition: ResMut<TransitionState>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    for done in completions.read() {
        match progression.on_level_complete(done.score) {
            Some(Handoff::NextLevel { level, score }) => {
                info!("Leaving '{}' for '{}' with score {}.", done.level, level, score);
                transition.start_transition(level);
            }
            Some(Handoff::RunComplete { score }) => {
                info!("Run complete. Total score: {}.", score);
                next_state.set(GameState::Complete);
            }
            None => {}
        }
    }
}

/// `Enter` starts a new run once the last level is done. Edge-triggered like the level restart.
fn confirm_run_restart(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut progression: ResMut<ProgressionCoordinator>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if !keyboard.just_pressed(KeyCode::Enter) {
        return;
    }

    if progression.on_restart_requested() {
        info!(
            "Starting a new run from '{}'.",
            progression.current_level()
        );
        next_state.set(GameState::Loading);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectibleId;
    use crate::collision::PlayerContact;
    use crate::level::LevelController;
    use crate::map::parse_level;
    use bevy::state::app::StatesPlugin;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn three_levels() -> ProgressionCoordinator {
        ProgressionCoordinator::new(vec![
            LevelId::from("level_1"),
            LevelId::from("level_2"),
            LevelId::from("level_3"),
        ])
        .unwrap()
    }

    fn level_with_stars(id: &str, stars: usize) -> LevelController {
        let objects: Vec<String> = (0..stars)
            .map(|i| format!(r#"{{ "type": "star", "x": {}, "y": 8 }}"#, i * 8))
            .chain(std::iter::once(
                r#"{ "name": "salida", "x": 24, "y": 24 }"#.to_owned(),
            ))
            .collect();
        let json = format!(
            r#"{{
                "width": 2, "height": 2, "tilewidth": 16, "tileheight": 16,
                "layers": [
                    {{ "type": "tilelayer", "name": "bg", "width": 2, "height": 2, "data": [1,1,1,1] }},
                    {{ "type": "tilelayer", "name": "fg", "width": 2, "height": 2, "data": [0,0,2,2] }},
                    {{ "type": "objectgroup", "name": "objects", "objects": [{}] }}
                ]
            }}"#,
            objects.join(",")
        );
        let descriptor = parse_level(id, json.as_bytes()).unwrap();
        LevelController::new(descriptor, 0, &mut StdRng::seed_from_u64(9))
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert_eq!(
            ProgressionCoordinator::new(Vec::new()).unwrap_err(),
            ProgressionError::EmptySequence
        );
    }

    #[test]
    fn three_collectibles_carry_thirty_into_the_next_level() {
        let mut progression = three_levels();
        let mut level = level_with_stars("level_1", 3);

        for i in 0..3 {
            level.on_contact(PlayerContact::HitCollectible(CollectibleId(i)));
        }
        assert_eq!(level.score(), 30);

        let crate::level::ContactOutcome::Completed(done) =
            level.on_contact(PlayerContact::ReachedExit)
        else {
            panic!("exit should complete the level once unlocked");
        };

        assert_eq!(
            progression.on_level_complete(done.score),
            Some(Handoff::NextLevel {
                level: LevelId::from("level_2"),
                score: 30
            })
        );
        assert_eq!(progression.current_level(), &LevelId::from("level_2"));
        assert_eq!(progression.score(), 30);
    }

    #[test]
    fn final_level_enters_terminal_state() {
        let mut progression = three_levels();
        progression.on_level_complete(20);
        progression.on_level_complete(30);

        assert_eq!(
            progression.on_level_complete(50),
            Some(Handoff::RunComplete { score: 50 })
        );
        assert!(progression.is_terminal());
        assert!(!progression.accepts_motion());
        assert_eq!(progression.score(), 50);
        assert_eq!(progression.current_level(), &LevelId::from("level_3"));

        // Nothing else advances the run until it is restarted.
        assert_eq!(progression.on_level_complete(90), None);
        assert_eq!(progression.score(), 50);
    }

    #[test]
    fn restart_only_valid_when_terminal() {
        let mut progression = three_levels();
        progression.on_level_complete(10);
        assert!(!progression.on_restart_requested());
        assert_eq!(progression.score(), 10);
        assert_eq!(progression.current_level(), &LevelId::from("level_2"));

        progression.on_level_complete(20);
        progression.on_level_complete(50);
        assert!(progression.on_restart_requested());
        assert_eq!(
            progression.state,
            ProgressionState {
                current_level: LevelId::from("level_1"),
                score: 0,
                terminal: false,
            }
        );
        assert!(progression.accepts_motion());
    }

    #[test]
    fn single_level_run_is_terminal_after_one_exit() {
        let mut progression = ProgressionCoordinator::new(vec![LevelId::from("only")]).unwrap();
        assert_eq!(
            progression.on_level_complete(0),
            Some(Handoff::RunComplete { score: 0 })
        );
        assert!(progression.on_restart_requested());
        assert_eq!(progression.current_level(), &LevelId::from("only"));
    }

    fn finished_run() -> ProgressionCoordinator {
        let mut progression = three_levels();
        progression.on_level_complete(10);
        progression.on_level_complete(30);
        progression.on_level_complete(50);
        progression
    }

    fn confirm_app(progression: ProgressionCoordinator) -> App {
        let mut app = App::new();
        app.add_plugins(StatesPlugin)
            .init_state::<GameState>()
            .init_resource::<ButtonInput<KeyCode>>()
            .insert_resource(progression)
            .add_systems(
                Update,
                confirm_run_restart.run_if(in_state(GameState::Complete)),
            );
        app
    }

    fn enter_state(app: &mut App, state: GameState) {
        app.world_mut()
            .resource_mut::<NextState<GameState>>()
            .set(state);
        app.update();
        assert_eq!(*app.world().resource::<State<GameState>>().get(), state);
    }

    fn keyboard(app: &mut App) -> Mut<'_, ButtonInput<KeyCode>> {
        app.world_mut().resource_mut::<ButtonInput<KeyCode>>()
    }

    #[test]
    fn confirm_is_ignored_outside_the_complete_state() {
        let mut app = confirm_app(finished_run());
        enter_state(&mut app, GameState::Playing);

        keyboard(&mut app).press(KeyCode::Enter);
        app.update();

        let progression = app.world().resource::<ProgressionCoordinator>();
        assert!(progression.is_terminal());
        assert_eq!(progression.score(), 50);
    }

    #[test]
    fn held_confirm_restarts_the_run_once() {
        let mut app = confirm_app(finished_run());
        enter_state(&mut app, GameState::Complete);

        keyboard(&mut app).press(KeyCode::Enter);
        app.update();
        {
            let progression = app.world().resource::<ProgressionCoordinator>();
            assert!(!progression.is_terminal());
            assert_eq!(progression.score(), 0);
            assert_eq!(progression.current_level(), &LevelId::from("level_1"));
        }

        // Finish the new run while Enter is still held; the held key must not restart it again.
        keyboard(&mut app).clear();
        {
            let mut progression = app.world_mut().resource_mut::<ProgressionCoordinator>();
            progression.on_level_complete(20);
            progression.on_level_complete(40);
            progression.on_level_complete(60);
        }
        enter_state(&mut app, GameState::Complete);
        app.update();

        let progression = app.world().resource::<ProgressionCoordinator>();
        assert!(progression.is_terminal());
        assert_eq!(progression.score(), 60);
    }

    proptest! {
        #[test]
        fn score_never_decreases_within_a_run(gains in proptest::collection::vec(0u32..5, 1..3)) {
            let mut progression = three_levels();
            let mut carried = progression.score();

            for (index, stars) in gains.iter().enumerate() {
                let id = progression.current_level().0.clone();
                let mut level = LevelController::new(
                    level_with_stars(&id, *stars as usize).descriptor().clone(),
                    carried,
                    &mut StdRng::seed_from_u64(index as u64),
                );
                for i in 0..*stars {
                    level.on_contact(PlayerContact::HitCollectible(CollectibleId(i)));
                }
                let crate::level::ContactOutcome::Completed(done) =
                    level.on_contact(PlayerContact::ReachedExit)
                else {
                    panic!("level should be completable");
                };

                prop_assert!(done.score >= carried);
                progression.on_level_complete(done.score);
                prop_assert!(progression.score() >= carried);
                carried = progression.score();
            }
        }
    }
}
