//! Fade between levels. When a level hands off to the next one the screen fades to black, the
//! next map is loaded at the darkest point, and the new level fades back in.

use bevy::prelude::*;

use crate::level::LevelId;
use crate::state::GameState;

/// Registers the transition timer and the fade overlay.
pub struct TransitionPlugin;

impl Plugin for TransitionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TransitionState>()
            .add_systems(Startup, spawn_fade_overlay)
            .add_systems(Update, (update_transition, update_fade_overlay).chain());
    }
}

/// Tracks the current transition state and timing.
#[derive(Resource, Debug)]
pub struct TransitionState {
    pub is_transitioning: bool,
    pub fade_timer: f32,
    pub fade_duration: f32,
    pub next_level: Option<LevelId>,
}

impl Default for TransitionState {
    fn default() -> Self {
        Self {
            is_transitioning: false,
            fade_timer: 0.0,
            fade_duration: 1.0,
            next_level: None,
        }
    }
}

impl TransitionState {
    pub fn start_transition(&mut self, level: LevelId) {
        self.is_transitioning = true;
        self.fade_timer = 0.0;
        self.next_level = Some(level);
    }

    pub fn reset(&mut self) {
        self.is_transitioning = false;
        self.fade_timer = 0.0;
        self.next_level = None;
    }

    /// Returns the current fade alpha (0.0 = transparent, 1.0 = fully black)
    pub fn get_fade_alpha(&self) -> f32 {
        if !self.is_transitioning {
            return 0.0;
        }

        let half_duration = self.fade_duration * 0.5;
        let alpha = if self.fade_timer < half_duration {
            // Fade out
            self.fade_timer / half_duration
        } else {
            // Fade in
            1.0 - ((self.fade_timer - half_duration) / half_duration)
        };
        alpha.clamp(0.0, 1.0)
    }

    /// Advances the timer. Returns the level to load when the midpoint is crossed on this step.
    pub fn tick(&mut self, delta: f32) -> Option<LevelId> {
        if !self.is_transitioning {
            return None;
        }

        let half_duration = self.fade_duration * 0.5;
        let before = self.fade_timer;
        self.fade_timer += delta;

        let switch = if before < half_duration && self.fade_timer >= half_duration {
            self.next_level.take()
        } else {
            None
        };

        if self.fade_timer >= self.fade_duration {
            self.reset();
        }

        switch
    }
}

/// Run condition: gameplay input and contacts pause while the screen is fading.
pub fn not_transitioning(transition: Res<TransitionState>) -> bool {
    !transition.is_transitioning
}

/// Marker component for the fade overlay node.
#[derive(Component)]
pub struct FadeOverlay;

/// Spawns a fullscreen black UI node, kept transparent while no transition runs.
fn spawn_fade_overlay(mut commands: Commands) {
    commands.spawn((
        FadeOverlay,
        Name::new("FadeOverlay"),
        NodeBundle {
            style: Style {
                position_type: PositionType::Absolute,
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                ..default()
            },
            background_color: BackgroundColor(Color::srgba(0.0, 0.0, 0.0, 0.0)),
            z_index: ZIndex::Global(100),
            ..default()
        },
    ));
}

/// Updates the fade overlay opacity based on transition state.
fn update_fade_overlay(
    transition: Res<TransitionState>,
    mut overlay_query: Query<&mut BackgroundColor, With<FadeOverlay>>,
) {
    for mut background in &mut overlay_query {
        background.0 = Color::srgba(0.0, 0.0, 0.0, transition.get_fade_alpha());
    }
}

/// Switches levels at the midpoint, when the screen is fully black.
fn update_transition(
    time: Res<Time>,
    mut transition: ResMut<TransitionState>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if let Some(level) = transition.tick(time.delta_seconds()) {
        info!("Screen dark; loading '{}'.", level);
        next_state.set(GameState::Loading);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_rises_then_falls() {
        let mut transition = TransitionState::default();
        assert_eq!(transition.get_fade_alpha(), 0.0);

        transition.start_transition(LevelId::from("level_2"));
        transition.fade_timer = 0.25;
        assert!((transition.get_fade_alpha() - 0.5).abs() < 1e-6);
        transition.fade_timer = 0.5;
        assert!((transition.get_fade_alpha() - 1.0).abs() < 1e-6);
        transition.fade_timer = 0.75;
        assert!((transition.get_fade_alpha() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn switches_once_at_the_midpoint() {
        let mut transition = TransitionState::default();
        transition.start_transition(LevelId::from("level_2"));

        assert_eq!(transition.tick(0.3), None);
        assert_eq!(transition.tick(0.3), Some(LevelId::from("level_2")));
        assert_eq!(transition.tick(0.3), None);
        assert!(transition.is_transitioning);

        assert_eq!(transition.tick(0.3), None);
        assert!(!transition.is_transitioning);
        assert_eq!(transition.get_fade_alpha(), 0.0);
    }
}
