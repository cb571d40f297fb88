//! HUD and run-complete overlay.
//!
//! The HUD lives for the whole app and reads the active level every frame; the summary overlay is
//! spawned when the run ends and removed when a new run starts.

use bevy::prelude::*;

use crate::level::ActiveLevel;
use crate::progression::ProgressionCoordinator;
use crate::state::{GameSet, GameState};

/// Registers the HUD and the run summary overlay.
pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_hud)
            .add_systems(Update, update_hud.in_set(GameSet::Ui))
            .add_systems(OnEnter(GameState::Complete), spawn_run_summary)
            .add_systems(OnExit(GameState::Complete), despawn_run_summary);
    }
}

#[derive(Component)]
struct ScoreText;

#[derive(Component)]
struct RemainingText;

#[derive(Component)]
struct RunSummary;

pub fn score_text(score: u32) -> String {
    format!("Score: {score}")
}

pub fn remaining_text(remaining: usize) -> String {
    format!("{remaining} remaining")
}

pub fn run_summary_text(score: u32) -> String {
    format!("Run complete\nTotal score: {score}\nPress Enter to restart")
}

fn hud_text(value: String, top: f32, font_size: f32, color: Color) -> TextBundle {
    TextBundle::from_section(
        value,
        TextStyle {
            font_size,
            color,
            ..default()
        },
    )
    .with_style(Style {
        position_type: PositionType::Absolute,
        left: Val::Px(8.0),
        top: Val::Px(top),
        ..default()
    })
}

/// Spawns the score and remaining-count lines. They stay alive across levels.
fn spawn_hud(mut commands: Commands) {
    commands.spawn((
        ScoreText,
        Name::new("ScoreText"),
        hud_text(score_text(0), 0.0, 32.0, Color::WHITE),
    ));
    commands.spawn((
        RemainingText,
        Name::new("RemainingText"),
        hud_text(
            remaining_text(0),
            40.0,
            28.0,
            Color::srgb(1.0, 0.9, 0.2),
        ),
    ));
}

/// Rewrites the HUD from the active level every tick.
fn update_hud(
    level: Res<ActiveLevel>,
    mut score_query: Query<&mut Text, (With<ScoreText>, Without<RemainingText>)>,
    mut remaining_query: Query<&mut Text, (With<RemainingText>, Without<ScoreText>)>,
) {
    let Some(controller) = level.controller() else {
        return;
    };

    for mut text in &mut score_query {
        text.sections[0].value = score_text(controller.score());
    }
    for mut text in &mut remaining_query {
        text.sections[0].value = remaining_text(controller.remaining());
    }
}

/// Spawns a full-screen UI node with centered text on top of the finished level.
fn spawn_run_summary(mut commands: Commands, progression: Res<ProgressionCoordinator>) {
    commands
        .spawn((
            RunSummary,
            Name::new("RunSummary"),
            NodeBundle {
                background_color: BackgroundColor(Color::srgba(0.0, 0.0, 0.0, 0.6)),
                style: Style {
                    position_type: PositionType::Absolute,
                    width: Val::Percent(100.0),
                    height: Val::Percent(100.0),
                    align_items: AlignItems::Center,
                    justify_content: JustifyContent::Center,
                    ..default()
                },
                z_index: ZIndex::Global(50),
                ..default()
            },
        ))
        .with_children(|parent| {
            parent.spawn(
                TextBundle::from_section(
                    run_summary_text(progression.score()),
                    TextStyle {
                        font_size: 36.0,
                        color: Color::srgba(0.9, 0.9, 0.9, 1.0),
                        ..default()
                    },
                )
                .with_text_justify(JustifyText::Center),
            );
        });
}

/// Removes the summary overlay when a new run starts.
fn despawn_run_summary(mut commands: Commands, query: Query<Entity, With<RunSummary>>) {
    for entity in &query {
        commands.entity(entity).despawn_recursive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hud_lines() {
        assert_eq!(score_text(0), "Score: 0");
        assert_eq!(score_text(30), "Score: 30");
        assert_eq!(remaining_text(4), "4 remaining");
    }

    #[test]
    fn summary_shows_total_and_restart_hint() {
        let summary = run_summary_text(50);
        assert!(summary.contains("Total score: 50"));
        assert!(summary.ends_with("Press Enter to restart"));
    }
}
