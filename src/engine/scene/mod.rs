//! Scene entities the AR core drives: the avatar, the reticle, lighting,
//! and the preview/AR background switch.

pub mod avatar;
pub mod reticle;

use bevy::prelude::*;

use crate::engine::core::app_state::DisplayMode;

use avatar::{reset_preview_pose, spawn_avatar, AvatarModel};
use reticle::{spawn_reticle, Reticle};

/// Sky blue preview backdrop, matching the non-AR display mode.
pub const PREVIEW_CLEAR_COLOR: Color = Color::srgb(0.53, 0.81, 0.92);

pub struct ScenePlugin;

impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ClearColor(PREVIEW_CLEAR_COLOR))
            .add_systems(Startup, setup_scene)
            .add_systems(OnEnter(DisplayMode::ArXr), enter_ar_backdrop)
            .add_systems(OnEnter(DisplayMode::ArFallback), enter_ar_backdrop)
            .add_systems(OnEnter(DisplayMode::Preview), enter_preview_backdrop);
    }
}

fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 3.0, 5.0).looking_at(Vec3::new(0.0, 1.0, 0.0), Vec3::Y),
    ));

    spawn_lighting(&mut commands);
    spawn_avatar(&mut commands, meshes.as_mut(), materials.as_mut());
    spawn_reticle(&mut commands, meshes.as_mut(), materials.as_mut());
}

fn spawn_lighting(commands: &mut Commands) {
    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 300.0,
        ..default()
    });
    commands.spawn((
        DirectionalLight {
            illuminance: 10_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(10.0, 10.0, 5.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

/// AR composites over the camera image, so the clear color goes fully
/// transparent.
fn enter_ar_backdrop(mut clear_color: ResMut<ClearColor>) {
    clear_color.0 = Color::NONE;
}

fn enter_preview_backdrop(
    mut clear_color: ResMut<ClearColor>,
    mut avatar: Query<&mut Transform, With<AvatarModel>>,
    mut reticle: Query<&mut Visibility, With<Reticle>>,
) {
    clear_color.0 = PREVIEW_CLEAR_COLOR;
    if let Ok(mut transform) = avatar.single_mut() {
        reset_preview_pose(&mut transform);
    }
    if let Ok(mut visibility) = reticle.single_mut() {
        *visibility = Visibility::Hidden;
    }
}
