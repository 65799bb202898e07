use bevy::prelude::*;

use crate::constants::{PREVIEW_POSITION, PREVIEW_SCALE};

/// Marker for the placeable avatar entity.
#[derive(Component)]
pub struct AvatarModel;

/// Placeholder avatar body used until a real model pipeline exists: a
/// bright box resting on the ground plane.
pub fn spawn_avatar(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::new(2.0, 2.0, 2.0))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(1.0, 0.27, 0.27),
            perceptual_roughness: 0.4,
            ..default()
        })),
        Transform::from_translation(preview_position()),
        AvatarModel,
        Name::new("avatar"),
    ));
}

pub fn preview_position() -> Vec3 {
    Vec3::from_array(PREVIEW_POSITION)
}

/// Canonical preview pose applied when leaving AR.
pub fn reset_preview_pose(transform: &mut Transform) {
    *transform = Transform::from_translation(preview_position())
        .with_scale(Vec3::splat(PREVIEW_SCALE));
}
