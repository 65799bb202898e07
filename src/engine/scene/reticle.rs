use bevy::prelude::*;

/// Marker for the placement reticle. Scene-persistent: sessions show,
/// move, and hide it but never own it.
#[derive(Component)]
pub struct Reticle;

pub fn spawn_reticle(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    // Flat ring on the ground, hidden until a candidate pose exists.
    commands.spawn((
        Mesh3d(meshes.add(Torus::new(0.12, 0.15))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.0, 1.0, 0.53),
            unlit: true,
            ..default()
        })),
        Transform::IDENTITY,
        Visibility::Hidden,
        Reticle,
        Name::new("reticle"),
    ));
}

/// Apply a full pose matrix to the reticle transform.
pub fn apply_reticle_pose(transform: &mut Transform, pose: &Mat4) {
    *transform = Transform::from_matrix(*pose);
}
