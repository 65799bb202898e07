use bevy::prelude::*;

/// Extract the translation column of a pose matrix.
pub fn matrix_position(m: &Mat4) -> Vec3 {
    m.w_axis.truncate()
}

/// Forward axis of a pose matrix (−Z of its rotation part), normalised.
pub fn matrix_forward(m: &Mat4) -> Vec3 {
    let fwd = m.transform_vector3(Vec3::NEG_Z);
    fwd.normalize_or_zero()
}

/// Translation-only pose `distance` metres ahead of the viewer along its
/// forward axis. Rotation is identity; the y component mirrors the viewer.
pub fn forward_fallback_pose(viewer: &Mat4, distance: f32) -> Mat4 {
    let pos = matrix_position(viewer) + matrix_forward(viewer) * distance;
    Mat4::from_translation(pos)
}

/// Compose a pose matrix with a yaw rotation applied in the pose's local
/// frame. Used for rotation-only edits on anchored objects.
pub fn with_yaw_offset(pose: &Mat4, yaw: f32) -> Mat4 {
    *pose * Mat4::from_rotation_y(yaw)
}
