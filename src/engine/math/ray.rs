use bevy::prelude::*;

/// Map a screen-space position to normalised device coordinates
/// (x right, y up, both in [−1, 1]).
pub fn screen_to_ndc(position: Vec2, viewport: Vec2) -> Vec2 {
    Vec2::new(
        (position.x / viewport.x) * 2.0 - 1.0,
        -((position.y / viewport.y) * 2.0 - 1.0),
    )
}

/// Intersect a ray with the ground plane (y = 0), returning the hit point.
/// Rays parallel to the plane or hitting behind the origin return `None`.
pub fn ray_ground_intersection(origin: Vec3, dir: Vec3) -> Option<Vec3> {
    if dir.y.abs() < 1e-4 {
        return None;
    }
    let t = -origin.y / dir.y;
    if t > 0.0 { Some(origin + dir * t) } else { None }
}
