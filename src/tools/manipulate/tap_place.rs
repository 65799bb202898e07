//! Tap-to-place for the camera fallback path.
//!
//! A tap is resolved to a camera ray through the tapped point and
//! intersected with the ground plane; the avatar's X/Z move to the hit and
//! Y pins to the floor. Touch taps must be told apart from the tail end of
//! a two-finger gesture: a sequence only counts as a tap if it never had
//! more than one simultaneous contact, moved at most 12 px, and lasted at
//! most 500 ms.

use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::constants::{TAP_MAX_DURATION_SECS, TAP_MAX_MOVEMENT_PX};
use crate::engine::math::ray::ray_ground_intersection;
use crate::engine::scene::avatar::AvatarModel;

/// Tap recognition over a touch sequence.
#[derive(Resource, Default)]
pub struct TapTracker {
    start: Option<TapStart>,
    had_multi_touch: bool,
}

struct TapStart {
    position: Vec2,
    time: f64,
}

impl TapTracker {
    pub fn on_touch_start(&mut self, position: Vec2, active_contacts: usize, now: f64) {
        if self.start.is_none() {
            self.start = Some(TapStart {
                position,
                time: now,
            });
        }
        if active_contacts > 1 {
            self.had_multi_touch = true;
        }
    }

    pub fn on_touch_move(&mut self, active_contacts: usize) {
        if active_contacts > 1 {
            self.had_multi_touch = true;
        }
    }

    /// Returns the tap position when the sequence qualifies. Contacts
    /// still on the screen keep the sequence open.
    pub fn on_touch_end(
        &mut self,
        position: Vec2,
        remaining_contacts: usize,
        now: f64,
    ) -> Option<Vec2> {
        if remaining_contacts > 0 {
            return None;
        }
        let start = self.start.take()?;
        let had_multi = std::mem::replace(&mut self.had_multi_touch, false);

        let quick = now - start.time <= TAP_MAX_DURATION_SECS;
        let stationary = position.distance(start.position) <= TAP_MAX_MOVEMENT_PX;
        (!had_multi && quick && stationary).then_some(position)
    }
}

/// Ground placement from a tap: X/Z from the ray hit, Y pinned to 0.
pub fn ground_placement(hit: Vec3) -> Vec3 {
    Vec3::new(hit.x, 0.0, hit.z)
}

pub fn tap_place_system(
    touches: Res<Touches>,
    buttons: Res<ButtonInput<MouseButton>>,
    time: Res<Time>,
    mut tap: ResMut<TapTracker>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform), With<Camera3d>>,
    mut avatar: Query<&mut Transform, With<AvatarModel>>,
) {
    let now = time.elapsed_secs_f64();
    let active_contacts = touches.iter().count();

    for touch in touches.iter_just_pressed() {
        tap.on_touch_start(touch.position(), active_contacts, now);
    }
    if touches.iter().any(|touch| touch.delta() != Vec2::ZERO) {
        tap.on_touch_move(active_contacts);
    }

    let mut tapped: Option<Vec2> = None;
    for touch in touches.iter_just_released() {
        tapped = tapped.or(tap.on_touch_end(touch.position(), active_contacts, now));
    }
    for _ in touches.iter_just_canceled() {
        let _ = tap.on_touch_end(Vec2::ZERO, active_contacts, f64::MAX);
    }

    // Desktop click counts as a tap directly.
    if tapped.is_none() && buttons.just_pressed(MouseButton::Left) {
        if let Ok(window) = windows.single() {
            tapped = window.cursor_position();
        }
    }

    let Some(position) = tapped else {
        return;
    };
    let Ok((camera, camera_transform)) = cameras.single() else {
        return;
    };
    let Ok(ray) = camera.viewport_to_world(camera_transform, position) else {
        return;
    };
    let Some(hit) = ray_ground_intersection(ray.origin, ray.direction.as_vec3()) else {
        return;
    };
    if let Ok(mut transform) = avatar.single_mut() {
        let placed = ground_placement(hit);
        transform.translation.x = placed.x;
        transform.translation.y = placed.y;
        transform.translation.z = placed.z;
        info!("placed at ({:.2}, {:.2})", placed.x, placed.z);
    }
}
