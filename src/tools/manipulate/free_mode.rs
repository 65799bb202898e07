//! Free-mode manual manipulation: pointer-drag rotation, keyboard
//! translation, and touch gestures. Every position write is gated by the
//! placement lock so anchored or committed poses are never fought.

use bevy::input::mouse::MouseMotion;
use bevy::prelude::*;

use crate::engine::core::app_state::DisplayMode;
use crate::engine::scene::avatar::AvatarModel;
use crate::engine::xr::placement::PlacementTracker;

use super::state::{
    keyboard_translation_allowed, pan_translation, pan_translation_allowed, DragState,
    ManipulationSettings, TouchPanState,
};

/// Yaw/pitch from a pointer or one-finger drag delta.
pub fn drag_rotation(delta: Vec2, rotate_speed: f32) -> (f32, f32) {
    (delta.x * rotate_speed, delta.y * rotate_speed)
}

pub fn pointer_rotate(
    buttons: Res<ButtonInput<MouseButton>>,
    mut motion: EventReader<MouseMotion>,
    mut drag: ResMut<DragState>,
    settings: Res<ManipulationSettings>,
    mut tracker: ResMut<PlacementTracker>,
    mut avatar: Query<&mut Transform, With<AvatarModel>>,
) {
    if buttons.just_pressed(MouseButton::Left) {
        drag.dragging = true;
    }
    if buttons.just_released(MouseButton::Left) {
        drag.dragging = false;
    }

    let delta: Vec2 = motion.read().map(|event| event.delta).sum();
    if !drag.dragging || delta == Vec2::ZERO {
        return;
    }

    let (yaw, pitch) = drag_rotation(delta, settings.rotate_speed);
    apply_rotation(yaw, pitch, tracker.as_mut(), &mut avatar);
}

pub fn keyboard_transform(
    keyboard: Res<ButtonInput<KeyCode>>,
    settings: Res<ManipulationSettings>,
    mut tracker: ResMut<PlacementTracker>,
    mut avatar: Query<&mut Transform, With<AvatarModel>>,
) {
    let Ok(mut transform) = avatar.single_mut() else {
        return;
    };

    if keyboard_translation_allowed(tracker.placement_locked()) {
        let step = settings.move_step;
        let mut delta = Vec3::ZERO;
        if keyboard.any_just_pressed([KeyCode::ArrowLeft, KeyCode::KeyA]) {
            delta.x -= step;
        }
        if keyboard.any_just_pressed([KeyCode::ArrowRight, KeyCode::KeyD]) {
            delta.x += step;
        }
        if keyboard.any_just_pressed([KeyCode::ArrowUp, KeyCode::KeyW]) {
            delta.z -= step;
        }
        if keyboard.any_just_pressed([KeyCode::ArrowDown, KeyCode::KeyS]) {
            delta.z += step;
        }
        if keyboard.just_pressed(KeyCode::KeyR) {
            delta.y += step;
        }
        if keyboard.just_pressed(KeyCode::KeyF) {
            delta.y -= step;
        }
        transform.translation += delta;
    }

    // Rotation stays available in every mode.
    let mut yaw = 0.0;
    if keyboard.just_pressed(KeyCode::KeyQ) {
        yaw -= settings.yaw_step;
    }
    if keyboard.just_pressed(KeyCode::KeyE) {
        yaw += settings.yaw_step;
    }
    if yaw != 0.0 {
        if tracker.placement_locked() {
            tracker.add_manual_yaw(yaw);
        } else {
            transform.rotate_y(yaw);
        }
    }
}

pub fn touch_gestures(
    touches: Res<Touches>,
    state: Res<State<DisplayMode>>,
    settings: Res<ManipulationSettings>,
    mut pan: ResMut<TouchPanState>,
    mut tracker: ResMut<PlacementTracker>,
    mut avatar: Query<&mut Transform, With<AvatarModel>>,
) {
    let active: Vec<&bevy::input::touch::Touch> = touches.iter().collect();

    match active.len() {
        1 => {
            pan.last_center = None;
            let delta = active[0].delta();
            if delta != Vec2::ZERO {
                let (yaw, pitch) = drag_rotation(delta, settings.rotate_speed);
                apply_rotation(yaw, pitch, tracker.as_mut(), &mut avatar);
            }
        }
        count if count >= 2 => {
            // Pinch-to-scale is intentionally disabled; two fingers only
            // pan (preview) or keep the avatar grounded (AR).
            let center = (active[0].position() + active[1].position()) / 2.0;
            let last = pan.last_center.replace(center);
            let Some(last) = last else {
                return;
            };
            let mode = *state.get();
            if pan_translation_allowed(mode, tracker.placement_locked()) {
                if let Some(moved) =
                    pan_translation(center - last, settings.pan_scale, settings.pan_dead_zone)
                {
                    if let Ok(mut transform) = avatar.single_mut() {
                        transform.translation.x += moved.x;
                        transform.translation.y -= moved.y;
                    }
                }
            } else if mode != DisplayMode::Preview {
                // In AR the avatar stays pinned to the floor.
                if let Ok(mut transform) = avatar.single_mut() {
                    if !tracker.placement_locked() {
                        transform.translation.y = 0.0;
                    }
                }
            }
        }
        _ => {
            pan.last_center = None;
        }
    }
}

fn apply_rotation(
    yaw: f32,
    pitch: f32,
    tracker: &mut PlacementTracker,
    avatar: &mut Query<&mut Transform, With<AvatarModel>>,
) {
    if tracker.placement_locked() {
        // Rotation-only edits on a committed placement: yaw is composed
        // after the anchor pose by the frame system.
        tracker.add_manual_yaw(yaw);
        return;
    }
    if let Ok(mut transform) = avatar.single_mut() {
        transform.rotate_y(yaw);
        transform.rotate_local_x(pitch);
    }
}
