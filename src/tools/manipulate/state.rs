use bevy::prelude::*;

use crate::constants::{MOVE_STEP, PAN_DEAD_ZONE, PAN_SCALE, ROTATE_SPEED, YAW_STEP};
use crate::engine::core::app_state::DisplayMode;

/// Tuning for manual transform edits.
#[derive(Resource)]
pub struct ManipulationSettings {
    pub rotate_speed: f32,
    pub move_step: f32,
    pub yaw_step: f32,
    pub pan_scale: f32,
    pub pan_dead_zone: f32,
}

impl Default for ManipulationSettings {
    fn default() -> Self {
        Self {
            rotate_speed: ROTATE_SPEED,
            move_step: MOVE_STEP,
            yaw_step: YAW_STEP,
            pan_scale: PAN_SCALE,
            pan_dead_zone: PAN_DEAD_ZONE,
        }
    }
}

/// Pointer-drag rotation bookkeeping.
#[derive(Resource, Default)]
pub struct DragState {
    pub dragging: bool,
}

/// Two-finger pan bookkeeping.
#[derive(Resource, Default)]
pub struct TouchPanState {
    pub last_center: Option<Vec2>,
}

/// Tap-to-place is exclusive to the camera fallback mode.
pub fn tap_place_enabled(mode: DisplayMode) -> bool {
    mode == DisplayMode::ArFallback
}

/// Keyboard/two-finger translation is suppressed once a placement is
/// committed (rotation-only from then on).
pub fn keyboard_translation_allowed(placement_locked: bool) -> bool {
    !placement_locked
}

/// Two-finger pan moves the object only in preview; in either AR mode the
/// gesture must not fight tap-to-place or a committed pose for the
/// position axes.
pub fn pan_translation_allowed(mode: DisplayMode, placement_locked: bool) -> bool {
    mode == DisplayMode::Preview && !placement_locked
}

/// Scale the two-finger midpoint delta and apply the jitter dead-zone.
pub fn pan_translation(center_delta: Vec2, scale: f32, dead_zone: f32) -> Option<Vec2> {
    let scaled = center_delta * scale;
    if scaled.x.abs() + scaled.y.abs() > dead_zone {
        Some(scaled)
    } else {
        None
    }
}
