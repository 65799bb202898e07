//! Manual manipulation of the avatar.
//!
//! Two mutually exclusive modes:
//!
//! ### Free mode (preview / un-anchored placement)
//! - Pointer or one-finger drag rotates (yaw from horizontal, pitch from
//!   vertical delta)
//! - Arrow keys / WASD translate on the ground plane, R/F on Y, Q/E yaw
//! - Two-finger drag pans on X/Y from the midpoint delta, with a small
//!   dead-zone against jitter; pinch-to-scale is disabled
//!
//! ### Tap-to-place mode (camera fallback)
//! - A tap or click raycasts through the screen point onto the ground
//!   plane and moves the avatar there, Y pinned to the floor
//! - Two-finger pan is suppressed so taps and pans never fight over the
//!   position axes
//!
//! Once a placement is committed, position and scale writes are locked
//! out everywhere; rotation stays available (composed after the anchor
//! pose when anchored).

/// Pointer, keyboard, and touch systems for free-mode edits.
pub mod free_mode;

/// Settings, gesture bookkeeping, and the write-arbitration gates.
pub mod state;

/// Tap recognition and ground-plane placement.
pub mod tap_place;

use bevy::prelude::*;

use crate::engine::core::app_state::DisplayMode;

pub use state::{DragState, ManipulationSettings, TouchPanState};
pub use tap_place::TapTracker;

pub struct ManipulatePlugin;

impl Plugin for ManipulatePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ManipulationSettings>()
            .init_resource::<DragState>()
            .init_resource::<TouchPanState>()
            .init_resource::<TapTracker>()
            .add_systems(
                Update,
                (
                    free_mode::pointer_rotate,
                    free_mode::keyboard_transform,
                    free_mode::touch_gestures,
                ),
            )
            .add_systems(
                Update,
                tap_place::tap_place_system.run_if(in_state(DisplayMode::ArFallback)),
            );
    }
}
