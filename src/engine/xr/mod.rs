//! XR path: runtime abstraction, session lifecycle, and placement.
//!
//! ## Architecture
//!
//! The session controller owns the runtime handle and its sub-resources
//! (reference spaces, hit-test sources); the placement tracker is a pure
//! state machine consuming per-frame snapshots and emitting effects. Both
//! are plain values driven by thin systems, so the whole path runs against
//! the simulated device in tests and native development builds.

/// Capability probe, device profile, and the platform quirk table.
pub mod capability;

/// Runtime-agnostic device and session traits plus frame data types.
pub mod device;

/// Placement state machine and its effect vocabulary.
pub mod placement;

/// Session lifecycle: feature negotiation, spaces, sources, watchdog.
pub mod session;

/// Scripted device for tests and native development.
pub mod simulated;

/// Bevy systems wiring the controller and tracker into the frame loop.
pub mod systems;

use bevy::prelude::*;
use bevy_common_assets::json::JsonAssetPlugin;

use crate::engine::core::app_state::DisplayMode;
use crate::engine::fallback::ArConfig;

use capability::{DeviceProfile, PlatformQuirks};
use device::{UnsupportedDevice, XrDevice};
use placement::PlacementTracker;
use session::XrSessionController;
use simulated::{dev_walkthrough_script, SimulatedXrDevice};

/// The injected XR runtime implementation.
#[derive(Resource)]
pub struct XrRuntimeDevice(pub Box<dyn XrDevice>);

/// Loads the optional quirk-table override asset: kick off the load at
/// startup, copy into the resource once the asset arrives.
#[derive(Resource, Default)]
struct QuirksLoader {
    handle: Option<Handle<PlatformQuirks>>,
    applied: bool,
}

pub struct XrPlugin;

impl Plugin for XrPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(JsonAssetPlugin::<PlatformQuirks>::new(&["json"]))
            .init_resource::<XrSessionController>()
            .init_resource::<PlacementTracker>()
            .init_resource::<QuirksLoader>()
            .init_resource::<DeviceProfile>()
            .insert_resource(PlatformQuirks::default())
            .add_systems(Startup, (select_runtime_device, start_quirks_load))
            .add_systems(Update, apply_quirks_when_loaded)
            .add_systems(
                Update,
                (
                    systems::xr_frame_system,
                    systems::handle_relocate,
                    systems::overlay_watchdog_system,
                )
                    .chain()
                    .run_if(in_state(DisplayMode::ArXr)),
            );

        #[cfg(not(target_arch = "wasm32"))]
        app.add_systems(Update, systems::ar_keyboard_shortcuts);

        #[cfg(target_arch = "wasm32")]
        app.add_systems(Startup, detect_device_profile);
    }
}

/// Pick the runtime implementation: the scripted simulator for native
/// development when configured, otherwise no runtime (the orchestrator
/// then routes to the camera fallback).
fn select_runtime_device(mut commands: Commands, config: Res<ArConfig>) {
    if config.simulate_xr {
        info!("using simulated XR runtime");
        commands.insert_resource(XrRuntimeDevice(Box::new(SimulatedXrDevice::new(
            dev_walkthrough_script(),
        ))));
    } else {
        commands.insert_resource(XrRuntimeDevice(Box::new(UnsupportedDevice)));
    }
}

fn start_quirks_load(mut loader: ResMut<QuirksLoader>, asset_server: Res<AssetServer>) {
    loader.handle = Some(asset_server.load("ar_quirks.json"));
}

fn apply_quirks_when_loaded(
    mut loader: ResMut<QuirksLoader>,
    assets: Res<Assets<PlatformQuirks>>,
    mut quirks: ResMut<PlatformQuirks>,
) {
    if loader.applied {
        return;
    }
    if let Some(loaded) = loader.handle.as_ref().and_then(|handle| assets.get(handle)) {
        *quirks = loaded.clone();
        loader.applied = true;
        info!("platform quirk table loaded");
    }
}

/// Read the user agent once at startup and inject the structured profile.
#[cfg(target_arch = "wasm32")]
fn detect_device_profile(mut commands: Commands) {
    let user_agent = web_sys::window()
        .map(|window| window.navigator())
        .and_then(|navigator| navigator.user_agent().ok())
        .unwrap_or_default();
    let brave_hint = web_sys::window()
        .map(|window| {
            js_sys::Reflect::has(window.as_ref(), &wasm_bindgen::JsValue::from_str("brave"))
                .unwrap_or(false)
        })
        .unwrap_or(false);
    let profile = capability::profile_from_user_agent(&user_agent, brave_hint);
    info!("device profile: {profile:?}");
    commands.insert_resource(profile);
}
