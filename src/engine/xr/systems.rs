//! Bevy systems driving the XR path: the per-frame pump, the overlay
//! watchdog, and relocate handling. Effects computed by the placement
//! tracker are applied to scene entities here.

use bevy::prelude::*;

use crate::engine::core::app_state::DisplayMode;
use crate::engine::fallback::orchestrator::{FallbackReason, RelocateRequested};
use crate::engine::fallback::FallbackRequested;
use crate::engine::scene::avatar::AvatarModel;
use crate::engine::scene::reticle::{apply_reticle_pose, Reticle};
use crate::engine::xr::capability::{DeviceProfile, PlatformQuirks};
use crate::rpc::web_rpc::{ChatSurface, WebRpcInterface};

use super::placement::{FrameEffect, PlacementTracker, SelectAction};
use super::session::{WatchdogAction, XrSessionController};
use super::XrRuntimeDevice;

type ReticleQuery<'w, 's> =
    Query<'w, 's, (&'static mut Transform, &'static mut Visibility), With<Reticle>>;
type AvatarQuery<'w, 's> =
    Query<'w, 's, &'static mut Transform, (With<AvatarModel>, Without<Reticle>)>;

/// Pump one compositor frame through the placement machine. Within the
/// frame: hit-test processing, select commits, anchor completions, then
/// diagnostics; rendering happens downstream of Update, so the drawn frame
/// always sees the freshest pose.
pub fn xr_frame_system(
    mut controller: ResMut<XrSessionController>,
    mut tracker: ResMut<PlacementTracker>,
    time: Res<Time>,
    mut reticle: ReticleQuery,
    mut avatar: AvatarQuery,
    mut rpc: ResMut<WebRpcInterface>,
    chat: Res<ChatSurface>,
) {
    let now = time.elapsed_secs_f64();
    let Some(frame) = controller.pump_frame() else {
        return;
    };

    let mut effects = tracker.on_frame(&frame, now);
    for _ in 0..frame.select_count {
        let (mut select_effects, action) = tracker.on_select();
        effects.append(&mut select_effects);
        if let SelectAction::RequestAnchor { hit, ticket } = action {
            controller.create_anchor(hit, ticket);
        }
    }
    for outcome in controller.poll_anchor_results() {
        effects.extend(tracker.on_anchor_result(&outcome));
    }

    apply_effects(&effects, &mut reticle, &mut avatar, rpc.as_mut(), &chat);
}

/// Restart once without the dom-overlay if it produced no frames; if even
/// the retry fails, give the attempt up and fall back.
pub fn overlay_watchdog_system(
    mut controller: ResMut<XrSessionController>,
    mut runtime: ResMut<XrRuntimeDevice>,
    mut tracker: ResMut<PlacementTracker>,
    profile: Res<DeviceProfile>,
    quirks: Res<PlatformQuirks>,
    time: Res<Time>,
    mut fallback_events: EventWriter<FallbackRequested>,
) {
    let now = time.elapsed_secs_f64();
    match controller.watchdog(runtime.0.as_mut(), *profile, &quirks, now) {
        WatchdogAction::None => {}
        WatchdogAction::Retried(Ok(())) => {
            tracker.begin_session(now);
        }
        WatchdogAction::Retried(Err(message)) => {
            warn!("overlay retry failed: {message}");
            tracker.reset();
            fallback_events.write(FallbackRequested {
                reason: FallbackReason::WatchdogExhausted,
            });
        }
    }
}

/// Relocate clears the active placement and shows the reticle again; the
/// session keeps running.
pub fn handle_relocate(
    mut events: EventReader<RelocateRequested>,
    mut tracker: ResMut<PlacementTracker>,
    mut reticle: ReticleQuery,
    mut avatar: AvatarQuery,
    mut rpc: ResMut<WebRpcInterface>,
    chat: Res<ChatSurface>,
) {
    for _ in events.read() {
        let effects = tracker.relocate();
        apply_effects(&effects, &mut reticle, &mut avatar, rpc.as_mut(), &chat);
    }
}

fn apply_effects(
    effects: &[FrameEffect],
    reticle: &mut ReticleQuery,
    avatar: &mut AvatarQuery,
    rpc: &mut WebRpcInterface,
    chat: &ChatSurface,
) {
    for effect in effects {
        match effect {
            FrameEffect::ShowReticle(pose) => {
                if let Ok((mut transform, mut visibility)) = reticle.single_mut() {
                    apply_reticle_pose(&mut transform, pose);
                    *visibility = Visibility::Visible;
                }
            }
            FrameEffect::HideReticle => {
                if let Ok((_, mut visibility)) = reticle.single_mut() {
                    *visibility = Visibility::Hidden;
                }
            }
            FrameEffect::SetModelMatrix(matrix) => {
                if let Ok(mut transform) = avatar.single_mut() {
                    *transform = Transform::from_matrix(*matrix);
                }
            }
            FrameEffect::Emit(kind) => {
                rpc.notify_ar_event(kind.as_str());
            }
            FrameEffect::Notice(text) => {
                rpc.notify_status(chat, text);
            }
        }
    }
}

/// Dev shortcut mirrored from the host page: X toggles AR entry/exit,
/// L relocates.
#[cfg(not(target_arch = "wasm32"))]
pub fn ar_keyboard_shortcuts(
    keyboard: Res<ButtonInput<KeyCode>>,
    state: Res<State<DisplayMode>>,
    mut enter_events: EventWriter<crate::engine::fallback::EnterArRequested>,
    mut exit_events: EventWriter<crate::engine::fallback::ExitArRequested>,
    mut relocate_events: EventWriter<RelocateRequested>,
) {
    if keyboard.just_pressed(KeyCode::KeyX) {
        if *state.get() == DisplayMode::Preview {
            enter_events.write(crate::engine::fallback::EnterArRequested);
        } else {
            exit_events.write(crate::engine::fallback::ExitArRequested);
        }
    }
    if keyboard.just_pressed(KeyCode::KeyL) && *state.get() == DisplayMode::ArXr {
        relocate_events.write(RelocateRequested);
    }
}
