//! AR entry/exit orchestration: pick the XR path or the camera fallback
//! path per capability probe and platform policy, and return to preview on
//! exit.

use bevy::prelude::*;

use crate::engine::core::app_state::DisplayMode;
use crate::engine::scene::avatar::{reset_preview_pose, AvatarModel};
use crate::engine::scene::reticle::Reticle;
use crate::engine::xr::capability::{
    probe_capability, Browser, DeviceProfile, Platform, PlatformQuirks,
};
use crate::engine::xr::device::XrDevice;
use crate::engine::xr::placement::PlacementTracker;
use crate::engine::xr::session::XrSessionController;
use crate::engine::xr::XrRuntimeDevice;
use crate::rpc::web_rpc::{ChatSurface, WebRpcInterface};

use super::passthrough::{set_feed_visible, PassthroughCamera};

/// Host-driven AR mode commands.
#[derive(Event)]
pub struct EnterArRequested;

#[derive(Event)]
pub struct ExitArRequested;

#[derive(Event)]
pub struct RelocateRequested;

/// Switch to the camera fallback path, however we got there.
#[derive(Event)]
pub struct FallbackRequested {
    pub reason: FallbackReason,
}

/// Static engine configuration for AR entry.
#[derive(Resource, Default)]
pub struct ArConfig {
    /// Skip XR entirely and go straight to the camera fallback.
    pub force_fallback: bool,
    /// Use the scripted simulated XR device (native development).
    pub simulate_xr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// `force_fallback` configuration flag.
    Configured,
    /// No XR API or no immersive-ar support.
    NoRuntime,
    /// The session started but platform policy prefers the fallback.
    AndroidPolicy,
    /// The session request or configuration failed.
    StartFailed,
    /// The overlay retry also produced no usable session.
    WatchdogExhausted,
}

/// Which path AR entry takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArPath {
    Xr,
    Fallback(FallbackReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArEntryDecision {
    pub path: ArPath,
    /// Android-specific hint for permission/security style failures.
    pub hint: Option<&'static str>,
}

/// Decide the AR path for one entry attempt. Pure apart from driving the
/// session controller, so the whole policy is testable against the
/// simulated device.
pub fn decide_ar_entry(
    controller: &mut XrSessionController,
    device: &mut dyn XrDevice,
    profile: DeviceProfile,
    quirks: &PlatformQuirks,
    force_fallback: bool,
    now: f64,
) -> ArEntryDecision {
    if force_fallback {
        return ArEntryDecision {
            path: ArPath::Fallback(FallbackReason::Configured),
            hint: None,
        };
    }

    let caps = probe_capability(device);
    if !caps.session_supported {
        info!("immersive-ar unsupported, using camera fallback");
        return ArEntryDecision {
            path: ArPath::Fallback(FallbackReason::NoRuntime),
            hint: None,
        };
    }

    controller.arm_overlay_retry();
    match controller.start(device, profile, quirks, true, now) {
        Ok(()) => {
            if profile.platform == Platform::Android && quirks.force_fallback_on_android {
                // The runtime reports success but tracking is unreliable
                // there; end the session and take the fallback path.
                info!("Android policy: releasing XR session in favor of fallback");
                controller.stop();
                ArEntryDecision {
                    path: ArPath::Fallback(FallbackReason::AndroidPolicy),
                    hint: None,
                }
            } else {
                ArEntryDecision {
                    path: ArPath::Xr,
                    hint: None,
                }
            }
        }
        Err(err) => {
            warn!("XR start failed: {err}");
            let hint = if profile.platform == Platform::Android {
                android_error_hint(&err.to_string())
            } else {
                None
            };
            ArEntryDecision {
                path: ArPath::Fallback(FallbackReason::StartFailed),
                hint,
            }
        }
    }
}

/// Map well-known session denial names onto short Android hints.
pub fn android_error_hint(message: &str) -> Option<&'static str> {
    if message.contains("NotAllowed") {
        Some("Permissions denied: allow camera and motion sensors.")
    } else if message.contains("Security") {
        Some("Security error: AR needs HTTPS and sensor permissions.")
    } else if message.contains("NotSupported") {
        Some("WebXR is not supported on this device.")
    } else {
        None
    }
}

/// Status line shown when the fallback path activates.
pub fn fallback_status(reason: FallbackReason, profile: DeviceProfile) -> &'static str {
    if reason == FallbackReason::Configured {
        return "Fallback AR (configured)";
    }
    match (profile.platform, profile.browser) {
        (Platform::Android, Browser::Chrome) => "AR tuned for Chrome on Android",
        (Platform::Android, Browser::Firefox) => "AR tuned for Firefox on Android",
        (Platform::Android, Browser::Brave) => "AR tuned for Brave on Android",
        (Platform::Android, Browser::Other) => "AR tuned for Android",
        _ => "Fallback AR",
    }
}

pub fn handle_enter_ar(
    mut events: EventReader<EnterArRequested>,
    mut controller: ResMut<XrSessionController>,
    mut runtime: ResMut<XrRuntimeDevice>,
    mut tracker: ResMut<PlacementTracker>,
    profile: Res<DeviceProfile>,
    quirks: Res<PlatformQuirks>,
    config: Res<ArConfig>,
    time: Res<Time>,
    mut next_state: ResMut<NextState<DisplayMode>>,
    mut fallback_events: EventWriter<FallbackRequested>,
    mut rpc: ResMut<WebRpcInterface>,
    chat: Res<ChatSurface>,
) {
    for _ in events.read() {
        let now = time.elapsed_secs_f64();
        let decision = decide_ar_entry(
            &mut controller,
            runtime.0.as_mut(),
            *profile,
            &quirks,
            config.force_fallback,
            now,
        );
        if let Some(hint) = decision.hint {
            rpc.notify_status(&chat, hint);
        }
        match decision.path {
            ArPath::Xr => {
                tracker.begin_session(now);
                set_feed_visible(false);
                next_state.set(DisplayMode::ArXr);
                rpc.notify_status(&chat, "WebXR AR active");
            }
            ArPath::Fallback(reason) => {
                fallback_events.write(FallbackRequested { reason });
            }
        }
    }
}

pub fn handle_fallback_request(
    mut events: EventReader<FallbackRequested>,
    mut passthrough: ResMut<PassthroughCamera>,
    profile: Res<DeviceProfile>,
    time: Res<Time>,
    mut next_state: ResMut<NextState<DisplayMode>>,
    mut rpc: ResMut<WebRpcInterface>,
    chat: Res<ChatSurface>,
) {
    for event in events.read() {
        passthrough.begin_init(time.elapsed_secs_f64());
        set_feed_visible(true);
        next_state.set(DisplayMode::ArFallback);
        rpc.notify_status(&chat, fallback_status(event.reason, *profile));
    }
}

/// Surface passthrough init results; a camera failure disables the feed
/// but leaves the rest of the fallback mode usable.
pub fn poll_passthrough(
    mut passthrough: ResMut<PassthroughCamera>,
    time: Res<Time>,
    mut rpc: ResMut<WebRpcInterface>,
    chat: Res<ChatSurface>,
) {
    match passthrough.poll(time.elapsed_secs_f64()) {
        Some(Ok(())) => info!("passthrough camera active"),
        Some(Err(error)) => {
            warn!("passthrough camera failed: {error}");
            rpc.notify_status(&chat, error.user_message());
        }
        None => {}
    }
}

/// Exit AR back to preview: stop whichever path was active, restore the
/// canonical preview pose, and hide AR-only surfaces.
pub fn handle_exit_ar(
    mut events: EventReader<ExitArRequested>,
    mut controller: ResMut<XrSessionController>,
    mut tracker: ResMut<PlacementTracker>,
    mut passthrough: ResMut<PassthroughCamera>,
    mut next_state: ResMut<NextState<DisplayMode>>,
    mut avatar: Query<&mut Transform, With<AvatarModel>>,
    mut reticle: Query<&mut Visibility, With<Reticle>>,
) {
    for _ in events.read() {
        controller.stop();
        tracker.reset();
        passthrough.stop();
        set_feed_visible(false);
        if let Ok(mut transform) = avatar.single_mut() {
            reset_preview_pose(&mut transform);
        }
        if let Ok(mut visibility) = reticle.single_mut() {
            *visibility = Visibility::Hidden;
        }
        next_state.set(DisplayMode::Preview);
    }
}
