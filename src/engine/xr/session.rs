//! XR session lifecycle: feature negotiation, reference spaces, hit-test
//! source creation, overlay watchdog retry, and teardown.

use bevy::prelude::*;
use thiserror::Error;

use crate::constants::OVERLAY_WATCHDOG_SECS;

use super::capability::{Browser, DeviceProfile, Platform, PlatformQuirks};
use super::device::{
    AnchorOutcome, AnchorTicket, DeviceError, EnvironmentBlendMode, HitId, HitSourceKind,
    RefSpaceKind, SessionInit, XrDevice, XrFrame, XrSessionBackend,
};

#[derive(Debug, Error)]
pub enum XrStartError {
    #[error("XR runtime API not present")]
    NoApi,
    /// The session composites opaquely (no camera passthrough); retry-worthy
    /// on Android, fallback-worthy everywhere else.
    #[error("environment blend mode is opaque")]
    OpaqueBlendMode,
    #[error("session request failed: {0}")]
    RequestFailed(String),
}

/// Build the feature set for an immersive-ar request. Pure so the
/// per-browser branching is testable without a runtime.
pub fn negotiate_features(
    profile: DeviceProfile,
    quirks: &PlatformQuirks,
    use_overlay: bool,
) -> SessionInit {
    let mut optional = vec!["hit-test", "local-floor", "bounded-floor", "unbounded"];

    let extended_blocked = profile.platform == Platform::Android
        && quirks.extended_features_need_chrome_on_android
        && profile.browser != Browser::Chrome;
    if !extended_blocked {
        optional.push("light-estimation");
        optional.push("anchors");
    }

    let dom_overlay = use_overlay && !quirks.overlay_unsupported.contains(&profile.browser);
    if dom_overlay {
        optional.push("dom-overlay");
    }

    SessionInit {
        required_features: Vec::new(),
        optional_features: optional,
        dom_overlay,
    }
}

/// Everything owned for the lifetime of one session. Torn down as a unit;
/// a live handle always has an established reference space.
pub struct XrSessionHandle {
    session: Box<dyn XrSessionBackend>,
    pub ref_space: RefSpaceKind,
    pub stationary_source: Option<HitSourceKind>,
    pub has_transient_source: bool,
    pub started_with_overlay: bool,
    pub started_at: f64,
    pub frames_seen: u64,
}

/// What the overlay watchdog did this tick.
#[derive(Debug, PartialEq)]
pub enum WatchdogAction {
    None,
    /// Overlay configuration produced no frames; the session was stopped
    /// and restarted once without the overlay.
    Retried(Result<(), String>),
}

#[derive(Resource, Default)]
pub struct XrSessionController {
    handle: Option<XrSessionHandle>,
    overlay_retry_spent: bool,
}

impl XrSessionController {
    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&XrSessionHandle> {
        self.handle.as_ref()
    }

    /// Request and configure an immersive session. On any failure every
    /// partially acquired sub-resource is torn down before returning.
    pub fn start(
        &mut self,
        device: &mut dyn XrDevice,
        profile: DeviceProfile,
        quirks: &PlatformQuirks,
        use_overlay: bool,
        now: f64,
    ) -> Result<(), XrStartError> {
        if !device.api_available() {
            return Err(XrStartError::NoApi);
        }

        let init = negotiate_features(profile, quirks, use_overlay);
        info!("requesting immersive-ar session: {:?}", init.optional_features);
        let mut session = device
            .request_session(&init)
            .map_err(|DeviceError(message)| XrStartError::RequestFailed(message))?;

        // Opaque blend means no camera passthrough. Some Android devices
        // report opaque and still composite correctly, so only non-Android
        // treats it as a failed start.
        if session.blend_mode() == EnvironmentBlendMode::Opaque {
            if profile.platform == Platform::Android {
                info!("opaque blend mode on Android, continuing");
            } else {
                warn!("opaque blend mode, abandoning session");
                end_quietly(&mut session);
                return Err(XrStartError::OpaqueBlendMode);
            }
        }

        // Prefer local-floor, fall back to local.
        let ref_space = match session.request_reference_space(RefSpaceKind::LocalFloor) {
            Ok(()) => RefSpaceKind::LocalFloor,
            Err(_) => match session.request_reference_space(RefSpaceKind::Local) {
                Ok(()) => RefSpaceKind::Local,
                Err(DeviceError(message)) => {
                    end_quietly(&mut session);
                    return Err(XrStartError::RequestFailed(message));
                }
            },
        };
        if let Err(DeviceError(message)) = session.request_reference_space(RefSpaceKind::Viewer) {
            end_quietly(&mut session);
            return Err(XrStartError::RequestFailed(message));
        }

        // Stationary hit-test source ladder: offset-ray variant first
        // (where the browser supports it), plain viewer space second,
        // degraded-but-alive if both fail.
        let try_ray = !quirks.offset_ray_unsupported.contains(&profile.browser);
        let stationary_source = if try_ray
            && session.request_hit_test_source(HitSourceKind::ViewerRay).is_ok()
        {
            Some(HitSourceKind::ViewerRay)
        } else if session.request_hit_test_source(HitSourceKind::Viewer).is_ok() {
            Some(HitSourceKind::Viewer)
        } else {
            warn!("no stationary hit-test source; continuing without surface hits");
            None
        };

        let has_transient_source = if quirks
            .transient_input_unsupported
            .contains(&profile.browser)
        {
            false
        } else {
            match session.request_transient_hit_source(crate::constants::TOUCHSCREEN_INPUT_PROFILE)
            {
                Ok(()) => true,
                Err(DeviceError(message)) => {
                    warn!("transient-input hit-test unavailable: {message}");
                    false
                }
            }
        };

        self.handle = Some(XrSessionHandle {
            session,
            ref_space,
            stationary_source,
            has_transient_source,
            started_with_overlay: init.dom_overlay,
            started_at: now,
            frames_seen: 0,
        });
        Ok(())
    }

    /// End the session and drop everything it owned. Idempotent: calling
    /// with no live session is a no-op.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(mut handle) => {
                end_quietly(&mut handle.session);
                true
            }
            None => false,
        }
    }

    /// Pull the next compositor frame. Frame counting feeds the overlay
    /// watchdog.
    pub fn pump_frame(&mut self) -> Option<XrFrame> {
        let handle = self.handle.as_mut()?;
        let frame = handle.session.poll_frame()?;
        handle.frames_seen += 1;
        Some(frame)
    }

    pub fn create_anchor(&mut self, hit: HitId, ticket: AnchorTicket) {
        if let Some(handle) = self.handle.as_mut() {
            handle.session.create_anchor(hit, ticket);
        }
    }

    pub fn poll_anchor_results(&mut self) -> Vec<AnchorOutcome> {
        match self.handle.as_mut() {
            Some(handle) => handle.session.poll_anchor_results(),
            None => Vec::new(),
        }
    }

    /// If the session started with an overlay and produced no frames
    /// within the watchdog window, stop it and retry exactly once without
    /// the overlay.
    pub fn watchdog(
        &mut self,
        device: &mut dyn XrDevice,
        profile: DeviceProfile,
        quirks: &PlatformQuirks,
        now: f64,
    ) -> WatchdogAction {
        let stalled = match self.handle.as_ref() {
            Some(handle) => {
                handle.started_with_overlay
                    && handle.frames_seen == 0
                    && now - handle.started_at >= OVERLAY_WATCHDOG_SECS
            }
            None => false,
        };
        if !stalled || self.overlay_retry_spent {
            return WatchdogAction::None;
        }

        warn!("no XR frames with dom-overlay; retrying without overlay");
        self.overlay_retry_spent = true;
        self.stop();
        let outcome = self
            .start(device, profile, quirks, false, now)
            .map_err(|e| e.to_string());
        WatchdogAction::Retried(outcome)
    }

    /// Reset the one-shot retry budget; called when AR mode is entered
    /// fresh.
    pub fn arm_overlay_retry(&mut self) {
        self.overlay_retry_spent = false;
    }
}

fn end_quietly(session: &mut Box<dyn XrSessionBackend>) {
    if let Err(DeviceError(message)) = session.end() {
        warn!("session end reported: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::xr::simulated::{
        empty_frame, frame_with_hit, SessionScript, SimulatedXrDevice,
    };

    fn chrome_desktop() -> DeviceProfile {
        DeviceProfile {
            platform: Platform::Other,
            browser: Browser::Chrome,
        }
    }

    fn android(browser: Browser) -> DeviceProfile {
        DeviceProfile {
            platform: Platform::Android,
            browser,
        }
    }

    #[test]
    fn features_on_chrome_include_extended_and_overlay() {
        let init = negotiate_features(chrome_desktop(), &PlatformQuirks::default(), true);
        for feature in [
            "hit-test",
            "local-floor",
            "bounded-floor",
            "unbounded",
            "light-estimation",
            "anchors",
            "dom-overlay",
        ] {
            assert!(init.optional_features.contains(&feature), "missing {feature}");
        }
        assert!(init.required_features.is_empty());
        assert!(init.dom_overlay);
    }

    #[test]
    fn features_on_android_firefox_drop_extended_and_overlay() {
        let init = negotiate_features(android(Browser::Firefox), &PlatformQuirks::default(), true);
        assert!(!init.optional_features.contains(&"light-estimation"));
        assert!(!init.optional_features.contains(&"anchors"));
        assert!(!init.optional_features.contains(&"dom-overlay"));
        assert!(!init.dom_overlay);
    }

    #[test]
    fn overlay_not_requested_when_caller_declines() {
        let init = negotiate_features(chrome_desktop(), &PlatformQuirks::default(), false);
        assert!(!init.dom_overlay);
        assert!(!init.optional_features.contains(&"dom-overlay"));
    }

    #[test]
    fn start_establishes_local_floor_when_available() {
        let mut device = SimulatedXrDevice::new(SessionScript::default());
        let mut controller = XrSessionController::default();
        controller
            .start(&mut device, chrome_desktop(), &PlatformQuirks::default(), true, 0.0)
            .unwrap();
        assert_eq!(
            controller.handle().unwrap().ref_space,
            RefSpaceKind::LocalFloor
        );
    }

    #[test]
    fn start_falls_back_to_local_reference_space() {
        let mut device = SimulatedXrDevice::new(SessionScript {
            local_floor_available: false,
            ..Default::default()
        });
        let mut controller = XrSessionController::default();
        controller
            .start(&mut device, chrome_desktop(), &PlatformQuirks::default(), true, 0.0)
            .unwrap();
        assert_eq!(controller.handle().unwrap().ref_space, RefSpaceKind::Local);
    }

    #[test]
    fn opaque_blend_on_desktop_tears_down() {
        let mut device = SimulatedXrDevice::new(SessionScript {
            blend_mode: EnvironmentBlendMode::Opaque,
            ..Default::default()
        });
        let log = device.log();
        let mut controller = XrSessionController::default();
        let err = controller
            .start(&mut device, chrome_desktop(), &PlatformQuirks::default(), true, 0.0)
            .unwrap_err();
        assert!(matches!(err, XrStartError::OpaqueBlendMode));
        assert!(!controller.is_active());
        assert_eq!(log.lock().unwrap().sessions_ended, 1);
    }

    #[test]
    fn opaque_blend_on_android_proceeds() {
        let mut device = SimulatedXrDevice::new(SessionScript {
            blend_mode: EnvironmentBlendMode::Opaque,
            ..Default::default()
        });
        let mut controller = XrSessionController::default();
        controller
            .start(&mut device, android(Browser::Chrome), &PlatformQuirks::default(), true, 0.0)
            .unwrap();
        assert!(controller.is_active());
    }

    #[test]
    fn hit_source_ladder_falls_back_to_plain_viewer() {
        let mut device = SimulatedXrDevice::new(SessionScript {
            ray_source_ok: false,
            ..Default::default()
        });
        let mut controller = XrSessionController::default();
        controller
            .start(&mut device, chrome_desktop(), &PlatformQuirks::default(), true, 0.0)
            .unwrap();
        assert_eq!(
            controller.handle().unwrap().stationary_source,
            Some(HitSourceKind::Viewer)
        );
    }

    #[test]
    fn session_survives_without_any_hit_source() {
        let mut device = SimulatedXrDevice::new(SessionScript {
            ray_source_ok: false,
            plain_source_ok: false,
            transient_ok: false,
            ..Default::default()
        });
        let mut controller = XrSessionController::default();
        controller
            .start(&mut device, chrome_desktop(), &PlatformQuirks::default(), true, 0.0)
            .unwrap();
        let handle = controller.handle().unwrap();
        assert_eq!(handle.stationary_source, None);
        assert!(!handle.has_transient_source);
    }

    #[test]
    fn firefox_skips_offset_ray_variant() {
        let mut device = SimulatedXrDevice::new(SessionScript::default());
        let log = device.log();
        let mut controller = XrSessionController::default();
        controller
            .start(
                &mut device,
                DeviceProfile {
                    platform: Platform::Other,
                    browser: Browser::Firefox,
                },
                &PlatformQuirks::default(),
                true,
                0.0,
            )
            .unwrap();
        let requested = log.lock().unwrap().hit_sources_requested.clone();
        assert_eq!(requested, vec![HitSourceKind::Viewer]);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut device = SimulatedXrDevice::new(SessionScript::default());
        let log = device.log();
        let mut controller = XrSessionController::default();
        controller
            .start(&mut device, chrome_desktop(), &PlatformQuirks::default(), true, 0.0)
            .unwrap();

        assert!(controller.stop());
        assert!(!controller.stop());
        assert!(!controller.stop());
        assert!(controller.handle().is_none());
        assert_eq!(log.lock().unwrap().sessions_ended, 1);
    }

    #[test]
    fn stop_without_session_is_a_no_op() {
        let mut controller = XrSessionController::default();
        assert!(!controller.stop());
    }

    #[test]
    fn watchdog_retries_once_without_overlay() {
        // First session never produces a frame; the retry does.
        let mut device = SimulatedXrDevice::new(SessionScript {
            frames: [empty_frame()].into(),
            ..Default::default()
        });
        let log = device.log();
        let mut controller = XrSessionController::default();
        controller.arm_overlay_retry();
        controller
            .start(&mut device, chrome_desktop(), &PlatformQuirks::default(), true, 0.0)
            .unwrap();

        // Before the window elapses, nothing happens.
        assert_eq!(
            controller.watchdog(&mut device, chrome_desktop(), &PlatformQuirks::default(), 1.0),
            WatchdogAction::None
        );

        let action =
            controller.watchdog(&mut device, chrome_desktop(), &PlatformQuirks::default(), 1.6);
        assert_eq!(action, WatchdogAction::Retried(Ok(())));

        {
            let log = log.lock().unwrap();
            assert_eq!(log.sessions_ended, 1);
            assert_eq!(log.session_requests.len(), 2);
            assert!(log.session_requests[0].dom_overlay);
            assert!(!log.session_requests[1].dom_overlay);
        }

        // Still zero frames on the new session, but the retry budget is
        // spent: no further restarts.
        assert_eq!(
            controller.watchdog(&mut device, chrome_desktop(), &PlatformQuirks::default(), 4.0),
            WatchdogAction::None
        );
        assert_eq!(log.lock().unwrap().session_requests.len(), 2);
    }

    #[test]
    fn watchdog_idle_once_frames_arrive() {
        let pose = Mat4::from_translation(Vec3::new(0.0, 0.0, -1.0));
        let mut device = SimulatedXrDevice::new(SessionScript {
            frames: [frame_with_hit(pose, 1)].into(),
            ..Default::default()
        });
        let mut controller = XrSessionController::default();
        controller.arm_overlay_retry();
        controller
            .start(&mut device, chrome_desktop(), &PlatformQuirks::default(), true, 0.0)
            .unwrap();
        assert!(controller.pump_frame().is_some());
        assert_eq!(
            controller.watchdog(&mut device, chrome_desktop(), &PlatformQuirks::default(), 2.0),
            WatchdogAction::None
        );
    }
}
