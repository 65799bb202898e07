//! Device/browser capability inputs and the platform quirk table.
//!
//! The engine never branches on a raw user-agent string; it consumes a
//! structured `DeviceProfile` injected at startup plus a serde-loadable
//! `PlatformQuirks` table, so every policy decision is a pure function of
//! data that tests can construct directly.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::device::XrDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Chrome,
    Firefox,
    Brave,
    #[default]
    Other,
}

/// Read-only platform/browser hints consumed by the orchestrator and the
/// session controller's feature negotiation.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceProfile {
    pub platform: Platform,
    pub browser: Browser,
}

/// Result of one capability probe. Computed once per AR-entry attempt,
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrCapability {
    pub has_api: bool,
    pub session_supported: bool,
}

/// Probe the runtime. Never fails: any internal error on the support query
/// is reported as `session_supported = false`.
pub fn probe_capability(device: &mut dyn XrDevice) -> XrCapability {
    let has_api = device.api_available();
    let session_supported = has_api && device.session_supported();
    XrCapability {
        has_api,
        session_supported,
    }
}

/// Per-platform behavioral exceptions, kept as data rather than branch
/// logic so product can revisit them without touching the orchestrator.
/// Defaults mirror observed mobile-browser behavior; a deployment may
/// override them through the optional `ar_quirks.json` asset.
#[derive(Asset, TypePath, Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformQuirks {
    /// Use the camera fallback on Android even when the session starts.
    pub force_fallback_on_android: bool,
    /// Only Chrome on Android gets `light-estimation` + `anchors`.
    pub extended_features_need_chrome_on_android: bool,
    /// Browsers where dom-overlay is not requested.
    pub overlay_unsupported: Vec<Browser>,
    /// Browsers where transient-input hit-testing is skipped.
    pub transient_input_unsupported: Vec<Browser>,
    /// Browsers where the offset-ray hit source variant is skipped.
    pub offset_ray_unsupported: Vec<Browser>,
}

impl Default for PlatformQuirks {
    fn default() -> Self {
        Self {
            force_fallback_on_android: true,
            extended_features_need_chrome_on_android: true,
            overlay_unsupported: vec![Browser::Firefox, Browser::Brave],
            transient_input_unsupported: vec![Browser::Firefox, Browser::Brave],
            offset_ray_unsupported: vec![Browser::Firefox],
        }
    }
}

/// Derive a profile from a user-agent string. Used by the WASM startup
/// probe; the engine itself only ever sees the resulting tuple.
pub fn profile_from_user_agent(user_agent: &str, brave_hint: bool) -> DeviceProfile {
    let platform = if user_agent.contains("Android") {
        Platform::Android
    } else {
        Platform::Other
    };
    // Brave masquerades as Chrome in its UA string; the host-supplied hint
    // wins, then explicit tokens.
    let browser = if brave_hint || user_agent.contains("Brave") {
        Browser::Brave
    } else if user_agent.contains("Firefox") {
        Browser::Firefox
    } else if user_agent.contains("Chrome") {
        Browser::Chrome
    } else {
        Browser::Other
    };
    DeviceProfile { platform, browser }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::xr::device::{DeviceError, SessionInit, XrSessionBackend};
    use crate::engine::xr::simulated::SimulatedXrDevice;

    #[test]
    fn probe_reports_unsupported_without_api() {
        let mut device = SimulatedXrDevice::unsupported();
        let caps = probe_capability(&mut device);
        assert!(!caps.has_api);
        assert!(!caps.session_supported);
    }

    #[test]
    fn probe_succeeds_on_capable_device() {
        let mut device = SimulatedXrDevice::new(Default::default());
        let caps = probe_capability(&mut device);
        assert!(caps.has_api);
        assert!(caps.session_supported);
    }

    #[test]
    fn probe_with_failing_support_query_is_not_supported() {
        // A device whose support query errors internally must still answer.
        struct FlakyDevice;
        impl XrDevice for FlakyDevice {
            fn api_available(&self) -> bool {
                true
            }
            fn session_supported(&mut self) -> bool {
                false
            }
            fn request_session(
                &mut self,
                _init: &SessionInit,
            ) -> Result<Box<dyn XrSessionBackend>, DeviceError> {
                Err(DeviceError("unreachable".into()))
            }
        }
        let mut device = FlakyDevice;
        let caps = probe_capability(&mut device);
        assert!(caps.has_api);
        assert!(!caps.session_supported);
    }

    #[test]
    fn user_agent_mapping_covers_known_browsers() {
        let android_chrome = profile_from_user_agent(
            "Mozilla/5.0 (Linux; Android 14) Chrome/120.0 Mobile Safari/537.36",
            false,
        );
        assert_eq!(android_chrome.platform, Platform::Android);
        assert_eq!(android_chrome.browser, Browser::Chrome);

        let firefox = profile_from_user_agent("Mozilla/5.0 (X11; Linux) Firefox/121.0", false);
        assert_eq!(firefox.platform, Platform::Other);
        assert_eq!(firefox.browser, Browser::Firefox);

        // Brave reports a Chrome UA; the hint must win.
        let brave = profile_from_user_agent(
            "Mozilla/5.0 (Linux; Android 14) Chrome/120.0 Mobile",
            true,
        );
        assert_eq!(brave.browser, Browser::Brave);
    }

    #[test]
    fn quirks_round_trip_through_json() {
        let quirks = PlatformQuirks::default();
        let json = serde_json::to_string(&quirks).unwrap();
        let back: PlatformQuirks = serde_json::from_str(&json).unwrap();
        assert_eq!(back, quirks);
    }
}
