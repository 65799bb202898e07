//! Runtime-agnostic XR device boundary.
//!
//! The session controller and placement machine are written against these
//! traits so the control logic runs identically under a browser runtime,
//! the simulated device, or a test script. Asynchronous runtime operations
//! (anchor creation) are ticketed and completed through polling rather than
//! callbacks, so no state change ever happens outside a frame tick.

use bevy::prelude::*;
use thiserror::Error;

/// Reference-space conventions understood by the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSpaceKind {
    LocalFloor,
    Local,
    Viewer,
}

/// How the session composites virtual content with the real world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentBlendMode {
    Opaque,
    Additive,
    AlphaBlend,
}

/// Stationary hit-test source variants, tried in order of precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitSourceKind {
    /// Viewer space with an explicit forward offset ray.
    ViewerRay,
    /// Plain viewer-space source.
    Viewer,
}

/// Negotiated feature set for a session request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionInit {
    pub required_features: Vec<&'static str>,
    pub optional_features: Vec<&'static str>,
    pub dom_overlay: bool,
}

/// Identity of a hit-test result within the current session, used to
/// create anchors from a result cached across the select gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HitId(pub u64);

/// Identity of a live anchor within the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorId(pub u64);

/// Ticket correlating an asynchronous anchor request with its completion.
/// Tickets are generation-stamped; stale completions are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorTicket(pub u32);

/// One hit-test result resolved into the session reference space.
#[derive(Debug, Clone, Copy)]
pub struct HitSample {
    pub id: HitId,
    pub pose: Mat4,
    /// Whether the runtime can create an anchor from this result.
    pub anchorable: bool,
}

/// Per-frame snapshot handed to the placement machine. Ephemeral; nothing
/// in here outlives the frame except the cached most-recent hit.
#[derive(Debug, Clone, Default)]
pub struct XrFrame {
    pub viewer_pose: Option<Mat4>,
    pub stationary_hits: Vec<HitSample>,
    pub transient_hits: Vec<HitSample>,
    /// Poses of live anchors, resolved into the reference space.
    pub anchor_poses: Vec<(AnchorId, Mat4)>,
    /// Select (tap/trigger) events delivered with this frame.
    pub select_count: u32,
}

/// Completion of an asynchronous anchor request.
#[derive(Debug, Clone)]
pub enum AnchorOutcome {
    Created { ticket: AnchorTicket, anchor: AnchorId },
    Failed { ticket: AnchorTicket, reason: String },
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct DeviceError(pub String);

/// Entry point to an XR runtime.
pub trait XrDevice: Send + Sync + 'static {
    /// Whether the runtime API exists at all.
    fn api_available(&self) -> bool;

    /// Whether an immersive-ar session can be requested. Implementations
    /// must answer rather than fail; an internal error means `false`.
    fn session_supported(&mut self) -> bool;

    fn request_session(
        &mut self,
        init: &SessionInit,
    ) -> Result<Box<dyn XrSessionBackend>, DeviceError>;
}

/// A granted immersive session. Dropping the backend without `end` is
/// allowed but the controller always ends explicitly (best-effort).
pub trait XrSessionBackend: Send + Sync + 'static {
    fn blend_mode(&self) -> EnvironmentBlendMode;

    fn request_reference_space(&mut self, kind: RefSpaceKind) -> Result<(), DeviceError>;

    fn request_hit_test_source(&mut self, kind: HitSourceKind) -> Result<(), DeviceError>;

    fn request_transient_hit_source(&mut self, profile: &str) -> Result<(), DeviceError>;

    /// Begin asynchronous anchor creation from a cached hit result. The
    /// outcome arrives later through `poll_anchor_results`.
    fn create_anchor(&mut self, hit: HitId, ticket: AnchorTicket);

    /// Pull the next compositor frame, if one was produced since the last
    /// poll. Returns at most one frame per call.
    fn poll_frame(&mut self) -> Option<XrFrame>;

    fn poll_anchor_results(&mut self) -> Vec<AnchorOutcome>;

    fn end(&mut self) -> Result<(), DeviceError>;
}

/// Device used where no XR runtime is reachable (native builds, browsers
/// without WebXR). Every probe reports unsupported, which routes AR entry
/// to the camera fallback path.
pub struct UnsupportedDevice;

impl XrDevice for UnsupportedDevice {
    fn api_available(&self) -> bool {
        false
    }

    fn session_supported(&mut self) -> bool {
        false
    }

    fn request_session(
        &mut self,
        _init: &SessionInit,
    ) -> Result<Box<dyn XrSessionBackend>, DeviceError> {
        Err(DeviceError("no XR runtime available".into()))
    }
}
