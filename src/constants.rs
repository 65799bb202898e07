//! Product-tuning constants for AR placement, manipulation, and timeouts.

/// Distance in metres ahead of the viewer used for the reticle/placement
/// fallback when no surface hit is available.
pub const FORWARD_FALLBACK_DISTANCE: f32 = 1.5;

/// Seconds after session start with zero frames before the overlay
/// configuration is abandoned and the session retried without it.
pub const OVERLAY_WATCHDOG_SECS: f64 = 1.5;

/// Seconds of hit-less frames before the one-shot "no surface" notice.
pub const NO_HIT_NOTICE_SECS: f64 = 5.0;

/// Seconds the passthrough camera may spend initialising before it is
/// reported as timed out.
pub const PASSTHROUGH_INIT_TIMEOUT_SECS: f64 = 10.0;

// Free-mode manipulation.
pub const ROTATE_SPEED: f32 = 0.005;
pub const MOVE_STEP: f32 = 0.2;
pub const YAW_STEP: f32 = 0.1;

// Two-finger pan.
pub const PAN_SCALE: f32 = 0.01;
pub const PAN_DEAD_ZONE: f32 = 0.06;

// Tap recognition thresholds.
pub const TAP_MAX_MOVEMENT_PX: f32 = 12.0;
pub const TAP_MAX_DURATION_SECS: f64 = 0.5;

/// Transient-input hit-test profile requested for screen taps.
pub const TOUCHSCREEN_INPUT_PROFILE: &str = "generic-touchscreen";

/// Interval between FPS notifications to the host page.
pub const FPS_NOTIFY_INTERVAL_SECS: f32 = 0.5;

// Canonical preview pose for the avatar when leaving AR.
pub const PREVIEW_POSITION: [f32; 3] = [0.0, 1.0, 0.0];
pub const PREVIEW_SCALE: f32 = 1.0;
