use bevy::prelude::*;

/// Top-level display modes. AR runs either on the XR session path or the
/// camera fallback path; the two are mutually exclusive, and exiting AR
/// always lands back in preview.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, States)]
pub enum DisplayMode {
    #[default]
    Preview,
    ArXr,
    ArFallback,
}
