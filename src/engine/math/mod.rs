/// Pose matrix helpers shared by the placement machine and the reticle.
pub mod pose;

/// Ray utilities for tap-to-place ground intersection.
pub mod ray;
