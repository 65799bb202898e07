/// FPS reporting to the host page.
pub mod fps_tracking;
