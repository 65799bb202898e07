//! Non-XR AR path: orchestration of the XR-vs-fallback decision and the
//! 2D camera passthrough collaborator.

/// AR entry/exit decision flow and mode transitions.
pub mod orchestrator;

/// Rear-camera passthrough stream ownership and error surface.
pub mod passthrough;

use bevy::prelude::*;

use crate::engine::core::app_state::DisplayMode;

pub use orchestrator::{
    ArConfig, EnterArRequested, ExitArRequested, FallbackRequested, RelocateRequested,
};
pub use passthrough::PassthroughCamera;

pub struct FallbackPlugin;

impl Plugin for FallbackPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ArConfig>()
            .init_resource::<PassthroughCamera>()
            .add_event::<EnterArRequested>()
            .add_event::<ExitArRequested>()
            .add_event::<RelocateRequested>()
            .add_event::<FallbackRequested>()
            .add_systems(
                Update,
                (
                    orchestrator::handle_enter_ar,
                    orchestrator::handle_fallback_request,
                    orchestrator::handle_exit_ar,
                )
                    .chain(),
            )
            .add_systems(
                Update,
                orchestrator::poll_passthrough.run_if(in_state(DisplayMode::ArFallback)),
            )
            .add_systems(Update, release_camera_on_exit);
    }
}

/// The media stream must not outlive the app.
fn release_camera_on_exit(
    mut exit_events: EventReader<AppExit>,
    mut passthrough: ResMut<PassthroughCamera>,
) {
    if exit_events.read().next().is_some() {
        passthrough.destroy();
    }
}
