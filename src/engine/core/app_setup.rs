use bevy::asset::AssetMetaCheck;
use bevy::diagnostic::FrameTimeDiagnosticsPlugin;
use bevy::prelude::*;

use crate::engine::core::app_state::DisplayMode;
use crate::engine::core::window_config::create_window_config;
use crate::engine::fallback::FallbackPlugin;
use crate::engine::scene::ScenePlugin;
use crate::engine::systems::fps_tracking::fps_notification_system;
use crate::engine::xr::XrPlugin;
use crate::rpc::web_rpc::WebRpcPlugin;
use crate::tools::manipulate::ManipulatePlugin;

pub fn create_app() -> App {
    let mut app = App::new();

    app.add_plugins(create_default_plugins())
        .init_state::<DisplayMode>()
        .add_plugins(FrameTimeDiagnosticsPlugin::default())
        .add_plugins(WebRpcPlugin)
        .add_plugins(FallbackPlugin)
        .add_plugins(XrPlugin)
        .add_plugins(ScenePlugin)
        .add_plugins(ManipulatePlugin)
        .add_systems(Update, fps_notification_system);

    app
}

fn create_default_plugins() -> impl PluginGroup {
    let window_config = WindowPlugin {
        primary_window: Some(create_window_config()),
        ..default()
    };

    let asset_config = AssetPlugin {
        meta_check: AssetMetaCheck::Never,
        ..default()
    };

    DefaultPlugins.set(window_config).set(asset_config)
}
