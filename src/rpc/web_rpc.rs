//! JSON-RPC 2.0 bridge between the host page and the engine.
//!
//! The host drives AR entry/exit/relocate and reports its chat UI
//! visibility; the engine answers with status and placement-milestone
//! notifications. Transport is `postMessage` on WASM and a no-op
//! elsewhere.

use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::fallback::{EnterArRequested, ExitArRequested, RelocateRequested};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

#[cfg(target_arch = "wasm32")]
use web_sys::{window, MessageEvent};

/// JSON-RPC 2.0 request structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 notification structure for one-way communication.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

/// JSON-RPC error structure following specification.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn invalid_params(message: &str) -> Self {
        Self {
            code: -32602,
            message: message.to_string(),
            data: None,
        }
    }
}

/// Whether the host's chat/voice UI is currently visible. Status text is
/// only surfaced while it is; milestone events always go through.
#[derive(Resource, Default)]
pub struct ChatSurface {
    pub chat_visible: bool,
}

/// Resource managing outbound RPC traffic to the host page.
#[derive(Resource, Default)]
pub struct WebRpcInterface {
    outgoing_notifications: Vec<RpcNotification>,
    outgoing_responses: Vec<RpcResponse>,
}

impl WebRpcInterface {
    /// Send a notification to the host without expecting a response.
    pub fn send_notification(&mut self, method: &str, params: serde_json::Value) {
        self.outgoing_notifications.push(RpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        });
    }

    /// Transient status line, gated on the chat surface being visible.
    pub fn notify_status(&mut self, surface: &ChatSurface, message: &str) {
        if !surface.chat_visible {
            return;
        }
        self.send_notification("ar_status", serde_json::json!({ "message": message }));
    }

    /// Placement milestone (plane detected, anchored, ...).
    pub fn notify_ar_event(&mut self, kind: &str) {
        self.send_notification("ar_event", serde_json::json!({ "kind": kind }));
    }

    fn queue_response(&mut self, response: RpcResponse) {
        self.outgoing_responses.push(response);
    }

    #[cfg(test)]
    fn pending_notifications(&self) -> &[RpcNotification] {
        &self.outgoing_notifications
    }
}

/// Engine-side commands a host request maps onto.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    EnterAr,
    ExitAr,
    Relocate,
    SetChatVisibility(bool),
}

/// Handle one request: produce the commands to dispatch and the response
/// to queue (requests without an id are notifications and get none).
pub fn handle_rpc_request(
    request: &RpcRequest,
    fps: f32,
) -> (Vec<HostCommand>, Option<RpcResponse>) {
    let result: Result<(Vec<HostCommand>, serde_json::Value), RpcError> =
        match request.method.as_str() {
            "enter_ar" => Ok((vec![HostCommand::EnterAr], serde_json::json!({"success": true}))),
            "exit_ar" => Ok((vec![HostCommand::ExitAr], serde_json::json!({"success": true}))),
            "relocate" => Ok((
                vec![HostCommand::Relocate],
                serde_json::json!({"success": true}),
            )),
            "set_chat_visibility" => {
                #[derive(Deserialize)]
                struct VisibilityParams {
                    visible: bool,
                }
                serde_json::from_value::<VisibilityParams>(request.params.clone())
                    .map(|params| {
                        (
                            vec![HostCommand::SetChatVisibility(params.visible)],
                            serde_json::json!({"success": true}),
                        )
                    })
                    .map_err(|_| RpcError::invalid_params("Expected 'visible' parameter"))
            }
            "get_fps" => Ok((Vec::new(), serde_json::json!({ "fps": fps }))),
            _ => {
                warn!("Unknown RPC method: {}", request.method);
                Err(RpcError {
                    code: -32601,
                    message: "Method not found".to_string(),
                    data: Some(serde_json::json!({"method": request.method})),
                })
            }
        };

    let (commands, payload) = match result {
        Ok((commands, payload)) => (commands, Ok(payload)),
        Err(error) => (Vec::new(), Err(error)),
    };

    let response = request.id.clone().map(|id| match payload {
        Ok(value) => RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(value),
            error: None,
            id: Some(id),
        },
        Err(error) => RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id: Some(id),
        },
    });

    (commands, response)
}

/// Plugin establishing the RPC layer for iframe-based deployment.
pub struct WebRpcPlugin;

impl Plugin for WebRpcPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WebRpcInterface>()
            .init_resource::<ChatSurface>()
            .add_event::<IncomingRpcMessage>()
            .add_systems(
                Update,
                (
                    process_incoming_messages,
                    handle_rpc_messages,
                    send_outgoing_messages,
                )
                    .chain(),
            );

        #[cfg(target_arch = "wasm32")]
        app.add_systems(Startup, setup_message_listener);
    }
}

#[cfg(target_arch = "wasm32")]
fn setup_message_listener(mut commands: Commands) {
    use std::sync::Arc;
    use std::sync::Mutex;

    let message_queue: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let queue_clone = message_queue.clone();

    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        if let Ok(data) = event.data().dyn_into::<js_sys::JsString>() {
            let message_str: String = data.into();
            if message_str.contains("jsonrpc") {
                if let Ok(mut queue) = queue_clone.lock() {
                    queue.push(message_str);
                }
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>);

    if let Some(window) = window() {
        window
            .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
            .expect("Failed to register message listener");
    }

    closure.forget();
    commands.insert_resource(MessageQueue(message_queue));
}

/// Resource wrapping the thread-safe message queue for WASM event
/// handling.
#[derive(Resource)]
struct MessageQueue(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

/// Event representing an incoming RPC message from the host page.
#[derive(Event)]
struct IncomingRpcMessage {
    content: String,
}

fn process_incoming_messages(
    message_queue: Option<Res<MessageQueue>>,
    mut message_events: EventWriter<IncomingRpcMessage>,
) {
    let Some(queue_res) = message_queue else {
        return;
    };

    let messages = if let Ok(mut queue) = queue_res.0.lock() {
        std::mem::take(&mut *queue)
    } else {
        Vec::new()
    };

    for message_str in messages {
        message_events.write(IncomingRpcMessage {
            content: message_str,
        });
    }
}

fn handle_rpc_messages(
    mut events: EventReader<IncomingRpcMessage>,
    diagnostics: Res<DiagnosticsStore>,
    mut rpc_interface: ResMut<WebRpcInterface>,
    mut chat: ResMut<ChatSurface>,
    mut enter_events: EventWriter<EnterArRequested>,
    mut exit_events: EventWriter<ExitArRequested>,
    mut relocate_events: EventWriter<RelocateRequested>,
) {
    for event in events.read() {
        let request = match serde_json::from_str::<RpcRequest>(&event.content) {
            Ok(request) => request,
            Err(parse_error) => {
                warn!("RPC parse error: {parse_error}");
                continue;
            }
        };

        let fps = diagnostics
            .get(&FrameTimeDiagnosticsPlugin::FPS)
            .and_then(|diagnostic| diagnostic.smoothed())
            .unwrap_or(0.0) as f32;

        let (commands, response) = handle_rpc_request(&request, fps);
        for command in commands {
            match command {
                HostCommand::EnterAr => {
                    enter_events.write(EnterArRequested);
                }
                HostCommand::ExitAr => {
                    exit_events.write(ExitArRequested);
                }
                HostCommand::Relocate => {
                    relocate_events.write(RelocateRequested);
                }
                HostCommand::SetChatVisibility(visible) => {
                    chat.chat_visible = visible;
                }
            }
        }
        if let Some(response) = response {
            rpc_interface.queue_response(response);
        }
    }
}

/// Send queued notifications and responses to the host page.
fn send_outgoing_messages(mut rpc_interface: ResMut<WebRpcInterface>) {
    for notification in rpc_interface.outgoing_notifications.drain(..) {
        send_message_to_parent(&notification);
    }
    for response in rpc_interface.outgoing_responses.drain(..) {
        send_message_to_parent(&response);
    }
}

/// Send a serialized message to the parent window (host page).
fn send_message_to_parent<T: Serialize>(message: &T) {
    #[cfg(target_arch = "wasm32")]
    {
        match serde_json::to_string(message) {
            Ok(json) => {
                if let Some(window) = window() {
                    if let Some(parent) = window.parent().ok().flatten() {
                        if let Err(e) = parent.post_message(&JsValue::from_str(&json), "*") {
                            error!("Failed to send message to parent: {:?}", e);
                        }
                    }
                }
            }
            Err(e) => {
                error!("Failed to serialize message: {}", e);
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, params: serde_json::Value, id: Option<i64>) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: id.map(serde_json::Value::from),
        }
    }

    #[test]
    fn enter_ar_maps_to_command_and_success() {
        let (commands, response) =
            handle_rpc_request(&request("enter_ar", serde_json::Value::Null, Some(1)), 60.0);
        assert_eq!(commands, vec![HostCommand::EnterAr]);
        let response = response.unwrap();
        assert_eq!(response.result.unwrap()["success"], true);
        assert!(response.error.is_none());
    }

    #[test]
    fn notification_requests_get_no_response() {
        let (commands, response) =
            handle_rpc_request(&request("relocate", serde_json::Value::Null, None), 60.0);
        assert_eq!(commands, vec![HostCommand::Relocate]);
        assert!(response.is_none());
    }

    #[test]
    fn chat_visibility_parses_its_parameter() {
        let (commands, _) = handle_rpc_request(
            &request(
                "set_chat_visibility",
                serde_json::json!({"visible": true}),
                Some(2),
            ),
            60.0,
        );
        assert_eq!(commands, vec![HostCommand::SetChatVisibility(true)]);
    }

    #[test]
    fn bad_visibility_params_yield_invalid_params_error() {
        let (commands, response) = handle_rpc_request(
            &request("set_chat_visibility", serde_json::json!({}), Some(3)),
            60.0,
        );
        assert!(commands.is_empty());
        assert_eq!(response.unwrap().error.unwrap().code, -32602);
    }

    #[test]
    fn unknown_method_yields_method_not_found() {
        let (commands, response) =
            handle_rpc_request(&request("warp_drive", serde_json::Value::Null, Some(4)), 60.0);
        assert!(commands.is_empty());
        assert_eq!(response.unwrap().error.unwrap().code, -32601);
    }

    #[test]
    fn get_fps_reports_the_sampled_value() {
        let (_, response) =
            handle_rpc_request(&request("get_fps", serde_json::Value::Null, Some(5)), 42.5);
        let value = response.unwrap().result.unwrap();
        assert_eq!(value["fps"], 42.5);
    }

    #[test]
    fn status_notifications_respect_chat_visibility() {
        let mut rpc = WebRpcInterface::default();
        let hidden = ChatSurface {
            chat_visible: false,
        };
        rpc.notify_status(&hidden, "should not appear");
        assert!(rpc.pending_notifications().is_empty());

        let visible = ChatSurface { chat_visible: true };
        rpc.notify_status(&visible, "anchored");
        assert_eq!(rpc.pending_notifications().len(), 1);
        assert_eq!(rpc.pending_notifications()[0].method, "ar_status");
    }

    #[test]
    fn ar_events_always_notify() {
        let mut rpc = WebRpcInterface::default();
        rpc.notify_ar_event("plane_detected");
        assert_eq!(rpc.pending_notifications().len(), 1);
        assert_eq!(rpc.pending_notifications()[0].method, "ar_event");
    }
}
