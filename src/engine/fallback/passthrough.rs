//! Passthrough camera collaborator for the non-XR fallback path.
//!
//! Owns the rear-facing media stream exclusively: every track is stopped
//! before any re-acquisition so mobile browsers never see the device busy.
//! Acquisition is asynchronous; completions land in a shared queue drained
//! by `poll`, with a cooperative timeout watchdog on top.

use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use thiserror::Error;

use crate::constants::PASSTHROUGH_INIT_TIMEOUT_SECS;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PassthroughError {
    #[error("camera access denied")]
    NotAllowed,
    #[error("no camera found")]
    NotFound,
    #[error("camera in use by another application")]
    NotReadable,
    #[error("camera configuration not supported")]
    Overconstrained,
    #[error("camera start timed out")]
    Timeout,
    #[error("no camera available on this platform")]
    Unavailable,
    #[error("camera error: {0}")]
    Other(String),
}

impl PassthroughError {
    /// Map a DOMException name from getUserMedia onto the taxonomy.
    pub fn from_dom_name(name: &str) -> Self {
        match name {
            "NotAllowedError" => Self::NotAllowed,
            "NotFoundError" => Self::NotFound,
            "NotReadableError" => Self::NotReadable,
            "OverconstrainedError" => Self::Overconstrained,
            other => Self::Other(other.to_string()),
        }
    }

    /// Short, actionable status line; never a raw platform error blob.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotAllowed => "Camera access denied. Allow camera access and try again.",
            Self::NotFound => "No camera was found on this device.",
            Self::NotReadable => "The camera is in use by another application.",
            Self::Overconstrained => "The requested camera configuration is not supported.",
            Self::Timeout => "Camera took too long to start.",
            Self::Unavailable => "Camera preview is not available here.",
            Self::Other(_) => "Camera could not be started.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassthroughStatus {
    #[default]
    Idle,
    Starting,
    Active,
    Failed,
}

type CompletionQueue = Arc<Mutex<Vec<Result<(), PassthroughError>>>>;

#[derive(Resource, Default)]
pub struct PassthroughCamera {
    status: PassthroughStatus,
    started_at: f64,
    completions: CompletionQueue,
}

impl PassthroughCamera {
    pub fn status(&self) -> PassthroughStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == PassthroughStatus::Active
    }

    /// Begin acquiring the rear camera. Any previous stream is released
    /// first; a second call while already starting is ignored.
    pub fn begin_init(&mut self, now: f64) {
        if self.status == PassthroughStatus::Starting {
            return;
        }
        self.release_stream();
        self.status = PassthroughStatus::Starting;
        self.started_at = now;
        platform::start(Arc::clone(&self.completions));
    }

    /// Drain completions and run the timeout watchdog. Returns the
    /// init outcome exactly once per attempt.
    pub fn poll(&mut self, now: f64) -> Option<Result<(), PassthroughError>> {
        if self.status != PassthroughStatus::Starting {
            return None;
        }
        let completed = self
            .completions
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop());
        if let Some(result) = completed {
            self.status = match result {
                Ok(()) => PassthroughStatus::Active,
                Err(_) => PassthroughStatus::Failed,
            };
            return Some(result);
        }
        if now - self.started_at > PASSTHROUGH_INIT_TIMEOUT_SECS {
            self.status = PassthroughStatus::Failed;
            self.release_stream();
            return Some(Err(PassthroughError::Timeout));
        }
        None
    }

    /// Release the stream and hide the feed. Idempotent.
    pub fn stop(&mut self) {
        self.release_stream();
        self.status = PassthroughStatus::Idle;
        if let Ok(mut queue) = self.completions.lock() {
            queue.clear();
        }
    }

    pub fn destroy(&mut self) {
        self.stop();
    }

    fn release_stream(&mut self) {
        platform::stop();
        platform::set_feed_visible(false);
    }

    #[cfg(test)]
    fn force_starting(&mut self, now: f64) {
        self.status = PassthroughStatus::Starting;
        self.started_at = now;
    }

    #[cfg(test)]
    fn push_completion(&self, result: Result<(), PassthroughError>) {
        self.completions.lock().unwrap().push(result);
    }
}

/// Show or hide the host camera feed behind the transparent canvas.
pub fn set_feed_visible(visible: bool) {
    platform::set_feed_visible(visible);
}

#[cfg(target_arch = "wasm32")]
mod platform {
    use super::{CompletionQueue, PassthroughError};
    use wasm_bindgen::{JsCast, JsValue};
    use wasm_bindgen_futures::JsFuture;

    const VIDEO_ELEMENT_ID: &str = "camera";

    fn video_element() -> Option<web_sys::HtmlVideoElement> {
        web_sys::window()?
            .document()?
            .get_element_by_id(VIDEO_ELEMENT_ID)?
            .dyn_into::<web_sys::HtmlVideoElement>()
            .ok()
    }

    fn error_from_js(value: &JsValue) -> PassthroughError {
        let name = js_sys::Reflect::get(value, &JsValue::from_str("name"))
            .ok()
            .and_then(|name| name.as_string());
        match name {
            Some(name) => PassthroughError::from_dom_name(&name),
            None => PassthroughError::Other("unknown".into()),
        }
    }

    pub fn start(completions: CompletionQueue) {
        wasm_bindgen_futures::spawn_local(async move {
            let result = acquire().await;
            if let Ok(mut queue) = completions.lock() {
                queue.push(result);
            }
        });
    }

    async fn acquire() -> Result<(), PassthroughError> {
        let window = web_sys::window()
            .ok_or_else(|| PassthroughError::Other("no window".into()))?;
        let devices = window
            .navigator()
            .media_devices()
            .map_err(|e| error_from_js(&e))?;

        // Rear camera, jitter-free: pin facingMode and disable auto zoom.
        let video = js_sys::Object::new();
        let facing = js_sys::Object::new();
        js_sys::Reflect::set(
            &facing,
            &JsValue::from_str("ideal"),
            &JsValue::from_str("environment"),
        )
        .ok();
        js_sys::Reflect::set(&video, &JsValue::from_str("facingMode"), &facing).ok();

        let constraints = js_sys::Object::new();
        js_sys::Reflect::set(&constraints, &JsValue::from_str("video"), &video).ok();
        js_sys::Reflect::set(&constraints, &JsValue::from_str("audio"), &JsValue::FALSE).ok();

        let promise = devices
            .get_user_media_with_constraints(
                constraints.unchecked_ref::<web_sys::MediaStreamConstraints>(),
            )
            .map_err(|e| error_from_js(&e))?;
        let stream = JsFuture::from(promise)
            .await
            .map_err(|e| error_from_js(&e))?;
        let stream: web_sys::MediaStream = stream.unchecked_into();

        let video_el = video_element()
            .ok_or_else(|| PassthroughError::Other("video element missing".into()))?;
        video_el.set_src_object(Some(&stream));
        let play = video_el
            .play()
            .map_err(|e| error_from_js(&e))?;
        JsFuture::from(play).await.map_err(|e| error_from_js(&e))?;
        set_feed_visible(true);
        Ok(())
    }

    pub fn stop() {
        let Some(video_el) = video_element() else {
            return;
        };
        if let Some(src) = video_el.src_object() {
            let tracks = src.get_tracks();
            for i in 0..tracks.length() {
                let track: web_sys::MediaStreamTrack = tracks.get(i).unchecked_into();
                track.stop();
            }
        }
        video_el.set_src_object(None);
    }

    pub fn set_feed_visible(visible: bool) {
        if let Some(video_el) = video_element() {
            let display = if visible { "block" } else { "none" };
            let _ = video_el
                .style()
                .set_property("display", display);
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod platform {
    use super::{CompletionQueue, PassthroughError};

    pub fn start(completions: CompletionQueue) {
        if let Ok(mut queue) = completions.lock() {
            queue.push(Err(PassthroughError::Unavailable));
        }
    }

    pub fn stop() {}

    pub fn set_feed_visible(_visible: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_reports_success_once() {
        let mut camera = PassthroughCamera::default();
        camera.force_starting(0.0);
        camera.push_completion(Ok(()));

        assert_eq!(camera.poll(0.5), Some(Ok(())));
        assert!(camera.is_active());
        assert_eq!(camera.poll(0.6), None);
    }

    #[test]
    fn poll_times_out_after_ten_seconds() {
        let mut camera = PassthroughCamera::default();
        camera.force_starting(0.0);

        assert_eq!(camera.poll(9.9), None);
        assert_eq!(camera.poll(10.1), Some(Err(PassthroughError::Timeout)));
        assert_eq!(camera.status(), PassthroughStatus::Failed);
        assert_eq!(camera.poll(11.0), None);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut camera = PassthroughCamera::default();
        camera.force_starting(0.0);
        camera.stop();
        camera.stop();
        assert_eq!(camera.status(), PassthroughStatus::Idle);
    }

    #[test]
    fn dom_error_names_map_to_taxonomy() {
        assert_eq!(
            PassthroughError::from_dom_name("NotAllowedError"),
            PassthroughError::NotAllowed
        );
        assert_eq!(
            PassthroughError::from_dom_name("NotFoundError"),
            PassthroughError::NotFound
        );
        assert_eq!(
            PassthroughError::from_dom_name("NotReadableError"),
            PassthroughError::NotReadable
        );
        assert_eq!(
            PassthroughError::from_dom_name("OverconstrainedError"),
            PassthroughError::Overconstrained
        );
        assert!(matches!(
            PassthroughError::from_dom_name("SomethingElse"),
            PassthroughError::Other(_)
        ));
    }

    #[test]
    fn every_error_has_a_short_user_message() {
        for error in [
            PassthroughError::NotAllowed,
            PassthroughError::NotFound,
            PassthroughError::NotReadable,
            PassthroughError::Overconstrained,
            PassthroughError::Timeout,
            PassthroughError::Unavailable,
        ] {
            let message = error.user_message();
            assert!(!message.is_empty());
            assert!(message.len() < 80);
        }
    }
}
