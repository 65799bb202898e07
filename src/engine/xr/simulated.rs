//! Scriptable XR device for native development runs and tests.
//!
//! The script describes how the pretend runtime answers each lifecycle
//! call and which frames it produces; a shared log records every call so
//! tests can assert on session lifecycles without a real runtime.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bevy::prelude::*;

use super::device::{
    AnchorId, AnchorOutcome, AnchorTicket, DeviceError, EnvironmentBlendMode, HitId,
    HitSample, HitSourceKind, RefSpaceKind, SessionInit, XrDevice, XrFrame, XrSessionBackend,
};

/// How the simulated runtime answers anchor creation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorBehavior {
    #[default]
    Succeed,
    Fail,
    /// The request never settles; models the accepted "stuck pending" case.
    NeverSettle,
}

/// Scripted behavior for one granted session.
#[derive(Debug, Clone)]
pub struct SessionScript {
    pub blend_mode: EnvironmentBlendMode,
    pub local_floor_available: bool,
    pub ray_source_ok: bool,
    pub plain_source_ok: bool,
    pub transient_ok: bool,
    pub anchor_behavior: AnchorBehavior,
    pub frames: VecDeque<XrFrame>,
}

impl Default for SessionScript {
    fn default() -> Self {
        Self {
            blend_mode: EnvironmentBlendMode::AlphaBlend,
            local_floor_available: true,
            ray_source_ok: true,
            plain_source_ok: true,
            transient_ok: true,
            anchor_behavior: AnchorBehavior::Succeed,
            frames: VecDeque::new(),
        }
    }
}

/// Call record shared between the device, its sessions, and the test.
#[derive(Debug, Default)]
pub struct SimLog {
    pub session_requests: Vec<SessionInit>,
    pub sessions_ended: usize,
    pub spaces_requested: Vec<RefSpaceKind>,
    pub hit_sources_requested: Vec<HitSourceKind>,
    pub transient_sources_requested: usize,
    pub anchors_requested: Vec<(HitId, AnchorTicket)>,
}

pub type SharedSimLog = Arc<Mutex<SimLog>>;

pub struct SimulatedXrDevice {
    pub api_available: bool,
    pub session_supported: bool,
    /// `Some(reason)` denies every session request.
    pub deny_session: Option<String>,
    pub script: SessionScript,
    log: SharedSimLog,
    next_anchor_id: Arc<Mutex<u64>>,
}

impl SimulatedXrDevice {
    pub fn new(script: SessionScript) -> Self {
        Self {
            api_available: true,
            session_supported: true,
            deny_session: None,
            script,
            log: Arc::default(),
            next_anchor_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Device answering every probe with "unsupported".
    pub fn unsupported() -> Self {
        let mut device = Self::new(SessionScript::default());
        device.api_available = false;
        device.session_supported = false;
        device
    }

    pub fn log(&self) -> SharedSimLog {
        Arc::clone(&self.log)
    }
}

impl XrDevice for SimulatedXrDevice {
    fn api_available(&self) -> bool {
        self.api_available
    }

    fn session_supported(&mut self) -> bool {
        self.session_supported
    }

    fn request_session(
        &mut self,
        init: &SessionInit,
    ) -> Result<Box<dyn XrSessionBackend>, DeviceError> {
        self.log
            .lock()
            .expect("sim log poisoned")
            .session_requests
            .push(init.clone());
        if let Some(reason) = &self.deny_session {
            return Err(DeviceError(reason.clone()));
        }
        Ok(Box::new(SimulatedSession {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            next_anchor_id: Arc::clone(&self.next_anchor_id),
            pending_results: Vec::new(),
            ended: false,
        }))
    }
}

pub struct SimulatedSession {
    script: SessionScript,
    log: SharedSimLog,
    next_anchor_id: Arc<Mutex<u64>>,
    pending_results: Vec<AnchorOutcome>,
    ended: bool,
}

impl XrSessionBackend for SimulatedSession {
    fn blend_mode(&self) -> EnvironmentBlendMode {
        self.script.blend_mode
    }

    fn request_reference_space(&mut self, kind: RefSpaceKind) -> Result<(), DeviceError> {
        self.log
            .lock()
            .expect("sim log poisoned")
            .spaces_requested
            .push(kind);
        match kind {
            RefSpaceKind::LocalFloor if !self.script.local_floor_available => {
                Err(DeviceError("local-floor unavailable".into()))
            }
            _ => Ok(()),
        }
    }

    fn request_hit_test_source(&mut self, kind: HitSourceKind) -> Result<(), DeviceError> {
        self.log
            .lock()
            .expect("sim log poisoned")
            .hit_sources_requested
            .push(kind);
        let ok = match kind {
            HitSourceKind::ViewerRay => self.script.ray_source_ok,
            HitSourceKind::Viewer => self.script.plain_source_ok,
        };
        if ok {
            Ok(())
        } else {
            Err(DeviceError("hit-test source unavailable".into()))
        }
    }

    fn request_transient_hit_source(&mut self, _profile: &str) -> Result<(), DeviceError> {
        let mut log = self.log.lock().expect("sim log poisoned");
        log.transient_sources_requested += 1;
        if self.script.transient_ok {
            Ok(())
        } else {
            Err(DeviceError("transient hit-test unavailable".into()))
        }
    }

    fn create_anchor(&mut self, hit: HitId, ticket: AnchorTicket) {
        self.log
            .lock()
            .expect("sim log poisoned")
            .anchors_requested
            .push((hit, ticket));
        match self.script.anchor_behavior {
            AnchorBehavior::Succeed => {
                let mut next = self.next_anchor_id.lock().expect("sim id poisoned");
                let anchor = AnchorId(*next);
                *next += 1;
                self.pending_results.push(AnchorOutcome::Created { ticket, anchor });
            }
            AnchorBehavior::Fail => {
                self.pending_results.push(AnchorOutcome::Failed {
                    ticket,
                    reason: "anchor creation rejected".into(),
                });
            }
            AnchorBehavior::NeverSettle => {}
        }
    }

    fn poll_frame(&mut self) -> Option<XrFrame> {
        if self.ended {
            return None;
        }
        self.script.frames.pop_front()
    }

    fn poll_anchor_results(&mut self) -> Vec<AnchorOutcome> {
        std::mem::take(&mut self.pending_results)
    }

    fn end(&mut self) -> Result<(), DeviceError> {
        self.ended = true;
        self.log.lock().expect("sim log poisoned").sessions_ended += 1;
        Ok(())
    }
}

/// Frame builders used by the simulated device's default script and tests.
pub fn frame_with_hit(pose: Mat4, id: u64) -> XrFrame {
    XrFrame {
        viewer_pose: Some(Mat4::IDENTITY),
        stationary_hits: vec![HitSample {
            id: HitId(id),
            pose,
            anchorable: true,
        }],
        ..Default::default()
    }
}

pub fn empty_frame() -> XrFrame {
    XrFrame {
        viewer_pose: Some(Mat4::IDENTITY),
        ..Default::default()
    }
}

/// Script for native development: a few hit-less frames, then a stable
/// floor hit one metre ahead.
pub fn dev_walkthrough_script() -> SessionScript {
    let floor = Mat4::from_translation(Vec3::new(0.0, 0.0, -1.0));
    let mut frames: VecDeque<XrFrame> = (0..30).map(|_| empty_frame()).collect();
    frames.extend((0..600u64).map(|i| frame_with_hit(floor, i)));
    SessionScript {
        frames,
        ..Default::default()
    }
}
