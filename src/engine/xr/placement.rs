//! Placement state machine.
//!
//! Consumes per-frame hit-test snapshots and select events, drives the
//! reticle, commits placements (anchored, fixed-pose, or forward-fallback),
//! and keeps an anchored object's pose locked to its anchor. The tracker is
//! a plain value updated by pure-ish methods returning effect lists; thin
//! systems apply the effects to scene entities, so every transition is
//! testable without a runtime.

use bevy::prelude::*;

use crate::constants::{FORWARD_FALLBACK_DISTANCE, NO_HIT_NOTICE_SECS};
use crate::engine::math::pose::{forward_fallback_pose, with_yaw_offset};

use super::device::{AnchorId, AnchorOutcome, AnchorTicket, HitId, HitSample, XrFrame};

pub const NO_SURFACE_NOTICE: &str =
    "No surface detected: move the device or tap to place in front";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlacementState {
    Unplaced,
    ReticleVisible,
    /// A select happened on an anchorable hit; the anchor request is in
    /// flight. `fallback` is the committed pose used if the request fails.
    AnchorPending {
        ticket: AnchorTicket,
        fallback: Mat4,
    },
    PlacedWithAnchor {
        anchor: AnchorId,
    },
    PlacedWithoutAnchor {
        matrix: Mat4,
    },
    PlacedFallbackForward {
        matrix: Mat4,
    },
}

/// Which context is allowed to write the placed object's transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformSource {
    ManualDriven,
    AnchorDriven,
}

/// Placement milestones surfaced to the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArEventKind {
    PlaneDetected,
    Anchored,
    PlacedNoAnchor,
    PlacedFallback,
}

impl ArEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlaneDetected => "plane_detected",
            Self::Anchored => "anchored",
            Self::PlacedNoAnchor => "placed_no_anchor",
            Self::PlacedFallback => "placed_fallback",
        }
    }
}

/// Side effects produced by one tracker step, applied by the frame system.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEffect {
    ShowReticle(Mat4),
    HideReticle,
    /// Overwrite the placed object's full transform matrix. Never
    /// decomposed into components by the tracker.
    SetModelMatrix(Mat4),
    Emit(ArEventKind),
    Notice(&'static str),
}

/// What the session controller should do after a select event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectAction {
    None,
    RequestAnchor { hit: HitId, ticket: AnchorTicket },
}

#[derive(Resource)]
pub struct PlacementTracker {
    state: PlacementState,
    /// Most recent stationary hit, cached so a select arriving between
    /// frames can still create an anchor from it.
    last_hit: Option<HitSample>,
    /// Current reticle candidate pose (real hit or forward fallback).
    reticle_pose: Option<Mat4>,
    last_viewer_pose: Option<Mat4>,
    /// Rotation-only edit applied after the anchor pose.
    manual_yaw: f32,
    /// Bumped on relocate/reset so stale anchor completions are dropped.
    generation: u32,
    frames_total: u64,
    frames_with_hits: u64,
    /// One-shot window for the no-surface notice; `None` once reported.
    diag_started_at: Option<f64>,
    plane_seen: bool,
}

impl Default for PlacementTracker {
    fn default() -> Self {
        Self {
            state: PlacementState::Unplaced,
            last_hit: None,
            reticle_pose: None,
            last_viewer_pose: None,
            manual_yaw: 0.0,
            generation: 0,
            frames_total: 0,
            frames_with_hits: 0,
            diag_started_at: None,
            plane_seen: false,
        }
    }
}

impl PlacementTracker {
    pub fn state(&self) -> PlacementState {
        self.state
    }

    pub fn transform_source(&self) -> TransformSource {
        match self.state {
            PlacementState::PlacedWithAnchor { .. } => TransformSource::AnchorDriven,
            _ => TransformSource::ManualDriven,
        }
    }

    /// True once a select committed (or is committing) a placement; manual
    /// edits are then restricted to rotation.
    pub fn placement_locked(&self) -> bool {
        !matches!(
            self.state,
            PlacementState::Unplaced | PlacementState::ReticleVisible
        )
    }

    fn reticle_allowed(&self) -> bool {
        !self.placement_locked()
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_total
    }

    pub fn frames_with_hits(&self) -> u64 {
        self.frames_with_hits
    }

    /// Rotation-only edit; composed after the anchor pose while anchored.
    pub fn add_manual_yaw(&mut self, delta: f32) {
        self.manual_yaw += delta;
    }

    /// Reset counters and state for a fresh session.
    pub fn begin_session(&mut self, now: f64) {
        *self = Self::default();
        self.diag_started_at = Some(now);
    }

    /// Full reset on session teardown.
    pub fn reset(&mut self) {
        let generation = self.generation.wrapping_add(1);
        *self = Self::default();
        self.generation = generation;
    }

    /// Per-frame step. Order within the step: stationary hit processing,
    /// forward-fallback reticle, transient hits, anchor pose application,
    /// diagnostics.
    pub fn on_frame(&mut self, frame: &XrFrame, now: f64) -> Vec<FrameEffect> {
        let mut effects = Vec::new();
        let mut hit_this_frame = false;

        if let Some(viewer) = frame.viewer_pose {
            self.last_viewer_pose = Some(viewer);
        }

        if let Some(hit) = frame.stationary_hits.first() {
            self.last_hit = Some(*hit);
            hit_this_frame = true;
            if self.reticle_allowed() {
                self.reticle_pose = Some(hit.pose);
                if self.state == PlacementState::Unplaced {
                    self.state = PlacementState::ReticleVisible;
                }
                effects.push(FrameEffect::ShowReticle(hit.pose));
                if !self.plane_seen {
                    self.plane_seen = true;
                    effects.push(FrameEffect::Emit(ArEventKind::PlaneDetected));
                }
            }
        } else if self.reticle_allowed() {
            // No surface hit: keep the reticle ahead of the viewer so the
            // user still gets visual confirmation. Not anchorable.
            match frame.viewer_pose {
                Some(viewer) => {
                    let pose = forward_fallback_pose(&viewer, FORWARD_FALLBACK_DISTANCE);
                    self.reticle_pose = Some(pose);
                    if self.state == PlacementState::Unplaced {
                        self.state = PlacementState::ReticleVisible;
                    }
                    effects.push(FrameEffect::ShowReticle(pose));
                }
                None => {
                    self.reticle_pose = None;
                    if self.state == PlacementState::ReticleVisible {
                        self.state = PlacementState::Unplaced;
                    }
                    effects.push(FrameEffect::HideReticle);
                }
            }
        }

        // Transient-input (tap) hits are a secondary reticle source.
        if let Some(hit) = frame.transient_hits.first() {
            hit_this_frame = true;
            if self.reticle_allowed() {
                self.reticle_pose = Some(hit.pose);
                if self.state == PlacementState::Unplaced {
                    self.state = PlacementState::ReticleVisible;
                }
                effects.push(FrameEffect::ShowReticle(hit.pose));
            }
        }

        // Anchored: the anchor owns the pose; copy the full matrix, with
        // the rotation-only yaw offset composed after it.
        if let PlacementState::PlacedWithAnchor { anchor } = self.state {
            if let Some((_, pose)) = frame
                .anchor_poses
                .iter()
                .find(|(id, _)| *id == anchor)
            {
                effects.push(FrameEffect::SetModelMatrix(with_yaw_offset(
                    pose,
                    self.manual_yaw,
                )));
            }
            // A frame without a resolvable anchor pose mutates nothing.
        }

        self.frames_total += 1;
        if hit_this_frame {
            self.frames_with_hits += 1;
        }
        if let Some(started) = self.diag_started_at {
            if now - started > NO_HIT_NOTICE_SECS {
                if self.frames_with_hits == 0 {
                    effects.push(FrameEffect::Notice(NO_SURFACE_NOTICE));
                }
                // Report once only.
                self.diag_started_at = None;
            }
        }

        effects
    }

    /// Select (tap/trigger) event. Placement paths in preference order:
    /// anchorable cached hit, visible reticle pose, viewer-forward
    /// fallback.
    pub fn on_select(&mut self) -> (Vec<FrameEffect>, SelectAction) {
        if self.placement_locked() {
            // Re-placement requires an explicit relocate first.
            return (Vec::new(), SelectAction::None);
        }

        if let Some(hit) = self.last_hit.filter(|hit| hit.anchorable) {
            let ticket = AnchorTicket(self.generation);
            let fallback = self.reticle_pose.unwrap_or(hit.pose);
            self.state = PlacementState::AnchorPending { ticket, fallback };
            return (
                vec![FrameEffect::HideReticle],
                SelectAction::RequestAnchor {
                    hit: hit.id,
                    ticket,
                },
            );
        }

        if let Some(pose) = self.reticle_pose {
            self.state = PlacementState::PlacedWithoutAnchor { matrix: pose };
            return (
                vec![
                    FrameEffect::SetModelMatrix(pose),
                    FrameEffect::HideReticle,
                    FrameEffect::Emit(ArEventKind::PlacedNoAnchor),
                ],
                SelectAction::None,
            );
        }

        if let Some(viewer) = self.last_viewer_pose {
            let matrix = forward_fallback_pose(&viewer, FORWARD_FALLBACK_DISTANCE);
            self.state = PlacementState::PlacedFallbackForward { matrix };
            return (
                vec![
                    FrameEffect::SetModelMatrix(matrix),
                    FrameEffect::HideReticle,
                    FrameEffect::Emit(ArEventKind::PlacedFallback),
                ],
                SelectAction::None,
            );
        }

        (Vec::new(), SelectAction::None)
    }

    /// Apply an anchor completion. Results whose ticket does not match the
    /// current pending generation are stale (relocate or teardown happened
    /// while in flight) and are dropped.
    pub fn on_anchor_result(&mut self, outcome: &AnchorOutcome) -> Vec<FrameEffect> {
        let PlacementState::AnchorPending { ticket, fallback } = self.state else {
            warn!("dropping anchor result: no placement pending");
            return Vec::new();
        };

        match outcome {
            AnchorOutcome::Created {
                ticket: completed,
                anchor,
            } if *completed == ticket => {
                self.state = PlacementState::PlacedWithAnchor { anchor: *anchor };
                vec![
                    FrameEffect::HideReticle,
                    FrameEffect::Emit(ArEventKind::Anchored),
                ]
            }
            AnchorOutcome::Failed {
                ticket: completed,
                reason,
            } if *completed == ticket => {
                warn!("anchor creation failed ({reason}); committing reticle pose");
                self.state = PlacementState::PlacedWithoutAnchor { matrix: fallback };
                vec![
                    FrameEffect::SetModelMatrix(fallback),
                    FrameEffect::HideReticle,
                    FrameEffect::Emit(ArEventKind::PlacedNoAnchor),
                ]
            }
            _ => {
                warn!("dropping stale anchor result");
                Vec::new()
            }
        }
    }

    /// User-triggered relocate: clear any placement and show the reticle
    /// again without tearing the session down.
    pub fn relocate(&mut self) -> Vec<FrameEffect> {
        self.generation = self.generation.wrapping_add(1);
        self.manual_yaw = 0.0;
        self.state = PlacementState::Unplaced;
        match self.reticle_pose {
            Some(pose) => {
                self.state = PlacementState::ReticleVisible;
                vec![FrameEffect::ShowReticle(pose)]
            }
            None => vec![FrameEffect::HideReticle],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::xr::device::HitSample;
    use crate::engine::xr::simulated::{empty_frame, frame_with_hit};

    fn hit_pose() -> Mat4 {
        Mat4::from_translation(Vec3::new(0.2, 0.0, -1.0))
    }

    fn tracker_with_session() -> PlacementTracker {
        let mut tracker = PlacementTracker::default();
        tracker.begin_session(0.0);
        tracker
    }

    fn viewer_at(pos: Vec3) -> Mat4 {
        Mat4::from_translation(pos)
    }

    #[test]
    fn stationary_hit_shows_reticle_and_reports_plane_once() {
        let mut tracker = tracker_with_session();
        let effects = tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        assert!(effects.contains(&FrameEffect::ShowReticle(hit_pose())));
        assert!(effects.contains(&FrameEffect::Emit(ArEventKind::PlaneDetected)));
        assert_eq!(tracker.state(), PlacementState::ReticleVisible);

        let effects = tracker.on_frame(&frame_with_hit(hit_pose(), 2), 0.033);
        assert!(!effects.contains(&FrameEffect::Emit(ArEventKind::PlaneDetected)));
    }

    #[test]
    fn hitless_frame_places_reticle_ahead_of_viewer() {
        // Reticle pose equals viewer position + 1.5 x forward; the y
        // component mirrors the viewer.
        let mut tracker = tracker_with_session();
        let mut frame = empty_frame();
        frame.viewer_pose = Some(viewer_at(Vec3::new(0.0, 1.7, 0.0)));
        let effects = tracker.on_frame(&frame, 0.016);

        let expected = Mat4::from_translation(Vec3::new(0.0, 1.7, -1.5));
        assert!(effects.contains(&FrameEffect::ShowReticle(expected)));
    }

    #[test]
    fn frame_without_viewer_or_hits_hides_reticle() {
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        let frame = XrFrame::default();
        let effects = tracker.on_frame(&frame, 0.033);
        assert!(effects.contains(&FrameEffect::HideReticle));
        assert_eq!(tracker.state(), PlacementState::Unplaced);
    }

    #[test]
    fn transient_hit_updates_reticle() {
        let mut tracker = tracker_with_session();
        let pose = Mat4::from_translation(Vec3::new(0.5, 0.0, -2.0));
        let mut frame = empty_frame();
        frame.transient_hits.push(HitSample {
            id: HitId(7),
            pose,
            anchorable: false,
        });
        let effects = tracker.on_frame(&frame, 0.016);
        assert!(effects.contains(&FrameEffect::ShowReticle(pose)));
    }

    #[test]
    fn select_on_anchorable_hit_requests_anchor_and_hides_reticle() {
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);

        let (effects, action) = tracker.on_select();
        assert!(effects.contains(&FrameEffect::HideReticle));
        assert_eq!(
            action,
            SelectAction::RequestAnchor {
                hit: HitId(1),
                ticket: AnchorTicket(0),
            }
        );
        assert!(matches!(
            tracker.state(),
            PlacementState::AnchorPending { .. }
        ));

        let effects = tracker.on_anchor_result(&AnchorOutcome::Created {
            ticket: AnchorTicket(0),
            anchor: AnchorId(10),
        });
        assert!(effects.contains(&FrameEffect::Emit(ArEventKind::Anchored)));
        assert_eq!(
            tracker.state(),
            PlacementState::PlacedWithAnchor {
                anchor: AnchorId(10)
            }
        );
    }

    #[test]
    fn anchored_pose_is_copied_as_full_matrix_each_frame() {
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        tracker.on_select();
        tracker.on_anchor_result(&AnchorOutcome::Created {
            ticket: AnchorTicket(0),
            anchor: AnchorId(10),
        });

        let drifted = Mat4::from_translation(Vec3::new(0.21, 0.01, -1.02));
        let mut frame = empty_frame();
        frame.anchor_poses.push((AnchorId(10), drifted));
        let effects = tracker.on_frame(&frame, 0.033);
        assert!(effects.contains(&FrameEffect::SetModelMatrix(drifted)));
        // Reticle stays hidden while placed.
        assert!(!effects.iter().any(|e| matches!(e, FrameEffect::ShowReticle(_))));
    }

    #[test]
    fn manual_yaw_composes_after_anchor_pose() {
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        tracker.on_select();
        tracker.on_anchor_result(&AnchorOutcome::Created {
            ticket: AnchorTicket(0),
            anchor: AnchorId(10),
        });
        tracker.add_manual_yaw(0.5);

        let anchor_pose = Mat4::from_translation(Vec3::new(0.2, 0.0, -1.0));
        let mut frame = empty_frame();
        frame.anchor_poses.push((AnchorId(10), anchor_pose));
        let effects = tracker.on_frame(&frame, 0.033);
        let expected = with_yaw_offset(&anchor_pose, 0.5);
        assert!(effects.contains(&FrameEffect::SetModelMatrix(expected)));
    }

    #[test]
    fn anchor_failure_commits_reticle_pose_without_anchor() {
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        tracker.on_select();

        let effects = tracker.on_anchor_result(&AnchorOutcome::Failed {
            ticket: AnchorTicket(0),
            reason: "denied".into(),
        });
        assert!(effects.contains(&FrameEffect::SetModelMatrix(hit_pose())));
        assert!(effects.contains(&FrameEffect::Emit(ArEventKind::PlacedNoAnchor)));
        assert_eq!(
            tracker.state(),
            PlacementState::PlacedWithoutAnchor {
                matrix: hit_pose()
            }
        );
    }

    #[test]
    fn select_without_anchorable_hit_commits_reticle_pose() {
        let mut tracker = tracker_with_session();
        let mut frame = empty_frame();
        frame.viewer_pose = Some(viewer_at(Vec3::new(0.0, 1.6, 0.0)));
        tracker.on_frame(&frame, 0.016);

        let (effects, action) = tracker.on_select();
        assert_eq!(action, SelectAction::None);
        let expected = Mat4::from_translation(Vec3::new(0.0, 1.6, -1.5));
        assert!(effects.contains(&FrameEffect::SetModelMatrix(expected)));
        assert!(effects.contains(&FrameEffect::Emit(ArEventKind::PlacedNoAnchor)));
    }

    #[test]
    fn select_with_no_reticle_places_forward_fallback() {
        let mut tracker = tracker_with_session();
        // A viewer pose was seen at some point, but the reticle never
        // showed (no hits, viewer later lost).
        let mut frame = empty_frame();
        frame.viewer_pose = Some(viewer_at(Vec3::new(1.0, 1.5, 0.0)));
        tracker.on_frame(&frame, 0.016);
        tracker.on_frame(&XrFrame::default(), 0.033);

        let (effects, _) = tracker.on_select();
        let expected = Mat4::from_translation(Vec3::new(1.0, 1.5, -1.5));
        assert!(effects.contains(&FrameEffect::SetModelMatrix(expected)));
        assert!(effects.contains(&FrameEffect::Emit(ArEventKind::PlacedFallback)));
        assert!(matches!(
            tracker.state(),
            PlacementState::PlacedFallbackForward { .. }
        ));
    }

    #[test]
    fn second_select_while_placed_is_ignored() {
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        tracker.on_select();
        tracker.on_anchor_result(&AnchorOutcome::Created {
            ticket: AnchorTicket(0),
            anchor: AnchorId(10),
        });

        let state_before = tracker.state();
        let (effects, action) = tracker.on_select();
        assert!(effects.is_empty());
        assert_eq!(action, SelectAction::None);
        assert_eq!(tracker.state(), state_before);
    }

    #[test]
    fn relocate_then_select_creates_a_fresh_anchor() {
        // After an anchored placement, relocate followed by a new
        // select with a fresh hit produces a new anchor request, and the
        // reticle hides again after the new placement.
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        let (_, first_action) = tracker.on_select();
        tracker.on_anchor_result(&AnchorOutcome::Created {
            ticket: AnchorTicket(0),
            anchor: AnchorId(10),
        });

        tracker.relocate();
        assert!(!tracker.placement_locked());

        let fresh = Mat4::from_translation(Vec3::new(1.0, 0.0, -2.0));
        tracker.on_frame(&frame_with_hit(fresh, 42), 1.0);
        let (effects, second_action) = tracker.on_select();
        assert!(effects.contains(&FrameEffect::HideReticle));
        assert_ne!(first_action, second_action);
        assert_eq!(
            second_action,
            SelectAction::RequestAnchor {
                hit: HitId(42),
                ticket: AnchorTicket(1),
            }
        );
    }

    #[test]
    fn stale_anchor_result_after_relocate_is_dropped() {
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        tracker.on_select();
        // The user relocates while the anchor request is still in flight.
        tracker.relocate();

        let effects = tracker.on_anchor_result(&AnchorOutcome::Created {
            ticket: AnchorTicket(0),
            anchor: AnchorId(10),
        });
        assert!(effects.is_empty());
        assert!(!tracker.placement_locked());
    }

    #[test]
    fn reticle_stays_hidden_while_anchor_is_pending() {
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        tracker.on_select();

        let effects = tracker.on_frame(&frame_with_hit(hit_pose(), 2), 0.033);
        assert!(!effects.iter().any(|e| matches!(e, FrameEffect::ShowReticle(_))));
    }

    #[test]
    fn no_hit_notice_fires_exactly_once() {
        let mut tracker = tracker_with_session();
        let mut notices = 0;
        // ~8 seconds of hit-less frames at 60 Hz.
        for i in 0..480 {
            let now = i as f64 / 60.0;
            for effect in tracker.on_frame(&empty_frame(), now) {
                if matches!(effect, FrameEffect::Notice(_)) {
                    notices += 1;
                }
            }
        }
        assert_eq!(notices, 1);
    }

    #[test]
    fn no_hit_notice_suppressed_when_hits_were_seen() {
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        let mut notices = 0;
        for i in 1..480 {
            let now = i as f64 / 60.0;
            for effect in tracker.on_frame(&empty_frame(), now) {
                if matches!(effect, FrameEffect::Notice(_)) {
                    notices += 1;
                }
            }
        }
        assert_eq!(notices, 0);
        assert_eq!(tracker.frames_with_hits(), 1);
        assert_eq!(tracker.frames_total(), 480);
    }

    #[test]
    fn transform_source_tracks_anchor_state() {
        // Write arbitration input: only the anchored state is anchor-driven.
        let mut tracker = tracker_with_session();
        assert_eq!(tracker.transform_source(), TransformSource::ManualDriven);

        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        tracker.on_select();
        tracker.on_anchor_result(&AnchorOutcome::Created {
            ticket: AnchorTicket(0),
            anchor: AnchorId(10),
        });
        assert_eq!(tracker.transform_source(), TransformSource::AnchorDriven);
        assert!(tracker.placement_locked());

        tracker.relocate();
        assert_eq!(tracker.transform_source(), TransformSource::ManualDriven);
    }

    #[test]
    fn reset_returns_to_defaults() {
        let mut tracker = tracker_with_session();
        tracker.on_frame(&frame_with_hit(hit_pose(), 1), 0.016);
        tracker.on_select();
        tracker.reset();
        assert_eq!(tracker.state(), PlacementState::Unplaced);
        assert_eq!(tracker.frames_total(), 0);
    }
}
