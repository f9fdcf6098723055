// THEORY:
// The `pipeline` module is the top-level synchronous API of the measurement engine.
// It wraps the scoring, identity fallback and session update into one call per frame
// and hands back a `FrameReport` that a presentation layer can draw from directly.
//
// `MeasurementPipeline` is the single owner of the current snapshot. Updates take
// `&mut self`, so there can never be two updates of the same snapshot in flight.
// Callers that want the detector on its own task should use `ParallelPipeline`,
// which is built from the same pieces.

use crate::config::ScouterConfig;
use crate::core_modules::detection::into_detections;
use crate::core_modules::power_calculator::PowerCalculator;
use crate::core_modules::session::MeasurementSession;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// Re-export key data structures for the public API.
pub use crate::core_modules::detection::{Detection, FaceId, FaceObservation};
pub use crate::core_modules::measurement::{MeasuredFace, MeasurementState, MeasuringFace};
pub use crate::core_modules::region::{Point, Region};
pub use crate::core_modules::session::Snapshot;

/// Descriptor of a captured frame, without its pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameInfo {
    pub timestamp_ms: u64,
    /// Sensor width in pixels, before rotation.
    pub width: u32,
    /// Sensor height in pixels, before rotation.
    pub height: u32,
    #[serde(default)]
    pub rotation_degrees: u32,
}

impl FrameInfo {
    pub fn new(timestamp_ms: u64, width: u32, height: u32, rotation_degrees: u32) -> Self {
        Self {
            timestamp_ms,
            width,
            height,
            rotation_degrees,
        }
    }

    /// Width and height as the detector sees the frame once rotation is applied.
    pub fn upright_dimensions(&self) -> (u32, u32) {
        match self.rotation_degrees % 360 {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }
}

/// A captured frame handed to the detector. The buffer is shared, so cloning a
/// frame never copies pixels.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub info: FrameInfo,
    pub buffer: Arc<[u8]>,
}

impl FrameData {
    pub fn new(info: FrameInfo, buffer: impl Into<Arc<[u8]>>) -> Self {
        Self {
            info,
            buffer: buffer.into(),
        }
    }
}

/// The output of the engine for a single frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// The `now` the snapshot was computed at.
    pub timestamp_ms: u64,
    /// Upright frame width, for scaling regions onto a view.
    pub image_width: u32,
    /// Upright frame height, for scaling regions onto a view.
    pub image_height: u32,
    pub snapshot: Snapshot,
    /// Identities that reached `Done` in this frame.
    pub newly_done: Vec<FaceId>,
    /// Identities present in the previous snapshot but gone from this one.
    pub lost: Vec<FaceId>,
}

impl FrameReport {
    /// Builds the report for `snapshot`, deriving the per-frame changes from `previous`.
    pub fn between(previous: &Snapshot, snapshot: Snapshot, frame: &FrameInfo, now_ms: u64) -> Self {
        let newly_done = snapshot
            .iter()
            .filter(|(id, state)| {
                state.is_done() && !previous.get(*id).is_some_and(MeasurementState::is_done)
            })
            .map(|(id, _)| id)
            .collect();
        let lost = previous
            .iter()
            .filter(|(id, _)| !snapshot.contains(*id))
            .map(|(id, _)| id)
            .collect();
        let (image_width, image_height) = frame.upright_dimensions();

        Self {
            timestamp_ms: now_ms,
            image_width,
            image_height,
            snapshot,
            newly_done,
            lost,
        }
    }

    pub fn has_new_results(&self) -> bool {
        !self.newly_done.is_empty()
    }
}

/// The main, top-level struct for the synchronous engine.
pub struct MeasurementPipeline {
    config: ScouterConfig,
    session: MeasurementSession,
    calculator: PowerCalculator,
    snapshot: Snapshot,
    frames_processed: u64,
}

impl MeasurementPipeline {
    pub fn new(config: ScouterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            session: MeasurementSession::from_config(&config),
            calculator: PowerCalculator::new(),
            config,
            snapshot: Snapshot::empty(),
            frames_processed: 0,
        })
    }

    /// Scores raw detector output for one frame and advances the snapshot.
    pub fn process_frame(
        &mut self,
        frame: &FrameInfo,
        observations: &[FaceObservation],
        now_ms: u64,
    ) -> FrameReport {
        // Stage 1: identity fallback and scoring
        let detections = into_detections(observations, &self.calculator);

        // Stage 2: lifecycle update
        self.apply_detections(frame, &detections, now_ms)
    }

    /// Advances the snapshot with detections that were already scored upstream.
    pub fn apply_detections(
        &mut self,
        frame: &FrameInfo,
        detections: &[Detection],
        now_ms: u64,
    ) -> FrameReport {
        let next = self.session.update(&self.snapshot, detections, now_ms);
        let previous = std::mem::replace(&mut self.snapshot, next.clone());
        self.frames_processed += 1;
        FrameReport::between(&previous, next, frame, now_ms)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &ScouterConfig {
        &self.config
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Finalized face under a tap, using the configured touch expansion.
    pub fn done_at(&self, point: Point) -> Option<&MeasuredFace> {
        self.snapshot.done_at(point, self.config.touch_expansion)
    }

    /// Forgets every identity, as when the camera view is left.
    pub fn reset(&mut self) {
        self.snapshot = Snapshot::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(id: FaceId) -> FaceObservation {
        FaceObservation::new(Region::new(0.0, 0.0, 200.0, 200.0))
            .with_tracking_id(id)
            .with_smile(0.5)
            .with_eyes_open(1.0, 1.0)
    }

    #[test]
    fn test_upright_dimensions() {
        assert_eq!(FrameInfo::new(0, 640, 480, 0).upright_dimensions(), (640, 480));
        assert_eq!(FrameInfo::new(0, 640, 480, 90).upright_dimensions(), (480, 640));
        assert_eq!(FrameInfo::new(0, 640, 480, 180).upright_dimensions(), (640, 480));
        assert_eq!(FrameInfo::new(0, 640, 480, 270).upright_dimensions(), (480, 640));
    }

    #[test]
    fn test_report_marks_newly_done_once() {
        let config = ScouterConfig {
            measuring_duration_ms: 200,
            ..ScouterConfig::default()
        };
        let mut pipeline = MeasurementPipeline::new(config).unwrap();
        let frame = FrameInfo::new(0, 640, 480, 90);

        let report = pipeline.process_frame(&frame, &[face(1)], 0);
        assert!(report.newly_done.is_empty());
        assert_eq!((report.image_width, report.image_height), (480, 640));

        let report = pipeline.process_frame(&frame, &[face(1)], 200);
        assert_eq!(report.newly_done, vec![1]);
        assert!(report.has_new_results());

        let report = pipeline.process_frame(&frame, &[face(1)], 300);
        assert!(report.newly_done.is_empty());
        match report.snapshot.get(1) {
            Some(MeasurementState::Done(done)) => assert_eq!(done.averaged_score, 1752),
            other => panic!("expected Done, got {:?}", other),
        }
        assert_eq!(pipeline.frames_processed(), 3);
    }

    #[test]
    fn test_report_lists_lost_identities() {
        let mut pipeline = MeasurementPipeline::new(ScouterConfig::default()).unwrap();
        let frame = FrameInfo::new(0, 640, 480, 0);

        pipeline.process_frame(&frame, &[face(1), face(2)], 0);
        let report = pipeline.process_frame(&frame, &[face(2)], 600);
        assert_eq!(report.lost, vec![1]);
        assert_eq!(report.snapshot.ids(), vec![2]);
    }

    #[test]
    fn test_done_at_and_reset() {
        let config = ScouterConfig {
            measuring_duration_ms: 100,
            ..ScouterConfig::default()
        };
        let mut pipeline = MeasurementPipeline::new(config).unwrap();
        let frame = FrameInfo::new(0, 640, 480, 0);

        pipeline.process_frame(&frame, &[face(5)], 0);
        pipeline.process_frame(&frame, &[face(5)], 100);
        let hit = pipeline.done_at(Point::new(240.0, 100.0)).map(|f| f.identity);
        assert_eq!(hit, Some(5));

        pipeline.reset();
        assert!(pipeline.snapshot().is_empty());
        assert!(pipeline.done_at(Point::new(100.0, 100.0)).is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ScouterConfig {
            measuring_duration_ms: 0,
            ..ScouterConfig::default()
        };
        assert!(MeasurementPipeline::new(config).is_err());
    }
}
