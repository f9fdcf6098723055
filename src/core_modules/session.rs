// THEORY:
// The `session` module is the heart of the engine. It owns the mapping from tracked
// identity to lifecycle state and advances it exactly once per frame.
//
// Key architectural principles:
// 1.  **Pure Update**: `MeasurementSession::update` is a function of
//     `(previous snapshot, detections, now)` and nothing else. The session struct only
//     carries the two timing parameters; it holds no per-frame state of its own.
// 2.  **Immutable Snapshots**: A `Snapshot` is an `Arc`-shared, read-only map. The next
//     snapshot is always built from scratch, so a reader on another thread can keep the
//     previous one for as long as it likes.
// 3.  **Independent Identities**: Association is done upstream. Every identity is
//     advanced on its own; a newcomer never disturbs a face that is mid-measurement.
// 4.  **Lifecycle Management**:
//     - **Birth**: an unknown identity starts measuring.
//     - **Sighting**: a known identity advances its own state machine.
//     - **Occlusion**: an unseen identity is carried forward unchanged while its gap is
//       strictly shorter than the grace period.
//     - **Death**: otherwise it is dropped. Nothing is emitted; absence is the signal.

use crate::config::ScouterConfig;
use crate::core_modules::detection::{Detection, FaceId};
use crate::core_modules::measurement::{MeasuredFace, MeasurementState, MeasuringFace};
use crate::core_modules::region::Point;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The complete, immutable per-frame mapping of identity to lifecycle state.
/// Only `Measuring` and `Done` entries are ever stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    faces: Arc<BTreeMap<FaceId, MeasurementState>>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    fn from_map(faces: BTreeMap<FaceId, MeasurementState>) -> Self {
        Self {
            faces: Arc::new(faces),
        }
    }

    pub fn get(&self, identity: FaceId) -> Option<&MeasurementState> {
        self.faces.get(&identity)
    }

    pub fn contains(&self, identity: FaceId) -> bool {
        self.faces.contains_key(&identity)
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Entries in ascending identity order.
    pub fn iter(&self) -> impl Iterator<Item = (FaceId, &MeasurementState)> {
        self.faces.iter().map(|(id, state)| (*id, state))
    }

    pub fn ids(&self) -> Vec<FaceId> {
        self.faces.keys().copied().collect()
    }

    pub fn measuring_entries(&self) -> impl Iterator<Item = &MeasuringFace> {
        self.faces.values().filter_map(|state| match state {
            MeasurementState::Measuring(face) => Some(face),
            _ => None,
        })
    }

    pub fn done_entries(&self) -> impl Iterator<Item = &MeasuredFace> {
        self.faces.values().filter_map(|state| match state {
            MeasurementState::Done(face) => Some(face),
            _ => None,
        })
    }

    /// The identity with the largest region, for single-target presentation.
    /// Ties go to the lowest identity.
    pub fn main_subject(&self) -> Option<&MeasurementState> {
        let mut best: Option<(&MeasurementState, f32)> = None;
        for state in self.faces.values() {
            let area = state.region().map(|r| r.area()).unwrap_or(0.0);
            match best {
                Some((_, best_area)) if area <= best_area => {}
                _ => best = Some((state, area)),
            }
        }
        best.map(|(state, _)| state)
    }

    /// Resolves a tap in detector coordinates to a finalized face. Each region is
    /// grown by `touch_expansion` around its center first; on overlap the lowest
    /// identity wins.
    pub fn done_at(&self, point: Point, touch_expansion: f32) -> Option<&MeasuredFace> {
        self.done_entries()
            .find(|face| face.region.expanded(touch_expansion).contains(point))
    }
}

/// Applies one frame of detections to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementSession {
    measuring_duration_ms: u64,
    grace_period_ms: u64,
}

impl Default for MeasurementSession {
    fn default() -> Self {
        Self::from_config(&ScouterConfig::default())
    }
}

impl MeasurementSession {
    pub fn new(measuring_duration_ms: u64, grace_period_ms: u64) -> Self {
        Self {
            measuring_duration_ms,
            grace_period_ms,
        }
    }

    pub fn from_config(config: &ScouterConfig) -> Self {
        Self::new(config.measuring_duration_ms, config.grace_period_ms)
    }

    pub fn measuring_duration_ms(&self) -> u64 {
        self.measuring_duration_ms
    }

    pub fn grace_period_ms(&self) -> u64 {
        self.grace_period_ms
    }

    /// Produces the snapshot that follows `previous` after seeing `detections` at `now_ms`.
    ///
    /// If the same identity appears more than once in `detections`, only its last
    /// occurrence is used.
    pub fn update(&self, previous: &Snapshot, detections: &[Detection], now_ms: u64) -> Snapshot {
        // --- 1. Per-frame dedup ---
        let mut sighted: BTreeMap<FaceId, &Detection> = BTreeMap::new();
        for detection in detections {
            if sighted.insert(detection.identity, detection).is_some() {
                warn!(
                    identity = detection.identity,
                    "duplicate identity in one frame, keeping the last occurrence"
                );
            }
        }

        let mut next: BTreeMap<FaceId, MeasurementState> = BTreeMap::new();
        let idle = MeasurementState::Idle;

        // --- 2. State Updating ---
        for (&identity, detection) in &sighted {
            let prev_state = previous.get(identity).unwrap_or(&idle);
            let next_state = prev_state.advance(detection, now_ms, self.measuring_duration_ms);

            match (prev_state, &next_state) {
                (MeasurementState::Idle, _) => {
                    debug!(identity, score = detection.score, "measurement started");
                }
                (MeasurementState::Measuring(_), MeasurementState::Done(done)) => {
                    info!(
                        identity,
                        averaged_score = done.averaged_score,
                        "measurement finalized"
                    );
                }
                _ => {}
            }

            next.insert(identity, next_state);
        }

        // --- 3. Occlusion and death ---
        for (identity, state) in previous.iter() {
            if sighted.contains_key(&identity) {
                continue;
            }
            if state.within_grace(now_ms, self.grace_period_ms) {
                next.insert(identity, state.clone());
            } else {
                debug!(identity, "identity evicted after grace period");
            }
        }

        Snapshot::from_map(next)
    }
}
