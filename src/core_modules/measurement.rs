// THEORY:
// The `measurement` module is the per-identity lifecycle of the engine. It adds the
// notion of "a reading in progress" on top of the stateless per-frame detections.
//
// Every tracked face moves through a closed set of states:
//
//   Idle ──first sighting──▶ Measuring ──window elapsed──▶ Done
//                              ▲   │                        ▲  │
//                              └───┘ (sample appended)      └──┘ (position refreshed)
//
// 1.  **Idle** is never stored. It is the implicit state of any identity the
//     snapshot does not know about.
// 2.  **Measuring** owns the open sample window. Each sighting appends exactly one
//     score. The window closes on the first sighting at or beyond the configured
//     duration; that sighting's score is part of the average.
// 3.  **Done** freezes the averaged power for good. Later sightings only move the
//     region and refresh the last-seen time.
//
// Transitions are computed from a borrowed previous state and always produce a new
// value, so a snapshot handed to another thread is never touched again.

use crate::core_modules::detection::{Detection, FaceId};
use crate::core_modules::region::Region;

/// An open measurement window for one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuringFace {
    pub identity: FaceId,
    /// Timestamp of the first sighting, in milliseconds.
    pub start_time_ms: u64,
    /// One score per frame in which the identity was seen, oldest first.
    pub samples: Vec<u32>,
    /// Region from the most recent sighting.
    pub region: Region,
    pub last_seen_ms: u64,
}

impl MeasuringFace {
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.start_time_ms)
    }

    /// Fraction of the measuring window that has passed, in `[0, 1]`.
    pub fn progress(&self, now_ms: u64, measuring_duration_ms: u64) -> f32 {
        if measuring_duration_ms == 0 {
            return 1.0;
        }
        (self.elapsed_ms(now_ms) as f32 / measuring_duration_ms as f32).min(1.0)
    }

    /// Average of the samples collected so far, for live display.
    pub fn running_average(&self) -> u32 {
        truncated_mean(&self.samples)
    }
}

/// A finalized reading. `averaged_score` never changes once set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredFace {
    pub identity: FaceId,
    pub averaged_score: u32,
    pub region: Region,
    pub last_seen_ms: u64,
}

/// Lifecycle state of a single tracked identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MeasurementState {
    #[default]
    Idle,
    Measuring(MeasuringFace),
    Done(MeasuredFace),
}

impl MeasurementState {
    pub fn identity(&self) -> Option<FaceId> {
        match self {
            MeasurementState::Idle => None,
            MeasurementState::Measuring(face) => Some(face.identity),
            MeasurementState::Done(face) => Some(face.identity),
        }
    }

    pub fn region(&self) -> Option<&Region> {
        match self {
            MeasurementState::Idle => None,
            MeasurementState::Measuring(face) => Some(&face.region),
            MeasurementState::Done(face) => Some(&face.region),
        }
    }

    pub fn last_seen_ms(&self) -> Option<u64> {
        match self {
            MeasurementState::Idle => None,
            MeasurementState::Measuring(face) => Some(face.last_seen_ms),
            MeasurementState::Done(face) => Some(face.last_seen_ms),
        }
    }

    pub fn is_measuring(&self) -> bool {
        matches!(self, MeasurementState::Measuring(_))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, MeasurementState::Done(_))
    }

    /// Whether an unseen identity in this state may still be carried into the next
    /// snapshot. The gap must be strictly shorter than the grace period.
    pub fn within_grace(&self, now_ms: u64, grace_period_ms: u64) -> bool {
        match self.last_seen_ms() {
            Some(last_seen_ms) => now_ms.saturating_sub(last_seen_ms) < grace_period_ms,
            None => false,
        }
    }

    /// Computes the next state for an identity sighted by `detection` at `now_ms`.
    pub fn advance(
        &self,
        detection: &Detection,
        now_ms: u64,
        measuring_duration_ms: u64,
    ) -> MeasurementState {
        match self {
            MeasurementState::Idle => MeasurementState::Measuring(MeasuringFace {
                identity: detection.identity,
                start_time_ms: now_ms,
                samples: vec![detection.score],
                region: detection.region,
                last_seen_ms: now_ms,
            }),
            MeasurementState::Measuring(face) => {
                let mut samples = Vec::with_capacity(face.samples.len() + 1);
                samples.extend_from_slice(&face.samples);
                samples.push(detection.score);

                if face.elapsed_ms(now_ms) >= measuring_duration_ms {
                    MeasurementState::Done(MeasuredFace {
                        identity: detection.identity,
                        averaged_score: truncated_mean(&samples),
                        region: detection.region,
                        last_seen_ms: now_ms,
                    })
                } else {
                    MeasurementState::Measuring(MeasuringFace {
                        identity: face.identity,
                        start_time_ms: face.start_time_ms,
                        samples,
                        region: detection.region,
                        last_seen_ms: now_ms,
                    })
                }
            }
            MeasurementState::Done(face) => MeasurementState::Done(MeasuredFace {
                region: detection.region,
                last_seen_ms: now_ms,
                ..*face
            }),
        }
    }
}

/// Arithmetic mean truncated toward zero. An empty slice averages to 0.
pub fn truncated_mean(samples: &[u32]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let total: u64 = samples.iter().map(|&s| u64::from(s)).sum();
    (total / samples.len() as u64) as u32
}
