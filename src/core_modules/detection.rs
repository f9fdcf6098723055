// THEORY:
// The `detection` module holds the two per-frame data containers that cross the
// boundary between the external face detector and the measurement engine.
//
// 1.  **`FaceObservation`** is what a detector backend reports: an optional tracking
//     id, a region, and the optional classification probabilities. It knows nothing
//     about power levels.
// 2.  **`Detection`** is the scored, identified form the session aggregator consumes.
//
// Identity is an external guarantee. When a backend does not supply a tracking id,
// the caller falls back to the observation's position within that call's result list
// (`into_detections`). The session itself never invents identities.

use crate::core_modules::power_calculator::PowerCalculator;
use crate::core_modules::region::Region;
use serde::{Deserialize, Serialize};

/// Stable integer handle assigned by the upstream tracker.
pub type FaceId = i32;

/// A raw face as reported by a detector backend for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceObservation {
    #[serde(default)]
    pub tracking_id: Option<FaceId>,
    pub region: Region,
    #[serde(default)]
    pub smile_probability: Option<f32>,
    #[serde(default)]
    pub left_eye_open_probability: Option<f32>,
    #[serde(default)]
    pub right_eye_open_probability: Option<f32>,
}

impl FaceObservation {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            ..Self::default()
        }
    }

    pub fn with_tracking_id(mut self, tracking_id: FaceId) -> Self {
        self.tracking_id = Some(tracking_id);
        self
    }

    pub fn with_smile(mut self, probability: f32) -> Self {
        self.smile_probability = Some(probability);
        self
    }

    pub fn with_eyes_open(mut self, left: f32, right: f32) -> Self {
        self.left_eye_open_probability = Some(left);
        self.right_eye_open_probability = Some(right);
        self
    }
}

/// One frame's scored observation of a tracked face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub identity: FaceId,
    pub region: Region,
    pub score: u32,
}

impl Detection {
    pub fn new(identity: FaceId, region: Region, score: u32) -> Self {
        Self {
            identity,
            region,
            score,
        }
    }

    /// Builds a detection from the `index`-th observation of a detector call.
    pub fn from_observation(
        index: usize,
        observation: &FaceObservation,
        calculator: &PowerCalculator,
    ) -> Self {
        let identity = observation
            .tracking_id
            .unwrap_or_else(|| FaceId::try_from(index).unwrap_or(FaceId::MAX));
        Self::new(identity, observation.region, calculator.score(observation))
    }
}

/// Scores one detector call's observations, filling in missing tracking ids with
/// their index in the list.
pub fn into_detections(
    observations: &[FaceObservation],
    calculator: &PowerCalculator,
) -> Vec<Detection> {
    observations
        .iter()
        .enumerate()
        .map(|(index, observation)| Detection::from_observation(index, observation, calculator))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tracking_id_falls_back_to_index() {
        let calculator = PowerCalculator::new();
        let observations = vec![
            FaceObservation::new(Region::new(0.0, 0.0, 10.0, 10.0)).with_tracking_id(42),
            FaceObservation::new(Region::new(20.0, 0.0, 30.0, 10.0)),
            FaceObservation::new(Region::new(40.0, 0.0, 50.0, 10.0)),
        ];

        let detections = into_detections(&observations, &calculator);
        let ids: Vec<FaceId> = detections.iter().map(|d| d.identity).collect();
        assert_eq!(ids, vec![42, 1, 2]);
        assert_eq!(detections[2].region, observations[2].region);
    }

    #[test]
    fn test_detection_carries_calculated_score() {
        let calculator = PowerCalculator::new();
        let observation = FaceObservation::new(Region::new(0.0, 0.0, 200.0, 200.0))
            .with_tracking_id(7)
            .with_smile(0.5)
            .with_eyes_open(1.0, 1.0);

        let detection = Detection::from_observation(0, &observation, &calculator);
        assert_eq!(detection, Detection::new(7, observation.region, 1752));
    }

    #[test]
    fn test_observation_deserializes_with_optional_fields() {
        let yaml = "region: { left: 1.0, top: 2.0, right: 3.0, bottom: 4.0 }\nsmile_probability: 0.5\n";
        let observation: FaceObservation = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(observation.tracking_id, None);
        assert_eq!(observation.smile_probability, Some(0.5));
        assert_eq!(observation.left_eye_open_probability, None);
        assert_eq!(observation.region, Region::new(1.0, 2.0, 3.0, 4.0));
    }
}
