// THEORY:
// The `power_calculator` turns the raw attributes of a single detection into the
// scalar sample the lifecycle layer averages over time. It is the only place where
// detector attributes (face size, smile, open eyes) are interpreted.
//
// The formula is deliberately simple and entirely deterministic:
//   base        = max(10, floor(area / 1000))
//   smile bonus = floor(smile * 100)
//   focus bonus = floor(mean(left eye, right eye) * 150)
//   power       = clamp(floor((base + smile + focus) * 7.3), 100, 99999)
//
// Missing probabilities count as zero. Probabilities outside [0, 1] are not checked;
// whatever arrives is folded through saturating integer conversions, so the result
// always lands inside the clamp range even for NaN or infinite inputs.

use crate::core_modules::detection::FaceObservation;
use crate::core_modules::region::Region;

/// The lowest power a detection can ever report.
pub const MIN_POWER: u32 = 100;
/// The highest power a detection can ever report.
pub const MAX_POWER: u32 = 99_999;

const BASE_FLOOR: i64 = 10;
const AREA_DIVISOR: f32 = 1000.0;
const SMILE_WEIGHT: f32 = 100.0;
const FOCUS_WEIGHT: f32 = 150.0;
const POWER_SCALE: f64 = 7.3;

/// Computes the power level of a single detection.
pub fn calculate_power(
    region: &Region,
    smile_probability: Option<f32>,
    left_eye_open_probability: Option<f32>,
    right_eye_open_probability: Option<f32>,
) -> u32 {
    let base = ((region.area() / AREA_DIVISOR).floor() as i64).max(BASE_FLOOR);
    let smile_bonus = (smile_probability.unwrap_or(0.0) * SMILE_WEIGHT).floor() as i64;
    let eyes_open =
        (left_eye_open_probability.unwrap_or(0.0) + right_eye_open_probability.unwrap_or(0.0)) / 2.0;
    let focus_bonus = (eyes_open * FOCUS_WEIGHT).floor() as i64;

    let raw = base.saturating_add(smile_bonus).saturating_add(focus_bonus);
    let scaled = (raw as f64 * POWER_SCALE).floor() as i64;
    scaled.clamp(MIN_POWER as i64, MAX_POWER as i64) as u32
}

/// Stateless handle around [`calculate_power`], handed to whoever converts raw
/// detector output into scored detections.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerCalculator;

impl PowerCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn calculate(
        &self,
        region: &Region,
        smile_probability: Option<f32>,
        left_eye_open_probability: Option<f32>,
        right_eye_open_probability: Option<f32>,
    ) -> u32 {
        calculate_power(
            region,
            smile_probability,
            left_eye_open_probability,
            right_eye_open_probability,
        )
    }

    /// Scores a raw detector observation.
    pub fn score(&self, observation: &FaceObservation) -> u32 {
        self.calculate(
            &observation.region,
            observation.smile_probability,
            observation.left_eye_open_probability,
            observation.right_eye_open_probability,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_reference_values() {
        // area 40000 -> base 40, smile 50, focus 150, raw 240
        let region = Region::new(0.0, 0.0, 200.0, 200.0);
        assert_eq!(calculate_power(&region, Some(0.5), Some(1.0), Some(1.0)), 1752);

        // area 10000 -> base 10, smile 25, focus floor(112.5) = 112, raw 147
        let region = Region::new(50.0, 50.0, 150.0, 150.0);
        assert_eq!(calculate_power(&region, Some(0.25), Some(0.5), Some(1.0)), 1073);
    }

    #[test]
    fn test_missing_attributes_hit_the_floor() {
        let region = Region::new(0.0, 0.0, 10.0, 10.0);
        // base 10 -> 73, clamped up to the minimum.
        assert_eq!(calculate_power(&region, None, None, None), MIN_POWER);
    }

    #[test]
    fn test_inverted_region_scores_like_empty_one() {
        let inverted = Region::new(300.0, 300.0, 0.0, 0.0);
        let empty = Region::default();
        assert_eq!(
            calculate_power(&inverted, Some(1.0), Some(1.0), Some(1.0)),
            calculate_power(&empty, Some(1.0), Some(1.0), Some(1.0)),
        );
    }

    #[test]
    fn test_clamp_holds_for_extreme_inputs() {
        let huge = Region::new(0.0, 0.0, 1.0e6, 1.0e6);
        assert_eq!(calculate_power(&huge, Some(1.0), Some(1.0), Some(1.0)), MAX_POWER);

        let infinite = Region::new(f32::NEG_INFINITY, 0.0, f32::INFINITY, f32::INFINITY);
        let power = calculate_power(&infinite, Some(f32::MAX), Some(f32::MAX), Some(f32::MAX));
        assert_eq!(power, MAX_POWER);

        let nan = Region::new(f32::NAN, f32::NAN, f32::NAN, f32::NAN);
        let power = calculate_power(&nan, Some(f32::NAN), None, Some(-5.0));
        assert!((MIN_POWER..=MAX_POWER).contains(&power));
    }

    #[test]
    fn test_calculator_scores_observation() {
        let observation = FaceObservation::new(Region::new(0.0, 0.0, 200.0, 200.0))
            .with_smile(0.5)
            .with_eyes_open(1.0, 1.0);
        assert_eq!(PowerCalculator::new().score(&observation), 1752);
    }
}
