//! Sliding-window speed estimation from noisy GPS fixes.
//!
//! Two paths feed the same physics limiter:
//! - a device-reported speed, blended with the previous estimate, when present and plausible
//! - otherwise a weighted average of segment speeds over the recent location window,
//!   weighted by recency² and by fix accuracy
//!
//! The output never moves faster than `max_acceleration` allows between two
//! emissions, which rejects GPS teleports while keeping hard braking visible.

use crate::config::EstimatorConfig;
use crate::geo::haversine_distance;
use crate::types::{GeoFix, RawFix, SpeedSample};
use log::debug;
use std::collections::VecDeque;

const MS_TO_KMH: f64 = 3.6;
/// Confidence assigned to sensor speeds without an accuracy figure
const DEFAULT_SENSOR_CONFIDENCE: f64 = 0.7;
/// Assumed accuracy (m) of fixes that do not report one
const DEFAULT_ACCURACY_M: f64 = 100.0;
const REFERENCE_ACCURACY_M: f64 = 10.0;

pub const MIN_CALIBRATION: f64 = 0.5;
pub const MAX_CALIBRATION: f64 = 1.5;

pub struct SpeedEstimator {
    config: EstimatorConfig,
    locations: VecDeque<GeoFix>,
    samples: VecDeque<SpeedSample>,
    last_speed: f64,
    last_timestamp: Option<i64>,
    calibration: f64,
}

impl SpeedEstimator {
    pub fn new() -> Self {
        Self::with_config(EstimatorConfig::default())
    }

    pub fn with_config(config: EstimatorConfig) -> Self {
        let capacity = config.window_size.max(2);
        SpeedEstimator {
            config,
            locations: VecDeque::with_capacity(capacity),
            samples: VecDeque::with_capacity(capacity),
            last_speed: 0.0,
            last_timestamp: None,
            calibration: 1.0,
        }
    }

    /// Feed a raw fix and return the current speed in km/h (one decimal).
    ///
    /// Partial fixes are ignored and the previous speed is returned.
    pub fn add_location(&mut self, raw: &RawFix) -> f64 {
        match raw.validate() {
            Some(fix) => self.add_fix(fix),
            None => {
                debug!("Ignoring partial fix {:?}", raw);
                self.last_speed
            }
        }
    }

    pub fn add_fix(&mut self, fix: GeoFix) -> f64 {
        let capacity = self.window_capacity();
        push_bounded(&mut self.locations, fix, capacity);

        let dt = match self.last_timestamp {
            Some(prev_ts) => {
                let dt = (fix.timestamp_ms - prev_ts) as f64 / 1000.0;
                if dt <= 0.0 {
                    debug!("Non-increasing timestamp ({} -> {}), holding speed", prev_ts, fix.timestamp_ms);
                    return self.last_speed;
                }
                Some(dt)
            }
            None => None,
        };

        // Candidates are calibrated before limiting, so the cap always
        // applies between two emitted values
        let candidate = match self.sensor_speed(&fix) {
            Some(sensor) => {
                let confidence = fix
                    .accuracy
                    .map(|a| (REFERENCE_ACCURACY_M / a).min(1.0))
                    .unwrap_or(DEFAULT_SENSOR_CONFIDENCE);
                self.record_sample(sensor, fix.timestamp_ms, confidence);

                let sensor = sensor * self.calibration;
                if dt.is_some() {
                    let blend = self.config.sensor_blend;
                    blend * sensor + (1.0 - blend) * self.last_speed
                } else {
                    sensor
                }
            }
            None if self.locations.len() < 2 => 0.0,
            None => match self.weighted_segment_speed(fix.timestamp_ms) {
                Some((speed, confidence)) => {
                    self.record_sample(speed, fix.timestamp_ms, confidence);
                    speed * self.calibration
                }
                None => {
                    debug!("No usable segments at t={}", fix.timestamp_ms);
                    // Re-anchor the limiter clock so the held value counts as an emission
                    self.last_timestamp = Some(fix.timestamp_ms);
                    return self.last_speed;
                }
            },
        };

        let limited = match dt {
            Some(dt) => {
                let max_delta = (self.config.max_acceleration * dt * MS_TO_KMH).max(0.0);
                let delta = candidate - self.last_speed;
                if delta.abs() > max_delta {
                    debug!(
                        "Clamping speed step {:.1} km/h to ±{:.1} km/h over {:.2}s",
                        delta, max_delta, dt
                    );
                }
                self.last_speed + delta.clamp(-max_delta, max_delta)
            }
            None => candidate,
        };

        let speed = round_tenth(limited.max(0.0));
        self.last_speed = speed;
        self.last_timestamp = Some(fix.timestamp_ms);
        speed
    }

    /// Last emitted speed without recomputation
    pub fn get_speed(&self) -> f64 {
        self.last_speed
    }

    /// Mean confidence over retained speed samples, 0 when empty
    pub fn get_confidence(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.confidence).sum::<f64>() / self.samples.len() as f64
    }

    /// Accepts factors strictly inside (0.5, 1.5); anything else is ignored
    pub fn set_calibration_factor(&mut self, factor: f64) -> bool {
        if factor > MIN_CALIBRATION && factor < MAX_CALIBRATION {
            self.calibration = factor;
            true
        } else {
            debug!("Rejected calibration factor {}", factor);
            false
        }
    }

    pub fn calibration_factor(&self) -> f64 {
        self.calibration
    }

    /// Clear all history. Calibration is configuration and survives.
    pub fn reset(&mut self) {
        self.locations.clear();
        self.samples.clear();
        self.last_speed = 0.0;
        self.last_timestamp = None;
    }

    pub fn history_len(&self) -> usize {
        self.locations.len()
    }

    pub fn samples(&self) -> impl Iterator<Item = &SpeedSample> {
        self.samples.iter()
    }

    fn window_capacity(&self) -> usize {
        self.config.window_size.max(2)
    }

    fn sensor_speed(&self, fix: &GeoFix) -> Option<f64> {
        fix.speed
            .filter(|s| *s >= 0.0 && *s < self.config.max_sensor_speed_kmh)
    }

    fn record_sample(&mut self, speed: f64, timestamp: i64, confidence: f64) {
        let capacity = self.window_capacity();
        push_bounded(
            &mut self.samples,
            SpeedSample {
                speed,
                timestamp,
                confidence: confidence.clamp(0.0, 1.0),
            },
            capacity,
        );
    }

    /// Weighted mean of adjacent-segment speeds, with the matching
    /// weighted accuracy factor as confidence. `None` if every segment was
    /// too short to trust.
    fn weighted_segment_speed(&self, now_ms: i64) -> Option<(f64, f64)> {
        let min_segment_ms = self.config.min_segment_ms.max(1);
        let horizon_ms = self.config.recency_horizon_ms.max(1.0);
        let mut weighted_speed = 0.0;
        let mut weighted_accuracy = 0.0;
        let mut total_weight = 0.0;

        for (a, b) in self.locations.iter().zip(self.locations.iter().skip(1)) {
            let elapsed_ms = b.timestamp_ms - a.timestamp_ms;
            if elapsed_ms < min_segment_ms {
                continue;
            }

            let distance = haversine_distance(a.point, b.point);
            let segment_speed = distance / (elapsed_ms as f64 / 1000.0) * MS_TO_KMH;

            let age_ms = (now_ms - b.timestamp_ms) as f64;
            let recency = (1.0 - age_ms / horizon_ms).clamp(0.1, 1.0);
            let worst_accuracy = a
                .accuracy
                .unwrap_or(DEFAULT_ACCURACY_M)
                .max(b.accuracy.unwrap_or(DEFAULT_ACCURACY_M));
            let accuracy_factor = (REFERENCE_ACCURACY_M / worst_accuracy).min(1.0);
            let weight = recency.powi(2) * (0.6 + 0.4 * accuracy_factor);

            weighted_speed += segment_speed * weight;
            weighted_accuracy += accuracy_factor * weight;
            total_weight += weight;
        }

        if total_weight > 0.0 {
            Some((weighted_speed / total_weight, weighted_accuracy / total_weight))
        } else {
            None
        }
    }
}

impl Default for SpeedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded<T>(window: &mut VecDeque<T>, value: T, capacity: usize) {
    window.push_back(value);
    while window.len() > capacity {
        window.pop_front();
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;
    use approx::assert_relative_eq;

    const ORIGIN: GeoPoint = GeoPoint {
        lat: 17.70978,
        lon: 83.16595,
    };

    fn fix_at(point: GeoPoint, timestamp: i64) -> RawFix {
        RawFix::new(point.lat, point.lon, timestamp).with_accuracy(5.0)
    }

    #[test]
    fn test_first_derived_fix_is_zero() {
        let mut estimator = SpeedEstimator::new();
        assert_eq!(estimator.add_location(&fix_at(ORIGIN, 0)), 0.0);
        assert_eq!(estimator.history_len(), 1);
    }

    #[test]
    fn test_first_sensor_fix_is_unblended() {
        let mut estimator = SpeedEstimator::new();
        let speed = estimator.add_location(&fix_at(ORIGIN, 0).with_speed(42.0));
        assert_eq!(speed, 42.0);
    }

    #[test]
    fn test_sensor_blends_with_prior_estimate() {
        let mut estimator = SpeedEstimator::new();
        estimator.add_location(&fix_at(ORIGIN, 0).with_speed(40.0));
        let speed = estimator.add_location(&fix_at(ORIGIN, 1_000).with_speed(50.0));
        // 0.7 * 50 + 0.3 * 40
        assert_relative_eq!(speed, 47.0);
    }

    #[test]
    fn test_sensor_jump_is_rate_limited() {
        let mut estimator = SpeedEstimator::new();
        estimator.add_location(&fix_at(ORIGIN, 0).with_speed(0.0));
        let speed = estimator.add_location(&fix_at(ORIGIN, 1_000).with_speed(150.0));
        // 5 m/s² for 1 s = 18 km/h
        assert_relative_eq!(speed, 18.0);
    }

    #[test]
    fn test_implausible_sensor_speed_uses_derived_path() {
        let mut estimator = SpeedEstimator::new();
        estimator.add_location(&fix_at(ORIGIN, 0));
        let speed = estimator.add_location(&fix_at(ORIGIN, 1_000).with_speed(250.0));
        assert_eq!(speed, 0.0);
        assert_eq!(estimator.samples().count(), 1);
        assert!(estimator.samples().all(|s| s.speed == 0.0));
    }

    #[test]
    fn test_sensor_confidence_from_accuracy() {
        let mut estimator = SpeedEstimator::new();
        estimator.add_location(&RawFix::new(ORIGIN.lat, ORIGIN.lon, 0).with_accuracy(20.0).with_speed(30.0));
        assert_relative_eq!(estimator.get_confidence(), 0.5);

        estimator.add_location(&RawFix::new(ORIGIN.lat, ORIGIN.lon, 1_000).with_speed(30.0));
        // mean of 0.5 and the 0.7 default
        assert_relative_eq!(estimator.get_confidence(), 0.6);
    }

    #[test]
    fn test_partial_fix_is_ignored() {
        let mut estimator = SpeedEstimator::new();
        estimator.add_location(&fix_at(ORIGIN, 0).with_speed(30.0));

        let mut partial = fix_at(ORIGIN, 1_000).with_speed(90.0);
        partial.longitude = None;
        assert_eq!(estimator.add_location(&partial), 30.0);
        assert_eq!(estimator.history_len(), 1);
        assert_eq!(estimator.samples().count(), 1);
    }

    #[test]
    fn test_duplicate_timestamp_holds_speed() {
        let mut estimator = SpeedEstimator::new();
        estimator.add_location(&fix_at(ORIGIN, 1_000).with_speed(30.0));
        let speed = estimator.add_location(&fix_at(ORIGIN, 1_000).with_speed(60.0));
        assert_eq!(speed, 30.0);

        // Older fix delivered late by a retry
        let speed = estimator.add_location(&fix_at(ORIGIN, 500).with_speed(60.0));
        assert_eq!(speed, 30.0);
    }

    #[test]
    fn test_short_segments_are_skipped() {
        let mut estimator = SpeedEstimator::new();
        estimator.add_location(&fix_at(ORIGIN, 0));
        // 100 m in 100 ms would be 3600 km/h; treated as a duplicate reading
        let speed = estimator.add_location(&fix_at(ORIGIN.destination(0.0, 100.0), 100));
        assert_eq!(speed, 0.0);
        assert_eq!(estimator.samples().count(), 0);
    }

    #[test]
    fn test_recent_segments_dominate() {
        let mut estimator = SpeedEstimator::new();
        let p1 = ORIGIN.destination(0.0, 10.0);
        let p2 = p1.destination(0.0, 30.0);
        estimator.locations.push_back(fix_at(ORIGIN, 0).validate().unwrap());
        estimator.locations.push_back(fix_at(p1, 1_000).validate().unwrap());
        estimator.locations.push_back(fix_at(p2, 2_000).validate().unwrap());

        let (speed, confidence) = estimator.weighted_segment_speed(2_000).unwrap();
        // Segments run at 36 and 108 km/h; plain mean would be 72
        assert!(speed > 72.0 && speed < 108.0);
        assert_relative_eq!(speed, (36.0 * 0.64 + 108.0) / 1.64, epsilon = 1e-6);
        assert_relative_eq!(confidence, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_accuracy_lowers_confidence() {
        let mut estimator = SpeedEstimator::new();
        estimator.add_location(&RawFix::new(ORIGIN.lat, ORIGIN.lon, 0));
        let next = ORIGIN.destination(90.0, 5.0);
        estimator.add_location(&RawFix::new(next.lat, next.lon, 1_000));
        assert_relative_eq!(estimator.get_confidence(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut estimator = SpeedEstimator::new();
        let mut point = ORIGIN;
        for i in 0..20 {
            point = point.destination(0.0, 5.0);
            estimator.add_location(&fix_at(point, i * 1_000));
        }
        assert_eq!(estimator.history_len(), 8);
        assert_eq!(estimator.samples().count(), 8);
    }

    #[test]
    fn test_calibration_band() {
        let mut estimator = SpeedEstimator::new();
        assert!(!estimator.set_calibration_factor(0.5));
        assert!(!estimator.set_calibration_factor(1.5));
        assert!(!estimator.set_calibration_factor(f64::NAN));
        assert_eq!(estimator.calibration_factor(), 1.0);

        assert!(estimator.set_calibration_factor(1.1));
        let speed = estimator.add_location(&fix_at(ORIGIN, 0).with_speed(50.0));
        assert_relative_eq!(speed, 55.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut estimator = SpeedEstimator::new();
        estimator.add_location(&fix_at(ORIGIN, 0).with_speed(50.0));
        estimator.add_location(&fix_at(ORIGIN, 1_000).with_speed(55.0));

        estimator.reset();
        assert_eq!(estimator.get_speed(), 0.0);
        assert_eq!(estimator.get_confidence(), 0.0);
        assert_eq!(estimator.history_len(), 0);

        // No blend and no physics limit against the pre-reset state
        let speed = estimator.add_location(&fix_at(ORIGIN, 500).with_speed(90.0));
        assert_eq!(speed, 90.0);
    }

    #[test]
    fn test_physics_bound_holds_for_noisy_sequence() {
        assert_physics_bound(SpeedEstimator::new());
    }

    #[test]
    fn test_physics_bound_holds_when_calibrated() {
        for factor in [0.6, 1.4] {
            let mut estimator = SpeedEstimator::new();
            assert!(estimator.set_calibration_factor(factor));
            assert_physics_bound(estimator);
        }
    }

    fn assert_physics_bound(mut estimator: SpeedEstimator) {
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (seed >> 33) as f64 / (1u64 << 31) as f64
        };

        let mut point = ORIGIN;
        let mut t = 0i64;
        let mut previous: Option<(f64, i64)> = None;
        for _ in 0..200 {
            t += 100 + (next() * 2_000.0) as i64;
            point = point.destination(next() * 360.0, next() * 120.0);
            let mut raw = RawFix::new(point.lat, point.lon, t).with_accuracy(3.0 + next() * 40.0);
            if next() > 0.5 {
                raw = raw.with_speed(next() * 180.0);
            }

            let speed = estimator.add_location(&raw);
            if let Some((prev_speed, prev_t)) = previous {
                let dt = (t - prev_t) as f64 / 1000.0;
                // rounding to one decimal can add 0.05
                assert!((speed - prev_speed).abs() <= 5.0 * 3.6 * dt + 0.05 + 1e-9);
            }
            previous = Some((speed, t));
        }
    }

    #[test]
    fn test_calibration_does_not_compound() {
        let mut estimator = SpeedEstimator::new();
        estimator.set_calibration_factor(1.4);

        // Steady 50 km/h on the derived path, one fix per second
        let mut point = ORIGIN;
        let mut speeds = Vec::new();
        for i in 0..40 {
            if i > 0 {
                point = point.destination(0.0, 50.0 / 3.6);
            }
            speeds.push(estimator.add_location(&fix_at(point, i * 1_000)));
        }

        for pair in speeds.windows(2) {
            assert!((pair[1] - pair[0]).abs() <= 18.0 + 0.05 + 1e-9);
        }
        assert_relative_eq!(*speeds.last().unwrap(), 70.0, epsilon = 0.2);
    }

    #[test]
    fn test_calibrated_sensor_path_respects_cap() {
        let mut estimator = SpeedEstimator::new();
        estimator.set_calibration_factor(1.4);

        let first = estimator.add_location(&fix_at(ORIGIN, 0).with_speed(100.0));
        assert_relative_eq!(first, 140.0);
        for i in 1..50 {
            let prev = estimator.get_speed();
            let speed = estimator.add_location(&fix_at(ORIGIN, i * 100).with_speed(100.0));
            // 5 m/s² over 100 ms
            assert!((speed - prev).abs() <= 1.8 + 0.05 + 1e-9);
            assert_relative_eq!(speed, 140.0);
        }
    }

    #[test]
    fn test_late_fix_leaves_confidence_alone() {
        let mut estimator = SpeedEstimator::new();
        estimator.add_location(&fix_at(ORIGIN, 1_000).with_speed(30.0));
        let confidence = estimator.get_confidence();

        estimator.add_location(&RawFix::new(ORIGIN.lat, ORIGIN.lon, 1_000).with_accuracy(40.0).with_speed(60.0));
        estimator.add_location(&RawFix::new(ORIGIN.lat, ORIGIN.lon, 500).with_accuracy(40.0).with_speed(60.0));

        assert_eq!(estimator.get_confidence(), confidence);
        assert_eq!(estimator.samples().count(), 1);
    }

    #[test]
    fn test_degenerate_config_never_panics() {
        let mut estimator = SpeedEstimator::with_config(EstimatorConfig {
            max_acceleration: f64::NAN,
            recency_horizon_ms: 0.0,
            ..EstimatorConfig::default()
        });
        let mut point = ORIGIN;
        for i in 0..5 {
            point = point.destination(90.0, 10.0);
            let speed = estimator.add_location(&fix_at(point, i * 1_000).with_speed(40.0));
            assert!(speed.is_finite());
        }

        let mut negative = SpeedEstimator::with_config(EstimatorConfig {
            max_acceleration: -5.0,
            ..EstimatorConfig::default()
        });
        negative.add_location(&fix_at(ORIGIN, 0).with_speed(40.0));
        assert_eq!(negative.add_location(&fix_at(ORIGIN, 1_000).with_speed(80.0)), 40.0);
    }
}
