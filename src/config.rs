//! Tunable constants for the estimation pipeline.
//!
//! Defaults are the tuned production values. Every struct deserializes
//! with `#[serde(default)]` so a config file only needs the keys it changes.

use crate::error::{CompanionError, CompanionResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Capacity of both the location and the speed-sample windows
    pub window_size: usize,
    /// Segments shorter than this are treated as duplicate readings
    pub min_segment_ms: i64,
    /// Age at which a segment's recency weight bottoms out
    pub recency_horizon_ms: f64,
    /// m/s², ~18 km/h per second
    pub max_acceleration: f64,
    /// Share of the sensor speed when blending with the prior estimate
    pub sensor_blend: f64,
    /// Sensor speeds at or above this are ignored (km/h)
    pub max_sensor_speed_kmh: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window_size: 8,
            min_segment_ms: 150,
            recency_horizon_ms: 5_000.0,
            max_acceleration: 5.0,
            sensor_blend: 0.7,
            max_sensor_speed_kmh: 200.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    pub radius_m: f64,
    pub throttle_ms: i64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            radius_m: 500.0,
            throttle_ms: 2_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedLimitConfig {
    pub limit_kmh: f64,
    /// Overspeed must persist strictly longer than this before alarming
    pub debounce_ms: i64,
    /// Alarm clears once speed falls to `limit_kmh * clear_ratio`
    pub clear_ratio: f64,
}

impl Default for SpeedLimitConfig {
    fn default() -> Self {
        Self {
            limit_kmh: 60.0,
            debounce_ms: 2_000,
            clear_ratio: 0.95,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub pulse_ms: u64,
    pub gap_ms: u64,
    pub pulses: usize,
    pub repeat_ms: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            pulse_ms: 500,
            gap_ms: 200,
            pulses: 3,
            repeat_ms: 2_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtaConfig {
    pub refresh_secs: u64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self { refresh_secs: 5 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub estimator: EstimatorConfig,
    pub proximity: ProximityConfig,
    pub speed_limit: SpeedLimitConfig,
    pub alarm: AlarmConfig,
    pub eta: EtaConfig,
}

impl AppConfig {
    pub fn from_json(json: &str) -> CompanionResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CompanionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> CompanionResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject tunables the estimation and alarm paths cannot run with.
    /// Call again after applying overrides.
    pub fn validate(&self) -> CompanionResult<()> {
        let e = &self.estimator;
        positive("estimator.max_acceleration", e.max_acceleration)?;
        positive("estimator.recency_horizon_ms", e.recency_horizon_ms)?;
        positive("estimator.max_sensor_speed_kmh", e.max_sensor_speed_kmh)?;
        if !(0.0..=1.0).contains(&e.sensor_blend) {
            return Err(invalid("estimator.sensor_blend", e.sensor_blend, "must be in [0, 1]"));
        }
        if e.window_size < 2 {
            return Err(CompanionError::Config(format!(
                "estimator.window_size = {} must be at least 2",
                e.window_size
            )));
        }
        if e.min_segment_ms < 0 {
            return Err(CompanionError::Config(
                "estimator.min_segment_ms must not be negative".to_string(),
            ));
        }

        positive("proximity.radius_m", self.proximity.radius_m)?;
        if self.proximity.throttle_ms < 0 {
            return Err(CompanionError::Config(
                "proximity.throttle_ms must not be negative".to_string(),
            ));
        }

        let limit = &self.speed_limit;
        positive("speed_limit.limit_kmh", limit.limit_kmh)?;
        if !(limit.clear_ratio > 0.0 && limit.clear_ratio <= 1.0) {
            return Err(invalid("speed_limit.clear_ratio", limit.clear_ratio, "must be in (0, 1]"));
        }
        if limit.debounce_ms < 0 {
            return Err(CompanionError::Config(
                "speed_limit.debounce_ms must not be negative".to_string(),
            ));
        }

        if self.eta.refresh_secs == 0 {
            return Err(CompanionError::Config(
                "eta.refresh_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: f64, rule: &str) -> CompanionError {
    CompanionError::Config(format!("{} = {} {}", name, value, rule))
}

fn positive(name: &str, value: f64) -> CompanionResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, value, "must be finite and positive"))
    }
}
