use serde::{Deserialize, Serialize};

/// WGS84 position in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Position fix as delivered by the platform geolocation API.
///
/// Latitude, longitude and timestamp are optional here because partial
/// deliveries happen in practice; use [`RawFix::validate`] before feeding
/// anything downstream.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>, // meters, smaller is better
    pub speed: Option<f64>,    // km/h from the device sensor
    pub timestamp: Option<i64>, // epoch ms
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            accuracy: None,
            speed: None,
            timestamp: Some(timestamp),
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_speed(mut self, speed_kmh: f64) -> Self {
        self.speed = Some(speed_kmh);
        self
    }

    /// Returns `None` when a required field is missing or not finite
    pub fn validate(&self) -> Option<GeoFix> {
        let lat = self.latitude.filter(|v| v.is_finite())?;
        let lon = self.longitude.filter(|v| v.is_finite())?;
        let timestamp_ms = self.timestamp?;

        Some(GeoFix {
            point: GeoPoint::new(lat, lon),
            accuracy: self.accuracy.filter(|a| a.is_finite() && *a > 0.0),
            speed: self.speed.filter(|s| s.is_finite()),
            timestamp_ms,
        })
    }
}

/// Validated position fix
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub point: GeoPoint,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub speed: f64, // km/h
    pub timestamp: i64,
    pub confidence: f64, // [0, 1]
}
