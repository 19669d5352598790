use crate::eta::Eta;
use crate::health::HealthReport;
use crate::session::{SessionSnapshot, SessionStats};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub session_id: String,
    pub tracking: bool,
    // Counters
    pub fixes_accepted: u64,
    pub fixes_rejected: u64,
    pub alarm_activations: u64,
    pub target_entries: u64,
    pub peak_speed_kmh: f64,
    // Current view
    pub current_speed: f64,
    pub speed_confidence: f64,
    pub is_near_target: bool,
    pub distance_to_target_m: Option<f64>,
    pub is_alarm_active: bool,
    pub is_alarm_manually_disabled: bool,
    pub gps_lat: Option<f64>,
    pub gps_lon: Option<f64>,
    pub eta: Option<Eta>,
    // Health
    pub gps_healthy: bool,
    pub gps_silence_duration_secs: f64,
}

impl LiveStatus {
    pub fn new(
        stats: &SessionStats,
        snapshot: &SessionSnapshot,
        health: &HealthReport,
        tracking: bool,
        uptime_seconds: u64,
    ) -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds,
            session_id: stats.session_id.clone(),
            tracking,
            fixes_accepted: stats.fixes_accepted,
            fixes_rejected: stats.fixes_rejected,
            alarm_activations: stats.alarm_activations,
            target_entries: stats.target_entries,
            peak_speed_kmh: stats.peak_speed_kmh,
            current_speed: snapshot.current_speed,
            speed_confidence: snapshot.speed_confidence,
            is_near_target: snapshot.is_near_target,
            distance_to_target_m: snapshot.distance_to_target_m,
            is_alarm_active: snapshot.is_alarm_active,
            is_alarm_manually_disabled: snapshot.is_alarm_manually_disabled,
            gps_lat: snapshot.position.map(|p| p.lat),
            gps_lon: snapshot.position.map(|p| p.lon),
            eta: snapshot.eta.clone(),
            gps_healthy: health.gps_healthy,
            gps_silence_duration_secs: health.gps_silence_secs,
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;

    #[test]
    fn test_status_reflects_snapshot_and_saves() {
        let stats = SessionStats {
            session_id: "session_1".to_string(),
            start_time: "2025-01-01T00:00:00Z".to_string(),
            fixes_accepted: 10,
            fixes_rejected: 1,
            peak_speed_kmh: 72.5,
            alarm_activations: 2,
            target_entries: 1,
        };
        let snapshot = SessionSnapshot {
            current_speed: 42.0,
            position: Some(GeoPoint::new(17.7, 83.1)),
            is_alarm_active: true,
            ..SessionSnapshot::default()
        };
        let health = HealthReport {
            gps_healthy: true,
            gps_silence_secs: 0.5,
            fixes: 10,
        };

        let status = LiveStatus::new(&stats, &snapshot, &health, true, 12);
        assert_eq!(status.gps_lat, Some(17.7));
        assert_eq!(status.alarm_activations, 2);
        assert!(status.timestamp > 0.0);

        let path = std::env::temp_dir().join(format!("live_status_{}.json", std::process::id()));
        status.save(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["current_speed"], 42.0);
        assert_eq!(json["session_id"], "session_1");
        let _ = fs::remove_file(&path);
    }
}
