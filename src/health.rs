use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration, Instant};

pub const DEFAULT_GPS_SILENCE_SECS: u64 = 30;

/// Tracks whether fixes are still arriving.
///
/// While silent the estimator holds its last value, so the displayed speed
/// is frozen rather than zero.
#[derive(Clone, Debug)]
pub struct FixHealth {
    last_update: Arc<Mutex<Instant>>,
    fixes: Arc<AtomicU64>,
    silence_threshold: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HealthReport {
    pub gps_healthy: bool,
    pub gps_silence_secs: f64,
    pub fixes: u64,
}

impl FixHealth {
    pub fn new(silence_threshold_secs: u64) -> Self {
        FixHealth {
            last_update: Arc::new(Mutex::new(Instant::now())),
            fixes: Arc::new(AtomicU64::new(0)),
            silence_threshold: Duration::from_secs(silence_threshold_secs),
        }
    }

    pub fn update(&self) {
        if let Ok(mut time) = self.last_update.lock() {
            *time = Instant::now();
        }
        self.fixes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn time_since_last_update(&self) -> Option<Duration> {
        self.last_update.lock().ok().map(|t| t.elapsed())
    }

    pub fn is_silent(&self) -> bool {
        self.time_since_last_update()
            .map(|d| d > self.silence_threshold)
            .unwrap_or(false)
    }

    pub fn fix_count(&self) -> u64 {
        self.fixes.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> HealthReport {
        HealthReport {
            gps_healthy: !self.is_silent(),
            gps_silence_secs: self
                .time_since_last_update()
                .unwrap_or_default()
                .as_secs_f64(),
            fixes: self.fix_count(),
        }
    }

    pub fn format_status(&self) -> String {
        let report = self.check();
        if report.gps_healthy {
            format!("GPS ✓ ({} fixes)", report.fixes)
        } else {
            format!("GPS ⚠ (silent {:.1}s, speed frozen)", report.gps_silence_secs)
        }
    }
}

impl Default for FixHealth {
    fn default() -> Self {
        Self::new(DEFAULT_GPS_SILENCE_SECS)
    }
}

/// Periodically log silence transitions. Runs until the task is aborted.
pub async fn health_monitor_task(health: FixHealth, check_interval: Duration) {
    let mut was_silent = false;
    loop {
        sleep(check_interval).await;

        let report = health.check();
        let silent = !report.gps_healthy;
        if silent && !was_silent {
            warn!(
                "[health] GPS silent for {:.1}s, displayed speed is frozen",
                report.gps_silence_secs
            );
        } else if !silent && was_silent {
            info!("[health] GPS fixes resumed");
        }
        was_silent = silent;
    }
}
