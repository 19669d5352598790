use crate::alarm::{AlarmController, AlarmOutputs, AlarmPreferences, AlarmReason, ListenerId};
use crate::config::AppConfig;
use crate::error::{CompanionError, CompanionResult};
use crate::eta::Eta;
use crate::proximity::{NavigationTarget, ProximityEvent, ProximityTracker};
use crate::speed::SpeedEstimator;
use crate::speed_limit::SpeedLimitMonitor;
use crate::types::{GeoPoint, RawFix};
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Tracking session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created or stopped, fixes are ignored
    Idle,
    /// Consuming fixes
    Tracking,
}

/// Read-only view for display collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub current_speed: f64,
    pub speed_confidence: f64,
    pub is_near_target: bool,
    pub distance_to_target_m: Option<f64>,
    pub is_alarm_active: bool,
    pub is_alarm_manually_disabled: bool,
    pub position: Option<GeoPoint>,
    pub last_fix_ms: Option<i64>,
    pub eta: Option<Eta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub start_time: String,
    pub fixes_accepted: u64,
    pub fixes_rejected: u64,
    pub peak_speed_kmh: f64,
    pub alarm_activations: u64,
    pub target_entries: u64,
}

/// One tracking session: owns the estimator, the proximity and speed-limit
/// policies, and the alarm line they share.
///
/// Fixes must be fed from a single consumer in arrival order.
pub struct TrackingSession {
    session_id: String,
    start_time: String,
    state: SessionState,
    estimator: SpeedEstimator,
    proximity: ProximityTracker,
    speed_limit: SpeedLimitMonitor,
    alarm: AlarmController,
    target: Option<NavigationTarget>,
    position: Option<GeoPoint>,
    last_fix_ms: Option<i64>,
    eta: Option<Eta>,
    fixes_accepted: u64,
    fixes_rejected: u64,
    peak_speed_kmh: f64,
    target_entries: u64,
    alarm_activations: Arc<AtomicU64>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl TrackingSession {
    pub fn new(config: &AppConfig, outputs: AlarmOutputs) -> Self {
        let mut alarm = AlarmController::with_config(config.alarm.clone(), outputs);
        let alarm_activations = Arc::new(AtomicU64::new(0));
        let counter = alarm_activations.clone();
        alarm.subscribe(move |active| {
            if active {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });

        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        Self {
            session_id: format!("session_{}", Utc::now().timestamp_millis()),
            start_time: Utc::now().to_rfc3339(),
            state: SessionState::Idle,
            estimator: SpeedEstimator::with_config(config.estimator.clone()),
            proximity: ProximityTracker::with_config(&config.proximity),
            speed_limit: SpeedLimitMonitor::with_config(config.speed_limit.clone()),
            alarm,
            target: None,
            position: None,
            last_fix_ms: None,
            eta: None,
            fixes_accepted: 0,
            fixes_rejected: 0,
            peak_speed_kmh: 0.0,
            target_entries: 0,
            alarm_activations,
            snapshot_tx,
        }
    }

    /// Idle → Tracking. Clears estimator history so a stale segment never
    /// bridges the gap since the last run.
    pub fn start(&mut self) -> CompanionResult<()> {
        match self.state {
            SessionState::Tracking => Err(CompanionError::AlreadyTracking),
            SessionState::Idle => {
                self.estimator.reset();
                self.speed_limit.reset();
                self.proximity.reset();
                self.state = SessionState::Tracking;
                info!("Tracking started ({})", self.session_id);
                self.publish();
                Ok(())
            }
        }
    }

    /// Tracking → Idle. Silences the alarm and cancels its timers.
    pub fn stop(&mut self) -> CompanionResult<()> {
        match self.state {
            SessionState::Idle => Err(CompanionError::NotTracking),
            SessionState::Tracking => {
                self.alarm.stop(false);
                self.estimator.reset();
                self.speed_limit.reset();
                self.state = SessionState::Idle;
                info!("Tracking stopped ({})", self.session_id);
                self.publish();
                Ok(())
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == SessionState::Tracking
    }

    /// Process one fix and return the updated snapshot
    pub fn handle_fix(&mut self, raw: &RawFix) -> SessionSnapshot {
        if !self.is_tracking() {
            debug!("Not tracking, ignoring fix");
            return self.snapshot();
        }

        let Some(fix) = raw.validate() else {
            debug!("Rejected partial fix {:?}", raw);
            self.fixes_rejected += 1;
            return self.snapshot();
        };
        self.fixes_accepted += 1;

        let speed = self.estimator.add_fix(fix);
        self.peak_speed_kmh = self.peak_speed_kmh.max(speed);

        // Late fixes feed the estimator window but never become "current"
        let is_current = self.last_fix_ms.map_or(true, |t| fix.timestamp_ms >= t);
        if is_current {
            self.position = Some(fix.point);
            self.last_fix_ms = Some(fix.timestamp_ms);

            self.speed_limit.on_speed(speed, fix.timestamp_ms, &mut self.alarm);

            if let Some(target) = self.target {
                let event = self
                    .proximity
                    .update(fix.point, &target, fix.timestamp_ms, &mut self.alarm);
                if matches!(event, ProximityEvent::Entered { .. }) {
                    self.target_entries += 1;
                }
            }
        } else {
            debug!(
                "Out-of-order fix t={} (current t={:?})",
                fix.timestamp_ms, self.last_fix_ms
            );
        }

        self.publish()
    }

    /// New navigation target: re-arms the proximity alert and clears the
    /// manual-disable latch.
    pub fn set_target(&mut self, point: GeoPoint, radius_m: f64) {
        info!(
            "Navigation target set to ({:.5}, {:.5}), radius {:.0} m",
            point.lat, point.lon, radius_m
        );
        self.target = Some(NavigationTarget::new(point, radius_m));
        self.proximity.reset();
        self.alarm.reset();
        self.eta = None;
        self.publish();
    }

    pub fn clear_target(&mut self) {
        if self.target.take().is_some() {
            info!("Navigation target cleared");
        }
        self.proximity.reset();
        if self.alarm.reason() == Some(AlarmReason::Proximity) {
            self.alarm.stop(false);
        }
        self.eta = None;
        self.publish();
    }

    pub fn target(&self) -> Option<NavigationTarget> {
        self.target
    }

    /// First click/touch: unlock audio playback
    pub fn user_gesture(&mut self) {
        self.alarm.prime_audio();
    }

    pub fn stop_alarm(&mut self, permanent: bool) {
        self.alarm.stop(permanent);
        self.publish();
    }

    pub fn reset_alarm(&mut self) {
        self.alarm.reset();
        self.publish();
    }

    pub fn update_eta(&mut self, eta: Eta) {
        self.eta = Some(eta);
        self.publish();
    }

    pub fn set_alarm_preferences(&mut self, preferences: AlarmPreferences) {
        self.alarm.set_preferences(preferences);
    }

    pub fn set_calibration_factor(&mut self, factor: f64) -> bool {
        self.estimator.set_calibration_factor(factor)
    }

    pub fn subscribe_alarm<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.alarm.subscribe(listener)
    }

    pub fn unsubscribe_alarm(&mut self, id: ListenerId) -> bool {
        self.alarm.unsubscribe(id)
    }

    pub fn alarm(&self) -> &AlarmController {
        &self.alarm
    }

    /// Receiver that observes every published snapshot
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current_speed: self.estimator.get_speed(),
            speed_confidence: self.estimator.get_confidence(),
            is_near_target: self.target.is_some() && self.proximity.is_near(),
            distance_to_target_m: self
                .position
                .zip(self.target)
                .map(|(pos, target)| pos.distance_to(&target.point)),
            is_alarm_active: self.alarm.is_active(),
            is_alarm_manually_disabled: self.alarm.is_manually_disabled(),
            position: self.position,
            last_fix_ms: self.last_fix_ms,
            eta: self.eta.clone(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.session_id.clone(),
            start_time: self.start_time.clone(),
            fixes_accepted: self.fixes_accepted,
            fixes_rejected: self.fixes_rejected,
            peak_speed_kmh: self.peak_speed_kmh,
            alarm_activations: self.alarm_activations.load(Ordering::Relaxed),
            target_entries: self.target_entries,
        }
    }

    fn publish(&self) -> SessionSnapshot {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        if self.alarm.is_active() {
            self.alarm.stop(false);
        }
    }
}
