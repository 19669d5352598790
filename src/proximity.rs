//! Near-destination detection with a once-per-session alert.
//!
//! The alert fires on the first entry into the target radius. Leaving and
//! re-entering does not re-arm it; only [`ProximityTracker::reset`] does.

use crate::alarm::{AlarmController, AlarmReason};
use crate::config::ProximityConfig;
use crate::geo::{haversine_distance, is_near};
use crate::types::GeoPoint;
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationTarget {
    pub point: GeoPoint,
    pub radius_m: f64,
}

impl NavigationTarget {
    pub fn new(point: GeoPoint, radius_m: f64) -> Self {
        Self { point, radius_m }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProximityEvent {
    /// Skipped, evaluated too recently
    Throttled,
    Unchanged,
    /// Crossed into the radius; `alarmed` when this entry fired the alarm
    Entered { alarmed: bool },
    Exited,
}

pub struct ProximityTracker {
    throttle_ms: i64,
    is_near_previous: bool,
    has_alerted_once: bool,
    last_evaluated_ms: Option<i64>,
    last_distance_m: Option<f64>,
}

impl ProximityTracker {
    pub fn new() -> Self {
        Self::with_config(&ProximityConfig::default())
    }

    pub fn with_config(config: &ProximityConfig) -> Self {
        Self {
            throttle_ms: config.throttle_ms.max(0),
            is_near_previous: false,
            has_alerted_once: false,
            last_evaluated_ms: None,
            last_distance_m: None,
        }
    }

    pub fn update(
        &mut self,
        position: GeoPoint,
        target: &NavigationTarget,
        now_ms: i64,
        alarm: &mut AlarmController,
    ) -> ProximityEvent {
        let near_now = is_near(position, target.point, target.radius_m);
        if let Some(last) = self.last_evaluated_ms {
            // A clock that went backwards re-anchors instead of stalling.
            // Only fixes that keep the near/far state are rate-limited.
            let throttled = now_ms >= last && now_ms - last < self.throttle_ms;
            if throttled && near_now == self.is_near_previous {
                return ProximityEvent::Throttled;
            }
        }
        self.last_evaluated_ms = Some(now_ms);

        let distance = haversine_distance(position, target.point);
        self.last_distance_m = Some(distance);

        match (self.is_near_previous, near_now) {
            (false, true) => {
                self.is_near_previous = true;
                info!("Entered target radius ({:.0} m from target)", distance);

                let alarmed = if self.has_alerted_once {
                    debug!("Already alerted this session, not re-arming");
                    false
                } else if alarm.is_manually_disabled() {
                    debug!("Alarms manually disabled, proximity alert suppressed");
                    false
                } else {
                    alarm.trigger(AlarmReason::Proximity);
                    self.has_alerted_once = true;
                    true
                };
                ProximityEvent::Entered { alarmed }
            }
            (true, false) => {
                self.is_near_previous = false;
                info!("Left target radius ({:.0} m from target)", distance);
                ProximityEvent::Exited
            }
            _ => ProximityEvent::Unchanged,
        }
    }

    pub fn is_near(&self) -> bool {
        self.is_near_previous
    }

    pub fn has_alerted_once(&self) -> bool {
        self.has_alerted_once
    }

    pub fn last_distance_m(&self) -> Option<f64> {
        self.last_distance_m
    }

    pub fn reset(&mut self) {
        self.is_near_previous = false;
        self.has_alerted_once = false;
        self.last_evaluated_ms = None;
        self.last_distance_m = None;
    }
}

impl Default for ProximityTracker {
    fn default() -> Self {
        Self::new()
    }
}
