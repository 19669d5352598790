//! Debounced over-limit alarm with a hysteresis band.
//!
//! Above the limit for longer than the debounce window → alarm.
//! At or below `limit * clear_ratio` → overspeed timer cleared and alarm stopped.
//! Between the two thresholds nothing changes.

use crate::alarm::{AlarmController, AlarmReason};
use crate::config::SpeedLimitConfig;
use log::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeedLimitEvent {
    None,
    /// Overspeed started, debounce running
    Pending,
    Triggered,
    Cleared,
}

pub struct SpeedLimitMonitor {
    config: SpeedLimitConfig,
    overspeed_start_ms: Option<i64>,
    alarm_triggered: bool,
}

impl SpeedLimitMonitor {
    pub fn new() -> Self {
        Self::with_config(SpeedLimitConfig::default())
    }

    pub fn with_config(config: SpeedLimitConfig) -> Self {
        Self {
            config,
            overspeed_start_ms: None,
            alarm_triggered: false,
        }
    }

    pub fn limit_kmh(&self) -> f64 {
        self.config.limit_kmh
    }

    pub fn on_speed(
        &mut self,
        speed_kmh: f64,
        now_ms: i64,
        alarm: &mut AlarmController,
    ) -> SpeedLimitEvent {
        let limit = self.config.limit_kmh;

        if speed_kmh > limit {
            if self.alarm_triggered {
                return SpeedLimitEvent::None;
            }
            return match self.overspeed_start_ms {
                None => {
                    debug!("Overspeed {:.1} > {:.1} km/h, debouncing", speed_kmh, limit);
                    self.overspeed_start_ms = Some(now_ms);
                    SpeedLimitEvent::Pending
                }
                Some(start) if now_ms - start > self.config.debounce_ms => {
                    info!(
                        "Over speed limit for {} ms ({:.1} km/h), raising alarm",
                        now_ms - start,
                        speed_kmh
                    );
                    // A disabled alarm ignores this; the flag still stops retries
                    alarm.trigger(AlarmReason::Overspeed);
                    self.alarm_triggered = true;
                    SpeedLimitEvent::Triggered
                }
                Some(_) => SpeedLimitEvent::None,
            };
        }

        if speed_kmh <= limit * self.config.clear_ratio {
            self.overspeed_start_ms = None;
            if self.alarm_triggered {
                info!("Speed back to {:.1} km/h, clearing overspeed alarm", speed_kmh);
                alarm.stop(false);
                self.alarm_triggered = false;
                return SpeedLimitEvent::Cleared;
            }
        }

        SpeedLimitEvent::None
    }

    pub fn is_alarm_triggered(&self) -> bool {
        self.alarm_triggered
    }

    pub fn overspeed_since(&self) -> Option<i64> {
        self.overspeed_start_ms
    }

    pub fn reset(&mut self) {
        self.overspeed_start_ms = None;
        self.alarm_triggered = false;
    }
}

impl Default for SpeedLimitMonitor {
    fn default() -> Self {
        Self::new()
    }
}
