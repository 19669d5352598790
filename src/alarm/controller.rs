use super::outputs::AlarmOutputs;
use super::timer::RepeatTask;
use crate::config::AlarmConfig;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmState {
    /// Not sounding, accepting triggers
    Idle,
    /// Audio and vibration active
    Sounding,
    /// Silenced by the user until `reset`
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmReason {
    Proximity,
    Overspeed,
}

impl AlarmReason {
    fn notification(&self) -> (&'static str, &'static str) {
        match self {
            AlarmReason::Proximity => ("Approaching destination", "You are near your destination."),
            AlarmReason::Overspeed => ("Slow down", "You are driving above the speed limit."),
        }
    }
}

impl Display for AlarmReason {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AlarmReason::Proximity => write!(f, "proximity"),
            AlarmReason::Overspeed => write!(f, "overspeed"),
        }
    }
}

/// User-facing alarm preferences, loaded from persisted settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmPreferences {
    pub sound_muted: bool,
    /// 0 disables haptics, 1 is full-length pulses
    pub vibration_intensity: f64,
}

impl Default for AlarmPreferences {
    fn default() -> Self {
        Self {
            sound_muted: false,
            vibration_intensity: 1.0,
        }
    }
}

pub type ListenerId = u64;
type Listener = Box<dyn Fn(bool) + Send + Sync>;

/// Single owner of the alarm line and of the sound/vibration handles.
///
/// Only one alarm sounds at a time: proximity and overspeed triggers share
/// the `active` flag, and a permanent stop latches every trigger off until
/// [`AlarmController::reset`].
pub struct AlarmController {
    config: AlarmConfig,
    outputs: AlarmOutputs,
    preferences: AlarmPreferences,
    active: bool,
    manually_disabled: bool,
    reason: Option<AlarmReason>,
    audio_primed: bool,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: ListenerId,
    vibration_task: Option<RepeatTask>,
}

impl AlarmController {
    pub fn new(outputs: AlarmOutputs) -> Self {
        Self::with_config(AlarmConfig::default(), outputs)
    }

    pub fn with_config(config: AlarmConfig, outputs: AlarmOutputs) -> Self {
        Self {
            config,
            outputs,
            preferences: AlarmPreferences::default(),
            active: false,
            manually_disabled: false,
            reason: None,
            audio_primed: false,
            listeners: Vec::new(),
            next_listener_id: 1,
            vibration_task: None,
        }
    }

    /// Applies from the next trigger on
    pub fn set_preferences(&mut self, preferences: AlarmPreferences) {
        self.preferences = AlarmPreferences {
            sound_muted: preferences.sound_muted,
            vibration_intensity: preferences.vibration_intensity.clamp(0.0, 1.0),
        };
    }

    pub fn preferences(&self) -> AlarmPreferences {
        self.preferences
    }

    /// Start sounding. Returns false when already sounding or disabled.
    pub fn trigger(&mut self, reason: AlarmReason) -> bool {
        if self.manually_disabled {
            debug!("Ignoring {} trigger: alarms manually disabled", reason);
            return false;
        }
        if self.active {
            debug!("Ignoring {} trigger: alarm already sounding", reason);
            return false;
        }

        info!("Alarm triggered ({})", reason);
        self.active = true;
        self.reason = Some(reason);

        if self.preferences.sound_muted {
            debug!("Sound muted, skipping audio");
        } else if let Err(e) = self.outputs.audio.play_looping() {
            warn!("Alarm audio failed: {}", e);
        }

        self.start_vibration();

        let (title, body) = reason.notification();
        if let Err(e) = self.outputs.notifier.notify(title, body) {
            warn!("Alarm notification failed: {}", e);
        }

        self.notify_listeners(true);
        true
    }

    /// Silence the alarm. With `permanent`, also latch every future trigger
    /// off until `reset`. Returns true if anything changed.
    pub fn stop(&mut self, permanent: bool) -> bool {
        let was_active = self.active;
        if was_active {
            info!(
                "Alarm stopped ({}){}",
                self.reason.map(|r| r.to_string()).unwrap_or_default(),
                if permanent { ", disabling further alarms" } else { "" }
            );
            self.active = false;
            self.reason = None;

            if let Err(e) = self.outputs.audio.stop_and_rewind() {
                warn!("Stopping alarm audio failed: {}", e);
            }
            self.stop_vibration();
            self.notify_listeners(false);
        }

        let newly_disabled = permanent && !self.manually_disabled;
        if newly_disabled {
            self.manually_disabled = true;
            if !was_active {
                info!("Alarms manually disabled");
            }
        }

        was_active || newly_disabled
    }

    /// Back to `Idle`: silences anything sounding and clears the manual latch
    pub fn reset(&mut self) {
        self.stop(false);
        if self.manually_disabled {
            info!("Alarm latch cleared");
            self.manually_disabled = false;
        }
    }

    /// Prime audio on the first user gesture. Failures are tolerated.
    pub fn prime_audio(&mut self) {
        if self.audio_primed {
            return;
        }
        self.audio_primed = true;
        if let Err(e) = self.outputs.audio.prime() {
            debug!("Audio prime failed: {}", e);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_manually_disabled(&self) -> bool {
        self.manually_disabled
    }

    pub fn is_audio_primed(&self) -> bool {
        self.audio_primed
    }

    pub fn state(&self) -> AlarmState {
        if self.manually_disabled {
            AlarmState::Disabled
        } else if self.active {
            AlarmState::Sounding
        } else {
            AlarmState::Idle
        }
    }

    pub fn reason(&self) -> Option<AlarmReason> {
        self.reason
    }

    /// Listener receives the new `active` value on every change
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Vibration pattern with pulses scaled by intensity; empty when haptics are off
    pub fn vibration_pattern(&self) -> Vec<u64> {
        let intensity = self.preferences.vibration_intensity;
        if intensity <= 0.0 || self.config.pulses == 0 {
            return Vec::new();
        }

        let pulse = ((self.config.pulse_ms as f64) * intensity).round().max(1.0) as u64;
        let mut pattern = Vec::with_capacity(self.config.pulses * 2 - 1);
        for i in 0..self.config.pulses {
            if i > 0 {
                pattern.push(self.config.gap_ms);
            }
            pattern.push(pulse);
        }
        pattern
    }

    fn start_vibration(&mut self) {
        let pattern = self.vibration_pattern();
        if pattern.is_empty() {
            return;
        }

        if let Err(e) = self.outputs.vibrator.vibrate(&pattern) {
            warn!("Vibration failed: {}", e);
        }

        let vibrator = self.outputs.vibrator.clone();
        let period = Duration::from_millis(self.config.repeat_ms.max(1));
        self.vibration_task = RepeatTask::try_spawn(period, move || {
            if let Err(e) = vibrator.vibrate(&pattern) {
                warn!("Vibration failed: {}", e);
            }
        });
        if self.vibration_task.is_none() {
            debug!("No async runtime, vibration pattern issued once");
        }
    }

    fn stop_vibration(&mut self) {
        if let Some(mut task) = self.vibration_task.take() {
            task.cancel();
        }
        if let Err(e) = self.outputs.vibrator.cancel() {
            warn!("Vibration cancel failed: {}", e);
        }
    }

    fn notify_listeners(&self, active: bool) {
        for (_, listener) in &self.listeners {
            listener(active);
        }
    }
}
