//! Side-effect capabilities used by the alarm controller.
//!
//! Platforms without a feature plug in [`NoopOutputs`]; the controller calls
//! every capability unconditionally and only logs failures.

use crate::error::OutputError;
use log::info;
use std::sync::{Arc, Mutex};

pub type OutputResult = Result<(), OutputError>;

pub trait AudioSink: Send + Sync {
    /// Silent play-and-rewind so later playback is allowed without a gesture
    fn prime(&self) -> OutputResult;
    fn play_looping(&self) -> OutputResult;
    fn stop_and_rewind(&self) -> OutputResult;
}

pub trait Vibrator: Send + Sync {
    /// Alternating on/off durations in ms, starting with "on"
    fn vibrate(&self, pattern: &[u64]) -> OutputResult;
    fn cancel(&self) -> OutputResult;
}

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> OutputResult;
}

/// The three capabilities the controller drives
#[derive(Clone)]
pub struct AlarmOutputs {
    pub audio: Arc<dyn AudioSink>,
    pub vibrator: Arc<dyn Vibrator>,
    pub notifier: Arc<dyn Notifier>,
}

impl AlarmOutputs {
    pub fn new(
        audio: Arc<dyn AudioSink>,
        vibrator: Arc<dyn Vibrator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            audio,
            vibrator,
            notifier,
        }
    }

    /// Use one object for all three capabilities
    pub fn uniform<T>(outputs: Arc<T>) -> Self
    where
        T: AudioSink + Vibrator + Notifier + 'static,
    {
        Self {
            audio: outputs.clone(),
            vibrator: outputs.clone(),
            notifier: outputs,
        }
    }

    pub fn noop() -> Self {
        Self::uniform(Arc::new(NoopOutputs))
    }

    pub fn logging() -> Self {
        Self::uniform(Arc::new(LogOutputs))
    }
}

/// For platforms that lack audio, haptics and notifications entirely
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopOutputs;

impl AudioSink for NoopOutputs {
    fn prime(&self) -> OutputResult {
        Ok(())
    }

    fn play_looping(&self) -> OutputResult {
        Ok(())
    }

    fn stop_and_rewind(&self) -> OutputResult {
        Ok(())
    }
}

impl Vibrator for NoopOutputs {
    fn vibrate(&self, _pattern: &[u64]) -> OutputResult {
        Ok(())
    }

    fn cancel(&self) -> OutputResult {
        Ok(())
    }
}

impl Notifier for NoopOutputs {
    fn notify(&self, _title: &str, _body: &str) -> OutputResult {
        Ok(())
    }
}

/// Headless rendering: every side effect becomes a log line
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOutputs;

impl AudioSink for LogOutputs {
    fn prime(&self) -> OutputResult {
        info!("[alarm] audio primed");
        Ok(())
    }

    fn play_looping(&self) -> OutputResult {
        info!("[alarm] 🔊 sound loop started");
        Ok(())
    }

    fn stop_and_rewind(&self) -> OutputResult {
        info!("[alarm] sound stopped");
        Ok(())
    }
}

impl Vibrator for LogOutputs {
    fn vibrate(&self, pattern: &[u64]) -> OutputResult {
        info!("[alarm] vibrate {:?}", pattern);
        Ok(())
    }

    fn cancel(&self) -> OutputResult {
        info!("[alarm] vibration cancelled");
        Ok(())
    }
}

impl Notifier for LogOutputs {
    fn notify(&self, title: &str, body: &str) -> OutputResult {
        info!("[alarm] notification: {} - {}", title, body);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    Primed,
    AudioStarted,
    AudioStopped,
    Vibrated(Vec<u64>),
    VibrationCancelled,
    Notified { title: String, body: String },
}

/// Records side effects in memory for inspection
#[derive(Clone, Default)]
pub struct MemoryOutputs {
    events: Arc<Mutex<Vec<OutputEvent>>>,
    block_audio: bool,
}

impl MemoryOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio calls fail the way a browser rejects unprompted playback
    pub fn with_blocked_audio() -> Self {
        Self {
            block_audio: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, matches: impl Fn(&OutputEvent) -> bool) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| matches(e)).count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    fn record(&self, event: OutputEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn audio_gate(&self) -> OutputResult {
        if self.block_audio {
            Err(OutputError::Blocked("audio", "no prior user gesture".to_string()))
        } else {
            Ok(())
        }
    }
}

impl AudioSink for MemoryOutputs {
    fn prime(&self) -> OutputResult {
        self.audio_gate()?;
        self.record(OutputEvent::Primed);
        Ok(())
    }

    fn play_looping(&self) -> OutputResult {
        self.audio_gate()?;
        self.record(OutputEvent::AudioStarted);
        Ok(())
    }

    fn stop_and_rewind(&self) -> OutputResult {
        self.audio_gate()?;
        self.record(OutputEvent::AudioStopped);
        Ok(())
    }
}

impl Vibrator for MemoryOutputs {
    fn vibrate(&self, pattern: &[u64]) -> OutputResult {
        self.record(OutputEvent::Vibrated(pattern.to_vec()));
        Ok(())
    }

    fn cancel(&self) -> OutputResult {
        self.record(OutputEvent::VibrationCancelled);
        Ok(())
    }
}

impl Notifier for MemoryOutputs {
    fn notify(&self, title: &str, body: &str) -> OutputResult {
        self.record(OutputEvent::Notified {
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_outputs_record_in_order() {
        let memory = Arc::new(MemoryOutputs::new());
        let outputs = AlarmOutputs::uniform(memory.clone());

        outputs.audio.play_looping().unwrap();
        outputs.vibrator.vibrate(&[500, 200, 500]).unwrap();
        outputs.notifier.notify("t", "b").unwrap();

        assert_eq!(
            memory.events(),
            vec![
                OutputEvent::AudioStarted,
                OutputEvent::Vibrated(vec![500, 200, 500]),
                OutputEvent::Notified {
                    title: "t".to_string(),
                    body: "b".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_blocked_audio_still_allows_haptics() {
        let memory = MemoryOutputs::with_blocked_audio();
        assert!(memory.play_looping().is_err());
        assert!(memory.vibrate(&[100]).is_ok());
        assert_eq!(memory.count(|e| matches!(e, OutputEvent::Vibrated(_))), 1);
    }

    #[test]
    fn test_noop_outputs_always_succeed() {
        let outputs = AlarmOutputs::noop();
        assert!(outputs.audio.prime().is_ok());
        assert!(outputs.vibrator.cancel().is_ok());
        assert!(outputs.notifier.notify("a", "b").is_ok());
    }
}
