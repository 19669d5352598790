pub mod controller;
pub mod outputs;
pub mod timer;

pub use controller::{AlarmController, AlarmPreferences, AlarmReason, AlarmState, ListenerId};
pub use outputs::{
    AlarmOutputs, AudioSink, LogOutputs, MemoryOutputs, NoopOutputs, Notifier, OutputEvent,
    Vibrator,
};
pub use timer::RepeatTask;
