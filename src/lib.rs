//! Driving companion core: GPS speed estimation, destination proximity and
//! over-limit alarms.
//!
//! A [`TrackingSession`] consumes position fixes one at a time, smooths them
//! into a physically plausible speed, and drives a single shared alarm line
//! from two policies: entering the destination radius and sustained
//! overspeed. Audio, haptics and notifications are pluggable capabilities
//! (see [`alarm::outputs`]).

pub mod alarm;
pub mod config;
pub mod error;
pub mod eta;
pub mod geo;
pub mod health;
pub mod live_status;
pub mod proximity;
pub mod route_client;
pub mod session;
pub mod settings;
pub mod sources;
pub mod speed;
pub mod speed_limit;
pub mod types;

pub use alarm::{AlarmController, AlarmOutputs, AlarmPreferences, AlarmReason, AlarmState};
pub use config::AppConfig;
pub use error::{CompanionError, CompanionResult, OutputError, RouteError};
pub use eta::{Eta, RouteProvider, RouteSummary};
pub use geo::{haversine_distance, is_near};
pub use proximity::{NavigationTarget, ProximityTracker};
pub use session::{SessionSnapshot, SessionState, SessionStats, TrackingSession};
pub use settings::{Settings, SettingsStore};
pub use speed::SpeedEstimator;
pub use speed_limit::SpeedLimitMonitor;
pub use types::{GeoFix, GeoPoint, RawFix, SpeedSample};
