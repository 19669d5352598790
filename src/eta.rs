//! Arrival-time glue around an external directions service.
//!
//! Routing itself is delegated to a [`RouteProvider`]; this module only turns
//! a route into an ETA and keeps it fresh while navigation is active.

use crate::error::{CompanionResult, RouteError};
use crate::session::SessionSnapshot;
use crate::types::GeoPoint;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub distance_m: f64,
    pub duration_s: f64,
    pub path: Vec<GeoPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Eta {
    pub distance_m: f64,
    pub duration_s: f64,
    pub arrival: DateTime<Utc>,
    pub computed_at: DateTime<Utc>,
}

impl Eta {
    pub fn from_route(route: &RouteSummary, now: DateTime<Utc>) -> Self {
        let duration_ms = (route.duration_s.max(0.0) * 1000.0).round() as i64;
        Self {
            distance_m: route.distance_m,
            duration_s: route.duration_s,
            arrival: now + chrono::Duration::milliseconds(duration_ms),
            computed_at: now,
        }
    }

    /// e.g. "12.4 km · 17 min"
    pub fn summary(&self) -> String {
        format!(
            "{:.1} km · {} min",
            self.distance_m / 1000.0,
            (self.duration_s / 60.0).round() as i64
        )
    }
}

pub trait RouteProvider: Send + Sync + 'static {
    fn fetch_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> impl Future<Output = Result<RouteSummary, RouteError>> + Send;
}

/// One route fetch turned into an ETA computed at `now`
pub async fn fetch_eta<P: RouteProvider>(
    provider: &P,
    origin: GeoPoint,
    destination: GeoPoint,
    now: DateTime<Utc>,
) -> CompanionResult<Eta> {
    let route = provider.fetch_route(origin, destination).await?;
    Ok(Eta::from_route(&route, now))
}

/// Refresh the ETA from the latest session position every `refresh`.
///
/// A failed fetch keeps the previous ETA. The loop ends when the session's
/// snapshot channel closes or nobody listens for ETAs any more.
pub fn spawn_eta_loop<P: RouteProvider>(
    provider: Arc<P>,
    mut snapshots: watch::Receiver<SessionSnapshot>,
    destination: GeoPoint,
    refresh: Duration,
) -> (JoinHandle<()>, watch::Receiver<Option<Eta>>) {
    let (eta_tx, eta_rx) = watch::channel(None);

    let handle = tokio::spawn(async move {
        let mut ticker = interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if snapshots.has_changed().is_err() {
                debug!("Session closed, stopping ETA refresh");
                break;
            }
            let position = snapshots.borrow_and_update().position;
            let Some(origin) = position else {
                debug!("No position yet, skipping ETA refresh");
                continue;
            };

            match fetch_eta(provider.as_ref(), origin, destination, Utc::now()).await {
                Ok(eta) => {
                    debug!("ETA refreshed: {}", eta.summary());
                    if eta_tx.send(Some(eta)).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Route refresh failed, keeping previous ETA: {}", e),
            }
        }
    });

    (handle, eta_rx)
}
