use crate::error::RouteError;
use crate::eta::{RouteProvider, RouteSummary};
use crate::types::GeoPoint;
use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://router.project-osrm.org";

/// Directions client for an OSRM-compatible `/route/v1/driving` endpoint
///
/// # Error Handling
/// - Timeouts and connection failures map to `RouteError::Network`
/// - Non-2xx responses map to `RouteError::Http`
/// - A response without routes maps to `RouteError::NoRoute`
pub struct OsrmClient {
    client: reqwest::Client,
    base_url: String,
}

impl OsrmClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("drive-companion/0.1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn route_url(&self, origin: GeoPoint, destination: GeoPoint) -> String {
        // OSRM takes lon,lat pairs
        format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url, origin.lon, origin.lat, destination.lon, destination.lat
        )
    }
}

impl Default for OsrmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteProvider for OsrmClient {
    async fn fetch_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteSummary, RouteError> {
        let url = self.route_url(origin, destination);
        debug!("Fetching route: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RouteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Directions request failed with HTTP {}", status.as_u16());
            return Err(RouteError::Http(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RouteError::Network(e.to_string()))?;
        parse_osrm_response(&body)
    }
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: Option<OsrmGeometry>,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

/// Parse an OSRM route response body, taking the first route
pub fn parse_osrm_response(body: &str) -> Result<RouteSummary, RouteError> {
    let response: OsrmResponse =
        serde_json::from_str(body).map_err(|e| RouteError::Parse(e.to_string()))?;

    if response.code != "Ok" {
        debug!("Directions service answered {}", response.code);
        return Err(RouteError::NoRoute);
    }

    let route = response.routes.into_iter().next().ok_or(RouteError::NoRoute)?;
    let path = route
        .geometry
        .map(|g| {
            g.coordinates
                .into_iter()
                .map(|[lon, lat]| GeoPoint::new(lat, lon))
                .collect()
        })
        .unwrap_or_default();

    Ok(RouteSummary {
        distance_m: route.distance,
        duration_s: route.duration,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "code": "Ok",
        "routes": [{
            "distance": 5234.7,
            "duration": 612.3,
            "geometry": {"type": "LineString", "coordinates": [[83.16595, 17.70978], [83.17, 17.71]]}
        }],
        "waypoints": []
    }"#;

    #[test]
    fn test_parse_route() {
        let route = parse_osrm_response(SAMPLE).unwrap();
        assert_eq!(route.distance_m, 5234.7);
        assert_eq!(route.duration_s, 612.3);
        assert_eq!(route.path.len(), 2);
        assert_eq!(route.path[0], GeoPoint::new(17.70978, 83.16595));
    }

    #[test]
    fn test_parse_no_route() {
        let err = parse_osrm_response(r#"{"code": "NoRoute", "routes": []}"#).unwrap_err();
        assert_eq!(err, RouteError::NoRoute);

        let err = parse_osrm_response(r#"{"code": "Ok", "routes": []}"#).unwrap_err();
        assert_eq!(err, RouteError::NoRoute);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(parse_osrm_response("<html>"), Err(RouteError::Parse(_))));
    }

    #[test]
    fn test_route_url_uses_lon_lat_order() {
        let client = OsrmClient::with_base_url("http://localhost:5000/");
        let url = client.route_url(GeoPoint::new(17.5, 83.25), GeoPoint::new(18.0, 84.0));
        assert_eq!(
            url,
            "http://localhost:5000/route/v1/driving/83.25,17.5;84,18?overview=full&geometries=geojson"
        );
    }

    // Requires network, disabled by default
    #[tokio::test]
    #[ignore]
    async fn test_fetch_route_integration() {
        let client = OsrmClient::new();
        let route = client
            .fetch_route(GeoPoint::new(52.517037, 13.388860), GeoPoint::new(52.529407, 13.397634))
            .await
            .unwrap();
        assert!(route.distance_m > 0.0);
        assert!(!route.path.is_empty());
    }
}
