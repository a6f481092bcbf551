use crate::models::{Event, HeatmapMode, HeatmapResponse, NearbyEvent, parse_records};
use crate::regions::Region;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
pub(crate) mod fake;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx answer; `message` is the backend's `detail` when it sent one.
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Request superseded")]
    Cancelled,
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// Message for a failed response: the `detail` field of a JSON body if present.
pub fn error_message(status: u16, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("Request failed with status {}", status))
}

#[derive(Clone, Debug, PartialEq)]
pub struct HotspotQuery {
    pub date: NaiveDate,
    pub hour: u8,
    pub mode: HeatmapMode,
    pub center: Option<(f64, f64)>,
}

impl HotspotQuery {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("date", self.date.format("%Y-%m-%d").to_string()),
            ("hour", self.hour.to_string()),
            ("mode", self.mode.as_str().to_string()),
        ];
        if let Some((lat, lon)) = self.center {
            pairs.push(("lat", lat.to_string()));
            pairs.push(("lon", lon.to_string()));
        }
        pairs
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventQuery {
    pub date: NaiveDate,
    pub from_hour: u8,
    pub city: Option<String>,
}

impl EventQuery {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("date", self.date.format("%Y-%m-%d").to_string()),
            ("from_hour", self.from_hour.to_string()),
        ];
        if let Some(city) = self.city.as_ref().filter(|c| !c.is_empty()) {
            pairs.push(("city", city.clone()));
        }
        pairs
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lon: f64,
    pub date: NaiveDate,
    pub hour: u8,
    pub radius_m: u32,
    pub limit: usize,
}

impl NearbyQuery {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("lat", self.lat.to_string()),
            ("lon", self.lon.to_string()),
            ("date", self.date.format("%Y-%m-%d").to_string()),
            ("hour", self.hour.to_string()),
            ("radius_m", self.radius_m.to_string()),
            ("limit", self.limit.to_string()),
        ]
    }
}

/// The read-only data source behind the map.
#[allow(async_fn_in_trait)]
pub trait HeatmapApi {
    async fn fetch_heatmap(&self, query: &HotspotQuery) -> Result<HeatmapResponse, FetchError>;

    async fn fetch_events(&self, query: &EventQuery) -> Result<Vec<Event>, FetchError>;

    async fn fetch_nearby_events(&self, query: &NearbyQuery) -> Result<Vec<NearbyEvent>, FetchError>;
}

pub struct HttpHeatmapClient {
    client: reqwest::Client,
    base: String,
}

impl HttpHeatmapClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(HttpHeatmapClient {
            client,
            base: api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn get_bytes(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}{}", self.base, path);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .header("Content-Type", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: error_message(status.as_u16(), &body),
            });
        }

        Ok(body.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, FetchError> {
        let body = self.get_bytes(path, query).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn fetch_regions(&self) -> Result<Vec<Region>, FetchError> {
        let body = self.get_bytes("/regions", &[]).await?;
        Ok(parse_records(&body)?)
    }
}

impl HeatmapApi for HttpHeatmapClient {
    #[tracing::instrument(name = "fetch_heatmap", skip(self), fields(date = %query.date, hour = query.hour))]
    async fn fetch_heatmap(&self, query: &HotspotQuery) -> Result<HeatmapResponse, FetchError> {
        self.get_json("/heatmap", &query.query_pairs()).await
    }

    #[tracing::instrument(name = "fetch_events", skip(self), fields(date = %query.date, from_hour = query.from_hour))]
    async fn fetch_events(&self, query: &EventQuery) -> Result<Vec<Event>, FetchError> {
        let body = self.get_bytes("/events", &query.query_pairs()).await?;
        Ok(parse_records(&body)?)
    }

    #[tracing::instrument(name = "fetch_nearby_events", skip(self), fields(lat = ?query.lat, lon = ?query.lon, radius_m = query.radius_m))]
    async fn fetch_nearby_events(&self, query: &NearbyQuery) -> Result<Vec<NearbyEvent>, FetchError> {
        let body = self.get_bytes("/hotspot-events", &query.query_pairs()).await?;
        Ok(parse_records(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()
    }

    #[test]
    fn test_error_message_uses_detail() {
        let body = br#"{"detail": "hour must be between 0 and 23"}"#;
        assert_eq!(error_message(422, body), "hour must be between 0 and 23");
    }

    #[test]
    fn test_error_message_fallback() {
        assert_eq!(error_message(502, b"<html>Bad Gateway</html>"), "Request failed with status 502");
        assert_eq!(error_message(500, br#"{"detail": null}"#), "Request failed with status 500");
        assert_eq!(error_message(404, br#"{"message": "nope"}"#), "Request failed with status 404");
    }

    #[test]
    fn test_status_error_displays_message() {
        let err = FetchError::Status {
            status: 503,
            message: "Servicio no disponible".to_string(),
        };
        assert_eq!(err.to_string(), "Servicio no disponible");
        assert!(!err.is_cancelled());
        assert!(FetchError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_hotspot_query_pairs() {
        let query = HotspotQuery {
            date: date(),
            hour: 22,
            mode: HeatmapMode::Ml,
            center: Some((40.4168, -3.7038)),
        };
        assert_eq!(
            query.query_pairs(),
            vec![
                ("date", "2025-06-14".to_string()),
                ("hour", "22".to_string()),
                ("mode", "ml".to_string()),
                ("lat", "40.4168".to_string()),
                ("lon", "-3.7038".to_string()),
            ]
        );

        let without_center = HotspotQuery {
            center: None,
            ..query
        };
        assert_eq!(without_center.query_pairs().len(), 3);
    }

    #[test]
    fn test_event_query_pairs() {
        let query = EventQuery {
            date: date(),
            from_hour: 9,
            city: Some(String::new()),
        };
        assert_eq!(
            query.query_pairs(),
            vec![("date", "2025-06-14".to_string()), ("from_hour", "9".to_string())]
        );
    }

    #[test]
    fn test_nearby_query_pairs() {
        let query = NearbyQuery {
            lat: 40.0,
            lon: -3.5,
            date: date(),
            hour: 7,
            radius_m: 300,
            limit: 20,
        };
        let pairs = query.query_pairs();
        assert!(pairs.contains(&("radius_m", "300".to_string())));
        assert!(pairs.contains(&("limit", "20".to_string())));
        assert!(pairs.contains(&("lat", "40".to_string())));
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = HttpHeatmapClient::new("http://localhost:8000/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base, "http://localhost:8000/api");
    }
}
