use super::{EventQuery, FetchError, HeatmapApi, HotspotQuery, NearbyQuery};
use crate::models::{Event, HeatmapResponse, HotspotObservation, NearbyEvent, Weather};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory backend for tests. Hotspot scores depend on the requested hour so
/// results of different queries can be told apart.
#[derive(Default)]
pub struct FakeApi {
    pub heatmap_error: Option<(u16, String)>,
    pub events_error: bool,
    pub nearby_error: bool,
    pub embedded_events: Vec<Event>,
    pub fallback_events: Vec<Event>,
    pub nearby: Vec<NearbyEvent>,
    /// Hour the backend snaps the target to, instead of the requested one.
    pub snap_hour: Option<u8>,
    pub heatmap_calls: AtomicUsize,
    pub nearby_calls: AtomicUsize,
}

impl FakeApi {
    pub fn score_for_hour(hour: u8) -> f64 {
        hour as f64 / 10.0
    }
}

impl HeatmapApi for FakeApi {
    async fn fetch_heatmap(&self, query: &HotspotQuery) -> Result<HeatmapResponse, FetchError> {
        self.heatmap_calls.fetch_add(1, Ordering::SeqCst);

        if let Some((status, message)) = &self.heatmap_error {
            return Err(FetchError::Status {
                status: *status,
                message: message.clone(),
            });
        }

        let hour = self.snap_hour.unwrap_or(query.hour);
        Ok(HeatmapResponse {
            mode: query.mode,
            target: Some(format!("{}T{:02}:00:00", query.date.format("%Y-%m-%d"), hour)),
            weather: Some(Weather {
                temperature_c: Some(20.0),
                precipitation_mm: Some(0.0),
                wind_speed_kmh: Some(10.0),
                ..Default::default()
            }),
            hotspots: vec![
                HotspotObservation::new(40.0, -3.0, Self::score_for_hour(query.hour), 150.0),
                HotspotObservation::new(40.00001, -3.00001, 0.1, 100.0),
                HotspotObservation::new(40.1, -3.1, 0.2, 120.0),
            ],
            events: if self.embedded_events.is_empty() {
                None
            } else {
                Some(self.embedded_events.clone())
            },
        })
    }

    async fn fetch_events(&self, _query: &EventQuery) -> Result<Vec<Event>, FetchError> {
        if self.events_error {
            return Err(FetchError::Status {
                status: 500,
                message: "events down".to_string(),
            });
        }
        Ok(self.fallback_events.clone())
    }

    async fn fetch_nearby_events(&self, query: &NearbyQuery) -> Result<Vec<NearbyEvent>, FetchError> {
        self.nearby_calls.fetch_add(1, Ordering::SeqCst);

        if self.nearby_error {
            return Err(FetchError::Status {
                status: 504,
                message: format!("timeout around {},{}", query.lat, query.lon),
            });
        }
        Ok(self.nearby.clone())
    }
}
