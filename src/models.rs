use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapMode {
    #[default]
    Heuristic,
    Ml,
}

impl HeatmapMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeatmapMode::Heuristic => "heuristic",
            HeatmapMode::Ml => "ml",
        }
    }
}

impl fmt::Display for HeatmapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeatmapMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(HeatmapMode::Heuristic),
            "ml" => Ok(HeatmapMode::Ml),
            other => Err(format!("unknown heatmap mode '{}'", other)),
        }
    }
}

/// The externally tunable inputs that decide which fetch is current.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryParameters {
    pub region_id: String,
    pub date: NaiveDate,
    pub hour: u8,
    pub mode: HeatmapMode,
}

/// One scored area as returned by the scoring backend.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HotspotObservation {
    pub lat: f64,
    pub lon: f64,
    pub score: f64,
    /// `None` when the payload had no usable (positive) radius.
    pub radius_m: Option<f64>,
    #[serde(rename = "lead_time_min_pred")]
    pub lead_time_min: Option<f64>,
    #[serde(rename = "attendance_factor_pred")]
    pub attendance_factor: Option<f64>,
}

impl HotspotObservation {
    pub fn new(lat: f64, lon: f64, score: f64, radius_m: f64) -> Self {
        Self {
            lat,
            lon,
            score,
            radius_m: Some(radius_m),
            lead_time_min: None,
            attendance_factor: None,
        }
    }
}

#[derive(Deserialize)]
struct RawHotspot {
    #[serde(default, deserialize_with = "lenient::number")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    radius_m: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    lead_time_min_pred: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    attendance_factor_pred: Option<f64>,
}

impl RawHotspot {
    fn into_observation(self) -> Option<HotspotObservation> {
        Some(HotspotObservation {
            lat: self.lat?,
            lon: self.lon?,
            score: self.score?,
            radius_m: self.radius_m.filter(|r| *r > 0.0),
            lead_time_min: self.lead_time_min_pred,
            attendance_factor: self.attendance_factor_pred,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::title")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub category: Option<String>,
    #[serde(rename = "start_dt", default, deserialize_with = "lenient::text")]
    pub start_time: Option<String>,
    #[serde(rename = "end_dt", default, deserialize_with = "lenient::text")]
    pub end_time: Option<String>,
    #[serde(rename = "venue_name", default, deserialize_with = "lenient::text")]
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub expected_attendance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub organizer: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: Option<String>,
}

impl Event {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Event returned by the nearby query, annotated with its distance to the query center.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NearbyEvent {
    #[serde(flatten)]
    pub event: Event,
    #[serde(default, deserialize_with = "lenient::number")]
    pub distance_m: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    #[serde(default, deserialize_with = "lenient::number")]
    pub temperature_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub precipitation_mm: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub rain_mm: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub snowfall_mm: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub cloud_cover_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub wind_speed_kmh: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub wind_gust_kmh: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub humidity_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub pressure_hpa: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub visibility_m: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub weather_code: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub observed_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub source: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeatmapResponse {
    #[serde(default, deserialize_with = "lenient::mode")]
    pub mode: HeatmapMode,
    #[serde(default, deserialize_with = "lenient::text")]
    pub target: Option<String>,
    #[serde(default, deserialize_with = "lenient::weather")]
    pub weather: Option<Weather>,
    #[serde(default, deserialize_with = "lenient::hotspots")]
    pub hotspots: Vec<HotspotObservation>,
    #[serde(default, deserialize_with = "lenient::optional_records")]
    pub events: Option<Vec<Event>>,
}

/// Parses a JSON array, skipping entries that do not fit `T` instead of failing.
pub fn parse_records<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, serde_json::Error> {
    let values: Option<Vec<serde_json::Value>> = serde_json::from_slice(bytes)?;
    Ok(lenient::keep_valid(values.unwrap_or_default()))
}

mod lenient {
    use super::{HeatmapMode, HotspotObservation, RawHotspot, Weather};
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn keep_valid<T: DeserializeOwned>(values: Vec<Value>) -> Vec<T> {
        values
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value
            .and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            })
            .filter(|x| x.is_finite()))
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value.and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }))
    }

    pub fn title<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(text(d)?.unwrap_or_default())
    }

    /// Unknown or non-string modes fall back to the default mode.
    pub fn mode<'de, D: Deserializer<'de>>(d: D) -> Result<HeatmapMode, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(match value {
            Some(Value::String(s)) => s.parse().unwrap_or_default(),
            _ => HeatmapMode::default(),
        })
    }

    /// Anything but an object is treated as missing weather.
    pub fn weather<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Weather>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(match value {
            Some(v @ Value::Object(_)) => serde_json::from_value(v).ok(),
            _ => None,
        })
    }

    pub fn hotspots<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<HotspotObservation>, D::Error> {
        let values = Option::<Vec<Value>>::deserialize(d)?.unwrap_or_default();
        Ok(keep_valid::<RawHotspot>(values)
            .into_iter()
            .filter_map(RawHotspot::into_observation)
            .collect())
    }

    pub fn optional_records<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(Option::<Vec<Value>>::deserialize(d)?.map(keep_valid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heatmap_response_parses() {
        let raw = r#"{
            "mode": "ml",
            "target": "2025-06-14T22:00:00+02:00",
            "weather": {"temperature_c": 21.4, "precipitation_mm": 0, "wind_speed_kmh": "12"},
            "hotspots": [
                {"lat": 40.41, "lon": -3.70, "score": 1.2, "radius_m": 250, "lead_time_min_pred": 35.0},
                {"lat": 40.42, "lon": -3.71, "score": 0.4, "radius_m": 120}
            ]
        }"#;

        let parsed: HeatmapResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.mode, HeatmapMode::Ml);
        assert_eq!(parsed.hotspots.len(), 2);
        assert_eq!(parsed.hotspots[0].lead_time_min, Some(35.0));
        assert_eq!(parsed.hotspots[1].attendance_factor, None);
        let weather = parsed.weather.unwrap();
        assert_eq!(weather.wind_speed_kmh, Some(12.0));
        assert_eq!(weather.rain_mm, None);
        assert!(parsed.events.is_none());
    }

    #[test]
    fn test_broken_hotspots_are_dropped_individually() {
        let raw = r#"{
            "mode": "heuristic",
            "target": null,
            "hotspots": [
                {"lat": 40.0, "lon": -3.0, "score": 0.9, "radius_m": 100},
                {"lat": "north", "lon": -3.0, "score": 0.9, "radius_m": 100},
                {"lat": 40.0, "lon": -3.0, "radius_m": 100},
                {"lat": 40.1, "lon": -3.1, "score": 0.2, "radius_m": 0},
                42
            ]
        }"#;

        let parsed: HeatmapResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.hotspots.len(), 2);
        assert_eq!(parsed.hotspots[1].radius_m, None);
    }

    #[test]
    fn test_event_lenient_fields() {
        let raw = r#"{
            "id": 1234,
            "title": "Concierto",
            "category": null,
            "start_dt": "2025-06-14T21:30:00",
            "venue_name": "WiZink Center",
            "lat": "40.4240",
            "lon": -3.6718,
            "score": "not a number",
            "expected_attendance": 15000,
            "price": 35
        }"#;

        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.id.as_deref(), Some("1234"));
        assert_eq!(event.lat, Some(40.424));
        assert_eq!(event.score, None);
        assert_eq!(event.category, None);
        assert_eq!(event.price.as_deref(), Some("35"));
        assert_eq!(event.coordinates(), Some((40.424, -3.6718)));
    }

    #[test]
    fn test_event_without_title() {
        let event: Event = serde_json::from_str(r#"{"title": null}"#).unwrap();
        assert_eq!(event.title, "");
        assert_eq!(event.coordinates(), None);
    }

    #[test]
    fn test_parse_nearby_records() {
        let raw = br#"[
            {"title": "Mercado", "lat": 40.0, "lon": -3.0, "distance_m": 120.5},
            {"title": "Sin distancia", "lat": 40.0, "lon": -3.0},
            "garbage"
        ]"#;

        let records: Vec<NearbyEvent> = parse_records(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].distance_m, Some(120.5));
        assert_eq!(records[0].event.title, "Mercado");
        assert_eq!(records[1].distance_m, None);
    }

    #[test]
    fn test_parse_records_null_body() {
        let records: Vec<Event> = parse_records(b"null").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_bad_mode_and_weather_do_not_fail_response() {
        let raw = r#"{
            "mode": "ml-v2",
            "target": "2025-06-14T22:00:00",
            "weather": "n/a",
            "hotspots": [{"lat": 40.41, "lon": -3.70, "score": 0.9, "radius_m": 200}]
        }"#;

        let parsed: HeatmapResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.mode, HeatmapMode::Heuristic);
        assert!(parsed.weather.is_none());
        assert_eq!(parsed.hotspots.len(), 1);

        let raw = r#"{"mode": 3, "weather": [1, 2], "hotspots": []}"#;
        let parsed: HeatmapResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.mode, HeatmapMode::Heuristic);
        assert!(parsed.weather.is_none());

        let raw = r#"{"mode": "ML", "weather": {"temperature_c": "19.5"}}"#;
        let parsed: HeatmapResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.mode, HeatmapMode::Ml);
        assert_eq!(parsed.weather.unwrap().temperature_c, Some(19.5));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("ML".parse::<HeatmapMode>(), Ok(HeatmapMode::Ml));
        assert_eq!(" heuristic ".parse::<HeatmapMode>(), Ok(HeatmapMode::Heuristic));
        assert!("neural".parse::<HeatmapMode>().is_err());
    }
}
