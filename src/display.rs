//! Presentation strings derived from a refresh: the target label, the display
//! hour and the one-line weather summary. Labels are in Spanish, like the rest of
//! the map UI.

use crate::models::{Event, Weather};
use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::Serialize;

pub const NO_DATA_LABEL: &str = "Sin datos";
pub const NO_TIME_LABEL: &str = "Hora N/D";
pub const NOT_AVAILABLE: &str = "N/D";

const WEEKDAYS: [&str; 7] = [
    "Lunes",
    "Martes",
    "Miércoles",
    "Jueves",
    "Viernes",
    "Sábado",
    "Domingo",
];

const MONTHS: [&str; 12] = [
    "Ene", "Feb", "Mar", "Abr", "May", "Jun", "Jul", "Ago", "Sept", "Oct", "Nov", "Dic",
];

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TargetMetadata {
    pub label: String,
    /// Local hour of the backend's target, which may differ from the requested one.
    pub hour: u8,
}

/// Reads an ISO-8601 timestamp into `tz`. A timestamp without offset is taken
/// as local time in `tz`.
pub fn parse_timestamp(raw: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&tz));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
}

pub fn format_target(raw: &str, tz: Tz) -> Option<TargetMetadata> {
    let local = parse_timestamp(raw, tz)?;
    let weekday = WEEKDAYS[local.weekday().num_days_from_monday() as usize];
    let month = MONTHS[local.month0() as usize];
    let hour = local.hour() as u8;

    Some(TargetMetadata {
        label: format!(
            "{} · {} {} {} · {}h",
            weekday,
            local.day(),
            month,
            local.year(),
            hour
        ),
        hour,
    })
}

fn weather_icon(weather: &Weather, local_hour: u8) -> &'static str {
    if weather.precipitation_mm.is_some_and(|p| p > 0.0) {
        "🌧"
    } else if (7..=19).contains(&local_hour) {
        "☀"
    } else {
        "🌙"
    }
}

pub fn weather_summary(weather: Option<&Weather>, local_hour: u8) -> String {
    let Some(weather) = weather else {
        return String::new();
    };

    let temperature = weather
        .temperature_c
        .map(|t| format!("{:.1}ºC", t))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let rain = format!("{:.1}", weather.precipitation_mm.unwrap_or(0.0));
    let wind = weather
        .wind_speed_kmh
        .map(|w| format!("{:.0} km/h", w))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    format!(
        "{} {}   🌧 {} mm   💨 {}",
        weather_icon(weather, local_hour),
        temperature,
        rain,
        wind
    )
}

/// Start time of an event as `HH:MM` in `tz`.
pub fn event_time_label(event: &Event, tz: Tz) -> String {
    event
        .start_time
        .as_deref()
        .and_then(|raw| parse_timestamp(raw, tz))
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| NO_TIME_LABEL.to_string())
}
