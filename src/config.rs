use crate::selection::SearchRadius;
use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub api_base: String,
    /// Distance within which observations merge into one cluster.
    pub merge_threshold_m: f64,
    pub nearby_limit: usize,
    /// One of 200, 300, 500.
    pub search_radius_m: u32,
    pub timezone: String,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000/api".to_string(),
            merge_threshold_m: 250.0,
            nearby_limit: 20,
            search_radius_m: 300,
            timezone: "Europe/Madrid".to_string(),
            request_timeout_secs: 15,
        }
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl EngineConfig {
    /// Defaults overridden by `HOTSPOTS_*` variables (after loading `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();

        if let Some(v) = lookup("HOTSPOTS_API_BASE") {
            config.api_base = v;
        }
        if let Some(v) = lookup("HOTSPOTS_MERGE_THRESHOLD_M") {
            config.merge_threshold_m = v
                .trim()
                .parse()
                .map_err(|e| invalid("HOTSPOTS_MERGE_THRESHOLD_M", &v, e))?;
        }
        if let Some(v) = lookup("HOTSPOTS_NEARBY_LIMIT") {
            config.nearby_limit = v
                .trim()
                .parse()
                .map_err(|e| invalid("HOTSPOTS_NEARBY_LIMIT", &v, e))?;
        }
        if let Some(v) = lookup("HOTSPOTS_SEARCH_RADIUS_M") {
            config.search_radius_m = v
                .trim()
                .parse()
                .map_err(|e| invalid("HOTSPOTS_SEARCH_RADIUS_M", &v, e))?;
        }
        if let Some(v) = lookup("HOTSPOTS_TIMEZONE") {
            config.timezone = v;
        }
        if let Some(v) = lookup("HOTSPOTS_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = v
                .trim()
                .parse()
                .map_err(|e| invalid("HOTSPOTS_REQUEST_TIMEOUT_SECS", &v, e))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.merge_threshold_m.is_finite() && self.merge_threshold_m >= 0.0) {
            return Err(invalid(
                "HOTSPOTS_MERGE_THRESHOLD_M",
                &self.merge_threshold_m.to_string(),
                "must be a non-negative distance",
            ));
        }
        self.search_radius()?;
        self.tz()?;
        Ok(())
    }

    pub fn search_radius(&self) -> Result<SearchRadius, ConfigError> {
        SearchRadius::from_meters(self.search_radius_m).ok_or_else(|| {
            invalid(
                "HOTSPOTS_SEARCH_RADIUS_M",
                &self.search_radius_m.to_string(),
                "must be 200, 300 or 500",
            )
        })
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        Tz::from_str_insensitive(&self.timezone)
            .map_err(|e| invalid("HOTSPOTS_TIMEZONE", &self.timezone, e))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
