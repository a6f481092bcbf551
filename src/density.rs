use crate::clustering::HotspotCluster;
use crate::models::Event;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const HIGH_THRESHOLD: f64 = 0.66;
pub const MEDIUM_THRESHOLD: f64 = 0.33;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityTier {
    Low,
    Medium,
    High,
}

impl DensityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DensityTier::High => "high",
            DensityTier::Medium => "medium",
            DensityTier::Low => "low",
        }
    }

    /// Label shown next to a score in the map legend.
    pub fn label(&self) -> &'static str {
        match self {
            DensityTier::High => "Alta",
            DensityTier::Medium => "Media",
            DensityTier::Low => "Baja",
        }
    }
}

impl fmt::Display for DensityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DensityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "alta" => Ok(DensityTier::High),
            "medium" | "media" => Ok(DensityTier::Medium),
            "low" | "baja" => Ok(DensityTier::Low),
            other => Err(format!("unknown density tier '{}'", other)),
        }
    }
}

/// Total over all reals: anything below the medium threshold (negatives, NaN) is `Low`.
pub fn classify(score: f64) -> DensityTier {
    if score >= HIGH_THRESHOLD {
        DensityTier::High
    } else if score >= MEDIUM_THRESHOLD {
        DensityTier::Medium
    } else {
        DensityTier::Low
    }
}

pub fn classify_event(event: &Event) -> Option<DensityTier> {
    event.score.map(classify)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierFilter {
    #[default]
    All,
    Only(DensityTier),
}

impl TierFilter {
    /// Unscored items only pass the `All` filter.
    pub fn admits(&self, score: Option<f64>) -> bool {
        match self {
            TierFilter::All => true,
            TierFilter::Only(tier) => score.map(classify) == Some(*tier),
        }
    }

    pub fn clusters<'a>(&self, clusters: &'a [HotspotCluster]) -> Vec<&'a HotspotCluster> {
        clusters.iter().filter(|c| self.admits(Some(c.score))).collect()
    }

    pub fn events<'a>(&self, events: &'a [Event]) -> Vec<&'a Event> {
        events.iter().filter(|e| self.admits(e.score)).collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unscored: usize,
}

impl TierCounts {
    fn add(&mut self, score: Option<f64>) {
        match score.map(classify) {
            Some(DensityTier::High) => self.high += 1,
            Some(DensityTier::Medium) => self.medium += 1,
            Some(DensityTier::Low) => self.low += 1,
            None => self.unscored += 1,
        }
    }

    pub fn of_clusters(clusters: &[HotspotCluster]) -> Self {
        let mut counts = TierCounts::default();
        for cluster in clusters {
            counts.add(Some(cluster.score));
        }
        counts
    }

    pub fn of_events(events: &[Event]) -> Self {
        let mut counts = TierCounts::default();
        for event in events {
            counts.add(event.score);
        }
        counts
    }

    pub fn get(&self, tier: DensityTier) -> usize {
        match tier {
            DensityTier::High => self.high,
            DensityTier::Medium => self.medium,
            DensityTier::Low => self.low,
        }
    }
}

/// Highest cluster score, used as the overall intensity of the hour.
pub fn peak_score(clusters: &[HotspotCluster]) -> Option<f64> {
    clusters.iter().map(|c| c.score).reduce(f64::max)
}
