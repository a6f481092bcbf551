use crate::geo_math::{haversine_distance, point_distance};
use crate::models::HotspotObservation;
use geo_types::Point;
use serde::Serialize;

/// Radius assumed for a hotspot that came without one. Also the widest nearby
/// search radius around a selected point.
pub const DEFAULT_RADIUS_M: f64 = 500.0;

/// A merged group of hotspot observations.
///
/// `score` and `radius_m` are the maxima over the members, the centroid is the
/// arithmetic mean of the member coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HotspotCluster {
    pub lat: f64,
    pub lon: f64,
    pub score: f64,
    pub radius_m: Option<f64>,
    pub member_count: usize,
}

impl HotspotCluster {
    pub fn center(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    pub fn effective_radius(&self) -> f64 {
        self.radius_m.unwrap_or(DEFAULT_RADIUS_M)
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        point_distance(Point::new(lon, lat), self.center()) <= self.effective_radius()
    }
}

struct ClusterBuilder {
    lat_sum: f64,
    lon_sum: f64,
    score: f64,
    radius_m: Option<f64>,
    member_count: usize,
}

impl ClusterBuilder {
    fn seed(obs: &HotspotObservation) -> Self {
        ClusterBuilder {
            lat_sum: obs.lat,
            lon_sum: obs.lon,
            score: obs.score,
            radius_m: obs.radius_m,
            member_count: 1,
        }
    }

    fn centroid(&self) -> (f64, f64) {
        let n = self.member_count as f64;
        (self.lat_sum / n, self.lon_sum / n)
    }

    fn absorb(&mut self, obs: &HotspotObservation) {
        self.lat_sum += obs.lat;
        self.lon_sum += obs.lon;
        self.score = self.score.max(obs.score);
        // a member without a radius covers DEFAULT_RADIUS_M
        self.radius_m = match (self.radius_m, obs.radius_m) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(DEFAULT_RADIUS_M).max(b.unwrap_or(DEFAULT_RADIUS_M))),
        };
        self.member_count += 1;
    }

    fn finish(self) -> HotspotCluster {
        let (lat, lon) = self.centroid();
        HotspotCluster {
            lat,
            lon,
            score: self.score,
            radius_m: self.radius_m,
            member_count: self.member_count,
        }
    }
}

/// Greedy single-pass merge of observations into clusters.
///
/// Observations are visited by descending score (ties keep input order). Each one
/// joins the first existing cluster, in creation order, whose current centroid lies
/// within `threshold_m`; otherwise it seeds a new cluster. First-fit, not nearest-fit:
/// the outcome depends on visiting order.
pub fn merge_hotspots(observations: &[HotspotObservation], threshold_m: f64) -> Vec<HotspotCluster> {
    let mut ordered: Vec<&HotspotObservation> = observations.iter().collect();
    ordered.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut clusters: Vec<ClusterBuilder> = Vec::new();

    for obs in ordered {
        let target = clusters.iter_mut().find(|cluster| {
            let (lat, lon) = cluster.centroid();
            haversine_distance(obs.lat, obs.lon, lat, lon) <= threshold_m
        });

        match target {
            Some(cluster) => cluster.absorb(obs),
            None => clusters.push(ClusterBuilder::seed(obs)),
        }
    }

    clusters.into_iter().map(ClusterBuilder::finish).collect()
}

/// Clusters sorted by descending score, the order lists are shown in.
pub fn sort_by_score(clusters: &mut [HotspotCluster]) {
    clusters.sort_by(|a, b| b.score.total_cmp(&a.score));
}
