use crate::clustering::HotspotCluster;
use crate::models::Event;

/// Highest score among the clusters whose radius covers the point.
pub fn containing_score(lat: f64, lon: f64, clusters: &[HotspotCluster]) -> Option<f64> {
    clusters
        .iter()
        .filter(|cluster| cluster.contains(lat, lon))
        .map(|cluster| cluster.score)
        .reduce(f64::max)
}

/// Returns a copy of `events` where every event without a score takes the best
/// score of the clusters containing it. Existing scores are never touched; events
/// without coordinates, or outside every cluster, stay unscored.
pub fn enrich_events(events: &[Event], clusters: &[HotspotCluster]) -> Vec<Event> {
    events
        .iter()
        .map(|event| {
            if event.score.is_some() {
                return event.clone();
            }

            let score = event
                .coordinates()
                .and_then(|(lat, lon)| containing_score(lat, lon, clusters));

            Event {
                score,
                ..event.clone()
            }
        })
        .collect()
}
