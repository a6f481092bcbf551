//! One map view: the current query, its last snapshot and derived clusters, the
//! selection and the nearby-events panel.
//!
//! The session never performs I/O by itself. Transitions hand out tickets and load
//! requests; callers run them against a [`HeatmapApi`] and feed the results back
//! through `commit_*`. The async helpers at the bottom do both steps in one call.

use crate::api_client::{FetchError, HeatmapApi, NearbyQuery};
use crate::clustering::{HotspotCluster, merge_hotspots, sort_by_score};
use crate::config::{ConfigError, EngineConfig};
use crate::correlation::enrich_events;
use crate::density::{TierCounts, TierFilter, peak_score};
use crate::display::NO_DATA_LABEL;
use crate::models::{Event, NearbyEvent, QueryParameters};
use crate::refresh::{HeatmapSnapshot, RefreshCoordinator, RefreshOutcome, RefreshPayload, RefreshTicket};
use crate::regions::RegionCatalog;
use crate::selection::{EventKey, HotspotKey, NearbyLoadRequest, SearchRadius, SelectionController, SelectionState};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NearbyState {
    pub events: Vec<NearbyEvent>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum NearbyOutcome {
    Applied(usize),
    Failed(String),
    /// The selection moved on before the result arrived.
    Discarded,
}

pub struct MapSession {
    config: EngineConfig,
    refresh: RefreshCoordinator,
    selection: SelectionController,
    nearby: NearbyState,
    tier_filter: TierFilter,
    clusters: Vec<HotspotCluster>,
    events: Vec<Event>,
}

impl MapSession {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_regions(config, RegionCatalog::builtin())
    }

    pub fn with_regions(config: EngineConfig, regions: RegionCatalog) -> Result<Self, ConfigError> {
        config.validate()?;
        let tz = config.tz()?;
        let radius = config.search_radius()?;

        Ok(MapSession {
            refresh: RefreshCoordinator::new(regions, tz),
            selection: SelectionController::new(radius),
            nearby: NearbyState::default(),
            tier_filter: TierFilter::default(),
            clusters: Vec::new(),
            events: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn regions(&self) -> &RegionCatalog {
        self.refresh.regions()
    }

    pub fn params(&self) -> Option<&QueryParameters> {
        self.refresh.params()
    }

    pub fn snapshot(&self) -> Option<&Arc<HeatmapSnapshot>> {
        self.refresh.snapshot()
    }

    // Query and refresh

    /// Applies new query parameters. Any selection is dropped since hotspot keys
    /// do not survive a recomputation.
    pub fn set_query(&mut self, params: QueryParameters) -> RefreshTicket {
        self.reset_selection();
        self.refresh.begin(params)
    }

    pub fn reload(&mut self) -> Option<RefreshTicket> {
        let params = self.refresh.params()?.clone();
        Some(self.set_query(params))
    }

    pub fn commit_refresh(
        &mut self,
        ticket: &RefreshTicket,
        result: Result<RefreshPayload, FetchError>,
    ) -> RefreshOutcome {
        let outcome = self.refresh.commit(ticket, result);

        if let RefreshOutcome::Applied(snapshot) = &outcome {
            let mut clusters = merge_hotspots(&snapshot.observations, self.config.merge_threshold_m);
            sort_by_score(&mut clusters);
            self.events = enrich_events(&snapshot.events, &clusters);
            debug!(
                "{} observations merged into {} clusters",
                snapshot.observations.len(),
                clusters.len()
            );
            self.clusters = clusters;
        }

        outcome
    }

    pub fn is_loading(&self) -> bool {
        self.refresh.is_loading()
    }

    pub fn error(&self) -> Option<&str> {
        self.refresh.error()
    }

    // Derived views

    /// Clusters of the last snapshot, highest score first.
    pub fn clusters(&self) -> &[HotspotCluster] {
        &self.clusters
    }

    /// Snapshot events, scored from the clusters where they had no score.
    pub fn enriched_events(&self) -> &[Event] {
        &self.events
    }

    pub fn tier_filter(&self) -> TierFilter {
        self.tier_filter
    }

    pub fn set_tier_filter(&mut self, filter: TierFilter) {
        self.tier_filter = filter;
    }

    pub fn visible_clusters(&self) -> Vec<&HotspotCluster> {
        self.tier_filter.clusters(&self.clusters)
    }

    pub fn visible_events(&self) -> Vec<&Event> {
        self.tier_filter.events(&self.events)
    }

    pub fn tier_counts(&self) -> TierCounts {
        TierCounts::of_clusters(&self.clusters)
    }

    pub fn peak_score(&self) -> Option<f64> {
        peak_score(&self.clusters)
    }

    pub fn target_label(&self) -> &str {
        self.snapshot()
            .map(|s| s.target_label.as_str())
            .unwrap_or(NO_DATA_LABEL)
    }

    pub fn weather_summary(&self) -> &str {
        self.snapshot().map(|s| s.weather_summary.as_str()).unwrap_or("")
    }

    /// The backend's target hour when known, else the requested one.
    pub fn display_hour(&self) -> Option<u8> {
        self.snapshot()
            .map(|s| s.display_hour)
            .or_else(|| self.params().map(|p| p.hour))
    }

    // Selection

    pub fn selection(&self) -> &SelectionState {
        self.selection.state()
    }

    pub fn radius(&self) -> SearchRadius {
        self.selection.radius()
    }

    pub fn selected_cluster(&self) -> Option<&HotspotCluster> {
        let key = self.selection.state().hotspot_key()?;
        self.clusters.iter().find(|c| &HotspotKey::of(c) == key)
    }

    pub fn selected_event(&self) -> Option<&Event> {
        let key = self.selection.state().event_key()?;
        self.events.iter().find(|e| &EventKey::of(e) == key)
    }

    pub fn select_hotspot(&mut self, cluster: &HotspotCluster) -> Option<NearbyLoadRequest> {
        let request = self.selection.select_hotspot(cluster);
        self.start_nearby(request.is_some());
        request
    }

    pub fn select_point(&mut self, lat: f64, lon: f64) -> NearbyLoadRequest {
        let request = self.selection.select_point(lat, lon);
        self.start_nearby(true);
        request
    }

    pub fn select_event(&mut self, key: EventKey) {
        self.selection.select_event(key);
        self.start_nearby(false);
    }

    pub fn clear_selection(&mut self) {
        self.reset_selection();
    }

    /// Changes the search radius; reloads the nearby list if a center is selected.
    pub fn set_radius(&mut self, radius: SearchRadius) -> Option<NearbyLoadRequest> {
        let request = self.selection.set_radius(radius)?;
        self.start_nearby(true);
        Some(request)
    }

    pub fn nearby(&self) -> &NearbyState {
        &self.nearby
    }

    /// Nearby query for `request`, dated by the current query parameters.
    pub fn nearby_query(&self, request: &NearbyLoadRequest) -> Option<NearbyQuery> {
        let params = self.refresh.params()?;
        Some(NearbyQuery {
            lat: request.lat,
            lon: request.lon,
            date: params.date,
            hour: params.hour,
            radius_m: request.radius.meters(),
            limit: self.config.nearby_limit,
        })
    }

    pub fn commit_nearby(
        &mut self,
        request: &NearbyLoadRequest,
        result: Result<Vec<NearbyEvent>, FetchError>,
    ) -> NearbyOutcome {
        if !self.selection.is_current(request) || matches!(result, Err(FetchError::Cancelled)) {
            debug!("discarding nearby result of selection epoch {}", request.epoch);
            return NearbyOutcome::Discarded;
        }

        self.selection.finish(request);
        self.nearby.loading = false;

        match result {
            Ok(events) => {
                let count = events.len();
                self.nearby.events = events;
                self.nearby.error = None;
                NearbyOutcome::Applied(count)
            }
            Err(e) => {
                warn!("nearby events failed: {}", e);
                let message = e.to_string();
                self.nearby.error = Some(message.clone());
                NearbyOutcome::Failed(message)
            }
        }
    }

    fn reset_selection(&mut self) {
        self.selection.on_query_changed();
        self.nearby = NearbyState::default();
    }

    fn start_nearby(&mut self, loading: bool) {
        self.nearby = NearbyState {
            loading,
            ..Default::default()
        };
    }

    // Runners

    pub async fn refresh<C: HeatmapApi>(&mut self, client: &C, params: QueryParameters) -> RefreshOutcome {
        let ticket = self.set_query(params);
        let result = ticket.execute(client).await;
        self.commit_refresh(&ticket, result)
    }

    pub async fn load_nearby<C: HeatmapApi>(&mut self, client: &C, request: &NearbyLoadRequest) -> NearbyOutcome {
        let Some(query) = self.nearby_query(request) else {
            warn!("nearby load requested before any query was set");
            self.nearby.loading = false;
            return NearbyOutcome::Discarded;
        };

        let result = tokio::select! {
            biased;
            _ = request.token.cancelled() => Err(FetchError::Cancelled),
            r = client.fetch_nearby_events(&query) => r,
        };
        self.commit_nearby(request, result)
    }
}
