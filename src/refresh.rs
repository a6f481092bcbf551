//! Main data reload, driven by changes to [`QueryParameters`].
//!
//! Every change begins a new [`RefreshTicket`] and cancels the token of the
//! previous one. A result is only committed when its ticket is still the current
//! one, whatever order the network delivers responses in. On failure the last
//! committed snapshot stays in place.

use crate::api_client::{EventQuery, FetchError, HeatmapApi, HotspotQuery};
use crate::display::{NO_DATA_LABEL, TargetMetadata, format_target, weather_summary};
use crate::models::{Event, HeatmapMode, HeatmapResponse, HotspotObservation, QueryParameters, Weather};
use crate::regions::RegionCatalog;
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything one successful refresh produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeatmapSnapshot {
    pub params: QueryParameters,
    pub mode: HeatmapMode,
    pub target: Option<TargetMetadata>,
    pub target_label: String,
    /// Hour the UI shows: the backend's target hour when known.
    pub display_hour: u8,
    pub weather: Option<Weather>,
    pub weather_summary: String,
    pub observations: Vec<HotspotObservation>,
    pub events: Vec<Event>,
}

impl HeatmapSnapshot {
    pub fn build(params: QueryParameters, payload: RefreshPayload, tz: Tz) -> Self {
        let RefreshPayload {
            heatmap,
            fallback_events,
        } = payload;

        let target = heatmap
            .target
            .as_deref()
            .and_then(|raw| format_target(raw, tz));
        let display_hour = target.as_ref().map(|t| t.hour).unwrap_or(params.hour);
        let target_label = target
            .as_ref()
            .map(|t| t.label.clone())
            .unwrap_or_else(|| NO_DATA_LABEL.to_string());
        let weather_summary = weather_summary(heatmap.weather.as_ref(), display_hour);

        let events = match heatmap.events {
            Some(embedded) if !embedded.is_empty() => embedded,
            _ => fallback_events,
        };

        HeatmapSnapshot {
            params,
            mode: heatmap.mode,
            target,
            target_label,
            display_hour,
            weather: heatmap.weather,
            weather_summary,
            observations: heatmap.hotspots,
            events,
        }
    }
}

/// Raw responses of one refresh, before they are turned into a snapshot.
#[derive(Clone, Debug)]
pub struct RefreshPayload {
    pub heatmap: HeatmapResponse,
    pub fallback_events: Vec<Event>,
}

#[derive(Clone, Debug)]
pub struct RefreshTicket {
    generation: u64,
    params: QueryParameters,
    center: Option<(f64, f64)>,
    token: CancellationToken,
}

impl RefreshTicket {
    pub fn params(&self) -> &QueryParameters {
        &self.params
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn hotspot_query(&self) -> HotspotQuery {
        HotspotQuery {
            date: self.params.date,
            hour: self.params.hour,
            mode: self.params.mode,
            center: self.center,
        }
    }

    pub fn event_query(&self) -> EventQuery {
        EventQuery {
            date: self.params.date,
            from_hour: self.params.hour,
            city: None,
        }
    }

    /// Runs the hotspot and fallback-event queries together. A failing event query
    /// degrades to no events; a failing hotspot query fails the refresh. Resolves to
    /// [`FetchError::Cancelled`] as soon as the ticket is superseded.
    pub async fn execute<C: HeatmapApi>(&self, client: &C) -> Result<RefreshPayload, FetchError> {
        let hotspot_query = self.hotspot_query();
        let event_query = self.event_query();

        let work = async {
            let (heatmap, events) = futures::join!(
                client.fetch_heatmap(&hotspot_query),
                client.fetch_events(&event_query)
            );

            let heatmap = heatmap?;
            let fallback_events = events.unwrap_or_else(|e| {
                warn!("Fallback events unavailable: {}", e);
                Vec::new()
            });

            Ok(RefreshPayload {
                heatmap,
                fallback_events,
            })
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(FetchError::Cancelled),
            result = work => result,
        }
    }
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Applied(Arc<HeatmapSnapshot>),
    /// The snapshot shown before the refresh is kept.
    Failed(FetchError),
    /// The ticket was replaced before its result arrived; nothing changed.
    Superseded,
}

#[derive(Debug)]
pub struct RefreshCoordinator {
    regions: RegionCatalog,
    tz: Tz,
    generation: u64,
    params: Option<QueryParameters>,
    in_flight: Option<CancellationToken>,
    snapshot: Option<Arc<HeatmapSnapshot>>,
    loading: bool,
    error: Option<String>,
}

impl RefreshCoordinator {
    pub fn new(regions: RegionCatalog, tz: Tz) -> Self {
        RefreshCoordinator {
            regions,
            tz,
            generation: 0,
            params: None,
            in_flight: None,
            snapshot: None,
            loading: false,
            error: None,
        }
    }

    pub fn params(&self) -> Option<&QueryParameters> {
        self.params.as_ref()
    }

    pub fn snapshot(&self) -> Option<&Arc<HeatmapSnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn regions(&self) -> &RegionCatalog {
        &self.regions
    }

    /// Starts a fetch for `params`, superseding whatever was in flight.
    pub fn begin(&mut self, params: QueryParameters) -> RefreshTicket {
        self.generation += 1;
        if let Some(previous) = self.in_flight.take() {
            debug!("superseding refresh #{}", self.generation - 1);
            previous.cancel();
        }

        let center = match self.regions.find(&params.region_id) {
            Some(region) => Some(region.center()),
            None => {
                warn!("Unknown region '{}', querying without a center", params.region_id);
                None
            }
        };

        let token = CancellationToken::new();
        self.in_flight = Some(token.clone());
        self.params = Some(params.clone());
        self.loading = true;
        self.error = None;

        info!(
            "refresh #{}: {} {} {}h {}",
            self.generation, params.region_id, params.date, params.hour, params.mode
        );

        RefreshTicket {
            generation: self.generation,
            params,
            center,
            token,
        }
    }

    /// Re-issues the current parameters, for an explicit reload.
    pub fn reload(&mut self) -> Option<RefreshTicket> {
        let params = self.params.clone()?;
        Some(self.begin(params))
    }

    pub fn is_current(&self, ticket: &RefreshTicket) -> bool {
        ticket.generation == self.generation && !ticket.token.is_cancelled()
    }

    pub fn commit(
        &mut self,
        ticket: &RefreshTicket,
        result: Result<RefreshPayload, FetchError>,
    ) -> RefreshOutcome {
        if !self.is_current(ticket) || matches!(result, Err(FetchError::Cancelled)) {
            debug!("discarding result of superseded refresh #{}", ticket.generation);
            return RefreshOutcome::Superseded;
        }

        self.in_flight = None;
        self.loading = false;

        match result {
            Ok(payload) => {
                let snapshot = Arc::new(HeatmapSnapshot::build(ticket.params.clone(), payload, self.tz));
                info!(
                    "refresh #{} applied: {} hotspots, {} events",
                    ticket.generation,
                    snapshot.observations.len(),
                    snapshot.events.len()
                );
                self.snapshot = Some(snapshot.clone());
                self.error = None;
                RefreshOutcome::Applied(snapshot)
            }
            Err(e) => {
                warn!("refresh #{} failed: {}", ticket.generation, e);
                self.error = Some(e.to_string());
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// `begin`, `execute` and `commit` in one go.
    pub async fn refresh<C: HeatmapApi>(&mut self, client: &C, params: QueryParameters) -> RefreshOutcome {
        let ticket = self.begin(params);
        let result = ticket.execute(client).await;
        self.commit(&ticket, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::fake::FakeApi;
    use chrono::NaiveDate;
    use chrono_tz::Europe::Madrid;

    fn params(hour: u8) -> QueryParameters {
        QueryParameters {
            region_id: "madrid".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            hour,
            mode: HeatmapMode::Heuristic,
        }
    }

    fn coordinator() -> RefreshCoordinator {
        RefreshCoordinator::new(RegionCatalog::builtin(), Madrid)
    }

    fn top_score(snapshot: &HeatmapSnapshot) -> f64 {
        snapshot
            .observations
            .iter()
            .map(|o| o.score)
            .fold(f64::MIN, f64::max)
    }

    #[tokio::test]
    async fn test_refresh_applies_snapshot() {
        let api = FakeApi::default();
        let mut coordinator = coordinator();

        let snapshot = match coordinator.refresh(&api, params(22)).await {
            RefreshOutcome::Applied(snapshot) => snapshot,
            other => panic!("expected applied, got {:?}", other),
        };

        assert_eq!(snapshot.observations.len(), 3);
        assert_eq!(snapshot.display_hour, 22);
        assert_eq!(snapshot.target_label, "Sábado · 14 Jun 2025 · 22h");
        assert_eq!(snapshot.weather_summary, "🌙 20.0ºC   🌧 0.0 mm   💨 10 km/h");
        assert!(!coordinator.is_loading());
        assert!(coordinator.error().is_none());
    }

    #[test]
    fn test_ticket_queries_carry_region_center() {
        let mut coordinator = coordinator();
        let ticket = coordinator.begin(params(9));
        assert_eq!(ticket.hotspot_query().center, Some((40.4168, -3.7038)));
        assert_eq!(ticket.event_query().from_hour, 9);
        assert!(coordinator.is_loading());

        let mut unknown = params(9);
        unknown.region_id = "atlantis".to_string();
        let ticket = coordinator.begin(unknown);
        assert_eq!(ticket.hotspot_query().center, None);
    }

    #[tokio::test]
    async fn test_display_hour_follows_backend_target() {
        let api = FakeApi {
            snap_hour: Some(21),
            ..Default::default()
        };
        let mut coordinator = coordinator();

        let RefreshOutcome::Applied(snapshot) = coordinator.refresh(&api, params(22)).await else {
            panic!("expected applied");
        };
        assert_eq!(snapshot.params.hour, 22);
        assert_eq!(snapshot.display_hour, 21);
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded_after_newer_commit() {
        let api = FakeApi::default();
        let mut coordinator = coordinator();

        let first = coordinator.begin(params(10));
        // first fetch finishes before the user changes the hour...
        let first_result = Ok(RefreshPayload {
            heatmap: api.fetch_heatmap(&first.hotspot_query()).await.unwrap(),
            fallback_events: Vec::new(),
        });

        let second = coordinator.begin(params(20));
        let second_result = second.execute(&api).await;
        assert!(matches!(
            coordinator.commit(&second, second_result),
            RefreshOutcome::Applied(_)
        ));

        // ...but is only delivered now
        assert!(matches!(
            coordinator.commit(&first, first_result),
            RefreshOutcome::Superseded
        ));

        let snapshot = coordinator.snapshot().unwrap();
        assert_eq!(snapshot.params.hour, 20);
        assert_eq!(top_score(snapshot), FakeApi::score_for_hour(20));
    }

    #[tokio::test]
    async fn test_superseded_ticket_execution_is_cancelled() {
        let api = FakeApi::default();
        let mut coordinator = coordinator();

        let first = coordinator.begin(params(10));
        let _second = coordinator.begin(params(11));
        assert!(first.token().is_cancelled());

        let result = first.execute(&api).await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(matches!(
            coordinator.commit(&first, result),
            RefreshOutcome::Superseded
        ));
        // the newer ticket is still pending
        assert!(coordinator.is_loading());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_snapshot() {
        let mut coordinator = coordinator();
        coordinator.refresh(&FakeApi::default(), params(22)).await;

        let failing = FakeApi {
            heatmap_error: Some((503, "Modelo no disponible".to_string())),
            ..Default::default()
        };
        let outcome = coordinator.refresh(&failing, params(23)).await;
        assert!(matches!(outcome, RefreshOutcome::Failed(FetchError::Status { status: 503, .. })));

        assert_eq!(coordinator.error(), Some("Modelo no disponible"));
        assert!(!coordinator.is_loading());
        assert_eq!(coordinator.snapshot().unwrap().params.hour, 22);

        // a later success clears the error
        coordinator.refresh(&FakeApi::default(), params(23)).await;
        assert!(coordinator.error().is_none());
    }

    #[tokio::test]
    async fn test_fallback_events_failure_is_not_fatal() {
        let api = FakeApi {
            events_error: true,
            ..Default::default()
        };
        let mut coordinator = coordinator();

        let RefreshOutcome::Applied(snapshot) = coordinator.refresh(&api, params(12)).await else {
            panic!("expected applied");
        };
        assert!(snapshot.events.is_empty());
    }

    #[tokio::test]
    async fn test_embedded_events_win_over_fallback() {
        let embedded = Event {
            title: "Embebido".to_string(),
            ..Default::default()
        };
        let fallback = Event {
            title: "Respaldo".to_string(),
            ..Default::default()
        };

        let api = FakeApi {
            embedded_events: vec![embedded],
            fallback_events: vec![fallback.clone()],
            ..Default::default()
        };
        let mut coordinator = coordinator();
        let RefreshOutcome::Applied(snapshot) = coordinator.refresh(&api, params(12)).await else {
            panic!("expected applied");
        };
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.events[0].title, "Embebido");

        let api = FakeApi {
            fallback_events: vec![fallback],
            ..Default::default()
        };
        let RefreshOutcome::Applied(snapshot) = coordinator.refresh(&api, params(12)).await else {
            panic!("expected applied");
        };
        assert_eq!(snapshot.events[0].title, "Respaldo");
    }

    #[tokio::test]
    async fn test_reload_reissues_current_params() {
        let mut coordinator = coordinator();
        assert!(coordinator.reload().is_none());

        let first = coordinator.begin(params(8));
        let reload = coordinator.reload().unwrap();
        assert_eq!(reload.params(), first.params());
        assert!(!coordinator.is_current(&first));
        assert!(coordinator.is_current(&reload));
    }

    #[test]
    fn test_snapshot_without_target() {
        let payload = RefreshPayload {
            heatmap: HeatmapResponse::default(),
            fallback_events: Vec::new(),
        };
        let snapshot = HeatmapSnapshot::build(params(17), payload, Madrid);
        assert_eq!(snapshot.target_label, NO_DATA_LABEL);
        assert_eq!(snapshot.display_hour, 17);
        assert_eq!(snapshot.weather_summary, "");
    }
}
