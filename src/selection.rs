use crate::clustering::{DEFAULT_RADIUS_M, HotspotCluster};
use crate::models::Event;
use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Identity of a hotspot across refetches: its coordinates at 5 decimals (~1 m).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct HotspotKey(String);

impl HotspotKey {
    pub fn from_coordinates(lat: f64, lon: f64) -> Self {
        HotspotKey(format!("{}:{}", fixed5(lat), fixed5(lon)))
    }

    pub fn of(cluster: &HotspotCluster) -> Self {
        Self::from_coordinates(cluster.lat, cluster.lon)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HotspotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an event: its own id when it has one, otherwise its location and title.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct EventKey(String);

impl EventKey {
    pub fn of(event: &Event) -> Self {
        if let Some(id) = event.id.as_deref().filter(|id| !id.is_empty()) {
            return EventKey(format!("id:{}", id));
        }

        match event.coordinates() {
            Some((lat, lon)) => EventKey(format!(
                "at:{}:{}:{}",
                fixed5(lat),
                fixed5(lon),
                event.title
            )),
            None => EventKey(format!(
                "title:{}:{}",
                event.title,
                event.start_time.as_deref().unwrap_or("")
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn fixed5(value: f64) -> String {
    // -0.0 would print with a sign
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{:.5}", value)
}

/// Search radius for the nearby-events load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SearchRadius {
    Narrow,
    #[default]
    Standard,
    Wide,
}

impl SearchRadius {
    pub const ALL: [SearchRadius; 3] = [SearchRadius::Narrow, SearchRadius::Standard, SearchRadius::Wide];

    pub fn meters(&self) -> u32 {
        match self {
            SearchRadius::Narrow => 200,
            SearchRadius::Standard => 300,
            SearchRadius::Wide => DEFAULT_RADIUS_M as u32,
        }
    }

    pub fn from_meters(meters: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.meters() == meters)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub enum SelectionState {
    #[default]
    None,
    HotspotSelected {
        key: HotspotKey,
        lat: f64,
        lon: f64,
    },
    PointSelected {
        lat: f64,
        lon: f64,
    },
    EventSelected(EventKey),
}

impl SelectionState {
    pub fn is_none(&self) -> bool {
        matches!(self, SelectionState::None)
    }

    pub fn hotspot_key(&self) -> Option<&HotspotKey> {
        match self {
            SelectionState::HotspotSelected { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn point(&self) -> Option<(f64, f64)> {
        match self {
            SelectionState::PointSelected { lat, lon } => Some((*lat, *lon)),
            _ => None,
        }
    }

    pub fn event_key(&self) -> Option<&EventKey> {
        match self {
            SelectionState::EventSelected(key) => Some(key),
            _ => None,
        }
    }

    /// Center of the nearby-events search, for the states that have one.
    pub fn nearby_center(&self) -> Option<(f64, f64)> {
        match self {
            SelectionState::HotspotSelected { lat, lon, .. } | SelectionState::PointSelected { lat, lon } => {
                Some((*lat, *lon))
            }
            _ => None,
        }
    }
}

/// A nearby-events load issued by a selection transition.
///
/// Only meaningful while [`SelectionController::is_current`] holds for it.
#[derive(Clone, Debug)]
pub struct NearbyLoadRequest {
    pub epoch: u64,
    pub lat: f64,
    pub lon: f64,
    pub radius: SearchRadius,
    pub token: CancellationToken,
}

#[derive(Debug, Default)]
pub struct SelectionController {
    state: SelectionState,
    epoch: u64,
    radius: SearchRadius,
    in_flight: Option<CancellationToken>,
}

impl SelectionController {
    pub fn new(radius: SearchRadius) -> Self {
        SelectionController {
            radius,
            ..Default::default()
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn radius(&self) -> SearchRadius {
        self.radius
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Selects a hotspot, or deselects it when it is already the selection.
    pub fn select_hotspot(&mut self, cluster: &HotspotCluster) -> Option<NearbyLoadRequest> {
        let key = HotspotKey::of(cluster);

        if self.state.hotspot_key() == Some(&key) {
            debug!("hotspot {} toggled off", key);
            self.enter(SelectionState::None);
            return None;
        }

        debug!("hotspot {} selected", key);
        self.enter(SelectionState::HotspotSelected {
            key,
            lat: cluster.lat,
            lon: cluster.lon,
        });
        Some(self.issue_load(cluster.lat, cluster.lon))
    }

    /// Map clicks never toggle off; clicking the same point again issues a fresh load.
    pub fn select_point(&mut self, lat: f64, lon: f64) -> NearbyLoadRequest {
        debug!(lat, lon, "map point selected");
        self.enter(SelectionState::PointSelected { lat, lon });
        self.issue_load(lat, lon)
    }

    pub fn select_event(&mut self, key: EventKey) {
        if self.state.event_key() == Some(&key) {
            debug!("event {} toggled off", key);
            self.enter(SelectionState::None);
        } else {
            debug!("event {} selected", key);
            self.enter(SelectionState::EventSelected(key));
        }
    }

    pub fn clear(&mut self) {
        self.enter(SelectionState::None);
    }

    /// Keys are not stable across a recomputation, so any parameter change drops the selection.
    pub fn on_query_changed(&mut self) {
        if !self.state.is_none() {
            debug!("query changed, dropping selection");
        }
        self.clear();
    }

    /// Changes the search radius, reloading around the current center if there is one.
    pub fn set_radius(&mut self, radius: SearchRadius) -> Option<NearbyLoadRequest> {
        if radius == self.radius {
            return None;
        }
        self.radius = radius;

        let (lat, lon) = self.state.nearby_center()?;
        self.bump();
        Some(self.issue_load(lat, lon))
    }

    /// Whether a load result may still be applied.
    pub fn is_current(&self, request: &NearbyLoadRequest) -> bool {
        request.epoch == self.epoch && !request.token.is_cancelled()
    }

    /// Releases the in-flight token once the load for `request` has been handled.
    pub fn finish(&mut self, request: &NearbyLoadRequest) {
        if self.is_current(request) {
            self.in_flight = None;
        }
    }

    fn enter(&mut self, next: SelectionState) {
        self.bump();
        self.state = next;
    }

    fn bump(&mut self) {
        self.epoch += 1;
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
    }

    fn issue_load(&mut self, lat: f64, lon: f64) -> NearbyLoadRequest {
        let token = CancellationToken::new();
        self.in_flight = Some(token.clone());
        NearbyLoadRequest {
            epoch: self.epoch,
            lat,
            lon,
            radius: self.radius,
            token,
        }
    }
}
