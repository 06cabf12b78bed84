//! Place search: debounced suggestions, explicit full search, and turning a
//! picked result into a marker.
//!
//! Every query carries a sequence number. Any newer keystroke, submit or
//! clear takes a fresh number, and a response is applied only when its number
//! is still the latest. Responses can arrive in any order and late ones are
//! dropped; nothing in flight is cancelled.
//!
//! Time is passed in by the caller (`now`) so the adapter has no timers of its
//! own; the host calls [`SearchAdapter::poll`] from its event loop.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;

use crate::blob_store::BlobStore;
use crate::controller::MapViewController;
use crate::error::TripError;
use crate::model::{LatLng, Marker};
use crate::store::EntityStore;

pub const SUGGESTION_DEBOUNCE: Duration = Duration::from_millis(300);
pub const SERVICE_RETRY_BACKOFF: Duration = Duration::from_millis(500);
pub const MAX_SUGGESTIONS: usize = 8;
pub const MAX_RESULTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTiming {
    pub debounce: Duration,
    pub retry_backoff: Duration,
}

impl Default for SearchTiming {
    fn default() -> Self {
        Self {
            debounce: SUGGESTION_DEBOUNCE,
            retry_backoff: SERVICE_RETRY_BACKOFF,
        }
    }
}

/// A suggestion or search hit as the provider reports it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub name: String,
    pub address: String,
    pub location: Option<LatLng>,
    pub distance_m: Option<f64>,
    pub kind: Option<String>,
}

impl Place {
    /// Address plus distance, e.g. `"1 Main St · 1.2km"`.
    pub fn detail_line(&self) -> String {
        match self.distance_m {
            Some(d) => format!("{} · {:.1}km", self.address, d / 1000.0),
            None => self.address.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Vec<Place>),
    NoData,
    Failed(String),
}

/// The external suggestion and place-search capabilities. Requests are fire
/// and forget; answers come back through [`SearchAdapter::on_suggestions`] and
/// [`SearchAdapter::on_search_results`] with the same `seq`.
pub trait SearchProvider {
    fn is_ready(&self) -> bool;
    fn request_suggestions(&mut self, seq: u64, text: &str);
    fn request_places(&mut self, seq: u64, text: &str);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "places")]
pub enum SearchPanel {
    Hidden,
    /// Full search is waiting for the capability to come up.
    Loading,
    Suggestions(Vec<Place>),
    Results(Vec<Place>),
    NoResults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Suggest,
    Search,
}

#[derive(Debug, Clone)]
struct Query {
    seq: u64,
    kind: QueryKind,
    text: String,
    retried_no_data: bool,
}

/// A picked result, ready to become a marker.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceSelection {
    pub at: LatLng,
    pub name: String,
    pub address: String,
}

pub struct SearchAdapter {
    timing: SearchTiming,
    seq: u64,
    input: String,
    scheduled: Option<(Instant, Query)>,
    in_flight: Option<Query>,
    panel: SearchPanel,
}

impl Default for SearchAdapter {
    fn default() -> Self {
        Self::new(SearchTiming::default())
    }
}

impl SearchAdapter {
    pub fn new(timing: SearchTiming) -> Self {
        Self {
            timing,
            seq: 0,
            input: String::new(),
            scheduled: None,
            in_flight: None,
            panel: SearchPanel::Hidden,
        }
    }

    pub fn panel(&self) -> &SearchPanel {
        &self.panel
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Sequence number a response must carry to be applied.
    pub fn latest_seq(&self) -> u64 {
        self.seq
    }

    fn supersede(&mut self) -> u64 {
        self.seq += 1;
        self.in_flight = None;
        self.scheduled = None;
        self.seq
    }

    /// Keystroke in the search box. Schedules a suggestion query after the
    /// debounce delay; blank input hides the panel.
    pub fn input_changed(&mut self, text: &str, now: Instant) {
        self.input = text.to_string();
        let seq = self.supersede();
        let keyword = text.trim();
        if keyword.is_empty() {
            self.panel = SearchPanel::Hidden;
            return;
        }
        let query = Query {
            seq,
            kind: QueryKind::Suggest,
            text: keyword.to_string(),
            retried_no_data: false,
        };
        self.scheduled = Some((now + self.timing.debounce, query));
    }

    /// Explicit submit: a full search right away, no debounce.
    pub fn submit(&mut self, provider: &mut dyn SearchProvider, now: Instant) -> Option<u64> {
        let keyword = self.input.trim().to_string();
        if keyword.is_empty() {
            return None;
        }
        let seq = self.supersede();
        let query = Query {
            seq,
            kind: QueryKind::Search,
            text: keyword,
            retried_no_data: false,
        };
        self.issue(provider, query, now)
    }

    /// Fires a scheduled query once its time has come. Returns the sequence
    /// number of the request sent, if any.
    pub fn poll(&mut self, provider: &mut dyn SearchProvider, now: Instant) -> Option<u64> {
        let due = matches!(&self.scheduled, Some((at, _)) if *at <= now);
        if !due {
            return None;
        }
        let (_, query) = self.scheduled.take()?;
        self.issue(provider, query, now)
    }

    fn issue(&mut self, provider: &mut dyn SearchProvider, query: Query, now: Instant) -> Option<u64> {
        if !provider.is_ready() {
            warn!(
                "Search capability not ready; retrying '{}' in {:?}",
                query.text, self.timing.retry_backoff
            );
            if query.kind == QueryKind::Search {
                self.panel = SearchPanel::Loading;
            }
            self.scheduled = Some((now + self.timing.retry_backoff, query));
            return None;
        }
        match query.kind {
            QueryKind::Suggest => provider.request_suggestions(query.seq, &query.text),
            QueryKind::Search => provider.request_places(query.seq, &query.text),
        }
        debug!("Issued {:?} query #{} for '{}'", query.kind, query.seq, query.text);
        let seq = query.seq;
        self.in_flight = Some(query);
        Some(seq)
    }

    fn accept(&mut self, seq: u64, kind: QueryKind) -> Option<Query> {
        let current = seq == self.seq
            && matches!(&self.in_flight, Some(q) if q.seq == seq && q.kind == kind);
        if !current {
            warn!("Discarding stale {kind:?} response #{seq} (latest #{})", self.seq);
            return None;
        }
        self.in_flight.take()
    }

    /// Applies a suggestion response. Returns `false` if it was stale.
    pub fn on_suggestions(&mut self, seq: u64, outcome: SearchOutcome) -> bool {
        if self.accept(seq, QueryKind::Suggest).is_none() {
            return false;
        }
        let places = match outcome {
            SearchOutcome::Found(places) => with_location(places, MAX_SUGGESTIONS),
            SearchOutcome::NoData | SearchOutcome::Failed(_) => Vec::new(),
        };
        self.panel = if places.is_empty() {
            SearchPanel::Hidden
        } else {
            SearchPanel::Suggestions(places)
        };
        true
    }

    /// Applies a full-search response. A first `NoData` is retried once with
    /// the same text. Returns `false` if the response was stale.
    pub fn on_search_results(
        &mut self,
        provider: &mut dyn SearchProvider,
        seq: u64,
        outcome: SearchOutcome,
        now: Instant,
    ) -> bool {
        let Some(query) = self.accept(seq, QueryKind::Search) else {
            return false;
        };
        match outcome {
            SearchOutcome::Found(places) => {
                let places = with_location(places, MAX_RESULTS);
                self.panel = if places.is_empty() {
                    SearchPanel::NoResults
                } else {
                    SearchPanel::Results(places)
                };
            }
            SearchOutcome::NoData if !query.retried_no_data => {
                debug!("No data for '{}'; searching once more", query.text);
                let retry = Query {
                    retried_no_data: true,
                    ..query
                };
                self.issue(provider, retry, now);
            }
            SearchOutcome::NoData => self.panel = SearchPanel::NoResults,
            SearchOutcome::Failed(reason) => {
                warn!("Place search failed: {reason}");
                self.panel = SearchPanel::NoResults;
            }
        }
        true
    }

    /// Picks entry `index` of the visible list. Hides the list and puts the
    /// place name in the search box.
    pub fn select(&mut self, index: usize) -> Option<PlaceSelection> {
        let place = match &self.panel {
            SearchPanel::Suggestions(places) | SearchPanel::Results(places) => places.get(index)?,
            _ => return None,
        };
        let selection = PlaceSelection {
            at: place.location?,
            name: place.name.clone(),
            address: place.address.clone(),
        };
        self.input = selection.name.clone();
        self.supersede();
        self.panel = SearchPanel::Hidden;
        info!("Picked search result '{}'", selection.name);
        Some(selection)
    }

    pub fn dismiss(&mut self) {
        self.panel = SearchPanel::Hidden;
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.supersede();
        self.panel = SearchPanel::Hidden;
    }
}

fn with_location(places: Vec<Place>, limit: usize) -> Vec<Place> {
    places
        .into_iter()
        .filter(|p| p.location.is_some())
        .take(limit)
        .collect()
}

/// Recenters on a picked place and adds it as a marker. The place's own name
/// and address are used when both are present; otherwise the coordinate is
/// reverse geocoded like a map click.
pub fn add_selected_place<B: BlobStore>(
    controller: &mut MapViewController,
    store: &mut EntityStore<B>,
    selection: &PlaceSelection,
) -> Result<Option<Marker>, TripError> {
    controller.focus_search_result(selection.at);
    if selection.name.trim().is_empty() || selection.address.trim().is_empty() {
        return controller.add_marker_at(store, selection.at.lat, selection.at.lng);
    }
    controller.add_labelled_marker(store, selection.at, &selection.name, &selection.address)
}
