//! Map view controller.
//!
//! Holds the per-session view state (active trip, pan and zoom, selection,
//! overlay toggles, drag gesture) in an explicit [`SessionState`] and turns
//! user gestures into store calls and re-renders on whichever
//! [`MapRenderer`] was chosen at startup.
//!
//! State machine, as reported by [`SessionState::state`]:
//!
//! ```text
//! Inactive --enter_trip--> Idle --pointer_down--> Dragging --pointer_up--> Idle
//! Idle --marker click / marker added--> MarkerSelected(id) --close--> Idle
//! any --leave_trip--> Inactive
//! ```

use log::{debug, info};
use serde::Serialize;

use crate::blob_store::BlobStore;
use crate::error::TripError;
use crate::model::{Image, LatLng, Marker, MarkerId, TripId};
use crate::projector::{ScreenPoint, ViewTransform};
use crate::renderer::{
    MapRenderer, PlaceLabel, RenderFrame, RendererKind, ZoomDirection, WIDGET_FOCUS_ZOOM,
    WIDGET_SEARCH_ZOOM,
};
use crate::store::{CascadeReport, EntityStore};

/// Pointer travel (px) below which a press-release still counts as a click.
pub const DRAG_THRESHOLD: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewState {
    Inactive,
    Idle,
    Dragging,
    MarkerSelected(MarkerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct DragGesture {
    /// Pointer position minus pan at press time.
    anchor: ScreenPoint,
    pressed_at: ScreenPoint,
    moved: bool,
}

/// View state for one map session.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub trip_id: Option<TripId>,
    pub view: ViewTransform,
    pub selected: Option<MarkerId>,
    pub show_routes: bool,
    pub show_traffic: bool,
    drag: Option<DragGesture>,
    swallow_click: bool,
}

impl SessionState {
    pub fn state(&self) -> ViewState {
        match (self.trip_id, self.drag, self.selected) {
            (None, _, _) => ViewState::Inactive,
            (Some(_), Some(_), _) => ViewState::Dragging,
            (Some(_), None, Some(id)) => ViewState::MarkerSelected(id),
            (Some(_), None, None) => ViewState::Idle,
        }
    }

    fn entered(trip_id: TripId) -> Self {
        Self {
            trip_id: Some(trip_id),
            ..Self::default()
        }
    }
}

/// What the presentation layer needs after a redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSummary {
    pub marker_count: usize,
    pub show_add_hint: bool,
    pub selected: Option<MarkerId>,
    pub renderer: RendererKind,
}

/// One row of the marker list sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerListRow {
    /// 1-based position shown next to the row.
    pub number: usize,
    pub marker: Marker,
    pub image_count: usize,
    pub thumbnail: Option<String>,
    pub category_color: Option<&'static str>,
}

/// Info panel content for the selected marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerDetails {
    pub marker: Marker,
    pub coordinates: String,
    pub images: Vec<Image>,
}

pub struct MapViewController {
    renderer: Box<dyn MapRenderer>,
    session: SessionState,
}

impl MapViewController {
    pub fn new(renderer: Box<dyn MapRenderer>) -> Self {
        Self::with_session(renderer, SessionState::default())
    }

    /// Resumes a previously captured session.
    pub fn with_session(renderer: Box<dyn MapRenderer>, session: SessionState) -> Self {
        info!("Map view controller using {:?} renderer", renderer.kind());
        Self { renderer, session }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn into_session(self) -> SessionState {
        self.session
    }

    pub fn state(&self) -> ViewState {
        self.session.state()
    }

    pub fn renderer(&self) -> &dyn MapRenderer {
        self.renderer.as_ref()
    }

    /// Opens a trip's map: resets pan, zoom, selection and overlays, draws and
    /// fits the markers. `Ok(None)` if the trip does not exist.
    pub fn enter_trip<B: BlobStore>(
        &mut self,
        store: &EntityStore<B>,
        trip_id: TripId,
    ) -> Result<Option<RenderSummary>, TripError> {
        let Some(trip) = store.trip(trip_id) else {
            return Ok(None);
        };
        info!("Entering trip {} '{}'", trip.id, trip.name);
        self.session = SessionState::entered(trip_id);
        self.renderer.set_traffic(false);
        self.render(store);
        Ok(self.fit_all_markers(store))
    }

    /// Back to the trip list. The view reports [`ViewState::Inactive`]
    /// afterwards rather than `Idle`, since `Idle` means a trip is open with
    /// nothing selected.
    pub fn leave_trip(&mut self) {
        if let Some(trip_id) = self.session.trip_id {
            debug!("Leaving trip {trip_id}");
        }
        self.session = SessionState::default();
    }

    /// Redraws the active trip. `None` when no trip is open.
    pub fn render<B: BlobStore>(&mut self, store: &EntityStore<B>) -> Option<RenderSummary> {
        let trip_id = self.session.trip_id?;
        let markers = store.list_markers(trip_id);
        if let Some(id) = self.session.selected {
            if !markers.iter().any(|m| m.id == id) {
                self.session.selected = None;
            }
        }
        let frame = RenderFrame {
            markers: &markers,
            selected: self.session.selected,
            show_routes: self.session.show_routes,
            view: self.session.view,
        };
        self.renderer.render(&frame);
        Some(RenderSummary {
            marker_count: markers.len(),
            show_add_hint: markers.is_empty(),
            selected: self.session.selected,
            renderer: self.renderer.kind(),
        })
    }

    // Gestures

    pub fn pointer_down(&mut self, at: ScreenPoint) {
        if self.session.trip_id.is_none() {
            return;
        }
        let pan = self.session.view.pan;
        self.session.drag = Some(DragGesture {
            anchor: ScreenPoint::new(at.x - pan.x, at.y - pan.y),
            pressed_at: at,
            moved: false,
        });
    }

    pub fn pointer_move<B: BlobStore>(
        &mut self,
        store: &EntityStore<B>,
        at: ScreenPoint,
    ) -> Option<RenderSummary> {
        let drag = self.session.drag.as_mut()?;
        if at.distance(drag.pressed_at) > DRAG_THRESHOLD {
            drag.moved = true;
        }
        self.session.view.pan = ScreenPoint::new(at.x - drag.anchor.x, at.y - drag.anchor.y);
        self.render(store)
    }

    pub fn pointer_up(&mut self) {
        if let Some(drag) = self.session.drag.take() {
            self.session.swallow_click = drag.moved;
        }
    }

    /// Click on the map background of the fallback canvas: adds a marker at
    /// the unprojected coordinate. A click that ends a drag is ignored.
    pub fn background_click<B: BlobStore>(
        &mut self,
        store: &mut EntityStore<B>,
        at: ScreenPoint,
    ) -> Result<Option<Marker>, TripError> {
        if std::mem::take(&mut self.session.swallow_click) {
            debug!("Click after drag ignored");
            return Ok(None);
        }
        if self.session.trip_id.is_none() {
            return Ok(None);
        }
        let Some(position) = self.renderer.unproject(at, &self.session.view) else {
            return Ok(None);
        };
        self.add_marker_at(store, position.lat, position.lng)
    }

    /// Click reported by the live widget, already in map coordinates.
    pub fn map_clicked<B: BlobStore>(
        &mut self,
        store: &mut EntityStore<B>,
        lat: f64,
        lng: f64,
    ) -> Result<Option<Marker>, TripError> {
        self.add_marker_at(store, lat, lng)
    }

    pub fn marker_clicked<B: BlobStore>(
        &mut self,
        store: &EntityStore<B>,
        marker_id: MarkerId,
    ) -> Option<RenderSummary> {
        self.select_marker(store, marker_id)
    }

    // Operations

    /// Creates a marker in the active trip, labelled by the renderer's reverse
    /// geocoder or by its coordinates, then selects it.
    pub fn add_marker_at<B: BlobStore>(
        &mut self,
        store: &mut EntityStore<B>,
        lat: f64,
        lng: f64,
    ) -> Result<Option<Marker>, TripError> {
        let at = LatLng::checked(lat, lng)?;
        let label = self
            .renderer
            .reverse_geocode(at)
            .unwrap_or_else(|| PlaceLabel::from_coordinates(at));
        self.add_labelled_marker(store, at, &label.title, &label.address)
    }

    /// Creates a marker with a known title and address (from search), skipping
    /// reverse geocoding.
    pub fn add_labelled_marker<B: BlobStore>(
        &mut self,
        store: &mut EntityStore<B>,
        at: LatLng,
        title: &str,
        address: &str,
    ) -> Result<Option<Marker>, TripError> {
        let Some(trip_id) = self.session.trip_id else {
            return Ok(None);
        };
        let marker = store.create_marker(trip_id, at.lat, at.lng, title, address)?;
        info!("Added marker {} '{}' to trip {trip_id}", marker.id, marker.title);
        self.select_marker(store, marker.id);
        Ok(Some(marker))
    }

    /// Recenters on a search hit before its marker is added.
    pub fn focus_search_result(&mut self, at: LatLng) {
        if self.session.trip_id.is_some() {
            self.renderer.focus(at, WIDGET_SEARCH_ZOOM, &mut self.session.view);
        }
    }

    /// Selects a marker of the active trip and brings it into focus.
    /// `None` if the marker is unknown or belongs to another trip.
    pub fn select_marker<B: BlobStore>(
        &mut self,
        store: &EntityStore<B>,
        marker_id: MarkerId,
    ) -> Option<RenderSummary> {
        let trip_id = self.session.trip_id?;
        let position = store
            .marker(marker_id)
            .filter(|m| m.trip_id == trip_id)?
            .position();
        self.session.selected = Some(marker_id);
        self.renderer.focus(position, WIDGET_FOCUS_ZOOM, &mut self.session.view);
        debug!("Selected marker {marker_id}");
        self.render(store)
    }

    pub fn close_marker_info<B: BlobStore>(&mut self, store: &EntityStore<B>) -> Option<RenderSummary> {
        self.session.selected = None;
        self.render(store)
    }

    pub fn selected_details<B: BlobStore>(&self, store: &EntityStore<B>) -> Option<MarkerDetails> {
        let marker = store.marker(self.session.selected?)?.clone();
        Some(MarkerDetails {
            coordinates: format!("{:.6}, {:.6}", marker.latitude, marker.longitude),
            images: store.list_images(marker.id),
            marker,
        })
    }

    pub fn delete_selected_marker<B: BlobStore>(
        &mut self,
        store: &mut EntityStore<B>,
    ) -> Result<Option<CascadeReport>, TripError> {
        let Some(marker_id) = self.session.selected else {
            return Ok(None);
        };
        let report = store.delete_marker(marker_id)?;
        self.close_marker_info(store);
        Ok(report)
    }

    /// Deletes every marker of the active trip. Fails with `Validation` when
    /// there is nothing to clear.
    pub fn clear_markers<B: BlobStore>(
        &mut self,
        store: &mut EntityStore<B>,
    ) -> Result<CascadeReport, TripError> {
        let Some(trip_id) = self.session.trip_id else {
            return Ok(CascadeReport::default());
        };
        if store.marker_count(trip_id) == 0 {
            return Err(TripError::validation("no markers to clear"));
        }
        let report = store.clear_markers(trip_id)?;
        self.close_marker_info(store);
        Ok(report)
    }

    pub fn zoom_in<B: BlobStore>(&mut self, store: &EntityStore<B>) -> Option<RenderSummary> {
        self.zoom(store, ZoomDirection::In)
    }

    pub fn zoom_out<B: BlobStore>(&mut self, store: &EntityStore<B>) -> Option<RenderSummary> {
        self.zoom(store, ZoomDirection::Out)
    }

    fn zoom<B: BlobStore>(
        &mut self,
        store: &EntityStore<B>,
        direction: ZoomDirection,
    ) -> Option<RenderSummary> {
        self.session.trip_id?;
        self.renderer.zoom(direction, &mut self.session.view);
        self.render(store)
    }

    /// Flips route lines. `None` when no trip is open.
    pub fn toggle_routes<B: BlobStore>(&mut self, store: &EntityStore<B>) -> Option<bool> {
        self.session.trip_id?;
        self.session.show_routes = !self.session.show_routes;
        self.render(store);
        Some(self.session.show_routes)
    }

    pub fn toggle_traffic(&mut self) -> Option<bool> {
        self.session.trip_id?;
        self.session.show_traffic = !self.session.show_traffic;
        self.renderer.set_traffic(self.session.show_traffic);
        Some(self.session.show_traffic)
    }

    /// Fits the view around every marker of the active trip; with no markers
    /// the view returns to its default pan and zoom.
    pub fn fit_all_markers<B: BlobStore>(&mut self, store: &EntityStore<B>) -> Option<RenderSummary> {
        let trip_id = self.session.trip_id?;
        let markers = store.list_markers(trip_id);
        self.renderer.fit(&markers, &mut self.session.view);
        self.render(store)
    }

    pub fn marker_list<B: BlobStore>(&self, store: &EntityStore<B>) -> Vec<MarkerListRow> {
        let Some(trip_id) = self.session.trip_id else {
            return Vec::new();
        };
        store
            .list_markers(trip_id)
            .into_iter()
            .enumerate()
            .map(|(index, marker)| {
                let images = store.list_images(marker.id);
                MarkerListRow {
                    number: index + 1,
                    image_count: images.len(),
                    thumbnail: images.into_iter().next().map(|img| img.data_url),
                    category_color: marker.category.map(|c| c.color()),
                    marker,
                }
            })
            .collect()
    }

    /// Drag-reorder from the marker list; routes follow the new order.
    pub fn reorder_markers<B: BlobStore>(
        &mut self,
        store: &mut EntityStore<B>,
        dragged_id: MarkerId,
        target_id: MarkerId,
    ) -> Result<bool, TripError> {
        let Some(trip_id) = self.session.trip_id else {
            return Ok(false);
        };
        let moved = store.reorder_markers(trip_id, dragged_id, target_id)?;
        if moved {
            self.render(store);
        }
        Ok(moved)
    }
}
