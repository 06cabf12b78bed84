//! Rendering backends for the map view.
//!
//! The controller talks to a [`MapRenderer`] only. Two implementations exist:
//! [`LiveMapRenderer`] drives an external [`MapWidget`], and
//! [`ProjectedCanvasRenderer`] lays markers out with the [`Projector`] when no
//! widget is available. [`select_backend`] picks one at startup and the
//! choice holds for the whole session.

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::TripError;
use crate::model::{LatLng, Marker, MarkerId, DEFAULT_MARKER_COLOR};
use crate::projector::{Projector, ScreenPoint, ViewTransform, FOCUS_ZOOM, ZOOM_STEP};

/// Widget zoom level used when a marker is selected.
pub const WIDGET_FOCUS_ZOOM: u8 = 16;

/// Widget zoom level used when jumping to a search result.
pub const WIDGET_SEARCH_ZOOM: u8 = 15;

/// Half-length of the direction arrow drawn on fallback route segments.
pub const ARROW_SIZE: f64 = 8.0;

/// Angle (radians) between the arrow tip and each of its wings.
const ARROW_WING_ANGLE: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RendererKind {
    LiveWidget,
    ProjectedCanvas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

/// Title and address resolved for a coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceLabel {
    pub title: String,
    pub address: String,
}

impl PlaceLabel {
    /// Coordinate-based label used when no geocoder answers.
    pub fn from_coordinates(at: LatLng) -> Self {
        Self {
            title: format!("Location {:.4}, {:.4}", at.lat, at.lng),
            address: format!("Lat: {:.4}, Lng: {:.4}", at.lat, at.lng),
        }
    }
}

/// What a backend needs to draw one marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerPin {
    pub marker_id: MarkerId,
    pub position: LatLng,
    pub title: String,
    pub color: String,
    pub selected: bool,
}

impl MarkerPin {
    fn new(marker: &Marker, selected: Option<MarkerId>) -> Self {
        let color = if marker.color.is_empty() {
            DEFAULT_MARKER_COLOR.to_string()
        } else {
            marker.color.clone()
        };
        Self {
            marker_id: marker.id,
            position: marker.position(),
            title: marker.title.clone(),
            color,
            selected: selected == Some(marker.id),
        }
    }
}

/// Everything a backend draws in one pass. `markers` are in display order.
pub struct RenderFrame<'a> {
    pub markers: &'a [Marker],
    pub selected: Option<MarkerId>,
    pub show_routes: bool,
    pub view: ViewTransform,
}

impl RenderFrame<'_> {
    fn pins(&self) -> impl Iterator<Item = MarkerPin> + '_ {
        let selected = self.selected;
        self.markers.iter().map(move |m| MarkerPin::new(m, selected))
    }

    /// Consecutive marker pairs to connect, empty unless routes are on.
    fn route_pairs(&self) -> impl Iterator<Item = (&Marker, &Marker)> + '_ {
        let markers: &[Marker] = if self.show_routes { self.markers } else { &[] };
        markers.windows(2).map(|pair| (&pair[0], &pair[1]))
    }
}

/// Capability interface shared by both backends.
pub trait MapRenderer {
    fn kind(&self) -> RendererKind;

    /// Replaces whatever was drawn before with `frame`.
    fn render(&mut self, frame: &RenderFrame<'_>);

    /// Brings one coordinate into focus; `widget_zoom` applies to the live widget.
    fn focus(&mut self, at: LatLng, widget_zoom: u8, view: &mut ViewTransform);

    fn zoom(&mut self, direction: ZoomDirection, view: &mut ViewTransform);

    fn fit(&mut self, markers: &[Marker], view: &mut ViewTransform);

    fn set_traffic(&mut self, _visible: bool) {}

    fn reverse_geocode(&mut self, _at: LatLng) -> Option<PlaceLabel> {
        None
    }

    /// Screen position to coordinate, for backends that own the projection.
    fn unproject(&self, _screen: ScreenPoint, _view: &ViewTransform) -> Option<LatLng> {
        None
    }

    /// Last laid-out scene, for backends that draw it themselves.
    fn scene(&self) -> Option<&CanvasScene> {
        None
    }
}

/// The external map widget. Overlays are whatever handle the widget hands
/// back for a placed marker or polyline.
pub trait MapWidget {
    type Overlay;

    fn place_marker(&mut self, pin: &MarkerPin) -> Self::Overlay;
    fn draw_polyline(&mut self, path: &[LatLng]) -> Self::Overlay;
    fn remove(&mut self, overlay: Self::Overlay);
    fn set_center(&mut self, at: LatLng);
    fn set_zoom(&mut self, level: u8);
    fn zoom_in(&mut self);
    fn zoom_out(&mut self);
    fn fit_to_overlays(&mut self);
    fn set_traffic_layer(&mut self, visible: bool);
    /// Best effort; `None` when the geocoder fails or is absent.
    fn reverse_geocode(&mut self, at: LatLng) -> Option<PlaceLabel>;
}

pub struct LiveMapRenderer<W: MapWidget> {
    widget: W,
    overlays: Vec<W::Overlay>,
}

impl<W: MapWidget> LiveMapRenderer<W> {
    pub fn new(widget: W) -> Self {
        Self {
            widget,
            overlays: Vec::new(),
        }
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }
}

impl<W: MapWidget> MapRenderer for LiveMapRenderer<W> {
    fn kind(&self) -> RendererKind {
        RendererKind::LiveWidget
    }

    fn render(&mut self, frame: &RenderFrame<'_>) {
        for overlay in self.overlays.drain(..) {
            self.widget.remove(overlay);
        }
        for pin in frame.pins() {
            let overlay = self.widget.place_marker(&pin);
            self.overlays.push(overlay);
        }
        if frame.route_pairs().next().is_some() {
            let path: Vec<LatLng> = frame.markers.iter().map(Marker::position).collect();
            let overlay = self.widget.draw_polyline(&path);
            self.overlays.push(overlay);
        }
        debug!("Widget redrawn with {} markers", frame.markers.len());
    }

    fn focus(&mut self, at: LatLng, widget_zoom: u8, _view: &mut ViewTransform) {
        self.widget.set_center(at);
        self.widget.set_zoom(widget_zoom);
    }

    fn zoom(&mut self, direction: ZoomDirection, _view: &mut ViewTransform) {
        match direction {
            ZoomDirection::In => self.widget.zoom_in(),
            ZoomDirection::Out => self.widget.zoom_out(),
        }
    }

    fn fit(&mut self, _markers: &[Marker], _view: &mut ViewTransform) {
        self.widget.fit_to_overlays();
    }

    fn set_traffic(&mut self, visible: bool) {
        self.widget.set_traffic_layer(visible);
    }

    fn reverse_geocode(&mut self, at: LatLng) -> Option<PlaceLabel> {
        self.widget.reverse_geocode(at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasPin {
    pub pin: MarkerPin,
    pub at: ScreenPoint,
}

/// One straight route leg with a direction arrow at its midpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSegment {
    pub from: MarkerId,
    pub to: MarkerId,
    pub start: ScreenPoint,
    pub end: ScreenPoint,
    pub arrow: [ScreenPoint; 3],
}

impl RouteSegment {
    fn new(from: MarkerId, to: MarkerId, start: ScreenPoint, end: ScreenPoint) -> Self {
        let angle = (end.y - start.y).atan2(end.x - start.x);
        let mid = ScreenPoint::new((start.x + end.x) / 2.0, (start.y + end.y) / 2.0);
        let corner = |a: f64| ScreenPoint::new(mid.x + ARROW_SIZE * a.cos(), mid.y + ARROW_SIZE * a.sin());
        Self {
            from,
            to,
            start,
            end,
            arrow: [
                corner(angle),
                corner(angle + ARROW_WING_ANGLE),
                corner(angle - ARROW_WING_ANGLE),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanvasScene {
    pub pins: Vec<CanvasPin>,
    pub routes: Vec<RouteSegment>,
}

pub struct ProjectedCanvasRenderer {
    projector: Projector,
    scene: CanvasScene,
}

impl ProjectedCanvasRenderer {
    pub fn new(projector: Projector) -> Self {
        Self {
            projector,
            scene: CanvasScene::default(),
        }
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }
}

impl MapRenderer for ProjectedCanvasRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::ProjectedCanvas
    }

    fn render(&mut self, frame: &RenderFrame<'_>) {
        let view = frame.view;
        let pins = frame
            .pins()
            .map(|pin| CanvasPin {
                at: self.projector.project(pin.position, &view),
                pin,
            })
            .collect();
        let routes = frame
            .route_pairs()
            .map(|(a, b)| {
                RouteSegment::new(
                    a.id,
                    b.id,
                    self.projector.project(a.position(), &view),
                    self.projector.project(b.position(), &view),
                )
            })
            .collect();
        self.scene = CanvasScene { pins, routes };
    }

    fn focus(&mut self, at: LatLng, _widget_zoom: u8, view: &mut ViewTransform) {
        *view = self.projector.centered_on(at, FOCUS_ZOOM);
    }

    fn zoom(&mut self, direction: ZoomDirection, view: &mut ViewTransform) {
        let delta = match direction {
            ZoomDirection::In => ZOOM_STEP,
            ZoomDirection::Out => -ZOOM_STEP,
        };
        *view = view.zoomed_by(delta);
    }

    fn fit(&mut self, markers: &[Marker], view: &mut ViewTransform) {
        let points: Vec<LatLng> = markers.iter().map(Marker::position).collect();
        *view = self.projector.fit(&points);
    }

    fn unproject(&self, screen: ScreenPoint, view: &ViewTransform) -> Option<LatLng> {
        Some(self.projector.unproject(screen, view))
    }

    fn scene(&self) -> Option<&CanvasScene> {
        Some(&self.scene)
    }
}

/// Chooses the backend for the session: the live widget if it initialized,
/// otherwise the projected canvas.
pub fn select_backend<W>(widget: Result<W, TripError>, projector: Projector) -> Box<dyn MapRenderer>
where
    W: MapWidget + 'static,
    W::Overlay: 'static,
{
    match widget {
        Ok(widget) => {
            info!("Map widget ready; using live renderer");
            Box::new(LiveMapRenderer::new(widget))
        }
        Err(e) => {
            warn!("Map widget unavailable ({e}); falling back to projected canvas");
            Box::new(ProjectedCanvasRenderer::new(projector))
        }
    }
}
