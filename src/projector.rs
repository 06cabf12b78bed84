//! Coordinate projection for the fallback canvas.
//!
//! This is a local linear approximation, not a map projection: the offset of
//! a point from a fixed reference coordinate is scaled by
//! [`PIXELS_PER_DEGREE`], multiplied by the zoom factor, shifted by the pan
//! vector and placed relative to the viewport center. North is up, so screen
//! `y` grows as latitude falls.

use serde::{Deserialize, Serialize};

use crate::model::LatLng;

/// Screen pixels per degree of latitude or longitude at zoom 1.0.
pub const PIXELS_PER_DEGREE: f64 = 10_000.0;

/// Reference coordinate drawn at the viewport center when pan is zero.
pub const DEFAULT_ORIGIN: LatLng = LatLng {
    lat: 39.9042,
    lng: 116.4074,
};

pub const MIN_ZOOM: f64 = 0.3;
pub const MAX_ZOOM: f64 = 3.0;
pub const ZOOM_STEP: f64 = 0.2;

/// Zoom used when a single marker is brought into focus.
pub const FOCUS_ZOOM: f64 = 3.0;

/// Share of the shorter viewport side the fitted bounding box should span.
pub const FIT_FRACTION: f64 = 0.6;

/// Smallest bounding-box span (degrees) used when fitting, so a single marker
/// or a stack of identical coordinates does not divide by zero.
const MIN_FIT_SPAN: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: ScreenPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

impl ViewportSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Pan offset and zoom factor of the fallback view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    pub pan: ScreenPoint,
    pub zoom: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            pan: ScreenPoint::default(),
            zoom: 1.0,
        }
    }
}

impl ViewTransform {
    /// Returns the view with zoom moved by `delta` and clamped to `[MIN_ZOOM, MAX_ZOOM]`.
    pub fn zoomed_by(self, delta: f64) -> Self {
        Self {
            zoom: clamp_zoom(self.zoom + delta),
            ..self
        }
    }
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projector {
    pub origin: LatLng,
    pub viewport: ViewportSize,
}

impl Projector {
    pub fn new(origin: LatLng, viewport: ViewportSize) -> Self {
        Self { origin, viewport }
    }

    /// Unzoomed pixel offset of `point` from the origin.
    fn base_offset(&self, point: LatLng) -> ScreenPoint {
        ScreenPoint::new(
            (point.lng - self.origin.lng) * PIXELS_PER_DEGREE,
            -(point.lat - self.origin.lat) * PIXELS_PER_DEGREE,
        )
    }

    pub fn project(&self, point: LatLng, view: &ViewTransform) -> ScreenPoint {
        let base = self.base_offset(point);
        let center = self.viewport.center();
        ScreenPoint::new(
            center.x + base.x * view.zoom + view.pan.x,
            center.y + base.y * view.zoom + view.pan.y,
        )
    }

    /// Exact inverse of [`Projector::project`].
    pub fn unproject(&self, screen: ScreenPoint, view: &ViewTransform) -> LatLng {
        let center = self.viewport.center();
        let base_x = (screen.x - center.x - view.pan.x) / view.zoom;
        let base_y = (screen.y - center.y - view.pan.y) / view.zoom;
        LatLng::new(
            self.origin.lat - base_y / PIXELS_PER_DEGREE,
            self.origin.lng + base_x / PIXELS_PER_DEGREE,
        )
    }

    /// View that puts `point` at the viewport center at the given zoom.
    pub fn centered_on(&self, point: LatLng, zoom: f64) -> ViewTransform {
        let zoom = clamp_zoom(zoom);
        let base = self.base_offset(point);
        ViewTransform {
            pan: ScreenPoint::new(-base.x * zoom, -base.y * zoom),
            zoom,
        }
    }

    /// Approximate view that shows every point: the bounding box's larger
    /// side spans [`FIT_FRACTION`] of the shorter viewport side and the box is
    /// centered. No points gives the default view.
    pub fn fit(&self, points: &[LatLng]) -> ViewTransform {
        let Some(first) = points.first() else {
            return ViewTransform::default();
        };
        let (mut min_lat, mut max_lat) = (first.lat, first.lat);
        let (mut min_lng, mut max_lng) = (first.lng, first.lng);
        for p in &points[1..] {
            min_lat = min_lat.min(p.lat);
            max_lat = max_lat.max(p.lat);
            min_lng = min_lng.min(p.lng);
            max_lng = max_lng.max(p.lng);
        }

        let span = (max_lat - min_lat).max(max_lng - min_lng).max(MIN_FIT_SPAN);
        let target = self.viewport.width.min(self.viewport.height) * FIT_FRACTION;
        let zoom = target / PIXELS_PER_DEGREE / span;

        let middle = LatLng::new((min_lat + max_lat) / 2.0, (min_lng + max_lng) / 2.0);
        self.centered_on(middle, zoom)
    }
}
