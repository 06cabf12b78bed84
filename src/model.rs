//! Data model definitions for the trip store.
//!
//! Three entity kinds live in the store: [`Trip`], [`Marker`] and [`Image`].
//! Markers are owned by a trip and images by a marker; ownership is expressed
//! through the `trip_id` / `marker_id` foreign keys and enforced by the cascade
//! rules in [`crate::store`].
//!
//! The serialized form of every entity is a flat camelCase JSON record. That
//! is the layout written to the blob store and the layout returned across the
//! C boundary, so field renames here are wire-format changes.
//!
//! # Examples
//!
//! ```rust
//! use trip_map_core::model::{Category, MarkerPatch};
//!
//! let patch = MarkerPatch {
//!     title: Some("Forbidden City".to_string()),
//!     category: Some(Some(Category::Culture)),
//!     ..Default::default()
//! };
//! assert!(patch.notes.is_none());
//! assert_eq!(Category::Culture.color(), "#9C27B0");
//! ```

use std::fmt::{Display, Formatter};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TripError;

pub type TripId = u64;
pub type MarkerId = u64;
pub type ImageId = u64;

/// Color given to a marker until the user picks another one.
pub const DEFAULT_MARKER_COLOR: &str = "#F44336";

/// Icon token given to every new marker.
pub const DEFAULT_MARKER_ICON: &str = "default";

/// Colors offered by the marker editor.
pub const MARKER_PALETTE: [&str; 5] = ["#F44336", "#2196F3", "#4CAF50", "#FF9800", "#9C27B0"];

/// Display color used when a marker has no category.
pub const UNCATEGORIZED_COLOR: &str = "#9E9E9E";

/// The three kinds of entity held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Trip,
    Marker,
    Image,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Trip => write!(f, "trip"),
            EntityKind::Marker => write!(f, "marker"),
            EntityKind::Image => write!(f, "image"),
        }
    }
}

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Builds a coordinate, rejecting values outside `[-90, 90]` x `[-180, 180]`.
    pub fn checked(lat: f64, lng: f64) -> Result<Self, TripError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(TripError::validation(format!("latitude {lat} out of range")));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(TripError::validation(format!("longitude {lng} out of range")));
        }
        Ok(Self { lat, lng })
    }
}

/// Fixed set of marker categories, each with its own display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sight,
    Food,
    Lodging,
    Transport,
    Shopping,
    Nature,
    Culture,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Sight,
        Category::Food,
        Category::Lodging,
        Category::Transport,
        Category::Shopping,
        Category::Nature,
        Category::Culture,
        Category::Other,
    ];

    pub fn color(self) -> &'static str {
        match self {
            Category::Sight => "#FF5722",
            Category::Food => "#FF9800",
            Category::Lodging => "#795548",
            Category::Transport => "#607D8B",
            Category::Shopping => "#E91E63",
            Category::Nature => "#4CAF50",
            Category::Culture => "#9C27B0",
            Category::Other => UNCATEGORIZED_COLOR,
        }
    }

    /// Parses the wire token (`"food"`, `"culture"`, ...). Unknown tokens yield `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.token() == token.trim().to_ascii_lowercase())
    }

    pub fn token(self) -> &'static str {
        match self {
            Category::Sight => "sight",
            Category::Food => "food",
            Category::Lodging => "lodging",
            Category::Transport => "transport",
            Category::Shopping => "shopping",
            Category::Nature => "nature",
            Category::Culture => "culture",
            Category::Other => "other",
        }
    }
}

/// Badge color for an optional category.
pub fn category_color(category: Option<Category>) -> &'static str {
    category.map(Category::color).unwrap_or(UNCATEGORIZED_COLOR)
}

/// Top-level container of ordered markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: TripId,
    pub name: String,
    /// Cached copy of the cover image content. Only refreshed by
    /// [`crate::store::EntityStore::recompute_trip_cover`].
    pub cover_image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub display_order: u32,
}

/// A geo-located point of interest inside a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: MarkerId,
    pub trip_id: TripId,
    pub title: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub notes: Option<String>,
    pub link: Option<String>,
    pub color: String,
    pub icon: String,
    pub category: Option<Category>,
    /// Position among the markers of the same trip.
    pub display_order: u32,
    pub created_at: DateTime<Utc>,
}

impl Marker {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// A photo attached to a marker, stored inline as a data URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: ImageId,
    pub marker_id: MarkerId,
    pub data_url: String,
    /// Position among the images of the same marker; always `0..count`.
    pub display_order: u32,
    pub created_at: DateTime<Utc>,
}

/// Partial update for a marker. `None` leaves a field untouched; for the
/// nullable fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarkerPatch {
    pub title: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "present_field")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "present_field")]
    pub link: Option<Option<String>>,
    pub color: Option<String>,
    #[serde(default, deserialize_with = "present_field")]
    pub category: Option<Option<Category>>,
    pub display_order: Option<u32>,
}

impl MarkerPatch {
    /// Rejects a patch that would move the marker outside the valid coordinate range.
    pub fn validate(&self, current: &Marker) -> Result<(), TripError> {
        if self.latitude.is_some() || self.longitude.is_some() {
            LatLng::checked(
                self.latitude.unwrap_or(current.latitude),
                self.longitude.unwrap_or(current.longitude),
            )?;
        }
        Ok(())
    }

    pub fn apply(self, marker: &mut Marker) {
        if let Some(title) = self.title {
            marker.title = title;
        }
        if let Some(address) = self.address {
            marker.address = address;
        }
        if let Some(lat) = self.latitude {
            marker.latitude = lat;
        }
        if let Some(lng) = self.longitude {
            marker.longitude = lng;
        }
        if let Some(notes) = self.notes {
            marker.notes = notes;
        }
        if let Some(link) = self.link {
            marker.link = link;
        }
        if let Some(color) = self.color {
            marker.color = color;
        }
        if let Some(category) = self.category {
            marker.category = category;
        }
        if let Some(order) = self.display_order {
            marker.display_order = order;
        }
    }
}

// An explicit `null` must become `Some(None)`, not `None`.
fn present_field<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Trims a required text field, failing with [`TripError::Validation`] when empty.
pub fn require_text(field: &str, value: &str) -> Result<String, TripError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TripError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Trims an optional text field; blank input becomes `None`.
pub fn optional_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Encodes raw file bytes as a `data:<mime>;base64,<payload>` URI.
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Checks that `value` is a base64 data URI and returns its MIME type.
pub fn data_url_mime(value: &str) -> Result<&str, TripError> {
    let rest = value
        .strip_prefix("data:")
        .ok_or_else(|| TripError::InvalidDataUrl("missing data: scheme".to_string()))?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| TripError::InvalidDataUrl("expected base64 encoding".to_string()))?;
    if mime.is_empty() || !mime.contains('/') {
        return Err(TripError::InvalidDataUrl(format!("bad mime type '{mime}'")));
    }
    STANDARD
        .decode(payload)
        .map_err(|e| TripError::InvalidDataUrl(e.to_string()))?;
    Ok(mime)
}
