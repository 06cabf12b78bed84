//! The entity store: trips, markers and images with their ordering and
//! cascade invariants.
//!
//! All three collections and the three identity counters are written to the
//! [`BlobStore`] as one unit after every mutation. A mutation that fails to
//! persist is rolled back in memory, so the in-memory view never runs ahead of
//! what was written.
//!
//! ```rust
//! use trip_map_core::blob_store::MemoryBlobStore;
//! use trip_map_core::store::EntityStore;
//!
//! let mut store = EntityStore::open(MemoryBlobStore::new())?;
//! let trip = store.create_trip("Lisbon")?;
//! store.create_marker(trip.id, 38.7139, -9.1394, "Rossio", "Praça Dom Pedro IV")?;
//! assert_eq!(store.marker_count(trip.id), 1);
//!
//! store.delete_trip(trip.id)?;
//! assert!(store.list_trips().is_empty());
//! # Ok::<(), trip_map_core::error::TripError>(())
//! ```

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::blob_store::BlobStore;
use crate::error::TripError;
use crate::model::{
    data_url_mime, EntityKind, Image, ImageId, LatLng, Marker, MarkerId, MarkerPatch, Trip,
    TripId, DEFAULT_MARKER_COLOR, DEFAULT_MARKER_ICON,
};

pub const TRIPS_KEY: &str = "trips";
pub const MARKERS_KEY: &str = "markers";
pub const IMAGES_KEY: &str = "images";
pub const NEXT_TRIP_ID_KEY: &str = "nextTripId";
pub const NEXT_MARKER_ID_KEY: &str = "nextMarkerId";
pub const NEXT_IMAGE_ID_KEY: &str = "nextImageId";

/// Everything that is persisted, kept together so a failed write can be undone.
#[derive(Debug, Clone)]
struct Tables {
    trips: Vec<Trip>,
    markers: Vec<Marker>,
    images: Vec<Image>,
    next_trip_id: TripId,
    next_marker_id: MarkerId,
    next_image_id: ImageId,
}

/// One ownership edge: deleting a `parent` deletes every `child` whose
/// foreign key points at it.
struct CascadeRule {
    parent: EntityKind,
    child: EntityKind,
    children: fn(&Tables, u64) -> Vec<u64>,
}

const CASCADE_RULES: &[CascadeRule] = &[
    CascadeRule {
        parent: EntityKind::Trip,
        child: EntityKind::Marker,
        children: markers_owned_by,
    },
    CascadeRule {
        parent: EntityKind::Marker,
        child: EntityKind::Image,
        children: images_owned_by,
    },
];

fn markers_owned_by(t: &Tables, trip_id: u64) -> Vec<u64> {
    t.markers
        .iter()
        .filter(|m| m.trip_id == trip_id)
        .map(|m| m.id)
        .collect()
}

fn images_owned_by(t: &Tables, marker_id: u64) -> Vec<u64> {
    t.images
        .iter()
        .filter(|img| img.marker_id == marker_id)
        .map(|img| img.id)
        .collect()
}

/// Counts of entities removed by one cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub trips: usize,
    pub markers: usize,
    pub images: usize,
}

impl CascadeReport {
    pub fn total(&self) -> usize {
        self.trips + self.markers + self.images
    }
}

impl Tables {
    fn load<B: BlobStore>(backend: &B) -> Result<Self, TripError> {
        let tables = Tables {
            trips: load_json(backend, TRIPS_KEY)?.unwrap_or_default(),
            markers: load_json(backend, MARKERS_KEY)?.unwrap_or_default(),
            images: load_json(backend, IMAGES_KEY)?.unwrap_or_default(),
            next_trip_id: load_json(backend, NEXT_TRIP_ID_KEY)?.unwrap_or(1),
            next_marker_id: load_json(backend, NEXT_MARKER_ID_KEY)?.unwrap_or(1),
            next_image_id: load_json(backend, NEXT_IMAGE_ID_KEY)?.unwrap_or(1),
        };
        info!(
            "Entity store loaded: {} trips, {} markers, {} images",
            tables.trips.len(),
            tables.markers.len(),
            tables.images.len()
        );
        Ok(tables)
    }

    fn contains(&self, kind: EntityKind, id: u64) -> bool {
        match kind {
            EntityKind::Trip => self.trips.iter().any(|t| t.id == id),
            EntityKind::Marker => self.markers.iter().any(|m| m.id == id),
            EntityKind::Image => self.images.iter().any(|img| img.id == id),
        }
    }

    /// Removes the root entity and, following [`CASCADE_RULES`], everything it owns.
    fn remove_cascading(&mut self, roots: &[(EntityKind, u64)]) -> CascadeReport {
        let mut doomed: HashMap<EntityKind, HashSet<u64>> = HashMap::new();
        let mut pending: Vec<(EntityKind, u64)> = roots.to_vec();

        while let Some((kind, id)) = pending.pop() {
            if !doomed.entry(kind).or_default().insert(id) {
                continue;
            }
            for rule in CASCADE_RULES.iter().filter(|r| r.parent == kind) {
                pending.extend((rule.children)(self, id).into_iter().map(|c| (rule.child, c)));
            }
        }

        let mut report = CascadeReport::default();
        if let Some(ids) = doomed.get(&EntityKind::Image) {
            let before = self.images.len();
            self.images.retain(|img| !ids.contains(&img.id));
            report.images = before - self.images.len();
        }
        if let Some(ids) = doomed.get(&EntityKind::Marker) {
            let before = self.markers.len();
            self.markers.retain(|m| !ids.contains(&m.id));
            report.markers = before - self.markers.len();
        }
        if let Some(ids) = doomed.get(&EntityKind::Trip) {
            let before = self.trips.len();
            self.trips.retain(|t| !ids.contains(&t.id));
            report.trips = before - self.trips.len();
        }
        report
    }

    fn markers_of(&self, trip_id: TripId) -> Vec<&Marker> {
        let mut markers: Vec<&Marker> =
            self.markers.iter().filter(|m| m.trip_id == trip_id).collect();
        markers.sort_by_key(|m| m.display_order);
        markers
    }

    fn images_of(&self, marker_id: MarkerId) -> Vec<&Image> {
        let mut images: Vec<&Image> = self
            .images
            .iter()
            .filter(|img| img.marker_id == marker_id)
            .collect();
        images.sort_by_key(|img| img.display_order);
        images
    }

    fn first_cover(&self, trip_id: TripId) -> Option<&Image> {
        self.markers_of(trip_id)
            .into_iter()
            .find_map(|m| self.images_of(m.id).into_iter().next())
    }
}

/// A trip as the trip list shows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSummary {
    pub trip: Trip,
    pub marker_count: usize,
    /// First image of the first marker, computed now rather than read from the cache.
    pub cover: Option<String>,
}

pub struct EntityStore<B: BlobStore> {
    backend: B,
    tables: Tables,
}

impl<B: BlobStore> EntityStore<B> {
    /// Loads all collections and counters from `backend`. Missing keys start empty.
    pub fn open(backend: B) -> Result<Self, TripError> {
        let tables = Tables::load(&backend)?;
        Ok(Self { backend, tables })
    }

    /// Drops the in-memory view and reads everything back from the backend,
    /// e.g. after the backend was reset underneath the store.
    pub fn reload(&mut self) -> Result<(), TripError> {
        self.tables = Tables::load(&self.backend)?;
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Applies `change` and persists. If the write fails the change is undone.
    fn commit<T>(&mut self, change: impl FnOnce(&mut Tables) -> T) -> Result<T, TripError> {
        let snapshot = self.tables.clone();
        let out = change(&mut self.tables);
        if let Err(e) = self.persist() {
            self.tables = snapshot;
            return Err(e);
        }
        Ok(out)
    }

    fn persist(&mut self) -> Result<(), TripError> {
        let t = &self.tables;
        let entries = [
            (TRIPS_KEY, serde_json::to_vec(&t.trips)?),
            (MARKERS_KEY, serde_json::to_vec(&t.markers)?),
            (IMAGES_KEY, serde_json::to_vec(&t.images)?),
            (NEXT_TRIP_ID_KEY, serde_json::to_vec(&t.next_trip_id)?),
            (NEXT_MARKER_ID_KEY, serde_json::to_vec(&t.next_marker_id)?),
            (NEXT_IMAGE_ID_KEY, serde_json::to_vec(&t.next_image_id)?),
        ];
        self.backend.write_all(&entries)
    }

    // Trips

    /// All trips by display order; equal orders keep insertion order.
    pub fn list_trips(&self) -> Vec<Trip> {
        let mut trips = self.tables.trips.clone();
        trips.sort_by_key(|t| t.display_order);
        trips
    }

    pub fn trip(&self, id: TripId) -> Option<&Trip> {
        self.tables.trips.iter().find(|t| t.id == id)
    }

    /// Creates a trip at the end of the list. Name validation is the caller's job.
    pub fn create_trip(&mut self, name: &str) -> Result<Trip, TripError> {
        let trip = self.commit(|t| {
            let trip = Trip {
                id: t.next_trip_id,
                name: name.to_string(),
                cover_image_path: None,
                created_at: Utc::now(),
                start_date: None,
                end_date: None,
                display_order: t.trips.len() as u32,
            };
            t.next_trip_id += 1;
            t.trips.push(trip.clone());
            trip
        })?;
        info!("Created trip {} '{}'", trip.id, trip.name);
        Ok(trip)
    }

    pub fn update_trip(&mut self, id: TripId, name: &str) -> Result<Option<Trip>, TripError> {
        if !self.tables.contains(EntityKind::Trip, id) {
            return Ok(None);
        }
        self.commit(|t| {
            t.trips.iter_mut().find(|trip| trip.id == id).map(|trip| {
                trip.name = name.to_string();
                trip.clone()
            })
        })
    }

    /// Deletes a trip with all its markers and their images. `Ok(None)` if unknown.
    pub fn delete_trip(&mut self, id: TripId) -> Result<Option<CascadeReport>, TripError> {
        if !self.tables.contains(EntityKind::Trip, id) {
            return Ok(None);
        }
        let report = self.commit(|t| t.remove_cascading(&[(EntityKind::Trip, id)]))?;
        info!(
            "Deleted trip {id} with {} markers and {} images",
            report.markers, report.images
        );
        Ok(Some(report))
    }

    pub fn marker_count(&self, trip_id: TripId) -> usize {
        self.tables
            .markers
            .iter()
            .filter(|m| m.trip_id == trip_id)
            .count()
    }

    /// Points the trip's cached cover at the first image of its first marker
    /// that has one. Leaves the cover alone when no marker has images.
    pub fn recompute_trip_cover(&mut self, trip_id: TripId) -> Result<Option<String>, TripError> {
        if !self.tables.contains(EntityKind::Trip, trip_id) {
            return Ok(None);
        }
        let Some(cover) = self.tables.first_cover(trip_id).map(|img| img.data_url.clone()) else {
            return Ok(None);
        };
        self.commit(|t| {
            if let Some(trip) = t.trips.iter_mut().find(|trip| trip.id == trip_id) {
                trip.cover_image_path = Some(cover.clone());
            }
        })?;
        debug!("Trip {trip_id} cover recomputed");
        Ok(Some(cover))
    }

    pub fn trip_summaries(&self) -> Vec<TripSummary> {
        self.list_trips()
            .into_iter()
            .map(|trip| TripSummary {
                marker_count: self.marker_count(trip.id),
                cover: self.tables.first_cover(trip.id).map(|img| img.data_url.clone()),
                trip,
            })
            .collect()
    }

    // Markers

    pub fn list_markers(&self, trip_id: TripId) -> Vec<Marker> {
        self.tables.markers_of(trip_id).into_iter().cloned().collect()
    }

    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.tables.markers.iter().find(|m| m.id == id)
    }

    /// Appends a marker to a trip. Fails with `Validation` if the trip does not
    /// exist or the coordinate is out of range.
    pub fn create_marker(
        &mut self,
        trip_id: TripId,
        lat: f64,
        lng: f64,
        title: &str,
        address: &str,
    ) -> Result<Marker, TripError> {
        if !self.tables.contains(EntityKind::Trip, trip_id) {
            return Err(TripError::validation(format!(
                "cannot add a marker to unknown trip {trip_id}"
            )));
        }
        let position = LatLng::checked(lat, lng)?;
        let marker = self.commit(|t| {
            let marker = Marker {
                id: t.next_marker_id,
                trip_id,
                title: title.to_string(),
                address: address.to_string(),
                latitude: position.lat,
                longitude: position.lng,
                notes: None,
                link: None,
                color: DEFAULT_MARKER_COLOR.to_string(),
                icon: DEFAULT_MARKER_ICON.to_string(),
                category: None,
                display_order: t.markers.iter().filter(|m| m.trip_id == trip_id).count() as u32,
                created_at: Utc::now(),
            };
            t.next_marker_id += 1;
            t.markers.push(marker.clone());
            marker
        })?;
        debug!("Created marker {} in trip {trip_id}", marker.id);
        Ok(marker)
    }

    /// Merges the supplied fields into the marker. `Ok(None)` if unknown.
    pub fn update_marker(
        &mut self,
        id: MarkerId,
        patch: MarkerPatch,
    ) -> Result<Option<Marker>, TripError> {
        let Some(current) = self.marker(id) else {
            return Ok(None);
        };
        patch.validate(current)?;
        self.commit(|t| {
            t.markers.iter_mut().find(|m| m.id == id).map(|m| {
                patch.apply(m);
                m.clone()
            })
        })
    }

    /// Deletes a marker and its images. `Ok(None)` if unknown.
    pub fn delete_marker(&mut self, id: MarkerId) -> Result<Option<CascadeReport>, TripError> {
        if !self.tables.contains(EntityKind::Marker, id) {
            return Ok(None);
        }
        let report = self.commit(|t| t.remove_cascading(&[(EntityKind::Marker, id)]))?;
        debug!("Deleted marker {id} and {} images", report.images);
        Ok(Some(report))
    }

    /// Deletes every marker of a trip (and their images) but keeps the trip.
    pub fn clear_markers(&mut self, trip_id: TripId) -> Result<CascadeReport, TripError> {
        let roots: Vec<(EntityKind, u64)> = self
            .tables
            .markers
            .iter()
            .filter(|m| m.trip_id == trip_id)
            .map(|m| (EntityKind::Marker, m.id))
            .collect();
        if roots.is_empty() {
            return Ok(CascadeReport::default());
        }
        let report = self.commit(|t| t.remove_cascading(&roots))?;
        info!("Cleared {} markers from trip {trip_id}", report.markers);
        Ok(report)
    }

    /// Moves `dragged_id` to the slot held by `target_id` and renumbers the
    /// trip's markers `0..n`. Returns `false` when either id is not in the trip.
    pub fn reorder_markers(
        &mut self,
        trip_id: TripId,
        dragged_id: MarkerId,
        target_id: MarkerId,
    ) -> Result<bool, TripError> {
        let mut order: Vec<MarkerId> = self
            .tables
            .markers_of(trip_id)
            .into_iter()
            .map(|m| m.id)
            .collect();
        let (Some(from), Some(to)) = (
            order.iter().position(|&id| id == dragged_id),
            order.iter().position(|&id| id == target_id),
        ) else {
            return Ok(false);
        };
        if from == to {
            return Ok(false);
        }
        let moved = order.remove(from);
        order.insert(to, moved);

        self.commit(|t| {
            for marker in t.markers.iter_mut().filter(|m| m.trip_id == trip_id) {
                if let Some(pos) = order.iter().position(|&id| id == marker.id) {
                    marker.display_order = pos as u32;
                }
            }
        })?;
        debug!("Trip {trip_id}: moved marker {dragged_id} from {from} to {to}");
        Ok(true)
    }

    // Images

    pub fn list_images(&self, marker_id: MarkerId) -> Vec<Image> {
        self.tables.images_of(marker_id).into_iter().cloned().collect()
    }

    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.tables.images.iter().find(|img| img.id == id)
    }

    pub fn image_count(&self, marker_id: MarkerId) -> usize {
        self.tables
            .images
            .iter()
            .filter(|img| img.marker_id == marker_id)
            .count()
    }

    /// Appends an image to a marker. `content` must be a base64 data URI.
    pub fn add_image(&mut self, marker_id: MarkerId, content: &str) -> Result<Image, TripError> {
        if !self.tables.contains(EntityKind::Marker, marker_id) {
            return Err(TripError::validation(format!(
                "cannot attach an image to unknown marker {marker_id}"
            )));
        }
        let mime = data_url_mime(content)?;
        let image = self.commit(|t| {
            let image = Image {
                id: t.next_image_id,
                marker_id,
                data_url: content.to_string(),
                display_order: t
                    .images
                    .iter()
                    .filter(|img| img.marker_id == marker_id)
                    .count() as u32,
                created_at: Utc::now(),
            };
            t.next_image_id += 1;
            t.images.push(image.clone());
            image
        })?;
        debug!("Attached {mime} image {} to marker {marker_id}", image.id);
        Ok(image)
    }

    /// Removes an image and renumbers the marker's remaining images `0..n`.
    /// Returns `false` if the image is unknown.
    pub fn delete_image(&mut self, id: ImageId) -> Result<bool, TripError> {
        let Some(marker_id) = self.image(id).map(|img| img.marker_id) else {
            return Ok(false);
        };
        self.commit(|t| {
            t.remove_cascading(&[(EntityKind::Image, id)]);
            let order: Vec<ImageId> = t.images_of(marker_id).into_iter().map(|img| img.id).collect();
            for img in t.images.iter_mut().filter(|img| img.marker_id == marker_id) {
                if let Some(pos) = order.iter().position(|&other| other == img.id) {
                    img.display_order = pos as u32;
                }
            }
        })?;
        debug!("Deleted image {id} from marker {marker_id}");
        Ok(true)
    }

    /// Empties all three collections. Identity counters keep counting.
    pub fn clear(&mut self) -> Result<(), TripError> {
        self.commit(|t| {
            t.trips.clear();
            t.markers.clear();
            t.images.clear();
        })?;
        info!("Entity store cleared");
        Ok(())
    }

    /// Next identities to be assigned, as `(trip, marker, image)`.
    pub fn next_ids(&self) -> (TripId, MarkerId, ImageId) {
        (
            self.tables.next_trip_id,
            self.tables.next_marker_id,
            self.tables.next_image_id,
        )
    }

    /// Counts of all stored entities, as `(trips, markers, images)`.
    pub fn totals(&self) -> (usize, usize, usize) {
        (
            self.tables.trips.len(),
            self.tables.markers.len(),
            self.tables.images.len(),
        )
    }
}

fn load_json<B: BlobStore, T: DeserializeOwned>(
    backend: &B,
    key: &str,
) -> Result<Option<T>, TripError> {
    match backend.load(key)? {
        Some(bytes) if !bytes.is_empty() => Ok(Some(serde_json::from_slice(&bytes)?)),
        _ => Ok(None),
    }
}
