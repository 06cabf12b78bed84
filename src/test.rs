//! # Test Suite for Trip Map Core
//!
//! Behavioural tests for the store, the map view controller on both
//! rendering backends, the search adapter, the marker editor and the C ABI.
//! Pure helpers (projection maths, data URLs, config parsing) are tested next
//! to their code.
//!
//! ## Test Categories
//!
//! ### 1. Entity Store Tests
//! - **Coverage**: identities, display ordering, cascades, cover rules, atomic persistence
//! - **Tests Include**:
//!   - Contiguous marker order after reorder and image order after deletes
//!   - Cascade completeness for trip and marker deletes
//!   - Rollback when the backend refuses a write
//!   - LMDB reload and reset
//!
//! ### 2. Map View Controller Tests (projected canvas)
//! - **Coverage**: route segments, drag vs. click, selection focus, zoom bounds
//!
//! ### 3. Map View Controller Tests (live widget)
//! - **Coverage**: overlays, widget zoom levels, reverse geocoding, traffic layer
//!
//! ### 4. Search Adapter Tests
//! - **Coverage**: debounce, stale responses, service retry, no-data retry, selection
//!
//! ### 5. Marker Editor Tests
//!
//! ### 6. FFI Function Tests
//! - **Coverage**: every `extern "C"` function with success and error scenarios
//!
//! ## Running the Tests
//!
//! ```bash
//! cargo test
//! cargo test test_ffi_       # FFI tests
//! cargo test test_search_    # Search adapter tests
//! ```

#[cfg(test)]
pub mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::ffi::{CStr, CString};
    use std::os::raw::c_char;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use log::info;
    use serde_json::{json, Value};

    use crate::app_response::AppResponse;
    use crate::blob_store::{BlobStore, LmdbBlobStore, MemoryBlobStore};
    use crate::config::TripMapConfig;
    use crate::controller::{MapViewController, ViewState};
    use crate::demo::{seed_demo_trip, DEMO_TRIP_NAME};
    use crate::editor::{MarkerEditor, MarkerForm, PendingImage};
    use crate::error::TripError;
    use crate::model::{encode_data_url, Category, LatLng, MarkerPatch, DEFAULT_MARKER_COLOR};
    use crate::projector::{
        Projector, ScreenPoint, ViewportSize, DEFAULT_ORIGIN, FOCUS_ZOOM, MAX_ZOOM, MIN_ZOOM,
    };
    use crate::renderer::{
        select_backend, MapWidget, MarkerPin, PlaceLabel, ProjectedCanvasRenderer, RendererKind,
        WIDGET_FOCUS_ZOOM, WIDGET_SEARCH_ZOOM,
    };
    use crate::search::{
        add_selected_place, Place, PlaceSelection, SearchAdapter, SearchOutcome, SearchPanel, SearchProvider,
        MAX_RESULTS, MAX_SUGGESTIONS, SERVICE_RETRY_BACKOFF, SUGGESTION_DEBOUNCE,
    };
    use crate::store::{EntityStore, MARKERS_KEY, NEXT_TRIP_ID_KEY};
    use crate::*;

    // Helpers

    fn mem_store() -> EntityStore<MemoryBlobStore> {
        match EntityStore::open(MemoryBlobStore::new()) {
            Ok(store) => store,
            Err(e) => panic!("Failed to open in-memory store: {e}"),
        }
    }

    fn projector() -> Projector {
        Projector::new(DEFAULT_ORIGIN, ViewportSize::new(800.0, 600.0))
    }

    fn canvas_controller() -> MapViewController {
        MapViewController::new(Box::new(ProjectedCanvasRenderer::new(projector())))
    }

    fn png(seed: u8) -> String {
        encode_data_url("image/png", &[0x89, 0x50, 0x4e, 0x47, seed])
    }

    fn orders<T>(items: &[T], order: impl Fn(&T) -> u32) -> Vec<u32> {
        items.iter().map(order).collect()
    }

    /// Backend whose writes can be switched off to exercise rollback.
    #[derive(Default)]
    struct FlakyBlobStore {
        inner: MemoryBlobStore,
        fail_writes: bool,
    }

    impl BlobStore for FlakyBlobStore {
        fn load(&self, key: &str) -> Result<Option<Vec<u8>>, TripError> {
            self.inner.load(key)
        }

        fn write_all(&mut self, entries: &[(&str, Vec<u8>)]) -> Result<(), TripError> {
            if self.fail_writes {
                return Err(TripError::Io(std::io::Error::other("disk full")));
            }
            self.inner.write_all(entries)
        }

        fn clear(&mut self) -> Result<usize, TripError> {
            self.inner.clear()
        }
    }

    /// What the fake widget currently shows and what it was asked to do.
    #[derive(Default)]
    struct WidgetLog {
        markers_on_map: HashMap<u32, MarkerPin>,
        lines_on_map: HashMap<u32, Vec<LatLng>>,
        center: Option<LatLng>,
        zoom: Option<u8>,
        zoom_steps: i32,
        fits: usize,
        traffic: Option<bool>,
        geocode: Option<PlaceLabel>,
    }

    struct FakeWidget {
        log: Rc<RefCell<WidgetLog>>,
        next_overlay: u32,
    }

    impl FakeWidget {
        fn new(log: Rc<RefCell<WidgetLog>>) -> Self {
            Self { log, next_overlay: 0 }
        }

        fn next(&mut self) -> u32 {
            self.next_overlay += 1;
            self.next_overlay
        }
    }

    impl MapWidget for FakeWidget {
        type Overlay = u32;

        fn place_marker(&mut self, pin: &MarkerPin) -> u32 {
            let id = self.next();
            self.log.borrow_mut().markers_on_map.insert(id, pin.clone());
            id
        }

        fn draw_polyline(&mut self, path: &[LatLng]) -> u32 {
            let id = self.next();
            self.log.borrow_mut().lines_on_map.insert(id, path.to_vec());
            id
        }

        fn remove(&mut self, overlay: u32) {
            let mut log = self.log.borrow_mut();
            log.markers_on_map.remove(&overlay);
            log.lines_on_map.remove(&overlay);
        }

        fn set_center(&mut self, at: LatLng) {
            self.log.borrow_mut().center = Some(at);
        }

        fn set_zoom(&mut self, level: u8) {
            self.log.borrow_mut().zoom = Some(level);
        }

        fn zoom_in(&mut self) {
            self.log.borrow_mut().zoom_steps += 1;
        }

        fn zoom_out(&mut self) {
            self.log.borrow_mut().zoom_steps -= 1;
        }

        fn fit_to_overlays(&mut self) {
            self.log.borrow_mut().fits += 1;
        }

        fn set_traffic_layer(&mut self, visible: bool) {
            self.log.borrow_mut().traffic = Some(visible);
        }

        fn reverse_geocode(&mut self, _at: LatLng) -> Option<PlaceLabel> {
            self.log.borrow().geocode.clone()
        }
    }

    fn live_controller() -> (MapViewController, Rc<RefCell<WidgetLog>>) {
        let log = Rc::new(RefCell::new(WidgetLog::default()));
        let renderer = select_backend(Ok(FakeWidget::new(log.clone())), projector());
        (MapViewController::new(renderer), log)
    }

    /// Records requests; answers are fed back by the test.
    #[derive(Default)]
    struct FakeProvider {
        ready: bool,
        suggestions: Vec<(u64, String)>,
        places: Vec<(u64, String)>,
    }

    impl FakeProvider {
        fn ready() -> Self {
            Self {
                ready: true,
                ..Self::default()
            }
        }
    }

    impl SearchProvider for FakeProvider {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn request_suggestions(&mut self, seq: u64, text: &str) {
            self.suggestions.push((seq, text.to_string()));
        }

        fn request_places(&mut self, seq: u64, text: &str) {
            self.places.push((seq, text.to_string()));
        }
    }

    fn place(name: &str, address: &str, at: Option<(f64, f64)>) -> Place {
        Place {
            name: name.to_string(),
            address: address.to_string(),
            location: at.map(|(lat, lng)| LatLng::new(lat, lng)),
            distance_m: None,
            kind: None,
        }
    }

    fn read_response(ptr: *const c_char) -> Value {
        assert!(!ptr.is_null(), "FFI call returned a null string");
        let text = unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .map(str::to_string)
            .unwrap();
        free_c_string(ptr as *mut c_char);
        serde_json::from_str(&text).unwrap()
    }

    fn ok_json(response: &Value) -> Value {
        let payload = response["Ok"]
            .as_str()
            .unwrap_or_else(|| panic!("expected Ok response, got {response}"));
        serde_json::from_str(payload).unwrap()
    }

    // 1. Entity store

    #[test]
    fn test_ids_and_orders_follow_creation() {
        let mut store = mem_store();
        let a = store.create_trip("Kyoto").unwrap();
        let b = store.create_trip("Osaka").unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!((a.display_order, b.display_order), (0, 1));

        let m1 = store.create_marker(a.id, 35.0116, 135.7681, "Kiyomizu", "Higashiyama").unwrap();
        let m2 = store.create_marker(a.id, 35.0394, 135.7292, "Kinkaku-ji", "Kita").unwrap();
        let m3 = store.create_marker(b.id, 34.6873, 135.5262, "Osaka Castle", "Chuo").unwrap();
        assert_eq!((m1.display_order, m2.display_order, m3.display_order), (0, 1, 0));
        assert_eq!(m1.color, DEFAULT_MARKER_COLOR);
        assert_eq!(store.next_ids(), (3, 4, 1));

        let names: Vec<String> = store.list_trips().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["Kyoto", "Osaka"]);
    }

    #[test]
    fn test_create_marker_rejects_unknown_trip_and_bad_coordinates() {
        let mut store = mem_store();
        let err = store.create_marker(42, 10.0, 10.0, "Nowhere", "").unwrap_err();
        assert!(matches!(err, TripError::Validation(_)));

        let trip = store.create_trip("Bounds").unwrap();
        assert!(store.create_marker(trip.id, 91.0, 0.0, "Too far north", "").is_err());
        assert!(store.create_marker(trip.id, 0.0, 181.0, "Too far east", "").is_err());
        assert_eq!(store.marker_count(trip.id), 0);
        assert_eq!(store.next_ids().1, 1);
    }

    #[test]
    fn test_delete_trip_cascades_to_markers_and_images() {
        let mut store = mem_store();
        let doomed = store.create_trip("Doomed").unwrap();
        let kept = store.create_trip("Kept").unwrap();
        let m1 = store.create_marker(doomed.id, 1.0, 1.0, "A", "").unwrap();
        let m2 = store.create_marker(doomed.id, 2.0, 2.0, "B", "").unwrap();
        let m3 = store.create_marker(kept.id, 3.0, 3.0, "C", "").unwrap();
        store.add_image(m1.id, &png(1)).unwrap();
        store.add_image(m1.id, &png(2)).unwrap();
        store.add_image(m2.id, &png(3)).unwrap();
        let kept_image = store.add_image(m3.id, &png(4)).unwrap();

        let report = store.delete_trip(doomed.id).unwrap().unwrap();
        assert_eq!((report.trips, report.markers, report.images), (1, 2, 3));
        assert_eq!(store.totals(), (1, 1, 1));
        assert!(store.marker(m1.id).is_none());
        assert!(store.marker(m2.id).is_none());
        assert_eq!(store.list_images(m3.id), vec![kept_image]);

        // unknown id is a silent no-op
        assert_eq!(store.delete_trip(doomed.id).unwrap(), None);
    }

    #[test]
    fn test_delete_marker_cascades_and_keeps_sibling_order() {
        let mut store = mem_store();
        let trip = store.create_trip("Gaps").unwrap();
        let ids: Vec<u64> = (0..3)
            .map(|i| store.create_marker(trip.id, i as f64, 0.0, "M", "").unwrap().id)
            .collect();
        store.add_image(ids[1], &png(1)).unwrap();

        let report = store.delete_marker(ids[1]).unwrap().unwrap();
        assert_eq!((report.markers, report.images), (1, 1));
        assert_eq!(store.totals(), (1, 2, 0));

        let markers = store.list_markers(trip.id);
        assert_eq!(markers.iter().map(|m| m.id).collect::<Vec<_>>(), [ids[0], ids[2]]);
        assert_eq!(orders(&markers, |m| m.display_order), [0, 2]);
    }

    #[test]
    fn test_delete_image_compacts_remaining_orders() {
        let mut store = mem_store();
        let trip = store.create_trip("Photos").unwrap();
        let marker = store.create_marker(trip.id, 1.0, 1.0, "M", "").unwrap();
        let images: Vec<u64> = (0..4)
            .map(|i| store.add_image(marker.id, &png(i)).unwrap().id)
            .collect();

        assert!(store.delete_image(images[1]).unwrap());
        assert!(store.delete_image(images[3]).unwrap());
        assert!(!store.delete_image(999).unwrap());

        let left = store.list_images(marker.id);
        assert_eq!(left.iter().map(|img| img.id).collect::<Vec<_>>(), [images[0], images[2]]);
        assert_eq!(orders(&left, |img| img.display_order), [0, 1]);
        assert_eq!(store.add_image(marker.id, &png(9)).unwrap().display_order, 2);
    }

    #[test]
    fn test_add_image_requires_marker_and_data_url() {
        let mut store = mem_store();
        let trip = store.create_trip("Photos").unwrap();
        let marker = store.create_marker(trip.id, 1.0, 1.0, "M", "").unwrap();

        assert!(matches!(
            store.add_image(77, &png(1)),
            Err(TripError::Validation(_))
        ));
        assert!(matches!(
            store.add_image(marker.id, "/sdcard/DCIM/photo.jpg"),
            Err(TripError::InvalidDataUrl(_))
        ));
        assert_eq!(store.image_count(marker.id), 0);
    }

    #[test]
    fn test_reorder_markers_renumbers_contiguously() {
        let mut store = mem_store();
        let trip = store.create_trip("Route").unwrap();
        let ids: Vec<u64> = (0..4)
            .map(|i| store.create_marker(trip.id, i as f64, 0.0, "M", "").unwrap().id)
            .collect();
        store.delete_marker(ids[1]).unwrap();

        // move the last marker in front of the first
        assert!(store.reorder_markers(trip.id, ids[3], ids[0]).unwrap());
        let markers = store.list_markers(trip.id);
        assert_eq!(markers.iter().map(|m| m.id).collect::<Vec<_>>(), [ids[3], ids[0], ids[2]]);
        assert_eq!(orders(&markers, |m| m.display_order), [0, 1, 2]);

        assert!(!store.reorder_markers(trip.id, ids[3], ids[3]).unwrap());
        assert!(!store.reorder_markers(trip.id, ids[1], ids[0]).unwrap());
    }

    #[test]
    fn test_update_marker_merges_patch() {
        let mut store = mem_store();
        let trip = store.create_trip("Edits").unwrap();
        let marker = store.create_marker(trip.id, 1.0, 1.0, "Old", "Street").unwrap();
        store
            .update_marker(
                marker.id,
                MarkerPatch {
                    notes: Some(Some("Closed Mondays".to_string())),
                    category: Some(Some(Category::Food)),
                    ..Default::default()
                },
            )
            .unwrap();

        let patch: MarkerPatch =
            serde_json::from_value(json!({"title": "New", "notes": null})).unwrap();
        let updated = store.update_marker(marker.id, patch).unwrap().unwrap();
        assert_eq!(updated.title, "New");
        assert_eq!(updated.address, "Street");
        assert_eq!(updated.notes, None);
        assert_eq!(updated.category, Some(Category::Food));

        let bad = MarkerPatch {
            latitude: Some(100.0),
            ..Default::default()
        };
        assert!(store.update_marker(marker.id, bad).is_err());
        assert_eq!(store.marker(marker.id).unwrap().latitude, 1.0);
        assert_eq!(store.update_marker(999, MarkerPatch::default()).unwrap(), None);
    }

    #[test]
    fn test_cover_follows_first_image_of_first_marker() {
        let mut store = mem_store();
        let trip = store.create_trip("Covers").unwrap();
        let first = store.create_marker(trip.id, 1.0, 1.0, "First", "").unwrap();
        let second = store.create_marker(trip.id, 2.0, 2.0, "Second", "").unwrap();

        // no images anywhere leaves the cover unset
        assert_eq!(store.recompute_trip_cover(trip.id).unwrap(), None);
        assert_eq!(store.trip(trip.id).unwrap().cover_image_path, None);

        store.add_image(second.id, &png(2)).unwrap();
        assert_eq!(store.recompute_trip_cover(trip.id).unwrap(), Some(png(2)));

        let img = store.add_image(first.id, &png(1)).unwrap();
        store.recompute_trip_cover(trip.id).unwrap();
        assert_eq!(store.trip(trip.id).unwrap().cover_image_path, Some(png(1)));

        // the cached cover is only refreshed on request; summaries compute it live
        store.delete_image(img.id).unwrap();
        assert_eq!(store.trip(trip.id).unwrap().cover_image_path, Some(png(1)));
        let summary = &store.trip_summaries()[0];
        assert_eq!(summary.cover, Some(png(2)));
        assert_eq!(summary.marker_count, 2);
    }

    #[test]
    fn test_cover_ignores_images_on_later_markers() {
        let mut store = mem_store();
        let trip = store.create_trip("Stable cover").unwrap();
        let first = store.create_marker(trip.id, 1.0, 1.0, "First", "").unwrap();
        let later = store.create_marker(trip.id, 2.0, 2.0, "Later", "").unwrap();

        store.add_image(first.id, &png(1)).unwrap();
        assert_eq!(store.recompute_trip_cover(trip.id).unwrap(), Some(png(1)));

        store.add_image(later.id, &png(2)).unwrap();
        assert_eq!(store.recompute_trip_cover(trip.id).unwrap(), Some(png(1)));
        assert_eq!(store.trip(trip.id).unwrap().cover_image_path, Some(png(1)));
        assert_eq!(store.trip_summaries()[0].cover, Some(png(1)));
    }

    #[test]
    fn test_clear_keeps_identity_counters() {
        let mut store = mem_store();
        let trip = store.create_trip("Temp").unwrap();
        let marker = store.create_marker(trip.id, 1.0, 1.0, "M", "").unwrap();
        store.add_image(marker.id, &png(1)).unwrap();

        store.clear().unwrap();
        assert_eq!(store.totals(), (0, 0, 0));
        assert_eq!(store.create_trip("Next").unwrap().id, 2);
    }

    #[test]
    fn test_every_mutation_is_one_write() {
        let mut store = mem_store();
        let trip = store.create_trip("Writes").unwrap();
        let marker = store.create_marker(trip.id, 1.0, 1.0, "M", "").unwrap();
        assert_eq!(store.backend().write_count(), 2);

        store.delete_trip(trip.id).unwrap();
        assert_eq!(store.backend().write_count(), 3);

        // no-ops do not write
        store.delete_marker(marker.id).unwrap();
        store.update_trip(trip.id, "Ghost").unwrap();
        assert_eq!(store.backend().write_count(), 3);

        let raw = store.backend().load(NEXT_TRIP_ID_KEY).unwrap().unwrap();
        assert_eq!(raw, b"2");
        let raw = store.backend().load(MARKERS_KEY).unwrap().unwrap();
        assert_eq!(raw, b"[]");
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let mut store = EntityStore::open(FlakyBlobStore::default()).unwrap();
        let trip = store.create_trip("Safe").unwrap();
        store.create_marker(trip.id, 1.0, 1.0, "M", "").unwrap();

        store.backend_mut().fail_writes = true;
        assert!(matches!(store.delete_trip(trip.id), Err(TripError::Io(_))));
        assert!(store.create_trip("Lost").is_err());
        assert_eq!(store.totals(), (1, 1, 0));
        assert_eq!(store.next_ids(), (2, 2, 1));

        store.backend_mut().fail_writes = false;
        assert_eq!(store.create_trip("Kept").unwrap().id, 2);
    }

    #[test]
    fn test_lmdb_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("trips");
        let name = name.to_str().unwrap();

        let (trip_id, marker_id) = {
            let mut store = EntityStore::open(LmdbBlobStore::init(name).unwrap()).unwrap();
            let trip = store.create_trip("Persisted").unwrap();
            let marker = store.create_marker(trip.id, 39.9, 116.4, "Here", "There").unwrap();
            store.add_image(marker.id, &png(7)).unwrap();
            store.backend_mut().close_database().unwrap();
            (trip.id, marker.id)
        };

        let mut store = EntityStore::open(LmdbBlobStore::init(name).unwrap()).unwrap();
        info!("Reopened LMDB store at {}", store.backend().path().display());
        assert_eq!(store.totals(), (1, 1, 1));
        assert_eq!(store.trip(trip_id).unwrap().name, "Persisted");
        assert_eq!(store.list_images(marker_id)[0].data_url, png(7));
        assert_eq!(store.create_trip("Second").unwrap().id, trip_id + 1);
    }

    #[test]
    fn test_lmdb_reset_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old");
        let fresh = dir.path().join("fresh");

        let mut store = EntityStore::open(LmdbBlobStore::init(old.to_str().unwrap()).unwrap()).unwrap();
        store.create_trip("Gone soon").unwrap();

        assert!(store.backend_mut().reset_database(fresh.to_str().unwrap()).unwrap());
        store.reload().unwrap();
        assert_eq!(store.totals(), (0, 0, 0));
        assert_eq!(store.next_ids(), (1, 1, 1));
        assert!(!dir.path().join("old.lmdb").exists());
        assert!(dir.path().join("fresh.lmdb").exists());
    }

    #[test]
    fn test_seed_demo_trip() {
        let mut store = mem_store();
        let trip = seed_demo_trip(&mut store).unwrap();
        assert_eq!(trip.name, DEMO_TRIP_NAME);

        let markers = store.list_markers(trip.id);
        assert_eq!(markers.len(), 5);
        assert_eq!(orders(&markers, |m| m.display_order), [0, 1, 2, 3, 4]);
        assert_eq!(markers[0].title, "Tiananmen Square");
        assert_eq!(markers[0].color, DEFAULT_MARKER_COLOR);
        assert_eq!(markers[2].color, "#2196F3");
        assert!(markers.iter().all(|m| m.notes.is_some()));
    }

    // 2. Controller on the projected canvas

    #[test]
    fn test_canvas_routes_connect_consecutive_markers() {
        let mut store = mem_store();
        let trip = store.create_trip("Two stops").unwrap();
        let p1 = store.create_marker(trip.id, 39.90, 116.40, "P1", "").unwrap();
        let p2 = store.create_marker(trip.id, 39.92, 116.41, "P2", "").unwrap();

        let mut controller = canvas_controller();
        let summary = controller.enter_trip(&store, trip.id).unwrap().unwrap();
        assert_eq!(summary.renderer, RendererKind::ProjectedCanvas);
        assert_eq!(summary.marker_count, 2);
        assert!(!summary.show_add_hint);
        assert!(controller.renderer().scene().unwrap().routes.is_empty());

        assert_eq!(controller.toggle_routes(&store), Some(true));
        let scene = controller.renderer().scene().unwrap();
        assert_eq!(scene.pins.len(), 2);
        assert_eq!(scene.routes.len(), 1);
        assert_eq!((scene.routes[0].from, scene.routes[0].to), (p1.id, p2.id));
        assert_eq!(scene.routes[0].start, scene.pins[0].at);

        store.delete_trip(trip.id).unwrap();
        assert_eq!(store.totals(), (0, 0, 0));
        assert_eq!(controller.render(&store).unwrap().marker_count, 0);
    }

    #[test]
    fn test_routes_follow_reordered_markers() {
        let mut store = mem_store();
        let trip = store.create_trip("Loop").unwrap();
        let a = store.create_marker(trip.id, 39.90, 116.40, "A", "").unwrap();
        let b = store.create_marker(trip.id, 39.91, 116.40, "B", "").unwrap();
        let c = store.create_marker(trip.id, 39.92, 116.40, "C", "").unwrap();

        let mut controller = canvas_controller();
        controller.enter_trip(&store, trip.id).unwrap();
        controller.toggle_routes(&store);
        assert!(controller.reorder_markers(&mut store, c.id, a.id).unwrap());

        let routes = &controller.renderer().scene().unwrap().routes;
        let legs: Vec<(u64, u64)> = routes.iter().map(|r| (r.from, r.to)).collect();
        assert_eq!(legs, [(c.id, a.id), (a.id, b.id)]);

        let rows = controller.marker_list(&store);
        assert_eq!(rows.iter().map(|r| r.number).collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(rows[0].marker.id, c.id);
    }

    #[test]
    fn test_drag_swallows_the_following_click() {
        let mut store = mem_store();
        let trip = store.create_trip("Drag").unwrap();
        let mut controller = canvas_controller();
        let summary = controller.enter_trip(&store, trip.id).unwrap().unwrap();
        assert!(summary.show_add_hint);

        controller.pointer_down(ScreenPoint::new(100.0, 100.0));
        assert_eq!(controller.state(), ViewState::Dragging);
        controller.pointer_move(&store, ScreenPoint::new(150.0, 120.0));
        controller.pointer_up();
        assert_eq!(controller.state(), ViewState::Idle);
        assert_eq!(controller.session().view.pan, ScreenPoint::new(50.0, 20.0));

        let clicked = controller
            .background_click(&mut store, ScreenPoint::new(150.0, 120.0))
            .unwrap();
        assert!(clicked.is_none());
        assert_eq!(store.marker_count(trip.id), 0);

        let at = ScreenPoint::new(400.0, 300.0);
        let expected = projector().unproject(at, &controller.session().view);
        let marker = controller.background_click(&mut store, at).unwrap().unwrap();
        assert!((marker.latitude - expected.lat).abs() < 1e-9);
        assert!((marker.longitude - expected.lng).abs() < 1e-9);
        assert_eq!(marker.title, format!("Location {:.4}, {:.4}", expected.lat, expected.lng));
        assert_eq!(controller.state(), ViewState::MarkerSelected(marker.id));
    }

    #[test]
    fn test_small_jitter_is_still_a_click() {
        let mut store = mem_store();
        let trip = store.create_trip("Jitter").unwrap();
        let mut controller = canvas_controller();
        controller.enter_trip(&store, trip.id).unwrap();

        controller.pointer_down(ScreenPoint::new(200.0, 200.0));
        controller.pointer_move(&store, ScreenPoint::new(202.0, 201.0));
        controller.pointer_up();
        let marker = controller
            .background_click(&mut store, ScreenPoint::new(202.0, 201.0))
            .unwrap();
        assert!(marker.is_some());
    }

    #[test]
    fn test_select_marker_centers_it_on_canvas() {
        let mut store = mem_store();
        let trip = store.create_trip("Focus").unwrap();
        store.create_marker(trip.id, 39.9042, 116.4074, "Square", "").unwrap();
        let far = store.create_marker(trip.id, 39.9163, 116.3972, "Palace", "").unwrap();

        let mut controller = canvas_controller();
        controller.enter_trip(&store, trip.id).unwrap();
        let summary = controller.marker_clicked(&store, far.id).unwrap();
        assert_eq!(summary.selected, Some(far.id));
        assert_eq!(controller.state(), ViewState::MarkerSelected(far.id));

        let view = controller.session().view;
        assert_eq!(view.zoom, FOCUS_ZOOM);
        let on_screen = projector().project(far.position(), &view);
        assert!(on_screen.distance(ScreenPoint::new(400.0, 300.0)) < 1e-6);

        let details = controller.selected_details(&store).unwrap();
        assert_eq!(details.coordinates, "39.916300, 116.397200");

        controller.close_marker_info(&store);
        assert_eq!(controller.state(), ViewState::Idle);
    }

    #[test]
    fn test_selection_is_limited_to_active_trip() {
        let mut store = mem_store();
        let here = store.create_trip("Here").unwrap();
        let there = store.create_trip("There").unwrap();
        let foreign = store.create_marker(there.id, 1.0, 1.0, "Elsewhere", "").unwrap();

        let mut controller = canvas_controller();
        controller.enter_trip(&store, here.id).unwrap();
        assert!(controller.select_marker(&store, foreign.id).is_none());
        assert_eq!(controller.state(), ViewState::Idle);
    }

    #[test]
    fn test_zoom_stays_within_bounds() {
        let mut store = mem_store();
        let trip = store.create_trip("Zoom").unwrap();
        store.create_marker(trip.id, 39.9, 116.4, "M", "").unwrap();
        let mut controller = canvas_controller();
        controller.enter_trip(&store, trip.id).unwrap();

        for _ in 0..30 {
            controller.zoom_in(&store);
            assert!(controller.session().view.zoom <= MAX_ZOOM);
        }
        assert_eq!(controller.session().view.zoom, MAX_ZOOM);
        for _ in 0..30 {
            controller.zoom_out(&store);
            assert!(controller.session().view.zoom >= MIN_ZOOM);
        }
        assert_eq!(controller.session().view.zoom, MIN_ZOOM);
    }

    #[test]
    fn test_delete_selected_and_clear_markers() {
        let mut store = mem_store();
        let trip = store.create_trip("Cleanup").unwrap();
        let mut controller = canvas_controller();
        controller.enter_trip(&store, trip.id).unwrap();

        assert!(matches!(
            controller.clear_markers(&mut store),
            Err(TripError::Validation(_))
        ));

        let first = controller.add_marker_at(&mut store, 39.9, 116.4).unwrap().unwrap();
        store.add_image(first.id, &png(1)).unwrap();
        let report = controller.delete_selected_marker(&mut store).unwrap().unwrap();
        assert_eq!((report.markers, report.images), (1, 1));
        assert_eq!(controller.state(), ViewState::Idle);

        controller.add_marker_at(&mut store, 39.9, 116.4).unwrap();
        controller.add_marker_at(&mut store, 39.8, 116.3).unwrap();
        assert_eq!(controller.clear_markers(&mut store).unwrap().markers, 2);
        assert_eq!(store.marker_count(trip.id), 0);
        assert!(store.trip(trip.id).is_some());
    }

    #[test]
    fn test_enter_and_leave_trip() {
        let mut store = mem_store();
        let trip = store.create_trip("Session").unwrap();
        let mut controller = canvas_controller();
        assert_eq!(controller.state(), ViewState::Inactive);
        assert!(controller.enter_trip(&store, 404).unwrap().is_none());
        assert_eq!(controller.state(), ViewState::Inactive);

        controller.enter_trip(&store, trip.id).unwrap();
        assert_eq!(controller.state(), ViewState::Idle);
        assert!(!controller.session().show_routes);
        controller.leave_trip();
        assert_eq!(controller.state(), ViewState::Inactive);
        assert!(controller.add_marker_at(&mut store, 1.0, 1.0).unwrap().is_none());
    }

    // 3. Controller on the live widget

    #[test]
    fn test_live_toggles_need_an_open_trip() {
        let mut store = mem_store();
        let trip = store.create_trip("Toggles").unwrap();
        let (mut controller, log) = live_controller();

        assert_eq!(controller.toggle_routes(&store), None);
        assert_eq!(controller.toggle_traffic(), None);
        assert!(!controller.session().show_routes);
        assert!(!controller.session().show_traffic);
        assert_eq!(log.borrow().traffic, None);

        controller.enter_trip(&store, trip.id).unwrap();
        assert_eq!(controller.toggle_traffic(), Some(true));
        controller.leave_trip();
        assert_eq!(controller.toggle_traffic(), None);
        assert_eq!(log.borrow().traffic, Some(true));
    }

    #[test]
    fn test_live_widget_overlays_and_focus() {
        let mut store = mem_store();
        let trip = store.create_trip("Live").unwrap();
        let (mut controller, log) = live_controller();
        assert_eq!(controller.renderer().kind(), RendererKind::LiveWidget);

        controller.enter_trip(&store, trip.id).unwrap();
        assert_eq!(log.borrow().fits, 1);
        assert_eq!(log.borrow().traffic, Some(false));

        log.borrow_mut().geocode = Some(PlaceLabel {
            title: "Jingshan Park".to_string(),
            address: "44 Jingshan West St".to_string(),
        });
        let first = controller.map_clicked(&mut store, 39.9250, 116.3970).unwrap().unwrap();
        assert_eq!(first.title, "Jingshan Park");
        assert_eq!(log.borrow().center, Some(first.position()));
        assert_eq!(log.borrow().zoom, Some(WIDGET_FOCUS_ZOOM));

        log.borrow_mut().geocode = None;
        let second = controller.map_clicked(&mut store, 39.9300, 116.4000).unwrap().unwrap();
        assert_eq!(second.address, "Lat: 39.9300, Lng: 116.4000");

        assert_eq!(controller.toggle_routes(&store), Some(true));
        {
            let log = log.borrow();
            assert_eq!(log.markers_on_map.len(), 2);
            assert_eq!(log.lines_on_map.len(), 1);
            let line = log.lines_on_map.values().next().unwrap();
            assert_eq!(line.as_slice(), [first.position(), second.position()]);
            let selected: Vec<&MarkerPin> =
                log.markers_on_map.values().filter(|p| p.selected).collect();
            assert_eq!(selected.len(), 1);
            assert_eq!(selected[0].marker_id, second.id);
        }

        assert_eq!(controller.toggle_routes(&store), Some(false));
        assert!(log.borrow().lines_on_map.is_empty());

        assert_eq!(controller.toggle_traffic(), Some(true));
        assert_eq!(log.borrow().traffic, Some(true));

        controller.zoom_in(&store);
        controller.zoom_in(&store);
        controller.zoom_out(&store);
        assert_eq!(log.borrow().zoom_steps, 1);
        assert_eq!(controller.session().view.zoom, 1.0);
    }

    #[test]
    fn test_backend_falls_back_when_widget_fails() {
        let renderer = select_backend::<FakeWidget>(
            Err(TripError::ServiceUnavailable("no API key".to_string())),
            projector(),
        );
        assert_eq!(renderer.kind(), RendererKind::ProjectedCanvas);
        assert!(renderer.scene().is_some());
    }

    // 4. Search adapter

    #[test]
    fn test_search_debounces_keystrokes() {
        let mut search = SearchAdapter::default();
        let mut provider = FakeProvider::ready();
        let t0 = Instant::now();

        search.input_changed("t", t0);
        search.input_changed("te", t0 + Duration::from_millis(100));
        search.input_changed("tem", t0 + Duration::from_millis(200));
        assert_eq!(search.poll(&mut provider, t0 + Duration::from_millis(300)), None);

        let due = t0 + Duration::from_millis(200) + SUGGESTION_DEBOUNCE;
        let seq = search.poll(&mut provider, due).unwrap();
        assert_eq!(provider.suggestions, [(seq, "tem".to_string())]);
        assert_eq!(search.poll(&mut provider, due), None);
    }

    #[test]
    fn test_search_discards_stale_responses() {
        let mut search = SearchAdapter::default();
        let mut provider = FakeProvider::ready();
        let t0 = Instant::now();

        search.input_changed("X", t0);
        let x = search.poll(&mut provider, t0 + SUGGESTION_DEBOUNCE).unwrap();
        let t1 = t0 + Duration::from_secs(1);
        search.input_changed("Y", t1);
        let y = search.poll(&mut provider, t1 + SUGGESTION_DEBOUNCE).unwrap();

        let y_places = vec![place("Yonghe Temple", "Dongcheng", Some((39.947, 116.417)))];
        assert!(search.on_suggestions(y, SearchOutcome::Found(y_places.clone())));
        let x_places = vec![place("Xidan", "Xicheng", Some((39.907, 116.373)))];
        assert!(!search.on_suggestions(x, SearchOutcome::Found(x_places)));
        assert_eq!(search.panel(), &SearchPanel::Suggestions(y_places));
    }

    #[test]
    fn test_search_clear_supersedes_in_flight_query() {
        let mut search = SearchAdapter::default();
        let mut provider = FakeProvider::ready();
        let t0 = Instant::now();
        search.input_changed("park", t0);
        let seq = search.poll(&mut provider, t0 + SUGGESTION_DEBOUNCE).unwrap();

        search.clear();
        let late = vec![place("Beihai Park", "Xicheng", Some((39.925, 116.389)))];
        assert!(!search.on_suggestions(seq, SearchOutcome::Found(late)));
        assert_eq!(search.panel(), &SearchPanel::Hidden);
        assert_eq!(search.input(), "");
    }

    #[test]
    fn test_search_suggestions_need_coordinates_and_are_capped() {
        let mut search = SearchAdapter::default();
        let mut provider = FakeProvider::ready();
        let t0 = Instant::now();
        search.input_changed("cafe", t0);
        let seq = search.poll(&mut provider, t0 + SUGGESTION_DEBOUNCE).unwrap();

        let mut places: Vec<Place> = (0..12)
            .map(|i| place(&format!("Cafe {i}"), "Somewhere", Some((39.9, 116.4 + i as f64 * 0.001))))
            .collect();
        places.insert(0, place("Cafe district", "", None));
        assert!(search.on_suggestions(seq, SearchOutcome::Found(places)));

        match search.panel() {
            SearchPanel::Suggestions(shown) => {
                assert_eq!(shown.len(), MAX_SUGGESTIONS);
                assert!(shown.iter().all(|p| p.location.is_some()));
                assert_eq!(shown[0].name, "Cafe 0");
            }
            other => panic!("expected suggestions, got {other:?}"),
        }
    }

    #[test]
    fn test_search_waits_for_service() {
        let mut search = SearchAdapter::default();
        let mut provider = FakeProvider::default();
        let t0 = Instant::now();

        search.input_changed("hotpot", t0);
        assert_eq!(search.submit(&mut provider, t0), None);
        assert_eq!(search.panel(), &SearchPanel::Loading);
        assert!(provider.places.is_empty());

        provider.ready = true;
        let early = t0 + SERVICE_RETRY_BACKOFF - Duration::from_millis(1);
        assert_eq!(search.poll(&mut provider, early), None);
        let seq = search.poll(&mut provider, t0 + SERVICE_RETRY_BACKOFF).unwrap();
        assert_eq!(seq, search.latest_seq());
        assert_eq!(provider.places, [(seq, "hotpot".to_string())]);

        let results: Vec<Place> = (0..15)
            .map(|i| place(&format!("Hotpot {i}"), "Chaoyang", Some((39.93, 116.45))))
            .collect();
        assert!(search.on_search_results(&mut provider, seq, SearchOutcome::Found(results), t0));
        match search.panel() {
            SearchPanel::Results(shown) => assert_eq!(shown.len(), MAX_RESULTS),
            other => panic!("expected results, got {other:?}"),
        }
    }

    #[test]
    fn test_search_retries_no_data_once() {
        let mut search = SearchAdapter::default();
        let mut provider = FakeProvider::ready();
        let t0 = Instant::now();

        search.input_changed("zzz", t0);
        let seq = search.submit(&mut provider, t0).unwrap();
        assert!(search.on_search_results(&mut provider, seq, SearchOutcome::NoData, t0));
        assert_eq!(provider.places.len(), 2);
        assert!(search.on_search_results(&mut provider, seq, SearchOutcome::NoData, t0));
        assert_eq!(provider.places.len(), 2);
        assert_eq!(search.panel(), &SearchPanel::NoResults);
    }

    #[test]
    fn test_search_selection_adds_marker() {
        let mut store = mem_store();
        let trip = store.create_trip("Search").unwrap();
        let (mut controller, log) = live_controller();
        controller.enter_trip(&store, trip.id).unwrap();

        let mut search = SearchAdapter::default();
        let mut provider = FakeProvider::ready();
        let t0 = Instant::now();
        search.input_changed("lama", t0);
        let seq = search.submit(&mut provider, t0).unwrap();
        let hits = vec![
            place("Lama Temple", "12 Yonghegong St", Some((39.9470, 116.4170))),
            place("Lama Cafe", "", Some((39.9480, 116.4180))),
        ];
        search.on_search_results(&mut provider, seq, SearchOutcome::Found(hits.clone()), t0);

        let picked = search.select(0).unwrap();
        assert_eq!(search.panel(), &SearchPanel::Hidden);
        assert_eq!(search.input(), "Lama Temple");
        let marker = add_selected_place(&mut controller, &mut store, &picked)
            .unwrap()
            .unwrap();
        assert_eq!(marker.title, "Lama Temple");
        assert_eq!(marker.address, "12 Yonghegong St");
        assert_eq!(controller.state(), ViewState::MarkerSelected(marker.id));

        // a late answer to the superseded search is ignored
        assert!(!search.on_search_results(&mut provider, seq, SearchOutcome::Found(hits), t0));
        assert!(search.select(1).is_none());

        // blank address goes through reverse geocoding
        let blank = PlaceSelection {
            at: LatLng::new(39.9480, 116.4180),
            name: "Lama Cafe".to_string(),
            address: String::new(),
        };
        let marker = add_selected_place(&mut controller, &mut store, &blank)
            .unwrap()
            .unwrap();
        assert_eq!(marker.title, "Location 39.9480, 116.4180");
        assert_eq!(log.borrow().zoom, Some(WIDGET_FOCUS_ZOOM));
    }

    #[test]
    fn test_search_focus_uses_search_zoom() {
        let mut store = mem_store();
        let trip = store.create_trip("Focus").unwrap();
        let (mut controller, log) = live_controller();
        controller.enter_trip(&store, trip.id).unwrap();

        controller.focus_search_result(LatLng::new(39.9, 116.4));
        assert_eq!(log.borrow().zoom, Some(WIDGET_SEARCH_ZOOM));
    }

    #[test]
    fn test_place_detail_line() {
        let mut p = place("Hutong", "Gulou E St", Some((39.94, 116.40)));
        assert_eq!(p.detail_line(), "Gulou E St");
        p.distance_m = Some(1234.0);
        assert_eq!(p.detail_line(), "Gulou E St · 1.2km");
    }

    // 5. Marker editor

    #[test]
    fn test_editor_saves_form_and_pending_images() {
        let mut store = mem_store();
        let trip = store.create_trip("Editing").unwrap();
        let marker = store.create_marker(trip.id, 39.9288, 116.3970, "Park", "").unwrap();
        let stored = store.add_image(marker.id, &png(1)).unwrap();

        let mut editor = MarkerEditor::open(&store, marker.id).unwrap();
        assert_eq!(editor.form().title, "Park");
        assert_eq!(
            editor.pending(),
            [PendingImage::Stored { id: stored.id, data_url: png(1) }]
        );

        editor.attach(&png(2)).unwrap();
        editor.attach(&png(3)).unwrap();
        assert!(editor.attach("not an image").is_err());
        assert!(editor.remove(&mut store, 0).unwrap());
        assert!(store.image(stored.id).is_none());
        assert!(!editor.remove(&mut store, 5).unwrap());

        let form = MarkerForm {
            title: "  Jingshan Park ".to_string(),
            address: "44 Jingshan West St".to_string(),
            notes: "   ".to_string(),
            link: String::new(),
            color: "#4CAF50".to_string(),
            category: "nature".to_string(),
        };
        let saved = editor.save(&mut store, form).unwrap().unwrap();
        assert_eq!(saved.title, "Jingshan Park");
        assert_eq!(saved.notes, None);
        assert_eq!(saved.link, None);
        assert_eq!(saved.color, "#4CAF50");
        assert_eq!(saved.category, Some(Category::Nature));

        let images = store.list_images(marker.id);
        assert_eq!(images.iter().map(|i| i.data_url.clone()).collect::<Vec<_>>(), [png(2), png(3)]);
        assert_eq!(orders(&images, |i| i.display_order), [0, 1]);
        assert!(editor.pending().iter().all(|p| matches!(p, PendingImage::Stored { .. })));
        assert_eq!(store.trip(trip.id).unwrap().cover_image_path, Some(png(2)));
    }

    #[test]
    fn test_editor_rejects_blank_title() {
        let mut store = mem_store();
        let trip = store.create_trip("Editing").unwrap();
        let marker = store.create_marker(trip.id, 1.0, 1.0, "Keep me", "").unwrap();
        let mut editor = MarkerEditor::open(&store, marker.id).unwrap();
        editor.attach(&png(1)).unwrap();

        let form = MarkerForm {
            title: "   ".to_string(),
            ..editor.form().clone()
        };
        assert!(matches!(editor.save(&mut store, form), Err(TripError::Validation(_))));
        assert_eq!(store.marker(marker.id).unwrap().title, "Keep me");
        assert_eq!(store.image_count(marker.id), 0);
        assert!(MarkerEditor::open(&store, 999).is_none());
    }

    // 6. FFI functions

    #[test]
    fn test_ffi_trip_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let name = CString::new(dir.path().join("ffi").to_str().unwrap()).unwrap();
        let store = open_store(name.as_ptr());
        assert!(!store.is_null());

        let blank = CString::new("   ").unwrap();
        let response = read_response(create_trip(store, blank.as_ptr()));
        assert!(response.get("ValidationError").is_some(), "{response}");

        let trip_name = CString::new(" Beijing ").unwrap();
        let trip = ok_json(&read_response(create_trip(store, trip_name.as_ptr())));
        assert_eq!(trip["name"], "Beijing");
        let trip_id = trip["id"].as_u64().unwrap();

        let payload = json!({"tripId": trip_id, "latitude": 39.9163, "longitude": 116.3972});
        let payload = CString::new(payload.to_string()).unwrap();
        let marker = ok_json(&read_response(create_marker(store, payload.as_ptr())));
        assert_eq!(marker["title"], "Location 39.9163, 116.3972");
        assert_eq!(marker["displayOrder"], 0);
        let marker_id = marker["id"].as_u64().unwrap();

        let patch = CString::new(r#"{"title":"Forbidden City","category":"culture"}"#).unwrap();
        let updated = ok_json(&read_response(update_marker(store, marker_id, patch.as_ptr())));
        assert_eq!(updated["title"], "Forbidden City");
        assert_eq!(updated["category"], "culture");

        let image = CString::new(png(1)).unwrap();
        let added = ok_json(&read_response(add_image(store, marker_id, image.as_ptr())));
        assert_eq!(added["markerId"], marker_id);
        let images = ok_json(&read_response(list_images(store, marker_id)));
        assert_eq!(images.as_array().unwrap().len(), 1);

        let cover = ok_json(&read_response(recompute_trip_cover(store, trip_id)));
        assert_eq!(cover, Value::String(png(1)));
        let summaries = ok_json(&read_response(trip_summaries(store)));
        assert_eq!(summaries[0]["markerCount"], 1);
        assert_eq!(summaries[0]["trip"]["coverImagePath"], Value::String(png(1)));

        let deleted = read_response(delete_trip(store, trip_id));
        assert!(deleted["Ok"].as_str().unwrap().contains("1 markers and 1 images"));
        let again = read_response(delete_trip(store, trip_id));
        assert!(again.get("NotFound").is_some());
        assert_eq!(ok_json(&read_response(list_trips(store))), json!([]));

        let closed = read_response(close_store(store));
        assert!(closed.get("Ok").is_some());
    }

    #[test]
    fn test_ffi_markers_and_images() {
        let dir = tempfile::tempdir().unwrap();
        let name = CString::new(dir.path().join("markers").to_str().unwrap()).unwrap();
        let store = open_store(name.as_ptr());
        let demo = ok_json(&read_response(seed_demo(store)));
        let trip_id = demo["id"].as_u64().unwrap();

        let markers = ok_json(&read_response(list_markers(store, trip_id)));
        let ids: Vec<u64> = markers
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids.len(), 5);

        let reordered = ok_json(&read_response(reorder_markers(store, trip_id, ids[4], ids[0])));
        assert_eq!(reordered[0]["id"], ids[4]);

        let bad_patch = CString::new(r##"{"colour":"#000"}"##).unwrap();
        let response = read_response(update_marker(store, ids[0], bad_patch.as_ptr()));
        assert!(response.get("SerializationError").is_some(), "{response}");

        let bad_image = CString::new("file:///photo.jpg").unwrap();
        let response = read_response(add_image(store, ids[0], bad_image.as_ptr()));
        assert!(response.get("ValidationError").is_some(), "{response}");
        let response = read_response(delete_image(store, 12345));
        assert!(response.get("NotFound").is_some());

        let response = read_response(delete_marker(store, ids[1]));
        assert!(response.get("Ok").is_some());
        let response = read_response(clear_markers(store, trip_id));
        assert!(response["Ok"].as_str().unwrap().starts_with("Removed 4 markers"));

        let response = read_response(clear_all_records(store));
        assert!(response.get("Ok").is_some());
        assert_eq!(ok_json(&read_response(list_trips(store))), json!([]));

        let fresh = CString::new(dir.path().join("markers_fresh").to_str().unwrap()).unwrap();
        let response = read_response(reset_database(store, fresh.as_ptr()));
        assert!(response.get("Ok").is_some(), "{response}");
        let trip_name = CString::new("After reset").unwrap();
        let trip = ok_json(&read_response(create_trip(store, trip_name.as_ptr())));
        assert_eq!(trip["id"], 1);

        read_response(close_store(store));
    }

    #[test]
    fn test_ffi_store_honours_configured_map_size() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("small");
        let config = TripMapConfig::from_lookup(|key| {
            (key == "TRIPMAP_LMDB_MAP_SIZE").then(|| "1048576".to_string())
        })
        .unwrap();
        assert_eq!(config.lmdb_map_size, 1_048_576);

        let mut store = open_handle(name.to_str().unwrap(), &config).unwrap();
        let trip = store.create_trip("Small map").unwrap();
        let marker = store.create_marker(trip.id, 1.0, 1.0, "Big photo", "").unwrap();

        let photo = encode_data_url("image/png", &vec![0x42; 3 * 1024 * 1024]);
        let err = store.add_image(marker.id, &photo).unwrap_err();
        assert!(matches!(err, TripError::Database(lmdb::Error::MapFull)), "{err:?}");
        let response = AppResponse::from(err);
        assert!(matches!(response, AppResponse::DatabaseError(_)), "{response:?}");
        assert!(store.list_images(marker.id).is_empty());

        store.add_image(marker.id, &png(1)).unwrap();
        assert_eq!(store.list_images(marker.id).len(), 1);
    }

    #[test]
    fn test_ffi_null_pointers() {
        assert!(open_store(std::ptr::null()).is_null());

        let response = read_response(list_trips(std::ptr::null_mut()));
        assert!(response.get("BadRequest").is_some());
        let response = read_response(close_store(std::ptr::null_mut()));
        assert!(response.get("BadRequest").is_some());

        let dir = tempfile::tempdir().unwrap();
        let name = CString::new(dir.path().join("nulls").to_str().unwrap()).unwrap();
        let store = open_store(name.as_ptr());
        let response = read_response(create_trip(store, std::ptr::null()));
        assert!(response.get("BadRequest").is_some());
        let response = read_response(create_marker(store, std::ptr::null()));
        assert!(response.get("BadRequest").is_some());

        free_c_string(std::ptr::null_mut());
        read_response(close_store(store));
    }
}
