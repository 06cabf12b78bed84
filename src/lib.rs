//! # Trip Map Core
//!
//! Offline core of a travel-planning map: trips, ordered markers with inline
//! photos, a map view controller with a live-widget and a projected-canvas
//! backend, and a place search adapter. Everything is persisted locally in
//! LMDB and exposed to host UIs (Flutter, web views, native shells) through a
//! small C ABI that speaks JSON.
//!
//! ## Features
//!
//! - **Atomic persistence**: the whole store is written in one LMDB transaction
//! - **Cascading deletes**: deleting a trip removes its markers and their images
//! - **Two renderers**: a live map widget when one initializes, a projected canvas otherwise
//! - **Stale-safe search**: late search responses never overwrite newer ones
//! - **Safe error handling**: No `unwrap()` calls in production code
//!
//! ## Quick Start
//!
//! ```no_run
//! use trip_map_core::{create_marker, create_trip, free_c_string, open_store};
//! use std::ffi::CString;
//!
//! let name = CString::new("my_trips").unwrap();
//! let store = open_store(name.as_ptr());
//!
//! let trip_name = CString::new("Kyoto").unwrap();
//! let result = create_trip(store, trip_name.as_ptr());
//! free_c_string(result as *mut _);
//!
//! let marker = CString::new(r#"{"tripId":1,"latitude":35.0116,"longitude":135.7681}"#).unwrap();
//! let result = create_marker(store, marker.as_ptr());
//! free_c_string(result as *mut _);
//! ```
//!
//! ## FFI Functions
//!
//! Every function below returns a JSON-encoded [`AppResponse`] that must be
//! released with [`free_c_string`]; `Ok` payloads are themselves JSON.
//!
//! - [`open_store`] / [`close_store`] - Store lifecycle
//! - [`list_trips`], [`trip_summaries`], [`create_trip`], [`update_trip`], [`delete_trip`]
//! - [`list_markers`], [`create_marker`], [`update_marker`], [`delete_marker`],
//!   [`clear_markers`], [`reorder_markers`]
//! - [`list_images`], [`add_image`], [`delete_image`], [`recompute_trip_cover`]
//! - [`clear_all_records`], [`reset_database`], [`seed_demo`]

pub mod app_response;
pub mod blob_store;
pub mod config;
pub mod controller;
pub mod demo;
pub mod editor;
pub mod error;
pub mod model;
pub mod projector;
pub mod renderer;
pub mod search;
pub mod store;
mod test;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use crate::app_response::AppResponse;
use crate::blob_store::LmdbBlobStore;
use crate::config::TripMapConfig;
use crate::error::TripError;
use crate::model::{require_text, EntityKind, LatLng, MarkerPatch};
use crate::renderer::PlaceLabel;
use crate::store::EntityStore;

/// The store behind every handle returned by [`open_store`].
pub type StoreHandle = EntityStore<LmdbBlobStore>;

/// Opens (or creates) the trip store with the specified name.
///
/// The data lives in an LMDB environment in the directory `<name>.lmdb`.
/// Everything stored there is loaded into memory before this returns. The
/// map size comes from `TRIPMAP_LMDB_MAP_SIZE` (see [`TripMapConfig`]); an
/// unparsable value fails the open.
///
/// # Parameters
///
/// * `name` - A null-terminated C string containing the store name
///
/// # Returns
///
/// Returns a pointer to the [`StoreHandle`] on success, or a null pointer on failure.
/// Release it with [`close_store`].
///
/// # Safety
///
/// This function is unsafe because it:
/// - Dereferences a raw pointer without validation
/// - Returns a raw pointer that must be properly managed
/// - Requires the input string to be valid UTF-8
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use trip_map_core::open_store;
///
/// let name = CString::new("trips").unwrap();
/// let store = open_store(name.as_ptr());
///
/// if !store.is_null() {
///     // Store ready
/// }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn open_store(name: *const c_char) -> *mut StoreHandle {
    if name.is_null() {
        warn!("Null name pointer passed to open_store");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let lmdb_dir = format!("{name_str}.lmdb");
    if Path::new(&lmdb_dir).exists() {
        info!("Reopening trip store at: {}", lmdb_dir);
    } else {
        info!("Creating new trip store at: {}", lmdb_dir);
    }

    let store = TripMapConfig::from_env().and_then(|config| open_handle(name_str, &config));
    match store {
        Ok(store) => Box::into_raw(Box::new(store)),
        Err(e) => {
            warn!("Failed to open trip store: {e}");
            warn!("Attempted path: {}", lmdb_dir);
            std::ptr::null_mut()
        }
    }
}

/// Opens the LMDB store `name` with the settings in `config`.
pub(crate) fn open_handle(name: &str, config: &TripMapConfig) -> Result<StoreHandle, TripError> {
    LmdbBlobStore::with_map_size(name, config.lmdb_map_size).and_then(EntityStore::open)
}

/// Flushes and releases a store opened with [`open_store`].
///
/// # Safety
///
/// `store` must come from [`open_store`] and must not be used afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(store: *mut StoreHandle) -> *const c_char {
    if store.is_null() {
        let error = AppResponse::BadRequest("Null store pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let mut store = unsafe { Box::from_raw(store) };
    match store.backend_mut().close_database() {
        Ok(_) => response_to_c_string(&AppResponse::success("Store closed successfully")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Releases a string returned by any function of this library.
///
/// # Safety
///
/// `ptr` must have been returned by this library and not freed before.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_c_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr) });
}

// Trips

/// Returns all trips in list order as a JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn list_trips(store: *mut StoreHandle) -> *const c_char {
    with_store(store, "list_trips", |store| Ok(AppResponse::json(&store.list_trips())))
}

/// Returns each trip with its marker count and current cover image.
///
/// # Returns
///
/// `Ok` with a JSON array of `{ "trip": {...}, "markerCount": n, "cover": "data:..." | null }`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn trip_summaries(store: *mut StoreHandle) -> *const c_char {
    with_store(store, "trip_summaries", |store| {
        Ok(AppResponse::json(&store.trip_summaries()))
    })
}

/// Creates a trip at the end of the list.
///
/// # Parameters
///
/// * `store` - Pointer to the store
/// * `name_ptr` - Null-terminated trip name; surrounding whitespace is trimmed
///
/// # Returns
///
/// `Ok` with the created trip as JSON, or `ValidationError` if the name is blank.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use trip_map_core::{create_trip, open_store};
///
/// let store = open_store(CString::new("trips").unwrap().as_ptr());
/// let name = CString::new("Weekend in Porto").unwrap();
/// let result = create_trip(store, name.as_ptr());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_trip(store: *mut StoreHandle, name_ptr: *const c_char) -> *const c_char {
    let name = match c_ptr_to_string(name_ptr, "name") {
        Ok(name) => name,
        Err(error_ptr) => return error_ptr,
    };
    with_store(store, "create_trip", |store| {
        let name = require_text("trip name", &name)?;
        Ok(AppResponse::json(&store.create_trip(&name)?))
    })
}

/// Renames a trip. `NotFound` if the id is unknown.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn update_trip(
    store: *mut StoreHandle,
    trip_id: u64,
    name_ptr: *const c_char,
) -> *const c_char {
    let name = match c_ptr_to_string(name_ptr, "name") {
        Ok(name) => name,
        Err(error_ptr) => return error_ptr,
    };
    with_store(store, "update_trip", |store| {
        let name = require_text("trip name", &name)?;
        match store.update_trip(trip_id, &name)? {
            Some(trip) => Ok(AppResponse::json(&trip)),
            None => Err(not_found(EntityKind::Trip, trip_id)),
        }
    })
}

/// Deletes a trip together with its markers and their images.
///
/// # Returns
///
/// `Ok` with a message naming how many markers and images went with it, or
/// `NotFound` if the id is unknown.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_trip(store: *mut StoreHandle, trip_id: u64) -> *const c_char {
    with_store(store, "delete_trip", |store| match store.delete_trip(trip_id)? {
        Some(report) => Ok(AppResponse::success(format!(
            "Trip {trip_id} deleted with {} markers and {} images",
            report.markers, report.images
        ))),
        None => Err(not_found(EntityKind::Trip, trip_id)),
    })
}

/// Points the trip's cached cover at the first image of its first marker.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn recompute_trip_cover(store: *mut StoreHandle, trip_id: u64) -> *const c_char {
    with_store(store, "recompute_trip_cover", |store| {
        Ok(AppResponse::json(&store.recompute_trip_cover(trip_id)?))
    })
}

// Markers

/// Payload accepted by [`create_marker`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewMarker {
    trip_id: u64,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    address: String,
}

/// Returns the markers of a trip in display order.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn list_markers(store: *mut StoreHandle, trip_id: u64) -> *const c_char {
    with_store(store, "list_markers", |store| {
        Ok(AppResponse::json(&store.list_markers(trip_id)))
    })
}

/// Appends a marker to a trip.
///
/// # JSON Format
///
/// ```json
/// { "tripId": 1, "latitude": 39.9042, "longitude": 116.4074,
///   "title": "optional", "address": "optional" }
/// ```
///
/// A blank title or address is replaced by a label built from the coordinate.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_marker(store: *mut StoreHandle, json_ptr: *const c_char) -> *const c_char {
    let json = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(error_ptr) => return error_ptr,
    };
    with_store(store, "create_marker", |store| {
        let input: NewMarker = serde_json::from_str(&json)?;
        let at = LatLng::checked(input.latitude, input.longitude)?;
        let fallback = PlaceLabel::from_coordinates(at);
        let title = if input.title.trim().is_empty() { fallback.title } else { input.title };
        let address = if input.address.trim().is_empty() { fallback.address } else { input.address };
        let marker = store.create_marker(input.trip_id, at.lat, at.lng, &title, &address)?;
        Ok(AppResponse::json(&marker))
    })
}

/// Applies a partial update to a marker.
///
/// Only the keys present in the JSON object change; `null` clears `notes`,
/// `link` and `category`. Unknown keys are rejected.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn update_marker(
    store: *mut StoreHandle,
    marker_id: u64,
    json_ptr: *const c_char,
) -> *const c_char {
    let json = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(error_ptr) => return error_ptr,
    };
    with_store(store, "update_marker", |store| {
        let patch: MarkerPatch = serde_json::from_str(&json)?;
        match store.update_marker(marker_id, patch)? {
            Some(marker) => Ok(AppResponse::json(&marker)),
            None => Err(not_found(EntityKind::Marker, marker_id)),
        }
    })
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_marker(store: *mut StoreHandle, marker_id: u64) -> *const c_char {
    with_store(store, "delete_marker", |store| match store.delete_marker(marker_id)? {
        Some(report) => Ok(AppResponse::success(format!(
            "Marker {marker_id} deleted with {} images",
            report.images
        ))),
        None => Err(not_found(EntityKind::Marker, marker_id)),
    })
}

/// Deletes every marker of a trip but keeps the trip.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_markers(store: *mut StoreHandle, trip_id: u64) -> *const c_char {
    with_store(store, "clear_markers", |store| {
        let report = store.clear_markers(trip_id)?;
        Ok(AppResponse::success(format!(
            "Removed {} markers and {} images",
            report.markers, report.images
        )))
    })
}

/// Moves `dragged_id` into the position of `target_id` within a trip.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn reorder_markers(
    store: *mut StoreHandle,
    trip_id: u64,
    dragged_id: u64,
    target_id: u64,
) -> *const c_char {
    with_store(store, "reorder_markers", |store| {
        if !store.reorder_markers(trip_id, dragged_id, target_id)? {
            return Ok(AppResponse::success("Order unchanged"));
        }
        Ok(AppResponse::json(&store.list_markers(trip_id)))
    })
}

// Images

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn list_images(store: *mut StoreHandle, marker_id: u64) -> *const c_char {
    with_store(store, "list_images", |store| {
        Ok(AppResponse::json(&store.list_images(marker_id)))
    })
}

/// Attaches an image to a marker.
///
/// # Parameters
///
/// * `data_url_ptr` - A base64 `data:` URI, e.g. `data:image/jpeg;base64,...`
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn add_image(
    store: *mut StoreHandle,
    marker_id: u64,
    data_url_ptr: *const c_char,
) -> *const c_char {
    let data_url = match c_ptr_to_string(data_url_ptr, "data URL") {
        Ok(data_url) => data_url,
        Err(error_ptr) => return error_ptr,
    };
    with_store(store, "add_image", |store| {
        Ok(AppResponse::json(&store.add_image(marker_id, &data_url)?))
    })
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_image(store: *mut StoreHandle, image_id: u64) -> *const c_char {
    with_store(store, "delete_image", |store| {
        if store.delete_image(image_id)? {
            Ok(AppResponse::success(format!("Image {image_id} deleted")))
        } else {
            Err(not_found(EntityKind::Image, image_id))
        }
    })
}

// Whole store

/// Removes every trip, marker and image. Identity counters keep counting.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_all_records(store: *mut StoreHandle) -> *const c_char {
    with_store(store, "clear_all_records", |store| {
        let (trips, markers, images) = store.totals();
        store.clear()?;
        Ok(AppResponse::success(format!(
            "Cleared {trips} trips, {markers} markers and {images} images"
        )))
    })
}

/// Moves the store to a fresh, empty LMDB environment named `name_ptr`.
///
/// The previous directory is removed. Unlike [`clear_all_records`] the
/// identity counters start over.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use trip_map_core::{open_store, reset_database};
///
/// let store = open_store(CString::new("trips").unwrap().as_ptr());
/// let new_name = CString::new("trips_fresh").unwrap();
/// let result = reset_database(store, new_name.as_ptr());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn reset_database(store: *mut StoreHandle, name_ptr: *const c_char) -> *const c_char {
    let name = match c_ptr_to_string(name_ptr, "name") {
        Ok(name) => name,
        Err(error_ptr) => return error_ptr,
    };
    with_store(store, "reset_database", |store| {
        store.backend_mut().reset_database(&name)?;
        store.reload()?;
        Ok(AppResponse::success(format!("Database '{name}' was reset successfully")))
    })
}

/// Adds the demo trip and returns it.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn seed_demo(store: *mut StoreHandle) -> *const c_char {
    with_store(store, "seed_demo", |store| {
        Ok(AppResponse::json(&demo::seed_demo_trip(store)?))
    })
}

fn not_found(kind: EntityKind, id: u64) -> TripError {
    TripError::NotFound { kind, id }
}

/// Runs `op` against the store behind `store` and encodes its outcome.
fn with_store<F>(store: *mut StoreHandle, fn_name: &str, op: F) -> *const c_char
where
    F: FnOnce(&mut StoreHandle) -> Result<AppResponse, TripError>,
{
    let store = match unsafe { store.as_mut() } {
        Some(s) => s,
        None => {
            warn!("Null store pointer passed to {fn_name}");
            let error = AppResponse::BadRequest(format!("Null store pointer passed to {fn_name}"));
            return response_to_c_string(&error);
        }
    };

    let response = op(store).unwrap_or_else(AppResponse::from);
    response_to_c_string(&response)
}

/// Converts an [`AppResponse`] to a C-compatible string.
///
/// Returns a null pointer if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String.
///
/// # Returns
///
/// * `Ok(String)` - If conversion was successful
/// * `Err(*const c_char)` - Pointer to a `BadRequest` response if the pointer
///   was null or the text was not UTF-8
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
