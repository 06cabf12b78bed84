//! Demo trip for first launch and screenshots.

use log::info;

use crate::blob_store::BlobStore;
use crate::error::TripError;
use crate::model::{MarkerPatch, Trip};
use crate::store::EntityStore;

pub const DEMO_TRIP_NAME: &str = "Beijing demo";

struct DemoStop {
    lat: f64,
    lng: f64,
    title: &'static str,
    address: &'static str,
    notes: &'static str,
    color: Option<&'static str>,
}

const DEMO_STOPS: [DemoStop; 5] = [
    DemoStop {
        lat: 39.9042,
        lng: 116.4074,
        title: "Tiananmen Square",
        address: "Dongcheng District, Beijing",
        notes: "Flag-raising at sunrise; bring ID for the security check.",
        color: None,
    },
    DemoStop {
        lat: 39.9163,
        lng: 116.3972,
        title: "Forbidden City",
        address: "4 Jingshan Front St, Dongcheng District, Beijing",
        notes: "Book tickets online in advance. Closed on Mondays.",
        color: None,
    },
    DemoStop {
        lat: 39.9080,
        lng: 116.3975,
        title: "Beihai Park",
        address: "1 Wenjin St, Xicheng District, Beijing",
        notes: "Rent a rowing boat on the lake; White Dagoba on Jade Islet.",
        color: Some("#2196F3"),
    },
    DemoStop {
        lat: 39.9250,
        lng: 116.4070,
        title: "Nanluoguxiang",
        address: "Nanluoguxiang, Dongcheng District, Beijing",
        notes: "Hutong snacks and small shops. Busy after 6pm.",
        color: Some("#FF9800"),
    },
    DemoStop {
        lat: 39.8950,
        lng: 116.4180,
        title: "Temple of Heaven",
        address: "1 Tiantan E Rd, Dongcheng District, Beijing",
        notes: "Morning tai chi in the park; Hall of Prayer for Good Harvests.",
        color: Some("#9C27B0"),
    },
];

/// Creates the demo trip with its five markers and returns it.
pub fn seed_demo_trip<B: BlobStore>(store: &mut EntityStore<B>) -> Result<Trip, TripError> {
    let trip = store.create_trip(DEMO_TRIP_NAME)?;
    for stop in &DEMO_STOPS {
        let marker = store.create_marker(trip.id, stop.lat, stop.lng, stop.title, stop.address)?;
        let patch = MarkerPatch {
            notes: Some(Some(stop.notes.to_string())),
            color: stop.color.map(str::to_string),
            ..Default::default()
        };
        store.update_marker(marker.id, patch)?;
    }
    info!("Seeded demo trip {} with {} markers", trip.id, DEMO_STOPS.len());
    Ok(trip)
}
