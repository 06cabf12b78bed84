use std::env;
use std::time::Duration;

use crate::blob_store::{LmdbBlobStore, DEFAULT_MAP_SIZE};
use crate::error::TripError;
use crate::projector::{Projector, ViewportSize, DEFAULT_ORIGIN};
use crate::search::{SearchTiming, SERVICE_RETRY_BACKOFF, SUGGESTION_DEBOUNCE};

#[derive(Debug, Clone, PartialEq)]
pub struct TripMapConfig {
    /// Store name; the LMDB directory is `<db_path>.lmdb`.
    pub db_path: String,
    pub viewport: ViewportSize,
    pub search: SearchTiming,
    pub lmdb_map_size: usize,
}

impl Default for TripMapConfig {
    fn default() -> Self {
        Self {
            db_path: "trip_map".to_string(),
            viewport: ViewportSize::new(800.0, 600.0),
            search: SearchTiming {
                debounce: SUGGESTION_DEBOUNCE,
                retry_backoff: SERVICE_RETRY_BACKOFF,
            },
            lmdb_map_size: DEFAULT_MAP_SIZE,
        }
    }
}

impl TripMapConfig {
    pub fn from_env() -> Result<Self, TripError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`TripMapConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TripError> {
        let defaults = Self::default();

        let db_path = lookup("TRIPMAP_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(defaults.db_path);

        let viewport = match lookup("TRIPMAP_VIEWPORT") {
            Some(raw) => parse_viewport(&raw)?,
            None => defaults.viewport,
        };

        let debounce = match lookup("TRIPMAP_SEARCH_DEBOUNCE_MS") {
            Some(raw) => Duration::from_millis(parse_number("TRIPMAP_SEARCH_DEBOUNCE_MS", &raw)?),
            None => defaults.search.debounce,
        };
        let retry_backoff = match lookup("TRIPMAP_SEARCH_RETRY_MS") {
            Some(raw) => Duration::from_millis(parse_number("TRIPMAP_SEARCH_RETRY_MS", &raw)?),
            None => defaults.search.retry_backoff,
        };

        let lmdb_map_size = match lookup("TRIPMAP_LMDB_MAP_SIZE") {
            Some(raw) => parse_number("TRIPMAP_LMDB_MAP_SIZE", &raw)? as usize,
            None => defaults.lmdb_map_size,
        };
        if lmdb_map_size == 0 {
            return Err(TripError::Config("TRIPMAP_LMDB_MAP_SIZE must be positive".to_string()));
        }

        Ok(Self {
            db_path,
            viewport,
            search: SearchTiming {
                debounce,
                retry_backoff,
            },
            lmdb_map_size,
        })
    }

    pub fn projector(&self) -> Projector {
        Projector::new(DEFAULT_ORIGIN, self.viewport)
    }

    pub fn open_blob_store(&self) -> Result<LmdbBlobStore, TripError> {
        LmdbBlobStore::with_map_size(&self.db_path, self.lmdb_map_size)
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64, TripError> {
    raw.trim()
        .parse()
        .map_err(|err| TripError::Config(format!("invalid {key}: {err}")))
}

fn parse_viewport(raw: &str) -> Result<ViewportSize, TripError> {
    let invalid = || TripError::Config(format!("invalid TRIPMAP_VIEWPORT '{raw}', expected WIDTHxHEIGHT"));
    let (w, h) = raw.trim().split_once(|c: char| c == 'x' || c == 'X').ok_or_else(invalid)?;
    let width: f64 = w.trim().parse().map_err(|_| invalid())?;
    let height: f64 = h.trim().parse().map_err(|_| invalid())?;
    if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
        return Err(invalid());
    }
    Ok(ViewportSize::new(width, height))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = TripMapConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, TripMapConfig::default());
        assert_eq!(config.search.debounce, Duration::from_millis(300));
        assert_eq!(config.search.retry_backoff, Duration::from_millis(500));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = TripMapConfig::from_lookup(lookup(&[
            ("TRIPMAP_DB_PATH", "/tmp/trips"),
            ("TRIPMAP_VIEWPORT", "1024x768"),
            ("TRIPMAP_SEARCH_DEBOUNCE_MS", "150"),
            ("TRIPMAP_LMDB_MAP_SIZE", "1048576"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, "/tmp/trips");
        assert_eq!(config.viewport, ViewportSize::new(1024.0, 768.0));
        assert_eq!(config.search.debounce, Duration::from_millis(150));
        assert_eq!(config.search.retry_backoff, SERVICE_RETRY_BACKOFF);
        assert_eq!(config.lmdb_map_size, 1_048_576);
        assert_eq!(config.projector().viewport.center().x, 512.0);
    }

    #[test]
    fn bad_values_are_config_errors() {
        for vars in [
            [("TRIPMAP_VIEWPORT", "wide")],
            [("TRIPMAP_VIEWPORT", "0x600")],
            [("TRIPMAP_SEARCH_RETRY_MS", "soon")],
            [("TRIPMAP_LMDB_MAP_SIZE", "0")],
        ] {
            let err = TripMapConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, TripError::Config(_)), "{vars:?} -> {err:?}");
        }
    }
}
