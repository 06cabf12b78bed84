//! Persistence substrate for the entity store.
//!
//! The store only needs a synchronous key-value blob store that can replace
//! every key in one atomic write. [`LmdbBlobStore`] provides that on disk by
//! running each [`BlobStore::write_all`] in a single LMDB write transaction;
//! [`MemoryBlobStore`] is the ephemeral variant used by tests and by hosts
//! that do not want anything written.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{info, warn};

use crate::error::TripError;

/// Name of the LMDB sub-database holding the store records.
const DB_NAME: &str = "trip_map";

/// Default LMDB map size. Images are stored inline so this is generous.
pub const DEFAULT_MAP_SIZE: usize = 256 * 1024 * 1024;

pub trait BlobStore {
    /// Reads one blob. Missing keys are `Ok(None)`.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, TripError>;

    /// Writes every entry as one unit. Either all entries land or none do.
    fn write_all(&mut self, entries: &[(&str, Vec<u8>)]) -> Result<(), TripError>;

    /// Removes every blob and returns how many were removed.
    fn clear(&mut self) -> Result<usize, TripError>;
}

/// LMDB-backed blob store living in `<name>.lmdb`.
pub struct LmdbBlobStore {
    env: Environment,
    db: Database,
    path: PathBuf,
    map_size: usize,
}

impl LmdbBlobStore {
    /// Opens (or creates) the environment for `name` with the default map size.
    pub fn init(name: &str) -> Result<Self, TripError> {
        Self::with_map_size(name, DEFAULT_MAP_SIZE)
    }

    pub fn with_map_size(name: &str, map_size: usize) -> Result<Self, TripError> {
        let path = PathBuf::from(format!("{name}.lmdb"));
        let (env, db) = open_environment(&path, map_size)?;
        info!("Opened blob store at {}", path.display());
        Ok(Self {
            env,
            db,
            path,
            map_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Swaps to a fresh, empty environment named `name` and removes the old directory.
    pub fn reset_database(&mut self, name: &str) -> Result<bool, TripError> {
        let new_path = PathBuf::from(format!("{name}.lmdb"));
        if new_path != self.path && new_path.exists() {
            fs::remove_dir_all(&new_path)?;
        }
        if new_path == self.path {
            self.clear()?;
            return Ok(true);
        }

        let (env, db) = open_environment(&new_path, self.map_size)?;
        let old_path = std::mem::replace(&mut self.path, new_path);
        self.env = env;
        self.db = db;

        if let Err(e) = fs::remove_dir_all(&old_path) {
            warn!("Could not remove old blob store {}: {e}", old_path.display());
        }
        info!("Blob store reset to {}", self.path.display());
        Ok(true)
    }

    /// Flushes pending writes to disk. The environment itself closes on drop.
    pub fn close_database(&mut self) -> Result<(), TripError> {
        self.env.sync(true)?;
        info!("Blob store {} flushed for close", self.path.display());
        Ok(())
    }
}

fn open_environment(path: &Path, map_size: usize) -> Result<(Environment, Database), TripError> {
    fs::create_dir_all(path)?;
    let env = Environment::new()
        .set_max_dbs(1)
        .set_map_size(map_size)
        .open(path)?;
    let db = env.create_db(Some(DB_NAME), DatabaseFlags::empty())?;
    Ok((env, db))
}

impl BlobStore for LmdbBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, TripError> {
        let txn = self.env.begin_ro_txn()?;
        let value = match txn.get(self.db, &key) {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.commit()?;
        Ok(value)
    }

    fn write_all(&mut self, entries: &[(&str, Vec<u8>)]) -> Result<(), TripError> {
        let mut txn = self.env.begin_rw_txn()?;
        for (key, value) in entries {
            txn.put(self.db, key, value, WriteFlags::empty())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn clear(&mut self) -> Result<usize, TripError> {
        let mut txn = self.env.begin_rw_txn()?;
        let count = {
            let mut cursor = txn.open_ro_cursor(self.db)?;
            cursor.iter().count()
        };
        txn.clear_db(self.db)?;
        txn.commit()?;
        Ok(count)
    }
}

/// Blob store kept entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Vec<u8>>,
    writes: usize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed `write_all` calls.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, TripError> {
        Ok(self.blobs.get(key).cloned())
    }

    fn write_all(&mut self, entries: &[(&str, Vec<u8>)]) -> Result<(), TripError> {
        for (key, value) in entries {
            self.blobs.insert((*key).to_string(), value.clone());
        }
        self.writes += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<usize, TripError> {
        let count = self.blobs.len();
        self.blobs.clear();
        Ok(count)
    }
}
