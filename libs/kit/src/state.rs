//! On-disk persistence for a [`Store`].
//!
//! State lives in a single YAML file under the per-user data directory.
//! Reads degrade: a missing file is an empty store and a corrupt file is
//! logged and treated as empty, so a damaged state file never crashes a
//! scheduled run. Writes go through a temp file in the same directory and
//! an atomic rename. There is no file locking: concurrent writers race
//! with last-writer-wins at the file level, which is accepted for a
//! single-user, single-host deployment.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::warn;

use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state io: {0}")]
    Io(#[from] io::Error),
    #[error("state serialization: {0}")]
    Dump(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the state file into a fresh [`Store`].
    ///
    /// Missing file → empty store. Unreadable or malformed file → warning
    /// plus empty store.
    pub fn load(&self) -> Store {
        let mut store = Store::new();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return store,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "state file unreadable, starting empty");
                return store;
            }
        };
        if let Err(error) = store.load(file) {
            warn!(path = %self.path.display(), %error, "state file malformed, starting empty");
            return Store::new();
        }
        store
    }

    /// Persists the whole store, creating the parent directory on first use.
    pub fn save(&self, store: &Store) -> Result<(), StateError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        store.dump(&mut tmp)?;
        tmp.persist(&self.path).map_err(|error| error.error)?;
        Ok(())
    }
}
