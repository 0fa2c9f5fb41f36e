//! Disk cache with TTL-based miss detection.
//!
//! Extensions that talk to slow third-party APIs park responses here. One
//! JSON envelope file per key under the per-user cache directory; the
//! envelope carries its own write timestamp so a read with a TTL can
//! report a miss without touching filesystem metadata.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

static KEY_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9._-]+$").ok());

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache miss: {0}")]
    Miss(String),
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),
    #[error("cache io: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    stored_at: i64,
    value: Value,
}

#[derive(Debug)]
pub struct DiskCache {
    basedir: PathBuf,
}

impl DiskCache {
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
        }
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// Reads a key, failing with [`CacheError::Miss`] when the entry is
    /// absent, corrupt or older than `ttl`.
    pub fn get(&self, key: &str, ttl: Duration) -> Result<Value, CacheError> {
        let path = self.entry_path(key)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::Miss(key.to_owned()));
            }
            Err(error) => return Err(CacheError::Io(error)),
        };
        let envelope: Envelope = match serde_json::from_reader(file) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(key, %error, "cache entry corrupt, treating as miss");
                return Err(CacheError::Miss(key.to_owned()));
            }
        };
        let age = chrono::Utc::now().timestamp() - envelope.stored_at;
        if age < 0 || age as u64 > ttl.as_secs() {
            return Err(CacheError::Miss(key.to_owned()));
        }
        Ok(envelope.value)
    }

    pub fn set(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        std::fs::create_dir_all(&self.basedir)?;
        let envelope = Envelope {
            stored_at: chrono::Utc::now().timestamp(),
            value: value.clone(),
        };
        let file = File::create(path)?;
        serde_json::to_writer(file, &envelope).map_err(io::Error::other)?;
        Ok(())
    }

    pub fn purge(&self, key: &str) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(CacheError::Io(error)),
        }
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        match std::fs::remove_dir_all(&self.basedir) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(CacheError::Io(error)),
        }
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = KEY_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(key));
        if !valid {
            return Err(CacheError::InvalidKey(key.to_owned()));
        }
        Ok(self.basedir.join(format!("{key}.json")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const HOUR: Duration = Duration::from_secs(3600);

    fn cache() -> (tempfile::TempDir, DiskCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache"));
        (dir, cache)
    }

    #[test]
    fn set_then_get_within_ttl_hits() {
        let (_dir, cache) = cache();
        cache.set("forecast", &json!({"temp": 21})).unwrap();
        assert_eq!(cache.get("forecast", HOUR).unwrap(), json!({"temp": 21}));
    }

    #[test]
    fn absent_key_misses() {
        let (_dir, cache) = cache();
        assert!(matches!(cache.get("nothing", HOUR), Err(CacheError::Miss(_))));
    }

    #[test]
    fn entry_older_than_ttl_misses() {
        let (_dir, cache) = cache();
        std::fs::create_dir_all(cache.basedir()).unwrap();
        let stale = Envelope {
            stored_at: chrono::Utc::now().timestamp() - 7200,
            value: json!("old"),
        };
        let file = File::create(cache.basedir().join("stale.json")).unwrap();
        serde_json::to_writer(file, &stale).unwrap();

        assert!(matches!(cache.get("stale", HOUR), Err(CacheError::Miss(_))));
    }

    #[test]
    fn corrupt_entry_degrades_to_miss() {
        let (_dir, cache) = cache();
        std::fs::create_dir_all(cache.basedir()).unwrap();
        std::fs::write(cache.basedir().join("bad.json"), "{not json").unwrap();
        assert!(matches!(cache.get("bad", HOUR), Err(CacheError::Miss(_))));
    }

    #[test]
    fn keys_outside_the_charset_are_rejected() {
        let (_dir, cache) = cache();
        assert!(matches!(
            cache.get("../escape", HOUR),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            cache.set("has space", &json!(1)),
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[test]
    fn purge_removes_only_the_named_entry() {
        let (_dir, cache) = cache();
        cache.set("keep", &json!(1)).unwrap();
        cache.set("drop", &json!(2)).unwrap();
        cache.purge("drop").unwrap();
        assert!(cache.get("keep", HOUR).is_ok());
        assert!(matches!(cache.get("drop", HOUR), Err(CacheError::Miss(_))));
    }

    #[test]
    fn clear_empties_the_cache_and_is_idempotent() {
        let (_dir, cache) = cache();
        cache.set("one", &json!(1)).unwrap();
        cache.clear().unwrap();
        assert!(matches!(cache.get("one", HOUR), Err(CacheError::Miss(_))));
        cache.clear().unwrap();
    }
}
