//! Configuration loading and log-level resolution.
//!
//! Settings come from YAML files merged in order: the per-user config
//! file first, then any extra files the command line appended. Later
//! files override earlier ones key by key. Config loading always
//! degrades: a missing file logs a warning and is skipped, a malformed
//! one likewise, so a broken override never takes the whole tool down.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing::warn;

use crate::store::Store;

pub const LOG_LEVEL_KEY: &str = "log-level";

const LEVEL_LADDER: [LevelFilter; 6] = [
    LevelFilter::OFF,
    LevelFilter::ERROR,
    LevelFilter::WARN,
    LevelFilter::INFO,
    LevelFilter::DEBUG,
    LevelFilter::TRACE,
];

/// Merges every readable config file into one store.
pub fn load_settings(paths: &[PathBuf]) -> Store {
    let mut store = Store::new();
    for path in paths {
        load_one(&mut store, path);
    }
    store
}

fn load_one(store: &mut Store, path: &Path) {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "config file not found");
            return;
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "config file unreadable, skipping");
            return;
        }
    };
    // Merge through a scratch store so a document that fails half-way
    // cannot leave partial keys behind.
    let mut scratch = store.clone();
    match scratch.load(file) {
        Ok(()) => *store = scratch,
        Err(error) => {
            warn!(path = %path.display(), %error, "config file malformed, skipping");
        }
    }
}

/// Effective log level: the `log-level` setting (default WARN), stepped
/// up once per `--verbose` and down once per `--quiet`.
pub fn resolve_log_level(store: &Store, verbose: u8, quiet: u8) -> LevelFilter {
    let base = match store.get_str(LOG_LEVEL_KEY) {
        Some(text) => match parse_level(text) {
            Some(level) => level,
            None => {
                warn!(value = text, "invalid log-level setting, using WARN");
                LevelFilter::WARN
            }
        },
        None => LevelFilter::WARN,
    };
    step_level(base, i16::from(verbose) - i16::from(quiet))
}

fn parse_level(text: &str) -> Option<LevelFilter> {
    let normalized = text.trim();
    if normalized.eq_ignore_ascii_case("warning") {
        return Some(LevelFilter::WARN);
    }
    LevelFilter::from_str(normalized).ok()
}

fn step_level(base: LevelFilter, delta: i16) -> LevelFilter {
    let position = LEVEL_LADDER
        .iter()
        .position(|level| *level == base)
        .unwrap_or(2) as i16;
    let clamped = (position + delta).clamp(0, LEVEL_LADDER.len() as i16 - 1);
    LEVEL_LADDER[clamped as usize]
}
