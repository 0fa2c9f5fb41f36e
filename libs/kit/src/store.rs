//! Nested key-value store with dotted-path access.
//!
//! Settings and persisted state are both YAML documents holding a tree of
//! mappings. A `Store` wraps one such tree and exposes it through dotted
//! keys (`plugin.sync.exclude`), creating intermediate mappings on write
//! and merging whole documents on load.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("malformed document: {0}")]
    Parse(String),
}

impl From<serde_yaml::Error> for StoreError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

/// A nested mapping addressed by `.`-separated keys.
///
/// Keys are case-sensitive and segments must be non-empty. Sequences are
/// treated as leaf values everywhere: `flatten`/`unflatten` do not recurse
/// into them, so a list of mappings does not round-trip (its items keep
/// their nested form inside the single leaf).
#[derive(Debug, Clone, Default)]
pub struct Store {
    root: Mapping,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// The whole tree (the equivalent of getting the root key).
    pub fn root(&self) -> &Mapping {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Resolves a dotted key against the tree.
    pub fn get(&self, key: &str) -> Result<&Value, StoreError> {
        let segments = split_key(key)?;
        let mut current = &self.root;
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            let entry = current
                .get(ykey(segment))
                .ok_or_else(|| StoreError::KeyNotFound(key.to_owned()))?;
            if i == last {
                return Ok(entry);
            }
            current = match entry {
                Value::Mapping(mapping) => mapping,
                _ => return Err(StoreError::KeyNotFound(key.to_owned())),
            };
        }
        Err(StoreError::KeyNotFound(key.to_owned()))
    }

    /// Like [`Store::get`] but with a caller-supplied fallback.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).ok().and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).ok().and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).ok().and_then(Value::as_i64)
    }

    /// Sets a dotted key, creating intermediate mappings as needed.
    ///
    /// Overwrites any existing leaf or subtree along the way: setting
    /// `a.b.c` when `a.b` holds a scalar replaces the scalar with a mapping.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        let segments = split_key(key)?;
        let mut current = &mut self.root;
        let last = segments.len() - 1;
        for segment in &segments[..last] {
            let entry_key = ykey(segment);
            let present_mapping = matches!(current.get(&entry_key), Some(Value::Mapping(_)));
            if !present_mapping {
                current.insert(entry_key.clone(), Value::Mapping(Mapping::new()));
            }
            current = match current.get_mut(&entry_key) {
                Some(Value::Mapping(mapping)) => mapping,
                _ => return Err(StoreError::InvalidKey(key.to_owned())),
            };
        }
        current.insert(ykey(segments[last]), value);
        Ok(())
    }

    /// Serializes the full tree as YAML.
    pub fn dump<W: Write>(&self, writer: W) -> Result<(), StoreError> {
        serde_yaml::to_writer(writer, &Value::Mapping(self.root.clone()))?;
        Ok(())
    }

    /// Parses a YAML document, flattens it and merges every entry via
    /// [`Store::set`]. Later loads override earlier ones key by key.
    ///
    /// An empty document merges nothing. A non-mapping document or one with
    /// non-string mapping keys fails with [`StoreError::Parse`].
    pub fn load<R: Read>(&mut self, reader: R) -> Result<(), StoreError> {
        let document: Value = serde_yaml::from_reader(reader)?;
        let mapping = match document {
            Value::Null => return Ok(()),
            Value::Mapping(mapping) => mapping,
            other => {
                return Err(StoreError::Parse(format!(
                    "expected a mapping at the document root, got {}",
                    value_kind(&other)
                )));
            }
        };
        for (key, value) in flatten(&mapping)? {
            self.set(&key, value)?;
        }
        Ok(())
    }
}

/// Walks a nested mapping and emits one `(dotted key, leaf)` pair per leaf.
///
/// Sequences are leaves. Non-string mapping keys fail with
/// [`StoreError::Parse`].
pub fn flatten(mapping: &Mapping) -> Result<BTreeMap<String, Value>, StoreError> {
    let mut entries = BTreeMap::new();
    flatten_into(mapping, None, &mut entries)?;
    Ok(entries)
}

/// Rebuilds a nested mapping from dotted-key entries.
pub fn unflatten(entries: &BTreeMap<String, Value>) -> Result<Mapping, StoreError> {
    let mut store = Store::new();
    for (key, value) in entries {
        store.set(key, value.clone())?;
    }
    Ok(store.root)
}

fn flatten_into(
    mapping: &Mapping,
    prefix: Option<&str>,
    entries: &mut BTreeMap<String, Value>,
) -> Result<(), StoreError> {
    for (key, value) in mapping {
        let segment = key.as_str().ok_or_else(|| {
            StoreError::Parse(format!("mapping keys must be strings, got {}", value_kind(key)))
        })?;
        let dotted = match prefix {
            Some(prefix) => format!("{prefix}.{segment}"),
            None => segment.to_owned(),
        };
        match value {
            Value::Mapping(nested) => flatten_into(nested, Some(&dotted), entries)?,
            other => {
                entries.insert(dotted, other.clone());
            }
        }
    }
    Ok(())
}

fn split_key(key: &str) -> Result<Vec<&str>, StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey(key.to_owned()));
    }
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(StoreError::InvalidKey(key.to_owned()));
    }
    Ok(segments)
}

fn ykey(segment: &str) -> Value {
    Value::String(segment.to_owned())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
