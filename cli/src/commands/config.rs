//! The `config` built-in: inspect and administer settings.
//!
//! `get` and `dump` read the merged runtime settings. `set` is the
//! administrative write path: it edits the per-user config file on disk
//! (runtime settings are immutable once loaded), so the change shows up
//! on the next invocation like any other config source.

use std::fs::File;
use std::io;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Map;

use steward_kit::{
    Extension, ExtensionPoint, ExtensionRegistry, Node, Outcome, Parameter, RegistryError, Store,
    UserPaths, flatten,
};

use crate::commands::yaml_to_json;

pub fn register(registry: &mut ExtensionRegistry, paths: &UserPaths) -> Result<(), RegistryError> {
    let paths = paths.clone();
    registry.register_extension_class(
        ExtensionPoint::Command,
        "config",
        Box::new(move |services| {
            Ok(Extension::Applet(build_node(
                Arc::clone(&services.settings),
                paths.clone(),
            )?))
        }),
    )
}

fn build_node(settings: Arc<Store>, paths: UserPaths) -> anyhow::Result<Node> {
    let get_settings = Arc::clone(&settings);
    let get = Node::new("Show one setting")
        .parameter(Parameter::new("key")?.required().help("Dotted settings key"))?
        .handler(move |params| {
            let key = params
                .get("key")
                .and_then(|value| value.as_str())
                .unwrap_or_default();
            let value = get_settings.get(key)?;
            Ok(Outcome::Scalar(yaml_to_json(value)))
        });

    let set = Node::new("Persist one setting to the user config file")
        .parameter(Parameter::new("key")?.required().help("Dotted settings key"))?
        .parameter(Parameter::new("value")?.required().help("New value, parsed as YAML"))?
        .handler(move |params| {
            let key = params
                .get("key")
                .and_then(|value| value.as_str())
                .unwrap_or_default();
            let text = params
                .get("value")
                .and_then(|value| value.as_str())
                .unwrap_or_default();
            set_persistent(&paths, key, text)?;
            Ok(Outcome::None)
        });

    let dump = Node::new("Show every setting, flattened").handler(move |_| {
        let mut mapping = Map::new();
        for (key, value) in flatten(settings.root())? {
            mapping.insert(key, yaml_to_json(&value));
        }
        Ok(Outcome::Mapping(mapping))
    });

    Ok(Node::new("Settings administration")
        .child("get", get)?
        .child("set", set)?
        .child("dump", dump)?)
}

/// Loads the user config file (or starts empty), sets the key and writes
/// the file back. Scalars keep their YAML types: `true`, `5`, `text`.
fn set_persistent(paths: &UserPaths, key: &str, text: &str) -> anyhow::Result<()> {
    let path = paths.default_config_file()?;
    let mut store = Store::new();
    match File::open(&path) {
        Ok(file) => {
            store
                .load(file)
                .with_context(|| format!("config file {} is malformed", path.display()))?;
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error).context("reading config file"),
    }

    let value = serde_yaml::from_str(text).unwrap_or(serde_yaml::Value::String(text.to_owned()));
    store.set(key, value)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;
    store.dump(file)?;
    Ok(())
}
