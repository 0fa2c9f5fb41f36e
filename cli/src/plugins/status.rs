//! Status applet, registered as both a command and an API endpoint.
//!
//! The same tree answers `steward status` on the CLI and `GET /status/`
//! over HTTP, which is the whole point of the shared dispatch model.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use steward_kit::{
    Extension, ExtensionPoint, ExtensionRegistry, Node, Outcome, Parameter, RegistryError,
    Services, Store, flatten,
};

use crate::commands::yaml_to_json;

pub fn register(registry: &mut ExtensionRegistry) -> Result<(), RegistryError> {
    registry.register_extension_class(ExtensionPoint::Command, "status", Box::new(build))?;
    registry.register_extension_class(ExtensionPoint::ApiEndpoint, "status", Box::new(build))?;
    Ok(())
}

fn build(services: &Services) -> anyhow::Result<Extension> {
    let root_settings = Arc::clone(&services.settings);
    let child_settings = Arc::clone(&services.settings);

    let settings_child = Node::new("Flattened settings, optionally filtered by prefix")
        .parameter(
            Parameter::new("prefix")?
                .default_value("")
                .help("Only keys starting with this prefix"),
        )?
        .handler(move |params| {
            let prefix = params
                .get("prefix")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let mut mapping = Map::new();
            for (key, value) in flatten(child_settings.root())? {
                if key.starts_with(prefix) {
                    mapping.insert(key, yaml_to_json(&value));
                }
            }
            Ok(Outcome::Mapping(mapping))
        });

    let root = Node::new("Service status")
        .handler(move |_| {
            let mut mapping = Map::new();
            mapping.insert("program".to_owned(), json!(crate::app::PROGRAM));
            mapping.insert("version".to_owned(), json!(env!("CARGO_PKG_VERSION")));
            mapping.insert(
                "enabled-plugins".to_owned(),
                json!(enabled_plugins(&root_settings)),
            );
            Ok(Outcome::Mapping(mapping))
        })
        .child("settings", settings_child)?;

    Ok(Extension::Applet(root))
}

fn enabled_plugins(settings: &Store) -> Vec<String> {
    let Ok(serde_yaml::Value::Mapping(plugins)) = settings.get("plugin") else {
        return Vec::new();
    };
    plugins
        .iter()
        .filter_map(|(name, _)| name.as_str())
        .filter(|name| {
            settings
                .get_bool(&format!("plugin.{name}.enabled"))
                .unwrap_or(false)
        })
        .map(str::to_owned)
        .collect()
}
