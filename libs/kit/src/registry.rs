//! Extension registry: (point, name) → factory.
//!
//! Capability categories are declared once at startup; named factories
//! hang off them and are resolved on demand with the shared services
//! injected. There is no runtime discovery: the application registers a
//! static list of compiled-in extensions and any registration mistake is
//! a packaging bug, fatal at boot rather than recoverable at use.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::extension::Extension;
use crate::services::Services;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtensionPoint {
    Command,
    Task,
    Callable,
    ApiEndpoint,
    AppBridge,
}

impl ExtensionPoint {
    pub const ALL: [Self; 5] = [
        Self::Command,
        Self::Task,
        Self::Callable,
        Self::ApiEndpoint,
        Self::AppBridge,
    ];
}

impl fmt::Display for ExtensionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Command => "Command",
            Self::Task => "Task",
            Self::Callable => "Callable",
            Self::ApiEndpoint => "APIEndpoint",
            Self::AppBridge => "AppBridge",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("extension point {0} declared twice")]
    DuplicateExtensionPoint(ExtensionPoint),
    #[error("extension point {0} was never declared")]
    UnknownExtensionPoint(ExtensionPoint),
    #[error("extension {point}::{name} registered twice")]
    DuplicateExtensionName { point: ExtensionPoint, name: String },
    #[error("no extension {point}::{name}")]
    ExtensionNotFound { point: ExtensionPoint, name: String },
    #[error("failed to construct extension {point}::{name}: {source:#}")]
    Construction {
        point: ExtensionPoint,
        name: String,
        source: anyhow::Error,
    },
}

pub type Factory = Box<dyn Fn(&Services) -> anyhow::Result<Extension> + Send + Sync>;

#[derive(Default)]
pub struct ExtensionRegistry {
    points: BTreeMap<ExtensionPoint, BTreeMap<String, Factory>>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (point, classes) in &self.points {
            map.entry(&point.to_string(), &classes.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a capability category.
    pub fn register_extension_point(&mut self, point: ExtensionPoint) -> Result<(), RegistryError> {
        if self.points.contains_key(&point) {
            return Err(RegistryError::DuplicateExtensionPoint(point));
        }
        self.points.insert(point, BTreeMap::new());
        Ok(())
    }

    /// Associates a named factory with a declared point.
    pub fn register_extension_class(
        &mut self,
        point: ExtensionPoint,
        name: &str,
        factory: Factory,
    ) -> Result<(), RegistryError> {
        let classes = self
            .points
            .get_mut(&point)
            .ok_or(RegistryError::UnknownExtensionPoint(point))?;
        if classes.contains_key(name) {
            return Err(RegistryError::DuplicateExtensionName {
                point,
                name: name.to_owned(),
            });
        }
        classes.insert(name.to_owned(), factory);
        Ok(())
    }

    /// Instantiates `(point, name)`, injecting services scoped to it.
    pub fn get_extension(
        &self,
        point: ExtensionPoint,
        name: &str,
        services: &Services,
    ) -> Result<Extension, RegistryError> {
        debug!(point = %point, name, "resolving extension");
        let factory = self
            .points
            .get(&point)
            .and_then(|classes| classes.get(name))
            .ok_or_else(|| RegistryError::ExtensionNotFound {
                point,
                name: name.to_owned(),
            })?;
        let scoped = services.for_extension(point, name);
        factory(&scoped).map_err(|source| RegistryError::Construction {
            point,
            name: name.to_owned(),
            source,
        })
    }

    /// Instantiates every class under a point, in name order.
    ///
    /// A factory failure skips that extension with a warning instead of
    /// poisoning the whole point; mounting the rest still works.
    pub fn get_extensions_for(
        &self,
        point: ExtensionPoint,
        services: &Services,
    ) -> Vec<(String, Extension)> {
        let mut extensions = Vec::new();
        for name in self.names_for(point) {
            match self.get_extension(point, &name, services) {
                Ok(extension) => extensions.push((name, extension)),
                Err(error) => {
                    warn!(point = %point, name, %error, "skipping extension");
                }
            }
        }
        extensions
    }

    /// Registered names under a point, without instantiation.
    pub fn names_for(&self, point: ExtensionPoint) -> Vec<String> {
        self.points
            .get(&point)
            .map(|classes| classes.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_extension(&self, point: ExtensionPoint, name: &str) -> bool {
        self.points
            .get(&point)
            .is_some_and(|classes| classes.contains_key(name))
    }
}
