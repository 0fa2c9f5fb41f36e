//! Shared services injected into every extension.
//!
//! Extensions never reach for globals: the registry hands each factory one
//! `Services` value carrying the settings store, a logger scoped to the
//! extension and the disk cache, whether or not the extension uses all
//! three.

use std::sync::Arc;

use crate::cache::DiskCache;
use crate::registry::ExtensionPoint;
use crate::store::Store;

/// A logger bound to a scope such as `Command::music`.
///
/// Events go through `tracing` with the scope attached as a structured
/// field, so one subscriber configuration covers the core and every
/// extension alike.
#[derive(Debug, Clone)]
pub struct ScopedLogger {
    scope: Arc<str>,
}

impl ScopedLogger {
    pub fn new(scope: &str) -> Self {
        Self { scope: scope.into() }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Derives a sub-scope, `parent::name`.
    pub fn child(&self, name: &str) -> Self {
        Self::new(&format!("{}::{name}", self.scope))
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(scope = %self.scope, "{message}");
    }

    pub fn info(&self, message: &str) {
        tracing::info!(scope = %self.scope, "{message}");
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(scope = %self.scope, "{message}");
    }

    pub fn error(&self, message: &str) {
        tracing::error!(scope = %self.scope, "{message}");
    }
}

#[derive(Debug, Clone)]
pub struct Services {
    pub settings: Arc<Store>,
    pub cache: Arc<DiskCache>,
    pub logger: ScopedLogger,
}

impl Services {
    pub fn new(settings: Arc<Store>, cache: Arc<DiskCache>) -> Self {
        Self {
            settings,
            cache,
            logger: ScopedLogger::new("core"),
        }
    }

    /// The same services with the logger rescoped to one extension.
    pub fn for_extension(&self, point: ExtensionPoint, name: &str) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            cache: Arc::clone(&self.cache),
            logger: ScopedLogger::new(&format!("{point}::{name}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_scope_is_double_colon_joined() {
        let logger = ScopedLogger::new("Command::music");
        assert_eq!(logger.child("play").scope(), "Command::music::play");
    }
}
