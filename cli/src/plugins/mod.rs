//! Compiled-in plugins.
//!
//! The registry holds no runtime discovery: every loadable plugin is
//! listed here and registered when `plugin.<name>.enabled` is set in the
//! settings or the plugin is forced with `--plugins`.

pub mod heartbeat;
pub mod status;

use steward_kit::{ExtensionRegistry, RegistryError};

pub struct Plugin {
    pub name: &'static str,
    pub register: fn(&mut ExtensionRegistry) -> Result<(), RegistryError>,
}

pub const BUILTIN_PLUGINS: &[Plugin] = &[
    Plugin {
        name: "heartbeat",
        register: heartbeat::register,
    },
    Plugin {
        name: "status",
        register: status::register,
    },
];
