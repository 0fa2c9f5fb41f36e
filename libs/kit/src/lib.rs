//! Steward kit: the application core shared by every transport.
//!
//! The kit owns the pieces with actual design decisions: the dotted-key
//! settings store and its on-disk persistence, per-task checkpoints, the
//! extension registry with service injection, and the applet tree that
//! gives CLI commands and HTTP endpoints one parameter/dispatch model.
//! Transports (the `steward` binary, the HTTP server crate) are thin
//! adapters over these types.

pub mod applet;
pub mod cache;
pub mod checkpoint;
pub mod extension;
pub mod paths;
pub mod registry;
pub mod services;
pub mod settings;
pub mod state;
pub mod store;

pub use applet::{AppletError, DispatchError, Node, Outcome, ParamKind, Parameter, Params, bind};
pub use cache::{CacheError, DiskCache};
pub use checkpoint::{Checkpoint, CheckpointManager};
pub use extension::{AppBridge, Callable, Extension, Task};
pub use paths::UserPaths;
pub use registry::{ExtensionPoint, ExtensionRegistry, Factory, RegistryError};
pub use services::{ScopedLogger, Services};
pub use state::{StateError, StateFile};
pub use store::{Store, StoreError, flatten, unflatten};
