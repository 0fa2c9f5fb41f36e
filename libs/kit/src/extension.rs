//! Extension contracts.
//!
//! Each extension point expects one capability: Command and APIEndpoint
//! extensions produce an applet [`Node`] tree, Task extensions run on a
//! schedule against a checkpoint, Callable extensions back notification
//! actions, and AppBridge extensions front a desktop application. A
//! factory returns the matching [`Extension`] variant; the registry never
//! inspects beyond that.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::applet::{Node, Params};
use crate::checkpoint::Checkpoint;

/// A unit of scheduled work.
///
/// The cron runner loads the task's checkpoint before `run` and merges the
/// returned updates (plus the new `last-run` stamp) back afterwards. A
/// task is due when at least `interval` has passed since its last run;
/// zero means due on every pass.
pub trait Task: Send + Sync {
    fn interval(&self) -> Duration;

    fn run(&self, checkpoint: &Checkpoint) -> anyhow::Result<Checkpoint>;
}

/// A named action that notifications can offer to the user.
pub trait Callable: Send + Sync {
    fn call(&self, args: &Params) -> anyhow::Result<Value>;

    /// Human-readable description of what calling this would do.
    fn stringify(&self) -> String;
}

/// A bridge to an external desktop application.
pub trait AppBridge: Send + Sync {
    fn app_name(&self) -> &str;

    fn invoke(&self, operation: &str, args: &Map<String, Value>) -> anyhow::Result<Value>;
}

/// What a factory produced for one (point, name) pair.
pub enum Extension {
    Applet(Node),
    Task(Box<dyn Task>),
    Callable(Box<dyn Callable>),
    Bridge(Box<dyn AppBridge>),
}

impl Extension {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Applet(_) => "applet",
            Self::Task(_) => "task",
            Self::Callable(_) => "callable",
            Self::Bridge(_) => "bridge",
        }
    }

    pub fn into_applet(self) -> Option<Node> {
        match self {
            Self::Applet(node) => Some(node),
            _ => None,
        }
    }

    pub fn into_task(self) -> Option<Box<dyn Task>> {
        match self {
            Self::Task(task) => Some(task),
            _ => None,
        }
    }

    pub fn into_callable(self) -> Option<Box<dyn Callable>> {
        match self {
            Self::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    pub fn into_bridge(self) -> Option<Box<dyn AppBridge>> {
        match self {
            Self::Bridge(bridge) => Some(bridge),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Extension").field(&self.kind()).finish()
    }
}
