//! Heartbeat task: proves the scheduling loop end to end.
//!
//! Counts its own runs in its checkpoint, so `cron list` and the state
//! file show the machinery working without any external service.

use std::time::Duration;

use anyhow::Context;
use serde_yaml::Value;

use steward_kit::{
    Checkpoint, Extension, ExtensionPoint, ExtensionRegistry, RegistryError, ScopedLogger,
    Services, Task,
};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);
const INTERVAL_KEY: &str = "plugin.heartbeat.interval";

struct HeartbeatTask {
    interval: Duration,
    logger: ScopedLogger,
}

impl Task for HeartbeatTask {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&self, checkpoint: &Checkpoint) -> anyhow::Result<Checkpoint> {
        let beats = checkpoint.get("beats").and_then(Value::as_i64).unwrap_or(0) + 1;
        self.logger.info(&format!("beat {beats}"));
        let mut updates = Checkpoint::new();
        updates.insert("beats".to_owned(), Value::from(beats));
        Ok(updates)
    }
}

pub fn register(registry: &mut ExtensionRegistry) -> Result<(), RegistryError> {
    registry.register_extension_class(ExtensionPoint::Task, "heartbeat", Box::new(build))
}

fn build(services: &Services) -> anyhow::Result<Extension> {
    let interval = match services.settings.get_str(INTERVAL_KEY) {
        Some(text) => humantime::parse_duration(text)
            .with_context(|| format!("invalid {INTERVAL_KEY} setting: {text:?}"))?,
        None => DEFAULT_INTERVAL,
    };
    Ok(Extension::Task(Box::new(HeartbeatTask {
        interval,
        logger: services.logger.clone(),
    })))
}
