//! Per-task checkpoints over the shared state file.
//!
//! Scheduled tasks remember progress (last-run timestamps, last-seen item
//! ids) between runs. Each task owns the `cron.taskstate.<task>` namespace
//! inside one state file shared by all tasks. Every operation re-reads the
//! file from disk so concurrent external edits between calls are not lost;
//! saves merge key by key rather than replacing the task's mapping, so a
//! checkpoint written earlier keeps keys a later save does not mention.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::debug;

use crate::state::{StateError, StateFile};

const TASKSTATE_PREFIX: &str = "cron.taskstate";

/// Arbitrary key-value payload describing one task's progress.
pub type Checkpoint = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    state: StateFile,
}

impl CheckpointManager {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state: StateFile::new(state_file),
        }
    }

    pub fn state_path(&self) -> &Path {
        self.state.path()
    }

    /// Returns the checkpoint saved for `task`, or an empty one.
    pub fn load_checkpoint(&self, task: &str) -> Checkpoint {
        let store = self.state.load();
        let key = format!("{TASKSTATE_PREFIX}.{task}");
        match store.get(&key) {
            Ok(Value::Mapping(mapping)) => mapping
                .iter()
                .filter_map(|(k, v)| k.as_str().map(|k| (k.to_owned(), v.clone())))
                .collect(),
            _ => {
                debug!(task, "no checkpoint on disk");
                Checkpoint::new()
            }
        }
    }

    /// Merges `checkpoint` into the task's namespace and persists the file.
    ///
    /// Keys absent from `checkpoint` keep whatever an earlier save wrote.
    pub fn save_checkpoint(&self, task: &str, checkpoint: &Checkpoint) -> Result<(), StateError> {
        let mut store = self.state.load();
        for (key, value) in checkpoint {
            store.set(&format!("{TASKSTATE_PREFIX}.{task}.{key}"), value.clone())?;
        }
        self.state.save(&store)
    }
}
