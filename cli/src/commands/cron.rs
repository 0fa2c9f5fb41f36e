//! The `cron` built-in: run scheduled tasks and inspect their state.
//!
//! `cron run` walks every registered Task extension, consults its
//! checkpoint to decide whether it is due (at least `interval` since the
//! `last-run` stamp, or `--force`), executes it, and merges the returned
//! checkpoint updates plus a fresh stamp back through the checkpoint
//! manager. One failing task is logged and counted, never fatal to the
//! rest. `cron list` shows each task's interval and last run.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, json};
use tracing::{debug, error, info};

use steward_kit::{
    Checkpoint, CheckpointManager, ExtensionPoint, ExtensionRegistry, Node, Outcome, ParamKind,
    Parameter, RegistryError, Services, Task,
};

const LAST_RUN_KEY: &str = "last-run";

type TaskSet = Arc<Vec<(String, Arc<dyn Task>)>>;

/// Instantiates the registered tasks and registers the `cron` command
/// over them.
pub fn register(
    registry: &mut ExtensionRegistry,
    services: &Services,
    checkpoints: &Arc<CheckpointManager>,
) -> Result<(), RegistryError> {
    let tasks: TaskSet = Arc::new(
        registry
            .get_extensions_for(ExtensionPoint::Task, services)
            .into_iter()
            .filter_map(|(name, extension)| {
                extension.into_task().map(|task| (name, Arc::from(task)))
            })
            .collect(),
    );
    let checkpoints = Arc::clone(checkpoints);

    registry.register_extension_class(
        ExtensionPoint::Command,
        "cron",
        Box::new(move |_services| Ok(steward_kit::Extension::Applet(build_node(
            Arc::clone(&tasks),
            Arc::clone(&checkpoints),
        )?))),
    )
}

fn build_node(tasks: TaskSet, checkpoints: Arc<CheckpointManager>) -> anyhow::Result<Node> {
    let run_tasks = Arc::clone(&tasks);
    let run_checkpoints = Arc::clone(&checkpoints);
    let run = Node::new("Run due tasks")
        .parameter(Parameter::new("task")?.help("Run only this task"))?
        .parameter(
            Parameter::new("force")?
                .kind(ParamKind::Bool)
                .default_value(false)
                .help("Run even when not due"),
        )?
        .handler(move |params| {
            let only = params.get("task").and_then(|value| value.as_str());
            let force = params
                .get("force")
                .and_then(|value| value.as_bool())
                .unwrap_or(false);
            Ok(run_due_tasks(&run_tasks, &run_checkpoints, only, force))
        });

    let list = Node::new("List tasks with interval and last run").handler(move |_| {
        let mut mapping = Map::new();
        for (name, task) in tasks.iter() {
            let checkpoint = checkpoints.load_checkpoint(name);
            mapping.insert(
                name.clone(),
                json!({
                    "interval": humantime::format_duration(task.interval()).to_string(),
                    "last-run": describe_last_run(&checkpoint),
                }),
            );
        }
        Ok(Outcome::Mapping(mapping))
    });

    Ok(Node::new("Scheduled task runner")
        .child("run", run)?
        .child("list", list)?)
}

fn run_due_tasks(
    tasks: &[(String, Arc<dyn Task>)],
    checkpoints: &CheckpointManager,
    only: Option<&str>,
    force: bool,
) -> Outcome {
    let now = chrono::Utc::now().timestamp();
    let mut ran = 0u64;
    let mut skipped = 0u64;
    let mut failed = 0u64;

    for (name, task) in tasks {
        if only.is_some_and(|only| only != name) {
            continue;
        }
        let checkpoint = checkpoints.load_checkpoint(name);
        if !force && !is_due(&checkpoint, task.interval(), now) {
            debug!(task = name, "not due yet");
            skipped += 1;
            continue;
        }

        info!(task = name, "running task");
        match task.run(&checkpoint) {
            Ok(mut updates) => {
                updates.insert(LAST_RUN_KEY.to_owned(), serde_yaml::Value::from(now));
                if let Err(save_error) = checkpoints.save_checkpoint(name, &updates) {
                    error!(task = name, error = %save_error, "checkpoint not saved");
                    failed += 1;
                } else {
                    ran += 1;
                }
            }
            Err(task_error) => {
                error!(task = name, error = %format!("{task_error:#}"), "task failed");
                failed += 1;
            }
        }
    }

    let mut mapping = Map::new();
    mapping.insert("ran".to_owned(), json!(ran));
    mapping.insert("skipped".to_owned(), json!(skipped));
    mapping.insert("failed".to_owned(), json!(failed));
    Outcome::Mapping(mapping)
}

fn is_due(checkpoint: &Checkpoint, interval: Duration, now: i64) -> bool {
    match checkpoint.get(LAST_RUN_KEY).and_then(serde_yaml::Value::as_i64) {
        Some(last_run) => now - last_run >= interval.as_secs() as i64,
        None => true,
    }
}

fn describe_last_run(checkpoint: &Checkpoint) -> String {
    match checkpoint.get(LAST_RUN_KEY).and_then(serde_yaml::Value::as_i64) {
        Some(timestamp) => chrono::DateTime::from_timestamp(timestamp, 0)
            .map(|moment| moment.to_rfc3339())
            .unwrap_or_else(|| timestamp.to_string()),
        None => "never".to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_yaml::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        interval: Duration,
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Task for CountingTask {
        fn interval(&self) -> Duration {
            self.interval
        }

        fn run(&self, checkpoint: &Checkpoint) -> anyhow::Result<Checkpoint> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("task exploded");
            }
            let count = checkpoint.get("count").and_then(Value::as_i64).unwrap_or(0);
            let mut updates = Checkpoint::new();
            updates.insert("count".to_owned(), Value::from(count + 1));
            Ok(updates)
        }
    }

    fn task_set(entries: Vec<(&str, CountingTask)>) -> Vec<(String, Arc<dyn Task>)> {
        entries
            .into_iter()
            .map(|(name, task)| (name.to_owned(), Arc::new(task) as Arc<dyn Task>))
            .collect()
    }

    fn checkpoints() -> (tempfile::TempDir, CheckpointManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("state.yml"));
        (dir, manager)
    }

    #[test]
    fn never_run_tasks_are_due() {
        let (_dir, manager) = checkpoints();
        let runs = Arc::new(AtomicUsize::new(0));
        let tasks = task_set(vec![(
            "beat",
            CountingTask {
                interval: Duration::from_secs(3600),
                runs: Arc::clone(&runs),
                fail: false,
            },
        )]);

        run_due_tasks(&tasks, &manager, None, false);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            manager.load_checkpoint("beat").get("count"),
            Some(&Value::from(1))
        );
    }

    #[test]
    fn recently_run_tasks_are_skipped_unless_forced() {
        let (_dir, manager) = checkpoints();
        let runs = Arc::new(AtomicUsize::new(0));
        let tasks = task_set(vec![(
            "beat",
            CountingTask {
                interval: Duration::from_secs(3600),
                runs: Arc::clone(&runs),
                fail: false,
            },
        )]);

        run_due_tasks(&tasks, &manager, None, false);
        run_due_tasks(&tasks, &manager, None, false);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        run_due_tasks(&tasks, &manager, None, true);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_interval_tasks_run_every_pass() {
        let (_dir, manager) = checkpoints();
        let runs = Arc::new(AtomicUsize::new(0));
        let tasks = task_set(vec![(
            "eager",
            CountingTask {
                interval: Duration::ZERO,
                runs: Arc::clone(&runs),
                fail: false,
            },
        )]);

        run_due_tasks(&tasks, &manager, None, false);
        run_due_tasks(&tasks, &manager, None, false);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn one_failing_task_does_not_stop_the_rest() {
        let (_dir, manager) = checkpoints();
        let good_runs = Arc::new(AtomicUsize::new(0));
        let tasks = task_set(vec![
            (
                "bad",
                CountingTask {
                    interval: Duration::ZERO,
                    runs: Arc::new(AtomicUsize::new(0)),
                    fail: true,
                },
            ),
            (
                "good",
                CountingTask {
                    interval: Duration::ZERO,
                    runs: Arc::clone(&good_runs),
                    fail: false,
                },
            ),
        ]);

        let outcome = run_due_tasks(&tasks, &manager, None, false);
        assert_eq!(good_runs.load(Ordering::SeqCst), 1);
        let Outcome::Mapping(mapping) = outcome else {
            panic!("expected a mapping outcome");
        };
        assert_eq!(mapping.get("ran"), Some(&json!(1)));
        assert_eq!(mapping.get("failed"), Some(&json!(1)));
        // A failed run leaves no last-run stamp, so it retries next pass.
        assert!(manager.load_checkpoint("bad").is_empty());
    }

    #[test]
    fn task_filter_runs_only_the_named_task() {
        let (_dir, manager) = checkpoints();
        let a_runs = Arc::new(AtomicUsize::new(0));
        let b_runs = Arc::new(AtomicUsize::new(0));
        let tasks = task_set(vec![
            (
                "a",
                CountingTask {
                    interval: Duration::ZERO,
                    runs: Arc::clone(&a_runs),
                    fail: false,
                },
            ),
            (
                "b",
                CountingTask {
                    interval: Duration::ZERO,
                    runs: Arc::clone(&b_runs),
                    fail: false,
                },
            ),
        ]);

        run_due_tasks(&tasks, &manager, Some("b"), false);
        assert_eq!(a_runs.load(Ordering::SeqCst), 0);
        assert_eq!(b_runs.load(Ordering::SeqCst), 1);
    }
}
