#![allow(clippy::unwrap_used)]

use serde_yaml::Value;
use steward_kit::{Checkpoint, CheckpointManager, StateFile, Store};

fn checkpoint(pairs: &[(&str, Value)]) -> Checkpoint {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), value.clone()))
        .collect()
}

#[test]
fn sequential_saves_for_one_task_merge() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(dir.path().join("state.yml"));

    manager
        .save_checkpoint("sync", &checkpoint(&[("last_run", Value::from(100))]))
        .unwrap();
    manager
        .save_checkpoint("sync", &checkpoint(&[("count", Value::from(5))]))
        .unwrap();

    let loaded = manager.load_checkpoint("sync");
    assert_eq!(loaded.get("last_run"), Some(&Value::from(100)));
    assert_eq!(loaded.get("count"), Some(&Value::from(5)));
}

#[test]
fn saves_for_different_tasks_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(dir.path().join("state.yml"));

    manager
        .save_checkpoint("a", &checkpoint(&[("cursor", Value::from(1))]))
        .unwrap();
    manager
        .save_checkpoint("b", &checkpoint(&[("cursor", Value::from(2))]))
        .unwrap();

    let a = manager.load_checkpoint("a");
    let b = manager.load_checkpoint("b");
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a.get("cursor"), Some(&Value::from(1)));
    assert_eq!(b.get("cursor"), Some(&Value::from(2)));
}

#[test]
fn checkpoints_see_external_edits_between_calls() {
    // No caching across calls: another process (or a manual edit) touching
    // the state file between operations must be visible on the next read.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.yml");
    let manager = CheckpointManager::new(&path);

    manager
        .save_checkpoint("feed", &checkpoint(&[("cursor", Value::from(1))]))
        .unwrap();

    let external = StateFile::new(&path);
    let mut store = external.load();
    store
        .set("cron.taskstate.feed.cursor", Value::from(99))
        .unwrap();
    external.save(&store).unwrap();

    assert_eq!(
        manager.load_checkpoint("feed").get("cursor"),
        Some(&Value::from(99))
    );
}

#[test]
fn checkpoint_state_coexists_with_other_state_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.yml");

    let state = StateFile::new(&path);
    let mut store = Store::new();
    store.set("unrelated.marker", Value::from("keep")).unwrap();
    state.save(&store).unwrap();

    let manager = CheckpointManager::new(&path);
    manager
        .save_checkpoint("sync", &checkpoint(&[("last_run", Value::from(7))]))
        .unwrap();

    let reloaded = state.load();
    assert_eq!(reloaded.get_str("unrelated.marker"), Some("keep"));
    assert_eq!(reloaded.get_i64("cron.taskstate.sync.last_run"), Some(7));
}
