//! Snapshot Lifecycle Tests
//!
//! Snapshot creation, generations, and the stores behind the engine.

use crate::common::*;
use reflow::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};

fn persistent_pair(engine: &Engine) {
    engine.register(Entity::external("config").persistent(true)).unwrap();
    engine
        .register(
            Entity::function("render", ["config"], |ctx| Ok(ctx.get("config")?.clone()))
                .persistent(true),
        )
        .unwrap();
    engine
        .register_function("scratch", ["config"], |_| Ok(Value::Bool(true)))
        .unwrap();
}

#[test]
fn first_run_creates_snapshot_file() {
    let test = TestEngine::new(persistent_pair);
    assert!(!test.snapshot_path().exists());

    test.run(Bindings::new().with("config", 1i64));
    assert!(test.snapshot_path().exists());
    assert!(file_size(&test.snapshot_path()) > 0);
}

#[test]
fn only_persistent_entities_are_stored() {
    let test = TestEngine::new(persistent_pair);
    test.run(Bindings::new().with("config", 1i64));

    let snapshot = test.engine.last_snapshot().unwrap().unwrap();
    let names: Vec<&str> = snapshot.names().collect();
    assert_eq!(names, vec!["config", "render"]);
}

#[test]
fn generation_increases_every_committed_run() {
    let mut test = TestEngine::new(persistent_pair);
    for expected in 1..=4u64 {
        let report = test.run(Bindings::new().with("config", 1i64));
        assert_eq!(report.generation, Some(expected));
        test.reopen();
    }
    assert_eq!(
        test.engine.last_snapshot().unwrap().unwrap().generation(),
        4
    );
}

#[test]
fn snapshot_file_name_is_configurable() {
    let test = TestEngine::with_config(
        EngineConfig::default().with_snapshot_file("unit-7.snap"),
        persistent_pair,
    );
    test.run(Bindings::new().with("config", 1i64));
    assert!(test.dir.path().join("unit-7.snap").exists());
    assert!(!test.dir.path().join("reflow.snap").exists());
}

#[test]
fn engine_over_custom_store_shares_state() {
    let store = MemorySnapshotStore::new();
    let open = |store: &MemorySnapshotStore| {
        let engine = Engine::with_store(EngineConfig::in_memory(), Box::new(store.clone()));
        persistent_pair(&engine);
        engine
    };

    assert!(open(&store)
        .run_once(Bindings::new().with("config", 1i64))
        .unwrap()
        .fired("render"));
    assert_eq!(store.current().unwrap().generation(), 1);

    let report = open(&store)
        .run_once(Bindings::new().with("config", 1i64))
        .unwrap();
    assert!(!report.fired("render"));
}

#[test]
fn file_store_round_trips_values() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::open(dir.path(), "state.snap").unwrap();
    assert!(store.load().unwrap().is_none());

    let mut values = std::collections::BTreeMap::new();
    values.insert(
        "relation".to_string(),
        json(serde_json::json!({"db": [{"host": "10.0.0.5", "port": 5432}]})),
    );
    values.insert("ratio".to_string(), Value::Float(0.25));
    let snapshot = Snapshot::with_values(9, values);
    store.save(&snapshot).unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.generation(), 9);
    assert_eq!(loaded.get("relation"), snapshot.get("relation"));
    assert_eq!(loaded.get("ratio"), Some(&Value::Float(0.25)));
    assert!(store.location().ends_with("state.snap"));
}

#[test]
fn input_records_are_persisted_for_persistent_consumers() {
    let mut test = TestEngine::new(persistent_pair);
    test.run(Bindings::new().with("config", 1i64));
    test.reopen();

    let snapshot = test.engine.last_snapshot().unwrap().unwrap();
    let record = snapshot.inputs_of("render").unwrap();
    assert_eq!(record.get("config"), Some(&Value::Int(1)));
    assert_eq!(record.len(), 1);
    // Non-persistent consumers keep no record
    assert!(snapshot.inputs_of("scratch").is_none());

    test.redeclare(|engine| {
        engine.register(Entity::external("config").persistent(true)).unwrap();
    });
    test.run(Bindings::new().with("config", 1i64));
    assert!(test
        .engine
        .last_snapshot()
        .unwrap()
        .unwrap()
        .inputs_of("render")
        .is_none());
}
