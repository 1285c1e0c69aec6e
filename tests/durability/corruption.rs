//! Corruption Tests
//!
//! An unreadable snapshot never fails a run: the engine degrades to "no
//! previous snapshot", fires every persistent entity, and writes a fresh
//! snapshot.

use crate::common::*;

fn declare(engine: &Engine) {
    engine.register(Entity::external("config").persistent(true)).unwrap();
    engine
        .register(
            Entity::function("render", ["config"], |ctx| Ok(ctx.get("config")?.clone()))
                .persistent(true),
        )
        .unwrap();
}

fn bind() -> Bindings {
    Bindings::new().with("config", "listen 80;")
}

fn committed_twice() -> TestEngine {
    let mut test = TestEngine::new(declare);
    test.run(bind());
    test.reopen();
    assert!(!test.run(bind()).fired("render"));
    test.reopen();
    test
}

#[test]
fn flipped_bytes_degrade_to_first_run() {
    let test = committed_twice();
    corrupt_file_at_offset(&test.snapshot_path(), 0, b"XXXXXXXX");

    let report = test.run(bind());
    assert_eq!(report.status, RunStatus::Success);
    assert!(report.fired("render"));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("unreadable"));

    // The rewritten snapshot starts a new lineage and is readable again
    assert_eq!(report.generation, Some(1));
    let snapshot = test.engine.last_snapshot().unwrap().unwrap();
    assert_eq!(snapshot.get("render"), Some(&Value::from("listen 80;")));
}

#[test]
fn corrupted_body_is_detected() {
    let test = committed_twice();
    let size = file_size(&test.snapshot_path());
    corrupt_file_at_offset(&test.snapshot_path(), size - 8, &[0xFF; 4]);

    assert!(matches!(
        test.engine.last_snapshot(),
        Err(Error::Persistence(_))
    ));
    assert!(test.run(bind()).fired("render"));
}

#[test]
fn truncated_snapshot_degrades() {
    let test = committed_twice();
    truncate_file(&test.snapshot_path(), 10);

    let report = test.run(bind());
    assert!(report.fired("render"));
    assert!(!report.warnings.is_empty());
    assert!(report.persisted);
}

#[test]
fn empty_snapshot_file_degrades() {
    let test = committed_twice();
    truncate_file(&test.snapshot_path(), 0);

    let report = test.run(bind());
    assert!(report.fired("render"));
    assert_eq!(report.status, RunStatus::Success);
}

#[test]
fn interrupted_write_leaves_previous_snapshot() {
    let mut test = committed_twice();
    let before = std::fs::read(test.snapshot_path()).unwrap();

    // A writer that died before rename leaves only its temp file behind
    let temp = test.dir.path().join(".reflow.snap.tmp");
    std::fs::write(&temp, b"partial").unwrap();

    test.reopen();
    assert!(!temp.exists(), "temp file is cleaned up on open");
    assert_eq!(std::fs::read(test.snapshot_path()).unwrap(), before);
    assert!(!test.run(bind()).fired("render"));
}
