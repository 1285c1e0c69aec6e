//! Failure Propagation Tests
//!
//! A resolver failure with no fallback poisons every consumer and makes the
//! run fatal; fatal runs leave the snapshot untouched. An entity that did
//! not fire keeps any input change pending for the next run.

use crate::common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn chain(engine: &Engine) {
    engine.register(Entity::external("template")).unwrap();
    engine
        .register(
            Entity::function("x", ["template"], |ctx| {
                let template = ctx.get_str("template")?;
                if template.is_empty() {
                    return Err(ResolveError::failed("empty template"));
                }
                if template == "halt" {
                    return Err(ResolveError::abort_run("operator requested halt"));
                }
                Ok(Value::from(template.to_uppercase()))
            })
            .persistent(true),
        )
        .unwrap();
    engine
        .register(Entity::function("y", ["x"], |ctx| Ok(ctx.get("x")?.clone())).persistent(true))
        .unwrap();
}

#[test]
fn failure_without_fallback_is_fatal_with_chain() {
    let test = TestEngine::new(chain);
    let report = test.run(Bindings::new().with("template", ""));

    assert_eq!(report.status, RunStatus::Fatal);
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.outcome("x"), Some(Outcome::Failed));
    assert_eq!(report.outcome("y"), Some(Outcome::UpstreamFailed));
    assert_eq!(report.fatal_chain(), &["x", "y"]);
    assert!(report
        .fatal
        .as_ref()
        .unwrap()
        .to_string()
        .contains("x -> y"));

    assert!(!report.persisted);
    assert!(test.engine.last_snapshot().unwrap().is_none());
    assert_eq!(file_size(&test.snapshot_path()), 0);
}

#[test]
fn fatal_run_keeps_previous_snapshot() {
    let mut test = TestEngine::new(chain);
    let good = test.run(Bindings::new().with("template", "ok"));
    assert_eq!(good.generation, Some(1));
    let bytes = std::fs::read(test.snapshot_path()).unwrap();

    test.reopen();
    let halted = test.run(Bindings::new().with("template", "halt"));
    assert_eq!(halted.status, RunStatus::Fatal);
    assert!(!halted.persisted);
    assert_eq!(halted.generation, None);

    assert_eq!(std::fs::read(test.snapshot_path()).unwrap(), bytes);
    let snapshot = test.engine.last_snapshot().unwrap().unwrap();
    assert_eq!(snapshot.generation(), 1);
    assert_eq!(snapshot.get("x"), Some(&Value::from("OK")));
}

#[test]
fn failure_with_snapshot_fallback_is_partial() {
    let mut test = TestEngine::new(chain);
    test.run(Bindings::new().with("template", "ok"));

    test.reopen();
    let report = test.run(Bindings::new().with("template", ""));
    assert_eq!(report.status, RunStatus::PartialFailure);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.outcome("x"), Some(Outcome::Failed));
    assert_eq!(report.value("x"), Some(&Value::from("OK")));
    // y sees the fallback, which is unchanged, so it does not fire
    assert_eq!(report.outcome("y"), Some(Outcome::Reused));
    assert!(report.persisted);

    let snapshot = test.engine.last_snapshot().unwrap().unwrap();
    assert_eq!(snapshot.get("x"), Some(&Value::from("OK")));
}

#[test]
fn independent_branches_still_run_after_failure() {
    let calls = Calls::new();
    let counter = calls.clone();
    let engine = Engine::ephemeral();
    engine
        .register_function("broken", Vec::<String>::new(), |_| {
            Err(ResolveError::failed("boom"))
        })
        .unwrap();
    engine
        .register_action("unrelated", Vec::<String>::new(), move |_| {
            counter.hit();
            Ok(())
        })
        .unwrap();

    let report = engine.run_once(Bindings::new()).unwrap();
    assert_eq!(report.status, RunStatus::PartialFailure);
    assert!(report.fired("unrelated"));
    assert_eq!(calls.count(), 1);
}

#[test]
fn abort_entity_is_not_a_failure() {
    let engine = Engine::ephemeral();
    engine.register(Entity::external("ready")).unwrap();
    engine
        .register_function("service", ["ready"], |ctx| {
            if !ctx.get_bool("ready")? {
                return Err(ResolveError::abort_entity("waiting for peers"));
            }
            Ok(Value::from("running"))
        })
        .unwrap();
    engine
        .register_function("status", ["service"], |ctx| Ok(ctx.get("service")?.clone()))
        .unwrap();

    let report = engine
        .run_once(Bindings::new().with("ready", false))
        .unwrap();
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.outcome("service"), Some(Outcome::Aborted));
    assert_eq!(report.value("status"), Some(&Value::Null));
}

#[test]
fn abort_run_stops_and_persists_nothing() {
    let test = TestEngine::new(|engine| {
        engine
            .register(Entity::variable("a", 1i64).persistent(true))
            .unwrap();
        engine
            .register_function("guard", ["a"], |_| {
                Err(ResolveError::abort_run("maintenance window"))
            })
            .unwrap();
        engine
            .register_function("after", ["guard"], |_| Ok(Value::Null))
            .unwrap();
    });
    let report = test.run_empty();
    assert_eq!(report.status, RunStatus::Fatal);
    assert_eq!(report.outcome("guard"), Some(Outcome::Aborted));
    assert_eq!(report.outcome("after"), Some(Outcome::NotEvaluated));
    assert!(report
        .fatal
        .as_ref()
        .unwrap()
        .to_string()
        .contains("maintenance window"));
    assert!(!test.snapshot_path().exists());
}

#[test]
fn panicking_resolver_fails_only_its_entity() {
    let engine = Engine::ephemeral();
    engine
        .register_function("bad", Vec::<String>::new(), |_| panic!("index out of range"))
        .unwrap();
    engine
        .register_function("good", Vec::<String>::new(), |_| Ok(Value::Int(1)))
        .unwrap();

    let report = engine.run_once(Bindings::new()).unwrap();
    assert_eq!(report.outcome("bad"), Some(Outcome::Failed));
    assert_eq!(report.value("good"), Some(&Value::Int(1)));

    // The run lock was released despite the panic
    assert!(engine.run_once(Bindings::new()).is_ok());
}

#[test]
fn missing_external_binding_poisons_consumers() {
    let engine = Engine::ephemeral();
    engine.register(Entity::external("relation")).unwrap();
    engine
        .register_function("render", ["relation"], |_| Ok(Value::Null))
        .unwrap();

    let report = engine.run_once(Bindings::new()).unwrap();
    assert_eq!(report.status, RunStatus::Fatal);
    assert_eq!(report.outcome("relation"), Some(Outcome::Failed));
    assert_eq!(report.fatal_chain(), &["relation", "render"]);
}

#[test]
fn transient_failure_does_not_hide_input_change() {
    let store_down = Arc::new(AtomicBool::new(false));
    let engine = Engine::ephemeral();
    engine.register(Entity::external("config").persistent(true)).unwrap();
    {
        let store_down = Arc::clone(&store_down);
        engine
            .register(
                Entity::function("render", ["config"], move |ctx| {
                    if store_down.load(Ordering::SeqCst) {
                        return Err(ResolveError::failed("template store unavailable"));
                    }
                    Ok(Value::from(format!(
                        "port={}",
                        ctx.get("config")?.as_int().unwrap_or(0)
                    )))
                })
                .persistent(true),
            )
            .unwrap();
    }
    let run = |port: i64| {
        engine
            .run_once(Bindings::new().with("config", port))
            .unwrap()
    };

    assert!(run(80).fired("render"));

    store_down.store(true, Ordering::SeqCst);
    let failed = run(8080);
    assert_eq!(failed.status, RunStatus::PartialFailure);
    assert_eq!(failed.outcome("render"), Some(Outcome::Failed));
    assert_eq!(failed.value("render"), Some(&Value::from("port=80")));

    // Same inputs as the failed run, but `render` never saw 8080
    store_down.store(false, Ordering::SeqCst);
    let recovered = run(8080);
    assert_eq!(recovered.outcome("render"), Some(Outcome::Fired));
    assert_eq!(recovered.value("render"), Some(&Value::from("port=8080")));

    assert_eq!(run(8080).outcome("render"), Some(Outcome::Reused));
}

#[test]
fn aborted_entity_retries_with_pending_change() {
    let peers_ready = Arc::new(AtomicBool::new(true));
    let engine = Engine::ephemeral();
    engine.register(Entity::external("config").persistent(true)).unwrap();
    {
        let peers_ready = Arc::clone(&peers_ready);
        engine
            .register(
                Entity::function("cluster", ["config"], move |ctx| {
                    if !peers_ready.load(Ordering::SeqCst) {
                        return Err(ResolveError::abort_entity("waiting for quorum"));
                    }
                    Ok(ctx.get("config")?.clone())
                })
                .persistent(true),
            )
            .unwrap();
    }
    let run = |config: &str| {
        engine
            .run_once(Bindings::new().with("config", config))
            .unwrap()
    };

    assert!(run("v1").fired("cluster"));

    peers_ready.store(false, Ordering::SeqCst);
    let waiting = run("v2");
    assert_eq!(waiting.status, RunStatus::Success);
    assert_eq!(waiting.outcome("cluster"), Some(Outcome::Aborted));
    assert_eq!(waiting.value("cluster"), Some(&Value::from("v1")));

    peers_ready.store(true, Ordering::SeqCst);
    let report = run("v2");
    assert!(report.fired("cluster"));
    assert_eq!(report.value("cluster"), Some(&Value::from("v2")));
}
