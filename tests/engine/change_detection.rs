//! Change Detection Tests
//!
//! Persistent entities fire on the first run and whenever a dependency's
//! value differs from the one they last fired with; otherwise they reuse
//! their snapshot value.

use crate::common::*;

fn apache(engine: &Engine) {
    engine
        .register(Entity::external("config").persistent(true))
        .unwrap();
    engine
        .register(
            Entity::variable("mysql", json(serde_json::json!({"url": "db:3306"}))).persistent(true),
        )
        .unwrap();
    engine
        .register(
            Entity::function("apache", ["mysql", "config"], |ctx| {
                let https = ctx.get_bool("config:https")?;
                let url = ctx.get_str("mysql:url")?;
                Ok(json(serde_json::json!({
                    "some_value": format!("{}{}", https, url)
                })))
            })
            .persistent(true),
        )
        .unwrap();
}

fn config(https: bool) -> Bindings {
    let mut bindings = Bindings::new();
    bindings.insert_json("config", serde_json::json!({"https": https}));
    bindings
}

#[test]
fn first_run_fires_and_commits() {
    let test = TestEngine::new(apache);
    let report = test.run(config(true));

    assert_eq!(report.status, RunStatus::Success);
    assert!(report.fired("apache"));
    assert!(report.persisted);
    assert_eq!(report.generation, Some(1));
    assert_eq!(
        report.value("apache").and_then(|v| v.get("some_value")),
        Some(&Value::from("truedb:3306"))
    );

    let snapshot = test.engine.last_snapshot().unwrap().unwrap();
    assert!(snapshot.contains("apache"));
    assert!(snapshot.contains("config"));
    assert!(snapshot.contains("mysql"));
}

#[test]
fn identical_inputs_do_not_fire() {
    let mut test = TestEngine::new(apache);
    test.run(config(true));

    test.reopen();
    let report = test.run(config(true));
    assert!(!report.fired("apache"));
    assert_eq!(report.outcome("apache"), Some(Outcome::Reused));
    assert_eq!(
        report.value("apache").and_then(|v| v.get("some_value")),
        Some(&Value::from("truedb:3306"))
    );
    assert_eq!(report.generation, Some(2));
}

#[test]
fn changed_input_fires_again() {
    let mut test = TestEngine::new(apache);
    test.run(config(true));

    test.reopen();
    let report = test.run(config(false));
    assert!(report.fired("apache"));
    assert_eq!(
        report.value("apache").and_then(|v| v.get("some_value")),
        Some(&Value::from("falsedb:3306"))
    );

    // The new value is the baseline for the run after
    test.reopen();
    assert!(!test.run(config(false)).fired("apache"));
}

#[test]
fn non_persistent_function_fires_every_run() {
    let mut test = TestEngine::new(|engine| {
        engine
            .register(Entity::variable("port", 443i64).persistent(true))
            .unwrap();
        engine
            .register_function("listen", ["port"], |ctx| {
                Ok(Value::from(format!("0.0.0.0:{}", ctx.get("port")?.as_int().unwrap_or(0))))
            })
            .unwrap();
    });

    for _ in 0..3 {
        let report = test.run_empty();
        assert!(report.fired("listen"));
        assert_eq!(report.value("listen"), Some(&Value::from("0.0.0.0:443")));
        test.reopen();
    }
}

#[test]
fn non_persistent_dependency_counts_as_changed() {
    let test = TestEngine::new(|engine| {
        engine.register_variable("now", 1i64).unwrap();
        engine
            .register(Entity::function("stamp", ["now"], |_| Ok(Value::Bool(true))).persistent(true))
            .unwrap();
    });

    assert!(test.run_empty().fired("stamp"));
    assert!(test.run_empty().fired("stamp"));
}

#[test]
fn persistent_action_runs_only_on_change() {
    let calls = Calls::new();
    let counter = calls.clone();
    let engine = Engine::ephemeral();
    engine
        .register(Entity::external("package").persistent(true))
        .unwrap();
    engine
        .register(
            Entity::action("install", ["package"], move |_| {
                counter.hit();
                Ok(())
            })
            .persistent(true),
        )
        .unwrap();

    let run = |version: &str| {
        engine
            .run_once(Bindings::new().with("package", version))
            .unwrap()
    };

    assert!(run("1.0").fired("install"));
    assert_eq!(run("1.0").outcome("install"), Some(Outcome::Skipped));
    assert!(run("1.1").fired("install"));
    assert_eq!(calls.count(), 2);
}

#[test]
fn all_changed_policy_waits_for_every_input() {
    let engine = Engine::ephemeral();
    engine.register(Entity::external("cert").persistent(true)).unwrap();
    engine.register(Entity::external("key").persistent(true)).unwrap();
    engine
        .register(
            Entity::function("tls", ["cert", "key"], |ctx| {
                Ok(Value::from(format!(
                    "{}+{}",
                    ctx.get_str("cert")?,
                    ctx.get_str("key")?
                )))
            })
            .persistent(true)
            .with_firing(FiringPolicy::AllChanged),
        )
        .unwrap();

    let run = |cert: &str, key: &str| {
        engine
            .run_once(Bindings::new().with("cert", cert).with("key", key))
            .unwrap()
    };

    assert!(run("c1", "k1").fired("tls"));
    let partial = run("c2", "k1");
    assert_eq!(partial.outcome("tls"), Some(Outcome::Reused));
    assert_eq!(partial.value("tls"), Some(&Value::from("c1+k1")));
    // Both inputs have now moved since `tls` last fired with c1+k1
    let both = run("c2", "k2");
    assert!(both.fired("tls"));
    assert_eq!(both.value("tls"), Some(&Value::from("c2+k2")));
}

#[test]
fn custom_policy_sees_per_dependency_flags() {
    let engine = Engine::ephemeral();
    engine.register(Entity::external("image").persistent(true)).unwrap();
    engine.register(Entity::external("replicas").persistent(true)).unwrap();
    engine
        .register(
            Entity::function("deploy", ["image", "replicas"], |_| Ok(Value::Null))
                .persistent(true)
                .with_firing(FiringPolicy::custom(|changes| {
                    changes.changed("image") == Some(true)
                })),
        )
        .unwrap();

    let run = |image: &str, replicas: i64| {
        engine
            .run_once(Bindings::new().with("image", image).with("replicas", replicas))
            .unwrap()
    };

    assert!(run("app:1", 1).fired("deploy"));
    assert!(!run("app:1", 3).fired("deploy"));
    assert!(run("app:2", 3).fired("deploy"));
}

#[test]
fn unregistered_snapshot_entries_are_pruned() {
    let mut test = TestEngine::new(|engine| {
        engine
            .register(Entity::variable("a", 1i64).persistent(true))
            .unwrap();
    });
    test.run_empty();
    assert!(test.engine.last_snapshot().unwrap().unwrap().contains("a"));

    // Next process no longer declares `a`
    test.redeclare(|engine| {
        engine
            .register(Entity::variable("b", 2i64).persistent(true))
            .unwrap();
    });
    test.run_empty();

    let snapshot = test.engine.last_snapshot().unwrap().unwrap();
    assert!(!snapshot.contains("a"));
    assert!(snapshot.contains("b"));
    assert_eq!(snapshot.generation(), 2);
}

#[test]
fn unforced_deferred_variable_is_not_committed() {
    let calls = Calls::new();
    let counter = calls.clone();
    let engine = Engine::ephemeral();
    engine
        .register(
            Entity::deferred_variable("expensive", move || {
                counter.hit();
                Ok(Value::Int(42))
            })
            .persistent(true),
        )
        .unwrap();
    engine
        .register(Entity::variable("cheap", 1i64).persistent(true))
        .unwrap();

    let report = engine.run_once(Bindings::new()).unwrap();
    assert_eq!(report.outcome("expensive"), Some(Outcome::Deferred));
    assert_eq!(calls.count(), 0);

    let snapshot = engine.last_snapshot().unwrap().unwrap();
    assert!(!snapshot.contains("expensive"));
    assert!(snapshot.contains("cheap"));
}
