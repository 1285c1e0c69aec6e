//! Graph Structure Tests
//!
//! Structural errors surface from the first run before anything executes.

use crate::common::*;

#[test]
fn action_as_dependency_is_rejected() {
    let calls = Calls::new();
    let counter = calls.clone();
    let engine = Engine::ephemeral();
    engine
        .register_action("restart", Vec::<String>::new(), move |_| {
            counter.hit();
            Ok(())
        })
        .unwrap();
    engine
        .register_function("status", ["restart"], |_| Ok(Value::Null))
        .unwrap();

    let err = engine.run_once(Bindings::new()).unwrap_err();
    match err {
        Error::InvalidDependency { entity, dependency } => {
            assert_eq!(entity, "status");
            assert_eq!(dependency, "restart");
        }
        other => panic!("expected InvalidDependency, got {:?}", other),
    }
    assert!(err_is_structural(&engine));
    assert_eq!(calls.count(), 0, "nothing runs when the graph is invalid");
}

fn err_is_structural(engine: &Engine) -> bool {
    engine
        .validate()
        .err()
        .map_or(false, |e| e.is_structural())
}

#[test]
fn two_node_cycle_reports_path() {
    let engine = Engine::ephemeral();
    engine
        .register_function("a", ["b"], |_| Ok(Value::Null))
        .unwrap();
    engine
        .register_function("b", ["a"], |_| Ok(Value::Null))
        .unwrap();

    let err = engine.run_once(Bindings::new()).unwrap_err();
    assert!(matches!(err, Error::CyclicDependency { .. }));
    assert_eq!(err.chain(), &["a", "b", "a"]);
    assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> a");
}

#[test]
fn predicate_read_closes_cycle() {
    let engine = Engine::ephemeral();
    engine
        .register_predicate(Predicate::truthy("ready", "render"))
        .unwrap();
    engine
        .register(Entity::function("render", Vec::<String>::new(), |_| Ok(Value::Null)).with_predicates(["ready"]))
        .unwrap();

    let err = engine.run_once(Bindings::new()).unwrap_err();
    assert!(matches!(err, Error::CyclicDependency { .. }));
}

#[test]
fn unknown_dependency_is_rejected() {
    let engine = Engine::ephemeral();
    engine
        .register_function("render", ["tempalte"], |_| Ok(Value::Null))
        .unwrap();

    assert!(matches!(
        engine.run_once(Bindings::new()),
        Err(Error::UnresolvedDependency { ref dependency, .. }) if dependency == "tempalte"
    ));
}

#[test]
fn unknown_predicate_is_rejected() {
    let engine = Engine::ephemeral();
    engine
        .register(Entity::function("render", Vec::<String>::new(), |_| Ok(Value::Null)).with_predicates(["is_leader"]))
        .unwrap();

    assert!(matches!(
        engine.run_once(Bindings::new()),
        Err(Error::UnresolvedDependency { .. })
    ));
}

#[test]
fn duplicate_names_are_rejected_after_normalization() {
    let engine = Engine::ephemeral();
    engine.register_variable("config_data", 1i64).unwrap();
    assert!(matches!(
        engine.register_variable("config-data", 2i64),
        Err(Error::DuplicateName(_))
    ));
}

#[test]
fn order_follows_dependencies_then_declaration() {
    let engine = Engine::ephemeral();
    engine
        .register_function("site", ["nginx", "php"], |_| Ok(Value::Null))
        .unwrap();
    engine
        .register_function("php", ["config"], |_| Ok(Value::Null))
        .unwrap();
    engine
        .register_function("nginx", ["config"], |_| Ok(Value::Null))
        .unwrap();
    engine.register_variable("config", 1i64).unwrap();

    assert_eq!(
        engine.topological_order().unwrap(),
        vec!["config", "php", "nginx", "site"]
    );

    let report = engine.run_once(Bindings::new()).unwrap();
    let names: Vec<&str> = report.entities.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["config", "php", "nginx", "site"]);
}

#[test]
fn registration_closes_after_first_run() {
    let engine = Engine::ephemeral();
    engine.register_variable("a", 1i64).unwrap();
    engine.run_once(Bindings::new()).unwrap();

    assert!(matches!(
        engine.register_variable("b", 1i64),
        Err(Error::RegistryFrozen(_))
    ));
}
