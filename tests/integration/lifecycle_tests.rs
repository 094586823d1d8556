//! End-to-end tests of the acquire / close / query lifecycle.

use std::cell::Cell;

use vigil::{Engine, EngineError, FieldLookup, FieldProvider, LifecycleStage, Value};

/// Static request fields with a lookup counter.
struct Request {
    method: &'static str,
    threat_level: i64,
    lookups: Cell<usize>,
}

impl Request {
    fn new(method: &'static str, threat_level: i64) -> Self {
        Self {
            method,
            threat_level,
            lookups: Cell::new(0),
        }
    }
}

impl FieldProvider for Request {
    fn field(&self, key: &str) -> FieldLookup {
        self.lookups.set(self.lookups.get() + 1);
        let value = match key {
            "REQUEST_METHOD" => Some(Value::Str(self.method.to_string())),
            "THREAT_LEVEL" => Some(Value::Int(self.threat_level)),
            _ => None,
        };
        FieldLookup { value, finished: true }
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn rules_with_identical_conditions_share_one_evaluation() {
    init_logging();
    let mut engine = Engine::new();
    let scope = engine.open_scope("main", None).unwrap();

    // Two rules, authored independently, with the same condition.
    let rule_a = engine
        .acquire(scope, "(streq 'GET' (field 'REQUEST_METHOD'))", "waf.conf:12")
        .unwrap();
    let rule_b = engine
        .acquire(scope, "(streq 'GET' (field 'REQUEST_METHOD'))", "site.conf:3")
        .unwrap();
    engine.close_scope(scope).unwrap();

    let request = Request::new("GET", 0);
    let mut txn = engine.transaction(scope).unwrap();
    assert_eq!(txn.query(rule_a, &request).unwrap().value, Value::Bool(true));
    assert_eq!(txn.query(rule_b, &request).unwrap().value, Value::Bool(true));
    assert_eq!(request.lookups.get(), 1);
}

#[test]
fn distinct_rules_share_common_subexpressions() {
    init_logging();
    let mut engine = Engine::new();
    let scope = engine.open_scope("main", None).unwrap();

    let is_get = engine
        .acquire(scope, "(streq 'GET' (field 'REQUEST_METHOD'))", "waf.conf:1")
        .unwrap();
    let risky_get = engine
        .acquire(
            scope,
            "(and (streq 'GET' (field 'REQUEST_METHOD')) (gt (field 'THREAT_LEVEL') 5))",
            "waf.conf:2",
        )
        .unwrap();
    engine.close_scope(scope).unwrap();

    let request = Request::new("GET", 9);
    let mut txn = engine.transaction(scope).unwrap();
    assert_eq!(txn.query(is_get, &request).unwrap().value, Value::Bool(true));
    assert_eq!(txn.query(risky_get, &request).unwrap().value, Value::Bool(true));
    // REQUEST_METHOD once (shared streq subtree) plus THREAT_LEVEL once.
    assert_eq!(request.lookups.get(), 2);
}

#[test]
fn constant_conditions_fold_away_before_evaluation() {
    init_logging();
    let mut engine = Engine::new();
    let scope = engine.open_scope("main", None).unwrap();

    let always = engine
        .acquire(scope, "(or (streq 'a' 'a') (field 'REQUEST_METHOD'))", "waf.conf:5")
        .unwrap();
    engine.close_scope(scope).unwrap();

    let request = Request::new("GET", 0);
    let mut txn = engine.transaction(scope).unwrap();
    let outcome = txn.query(always, &request).unwrap();
    assert_eq!(outcome.value, Value::Bool(true));
    assert!(outcome.finished);
    // The whole condition folded to a literal; no field was consulted.
    assert_eq!(request.lookups.get(), 0);
}

#[test]
fn parse_errors_carry_a_context_window() {
    let mut engine = Engine::new();
    let scope = engine.open_scope("main", None).unwrap();

    let err = engine
        .acquire(scope, "(and (field 'X') ))", "waf.conf:8")
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("--ERROR--"), "message was: {message}");
    assert!(message.contains("waf.conf:8"), "message was: {message}");
}

#[test]
fn close_reports_every_invalid_rule_then_fails_once() {
    init_logging();
    let mut engine = Engine::new();
    let scope = engine.open_scope("main", None).unwrap();
    engine.acquire(scope, "(not)", "waf.conf:1").unwrap();
    engine.acquire(scope, "(streq 'a')", "waf.conf:2").unwrap();

    let err = engine.close_scope(scope).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Lifecycle { stage: LifecycleStage::PreTransformValidation }
    ));
}

#[test]
fn unfinished_fields_keep_rules_partial_across_queries() {
    struct StreamingBody {
        seen: Cell<&'static str>,
        done: Cell<bool>,
    }

    impl FieldProvider for StreamingBody {
        fn field(&self, key: &str) -> FieldLookup {
            assert_eq!(key, "REQUEST_BODY");
            FieldLookup {
                value: Some(Value::Str(self.seen.get().to_string())),
                finished: self.done.get(),
            }
        }
    }

    init_logging();
    let mut engine = Engine::new();
    let scope = engine.open_scope("main", None).unwrap();
    let oracle = engine
        .acquire(scope, "(streq 'attack' (field 'REQUEST_BODY'))", "waf.conf:4")
        .unwrap();
    engine.close_scope(scope).unwrap();

    let body = StreamingBody { seen: Cell::new("att"), done: Cell::new(false) };
    let mut txn = engine.transaction(scope).unwrap();
    assert!(!txn.query(oracle, &body).unwrap().finished);

    body.seen.set("attack");
    body.done.set(true);
    let outcome = txn.query(oracle, &body).unwrap();
    assert!(outcome.finished);
    assert_eq!(outcome.value, Value::Bool(true));

    // Finished results stick even if the provider changes its story.
    body.seen.set("benign");
    assert_eq!(txn.query(oracle, &body).unwrap().value, Value::Bool(true));
}
