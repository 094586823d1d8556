//! Integration tests for the template and debug report directives.

use std::io::Read;

use vigil::{Engine, EngineError, FieldLookup, FieldProvider, Value};

struct Method(&'static str);

impl FieldProvider for Method {
    fn field(&self, key: &str) -> FieldLookup {
        let value = (key == "REQUEST_METHOD").then(|| Value::Str(self.0.to_string()));
        FieldLookup { value, finished: true }
    }
}

#[test]
fn templates_behave_like_their_expansion() {
    let mut engine = Engine::new();
    engine
        .define(
            "risky-method",
            "m",
            "(and (streq (ref 'm') (field 'REQUEST_METHOD')) (gt (field 'THREAT_LEVEL') 5))",
            "defs.conf:1",
        )
        .unwrap();

    let scope = engine.open_scope("main", None).unwrap();
    let oracle = engine.acquire(scope, "(risky-method 'PUT')", "waf.conf:1").unwrap();
    engine.close_scope(scope).unwrap();

    struct AllFields;
    impl FieldProvider for AllFields {
        fn field(&self, key: &str) -> FieldLookup {
            let value = match key {
                "REQUEST_METHOD" => Some(Value::Str("PUT".into())),
                "THREAT_LEVEL" => Some(Value::Int(8)),
                _ => None,
            };
            FieldLookup { value, finished: true }
        }
    }

    let mut txn = engine.transaction(scope).unwrap();
    assert_eq!(txn.query(oracle, &AllFields).unwrap().value, Value::Bool(true));
}

#[test]
fn template_names_are_single_definition() {
    let mut engine = Engine::new();
    engine
        .define("is-get", "", "(streq 'GET' (field 'REQUEST_METHOD'))", "defs.conf:1")
        .unwrap();
    let err = engine
        .define("is-get", "", "(streq 'get' (field 'REQUEST_METHOD'))", "defs.conf:2")
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateDefinition { name } if name == "is-get"));

    // Shadowing a builtin is equally rejected.
    let err = engine.define("and", "a b", "(or (ref 'a') (ref 'b'))", "defs.conf:3");
    assert!(matches!(err, Err(EngineError::DuplicateDefinition { .. })));
}

#[test]
fn templates_with_unknown_parameter_references_fail_at_close() {
    let mut engine = Engine::new();
    engine
        .define("broken", "m", "(streq (ref 'other') (field 'REQUEST_METHOD'))", "defs.conf:1")
        .unwrap();

    let scope = engine.open_scope("main", None).unwrap();
    engine.acquire(scope, "(broken 'GET')", "waf.conf:1").unwrap();
    assert!(matches!(
        engine.close_scope(scope).unwrap_err(),
        EngineError::Lifecycle { .. }
    ));
}

#[test]
fn debug_report_shows_merged_origins() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vigil-report.txt");

    let mut engine = Engine::new();
    engine.set_debug_report(path.to_str().unwrap()).unwrap();

    let scope = engine.open_scope("main", None).unwrap();
    engine
        .acquire(scope, "(streq 'GET' (field 'REQUEST_METHOD'))", "waf.conf:12")
        .unwrap();
    engine
        .acquire(scope, "(streq 'GET' (field 'REQUEST_METHOD'))", "site.conf:3")
        .unwrap();
    engine.close_scope(scope).unwrap();

    let mut report = String::new();
    std::fs::File::open(&path)
        .unwrap()
        .read_to_string(&mut report)
        .unwrap();

    // One merged node carries both origins and both acquisition indices.
    assert!(report.contains("origin waf.conf:12"));
    assert!(report.contains("origin site.conf:3"));
    assert!(report.contains("roots [0, 1]"));
}

#[test]
fn debug_report_target_is_set_at_most_once() {
    let mut engine = Engine::new();
    engine.set_debug_report("-").unwrap();
    assert!(matches!(
        engine.set_debug_report("elsewhere.txt").unwrap_err(),
        EngineError::Directive(_)
    ));
}

#[test]
fn custom_calls_register_through_the_registry() {
    use std::sync::Arc;
    use vigil::{Call, EvalContext, EvalOutcome};

    struct AlwaysBlock;

    impl Call for AlwaysBlock {
        fn name(&self) -> &str {
            "always-block"
        }

        fn arity(&self) -> (usize, Option<usize>) {
            (0, Some(0))
        }

        fn eval(&self, _ctx: &EvalContext<'_>) -> EvalOutcome {
            EvalOutcome::finished(Value::Bool(true))
        }
    }

    let mut engine = Engine::new();
    engine.registry_mut().register(Arc::new(AlwaysBlock)).unwrap();

    let scope = engine.open_scope("main", None).unwrap();
    let oracle = engine.acquire(scope, "(always-block)", "waf.conf:1").unwrap();
    engine.close_scope(scope).unwrap();

    let mut txn = engine.transaction(scope).unwrap();
    assert_eq!(txn.query(oracle, &Method("GET")).unwrap().value, Value::Bool(true));
}
