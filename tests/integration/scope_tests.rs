//! Integration tests for nested scopes and oracle visibility.

use vigil::{Engine, EngineError, FieldLookup, FieldProvider, Value};

struct Fields(Vec<(&'static str, Value)>);

impl FieldProvider for Fields {
    fn field(&self, key: &str) -> FieldLookup {
        let value = self
            .0
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.clone());
        FieldLookup { value, finished: true }
    }
}

#[test]
fn site_scopes_inherit_global_rules() {
    let mut engine = Engine::new();
    let main = engine.open_scope("main", None).unwrap();
    let global = engine
        .acquire(main, "(gt (field 'THREAT_LEVEL') 5)", "waf.conf:1")
        .unwrap();

    let site_a = engine.open_scope("site-a", Some(main)).unwrap();
    let site_b = engine.open_scope("site-b", Some(main)).unwrap();
    let a_only = engine
        .acquire(site_a, "(streq 'POST' (field 'REQUEST_METHOD'))", "a.conf:1")
        .unwrap();
    engine.close_scope(site_a).unwrap();
    engine.close_scope(site_b).unwrap();
    engine.close_scope(main).unwrap();

    let fields = Fields(vec![
        ("THREAT_LEVEL", Value::Int(7)),
        ("REQUEST_METHOD", Value::Str("POST".into())),
    ]);

    let mut txn = engine.transaction(site_a).unwrap();
    assert_eq!(txn.query(global, &fields).unwrap().value, Value::Bool(true));
    assert_eq!(txn.query(a_only, &fields).unwrap().value, Value::Bool(true));

    // Rules never leak between siblings.
    let mut txn = engine.transaction(site_b).unwrap();
    assert_eq!(txn.query(global, &fields).unwrap().value, Value::Bool(true));
    assert!(matches!(
        txn.query(a_only, &fields).unwrap_err(),
        EngineError::ScopeState(_)
    ));
}

#[test]
fn grandchild_scopes_see_the_whole_lineage() {
    let mut engine = Engine::new();
    let main = engine.open_scope("main", None).unwrap();
    let top = engine.acquire(main, "(not (field 'BLOCKED'))", "waf.conf:1").unwrap();
    let site = engine.open_scope("site", Some(main)).unwrap();
    let mid = engine
        .acquire(site, "(streq 'GET' (field 'REQUEST_METHOD'))", "site.conf:1")
        .unwrap();
    let location = engine.open_scope("location", Some(site)).unwrap();
    let leaf = engine
        .acquire(location, "(gt (field 'THREAT_LEVEL') 5)", "loc.conf:1")
        .unwrap();
    engine.close_scope(location).unwrap();
    engine.close_scope(site).unwrap();
    engine.close_scope(main).unwrap();

    let fields = Fields(vec![
        ("REQUEST_METHOD", Value::Str("GET".into())),
        ("THREAT_LEVEL", Value::Int(9)),
    ]);
    let mut txn = engine.transaction(location).unwrap();
    assert_eq!(txn.query(top, &fields).unwrap().value, Value::Bool(true));
    assert_eq!(txn.query(mid, &fields).unwrap().value, Value::Bool(true));
    assert_eq!(txn.query(leaf, &fields).unwrap().value, Value::Bool(true));
}

#[test]
fn scopes_close_independently() {
    let mut engine = Engine::new();
    let main = engine.open_scope("main", None).unwrap();
    let site = engine.open_scope("site", Some(main)).unwrap();

    // The child carries a broken rule; the parent stays healthy.
    engine.acquire(site, "(streq 'a')", "site.conf:1").unwrap();
    let ok = engine.acquire(main, "(not true)", "waf.conf:1").unwrap();

    assert!(engine.close_scope(site).is_err());
    engine.close_scope(main).unwrap();

    let fields = Fields(vec![]);
    let mut txn = engine.transaction(main).unwrap();
    assert_eq!(txn.query(ok, &fields).unwrap().value, Value::Bool(false));
}

#[test]
fn oracles_acquired_during_configuration_defer_until_close() {
    let mut engine = Engine::new();
    let scope = engine.open_scope("main", None).unwrap();
    let oracle = engine.acquire(scope, "(not true)", "waf.conf:1").unwrap();

    // The handle exists, but evaluation is impossible until close.
    assert_eq!(oracle.index(), 0);
    assert!(matches!(
        engine.transaction(scope).unwrap_err(),
        EngineError::ScopeState(_)
    ));

    engine.close_scope(scope).unwrap();
    let mut txn = engine.transaction(scope).unwrap();
    assert_eq!(
        txn.query(oracle, &Fields(vec![])).unwrap().value,
        Value::Bool(false)
    );
}
