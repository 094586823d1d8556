//! # Vigil Performance Benchmarks
//!
//! Scale tests for the two hot paths:
//! - Scope close (validation, transformation to fixpoint, freeze)
//! - Per-transaction memoized evaluation across many oracles
//!

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use vigil::{Engine, FieldLookup, FieldProvider, Oracle, ScopeId, Value};

struct SyntheticRequest;

impl FieldProvider for SyntheticRequest {
    fn field(&self, key: &str) -> FieldLookup {
        let value = match key {
            "REQUEST_METHOD" => Value::Str("GET".to_string()),
            _ => Value::Int((key.len() as i64) * 3),
        };
        FieldLookup { value: Some(value), finished: true }
    }
}

/// Builds a scope of `num_rules` conditions that all share the method check
/// but differ in their per-rule header threshold.
fn build_scope(engine: &mut Engine, num_rules: usize) -> (ScopeId, Vec<Oracle>) {
    let scope = engine.open_scope("bench", None).expect("open scope");
    let mut oracles = Vec::with_capacity(num_rules);
    for i in 0..num_rules {
        let expr = format!(
            "(and (streq 'GET' (field 'REQUEST_METHOD')) (gt (field 'H{}') {}))",
            i % 64,
            i
        );
        let origin = format!("bench.conf:{}", i);
        oracles.push(engine.acquire(scope, &expr, &origin).expect("acquire"));
    }
    (scope, oracles)
}

fn bench_scope_close(c: &mut Criterion) {
    let mut group = c.benchmark_group("scope_close");
    for num_rules in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(num_rules as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_rules),
            &num_rules,
            |b, &num_rules| {
                b.iter(|| {
                    let mut engine = Engine::new();
                    let (scope, _) = build_scope(&mut engine, num_rules);
                    engine.close_scope(black_box(scope)).expect("close");
                });
            },
        );
    }
    group.finish();
}

fn bench_transaction_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("transaction_eval");
    for num_rules in [100, 1_000, 10_000] {
        let mut engine = Engine::new();
        let (scope, oracles) = build_scope(&mut engine, num_rules);
        engine.close_scope(scope).expect("close");

        group.throughput(Throughput::Elements(num_rules as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_rules),
            &oracles,
            |b, oracles| {
                b.iter(|| {
                    let mut txn = engine.transaction(scope).expect("transaction");
                    for &oracle in oracles {
                        black_box(txn.query(oracle, &SyntheticRequest).expect("query"));
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_repeated_queries(c: &mut Criterion) {
    // Memoized re-query of an already finished oracle.
    let mut engine = Engine::new();
    let (scope, oracles) = build_scope(&mut engine, 1_000);
    engine.close_scope(scope).expect("close");

    c.bench_function("requery_finished_oracle", |b| {
        let mut txn = engine.transaction(scope).expect("transaction");
        let oracle = oracles[0];
        txn.query(oracle, &SyntheticRequest).expect("first query");
        b.iter(|| black_box(txn.query(oracle, &SyntheticRequest).expect("query")));
    });
}

criterion_group!(
    benches,
    bench_scope_close,
    bench_transaction_eval,
    bench_repeated_queries
);
criterion_main!(benches);
