//! Planner and query service benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use queryplane_core::{
    AndPredicate, BTreeIndex, FieldPredicate, FnPredicate, Index, IndexScope, Predicate,
    QueryPlanner, QueryService, RangeDescriptor, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

fn value_of(record: &u64) -> Option<Value> {
    Some(Value::Int64((*record % 1000) as i64))
}

fn parity_of(record: &u64) -> Option<Value> {
    Some(Value::Bool(record % 2 == 0))
}

fn build_indexes(size: u64) -> (Vec<u64>, HashMap<String, Box<dyn Index<u64>>>) {
    let records: Vec<u64> = (0..size).collect();
    let mut value = BTreeIndex::new("value");
    let mut parity = BTreeIndex::new("parity");
    for record in &records {
        value.insert((record % 1000) as i64, *record);
        parity.insert(if record % 2 == 0 { 1 } else { -1 }, *record);
    }

    let mut indexes: HashMap<String, Box<dyn Index<u64>>> = HashMap::new();
    indexes.insert("value".to_string(), Box::new(value));
    indexes.insert("parity".to_string(), Box::new(parity));
    (records, indexes)
}

fn bench_planner(c: &mut Criterion) {
    let mut group = c.benchmark_group("planner");
    let planner = QueryPlanner::new();

    for size in [1_000u64, 10_000, 100_000] {
        let (records, indexes) = build_indexes(size);

        let equal = FieldPredicate::equal("value", 42, value_of);
        group.bench_with_input(BenchmarkId::new("equal", size), &size, |b, _| {
            b.iter(|| planner.plan(records.clone(), &indexes, black_box(&equal)));
        });

        let between = FieldPredicate::range("value", RangeDescriptor::between(100, 200), value_of);
        group.bench_with_input(BenchmarkId::new("between", size), &size, |b, _| {
            b.iter(|| planner.plan(records.clone(), &indexes, black_box(&between)));
        });

        let intersect = AndPredicate::new(vec![
            Arc::new(FieldPredicate::range(
                "value",
                RangeDescriptor::less(500),
                value_of,
            )) as Arc<dyn Predicate<u64>>,
            Arc::new(FieldPredicate::equal("parity", true, parity_of)),
        ]);
        group.bench_with_input(BenchmarkId::new("intersect", size), &size, |b, _| {
            b.iter(|| planner.plan(records.clone(), &indexes, black_box(&intersect)));
        });

        let scan = FnPredicate::new(|record: &u64| record % 7 == 0);
        group.bench_with_input(BenchmarkId::new("full_scan", size), &size, |b, _| {
            b.iter(|| planner.plan(records.clone(), &indexes, black_box(&scan)));
        });
    }

    group.finish();
}

fn bench_service(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_service");

    let service: QueryService<u64> = QueryService::start_default("bench-node").unwrap();
    let index = service.register_index(BTreeIndex::new("value")).unwrap();
    let scope = IndexScope::new().with("value", index);
    for record in 0..10_000u64 {
        service
            .enqueue_index_insert(index, (record % 1000) as i64, record)
            .unwrap();
    }

    group.bench_function("enqueue_insert", |b| {
        let mut record = 10_000u64;
        b.iter(|| {
            record += 1;
            service
                .enqueue_index_insert(index, black_box(5_000i64), record)
                .unwrap();
        });
    });

    let predicate: Arc<dyn Predicate<u64>> =
        Arc::new(FieldPredicate::equal("value", 42, value_of));
    group.bench_function("evaluate_query", |b| {
        b.iter(|| service.evaluate_query(Vec::new(), &scope, Arc::clone(&predicate)));
    });

    group.bench_function("concurrent_queries", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let service = service.clone();
                    let scope = scope.clone();
                    let predicate = Arc::clone(&predicate);
                    thread::spawn(move || {
                        for _ in 0..25 {
                            service.evaluate_query(Vec::new(), &scope, Arc::clone(&predicate));
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_planner, bench_service);
criterion_main!(benches);
