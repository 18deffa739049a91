//! Benchmarks for filter parsing and predicate compilation.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Value, json};
use sift_query::compiler::{TableHandle, compile};
use sift_query::parser::parse;
use sift_query::registry::{FieldRegistry, FieldSpec, FieldType};
use sift_query::sql::DatabaseType;

fn registry() -> FieldRegistry {
    let mut builder = FieldRegistry::builder("audio_events")
        .primary_key("id")
        .field(FieldSpec::new("id", FieldType::Integer).sortable())
        .field(FieldSpec::new("notes", FieldType::Text).text_search());
    for i in 0..32 {
        builder = builder.field(FieldSpec::new(format!("field_{}", i), FieldType::Integer));
    }
    builder.build().expect("valid registry")
}

/// A flat map with one comparison per field.
fn flat_filter(count: usize) -> Value {
    let mut map = serde_json::Map::new();
    for i in 0..count {
        map.insert(format!("field_{}", i), json!({"gteq": i}));
    }
    Value::Object(map)
}

/// An `or` of `count` equality branches.
fn or_filter(count: usize) -> Value {
    let branches: Vec<Value> = (0..count)
        .map(|i| json!({"field_0": {"eq": i}}))
        .collect();
    json!({ "or": branches })
}

/// Alternating `and`/`or` nesting.
fn nested_filter(depth: usize) -> Value {
    if depth == 0 {
        json!({"notes": {"contains": "owl"}})
    } else {
        json!({
            "and": [
                {"or": [nested_filter(depth - 1), {"field_1": {"eq": depth}}]},
                {"not": {"field_2": {"in": [1, 2, 3]}}}
            ]
        })
    }
}

fn bench_parse(c: &mut Criterion) {
    let registry = registry();
    let mut group = c.benchmark_group("parse");

    for count in [1, 4, 16, 32] {
        let filter = flat_filter(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("flat", count), &filter, |b, filter| {
            b.iter(|| parse(black_box(filter), &registry))
        });
    }

    for count in [2, 8, 32] {
        let filter = or_filter(count);
        group.bench_with_input(BenchmarkId::new("or", count), &filter, |b, filter| {
            b.iter(|| parse(black_box(filter), &registry))
        });
    }

    for depth in [1, 4, 8] {
        let filter = nested_filter(depth);
        group.bench_with_input(BenchmarkId::new("nested", depth), &filter, |b, filter| {
            b.iter(|| parse(black_box(filter), &registry))
        });
    }

    group.finish();
}

fn bench_range(c: &mut Criterion) {
    let registry = registry();
    let from_to = json!({"field_3": {"range": {"from": 100, "to": 200}}});
    let interval = json!({"field_3": {"range": {"interval": "[100,200)"}}});

    c.bench_function("parse_range_from_to", |b| {
        b.iter(|| parse(black_box(&from_to), &registry))
    });
    c.bench_function("parse_range_interval", |b| {
        b.iter(|| parse(black_box(&interval), &registry))
    });
}

fn bench_compile(c: &mut Criterion) {
    let registry = registry();
    let table = TableHandle::new(&registry);
    let mut group = c.benchmark_group("compile");

    for depth in [1, 4, 8] {
        let ast = parse(&nested_filter(depth), &registry).expect("valid filter");
        group.bench_with_input(BenchmarkId::new("nested", depth), &ast, |b, ast| {
            b.iter(|| compile(black_box(ast), &table))
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let registry = registry();
    let table = TableHandle::new(&registry);
    let ast = parse(&flat_filter(16), &registry).expect("valid filter");
    let predicate = compile(&ast, &table).expect("valid predicate");

    let mut group = c.benchmark_group("render");
    for db in [DatabaseType::PostgreSQL, DatabaseType::MySQL, DatabaseType::SQLite] {
        group.bench_with_input(BenchmarkId::new("to_sql", format!("{:?}", db)), &db, |b, db| {
            b.iter(|| predicate.to_sql(black_box(*db)))
        });
    }
    group.bench_function("display", |b| b.iter(|| black_box(&predicate).to_string()));
    group.finish();
}

criterion_group!(benches, bench_parse, bench_range, bench_compile, bench_render);
criterion_main!(benches);
