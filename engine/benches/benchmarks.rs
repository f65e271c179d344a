//! Performance benchmarks for rowsync-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rowsync_engine::{
    row, ColumnDescriptor, ColumnRef, ConnectionRef, DataType, EngineConfig, FilterExpr,
    InProcessStore, JoinStatement, JoinType, Row, Selector, SyncBatch, VecTable,
};
use std::sync::Arc;

fn create_test_store(size: usize) -> ConnectionRef {
    let users = VecTable::new(
        "users",
        vec![
            ColumnDescriptor::new("id", DataType::Int),
            ColumnDescriptor::new("name", DataType::Text),
            ColumnDescriptor::new("modified", DataType::Int),
        ],
        (0..size as i64)
            .rev()
            .map(|i| row![i, format!("User {}", i), i * 10])
            .collect(),
    )
    .unwrap();
    let orders = VecTable::new(
        "orders",
        vec![
            ColumnDescriptor::new("user_id", DataType::Int),
            ColumnDescriptor::new("total", DataType::Float),
        ],
        // Three orders per even user
        (0..size as i64)
            .filter(|i| i % 2 == 0)
            .flat_map(|i| (0..3).map(move |n| row![i, (n * 10) as f64]))
            .collect(),
    )
    .unwrap();
    Arc::new(
        InProcessStore::new("bench")
            .with_table(users)
            .with_table(orders),
    )
}

fn drain(selector: &Selector) -> usize {
    selector.enumerate_all().unwrap().map(|r| r.unwrap()).count()
}

fn bench_selectors(c: &mut Criterion) {
    let mut group = c.benchmark_group("selectors");
    let store = create_test_store(1000);
    let users = Selector::native(store, "users").unwrap();

    group.bench_function("compose", |b| {
        b.iter(|| {
            users
                .with_filter(black_box(&FilterExpr::gt("id", 10)))
                .unwrap()
                .with_columns(&[ColumnRef::aliased("name", "label"), ColumnRef::new("id")])
                .unwrap()
        })
    });

    group.bench_function("enumerate_projected", |b| {
        let projected = users
            .with_columns(&[ColumnRef::new("name")])
            .unwrap();
        b.iter(|| drain(black_box(&projected)))
    });

    let rows: Vec<Row> = (0..1000i64).map(|i| row![i, i % 7]).collect();
    let memory = Selector::memory(
        vec![
            ColumnDescriptor::new("id", DataType::Int),
            ColumnDescriptor::new("bucket", DataType::Int),
        ],
        rows,
    )
    .unwrap()
    .with_filter(&FilterExpr::eq("bucket", 3))
    .unwrap();
    group.bench_function("memory_filter", |b| b.iter(|| drain(black_box(&memory))));

    group.finish();
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join");

    for size in [100, 1000, 5000].iter() {
        let store = create_test_store(*size);
        let users = Selector::native(store.clone(), "users").unwrap();
        let orders = Selector::native(store, "orders").unwrap();
        let statements = [JoinStatement::new("id", "user_id")];

        for join_type in [JoinType::Inner, JoinType::Left] {
            let joined = users
                .apply_join(&orders, Some(join_type), &statements)
                .unwrap();
            let name = format!("{:?}", join_type).to_lowercase();
            group.bench_with_input(BenchmarkId::new(name, size), &joined, |b, joined| {
                b.iter(|| drain(black_box(joined)))
            });
        }
    }

    group.finish();
}

fn bench_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync");
    let config = EngineConfig::default();

    for size in [100, 1000, 5000].iter() {
        let store = create_test_store(*size);
        let users = Selector::native(store, "users").unwrap();
        let since = (*size as i64) * 5;

        group.bench_with_input(BenchmarkId::new("timestamp_pages", size), size, |b, _| {
            b.iter(|| {
                let mut batch = SyncBatch::timestamp(&users, "modified", black_box(since)).unwrap();
                let mut pages = 0;
                loop {
                    let page = batch.next_page(Some(100), &config).unwrap();
                    pages += 1;
                    if !page.has_more {
                        break;
                    }
                }
                pages
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_selectors, bench_join, bench_sync);
criterion_main!(benches);
