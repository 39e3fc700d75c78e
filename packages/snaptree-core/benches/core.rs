use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use snaptree_core::{Engine, Value};
use snaptree_test_support::{push_price, Stock};

fn build_state(engine: &Engine, n: usize) -> Value {
    let stocks = (0..n).map(|i| {
        let key = format!("S{i}");
        let stock = Stock::new(&key, "bench", vec![100.0]);
        (key, Value::record(stock))
    });
    engine
        .freeze(Value::map([
            ("stocks", Value::map(stocks)),
            ("history", Value::seq((0..n as i64).collect::<Vec<_>>())),
        ]))
        .unwrap()
}

fn bench_produce(c: &mut Criterion) {
    let engine = Engine::default();
    let mut group = c.benchmark_group("produce_single_record");
    for &n in &[10usize, 100, 1_000] {
        let state = build_state(&engine, n);
        let path = snaptree_core::path!["stocks", "S0"];
        // One record touched per produce; the rest of the tree is shared.
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &_n| {
            b.iter(|| {
                let next = engine
                    .produce(&state, |d| push_price(d, &path, 101.0))
                    .unwrap();
                criterion::black_box(next);
            })
        });
    }
    group.finish();
}

fn bench_apply(c: &mut Criterion) {
    let engine = Engine::default();
    let mut group = c.benchmark_group("apply_recorded_patches");
    for &n in &[10usize, 100, 1_000] {
        let state = build_state(&engine, n);
        let produced = engine
            .produce_with_patches(&state, |d| {
                let history = d.child("history")?;
                for i in 0..n {
                    history.set(i, (i as i64) * 2)?;
                }
                Ok::<_, snaptree_core::Error>(())
            })
            .unwrap();
        group.throughput(Throughput::Elements(produced.patches.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &_n| {
            b.iter(|| {
                let next = engine.apply_patches(&state, &produced.patches).unwrap();
                criterion::black_box(next);
            })
        });
    }
    group.finish();
}

fn bench_freeze(c: &mut Criterion) {
    let engine = Engine::default();
    let mut group = c.benchmark_group("freeze_fresh_tree");
    for &n in &[10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| criterion::black_box(build_state(&engine, n)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_produce, bench_apply, bench_freeze);
criterion_main!(benches);
