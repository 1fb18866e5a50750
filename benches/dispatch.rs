//! Native call dispatch benchmarks
//!
//! Measures adapter dispatch directly and through the interpreter.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use liaison::{encode, try_decode, Interpreter, Registry, Value};

struct Counter {
    count: i64,
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    {
        let mut m = registry.create_or_get("bench", "").unwrap();
        m.register_function("add", |a: i64, b: i64| a + b, "")
            .unwrap()
            .register_function("total", |xs: Vec<f64>| xs.iter().sum::<f64>(), "")
            .unwrap();
        m.register_class::<Counter>("Counter").unwrap();
        m.register_member_function::<Counter, _, _>("increment", |c: &mut Counter| c.count += 1, "")
            .unwrap();
    }
    registry
}

fn started() -> Interpreter {
    let mut interp = Interpreter::new();
    interp.initialize(registry()).unwrap();
    interp.run("import bench").unwrap();
    interp
}

fn bench_marshal(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshal");

    for size in [8usize, 64, 512].iter() {
        let items: Vec<f64> = (0..*size).map(|i| i as f64).collect();
        let value = encode(items.clone());
        group.bench_with_input(BenchmarkId::new("encode_vec", size), &items, |b, items| {
            b.iter(|| encode(black_box(items.clone())))
        });
        group.bench_with_input(BenchmarkId::new("decode_vec", size), &value, |b, value| {
            b.iter(|| try_decode::<Vec<f64>>(black_box(value)))
        });
    }

    group.finish();
}

fn bench_native_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("native_call");
    let mut interp = started();
    let module = interp.import("bench").unwrap();

    group.bench_function("from_host", |b| {
        b.iter(|| interp.call(&module, "add", (black_box(2i64), black_box(3i64))))
    });

    group.bench_function("from_script", |b| {
        b.iter(|| interp.run(black_box("bench.add(2, 3)")))
    });

    let mut counter = Counter { count: 0 };
    let handle = unsafe {
        interp
            .expose("bench", &mut counter as *mut Counter, "counter", None)
            .unwrap()
    };
    group.bench_function("bound_method", |b| {
        b.iter(|| interp.call(&handle, "increment", ()))
    });

    group.finish();
}

fn bench_script_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("script_loop");
    group.sample_size(20);

    for iterations in [10, 100, 1000].iter() {
        let mut interp = started();
        let source = format!(
            "acc = 0\nfor i in range({}):\n    acc = bench.add(acc, i)\nacc",
            iterations
        );
        group.bench_with_input(BenchmarkId::from_parameter(iterations), &source, |b, source| {
            b.iter(|| {
                let result = interp.run(black_box(source));
                assert!(matches!(result, Ok(Value::Int(_))));
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_marshal, bench_native_calls, bench_script_loop);
criterion_main!(benches);
