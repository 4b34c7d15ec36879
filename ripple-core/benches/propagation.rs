//! Propagation benchmarks: notify fan-out and batched flushing.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use ripple_core::reactive::{Computation, Computed, Mode, Runtime, Signal};

fn fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify_fan_out");
    for subscribers in [1usize, 16, 256] {
        group.bench_with_input(BenchmarkId::new("immediate", subscribers), &subscribers, |b, &n| {
            let signal = Signal::new(0u64);
            let computations: Vec<_> = (0..n)
                .map(|_| {
                    let source = signal.clone();
                    Computation::builder(move || source.get() + 1)
                        .mode(Mode::render().immediate())
                        .build()
                        .unwrap()
                })
                .collect();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                signal.set(black_box(next)).unwrap();
            });
            drop(computations);
        });

        group.bench_with_input(BenchmarkId::new("batched", subscribers), &subscribers, |b, &n| {
            let signal = Signal::new(0u64);
            let computations: Vec<_> = (0..n)
                .map(|_| {
                    let source = signal.clone();
                    Computation::builder(move || source.get() + 1)
                        .mode(Mode::render())
                        .build()
                        .unwrap()
                })
                .collect();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                signal.set(black_box(next)).unwrap();
                Runtime::flush().unwrap()
            });
            drop(computations);
        });
    }
    group.finish();
}

fn computed_chain(c: &mut Criterion) {
    c.bench_function("computed_chain_depth_32", |b| {
        let base = Signal::new(0u64);
        let source = base.clone();
        let mut tip = Computed::new(move || source.get());
        for _ in 0..32 {
            let previous = tip.clone();
            tip = Computed::try_new(move || Ok(previous.get()? + 1));
        }

        let mut next = 0u64;
        b.iter(|| {
            next += 1;
            base.set(next).unwrap();
            black_box(tip.get().unwrap())
        });
    });
}

criterion_group!(benches, fan_out, computed_chain);
criterion_main!(benches);
