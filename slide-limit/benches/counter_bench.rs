use std::sync::Arc;
use std::sync::Barrier;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use slide_limit::Admission;
use slide_limit::Limit;
use slide_limit::SlidingWindowCounter;

// Ticks advance by 1ms per event, so a 100ms bucket rolls over every 100 events.
fn bench_counter_single(c: &mut Criterion) {
    let counter = SlidingWindowCounter::new(0, Duration::from_millis(100), Duration::from_secs(60))
        .expect("valid counter");
    let mut group = c.benchmark_group("SlidingWindowCounter");

    group.bench_function("increment-same-bucket", |b| {
        b.iter(|| counter.increment(black_box(0), 1))
    });

    let mut now = 0u64;
    group.bench_function("increment-rolling", |b| {
        b.iter(|| {
            now += 1_000_000;
            counter.increment(black_box(now), 1)
        })
    });

    group.bench_function("count-in-window", |b| {
        b.iter(|| black_box(counter.count_in_window(black_box(0), Duration::from_secs(60))))
    });

    group.finish();
}

fn bench_counter_parallel(c: &mut Criterion) {
    let counter = Arc::new(
        SlidingWindowCounter::new(0, Duration::from_millis(100), Duration::from_secs(60))
            .expect("valid counter"),
    );
    let clock = Arc::new(AtomicU64::new(0));
    let mut group = c.benchmark_group("SlidingWindowCounter-Parallel");

    for threads in [2, 4, 8].iter() {
        let num_threads = *threads;
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}-threads", num_threads)),
            &num_threads,
            |b, &n| {
                b.iter_custom(|iters| {
                    let barrier = Arc::new(Barrier::new(n + 1));
                    let mut handles = Vec::with_capacity(n);

                    for _ in 0..n {
                        let counter = Arc::clone(&counter);
                        let clock = Arc::clone(&clock);
                        let bar = Arc::clone(&barrier);
                        let iters_per_thread = iters / n as u64;

                        handles.push(thread::spawn(move || {
                            bar.wait();
                            for _ in 0..iters_per_thread {
                                let now = clock.fetch_add(1_000, Ordering::Relaxed);
                                counter.increment(black_box(now), 1);
                            }
                        }));
                    }

                    barrier.wait();
                    let start = Instant::now();

                    for handle in handles {
                        let _ = handle.join();
                    }

                    start.elapsed()
                });
            },
        );
    }
    group.finish();
}

fn bench_admission(c: &mut Criterion) {
    let admission = Admission::new();
    let limit = Limit::new(1_000_000, Duration::from_secs(60));
    let keys: Vec<String> = (0..1_024).map(|i| format!("client-{i}")).collect();
    let mut group = c.benchmark_group("Admission");

    group.bench_function("single-key", |b| {
        b.iter(|| black_box(admission.check("client-0", &limit)))
    });

    let mut i = 0usize;
    group.bench_function("1024-keys", |b| {
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(admission.check(&keys[i], &limit))
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_counter_single,
    bench_counter_parallel,
    bench_admission
);
criterion_main!(benches);
