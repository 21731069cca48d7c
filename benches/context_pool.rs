use brrtcontext::app::App;
use brrtcontext::context::{handler, Context, ContextPool};
use brrtcontext::server::Request;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

/// Acquire/release on a warm pool (baseline)
fn bench_acquire_release(c: &mut Criterion) {
    let pool = ContextPool::new(App::builder().build(), 64);
    pool.release(pool.acquire());
    c.bench_function("pool_acquire_release", |b| {
        b.iter(|| {
            let mut ctx = pool.acquire();
            ctx.set("user", 42u64);
            pool.release(black_box(ctx));
        });
    });
}

/// Full route dispatch by chain length
fn bench_route_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_dispatch");
    let app = App::builder().build();
    for len in [1, 4, 16] {
        let chain = (0..len)
            .map(|_| handler(|ctx: &mut Context| ctx.next()))
            .collect();
        let route = app.route("bench", chain);
        group.bench_with_input(BenchmarkId::new("handlers", len), &route, |b, route| {
            b.iter(|| route.serve(black_box(Request::default())));
        });
    }
    group.finish();
}

/// Dispatch from several threads sharing one route pool (contention)
fn bench_concurrent_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_dispatch");
    group.sample_size(10);
    let app = App::builder().build();
    let route = Arc::new(app.route(
        "bench",
        vec![handler(|ctx: &mut Context| {
            ctx.response.write(b"ok");
        })],
    ));

    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let route = Arc::clone(&route);
                        thread::spawn(move || {
                            for _ in 0..1000 {
                                black_box(route.serve(Request::default()));
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_route_dispatch,
    bench_concurrent_dispatch
);
criterion_main!(benches);
