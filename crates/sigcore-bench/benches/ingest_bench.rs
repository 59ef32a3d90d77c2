//! Ingest-path benchmarks: pulse and frame submission into `CoreContext`.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sigcore::types::{Frame, Pulse};
use sigcore::CoreContext;

fn bench_on_pulse(c: &mut Criterion) {
    let mut group = c.benchmark_group("on_pulse");

    group.bench_function("single", |b| {
        let ctx = CoreContext::default();
        let mut t = 0u32;
        b.iter(|| {
            ctx.on_pulse(Pulse::new((t % 2) as u8, 400, t));
            t = t.wrapping_add(400);
        });
    });

    group.finish();
}

fn bench_on_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("on_frame");
    let sizes: &[usize] = &[4, 16, 64];

    for &len in sizes {
        group.bench_with_input(BenchmarkId::new("payload_len", len), &len, |b, &len| {
            let ctx = CoreContext::default();
            ctx.start_fingerprinting();
            ctx.start_threat_analysis();
            let data = vec![0xAAu8; len];
            let mut t = 0u32;
            b.iter(|| {
                let frame = Frame::new(t, 800, -50, 433_920_000, &data, 0, 0);
                ctx.on_frame(&frame);
                criterion::black_box(&frame);
                t = t.wrapping_add(1000);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_on_pulse, bench_on_frame);
criterion_main!(benches);
