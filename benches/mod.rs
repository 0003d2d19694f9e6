use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    onep::bench_compose,
    onep::bench_demultiplex,
    onep::bench_deferred_round_trip,
    onep::bench_flush_cycle
);
criterion_main!(benches);
