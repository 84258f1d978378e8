use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use libwfst::cache::CacheOptions;
use libwfst::prelude::*;

type W = TropicalWeight;

// A left-to-right lattice: `depth` layers, `width` parallel arcs per
// layer, labels drawn from a small alphabet so compositions stay dense.
fn lattice(depth: usize, width: usize, alphabet: usize) -> VectorFst<W> {
    let mut fst = VectorFst::new();
    let mut prev = fst.add_state();
    fst.set_start(prev);
    for layer in 0..depth {
        let next = fst.add_state();
        for slot in 0..width {
            let label = 1 + (layer * width + slot) % alphabet;
            fst.add_arc(
                prev,
                Arc::new(label, label, W::new(slot as f32 * 0.25), next),
            );
        }
        prev = next;
    }
    fst.set_final(prev, W::one());
    fst
}

fn bench_eager_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("eager_compose");

    for &depth in &[8usize, 32, 128] {
        let a = lattice(depth, 4, 5);
        let b = lattice(depth, 4, 5);
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("depth={depth}")),
            &depth,
            |bencher, _| {
                bencher.iter(|| {
                    let result = compose(black_box(a.clone()), black_box(b.clone()));
                    black_box(result.num_states())
                });
            },
        );
    }

    group.finish();
}

fn bench_sorted_vs_lookup_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher_kind");

    let depth = 64;
    let unsorted_a = lattice(depth, 6, 7);
    let unsorted_b = lattice(depth, 6, 7);
    let mut sorted_a = unsorted_a.clone();
    let mut sorted_b = unsorted_b.clone();
    arc_sort(&mut sorted_a, ArcSortType::OLabel);
    arc_sort(&mut sorted_b, ArcSortType::ILabel);

    group.bench_function("lookup", |bencher| {
        bencher.iter(|| {
            black_box(compose(
                black_box(unsorted_a.clone()),
                black_box(unsorted_b.clone()),
            ))
        });
    });
    group.bench_function("sorted", |bencher| {
        bencher.iter(|| {
            black_box(compose(
                black_box(sorted_a.clone()),
                black_box(sorted_b.clone()),
            ))
        });
    });

    group.finish();
}

fn bench_delayed_traversal_under_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("delayed_eviction");

    let a = lattice(64, 4, 5);
    let b = lattice(64, 4, 5);

    for (name, gc_limit) in [("unbounded", usize::MAX), ("last_state_only", 0)] {
        group.bench_function(name, |bencher| {
            bencher.iter(|| {
                let composed = ComposeFst::with_config(
                    a.clone(),
                    b.clone(),
                    ComposeConfig {
                        cache: CacheOptions { gc: true, gc_limit, ..Default::default() },
                        ..Default::default()
                    },
                );
                let mut total_arcs = 0;
                let mut state = 0;
                if composed.start().is_some() {
                    while state < composed.num_known_states() {
                        total_arcs += composed.arcs(state).len();
                        state += 1;
                    }
                }
                black_box(total_arcs)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_eager_compose,
    bench_sorted_vs_lookup_matching,
    bench_delayed_traversal_under_eviction
);
criterion_main!(benches);
