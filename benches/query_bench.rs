use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use osmix::{BBox, Store};

/// A `size` x `size` grid of nodes one arc-minute apart, with a way running
/// along every row, finalized with spatial indexes built.
fn grid_store(size: i64) -> Store {
    let mut store = Store::new("grid");
    let step = 1.0 / 60.0;

    for row in 0..size {
        for col in 0..size {
            let id = row * size + col + 1;
            let lon = col as f64 * step;
            let lat = row as f64 * step;
            store.add_node(id, lon, lat, &[("grid", "node")]);
        }
    }

    for row in 0..size {
        let refs: Vec<i64> = (0..size).map(|col| row * size + col + 1).collect();
        store.add_way(row + 1, &refs, &[("highway", "residential")]);
    }

    store.finalize(true);
    store
}

fn bench_node_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_spatial_queries");

    for &size in &[32i64, 128, 512] {
        let store = grid_store(size);
        let center = (size as f64 / 2.0) / 60.0;

        group.bench_with_input(BenchmarkId::new("within_bbox", size), &store, |b, store| {
            let bbox = BBox::new(center - 0.1, center - 0.1, center + 0.1, center + 0.1);
            b.iter(|| store.nodes().find_indexes_within_bbox(&bbox))
        });

        group.bench_with_input(BenchmarkId::new("within_radius_km", size), &store, |b, store| {
            b.iter(|| store.nodes().find_indexes_within_radius_km(center, center, 2.0))
        });
    }

    group.finish();
}

fn bench_way_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("way_spatial_queries");

    for &size in &[32i64, 128, 512] {
        let store = grid_store(size);
        let center = (size as f64 / 2.0) / 60.0;

        group.bench_with_input(BenchmarkId::new("intersects", size), &store, |b, store| {
            let bbox = BBox::new(center - 0.1, center - 0.1, center + 0.1, center + 0.1);
            b.iter(|| store.ways().intersects(&bbox, None))
        });

        group.bench_with_input(BenchmarkId::new("neighbors", size), &store, |b, store| {
            b.iter(|| store.ways().neighbors(center, center, Some(10), None))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_node_queries, bench_way_queries);
criterion_main!(benches);
