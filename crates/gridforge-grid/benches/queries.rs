use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gridforge_grid::{
    trace_cells, trace_lines_par, BoundingArea, GridWorld, Vector3d, WorldConfig,
};

fn tiled_world() -> GridWorld {
    let mut world = GridWorld::with_config(WorldConfig::default()).unwrap();
    for tx in 0..8 {
        for tz in 0..8 {
            let min = Vector3d::from_ints(tx * 32, 0, tz * 32);
            let max = Vector3d::from_ints(tx * 32 + 31, 7, tz * 32 + 31);
            world.add_partition(BoundingArea::new(min, max), 0).unwrap();
        }
    }
    world
}

fn bench_resolve(c: &mut Criterion) {
    let world = tiled_world();
    let points: Vec<_> = (0..1024)
        .map(|i| Vector3d::from_f64(f64::from(i % 256) + 0.5, 3.5, f64::from(i / 4) + 0.25))
        .collect();
    c.bench_function("resolve_1024", |b| {
        b.iter(|| {
            for &p in &points {
                black_box(world.resolve(black_box(p)).ok());
            }
        })
    });
}

fn bench_trace(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace");
    let world = tiled_world();
    let start = Vector3d::from_f64(0.5, 0.5, 0.5);
    let end = Vector3d::from_f64(250.3, 6.7, 190.1);
    group.bench_function("diagonal_across_tiles", |b| {
        b.iter(|| black_box(trace_cells(&world, black_box(start), black_box(end))))
    });

    let segments: Vec<_> = (0..256)
        .map(|i| {
            (
                Vector3d::from_ints(0, 1, i),
                Vector3d::from_ints(255, 6, 255 - i),
            )
        })
        .collect();
    group.bench_function("batch_256_par", |b| {
        b.iter(|| black_box(trace_lines_par(&world, &segments)))
    });
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_trace);
criterion_main!(benches);
