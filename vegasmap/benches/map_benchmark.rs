use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use wide::f64x4;

use vegasmap::{AdaptiveMap, Grid};

const DIMS: usize = 4;
const N_POINTS: usize = 10_000;

fn peaked_grid() -> Grid {
    let edges = (0..DIMS)
        .map(|_| (0..=50).map(|i| (i as f64 / 50.0).powi(2)).collect())
        .collect();
    Grid::from_edges(edges).unwrap()
}

fn map_benchmark(c: &mut Criterion) {
    let grid = peaked_grid();
    let mut rng = Pcg64::seed_from_u64(1234);
    let us: Vec<f64> = (0..N_POINTS * DIMS).map(|_| rng.gen()).collect();

    let mut group = c.benchmark_group("Forward map 4D");

    group.bench_function("Scalar", |b| {
        let mut x = vec![0.0; DIMS];
        let mut bins = vec![0; DIMS];
        b.iter(|| {
            let mut total = 0.0;
            for u in us.chunks_exact(DIMS) {
                total += grid.map_into(black_box(u), &mut x, &mut bins);
            }
            total
        })
    });

    group.bench_function("SIMD", |b| {
        let packets: Vec<[f64x4; DIMS]> = us
            .chunks_exact(4 * DIMS)
            .map(|chunk| {
                std::array::from_fn(|d| {
                    f64x4::from([chunk[d], chunk[DIMS + d], chunk[2 * DIMS + d], chunk[3 * DIMS + d]])
                })
            })
            .collect();
        let mut x = [f64x4::splat(0.0); DIMS];
        b.iter(|| {
            let mut total = f64x4::splat(0.0);
            for packet in &packets {
                total = total + grid.map_packet(black_box(packet), &mut x);
            }
            total.reduce_add()
        })
    });
    group.finish();

    let mut group2 = c.benchmark_group("Adaptation 4D");
    let mut trained = AdaptiveMap::from_grid(grid.clone());
    for u in us.chunks_exact(DIMS) {
        let point = trained.map(u).unwrap();
        let value = (point.x.iter().sum::<f64>() * point.jacobian).powi(2);
        trained.add_training_data(&point.x, value).unwrap();
    }

    group2.bench_function("adapt", |b| {
        b.iter(|| {
            let mut map = trained.clone();
            map.adapt(black_box(0.5), None).unwrap();
            map
        })
    });
    group2.finish();
}

criterion_group!(benches, map_benchmark);
criterion_main!(benches);
