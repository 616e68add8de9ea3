use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use tracing_subscriber::EnvFilter;
use vegasmap::{Accumulator, AdaptiveMap, Grid, Split, SplitMap};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn assert_strictly_increasing(edges: &[f64], min: f64, max: f64) {
    assert_eq!(edges[0], min);
    assert_eq!(edges[edges.len() - 1], max);
    for w in edges.windows(2) {
        assert!(w[0] < w[1], "edges not increasing: {edges:?}");
    }
}

fn peak(x: &[f64]) -> f64 {
    x.iter()
        .map(|xi| (-100.0 * (xi - 0.3).powi(2)).exp())
        .product()
}

fn train(map: &mut AdaptiveMap, rng: &mut Pcg64, n: usize) {
    for _ in 0..n {
        let point = map.sample(rng);
        let value = (peak(&point.x) * point.jacobian).powi(2);
        map.add_training_data(&point.x, value).unwrap();
    }
}

#[test]
fn test_edges_stay_monotonic() {
    init_logging();
    let mut rng = Pcg64::seed_from_u64(11);
    let mut map = AdaptiveMap::from_edges(vec![
        vec![-2.0, -1.0, 0.0, 3.0],
        vec![0.0, 0.5, 0.75, 1.0],
    ])
    .unwrap();
    map.make_uniform(30).unwrap();
    assert_strictly_increasing(map.grid().axis(0).edges(), -2.0, 3.0);
    assert_eq!(map.bins(), 30);

    for alpha in [1.0, 0.5, 0.0, 1.0] {
        train(&mut map, &mut rng, 5000);
        map.adapt(alpha, None).unwrap();
        assert_strictly_increasing(map.grid().axis(0).edges(), -2.0, 3.0);
        assert_strictly_increasing(map.grid().axis(1).edges(), 0.0, 1.0);
    }

    map.init_grid(vec![vec![-2.0, -1.0, 3.0], vec![1.0, 2.0, 4.0]], true)
        .unwrap();
    train(&mut map, &mut rng, 1000);
    map.adapt(1.0, Some(7)).unwrap();
    assert_strictly_increasing(map.grid().axis(0).edges(), -2.0, 3.0);
    assert_strictly_increasing(map.grid().axis(1).edges(), 1.0, 4.0);

    let mut split = SplitMap::new(2, 3).unwrap();
    split.split(Split::Third).unwrap();
    let data: Vec<f64> = (0..split.total_bins()).map(|i| (i % 5) as f64).collect();
    split.adapt(1.0, &data, Split::Quarter).unwrap();
    for dim in 0..2 {
        assert_strictly_increasing(split.edges_of(dim), 0.0, 1.0);
    }
}

#[test]
fn test_forward_inverse_round_trip() {
    let mut rng = Pcg64::seed_from_u64(5);
    let mut map = AdaptiveMap::new(3, 25).unwrap();
    for _ in 0..3 {
        train(&mut map, &mut rng, 5000);
        map.adapt(0.7, None).unwrap();
    }

    for _ in 0..1000 {
        let u: Vec<f64> = (0..3).map(|_| rng.gen()).collect();
        let point = map.map(&u).unwrap();
        let (back, jacobian) = map.invert(&point.x).unwrap();

        assert_relative_eq!(jacobian, point.jacobian, max_relative = 1e-9);
        for (a, b) in back.iter().zip(&u) {
            assert!((a - b).abs() < 1e-12, "{a} vs {b}");
        }
    }
}

#[test]
fn test_uniform_grid_preserves_measure() {
    let mut rng = Pcg64::seed_from_u64(3);
    for n_bins in [1, 2, 4, 8, 16, 64] {
        let map = AdaptiveMap::new(4, n_bins).unwrap();
        for _ in 0..200 {
            assert_eq!(map.sample(&mut rng).jacobian, 1.0);
        }
        assert_eq!(map.jacobian(&[1.0, 0.0, 0.5, 1.0]).unwrap(), 1.0);
    }

    let map = AdaptiveMap::new(2, 50).unwrap();
    for _ in 0..200 {
        assert_relative_eq!(map.sample(&mut rng).jacobian, 1.0, max_relative = 1e-13);
    }
}

#[test]
fn test_mass_concentrates_bins() {
    let mut map = AdaptiveMap::new(2, 10).unwrap();
    for _ in 0..100 {
        map.add_training_data(&[0.55, 0.05], 1.0).unwrap();
    }
    map.adapt(1.0, None).unwrap();

    for (dim, target) in [(0, 0.55), (1, 0.05)] {
        let axis = map.grid().axis(dim);
        assert_strictly_increasing(axis.edges(), 0.0, 1.0);
        let bin = axis.locate(target).unwrap();
        assert!(axis.width(bin) < 0.1);
        for other in (0..axis.n_bins()).filter(|&b| b != bin) {
            assert!(axis.width(bin) <= axis.width(other) + 1e-12);
        }
    }
}

#[test]
fn test_massless_dimension_is_untouched() {
    init_logging();
    let mut map = AdaptiveMap::from_edges(vec![
        vec![0.0, 0.25, 0.5, 0.75, 1.0],
        vec![0.0, 0.1, 0.2, 0.7, 1.0],
    ])
    .unwrap();
    let training = Accumulator::from_parts(
        2,
        4,
        vec![1.0, 2.0, 8.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        vec![1, 1, 1, 1, 2, 0, 1, 1],
    )
    .unwrap();

    map.merge_training(&training).unwrap();
    map.adapt(1.0, None).unwrap();

    assert_eq!(map.grid().axis(1).edges(), &[0.0, 0.1, 0.2, 0.7, 1.0]);
    assert_ne!(map.grid().axis(0).edges(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
}

#[test]
fn test_merged_workers_adapt_like_single_accumulator() {
    let mut rng = Pcg64::seed_from_u64(17);
    let mut single = AdaptiveMap::new(2, 12).unwrap();

    let points: Vec<Vec<f64>> = (0..3000).map(|_| single.sample(&mut rng).x).collect();
    // integer weights keep every partial sum exact
    let values: Vec<f64> = points
        .iter()
        .map(|x| (100.0 * peak(x)).round())
        .collect();

    let mut workers = vec![single.worker_accumulator(); 3];
    for (i, (point, &value)) in points.iter().zip(&values).enumerate() {
        workers[i % 3].fill(single.grid(), point, value).unwrap();
    }
    single.add_training_batch(&points, &values).unwrap();

    let mut forward = single.clone();
    let mut backward = single.clone();
    forward.make_uniform(12).unwrap();
    backward.make_uniform(12).unwrap();
    for worker in &workers {
        forward.merge_training(worker).unwrap();
    }
    for worker in workers.iter().rev() {
        backward.merge_training(worker).unwrap();
    }

    assert_eq!(forward.training(), single.training());
    assert_eq!(backward.training(), single.training());

    single.adapt(0.5, None).unwrap();
    forward.adapt(0.5, None).unwrap();
    backward.adapt(0.5, None).unwrap();
    assert_eq!(forward.grid(), single.grid());
    assert_eq!(backward.grid(), single.grid());

    let a = workers[0].clone() + workers[1].clone();
    let b = workers[1].clone() + workers[0].clone();
    assert_eq!(a, b);
}

#[test]
fn test_one_dimensional_scenario() {
    let mut map = AdaptiveMap::new(1, 4).unwrap();
    for _ in 0..100 {
        map.add_training_data(&[0.1], 10.0).unwrap();
    }
    for x in [0.3, 0.6, 0.9] {
        map.add_training_data(&[x], 1e-6).unwrap();
    }
    map.adapt(1.0, None).unwrap();

    let axis = map.grid().axis(0);
    assert_eq!(axis.n_bins(), 4);
    assert!(axis.width(0) < 0.25, "first bin: {}", axis.width(0));
    assert!(axis.width(3) > 0.25, "last bin: {}", axis.width(3));
    assert_strictly_increasing(axis.edges(), 0.0, 1.0);
}

#[test]
fn test_snapshots_are_shared_between_threads() {
    let map = AdaptiveMap::new(2, 8).unwrap();
    let snapshot = map.snapshot();

    let jacobians: Vec<f64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let grid = &snapshot;
                scope.spawn(move || {
                    let mut x = [0.0; 2];
                    let mut bins = [0; 2];
                    grid.map_into(&[0.125 * i as f64, 0.5], &mut x, &mut bins)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(jacobians.iter().all(|&j| j == 1.0));
    assert_eq!(*snapshot, Grid::uniform(2, 8).unwrap());
}
