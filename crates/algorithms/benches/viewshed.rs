//! Benchmarks for the viewshed kernel and the count reduction

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cumview_algorithms::statistics::count_defined;
use cumview_algorithms::terrain::{viewshed, ViewshedParams};
use cumview_core::{GeoTransform, Raster};

fn create_dem(size: usize) -> Raster<f64> {
    let mut dem = Raster::new(size, size);
    dem.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));

    for row in 0..size {
        for col in 0..size {
            let base = ((row as f64) * 0.05).sin() * 20.0 + ((col as f64) * 0.03).cos() * 15.0;
            let variation = ((row * 7 + col * 13) % 100) as f64 / 10.0;
            dem.set(row, col, base + variation).unwrap();
        }
    }
    dem
}

fn bench_viewshed(c: &mut Criterion) {
    let mut group = c.benchmark_group("viewshed");

    for size in [256, 512, 1024].iter() {
        let dem = create_dem(*size);
        let params = ViewshedParams {
            observer_row: size / 2,
            observer_col: size / 2,
            ..Default::default()
        };

        group.bench_with_input(BenchmarkId::new("unbounded", size), size, |b, _| {
            b.iter(|| viewshed(black_box(&dem), params.clone()).unwrap())
        });

        let bounded = ViewshedParams {
            max_distance: 100.0,
            ..params.clone()
        };
        group.bench_with_input(BenchmarkId::new("max_distance_100", size), size, |b, _| {
            b.iter(|| viewshed(black_box(&dem), bounded.clone()).unwrap())
        });
    }

    group.finish();
}

fn bench_count(c: &mut Criterion) {
    let dem = create_dem(512);
    let grid = dem.grid();
    let sheds: Vec<Raster<u8>> = (0..16)
        .map(|i| {
            let params = ViewshedParams {
                observer_row: 32 * i,
                observer_col: 32 * i,
                max_distance: 150.0,
                ..Default::default()
            };
            viewshed(&dem, params).unwrap()
        })
        .collect();
    let inputs: Vec<&Raster<u8>> = sheds.iter().collect();

    c.bench_function("count_defined_16x512", |b| {
        b.iter(|| count_defined(black_box(&inputs), &grid).unwrap())
    });
}

criterion_group!(benches, bench_viewshed, bench_count);
criterion_main!(benches);
