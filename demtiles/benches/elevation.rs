use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use demtiles::projection::tile_x_to_lon;
use demtiles::{ElevationService, TileAddress};

#[path = "../tests/common/mod.rs"]
mod common;

use common::{austria, png_tile, ArchiveBuilder, STIWOLL};

/// A row of 16 gradient tiles around Stiwoll, split into leaf directories.
fn create_archive(dir: &std::path::Path) -> std::path::PathBuf {
    let mut builder = ArchiveBuilder::new(austria()).leaf_size(4);
    for i in 0..16 {
        builder = builder.tile(
            TileAddress::new(13, 4436 + i, 2877),
            png_tile(256, 200.0 + 50.0 * i as f64, &[((27, 6), 865.8)]),
        );
    }
    builder.write(dir, "bench.pmtiles")
}

fn row_coords(count: usize) -> Vec<(f64, f64)> {
    (0..count)
        .map(|i| {
            let x = 4436 + (i % 16) as u32;
            (STIWOLL.0, tile_x_to_lon(x, 13) + 0.02)
        })
        .collect()
}

fn bench_single_cached(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let path = create_archive(tmp.path());
    let mut service = ElevationService::builder().archive(&path).build().unwrap();

    // Warm the cache
    let _ = service.get_elevation(STIWOLL.0, STIWOLL.1);

    c.bench_function("single_cached", |b| {
        b.iter(|| {
            black_box(service.get_elevation(black_box(STIWOLL.0), black_box(STIWOLL.1)));
        });
    });
}

fn bench_single_cold(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let path = create_archive(tmp.path());
    let mut service = ElevationService::builder().archive(&path).build().unwrap();

    c.bench_function("single_cold", |b| {
        b.iter(|| {
            service.clear_cache();
            black_box(service.get_elevation(black_box(STIWOLL.0), black_box(STIWOLL.1)));
        });
    });
}

fn bench_batch_multi_tile(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let path = create_archive(tmp.path());
    let mut service = ElevationService::builder().archive(&path).build().unwrap();

    // Spread over 16 tiles with the default cache of 5
    let coords = row_coords(1000);

    c.bench_function("batch_1000_multi_tile", |b| {
        b.iter(|| {
            black_box(service.get_elevations_batch(black_box(&coords), 0.0));
        });
    });
}

fn bench_scan_multi_tile(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let path = create_archive(tmp.path());
    let mut service = ElevationService::builder().archive(&path).build().unwrap();
    let coords = row_coords(1000);

    c.bench_function("scan_1000_multi_tile", |b| {
        b.iter(|| {
            for (lat, lon) in &coords {
                black_box(service.get_elevation(*lat, *lon));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_single_cached,
    bench_single_cold,
    bench_batch_multi_tile,
    bench_scan_multi_tile,
);
criterion_main!(benches);
