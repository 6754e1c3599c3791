//! Lookups through the MBTiles backend. Built only with the `mbtiles` feature.

mod common;

use common::*;
use demtiles::projection::{tile_x_to_lon, tile_y_to_lat};
use demtiles::{BoundingBox, DemError, ElevationService, LookupStatus, MbTilesArchive, TileSource};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_database(dir: &Path, bounds: Option<&str>) -> PathBuf {
    let path = dir.join("austria.mbtiles");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);
         CREATE TABLE metadata (name TEXT, value TEXT);",
    )
    .unwrap();
    if let Some(bounds) = bounds {
        conn.execute("INSERT INTO metadata VALUES ('bounds', ?1)", params![bounds])
            .unwrap();
    }
    conn.execute(
        "INSERT INTO tiles VALUES (13, ?1, ?2, ?3)",
        params![STIWOLL_TILE.x, (1u32 << 13) - 1 - STIWOLL_TILE.y, gzip(&stiwoll_png())],
    )
    .unwrap();
    path
}

/// Extent of the single Stiwoll tile the database holds.
fn stiwoll_tile_extent() -> BoundingBox {
    BoundingBox::new(
        tile_y_to_lat(STIWOLL_TILE.y + 1, 13),
        tile_x_to_lon(STIWOLL_TILE.x, 13),
        tile_y_to_lat(STIWOLL_TILE.y, 13),
        tile_x_to_lon(STIWOLL_TILE.x + 1, 13),
    )
}

#[test]
fn test_mbtiles_archive() {
    let dir = TempDir::new().unwrap();
    let path = write_database(dir.path(), Some("9.5,46.37,17.17,49.02"));

    let mut service = ElevationService::builder().archive(&path).build().unwrap();
    let info = service.resolve_elevation(STIWOLL.0, STIWOLL.1);
    assert_eq!(info.status, LookupStatus::Valid);
    assert!((info.elevation - STIWOLL_ELEVATION).abs() < 1e-6);
}

#[test]
fn test_mbtiles_bounds_fall_back_to_tile_extent() {
    let dir = TempDir::new().unwrap();
    let path = write_database(dir.path(), Some("9.5,x,46.37,17.17,49.02"));

    let archive = MbTilesArchive::open(&path).unwrap();
    assert_eq!(archive.bounds(), stiwoll_tile_extent());
}

#[test]
fn test_mbtiles_missing_file() {
    assert!(matches!(
        MbTilesArchive::open("/nonexistent/austria.mbtiles"),
        Err(DemError::FileNotFound { .. })
    ));
}
