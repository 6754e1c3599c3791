//! MBTiles (SQLite) tile source.
//!
//! Tiles are stored in a `tiles(zoom_level, tile_column, tile_row, tile_data)`
//! table with TMS row numbering, i.e. row 0 is the southernmost row.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use crate::buffer::ScratchBuffers;
use crate::error::{DemError, Result};
use crate::pmtiles::{decompress, Compression};
use crate::projection::{tile_x_to_lon, tile_y_to_lat};
use crate::source::{BoundingBox, TileSource};
use crate::tile_id::TileAddress;

const TILE_QUERY: &str =
    "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3";
const MAX_ZOOM_QUERY: &str = "SELECT max(zoom_level) FROM tiles";
const EXTENT_QUERY: &str = "SELECT min(tile_column), max(tile_column), min(tile_row), max(tile_row) \
     FROM tiles WHERE zoom_level = ?1";
const BOUNDS_QUERY: &str = "SELECT value FROM metadata WHERE name = 'bounds'";

/// A read-only MBTiles database.
#[derive(Debug)]
pub struct MbTilesArchive {
    conn: Connection,
    label: String,
    max_zoom: u8,
    bounds: BoundingBox,
}

impl MbTilesArchive {
    /// Open the database at `path` read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DemError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Self::from_connection(conn, path.display().to_string())
    }

    /// Wrap an already open connection.
    ///
    /// Reads the maximum zoom and the bounds: the `bounds` metadata row if
    /// present and well formed, otherwise the tile extent at maximum zoom.
    pub fn from_connection(conn: Connection, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let max_zoom: Option<i64> = conn.query_row(MAX_ZOOM_QUERY, [], |row| row.get(0))?;
        let max_zoom = max_zoom
            .ok_or_else(|| DemError::Format(format!("{label}: no tiles")))
            .and_then(|z| {
                u8::try_from(z)
                    .ok()
                    .filter(|z| *z <= crate::tile_id::MAX_ZOOM)
                    .ok_or_else(|| DemError::Format(format!("{label}: invalid zoom {z}")))
            })?;

        let bounds = match metadata_bounds(&conn)? {
            Some(bounds) => bounds,
            None => tile_extent(&conn, max_zoom)?,
        };

        info!(archive = %label, max_zoom, ?bounds, "opened MBTiles archive");
        Ok(Self {
            conn,
            label,
            max_zoom,
            bounds,
        })
    }
}

fn metadata_bounds(conn: &Connection) -> Result<Option<BoundingBox>> {
    let has_metadata: bool = conn.query_row(
        "SELECT count(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
        [],
        |row| row.get(0),
    )?;
    if !has_metadata {
        return Ok(None);
    }

    let value: Option<String> = conn
        .query_row(BOUNDS_QUERY, [], |row| row.get(0))
        .optional()?;
    let Some(value) = value else {
        return Ok(None);
    };

    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .unwrap_or_default();
    match parts[..] {
        [min_lon, min_lat, max_lon, max_lat] if min_lon < max_lon && min_lat < max_lat => {
            Ok(Some(BoundingBox::new(min_lat, min_lon, max_lat, max_lon)))
        }
        _ => {
            debug!(value = %value, "ignoring malformed bounds metadata");
            Ok(None)
        }
    }
}

fn tile_extent(conn: &Connection, zoom: u8) -> Result<BoundingBox> {
    let (col_min, col_max, row_min, row_max): (u32, u32, u32, u32) =
        conn.query_row(EXTENT_QUERY, [zoom], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
    let last_row = (1u32 << zoom) - 1;
    if row_max > last_row || col_max > last_row {
        return Err(DemError::Format(format!(
            "tile extent {col_max}/{row_max} outside zoom {zoom}"
        )));
    }

    // TMS rows count from the south
    let north_row = last_row - row_max;
    let south_row = last_row - row_min;
    Ok(BoundingBox::new(
        tile_y_to_lat(south_row + 1, zoom),
        tile_x_to_lon(col_min, zoom),
        tile_y_to_lat(north_row, zoom),
        tile_x_to_lon(col_max + 1, zoom),
    ))
}

impl TileSource for MbTilesArchive {
    fn label(&self) -> &str {
        &self.label
    }

    fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    fn fetch_tile<'b>(
        &mut self,
        address: TileAddress,
        buffers: &'b mut ScratchBuffers,
    ) -> Result<Option<&'b [u8]>> {
        let n = 1u64 << address.zoom;
        if u64::from(address.x) >= n || u64::from(address.y) >= n {
            return Err(DemError::InvalidTileAddress {
                zoom: address.zoom,
                x: address.x,
                y: address.y,
            });
        }
        let tms_row = (n - 1 - u64::from(address.y)) as u32;

        let mut stmt = self.conn.prepare_cached(TILE_QUERY)?;
        let blob: Option<Vec<u8>> = stmt
            .query_row(params![address.zoom, address.x, tms_row], |row| row.get(0))
            .optional()?;
        let Some(blob) = blob else {
            return Ok(None);
        };

        buffers.load(&blob)?;
        decompress(buffers, Compression::Unknown).map(Some)
    }
}
