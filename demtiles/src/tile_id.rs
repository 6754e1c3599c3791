//! Tile addresses, PMTiles tile ids and composite cache keys.
//!
//! PMTiles numbers every tile of the pyramid with a single `u64`: all tiles of
//! lower zoom levels come first (`(4^z - 1) / 3` of them), and tiles within a
//! zoom level follow a Hilbert curve. Directory entries are keyed by this id.

use std::fmt;

use crate::error::{DemError, Result};

/// Highest zoom level whose tile ids fit in a `u64`.
pub const MAX_ZOOM: u8 = 31;

/// A slippy tile: zoom level plus column and row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileAddress {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// PMTiles tile id of this address.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::InvalidTileAddress`] if the zoom level exceeds
    /// [`MAX_ZOOM`] or `x`/`y` fall outside `0..2^zoom`.
    ///
    /// # Examples
    ///
    /// ```
    /// use demtiles::TileAddress;
    ///
    /// assert_eq!(TileAddress::new(0, 0, 0).tile_id().unwrap(), 0);
    /// assert_eq!(TileAddress::new(1, 1, 0).tile_id().unwrap(), 4);
    /// assert_eq!(TileAddress::new(13, 4442, 2877).tile_id().unwrap(), 79295500);
    /// ```
    pub fn tile_id(&self) -> Result<u64> {
        if self.zoom > MAX_ZOOM {
            return Err(self.invalid());
        }
        let n = 1u64 << self.zoom;
        let (mut x, mut y) = (self.x as u64, self.y as u64);
        if x >= n || y >= n {
            return Err(self.invalid());
        }

        let mut d = 0u64;
        let mut s = n / 2;
        while s > 0 {
            let rx = u64::from(x & s != 0);
            let ry = u64::from(y & s != 0);
            d += s * s * ((3 * rx) ^ ry);
            x &= s - 1;
            y &= s - 1;
            rotate(s, &mut x, &mut y, rx, ry);
            s /= 2;
        }

        Ok(zoom_base_id(self.zoom) + d)
    }

    /// Inverse of [`TileAddress::tile_id`].
    ///
    /// # Errors
    ///
    /// Returns [`DemError::Format`] if the id lies beyond zoom level [`MAX_ZOOM`].
    pub fn from_tile_id(tile_id: u64) -> Result<Self> {
        let mut zoom = 0u8;
        while zoom < MAX_ZOOM && tile_id >= zoom_base_id(zoom + 1) {
            zoom += 1;
        }
        if zoom == MAX_ZOOM && tile_id - zoom_base_id(zoom) >= 1u64 << (2 * zoom as u32) {
            return Err(DemError::Format(format!("tile id {tile_id} out of range")));
        }

        let n = 1u64 << zoom;
        let mut d = tile_id - zoom_base_id(zoom);
        let (mut x, mut y) = (0u64, 0u64);
        let mut s = 1u64;
        while s < n {
            let rx = 1 & (d / 2);
            let ry = 1 & (d ^ rx);
            rotate(s, &mut x, &mut y, rx, ry);
            x += s * rx;
            y += s * ry;
            d /= 4;
            s *= 2;
        }

        Ok(Self::new(zoom, x as u32, y as u32))
    }

    fn invalid(&self) -> DemError {
        DemError::InvalidTileAddress {
            zoom: self.zoom,
            x: self.x,
            y: self.y,
        }
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Number of tiles in all zoom levels below `zoom`.
fn zoom_base_id(zoom: u8) -> u64 {
    ((1u64 << (2 * zoom as u32)) - 1) / 3
}

fn rotate(s: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = s - 1 - *x;
            *y = s - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

/// Identifies a decoded tile across all registered archives.
///
/// Packs `{archive: 16 bits, x: 16 bits, y: 16 bits, zoom: 16 bits}` into a
/// `u64`, archive in the low bits. `x` and `y` are truncated to 16 bits, so
/// keys are only unique up to zoom level 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn new(archive: u16, address: TileAddress) -> Self {
        let key = u64::from(archive)
            | u64::from(address.x as u16) << 16
            | u64::from(address.y as u16) << 32
            | u64::from(address.zoom) << 48;
        Self(key)
    }

    /// Index of the archive the tile came from.
    pub fn archive(&self) -> u16 {
        self.0 as u16
    }

    /// Tile address, with `x` and `y` as stored (truncated to 16 bits).
    pub fn address(&self) -> TileAddress {
        TileAddress::new(
            (self.0 >> 48) as u8,
            u32::from((self.0 >> 16) as u16),
            u32::from((self.0 >> 32) as u16),
        )
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dem={} {}", self.archive(), self.address())
    }
}
