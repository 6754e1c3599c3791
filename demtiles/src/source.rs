//! Backends that hand out raw tile blobs.

use crate::buffer::ScratchBuffers;
use crate::error::Result;
use crate::pmtiles::{from_e7, to_e7};
use crate::tile_id::TileAddress;

/// A geographic bounding box in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum latitude (southern boundary).
    pub min_lat: f64,
    /// Minimum longitude (western boundary).
    pub min_lon: f64,
    /// Maximum latitude (northern boundary).
    pub max_lat: f64,
    /// Maximum longitude (eastern boundary).
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Strict containment, compared in 1e-7 degree fixed point.
    ///
    /// Points on the boundary are outside, so two archives sharing an edge
    /// never both claim it. Non-finite coordinates are never contained.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if !lat.is_finite() || !lon.is_finite() {
            return false;
        }
        let (lat, lon) = (to_e7(lat), to_e7(lon));
        to_e7(self.min_lat) < lat
            && lat < to_e7(self.max_lat)
            && to_e7(self.min_lon) < lon
            && lon < to_e7(self.max_lon)
    }

    /// The box as fixed-point `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn to_e7(&self) -> [i32; 4] {
        [
            to_e7(self.min_lon),
            to_e7(self.min_lat),
            to_e7(self.max_lon),
            to_e7(self.max_lat),
        ]
    }

    /// Inverse of [`BoundingBox::to_e7`].
    pub fn from_e7(e7: [i32; 4]) -> Self {
        Self::new(from_e7(e7[1]), from_e7(e7[0]), from_e7(e7[3]), from_e7(e7[2]))
    }
}

/// A tiled elevation dataset.
///
/// Implementations read the blob for a tile address and return it with any
/// transport compression removed. Pixel decoding is the caller's job, so the
/// same decoder serves every backend.
pub trait TileSource {
    /// Human-readable name, usually the file path.
    fn label(&self) -> &str;

    /// Area covered by the dataset.
    fn bounds(&self) -> BoundingBox;

    /// Zoom level lookups are made at.
    fn max_zoom(&self) -> u8;

    /// Fetch the raw tile blob for `address`.
    ///
    /// Returns `Ok(None)` when the dataset has no tile there. The returned
    /// slice borrows one of `buffers` and is valid until the next call.
    fn fetch_tile<'b>(
        &mut self,
        address: TileAddress,
        buffers: &'b mut ScratchBuffers,
    ) -> Result<Option<&'b [u8]>>;
}
