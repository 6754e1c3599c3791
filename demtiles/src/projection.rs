//! Web Mercator projection between geocoordinates and slippy tiles.
//!
//! All functions are pure. Latitudes beyond [`MAX_LATITUDE`] have no Web
//! Mercator row; [`lat_lon_to_tile`] clamps them onto the edge tiles and
//! rejecting them is up to the caller.

use std::f64::consts::PI;

/// Northern and southern limit of the Web Mercator projection in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Default edge length of a slippy tile in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Ground resolution at the equator for zoom 0, in meters per pixel.
const EQUATOR_RESOLUTION: f64 = 156543.03;

/// A coordinate resolved to a tile and a pixel inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelOffset {
    pub tile_x: u32,
    pub tile_y: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Ground resolution in meters per pixel at `lat` for `zoom`.
///
/// # Examples
///
/// ```
/// use demtiles::projection::resolution;
///
/// assert!((resolution(0.0, 0) - 156543.03).abs() < 1e-6);
/// assert!((resolution(60.0, 1) - 39135.7575).abs() < 1e-3);
/// ```
pub fn resolution(lat: f64, zoom: u8) -> f64 {
    EQUATOR_RESOLUTION * lat.to_radians().cos() / 2f64.powi(zoom as i32)
}

/// Project a coordinate to global pixel coordinates at `zoom`.
///
/// `x` grows eastwards from the antimeridian, `y` grows southwards from the
/// northern Mercator limit.
pub fn lat_lon_to_pixel(lat: f64, lon: f64, zoom: u8, tile_size: u32) -> (f64, f64) {
    let world = 2f64.powi(zoom as i32) * tile_size as f64;
    let lat_rad = lat.to_radians();
    let x = (lon + 180.0) / 360.0 * world;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * world;
    (x, y)
}

/// Tile column and row containing a coordinate at `zoom`.
///
/// Both are clamped to `0..2^zoom`, so the antimeridian at +180° and
/// latitudes past [`MAX_LATITUDE`] land on the edge tiles.
pub fn lat_lon_to_tile(lat: f64, lon: f64, zoom: u8, tile_size: u32) -> (u32, u32) {
    let (x, y) = lat_lon_to_pixel(lat, lon, zoom, tile_size);
    let size = tile_size as f64;
    let last = ((1u64 << zoom.min(32)) - 1) as u32;
    (((x / size) as u32).min(last), ((y / size) as u32).min(last))
}

/// Tile address plus the rounded pixel offset inside that tile.
///
/// The offset is clamped to `tile_size - 1`, so a coordinate that rounds
/// onto the next tile's first pixel samples this tile's last one.
///
/// # Examples
///
/// ```
/// use demtiles::projection::pixel_offset;
///
/// let p = pixel_offset(47.12925176802318, 15.209778656353123, 13, 256);
/// assert_eq!((p.tile_x, p.tile_y), (4442, 2877));
/// assert_eq!((p.offset_x, p.offset_y), (27, 6));
/// ```
pub fn pixel_offset(lat: f64, lon: f64, zoom: u8, tile_size: u32) -> PixelOffset {
    let (pixel_x, pixel_y) = lat_lon_to_pixel(lat, lon, zoom, tile_size);
    let (tile_x, tile_y) = lat_lon_to_tile(lat, lon, zoom, tile_size);
    let size = tile_size as f64;
    let max = tile_size.saturating_sub(1);

    let offset_x = (pixel_x - tile_x as f64 * size).round().max(0.0) as u32;
    let offset_y = (pixel_y - tile_y as f64 * size).round().max(0.0) as u32;

    PixelOffset {
        tile_x,
        tile_y,
        offset_x: offset_x.min(max),
        offset_y: offset_y.min(max),
    }
}

/// Longitude of the western edge of tile column `x`.
pub fn tile_x_to_lon(x: u32, zoom: u8) -> f64 {
    x as f64 / 2f64.powi(zoom as i32) * 360.0 - 180.0
}

/// Latitude of the northern edge of tile row `y`.
pub fn tile_y_to_lat(y: u32, zoom: u8) -> f64 {
    let n = PI - 2.0 * PI * y as f64 / 2f64.powi(zoom as i32);
    n.sinh().atan().to_degrees()
}
