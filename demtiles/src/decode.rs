//! Tile blob decoding into flat RGB rasters.
//!
//! The format is sniffed from magic bytes. PNG rows are pulled one at a time
//! from the `png` decoder; lossless WebP is decoded with `image-webp`. Both
//! write through a [`RasterBuilder`], which allocates the raster once the
//! dimensions are known.

use std::io::Cursor;

use image_webp::WebPDecoder;
use png::{ColorType, Transformations};

use crate::error::{DemError, Result};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Elevation of RGB `(0, 0, 0)` in meters.
pub const ELEVATION_BASE: f64 = -10000.0;
/// Meters per terrain-RGB step.
pub const ELEVATION_STEP: f64 = 0.1;

/// Pixel codec of a tile blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    Png,
    WebP,
}

/// Identify the codec from the first bytes of a blob.
///
/// ```
/// use demtiles::decode::{sniff_format, TileFormat};
///
/// assert_eq!(sniff_format(b"RIFF\x10\0\0\0WEBPVP8L"), Some(TileFormat::WebP));
/// assert_eq!(sniff_format(b"GIF89a"), None);
/// ```
pub fn sniff_format(blob: &[u8]) -> Option<TileFormat> {
    if blob.starts_with(&PNG_SIGNATURE) {
        Some(TileFormat::Png)
    } else if blob.len() >= 12 && &blob[..4] == b"RIFF" && &blob[8..12] == b"WEBP" {
        Some(TileFormat::WebP)
    } else {
        None
    }
}

/// Decode terrain-RGB to meters.
///
/// ```
/// use demtiles::decode::terrain_rgb_to_elevation;
///
/// assert!((terrain_rgb_to_elevation(1, 168, 114) - 865.8).abs() < 1e-9);
/// ```
pub fn terrain_rgb_to_elevation(r: u8, g: u8, b: u8) -> f64 {
    let value = (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
    ELEVATION_BASE + f64::from(value) * ELEVATION_STEP
}

/// A decoded tile: `width * height` RGB pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTile {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl DecodedTile {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Size of the raster in bytes.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (x as usize + self.width as usize * y as usize) * 3;
        let px = &self.pixels[i..i + 3];
        Some([px[0], px[1], px[2]])
    }

    /// Elevation of the pixel at `(x, y)`, or `None` outside the raster.
    pub fn elevation_at(&self, x: u32, y: u32) -> Option<f64> {
        self.rgb_at(x, y)
            .map(|[r, g, b]| terrain_rgb_to_elevation(r, g, b))
    }
}

/// Decode context shared by the codecs.
///
/// Created once the image dimensions are known; codecs then write rows or
/// pixels into it and call [`RasterBuilder::finish`].
#[derive(Debug)]
pub struct RasterBuilder {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    rows_written: u32,
}

impl RasterBuilder {
    /// Allocate a zeroed `width * height * 3` raster.
    ///
    /// # Errors
    ///
    /// [`DemError::Decode`] for empty images, [`DemError::Allocation`] if the
    /// raster cannot be allocated.
    pub fn init(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DemError::Decode(format!("empty image {width}x{height}")));
        }
        let size = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3))
            .ok_or(DemError::Allocation {
                requested: usize::MAX,
            })?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(size)
            .map_err(|_| DemError::Allocation { requested: size })?;
        pixels.resize(size, 0);

        Ok(Self {
            pixels,
            width,
            height,
            rows_written: 0,
        })
    }

    /// Write row `y` from interleaved samples with `channels` per pixel.
    ///
    /// One or two channels are gray (plus alpha), three or four are RGB
    /// (plus alpha). Alpha is dropped.
    pub fn write_row(&mut self, y: u32, row: &[u8], channels: usize) -> Result<()> {
        let needed = self.width as usize * channels;
        if y >= self.height || row.len() < needed || !(1..=4).contains(&channels) {
            return Err(DemError::Decode(format!(
                "row {y} has {} bytes, expected {needed}",
                row.len()
            )));
        }

        let start = self.width as usize * y as usize * 3;
        let out = &mut self.pixels[start..start + self.width as usize * 3];
        for (dst, src) in out.chunks_exact_mut(3).zip(row.chunks_exact(channels)) {
            match channels {
                1 | 2 => dst.fill(src[0]),
                _ => dst.copy_from_slice(&src[..3]),
            }
        }
        self.rows_written = self.rows_written.max(y + 1);
        Ok(())
    }

    /// The whole raster, for codecs that decode RGB in one pass.
    fn raster_mut(&mut self) -> &mut [u8] {
        self.rows_written = self.height;
        &mut self.pixels
    }

    /// Finish decoding.
    ///
    /// # Errors
    ///
    /// [`DemError::Decode`] if fewer rows than the image height were written.
    pub fn finish(self) -> Result<DecodedTile> {
        if self.rows_written < self.height {
            return Err(DemError::Decode(format!(
                "image truncated after {} of {} rows",
                self.rows_written, self.height
            )));
        }
        Ok(DecodedTile {
            pixels: self.pixels,
            width: self.width,
            height: self.height,
        })
    }
}

/// Decode a tile blob into an RGB raster.
///
/// # Errors
///
/// - [`DemError::UnknownFormat`] if the blob is neither PNG nor WebP
/// - [`DemError::CompressedFormat`] for interlaced PNG, lossy or animated WebP
/// - [`DemError::Decode`] if the codec rejects the data
pub fn decode_tile(blob: &[u8]) -> Result<DecodedTile> {
    match sniff_format(blob) {
        Some(TileFormat::Png) => decode_png(blob),
        Some(TileFormat::WebP) => decode_webp(blob),
        None => Err(DemError::UnknownFormat),
    }
}

fn decode_png(blob: &[u8]) -> Result<DecodedTile> {
    let mut decoder = png::Decoder::new(Cursor::new(blob));
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| DemError::Decode(e.to_string()))?;

    let info = reader.info();
    if info.interlaced {
        return Err(DemError::CompressedFormat {
            format: TileFormat::Png,
            reason: "interlaced",
        });
    }
    let (width, height) = (info.width, info.height);

    let channels = match reader.output_color_type().0 {
        ColorType::Grayscale => 1,
        ColorType::GrayscaleAlpha => 2,
        ColorType::Rgb => 3,
        ColorType::Rgba => 4,
        ColorType::Indexed => {
            return Err(DemError::Decode("palette was not expanded".into()));
        }
    };

    let mut raster = RasterBuilder::init(width, height)?;
    let mut y = 0;
    while let Some(row) = reader
        .next_row()
        .map_err(|e| DemError::Decode(e.to_string()))?
    {
        raster.write_row(y, row.data(), channels)?;
        y += 1;
    }
    raster.finish()
}

fn decode_webp(blob: &[u8]) -> Result<DecodedTile> {
    let mut decoder =
        WebPDecoder::new(Cursor::new(blob)).map_err(|e| DemError::Decode(e.to_string()))?;
    if decoder.is_lossy() {
        return Err(DemError::CompressedFormat {
            format: TileFormat::WebP,
            reason: "lossy",
        });
    }
    if decoder.is_animated() {
        return Err(DemError::CompressedFormat {
            format: TileFormat::WebP,
            reason: "animated",
        });
    }

    let (width, height) = decoder.dimensions();
    let mut raster = RasterBuilder::init(width, height)?;

    if decoder.has_alpha() {
        let size = decoder
            .output_buffer_size()
            .ok_or_else(|| DemError::Decode("image too large".into()))?;
        let mut rgba = Vec::new();
        rgba.try_reserve_exact(size)
            .map_err(|_| DemError::Allocation { requested: size })?;
        rgba.resize(size, 0);
        decoder
            .read_image(&mut rgba)
            .map_err(|e| DemError::Decode(e.to_string()))?;

        let stride = width as usize * 4;
        for (y, row) in rgba.chunks_exact(stride).enumerate() {
            raster.write_row(y as u32, row, 4)?;
        }
    } else {
        decoder
            .read_image(raster.raster_mut())
            .map_err(|e| DemError::Decode(e.to_string()))?;
    }
    raster.finish()
}
