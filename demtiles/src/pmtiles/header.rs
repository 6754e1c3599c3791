//! The fixed 127-byte PMTiles v3 header.

use crate::error::{DemError, Result};
use crate::source::BoundingBox;

pub const HEADER_SIZE: usize = 127;
pub const MAGIC: &[u8; 7] = b"PMTiles";
pub const VERSION: u8 = 3;

/// Compression codec of directories or tile blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Unknown,
    None,
    Gzip,
    Brotli,
    Zstd,
}

impl Compression {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Compression::Unknown),
            1 => Ok(Compression::None),
            2 => Ok(Compression::Gzip),
            3 => Ok(Compression::Brotli),
            4 => Ok(Compression::Zstd),
            other => Err(DemError::Format(format!("invalid compression code {other}"))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Compression::Unknown => 0,
            Compression::None => 1,
            Compression::Gzip => 2,
            Compression::Brotli => 3,
            Compression::Zstd => 4,
        }
    }
}

/// Declared content type of the tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileType {
    Unknown,
    Mvt,
    Png,
    Jpeg,
    Webp,
    Avif,
}

impl TileType {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(TileType::Unknown),
            1 => Ok(TileType::Mvt),
            2 => Ok(TileType::Png),
            3 => Ok(TileType::Jpeg),
            4 => Ok(TileType::Webp),
            5 => Ok(TileType::Avif),
            other => Err(DemError::Format(format!("invalid tile type {other}"))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            TileType::Unknown => 0,
            TileType::Mvt => 1,
            TileType::Png => 2,
            TileType::Jpeg => 3,
            TileType::Webp => 4,
            TileType::Avif => 5,
        }
    }
}

/// Decoded archive header. Offsets are absolute positions in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub root_offset: u64,
    pub root_length: u64,
    pub metadata_offset: u64,
    pub metadata_length: u64,
    pub leaf_offset: u64,
    pub leaf_length: u64,
    pub data_offset: u64,
    pub data_length: u64,
    pub n_addressed_tiles: u64,
    pub n_tile_entries: u64,
    pub n_tile_contents: u64,
    pub clustered: bool,
    pub internal_compression: Compression,
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub min_lon_e7: i32,
    pub min_lat_e7: i32,
    pub max_lon_e7: i32,
    pub max_lat_e7: i32,
    pub center_zoom: u8,
    pub center_lon_e7: i32,
    pub center_lat_e7: i32,
}

impl Header {
    /// Bounding box in decimal degrees.
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            from_e7(self.min_lat_e7),
            from_e7(self.min_lon_e7),
            from_e7(self.max_lat_e7),
            from_e7(self.max_lon_e7),
        )
    }
}

/// Fixed-point degrees to floating point.
pub fn from_e7(value: i32) -> f64 {
    value as f64 / 10_000_000.0
}

/// Floating point degrees to fixed point, rounded to the nearest unit.
pub fn to_e7(value: f64) -> i32 {
    (value * 10_000_000.0).round() as i32
}

/// Little-endian field reader over the header bytes.
struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn u8(&mut self) -> u8 {
        let value = self.bytes[self.pos];
        self.pos += 1;
        value
    }

    fn u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.bytes[self.pos..self.pos + 8]);
        self.pos += 8;
        u64::from_le_bytes(raw)
    }

    fn i32(&mut self) -> i32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[self.pos..self.pos + 4]);
        self.pos += 4;
        i32::from_le_bytes(raw)
    }
}

/// Decode the header from the first [`HEADER_SIZE`] bytes of an archive.
///
/// # Errors
///
/// Returns [`DemError::Format`] if fewer than 127 bytes are given, the magic
/// or version do not match, a compression or tile type code is unknown, or
/// the bounding box is empty.
pub fn deserialize_header(bytes: &[u8]) -> Result<Header> {
    if bytes.len() < HEADER_SIZE {
        return Err(DemError::Format(format!(
            "header truncated: {} of {HEADER_SIZE} bytes",
            bytes.len()
        )));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(DemError::Format("invalid PMTiles magic".into()));
    }

    let mut r = FieldReader {
        bytes: &bytes[..HEADER_SIZE],
        pos: MAGIC.len(),
    };
    let version = r.u8();
    if version != VERSION {
        return Err(DemError::Format(format!(
            "unsupported PMTiles version {version}"
        )));
    }

    let header = Header {
        root_offset: r.u64(),
        root_length: r.u64(),
        metadata_offset: r.u64(),
        metadata_length: r.u64(),
        leaf_offset: r.u64(),
        leaf_length: r.u64(),
        data_offset: r.u64(),
        data_length: r.u64(),
        n_addressed_tiles: r.u64(),
        n_tile_entries: r.u64(),
        n_tile_contents: r.u64(),
        clustered: r.u8() == 1,
        internal_compression: Compression::from_code(r.u8())?,
        tile_compression: Compression::from_code(r.u8())?,
        tile_type: TileType::from_code(r.u8())?,
        min_zoom: r.u8(),
        max_zoom: r.u8(),
        min_lon_e7: r.i32(),
        min_lat_e7: r.i32(),
        max_lon_e7: r.i32(),
        max_lat_e7: r.i32(),
        center_zoom: r.u8(),
        center_lon_e7: r.i32(),
        center_lat_e7: r.i32(),
    };

    if header.min_lon_e7 >= header.max_lon_e7 || header.min_lat_e7 >= header.max_lat_e7 {
        return Err(DemError::Format(format!(
            "empty bounding box {:?}",
            header.bounds()
        )));
    }
    if header.min_zoom > header.max_zoom {
        return Err(DemError::Format(format!(
            "min zoom {} above max zoom {}",
            header.min_zoom, header.max_zoom
        )));
    }

    Ok(header)
}

/// Encode a header into its 127-byte form.
pub fn serialize_header(header: &Header) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE);
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION);
    for value in [
        header.root_offset,
        header.root_length,
        header.metadata_offset,
        header.metadata_length,
        header.leaf_offset,
        header.leaf_length,
        header.data_offset,
        header.data_length,
        header.n_addressed_tiles,
        header.n_tile_entries,
        header.n_tile_contents,
    ] {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.push(u8::from(header.clustered));
    buf.push(header.internal_compression.code());
    buf.push(header.tile_compression.code());
    buf.push(header.tile_type.code());
    buf.push(header.min_zoom);
    buf.push(header.max_zoom);
    for value in [
        header.min_lon_e7,
        header.min_lat_e7,
        header.max_lon_e7,
        header.max_lat_e7,
    ] {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.push(header.center_zoom);
    buf.extend_from_slice(&header.center_lon_e7.to_le_bytes());
    buf.extend_from_slice(&header.center_lat_e7.to_le_bytes());
    debug_assert_eq!(buf.len(), HEADER_SIZE);
    buf
}
