//! Error types for the demtiles library.

use std::path::PathBuf;
use thiserror::Error;

use crate::decode::TileFormat;
use crate::pmtiles::Compression;
use crate::service::LookupStatus;

/// Errors that can occur while resolving elevation data.
#[derive(Error, Debug)]
pub enum DemError {
    /// IO error when seeking or reading an archive.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive file does not exist.
    #[error("Archive not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Malformed header, directory or varint.
    #[error("Invalid archive format: {0}")]
    Format(String),

    /// The archive uses a compression codec this library does not decode.
    #[error("Unsupported compression: {compression:?}")]
    UnsupportedCompression { compression: Compression },

    /// A gzip stream was corrupt or truncated.
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// Growing a buffer or allocating a raster failed.
    #[error("Allocation of {requested} bytes failed")]
    Allocation { requested: usize },

    /// The tile uses a codec variant the decoder does not handle.
    #[error("Unsupported {format:?} variant: {reason}")]
    CompressedFormat {
        format: TileFormat,
        reason: &'static str,
    },

    /// The tile blob starts with neither a PNG nor a WebP signature.
    #[error("Unknown tile image format")]
    UnknownFormat,

    /// The pixel codec rejected the tile blob.
    #[error("Tile decode failed: {0}")]
    Decode(String),

    /// Tile coordinates outside the range of their zoom level.
    #[error("Invalid tile address: {zoom}/{x}/{y}")]
    InvalidTileAddress { zoom: u8, x: u32, y: u32 },

    /// SQLite error from the MBTiles backend.
    #[cfg(feature = "mbtiles")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl DemError {
    /// The per-lookup status this error is reported as.
    pub fn status(&self) -> LookupStatus {
        match self {
            DemError::Decode(_) => LookupStatus::DecodeError,
            DemError::CompressedFormat { .. } => LookupStatus::CompressedFormatError,
            DemError::UnknownFormat => LookupStatus::UnknownFormatError,
            DemError::InvalidTileAddress { .. } => LookupStatus::NotFound,
            _ => LookupStatus::ArchiveError,
        }
    }
}

/// Result type alias using [`DemError`].
pub type Result<T> = std::result::Result<T, DemError>;
