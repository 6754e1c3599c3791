//! Reading PMTiles v3 archives.
//!
//! A PMTiles file is a fixed 127-byte [`Header`], a root directory, optional
//! leaf directories and a tile data section. [`PmTilesArchive`] walks the
//! directories to find a tile's byte range and returns its blob.

mod archive;
mod directory;
mod header;

pub use archive::{decompress, PmTilesArchive, DEFAULT_MAX_DIRECTORY_DEPTH};
pub use directory::{deserialize_directory, find_tile, serialize_directory, Entry};
pub use header::{
    deserialize_header, from_e7, serialize_header, to_e7, Compression, Header, TileType,
    HEADER_SIZE, MAGIC, VERSION,
};
