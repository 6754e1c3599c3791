//! # demtiles - Terrain-RGB Elevation Lookups
//!
//! Resolve a latitude/longitude to an elevation in meters by reading the
//! covering tile out of a [PMTiles](https://github.com/protomaps/PMTiles)
//! archive (or an MBTiles database), decoding its pixels and sampling the
//! terrain-RGB value.
//!
//! ## Features
//!
//! - **Bounded reads**: directories are walked with a fixed depth limit and
//!   read into reusable power-of-two buffers
//! - **Small footprint**: a bounded LRU cache of decoded tiles (5 by default)
//! - **Codecs**: baseline PNG and lossless WebP, detected by magic bytes
//! - **Multiple archives**: scanned in registration order, first match wins
//!
//! ## Quick Start
//!
//! ```no_run
//! use demtiles::{ElevationService, LookupStatus};
//!
//! let mut service = ElevationService::builder()
//!     .archive("/data/austria.pmtiles")
//!     .build()?;
//!
//! let info = service.resolve_elevation(47.12925176802318, 15.209778656353123);
//! if info.status == LookupStatus::Valid {
//!     println!("Elevation: {:.1}m", info.elevation);
//! }
//! # Ok::<(), demtiles::DemError>(())
//! ```
//!
//! ## Terrain-RGB
//!
//! Each pixel encodes `elevation = -10000 + (R * 65536 + G * 256 + B) * 0.1`,
//! so the value range is -10000 m to about 1667721 m in 0.1 m steps.

pub mod buffer;
pub mod cache;
pub mod decode;
pub mod error;
#[cfg(feature = "mbtiles")]
pub mod mbtiles;
pub mod pmtiles;
pub mod projection;
pub mod service;
pub mod source;
pub mod tile_id;

// Re-export main types at crate root for convenience
pub use cache::TileCache;
pub use decode::{decode_tile, DecodedTile, TileFormat};
pub use error::{DemError, Result};
#[cfg(feature = "mbtiles")]
pub use mbtiles::MbTilesArchive;
pub use pmtiles::PmTilesArchive;
pub use service::{
    ArchiveStats, CacheStats, ElevationService, ElevationServiceBuilder, LocationInfo,
    LookupStatus,
};
pub use source::{BoundingBox, TileSource};
pub use tile_id::{CacheKey, TileAddress};
